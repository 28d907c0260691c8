//! Free-text enhancement options
//!
//! Stored by the settings backend and round-tripped untouched.

use serde::{Deserialize, Serialize};

const EDITOR_DEFAULT_INSTRUCTIONS: &str =
    "Fix any mistakes. Make sure sentences are clear and make sense.";

/// How the transcript is transformed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnhancementPreset {
    /// Grammar, spelling and punctuation clean-up
    #[default]
    Default,
    /// Rewrite speech into an AI prompt
    Prompts,
}

/// Options passed through to the enhancement engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancementOptions {
    pub preset: EnhancementPreset,
    #[serde(default)]
    pub custom_vocabulary: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_prefix: Option<String>,
}

impl EnhancementOptions {
    /// Value shown in the editor before the backend copy arrives
    pub fn editor_default() -> Self {
        Self {
            custom_instructions: Some(EDITOR_DEFAULT_INSTRUCTIONS.to_string()),
            ..Self::default()
        }
    }
}
