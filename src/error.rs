//! Error taxonomy for the enhancement settings layer
//!
//! Every variant renders a message that can be shown to the user as-is.
//! None of them is fatal to the process.

use thiserror::Error;

use crate::ai::probe::ProbeClassification;

/// Errors produced by the reconciliation controller and its collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnhanceError {
    /// Rejected before any persistence call was made
    #[error("{0}")]
    Validation(String),
    /// The local endpoint probe did not reach a usable model
    #[error("{message}")]
    Connectivity {
        classification: ProbeClassification,
        message: String,
    },
    /// A settings backend call failed
    #[error("Settings backend error: {0}")]
    Persistence(String),
    /// The OS credential store could not be reached
    #[error("Credential store error: {0}")]
    Credential(String),
}

impl EnhanceError {
    /// Short headline for a notification
    pub fn title(&self) -> &'static str {
        match self {
            EnhanceError::Validation(_) => "Invalid Settings",
            EnhanceError::Connectivity { .. } => "Connection Problem",
            EnhanceError::Persistence(_) => "Settings Not Saved",
            EnhanceError::Credential(_) => "Keychain Unavailable",
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, EnhanceError>;
