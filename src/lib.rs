//! enhance-settings - configuration layer of an AI text-enhancement feature
//!
//! Keeps the OS credential store, the persistent settings backend and the
//! in-memory UI state consistent, and validates local model endpoints before
//! they are trusted.

pub mod ai;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod settings;
pub mod store;

pub use controller::ReconciliationController;
pub use error::{EnhanceError, Result};
