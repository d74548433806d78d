//! # Core Module
//!
//! Configuration and error types shared by every reminder backend.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Typed reminder errors alongside configuration
//! - 1.0.0: Initial creation with config module

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{BackendChoice, Config};
pub use error::{BackendFailure, ReminderError, ReminderResult};
