//! # Reminders Feature
//!
//! Lists and creates reminders in the system reminder store through one of
//! several native access paths, behind a once-per-process permission gate.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Rebuilt around pluggable native backends and canonical records
//! - 1.0.0: Initial release

pub mod access;
pub mod backends;
pub mod bridge;
pub mod filter;
pub mod normalizer;
pub mod record;
pub mod service;

pub use access::{AccessRequester, AccessState, AccessStatus, AuthorizationGate};
pub use backends::{select_backend, BackendAdapter, BackendKind};
pub use bridge::{await_completion, Outcome, Resolver};
pub use filter::{FilterSpec, FILTER_KEYS};
pub use normalizer::{to_record, NativeRecord};
pub use record::{NewReminder, Record};
pub use service::ReminderService;
