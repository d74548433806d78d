// Core layer - shared types and configuration
pub mod core;

// Features layer - reminder service and its backends
pub mod features;

pub use self::core::{BackendChoice, Config, ReminderError, ReminderResult};

pub use features::reminders::{
    AccessStatus, BackendKind, FilterSpec, NewReminder, Record, ReminderService,
};
