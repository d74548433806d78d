//! Canonical reminder record returned to callers
//!
//! Records carry no connection back to the store they came from; mutating
//! one never touches native storage.

use crate::core::error::{ReminderError, ReminderResult};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Normalized reminder, identical in shape for every backend
///
/// Absent values serialize as `null`; every key is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Backend-assigned identifier, absent until persisted
    pub id: Option<String>,
    pub name: String,
    pub body: Option<String>,
    pub completed: bool,
    pub completion_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub allday_due_date: Option<DateTime<Utc>>,
    pub remind_me_date: Option<DateTime<Utc>>,
    /// 0 = none; otherwise the backend's ordinal scale
    pub priority: i64,
    pub flagged: bool,
}

impl Record {
    /// An unsaved record with everything but the name unset
    pub fn unsaved(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            body: None,
            completed: false,
            completion_date: None,
            due_date: None,
            allday_due_date: None,
            remind_me_date: None,
            priority: 0,
            flagged: false,
        }
    }
}

/// Validated input for a create call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    name: String,
    body: Option<String>,
}

impl NewReminder {
    /// Rejects an empty (or whitespace-only) name before anything native runs
    ///
    /// An empty body is the same as no body; stores read both back as absent.
    pub fn new(name: impl Into<String>, body: Option<String>) -> ReminderResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ReminderError::invalid_argument(
                "reminder name must not be empty",
            ));
        }
        let body = body.filter(|body| !body.is_empty());
        Ok(Self { name, body })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}
