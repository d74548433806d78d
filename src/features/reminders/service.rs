//! # Reminder Service
//!
//! Public surface of the reminder domain. Every operation validates its
//! input, resolves access through the gate, then calls the configured
//! backend and normalizes what comes back.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Validate create input before touching the access gate
//! - 1.0.0: Initial release

use crate::core::config::Config;
use crate::core::error::ReminderResult;
use crate::features::reminders::access::{AccessState, AccessStatus, AuthorizationGate};
use crate::features::reminders::backends::{select_backend, BackendAdapter, BackendKind};
use crate::features::reminders::filter::FilterSpec;
use crate::features::reminders::normalizer::to_record;
use crate::features::reminders::record::{NewReminder, Record};
use anyhow::Result;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;

pub struct ReminderService {
    gate: AuthorizationGate,
    backend: Box<dyn BackendAdapter>,
}

impl ReminderService {
    pub fn new(
        backend: Box<dyn BackendAdapter>,
        state: Arc<AccessState>,
        access_timeout: Duration,
    ) -> Self {
        let gate = AuthorizationGate::new(state, backend.access_requester(), access_timeout);
        Self { gate, backend }
    }

    /// Build the service for this process: selected backend, global access state
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = select_backend(config)?;
        Ok(Self::new(
            backend,
            AccessState::global(),
            config.access_timeout(),
        ))
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn access_status(&self) -> AccessStatus {
        self.gate.status()
    }

    /// Resolve access without performing an operation
    pub async fn ensure_access(&self) -> bool {
        self.gate.ensure_granted().await
    }

    /// All reminders the backend can see, optionally filtered
    ///
    /// Backend order is preserved; the filter only removes records.
    pub async fn list(&self, filter: Option<&FilterSpec>) -> ReminderResult<Vec<Record>> {
        self.gate.require().await?;

        let natives = self
            .backend
            .list_scoped(filter.and_then(|spec| spec.completed))
            .await?;
        let total = natives.len();
        let records: Vec<Record> = natives
            .into_iter()
            .map(to_record)
            .filter(|record| filter.map_or(true, |spec| spec.matches(record)))
            .collect();

        debug!(
            "Listed {} of {} reminders from {} backend",
            records.len(),
            total,
            self.backend.kind()
        );
        Ok(records)
    }

    /// Create a reminder in the default list and return it as persisted
    pub async fn create(&self, name: &str, body: Option<&str>) -> ReminderResult<Record> {
        let reminder = NewReminder::new(name, body.map(str::to_string))?;
        self.gate.require().await?;

        let native = self.backend.create(&reminder).await?;
        let record = to_record(native);
        info!(
            "Created reminder {:?} via {} backend",
            record.id.as_deref().unwrap_or(""),
            self.backend.kind()
        );
        Ok(record)
    }
}
