//! # Reminder Backends
//!
//! One adapter per native access path to the reminder store. Every adapter
//! lists and creates reminders and returns backend-native records; the
//! normalizer turns those into `Record`s.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.0: Fixture store so object-graph and event-store paths run anywhere
//! - 1.1.0: Added event-store adapter with bridged asynchronous fetches
//! - 1.0.0: Scripting adapter through osascript

pub mod event_store;
pub mod fixture;
pub mod object_graph;
pub mod scripting;

pub use event_store::EventStoreAdapter;
pub use fixture::FixtureStore;
pub use object_graph::ObjectGraphAdapter;
pub use scripting::{OsascriptRunner, ScriptingAdapter};

use crate::core::config::{BackendChoice, Config};
use crate::core::error::{BackendFailure, ReminderError, ReminderResult};
use crate::features::reminders::access::AccessRequester;
use crate::features::reminders::normalizer::NativeRecord;
use crate::features::reminders::record::NewReminder;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

/// Which adapter is serving requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Scripting,
    ObjectGraph,
    EventStore,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Scripting => write!(f, "scripting"),
            BackendKind::ObjectGraph => write!(f, "object-graph"),
            BackendKind::EventStore => write!(f, "event-store"),
        }
    }
}

/// Error reported by a synchronous native call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError(pub String);

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NativeError {}

impl From<NativeError> for ReminderError {
    fn from(err: NativeError) -> Self {
        ReminderError::Backend(BackendFailure::Native(err.0))
    }
}

/// A native access path to the reminder store
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// The native permission request for this path
    fn access_requester(&self) -> Arc<dyn AccessRequester>;

    /// Every reminder in every list the backend can see, in backend order
    async fn list(&self) -> ReminderResult<Vec<NativeRecord>>;

    /// Like `list`, but may leave out reminders whose completion state is
    /// not `completed`. Callers still apply their full filter afterwards.
    async fn list_scoped(&self, _completed: Option<bool>) -> ReminderResult<Vec<NativeRecord>> {
        self.list().await
    }

    /// Insert into the default list and return the verified, persisted record
    async fn create(&self, reminder: &NewReminder) -> ReminderResult<NativeRecord>;
}

/// Pick the adapter for this process from configuration
///
/// Called once when the service is built; the choice is never re-probed.
pub fn select_backend(config: &Config) -> Result<Box<dyn BackendAdapter>> {
    let choice = match config.backend {
        BackendChoice::Auto => probe(config)?,
        explicit => explicit,
    };
    debug!("Backend choice {} resolved to {}", config.backend, choice);

    let backend: Box<dyn BackendAdapter> = match choice {
        BackendChoice::Scripting => {
            let runner = OsascriptRunner::new(&config.osascript_path);
            if !runner.is_available() {
                return Err(ReminderError::Backend(BackendFailure::Unavailable(format!(
                    "osascript not found at {}",
                    config.osascript_path.display()
                )))
                .into());
            }
            Box::new(ScriptingAdapter::new(
                Arc::new(runner),
                config.operation_timeout(),
                config.access_timeout(),
            ))
        }
        BackendChoice::ObjectGraph => Box::new(ObjectGraphAdapter::new(load_fixture(config)?)),
        BackendChoice::EventStore => Box::new(EventStoreAdapter::new(
            load_fixture(config)?,
            config.operation_timeout(),
        )),
        BackendChoice::Auto => unreachable!("probe never returns auto"),
    };

    info!("Using {} reminder backend", backend.kind());
    Ok(backend)
}

fn probe(config: &Config) -> Result<BackendChoice> {
    if config.osascript_path.is_file() {
        return Ok(BackendChoice::Scripting);
    }
    if config.fixture_path.is_some() {
        return Ok(BackendChoice::EventStore);
    }
    Err(ReminderError::Backend(BackendFailure::Unavailable(format!(
        "no osascript at {} and no fixture configured",
        config.osascript_path.display()
    )))
    .into())
}

fn load_fixture(config: &Config) -> Result<Arc<FixtureStore>> {
    let path = config.fixture_path.as_deref().ok_or_else(|| {
        anyhow::anyhow!("Backend {} needs a fixture file on this host", config.backend)
    })?;
    Ok(Arc::new(FixtureStore::load(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn fixture_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "lists:\n  - name: Home\n    reminders:\n      - name: Water plants\n"
        )
        .unwrap();
        file
    }

    fn config(backend: BackendChoice, fixture: Option<PathBuf>) -> Config {
        Config {
            backend,
            osascript_path: PathBuf::from("/nonexistent/osascript"),
            fixture_path: fixture,
            ..Config::default()
        }
    }

    #[test]
    fn test_auto_falls_back_to_event_store_fixture() {
        let file = fixture_file();
        let backend =
            select_backend(&config(BackendChoice::Auto, Some(file.path().to_path_buf()))).unwrap();
        assert_eq!(backend.kind(), BackendKind::EventStore);
    }

    #[test]
    fn test_auto_without_anything_is_unavailable() {
        let err = select_backend(&config(BackendChoice::Auto, None)).err().unwrap();
        let reminder_err = err.downcast_ref::<ReminderError>().unwrap();
        assert!(matches!(
            reminder_err,
            ReminderError::Backend(BackendFailure::Unavailable(_))
        ));
    }

    #[test]
    fn test_explicit_scripting_requires_osascript() {
        assert!(select_backend(&config(BackendChoice::Scripting, None)).is_err());
    }

    #[test]
    fn test_explicit_object_graph() {
        let file = fixture_file();
        let backend = select_backend(&config(
            BackendChoice::ObjectGraph,
            Some(file.path().to_path_buf()),
        ))
        .unwrap();
        assert_eq!(backend.kind(), BackendKind::ObjectGraph);
    }

    #[test]
    fn test_missing_fixture_file_is_an_error() {
        let result = select_backend(&config(
            BackendChoice::EventStore,
            Some(PathBuf::from("/nonexistent/fixture.yaml")),
        ));
        assert!(result.is_err());
    }
}
