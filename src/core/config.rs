//! # Configuration
//!
//! Runtime configuration from environment variables, an optional YAML file,
//! and CLI overrides (applied by the binary, in that order of precedence).
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default wait for the human-facing permission prompt
pub const DEFAULT_ACCESS_TIMEOUT_SECS: u64 = 300;
/// Default wait for a single list/create round trip
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OSASCRIPT_PATH: &str = "/usr/bin/osascript";

/// Which native access path to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendChoice {
    /// Probe what is available on this host
    #[default]
    Auto,
    /// JavaScript for Automation through osascript
    Scripting,
    /// Scriptable object graph (fixture-backed outside macOS)
    ObjectGraph,
    /// Event store with asynchronous fetches (fixture-backed outside macOS)
    EventStore,
}

impl std::fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendChoice::Auto => write!(f, "auto"),
            BackendChoice::Scripting => write!(f, "scripting"),
            BackendChoice::ObjectGraph => write!(f, "object-graph"),
            BackendChoice::EventStore => write!(f, "event-store"),
        }
    }
}

impl std::str::FromStr for BackendChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "auto" => Ok(BackendChoice::Auto),
            "scripting" | "jxa" => Ok(BackendChoice::Scripting),
            "object-graph" => Ok(BackendChoice::ObjectGraph),
            "event-store" => Ok(BackendChoice::EventStore),
            _ => Err(anyhow::anyhow!("Invalid backend: {}", s)),
        }
    }
}

/// Resolved configuration for the reminders CLI and service
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendChoice,
    pub access_timeout_secs: u64,
    pub operation_timeout_secs: u64,
    pub osascript_path: PathBuf,
    /// YAML fixture seeding the in-process store
    pub fixture_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            access_timeout_secs: DEFAULT_ACCESS_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            osascript_path: PathBuf::from(DEFAULT_OSASCRIPT_PATH),
            fixture_path: None,
        }
    }
}

impl Config {
    /// Build configuration from `REMINDERS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(backend) = lookup("REMINDERS_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(secs) = lookup("REMINDERS_ACCESS_TIMEOUT_SECS") {
            config.access_timeout_secs = secs
                .parse()
                .with_context(|| format!("REMINDERS_ACCESS_TIMEOUT_SECS is not a number: {}", secs))?;
        }
        if let Some(secs) = lookup("REMINDERS_OPERATION_TIMEOUT_SECS") {
            config.operation_timeout_secs = secs.parse().with_context(|| {
                format!("REMINDERS_OPERATION_TIMEOUT_SECS is not a number: {}", secs)
            })?;
        }
        if let Some(path) = lookup("REMINDERS_OSASCRIPT") {
            config.osascript_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("REMINDERS_FIXTURE") {
            config.fixture_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Overlay a YAML config file on top of this configuration
    ///
    /// Only keys present in the file replace current values.
    pub fn merge_file(self, path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        self.merge_yaml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn merge_yaml(self, contents: &str) -> Result<Self> {
        let overlay: ConfigOverlay = serde_yaml::from_str(contents)?;
        Ok(Config {
            backend: overlay.backend.unwrap_or(self.backend),
            access_timeout_secs: overlay
                .access_timeout_secs
                .unwrap_or(self.access_timeout_secs),
            operation_timeout_secs: overlay
                .operation_timeout_secs
                .unwrap_or(self.operation_timeout_secs),
            osascript_path: overlay.osascript_path.unwrap_or(self.osascript_path),
            fixture_path: overlay.fixture_path.or(self.fixture_path),
        })
    }

    /// Reject configurations that cannot produce a working service
    pub fn validate(&self) -> Result<()> {
        if self.access_timeout_secs == 0 {
            return Err(anyhow::anyhow!("access_timeout_secs must be greater than zero"));
        }
        if self.operation_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "operation_timeout_secs must be greater than zero"
            ));
        }
        if matches!(
            self.backend,
            BackendChoice::ObjectGraph | BackendChoice::EventStore
        ) && self.fixture_path.is_none()
        {
            return Err(anyhow::anyhow!(
                "Backend {} needs a fixture file on this host (REMINDERS_FIXTURE or --fixture)",
                self.backend
            ));
        }
        Ok(())
    }

    pub fn access_timeout(&self) -> Duration {
        Duration::from_secs(self.access_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Partial config as read from YAML
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverlay {
    backend: Option<BackendChoice>,
    access_timeout_secs: Option<u64>,
    operation_timeout_secs: Option<u64>,
    osascript_path: Option<PathBuf>,
    fixture_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.access_timeout(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("REMINDERS_BACKEND", "event_store"),
            ("REMINDERS_OPERATION_TIMEOUT_SECS", "5"),
            ("REMINDERS_FIXTURE", "fixtures/home.yaml"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendChoice::EventStore);
        assert_eq!(config.operation_timeout(), Duration::from_secs(5));
        assert_eq!(config.fixture_path, Some(PathBuf::from("fixtures/home.yaml")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_rejects_bad_numbers() {
        let result = Config::from_lookup(lookup_from(&[(
            "REMINDERS_ACCESS_TIMEOUT_SECS",
            "soon",
        )]));
        assert!(result.is_err());
    }

    #[test]
    fn test_yaml_overlay_keeps_unset_values() {
        let base = Config::from_lookup(lookup_from(&[("REMINDERS_FIXTURE", "a.yaml")])).unwrap();
        let merged = base
            .merge_yaml("backend: object-graph\naccess_timeout_secs: 60\n")
            .unwrap();

        assert_eq!(merged.backend, BackendChoice::ObjectGraph);
        assert_eq!(merged.access_timeout_secs, 60);
        assert_eq!(merged.operation_timeout_secs, DEFAULT_OPERATION_TIMEOUT_SECS);
        assert_eq!(merged.fixture_path, Some(PathBuf::from("a.yaml")));
    }

    #[test]
    fn test_yaml_overlay_rejects_unknown_keys() {
        assert!(Config::default().merge_yaml("colour: blue\n").is_err());
    }

    #[test]
    fn test_validate_requires_fixture_for_store_backends() {
        let config = Config {
            backend: BackendChoice::ObjectGraph,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            operation_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_choice_parse() {
        assert_eq!("JXA".parse::<BackendChoice>().unwrap(), BackendChoice::Scripting);
        assert_eq!(
            "object-graph".parse::<BackendChoice>().unwrap(),
            BackendChoice::ObjectGraph
        );
        assert!("carrier-pigeon".parse::<BackendChoice>().is_err());
    }
}
