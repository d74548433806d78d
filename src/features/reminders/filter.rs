//! # Reminder Filters
//!
//! Equality-only filtering over canonical records. A filter is a conjunction:
//! every field it sets must match, and an empty filter matches everything.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use crate::core::error::{ReminderError, ReminderResult};
use crate::features::reminders::record::Record;
use serde::Serialize;

/// Field names a filter may constrain
pub const FILTER_KEYS: [&str; 3] = ["completed", "flagged", "priority"];

/// Equality constraints on `completed`, `flagged` and `priority`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterSpec {
    pub completed: Option<bool>,
    pub flagged: Option<bool>,
    pub priority: Option<i64>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.completed.is_none() && self.flagged.is_none() && self.priority.is_none()
    }

    /// Build a filter from `key=value` style pairs
    ///
    /// Unknown keys are rejected with `InvalidFilterKey`; values that do not
    /// parse for their key are `InvalidArgument`. A key given twice keeps the
    /// last value.
    pub fn from_pairs<I, K, V>(pairs: I) -> ReminderResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut spec = FilterSpec::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref().trim(), value.as_ref().trim());
            match key {
                "completed" => spec.completed = Some(parse_bool(key, value)?),
                "flagged" => spec.flagged = Some(parse_bool(key, value)?),
                "priority" => {
                    spec.priority = Some(value.parse().map_err(|_| {
                        ReminderError::invalid_argument(format!(
                            "filter 'priority' expects an integer, got '{}'",
                            value
                        ))
                    })?)
                }
                other => {
                    return Err(ReminderError::InvalidFilterKey {
                        key: other.to_string(),
                    })
                }
            }
        }
        Ok(spec)
    }

    /// Parse a single `key=value` argument
    pub fn parse_pair(arg: &str) -> ReminderResult<(String, String)> {
        match arg.split_once('=') {
            Some((key, value)) => Ok((key.trim().to_string(), value.trim().to_string())),
            None => Err(ReminderError::invalid_argument(format!(
                "filter '{}' must look like key=value",
                arg
            ))),
        }
    }

    /// Build a filter from a JSON object such as `{"completed": true}`
    ///
    /// `null` values impose no constraint.
    pub fn from_json(value: &serde_json::Value) -> ReminderResult<Self> {
        let object = match value {
            serde_json::Value::Null => return Ok(FilterSpec::default()),
            serde_json::Value::Object(object) => object,
            other => {
                return Err(ReminderError::invalid_argument(format!(
                    "filter must be a JSON object, got {}",
                    other
                )))
            }
        };

        let mut spec = FilterSpec::default();
        for (key, value) in object {
            if !FILTER_KEYS.contains(&key.as_str()) {
                return Err(ReminderError::InvalidFilterKey { key: key.clone() });
            }
            if value.is_null() {
                continue;
            }
            let mismatch = || {
                ReminderError::invalid_argument(format!(
                    "filter '{}' has the wrong type: {}",
                    key, value
                ))
            };
            match key.as_str() {
                "completed" => spec.completed = Some(value.as_bool().ok_or_else(mismatch)?),
                "flagged" => spec.flagged = Some(value.as_bool().ok_or_else(mismatch)?),
                _ => spec.priority = Some(value.as_i64().ok_or_else(mismatch)?),
            }
        }
        Ok(spec)
    }

    /// True when every constraint in this filter holds for `record`
    pub fn matches(&self, record: &Record) -> bool {
        self.completed.map_or(true, |v| record.completed == v)
            && self.flagged.map_or(true, |v| record.flagged == v)
            && self.priority.map_or(true, |v| record.priority == v)
    }
}

fn parse_bool(key: &str, value: &str) -> ReminderResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ReminderError::invalid_argument(format!(
            "filter '{}' expects true or false, got '{}'",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(completed: bool, flagged: bool, priority: i64) -> Record {
        let mut record = Record::unsaved("r");
        record.completed = completed;
        record.flagged = flagged;
        record.priority = priority;
        record
    }

    fn all_records() -> Vec<Record> {
        let mut records = Vec::new();
        for completed in [false, true] {
            for flagged in [false, true] {
                for priority in [0, 1, 5, 9] {
                    records.push(record(completed, flagged, priority));
                }
            }
        }
        records
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let spec = FilterSpec::default();
        assert!(spec.is_empty());
        assert!(all_records().iter().all(|r| spec.matches(r)));
    }

    #[test]
    fn test_any_disagreeing_key_rejects() {
        let spec = FilterSpec {
            completed: Some(true),
            flagged: None,
            priority: Some(5),
        };
        for r in all_records() {
            let expected = r.completed && r.priority == 5;
            assert_eq!(spec.matches(&r), expected, "{:?}", r);
        }
    }

    #[test]
    fn test_from_pairs() {
        let spec = FilterSpec::from_pairs([("completed", "true"), ("priority", "1")]).unwrap();
        assert_eq!(spec.completed, Some(true));
        assert_eq!(spec.flagged, None);
        assert_eq!(spec.priority, Some(1));
    }

    #[test]
    fn test_from_pairs_rejects_unknown_key() {
        let err = FilterSpec::from_pairs([("dueAfter", "2024-01-01")]).unwrap_err();
        assert_eq!(
            err,
            ReminderError::InvalidFilterKey {
                key: "dueAfter".to_string()
            }
        );
    }

    #[test]
    fn test_from_pairs_rejects_bad_values() {
        let err = FilterSpec::from_pairs([("flagged", "maybe")]).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        assert!(FilterSpec::from_pairs([("priority", "high")]).is_err());
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            FilterSpec::parse_pair("flagged = no").unwrap(),
            ("flagged".to_string(), "no".to_string())
        );
        assert!(FilterSpec::parse_pair("flagged").is_err());
    }

    #[test]
    fn test_from_json() {
        let spec = FilterSpec::from_json(&json!({"flagged": true, "priority": null})).unwrap();
        assert_eq!(spec.flagged, Some(true));
        assert_eq!(spec.priority, None);

        assert!(FilterSpec::from_json(&json!(null)).unwrap().is_empty());
        assert!(matches!(
            FilterSpec::from_json(&json!({"name": "milk"})),
            Err(ReminderError::InvalidFilterKey { .. })
        ));
        assert!(FilterSpec::from_json(&json!({"completed": "yes"})).is_err());
        assert!(FilterSpec::from_json(&json!([1, 2])).is_err());
    }
}
