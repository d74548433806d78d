//! # Scripting Backend
//!
//! Talks to Reminders.app through JavaScript for Automation, run by
//! `osascript` as a child process with a bounded timeout.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Arguments embedded as escaped string literals; creates verified by count and read-back
//! - 1.0.0: Initial release

use crate::core::error::{BackendFailure, ReminderError, ReminderResult};
use crate::features::reminders::access::{AccessCallback, AccessRequester};
use crate::features::reminders::backends::{BackendAdapter, BackendKind};
use crate::features::reminders::normalizer::NativeRecord;
use crate::features::reminders::record::NewReminder;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Apple event errors meaning "this process may not automate Reminders"
const NOT_PERMITTED_CODES: &[i32] = &[-1743, -1744];

/// Reads every property of one reminder in a single Apple event
const READ_PROPS_FN: &str = r#"
function readProps(item) {
  const p = item.properties();
  return {
    id: p.id,
    name: p.name,
    body: p.body,
    completed: p.completed,
    completionDate: p.completionDate,
    dueDate: p.dueDate,
    alldayDueDate: p.alldayDueDate,
    remindMeDate: p.remindMeDate,
    priority: p.priority,
    flagged: p.flagged,
  };
}
"#;

const LIST_SCRIPT_BODY: &str = r#"
(() => {
  const app = Application('Reminders');
  const out = [];
  for (const list of app.lists()) {
    for (const item of list.reminders()) {
      out.push(readProps(item));
    }
  }
  return JSON.stringify(out);
})();
"#;

const CREATE_SCRIPT_BODY: &str = r#"
(() => {
  const app = Application('Reminders');
  const list = app.defaultList();
  if (!list || !list.exists()) {
    return JSON.stringify({ status: 'no-default-list' });
  }
  const countBefore = list.reminders.length;
  const props = { name: NAME, completed: false };
  if (BODY !== null) {
    props.body = BODY;
  }
  const item = list.make({ new: 'reminder', withProperties: props });
  const countAfter = list.reminders.length;
  return JSON.stringify({
    status: 'created',
    countBefore: countBefore,
    countAfter: countAfter,
    reminder: readProps(item),
  });
})();
"#;

/// Touches the application so the system shows its automation prompt
const ACCESS_PROBE_SCRIPT: &str = "Application('Reminders').lists.length;";

/// Result of one script execution
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a JavaScript for Automation script
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, script: &str, limit: Duration) -> ReminderResult<ScriptOutput>;
}

/// `osascript -l JavaScript -e <script>`
#[derive(Debug, Clone)]
pub struct OsascriptRunner {
    program: PathBuf,
}

impl OsascriptRunner {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.program.is_file()
    }
}

#[async_trait]
impl ScriptRunner for OsascriptRunner {
    async fn run(&self, script: &str, limit: Duration) -> ReminderResult<ScriptOutput> {
        debug!(
            "Running osascript ({} bytes, timeout {}s)",
            script.len(),
            limit.as_secs()
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(["-l", "JavaScript", "-e", script])
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => {
                let result = ScriptOutput {
                    success: output.status.success(),
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                if !result.success {
                    warn!("osascript failed with exit code: {:?}", result.exit_code);
                }
                Ok(result)
            }
            Ok(Err(e)) => {
                warn!("osascript could not be started: {}", e);
                Err(ReminderError::native(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                )))
            }
            Err(_) => {
                warn!("osascript timed out after {} seconds", limit.as_secs());
                Err(ReminderError::timeout("osascript", limit))
            }
        }
    }
}

/// A reminder as the scripting dictionary reports it
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptReminder {
    pub id: Option<String>,
    pub name: Option<String>,
    pub body: Option<String>,
    pub completed: Option<bool>,
    pub completion_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub allday_due_date: Option<DateTime<Utc>>,
    pub remind_me_date: Option<DateTime<Utc>>,
    pub priority: Option<i64>,
    pub flagged: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
enum CreateReport {
    #[serde(rename_all = "camelCase")]
    Created {
        count_before: u64,
        count_after: u64,
        reminder: ScriptReminder,
    },
    NoDefaultList,
}

/// Render `value` as a JavaScript string literal
///
/// JSON string syntax is valid JavaScript once the two line separators that
/// older engines reject inside literals are escaped as well.
pub fn js_string_literal(value: &str) -> String {
    serde_json::Value::String(value.to_owned())
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

fn list_script() -> String {
    format!("{}{}", READ_PROPS_FN, LIST_SCRIPT_BODY)
}

fn create_script(reminder: &NewReminder) -> String {
    let body = reminder
        .body()
        .map(js_string_literal)
        .unwrap_or_else(|| "null".to_string());
    format!(
        "const NAME = {};\nconst BODY = {};\n{}{}",
        js_string_literal(reminder.name()),
        body,
        READ_PROPS_FN,
        CREATE_SCRIPT_BODY
    )
}

/// Pull the trailing `(-1743)` style error number out of osascript stderr
fn script_error_code(stderr: &str) -> Option<i32> {
    static CODE: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = CODE
        .get_or_init(|| Regex::new(r"\((-?\d+)\)\s*$").ok())
        .as_ref()?;
    pattern
        .captures(stderr.trim_end())
        .and_then(|caps| caps.get(1))
        .and_then(|code| code.as_str().parse().ok())
}

fn classify_failure(output: &ScriptOutput) -> ReminderError {
    let message = output.stderr.trim().to_string();
    match script_error_code(&message) {
        Some(code) if NOT_PERMITTED_CODES.contains(&code) => {
            ReminderError::permission_denied(format!("automation not permitted ({})", code))
        }
        _ => ReminderError::Backend(BackendFailure::ScriptFailed {
            code: output.exit_code,
            message,
        }),
    }
}

/// Check the post-conditions of a create before reporting success
fn verify_created(
    request: &NewReminder,
    count_before: u64,
    count_after: u64,
    reminder: &ScriptReminder,
) -> ReminderResult<()> {
    if count_after != count_before + 1 {
        return Err(ReminderError::verification(format!(
            "default list held {} reminders before the insert and {} after",
            count_before, count_after
        )));
    }
    if reminder.id.as_deref().map_or(true, str::is_empty) {
        return Err(ReminderError::verification("created reminder has no id"));
    }
    if reminder.name.as_deref() != Some(request.name()) {
        return Err(ReminderError::verification(format!(
            "name read back as {:?}, expected {:?}",
            reminder.name,
            request.name()
        )));
    }
    let body_matches = match (request.body(), reminder.body.as_deref()) {
        (None, None) | (None, Some("")) => true,
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    };
    if !body_matches {
        return Err(ReminderError::verification(format!(
            "body read back as {:?}, expected {:?}",
            reminder.body,
            request.body()
        )));
    }
    Ok(())
}

/// Permission request for the scripting path: run a probe script
struct ScriptAccessProbe {
    runner: Arc<dyn ScriptRunner>,
    limit: Duration,
}

impl AccessRequester for ScriptAccessProbe {
    fn request_access(&self, completion: AccessCallback) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                completion(false, Some("no async runtime to run the access probe".to_string()));
                return;
            }
        };

        let runner = Arc::clone(&self.runner);
        let limit = self.limit;
        handle.spawn(async move {
            match runner.run(ACCESS_PROBE_SCRIPT, limit).await {
                Ok(output) if output.success => completion(true, None),
                Ok(output) => completion(false, Some(classify_failure(&output).to_string())),
                Err(e) => completion(false, Some(e.to_string())),
            }
        });
    }
}

/// Backend driving Reminders.app through osascript
pub struct ScriptingAdapter {
    runner: Arc<dyn ScriptRunner>,
    operation_timeout: Duration,
    access_timeout: Duration,
}

impl ScriptingAdapter {
    pub fn new(
        runner: Arc<dyn ScriptRunner>,
        operation_timeout: Duration,
        access_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            operation_timeout,
            access_timeout,
        }
    }

    async fn run_checked(&self, script: &str) -> ReminderResult<ScriptOutput> {
        let output = self.runner.run(script, self.operation_timeout).await?;
        if output.success {
            Ok(output)
        } else {
            Err(classify_failure(&output))
        }
    }
}

#[async_trait]
impl BackendAdapter for ScriptingAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Scripting
    }

    fn access_requester(&self) -> Arc<dyn AccessRequester> {
        Arc::new(ScriptAccessProbe {
            runner: Arc::clone(&self.runner),
            limit: self.access_timeout,
        })
    }

    async fn list(&self) -> ReminderResult<Vec<NativeRecord>> {
        let output = self.run_checked(&list_script()).await?;
        let reminders: Vec<ScriptReminder> = serde_json::from_str(output.stdout.trim())
            .map_err(|e| ReminderError::malformed(format!("reminder list: {}", e)))?;
        debug!("Script listed {} reminders", reminders.len());
        Ok(reminders.into_iter().map(NativeRecord::Script).collect())
    }

    async fn create(&self, reminder: &NewReminder) -> ReminderResult<NativeRecord> {
        let output = self.run_checked(&create_script(reminder)).await?;
        let report: CreateReport = serde_json::from_str(output.stdout.trim())
            .map_err(|e| ReminderError::verification(format!("unreadable create report: {}", e)))?;

        match report {
            CreateReport::NoDefaultList => Err(ReminderError::NoDefaultCollection),
            CreateReport::Created {
                count_before,
                count_after,
                reminder: created,
            } => {
                verify_created(reminder, count_before, count_after, &created)?;
                info!(
                    "Created reminder {} via script",
                    created.id.as_deref().unwrap_or_default()
                );
                Ok(NativeRecord::Script(created))
            }
        }
    }
}
