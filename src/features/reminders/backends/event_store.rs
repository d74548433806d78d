//! # Event Store Backend
//!
//! Calendar-style store: reminders live in calendars, are fetched through a
//! predicate with an asynchronous completion, and are saved as drafts that
//! the store assigns an identifier to.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.2.0
//!
//! ## Changelog
//! - 1.2.0: Narrow fetches by completion state when the caller pins it
//! - 1.1.0: Fetch completed reminders too, not only incomplete ones
//! - 1.0.0: Initial release

use crate::core::error::{ReminderError, ReminderResult};
use crate::features::reminders::access::AccessRequester;
use crate::features::reminders::backends::{BackendAdapter, BackendKind, NativeError};
use crate::features::reminders::bridge::{await_completion, Outcome, Resolver};
use crate::features::reminders::normalizer::NativeRecord;
use crate::features::reminders::record::NewReminder;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CalendarRef {
    pub identifier: String,
    pub title: String,
}

/// Calendar date components of a due date; no hour means all-day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueDateComponents {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAlarm {
    /// `None` for alarms relative to the due date
    pub absolute_date: Option<DateTime<Utc>>,
}

/// A reminder as the event store reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReminder {
    pub calendar_item_identifier: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub is_completed: bool,
    pub completion_date: Option<DateTime<Utc>>,
    pub due_date_components: Option<DueDateComponents>,
    pub alarms: Vec<EventAlarm>,
    /// 0 = none, 1 (high) through 9 (low)
    pub priority: i64,
    pub calendar: CalendarRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionScope {
    Any,
    Incomplete,
    Completed,
}

impl CompletionScope {
    pub fn from_completed(completed: Option<bool>) -> Self {
        match completed {
            None => CompletionScope::Any,
            Some(false) => CompletionScope::Incomplete,
            Some(true) => CompletionScope::Completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPredicate {
    pub calendars: Vec<CalendarRef>,
    pub scope: CompletionScope,
}

impl ReminderPredicate {
    pub fn admits(&self, reminder: &EventReminder) -> bool {
        let in_calendar = self.calendars.contains(&reminder.calendar);
        in_calendar
            && match self.scope {
                CompletionScope::Any => true,
                CompletionScope::Incomplete => !reminder.is_completed,
                CompletionScope::Completed => reminder.is_completed,
            }
    }
}

/// Fields of a reminder about to be saved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderDraft {
    pub title: String,
    pub notes: Option<String>,
    pub calendar: CalendarRef,
}

/// Completion of a fetch; `None` means the store could not answer
pub type FetchCallback = Box<dyn FnOnce(Option<Vec<EventReminder>>) + Send + 'static>;

/// The native event store
pub trait EventStore: AccessRequester {
    fn reminder_calendars(&self) -> Vec<CalendarRef>;
    fn fetch_reminders(&self, predicate: ReminderPredicate, completion: FetchCallback);
    fn default_calendar_for_new_reminders(&self) -> Option<CalendarRef>;
    /// Save a draft and return the identifier the store assigned
    fn save_reminder(&self, draft: &ReminderDraft, commit: bool) -> Result<String, NativeError>;
    fn reminder_with_identifier(&self, identifier: &str) -> Option<EventReminder>;
}

/// Backend over an `EventStore`
pub struct EventStoreAdapter<S> {
    store: Arc<S>,
    operation_timeout: Duration,
}

impl<S: EventStore + 'static> EventStoreAdapter<S> {
    pub fn new(store: Arc<S>, operation_timeout: Duration) -> Self {
        Self {
            store,
            operation_timeout,
        }
    }

    async fn fetch(&self, scope: CompletionScope) -> ReminderResult<Vec<NativeRecord>> {
        let predicate = ReminderPredicate {
            calendars: self.store.reminder_calendars(),
            scope,
        };
        debug!(
            "Fetching {:?} reminders from {} calendars",
            scope,
            predicate.calendars.len()
        );

        let store = Arc::clone(&self.store);
        let outcome = await_completion(
            move |resolver: Resolver<Option<Vec<EventReminder>>>| {
                store.fetch_reminders(
                    predicate,
                    Box::new(move |reminders: Option<Vec<EventReminder>>| {
                        resolver.resolve(reminders);
                    }),
                );
            },
            self.operation_timeout,
        )
        .await;

        match outcome {
            Outcome::Resolved(Some(reminders)) => {
                debug!("Event store returned {} reminders", reminders.len());
                Ok(reminders.into_iter().map(NativeRecord::Event).collect())
            }
            Outcome::Resolved(None) => Err(ReminderError::native("reminder fetch returned no result")),
            Outcome::TimedOut => {
                warn!(
                    "Reminder fetch did not complete within {}s",
                    self.operation_timeout.as_secs()
                );
                Err(ReminderError::timeout("fetch reminders", self.operation_timeout))
            }
            Outcome::Abandoned => Err(ReminderError::native(
                "reminder fetch completion was dropped without an answer",
            )),
        }
    }

    fn verify(&self, draft: &ReminderDraft, identifier: &str) -> ReminderResult<EventReminder> {
        if identifier.is_empty() {
            return Err(ReminderError::verification("store assigned an empty identifier"));
        }
        let saved = self
            .store
            .reminder_with_identifier(identifier)
            .ok_or_else(|| {
                ReminderError::verification(format!("reminder {} not found after save", identifier))
            })?;

        if saved.title.as_deref() != Some(draft.title.as_str()) {
            return Err(ReminderError::verification(format!(
                "title read back as {:?}, expected {:?}",
                saved.title, draft.title
            )));
        }
        let notes_match = match (draft.notes.as_deref(), saved.notes.as_deref()) {
            (None, None) | (None, Some("")) => true,
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        };
        if !notes_match {
            return Err(ReminderError::verification(format!(
                "notes read back as {:?}, expected {:?}",
                saved.notes, draft.notes
            )));
        }
        if saved.calendar != draft.calendar {
            return Err(ReminderError::verification(format!(
                "saved into calendar {}, expected {}",
                saved.calendar.title, draft.calendar.title
            )));
        }
        Ok(saved)
    }
}

#[async_trait]
impl<S: EventStore + 'static> BackendAdapter for EventStoreAdapter<S> {
    fn kind(&self) -> BackendKind {
        BackendKind::EventStore
    }

    fn access_requester(&self) -> Arc<dyn AccessRequester> {
        self.store.clone()
    }

    async fn list(&self) -> ReminderResult<Vec<NativeRecord>> {
        self.fetch(CompletionScope::Any).await
    }

    async fn list_scoped(&self, completed: Option<bool>) -> ReminderResult<Vec<NativeRecord>> {
        self.fetch(CompletionScope::from_completed(completed)).await
    }

    async fn create(&self, reminder: &NewReminder) -> ReminderResult<NativeRecord> {
        let calendar = self
            .store
            .default_calendar_for_new_reminders()
            .ok_or(ReminderError::NoDefaultCollection)?;

        let draft = ReminderDraft {
            title: reminder.name().to_string(),
            notes: reminder.body().map(str::to_string),
            calendar,
        };
        let identifier = self.store.save_reminder(&draft, true)?;

        let saved = self.verify(&draft, &identifier).map_err(|e| {
            warn!("Save into {} not confirmed: {}", draft.calendar.title, e);
            e
        })?;
        info!(
            "Created reminder {} in calendar {}",
            identifier, draft.calendar.title
        );
        Ok(NativeRecord::Event(saved))
    }
}
