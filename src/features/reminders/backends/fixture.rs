//! # Fixture Store
//!
//! In-process reminder store seeded from YAML. It implements both the object
//! graph and the event store, so either adapter can run on hosts without the
//! native frameworks, and it can be told to misbehave (deny or ignore the
//! permission prompt, never finish a fetch, lose or mangle writes).
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0
//!
//! ```yaml
//! default_list: Home
//! behavior:
//!   access: grant        # grant | deny | never
//!   delivery: background # inline | background
//! lists:
//!   - name: Home
//!     reminders:
//!       - name: Water plants
//!         due_date: 2024-05-01T08:00:00Z
//!         priority: 1
//! ```

use crate::features::reminders::access::{AccessCallback, AccessRequester};
use crate::features::reminders::backends::event_store::{
    CalendarRef, DueDateComponents, EventAlarm, EventReminder, EventStore, FetchCallback,
    ReminderDraft, ReminderPredicate,
};
use crate::features::reminders::backends::object_graph::{
    date_property, flag_property, integer_property, text_property, ItemRef, ListRef, ObjectGraph,
    PropertyMap, PropertyValue,
};
use crate::features::reminders::backends::NativeError;
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use dashmap::DashMap;
use log::debug;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// How the store answers the permission request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessReply {
    #[default]
    Grant,
    Deny,
    /// Keep the completion forever and never call it
    Never,
}

/// Where completions run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Delivery {
    /// On the calling thread, before the request returns
    #[default]
    Inline,
    /// On a separate notification thread
    Background,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FixtureBehavior {
    pub access: AccessReply,
    pub delivery: Delivery,
    /// Fetches never call their completion
    pub fetch_hangs: bool,
    /// Writes report success but store nothing
    pub drop_writes: bool,
    /// Writes store a different name than requested
    pub corrupt_writes: bool,
    /// Setting this property key fails
    pub fail_property: Option<String>,
}

/// On-disk fixture format
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    /// Name of the default list; the first list when unset
    pub default_list: Option<String>,
    pub lists: Vec<FixtureList>,
    pub behavior: FixtureBehavior,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureList {
    pub name: String,
    #[serde(default)]
    pub reminders: Vec<FixtureReminder>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixtureReminder {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub allday_due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub remind_me_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub flagged: bool,
}

struct StoredList {
    id: String,
    name: String,
    items: Vec<String>,
}

impl StoredList {
    fn calendar(&self) -> CalendarRef {
        CalendarRef {
            identifier: self.id.clone(),
            title: self.name.clone(),
        }
    }
}

fn new_reminder_id() -> String {
    format!(
        "x-apple-reminder://{}",
        uuid::Uuid::new_v4().to_string().to_uppercase()
    )
}

fn new_list_id() -> String {
    format!(
        "x-apple-reminder-list://{}",
        uuid::Uuid::new_v4().to_string().to_uppercase()
    )
}

fn optional(value: Option<impl Into<PropertyValue>>) -> PropertyValue {
    value.map_or(PropertyValue::Missing, Into::into)
}

fn blank_properties(id: &str) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert("id".to_string(), PropertyValue::Text(id.to_string()));
    props.insert("name".to_string(), PropertyValue::Missing);
    props.insert("body".to_string(), PropertyValue::Missing);
    props.insert("completed".to_string(), PropertyValue::Flag(false));
    props.insert("completionDate".to_string(), PropertyValue::Missing);
    props.insert("dueDate".to_string(), PropertyValue::Missing);
    props.insert("alldayDueDate".to_string(), PropertyValue::Missing);
    props.insert("remindMeDate".to_string(), PropertyValue::Missing);
    props.insert("priority".to_string(), PropertyValue::Integer(0));
    props.insert("flagged".to_string(), PropertyValue::Flag(false));
    props
}

fn fixture_properties(id: &str, reminder: &FixtureReminder) -> PropertyMap {
    let mut props = blank_properties(id);
    props.insert("name".to_string(), PropertyValue::Text(reminder.name.clone()));
    props.insert("body".to_string(), optional(reminder.body.clone()));
    props.insert("completed".to_string(), PropertyValue::Flag(reminder.completed));
    props.insert("completionDate".to_string(), optional(reminder.completion_date));
    props.insert("dueDate".to_string(), optional(reminder.due_date));
    props.insert("alldayDueDate".to_string(), optional(reminder.allday_due_date));
    props.insert("remindMeDate".to_string(), optional(reminder.remind_me_date));
    props.insert("priority".to_string(), PropertyValue::Integer(reminder.priority));
    props.insert("flagged".to_string(), PropertyValue::Flag(reminder.flagged));
    props
}

fn components(date: DateTime<Utc>, with_time: bool) -> DueDateComponents {
    DueDateComponents {
        year: date.year(),
        month: date.month(),
        day: date.day(),
        hour: with_time.then(|| date.hour()),
        minute: with_time.then(|| date.minute()),
    }
}

/// Present a stored item the way the event store would
fn event_view(props: &PropertyMap, calendar: CalendarRef) -> EventReminder {
    let due_date_components = match date_property(props, "alldayDueDate") {
        Some(allday) => Some(components(allday, false)),
        None => date_property(props, "dueDate").map(|due| components(due, true)),
    };
    EventReminder {
        calendar_item_identifier: text_property(props, "id").unwrap_or_default(),
        title: text_property(props, "name"),
        notes: text_property(props, "body"),
        is_completed: flag_property(props, "completed").unwrap_or(false),
        completion_date: date_property(props, "completionDate"),
        due_date_components,
        alarms: date_property(props, "remindMeDate")
            .map(|date| EventAlarm {
                absolute_date: Some(date),
            })
            .into_iter()
            .collect(),
        priority: integer_property(props, "priority").unwrap_or(0),
        calendar,
    }
}

/// In-process reminder store
pub struct FixtureStore {
    lists: Mutex<Vec<StoredList>>,
    items: DashMap<String, PropertyMap>,
    drafts: DashMap<String, PropertyMap>,
    default_list: Option<String>,
    behavior: FixtureBehavior,
    access_requests: AtomicUsize,
    writes: AtomicUsize,
    parked_access: Mutex<Vec<AccessCallback>>,
    parked_fetches: Mutex<Vec<FetchCallback>>,
}

impl FixtureStore {
    /// Load a YAML fixture file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        let fixture: Fixture = serde_yaml::from_str(&contents)
            .with_context(|| format!("Invalid fixture {}", path.display()))?;
        Self::from_fixture(fixture)
    }

    pub fn from_fixture(fixture: Fixture) -> Result<Self> {
        let names: Vec<&str> = fixture.lists.iter().map(|l| l.name.as_str()).collect();
        let mut store = Self::with_lists(&names, fixture.behavior.clone());

        if let Some(default_name) = &fixture.default_list {
            let id = store
                .list_id(default_name)
                .ok_or_else(|| anyhow::anyhow!("Default list '{}' is not defined", default_name))?;
            store.default_list = Some(id);
        }

        for list in &fixture.lists {
            for reminder in &list.reminders {
                store.seed_reminder(&list.name, reminder);
            }
        }
        debug!(
            "Loaded fixture with {} lists and {} reminders",
            fixture.lists.len(),
            store.items.len()
        );
        Ok(store)
    }

    /// Empty lists with these names; the first one is the default
    pub fn with_lists(names: &[&str], behavior: FixtureBehavior) -> Self {
        let lists: Vec<StoredList> = names
            .iter()
            .map(|name| StoredList {
                id: new_list_id(),
                name: name.to_string(),
                items: Vec::new(),
            })
            .collect();
        let default_list = lists.first().map(|l| l.id.clone());

        Self {
            lists: Mutex::new(lists),
            items: DashMap::new(),
            drafts: DashMap::new(),
            default_list,
            behavior,
            access_requests: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            parked_access: Mutex::new(Vec::new()),
            parked_fetches: Mutex::new(Vec::new()),
        }
    }

    /// Add a plain reminder to a named list; returns its id
    pub fn seed(&self, list_name: &str, name: &str, body: Option<&str>) -> Option<String> {
        self.seed_reminder(
            list_name,
            &FixtureReminder {
                name: name.to_string(),
                body: body.map(str::to_string),
                ..FixtureReminder::default()
            },
        )
    }

    /// Add a fully specified reminder to a named list; returns its id
    pub fn seed_reminder(&self, list_name: &str, reminder: &FixtureReminder) -> Option<String> {
        let mut lists = self.lock_lists();
        let list = lists.iter_mut().find(|l| l.name == list_name)?;
        let id = reminder.id.clone().unwrap_or_else(new_reminder_id);
        self.items
            .insert(id.clone(), fixture_properties(&id, reminder));
        list.items.push(id.clone());
        Some(id)
    }

    /// Number of native permission requests received
    pub fn access_requests(&self) -> usize {
        self.access_requests.load(Ordering::SeqCst)
    }

    /// Number of insert/save calls received
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn list_id(&self, name: &str) -> Option<String> {
        self.lock_lists()
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.id.clone())
    }

    fn lock_lists(&self) -> MutexGuard<'_, Vec<StoredList>> {
        self.lists.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn deliver(&self, completion: impl FnOnce() + Send + 'static) {
        match self.behavior.delivery {
            Delivery::Inline => completion(),
            Delivery::Background => {
                std::thread::spawn(completion);
            }
        }
    }

    fn mangle(&self, name: &str) -> String {
        if self.behavior.corrupt_writes {
            name.chars().rev().chain("?".chars()).collect()
        } else {
            name.to_string()
        }
    }
}

impl AccessRequester for FixtureStore {
    fn request_access(&self, completion: AccessCallback) {
        self.access_requests.fetch_add(1, Ordering::SeqCst);
        match self.behavior.access {
            AccessReply::Grant => self.deliver(move || completion(true, None)),
            AccessReply::Deny => self.deliver(move || {
                completion(false, Some("the user declined access to reminders".to_string()))
            }),
            AccessReply::Never => self
                .parked_access
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(completion),
        }
    }
}

impl ObjectGraph for FixtureStore {
    fn lists(&self) -> Result<Vec<ListRef>, NativeError> {
        Ok(self
            .lock_lists()
            .iter()
            .map(|l| ListRef(l.id.clone()))
            .collect())
    }

    fn items(&self, list: &ListRef) -> Result<Vec<ItemRef>, NativeError> {
        self.lock_lists()
            .iter()
            .find(|l| l.id == list.0)
            .map(|l| l.items.iter().cloned().map(ItemRef).collect())
            .ok_or_else(|| NativeError::new(format!("no such list: {}", list.0)))
    }

    fn properties(&self, item: &ItemRef) -> Result<PropertyMap, NativeError> {
        self.items
            .get(&item.0)
            .map(|props| props.clone())
            .ok_or_else(|| NativeError::new(format!("no such reminder: {}", item.0)))
    }

    fn default_list(&self) -> Result<Option<ListRef>, NativeError> {
        Ok(self.default_list.clone().map(ListRef))
    }

    fn new_item(&self) -> Result<ItemRef, NativeError> {
        let id = new_reminder_id();
        self.drafts.insert(id.clone(), blank_properties(&id));
        Ok(ItemRef(id))
    }

    fn set_property(
        &self,
        item: &ItemRef,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), NativeError> {
        if self.behavior.fail_property.as_deref() == Some(key) {
            return Err(NativeError::new(format!("cannot set property '{}'", key)));
        }
        let value = match value {
            PropertyValue::Text(text) if key == "name" => PropertyValue::Text(self.mangle(&text)),
            other => other,
        };
        if let Some(mut draft) = self.drafts.get_mut(&item.0) {
            draft.insert(key.to_string(), value);
            return Ok(());
        }
        if let Some(mut stored) = self.items.get_mut(&item.0) {
            stored.insert(key.to_string(), value);
            return Ok(());
        }
        Err(NativeError::new(format!("no such reminder: {}", item.0)))
    }

    fn insert(&self, list: &ListRef, item: &ItemRef) -> Result<(), NativeError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let (id, props) = self
            .drafts
            .remove(&item.0)
            .ok_or_else(|| NativeError::new(format!("no such draft: {}", item.0)))?;
        if self.behavior.drop_writes {
            debug!("Dropping write of {}", id);
            return Ok(());
        }

        let mut lists = self.lock_lists();
        let target = lists
            .iter_mut()
            .find(|l| l.id == list.0)
            .ok_or_else(|| NativeError::new(format!("no such list: {}", list.0)))?;
        self.items.insert(id.clone(), props);
        target.items.push(id);
        Ok(())
    }

    fn commit(&self) -> Result<(), NativeError> {
        Ok(())
    }
}

impl EventStore for FixtureStore {
    fn reminder_calendars(&self) -> Vec<CalendarRef> {
        self.lock_lists().iter().map(StoredList::calendar).collect()
    }

    fn fetch_reminders(&self, predicate: ReminderPredicate, completion: FetchCallback) {
        if self.behavior.fetch_hangs {
            self.parked_fetches
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(completion);
            return;
        }

        let mut matched = Vec::new();
        for list in self.lock_lists().iter() {
            for id in &list.items {
                if let Some(props) = self.items.get(id) {
                    let reminder = event_view(&props, list.calendar());
                    if predicate.admits(&reminder) {
                        matched.push(reminder);
                    }
                }
            }
        }
        self.deliver(move || completion(Some(matched)));
    }

    fn default_calendar_for_new_reminders(&self) -> Option<CalendarRef> {
        let default_id = self.default_list.as_ref()?;
        self.lock_lists()
            .iter()
            .find(|l| &l.id == default_id)
            .map(StoredList::calendar)
    }

    fn save_reminder(&self, draft: &ReminderDraft, _commit: bool) -> Result<String, NativeError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let id = new_reminder_id();
        if self.behavior.drop_writes {
            debug!("Dropping save of {}", id);
            return Ok(id);
        }

        let mut props = blank_properties(&id);
        props.insert(
            "name".to_string(),
            PropertyValue::Text(self.mangle(&draft.title)),
        );
        props.insert("body".to_string(), optional(draft.notes.clone()));

        let mut lists = self.lock_lists();
        let target = lists
            .iter_mut()
            .find(|l| l.id == draft.calendar.identifier)
            .ok_or_else(|| {
                NativeError::new(format!("no such calendar: {}", draft.calendar.title))
            })?;
        self.items.insert(id.clone(), props);
        target.items.push(id.clone());
        Ok(id)
    }

    fn reminder_with_identifier(&self, identifier: &str) -> Option<EventReminder> {
        let props = self.items.get(identifier)?.clone();
        let lists = self.lock_lists();
        let list = lists
            .iter()
            .find(|l| l.items.iter().any(|id| id == identifier))?;
        Some(event_view(&props, list.calendar()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FIXTURE: &str = r#"
default_list: Home
behavior:
  access: deny
  delivery: background
lists:
  - name: Work
    reminders:
      - name: Report
        priority: 1
  - name: Home
    reminders:
      - id: x-apple-reminder://FIXED
        name: Water plants
        body: Twice a week
        completed: true
        completion_date: 2024-04-30T18:00:00Z
        allday_due_date: 2024-05-01T00:00:00Z
        remind_me_date: 2024-05-01T08:00:00Z
"#;

    fn parse(yaml: &str) -> Result<FixtureStore> {
        FixtureStore::from_fixture(serde_yaml::from_str(yaml)?)
    }

    #[test]
    fn test_loads_lists_behavior_and_default() {
        let store = parse(FIXTURE).unwrap();
        assert_eq!(store.behavior.access, AccessReply::Deny);
        assert_eq!(store.behavior.delivery, Delivery::Background);
        assert_eq!(
            store.default_calendar_for_new_reminders().unwrap().title,
            "Home"
        );

        let props = store
            .properties(&ItemRef("x-apple-reminder://FIXED".to_string()))
            .unwrap();
        assert_eq!(text_property(&props, "body").as_deref(), Some("Twice a week"));
        assert_eq!(flag_property(&props, "completed"), Some(true));
    }

    #[test]
    fn test_unknown_default_list_is_rejected() {
        assert!(parse("default_list: Nowhere\nlists:\n  - name: Home\n").is_err());
    }

    #[test]
    fn test_event_view_of_allday_reminder() {
        let store = parse(FIXTURE).unwrap();
        let reminder = store
            .reminder_with_identifier("x-apple-reminder://FIXED")
            .unwrap();

        assert_eq!(reminder.calendar.title, "Home");
        assert_eq!(
            reminder.due_date_components,
            Some(DueDateComponents {
                year: 2024,
                month: 5,
                day: 1,
                hour: None,
                minute: None,
            })
        );
        assert_eq!(
            reminder.alarms[0].absolute_date,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parked_access_request_is_counted() {
        let store = FixtureStore::with_lists(
            &["Home"],
            FixtureBehavior {
                access: AccessReply::Never,
                ..FixtureBehavior::default()
            },
        );
        store.request_access(Box::new(|_: bool, _: Option<String>| {
            panic!("must not be called")
        }));
        assert_eq!(store.access_requests(), 1);
        assert_eq!(store.parked_access.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_draft_is_invisible_until_inserted() {
        let store = FixtureStore::with_lists(&["Home"], FixtureBehavior::default());
        let list = store.default_list().unwrap().unwrap();

        let item = store.new_item().unwrap();
        store
            .set_property(&item, "name", PropertyValue::Text("Draft".to_string()))
            .unwrap();
        assert!(store.items(&list).unwrap().is_empty());

        store.insert(&list, &item).unwrap();
        assert_eq!(store.items(&list).unwrap(), vec![item]);
        assert_eq!(store.write_count(), 1);
    }
}
