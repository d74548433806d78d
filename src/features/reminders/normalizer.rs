//! # Normalizer
//!
//! Maps each backend's native reminder shape onto `Record`. The mapping is
//! total: native values that are missing or of an unexpected type become the
//! record's defaults instead of errors.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Event-store reminders, including all-day due dates and alarms
//! - 1.0.0: Scripting and object-graph shapes

use crate::features::reminders::backends::event_store::{DueDateComponents, EventReminder};
use crate::features::reminders::backends::object_graph::{
    date_property, flag_property, integer_property, text_property, PropertyMap,
};
use crate::features::reminders::backends::scripting::ScriptReminder;
use crate::features::reminders::record::Record;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use log::debug;

/// A reminder as one backend returned it
#[derive(Debug, Clone)]
pub enum NativeRecord {
    Script(ScriptReminder),
    Object(PropertyMap),
    Event(EventReminder),
}

pub fn to_record(native: NativeRecord) -> Record {
    match native {
        NativeRecord::Script(reminder) => from_script(reminder),
        NativeRecord::Object(props) => from_properties(&props),
        NativeRecord::Event(reminder) => from_event(reminder),
    }
}

fn from_script(reminder: ScriptReminder) -> Record {
    Record {
        id: reminder.id.filter(|id| !id.is_empty()),
        name: reminder.name.unwrap_or_default(),
        body: reminder.body,
        completed: reminder.completed.unwrap_or(false),
        completion_date: reminder.completion_date,
        due_date: reminder.due_date,
        allday_due_date: reminder.allday_due_date,
        remind_me_date: reminder.remind_me_date,
        priority: reminder.priority.unwrap_or(0),
        flagged: reminder.flagged.unwrap_or(false),
    }
}

fn from_properties(props: &PropertyMap) -> Record {
    Record {
        id: text_property(props, "id").filter(|id| !id.is_empty()),
        name: text_property(props, "name").unwrap_or_default(),
        body: text_property(props, "body"),
        completed: flag_property(props, "completed").unwrap_or(false),
        completion_date: date_property(props, "completionDate"),
        due_date: date_property(props, "dueDate"),
        allday_due_date: date_property(props, "alldayDueDate"),
        remind_me_date: date_property(props, "remindMeDate"),
        priority: integer_property(props, "priority").unwrap_or(0),
        flagged: flag_property(props, "flagged").unwrap_or(false),
    }
}

fn from_event(reminder: EventReminder) -> Record {
    let (due_date, allday_due_date) = match reminder.due_date_components {
        Some(components) => due_dates(&components),
        None => (None, None),
    };
    let remind_me_date = reminder
        .alarms
        .iter()
        .find_map(|alarm| alarm.absolute_date);

    Record {
        id: Some(reminder.calendar_item_identifier).filter(|id| !id.is_empty()),
        name: reminder.title.unwrap_or_default(),
        body: reminder.notes,
        completed: reminder.is_completed,
        completion_date: reminder.completion_date,
        due_date,
        allday_due_date,
        remind_me_date,
        priority: reminder.priority,
        // The event store keeps no flag
        flagged: false,
    }
}

/// `(dueDate, alldayDueDate)` for a set of due components, read as UTC
///
/// Components without an hour are all-day: both dates are that day's
/// midnight. Components that name no real date yield neither.
fn due_dates(components: &DueDateComponents) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let Some(day) = NaiveDate::from_ymd_opt(components.year, components.month, components.day)
    else {
        debug!("Ignoring invalid due date components {:?}", components);
        return (None, None);
    };

    match components.hour {
        Some(hour) => {
            let at = day
                .and_hms_opt(hour, components.minute.unwrap_or(0), 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
            (at, None)
        }
        None => {
            let midnight = day
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
            (midnight, midnight)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::reminders::backends::event_store::{CalendarRef, EventAlarm};
    use crate::features::reminders::backends::object_graph::PropertyValue;

    const KEYS: [&str; 10] = [
        "id",
        "name",
        "body",
        "completed",
        "completionDate",
        "dueDate",
        "alldayDueDate",
        "remindMeDate",
        "priority",
        "flagged",
    ];

    fn event(components: Option<DueDateComponents>, alarms: Vec<EventAlarm>) -> EventReminder {
        EventReminder {
            calendar_item_identifier: "ABC-123".to_string(),
            title: Some("Pay rent".to_string()),
            notes: None,
            is_completed: false,
            completion_date: None,
            due_date_components: components,
            alarms,
            priority: 1,
            calendar: CalendarRef {
                identifier: "cal".to_string(),
                title: "Reminders".to_string(),
            },
        }
    }

    fn assert_schema(record: &Record) {
        let value = serde_json::to_value(record).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), KEYS.len());
        for key in KEYS {
            assert!(object.contains_key(key), "missing key {}", key);
        }
    }

    #[test]
    fn test_empty_script_reminder_gets_defaults() {
        let record = to_record(NativeRecord::Script(ScriptReminder::default()));
        assert_eq!(record, Record::unsaved(""));
        assert_schema(&record);
    }

    #[test]
    fn test_script_reminder_fields() {
        let due = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let record = to_record(NativeRecord::Script(ScriptReminder {
            id: Some("x-apple-reminder://1".to_string()),
            name: Some("Call mum".to_string()),
            body: Some("about Sunday".to_string()),
            completed: Some(true),
            due_date: Some(due),
            priority: Some(5),
            flagged: Some(true),
            ..ScriptReminder::default()
        }));

        assert_eq!(record.id.as_deref(), Some("x-apple-reminder://1"));
        assert_eq!(record.name, "Call mum");
        assert!(record.completed);
        assert!(record.flagged);
        assert_eq!(record.due_date, Some(due));
        assert_eq!(record.priority, 5);
    }

    #[test]
    fn test_missing_and_mistyped_properties() {
        let mut props = PropertyMap::new();
        props.insert("name".to_string(), PropertyValue::Text("Milk".to_string()));
        props.insert("body".to_string(), PropertyValue::Missing);
        props.insert("completed".to_string(), PropertyValue::Text("yes".to_string()));
        props.insert("priority".to_string(), PropertyValue::Missing);

        let record = to_record(NativeRecord::Object(props));
        assert_eq!(record.name, "Milk");
        assert_eq!(record.body, None);
        assert!(!record.completed);
        assert_eq!(record.priority, 0);
        assert_eq!(record.id, None);
        assert_schema(&record);
    }

    #[test]
    fn test_timed_event_due_date() {
        let record = to_record(NativeRecord::Event(event(
            Some(DueDateComponents {
                year: 2024,
                month: 3,
                day: 15,
                hour: Some(17),
                minute: Some(45),
            }),
            Vec::new(),
        )));

        assert_eq!(
            record.due_date,
            Some(Utc.with_ymd_and_hms(2024, 3, 15, 17, 45, 0).unwrap())
        );
        assert_eq!(record.allday_due_date, None);
        assert_eq!(record.id.as_deref(), Some("ABC-123"));
        assert!(!record.flagged);
    }

    #[test]
    fn test_allday_event_due_date() {
        let record = to_record(NativeRecord::Event(event(
            Some(DueDateComponents {
                year: 2024,
                month: 3,
                day: 15,
                hour: None,
                minute: None,
            }),
            Vec::new(),
        )));

        let midnight = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(record.due_date, Some(midnight));
        assert_eq!(record.allday_due_date, Some(midnight));
    }

    #[test]
    fn test_invalid_components_are_dropped() {
        let record = to_record(NativeRecord::Event(event(
            Some(DueDateComponents {
                year: 2024,
                month: 2,
                day: 31,
                hour: Some(8),
                minute: None,
            }),
            Vec::new(),
        )));
        assert_eq!(record.due_date, None);
        assert_eq!(record.allday_due_date, None);
    }

    #[test]
    fn test_first_absolute_alarm_is_remind_date() {
        let alarm = Utc.with_ymd_and_hms(2024, 3, 14, 8, 0, 0).unwrap();
        let record = to_record(NativeRecord::Event(event(
            None,
            vec![
                EventAlarm {
                    absolute_date: None,
                },
                EventAlarm {
                    absolute_date: Some(alarm),
                },
            ],
        )));
        assert_eq!(record.remind_me_date, Some(alarm));
    }

    #[test]
    fn test_untitled_event_has_empty_name() {
        let mut reminder = event(None, Vec::new());
        reminder.title = None;
        reminder.calendar_item_identifier.clear();

        let record = to_record(NativeRecord::Event(reminder));
        assert_eq!(record.name, "");
        assert_eq!(record.id, None);
        assert_schema(&record);
    }
}
