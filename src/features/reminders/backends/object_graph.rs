//! # Object Graph Backend
//!
//! Works against a scriptable object model directly: lists contain reminder
//! items, items expose a property dictionary, and new items are built as a
//! detached node, filled in by key, inserted into a list, then committed.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.2.0

use crate::core::error::{ReminderError, ReminderResult};
use crate::features::reminders::access::AccessRequester;
use crate::features::reminders::backends::{BackendAdapter, BackendKind, NativeError};
use crate::features::reminders::normalizer::NativeRecord;
use crate::features::reminders::record::NewReminder;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A property value as the object model reports it
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// The model's "missing value"
    Missing,
    Text(String),
    Flag(bool),
    Integer(i64),
    Date(DateTime<Utc>),
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Date(value)
    }
}

/// An item's properties, keyed by scripting name (`name`, `dueDate`, ...)
pub type PropertyMap = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListRef(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemRef(pub String);

/// The native object model
pub trait ObjectGraph: AccessRequester {
    fn lists(&self) -> Result<Vec<ListRef>, NativeError>;
    fn items(&self, list: &ListRef) -> Result<Vec<ItemRef>, NativeError>;
    fn properties(&self, item: &ItemRef) -> Result<PropertyMap, NativeError>;
    fn default_list(&self) -> Result<Option<ListRef>, NativeError>;

    /// A new reminder node, not yet part of any list
    fn new_item(&self) -> Result<ItemRef, NativeError>;
    fn set_property(&self, item: &ItemRef, key: &str, value: PropertyValue)
        -> Result<(), NativeError>;
    fn insert(&self, list: &ListRef, item: &ItemRef) -> Result<(), NativeError>;
    fn commit(&self) -> Result<(), NativeError>;
}

// Typed reads; any other variant, including `Missing`, reads as absent.

pub(crate) fn text_property(props: &PropertyMap, key: &str) -> Option<String> {
    match props.get(key) {
        Some(PropertyValue::Text(text)) => Some(text.clone()),
        _ => None,
    }
}

pub(crate) fn flag_property(props: &PropertyMap, key: &str) -> Option<bool> {
    match props.get(key) {
        Some(PropertyValue::Flag(flag)) => Some(*flag),
        _ => None,
    }
}

pub(crate) fn integer_property(props: &PropertyMap, key: &str) -> Option<i64> {
    match props.get(key) {
        Some(PropertyValue::Integer(value)) => Some(*value),
        _ => None,
    }
}

pub(crate) fn date_property(props: &PropertyMap, key: &str) -> Option<DateTime<Utc>> {
    match props.get(key) {
        Some(PropertyValue::Date(date)) => Some(*date),
        _ => None,
    }
}

/// Backend over an `ObjectGraph`
pub struct ObjectGraphAdapter<G> {
    graph: Arc<G>,
}

impl<G: ObjectGraph + 'static> ObjectGraphAdapter<G> {
    pub fn new(graph: Arc<G>) -> Self {
        Self { graph }
    }

    /// Build the node and fill it in; nothing is persisted if this fails
    fn build_item(&self, reminder: &NewReminder) -> Result<ItemRef, NativeError> {
        let item = self.graph.new_item()?;
        self.graph.set_property(
            &item,
            "name",
            PropertyValue::Text(reminder.name().to_string()),
        )?;
        if let Some(body) = reminder.body() {
            self.graph
                .set_property(&item, "body", PropertyValue::Text(body.to_string()))?;
        }
        self.graph
            .set_property(&item, "completed", PropertyValue::Flag(false))?;
        Ok(item)
    }

    /// Confirm the insert landed and the fields read back as written
    fn verify(
        &self,
        reminder: &NewReminder,
        list: &ListRef,
        item: &ItemRef,
        count_before: usize,
    ) -> ReminderResult<PropertyMap> {
        let unverifiable =
            |e: NativeError| ReminderError::verification(format!("could not read back insert: {}", e));

        let items = self.graph.items(list).map_err(unverifiable)?;
        if items.len() != count_before + 1 || !items.contains(item) {
            return Err(ReminderError::verification(format!(
                "default list held {} reminders before the insert and {} after",
                count_before,
                items.len()
            )));
        }

        let props = self.graph.properties(item).map_err(unverifiable)?;
        if text_property(&props, "id").map_or(true, |id| id.is_empty()) {
            return Err(ReminderError::verification("created reminder has no id"));
        }
        if text_property(&props, "name").as_deref() != Some(reminder.name()) {
            return Err(ReminderError::verification(format!(
                "name read back as {:?}, expected {:?}",
                props.get("name"),
                reminder.name()
            )));
        }
        let body = text_property(&props, "body");
        let body_matches = match (reminder.body(), body.as_deref()) {
            (None, None) | (None, Some("")) => true,
            (Some(expected), Some(actual)) => expected == actual,
            _ => false,
        };
        if !body_matches {
            return Err(ReminderError::verification(format!(
                "body read back as {:?}, expected {:?}",
                body,
                reminder.body()
            )));
        }
        Ok(props)
    }
}

#[async_trait]
impl<G: ObjectGraph + 'static> BackendAdapter for ObjectGraphAdapter<G> {
    fn kind(&self) -> BackendKind {
        BackendKind::ObjectGraph
    }

    fn access_requester(&self) -> Arc<dyn AccessRequester> {
        self.graph.clone()
    }

    async fn list(&self) -> ReminderResult<Vec<NativeRecord>> {
        let mut records = Vec::new();
        for list in self.graph.lists()? {
            for item in self.graph.items(&list)? {
                records.push(NativeRecord::Object(self.graph.properties(&item)?));
            }
        }
        debug!("Object graph listed {} reminders", records.len());
        Ok(records)
    }

    async fn create(&self, reminder: &NewReminder) -> ReminderResult<NativeRecord> {
        let list = self
            .graph
            .default_list()?
            .ok_or(ReminderError::NoDefaultCollection)?;
        let count_before = self.graph.items(&list)?.len();

        let item = self.build_item(reminder)?;

        // From here on native storage may already be mutated
        self.graph.insert(&list, &item).map_err(|e| {
            ReminderError::verification(format!("insert into {} failed: {}", list.0, e))
        })?;
        self.graph.commit().map_err(|e| {
            ReminderError::verification(format!("commit after insert failed: {}", e))
        })?;

        match self.verify(reminder, &list, &item, count_before) {
            Ok(props) => {
                info!("Created reminder {} in list {}", item.0, list.0);
                Ok(NativeRecord::Object(props))
            }
            Err(e) => {
                warn!("Insert into {} not confirmed: {}", list.0, e);
                Err(e)
            }
        }
    }
}
