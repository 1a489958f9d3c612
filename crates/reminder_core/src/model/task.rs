use crate::error::AppError;
use crate::model::ReminderRecord;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredTask", into = "StoredTask")]
pub struct Task {
    pub id: String,
    pub text: String,
    pub due_date: Option<DueDate>,
    pub completed: bool,
    pub reminders: BTreeMap<String, ReminderRecord>,
    /// Fields this service does not interpret; written back untouched.
    pub extra: Map<String, Value>,
    /// A stored `null` or blank due date, kept so it is written back as read.
    blank_due_date: Option<Value>,
}

/// The task as it appears in a document.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTask {
    #[serde(default)]
    id: String,
    #[serde(default)]
    text: String,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    due_date: Option<Value>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    reminders: BTreeMap<String, ReminderRecord>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<StoredTask> for Task {
    type Error = AppError;

    fn try_from(stored: StoredTask) -> Result<Self, Self::Error> {
        let (due_date, blank_due_date) = match stored.due_date {
            None => (None, None),
            Some(raw) => match DueDate::from_value(raw.clone())? {
                Some(due_date) => (Some(due_date), None),
                None => (None, Some(raw)),
            },
        };

        Ok(Self {
            id: stored.id,
            text: stored.text,
            due_date,
            completed: stored.completed,
            reminders: stored.reminders,
            extra: stored.extra,
            blank_due_date,
        })
    }
}

impl From<Task> for StoredTask {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            text: task.text,
            due_date: task
                .due_date
                .map(|due_date| due_date.raw)
                .or(task.blank_due_date),
            completed: task.completed,
            reminders: task.reminders,
            extra: task.extra,
        }
    }
}

/// Distinguishes an explicit `null` (`Some(Value::Null)`) from an absent
/// field, which `#[serde(default)]` leaves as `None`.
pub(crate) fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Task {
    pub fn new<I: Into<String>, T: Into<String>>(id: I, text: T) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            due_date: None,
            completed: false,
            reminders: BTreeMap::new(),
            extra: Map::new(),
            blank_due_date: None,
        }
    }

    pub fn with_due_date(mut self, instant: OffsetDateTime) -> Result<Self, AppError> {
        self.due_date = Some(DueDate::from_instant(instant)?);
        self.blank_due_date = None;
        Ok(self)
    }

    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }
}

/// A parsed due date that remembers the exact value it was read from, so a
/// write-back never rewrites a legacy representation.
#[derive(Debug, Clone, PartialEq)]
pub struct DueDate {
    instant: OffsetDateTime,
    canonical: String,
    raw: Value,
}

impl DueDate {
    pub fn from_instant(instant: OffsetDateTime) -> Result<Self, AppError> {
        let canonical = canonical_instant(instant)?;
        Ok(Self {
            instant,
            raw: Value::String(canonical.clone()),
            canonical,
        })
    }

    /// Accepts an RFC 3339 string, epoch milliseconds, or a
    /// `{ "seconds", "nanoseconds" }` timestamp object. `null` and blank
    /// strings mean the task has no due date.
    pub fn from_value(value: Value) -> Result<Option<Self>, AppError> {
        let instant = match &value {
            Value::Null => return Ok(None),
            Value::String(text) if text.trim().is_empty() => return Ok(None),
            Value::String(text) => OffsetDateTime::parse(text.trim(), &Rfc3339)
                .map_err(|_| AppError::invalid_data("dueDate must be RFC3339"))?,
            Value::Number(number) => {
                let millis = number
                    .as_i64()
                    .ok_or_else(|| AppError::invalid_data("dueDate must be whole milliseconds"))?;
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                    .map_err(|err| AppError::invalid_data(err.to_string()))?
            }
            Value::Object(fields) => {
                let seconds = fields
                    .get("seconds")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| AppError::invalid_data("dueDate timestamp needs seconds"))?;
                let nanos = fields
                    .get("nanoseconds")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                OffsetDateTime::from_unix_timestamp(seconds)
                    .map_err(|err| AppError::invalid_data(err.to_string()))?
                    .checked_add(Duration::nanoseconds(nanos))
                    .ok_or_else(|| AppError::invalid_data("dueDate timestamp out of range"))?
            }
            _ => return Err(AppError::invalid_data("unsupported dueDate value")),
        };

        let canonical = canonical_instant(instant)?;
        Ok(Some(Self {
            instant,
            canonical,
            raw: value,
        }))
    }

    pub fn instant(&self) -> OffsetDateTime {
        self.instant
    }

    /// UTC RFC 3339 form; two due dates naming the same instant compare equal
    /// here regardless of how they were stored.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

fn canonical_instant(instant: OffsetDateTime) -> Result<String, AppError> {
    instant
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))
}
