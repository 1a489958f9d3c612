use crate::model::task::deserialize_present;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tracks whether one reminder window has been handled, and for which due date.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredRecord", into = "StoredRecord")]
pub struct ReminderRecord {
    /// `None` when the record was never handled or its status is not one this
    /// service writes.
    pub status: Option<ReminderStatus>,
    pub at: Option<String>,
    pub for_due_date: Option<String>,
    pub extra: Map<String, Value>,
    unrecognized_status: Option<Value>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    status: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    for_due_date: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

// Unknown status values read as "never handled" but are written back as read.
impl From<StoredRecord> for ReminderRecord {
    fn from(stored: StoredRecord) -> Self {
        let status = stored
            .status
            .as_ref()
            .and_then(Value::as_str)
            .and_then(ReminderStatus::parse);
        let unrecognized_status = if status.is_none() {
            stored.status
        } else {
            None
        };

        Self {
            status,
            at: stored.at,
            for_due_date: stored.for_due_date,
            extra: stored.extra,
            unrecognized_status,
        }
    }
}

impl From<ReminderRecord> for StoredRecord {
    fn from(record: ReminderRecord) -> Self {
        Self {
            status: record
                .status
                .map(|status| Value::String(status.as_str().to_string()))
                .or(record.unrecognized_status),
            at: record.at,
            for_due_date: record.for_due_date,
            extra: record.extra,
        }
    }
}

impl ReminderRecord {
    pub fn resolved(status: ReminderStatus, at: Option<String>, for_due_date: &str) -> Self {
        Self {
            status: Some(status),
            at,
            for_due_date: Some(for_due_date.to_string()),
            ..Self::default()
        }
    }

    /// The status, but only if it was recorded for `for_due_date`.
    pub fn status_for(&self, for_due_date: &str) -> Option<ReminderStatus> {
        if self.for_due_date.as_deref() == Some(for_due_date) {
            self.status
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReminderStatus {
    Sent,
    Missed,
    SkippedCompleted,
}

impl ReminderStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "sent" => Some(Self::Sent),
            "missed" => Some(Self::Missed),
            "skipped-completed" => Some(Self::SkippedCompleted),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Missed => "missed",
            Self::SkippedCompleted => "skipped-completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntentKind {
    DueSoon,
    Missed,
}

impl IntentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DueSoon => "due-soon",
            Self::Missed => "missed",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::DueSoon => "Task due soon",
            Self::Missed => "Task missed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationIntent {
    pub task_id: String,
    pub window: String,
    pub kind: IntentKind,
    pub title: String,
    pub body: String,
}
