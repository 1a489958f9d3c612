//! Reminder decision logic.
//!
//! Given one task and the current instant, decide whether its reminder window
//! needs a due-soon push, a missed push, a silent resolution, or nothing. The
//! engine does no I/O; the caller applies the returned record and dispatches
//! the intents.

use crate::config::ReminderPolicy;
use crate::model::{IntentKind, NotificationIntent, ReminderRecord, ReminderStatus, Task};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub window: String,
    /// `None` leaves the stored record untouched.
    pub record: Option<ReminderRecord>,
    pub intents: Vec<NotificationIntent>,
}

impl Evaluation {
    fn unchanged(window: String) -> Self {
        Self {
            window,
            record: None,
            intents: Vec::new(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.record.is_none() && self.intents.is_empty()
    }

    /// Writes the new record into the task. Returns whether the task changed.
    pub fn apply(&self, task: &mut Task) -> bool {
        let Some(resolved) = self.record.as_ref() else {
            return false;
        };

        let mut record = resolved.clone();
        let previous = task.reminders.get(&self.window);
        if let Some(previous) = previous {
            for (key, value) in &previous.extra {
                record
                    .extra
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        if previous == Some(&record) {
            return false;
        }

        task.reminders.insert(self.window.clone(), record);
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReminderEngine {
    policy: ReminderPolicy,
}

impl ReminderEngine {
    pub fn new(policy: ReminderPolicy) -> Self {
        Self { policy }
    }

    pub fn evaluate(&self, task: &Task, now: OffsetDateTime) -> Evaluation {
        let window = self.policy.window_key();

        let Some(due_date) = task.due_date.as_ref() else {
            return Evaluation::unchanged(window);
        };
        let for_due_date = due_date.canonical();

        // A record captured for a different due date is stale and reads as unset.
        let handled = task
            .reminders
            .get(&window)
            .and_then(|record| record.status_for(for_due_date));
        if handled.is_some() {
            return Evaluation::unchanged(window);
        }

        let remaining = due_date.instant() - now;
        let lead = minutes(self.policy.lead_minutes);
        let band_start = lead.saturating_sub(minutes(self.policy.band_minutes));
        let cutoff = Duration::ZERO.saturating_sub(minutes(self.policy.stale_cutoff_minutes));

        if remaining < cutoff {
            return Evaluation::unchanged(window);
        }

        if remaining > lead {
            return Evaluation::unchanged(window);
        }

        let at = now.format(&Rfc3339).ok();

        if task.completed {
            return Evaluation {
                record: Some(ReminderRecord::resolved(
                    ReminderStatus::SkippedCompleted,
                    at,
                    for_due_date,
                )),
                window,
                intents: Vec::new(),
            };
        }

        let (status, kind) = if remaining > band_start {
            (ReminderStatus::Sent, IntentKind::DueSoon)
        } else {
            (ReminderStatus::Missed, IntentKind::Missed)
        };

        let intent = NotificationIntent {
            task_id: task.id.clone(),
            window: window.clone(),
            kind,
            title: kind.title().to_string(),
            body: task.text.clone(),
        };

        Evaluation {
            record: Some(ReminderRecord::resolved(status, at, for_due_date)),
            window,
            intents: vec![intent],
        }
    }
}

// Saturates instead of panicking on policies too large to represent.
fn minutes(value: i64) -> Duration {
    Duration::seconds(value.saturating_mul(60))
}
