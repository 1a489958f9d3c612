mod reminder;
mod task;

pub use reminder::{IntentKind, NotificationIntent, ReminderRecord, ReminderStatus};
pub use task::{DueDate, Task};
