use clap::Parser;

/// Scan every user's tasks once and push due-soon and missed reminders.
///
/// Intended to be run by an external scheduler every few minutes. Settings
/// are read from REMINDER_* environment variables.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {}

pub fn summary_line(users_scanned: usize, reminders_sent: usize) -> String {
    format!("Scanned {users_scanned} users, sent {reminders_sent} reminders")
}
