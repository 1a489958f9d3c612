use crate::error::AppError;

const LEAD_MINUTES_ENV_VAR: &str = "REMINDER_LEAD_MINUTES";
const BAND_MINUTES_ENV_VAR: &str = "REMINDER_BAND_MINUTES";
const STALE_CUTOFF_ENV_VAR: &str = "REMINDER_STALE_CUTOFF_MINUTES";
const USER_CONCURRENCY_ENV_VAR: &str = "REMINDER_USER_CONCURRENCY";
const PUSH_TIMEOUT_ENV_VAR: &str = "REMINDER_PUSH_TIMEOUT_MS";
const DISABLE_PUSH_ENV_VAR: &str = "REMINDER_DISABLE_PUSH";

pub const DEFAULT_LEAD_MINUTES: i64 = 15;
pub const DEFAULT_BAND_MINUTES: i64 = 15;
pub const DEFAULT_STALE_CUTOFF_MINUTES: i64 = 1440;
pub const DEFAULT_USER_CONCURRENCY: usize = 4;
pub const DEFAULT_PUSH_TIMEOUT_MS: u64 = 10_000;
/// Upper bound for every minute-valued override: one leap year.
pub const MAX_POLICY_MINUTES: i64 = 366 * 24 * 60;

/// Timing rules for the single reminder window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderPolicy {
    /// Minutes before the due date at which the due-soon band ends.
    pub lead_minutes: i64,
    /// Width of the due-soon band, ending at `lead_minutes`.
    pub band_minutes: i64,
    /// Tasks overdue by more than this many minutes are never notified.
    pub stale_cutoff_minutes: i64,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            lead_minutes: DEFAULT_LEAD_MINUTES,
            band_minutes: DEFAULT_BAND_MINUTES,
            stale_cutoff_minutes: DEFAULT_STALE_CUTOFF_MINUTES,
        }
    }
}

impl ReminderPolicy {
    pub fn window_key(&self) -> String {
        format!("{}min", self.lead_minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub policy: ReminderPolicy,
    pub user_concurrency: usize,
    pub push_timeout_ms: u64,
    pub push_disabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: ReminderPolicy::default(),
            user_concurrency: DEFAULT_USER_CONCURRENCY,
            push_timeout_ms: DEFAULT_PUSH_TIMEOUT_MS,
            push_disabled: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub errors: Vec<AppError>,
}

pub fn load_config_with_fallback() -> ConfigLoad {
    config_from_lookup(|name| std::env::var(name).ok())
}

/// Builds the config from an environment lookup. Invalid overrides fall back
/// to the default and are reported in `errors`.
pub fn config_from_lookup<F>(lookup: F) -> ConfigLoad
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::default();
    let mut errors = Vec::new();

    if let Some(value) = parse_minutes(&lookup, LEAD_MINUTES_ENV_VAR, 0, &mut errors) {
        config.policy.lead_minutes = value;
    }

    if let Some(value) = parse_minutes(&lookup, BAND_MINUTES_ENV_VAR, 1, &mut errors) {
        config.policy.band_minutes = value;
    }

    if let Some(value) = parse_minutes(&lookup, STALE_CUTOFF_ENV_VAR, 0, &mut errors) {
        config.policy.stale_cutoff_minutes = value;
    }

    if let Some(value) = parse_override::<usize, _>(&lookup, USER_CONCURRENCY_ENV_VAR, &mut errors)
    {
        if value > 0 {
            config.user_concurrency = value;
        } else {
            errors.push(AppError::invalid_input(format!(
                "{USER_CONCURRENCY_ENV_VAR} must be positive"
            )));
        }
    }

    if let Some(value) = parse_override::<u64, _>(&lookup, PUSH_TIMEOUT_ENV_VAR, &mut errors) {
        config.push_timeout_ms = value;
    }

    config.push_disabled = lookup(DISABLE_PUSH_ENV_VAR).is_some();

    ConfigLoad { config, errors }
}

fn parse_minutes<F>(lookup: &F, name: &str, min: i64, errors: &mut Vec<AppError>) -> Option<i64>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_override::<i64, _>(lookup, name, errors)?;
    if (min..=MAX_POLICY_MINUTES).contains(&value) {
        return Some(value);
    }

    errors.push(AppError::invalid_input(format!(
        "{name} must be between {min} and {MAX_POLICY_MINUTES}, got {value}"
    )));
    None
}

fn parse_override<T, F>(lookup: &F, name: &str, errors: &mut Vec<AppError>) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            errors.push(AppError::invalid_input(format!(
                "{name} must be a whole number, got {trimmed:?}"
            )));
            None
        }
    }
}
