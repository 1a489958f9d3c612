//! One scan-and-notify pass over every user in the store.

use crate::config::Config;
use crate::engine::ReminderEngine;
use crate::error::AppError;
use crate::model::Task;
use crate::push::{Dispatcher, PushGateway};
use crate::source::{LayeredTaskSource, SourcedTask, TaskOrigin};
use crate::storage::{DocumentStore, TASKS_FIELD, load_device_tokens};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use time::OffsetDateTime;

const REMINDERS_FIELD: &str = "reminders";

/// Everything a run needs, built once at startup.
pub struct ServiceContext {
    store: Arc<dyn DocumentStore>,
    dispatcher: Dispatcher,
    tasks: LayeredTaskSource,
    engine: ReminderEngine,
    user_concurrency: usize,
}

impl ServiceContext {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PushGateway>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            dispatcher: Dispatcher::new(gateway),
            tasks: LayeredTaskSource::default(),
            engine: ReminderEngine::new(config.policy),
            user_concurrency: config.user_concurrency.max(1),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub users_scanned: usize,
    pub users_skipped: usize,
    pub users_failed: usize,
    /// Dispatch attempts, one per token per intent, whether or not the gateway accepted them.
    pub reminders_sent: usize,
    pub delivery_failures: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    Skipped(&'static str),
    Processed(UserReport),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UserReport {
    pub reminders_sent: usize,
    pub delivery_failures: usize,
    pub tasks_updated: bool,
}

/// Listing users failing aborts the run; any per-user failure is logged and
/// counted, and the run moves on.
pub async fn run_once(ctx: &ServiceContext, now: OffsetDateTime) -> Result<RunSummary, AppError> {
    let users = ctx.store.list_users().await?;
    tracing::info!(users = users.len(), "reminder run started");

    let outcomes: Vec<(String, Result<UserOutcome, AppError>)> = futures::stream::iter(users)
        .map(|user| async move {
            let outcome = process_user(ctx, &user, now).await;
            (user, outcome)
        })
        .buffer_unordered(ctx.user_concurrency)
        .collect()
        .await;

    let mut summary = RunSummary::default();
    for (user, outcome) in outcomes {
        summary.users_scanned += 1;
        match outcome {
            Ok(UserOutcome::Skipped(reason)) => {
                tracing::debug!(user = %user, reason, "user skipped");
                summary.users_skipped += 1;
            }
            Ok(UserOutcome::Processed(report)) => {
                tracing::debug!(
                    user = %user,
                    reminders_sent = report.reminders_sent,
                    tasks_updated = report.tasks_updated,
                    "user processed"
                );
                summary.reminders_sent += report.reminders_sent;
                summary.delivery_failures += report.delivery_failures;
            }
            Err(err) => {
                tracing::warn!(user = %user, error = %err, "user processing failed");
                summary.users_failed += 1;
            }
        }
    }

    tracing::info!(
        users_scanned = summary.users_scanned,
        users_skipped = summary.users_skipped,
        users_failed = summary.users_failed,
        reminders_sent = summary.reminders_sent,
        delivery_failures = summary.delivery_failures,
        "reminder run finished"
    );

    Ok(summary)
}

pub async fn process_user(
    ctx: &ServiceContext,
    user: &str,
    now: OffsetDateTime,
) -> Result<UserOutcome, AppError> {
    let mut tasks = ctx.tasks.load_tasks(ctx.store.as_ref(), user).await?;
    if tasks.is_empty() {
        return Ok(UserOutcome::Skipped("no tasks"));
    }

    let tokens: Vec<String> = load_device_tokens(ctx.store.as_ref(), user)
        .await?
        .into_iter()
        .collect();
    if tokens.is_empty() {
        return Ok(UserOutcome::Skipped("no device tokens"));
    }

    let mut report = UserReport::default();
    let mut changed = Vec::new();

    for (index, SourcedTask { task, .. }) in tasks.iter_mut().enumerate() {
        let evaluation = ctx.engine.evaluate(task, now);

        for intent in &evaluation.intents {
            tracing::info!(
                user,
                task = %intent.task_id,
                window = %intent.window,
                kind = intent.kind.as_str(),
                "reminder due"
            );
            let deliveries = ctx.dispatcher.dispatch(intent, &tokens).await;
            report.reminders_sent += deliveries.len();
            report.delivery_failures += deliveries
                .iter()
                .filter(|delivery| !delivery.delivered())
                .count();
        }

        if evaluation.apply(task) {
            if let Some(status) = evaluation.record.as_ref().and_then(|record| record.status) {
                tracing::debug!(
                    user,
                    task = %task.id,
                    status = status.as_str(),
                    "reminder resolved"
                );
            }
            changed.push(index);
        }
    }

    // Written only after every dispatch for this user has been attempted.
    if !changed.is_empty() {
        persist_tasks(ctx.store.as_ref(), user, &tasks, &changed).await?;
        report.tasks_updated = true;
    }

    Ok(UserOutcome::Processed(report))
}

/// Writes each changed task back to the document it was loaded from. Tasks of
/// the user document are written as one `tasks` array; a task document only
/// gets its `reminders` field replaced.
async fn persist_tasks(
    store: &dyn DocumentStore,
    user: &str,
    tasks: &[SourcedTask],
    changed: &[usize],
) -> Result<(), AppError> {
    let user_document_changed = changed
        .iter()
        .any(|&index| tasks[index].origin == TaskOrigin::UserDocument);
    if user_document_changed {
        let listed: Vec<&Task> = tasks
            .iter()
            .filter(|sourced| sourced.origin == TaskOrigin::UserDocument)
            .map(|sourced| &sourced.task)
            .collect();
        let mut fields = Map::new();
        fields.insert(TASKS_FIELD.to_string(), to_field(&listed)?);
        store.merge_user_document(user, fields).await?;
    }

    for &index in changed {
        let SourcedTask { origin, task } = &tasks[index];
        if let TaskOrigin::TaskDocument(document) = origin {
            let mut fields = Map::new();
            fields.insert(REMINDERS_FIELD.to_string(), to_field(&task.reminders)?);
            store.merge_task_document(user, document, fields).await?;
        }
    }

    Ok(())
}

fn to_field<T: serde::Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|err| AppError::invalid_data(err.to_string()))
}
