use clap::Parser;
use clap::error::ErrorKind;
use reminder_cli::cli::{Cli, summary_line};
use reminder_core::config::load_config_with_fallback;
use reminder_core::error::AppError;
use reminder_core::push::gateway_from_env;
use reminder_core::runner::{RunSummary, ServiceContext, run_once};
use reminder_core::storage::json_store::store_root;
use reminder_core::storage::{DocumentStore, JsonDocumentStore};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = match std::env::var("RUST_LOG") {
        Ok(value) if !value.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::new("info"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

async fn run() -> Result<RunSummary, AppError> {
    let loaded = load_config_with_fallback();
    for err in &loaded.errors {
        tracing::warn!(error = %err, "ignoring invalid setting");
    }
    let config = loaded.config;

    let root = store_root()?;
    tracing::debug!(store = %root.display(), "using document store");
    let store: Arc<dyn DocumentStore> = Arc::new(JsonDocumentStore::new(root));
    let gateway = gateway_from_env(&config)?;
    let ctx = ServiceContext::new(store, gateway, &config);

    run_once(&ctx, OffsetDateTime::now_utc()).await
}

#[tokio::main]
async fn main() {
    if let Err(err) = Cli::try_parse() {
        if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
            let _ = err.print();
            return;
        }
        eprintln!("ERROR: {}", normalize_parse_error(err));
        std::process::exit(1);
    }

    init_tracing();

    match run().await {
        Ok(summary) => println!(
            "{}",
            summary_line(summary.users_scanned, summary.reminders_sent)
        ),
        Err(err) => {
            tracing::error!(error = %err, "reminder run failed");
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
    }
}
