use anyhow::{Context, Result};
use chrono::Utc;
use std::io::{self, BufRead, IsTerminal};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use product_scout::models::normalize_keywords;
use product_scout::storage::{RowSink, SqliteRowStore};
use product_scout::{execute, Config};

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("product_scout=info".parse()?);

    if std::env::var("LOG_FORMAT").map_or(false, |f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// Keywords from the arguments, or one per stdin line when none are given.
fn read_keywords() -> Result<Vec<String>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return Ok(args);
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprintln!("Enter keywords, one per line (Ctrl-D to finish):");
    }
    stdin
        .lock()
        .lines()
        .collect::<io::Result<Vec<_>>>()
        .context("Failed to read keywords from stdin")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("Starting Product Scout");

    let config = Arc::new(Config::load()?);

    let keywords = normalize_keywords(read_keywords()?);
    if keywords.is_empty() {
        warn!("No usable keywords given, nothing to do");
        return Ok(());
    }
    info!(count = keywords.len(), "Keywords loaded");

    let run_id = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    let db_path = config.output_dir.join("product_scout.db");
    let store = SqliteRowStore::new(&db_path, run_id).await?;
    store.migrate().await?;

    let report = execute(config.clone(), &keywords, &store).await?;

    info!(
        run_id = store.run_id(),
        rows = report.total_rows(),
        skipped = report.skipped_keywords.len(),
        database = %db_path.display(),
        "Run complete"
    );

    std::fs::create_dir_all(&config.logs_dir)
        .with_context(|| format!("Failed to create {}", config.logs_dir.display()))?;
    let summary_path = config.logs_dir.join(format!("run_{}.json", store.run_id()));
    let summary = serde_json::to_string_pretty(&report)?;
    std::fs::write(&summary_path, summary)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    info!("Run summary written to {}", summary_path.display());

    Ok(())
}
