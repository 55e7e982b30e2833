//! Persisted run progress and decision history: `screenwise status` and `screenwise log`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use console::style;
use tokio_util::sync::CancellationToken;

use screenwise::observer::StorePoller;
use screenwise::store::{DecisionLogEntry, ScreeningStore, SqliteStore};
use screenwise::ui::{ProgressObserver, format_duration};
use screenwise_common::RunProgress;

use super::super::Cli;
use super::load_settings;

fn open_store(cli: &Cli) -> Result<Arc<dyn ScreeningStore>> {
    let settings = load_settings(cli)?;
    let db_path = settings.db_path();
    if !db_path.exists() {
        bail!(
            "No screening database at {}. Run 'screenwise screen' first.",
            db_path.display()
        );
    }
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open screening database {}", db_path.display()))?;
    Ok(Arc::new(store))
}

pub async fn cmd_status(cli: &Cli, session_id: &str, follow: bool, interval_ms: u64) -> Result<()> {
    let store = open_store(cli)?;
    let Some(progress) = store.get_progress(session_id).await? else {
        bail!("Screening session {} not found", session_id);
    };

    if follow && !progress.status.is_terminal() {
        let ui = ProgressObserver::new(progress.total as u64, cli.verbose);
        let cancel = CancellationToken::new();
        let ctrl_c_token = cancel.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c_token.cancel();
            }
        });
        let poller = StorePoller::new(store.clone(), Duration::from_millis(interval_ms.max(50)));
        let last = poller.follow(session_id, &ui, &cancel).await;
        ctrl_c.abort();
        if let Some(progress) = last? {
            print_progress(&progress);
        }
        return Ok(());
    }

    print_progress(&progress);
    Ok(())
}

fn print_progress(progress: &RunProgress) {
    println!();
    println!("Screening {}", style(&progress.session_id).cyan().bold());
    println!("{}", "=".repeat(10 + progress.session_id.len()));
    println!();
    println!("Project:    {}", progress.project_id);
    println!("Status:     {}", progress.status);
    println!(
        "Progress:   {}/{} ({}%)",
        progress.completed,
        progress.total,
        progress.percent()
    );
    println!(
        "Decisions:  {} included, {} excluded, {} conflicts",
        style(progress.included).green(),
        style(progress.excluded).red(),
        style(progress.conflicts).yellow()
    );
    if !progress.status.is_terminal()
        && let Some(current) = &progress.current
    {
        println!("Current:    {} {}", current.id, current.title);
    }
    if !progress.status.is_terminal()
        && let Some(eta) = progress.eta_seconds
    {
        println!("ETA:        {}", format_duration(Duration::from_secs(eta)));
    }
    println!("Started:    {}", progress.started_at.to_rfc3339());
    println!("Updated:    {}", progress.updated_at.to_rfc3339());
    println!();
}

pub async fn cmd_log(cli: &Cli, project_id: &str, json: bool, reasoning: bool) -> Result<()> {
    let store = open_store(cli)?;
    let entries = store.decision_log(project_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!();
    println!("Decision log for project {}", style(project_id).yellow().bold());
    println!();
    if entries.is_empty() {
        println!("No decisions recorded.");
        println!();
        return Ok(());
    }

    for entry in &entries {
        print_entry(entry, reasoning || cli.verbose);
    }
    println!("{} decisions", entries.len());
    println!();
    Ok(())
}

fn print_entry(entry: &DecisionLogEntry, with_reasoning: bool) {
    let decision = &entry.decision;
    println!(
        "{} {} {:.0}% [{}] {}",
        decision.decided_at.format("%Y-%m-%d %H:%M:%S"),
        style(&decision.reference_id).cyan(),
        decision.final_confidence * 100.0,
        decision.resolution,
        decision.final_decision.as_str()
    );
    if !with_reasoning {
        return;
    }
    for (slot, result) in [("R1", &decision.reviewer1), ("R2", &decision.reviewer2)] {
        println!(
            "    {} {} {} {:.0}%",
            style(slot).dim(),
            result.reviewer,
            result.decision.as_str(),
            result.confidence * 100.0
        );
        for line in textwrap::wrap(&result.reasoning, 88) {
            println!("       {}", style(line).dim());
        }
    }
    println!();
}
