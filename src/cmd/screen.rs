//! Batch screening from JSON files: `screenwise screen`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use screenwise::coordinator::{ScreeningCoordinator, ScreeningRequest};
use screenwise::fallback::FallbackChain;
use screenwise::store::SqliteStore;
use screenwise::ui::ProgressObserver;
use screenwise_common::{Criteria, Reference, RunStatus, ScreeningDecision};

use super::super::Cli;
use super::load_settings;

/// A references file is either a bare array or `{"references": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReferenceFile {
    List(Vec<Reference>),
    Wrapped { references: Vec<Reference> },
}

impl ReferenceFile {
    fn into_references(self) -> Vec<Reference> {
        match self {
            ReferenceFile::List(references) | ReferenceFile::Wrapped { references } => references,
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file: {}", what, path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} file: {}", what, path.display()))
}

pub struct ScreenArgs<'a> {
    pub references: &'a Path,
    pub criteria: Option<&'a Path>,
    pub project: &'a str,
    pub session: Option<&'a str>,
    pub stage: Option<&'a str>,
    pub pacing_ms: Option<u64>,
    pub json: bool,
}

pub async fn cmd_screen(cli: &Cli, args: ScreenArgs<'_>) -> Result<()> {
    let settings = load_settings(cli)?;
    for warning in settings.warnings() {
        warn!("{}", warning);
    }

    let references = read_json::<ReferenceFile>(args.references, "references")?.into_references();
    let criteria = match args.criteria {
        Some(path) => read_json::<Criteria>(path, "criteria")?,
        None => {
            warn!("No --criteria given; every PICOTT element is 'Not specified'");
            Criteria::default()
        }
    };

    let chain = FallbackChain::from_config(&settings).context("Invalid review tier configuration")?;
    let db_path = settings.db_path();
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open screening database {}", db_path.display()))?;
    let pacing = args
        .pacing_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| settings.pacing());
    let coordinator =
        ScreeningCoordinator::new(Arc::new(chain), Arc::new(store)).with_pacing(pacing);

    let mut request = ScreeningRequest::new(args.project, references, criteria)
        .with_stage(args.stage.unwrap_or(&settings.screening.stage));
    if let Some(session) = args.session {
        request = request.with_session_id(session);
    }
    let total = request.references.len();

    if !args.json {
        println!();
        println!(
            "Screening {} references for project {} (session {})",
            style(total).cyan().bold(),
            style(args.project).yellow(),
            style(&request.session_id).dim()
        );
        println!();
    }

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nFinishing the current reference, then stopping...");
            ctrl_c_token.cancel();
        }
    });

    let ui = ProgressObserver::new(total as u64, cli.verbose);
    let outcome = coordinator.run_screening(request, &ui, &cancel).await;
    ctrl_c.abort();
    let outcome = outcome?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.decisions)?);
        return Ok(());
    }

    print_summary(&outcome.decisions);
    if outcome.status == RunStatus::Cancelled {
        println!(
            "Stopped after {} of {} references. Session: {}",
            outcome.decisions.len(),
            total,
            outcome.session_id
        );
    } else {
        println!("Session: {}", outcome.session_id);
    }
    println!(
        "Run 'screenwise status {}' or 'screenwise log {}' for details.",
        outcome.session_id, args.project
    );
    println!();
    Ok(())
}

fn print_summary(decisions: &[ScreeningDecision]) {
    if decisions.is_empty() {
        println!("No references were screened.");
        println!();
        return;
    }

    println!();
    println!(
        "{:<16} {:<8} {:>6}  {:<9} {:<17} {}",
        "REFERENCE", "DECISION", "CONF", "CONFLICT", "RESOLUTION", "REVIEWERS"
    );
    println!("{}", "─".repeat(90));
    for decision in decisions {
        let conflict = if decision.conflict { "yes" } else { "no" };
        let reviewers = format!(
            "{} / {}",
            short_label(&decision.reviewer1.reviewer, decision.reviewer1.fallback),
            short_label(&decision.reviewer2.reviewer, decision.reviewer2.fallback)
        );
        println!(
            "{:<16} {:<8} {:>5.0}%  {:<9} {:<17} {}",
            decision.reference_id,
            decision.final_decision.as_str(),
            decision.final_confidence * 100.0,
            conflict,
            decision.resolution.as_str(),
            reviewers
        );
    }
    println!();

    let included = decisions
        .iter()
        .filter(|d| d.final_decision == screenwise_common::Decision::Include)
        .count();
    let conflicts = decisions.iter().filter(|d| d.conflict).count();
    let failures = decisions.iter().filter(|d| d.is_double_failure()).count();
    println!(
        "{} included, {} excluded, {} conflicts, {} double failures",
        style(included).green().bold(),
        style(decisions.len() - included).red().bold(),
        style(conflicts).yellow().bold(),
        failures
    );
}

/// `model via provider` without the provider, marked when it came from a fallback.
fn short_label(label: &str, fallback: bool) -> String {
    let model = label.split(" via ").next().unwrap_or(label);
    if fallback {
        format!("{}*", model)
    } else {
        model.to_string()
    }
}
