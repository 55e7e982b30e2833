use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use screenwise_common::{Decision, RunStatus, ScreeningDecision};

use crate::observer::{ScreeningEvent, ScreeningObserver};
use crate::ui::icons::{
    CHECK, CONFLICT, CROSS, EXCLUDE, FALLBACK, INCLUDE, SPARKLE, STOP, THINKING,
};

/// Running totals shown in the final summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub included: usize,
    pub excluded: usize,
    pub conflicts: usize,
    pub failures: usize,
}

/// Terminal progress for a screening run, rendered via `indicatif`.
///
/// Two bars are stacked vertically:
/// - Reference bar: completed references out of the batch, with ETA
/// - Review spinner: the reference currently under review and its latest step
///
/// Each decision is printed above the bars as it lands.
pub struct ProgressObserver {
    multi: MultiProgress,
    reference_bar: ProgressBar,
    review_bar: ProgressBar,
    verbose: bool,
    current_title: Mutex<Option<String>>,
    included: AtomicUsize,
    excluded: AtomicUsize,
    conflicts: AtomicUsize,
    failures: AtomicUsize,
}

impl ProgressObserver {
    /// Create the UI drawing to stderr.
    ///
    /// When `verbose` is set, every reasoning step is printed as a dim line.
    pub fn new(total: u64, verbose: bool) -> Self {
        Self::with_target(total, verbose, ProgressDrawTarget::stderr())
    }

    /// Same bars without any terminal output.
    pub fn hidden(total: u64, verbose: bool) -> Self {
        Self::with_target(total, verbose, ProgressDrawTarget::hidden())
    }

    fn with_target(total: u64, verbose: bool, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);

        let reference_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg} (eta {eta})")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let reference_bar = multi.add(ProgressBar::new(total));
        reference_bar.set_style(reference_style);
        reference_bar.set_prefix("References");

        let review_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let review_bar = multi.add(ProgressBar::new_spinner());
        review_bar.set_style(review_style);
        review_bar.set_prefix("    Review");

        Self {
            multi,
            reference_bar,
            review_bar,
            verbose,
            current_title: Mutex::new(None),
            included: AtomicUsize::new(0),
            excluded: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn tally(&self) -> Tally {
        Tally {
            included: self.included.load(Ordering::SeqCst),
            excluded: self.excluded.load(Ordering::SeqCst),
            conflicts: self.conflicts.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn current_title(&self) -> String {
        self.current_title
            .lock()
            .ok()
            .and_then(|t| t.clone())
            .unwrap_or_default()
    }

    fn set_current_title(&self, title: &str) {
        if let Ok(mut current) = self.current_title.lock() {
            *current = Some(title.to_string());
        }
    }

    fn record(&self, decision: &ScreeningDecision) {
        match decision.final_decision {
            Decision::Include => self.included.fetch_add(1, Ordering::SeqCst),
            Decision::Exclude => self.excluded.fetch_add(1, Ordering::SeqCst),
        };
        if decision.conflict {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        if decision.is_double_failure() {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn finish(&self, status: RunStatus, error: Option<&str>) {
        self.review_bar.finish_and_clear();
        match status {
            RunStatus::Completed => {
                self.reference_bar.finish_with_message("done");
                let tally = self.tally();
                self.print_line(format!(
                    "\n{} Screening complete: {} included, {} excluded, {} conflicts\n",
                    SPARKLE,
                    style(tally.included).green().bold(),
                    style(tally.excluded).red().bold(),
                    style(tally.conflicts).yellow().bold()
                ));
            }
            RunStatus::Cancelled => {
                self.reference_bar.abandon_with_message("cancelled");
                self.print_line(format!("\n{} Screening cancelled\n", STOP));
            }
            RunStatus::Error | RunStatus::Running => {
                self.reference_bar.abandon_with_message("failed");
                self.print_line(format!(
                    "\n{} Screening failed: {}\n",
                    CROSS,
                    error.unwrap_or("unknown error")
                ));
            }
        }
    }
}

impl ScreeningObserver for ProgressObserver {
    fn on_event(&self, event: &ScreeningEvent) {
        match event {
            ScreeningEvent::RunStarted { total, .. } => {
                self.reference_bar.set_length(*total as u64);
                self.review_bar
                    .enable_steady_tick(Duration::from_millis(100));
            }
            ScreeningEvent::CurrentReference { reference, .. } => {
                self.set_current_title(&reference.title);
                self.review_bar.set_message(format!(
                    "{} {}",
                    style(&reference.id).cyan(),
                    truncate(&reference.title, 60)
                ));
            }
            ScreeningEvent::Reasoning { step } => {
                self.review_bar.set_message(format!(
                    "{} {} {}",
                    style(&step.reference_id).cyan(),
                    truncate(&self.current_title(), 50),
                    style(format!("({})", step.step)).dim()
                ));
                if self.verbose {
                    self.print_line(format!(
                        "    {}{} {}",
                        THINKING,
                        style(&step.reviewer).dim(),
                        style(truncate(&step.text, 100)).dim()
                    ));
                }
            }
            ScreeningEvent::Decision { decision, .. } => {
                self.record(decision);
                self.print_line(decision_line(decision, &self.current_title()));
            }
            ScreeningEvent::Progress {
                completed,
                eta_seconds,
                ..
            } => {
                self.reference_bar.set_position(*completed as u64);
                if let Some(eta) = eta_seconds {
                    self.reference_bar
                        .set_message(format_duration(Duration::from_secs(*eta)));
                }
            }
            ScreeningEvent::RunFinished { status, error, .. } => {
                self.finish(*status, error.as_deref());
            }
        }
    }
}

/// One printed line per decision, e.g. `🟢 ref-1 include 80% ⚖️  Some title`.
pub fn decision_line(decision: &ScreeningDecision, title: &str) -> String {
    let icon = match decision.final_decision {
        Decision::Include => INCLUDE,
        Decision::Exclude => EXCLUDE,
    };
    let label = match decision.final_decision {
        Decision::Include => style(decision.final_decision.as_str()).green(),
        Decision::Exclude => style(decision.final_decision.as_str()).red(),
    };
    let mut flags = String::new();
    if decision.conflict {
        flags.push_str(&CONFLICT.to_string());
    }
    if decision.reviewer1.fallback || decision.reviewer2.fallback {
        flags.push_str(&FALLBACK.to_string());
    }
    if !decision.is_double_failure() && !decision.conflict {
        flags.push_str(&CHECK.to_string());
    }
    format!(
        "  {}{} {} {:.0}% {}{}",
        icon,
        style(&decision.reference_id).cyan(),
        label,
        decision.final_confidence * 100.0,
        flags,
        truncate(title, 70)
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// `500ms`, `30s`, `1m 30s` or `1h 1m 1s`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", d.as_millis())
    }
}
