//! Run-scoped progress counters and the reasoning timeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::ParseEnumError;
use crate::decision::ScreeningDecision;
use crate::review::Decision;

/// Generate a fresh screening session id.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Cancelled,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "error" => Ok(Self::Error),
            _ => Err(ParseEnumError::new("run status", s)),
        }
    }
}

/// The reference currently under review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentReference {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: String,
}

/// Counters for one screening session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    pub session_id: String,
    pub project_id: String,
    pub total: usize,
    pub completed: usize,
    pub included: usize,
    pub excluded: usize,
    pub conflicts: usize,
    #[serde(default)]
    pub current: Option<CurrentReference>,
    pub status: RunStatus,
    #[serde(default)]
    pub eta_seconds: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunProgress {
    pub fn new(session_id: &str, project_id: &str, total: usize) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            project_id: project_id.to_string(),
            total,
            completed: 0,
            included: 0,
            excluded: 0,
            conflicts: 0,
            current: None,
            status: RunStatus::Running,
            eta_seconds: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Count one reconciled decision.
    pub fn record(&mut self, decision: &ScreeningDecision) {
        self.completed += 1;
        match decision.final_decision {
            Decision::Include => self.included += 1,
            Decision::Exclude => self.excluded += 1,
        }
        if decision.conflict {
            self.conflicts += 1;
        }
        self.updated_at = Utc::now();
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }

    /// Elapsed time per completed reference times the references left.
    pub fn estimate_remaining(&self, elapsed: Duration) -> Option<Duration> {
        if self.completed == 0 {
            return None;
        }
        let per_reference = elapsed.as_secs_f64() / self.completed as f64;
        Some(Duration::from_secs_f64(per_reference * self.remaining() as f64))
    }

    /// Completion percentage in `[0, 100]`.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed.min(self.total) * 100) / self.total) as u8
    }
}

/// Timeline event emitted while a reference is screened. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub session_id: String,
    pub reference_id: String,
    pub reviewer: String,
    pub step: String,
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ReasoningStep {
    pub fn new(
        session_id: &str,
        reference_id: &str,
        reviewer: &str,
        step: &str,
        text: &str,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            reference_id: reference_id.to_string(),
            reviewer: reviewer.to_string(),
            step: step.to_string(),
            text: text.to_string(),
            confidence: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eta_is_none_before_first_completion() {
        let progress = RunProgress::new("s", "p", 4);
        assert!(progress.estimate_remaining(Duration::from_secs(10)).is_none());
    }

    #[test]
    fn test_eta_scales_with_remaining() {
        let mut progress = RunProgress::new("s", "p", 4);
        progress.completed = 1;
        let eta = progress.estimate_remaining(Duration::from_secs(10)).unwrap();
        assert_eq!(eta.as_secs(), 30);
    }

    #[test]
    fn test_percent_handles_empty_run() {
        let progress = RunProgress::new("s", "p", 0);
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_run_status_round_trips_through_str() {
        for status in [
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Cancelled,
            RunStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("paused".parse::<RunStatus>().is_err());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }
}
