//! The reconciled outcome of both reviewer slots for one reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseEnumError;
use crate::review::{Decision, ReferenceStatus, ReviewerResult};

/// Which reconciliation rule produced the final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Both slots valid and in agreement.
    Agreement,
    /// Slots disagreed; the strictly more confident one won.
    HigherConfidence,
    /// Slots disagreed with identical confidence; resolved to exclude.
    TieExclude,
    /// Only one slot produced a valid verdict.
    SingleValid,
    /// Neither slot produced a valid verdict.
    DoubleFailure,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agreement => "agreement",
            Self::HigherConfidence => "higher_confidence",
            Self::TieExclude => "tie_exclude",
            Self::SingleValid => "single_valid",
            Self::DoubleFailure => "double_failure",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agreement" => Ok(Self::Agreement),
            "higher_confidence" => Ok(Self::HigherConfidence),
            "tie_exclude" => Ok(Self::TieExclude),
            "single_valid" => Ok(Self::SingleValid),
            "double_failure" => Ok(Self::DoubleFailure),
            _ => Err(ParseEnumError::new("resolution", s)),
        }
    }
}

/// Reconciled screening outcome for one reference in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningDecision {
    pub reference_id: String,
    /// Conservative slot.
    pub reviewer1: ReviewerResult,
    /// Comprehensive slot.
    pub reviewer2: ReviewerResult,
    pub agreement: bool,
    pub final_decision: Decision,
    pub final_confidence: f64,
    pub conflict: bool,
    pub resolution: Resolution,
    pub decided_at: DateTime<Utc>,
}

impl ScreeningDecision {
    pub fn status(&self) -> ReferenceStatus {
        self.final_decision.as_status()
    }

    pub fn is_double_failure(&self) -> bool {
        self.resolution == Resolution::DoubleFailure
    }

    /// One-line summary for logs and terminal output.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:.0}% confidence, {}{})",
            self.status().as_str(),
            self.final_confidence * 100.0,
            self.resolution,
            if self.conflict { ", conflict" } else { "" }
        )
    }
}
