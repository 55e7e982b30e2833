//! Shared domain types for the screenwise screening orchestrator.
//!
//! - [`reference`]: references under review and the PICO(TT) criteria
//! - [`review`]: a single reviewer's verdict
//! - [`decision`]: the reconciled outcome of both reviewer slots
//! - [`progress`]: run counters and the reasoning timeline

pub mod decision;
pub mod progress;
pub mod reference;
pub mod review;

pub use decision::{Resolution, ScreeningDecision};
pub use progress::{CurrentReference, ReasoningStep, RunProgress, RunStatus, new_session_id};
pub use reference::{Criteria, CriteriaSnapshot, Reference};
pub use review::{
    CriterionAssessment, CriterionStatus, Decision, ElementAssessment, ElementStatus,
    FailureKind, PicottElement, ReferenceStatus, ReviewerResult, Stance, clamp_confidence,
};

/// A string did not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
