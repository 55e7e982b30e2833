//! One reviewer's verdict on one reference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ParseEnumError;

/// Binary screening decision. There is deliberately no "maybe".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Include,
    #[default]
    Exclude,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
        }
    }

    /// Interpret a model-supplied recommendation.
    ///
    /// Anything that is not recognisably "include" becomes `Exclude`.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "include" | "included" => Self::Include,
            _ => Self::Exclude,
        }
    }

    /// Map to the persisted status vocabulary.
    pub fn as_status(&self) -> ReferenceStatus {
        match self {
            Self::Include => ReferenceStatus::Included,
            Self::Exclude => ReferenceStatus::Excluded,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Decision {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "include" => Ok(Self::Include),
            "exclude" => Ok(Self::Exclude),
            _ => Err(ParseEnumError::new("decision", s)),
        }
    }
}

/// Persisted screening status of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceStatus {
    Included,
    Excluded,
}

impl ReferenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Included => "included",
            Self::Excluded => "excluded",
        }
    }
}

impl FromStr for ReferenceStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "included" => Ok(Self::Included),
            "excluded" => Ok(Self::Excluded),
            _ => Err(ParseEnumError::new("reference status", s)),
        }
    }
}

/// Prompting stance of a reviewer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    /// Defaults to exclude under doubt. Fills reviewer slot 1.
    Conservative,
    /// Defaults to include unless clearly irrelevant. Fills reviewer slot 2.
    Comprehensive,
}

impl Stance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Comprehensive => "comprehensive",
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The six PICOTT elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PicottElement {
    Population,
    Intervention,
    Comparator,
    Outcome,
    Timeframe,
    StudyDesign,
}

impl PicottElement {
    pub const ALL: [PicottElement; 6] = [
        PicottElement::Population,
        PicottElement::Intervention,
        PicottElement::Comparator,
        PicottElement::Outcome,
        PicottElement::Timeframe,
        PicottElement::StudyDesign,
    ];

    /// JSON key used in the response schema.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Population => "population",
            Self::Intervention => "intervention",
            Self::Comparator => "comparator",
            Self::Outcome => "outcome",
            Self::Timeframe => "timeframe",
            Self::StudyDesign => "study_design",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Population => "Population",
            Self::Intervention => "Intervention",
            Self::Comparator => "Comparator",
            Self::Outcome => "Outcome",
            Self::Timeframe => "Timeframe",
            Self::StudyDesign => "Study design",
        }
    }
}

/// Whether a PICOTT element is evidenced in the reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementStatus {
    Present,
    Absent,
    #[default]
    Unclear,
}

impl ElementStatus {
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "present" | "yes" => Self::Present,
            "absent" | "no" => Self::Absent,
            _ => Self::Unclear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementAssessment {
    pub element: PicottElement,
    pub status: ElementStatus,
    #[serde(default)]
    pub evidence: String,
}

/// Whether a free-text inclusion/exclusion criterion is met.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionStatus {
    Met,
    NotMet,
    #[default]
    Unclear,
}

impl CriterionStatus {
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "met" | "yes" | "true" => Self::Met,
            "not_met" | "unmet" | "no" | "false" => Self::NotMet,
            _ => Self::Unclear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionAssessment {
    pub criterion: String,
    pub status: CriterionStatus,
    #[serde(default)]
    pub evidence: String,
}

/// Why a reviewer slot carries an error-sentinel instead of a real verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Provider kept answering HTTP 429.
    RateLimited,
    /// Transport failures, timeouts or 5xx responses.
    ProviderError,
    /// Responses never parsed into the required schema.
    InvalidResponse,
    /// No tier or fallback target could serve this slot.
    Exhausted,
    /// The reference failed outside the provider path.
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::ProviderError => "provider_error",
            Self::InvalidResponse => "invalid_response",
            Self::Exhausted => "exhausted",
            Self::Internal => "internal",
        }
    }
}

/// One model's verdict on one reference.
///
/// Never mutated after creation; a retry produces a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerResult {
    pub decision: Decision,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub picott: Vec<ElementAssessment>,
    #[serde(default)]
    pub inclusion: Vec<CriterionAssessment>,
    #[serde(default)]
    pub exclusion: Vec<CriterionAssessment>,
    /// Model/provider label, e.g. `anthropic/claude-sonnet-4 via openrouter`.
    pub reviewer: String,
    #[serde(default)]
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ReviewerResult {
    /// A successful verdict. Confidence is clamped to `[0, 1]`.
    pub fn new(decision: Decision, confidence: f64, reasoning: &str, reviewer: &str) -> Self {
        Self {
            decision,
            confidence: clamp_confidence(confidence),
            reasoning: reasoning.to_string(),
            picott: Vec::new(),
            inclusion: Vec::new(),
            exclusion: Vec::new(),
            reviewer: reviewer.to_string(),
            fallback: false,
            failure: None,
        }
    }

    /// A well-formed result standing in for a failure.
    ///
    /// Always `exclude` with confidence 0 and the label suffixed `(Error)`.
    pub fn error_sentinel(reviewer: &str, reasoning: &str, kind: FailureKind) -> Self {
        let reviewer = if reviewer.ends_with("(Error)") {
            reviewer.to_string()
        } else {
            format!("{} (Error)", reviewer)
        };
        Self {
            decision: Decision::Exclude,
            confidence: 0.0,
            reasoning: reasoning.to_string(),
            picott: Vec::new(),
            inclusion: Vec::new(),
            exclusion: Vec::new(),
            reviewer,
            fallback: false,
            failure: Some(kind),
        }
    }

    pub fn with_picott(mut self, picott: Vec<ElementAssessment>) -> Self {
        self.picott = picott;
        self
    }

    pub fn with_criteria(
        mut self,
        inclusion: Vec<CriterionAssessment>,
        exclusion: Vec<CriterionAssessment>,
    ) -> Self {
        self.inclusion = inclusion;
        self.exclusion = exclusion;
        self
    }

    /// Mark this result as produced by a fallback target.
    pub fn as_fallback(mut self) -> Self {
        if !self.fallback {
            self.fallback = true;
            if !self.reviewer.contains("[fallback]") {
                self.reviewer = format!("{} [fallback]", self.reviewer);
            }
        }
        self
    }

    /// A result counts towards reconciliation only with confidence above zero.
    pub fn is_valid(&self) -> bool {
        self.confidence > 0.0
    }

    /// Recognise the error-sentinel signature.
    pub fn is_error_sentinel(&self) -> bool {
        if self.confidence > 0.0 {
            return false;
        }
        if self.failure.is_some() {
            return true;
        }
        let label = self.reviewer.to_lowercase();
        label.contains("error") || label.contains("quota")
    }

    pub fn is_rate_limited(&self) -> bool {
        self.failure == Some(FailureKind::RateLimited)
    }
}

/// Clamp a confidence into `[0, 1]`, mapping NaN to 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_coerce_defaults_to_exclude() {
        assert_eq!(Decision::coerce("INCLUDE"), Decision::Include);
        assert_eq!(Decision::coerce(" included "), Decision::Include);
        assert_eq!(Decision::coerce("maybe"), Decision::Exclude);
        assert_eq!(Decision::coerce(""), Decision::Exclude);
    }

    #[test]
    fn test_decision_maps_to_status() {
        assert_eq!(Decision::Include.as_status(), ReferenceStatus::Included);
        assert_eq!(Decision::Exclude.as_status().as_str(), "excluded");
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(ReviewerResult::new(Decision::Include, 1.7, "", "m").confidence, 1.0);
        assert_eq!(ReviewerResult::new(Decision::Include, -0.2, "", "m").confidence, 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
    }

    #[test]
    fn test_error_sentinel_signature() {
        let sentinel =
            ReviewerResult::error_sentinel("gpt-4o", "HTTP 500", FailureKind::ProviderError);
        assert_eq!(sentinel.decision, Decision::Exclude);
        assert_eq!(sentinel.confidence, 0.0);
        assert_eq!(sentinel.reviewer, "gpt-4o (Error)");
        assert!(sentinel.is_error_sentinel());
        assert!(!sentinel.is_valid());
    }

    #[test]
    fn test_error_sentinel_does_not_double_suffix() {
        let sentinel =
            ReviewerResult::error_sentinel("m (Error)", "x", FailureKind::Exhausted);
        assert_eq!(sentinel.reviewer, "m (Error)");
    }

    #[test]
    fn test_sentinel_detected_from_label_alone() {
        let mut result = ReviewerResult::new(Decision::Exclude, 0.0, "quota", "gemini (Quota)");
        assert!(result.is_error_sentinel());
        result.confidence = 0.4;
        assert!(!result.is_error_sentinel());
    }

    #[test]
    fn test_zero_confidence_real_result_is_not_sentinel() {
        let result = ReviewerResult::new(Decision::Include, 0.0, "unsure", "claude");
        assert!(!result.is_error_sentinel());
        assert!(!result.is_valid());
    }

    #[test]
    fn test_as_fallback_marks_label_once() {
        let result = ReviewerResult::new(Decision::Include, 0.6, "", "gemini").as_fallback();
        let again = result.clone().as_fallback();
        assert!(again.fallback);
        assert_eq!(again.reviewer, "gemini [fallback]");
    }

    #[test]
    fn test_status_coercions() {
        assert_eq!(ElementStatus::coerce("Present"), ElementStatus::Present);
        assert_eq!(ElementStatus::coerce("n/a"), ElementStatus::Unclear);
        assert_eq!(CriterionStatus::coerce("not met"), CriterionStatus::NotMet);
        assert_eq!(CriterionStatus::coerce("Not-Met"), CriterionStatus::NotMet);
        assert_eq!(CriterionStatus::coerce("met"), CriterionStatus::Met);
    }
}
