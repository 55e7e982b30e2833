//! Deterministic reconciliation of the two reviewer slots.
//!
//! | slot 1 | slot 2 | outcome                                             |
//! |--------|--------|-----------------------------------------------------|
//! | valid  | valid  | agree: shared decision, mean confidence             |
//! | valid  | valid  | disagree: higher confidence wins; tie → exclude     |
//! | valid  | failed | slot 1 decision and confidence                      |
//! | failed | valid  | slot 2 decision and confidence                      |
//! | failed | failed | exclude at 0.1, flagged as a double failure         |
//!
//! A slot is valid when its confidence is above zero.

use chrono::Utc;
use std::cmp::Ordering;
use tracing::{debug, warn};

use screenwise_common::{Decision, Resolution, ReviewerResult, ScreeningDecision};

/// Final confidence assigned when neither slot produced a verdict.
pub const DOUBLE_FAILURE_CONFIDENCE: f64 = 0.1;

pub fn reconcile(reference_id: &str, r1: ReviewerResult, r2: ReviewerResult) -> ScreeningDecision {
    let (agreement, final_decision, final_confidence, resolution) =
        match (r1.is_valid(), r2.is_valid()) {
            (true, true) if r1.decision == r2.decision => (
                true,
                r1.decision,
                (r1.confidence + r2.confidence) / 2.0,
                Resolution::Agreement,
            ),
            (true, true) => match r1.confidence.partial_cmp(&r2.confidence) {
                Some(Ordering::Greater) => {
                    (false, r1.decision, r1.confidence, Resolution::HigherConfidence)
                }
                Some(Ordering::Less) => {
                    (false, r2.decision, r2.confidence, Resolution::HigherConfidence)
                }
                _ => (false, Decision::Exclude, r1.confidence, Resolution::TieExclude),
            },
            (true, false) => (false, r1.decision, r1.confidence, Resolution::SingleValid),
            (false, true) => (false, r2.decision, r2.confidence, Resolution::SingleValid),
            (false, false) => {
                warn!(
                    reference_id,
                    reviewer1 = %r1.reviewer,
                    reviewer2 = %r2.reviewer,
                    "Double reviewer failure, defaulting to exclude"
                );
                (
                    false,
                    Decision::Exclude,
                    DOUBLE_FAILURE_CONFIDENCE,
                    Resolution::DoubleFailure,
                )
            }
        };

    debug!(
        reference_id,
        decision = final_decision.as_str(),
        confidence = final_confidence,
        resolution = %resolution,
        "Reconciled reviewer slots"
    );

    ScreeningDecision {
        reference_id: reference_id.to_string(),
        reviewer1: r1,
        reviewer2: r2,
        agreement,
        final_decision,
        final_confidence,
        conflict: !agreement,
        resolution,
        decided_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenwise_common::FailureKind;

    fn result(decision: Decision, confidence: f64) -> ReviewerResult {
        ReviewerResult::new(decision, confidence, "r", "model via provider")
    }

    fn sentinel() -> ReviewerResult {
        ReviewerResult::error_sentinel("model via provider", "HTTP 500", FailureKind::ProviderError)
    }

    #[test]
    fn test_agreement_averages_confidence() {
        let d = reconcile(
            "ref-1",
            result(Decision::Exclude, 0.9),
            result(Decision::Exclude, 0.6),
        );
        assert!(d.agreement);
        assert!(!d.conflict);
        assert_eq!(d.final_decision, Decision::Exclude);
        assert!((d.final_confidence - 0.75).abs() < 1e-9);
        assert_eq!(d.resolution, Resolution::Agreement);
        assert_eq!(d.status().as_str(), "excluded");
    }

    #[test]
    fn test_disagreement_higher_confidence_wins() {
        let d = reconcile(
            "ref-2",
            result(Decision::Include, 0.8),
            result(Decision::Exclude, 0.3),
        );
        assert!(!d.agreement);
        assert!(d.conflict);
        assert_eq!(d.final_decision, Decision::Include);
        assert_eq!(d.final_confidence, 0.8);
        assert_eq!(d.resolution, Resolution::HigherConfidence);

        let d = reconcile(
            "ref-2",
            result(Decision::Include, 0.4),
            result(Decision::Exclude, 0.7),
        );
        assert_eq!(d.final_decision, Decision::Exclude);
        assert_eq!(d.final_confidence, 0.7);
    }

    #[test]
    fn test_tie_resolves_to_exclude_in_either_order() {
        for (a, b) in [
            (Decision::Include, Decision::Exclude),
            (Decision::Exclude, Decision::Include),
        ] {
            let d = reconcile("ref-3", result(a, 0.7), result(b, 0.7));
            assert_eq!(d.final_decision, Decision::Exclude);
            assert_eq!(d.final_confidence, 0.7);
            assert_eq!(d.resolution, Resolution::TieExclude);
            assert!(d.conflict);
        }
    }

    #[test]
    fn test_single_valid_slot_wins() {
        let d = reconcile("ref-4", sentinel(), result(Decision::Include, 0.65));
        assert_eq!(d.final_decision, Decision::Include);
        assert_eq!(d.final_confidence, 0.65);
        assert_eq!(d.resolution, Resolution::SingleValid);
        assert!(!d.agreement);
        assert!(d.conflict);

        let d = reconcile("ref-4", result(Decision::Include, 0.55), sentinel());
        assert_eq!(d.final_decision, Decision::Include);
        assert_eq!(d.final_confidence, 0.55);
    }

    #[test]
    fn test_double_failure_excludes_at_fixed_confidence() {
        let d = reconcile("ref-5", sentinel(), sentinel());
        assert_eq!(d.final_decision, Decision::Exclude);
        assert_eq!(d.final_confidence, DOUBLE_FAILURE_CONFIDENCE);
        assert!(d.is_double_failure());
        assert!(d.conflict);
    }

    #[test]
    fn test_zero_confidence_real_verdict_counts_as_failed() {
        let d = reconcile(
            "ref-6",
            result(Decision::Include, 0.0),
            result(Decision::Exclude, 0.5),
        );
        assert_eq!(d.resolution, Resolution::SingleValid);
        assert_eq!(d.final_decision, Decision::Exclude);
    }

    #[test]
    fn test_invariants_hold_over_a_grid() {
        let confidences = [0.0, 0.1, 0.5, 0.5, 0.9, 1.0];
        for &c1 in &confidences {
            for &c2 in &confidences {
                for d1 in [Decision::Include, Decision::Exclude] {
                    for d2 in [Decision::Include, Decision::Exclude] {
                        let d = reconcile("grid", result(d1, c1), result(d2, c2));
                        assert!((0.0..=1.0).contains(&d.final_confidence));
                        assert_eq!(d.conflict, !d.agreement);
                        if c1 > 0.0 && c2 > 0.0 {
                            assert_eq!(d.agreement, d1 == d2);
                        } else {
                            assert!(!d.agreement);
                        }
                    }
                }
            }
        }
    }
}
