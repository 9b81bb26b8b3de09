//! Checkpoint auto-approval policy.

use agentflow_types::approval::{Confidence, Suggestion};
use agentflow_types::config::AutomationSettings;

/// Outcome of a policy check, with the reason for logging and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    AutoApprove,
    /// Human review required.
    Review(ReviewReason),
}

impl ApprovalDecision {
    pub fn is_auto(self) -> bool {
        matches!(self, Self::AutoApprove)
    }
}

/// Why a checkpoint needs a human. `code()` is what gets persisted as the
/// run's `pause_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewReason {
    BudgetImpact,
    ConfidenceBand,
    BelowThreshold,
    /// The step proposed nothing the policy could score.
    NoSuggestion,
}

impl ReviewReason {
    pub fn code(self) -> &'static str {
        match self {
            Self::BudgetImpact => "budget_impact",
            Self::ConfidenceBand => "low_confidence",
            Self::BelowThreshold => "below_threshold",
            Self::NoSuggestion => "no_suggestion",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::BudgetImpact => "budget impact requires review",
            Self::ConfidenceBand => "confidence below high",
            Self::BelowThreshold => "confidence score below threshold",
            Self::NoSuggestion => "no scored suggestion",
        }
    }
}

/// Decides whether a checkpoint may bypass human review.
///
/// Approves iff confidence is high, the score meets the threshold, and the
/// suggestion has no budget impact. Nothing else approves.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprovalPolicy;

impl AutoApprovalPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(&self, suggestion: &Suggestion, settings: &AutomationSettings) -> ApprovalDecision {
        if suggestion.has_budget_impact {
            return ApprovalDecision::Review(ReviewReason::BudgetImpact);
        }
        if suggestion.confidence != Confidence::High {
            return ApprovalDecision::Review(ReviewReason::ConfidenceBand);
        }
        if suggestion.confidence_score < settings.auto_approval_threshold {
            return ApprovalDecision::Review(ReviewReason::BelowThreshold);
        }
        ApprovalDecision::AutoApprove
    }

    /// Like `decide`, for steps that may not have produced a suggestion.
    pub fn decide_optional(
        &self,
        suggestion: Option<&Suggestion>,
        settings: &AutomationSettings,
    ) -> ApprovalDecision {
        match suggestion {
            Some(suggestion) => self.decide(suggestion, settings),
            None => ApprovalDecision::Review(ReviewReason::NoSuggestion),
        }
    }

    pub fn should_auto_approve(&self, suggestion: &Suggestion, settings: &AutomationSettings) -> bool {
        self.decide(suggestion, settings).is_auto()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestion(confidence: Confidence, score: f64, budget: bool) -> Suggestion {
        Suggestion {
            confidence,
            confidence_score: score,
            has_budget_impact: budget,
        }
    }

    fn settings(threshold: f64) -> AutomationSettings {
        AutomationSettings {
            auto_approval_threshold: threshold,
        }
    }

    #[test]
    fn test_high_confidence_above_threshold_approves() {
        let policy = AutoApprovalPolicy::new();
        assert!(policy.should_auto_approve(&suggestion(Confidence::High, 0.9, false), &settings(0.8)));
        assert!(policy.should_auto_approve(&suggestion(Confidence::High, 0.8, false), &settings(0.8)));
    }

    #[test]
    fn test_budget_impact_never_approves() {
        let policy = AutoApprovalPolicy::new();
        for confidence in [Confidence::Low, Confidence::Medium, Confidence::High] {
            for score in [0.0, 0.5, 0.8, 0.99, 1.0] {
                for threshold in [0.0, 0.5, 1.0] {
                    let decision =
                        policy.decide(&suggestion(confidence, score, true), &settings(threshold));
                    assert_eq!(decision, ApprovalDecision::Review(ReviewReason::BudgetImpact));
                }
            }
        }
    }

    #[test]
    fn test_non_high_band_requires_review() {
        let policy = AutoApprovalPolicy::new();
        assert_eq!(
            policy.decide(&suggestion(Confidence::Medium, 1.0, false), &settings(0.0)),
            ApprovalDecision::Review(ReviewReason::ConfidenceBand)
        );
    }

    #[test]
    fn test_missing_suggestion_requires_review() {
        let policy = AutoApprovalPolicy::new();
        assert_eq!(
            policy.decide_optional(None, &settings(0.0)),
            ApprovalDecision::Review(ReviewReason::NoSuggestion)
        );
        assert_eq!(ReviewReason::NoSuggestion.code(), "no_suggestion");
    }

    #[test]
    fn test_below_threshold_requires_review() {
        let policy = AutoApprovalPolicy::new();
        assert_eq!(
            policy.decide(&suggestion(Confidence::High, 0.79, false), &settings(0.8)),
            ApprovalDecision::Review(ReviewReason::BelowThreshold)
        );
    }
}
