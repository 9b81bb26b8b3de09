//! Work routing: candidate scoring and assignment.
//!
//! Each candidate's combined score is the mean of its skill and capacity
//! scores. The candidates shown for review are every candidate within 90%
//! of the best score. When fewer than three are that close, the next
//! highest scorers fill the list up to three. A wide band is never
//! truncated.

use std::cmp::Ordering;

use agentflow_types::approval::{Confidence, Suggestion};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::workflow::step::{StepError, StepHandler, StepInput, StepOutput};

/// Fraction of the top score a candidate must reach to join the band.
pub const BAND_RATIO: f64 = 0.9;

/// Shortlists are padded to this length when enough candidates exist.
pub const MIN_CANDIDATES: usize = 3;

/// Results key holding the shortlist.
pub const CANDIDATES_KEY: &str = "routing_candidates";

/// Results key holding the final assignment.
pub const ASSIGNMENT_KEY: &str = "assignment";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 0..=100
    pub skill_score: f64,
    /// 0..=100
    pub capacity_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub score: f64,
}

impl ScoredCandidate {
    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{name} (#{})", self.id),
            None => format!("#{}", self.id),
        }
    }
}

pub fn combined_score(skill_score: f64, capacity_score: f64) -> f64 {
    0.5 * skill_score + 0.5 * capacity_score
}

/// Score and sort: highest first, ties by ascending id.
pub fn rank(candidates: &[Candidate]) -> Vec<ScoredCandidate> {
    let mut scored: Vec<_> = candidates
        .iter()
        .map(|c| ScoredCandidate {
            id: c.id,
            name: c.name.clone(),
            score: combined_score(c.skill_score, c.capacity_score),
        })
        .collect();
    scored.sort_by(compare);
    scored
}

fn compare(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score.total_cmp(&a.score).then(a.id.cmp(&b.id))
}

/// Shortlist from a ranking (see module docs).
pub fn select_candidates(mut ranked: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    ranked.sort_by(compare);
    let Some(top) = ranked.first().map(|c| c.score) else {
        return ranked;
    };
    let threshold = top * BAND_RATIO;
    let in_band = ranked.iter().take_while(|c| c.score >= threshold).count();
    ranked.truncate(in_band.max(MIN_CANDIDATES));
    ranked
}

/// Number of shortlisted candidates within the band of the top score.
fn band_size(shortlist: &[ScoredCandidate]) -> usize {
    let Some(top) = shortlist.first().map(|c| c.score) else {
        return 0;
    };
    shortlist
        .iter()
        .filter(|c| c.score >= top * BAND_RATIO)
        .count()
}

// ---------------------------------------------------------------------------
// Step handlers
// ---------------------------------------------------------------------------

/// Scores `input.candidates` and proposes a shortlist for review.
///
/// Confidence follows the top score (0..=100 mapped to 0..=1) and is capped
/// at medium when several candidates are too close to call.
#[derive(Debug, Default)]
pub struct CandidateScoringStep;

impl StepHandler for CandidateScoringStep {
    fn name(&self) -> &str {
        "candidate_scoring"
    }

    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        let candidates: Vec<Candidate> = match input.input_field("candidates") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| StepError::InvalidInput(format!("candidates: {e}")))?,
            None => Vec::new(),
        };

        let shortlist = select_candidates(rank(&candidates));
        let Some(top) = shortlist.first() else {
            return Ok(StepOutput::default()
                .with_field("candidates", json!([]))
                .with_result(CANDIDATES_KEY, json!([]))
                .with_suggestion(Suggestion::default())
                .with_preview("No routing candidates supplied")
                .degraded("no candidates"));
        };

        let band = band_size(&shortlist);
        let score = (top.score / 100.0).clamp(0.0, 1.0);
        let mut confidence = Confidence::from_score(score);
        if band > 1 && confidence == Confidence::High {
            confidence = Confidence::Medium;
        }
        let preview = format!(
            "Assign to {} (score {:.1}); {} candidate(s) shortlisted",
            top.label(),
            top.score,
            shortlist.len()
        );

        tracing::debug!(
            node_id = %input.node_id,
            candidates = candidates.len(),
            shortlisted = shortlist.len(),
            band,
            "scored routing candidates"
        );

        let shortlist_value = serde_json::to_value(&shortlist)
            .map_err(|e| StepError::Internal(e.to_string()))?;
        Ok(StepOutput::default()
            .with_field("candidates", shortlist_value.clone())
            .with_field("top_score", json!(top.score))
            .with_field("band_threshold", json!(top.score * BAND_RATIO))
            .with_field("in_band", json!(band))
            .with_result(CANDIDATES_KEY, shortlist_value)
            .with_suggestion(Suggestion {
                confidence,
                confidence_score: score,
                has_budget_impact: false,
            })
            .with_preview(preview))
    }
}

/// Picks the assignee: the first approved item when a reviewer chose one,
/// otherwise the top of the shortlist.
#[derive(Debug, Default)]
pub struct AssignmentStep;

impl AssignmentStep {
    fn chosen_id(input: &StepInput) -> Option<i64> {
        let item = input
            .approval
            .as_ref()
            .and_then(|a| a.approved_items.as_ref())
            .and_then(|items| items.first())?;
        match item {
            Value::Number(n) => n.as_i64(),
            Value::Object(map) => map.get("id").and_then(Value::as_i64),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl StepHandler for AssignmentStep {
    fn name(&self) -> &str {
        "assignment_finalizer"
    }

    async fn execute(&self, input: &StepInput) -> Result<StepOutput, StepError> {
        let shortlist: Vec<ScoredCandidate> = match input.results.get(CANDIDATES_KEY) {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| StepError::InvalidInput(format!("{CANDIDATES_KEY}: {e}")))?,
            None => Vec::new(),
        };

        let chosen = match Self::chosen_id(input) {
            Some(id) => Some(
                shortlist
                    .iter()
                    .find(|c| c.id == id)
                    .cloned()
                    .unwrap_or(ScoredCandidate {
                        id,
                        name: None,
                        score: 0.0,
                    }),
            ),
            None => shortlist.first().cloned(),
        };

        let Some(chosen) = chosen else {
            return Ok(StepOutput::default()
                .with_result(ASSIGNMENT_KEY, Value::Null)
                .degraded("nothing to assign"));
        };

        let assignment = json!({
            "candidate_id": chosen.id,
            "name": chosen.name,
            "score": chosen.score,
            "approved_by": input.approval.as_ref().map(|a| a.approver_id.clone()),
        });
        Ok(StepOutput::default()
            .with_field("candidate_id", json!(chosen.id))
            .with_result(ASSIGNMENT_KEY, assignment))
    }
}
