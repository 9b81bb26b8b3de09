//! Checkpoint approval types.
//!
//! A checkpoint that cannot be auto-approved pauses its run and files a
//! `CheckpointApprovalRequest` in the approval inbox. A human decision is
//! delivered back to the engine as an `ApprovalPayload`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::TransitionError;

// ---------------------------------------------------------------------------
// Suggestions and confidence
// ---------------------------------------------------------------------------

/// Qualitative confidence band on an AI-produced suggestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Band for a numeric score: `>= 0.8` high, `>= 0.5` medium.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// What a checkpoint step proposes, as seen by the auto-approval policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub confidence: Confidence,
    /// In `[0, 1]`.
    pub confidence_score: f64,
    pub has_budget_impact: bool,
}

/// How soon a human should look at a pending checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Normal,
    High,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
        }
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(format!("unknown urgency '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbox requests
// ---------------------------------------------------------------------------

/// Lifecycle of an approval ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown approval status '{other}'")),
        }
    }
}

/// Polymorphic reference to the thing awaiting approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovableRef {
    /// e.g. `"workflow_state"`.
    pub approvable_type: String,
    pub approvable_id: String,
}

impl ApprovableRef {
    pub fn workflow_state(id: Uuid) -> Self {
        Self {
            approvable_type: "workflow_state".to_string(),
            approvable_id: id.to_string(),
        }
    }
}

/// A pending (or resolved) human review of a paused checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointApprovalRequest {
    pub id: Uuid,
    pub approvable: ApprovableRef,
    pub team_id: String,
    pub workflow_type: String,
    /// Checkpoint node the run paused on.
    pub node_id: String,
    /// Short human-readable preview of what is being approved.
    pub preview: String,
    pub confidence: Confidence,
    pub confidence_score: f64,
    pub urgency: Urgency,
    pub status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Human decision delivered to `resume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub approved: bool,
    pub approver_id: String,
    /// Subset of proposed items that were accepted, when the checkpoint
    /// offered alternatives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_items: Option<Vec<Value>>,
}

impl ApprovalPayload {
    pub fn approve(approver_id: impl Into<String>) -> Self {
        Self {
            approved: true,
            approver_id: approver_id.into(),
            approved_items: None,
        }
    }

    pub fn reject(approver_id: impl Into<String>) -> Self {
        Self {
            approved: false,
            approver_id: approver_id.into(),
            approved_items: None,
        }
    }

    pub fn with_items(mut self, items: Vec<Value>) -> Self {
        self.approved_items = Some(items);
        self
    }

    pub fn validate(&self) -> Result<(), TransitionError> {
        if self.approver_id.trim().is_empty() {
            return Err(TransitionError::MalformedPayload(
                "approver_id must not be empty".to_string(),
            ));
        }
        if !self.approved && self.approved_items.as_ref().is_some_and(|i| !i.is_empty()) {
            return Err(TransitionError::MalformedPayload(
                "a rejection cannot carry approved items".to_string(),
            ));
        }
        Ok(())
    }
}

/// Approval recorded in `state_data.approval_data` once a run resumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalData {
    pub approved: bool,
    pub approver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_items: Option<Vec<Value>>,
    /// Checkpoint node the decision applies to.
    pub node_id: String,
    pub decided_at: DateTime<Utc>,
}
