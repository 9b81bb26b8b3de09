use thiserror::Error;

use crate::workflow::WorkflowStatus;

/// Errors from repository operations (used by trait definitions in agentflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Rejected state transition. The state it was attempted on is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot resume workflow in status '{0}': only paused workflows can be resumed")]
    NotPaused(WorkflowStatus),

    #[error("workflow is in terminal status '{0}'")]
    Terminal(WorkflowStatus),

    #[error("malformed approval payload: {0}")]
    MalformedPayload(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_transition_error_display() {
        let err = TransitionError::NotPaused(WorkflowStatus::Completed);
        assert_eq!(
            err.to_string(),
            "cannot resume workflow in status 'completed': only paused workflows can be resumed"
        );
    }
}
