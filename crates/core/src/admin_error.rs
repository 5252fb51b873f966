//! Typed errors for administrative corrective actions.

use serde::Serialize;

use crate::classify::{Classify, ErrorKind};
use crate::types::{DbId, Timestamp};

/// Where and by whom a failed administrative action was attempted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationContext {
    /// Action name, e.g. `"reassign"`.
    pub action: String,
    pub timestamp: Timestamp,
    pub actor_id: Option<DbId>,
    /// Ids of the entities the action targeted (request id, assignee id, ...).
    pub subject_ids: Vec<String>,
    pub metadata: serde_json::Value,
}

impl OperationContext {
    pub fn new(action: impl Into<String>, actor_id: Option<DbId>) -> Self {
        Self {
            action: action.into(),
            timestamp: chrono::Utc::now(),
            actor_id,
            subject_ids: Vec::new(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_subject(mut self, id: impl ToString) -> Self {
        self.subject_ids.push(id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A classified failure of an administrative action. Logged and returned,
/// never persisted.
#[derive(Debug, thiserror::Error)]
#[error("{action} failed ({code}): {message}", action = .context.action)]
pub struct AdminOperationError {
    pub code: ErrorKind,
    pub message: String,
    pub context: OperationContext,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AdminOperationError {
    pub fn new(code: ErrorKind, message: impl Into<String>, context: OperationContext) -> Self {
        Self {
            code,
            message: message.into(),
            context,
            source: None,
        }
    }

    /// Classify `err` and wrap it with `context`.
    pub fn from_failure<E>(err: E, context: OperationContext) -> Self
    where
        E: Classify + std::error::Error + Send + Sync + 'static,
    {
        Self {
            code: err.error_kind(),
            message: err.to_string(),
            context,
            source: Some(Box::new(err)),
        }
    }
}

impl Classify for AdminOperationError {
    fn error_kind(&self) -> ErrorKind {
        self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn wraps_classified_failure_with_context() {
        let ctx = OperationContext::new("reassign", Some(1))
            .with_subject("req-1")
            .with_subject(42);
        let err = AdminOperationError::from_failure(
            CoreError::Conflict("already assigned".into()),
            ctx,
        );
        assert_eq!(err.code, ErrorKind::Conflict);
        assert_eq!(err.context.subject_ids, vec!["req-1", "42"]);
        assert!(err.to_string().starts_with("reassign failed (CONFLICT)"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
