use thiserror::Error;

use crate::db::answers::AnswerKeyError;
use crate::repositories::StoreError;

#[derive(Debug, Error)]
pub(crate) enum AssessmentError {
    #[error("{0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(
        "pool bucket '{bucket}' is short by {}: requested {requested}, available {available}",
        shortfall(.requested, .available)
    )]
    InsufficientPool { bucket: String, requested: u32, available: u32 },
    #[error("{0}")]
    PolicyViolation(String),
    #[error("{0}")]
    InvalidStateTransition(String),
    #[error("attempt limit of {max_attempts} reached")]
    AttemptLimitExceeded { max_attempts: i32 },
    #[error("an attempt is already in progress for this quiz")]
    ConcurrentAttemptConflict,
    #[error("score {score} is outside the allowed range 0..={max}")]
    GradingOutOfRange { score: f64, max: f64 },
    #[error("{pending} response(s) are still pending grading")]
    GradingIncomplete { pending: usize },
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn shortfall(requested: &u32, available: &u32) -> u32 {
    requested.saturating_sub(*available)
}

impl AssessmentError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidStateTransition(message.into())
    }

    /// Stable machine-readable code.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::InsufficientPool { .. } => "insufficient_pool",
            Self::PolicyViolation(_) => "policy_violation",
            Self::InvalidStateTransition(_) => "invalid_state_transition",
            Self::AttemptLimitExceeded { .. } => "attempt_limit_exceeded",
            Self::ConcurrentAttemptConflict => "concurrent_attempt_conflict",
            Self::GradingOutOfRange { .. } => "grading_out_of_range",
            Self::GradingIncomplete { .. } => "grading_incomplete",
            Self::Unauthorized(_) => "unauthorized",
            Self::Store(_) => "store_error",
        }
    }

    /// Message safe to hand back inside a batch report. Storage details are
    /// logged instead.
    pub(crate) fn report_message(&self) -> String {
        match self {
            Self::Store(inner) => {
                tracing::error!(error = %inner, "Batch item failed in storage");
                "internal storage error".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Conflicts that a caller may reasonably retry.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentAttemptConflict | Self::InvalidStateTransition(_))
    }
}

impl From<AnswerKeyError> for AssessmentError {
    fn from(err: AnswerKeyError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AssessmentError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}
