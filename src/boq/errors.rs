use thiserror::Error;

use super::actions::Action;
use super::types::{BoqId, FlagViolation, StageFlags};

/// Whole-operation failures of the lifecycle controller
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{action} is not available ({expected}); current flags: {flags}")]
    PreconditionViolation {
        action: Action,
        expected: &'static str,
        flags: StageFlags,
    },

    #[error("{service} failed: {source}")]
    CollaboratorFailure {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("record {id} has inconsistent stage flags: {violations:?}")]
    InvalidRecord {
        id: BoqId,
        violations: Vec<FlagViolation>,
    },
}

impl LifecycleError {
    pub fn precondition(action: Action, flags: StageFlags) -> Self {
        LifecycleError::PreconditionViolation {
            action,
            expected: action.precondition(),
            flags,
        }
    }

    pub fn collaborator(service: &'static str, source: anyhow::Error) -> Self {
        LifecycleError::CollaboratorFailure { service, source }
    }

    /// Caller offered an action that was not legal; never retried
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            LifecycleError::PreconditionViolation { .. } | LifecycleError::InvalidRecord { .. }
        )
    }
}

/// Errors raised by record stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(BoqId),

    #[error("record {0} already exists")]
    AlreadyExists(BoqId),

    #[error("version conflict on {id}: expected {expected}, found {found}")]
    VersionConflict { id: BoqId, expected: u64, found: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("lock acquisition failed: {reason}")]
    Lock { reason: String },
}

/// Why a single imported row was rejected
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum RowError {
    #[error("missing required column '{column}'")]
    MissingField { column: String },

    #[error("column '{column}' is not a number: '{value}'")]
    InvalidNumber { column: String, value: String },

    #[error("column '{column}' must not be negative: {value}")]
    NegativeValue { column: String, value: f64 },

    #[error("duplicate {field} '{value}': already on the record or earlier in the file")]
    Duplicate { field: String, value: String },
}
