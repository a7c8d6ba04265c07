use thiserror::Error;

use crate::domain::inventory::MaterialId;
use crate::domain::request::{Action, RequestId, RequestStatus, Role};

/// Failure of a storage port implementation. Anything here is an
/// infrastructure problem, not a business-rule rejection, and propagates to
/// the caller for retry/backoff.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored value could not be decoded: {0}")]
    Decode(String),
}

/// The engine's error taxonomy. Every variant except `Storage` is a
/// business-rule rejection that leaves zero persisted side effects.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("service request not found: {0:?}")]
    NotFound(RequestId),
    #[error("unknown or inactive material: {0:?}")]
    UnknownMaterial(MaterialId),
    #[error("role {actual:?} may not perform {action:?} (requires {required:?})")]
    Forbidden { action: Action, required: Role, actual: Role },
    #[error("action {action:?} is not legal from status {status:?}")]
    InvalidTransition { status: RequestStatus, action: Action },
    #[error("insufficient stock for material {material_id:?}: requested {requested}, available {available}")]
    InsufficientStock { material_id: MaterialId, requested: u32, available: u32 },
    #[error("consume of {requested} exceeds the reservation of {reserved} for material {material_id:?}")]
    ExceedsReservation { material_id: MaterialId, requested: u32, reserved: u32 },
    #[error("transition lost the update race; reload and retry")]
    Conflict,
    #[error("transition payload is missing required field `{field}`")]
    MissingPayloadField { field: &'static str },
    #[error("completion rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl WorkflowError {
    /// Callers may retry a `Conflict` after reloading the request; every
    /// other variant is terminal for the attempted call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}
