use crate::slip::{Action, SlipKind, SlipState};

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("{kind} slip cannot `{action}` from state `{state}`")]
    InvalidStateTransition {
        kind: SlipKind,
        action: Action,
        state: SlipState,
    },
    #[error("{actor} is not allowed to {operation}")]
    PermissionDenied { actor: String, operation: String },
    #[error("{kind} slip #{id} does not exist")]
    NotFound { kind: SlipKind, id: u64 },
    #[error("slip can only be edited in draft or rejected state, it is `{state}`")]
    NotEditable { state: SlipState },
    #[error("invalid line item: {0}")]
    InvalidItem(String),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("unknown state `{0}`")]
    UnknownState(String),
    #[error(transparent)]
    Store(StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("slip #{id} was modified concurrently")]
    Conflict { id: u64 },
    #[error("{kind} slip #{id} does not exist")]
    NotFound { kind: SlipKind, id: u64 },
    #[error("store unavailable: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode slip: {0}")]
    Encode(String),
    #[error("failed to decode slip: {0}")]
    Decode(#[from] minicbor::decode::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum NotificationError {
    #[error("notification has no recipients")]
    NoRecipients,
    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),
    #[error("notification queue is closed")]
    QueueClosed,
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { kind, id } => WorkflowError::NotFound { kind, id },
            other => WorkflowError::Store(other),
        }
    }
}
