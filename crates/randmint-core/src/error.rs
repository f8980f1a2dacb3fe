//! Error types for randmint.

use thiserror::Error;

use crate::types::{Address, MintState, NetworkId, RequestId, TxHash, WorkflowStep};

/// Broad classification used for retry and exit decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unknown network, missing mock, invalid settings. Never retried.
    Configuration,
    /// Timeouts and connection failures. Retried with backoff.
    Transient,
    /// A transaction was confirmed as reverted, or a precondition failed.
    Rejection,
    /// A fulfillment did not arrive in time. Resumable.
    Timeout,
    /// The log layout did not match the minting program.
    Extraction,
    /// The mint state machine refused an input.
    Protocol,
    /// Everything else.
    Internal,
}

/// Main error type for randmint operations.
#[derive(Error, Debug, Clone)]
pub enum MintError {
    /// No network table entry for this identifier.
    #[error("Unknown network {network}: no entry in the network table")]
    UnknownNetwork { network: NetworkId },

    /// A test network was selected but its mocks were never deployed.
    #[error("Mock program '{name}' was never deployed on network {network}")]
    MissingMock { network: NetworkId, name: String },

    /// Configuration rejected at load time.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Timeout or connection failure talking to the ledger.
    #[error("Transient network error during {operation}: {message}")]
    TransientNetwork { operation: String, message: String },

    /// A transaction was confirmed as reverted.
    #[error("Call '{call}' reverted: {reason}")]
    ConfirmedRejection {
        call: String,
        tx_hash: Option<TxHash>,
        reason: String,
    },

    /// The operator does not hold enough fee token.
    #[error("Insufficient fee-token balance: required {required}, available {available}")]
    InsufficientBalance { required: u128, available: u128 },

    /// The funding transfer reverted.
    #[error("Transfer of {amount} to {target} rejected: {reason}")]
    TransferRejected {
        target: Address,
        amount: u128,
        reason: String,
    },

    /// The fulfillment callback was not observed in time.
    #[error("Fulfillment of request {request_id} not observed after {waited_ms}ms")]
    FulfillmentTimeout { request_id: RequestId, waited_ms: u64 },

    /// A fulfillment arrived for a request other than the outstanding one.
    #[error("Fulfillment for request {received} does not match outstanding request {expected}")]
    FulfillmentMismatch {
        expected: RequestId,
        received: RequestId,
    },

    /// A second fulfillment arrived for the same request.
    #[error("Request {request_id} was already fulfilled")]
    DuplicateFulfillment { request_id: RequestId },

    /// The expected log shape was absent.
    #[error("Could not extract '{field}' from '{event}' log: {message}")]
    Extraction {
        event: String,
        field: String,
        message: String,
    },

    /// The state machine refused a transition.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: MintState, to: MintState },

    /// An external abort stopped the operation.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Deployment registry error.
    #[error("Deployment registry error: {message}")]
    Registry { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),

    /// A fatal error surfaced at the top of the workflow.
    #[error(
        "Workflow failed in state {state} (last confirmed step: {}): {source}",
        checkpoint_label(.last_checkpoint)
    )]
    Workflow {
        state: MintState,
        last_checkpoint: Option<WorkflowStep>,
        source: Box<MintError>,
    },
}

fn checkpoint_label(step: &Option<WorkflowStep>) -> String {
    step.map(|s| s.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl MintError {
    /// Shorthand for a transient ledger failure.
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        MintError::TransientNetwork {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a reverted call.
    pub fn rejected(call: impl Into<String>, tx_hash: Option<TxHash>, reason: impl Into<String>) -> Self {
        MintError::ConfirmedRejection {
            call: call.into(),
            tx_hash,
            reason: reason.into(),
        }
    }

    /// Shorthand for a missing or malformed log field.
    pub fn extraction(event: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        MintError::Extraction {
            event: event.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// The innermost error, looking through `Workflow` wrappers.
    pub fn root(&self) -> &MintError {
        match self {
            MintError::Workflow { source, .. } => source.root(),
            other => other,
        }
    }

    /// Classification of the innermost error.
    pub fn category(&self) -> ErrorCategory {
        match self.root() {
            MintError::UnknownNetwork { .. }
            | MintError::MissingMock { .. }
            | MintError::InvalidConfig { .. } => ErrorCategory::Configuration,
            MintError::TransientNetwork { .. } => ErrorCategory::Transient,
            MintError::ConfirmedRejection { .. }
            | MintError::InsufficientBalance { .. }
            | MintError::TransferRejected { .. } => ErrorCategory::Rejection,
            MintError::FulfillmentTimeout { .. } | MintError::Cancelled(_) => ErrorCategory::Timeout,
            MintError::Extraction { .. } => ErrorCategory::Extraction,
            MintError::FulfillmentMismatch { .. }
            | MintError::DuplicateFulfillment { .. }
            | MintError::InvalidTransition { .. } => ErrorCategory::Protocol,
            _ => ErrorCategory::Internal,
        }
    }

    /// Returns true if the failed operation may be retried as-is.
    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Returns true if the workflow can pick up from where it stopped
    /// without starting over.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::Timeout
        )
    }

    /// State the workflow was in when it failed, if wrapped.
    pub fn failed_state(&self) -> Option<MintState> {
        match self {
            MintError::Workflow { state, .. } => Some(*state),
            _ => None,
        }
    }
}

/// Convenience Result type for randmint operations.
pub type Result<T> = std::result::Result<T, MintError>;

impl From<serde_json::Error> for MintError {
    fn from(err: serde_json::Error) -> Self {
        MintError::SerializationError(err.to_string())
    }
}
