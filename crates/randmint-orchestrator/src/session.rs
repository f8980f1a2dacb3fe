//! Mint session state machine.

use chrono::{DateTime, Utc};
use randmint_core::{
    FinalizedArtifact, FulfillmentRecord, MintError, MintRequest, MintState, Result,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A state change of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Option<MintState>,
    pub to: MintState,
    pub at: DateTime<Utc>,
}

/// One attempt at driving a mint from "create" to "finalize".
///
/// Every state change goes through [`MintSession::transition`], which
/// rejects edges the state machine does not allow and leaves the session
/// untouched when it does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintSession {
    /// Unique ID for this session.
    pub id: Uuid,

    /// When the session started.
    pub started_at: DateTime<Utc>,

    state: MintState,
    history: Vec<Transition>,
    request: Option<MintRequest>,
    fulfillment: Option<FulfillmentRecord>,
    artifact: Option<FinalizedArtifact>,

    /// State the session was in when it failed.
    failed_from: Option<MintState>,

    /// Set when this session picks up a request issued by an earlier one.
    resumed: bool,
}

impl MintSession {
    /// A fresh session in `Created`.
    pub fn new() -> Self {
        Self::starting_at(MintState::Created, None, false)
    }

    /// A session waiting on a request issued earlier. The request itself
    /// stays valid on chain after a timeout or cancellation.
    pub fn resume(request: MintRequest) -> Self {
        tracing::info!(
            request_id = %request.request_id,
            token_id = request.token_id,
            "Resuming mint session"
        );
        Self::starting_at(MintState::AwaitingFulfillment, Some(request), true)
    }

    /// A session for a request whose fulfillment was accepted earlier but
    /// never finalized. It starts at `Fulfilled` so only "finalize" remains.
    pub fn resume_fulfilled(request: MintRequest, fulfillment: FulfillmentRecord) -> Self {
        tracing::info!(
            request_id = %request.request_id,
            token_id = request.token_id,
            "Resuming fulfilled mint session"
        );
        let mut session = Self::starting_at(MintState::Fulfilled, Some(request), true);
        session.fulfillment = Some(fulfillment);
        session
    }

    fn starting_at(state: MintState, request: Option<MintRequest>, resumed: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            started_at: now,
            state,
            history: vec![Transition {
                from: None,
                to: state,
                at: now,
            }],
            request,
            fulfillment: None,
            artifact: None,
            failed_from: None,
            resumed,
        }
    }

    pub fn state(&self) -> MintState {
        self.state
    }

    /// States visited, in order, starting with the initial one.
    pub fn states(&self) -> Vec<MintState> {
        self.history.iter().map(|t| t.to).collect()
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn request(&self) -> Option<&MintRequest> {
        self.request.as_ref()
    }

    pub fn fulfillment(&self) -> Option<&FulfillmentRecord> {
        self.fulfillment.as_ref()
    }

    pub fn artifact(&self) -> Option<&FinalizedArtifact> {
        self.artifact.as_ref()
    }

    pub fn failed_from(&self) -> Option<MintState> {
        self.failed_from
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Move to `next` if the state machine allows it.
    pub fn transition(&mut self, next: MintState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(MintError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::debug!(session = %self.id, from = %self.state, to = %next, "Mint state transition");
        self.history.push(Transition {
            from: Some(self.state),
            to: next,
            at: Utc::now(),
        });
        self.state = next;
        Ok(())
    }

    /// `Created -> Requested` once "create" is confirmed.
    pub fn record_request(&mut self, request: MintRequest) -> Result<()> {
        self.transition(MintState::Requested)?;
        self.request = Some(request);
        Ok(())
    }

    /// `Requested -> AwaitingFulfillment`.
    pub fn begin_waiting(&mut self) -> Result<()> {
        self.transition(MintState::AwaitingFulfillment)
    }

    /// `AwaitingFulfillment -> Fulfilled`, only for the outstanding request
    /// and only once.
    pub fn accept_fulfillment(&mut self, record: FulfillmentRecord) -> Result<()> {
        if let Some(accepted) = &self.fulfillment {
            return Err(MintError::DuplicateFulfillment {
                request_id: accepted.request_id.clone(),
            });
        }

        let expected = self
            .request
            .as_ref()
            .map(|r| r.request_id.clone())
            .ok_or(MintError::InvalidTransition {
                from: self.state,
                to: MintState::Fulfilled,
            })?;
        if record.request_id != expected {
            return Err(MintError::FulfillmentMismatch {
                expected,
                received: record.request_id,
            });
        }

        self.transition(MintState::Fulfilled)?;
        self.fulfillment = Some(record);
        Ok(())
    }

    /// `Fulfilled -> Finalized`.
    pub fn record_artifact(&mut self, artifact: FinalizedArtifact) -> Result<()> {
        self.transition(MintState::Finalized)?;
        self.artifact = Some(artifact);
        Ok(())
    }

    /// Move to `Failed`, remembering where the session stopped. No effect
    /// on a session that already reached a terminal state.
    pub fn fail(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        let from = self.state;
        if self.transition(MintState::Failed).is_ok() {
            self.failed_from = Some(from);
        }
    }

    /// True if the session stopped after issuing its request but before
    /// finalizing.
    pub fn is_resumable(&self) -> bool {
        self.state == MintState::Failed && self.request.is_some() && self.artifact.is_none()
    }

    /// The session to continue this one with, if it is resumable. A
    /// fulfillment already accepted is carried over.
    pub fn resumption(&self) -> Option<MintSession> {
        if !self.is_resumable() {
            return None;
        }
        let request = self.request.clone()?;
        Some(match &self.fulfillment {
            Some(record) => Self::resume_fulfilled(request, record.clone()),
            None => Self::resume(request),
        })
    }
}

impl Default for MintSession {
    fn default() -> Self {
        Self::new()
    }
}
