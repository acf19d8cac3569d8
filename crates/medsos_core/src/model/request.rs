//! Emergency request model and its state machine.
//!
//! # Responsibility
//! - Define the request record owned by the request ledger.
//! - Encode every legal transition as a method; everything else is rejected.
//!
//! # Invariants
//! - Transition methods either succeed fully or leave `self` untouched.
//! - Resolved and Abandoned are terminal.
//! - Contacted/Resolved requests reference a responder in their own snapshot.
//! - `Dispatch` may repeat only while the request is still `Dispatched`.

use crate::model::geo::Coordinate;
use crate::model::responder::ResponderId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Engine-allocated request identifier.
pub type RequestId = Uuid;

/// Identity-layer user id of the person asking for help.
pub type RequesterId = String;

/// Lifecycle state of an emergency request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Dispatched,
    Contacted,
    Resolved,
    Abandoned,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Abandoned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatched => "dispatched",
            Self::Contacted => "contacted",
            Self::Resolved => "resolved",
            Self::Abandoned => "abandoned",
        }
    }
}

impl Display for RequestState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-triggered event applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestEvent {
    Dispatch,
    MarkContacted,
    Resolve,
    Abandon,
}

impl RequestEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::MarkContacted => "mark_contacted",
            Self::Resolve => "resolve",
            Self::Abandon => "abandon",
        }
    }
}

impl Display for RequestEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked entry in a candidate snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub responder_id: ResponderId,
    pub distance_km: f64,
}

/// Emergency request record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyRequest {
    pub id: RequestId,
    pub requester_id: RequesterId,
    pub origin: Coordinate,
    pub state: RequestState,
    /// Ranked at dispatch time; frozen once a responder is contacted.
    pub candidate_snapshot: Vec<Candidate>,
    pub contacted_responder_id: Option<ResponderId>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. Set only for `Resolved`.
    pub resolved_at: Option<i64>,
}

/// Pure state machine rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Event is not allowed from the current state.
    InvalidTransition {
        from: RequestState,
        event: RequestEvent,
    },
    /// Responder is not part of the candidate snapshot.
    ResponderNotInSnapshot(ResponderId),
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { from, event } => {
                write!(f, "event `{event}` is not allowed from state `{from}`")
            }
            Self::ResponderNotInSnapshot(id) => {
                write!(f, "responder `{id}` is not in the candidate snapshot")
            }
        }
    }
}

impl Error for TransitionError {}

impl EmergencyRequest {
    /// Creates a `Pending` request with a fresh id.
    pub fn new(requester_id: impl Into<RequesterId>, origin: Coordinate, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            requester_id: requester_id.into(),
            origin,
            state: RequestState::Pending,
            candidate_snapshot: Vec::new(),
            contacted_responder_id: None,
            created_at,
            resolved_at: None,
        }
    }

    /// Checks whether `event` is legal from the current state.
    pub fn ensure_allows(&self, event: RequestEvent) -> Result<(), TransitionError> {
        let allowed = match (self.state, event) {
            (RequestState::Pending | RequestState::Dispatched, RequestEvent::Dispatch) => true,
            (RequestState::Dispatched, RequestEvent::MarkContacted) => true,
            (RequestState::Contacted, RequestEvent::Resolve) => true,
            (
                RequestState::Pending | RequestState::Dispatched | RequestState::Contacted,
                RequestEvent::Abandon,
            ) => true,
            _ => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                from: self.state,
                event,
            })
        }
    }

    /// Attaches (or replaces) the candidate snapshot and moves to `Dispatched`.
    pub fn dispatch(&mut self, snapshot: Vec<Candidate>) -> Result<(), TransitionError> {
        self.ensure_allows(RequestEvent::Dispatch)?;
        self.candidate_snapshot = snapshot;
        self.state = RequestState::Dispatched;
        Ok(())
    }

    /// Records the engaged responder and moves to `Contacted`.
    pub fn mark_contacted(&mut self, responder_id: &str) -> Result<&Candidate, TransitionError> {
        self.ensure_allows(RequestEvent::MarkContacted)?;
        let position = self
            .candidate_snapshot
            .iter()
            .position(|candidate| candidate.responder_id == responder_id)
            .ok_or_else(|| TransitionError::ResponderNotInSnapshot(responder_id.to_string()))?;

        self.contacted_responder_id = Some(responder_id.to_string());
        self.state = RequestState::Contacted;
        Ok(&self.candidate_snapshot[position])
    }

    /// Returns the responder a resolution would reward, without mutating.
    pub fn resolution_target(&self) -> Result<&str, TransitionError> {
        self.ensure_allows(RequestEvent::Resolve)?;
        self.contacted_responder_id
            .as_deref()
            .ok_or(TransitionError::InvalidTransition {
                from: self.state,
                event: RequestEvent::Resolve,
            })
    }

    /// Moves to `Resolved` and stamps `resolved_at`.
    pub fn resolve(&mut self, resolved_at: i64) -> Result<(), TransitionError> {
        self.resolution_target()?;
        self.state = RequestState::Resolved;
        self.resolved_at = Some(resolved_at);
        Ok(())
    }

    /// Cancels a non-terminal request.
    pub fn abandon(&mut self) -> Result<(), TransitionError> {
        self.ensure_allows(RequestEvent::Abandon)?;
        self.state = RequestState::Abandoned;
        Ok(())
    }

    /// Looks up one snapshot entry by responder id.
    pub fn candidate(&self, responder_id: &str) -> Option<&Candidate> {
        self.candidate_snapshot
            .iter()
            .find(|candidate| candidate.responder_id == responder_id)
    }

    /// Checks structural invariants of a stored record.
    ///
    /// Used by storage read paths to reject corrupt rows.
    pub fn check_consistency(&self) -> Result<(), String> {
        self.origin
            .validate()
            .map_err(|err| format!("request {}: {err}", self.id))?;

        match self.state {
            RequestState::Contacted | RequestState::Resolved => {
                let contacted = self.contacted_responder_id.as_deref().ok_or_else(|| {
                    format!("request {} in state {} has no contacted responder", self.id, self.state)
                })?;
                if self.candidate(contacted).is_none() {
                    return Err(format!(
                        "request {} contacted responder `{contacted}` outside its snapshot",
                        self.id
                    ));
                }
            }
            RequestState::Pending | RequestState::Dispatched => {
                if self.contacted_responder_id.is_some() {
                    return Err(format!(
                        "request {} in state {} has a contacted responder",
                        self.id, self.state
                    ));
                }
            }
            RequestState::Abandoned => {}
        }

        if self.resolved_at.is_some() != (self.state == RequestState::Resolved) {
            return Err(format!(
                "request {} resolved_at does not match state {}",
                self.id, self.state
            ));
        }

        Ok(())
    }
}
