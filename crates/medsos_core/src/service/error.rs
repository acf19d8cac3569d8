//! Dispatch service error surface.
//!
//! # Responsibility
//! - Map storage and state-machine failures onto caller-visible error kinds.
//! - Provide stable `error_code` strings for logs and outer layers.
//!
//! # Invariants
//! - Every variant maps to exactly one `ErrorKind`.
//! - No error is retried by the engine; all are local validation failures
//!   except `Storage`.

use crate::model::geo::CoordinateError;
use crate::model::request::{RequestEvent, RequestId, RequestState, RequesterId, TransitionError};
use crate::model::responder::{ResponderId, ResponderValidationError};
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Caller-visible error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidCoordinate,
    InvalidRadius,
    DuplicateId,
    NotFound,
    InvalidAmount,
    InvalidResponder,
    InvalidTransition,
    ActiveRequestExists,
    InvalidRecord,
    Storage,
}

impl ErrorKind {
    /// Stable snake_case code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidCoordinate => "invalid_coordinate",
            Self::InvalidRadius => "invalid_radius",
            Self::DuplicateId => "duplicate_id",
            Self::NotFound => "not_found",
            Self::InvalidAmount => "invalid_amount",
            Self::InvalidResponder => "invalid_responder",
            Self::InvalidTransition => "invalid_transition",
            Self::ActiveRequestExists => "active_request_exists",
            Self::InvalidRecord => "invalid_record",
            Self::Storage => "storage",
        }
    }
}

/// Error returned by registry, ledgers and the dispatch engine.
#[derive(Debug)]
pub enum DispatchError {
    InvalidCoordinate(CoordinateError),
    /// Radius must be finite, positive and within the configured maximum.
    InvalidRadius {
        radius_km: f64,
        max_radius_km: f64,
    },
    DuplicateResponder(ResponderId),
    ResponderNotFound(ResponderId),
    RequestNotFound(RequestId),
    InvalidAmount(i64),
    /// Responder is not part of the request's candidate snapshot.
    InvalidResponder {
        request_id: RequestId,
        responder_id: ResponderId,
    },
    InvalidTransition {
        request_id: RequestId,
        from: RequestState,
        event: RequestEvent,
    },
    ActiveRequestExists {
        requester_id: RequesterId,
        request_id: RequestId,
    },
    InvalidResponderRecord(ResponderValidationError),
    Repo(RepoError),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCoordinate(_) => ErrorKind::InvalidCoordinate,
            Self::InvalidRadius { .. } => ErrorKind::InvalidRadius,
            Self::DuplicateResponder(_) => ErrorKind::DuplicateId,
            Self::ResponderNotFound(_) | Self::RequestNotFound(_) => ErrorKind::NotFound,
            Self::InvalidAmount(_) => ErrorKind::InvalidAmount,
            Self::InvalidResponder { .. } => ErrorKind::InvalidResponder,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::ActiveRequestExists { .. } => ErrorKind::ActiveRequestExists,
            Self::InvalidResponderRecord(_) => ErrorKind::InvalidRecord,
            Self::Repo(_) => ErrorKind::Storage,
        }
    }

    /// Shorthand for `kind().as_str()`.
    pub fn code(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Lifts a pure state-machine error into the service surface.
    pub fn from_transition(request_id: RequestId, err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidTransition { from, event } => Self::InvalidTransition {
                request_id,
                from,
                event,
            },
            TransitionError::ResponderNotInSnapshot(responder_id) => Self::InvalidResponder {
                request_id,
                responder_id,
            },
        }
    }
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCoordinate(err) => write!(f, "invalid coordinate: {err}"),
            Self::InvalidRadius {
                radius_km,
                max_radius_km,
            } => write!(
                f,
                "search radius {radius_km} km must be between 0 and {max_radius_km} km"
            ),
            Self::DuplicateResponder(id) => write!(f, "responder already registered: {id}"),
            Self::ResponderNotFound(id) => write!(f, "responder not found: {id}"),
            Self::RequestNotFound(id) => write!(f, "request not found: {id}"),
            Self::InvalidAmount(points) => {
                write!(f, "credit amount must be positive, got {points}")
            }
            Self::InvalidResponder {
                request_id,
                responder_id,
            } => write!(
                f,
                "responder `{responder_id}` is not a candidate for request {request_id}"
            ),
            Self::InvalidTransition {
                request_id,
                from,
                event,
            } => write!(
                f,
                "request {request_id}: event `{event}` is not allowed from state `{from}`"
            ),
            Self::ActiveRequestExists {
                requester_id,
                request_id,
            } => write!(
                f,
                "requester `{requester_id}` already has open request {request_id}"
            ),
            Self::InvalidResponderRecord(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidCoordinate(err) => Some(err),
            Self::InvalidResponderRecord(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CoordinateError> for DispatchError {
    fn from(value: CoordinateError) -> Self {
        Self::InvalidCoordinate(value)
    }
}

impl From<ResponderValidationError> for DispatchError {
    fn from(value: ResponderValidationError) -> Self {
        Self::InvalidResponderRecord(value)
    }
}

impl From<RepoError> for DispatchError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::ResponderNotFound(id) => Self::ResponderNotFound(id),
            RepoError::RequestNotFound(id) => Self::RequestNotFound(id),
            RepoError::DuplicateResponder(id) => Self::DuplicateResponder(id),
            RepoError::InvalidAmount(points) => Self::InvalidAmount(points),
            RepoError::Validation(err) => Self::InvalidResponderRecord(err),
            other => Self::Repo(other),
        }
    }
}
