//! Storage contracts and their in-memory and SQLite implementations.
//!
//! # Responsibility
//! - Define the persistence substrate the registry and ledgers run on.
//! - Keep storage details (maps, SQL) away from dispatch orchestration.
//!
//! # Invariants
//! - Every single call is atomic with respect to other calls on the store.
//! - `RewardRepository::record_grant` applies grant and credit together or
//!   not at all.
//! - Write paths validate records before they are stored; read paths reject
//!   invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::request::{RequestId, RequestState};
use crate::model::responder::{ResponderId, ResponderValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory_store;
pub mod request_repo;
pub mod responder_repo;
pub mod reward_repo;
pub mod sqlite_store;

pub use memory_store::MemoryStore;
pub use request_repo::{RequestListQuery, RequestRepository};
pub use responder_repo::{ResponderListQuery, ResponderOrder, ResponderRepository};
pub use reward_repo::RewardRepository;
pub use sqlite_store::SqliteStore;

pub type RepoResult<T> = Result<T, RepoError>;

/// Storage-level error shared by all repository contracts.
#[derive(Debug)]
pub enum RepoError {
    ResponderNotFound(ResponderId),
    RequestNotFound(RequestId),
    DuplicateResponder(ResponderId),
    DuplicateRequest(RequestId),
    DuplicateGrant(RequestId),
    /// Credit amounts must be strictly positive.
    InvalidAmount(i64),
    Validation(ResponderValidationError),
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResponderNotFound(id) => write!(f, "responder not found: {id}"),
            Self::RequestNotFound(id) => write!(f, "request not found: {id}"),
            Self::DuplicateResponder(id) => write!(f, "responder already registered: {id}"),
            Self::DuplicateRequest(id) => write!(f, "request already exists: {id}"),
            Self::DuplicateGrant(id) => write!(f, "reward already granted for request {id}"),
            Self::InvalidAmount(points) => {
                write!(f, "credit amount must be positive, got {points}")
            }
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResponderValidationError> for RepoError {
    fn from(value: ResponderValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Full persistence substrate required by the dispatch engine.
pub trait DispatchStore:
    ResponderRepository + RequestRepository + RewardRepository + Send + Sync
{
}

impl<T> DispatchStore for T where
    T: ResponderRepository + RequestRepository + RewardRepository + Send + Sync
{
}

pub(crate) fn ensure_positive_points(points: i64) -> RepoResult<()> {
    if points <= 0 {
        return Err(RepoError::InvalidAmount(points));
    }
    Ok(())
}

/// Applies the default and upper bound used by every list query.
pub(crate) fn normalize_limit(limit: Option<u32>, default: u32, max: u32) -> u32 {
    match limit {
        None | Some(0) => default,
        Some(value) => value.min(max),
    }
}

/// Whether `state` counts as an open (non-terminal) request.
pub(crate) fn is_open(state: RequestState) -> bool {
    !state.is_terminal()
}

#[cfg(test)]
mod tests {
    use super::{ensure_positive_points, normalize_limit, RepoError};

    #[test]
    fn non_positive_points_are_rejected() {
        assert!(matches!(
            ensure_positive_points(0),
            Err(RepoError::InvalidAmount(0))
        ));
        assert!(ensure_positive_points(-5).is_err());
        assert!(ensure_positive_points(1).is_ok());
    }

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(normalize_limit(None, 10, 50), 10);
        assert_eq!(normalize_limit(Some(0), 10, 50), 10);
        assert_eq!(normalize_limit(Some(75), 10, 50), 50);
        assert_eq!(normalize_limit(Some(3), 10, 50), 3);
    }
}
