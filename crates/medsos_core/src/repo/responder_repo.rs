//! Responder storage contract.
//!
//! # Invariants
//! - `insert_responder` validates before writing and never overwrites.
//! - Deactivated responders stay readable but are never dispatchable.
//! - `add_credit` is a single atomic increment.

use crate::model::responder::Responder;
use crate::repo::RepoResult;

/// Sort order for responder listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponderOrder {
    /// `id ASC`.
    #[default]
    Id,
    /// `credit_points DESC, id ASC` (leaderboard order).
    CreditDesc,
}

/// Query options for listing responders.
#[derive(Debug, Clone, Default)]
pub struct ResponderListQuery {
    pub available_only: bool,
    pub include_deactivated: bool,
    pub order: ResponderOrder,
    /// `None` lists everything.
    pub limit: Option<u32>,
}

/// Repository interface for responder records.
pub trait ResponderRepository {
    /// Fails with `DuplicateResponder` if the id exists (active or not).
    fn insert_responder(&self, responder: &Responder) -> RepoResult<()>;
    /// Loads one responder, including deactivated ones.
    fn get_responder(&self, id: &str) -> RepoResult<Option<Responder>>;
    fn list_responders(&self, query: &ResponderListQuery) -> RepoResult<Vec<Responder>>;
    /// Consistent read of every available, active responder.
    fn list_dispatchable(&self) -> RepoResult<Vec<Responder>>;
    /// Fails with `ResponderNotFound` for unknown or deactivated ids.
    fn set_availability(&self, id: &str, available: bool) -> RepoResult<()>;
    /// Adds `points` (> 0) and returns the new total.
    fn add_credit(&self, id: &str, points: i64) -> RepoResult<i64>;
    /// Soft-deactivates and clears availability. Idempotent.
    fn deactivate_responder(&self, id: &str) -> RepoResult<()>;
    /// Counts active responders, optionally only available ones.
    fn count_responders(&self, available_only: bool) -> RepoResult<u64>;
}
