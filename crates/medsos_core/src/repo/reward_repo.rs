//! Reward grant storage contract.
//!
//! # Invariants
//! - One grant per request id; a second insert fails with `DuplicateGrant`.
//! - `record_grant` credits the responder in the same atomic unit. If the
//!   credit fails, no grant row exists afterwards.

use crate::model::request::RequestId;
use crate::model::reward::RewardGrant;
use crate::repo::RepoResult;

/// Repository interface for reward grants.
pub trait RewardRepository {
    fn get_grant(&self, request_id: RequestId) -> RepoResult<Option<RewardGrant>>;
    /// Inserts `grant` and adds its points to the responder; returns the
    /// responder's new credit total.
    fn record_grant(&self, grant: &RewardGrant) -> RepoResult<i64>;
    /// Grants for one responder, newest first.
    fn list_grants_for_responder(
        &self,
        responder_id: &str,
        limit: Option<u32>,
    ) -> RepoResult<Vec<RewardGrant>>;
    fn total_points_awarded(&self) -> RepoResult<i64>;
}
