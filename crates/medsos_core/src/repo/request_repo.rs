//! Emergency request storage contract.
//!
//! # Invariants
//! - Stored requests always pass `EmergencyRequest::check_consistency`.
//! - `update_request` replaces the whole record, snapshot included, atomically.
//! - Listings are ordered `created_at DESC, id ASC`.

use crate::model::request::{EmergencyRequest, RequestId, RequestState, RequesterId};
use crate::repo::RepoResult;

/// Query options for listing requests.
#[derive(Debug, Clone, Default)]
pub struct RequestListQuery {
    pub requester_id: Option<RequesterId>,
    /// Only Pending/Dispatched/Contacted.
    pub open_only: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for emergency requests.
pub trait RequestRepository {
    fn insert_request(&self, request: &EmergencyRequest) -> RepoResult<()>;
    /// Fails with `RequestNotFound` when the id is unknown.
    fn update_request(&self, request: &EmergencyRequest) -> RepoResult<()>;
    fn get_request(&self, id: RequestId) -> RepoResult<Option<EmergencyRequest>>;
    fn list_requests(&self, query: &RequestListQuery) -> RepoResult<Vec<EmergencyRequest>>;
    /// Counts requests in any of `states`; an empty slice counts everything.
    fn count_requests(&self, states: &[RequestState]) -> RepoResult<u64>;
}
