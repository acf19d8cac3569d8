//! Emergency request ledger.
//!
//! # Responsibility
//! - Create requests and apply state transitions against storage.
//! - Serialize every read-modify-write on one request id.
//!
//! # Invariants
//! - Two transitions on the same request never interleave.
//! - A transition is persisted only if the whole closure succeeds; on error
//!   the stored request is untouched.
//! - With single-active enforcement on, creates for one requester are
//!   serialized so the open-request check cannot race.

use crate::clock::now_epoch_ms;
use crate::model::geo::Coordinate;
use crate::model::request::{EmergencyRequest, RequestId, RequestState, RequesterId};
use crate::repo::{normalize_limit, RequestListQuery, RequestRepository};
use crate::service::error::{DispatchError, DispatchResult};
use crate::sync::KeyedLocks;
use log::info;
use std::sync::Arc;

pub const DEFAULT_HISTORY_LIMIT: u32 = 10;
pub const MAX_HISTORY_LIMIT: u32 = 50;

const OPEN_STATES: [RequestState; 3] = [
    RequestState::Pending,
    RequestState::Dispatched,
    RequestState::Contacted,
];

/// Service over the request half of a dispatch store.
pub struct RequestLedger<S> {
    store: Arc<S>,
    request_locks: KeyedLocks<RequestId>,
    requester_locks: KeyedLocks<RequesterId>,
}

impl<S: RequestRepository> RequestLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            request_locks: KeyedLocks::new(),
            requester_locks: KeyedLocks::new(),
        }
    }

    /// Stores a new `Pending` request.
    pub fn create(
        &self,
        requester_id: &str,
        origin: Coordinate,
        single_active: bool,
    ) -> DispatchResult<EmergencyRequest> {
        origin.validate()?;

        let requester_key = requester_id.to_string();
        let request = self.requester_locks.with_lock(&requester_key, || {
            if single_active {
                self.ensure_no_open_request(requester_id)?;
            }
            let request = EmergencyRequest::new(requester_id, origin, now_epoch_ms());
            self.store.insert_request(&request)?;
            Ok::<_, DispatchError>(request)
        })?;

        info!(
            "event=request_create module=ledger status=ok request_id={} single_active={single_active}",
            request.id
        );
        Ok(request)
    }

    pub fn get(&self, id: RequestId) -> DispatchResult<EmergencyRequest> {
        self.store
            .get_request(id)?
            .ok_or(DispatchError::RequestNotFound(id))
    }

    /// Runs `apply` on a working copy of the request under its lock and
    /// persists the copy only if `apply` succeeds.
    pub fn transition<T>(
        &self,
        id: RequestId,
        apply: impl FnOnce(&mut EmergencyRequest) -> DispatchResult<T>,
    ) -> DispatchResult<T> {
        self.request_locks.with_lock(&id, || -> DispatchResult<T> {
            let mut working = self.get(id)?;
            let output = apply(&mut working)?;
            self.store.update_request(&working)?;
            Ok(output)
        })
    }

    /// Requests of one requester, newest first.
    pub fn history(
        &self,
        requester_id: &str,
        limit: Option<u32>,
    ) -> DispatchResult<Vec<EmergencyRequest>> {
        let query = RequestListQuery {
            requester_id: Some(requester_id.to_string()),
            limit: Some(normalize_limit(limit, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT)),
            ..RequestListQuery::default()
        };
        Ok(self.store.list_requests(&query)?)
    }

    pub fn count_open(&self) -> DispatchResult<u64> {
        Ok(self.store.count_requests(&OPEN_STATES)?)
    }

    pub fn count_in_state(&self, state: RequestState) -> DispatchResult<u64> {
        Ok(self.store.count_requests(&[state])?)
    }

    fn ensure_no_open_request(&self, requester_id: &str) -> DispatchResult<()> {
        let query = RequestListQuery {
            requester_id: Some(requester_id.to_string()),
            open_only: true,
            limit: Some(1),
            offset: 0,
        };
        match self.store.list_requests(&query)?.into_iter().next() {
            Some(open) => Err(DispatchError::ActiveRequestExists {
                requester_id: requester_id.to_string(),
                request_id: open.id,
            }),
            None => Ok(()),
        }
    }
}
