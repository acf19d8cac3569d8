//! Reward ledger service.
//!
//! # Responsibility
//! - Award credit points for resolved requests, at most once per request.
//! - Expose grant history and totals.
//!
//! # Invariants
//! - The existence check and the insert for one request id run inside one
//!   critical section.
//! - A repeated grant returns the stored grant unchanged, even if the
//!   caller passes different points or responder.
//! - A failed credit leaves no grant behind (store-level atomicity).

use crate::clock::now_epoch_ms;
use crate::model::request::RequestId;
use crate::model::reward::RewardGrant;
use crate::repo::{normalize_limit, RepoError, RewardRepository};
use crate::service::error::{DispatchError, DispatchResult};
use crate::sync::KeyedLocks;
use log::{info, warn};
use std::sync::Arc;

const DEFAULT_GRANT_HISTORY_LIMIT: u32 = 10;
const MAX_GRANT_HISTORY_LIMIT: u32 = 50;

/// Result of a grant call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// This call recorded the grant and credited the responder.
    Granted(RewardGrant),
    /// A grant already existed; nothing changed.
    AlreadyGranted(RewardGrant),
}

impl GrantOutcome {
    pub fn grant(&self) -> &RewardGrant {
        match self {
            Self::Granted(grant) | Self::AlreadyGranted(grant) => grant,
        }
    }

    pub fn into_grant(self) -> RewardGrant {
        match self {
            Self::Granted(grant) | Self::AlreadyGranted(grant) => grant,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Service over the reward half of a dispatch store.
pub struct RewardLedger<S> {
    store: Arc<S>,
    locks: KeyedLocks<RequestId>,
}

impl<S: RewardRepository> RewardLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Idempotently awards `points` to `responder_id` for `request_id`.
    ///
    /// # Errors
    /// - `ResponderNotFound` / `InvalidAmount` when the credit step fails;
    ///   no grant is recorded in that case.
    pub fn grant(
        &self,
        request_id: RequestId,
        responder_id: &str,
        points: i64,
    ) -> DispatchResult<GrantOutcome> {
        self.locks.with_lock(&request_id, || -> DispatchResult<GrantOutcome> {
            if let Some(existing) = self.store.get_grant(request_id)? {
                info!(
                    "event=reward_grant module=rewards status=duplicate request_id={request_id}"
                );
                return Ok(GrantOutcome::AlreadyGranted(existing));
            }

            let grant = RewardGrant {
                request_id,
                responder_id: responder_id.to_string(),
                points,
                granted_at: now_epoch_ms(),
            };

            match self.store.record_grant(&grant) {
                Ok(total) => {
                    info!(
                        "event=reward_grant module=rewards status=ok request_id={request_id} responder_id={responder_id} points={points} total={total}"
                    );
                    Ok(GrantOutcome::Granted(grant))
                }
                // Another process sharing the database got there first.
                Err(RepoError::DuplicateGrant(_)) => self
                    .store
                    .get_grant(request_id)?
                    .map(GrantOutcome::AlreadyGranted)
                    .ok_or_else(|| {
                        DispatchError::Repo(RepoError::InvalidData(format!(
                            "grant for request {request_id} reported duplicate but is missing"
                        )))
                    }),
                Err(err) => {
                    let err = DispatchError::from(err);
                    warn!(
                        "event=reward_grant module=rewards status=error request_id={request_id} error_code={}",
                        err.code()
                    );
                    Err(err)
                }
            }
        })
    }

    pub fn get(&self, request_id: RequestId) -> DispatchResult<Option<RewardGrant>> {
        Ok(self.store.get_grant(request_id)?)
    }

    /// Grant history for one responder, newest first (default 10, max 50).
    pub fn grants_for_responder(
        &self,
        responder_id: &str,
        limit: Option<u32>,
    ) -> DispatchResult<Vec<RewardGrant>> {
        let limit = normalize_limit(limit, DEFAULT_GRANT_HISTORY_LIMIT, MAX_GRANT_HISTORY_LIMIT);
        Ok(self
            .store
            .list_grants_for_responder(responder_id, Some(limit))?)
    }

    pub fn total_points_awarded(&self) -> DispatchResult<i64> {
        Ok(self.store.total_points_awarded()?)
    }
}
