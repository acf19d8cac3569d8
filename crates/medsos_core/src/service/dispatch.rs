//! Dispatch engine: the public call surface of the core.
//!
//! # Responsibility
//! - Orchestrate create → dispatch → contact → resolve/abandon.
//! - Snapshot ranked candidates from the registry at dispatch time.
//! - Trigger the reward grant exactly once per resolved request.
//!
//! # Invariants
//! - Every transition runs under the request's lock via `RequestLedger`.
//! - Resolve grants before it stores `Resolved`; a retry after a failed
//!   store hits the idempotent grant instead of paying twice.
//! - No network or timer work happens here; contact and attendance
//!   confirmation are driven by external callers.

use crate::clock::now_epoch_ms;
use crate::config::{ConfigError, DispatchConfig};
use crate::model::geo::Coordinate;
use crate::model::request::{Candidate, EmergencyRequest, RequestEvent, RequestId, RequestState};
use crate::model::responder::{Responder, ResponderId, ResponderRole};
use crate::model::reward::RewardGrant;
use crate::repo::DispatchStore;
use crate::service::error::{DispatchError, DispatchResult};
use crate::service::registry::ResponderRegistry;
use crate::service::request_ledger::RequestLedger;
use crate::service::reward_ledger::RewardLedger;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the dialing collaborator needs after `mark_contacted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactTarget {
    pub request_id: RequestId,
    pub responder_id: ResponderId,
    pub name: String,
    pub role: ResponderRole,
    pub contact_handle: String,
    pub distance_km: f64,
}

impl ContactTarget {
    /// `tel:` URI with whitespace stripped from the handle.
    pub fn dial_uri(&self) -> String {
        let digits = self
            .contact_handle
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .collect::<String>();
        format!("tel:{digits}")
    }
}

/// Dashboard counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchStats {
    pub total_responders: u64,
    pub available_responders: u64,
    pub open_requests: u64,
    pub resolved_requests: u64,
    pub total_points_awarded: i64,
}

/// Engine over one explicitly constructed store.
pub struct DispatchEngine<S> {
    registry: ResponderRegistry<S>,
    requests: RequestLedger<S>,
    rewards: RewardLedger<S>,
    config: DispatchConfig,
}

impl<S: DispatchStore> DispatchEngine<S> {
    /// Builds the registry and both ledgers over `store`.
    ///
    /// # Errors
    /// - Returns `ConfigError` when `config` fails validation.
    pub fn new(store: Arc<S>, config: DispatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            registry: ResponderRegistry::new(Arc::clone(&store)),
            requests: RequestLedger::new(Arc::clone(&store)),
            rewards: RewardLedger::new(store),
            config,
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &ResponderRegistry<S> {
        &self.registry
    }

    pub fn rewards(&self) -> &RewardLedger<S> {
        &self.rewards
    }

    pub fn register_responder(&self, responder: &Responder) -> DispatchResult<()> {
        self.registry.register(responder)
    }

    pub fn set_availability(&self, responder_id: &str, available: bool) -> DispatchResult<()> {
        self.registry.set_availability(responder_id, available)
    }

    pub fn deactivate_responder(&self, responder_id: &str) -> DispatchResult<()> {
        self.registry.deactivate(responder_id)
    }

    pub fn get_responder(&self, responder_id: &str) -> DispatchResult<Responder> {
        self.registry.get(responder_id)
    }

    /// Leaderboard; defaults to the top three.
    pub fn top_responders(&self, limit: Option<u32>) -> DispatchResult<Vec<Responder>> {
        self.registry.top_responders(limit)
    }

    pub fn grants_for_responder(
        &self,
        responder_id: &str,
        limit: Option<u32>,
    ) -> DispatchResult<Vec<RewardGrant>> {
        self.rewards.grants_for_responder(responder_id, limit)
    }

    /// Opens a `Pending` request at `origin`.
    pub fn create_request(
        &self,
        requester_id: &str,
        origin: Coordinate,
    ) -> DispatchResult<RequestId> {
        let request = self
            .requests
            .create(
                requester_id,
                origin,
                self.config.single_active_request_per_requester,
            )
            .inspect_err(|err| {
                warn!(
                    "event=request_create module=dispatch status=error error_code={}",
                    err.code()
                )
            })?;
        Ok(request.id)
    }

    /// Ranks candidates within `radius_km` and stores them on the request.
    ///
    /// May be repeated while the request is still `Dispatched` (for example
    /// to widen the radius); the snapshot is replaced in place. An empty
    /// snapshot is returned as `Ok(vec![])`.
    ///
    /// # Errors
    /// - `RequestNotFound`, then `InvalidTransition`, take precedence over
    ///   `InvalidRadius`.
    pub fn dispatch(&self, request_id: RequestId, radius_km: f64) -> DispatchResult<Vec<Candidate>> {
        let snapshot = self
            .requests
            .transition(request_id, |request| {
                request
                    .ensure_allows(RequestEvent::Dispatch)
                    .map_err(|err| DispatchError::from_transition(request_id, err))?;
                if !self.config.radius_in_range(radius_km) {
                    return Err(DispatchError::InvalidRadius {
                        radius_km,
                        max_radius_km: self.config.max_radius_km,
                    });
                }
                let snapshot = self.registry.rank_candidates(request.origin, radius_km)?;
                request
                    .dispatch(snapshot.clone())
                    .map_err(|err| DispatchError::from_transition(request_id, err))?;
                Ok(snapshot)
            })
            .inspect_err(|err| log_failure(RequestEvent::Dispatch, request_id, err))?;

        if snapshot.is_empty() {
            info!(
                "event=request_dispatch module=dispatch status=empty request_id={request_id} radius_km={radius_km:.2}"
            );
        } else {
            info!(
                "event=request_dispatch module=dispatch status=ok request_id={request_id} radius_km={radius_km:.2} candidates={}",
                snapshot.len()
            );
        }
        Ok(snapshot)
    }

    /// `dispatch` with the configured default radius.
    pub fn dispatch_default(&self, request_id: RequestId) -> DispatchResult<Vec<Candidate>> {
        self.dispatch(request_id, self.config.default_radius_km)
    }

    /// Records that `responder_id` was engaged and returns how to reach them.
    ///
    /// # Errors
    /// - `InvalidResponder` when the responder is not in the snapshot.
    /// - `InvalidTransition` unless the request is `Dispatched`.
    pub fn mark_contacted(
        &self,
        request_id: RequestId,
        responder_id: &str,
    ) -> DispatchResult<ContactTarget> {
        let target = self
            .requests
            .transition(request_id, |request| {
                let candidate = request
                    .mark_contacted(responder_id)
                    .map_err(|err| DispatchError::from_transition(request_id, err))?
                    .clone();
                let responder = self.registry.get(&candidate.responder_id)?;
                Ok(ContactTarget {
                    request_id,
                    responder_id: responder.id,
                    name: responder.name,
                    role: responder.role,
                    contact_handle: responder.contact_handle,
                    distance_km: candidate.distance_km,
                })
            })
            .inspect_err(|err| log_failure(RequestEvent::MarkContacted, request_id, err))?;

        info!(
            "event=request_contacted module=dispatch status=ok request_id={request_id} responder_id={}",
            target.responder_id
        );
        Ok(target)
    }

    /// Resolves a `Contacted` request and returns its reward grant.
    pub fn resolve(&self, request_id: RequestId) -> DispatchResult<RewardGrant> {
        let points = self.config.reward_points;
        let outcome = self
            .requests
            .transition(request_id, |request| {
                let responder_id = request
                    .resolution_target()
                    .map_err(|err| DispatchError::from_transition(request_id, err))?
                    .to_string();
                let outcome = self.rewards.grant(request_id, &responder_id, points)?;
                request
                    .resolve(now_epoch_ms())
                    .map_err(|err| DispatchError::from_transition(request_id, err))?;
                Ok(outcome)
            })
            .inspect_err(|err| log_failure(RequestEvent::Resolve, request_id, err))?;

        info!(
            "event=request_resolve module=dispatch status=ok request_id={request_id} new_grant={}",
            outcome.is_new()
        );
        Ok(outcome.into_grant())
    }

    /// Cancels a non-terminal request. No reward is ever granted for it.
    pub fn abandon(&self, request_id: RequestId) -> DispatchResult<()> {
        self.requests
            .transition(request_id, |request| {
                request
                    .abandon()
                    .map_err(|err| DispatchError::from_transition(request_id, err))
            })
            .inspect_err(|err| log_failure(RequestEvent::Abandon, request_id, err))?;

        info!("event=request_abandon module=dispatch status=ok request_id={request_id}");
        Ok(())
    }

    pub fn get_request(&self, request_id: RequestId) -> DispatchResult<EmergencyRequest> {
        self.requests.get(request_id)
    }

    /// Request history of one requester, newest first (default 10, max 50).
    pub fn requests_for_requester(
        &self,
        requester_id: &str,
        limit: Option<u32>,
    ) -> DispatchResult<Vec<EmergencyRequest>> {
        self.requests.history(requester_id, limit)
    }

    pub fn stats(&self) -> DispatchResult<DispatchStats> {
        Ok(DispatchStats {
            total_responders: self.registry.count(false)?,
            available_responders: self.registry.count(true)?,
            open_requests: self.requests.count_open()?,
            resolved_requests: self.requests.count_in_state(RequestState::Resolved)?,
            total_points_awarded: self.rewards.total_points_awarded()?,
        })
    }
}

fn log_failure(event: RequestEvent, request_id: RequestId, err: &DispatchError) {
    warn!(
        "event=request_{event} module=dispatch status=error request_id={request_id} error_code={}",
        err.code()
    );
}
