//! In-memory dispatch store.
//!
//! # Responsibility
//! - Back the registry and ledgers without external storage.
//! - Provide the same atomicity guarantees as the SQLite store.
//!
//! # Invariants
//! - Each table has its own `RwLock`; no call holds a lock after returning.
//! - `record_grant` locks `grants` before `responders`. No other path takes
//!   both, so lock order is fixed.
//! - Requests and grants carry an insertion sequence; history breaks
//!   same-millisecond ties by it, newest first.

use crate::model::request::{EmergencyRequest, RequestId, RequestState};
use crate::model::responder::{Responder, ResponderId};
use crate::model::reward::RewardGrant;
use crate::repo::request_repo::{RequestListQuery, RequestRepository};
use crate::repo::responder_repo::{ResponderListQuery, ResponderOrder, ResponderRepository};
use crate::repo::reward_repo::RewardRepository;
use crate::repo::{ensure_positive_points, is_open, RepoError, RepoResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Process-local store backed by ordered maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    responders: RwLock<BTreeMap<ResponderId, Responder>>,
    requests: RwLock<HashMap<RequestId, (u64, EmergencyRequest)>>,
    grants: RwLock<HashMap<RequestId, (u64, RewardGrant)>>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn checked_credit(responder: &Responder, points: i64) -> RepoResult<i64> {
    ensure_positive_points(points)?;
    responder.credit_points.checked_add(points).ok_or_else(|| {
        RepoError::InvalidData(format!("credit overflow for responder {}", responder.id))
    })
}

impl ResponderRepository for MemoryStore {
    fn insert_responder(&self, responder: &Responder) -> RepoResult<()> {
        responder.validate()?;

        let mut responders = write(&self.responders);
        if responders.contains_key(&responder.id) {
            return Err(RepoError::DuplicateResponder(responder.id.clone()));
        }
        responders.insert(responder.id.clone(), responder.clone());
        Ok(())
    }

    fn get_responder(&self, id: &str) -> RepoResult<Option<Responder>> {
        Ok(read(&self.responders).get(id).cloned())
    }

    fn list_responders(&self, query: &ResponderListQuery) -> RepoResult<Vec<Responder>> {
        let mut items = read(&self.responders)
            .values()
            .filter(|responder| query.include_deactivated || !responder.is_deactivated)
            .filter(|responder| !query.available_only || responder.available)
            .cloned()
            .collect::<Vec<_>>();

        if query.order == ResponderOrder::CreditDesc {
            items.sort_by(|a, b| {
                b.credit_points
                    .cmp(&a.credit_points)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }
        if let Some(limit) = query.limit {
            items.truncate(limit as usize);
        }
        Ok(items)
    }

    fn list_dispatchable(&self) -> RepoResult<Vec<Responder>> {
        Ok(read(&self.responders)
            .values()
            .filter(|responder| responder.is_dispatchable())
            .cloned()
            .collect())
    }

    fn set_availability(&self, id: &str, available: bool) -> RepoResult<()> {
        let mut responders = write(&self.responders);
        match responders.get_mut(id) {
            Some(responder) if !responder.is_deactivated => {
                responder.available = available;
                Ok(())
            }
            _ => Err(RepoError::ResponderNotFound(id.to_string())),
        }
    }

    fn add_credit(&self, id: &str, points: i64) -> RepoResult<i64> {
        let mut responders = write(&self.responders);
        let responder = responders
            .get_mut(id)
            .ok_or_else(|| RepoError::ResponderNotFound(id.to_string()))?;
        let total = checked_credit(responder, points)?;
        responder.credit_points = total;
        Ok(total)
    }

    fn deactivate_responder(&self, id: &str) -> RepoResult<()> {
        let mut responders = write(&self.responders);
        let responder = responders
            .get_mut(id)
            .ok_or_else(|| RepoError::ResponderNotFound(id.to_string()))?;
        responder.is_deactivated = true;
        responder.available = false;
        Ok(())
    }

    fn count_responders(&self, available_only: bool) -> RepoResult<u64> {
        let count = read(&self.responders)
            .values()
            .filter(|responder| !responder.is_deactivated)
            .filter(|responder| !available_only || responder.available)
            .count();
        Ok(count as u64)
    }
}

impl RequestRepository for MemoryStore {
    fn insert_request(&self, request: &EmergencyRequest) -> RepoResult<()> {
        request.check_consistency().map_err(RepoError::InvalidData)?;

        let mut requests = write(&self.requests);
        if requests.contains_key(&request.id) {
            return Err(RepoError::DuplicateRequest(request.id));
        }
        requests.insert(request.id, (self.next_sequence(), request.clone()));
        Ok(())
    }

    fn update_request(&self, request: &EmergencyRequest) -> RepoResult<()> {
        request.check_consistency().map_err(RepoError::InvalidData)?;

        let mut requests = write(&self.requests);
        let (_, stored) = requests
            .get_mut(&request.id)
            .ok_or(RepoError::RequestNotFound(request.id))?;
        *stored = request.clone();
        Ok(())
    }

    fn get_request(&self, id: RequestId) -> RepoResult<Option<EmergencyRequest>> {
        Ok(read(&self.requests)
            .get(&id)
            .map(|(_, request)| request.clone()))
    }

    fn list_requests(&self, query: &RequestListQuery) -> RepoResult<Vec<EmergencyRequest>> {
        let mut items = read(&self.requests)
            .values()
            .filter(|(_, request)| {
                query
                    .requester_id
                    .as_deref()
                    .map_or(true, |requester| request.requester_id == requester)
            })
            .filter(|(_, request)| !query.open_only || is_open(request.state))
            .cloned()
            .collect::<Vec<_>>();

        items.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| seq_b.cmp(seq_a))
        });

        let limit = query.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(items
            .into_iter()
            .map(|(_, request)| request)
            .skip(query.offset as usize)
            .take(limit)
            .collect())
    }

    fn count_requests(&self, states: &[RequestState]) -> RepoResult<u64> {
        let count = read(&self.requests)
            .values()
            .filter(|(_, request)| states.is_empty() || states.contains(&request.state))
            .count();
        Ok(count as u64)
    }
}

impl RewardRepository for MemoryStore {
    fn get_grant(&self, request_id: RequestId) -> RepoResult<Option<RewardGrant>> {
        Ok(read(&self.grants)
            .get(&request_id)
            .map(|(_, grant)| grant.clone()))
    }

    fn record_grant(&self, grant: &RewardGrant) -> RepoResult<i64> {
        let mut grants = write(&self.grants);
        if grants.contains_key(&grant.request_id) {
            return Err(RepoError::DuplicateGrant(grant.request_id));
        }

        let mut responders = write(&self.responders);
        let responder = responders
            .get_mut(&grant.responder_id)
            .ok_or_else(|| RepoError::ResponderNotFound(grant.responder_id.clone()))?;
        // Every fallible check happens before either table changes.
        let total = checked_credit(responder, grant.points)?;

        responder.credit_points = total;
        grants.insert(grant.request_id, (self.next_sequence(), grant.clone()));
        Ok(total)
    }

    fn list_grants_for_responder(
        &self,
        responder_id: &str,
        limit: Option<u32>,
    ) -> RepoResult<Vec<RewardGrant>> {
        let mut items = read(&self.grants)
            .values()
            .filter(|(_, grant)| grant.responder_id == responder_id)
            .cloned()
            .collect::<Vec<_>>();
        items.sort_by(|(seq_a, a), (seq_b, b)| {
            b.granted_at
                .cmp(&a.granted_at)
                .then_with(|| seq_b.cmp(seq_a))
        });
        if let Some(limit) = limit {
            items.truncate(limit as usize);
        }
        Ok(items.into_iter().map(|(_, grant)| grant).collect())
    }

    fn total_points_awarded(&self) -> RepoResult<i64> {
        Ok(read(&self.grants)
            .values()
            .map(|(_, grant)| grant.points)
            .sum())
    }
}
