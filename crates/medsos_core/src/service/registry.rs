//! Responder registry service.
//!
//! # Responsibility
//! - Register responders and manage their availability and credit.
//! - Rank dispatchable responders around an origin.
//!
//! # Invariants
//! - Ranking reads storage on every call; nothing is cached.
//! - Ranked output never contains unavailable, deactivated or out-of-radius
//!   responders and is ordered `distance ASC, credit DESC, id ASC`.
//! - Per-responder mutations rely on the store's atomic single-row updates.

use crate::model::geo::{distance_km, Coordinate};
use crate::model::request::Candidate;
use crate::model::responder::Responder;
use crate::repo::{ResponderListQuery, ResponderOrder, ResponderRepository};
use crate::service::error::{DispatchError, DispatchResult};
use log::{debug, info};
use std::cmp::Ordering;
use std::sync::Arc;

/// Default leaderboard size.
pub const DEFAULT_LEADERBOARD_SIZE: u32 = 3;

/// Service over the responder half of a dispatch store.
pub struct ResponderRegistry<S> {
    store: Arc<S>,
}

impl<S> Clone for ResponderRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ResponderRepository> ResponderRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Inserts a new responder after validation.
    pub fn register(&self, responder: &Responder) -> DispatchResult<()> {
        responder.validate()?;
        self.store.insert_responder(responder)?;
        info!(
            "event=responder_register module=registry status=ok responder_id={} role={:?} available={}",
            responder.id, responder.role, responder.available
        );
        Ok(())
    }

    pub fn get(&self, id: &str) -> DispatchResult<Responder> {
        self.store
            .get_responder(id)?
            .ok_or_else(|| DispatchError::ResponderNotFound(id.to_string()))
    }

    pub fn set_availability(&self, id: &str, available: bool) -> DispatchResult<()> {
        self.store.set_availability(id, available)?;
        info!(
            "event=responder_availability module=registry status=ok responder_id={id} available={available}"
        );
        Ok(())
    }

    /// Soft-deactivates a responder; existing snapshots keep referencing it.
    pub fn deactivate(&self, id: &str) -> DispatchResult<()> {
        self.store.deactivate_responder(id)?;
        info!("event=responder_deactivate module=registry status=ok responder_id={id}");
        Ok(())
    }

    /// Adds `points` (> 0) to a responder and returns the new total.
    pub fn increment_credit(&self, id: &str, points: i64) -> DispatchResult<i64> {
        let total = self.store.add_credit(id, points)?;
        debug!(
            "event=responder_credit module=registry status=ok responder_id={id} points={points} total={total}"
        );
        Ok(total)
    }

    /// Ranks dispatchable responders within `radius_km` of `origin`.
    ///
    /// An empty result is a normal outcome, not an error.
    pub fn rank_candidates(
        &self,
        origin: Coordinate,
        radius_km: f64,
    ) -> DispatchResult<Vec<Candidate>> {
        origin.validate()?;
        let responders = self.store.list_dispatchable()?;
        rank_responders(&responders, origin, radius_km)
    }

    /// Highest-credit active responders, ties by id.
    pub fn top_responders(&self, limit: Option<u32>) -> DispatchResult<Vec<Responder>> {
        let query = ResponderListQuery {
            order: ResponderOrder::CreditDesc,
            limit: Some(limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE)),
            ..ResponderListQuery::default()
        };
        Ok(self.store.list_responders(&query)?)
    }

    pub fn list(&self, query: &ResponderListQuery) -> DispatchResult<Vec<Responder>> {
        Ok(self.store.list_responders(query)?)
    }

    pub fn count(&self, available_only: bool) -> DispatchResult<u64> {
        Ok(self.store.count_responders(available_only)?)
    }
}

/// Pure ranking over an already loaded responder set.
///
/// Non-dispatchable responders in `responders` are skipped.
pub fn rank_responders(
    responders: &[Responder],
    origin: Coordinate,
    radius_km: f64,
) -> DispatchResult<Vec<Candidate>> {
    let mut scored = Vec::new();
    for responder in responders.iter().filter(|r| r.is_dispatchable()) {
        let distance = distance_km(origin, responder.location)?;
        if distance <= radius_km {
            scored.push((distance, responder));
        }
    }

    scored.sort_by(|(left_distance, left), (right_distance, right)| {
        compare_candidates(*left_distance, left, *right_distance, right)
    });

    Ok(scored
        .into_iter()
        .map(|(distance, responder)| Candidate {
            responder_id: responder.id.clone(),
            distance_km: distance,
        })
        .collect())
}

fn compare_candidates(
    left_distance: f64,
    left: &Responder,
    right_distance: f64,
    right: &Responder,
) -> Ordering {
    left_distance
        .total_cmp(&right_distance)
        .then_with(|| right.credit_points.cmp(&left.credit_points))
        .then_with(|| left.id.cmp(&right.id))
}

#[cfg(test)]
mod tests {
    use super::rank_responders;
    use crate::model::geo::Coordinate;
    use crate::model::responder::{Responder, ResponderRole};

    fn at(id: &str, latitude: f64, longitude: f64, credit: i64) -> Responder {
        Responder::new(
            id,
            format!("Responder {id}"),
            "+91 00000 00000",
            ResponderRole::Nurse,
            Coordinate::new(latitude, longitude).unwrap(),
        )
        .with_credit(credit)
    }

    #[test]
    fn equal_distance_prefers_higher_credit_then_lower_id() {
        let origin = Coordinate::new(0.0, 0.0).unwrap();
        let responders = vec![
            at("c", 0.01, 0.0, 5),
            at("b", 0.01, 0.0, 50),
            at("a", 0.01, 0.0, 5),
            at("z", 0.001, 0.0, 0),
        ];

        let ranked = rank_responders(&responders, origin, 10.0).unwrap();
        let ids = ranked
            .iter()
            .map(|candidate| candidate.responder_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["z", "b", "a", "c"]);
    }

    #[test]
    fn skips_unavailable_and_far_responders() {
        let origin = Coordinate::new(28.6139, 77.2090).unwrap();
        let responders = vec![
            at("near", 28.6145, 77.2090, 0),
            at("off", 28.6140, 77.2090, 0).with_availability(false),
            at("far", 29.6139, 77.2090, 0),
        ];

        let ranked = rank_responders(&responders, origin, 10.0).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].responder_id, "near");
        assert!((ranked[0].distance_km - 0.07).abs() < 0.01);
    }
}
