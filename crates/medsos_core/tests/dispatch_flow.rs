use medsos_core::{
    Coordinate, DispatchConfig, DispatchEngine, DispatchStore, ErrorKind, RequestId, RequestState,
    Responder, ResponderRole,
};
use std::sync::Arc;

/// Runs every listed scenario once per storage backend.
macro_rules! on_every_store {
    ($($scenario:ident),* $(,)?) => {
        mod memory_store {
            use medsos_core::MemoryStore;
            use std::sync::Arc;
            $(
                #[test]
                fn $scenario() {
                    super::$scenario(Arc::new(MemoryStore::new()));
                }
            )*
        }

        mod sqlite_store {
            use medsos_core::SqliteStore;
            use std::sync::Arc;
            $(
                #[test]
                fn $scenario() {
                    super::$scenario(Arc::new(SqliteStore::open_in_memory().unwrap()));
                }
            )*
        }
    };
}

on_every_store!(
    nearest_responder_is_ranked_with_haversine_distance,
    demo_roster_is_ranked_by_distance_and_skips_unavailable,
    empty_dispatch_can_be_widened,
    contacting_outside_snapshot_keeps_request_dispatched,
    resolving_pending_request_is_rejected_without_reward,
    resolve_rewards_contacted_responder_exactly_once,
    terminal_states_reject_every_event,
    abandon_never_grants_credit,
    single_active_request_is_enforced_when_enabled,
    multiple_open_requests_allowed_by_default,
    invalid_radius_is_rejected_before_state_changes,
    zero_radius_matches_only_responders_at_origin,
    invalid_origin_is_rejected,
    unknown_request_is_not_found,
    registration_rejects_duplicates_and_invalid_records,
    availability_toggle_controls_ranking,
    deactivated_responder_never_ranks_but_stays_readable,
    deactivated_contacted_responder_is_still_credited,
    contact_target_carries_dial_information,
    leaderboard_orders_by_credit_and_skips_deactivated,
    history_is_newest_first_and_limited,
    stats_reflect_engine_activity,
);

const ORIGIN: (f64, f64) = (28.6139, 77.2090);

fn engine<S: DispatchStore>(store: Arc<S>) -> DispatchEngine<S> {
    DispatchEngine::new(store, DispatchConfig::default()).unwrap()
}

fn origin() -> Coordinate {
    Coordinate::new(ORIGIN.0, ORIGIN.1).unwrap()
}

fn responder(id: &str, latitude: f64, longitude: f64, credit: i64) -> Responder {
    Responder::new(
        id,
        format!("Responder {id}"),
        "+91 90000 00000",
        ResponderRole::Nurse,
        Coordinate::new(latitude, longitude).unwrap(),
    )
    .with_credit(credit)
}

fn seed_roster<S: DispatchStore>(engine: &DispatchEngine<S>) {
    let roster = vec![
        Responder::new(
            "v1",
            "Dr. Priya Sharma",
            "+91 98765 43210",
            ResponderRole::Physician,
            Coordinate::new(28.6145, 77.2090).unwrap(),
        )
        .with_specialty("Emergency Medicine")
        .with_credit(120),
        Responder::new(
            "v2",
            "Rajesh Kumar",
            "+91 87654 32109",
            ResponderRole::Nurse,
            Coordinate::new(28.6170, 77.2115).unwrap(),
        )
        .with_credit(85),
        Responder::new(
            "v3",
            "Dr. Anita Patel",
            "+91 76543 21098",
            ResponderRole::Physician,
            Coordinate::new(28.6120, 77.2050).unwrap(),
        )
        .with_specialty("General Surgery")
        .with_credit(200),
        Responder::new(
            "v4",
            "Mohammed Farhan",
            "+91 65432 10987",
            ResponderRole::Pharmacist,
            Coordinate::new(28.6190, 77.2130).unwrap(),
        )
        .with_availability(false)
        .with_credit(45),
        Responder::new(
            "v5",
            "Sneha Reddy",
            "+91 54321 09876",
            ResponderRole::TechnicalAssistant,
            Coordinate::new(28.6155, 77.2070).unwrap(),
        )
        .with_credit(60),
    ];
    for responder in &roster {
        engine.register_responder(responder).unwrap();
    }
}

fn contacted_request<S: DispatchStore>(engine: &DispatchEngine<S>, responder_id: &str) -> RequestId {
    let request_id = engine.create_request("requester-1", origin()).unwrap();
    engine.dispatch_default(request_id).unwrap();
    engine.mark_contacted(request_id, responder_id).unwrap();
    request_id
}

fn candidate_ids<S: DispatchStore>(engine: &DispatchEngine<S>, request_id: RequestId) -> Vec<String> {
    engine
        .get_request(request_id)
        .unwrap()
        .candidate_snapshot
        .into_iter()
        .map(|candidate| candidate.responder_id)
        .collect()
}

fn nearest_responder_is_ranked_with_haversine_distance<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    engine
        .register_responder(&responder("v1", 28.6145, 77.2090, 0))
        .unwrap();

    let request_id = engine.create_request("requester-1", origin()).unwrap();
    let candidates = engine.dispatch(request_id, 10.0).unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].responder_id, "v1");
    assert!((candidates[0].distance_km - 0.07).abs() < 0.01);
    assert_eq!(
        engine.get_request(request_id).unwrap().state,
        RequestState::Dispatched
    );
}

fn demo_roster_is_ranked_by_distance_and_skips_unavailable<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);

    let request_id = engine.create_request("requester-1", origin()).unwrap();
    let candidates = engine.dispatch_default(request_id).unwrap();

    let ids = candidates
        .iter()
        .map(|candidate| candidate.responder_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["v1", "v5", "v2", "v3"]);
    assert!(candidates
        .windows(2)
        .all(|pair| pair[0].distance_km <= pair[1].distance_km));
    assert_eq!(candidate_ids(&engine, request_id), ids);
}

fn empty_dispatch_can_be_widened<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    // Roughly 15 km north of the equator origin.
    engine
        .register_responder(&responder("far", 0.135, 0.0, 0))
        .unwrap();
    let request_id = engine
        .create_request("requester-1", Coordinate::new(0.0, 0.0).unwrap())
        .unwrap();

    let narrow = engine.dispatch(request_id, 10.0).unwrap();
    assert!(narrow.is_empty());
    let request = engine.get_request(request_id).unwrap();
    assert_eq!(request.state, RequestState::Dispatched);
    assert!(request.candidate_snapshot.is_empty());

    let wide = engine.dispatch(request_id, 20.0).unwrap();
    assert_eq!(wide.len(), 1);
    assert_eq!(wide[0].responder_id, "far");
    assert!((wide[0].distance_km - 15.0).abs() < 0.1);
    assert_eq!(candidate_ids(&engine, request_id), vec!["far"]);
}

fn contacting_outside_snapshot_keeps_request_dispatched<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);
    let request_id = engine.create_request("requester-1", origin()).unwrap();
    engine.dispatch_default(request_id).unwrap();

    for outsider in ["v4", "ghost"] {
        let err = engine.mark_contacted(request_id, outsider).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponder);
    }

    let request = engine.get_request(request_id).unwrap();
    assert_eq!(request.state, RequestState::Dispatched);
    assert!(request.contacted_responder_id.is_none());

    engine.mark_contacted(request_id, "v2").unwrap();
    let request = engine.get_request(request_id).unwrap();
    assert_eq!(request.state, RequestState::Contacted);
    assert_eq!(request.contacted_responder_id.as_deref(), Some("v2"));
}

fn resolving_pending_request_is_rejected_without_reward<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);
    let request_id = engine.create_request("requester-1", origin()).unwrap();

    let err = engine.resolve(request_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    engine.dispatch_default(request_id).unwrap();
    let err = engine.resolve(request_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    assert!(engine.rewards().get(request_id).unwrap().is_none());
    assert_eq!(engine.rewards().total_points_awarded().unwrap(), 0);
    assert_eq!(engine.get_responder("v1").unwrap().credit_points, 120);
}

fn resolve_rewards_contacted_responder_exactly_once<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);
    let request_id = contacted_request(&engine, "v1");

    let grant = engine.resolve(request_id).unwrap();
    assert_eq!(grant.request_id, request_id);
    assert_eq!(grant.responder_id, "v1");
    assert_eq!(grant.points, 10);

    let request = engine.get_request(request_id).unwrap();
    assert_eq!(request.state, RequestState::Resolved);
    assert!(request.resolved_at.is_some());
    assert_eq!(engine.get_responder("v1").unwrap().credit_points, 130);

    let err = engine.resolve(request_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(engine.get_responder("v1").unwrap().credit_points, 130);
    assert_eq!(engine.grants_for_responder("v1", None).unwrap(), vec![grant]);
    assert_eq!(engine.rewards().total_points_awarded().unwrap(), 10);
}

fn terminal_states_reject_every_event<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);

    let resolved = contacted_request(&engine, "v1");
    engine.resolve(resolved).unwrap();
    let abandoned = engine.create_request("requester-2", origin()).unwrap();
    engine.abandon(abandoned).unwrap();

    for request_id in [resolved, abandoned] {
        let before = engine.get_request(request_id).unwrap();

        let errors = [
            engine.dispatch_default(request_id).unwrap_err(),
            engine.mark_contacted(request_id, "v1").unwrap_err(),
            engine.resolve(request_id).unwrap_err(),
            engine.abandon(request_id).unwrap_err(),
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::InvalidTransition, "{err}");
        }

        assert_eq!(engine.get_request(request_id).unwrap(), before);
    }
}

fn abandon_never_grants_credit<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);
    let request_id = contacted_request(&engine, "v3");

    engine.abandon(request_id).unwrap();

    let request = engine.get_request(request_id).unwrap();
    assert_eq!(request.state, RequestState::Abandoned);
    assert!(request.resolved_at.is_none());
    assert_eq!(engine.get_responder("v3").unwrap().credit_points, 200);
    assert!(engine.rewards().get(request_id).unwrap().is_none());

    let err = engine.resolve(request_id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(engine.get_responder("v3").unwrap().credit_points, 200);
}

fn single_active_request_is_enforced_when_enabled<S: DispatchStore>(store: Arc<S>) {
    let config = DispatchConfig {
        single_active_request_per_requester: true,
        ..DispatchConfig::default()
    };
    let engine = DispatchEngine::new(store, config).unwrap();
    seed_roster(&engine);

    let first = engine.create_request("alice", origin()).unwrap();
    let err = engine.create_request("alice", origin()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ActiveRequestExists);

    // Other requesters are unaffected.
    engine.create_request("bob", origin()).unwrap();

    engine.dispatch_default(first).unwrap();
    engine.mark_contacted(first, "v1").unwrap();
    let err = engine.create_request("alice", origin()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ActiveRequestExists);

    engine.resolve(first).unwrap();
    let second = engine.create_request("alice", origin()).unwrap();
    assert_ne!(first, second);
}

fn multiple_open_requests_allowed_by_default<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);

    let first = engine.create_request("alice", origin()).unwrap();
    let second = engine.create_request("alice", origin()).unwrap();

    assert_ne!(first, second);
    assert_eq!(engine.stats().unwrap().open_requests, 2);
}

fn invalid_radius_is_rejected_before_state_changes<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);
    let request_id = engine.create_request("requester-1", origin()).unwrap();

    for radius in [-1.0, f64::NAN, f64::INFINITY, 50.5] {
        let err = engine.dispatch(request_id, radius).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRadius);
    }
    assert_eq!(
        engine.get_request(request_id).unwrap().state,
        RequestState::Pending
    );

    let at_max = engine.dispatch(request_id, 50.0).unwrap();
    assert_eq!(at_max.len(), 4);

    // Lookup and state checks run before the radius check.
    let unknown = RequestId::new_v4();
    assert_eq!(
        engine.dispatch(unknown, 60.0).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    engine.abandon(request_id).unwrap();
    assert_eq!(
        engine.dispatch(request_id, 60.0).unwrap_err().kind(),
        ErrorKind::InvalidTransition
    );
}

fn zero_radius_matches_only_responders_at_origin<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    engine
        .register_responder(&responder("here", ORIGIN.0, ORIGIN.1, 0))
        .unwrap();
    engine
        .register_responder(&responder("near", 28.6145, 77.2090, 0))
        .unwrap();
    let request_id = engine.create_request("requester-1", origin()).unwrap();

    let candidates = engine.dispatch(request_id, 0.0).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].responder_id, "here");
    assert_eq!(candidates[0].distance_km, 0.0);
}

fn invalid_origin_is_rejected<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    let out_of_range = Coordinate {
        latitude: 91.0,
        longitude: 77.0,
    };

    let err = engine.create_request("requester-1", out_of_range).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCoordinate);
    assert!(engine
        .requests_for_requester("requester-1", None)
        .unwrap()
        .is_empty());
}

fn unknown_request_is_not_found<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    let unknown = RequestId::new_v4();

    let errors = [
        engine.get_request(unknown).unwrap_err(),
        engine.dispatch_default(unknown).unwrap_err(),
        engine.mark_contacted(unknown, "v1").unwrap_err(),
        engine.resolve(unknown).unwrap_err(),
        engine.abandon(unknown).unwrap_err(),
    ];
    for err in errors {
        assert_eq!(err.kind(), ErrorKind::NotFound, "{err}");
    }
}

fn registration_rejects_duplicates_and_invalid_records<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    engine
        .register_responder(&responder("v1", 28.6145, 77.2090, 5))
        .unwrap();

    let err = engine
        .register_responder(&responder("v1", 28.0, 77.0, 0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateId);
    assert_eq!(engine.get_responder("v1").unwrap().credit_points, 5);

    let mut nameless = responder("v2", 28.0, 77.0, 0);
    nameless.name = "  ".to_string();
    let err = engine.register_responder(&nameless).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRecord);

    let err = engine
        .register_responder(&responder("v3", 28.0, 77.0, -1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidRecord);

    assert_eq!(
        engine.get_responder("v2").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        engine.set_availability("ghost", true).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

fn availability_toggle_controls_ranking<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);

    engine.set_availability("v1", false).unwrap();
    engine.set_availability("v4", true).unwrap();

    let request_id = engine.create_request("requester-1", origin()).unwrap();
    let ids = engine
        .dispatch_default(request_id)
        .unwrap()
        .into_iter()
        .map(|candidate| candidate.responder_id)
        .collect::<Vec<_>>();
    assert!(!ids.contains(&"v1".to_string()));
    assert!(ids.contains(&"v4".to_string()));

    engine.set_availability("v1", true).unwrap();
    let redispatched = engine.dispatch_default(request_id).unwrap();
    assert_eq!(redispatched[0].responder_id, "v1");
}

fn deactivated_responder_never_ranks_but_stays_readable<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);

    engine.deactivate_responder("v1").unwrap();

    let request_id = engine.create_request("requester-1", origin()).unwrap();
    let ids = engine
        .dispatch_default(request_id)
        .unwrap()
        .into_iter()
        .map(|candidate| candidate.responder_id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["v5", "v2", "v3"]);

    let stored = engine.get_responder("v1").unwrap();
    assert!(stored.is_deactivated);
    assert_eq!(
        engine.set_availability("v1", true).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

fn deactivated_contacted_responder_is_still_credited<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);
    let request_id = contacted_request(&engine, "v1");

    engine.deactivate_responder("v1").unwrap();
    let grant = engine.resolve(request_id).unwrap();

    assert_eq!(grant.responder_id, "v1");
    assert_eq!(engine.get_responder("v1").unwrap().credit_points, 130);
    // The frozen snapshot still references the responder.
    assert_eq!(candidate_ids(&engine, request_id)[0], "v1");
}

fn contact_target_carries_dial_information<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);
    let request_id = engine.create_request("requester-1", origin()).unwrap();
    engine.dispatch_default(request_id).unwrap();

    let target = engine.mark_contacted(request_id, "v5").unwrap();

    assert_eq!(target.request_id, request_id);
    assert_eq!(target.responder_id, "v5");
    assert_eq!(target.name, "Sneha Reddy");
    assert_eq!(target.role, ResponderRole::TechnicalAssistant);
    assert_eq!(target.contact_handle, "+91 54321 09876");
    assert_eq!(target.dial_uri(), "tel:+915432109876");
    assert!(target.distance_km > 0.2 && target.distance_km < 0.3);
}

fn leaderboard_orders_by_credit_and_skips_deactivated<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);

    let ids = |limit: Option<u32>| {
        engine
            .top_responders(limit)
            .unwrap()
            .into_iter()
            .map(|responder| responder.id)
            .collect::<Vec<_>>()
    };

    assert_eq!(ids(None), vec!["v3", "v1", "v2"]);
    assert_eq!(ids(Some(5)), vec!["v3", "v1", "v2", "v5", "v4"]);

    engine.deactivate_responder("v3").unwrap();
    assert_eq!(ids(None), vec!["v1", "v2", "v5"]);
}

fn history_is_newest_first_and_limited<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);

    let mut created = Vec::new();
    for _ in 0..3 {
        created.push(engine.create_request("alice", origin()).unwrap());
    }
    engine.create_request("bob", origin()).unwrap();

    let history = engine
        .requests_for_requester("alice", None)
        .unwrap()
        .into_iter()
        .map(|request| request.id)
        .collect::<Vec<_>>();
    created.reverse();
    assert_eq!(history, created);

    let limited = engine.requests_for_requester("alice", Some(2)).unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].id, created[0]);
    assert_eq!(
        engine.requests_for_requester("alice", Some(0)).unwrap().len(),
        3
    );
    assert!(engine
        .requests_for_requester("nobody", None)
        .unwrap()
        .is_empty());
}

fn stats_reflect_engine_activity<S: DispatchStore>(store: Arc<S>) {
    let engine = engine(store);
    seed_roster(&engine);

    let resolved = contacted_request(&engine, "v2");
    engine.resolve(resolved).unwrap();
    let abandoned = engine.create_request("requester-2", origin()).unwrap();
    engine.abandon(abandoned).unwrap();
    engine.create_request("requester-3", origin()).unwrap();

    let stats = engine.stats().unwrap();
    assert_eq!(stats.total_responders, 5);
    assert_eq!(stats.available_responders, 4);
    assert_eq!(stats.open_requests, 1);
    assert_eq!(stats.resolved_requests, 1);
    assert_eq!(stats.total_points_awarded, 10);
}
