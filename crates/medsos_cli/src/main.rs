//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `medsos_core` linkage and wiring end to end.
//! - Seed the New Delhi demo roster and run one SOS flow against it.
//!
//! Environment:
//! - `MEDSOS_DB_PATH`: use a SQLite file instead of the in-memory store.
//! - `MEDSOS_LOG_DIR`: absolute directory for rolling log files.
//! - `MEDSOS_*` dispatch settings, see `DispatchConfig::from_env`.

use log::info;
use medsos_core::{
    default_log_level, init_logging, Coordinate, DispatchConfig, DispatchEngine, DispatchStore,
    ErrorKind, MemoryStore, Responder, ResponderRole, SqliteStore,
};
use std::error::Error;
use std::sync::Arc;

const DEMO_REQUESTER: &str = "demo-requester";
// Fallback location used when the device cannot report one.
const FALLBACK_ORIGIN: (f64, f64) = (28.6139, 77.2090);

fn main() -> Result<(), Box<dyn Error>> {
    println!("medsos_core ping={}", medsos_core::ping());
    println!("medsos_core version={}", medsos_core::core_version());

    if let Ok(log_dir) = std::env::var("MEDSOS_LOG_DIR") {
        init_logging(default_log_level(), &log_dir)?;
    }

    let config = DispatchConfig::from_env()?;
    match std::env::var("MEDSOS_DB_PATH") {
        Ok(path) => {
            println!("store=sqlite path={path}");
            run(Arc::new(SqliteStore::open(&path)?), config)
        }
        Err(_) => {
            println!("store=memory");
            run(Arc::new(MemoryStore::new()), config)
        }
    }
}

fn run<S: DispatchStore>(store: Arc<S>, config: DispatchConfig) -> Result<(), Box<dyn Error>> {
    let engine = DispatchEngine::new(store, config)?;

    for responder in demo_roster()? {
        match engine.register_responder(&responder) {
            Ok(()) => {}
            // A reused database file already carries the roster.
            Err(err) if err.kind() == ErrorKind::DuplicateId => {}
            Err(err) => return Err(err.into()),
        }
    }

    let origin = Coordinate::new(FALLBACK_ORIGIN.0, FALLBACK_ORIGIN.1)?;
    let request_id = engine.create_request(DEMO_REQUESTER, origin)?;
    println!("request={request_id} state=pending");

    let candidates = engine.dispatch_default(request_id)?;
    println!("request={request_id} candidates={}", candidates.len());
    for (rank, candidate) in candidates.iter().enumerate() {
        println!(
            "  #{} responder={} distance_km={:.2}",
            rank + 1,
            candidate.responder_id,
            candidate.distance_km
        );
    }

    let Some(nearest) = candidates.first() else {
        engine.abandon(request_id)?;
        println!("request={request_id} state=abandoned reason=no_candidates");
        return Ok(());
    };

    let target = engine.mark_contacted(request_id, &nearest.responder_id)?;
    println!(
        "contact responder={} role={} dial={}",
        target.responder_id,
        target.role.label(),
        target.dial_uri()
    );

    let grant = engine.resolve(request_id)?;
    info!(
        "event=cli_demo module=cli status=ok request_id={request_id} responder_id={}",
        grant.responder_id
    );
    let responder = engine.get_responder(&grant.responder_id)?;
    println!(
        "request={request_id} state=resolved reward={} credit_total={}",
        grant.points, responder.credit_points
    );

    let stats = engine.stats()?;
    println!(
        "stats responders={} available={} open={} resolved={} points_awarded={}",
        stats.total_responders,
        stats.available_responders,
        stats.open_requests,
        stats.resolved_requests,
        stats.total_points_awarded
    );
    for (position, responder) in engine.top_responders(None)?.iter().enumerate() {
        println!(
            "leaderboard #{} responder={} credit={}",
            position + 1,
            responder.id,
            responder.credit_points
        );
    }
    Ok(())
}

fn demo_roster() -> Result<Vec<Responder>, Box<dyn Error>> {
    let roster = vec![
        Responder::new(
            "v1",
            "Dr. Priya Sharma",
            "+91 98765 43210",
            ResponderRole::Physician,
            Coordinate::new(28.6145, 77.2090)?,
        )
        .with_specialty("Emergency Medicine")
        .with_credit(120),
        Responder::new(
            "v2",
            "Rajesh Kumar",
            "+91 87654 32109",
            ResponderRole::Nurse,
            Coordinate::new(28.6170, 77.2115)?,
        )
        .with_credit(85),
        Responder::new(
            "v3",
            "Dr. Anita Patel",
            "+91 76543 21098",
            ResponderRole::Physician,
            Coordinate::new(28.6120, 77.2050)?,
        )
        .with_specialty("General Surgery")
        .with_credit(200),
        Responder::new(
            "v4",
            "Mohammed Farhan",
            "+91 65432 10987",
            ResponderRole::Pharmacist,
            Coordinate::new(28.6190, 77.2130)?,
        )
        .with_availability(false)
        .with_credit(45),
        Responder::new(
            "v5",
            "Sneha Reddy",
            "+91 54321 09876",
            ResponderRole::TechnicalAssistant,
            Coordinate::new(28.6155, 77.2070)?,
        )
        .with_credit(60),
    ];
    Ok(roster)
}
