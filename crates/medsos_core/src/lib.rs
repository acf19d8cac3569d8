//! Core dispatch and matching logic for MedSOS.
//! This crate is the single source of truth for dispatch invariants.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod sync;

pub use config::{ConfigError, DispatchConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::geo::{distance_km, Coordinate, CoordinateError, EARTH_RADIUS_KM};
pub use model::request::{
    Candidate, EmergencyRequest, RequestEvent, RequestId, RequestState, RequesterId,
    TransitionError,
};
pub use model::responder::{Responder, ResponderId, ResponderRole, ResponderValidationError};
pub use model::reward::RewardGrant;
pub use repo::{
    DispatchStore, MemoryStore, RepoError, RepoResult, RequestListQuery, ResponderListQuery,
    ResponderOrder, SqliteStore,
};
pub use service::dispatch::{ContactTarget, DispatchEngine, DispatchStats};
pub use service::error::{DispatchError, DispatchResult, ErrorKind};
pub use service::registry::{rank_responders, ResponderRegistry};
pub use service::request_ledger::RequestLedger;
pub use service::reward_ledger::{GrantOutcome, RewardLedger};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
