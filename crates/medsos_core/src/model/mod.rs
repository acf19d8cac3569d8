//! Dispatch domain model.
//!
//! # Responsibility
//! - Define the records owned by the registry and the two ledgers.
//! - Keep pure validation and state-machine rules next to the data.
//!
//! # Invariants
//! - Coordinates are range-checked before any distance is computed.
//! - Request state only changes through `EmergencyRequest` transition methods.

pub mod geo;
pub mod request;
pub mod responder;
pub mod reward;
