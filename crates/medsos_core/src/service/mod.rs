//! Dispatch use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into registry, ledger and engine APIs.
//! - Keep callers decoupled from storage details.
//!
//! # Invariants
//! - Services never bypass repository validation or atomicity contracts.
//! - Services stay storage-agnostic; they are generic over the store.

pub mod dispatch;
pub mod error;
pub mod registry;
pub mod request_ledger;
pub mod reward_ledger;
