//! Reward grant record.
//!
//! # Invariants
//! - At most one grant exists per `request_id`.
//! - Grants are immutable once recorded.

use crate::model::request::RequestId;
use crate::model::responder::ResponderId;
use serde::{Deserialize, Serialize};

/// Credit-point award for one resolved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardGrant {
    /// Primary key; enforces at-most-once.
    pub request_id: RequestId,
    pub responder_id: ResponderId,
    pub points: i64,
    /// Unix epoch milliseconds.
    pub granted_at: i64,
}
