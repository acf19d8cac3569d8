//! Responder domain model.
//!
//! # Responsibility
//! - Define the volunteer record ranked and dispatched by the engine.
//! - Validate registration input before it reaches storage.
//!
//! # Invariants
//! - `id` is stable and unique within one registry.
//! - `credit_points` is never negative; it only grows through reward grants.
//! - Responders are soft-deactivated, never deleted.

use crate::model::geo::{Coordinate, CoordinateError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Externally assigned responder identifier (identity layer owns the value).
pub type ResponderId = String;

/// Qualification of a volunteer responder.
///
/// The core stores this value but never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderRole {
    Physician,
    Nurse,
    Pharmacist,
    TechnicalAssistant,
}

impl ResponderRole {
    pub const ALL: [ResponderRole; 4] = [
        ResponderRole::Physician,
        ResponderRole::Nurse,
        ResponderRole::Pharmacist,
        ResponderRole::TechnicalAssistant,
    ];

    /// Human-readable label for presentation boundaries.
    pub fn label(self) -> &'static str {
        match self {
            Self::Physician => "Physician",
            Self::Nurse => "Nurse",
            Self::Pharmacist => "Pharmacist",
            Self::TechnicalAssistant => "Technical Assistant",
        }
    }
}

/// Registered volunteer who can be dispatched to an emergency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Responder {
    pub id: ResponderId,
    pub name: String,
    /// Dialable handle handed to the contact collaborator. Never logged.
    pub contact_handle: String,
    pub role: ResponderRole,
    pub specialty: Option<String>,
    pub location: Coordinate,
    /// Self-reported on-duty flag.
    pub available: bool,
    pub credit_points: i64,
    /// Soft-deactivation tombstone.
    pub is_deactivated: bool,
}

/// Registration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponderValidationError {
    EmptyId,
    EmptyName,
    EmptyContactHandle,
    InvalidLocation(CoordinateError),
    NegativeCredit(i64),
}

impl Display for ResponderValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "responder id must not be blank"),
            Self::EmptyName => write!(f, "responder name must not be blank"),
            Self::EmptyContactHandle => write!(f, "responder contact handle must not be blank"),
            Self::InvalidLocation(err) => write!(f, "invalid responder location: {err}"),
            Self::NegativeCredit(value) => {
                write!(f, "credit_points must be >= 0, got {value}")
            }
        }
    }
}

impl Error for ResponderValidationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidLocation(err) => Some(err),
            _ => None,
        }
    }
}

impl Responder {
    /// Creates an available, active responder with zero credit.
    pub fn new(
        id: impl Into<ResponderId>,
        name: impl Into<String>,
        contact_handle: impl Into<String>,
        role: ResponderRole,
        location: Coordinate,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            contact_handle: contact_handle.into(),
            role,
            specialty: None,
            location,
            available: true,
            credit_points: 0,
            is_deactivated: false,
        }
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }

    pub fn with_availability(mut self, available: bool) -> Self {
        self.available = available;
        self
    }

    pub fn with_credit(mut self, credit_points: i64) -> Self {
        self.credit_points = credit_points;
        self
    }

    /// Validates registration invariants.
    pub fn validate(&self) -> Result<(), ResponderValidationError> {
        if self.id.trim().is_empty() {
            return Err(ResponderValidationError::EmptyId);
        }
        if self.name.trim().is_empty() {
            return Err(ResponderValidationError::EmptyName);
        }
        if self.contact_handle.trim().is_empty() {
            return Err(ResponderValidationError::EmptyContactHandle);
        }
        self.location
            .validate()
            .map_err(ResponderValidationError::InvalidLocation)?;
        if self.credit_points < 0 {
            return Err(ResponderValidationError::NegativeCredit(self.credit_points));
        }
        Ok(())
    }

    /// Whether this responder may appear in a fresh candidate snapshot.
    pub fn is_dispatchable(&self) -> bool {
        self.available && !self.is_deactivated
    }
}

#[cfg(test)]
mod tests {
    use super::{Responder, ResponderRole, ResponderValidationError};
    use crate::model::geo::Coordinate;

    fn delhi() -> Coordinate {
        Coordinate::new(28.6139, 77.2090).unwrap()
    }

    #[test]
    fn new_responder_is_available_and_active() {
        let responder = Responder::new("v1", "Priya", "+91 98765 43210", ResponderRole::Physician, delhi());
        assert!(responder.is_dispatchable());
        assert_eq!(responder.credit_points, 0);
        assert!(responder.validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_fields_and_negative_credit() {
        let base = Responder::new("v1", "Priya", "+91", ResponderRole::Nurse, delhi());

        let mut blank_name = base.clone();
        blank_name.name = "   ".to_string();
        assert_eq!(blank_name.validate(), Err(ResponderValidationError::EmptyName));

        let mut blank_contact = base.clone();
        blank_contact.contact_handle = String::new();
        assert_eq!(
            blank_contact.validate(),
            Err(ResponderValidationError::EmptyContactHandle)
        );

        let negative = base.with_credit(-1);
        assert_eq!(
            negative.validate(),
            Err(ResponderValidationError::NegativeCredit(-1))
        );
    }

    #[test]
    fn deactivated_responder_is_not_dispatchable() {
        let mut responder = Responder::new("v1", "Priya", "+91", ResponderRole::Nurse, delhi());
        responder.is_deactivated = true;
        assert!(!responder.is_dispatchable());
    }

    #[test]
    fn every_role_has_a_label() {
        for role in ResponderRole::ALL {
            assert!(!role.label().is_empty());
        }
    }
}
