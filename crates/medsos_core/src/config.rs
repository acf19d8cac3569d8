//! Dispatch engine configuration.
//!
//! # Responsibility
//! - Hold the tunables the engine must not hard-code (reward size, radii).
//! - Load overrides from `MEDSOS_*` environment variables.
//!
//! # Invariants
//! - A config accepted by `validate()` has a positive reward and a default
//!   radius inside `(0, max_radius_km]`.
//! - A dispatch radius may be zero; only responders at the origin match.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const ENV_REWARD_POINTS: &str = "MEDSOS_REWARD_POINTS";
pub const ENV_DEFAULT_RADIUS_KM: &str = "MEDSOS_DEFAULT_RADIUS_KM";
pub const ENV_MAX_RADIUS_KM: &str = "MEDSOS_MAX_RADIUS_KM";
pub const ENV_SINGLE_ACTIVE_REQUEST: &str = "MEDSOS_SINGLE_ACTIVE_REQUEST";

const DEFAULT_REWARD_POINTS: i64 = 10;
const DEFAULT_RADIUS_KM: f64 = 10.0;
const DEFAULT_MAX_RADIUS_KM: f64 = 50.0;

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Credit awarded per resolved request.
    pub reward_points: i64,
    /// Radius used by `dispatch_default`.
    pub default_radius_km: f64,
    /// Upper bound for any dispatch radius.
    pub max_radius_km: f64,
    /// Reject a new request while the requester still has an open one.
    pub single_active_request_per_requester: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            reward_points: DEFAULT_REWARD_POINTS,
            default_radius_km: DEFAULT_RADIUS_KM,
            max_radius_km: DEFAULT_MAX_RADIUS_KM,
            single_active_request_per_requester: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    NonPositiveReward(i64),
    InvalidRadius { name: &'static str, value: f64 },
    UnparsableValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveReward(points) => {
                write!(f, "reward_points must be positive, got {points}")
            }
            Self::InvalidRadius { name, value } => {
                write!(f, "{name} must be positive and within max_radius_km, got {value}")
            }
            Self::UnparsableValue { key, value } => {
                write!(f, "cannot parse `{value}` for {key}")
            }
        }
    }
}

impl Error for ConfigError {}

impl DispatchConfig {
    /// Loads defaults overridden by `MEDSOS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads defaults overridden by values from `lookup`.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = non_blank(lookup(ENV_REWARD_POINTS)) {
            config.reward_points = parse(ENV_REWARD_POINTS, &value)?;
        }
        if let Some(value) = non_blank(lookup(ENV_DEFAULT_RADIUS_KM)) {
            config.default_radius_km = parse(ENV_DEFAULT_RADIUS_KM, &value)?;
        }
        if let Some(value) = non_blank(lookup(ENV_MAX_RADIUS_KM)) {
            config.max_radius_km = parse(ENV_MAX_RADIUS_KM, &value)?;
        }
        if let Some(value) = non_blank(lookup(ENV_SINGLE_ACTIVE_REQUEST)) {
            config.single_active_request_per_requester =
                parse_flag(ENV_SINGLE_ACTIVE_REQUEST, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reward_points <= 0 {
            return Err(ConfigError::NonPositiveReward(self.reward_points));
        }
        if !(self.max_radius_km.is_finite() && self.max_radius_km > 0.0) {
            return Err(ConfigError::InvalidRadius {
                name: "max_radius_km",
                value: self.max_radius_km,
            });
        }
        if self.default_radius_km <= 0.0 || !self.radius_in_range(self.default_radius_km) {
            return Err(ConfigError::InvalidRadius {
                name: "default_radius_km",
                value: self.default_radius_km,
            });
        }
        Ok(())
    }

    /// Whether `radius_km` is an acceptable dispatch radius, `[0, max_radius_km]`.
    pub fn radius_in_range(&self, radius_km: f64) -> bool {
        radius_km.is_finite() && radius_km >= 0.0 && radius_km <= self.max_radius_km
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::UnparsableValue {
        key,
        value: value.to_string(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::UnparsableValue {
            key,
            value: value.to_string(),
        }),
    }
}
