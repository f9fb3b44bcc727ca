//! Trace schema configuration and validation.
//!
//! The binary trace format carries no self-description: which optional
//! streams are present, and how many effect-bool locations are recorded,
//! must be agreed between the capture side and every reader.
//! [`TraceConfig`] is that agreement.

use std::error::Error;
use std::fmt;

/// Number of effect-bool locations recorded by the stock capture module.
pub const DEFAULT_EFFECT_BOOL_LOCATIONS: usize = 14;

/// Upper bound on effect-bool locations accepted by [`TraceConfig::validate`].
pub const MAX_EFFECT_BOOL_LOCATIONS: usize = 64;

/// Which optional parts of the schema a trace carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceConfig {
    /// Events carry a debug word, and the general-event stream is present.
    /// Default: `false`.
    pub debug_events: bool,
    /// The transmit-timestamp stream is present. Default: `false`.
    pub tx_stamps: bool,
    /// The advanced-event stream is present. Default: `false`.
    pub advanced_events: bool,
    /// Number of monitored effect-bool locations.
    /// Default: [`DEFAULT_EFFECT_BOOL_LOCATIONS`].
    pub effect_bool_locations: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            debug_events: false,
            tx_stamps: false,
            advanced_events: false,
            effect_bool_locations: DEFAULT_EFFECT_BOOL_LOCATIONS,
        }
    }
}

impl TraceConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.effect_bool_locations == 0 {
            return Err(ConfigError::NoEffectBoolLocations);
        }
        if self.effect_bool_locations > MAX_EFFECT_BOOL_LOCATIONS {
            return Err(ConfigError::TooManyEffectBoolLocations {
                configured: self.effect_bool_locations,
            });
        }
        Ok(())
    }

    /// On-disk size of one event record under this schema.
    pub fn event_record_size(&self) -> usize {
        if self.debug_events {
            12
        } else {
            8
        }
    }
}

/// Errors detected by [`TraceConfig::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `effect_bool_locations` is zero.
    NoEffectBoolLocations,
    /// `effect_bool_locations` exceeds [`MAX_EFFECT_BOOL_LOCATIONS`].
    TooManyEffectBoolLocations {
        /// The configured count.
        configured: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEffectBoolLocations => write!(f, "at least one effect-bool location is required"),
            Self::TooManyEffectBoolLocations { configured } => write!(
                f,
                "{configured} effect-bool locations exceeds the maximum of {MAX_EFFECT_BOOL_LOCATIONS}"
            ),
        }
    }
}

impl Error for ConfigError {}
