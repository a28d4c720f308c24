//! Tunable surgery parameters.
//!
//! ```
//! use medbay_logic::config::{validate_config, SurgeryConfig};
//!
//! let config = SurgeryConfig::from_json(r#"{ "reach_distance": 2.0 }"#).unwrap();
//! assert_eq!(config.reach_distance, 2.0);
//! assert!(validate_config(&config).is_empty());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurgeryConfig {
    /// Distance the actor may move during a do-after before it cancels.
    pub movement_cancel_threshold: f32,
    /// Maximum actor-to-body distance for a do-after to continue.
    pub reach_distance: f32,
    /// Weapon damage that operates at normal speed when improvising.
    pub damage_speed_baseline: f32,
    pub min_speed_multiplier: f32,
    pub max_speed_multiplier: f32,
    /// Duration multiplier for tag-matched improvised tools without their own.
    pub improvised_time_multiplier: f32,
    /// Global scale applied to every procedure duration.
    pub duration_scale: f32,
    /// Sideways distance a limb lands from a prone body.
    pub prone_limb_offset: f32,
    /// Radius giblets scatter over when a body is gibbed.
    pub gib_scatter: f32,
    /// Organ categories fused into limbs (hands, feet) that fall separately
    /// when the limb is detached.
    pub fused_limb_organs: Vec<String>,
    /// Seed for scatter and fall-side rolls. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SurgeryConfig {
    fn default() -> Self {
        Self {
            movement_cancel_threshold: 0.5,
            reach_distance: 1.5,
            damage_speed_baseline: 10.0,
            min_speed_multiplier: 0.1,
            max_speed_multiplier: 3.0,
            improvised_time_multiplier: 1.5,
            duration_scale: 1.0,
            prone_limb_offset: 0.4,
            gib_scatter: 0.5,
            fused_limb_organs: ["HandLeft", "HandRight", "FootLeft", "FootRight"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            seed: None,
        }
    }
}

impl SurgeryConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{0} must be positive, got {1}")]
    NonPositive(&'static str, f32),
    #[error("{0} must not be negative, got {1}")]
    Negative(&'static str, f32),
    #[error("speed multiplier range is inverted: {min} > {max}")]
    SpeedRangeInverted { min: f32, max: f32 },
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &SurgeryConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    let positive = [
        ("damage_speed_baseline", config.damage_speed_baseline),
        ("min_speed_multiplier", config.min_speed_multiplier),
        ("max_speed_multiplier", config.max_speed_multiplier),
        ("improvised_time_multiplier", config.improvised_time_multiplier),
        ("duration_scale", config.duration_scale),
    ];
    for (name, value) in positive {
        if value <= 0.0 {
            errors.push(ConfigError::NonPositive(name, value));
        }
    }

    let non_negative = [
        ("movement_cancel_threshold", config.movement_cancel_threshold),
        ("reach_distance", config.reach_distance),
        ("prone_limb_offset", config.prone_limb_offset),
        ("gib_scatter", config.gib_scatter),
    ];
    for (name, value) in non_negative {
        if value < 0.0 {
            errors.push(ConfigError::Negative(name, value));
        }
    }

    if config.min_speed_multiplier > config.max_speed_multiplier {
        errors.push(ConfigError::SpeedRangeInverted {
            min: config.min_speed_multiplier,
            max: config.max_speed_multiplier,
        });
    }

    errors
}
