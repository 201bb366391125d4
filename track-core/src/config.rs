use serde::{Deserialize, Serialize};

use crate::constants::{
    ACTIVE_SIZE, DEFAULT_DT, DEFAULT_SEED, ELITE_SIZE, FITNESS_HISTORY_CAPACITY,
};
use crate::error::ConfigError;
use crate::reward::RewardConfig;
use crate::sensors::SensorConfig;
use crate::track::{TrackConfig, MIN_CONTROL_POINTS};
use crate::vehicle::VehicleParams;

/// Every value the engine consumes. Behavior never lives here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub active_size: usize,
    pub elite_size: usize,
    pub seed: u32,
    pub dt: f32,
    pub history_capacity: usize,
    pub track: TrackConfig,
    pub sensors: SensorConfig,
    pub vehicle: VehicleParams,
    pub reward: RewardConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            active_size: ACTIVE_SIZE,
            elite_size: ELITE_SIZE,
            seed: DEFAULT_SEED,
            dt: DEFAULT_DT,
            history_capacity: FITNESS_HISTORY_CAPACITY,
            track: TrackConfig::default(),
            sensors: SensorConfig::default(),
            vehicle: VehicleParams::default(),
            reward: RewardConfig::default(),
        }
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn within(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

impl SimConfig {
    pub const PRESETS: [&'static str; 3] = ["default", "wide", "marathon"];

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            // Forgiving corridor for quick smoke runs.
            "wide" => Some(Self {
                track: TrackConfig {
                    half_width: 55.0,
                    control_points: 7,
                    radius_jitter: 0.15,
                    ..TrackConfig::default()
                },
                ..Self::default()
            }),
            // Longer episodes and a deeper elite pool for overnight runs.
            "marathon" => Some(Self {
                active_size: 30,
                elite_size: 12,
                history_capacity: 1_000,
                reward: RewardConfig {
                    max_steps: 4_000,
                    stagnation_steps: 250,
                    ..RewardConfig::default()
                },
                ..Self::default()
            }),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.active_size == 0 {
            return Err(ConfigError::ZeroActiveSize);
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroHistoryCapacity);
        }
        positive("dt", self.dt)?;

        let track = &self.track;
        if track.control_points < MIN_CONTROL_POINTS {
            return Err(ConfigError::TooFewControlPoints {
                count: track.control_points,
                min: MIN_CONTROL_POINTS,
            });
        }
        if track.gates == 0 {
            return Err(ConfigError::ZeroGateCount);
        }
        positive("track.half_width", track.half_width)?;
        positive("track.radius_x", track.radius_x)?;
        positive("track.radius_y", track.radius_y)?;
        within("track.radius_jitter", track.radius_jitter, 0.0, 0.9)?;
        within("track.angle_jitter", track.angle_jitter, 0.0, 0.45)?;

        let sensors = &self.sensors;
        if sensors.ray_count == 0 {
            return Err(ConfigError::ZeroRayCount);
        }
        within("sensors.half_spread_degrees", sensors.half_spread_degrees, 0.0, 180.0)?;
        positive("sensors.max_range", sensors.max_range)?;
        positive("sensors.march_step", sensors.march_step)?;

        let vehicle = &self.vehicle;
        positive("vehicle.max_speed", vehicle.max_speed)?;
        positive("vehicle.max_yaw_rate", vehicle.max_yaw_rate)?;
        positive("vehicle.throttle_accel", vehicle.throttle_accel)?;
        positive("vehicle.brake_decel", vehicle.brake_decel)?;
        within("vehicle.drag", vehicle.drag, 0.0, 1.0)?;

        let reward = &self.reward;
        if reward.max_steps == 0 {
            return Err(ConfigError::ZeroSteps {
                field: "reward.max_steps",
            });
        }
        if reward.stagnation_steps == 0 {
            return Err(ConfigError::ZeroSteps {
                field: "reward.stagnation_steps",
            });
        }
        within("reward.crash_penalty", reward.crash_penalty, 0.0, f32::MAX)?;
        within("reward.spin_penalty", reward.spin_penalty, 0.0, f32::MAX)?;
        within("reward.gate_bonus", reward.gate_bonus, 0.0, f32::MAX)?;
        within("reward.survival_bonus", reward.survival_bonus, 0.0, f32::MAX)?;

        Ok(())
    }
}
