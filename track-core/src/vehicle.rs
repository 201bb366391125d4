//! Kinematic point-mass vehicle driven by steer/throttle/brake.

use serde::{Deserialize, Serialize};

use crate::constants::{BRAKE_DECEL, DRAG, MAX_SPEED, MAX_YAW_RATE, THROTTLE_ACCEL};
use crate::error::ActionFault;
use crate::geometry::{wrap_angle, Pose, Vec2};

pub const ACTION_LEN: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleParams {
    pub max_speed: f32,
    /// Radians per unit time at full steering lock.
    pub max_yaw_rate: f32,
    pub throttle_accel: f32,
    pub brake_decel: f32,
    /// Fraction of speed lost per unit time.
    pub drag: f32,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            max_speed: MAX_SPEED,
            max_yaw_rate: MAX_YAW_RATE,
            throttle_accel: THROTTLE_ACCEL,
            brake_decel: BRAKE_DECEL,
            drag: DRAG,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub position: Vec2,
    pub heading: f32,
    pub speed: f32,
    pub angular_velocity: f32,
}

impl VehicleState {
    /// At rest at the given pose.
    pub fn at(pose: Pose) -> Self {
        Self {
            position: pose.position,
            heading: pose.heading,
            speed: 0.0,
            angular_velocity: 0.0,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            heading: self.heading,
        }
    }

    pub fn velocity(&self) -> Vec2 {
        Vec2::from_angle(self.heading) * self.speed
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub steer: f32,
    pub throttle: f32,
    pub brake: f32,
}

impl Action {
    pub const NEUTRAL: Self = Self {
        steer: 0.0,
        throttle: 0.0,
        brake: 0.0,
    };

    pub fn new(steer: f32, throttle: f32, brake: f32) -> Self {
        Self {
            steer,
            throttle,
            brake,
        }
        .clamped()
    }

    /// Parses raw controller outputs `[steer, throttle, brake]`.
    pub fn from_outputs(outputs: &[f32]) -> Result<Self, ActionFault> {
        if outputs.len() != ACTION_LEN {
            return Err(ActionFault::WrongLength {
                expected: ACTION_LEN,
                actual: outputs.len(),
            });
        }
        if let Some(index) = outputs.iter().position(|v| !v.is_finite()) {
            return Err(ActionFault::NonFinite { index });
        }
        Ok(Self::new(outputs[0], outputs[1], outputs[2]))
    }

    pub fn clamped(self) -> Self {
        Self {
            steer: self.steer.clamp(-1.0, 1.0),
            throttle: self.throttle.clamp(0.0, 1.0),
            brake: self.brake.clamp(0.0, 1.0),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct VehicleModel {
    params: VehicleParams,
}

impl VehicleModel {
    pub fn new(params: VehicleParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &VehicleParams {
        &self.params
    }

    pub fn step(&self, state: &VehicleState, action: Action, dt: f32) -> VehicleState {
        let p = &self.params;
        let action = action.clamped();

        let angular_velocity = action.steer * p.max_yaw_rate;
        let heading = wrap_angle(state.heading + angular_velocity * dt);

        let mut speed = state.speed
            + (action.throttle * p.throttle_accel - action.brake * p.brake_decel) * dt;
        speed -= speed * (p.drag * dt).min(1.0);
        let speed = speed.clamp(0.0, p.max_speed);

        let position = state.position + Vec2::from_angle(heading) * (speed * dt);

        VehicleState {
            position,
            heading,
            speed,
            angular_velocity,
        }
    }
}
