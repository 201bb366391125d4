//! Fan of distance rays cast from a vehicle pose against the corridor.

use serde::{Deserialize, Serialize};

use crate::constants::{
    RAY_COUNT, RAY_HALF_SPREAD_DEG, RAY_MARCH_STEP, RAY_MAX_RANGE, RAY_REFINE_ITERATIONS,
};
use crate::geometry::{Pose, Vec2};
use crate::track::TrackGeometry;
use crate::vehicle::VehicleState;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub ray_count: usize,
    pub half_spread_degrees: f32,
    pub max_range: f32,
    /// March step along each ray before bisection refines the hit.
    pub march_step: f32,
    pub refine_iterations: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            ray_count: RAY_COUNT,
            half_spread_degrees: RAY_HALF_SPREAD_DEG,
            max_range: RAY_MAX_RANGE,
            march_step: RAY_MARCH_STEP,
            refine_iterations: RAY_REFINE_ITERATIONS,
        }
    }
}

/// Controller input: normalized ray distances followed by normalized speed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observation {
    values: Vec<f32>,
}

impl Observation {
    pub fn new(rays: Vec<f32>, speed: f32) -> Self {
        let mut values = rays;
        values.push(speed);
        Self { values }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn rays(&self) -> &[f32] {
        &self.values[..self.values.len().saturating_sub(1)]
    }

    pub fn speed(&self) -> f32 {
        self.values.last().copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct SensorArray {
    config: SensorConfig,
}

impl SensorArray {
    pub fn new(config: SensorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// Relative angle of each ray, left to right across the spread.
    pub fn ray_angles(&self) -> Vec<f32> {
        let count = self.config.ray_count;
        let half = self.config.half_spread_degrees.to_radians();
        match count {
            0 => Vec::new(),
            1 => vec![0.0],
            _ => (0..count)
                .map(|k| -half + 2.0 * half * k as f32 / (count - 1) as f32)
                .collect(),
        }
    }

    /// Normalized distance to the corridor boundary along each ray, in
    /// `[0, 1]`; exactly `ray_count` values.
    pub fn sense(&self, pose: Pose, geometry: &TrackGeometry) -> Vec<f32> {
        let range = self.config.max_range;
        if !geometry.contains(pose.position) || !(range > 0.0) {
            return vec![0.0; self.config.ray_count];
        }
        self.ray_angles()
            .into_iter()
            .map(|offset| {
                let dir = Vec2::from_angle(pose.heading + offset);
                (self.cast(pose.position, dir, geometry) / range).clamp(0.0, 1.0)
            })
            .collect()
    }

    pub fn observe(
        &self,
        state: &VehicleState,
        geometry: &TrackGeometry,
        max_speed: f32,
    ) -> Observation {
        let speed = if max_speed > 0.0 {
            (state.speed / max_speed).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Observation::new(self.sense(state.pose(), geometry), speed)
    }

    fn cast(&self, origin: Vec2, dir: Vec2, geometry: &TrackGeometry) -> f32 {
        let range = self.config.max_range;
        let step = self.config.march_step.max(f32::EPSILON).min(range);
        let mut inside = 0.0f32;
        let mut probe = step;
        while inside < range {
            let at = probe.min(range);
            if !geometry.contains(origin + dir * at) {
                return self.refine(origin, dir, geometry, inside, at);
            }
            inside = at;
            probe += step;
        }
        range
    }

    /// Bisects between the last point known inside and the first outside.
    fn refine(
        &self,
        origin: Vec2,
        dir: Vec2,
        geometry: &TrackGeometry,
        mut lo: f32,
        mut hi: f32,
    ) -> f32 {
        for _ in 0..self.config.refine_iterations {
            let mid = 0.5 * (lo + hi);
            if geometry.contains(origin + dir * mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::test_tracks::stadium;

    #[test]
    fn ray_angles_span_the_fan() {
        let sensors = SensorArray::default();
        let angles = sensors.ray_angles();
        assert_eq!(angles.len(), 7);
        assert!((angles[0] + 75f32.to_radians()).abs() < 1e-6);
        assert!(angles[3].abs() < 1e-6);
        assert!((angles[6] - 75f32.to_radians()).abs() < 1e-6);
    }

    #[test]
    fn centered_pose_on_straight_sees_both_walls() {
        let track = stadium(800.0, 100.0, 40.0, 4);
        let sensors = SensorArray::default();
        let pose = Pose {
            position: Vec2::new(400.0, 100.0),
            heading: 0.0,
        };
        let rays = sensors.sense(pose, &track);
        assert_eq!(rays.len(), 7);
        for r in &rays {
            assert!((0.0..=1.0).contains(r));
            // The nearest wall is 40px away at 90°; at ±75° a ray travels
            // 40/sin(75°) ≈ 41.4px before leaving.
            assert!(*r >= 0.2 - 1e-3, "ray {r} too short");
        }
        // Straight ahead along an 800px straight is beyond range.
        assert_eq!(rays[3], 1.0);
        // Side rays are symmetric.
        assert!((rays[0] - rays[6]).abs() < 0.02);
    }

    #[test]
    fn pose_outside_corridor_reads_zero() {
        let track = stadium(400.0, 100.0, 30.0, 4);
        let sensors = SensorArray::default();
        let pose = Pose {
            position: Vec2::new(-1000.0, -1000.0),
            heading: 1.0,
        };
        assert_eq!(sensors.sense(pose, &track), vec![0.0; 7]);
    }

    #[test]
    fn single_ray_points_forward() {
        let sensors = SensorArray::new(SensorConfig {
            ray_count: 1,
            ..SensorConfig::default()
        });
        assert_eq!(sensors.ray_angles(), vec![0.0]);
    }

    #[test]
    fn observation_appends_normalized_speed() {
        let track = stadium(400.0, 100.0, 30.0, 4);
        let sensors = SensorArray::default();
        let mut state = VehicleState::at(track.spawn_pose());
        state.speed = 4.0;
        let obs = sensors.observe(&state, &track, 8.0);
        assert_eq!(obs.len(), 8);
        assert_eq!(obs.rays().len(), 7);
        assert!((obs.speed() - 0.5).abs() < 1e-6);
    }
}
