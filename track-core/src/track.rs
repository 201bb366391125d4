//! Procedural closed-loop tracks: control points around a jittered ellipse,
//! a centripetal Catmull-Rom centerline, the drivable corridor around it and
//! the ordered checkpoint gates.

use core::f32::consts::{PI, TAU};
use core::fmt;

use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};

use crate::constants::{
    ARENA_HEIGHT, ARENA_WIDTH, CATMULL_ROM_ALPHA, GATE_SPAN_FRACTION, TANGENT_LOOKAHEAD,
    TRACK_ANGLE_JITTER, TRACK_CONTROL_POINTS, TRACK_GATES, TRACK_GENERATION_ATTEMPTS,
    TRACK_HALF_WIDTH, TRACK_RADIUS_JITTER, TRACK_RADIUS_X, TRACK_RADIUS_Y, TRACK_SAMPLES,
};
use crate::error::{DegenerateReason, DegenerateTrackError};
use crate::geometry::{point_segment_distance, segments_intersect, Pose, Vec2};
use crate::rng::SeededRng;

pub const MIN_CONTROL_POINTS: usize = 4;
pub const MIN_SAMPLES: usize = 16;

// Sample stride used when measuring local turn radius.
const CURVATURE_STRIDE: usize = 2;
// Samples closer than this along the loop are allowed to be near each other.
const CLEARANCE_ARC_FACTOR: f32 = PI;
const CLEARANCE_TOLERANCE: f32 = 1e-3;
// Golden-ratio stride between the seeds tried by `generate_retrying`.
const RETRY_SEED_STRIDE: u32 = 0x9E37_79B9;

type SamplePoint = GeomWithData<[f32; 2], usize>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    pub control_points: usize,
    pub half_width: f32,
    pub center: Vec2,
    pub radius_x: f32,
    pub radius_y: f32,
    /// Radial jitter as a fraction of the nominal radius.
    pub radius_jitter: f32,
    /// Angular jitter as a fraction of the spacing between control points.
    pub angle_jitter: f32,
    pub samples: usize,
    pub gates: usize,
    pub generation_attempts: u32,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            control_points: TRACK_CONTROL_POINTS,
            half_width: TRACK_HALF_WIDTH,
            center: Vec2::new(ARENA_WIDTH * 0.5, ARENA_HEIGHT * 0.5),
            radius_x: TRACK_RADIUS_X,
            radius_y: TRACK_RADIUS_Y,
            radius_jitter: TRACK_RADIUS_JITTER,
            angle_jitter: TRACK_ANGLE_JITTER,
            samples: TRACK_SAMPLES,
            gates: TRACK_GATES,
            generation_attempts: TRACK_GENERATION_ATTEMPTS,
        }
    }
}

/// Checkpoint segment spanning the corridor at one centerline sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub index: usize,
    pub sample: usize,
    pub a: Vec2,
    pub b: Vec2,
}

impl Gate {
    pub fn crossed_by(&self, from: Vec2, to: Vec2) -> bool {
        segments_intersect(from, to, self.a, self.b)
    }

    pub fn midpoint(&self) -> Vec2 {
        (self.a + self.b) * 0.5
    }
}

#[derive(Clone)]
pub struct TrackGeometry {
    seed: u32,
    control_points: Vec<Vec2>,
    centerline: Vec<Vec2>,
    arclength: Vec<f32>,
    length: f32,
    max_segment: f32,
    half_width: f32,
    gates: Vec<Gate>,
    spawn: Pose,
    index: RTree<SamplePoint>,
}

impl fmt::Debug for TrackGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackGeometry")
            .field("seed", &self.seed)
            .field("control_points", &self.control_points.len())
            .field("samples", &self.centerline.len())
            .field("length", &self.length)
            .field("half_width", &self.half_width)
            .field("gates", &self.gates.len())
            .field("spawn", &self.spawn)
            .finish()
    }
}

impl TrackGeometry {
    /// Builds geometry around an explicit dense closed centerline (the first
    /// point is not repeated at the end). Hand-made tracks report seed 0.
    pub fn from_centerline(
        centerline: Vec<Vec2>,
        half_width: f32,
        gate_count: usize,
    ) -> Result<Self, DegenerateTrackError> {
        Self::build(0, Vec::new(), centerline, half_width, gate_count)
            .map_err(|reason| DegenerateTrackError { seed: 0, reason })
    }

    fn build(
        seed: u32,
        control_points: Vec<Vec2>,
        centerline: Vec<Vec2>,
        half_width: f32,
        gate_count: usize,
    ) -> Result<Self, DegenerateReason> {
        if !(half_width.is_finite() && half_width > 0.0) {
            return Err(DegenerateReason::NonPositiveHalfWidth { half_width });
        }
        if centerline.len() < MIN_SAMPLES {
            return Err(DegenerateReason::TooFewSamples {
                count: centerline.len(),
                min: MIN_SAMPLES,
            });
        }

        let n = centerline.len();
        let mut arclength = Vec::with_capacity(n);
        let mut run = 0.0f32;
        let mut max_segment = 0.0f32;
        for i in 0..n {
            arclength.push(run);
            let segment = centerline[i].distance(centerline[(i + 1) % n]);
            max_segment = max_segment.max(segment);
            run += segment;
        }
        let length = run;

        check_curvature(&centerline, half_width)?;
        check_clearance(&centerline, &arclength, length, half_width)?;

        let index = RTree::bulk_load(
            centerline
                .iter()
                .enumerate()
                .map(|(i, p)| SamplePoint::new(p.to_array(), i))
                .collect(),
        );

        let mut geometry = Self {
            seed,
            control_points,
            centerline,
            arclength,
            length,
            max_segment,
            half_width,
            gates: Vec::with_capacity(gate_count),
            spawn: Pose::default(),
            index,
        };

        let span = half_width * GATE_SPAN_FRACTION;
        for g in 0..gate_count {
            let sample = g * n / gate_count;
            let center = geometry.centerline[sample];
            let across = geometry.tangent_at(sample).perp() * span;
            geometry.gates.push(Gate {
                index: g,
                sample,
                a: center - across,
                b: center + across,
            });
        }

        let tangent = geometry.tangent_at(0);
        geometry.spawn = Pose {
            position: geometry.centerline[0],
            heading: tangent.y.atan2(tangent.x),
        };

        Ok(geometry)
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn control_points(&self) -> &[Vec2] {
        &self.control_points
    }

    pub fn centerline(&self) -> &[Vec2] {
        &self.centerline
    }

    pub fn half_width(&self) -> f32 {
        self.half_width
    }

    /// Total loop length along the centerline.
    pub fn length(&self) -> f32 {
        self.length
    }

    /// Distance from sample 0 along the centerline.
    pub fn arclength_at(&self, sample: usize) -> f32 {
        self.arclength[sample % self.arclength.len()]
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn spawn_pose(&self) -> Pose {
        self.spawn
    }

    pub fn nearest_sample(&self, point: Vec2) -> usize {
        self.index
            .nearest_neighbor(&point.to_array())
            .map(|entry| entry.data)
            .unwrap_or(0)
    }

    /// Unit direction of travel at a centerline sample.
    pub fn tangent_at(&self, sample: usize) -> Vec2 {
        let n = self.centerline.len();
        let from = self.centerline[sample % n];
        let to = self.centerline[(sample + TANGENT_LOOKAHEAD) % n];
        (to - from).normalized()
    }

    pub fn tangent_near(&self, point: Vec2) -> Vec2 {
        self.tangent_at(self.nearest_sample(point))
    }

    /// Distance to the centerline polyline, or infinity when the point is
    /// farther than one half-width from every segment.
    pub fn distance_to_centerline(&self, point: Vec2) -> f32 {
        let n = self.centerline.len();
        let reach = self.half_width + self.max_segment;
        let envelope = AABB::from_corners(
            [point.x - reach, point.y - reach],
            [point.x + reach, point.y + reach],
        );
        self.index
            .locate_in_envelope(&envelope)
            .map(|entry| {
                let i = entry.data;
                let prev = self.centerline[(i + n - 1) % n];
                let here = self.centerline[i];
                let next = self.centerline[(i + 1) % n];
                point_segment_distance(point, prev, here)
                    .min(point_segment_distance(point, here, next))
            })
            .fold(f32::INFINITY, f32::min)
    }

    /// Corridor containment, inclusive of the boundary.
    pub fn contains(&self, point: Vec2) -> bool {
        point.is_finite() && self.distance_to_centerline(point) <= self.half_width
    }
}

fn check_curvature(centerline: &[Vec2], half_width: f32) -> Result<(), DegenerateReason> {
    let n = centerline.len();
    for i in 0..n {
        let a = centerline[(i + n - CURVATURE_STRIDE) % n];
        let b = centerline[i];
        let c = centerline[(i + CURVATURE_STRIDE) % n];
        let twice_area = (b - a).cross(c - a).abs();
        if twice_area <= f32::EPSILON {
            continue;
        }
        let radius = (a.distance(b) * b.distance(c) * c.distance(a)) / (2.0 * twice_area);
        if radius < half_width {
            return Err(DegenerateReason::CurvatureTooTight {
                sample: i,
                radius,
                half_width,
            });
        }
    }
    Ok(())
}

fn check_clearance(
    centerline: &[Vec2],
    arclength: &[f32],
    length: f32,
    half_width: f32,
) -> Result<(), DegenerateReason> {
    let n = centerline.len();
    let min_arc = CLEARANCE_ARC_FACTOR * half_width;
    let min_gap = 2.0 * half_width * (1.0 - CLEARANCE_TOLERANCE);
    let min_gap_sq = min_gap * min_gap;
    for i in 0..n {
        for j in (i + 1)..n {
            let along = arclength[j] - arclength[i];
            if along.min(length - along) <= min_arc {
                continue;
            }
            let gap_sq = (centerline[j] - centerline[i]).length_sq();
            if gap_sq < min_gap_sq {
                return Err(DegenerateReason::SelfIntersecting {
                    first: i,
                    second: j,
                    distance: gap_sq.sqrt(),
                });
            }
        }
    }
    Ok(())
}

/// Builds procedural tracks from a [`TrackConfig`].
#[derive(Clone, Debug, Default)]
pub struct TrackGenerator {
    config: TrackConfig,
}

impl TrackGenerator {
    pub fn new(config: TrackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn generate(
        &self,
        seed: u32,
        control_point_count: usize,
        half_width: f32,
    ) -> Result<TrackGeometry, DegenerateTrackError> {
        let fail = |reason| DegenerateTrackError { seed, reason };
        if control_point_count < MIN_CONTROL_POINTS {
            return Err(fail(DegenerateReason::TooFewControlPoints {
                count: control_point_count,
                min: MIN_CONTROL_POINTS,
            }));
        }

        let control_points = self.control_points(seed, control_point_count);
        let per_segment = (self.config.samples / control_point_count).max(2);
        let centerline = catmull_rom_loop(&control_points, per_segment, CATMULL_ROM_ALPHA);
        TrackGeometry::build(
            seed,
            control_points,
            centerline,
            half_width,
            self.config.gates,
        )
        .map_err(fail)
    }

    /// Tries successive derived seeds until one yields a valid track.
    pub fn generate_retrying(&self, seed: u32) -> Result<TrackGeometry, DegenerateTrackError> {
        let attempts = self.config.generation_attempts.max(1);
        let mut last_err = None;
        for attempt in 0..attempts {
            let candidate = seed.wrapping_add(attempt.wrapping_mul(RETRY_SEED_STRIDE));
            match self.generate(candidate, self.config.control_points, self.config.half_width) {
                Ok(track) => {
                    if attempt > 0 {
                        tracing::info!(
                            seed = candidate,
                            attempt,
                            "track accepted after rejected seeds"
                        );
                    }
                    return Ok(track);
                }
                Err(err) => {
                    tracing::warn!(attempt, "{err}");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or(DegenerateTrackError {
            seed,
            reason: DegenerateReason::TooFewControlPoints {
                count: self.config.control_points,
                min: MIN_CONTROL_POINTS,
            },
        }))
    }

    fn control_points(&self, seed: u32, count: usize) -> Vec<Vec2> {
        let cfg = &self.config;
        let mut rng = SeededRng::new(seed);
        let step = TAU / count as f32;
        let angle_jitter = cfg.angle_jitter.clamp(0.0, 0.45);
        let radius_jitter = cfg.radius_jitter.clamp(0.0, 0.9);
        (0..count)
            .map(|i| {
                let angle =
                    step * i as f32 + rng.next_range_f32(-angle_jitter, angle_jitter) * step;
                let scale = 1.0 + rng.next_range_f32(-radius_jitter, radius_jitter);
                cfg.center
                    + Vec2::new(
                        cfg.radius_x * scale * angle.cos(),
                        cfg.radius_y * scale * angle.sin(),
                    )
            })
            .collect()
    }
}

/// Samples a closed centripetal Catmull-Rom spline through `points`,
/// `per_segment` samples per control-point span.
pub fn catmull_rom_loop(points: &[Vec2], per_segment: usize, alpha: f32) -> Vec<Vec2> {
    let n = points.len();
    let mut out = Vec::with_capacity(n * per_segment);
    for i in 0..n {
        let p0 = points[(i + n - 1) % n];
        let p1 = points[i];
        let p2 = points[(i + 1) % n];
        let p3 = points[(i + 2) % n];
        for k in 0..per_segment {
            let u = k as f32 / per_segment as f32;
            out.push(catmull_rom_point(p0, p1, p2, p3, u, alpha));
        }
    }
    out
}

fn catmull_rom_point(p0: Vec2, p1: Vec2, p2: Vec2, p3: Vec2, u: f32, alpha: f32) -> Vec2 {
    let knot = |a: Vec2, b: Vec2| a.distance(b).powf(alpha).max(1e-4);
    let t0 = 0.0;
    let t1 = t0 + knot(p0, p1);
    let t2 = t1 + knot(p1, p2);
    let t3 = t2 + knot(p2, p3);
    let t = t1 + (t2 - t1) * u;

    let blend = |a: Vec2, b: Vec2, ta: f32, tb: f32| {
        a * ((tb - t) / (tb - ta)) + b * ((t - ta) / (tb - ta))
    };
    let a1 = blend(p0, p1, t0, t1);
    let a2 = blend(p1, p2, t1, t2);
    let a3 = blend(p2, p3, t2, t3);
    let b1 = blend(a1, a2, t0, t2);
    let b2 = blend(a2, a3, t1, t3);
    blend(b1, b2, t1, t2)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> TrackGenerator {
        TrackGenerator::new(TrackConfig::default())
    }

    #[test]
    fn same_seed_same_track() {
        let a = generator().generate_retrying(42).expect("track");
        let b = generator().generate_retrying(42).expect("track");
        assert_eq!(a.seed(), b.seed());
        assert_eq!(a.centerline(), b.centerline());
        assert_eq!(a.gates(), b.gates());
    }

    #[test]
    fn different_seeds_differ() {
        let a = generator().generate_retrying(1).expect("track");
        let b = generator().generate_retrying(2).expect("track");
        assert_ne!(a.control_points(), b.control_points());
    }

    #[test]
    fn too_few_control_points_is_degenerate() {
        let err = generator().generate(5, 3, 40.0).unwrap_err();
        assert_eq!(err.seed, 5);
        assert!(matches!(
            err.reason,
            DegenerateReason::TooFewControlPoints { count: 3, .. }
        ));
    }

    #[test]
    fn zero_width_is_degenerate() {
        let err = generator().generate(5, 9, 0.0).unwrap_err();
        assert!(matches!(
            err.reason,
            DegenerateReason::NonPositiveHalfWidth { .. }
        ));
    }

    #[test]
    fn oversized_width_overlaps_itself() {
        // The nominal ellipse is ~440px tall; a 250px half-width cannot fit.
        let err = generator().generate(5, 9, 250.0).unwrap_err();
        assert!(matches!(
            err.reason,
            DegenerateReason::CurvatureTooTight { .. } | DegenerateReason::SelfIntersecting { .. }
        ));
    }

    #[test]
    fn exhausted_retries_return_the_last_attempt() {
        let generator = TrackGenerator::new(TrackConfig {
            half_width: 250.0,
            radius_jitter: 0.0,
            generation_attempts: 3,
            ..TrackConfig::default()
        });
        let err = generator.generate_retrying(5).unwrap_err();
        assert_eq!(err.seed, 5u32.wrapping_add(2u32.wrapping_mul(RETRY_SEED_STRIDE)));
    }

    #[test]
    fn rejected_seed_moves_on_to_a_derived_seed() {
        let generator = generator();
        let cfg = generator.config();
        let rejected = |seed: u32| {
            generator
                .generate(seed, cfg.control_points, cfg.half_width)
                .is_err()
        };
        let requested = (0..500u32)
            .map(|s| s.wrapping_mul(2_654_435_761))
            .find(|&s| rejected(s))
            .expect("some seed in range is degenerate");

        let track = generator
            .generate_retrying(requested)
            .expect("a derived seed is accepted");
        assert_ne!(track.seed(), requested);
        let attempt = (1..cfg.generation_attempts)
            .find(|&k| requested.wrapping_add(k.wrapping_mul(RETRY_SEED_STRIDE)) == track.seed())
            .expect("accepted seed is on the retry walk");
        for k in 0..attempt {
            assert!(rejected(requested.wrapping_add(k.wrapping_mul(RETRY_SEED_STRIDE))));
        }
    }

    #[test]
    fn centerline_is_inside_and_far_points_are_outside() {
        let track = generator().generate_retrying(7).expect("track");
        for p in track.centerline() {
            assert!(track.contains(*p));
        }
        assert!(!track.contains(Vec2::new(-500.0, -500.0)));
        assert!(!track.contains(Vec2::new(f32::NAN, 0.0)));
    }

    #[test]
    fn tangent_follows_sample_order() {
        let track = test_tracks::stadium(400.0, 80.0, 30.0, 4);
        let t = track.tangent_at(0);
        assert!(t.x > 0.99, "expected +x tangent on first straight, got {t:?}");
        let spawn = track.spawn_pose();
        assert!(spawn.heading.abs() < 1e-3);
    }

    #[test]
    fn gates_are_evenly_spaced_and_perpendicular() {
        let track = generator().generate_retrying(11).expect("track");
        let n = track.centerline().len();
        assert_eq!(track.gates().len(), TRACK_GATES);
        for gate in track.gates() {
            assert_eq!(gate.sample, gate.index * n / TRACK_GATES);
            let along = gate.b - gate.a;
            let tangent = track.tangent_at(gate.sample);
            assert!(along.normalized().dot(tangent).abs() < 1e-3);
        }
    }

    #[test]
    fn tight_hairpin_is_rejected() {
        let err = TrackGeometry::from_centerline(
            (0..64)
                .map(|k| Vec2::from_angle(TAU * k as f32 / 64.0) * 20.0)
                .collect(),
            30.0,
            2,
        )
        .unwrap_err();
        assert!(matches!(
            err.reason,
            DegenerateReason::CurvatureTooTight { .. }
        ));
    }
}
