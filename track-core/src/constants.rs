//! Default tuning values. Units are world pixels and simulation ticks
//! (`DEFAULT_DT` = 1 tick), matching an 800×600 arena.

// Roster
pub const ACTIVE_SIZE: usize = 20;
pub const ELITE_SIZE: usize = 8;
pub const FITNESS_HISTORY_CAPACITY: usize = 200;
pub const DEFAULT_SEED: u32 = 0xC0FF_EE11;
pub const DEFAULT_DT: f32 = 1.0;

// Track
pub const ARENA_WIDTH: f32 = 800.0;
pub const ARENA_HEIGHT: f32 = 600.0;
pub const TRACK_CONTROL_POINTS: usize = 9;
pub const TRACK_HALF_WIDTH: f32 = 40.0;
pub const TRACK_RADIUS_X: f32 = 310.0;
pub const TRACK_RADIUS_Y: f32 = 220.0;
pub const TRACK_RADIUS_JITTER: f32 = 0.22; // fraction of nominal radius
pub const TRACK_ANGLE_JITTER: f32 = 0.25; // fraction of the angular step
pub const TRACK_SAMPLES: usize = 600;
pub const TRACK_GATES: usize = 12;
pub const TRACK_GENERATION_ATTEMPTS: u32 = 16;
pub const CATMULL_ROM_ALPHA: f32 = 0.5; // centripetal
pub const TANGENT_LOOKAHEAD: usize = 5; // samples
pub const GATE_SPAN_FRACTION: f32 = 0.95; // of half-width, keeps gate ends inside

// Sensors
pub const RAY_COUNT: usize = 7;
pub const RAY_HALF_SPREAD_DEG: f32 = 75.0;
pub const RAY_MAX_RANGE: f32 = 200.0;
pub const RAY_MARCH_STEP: f32 = 4.0;
pub const RAY_REFINE_ITERATIONS: u32 = 6;

// Vehicle
pub const MAX_SPEED: f32 = 8.0;
pub const MAX_YAW_RATE: f32 = 0.069_813_17; // 4 degrees per tick
pub const THROTTLE_ACCEL: f32 = 0.25;
pub const BRAKE_DECEL: f32 = 0.3;
pub const DRAG: f32 = 0.02;

// Reward
pub const ALIGNMENT_WEIGHT: f32 = 0.05;
pub const SPEED_WEIGHT: f32 = 0.05;
pub const SURVIVAL_BONUS: f32 = 0.02;
pub const GATE_BONUS: f32 = 200.0;
pub const CRASH_PENALTY: f32 = 200.0;
pub const SPIN_PENALTY: f32 = 0.5;
pub const SPIN_SPEED_THRESHOLD: f32 = 1.0;
pub const SPIN_STEER_THRESHOLD: f32 = 0.5;
pub const MAX_EPISODE_STEPS: u32 = 1500;
pub const STAGNATION_STEPS: u32 = 100;
