use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DegenerateReason {
    NonPositiveHalfWidth { half_width: f32 },
    TooFewControlPoints { count: usize, min: usize },
    TooFewSamples { count: usize, min: usize },
    CurvatureTooTight { sample: usize, radius: f32, half_width: f32 },
    SelfIntersecting { first: usize, second: usize, distance: f32 },
}

impl fmt::Display for DegenerateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveHalfWidth { half_width } => {
                write!(f, "half-width must be positive and finite, got {half_width}")
            }
            Self::TooFewControlPoints { count, min } => {
                write!(f, "need at least {min} control points, got {count}")
            }
            Self::TooFewSamples { count, min } => {
                write!(f, "need at least {min} centerline samples, got {count}")
            }
            Self::CurvatureTooTight {
                sample,
                radius,
                half_width,
            } => write!(
                f,
                "turn radius {radius:.1} at sample {sample} is tighter than half-width {half_width:.1}"
            ),
            Self::SelfIntersecting {
                first,
                second,
                distance,
            } => write!(
                f,
                "corridor overlaps itself: samples {first} and {second} are {distance:.1} apart"
            ),
        }
    }
}

/// Track generation produced geometry that cannot host a single drivable band.
/// Callers retry with another seed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DegenerateTrackError {
    pub seed: u32,
    pub reason: DegenerateReason,
}

impl fmt::Display for DegenerateTrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "degenerate track for seed 0x{:08x}: {}", self.seed, self.reason)
    }
}

impl std::error::Error for DegenerateTrackError {}

#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    ZeroActiveSize,
    ZeroRayCount,
    ZeroHistoryCapacity,
    ZeroGateCount,
    TooFewControlPoints { count: usize, min: usize },
    NonPositive { field: &'static str, value: f32 },
    OutOfRange { field: &'static str, value: f32, min: f32, max: f32 },
    ZeroSteps { field: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroActiveSize => write!(f, "active roster size must be at least 1"),
            Self::ZeroRayCount => write!(f, "sensor ray count must be at least 1"),
            Self::ZeroHistoryCapacity => write!(f, "fitness history capacity must be at least 1"),
            Self::ZeroGateCount => write!(f, "track must have at least 1 gate"),
            Self::TooFewControlPoints { count, min } => {
                write!(f, "track needs at least {min} control points, got {count}")
            }
            Self::NonPositive { field, value } => {
                write!(f, "{field} must be positive and finite, got {value}")
            }
            Self::OutOfRange {
                field,
                value,
                min,
                max,
            } => write!(f, "{field} must be within [{min}, {max}], got {value}"),
            Self::ZeroSteps { field } => write!(f, "{field} must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The breeding capability could not produce a child from the given parents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreedError {
    pub message: String,
}

impl BreedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BreedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "breeding failed: {}", self.message)
    }
}

impl std::error::Error for BreedError {}

/// A controller returned outputs that cannot be turned into an action.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActionFault {
    WrongLength { expected: usize, actual: usize },
    NonFinite { index: usize },
}

impl fmt::Display for ActionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongLength { expected, actual } => {
                write!(f, "controller returned {actual} outputs, expected {expected}")
            }
            Self::NonFinite { index } => write!(f, "controller output {index} is not finite"),
        }
    }
}

impl std::error::Error for ActionFault {}

/// The engine could not be brought up.
#[derive(Clone, Debug, PartialEq)]
pub enum SetupError {
    Config(ConfigError),
    Track(DegenerateTrackError),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid configuration: {err}"),
            Self::Track(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Track(err) => Some(err),
        }
    }
}

impl From<ConfigError> for SetupError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<DegenerateTrackError> for SetupError {
    fn from(err: DegenerateTrackError) -> Self {
        Self::Track(err)
    }
}
