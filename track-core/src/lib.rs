pub mod breeding;
pub mod config;
pub mod constants;
pub mod elite;
pub mod error;
pub mod geometry;
pub mod history;
pub mod population;
pub mod reward;
pub mod rng;
pub mod sensors;
pub mod track;
pub mod vehicle;

pub use breeding::{Breeder, Controller};
pub use config::SimConfig;
pub use error::{
    ActionFault, BreedError, ConfigError, DegenerateReason, DegenerateTrackError, SetupError,
};
pub use population::{HudSnapshot, PopulationManager, TickReport};
pub use reward::TerminationReason;
pub use track::{TrackGenerator, TrackGeometry};
