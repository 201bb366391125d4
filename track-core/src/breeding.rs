//! Seams to the neuroevolution capability. The engine never looks inside a
//! genome; it only asks for random genomes, children of two parents, and
//! runnable controllers.

use crate::error::BreedError;

/// Maps an observation to raw action outputs `[steer, throttle, brake]`.
pub trait Controller {
    fn activate(&self, observation: &[f32]) -> Vec<f32>;
}

pub trait Breeder {
    type Genome: Clone;
    type Controller: Controller;

    /// A structurally minimal genome with random parameters.
    fn random_genome(&mut self) -> Self::Genome;

    /// One child of `mother` and `father`, mutated per the breeder's own
    /// configuration.
    fn breed(
        &mut self,
        mother: &Self::Genome,
        father: &Self::Genome,
    ) -> Result<Self::Genome, BreedError>;

    fn build_controller(&self, genome: &Self::Genome) -> Self::Controller;
}
