use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use track_core::breeding::{Breeder, Controller};
use track_core::history::FitnessSample;
use track_core::population::RetirementCounts;
use track_core::reward::{EpisodeProgress, RewardEvaluator};
use track_core::sensors::SensorArray;
use track_core::vehicle::{Action, VehicleModel, VehicleState, ACTION_LEN};
use track_core::{PopulationManager, SimConfig, TerminationReason, TrackGenerator};

use crate::brain::{DenseBreeder, DenseController, DenseGenome, MutationConfig};

const BREEDER_SEED_SALT: u32 = 0x2545_F491;

/// On-disk form of an evolved driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedGenome {
    pub fitness: f32,
    pub track_seed: u32,
    pub genome: DenseGenome,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub seed: u32,
    pub track_seed: u32,
    pub ticks: u64,
    pub generation: u64,
    pub replacements: u64,
    pub retirements: RetirementCounts,
    pub action_faults: u64,
    pub breed_fallbacks: u64,
    pub best_fitness: f32,
    pub average_fitness: f32,
    pub elite_fitnesses: Vec<f32>,
    pub best: Option<SavedGenome>,
    pub history: Vec<FitnessSample>,
}

impl RunSummary {
    pub fn elite_best(&self) -> Option<f32> {
        self.elite_fitnesses.first().copied()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplayReport {
    pub track_seed: u32,
    pub steps: u32,
    pub fitness: f32,
    pub best_fitness: f32,
    pub gates_passed: u32,
    pub termination: TerminationReason,
    pub action_faults: u32,
    pub distance: f32,
    pub final_state: VehicleState,
}

pub fn observation_len(config: &SimConfig) -> usize {
    config.sensors.ray_count + 1
}

pub fn breeder_for(config: &SimConfig, mutation: &MutationConfig) -> DenseBreeder {
    DenseBreeder::new(
        observation_len(config),
        ACTION_LEN,
        mutation.clone(),
        config.seed ^ BREEDER_SEED_SALT,
    )
}

/// Runs the steady-state loop for `ticks` ticks. A HUD line is logged every
/// `hud_every` ticks; zero disables it.
pub fn run_evolution(
    config: &SimConfig,
    mutation: &MutationConfig,
    ticks: u64,
    hud_every: u64,
) -> Result<RunSummary> {
    if ticks == 0 {
        return Err(anyhow!("ticks must be > 0"));
    }

    let breeder = breeder_for(config, mutation);
    let mut manager = PopulationManager::new(config.clone(), breeder)
        .with_context(|| format!("failed to start population for seed {:#010x}", config.seed))?;

    for _ in 0..ticks {
        let report = manager.tick();
        if hud_every > 0 && report.tick % hud_every == 0 {
            let hud = manager.snapshot();
            tracing::info!(
                tick = hud.tick,
                generation = hud.generation,
                turnover = hud.replacements_in_generation,
                active = hud.active_count,
                best = hud.best_fitness,
                average = hud.average_fitness,
                elite_best = hud.elite_best,
                "hud"
            );
        }
    }

    let hud = manager.snapshot();
    let track_seed = manager.geometry().seed();
    Ok(RunSummary {
        seed: config.seed,
        track_seed,
        ticks: hud.tick,
        generation: hud.generation,
        replacements: hud.replacements,
        retirements: manager.retirements(),
        action_faults: manager.action_faults(),
        breed_fallbacks: manager.breed_fallbacks(),
        best_fitness: hud.best_fitness,
        average_fitness: hud.average_fitness,
        elite_fitnesses: manager.elite().fitnesses(),
        best: manager.best_genome().map(|(genome, fitness)| SavedGenome {
            fitness,
            track_seed,
            genome,
        }),
        history: hud.history,
    })
}

/// Drives one agent with a fixed genome from the spawn pose until its
/// episode ends. Step and stagnation limits guarantee termination.
pub fn run_replay(config: &SimConfig, genome: &DenseGenome) -> Result<ReplayReport> {
    config.validate().context("configuration rejected")?;
    genome.validate().context("genome is malformed")?;
    if genome.inputs != observation_len(config) || genome.outputs != ACTION_LEN {
        return Err(anyhow!(
            "genome expects {} inputs and {} outputs, the configured car provides {} and needs {}",
            genome.inputs,
            genome.outputs,
            observation_len(config),
            ACTION_LEN
        ));
    }

    let track = TrackGenerator::new(config.track.clone())
        .generate_retrying(config.seed)
        .with_context(|| format!("no track for seed {:#010x}", config.seed))?;
    let sensors = SensorArray::new(config.sensors.clone());
    let model = VehicleModel::new(config.vehicle.clone());
    let evaluator = RewardEvaluator::new(config.reward.clone());
    let controller = DenseController::new(genome.clone());

    let mut state = VehicleState::at(track.spawn_pose());
    let mut progress = EpisodeProgress::starting(&track);
    let mut action_faults = 0u32;
    let mut distance = 0.0f32;
    loop {
        let observation = sensors.observe(&state, &track, config.vehicle.max_speed);
        let outputs = controller.activate(observation.as_slice());
        let action = Action::from_outputs(&outputs).unwrap_or_else(|fault| {
            tracing::warn!(step = progress.steps, "{fault}; using neutral action");
            action_faults += 1;
            Action::NEUTRAL
        });
        let next = model.step(&state, action, config.dt);
        let outcome = evaluator.evaluate(&mut progress, action, &state, &next, &track);
        distance += state.position.distance(next.position);
        state = next;
        if let Some(gate) = outcome.gate_crossed {
            tracing::debug!(gate, step = progress.steps, "gate");
        }
        if let Some(termination) = outcome.termination {
            return Ok(ReplayReport {
                track_seed: track.seed(),
                steps: progress.steps,
                fitness: progress.fitness,
                best_fitness: progress.best_fitness,
                gates_passed: progress.gates_passed,
                termination,
                action_faults,
                distance,
                final_state: state,
            });
        }
    }
}

/// A fresh minimal genome shaped for `config`.
pub fn random_genome(config: &SimConfig, mutation: &MutationConfig) -> DenseGenome {
    breeder_for(config, mutation).random_genome()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimConfig {
        SimConfig {
            active_size: 6,
            elite_size: 4,
            seed: 0x0BAD_5EED,
            ..SimConfig::default()
        }
    }

    #[test]
    fn evolution_fills_the_elite_pool() -> Result<()> {
        let summary = run_evolution(&small_config(), &MutationConfig::default(), 1_200, 0)?;
        assert_eq!(summary.ticks, 1_200);
        assert!(summary.replacements > 0);
        assert_eq!(summary.replacements, summary.retirements.total());
        assert!(!summary.elite_fitnesses.is_empty());
        assert!(summary.elite_fitnesses.windows(2).all(|w| w[0] >= w[1]));
        let best = summary.best.as_ref().expect("best genome");
        assert_eq!(Some(best.fitness), summary.elite_best());
        assert_eq!(best.genome.inputs, 8);
        Ok(())
    }

    #[test]
    fn replay_always_terminates() -> Result<()> {
        let config = small_config();
        let genome = random_genome(&config, &MutationConfig::default());
        let report = run_replay(&config, &genome)?;
        assert!(report.steps >= 1);
        assert!(report.steps <= config.reward.max_steps + 1);
        assert_eq!(report.action_faults, 0);
        Ok(())
    }

    #[test]
    fn replay_rejects_foreign_shapes() {
        let config = small_config();
        let genome = DenseBreeder::new(5, 3, MutationConfig::default(), 1).random_genome();
        assert!(run_replay(&config, &genome).is_err());
    }
}
