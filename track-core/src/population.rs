//! Fixed roster of racing agents with same-tick replacement.
//!
//! Every tick runs in two phases. The stepping phase drives each active slot
//! independently: controller, vehicle, sensors, reward. The replacement phase
//! then walks the retired slots in order, feeds the elite pool, breeds a
//! successor and respawns it at the start line before the tick returns.

use serde::Serialize;

use crate::breeding::{Breeder, Controller};
use crate::config::SimConfig;
use crate::elite::{Admission, ElitePool};
use crate::error::SetupError;
use crate::history::{FitnessHistory, FitnessSample};
use crate::reward::{EpisodeProgress, RewardEvaluator, TerminationReason};
use crate::rng::SeededRng;
use crate::sensors::{Observation, SensorArray};
use crate::track::{TrackGenerator, TrackGeometry};
use crate::vehicle::{Action, VehicleModel, VehicleState};

const PARENT_RNG_SALT: u32 = 0x5BD1_E995;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Active,
    Terminating(TerminationReason),
    Respawning,
}

/// How a slot's current genome came to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lineage {
    Random,
    Bred { mother_rank: usize, father_rank: usize },
    /// The breeder failed and a random genome took its place.
    Fallback,
}

pub struct Agent<G, C> {
    spawn_id: u64,
    genome: G,
    controller: C,
    lineage: Lineage,
    vehicle: VehicleState,
    progress: EpisodeProgress,
    observation: Observation,
    last_action: Action,
}

impl<G, C> Agent<G, C> {
    pub fn spawn_id(&self) -> u64 {
        self.spawn_id
    }

    pub fn genome(&self) -> &G {
        &self.genome
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn lineage(&self) -> Lineage {
        self.lineage
    }

    pub fn vehicle(&self) -> &VehicleState {
        &self.vehicle
    }

    pub fn progress(&self) -> &EpisodeProgress {
        &self.progress
    }

    pub fn observation(&self) -> &Observation {
        &self.observation
    }

    pub fn last_action(&self) -> Action {
        self.last_action
    }
}

struct Slot<G, C> {
    state: SlotState,
    agent: Agent<G, C>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RetirementCounts {
    pub crashed: u64,
    pub timed_out: u64,
    pub stagnated: u64,
}

impl RetirementCounts {
    pub fn get(&self, reason: TerminationReason) -> u64 {
        match reason {
            TerminationReason::Crashed => self.crashed,
            TerminationReason::TimedOut => self.timed_out,
            TerminationReason::Stagnated => self.stagnated,
        }
    }

    pub fn total(&self) -> u64 {
        self.crashed + self.timed_out + self.stagnated
    }

    fn record(&mut self, reason: TerminationReason) {
        match reason {
            TerminationReason::Crashed => self.crashed += 1,
            TerminationReason::TimedOut => self.timed_out += 1,
            TerminationReason::Stagnated => self.stagnated += 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Retirement {
    pub slot: usize,
    pub spawn_id: u64,
    pub reason: TerminationReason,
    pub fitness: f32,
    pub steps: u32,
    pub gates_passed: u32,
    pub admission: Admission,
    /// Spawn id and origin of the agent that took the slot over.
    pub successor: u64,
    pub successor_lineage: Lineage,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub retirements: Vec<Retirement>,
    pub gates_crossed: u32,
    pub action_faults: u32,
    pub generation_advanced: bool,
}

/// Everything a renderer or HUD needs for one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HudSnapshot {
    pub tick: u64,
    pub generation: u64,
    /// Replacements since the generation counter last advanced.
    pub replacements_in_generation: usize,
    pub replacements: u64,
    pub active_count: usize,
    pub best_fitness: f32,
    pub average_fitness: f32,
    pub elite_best: Option<f32>,
    pub vehicles: Vec<VehicleState>,
    pub history: Vec<FitnessSample>,
}

pub struct PopulationManager<B: Breeder> {
    config: SimConfig,
    breeder: B,
    geometry: TrackGeometry,
    sensors: SensorArray,
    vehicle_model: VehicleModel,
    reward: RewardEvaluator,
    slots: Vec<Slot<B::Genome, B::Controller>>,
    elite: ElitePool<B::Genome>,
    history: FitnessHistory,
    parent_rng: SeededRng,
    tick: u64,
    next_spawn_id: u64,
    generation: u64,
    replacements: u64,
    replacements_in_generation: usize,
    retirements: RetirementCounts,
    action_faults: u64,
    breed_fallbacks: u64,
}

impl<B: Breeder> PopulationManager<B> {
    /// Validates `config`, generates the track from its seed and fills the
    /// roster with random genomes.
    pub fn new(config: SimConfig, breeder: B) -> Result<Self, SetupError> {
        config.validate()?;
        let geometry = TrackGenerator::new(config.track.clone()).generate_retrying(config.seed)?;
        Ok(Self::assemble(config, geometry, breeder))
    }

    /// Same as [`PopulationManager::new`] on a track built elsewhere.
    pub fn with_track(
        config: SimConfig,
        geometry: TrackGeometry,
        breeder: B,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        Ok(Self::assemble(config, geometry, breeder))
    }

    fn assemble(config: SimConfig, geometry: TrackGeometry, breeder: B) -> Self {
        let mut manager = Self {
            sensors: SensorArray::new(config.sensors.clone()),
            vehicle_model: VehicleModel::new(config.vehicle.clone()),
            reward: RewardEvaluator::new(config.reward.clone()),
            slots: Vec::with_capacity(config.active_size),
            elite: ElitePool::new(config.elite_size),
            history: FitnessHistory::new(config.history_capacity),
            parent_rng: SeededRng::new(config.seed ^ PARENT_RNG_SALT),
            tick: 0,
            next_spawn_id: 0,
            generation: 0,
            replacements: 0,
            replacements_in_generation: 0,
            retirements: RetirementCounts::default(),
            action_faults: 0,
            breed_fallbacks: 0,
            breeder,
            geometry,
            config,
        };
        for _ in 0..manager.config.active_size {
            let genome = manager.breeder.random_genome();
            let agent = manager.spawn(genome, Lineage::Random);
            manager.slots.push(Slot {
                state: SlotState::Active,
                agent,
            });
        }
        tracing::info!(
            seed = manager.geometry.seed(),
            length = manager.geometry.length(),
            gates = manager.geometry.gates().len(),
            roster = manager.slots.len(),
            "population ready"
        );
        manager
    }

    fn spawn(&mut self, genome: B::Genome, lineage: Lineage) -> Agent<B::Genome, B::Controller> {
        let controller = self.breeder.build_controller(&genome);
        let vehicle = VehicleState::at(self.geometry.spawn_pose());
        let observation = self
            .sensors
            .observe(&vehicle, &self.geometry, self.config.vehicle.max_speed);
        let spawn_id = self.next_spawn_id;
        self.next_spawn_id += 1;
        Agent {
            spawn_id,
            genome,
            controller,
            lineage,
            vehicle,
            progress: EpisodeProgress::starting(&self.geometry),
            observation,
            last_action: Action::NEUTRAL,
        }
    }

    /// Advances the whole roster by one fixed timestep.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        self.step_agents(&mut report);
        self.replace_retired(&mut report);

        let (best, average) = self.active_fitness();
        self.history.push(FitnessSample {
            tick: self.tick,
            best,
            average,
        });
        report
    }

    fn step_agents(&mut self, report: &mut TickReport) {
        let dt = self.config.dt;
        let max_speed = self.config.vehicle.max_speed;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.state != SlotState::Active {
                continue;
            }
            let agent = &mut slot.agent;
            let outputs = agent.controller.activate(agent.observation.as_slice());
            let action = match Action::from_outputs(&outputs) {
                Ok(action) => action,
                Err(fault) => {
                    tracing::warn!(
                        slot = index,
                        spawn_id = agent.spawn_id,
                        "{fault}; using neutral action"
                    );
                    report.action_faults += 1;
                    Action::NEUTRAL
                }
            };

            let old = agent.vehicle;
            let new = self.vehicle_model.step(&old, action, dt);
            let outcome = self
                .reward
                .evaluate(&mut agent.progress, action, &old, &new, &self.geometry);
            agent.vehicle = new;
            agent.last_action = action;
            if outcome.gate_crossed.is_some() {
                report.gates_crossed += 1;
            }

            match outcome.termination {
                Some(reason) => slot.state = SlotState::Terminating(reason),
                None => agent.observation = self.sensors.observe(&new, &self.geometry, max_speed),
            }
        }
        self.action_faults += u64::from(report.action_faults);
    }

    fn replace_retired(&mut self, report: &mut TickReport) {
        for index in 0..self.slots.len() {
            let SlotState::Terminating(reason) = self.slots[index].state else {
                continue;
            };
            let (spawn_id, fitness, steps, gates_passed, genome) = {
                let agent = &self.slots[index].agent;
                (
                    agent.spawn_id,
                    agent.progress.fitness,
                    agent.progress.steps,
                    agent.progress.gates_passed,
                    agent.genome.clone(),
                )
            };
            let admission = self.elite.offer(genome, fitness);
            self.slots[index].state = SlotState::Respawning;

            let (child, lineage) = self.next_child();
            let successor = self.spawn(child, lineage);
            let successor_id = successor.spawn_id;
            tracing::debug!(
                slot = index,
                retired = spawn_id,
                %reason,
                fitness,
                steps,
                successor = successor_id,
                ?lineage,
                "respawned"
            );
            let slot = &mut self.slots[index];
            slot.agent = successor;
            slot.state = SlotState::Active;

            self.retirements.record(reason);
            self.replacements += 1;
            self.replacements_in_generation += 1;
            if self.replacements_in_generation >= self.config.active_size {
                self.replacements_in_generation = 0;
                self.generation += 1;
                report.generation_advanced = true;
                tracing::info!(
                    generation = self.generation,
                    replacements = self.replacements,
                    elite_best = self.elite.best().map(|e| e.fitness),
                    "generation advanced"
                );
            }

            report.retirements.push(Retirement {
                slot: index,
                spawn_id,
                reason,
                fitness,
                steps,
                gates_passed,
                admission,
                successor: successor_id,
                successor_lineage: lineage,
            });
        }
    }

    fn next_child(&mut self) -> (B::Genome, Lineage) {
        if self.elite.len() < 2 {
            return (self.breeder.random_genome(), Lineage::Random);
        }
        let (mother_rank, father_rank) = self.parent_rng.next_distinct_pair(self.elite.len());
        let entries = self.elite.entries();
        let bred = self
            .breeder
            .breed(&entries[mother_rank].genome, &entries[father_rank].genome);
        match bred {
            Ok(child) => (
                child,
                Lineage::Bred {
                    mother_rank,
                    father_rank,
                },
            ),
            Err(err) => {
                self.breed_fallbacks += 1;
                tracing::warn!(mother_rank, father_rank, "{err}; spawning a random genome");
                (self.breeder.random_genome(), Lineage::Fallback)
            }
        }
    }

    fn active_fitness(&self) -> (f32, f32) {
        let mut best = f32::NEG_INFINITY;
        let mut total = 0.0;
        let mut count = 0usize;
        for slot in self.slots.iter().filter(|s| s.state == SlotState::Active) {
            let fitness = slot.agent.progress.fitness;
            best = best.max(fitness);
            total += fitness;
            count += 1;
        }
        if count == 0 {
            (0.0, 0.0)
        } else {
            (best, total / count as f32)
        }
    }

    pub fn snapshot(&self) -> HudSnapshot {
        let (best_fitness, average_fitness) = self.active_fitness();
        HudSnapshot {
            tick: self.tick,
            generation: self.generation,
            replacements_in_generation: self.replacements_in_generation,
            replacements: self.replacements,
            active_count: self.active_count(),
            best_fitness,
            average_fitness,
            elite_best: self.elite.best().map(|e| e.fitness),
            vehicles: self.slots.iter().map(|s| s.agent.vehicle).collect(),
            history: self.history.to_vec(),
        }
    }

    /// Best elite genome and its fitness, by value.
    pub fn best_genome(&self) -> Option<(B::Genome, f32)> {
        self.elite.best().map(|e| (e.genome.clone(), e.fitness))
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn geometry(&self) -> &TrackGeometry {
        &self.geometry
    }

    pub fn breeder(&self) -> &B {
        &self.breeder
    }

    pub fn elite(&self) -> &ElitePool<B::Genome> {
        &self.elite
    }

    pub fn history(&self) -> &FitnessHistory {
        &self.history
    }

    pub fn roster_size(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.state == SlotState::Active).count()
    }

    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(|s| s.state)
    }

    pub fn agent(&self, slot: usize) -> Option<&Agent<B::Genome, B::Controller>> {
        self.slots.get(slot).map(|s| &s.agent)
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent<B::Genome, B::Controller>> {
        self.slots.iter().map(|s| &s.agent)
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn replacements(&self) -> u64 {
        self.replacements
    }

    pub fn retirements(&self) -> RetirementCounts {
        self.retirements
    }

    pub fn action_faults(&self) -> u64 {
        self.action_faults
    }

    pub fn breed_fallbacks(&self) -> u64 {
        self.breed_fallbacks
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::BreedError;
    use crate::reward::RewardConfig;
    use crate::track::test_tracks::stadium;
    use crate::track::TrackConfig;
    use crate::vehicle::VehicleParams;

    /// Plays back fixed outputs, one entry per activation; the last entry
    /// repeats.
    struct Script {
        outputs: Vec<Vec<f32>>,
        calls: Cell<usize>,
    }

    impl Controller for Script {
        fn activate(&self, _observation: &[f32]) -> Vec<f32> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            let last = self.outputs.len() - 1;
            self.outputs[call.min(last)].clone()
        }
    }

    /// Genomes are plain ids; every controller runs the same script.
    struct ScriptBreeder {
        script: Vec<Vec<f32>>,
        next_id: u32,
        fail_breeding: bool,
        /// Genome whose controller bolts out of the corridor on its fifth call.
        crash_genome: Option<u32>,
        bred: Vec<(u32, u32)>,
    }

    impl ScriptBreeder {
        fn new(script: Vec<Vec<f32>>) -> Self {
            Self {
                script,
                next_id: 0,
                fail_breeding: false,
                crash_genome: None,
                bred: Vec::new(),
            }
        }
    }

    impl Breeder for ScriptBreeder {
        type Genome = u32;
        type Controller = Script;

        fn random_genome(&mut self) -> u32 {
            self.next_id += 1;
            self.next_id
        }

        fn breed(&mut self, mother: &u32, father: &u32) -> Result<u32, BreedError> {
            if self.fail_breeding {
                return Err(BreedError::new("refused"));
            }
            self.bred.push((*mother, *father));
            self.next_id += 1;
            Ok(self.next_id)
        }

        fn build_controller(&self, genome: &u32) -> Script {
            let mut outputs = self.script.clone();
            if self.crash_genome == Some(*genome) {
                outputs = vec![vec![1.0, 0.0, 0.0]; 4];
                outputs.push(vec![0.0, 1.0, 0.0]);
            }
            Script {
                outputs,
                calls: Cell::new(0),
            }
        }
    }

    fn config(active_size: usize, elite_size: usize) -> SimConfig {
        SimConfig {
            active_size,
            elite_size,
            ..SimConfig::default()
        }
    }

    fn track() -> TrackGeometry {
        stadium(800.0, 150.0, 40.0, 6)
    }

    #[test]
    fn forced_crash_on_fifth_tick_respawns_in_same_tick() {
        // Four ticks turning on the spot, then a burst that leaves the corridor.
        let cfg = SimConfig {
            vehicle: VehicleParams {
                max_speed: 100.0,
                max_yaw_rate: core::f32::consts::FRAC_PI_8,
                throttle_accel: 100.0,
                ..VehicleParams::default()
            },
            ..config(3, 4)
        };
        let mut script = vec![vec![1.0, 0.0, 0.0]; 4];
        script.push(vec![0.0, 1.0, 0.0]);
        let breeder = ScriptBreeder::new(script);
        let mut manager = PopulationManager::with_track(cfg, track(), breeder).expect("manager");

        for _ in 0..4 {
            let report = manager.tick();
            assert!(report.retirements.is_empty());
        }
        let report = manager.tick();
        assert_eq!(report.tick, 5);
        assert_eq!(report.retirements.len(), 3);
        let reward = RewardConfig::default();
        let expected = 4.0 * (reward.survival_bonus - reward.spin_penalty) - reward.crash_penalty;
        for (slot, retired) in report.retirements.iter().enumerate() {
            assert_eq!(retired.slot, slot);
            assert_eq!(retired.reason, TerminationReason::Crashed);
            assert_eq!(retired.steps, 5);
            assert!((retired.fitness - expected).abs() < 1e-3);
            assert!(retired.admission.admitted());
        }

        assert_eq!(manager.roster_size(), 3);
        assert_eq!(manager.active_count(), 3);
        assert_eq!(manager.retirements().crashed, 3);
        assert_eq!(manager.replacements(), 3);
        assert_eq!(manager.generation(), 1);
        assert_eq!(manager.snapshot().replacements_in_generation, 0);
        let spawn = manager.geometry().spawn_pose();
        for agent in manager.agents() {
            assert_eq!(agent.vehicle().position, spawn.position);
            assert_eq!(agent.progress().steps, 0);
            assert!(agent.spawn_id() >= 3);
        }
        // The first replacement had one elite and fell back to random; the
        // next two bred from the pool.
        assert_eq!(report.retirements[0].successor_lineage, Lineage::Random);
        assert!(matches!(report.retirements[1].successor_lineage, Lineage::Bred { .. }));
        assert!(matches!(report.retirements[2].successor_lineage, Lineage::Bred { .. }));
    }

    #[test]
    fn single_elite_falls_back_to_random_genomes() {
        let cfg = SimConfig {
            reward: RewardConfig {
                max_steps: 2,
                ..RewardConfig::default()
            },
            ..config(4, 1)
        };
        let breeder = ScriptBreeder::new(vec![vec![0.0, 0.0, 0.0]]);
        let mut manager = PopulationManager::with_track(cfg, track(), breeder).expect("manager");
        for _ in 0..9 {
            manager.tick();
        }
        assert_eq!(manager.elite().len(), 1);
        assert!(manager.replacements() > 0);
        assert!(manager.breeder().bred.is_empty());
        assert_eq!(manager.breed_fallbacks(), 0);
        assert!(manager.agents().all(|a| a.lineage() == Lineage::Random));
        assert_eq!(manager.retirements().timed_out, manager.replacements());
    }

    #[test]
    fn breeder_errors_fall_back_and_are_counted() {
        let cfg = SimConfig {
            reward: RewardConfig {
                max_steps: 1,
                ..RewardConfig::default()
            },
            ..config(3, 3)
        };
        let mut breeder = ScriptBreeder::new(vec![vec![0.0, 0.5, 0.0]]);
        breeder.fail_breeding = true;
        let mut manager = PopulationManager::with_track(cfg, track(), breeder).expect("manager");
        for _ in 0..6 {
            manager.tick();
        }
        assert!(manager.breed_fallbacks() > 0);
        assert_eq!(manager.active_count(), 3);
        assert!(manager.agents().any(|a| a.lineage() == Lineage::Fallback));
    }

    #[test]
    fn malformed_outputs_use_neutral_action() {
        let breeder = ScriptBreeder::new(vec![vec![f32::NAN, 1.0, 0.0], vec![1.0]]);
        let mut manager =
            PopulationManager::with_track(config(2, 2), track(), breeder).expect("manager");
        let first = manager.tick();
        let second = manager.tick();
        assert_eq!(first.action_faults, 2);
        assert_eq!(second.action_faults, 2);
        assert_eq!(manager.action_faults(), 4);
        let spawn = manager.geometry().spawn_pose();
        for agent in manager.agents() {
            assert_eq!(agent.last_action(), Action::NEUTRAL);
            assert_eq!(agent.vehicle().position, spawn.position);
        }
    }

    #[test]
    fn snapshot_tracks_roster_and_history() {
        let cfg = SimConfig {
            history_capacity: 3,
            ..config(5, 2)
        };
        let breeder = ScriptBreeder::new(vec![vec![0.0, 1.0, 0.0]]);
        let mut manager = PopulationManager::with_track(cfg, track(), breeder).expect("manager");
        for _ in 0..5 {
            manager.tick();
        }
        let hud = manager.snapshot();
        assert_eq!(hud.tick, 5);
        assert_eq!(hud.active_count, 5);
        assert_eq!(hud.vehicles.len(), 5);
        assert_eq!(hud.history.iter().map(|s| s.tick).collect::<Vec<_>>(), vec![3, 4, 5]);
        assert!(hud.best_fitness >= hud.average_fitness);
        assert!(hud.best_fitness > 0.0);
        assert!(manager.best_genome().is_none());
    }

    #[test]
    fn rejects_invalid_config() {
        let breeder = ScriptBreeder::new(vec![vec![0.0, 0.0, 0.0]]);
        let err = PopulationManager::with_track(config(0, 2), track(), breeder)
            .err()
            .expect("zero roster is rejected");
        assert!(matches!(err, SetupError::Config(_)));
    }

    #[test]
    fn unbuildable_track_is_a_setup_error() {
        let cfg = SimConfig {
            track: TrackConfig {
                half_width: 250.0,
                radius_jitter: 0.0,
                generation_attempts: 3,
                ..TrackConfig::default()
            },
            ..config(3, 2)
        };
        let breeder = ScriptBreeder::new(vec![vec![0.0, 0.0, 0.0]]);
        let err = PopulationManager::new(cfg, breeder)
            .err()
            .expect("no corridor that wide fits the arena");
        assert!(matches!(err, SetupError::Track(_)));
    }

    #[test]
    fn hud_reports_turnover_within_the_generation() {
        // Slot 0 crashes on its fifth tick; the others keep turning in place.
        let cfg = SimConfig {
            vehicle: VehicleParams {
                max_speed: 100.0,
                max_yaw_rate: core::f32::consts::FRAC_PI_8,
                throttle_accel: 100.0,
                ..VehicleParams::default()
            },
            ..config(3, 4)
        };
        let mut breeder = ScriptBreeder::new(vec![vec![1.0, 0.0, 0.0]]);
        breeder.crash_genome = Some(1);
        let mut manager = PopulationManager::with_track(cfg, track(), breeder).expect("manager");
        for _ in 0..5 {
            manager.tick();
        }
        let hud = manager.snapshot();
        assert_eq!(hud.replacements, 1);
        assert_eq!(hud.generation, 0);
        assert_eq!(hud.replacements_in_generation, 1);
    }
}
