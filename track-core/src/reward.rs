//! Shaped per-tick reward and episode termination.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ALIGNMENT_WEIGHT, CRASH_PENALTY, GATE_BONUS, MAX_EPISODE_STEPS, SPEED_WEIGHT, SPIN_PENALTY,
    SPIN_SPEED_THRESHOLD, SPIN_STEER_THRESHOLD, STAGNATION_STEPS, SURVIVAL_BONUS,
};
use crate::track::TrackGeometry;
use crate::vehicle::{Action, VehicleState};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Scales velocity projected onto the local track direction.
    pub alignment_weight: f32,
    pub speed_weight: f32,
    pub survival_bonus: f32,
    pub gate_bonus: f32,
    pub crash_penalty: f32,
    pub spin_penalty: f32,
    pub spin_speed_threshold: f32,
    pub spin_steer_threshold: f32,
    pub max_steps: u32,
    pub stagnation_steps: u32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            alignment_weight: ALIGNMENT_WEIGHT,
            speed_weight: SPEED_WEIGHT,
            survival_bonus: SURVIVAL_BONUS,
            gate_bonus: GATE_BONUS,
            crash_penalty: CRASH_PENALTY,
            spin_penalty: SPIN_PENALTY,
            spin_speed_threshold: SPIN_SPEED_THRESHOLD,
            spin_steer_threshold: SPIN_STEER_THRESHOLD,
            max_steps: MAX_EPISODE_STEPS,
            stagnation_steps: STAGNATION_STEPS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Crashed,
    TimedOut,
    Stagnated,
}

impl TerminationReason {
    pub const ALL: [Self; 3] = [Self::Crashed, Self::TimedOut, Self::Stagnated];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crashed => "crashed",
            Self::TimedOut => "timed_out",
            Self::Stagnated => "stagnated",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running bookkeeping of one episode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeProgress {
    pub fitness: f32,
    pub steps: u32,
    pub best_fitness: f32,
    pub steps_since_best: u32,
    pub next_gate: usize,
    pub gates_passed: u32,
}

impl EpisodeProgress {
    /// Fresh episode at the spawn pose. The spawn sits on gate 0, so the
    /// first gate that can be credited is gate 1.
    pub fn starting(geometry: &TrackGeometry) -> Self {
        let gates = geometry.gates().len();
        Self {
            next_gate: if gates > 1 { 1 } else { 0 },
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickOutcome {
    pub delta: f32,
    pub termination: Option<TerminationReason>,
    pub gate_crossed: Option<usize>,
}

impl TickOutcome {
    pub fn terminated(&self) -> bool {
        self.termination.is_some()
    }
}

#[derive(Clone, Debug, Default)]
pub struct RewardEvaluator {
    config: RewardConfig,
}

impl RewardEvaluator {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Scores the move `old -> new` and folds it into `progress`.
    /// A crash ends the tick with only the crash penalty; otherwise the
    /// shaped terms apply and the step/stagnation limits are checked.
    pub fn evaluate(
        &self,
        progress: &mut EpisodeProgress,
        action: Action,
        old: &VehicleState,
        new: &VehicleState,
        geometry: &TrackGeometry,
    ) -> TickOutcome {
        let cfg = &self.config;
        let action = action.clamped();
        let mut termination = None;
        let mut gate_crossed = None;

        let delta = if !geometry.contains(new.position) {
            termination = Some(TerminationReason::Crashed);
            -cfg.crash_penalty
        } else {
            let tangent = geometry.tangent_near(new.position);
            let mut delta = cfg.alignment_weight * new.velocity().dot(tangent)
                + cfg.speed_weight * new.speed
                + cfg.survival_bonus;

            if action.steer.abs() > cfg.spin_steer_threshold
                && new.speed < cfg.spin_speed_threshold
            {
                delta -= cfg.spin_penalty;
            }

            let gates = geometry.gates();
            if let Some(gate) = gates.get(progress.next_gate) {
                // Only forward crossings count.
                let forward =
                    (new.position - old.position).dot(geometry.tangent_at(gate.sample)) > 0.0;
                if forward && gate.crossed_by(old.position, new.position) {
                    delta += cfg.gate_bonus;
                    gate_crossed = Some(gate.index);
                    progress.next_gate = (progress.next_gate + 1) % gates.len();
                    progress.gates_passed += 1;
                }
            }
            delta
        };

        progress.fitness += delta;
        progress.steps += 1;
        if progress.fitness > progress.best_fitness {
            progress.best_fitness = progress.fitness;
            progress.steps_since_best = 0;
        } else {
            progress.steps_since_best += 1;
        }

        if termination.is_none() {
            if progress.steps > cfg.max_steps {
                termination = Some(TerminationReason::TimedOut);
            } else if progress.steps_since_best > cfg.stagnation_steps {
                termination = Some(TerminationReason::Stagnated);
            }
        }

        TickOutcome {
            delta,
            termination,
            gate_crossed,
        }
    }
}
