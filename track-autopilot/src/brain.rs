//! Reference neuroevolution collaborator: a small feed-forward network whose
//! hidden layer grows and shrinks under mutation.

use serde::{Deserialize, Serialize};
use track_core::breeding::{Breeder, Controller};
use track_core::rng::SeededRng;
use track_core::BreedError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Probability that any one weight is perturbed.
    pub weight_rate: f32,
    pub weight_sigma: f32,
    /// Probability that a perturbed weight is redrawn instead.
    pub reset_rate: f32,
    pub init_range: f32,
    pub add_hidden_rate: f32,
    pub remove_hidden_rate: f32,
    pub max_hidden: usize,
    pub weight_limit: f32,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            weight_rate: 0.8,
            weight_sigma: 0.25,
            reset_rate: 0.05,
            init_range: 1.0,
            add_hidden_rate: 0.06,
            remove_hidden_rate: 0.03,
            max_hidden: 16,
            weight_limit: 8.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HiddenUnit {
    pub bias: f32,
    pub input_weights: Vec<f32>,
    pub output_weights: Vec<f32>,
}

/// Inputs feed the hidden units and the outputs directly; hidden units feed
/// the outputs. Every unit squashes with `tanh`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseGenome {
    pub inputs: usize,
    pub outputs: usize,
    pub output_bias: Vec<f32>,
    /// Row-major `outputs x inputs`.
    pub direct: Vec<f32>,
    pub hidden: Vec<HiddenUnit>,
}

impl DenseGenome {
    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    pub fn weight_count(&self) -> usize {
        self.output_bias.len()
            + self.direct.len()
            + self
                .hidden
                .iter()
                .map(|h| 1 + h.input_weights.len() + h.output_weights.len())
                .sum::<usize>()
    }

    pub fn validate(&self) -> Result<(), BreedError> {
        if self.output_bias.len() != self.outputs {
            return Err(BreedError::new(format!(
                "output bias has {} entries for {} outputs",
                self.output_bias.len(),
                self.outputs
            )));
        }
        if self.direct.len() != self.inputs * self.outputs {
            return Err(BreedError::new(format!(
                "direct weights have {} entries, expected {}",
                self.direct.len(),
                self.inputs * self.outputs
            )));
        }
        for (index, unit) in self.hidden.iter().enumerate() {
            if unit.input_weights.len() != self.inputs || unit.output_weights.len() != self.outputs
            {
                return Err(BreedError::new(format!("hidden unit {index} has the wrong shape")));
            }
        }
        Ok(())
    }

    fn weights_mut(&mut self) -> impl Iterator<Item = &mut f32> {
        self.output_bias
            .iter_mut()
            .chain(self.direct.iter_mut())
            .chain(self.hidden.iter_mut().flat_map(|h| {
                std::iter::once(&mut h.bias)
                    .chain(h.input_weights.iter_mut())
                    .chain(h.output_weights.iter_mut())
            }))
    }
}

#[derive(Clone, Debug)]
pub struct DenseController {
    genome: DenseGenome,
}

impl DenseController {
    pub fn new(genome: DenseGenome) -> Self {
        Self { genome }
    }

    pub fn genome(&self) -> &DenseGenome {
        &self.genome
    }
}

impl Controller for DenseController {
    fn activate(&self, observation: &[f32]) -> Vec<f32> {
        let g = &self.genome;
        let hidden: Vec<f32> = g
            .hidden
            .iter()
            .map(|unit| {
                let sum = unit.bias
                    + unit
                        .input_weights
                        .iter()
                        .zip(observation)
                        .map(|(w, x)| w * x)
                        .sum::<f32>();
                sum.tanh()
            })
            .collect();

        (0..g.outputs)
            .map(|k| {
                let row = &g.direct[k * g.inputs..(k + 1) * g.inputs];
                let direct: f32 = row.iter().zip(observation).map(|(w, x)| w * x).sum();
                let mut sum = g.output_bias[k] + direct;
                for (unit, h) in g.hidden.iter().zip(&hidden) {
                    sum += unit.output_weights[k] * h;
                }
                sum.tanh()
            })
            .collect()
    }
}

pub struct DenseBreeder {
    inputs: usize,
    outputs: usize,
    mutation: MutationConfig,
    rng: SeededRng,
}

impl DenseBreeder {
    pub fn new(inputs: usize, outputs: usize, mutation: MutationConfig, seed: u32) -> Self {
        Self {
            inputs,
            outputs,
            mutation,
            rng: SeededRng::new(seed),
        }
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    pub fn mutation(&self) -> &MutationConfig {
        &self.mutation
    }

    fn random_weight(&mut self) -> f32 {
        let r = self.mutation.init_range;
        self.rng.next_range_f32(-r, r)
    }

    fn random_weights(&mut self, count: usize) -> Vec<f32> {
        (0..count).map(|_| self.random_weight()).collect()
    }

    fn pick<'a, T>(&mut self, a: &'a T, b: &'a T) -> &'a T {
        if self.rng.next_f32() < 0.5 {
            a
        } else {
            b
        }
    }

    fn crossover(&mut self, mother: &DenseGenome, father: &DenseGenome) -> DenseGenome {
        let output_bias = mother
            .output_bias
            .iter()
            .zip(&father.output_bias)
            .map(|(m, f)| *self.pick(m, f))
            .collect();
        let direct = mother
            .direct
            .iter()
            .zip(&father.direct)
            .map(|(m, f)| *self.pick(m, f))
            .collect();

        // Aligned units come from either parent; the longer parent's extra
        // units are each inherited with even odds.
        let shared = mother.hidden.len().min(father.hidden.len());
        let longer = if mother.hidden.len() > father.hidden.len() {
            mother
        } else {
            father
        };
        let mut hidden = Vec::with_capacity(longer.hidden.len());
        for j in 0..shared {
            hidden.push(self.pick(&mother.hidden[j], &father.hidden[j]).clone());
        }
        for unit in &longer.hidden[shared..] {
            if self.rng.next_f32() < 0.5 {
                hidden.push(unit.clone());
            }
        }

        DenseGenome {
            inputs: mother.inputs,
            outputs: mother.outputs,
            output_bias,
            direct,
            hidden,
        }
    }

    fn mutate(&mut self, genome: &mut DenseGenome) {
        let m = self.mutation.clone();

        if genome.hidden.len() < m.max_hidden && self.rng.next_f32() < m.add_hidden_rate {
            let unit = HiddenUnit {
                bias: self.random_weight(),
                input_weights: self.random_weights(genome.inputs),
                output_weights: vec![0.0; genome.outputs],
            };
            genome.hidden.push(unit);
        }
        if !genome.hidden.is_empty() && self.rng.next_f32() < m.remove_hidden_rate {
            let index = self.rng.next_index(genome.hidden.len());
            genome.hidden.remove(index);
        }

        let rng = &mut self.rng;
        for w in genome.weights_mut() {
            if rng.next_f32() >= m.weight_rate {
                continue;
            }
            *w = if rng.next_f32() < m.reset_rate {
                rng.next_range_f32(-m.init_range, m.init_range)
            } else {
                *w + m.weight_sigma * rng.next_gaussian()
            };
            *w = w.clamp(-m.weight_limit, m.weight_limit);
        }
    }
}

impl Breeder for DenseBreeder {
    type Genome = DenseGenome;
    type Controller = DenseController;

    fn random_genome(&mut self) -> DenseGenome {
        DenseGenome {
            inputs: self.inputs,
            outputs: self.outputs,
            output_bias: self.random_weights(self.outputs),
            direct: self.random_weights(self.inputs * self.outputs),
            hidden: Vec::new(),
        }
    }

    fn breed(
        &mut self,
        mother: &DenseGenome,
        father: &DenseGenome,
    ) -> Result<DenseGenome, BreedError> {
        mother.validate()?;
        father.validate()?;
        if mother.inputs != father.inputs || mother.outputs != father.outputs {
            return Err(BreedError::new(format!(
                "parent shapes differ: {}x{} vs {}x{}",
                mother.inputs, mother.outputs, father.inputs, father.outputs
            )));
        }
        let mut child = self.crossover(mother, father);
        self.mutate(&mut child);
        Ok(child)
    }

    fn build_controller(&self, genome: &DenseGenome) -> DenseController {
        DenseController::new(genome.clone())
    }
}
