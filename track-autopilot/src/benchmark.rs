use crate::brain::MutationConfig;
use crate::runner::{run_evolution, RunSummary, SavedGenome};
use crate::util::{seed_to_hex, write_json};
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use track_core::SimConfig;

#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    pub base: SimConfig,
    pub mutation: MutationConfig,
    pub seeds: Vec<u32>,
    pub ticks: u64,
    pub out_dir: PathBuf,
    pub save_top: usize,
    pub jobs: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRecord {
    pub seed: u32,
    pub seed_hex: String,
    pub track_seed: u32,
    pub ticks: u64,
    pub generation: u64,
    pub replacements: u64,
    pub crashed: u64,
    pub timed_out: u64,
    pub stagnated: u64,
    pub action_faults: u64,
    pub breed_fallbacks: u64,
    pub elite_best: Option<f32>,
    pub final_average: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedGenomeRecord {
    pub rank: usize,
    pub seed: u32,
    pub seed_hex: String,
    pub fitness: f32,
    pub hidden_units: usize,
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub generated_unix_s: u64,
    pub ticks: u64,
    pub jobs: Option<usize>,
    pub seeds: Vec<u32>,
    pub run_count: usize,
    pub mean_elite_best: f64,
    pub crash_rate: f64,
    pub runs: Vec<RunRecord>,
    pub saved_genomes: Vec<SavedGenomeRecord>,
}

/// One independent evolution per seed, spread over the rayon pool.
pub fn run_benchmark(config: BenchmarkConfig) -> Result<BenchmarkReport> {
    if config.seeds.is_empty() {
        return Err(anyhow!("benchmark requires at least one seed"));
    }
    if let Some(jobs) = config.jobs {
        if jobs == 0 {
            return Err(anyhow!("benchmark --jobs must be >= 1 when provided"));
        }
    }
    config
        .base
        .validate()
        .context("benchmark base configuration rejected")?;
    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("failed creating {}", config.out_dir.display()))?;

    let run_one = |seed: &u32| -> Result<RunSummary> {
        let sim = SimConfig {
            seed: *seed,
            ..config.base.clone()
        };
        run_evolution(&sim, &config.mutation, config.ticks, 0)
            .with_context(|| format!("benchmark run failed for seed={seed:#x}"))
    };

    let run_results: Vec<Result<RunSummary>> = if let Some(jobs) = config.jobs {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("failed to build rayon threadpool")?;
        pool.install(|| config.seeds.par_iter().map(run_one).collect())
    } else {
        config.seeds.par_iter().map(run_one).collect()
    };

    let mut summaries = Vec::with_capacity(run_results.len());
    for result in run_results {
        summaries.push(result?);
    }
    summaries.sort_by(|a, b| {
        rank_value(b)
            .total_cmp(&rank_value(a))
            .then_with(|| a.seed.cmp(&b.seed))
    });

    let runs: Vec<RunRecord> = summaries.iter().map(run_record).collect();
    let run_count = runs.len();
    let mean_elite_best =
        summaries.iter().map(|s| rank_value(s) as f64).sum::<f64>() / run_count as f64;
    let total_retired: u64 = summaries.iter().map(|s| s.retirements.total()).sum();
    let total_crashed: u64 = summaries.iter().map(|s| s.retirements.crashed).sum();
    let crash_rate = if total_retired == 0 {
        0.0
    } else {
        total_crashed as f64 / total_retired as f64
    };

    let saved_genomes = save_top_genomes(&config.out_dir, &summaries, config.save_top)?;
    write_runs_csv(&config.out_dir.join("runs.csv"), &runs)?;

    let report = BenchmarkReport {
        generated_unix_s: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        ticks: config.ticks,
        jobs: config.jobs,
        seeds: config.seeds,
        run_count,
        mean_elite_best,
        crash_rate,
        runs,
        saved_genomes,
    };
    write_json(&config.out_dir.join("summary.json"), &report)?;
    tracing::info!(
        runs = report.run_count,
        mean_elite_best = report.mean_elite_best,
        out_dir = %config.out_dir.display(),
        "benchmark complete"
    );

    Ok(report)
}

fn rank_value(summary: &RunSummary) -> f32 {
    summary.elite_best().unwrap_or(f32::NEG_INFINITY).max(f32::MIN)
}

fn run_record(summary: &RunSummary) -> RunRecord {
    RunRecord {
        seed: summary.seed,
        seed_hex: seed_to_hex(summary.seed),
        track_seed: summary.track_seed,
        ticks: summary.ticks,
        generation: summary.generation,
        replacements: summary.replacements,
        crashed: summary.retirements.crashed,
        timed_out: summary.retirements.timed_out,
        stagnated: summary.retirements.stagnated,
        action_faults: summary.action_faults,
        breed_fallbacks: summary.breed_fallbacks,
        elite_best: summary.elite_best(),
        final_average: summary.average_fitness,
    }
}

fn save_top_genomes(
    out_dir: &Path,
    summaries: &[RunSummary],
    count: usize,
) -> Result<Vec<SavedGenomeRecord>> {
    let mut saved = Vec::new();
    if count == 0 {
        return Ok(saved);
    }
    let save_dir = out_dir.join("top-genomes");
    fs::create_dir_all(&save_dir)
        .with_context(|| format!("failed creating {}", save_dir.display()))?;

    let ranked = summaries
        .iter()
        .filter_map(|s| s.best.as_ref().map(|best| (s.seed, best)))
        .take(count);
    for (idx, (seed, best)) in ranked.enumerate() {
        let rank = idx + 1;
        let path = save_dir.join(format!(
            "rank{rank:02}-seed{seed:08x}-fitness{:.0}.json",
            best.fitness
        ));
        write_json::<SavedGenome>(&path, best)?;
        saved.push(SavedGenomeRecord {
            rank,
            seed,
            seed_hex: seed_to_hex(seed),
            fitness: best.fitness,
            hidden_units: best.genome.hidden_count(),
            path: path.to_string_lossy().into_owned(),
        });
    }
    Ok(saved)
}

fn write_runs_csv(path: &Path, rows: &[RunRecord]) -> Result<()> {
    let mut csv = String::from(concat!(
        "seed_hex,seed,track_seed,ticks,generation,replacements,",
        "crashed,timed_out,stagnated,action_faults,breed_fallbacks,elite_best,final_average\n",
    ));
    for row in rows {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{:.3}\n",
            row.seed_hex,
            row.seed,
            row.track_seed,
            row.ticks,
            row.generation,
            row.replacements,
            row.crashed,
            row.timed_out,
            row.stagnated,
            row.action_faults,
            row.breed_fallbacks,
            row.elite_best
                .map(|value| format!("{value:.3}"))
                .unwrap_or_default(),
            row.final_average
        ));
    }
    fs::write(path, csv).with_context(|| format!("failed writing {}", path.display()))
}
