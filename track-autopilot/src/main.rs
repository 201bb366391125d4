use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use track_autopilot::benchmark::{run_benchmark, BenchmarkConfig};
use track_autopilot::runner::{run_evolution, run_replay, SavedGenome};
use track_autopilot::util::{
    generate_seeds, load_config, load_mutation, parse_seed, parse_seed_csv, parse_seed_file,
    read_json, seed_to_hex, timestamp_suffix, write_json,
};
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "track-autopilot")]
#[command(about = "Steady-state neuroevolution of racing agents on procedural tracks")]
struct Cli {
    /// Simulation config JSON; missing fields take their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Named preset used when no --config is given
    #[arg(long, global = true, default_value = "default")]
    preset: String,
    /// Mutation config JSON for the reference breeder
    #[arg(long, global = true)]
    mutation: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the evolution loop headless
    Evolve {
        /// Overrides the config seed (decimal or 0x hex)
        #[arg(long)]
        seed: Option<String>,
        #[arg(long, default_value_t = 20_000)]
        ticks: u64,
        /// Log a HUD line every N ticks (0 = never)
        #[arg(long, default_value_t = 500)]
        hud_every: u64,
        /// Write the best elite genome here as JSON
        #[arg(long)]
        best_out: Option<PathBuf>,
        /// Write the run summary here as JSON
        #[arg(long)]
        summary_out: Option<PathBuf>,
    },
    /// Drive one car with a saved genome until its episode ends
    Replay {
        #[arg(long)]
        genome: PathBuf,
        /// Overrides the config seed; defaults to the track the genome was evolved on
        #[arg(long)]
        seed: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Evolve independently on many seeds in parallel
    Bench {
        #[arg(long)]
        seeds: Option<String>,
        #[arg(long)]
        seed_file: Option<PathBuf>,
        #[arg(long)]
        seed_start: Option<String>,
        #[arg(long, default_value_t = 8)]
        seed_count: u32,
        #[arg(long, default_value_t = 5_000)]
        ticks: u64,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 3)]
        save_top: usize,
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Print the effective simulation and mutation configuration
    ShowConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Cli {
        config,
        preset,
        mutation,
        command,
    } = Cli::parse();
    let mut sim = load_config(config.as_deref(), &preset)?;
    let mutation = load_mutation(mutation.as_deref())?;

    match command {
        Commands::Evolve {
            seed,
            ticks,
            hud_every,
            best_out,
            summary_out,
        } => {
            if let Some(seed) = seed {
                sim.seed = parse_seed(&seed)?;
            }
            let summary = run_evolution(&sim, &mutation, ticks, hud_every)?;

            println!("seed={}", seed_to_hex(summary.seed));
            println!("track_seed={}", seed_to_hex(summary.track_seed));
            println!("ticks={}", summary.ticks);
            println!("generation={}", summary.generation);
            println!("replacements={}", summary.replacements);
            println!(
                "retired=crashed:{},timed_out:{},stagnated:{}",
                summary.retirements.crashed,
                summary.retirements.timed_out,
                summary.retirements.stagnated
            );
            println!("action_faults={}", summary.action_faults);
            println!("breed_fallbacks={}", summary.breed_fallbacks);
            println!("active_best={:.2}", summary.best_fitness);
            println!("active_average={:.2}", summary.average_fitness);
            if let Some(best) = summary.elite_best() {
                println!("elite_best={best:.2}");
            }

            if let Some(path) = best_out {
                match &summary.best {
                    Some(best) => {
                        write_json(&path, best)?;
                        println!("best_out={}", path.display());
                    }
                    None => tracing::warn!("no elite genome yet; {} not written", path.display()),
                }
            }
            if let Some(path) = summary_out {
                write_json(&path, &summary)?;
                println!("summary_out={}", path.display());
            }
        }
        Commands::Replay {
            genome,
            seed,
            output,
        } => {
            let saved: SavedGenome = read_json(&genome)
                .with_context(|| format!("failed loading genome {}", genome.display()))?;
            sim.seed = match seed {
                Some(seed) => parse_seed(&seed)?,
                None => saved.track_seed,
            };
            let report = run_replay(&sim, &saved.genome)?;

            println!("genome={}", genome.display());
            println!("evolved_fitness={:.2}", saved.fitness);
            println!("track_seed={}", seed_to_hex(report.track_seed));
            println!("steps={}", report.steps);
            println!("fitness={:.2}", report.fitness);
            println!("gates={}", report.gates_passed);
            println!("distance={:.1}", report.distance);
            println!("termination={}", report.termination);
            if let Some(path) = output {
                write_json(&path, &report)?;
                println!("output={}", path.display());
            }
        }
        Commands::Bench {
            seeds,
            seed_file,
            seed_start,
            seed_count,
            ticks,
            out_dir,
            save_top,
            jobs,
        } => {
            let seeds = resolve_seeds(
                seeds.as_deref(),
                seed_file.as_deref(),
                seed_start.as_deref(),
                seed_count,
            )?;
            let out_dir = out_dir
                .unwrap_or_else(|| PathBuf::from(format!("benchmarks/{}", timestamp_suffix())));

            let report = run_benchmark(BenchmarkConfig {
                base: sim,
                mutation,
                seeds,
                ticks,
                out_dir: out_dir.clone(),
                save_top,
                jobs,
            })?;

            println!("runs={}", report.run_count);
            println!(
                "jobs={}",
                report
                    .jobs
                    .map(|value| value.to_string())
                    .unwrap_or_else(|| "auto".to_string())
            );
            println!("mean_elite_best={:.2}", report.mean_elite_best);
            println!("crash_rate={:.1}%", report.crash_rate * 100.0);
            println!("out_dir={}", out_dir.display());
            println!("top seeds:");
            for (idx, run) in report.runs.iter().take(5).enumerate() {
                println!(
                    "  {}. {}  elite_best={} generation={} replacements={}",
                    idx + 1,
                    run.seed_hex,
                    run.elite_best
                        .map(|value| format!("{value:.2}"))
                        .unwrap_or_else(|| "-".to_string()),
                    run.generation,
                    run.replacements,
                );
            }
            for saved in &report.saved_genomes {
                println!(
                    "  [#{:02}] {} fitness={:.2} {}",
                    saved.rank, saved.seed_hex, saved.fitness, saved.path
                );
            }
        }
        Commands::ShowConfig => {
            let encoded = serde_json::to_string_pretty(&serde_json::json!({
                "sim": sim,
                "mutation": mutation,
            }))?;
            println!("{encoded}");
        }
    }

    Ok(())
}

fn resolve_seeds(
    seeds: Option<&str>,
    seed_file: Option<&Path>,
    seed_start: Option<&str>,
    seed_count: u32,
) -> Result<Vec<u32>> {
    if let Some(path) = seed_file {
        return parse_seed_file(path);
    }

    if let Some(csv) = seeds {
        return parse_seed_csv(csv);
    }

    let start = if let Some(start) = seed_start {
        parse_seed(start)?
    } else {
        0xA57E_0001
    };
    Ok(generate_seeds(start, seed_count))
}
