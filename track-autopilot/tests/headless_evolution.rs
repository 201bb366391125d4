use anyhow::Result;
use track_autopilot::benchmark::{run_benchmark, BenchmarkConfig, BenchmarkReport};
use track_autopilot::brain::MutationConfig;
use track_autopilot::runner::{run_evolution, run_replay, SavedGenome};
use track_autopilot::util::{read_json, write_json};
use track_core::SimConfig;

fn quick_config(seed: u32) -> SimConfig {
    SimConfig {
        active_size: 8,
        elite_size: 4,
        seed,
        ..SimConfig::preset("wide").expect("wide preset")
    }
}

#[test]
fn evolution_is_reproducible_for_a_seed() -> Result<()> {
    let config = quick_config(0xDEAD_BEEF);
    let mutation = MutationConfig::default();
    let a = run_evolution(&config, &mutation, 800, 200)?;
    let b = run_evolution(&config, &mutation, 800, 0)?;
    assert_eq!(a.replacements, b.replacements);
    assert_eq!(a.elite_fitnesses, b.elite_fitnesses);
    assert_eq!(a.retirements, b.retirements);
    assert_eq!(
        a.best.as_ref().map(|s| &s.genome),
        b.best.as_ref().map(|s| &s.genome)
    );
    Ok(())
}

#[test]
fn saved_best_genome_replays_on_its_track() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = quick_config(0xC0FF_EE11);
    let summary = run_evolution(&config, &MutationConfig::default(), 1_500, 0)?;
    let best = summary.best.expect("elite pool should have members");

    let path = tmp.path().join("best.json");
    write_json(&path, &best)?;
    let loaded: SavedGenome = read_json(&path)?;
    assert_eq!(loaded, best);
    assert_eq!(loaded.track_seed, summary.track_seed);

    let replay_config = SimConfig {
        seed: loaded.track_seed,
        ..config
    };
    let report = run_replay(&replay_config, &loaded.genome)?;
    assert_eq!(report.track_seed, loaded.track_seed);
    assert!(report.steps > 0);
    Ok(())
}

#[test]
fn benchmark_smoke_outputs_expected_artifacts() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let report = run_benchmark(BenchmarkConfig {
        base: quick_config(0),
        mutation: MutationConfig::default(),
        seeds: vec![0xDEAD_BEEF, 0x1234_5678, 0x0BAD_F00D],
        ticks: 400,
        out_dir: tmp.path().to_path_buf(),
        save_top: 2,
        jobs: Some(2),
    })?;

    assert_eq!(report.run_count, 3);
    assert_eq!(report.runs.len(), 3);
    assert!(report.saved_genomes.len() <= 2);
    assert!(tmp.path().join("summary.json").exists());
    assert!(tmp.path().join("runs.csv").exists());
    for saved in &report.saved_genomes {
        let genome: SavedGenome = read_json(std::path::Path::new(&saved.path))?;
        assert_eq!(genome.fitness, saved.fitness);
    }

    let on_disk: BenchmarkReport = read_json(&tmp.path().join("summary.json"))?;
    assert_eq!(on_disk.seeds, report.seeds);
    Ok(())
}

#[test]
fn benchmark_rejects_empty_seed_list() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let result = run_benchmark(BenchmarkConfig {
        base: SimConfig::default(),
        mutation: MutationConfig::default(),
        seeds: Vec::new(),
        ticks: 10,
        out_dir: tmp.path().to_path_buf(),
        save_top: 0,
        jobs: None,
    });
    assert!(result.is_err());
}
