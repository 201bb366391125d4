use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use track_core::SimConfig;

use crate::brain::MutationConfig;

pub fn parse_seed(seed: &str) -> Result<u32> {
    let s = seed.trim();
    if s.is_empty() {
        return Err(anyhow!("empty seed"));
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).with_context(|| format!("invalid hex seed: {s}"))
    } else {
        s.parse::<u32>()
            .with_context(|| format!("invalid decimal seed: {s}"))
    }
}

pub fn seed_to_hex(seed: u32) -> String {
    format!("0x{seed:08x}")
}

pub fn parse_seed_csv(input: &str) -> Result<Vec<u32>> {
    let mut seeds = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        seeds.push(parse_seed(token)?);
    }
    if seeds.is_empty() {
        return Err(anyhow!("no seeds parsed from --seeds"));
    }
    Ok(seeds)
}

pub fn parse_seed_file(path: &Path) -> Result<Vec<u32>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed reading seed file {}", path.display()))?;
    let mut seeds = Vec::new();
    for line in data.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        seeds.push(parse_seed(trimmed)?);
    }
    if seeds.is_empty() {
        return Err(anyhow!("seed file {} had no seeds", path.display()));
    }
    Ok(seeds)
}

/// `count` seeds from an LCG walk starting at `start`.
pub fn generate_seeds(start: u32, count: u32) -> Vec<u32> {
    let mut out = Vec::with_capacity(count as usize);
    let mut cur = start;
    for _ in 0..count {
        out.push(cur);
        cur = cur.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    }
    out
}

pub fn timestamp_suffix() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{now}")
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("failed parsing {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
    }
    let encoded = serde_json::to_vec_pretty(value).context("failed to serialize json")?;
    fs::write(path, encoded).with_context(|| format!("failed writing {}", path.display()))
}

/// A JSON file wins over the named preset. Missing JSON fields take their
/// defaults. The result is validated either way.
pub fn load_config(path: Option<&Path>, preset: &str) -> Result<SimConfig> {
    let config = match path {
        Some(path) => read_json::<SimConfig>(path)?,
        None => SimConfig::preset(preset).ok_or_else(|| {
            anyhow!(
                "unknown preset '{preset}'. available: {}",
                SimConfig::PRESETS.join(", ")
            )
        })?,
    };
    config.validate().context("configuration rejected")?;
    Ok(config)
}

pub fn load_mutation(path: Option<&Path>) -> Result<MutationConfig> {
    match path {
        Some(path) => read_json(path),
        None => Ok(MutationConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_parse_in_both_bases() {
        assert_eq!(parse_seed("0xC0FFEE11").expect("hex"), 0xC0FF_EE11);
        assert_eq!(parse_seed(" 42 ").expect("dec"), 42);
        assert!(parse_seed("").is_err());
        assert!(parse_seed("0xZZ").is_err());
        assert_eq!(parse_seed_csv("1, 0x2,,3").expect("csv"), vec![1, 2, 3]);
        assert_eq!(seed_to_hex(0xAB), "0x000000ab");
    }

    #[test]
    fn generated_seeds_are_distinct_and_stable() {
        let seeds = generate_seeds(0xA57E_0001, 5);
        assert_eq!(seeds.len(), 5);
        assert_eq!(seeds[0], 0xA57E_0001);
        assert_eq!(seeds, generate_seeds(0xA57E_0001, 5));
        let mut unique = seeds.clone();
        unique.dedup();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn config_file_overrides_preset() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sim.json");
        fs::write(&path, r#"{"active_size": 4, "seed": 9}"#)?;
        let config = load_config(Some(&path), "marathon")?;
        assert_eq!(config.active_size, 4);
        assert_eq!(config.seed, 9);
        assert_eq!(config.elite_size, SimConfig::default().elite_size);

        fs::write(&path, r#"{"active_size": 0}"#)?;
        assert!(load_config(Some(&path), "default").is_err());
        assert!(load_config(None, "nope").is_err());
        Ok(())
    }
}
