//! Command-line interface handling
//!
//! Flags override the environment-derived configuration.

use crate::config::LshConfig;
use crate::models::HashSeed;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const USAGE: &str = "\
related-items-service

Compute related-item recommendations with minhash clustering and publish them to Redis.

Usage:
  related-items-service -input <file> [-output <key prefix>] [-depth N] [-iterate N]
                        [-minCluster N] [-maxCluster N] [-maxRecommend N] [-workers N]
                        [-seeds <file> | -replay | -rngSeed N]

Options:
  -input         item records, one per line: <id>\\t<feature> <feature> ...
  -output        Redis key prefix for the results (default: REDIS_KEY_PREFIX)
  -depth         minhash levels per signature
  -iterate       clustering passes
  -minCluster    smallest cluster kept
  -maxCluster    largest cluster kept
  -maxRecommend  recommendations kept per item
  -workers       worker tasks per pass
  -seeds         replay seeds from a file, one per line
  -replay        replay the seed log published by the last run on this input
  -rngSeed       draw seeds from a deterministic generator
";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub input: Option<PathBuf>,
    pub output: Option<String>,
    pub depth: Option<usize>,
    pub iterate: Option<u32>,
    pub min_cluster: Option<u64>,
    pub max_cluster: Option<u64>,
    pub max_recommend: Option<u64>,
    pub workers: Option<usize>,
    pub seeds_file: Option<PathBuf>,
    pub replay: bool,
    pub rng_seed: Option<u64>,
    pub help: bool,
}

impl CliArgs {
    /// Apply flag overrides on top of `config`
    pub fn apply(&self, config: &mut LshConfig) {
        if let Some(depth) = self.depth {
            config.depth = depth;
        }
        if let Some(iterate) = self.iterate {
            config.iterate = iterate;
        }
        if let Some(min) = self.min_cluster {
            config.min_cluster_size = min;
        }
        if let Some(max) = self.max_cluster {
            config.max_cluster_size = max;
        }
        if let Some(max_recommend) = self.max_recommend {
            config.max_recommend = max_recommend;
        }
        if let Some(workers) = self.workers {
            config.num_workers = workers;
        }
    }
}

fn value<I: Iterator<Item = String>>(it: &mut I, flag: &str) -> Result<String> {
    it.next().ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn number<T, I>(it: &mut I, flag: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    I: Iterator<Item = String>,
{
    let raw = value(it, flag)?;
    raw.parse()
        .with_context(|| format!("invalid {flag} value '{raw}'"))
}

/// Parse flags (without the binary name)
pub fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut it = args.into_iter();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-input" => parsed.input = Some(PathBuf::from(value(&mut it, "-input")?)),
            "-output" => parsed.output = Some(value(&mut it, "-output")?),
            "-depth" => parsed.depth = Some(number(&mut it, "-depth")?),
            "-iterate" => parsed.iterate = Some(number(&mut it, "-iterate")?),
            "-minCluster" => parsed.min_cluster = Some(number(&mut it, "-minCluster")?),
            "-maxCluster" => parsed.max_cluster = Some(number(&mut it, "-maxCluster")?),
            "-maxRecommend" => parsed.max_recommend = Some(number(&mut it, "-maxRecommend")?),
            "-workers" => parsed.workers = Some(number(&mut it, "-workers")?),
            "-seeds" => parsed.seeds_file = Some(PathBuf::from(value(&mut it, "-seeds")?)),
            "-replay" => parsed.replay = true,
            "-rngSeed" => parsed.rng_seed = Some(number(&mut it, "-rngSeed")?),
            "-help" | "--help" | "-h" => parsed.help = true,
            other => return Err(anyhow!("Unknown arg: {other}")),
        }
    }

    if parsed.help {
        return Ok(parsed);
    }

    if parsed.input.is_none() {
        return Err(anyhow!("-input is required"));
    }

    let seed_modes =
        parsed.seeds_file.is_some() as u8 + parsed.replay as u8 + parsed.rng_seed.is_some() as u8;
    if seed_modes > 1 {
        return Err(anyhow!("Select at most one: -seeds <file> | -replay | -rngSeed N"));
    }

    Ok(parsed)
}

/// Parse a seed log, one seed per line. Negative values are accepted as
/// their two's-complement bit pattern.
pub fn parse_seed_log(raw: &str) -> Result<Vec<HashSeed>> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<u64>()
                .or_else(|_| line.parse::<i64>().map(|v| v as u64))
                .map(HashSeed)
                .with_context(|| format!("invalid seed '{line}'"))
        })
        .collect()
}

pub fn read_seed_log(path: &Path) -> Result<Vec<HashSeed>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read seed log {}", path.display()))?;
    parse_seed_log(&raw)
}
