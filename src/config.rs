use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::materialize::DEFAULT_BATCH_SIZE;
use crate::pivot::PathMode;

/// Where the intermediate tables live during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Stage raw, grouped and pivoted rows in DuckDB.
    Duckdb,
    /// Keep everything in process memory.
    Memory,
}

/// Split education outcome records into one JSON document per
/// (geography, ethnicity).
#[derive(Debug, Clone, Parser)]
#[command(name = "gcse_fanout", version)]
pub struct Config {
    /// Source CSV file.
    #[arg(long, env = "GCSE_INPUT")]
    pub input: PathBuf,

    /// Root the `./{geography}/{ethnicity}/...` tree is written under.
    #[arg(long, env = "GCSE_OUT_DIR", default_value = ".")]
    pub out_dir: PathBuf,

    /// Records fetched and written per batch.
    #[arg(long, env = "GCSE_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE, value_parser = parse_batch_size)]
    pub batch_size: usize,

    #[arg(long, env = "GCSE_STORE", value_enum, default_value_t = StoreKind::Duckdb)]
    pub store: StoreKind,

    /// DuckDB file to stage in; in-memory when unset.
    #[arg(long, env = "GCSE_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Threads writing the files of one batch.
    #[arg(long, env = "GCSE_WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Use geography/ethnicity values as path segments without escaping.
    #[arg(long, env = "GCSE_VERBATIM_PATHS")]
    pub verbatim_paths: bool,
}

impl Config {
    pub fn path_mode(&self) -> PathMode {
        if self.verbatim_paths {
            PathMode::Verbatim
        } else {
            PathMode::Sanitized
        }
    }
}

fn parse_batch_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("batch size must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid batch size `{}`: {}", s, e)),
    }
}
