use anyhow::Result;
use std::time::Instant;
use tracing::info;

use crate::aggregate::aggregate;
use crate::config::{Config, StoreKind};
use crate::duck::StagingStore;
use crate::load::load_records;
use crate::materialize::{MaterializeReport, Materializer};
use crate::model::RawRecord;
use crate::pivot::pivot;

/// Counts from one end-to-end run.
#[derive(Debug)]
pub struct RunSummary {
    pub rows_loaded: usize,
    pub groups: usize,
    pub pivoted: usize,
    pub report: MaterializeReport,
}

/// Load → group → pivot → write. The staging store, if any, is opened here
/// and closed when this returns.
#[tracing::instrument(level = "info", skip(config), fields(input = %config.input.display()))]
pub fn run(config: &Config) -> Result<RunSummary> {
    let start = Instant::now();
    let materializer = Materializer::new(&config.out_dir, config.batch_size)?
        .with_workers(config.workers);

    let rows = load_records(&config.input)?;

    let summary = match config.store {
        StoreKind::Memory => run_in_memory(&rows, config, &materializer)?,
        StoreKind::Duckdb => {
            let store = match &config.db_path {
                Some(path) => StagingStore::open_disk(path)?,
                None => StagingStore::open_in_memory()?,
            };
            run_staged(&store, &rows, config, &materializer)?
        }
    };

    info!(elapsed = ?start.elapsed(), "run complete");
    Ok(summary)
}

fn run_in_memory(
    rows: &[RawRecord],
    config: &Config,
    materializer: &Materializer,
) -> Result<RunSummary> {
    let grouped = aggregate(rows)?;
    let pivoted = pivot(&grouped, config.path_mode())?;
    let report = materializer.materialize(&pivoted[..])?;
    Ok(RunSummary {
        rows_loaded: rows.len(),
        groups: grouped.len(),
        pivoted: pivoted.len(),
        report,
    })
}

fn run_staged(
    store: &StagingStore,
    rows: &[RawRecord],
    config: &Config,
    materializer: &Materializer,
) -> Result<RunSummary> {
    store.provision()?;
    store.insert_raw(rows)?;
    let grouped = store.stage_grouped()?;
    let pivoted = pivot(&grouped, config.path_mode())?;
    store.stage_pivoted(&pivoted)?;
    let report = materializer.materialize(store)?;
    Ok(RunSummary {
        rows_loaded: rows.len(),
        groups: grouped.len(),
        pivoted: pivoted.len(),
        report,
    })
}
