use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, error, info};

use crate::model::PivotedRecord;

pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Anything the materializer can page pivoted records out of.
pub trait PivotSource {
    /// Total number of records available.
    fn count(&self) -> Result<usize>;
    /// Up to `limit` records starting at `offset`, in source order.
    fn page(&self, offset: usize, limit: usize) -> Result<Vec<PivotedRecord>>;
}

impl PivotSource for [PivotedRecord] {
    fn count(&self) -> Result<usize> {
        Ok(self.len())
    }

    fn page(&self, offset: usize, limit: usize) -> Result<Vec<PivotedRecord>> {
        let start = offset.min(self.len());
        let end = offset.saturating_add(limit).min(self.len());
        Ok(self[start..end].to_vec())
    }
}

/// One record whose document could not be written.
#[derive(Debug)]
pub struct FailedRecord {
    pub relative_file_path: String,
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct MaterializeReport {
    pub records_seen: usize,
    pub files_written: usize,
    pub failures: Vec<FailedRecord>,
}

impl MaterializeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Writes each pivoted record's JSON document under `out_dir`, one page of
/// `batch_size` records at a time.
#[derive(Debug, Clone)]
pub struct Materializer {
    out_dir: PathBuf,
    batch_size: usize,
    workers: usize,
}

impl Materializer {
    pub fn new(out_dir: impl Into<PathBuf>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        Ok(Self {
            out_dir: out_dir.into(),
            batch_size,
            workers: 1,
        })
    }

    /// Write the records of each page on up to `workers` threads.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Page through `source` and write every record. Per-record failures are
    /// collected in the report; failing to fetch a page aborts.
    #[tracing::instrument(level = "info", skip(self, source), fields(out = %self.out_dir.display(), batch = self.batch_size))]
    pub fn materialize<S: PivotSource + ?Sized>(&self, source: &S) -> Result<MaterializeReport> {
        let start = Instant::now();
        let pool = if self.workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.workers)
                    .build()
                    .context("building writer pool")?,
            )
        } else {
            None
        };

        let total = source.count().context("counting pivoted records")?;
        info!(total, "materializing");

        let mut report = MaterializeReport::default();
        let mut offset = 0;
        while offset < total {
            let page = source
                .page(offset, self.batch_size)
                .with_context(|| format!("fetching batch at offset {}", offset))?;
            debug!(offset, rows = page.len(), "batch");
            if page.is_empty() {
                break;
            }

            let outcomes: Vec<Result<PathBuf>> = match &pool {
                Some(pool) => pool.install(|| {
                    page.par_iter()
                        .map(|r| write_record(&self.out_dir, r))
                        .collect()
                }),
                None => page
                    .iter()
                    .map(|r| write_record(&self.out_dir, r))
                    .collect(),
            };

            for (record, outcome) in page.iter().zip(outcomes) {
                report.records_seen += 1;
                match outcome {
                    Ok(path) => {
                        debug!(path = %path.display(), "wrote");
                        report.files_written += 1;
                    }
                    Err(e) => {
                        error!(path = %record.relative_file_path, "write failed: {:#}", e);
                        report.failures.push(FailedRecord {
                            relative_file_path: record.relative_file_path.clone(),
                            error: e,
                        });
                    }
                }
            }

            offset += self.batch_size;
        }

        info!(
            written = report.files_written,
            failed = report.failures.len(),
            elapsed = ?start.elapsed(),
            "materialized"
        );
        Ok(report)
    }
}

/// Create the parent directories of `path`; an existing directory is fine.
fn ensure_parent(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    match fs::create_dir_all(parent) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e).with_context(|| format!("creating directory {}", parent.display())),
    }
}

fn write_record(out_dir: &Path, record: &PivotedRecord) -> Result<PathBuf> {
    let path = out_dir.join(&record.relative_file_path);
    ensure_parent(&path)?;
    fs::write(&path, record.json_content.as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
