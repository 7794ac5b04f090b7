use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, Trim};
use std::{fs::File, io::Read, path::Path};
use tracing::{debug, info};

use crate::model::{RawRecord, REQUIRED_COLUMNS};

/// Read every record of the source file at `path`.
///
/// The header row is required and must name every column in
/// [`REQUIRED_COLUMNS`]; extra columns are ignored. Any unparsable numeric
/// field aborts the whole load.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<RawRecord>> {
    let file = File::open(&path)
        .with_context(|| format!("opening source file {}", path.as_ref().display()))?;
    let records = load_records_from_reader(file)
        .with_context(|| format!("loading {}", path.as_ref().display()))?;
    info!(rows = records.len(), "loaded source records");
    Ok(records)
}

/// Same as [`load_records`] over any reader.
pub fn load_records_from_reader<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("reading header row")?.clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h == *col))
        .collect();
    if !missing.is_empty() {
        bail!("source is missing required columns: {}", missing.join(", "));
    }

    let mut records = Vec::new();
    for result in rdr.deserialize::<RawRecord>() {
        let record = result.map_err(|e| {
            let at = e
                .position()
                .map(|pos| format!(" on line {}", pos.line()))
                .unwrap_or_default();
            anyhow::Error::new(e).context(format!("parsing record{}", at))
        })?;
        debug!(?record, "row");
        records.push(record);
    }
    Ok(records)
}
