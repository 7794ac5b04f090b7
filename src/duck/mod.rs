// src/duck/mod.rs
use anyhow::{Context, Result};
use duckdb::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

use crate::materialize::PivotSource;
use crate::model::{GroupedRecord, PivotedRecord, RawRecord};

const PROVISION_SQL: &str = r#"
    DROP TABLE IF EXISTS pivoted_records;
    DROP TABLE IF EXISTS grouped_records;
    DROP TABLE IF EXISTS raw_records;
    CREATE TABLE raw_records(
        measure VARCHAR NOT NULL,
        ethnicity VARCHAR NOT NULL,
        ethnicity_type VARCHAR NOT NULL,
        "time" VARCHAR NOT NULL,
        time_type VARCHAR NOT NULL,
        geography VARCHAR NOT NULL,
        geography_type VARCHAR NOT NULL,
        geography_code VARCHAR NOT NULL,
        gender VARCHAR NOT NULL,
        "value" DOUBLE NOT NULL,
        value_type VARCHAR NOT NULL,
        denominator BIGINT NOT NULL,
        numerator BIGINT NOT NULL
    );
"#;

const GROUP_SQL: &str = "
    CREATE OR REPLACE TABLE grouped_records AS
    SELECT geography,
           ethnicity,
           gender,
           CAST(SUM(denominator) AS BIGINT) AS total_value
    FROM raw_records
    WHERE ethnicity <> 'All' AND geography <> 'All - England'
    GROUP BY geography, ethnicity, gender
    ORDER BY geography, ethnicity, gender;
";

const PIVOT_TABLE_SQL: &str = "
    DROP TABLE IF EXISTS pivoted_records;
    CREATE TABLE pivoted_records(
        seq BIGINT NOT NULL,
        geography VARCHAR NOT NULL,
        ethnicity VARCHAR NOT NULL,
        all_value BIGINT NOT NULL,
        boys_value BIGINT NOT NULL,
        girls_value BIGINT NOT NULL,
        json_content VARCHAR NOT NULL,
        file_name VARCHAR NOT NULL,
        relative_file_path VARCHAR NOT NULL
    );
";

/// DuckDB-backed staging area for one run. The connection closes when the
/// store is dropped.
pub struct StagingStore {
    conn: Connection,
}

impl StagingStore {
    /// Open a DuckDB database on disk at `path`, creating the file if it doesn't exist.
    pub fn open_disk(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening DuckDB at {}", path.display()))?;
        info!(path = %path.display(), "opened staging store");
        Ok(Self { conn })
    }

    /// Open a DuckDB in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory DuckDB")?;
        info!("opened in-memory staging store");
        Ok(Self { conn })
    }

    /// Drop any staging tables left by an earlier run and create `raw_records`.
    pub fn provision(&self) -> Result<()> {
        self.conn
            .execute_batch(PROVISION_SQL)
            .context("provisioning staging tables")?;
        debug!("staging tables provisioned");
        Ok(())
    }

    /// Bulk-load source rows via the appender, returning the number inserted.
    #[tracing::instrument(level = "info", skip(self, records), fields(rows = records.len()))]
    pub fn insert_raw(&self, records: &[RawRecord]) -> Result<usize> {
        let mut appender = self
            .conn
            .appender("raw_records")
            .context("creating raw_records appender")?;
        for (idx, r) in records.iter().enumerate() {
            let denominator = to_bigint(r.denominator, "denominator", idx)?;
            let numerator = to_bigint(r.numerator, "numerator", idx)?;
            appender
                .append_row(params![
                    r.measure,
                    r.ethnicity,
                    r.ethnicity_type,
                    r.time,
                    r.time_type,
                    r.geography,
                    r.geography_type,
                    r.geography_code,
                    r.gender,
                    r.value,
                    r.value_type,
                    denominator,
                    numerator,
                ])
                .context("appending raw record")?;
        }
        appender.flush().context("flushing raw_records appender")?;
        drop(appender);

        let count = self.table_count("raw_records")?;
        info!(rows = count, "raw records staged");
        Ok(count)
    }

    /// Materialize `grouped_records` from `raw_records` and read it back in
    /// (geography, ethnicity, gender) order.
    #[tracing::instrument(level = "info", skip(self))]
    pub fn stage_grouped(&self) -> Result<Vec<GroupedRecord>> {
        self.conn
            .execute_batch(GROUP_SQL)
            .context("building grouped_records")?;

        let mut stmt = self.conn.prepare(
            "SELECT geography, ethnicity, gender, total_value
             FROM grouped_records
             ORDER BY geography, ethnicity, gender",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .context("querying grouped_records")?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("reading grouped_records")?;
        let grouped = rows
            .into_iter()
            .enumerate()
            .map(|(idx, (geography, ethnicity, gender, total))| {
                Ok(GroupedRecord {
                    geography,
                    ethnicity,
                    gender,
                    total_value: from_bigint(total, "total_value", idx)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for g in &grouped {
            debug!(
                geography = %g.geography,
                ethnicity = %g.ethnicity,
                gender = %g.gender,
                total = g.total_value,
                "grouped"
            );
        }
        info!(groups = grouped.len(), "grouped records staged");
        Ok(grouped)
    }

    /// Replace `pivoted_records` with `records`, remembering their order.
    #[tracing::instrument(level = "info", skip(self, records), fields(rows = records.len()))]
    pub fn stage_pivoted(&self, records: &[PivotedRecord]) -> Result<usize> {
        self.conn
            .execute_batch(PIVOT_TABLE_SQL)
            .context("creating pivoted_records")?;

        let mut appender = self
            .conn
            .appender("pivoted_records")
            .context("creating pivoted_records appender")?;
        for (seq, p) in records.iter().enumerate() {
            let all_value = to_bigint(p.all_value, "all_value", seq)?;
            let boys_value = to_bigint(p.boys_value, "boys_value", seq)?;
            let girls_value = to_bigint(p.girls_value, "girls_value", seq)?;
            appender
                .append_row(params![
                    seq as i64,
                    p.geography,
                    p.ethnicity,
                    all_value,
                    boys_value,
                    girls_value,
                    p.json_content,
                    p.file_name,
                    p.relative_file_path,
                ])
                .context("appending pivoted record")?;
        }
        appender.flush().context("flushing pivoted_records appender")?;
        drop(appender);

        let count = self.table_count("pivoted_records")?;
        info!(rows = count, "pivoted records staged");
        Ok(count)
    }

    fn table_count(&self, table: &'static str) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .with_context(|| format!("counting {}", table))?;
        Ok(n as usize)
    }
}

impl PivotSource for StagingStore {
    fn count(&self) -> Result<usize> {
        self.table_count("pivoted_records")
    }

    fn page(&self, offset: usize, limit: usize) -> Result<Vec<PivotedRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT geography, ethnicity, all_value, boys_value, girls_value,
                        json_content, file_name, relative_file_path
                 FROM pivoted_records
                 ORDER BY seq
                 LIMIT ? OFFSET ?",
            )
            .context("preparing pivoted_records page query")?;
        // LIMIT/OFFSET beyond BIGINT range just means "everything"
        let limit_param = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset_param = i64::try_from(offset).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit_param, offset_param], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    [
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ],
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .with_context(|| format!("querying pivoted_records at offset {}", offset))?
            .collect::<duckdb::Result<Vec<_>>>()
            .with_context(|| format!("reading pivoted_records at offset {}", offset))?;

        let page = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let (
                    geography,
                    ethnicity,
                    [all, boys, girls],
                    json_content,
                    file_name,
                    relative_file_path,
                ) = row;
                let idx = offset + i;
                Ok(PivotedRecord {
                    geography,
                    ethnicity,
                    all_value: from_bigint(all, "all_value", idx)?,
                    boys_value: from_bigint(boys, "boys_value", idx)?,
                    girls_value: from_bigint(girls, "girls_value", idx)?,
                    json_content,
                    file_name,
                    relative_file_path,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(offset, limit, rows = page.len(), "fetched page");
        Ok(page)
    }
}

fn to_bigint(v: u64, column: &str, row: usize) -> Result<i64> {
    i64::try_from(v)
        .with_context(|| format!("{} of row {} does not fit in BIGINT: {}", column, row, v))
}

fn from_bigint(v: i64, column: &str, row: usize) -> Result<u64> {
    u64::try_from(v).with_context(|| format!("{} of row {} is negative: {}", column, row, v))
}
