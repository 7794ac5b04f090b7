use anyhow::{bail, Result};
use clap::Parser;
use gcse_fanout::{pipeline, Config};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) configuration ────────────────────────────────────────────
    let config = Config::parse();
    info!(?config, "startup");

    // ─── 3) run ──────────────────────────────────────────────────────
    let summary = pipeline::run(&config)?;

    // ─── 4) summary ──────────────────────────────────────────────────
    println!(
        "rows loaded: {}, groups: {}, documents: {}, files written: {}, failed: {}",
        summary.rows_loaded,
        summary.groups,
        summary.pivoted,
        summary.report.files_written,
        summary.report.failures.len()
    );
    for failure in &summary.report.failures {
        println!("failed {}: {:#}", failure.relative_file_path, failure.error);
    }

    if !summary.report.is_clean() {
        bail!(
            "{} of {} documents could not be written",
            summary.report.failures.len(),
            summary.report.records_seen
        );
    }
    info!("all done");
    Ok(())
}
