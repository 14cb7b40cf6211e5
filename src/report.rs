use anyhow::{Context, Result};
use chrono::Utc;
use csv::WriterBuilder;
use std::{fs, path::Path, time::Duration};
use tracing::info;

use crate::{
    config::PipelineConfig,
    sink::{AggregateRow, Sink},
};

const REPORT_HEADER: [&str; 3] = ["Region", "Year", "Mark"];

/// Run the terminal aggregation and write the delimited report file.
///
/// Retried as a single unit by the caller; a failed query leaves no
/// partially written report behind a successful one.
pub async fn export_report(sink: &Sink, cfg: &PipelineConfig) -> Result<()> {
    let rows = sink.min_scores(cfg).await?;
    write_report(&rows, &cfg.report_path)?;
    info!(rows = rows.len(), file = %cfg.report_path.display(), "report written");
    Ok(())
}

/// Header plus one `Region;Year;Mark` line per aggregate group, quoting only
/// where the delimiter forces it.
pub fn write_report(rows: &[AggregateRow], path: &Path) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .with_context(|| format!("creating report file {}", path.display()))?;

    writer.write_record(REPORT_HEADER)?;
    for row in rows {
        let year = row.year.to_string();
        let mark = row.mark.map(|m| m.to_string()).unwrap_or_default();
        writer.write_record([
            row.region.as_deref().unwrap_or(""),
            year.as_str(),
            mark.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Written whenever the load phase completes, independent of how the export
/// step fares afterwards.
pub fn write_duration_report(path: &Path, elapsed: Duration) -> Result<()> {
    let body = format!(
        "Loading all years took {:.3}s (finished {})\n",
        elapsed.as_secs_f64(),
        Utc::now().to_rfc3339(),
    );
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}
