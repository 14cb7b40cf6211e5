use anyhow::{Context, Result};
use reqwest::Client;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokio::task;
use tracing::info;
use url::Url;

use crate::{config::PipelineConfig, error::PipelineError};

/// Compose the remote archive URL for one year.
pub fn archive_url(base: &str, year: u16) -> Result<Url> {
    let raw = format!("{}/OpenDataZNO{year}.7z", base.trim_end_matches('/'));
    Url::parse(&raw).with_context(|| format!("invalid archive URL {raw}"))
}

/// Download the year's archive and save it under the work dir.
/// Returns the full path of the saved file.
pub async fn download_archive(client: &Client, cfg: &PipelineConfig, year: u16) -> Result<PathBuf> {
    let url = archive_url(&cfg.base_url, year)?;
    let dest = cfg.archive_path(year);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let resp = client
        .get(url.as_str())
        .send()
        .await?
        .error_for_status()
        .with_context(|| format!("fetching {url}"))?;
    let bytes = resp.bytes().await?;
    tokio::fs::write(&dest, &bytes).await?;

    info!(year, bytes = bytes.len(), "downloaded archive");
    Ok(dest)
}

/// The CSV inside the archive uses one of two naming conventions depending
/// on the year. Probed in order.
fn candidate_names(year: u16) -> [String; 2] {
    [format!("Odata{year}File.csv"), format!("OpenData{year}.csv")]
}

/// Move whichever candidate the archive produced to the canonical name.
fn promote_extracted(extract_dir: &Path, year: u16, dest: &Path) -> Result<PathBuf> {
    for name in candidate_names(year) {
        let candidate = extract_dir.join(&name);
        if candidate.is_file() {
            fs::rename(&candidate, dest)
                .with_context(|| format!("renaming {name} to {}", dest.display()))?;
            return Ok(dest.to_path_buf());
        }
    }
    Err(PipelineError::MissingCsvEntry { year }.into())
}

/// Unpack the year's archive and land its CSV at the canonical local path.
pub fn extract_csv(archive: &Path, cfg: &PipelineConfig, year: u16) -> Result<PathBuf> {
    let extract_dir = cfg.data_dir.join(format!("extract_{year}"));
    fs::create_dir_all(&extract_dir)?;

    sevenz_rust::decompress_file(archive, &extract_dir)
        .with_context(|| format!("decompressing {}", archive.display()))?;

    let result = promote_extracted(&extract_dir, year, &cfg.csv_path(year));
    let _ = fs::remove_dir_all(&extract_dir);
    result
}

/// Retrieve one year's data file: download, unpack, normalize the filename.
///
/// The caller retries this as a single unit; a decompress failure re-fetches
/// the archive too.
pub async fn fetch_year(client: &Client, cfg: &PipelineConfig, year: u16) -> Result<PathBuf> {
    let archive = download_archive(client, cfg, year).await?;

    // decompression is CPU-bound; keep it off the async workers
    let cfg = cfg.clone();
    let path = task::spawn_blocking(move || extract_csv(&archive, &cfg, year)).await??;

    info!(year, file = %path.display(), "extracted year file");
    Ok(path)
}
