use anyhow::Result;
use reqwest::Client;
use std::{
    fs,
    time::{Duration, Instant},
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use znoloader::{config::PipelineConfig, fetch, process, report, retry::Retry, sink};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
    info!("startup");

    // ─── 2) load configuration ───────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "settings.yaml".to_string());
    let cfg = PipelineConfig::load(&config_path)?;
    fs::create_dir_all(&cfg.data_dir)?;

    let client = Client::new();
    let retry = Retry::new(cfg.max_attempts);

    // ─── 3) open the shared database connection ──────────────────────
    let params = cfg.connection.params();
    let sink = retry
        .run_or_exit("connect", "couldn't connect to the database", || {
            sink::connect(&params)
        })
        .await;
    let inserter = sink.row_inserter(&cfg).await?;

    // ─── 4) fetch + load, one year fully done before the next ────────
    let mut load_elapsed = Duration::ZERO;
    for &year in &cfg.years {
        retry
            .run_or_exit(
                "fetch",
                &format!("couldn't fetch the {year} data file"),
                || fetch::fetch_year(&client, &cfg, year),
            )
            .await;

        let start = Instant::now();
        let rows = retry
            .run_or_exit("load", &format!("failed loading {year} data"), || {
                process::load_year(&inserter, &cfg, year)
            })
            .await;
        load_elapsed += start.elapsed();
        info!(year, rows, "year loaded");
    }
    report::write_duration_report(&cfg.duration_path, load_elapsed)?;

    // ─── 5) export the aggregate report ──────────────────────────────
    retry
        .run_or_exit("export", "failed exporting the report", || {
            report::export_report(&sink, &cfg)
        })
        .await;

    info!("all done");
    Ok(())
}
