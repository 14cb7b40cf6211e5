use anyhow::Result;
use znoloader::{config::PipelineConfig, sink};

/// One-shot setup of the results table described by the config file.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "settings.yaml".to_string());
    let cfg = PipelineConfig::load(&config_path)?;

    let sink = sink::connect(&cfg.connection.params()).await?;
    sink.create_results_table(&cfg).await?;

    println!("created table {}", cfg.table);
    Ok(())
}
