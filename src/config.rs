use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Credentials for the results database, read from `settings.yaml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub host: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            dbname: "zno".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            host: "localhost".to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Key/value parameter string in the form `tokio_postgres::connect` takes.
    pub fn params(&self) -> String {
        format!(
            "host={} user={} password={} dbname={}",
            self.host, self.user, self.password, self.dbname
        )
    }
}

/// Immutable run configuration for the whole pipeline.
///
/// Every fixed pipeline parameter (year list, canonical columns, report
/// window) lives here rather than in module-level constants, so tests can
/// build a config with overrides and pass it straight in.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Years whose archives are fetched and loaded, in order.
    #[serde(default = "default_years")]
    pub years: Vec<u16>,

    /// Canonical column list every year file must be reducible to.
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,

    /// Destination results table.
    #[serde(default = "default_table")]
    pub table: String,

    /// Years whose CSV files carry a UTF-8 byte-order marker. Fixed table,
    /// never auto-detected.
    #[serde(default = "default_bom_years")]
    pub bom_years: Vec<u16>,

    /// Canonical column holding the natural key.
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Canonical column holding the region name.
    #[serde(default = "default_region_column")]
    pub region_column: String,

    /// Canonical column holding the test-completion status.
    #[serde(default = "default_status_column")]
    pub status_column: String,

    /// Canonical column holding the 100-point score.
    #[serde(default = "default_score_column")]
    pub score_column: String,

    /// Status literals counted as a completed test in the report.
    #[serde(default = "default_completed_statuses")]
    pub completed_statuses: Vec<String>,

    /// Years included in the aggregate report.
    #[serde(default = "default_report_years")]
    pub report_years: Vec<i32>,

    /// Directory holding downloaded archives and extracted CSVs.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Output path of the aggregate report.
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,

    /// Output path of the load-duration report.
    #[serde(default = "default_duration_path")]
    pub duration_path: PathBuf,

    /// Base URL the per-year archive name is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Attempt bound for every retry-wrapped stage.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

fn default_years() -> Vec<u16> {
    vec![2016, 2017, 2018, 2019, 2020]
}

fn default_columns() -> Vec<String> {
    ["OutID", "Regname", "engTestStatus", "engBall100"]
        .map(String::from)
        .to_vec()
}

fn default_table() -> String {
    "eng_results".to_string()
}

fn default_bom_years() -> Vec<u16> {
    vec![2017, 2018]
}

fn default_key_column() -> String {
    "OutID".to_string()
}

fn default_region_column() -> String {
    "Regname".to_string()
}

fn default_status_column() -> String {
    "engTestStatus".to_string()
}

fn default_score_column() -> String {
    "engBall100".to_string()
}

fn default_completed_statuses() -> Vec<String> {
    vec!["Зараховано".to_string(), "Отримав результат".to_string()]
}

fn default_report_years() -> Vec<i32> {
    vec![2019, 2020]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("Results.csv")
}

fn default_duration_path() -> PathBuf {
    PathBuf::from("Duration.txt")
}

fn default_base_url() -> String {
    "https://zno.testportal.com.ua/yearstat/uploads".to_string()
}

fn default_max_attempts() -> usize {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            years: default_years(),
            columns: default_columns(),
            table: default_table(),
            bom_years: default_bom_years(),
            key_column: default_key_column(),
            region_column: default_region_column(),
            status_column: default_status_column(),
            score_column: default_score_column(),
            completed_statuses: default_completed_statuses(),
            report_years: default_report_years(),
            data_dir: default_data_dir(),
            report_path: default_report_path(),
            duration_path: default_duration_path(),
            base_url: default_base_url(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PipelineConfig {
    /// Read a config file; any key not present falls back to its default.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Local path the year's downloaded archive is saved to.
    pub fn archive_path(&self, year: u16) -> PathBuf {
        self.data_dir.join(format!("data_{year}.7z"))
    }

    /// Canonical local path of the year's extracted CSV.
    pub fn csv_path(&self, year: u16) -> PathBuf {
        self.data_dir.join(format!("OpenData{year}.csv"))
    }

    /// Whether the year's file starts with a byte-order marker to strip.
    pub fn strip_bom(&self, year: u16) -> bool {
        self.bom_years.contains(&year)
    }
}
