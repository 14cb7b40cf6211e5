use thiserror::Error;

/// Non-transient pipeline failures.
///
/// Transient I/O (network, file system, database connectivity) flows through
/// `anyhow` at the call sites and is handled by the retry wrapper; the
/// variants here are the conditions a retry cannot fix.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A canonical column is absent from a year file's header. Fatal for that
    /// file: the destination schema cannot tolerate a missing required column.
    #[error("required column '{column}' missing from CSV header")]
    SchemaMismatch { column: String },

    /// The downloaded archive matched neither internal CSV naming convention.
    #[error("archive for {year} contains no recognised CSV entry")]
    MissingCsvEntry { year: u16 },
}
