use anyhow::{Context, Result};
use bytes::BytesMut;
use tokio_postgres::{
    error::SqlState,
    types::{to_sql_checked, IsNull, ToSql, Type},
    Client, NoTls, Statement,
};
use tracing::{error, info};

use crate::{
    config::PipelineConfig,
    process::{CellValue, ResultRow},
};

/// Open the single shared database connection for the whole run.
///
/// The connection task is driven in the background; the returned `Sink`
/// hands out its client to the load and export stages.
pub async fn connect(params: &str) -> Result<Sink> {
    let (client, connection) = tokio_postgres::connect(params, NoTls)
        .await
        .context("connecting to PostgreSQL")?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!("database connection error: {err}");
        }
    });
    info!("database connection open");
    Ok(Sink { client })
}

pub struct Sink {
    client: Client,
}

/// How the sink disposed of one submitted row.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted,
    /// The (key, year) pair already exists; re-runs make this the common case.
    Duplicate,
    /// The surrounding transaction was already aborted by an earlier failure
    /// and accepts no further statements.
    AbortedTransaction,
    /// Anything else. The caller decides the row policy.
    Failed(tokio_postgres::Error),
}

/// One (region, year, minimum score) group of the aggregate report.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub region: Option<String>,
    pub year: i32,
    pub mark: Option<i32>,
}

impl Sink {
    /// Escape hatch for statements the pipeline does not own.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Prepare the insert statement once for the whole run.
    pub async fn row_inserter(&self, cfg: &PipelineConfig) -> Result<RowInserter<'_>> {
        let placeholders: Vec<String> = (1..=cfg.columns.len() + 1)
            .map(|n| format!("${n}"))
            .collect();
        let sql = format!(
            "INSERT INTO {} ({}, year) VALUES ({})",
            cfg.table,
            cfg.columns.join(", "),
            placeholders.join(", "),
        );
        let statement = self
            .client
            .prepare(&sql)
            .await
            .with_context(|| format!("preparing insert into {}", cfg.table))?;
        Ok(RowInserter {
            client: &self.client,
            statement,
        })
    }

    /// Minimum score per (region, year) over completed tests inside the
    /// reporting window, ordered by region then year.
    pub async fn min_scores(&self, cfg: &PipelineConfig) -> Result<Vec<AggregateRow>> {
        let sql = format!(
            "SELECT {region} AS region, year, MIN({score}) AS mark \
             FROM {table} \
             WHERE {status} = ANY($1) AND year = ANY($2) \
             GROUP BY region, year \
             ORDER BY region, year",
            region = cfg.region_column,
            score = cfg.score_column,
            status = cfg.status_column,
            table = cfg.table,
        );
        let rows = self
            .client
            .query(&sql, &[&cfg.completed_statuses, &cfg.report_years])
            .await
            .context("running aggregate query")?;

        Ok(rows
            .iter()
            .map(|row| AggregateRow {
                region: row.get("region"),
                year: row.get("year"),
                mark: row.get("mark"),
            })
            .collect())
    }

    /// One-shot schema setup for the results table.
    ///
    /// (key, year) is the composite identity; the primary key makes repeat
    /// loads of the same year no-ops at the row level.
    pub async fn create_results_table(&self, cfg: &PipelineConfig) -> Result<()> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                {key} character varying(127) NOT NULL,
                {region} character varying(127),
                {status} character varying(127),
                {score} integer,
                year integer NOT NULL,
                PRIMARY KEY ({key}, year)
            )",
            table = cfg.table,
            key = cfg.key_column,
            region = cfg.region_column,
            status = cfg.status_column,
            score = cfg.score_column,
        );
        self.client
            .batch_execute(&ddl)
            .await
            .with_context(|| format!("creating table {}", cfg.table))
    }
}

/// Inserts normalized rows one at a time under idempotent semantics.
pub struct RowInserter<'a> {
    client: &'a Client,
    statement: Statement,
}

impl RowInserter<'_> {
    /// Insert the row's full field tuple including year.
    ///
    /// Duplicate keys and aborted-transaction signals are absorbed as
    /// successful no-ops; they are the expected shape of a re-run.
    pub async fn insert(&self, row: &ResultRow) -> InsertOutcome {
        let mut params: Vec<&(dyn ToSql + Sync)> = row
            .cells
            .iter()
            .map(|cell| cell as &(dyn ToSql + Sync))
            .collect();
        params.push(&row.year);

        match self.client.execute(&self.statement, &params).await {
            Ok(_) => InsertOutcome::Inserted,
            Err(err) => {
                if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    InsertOutcome::Duplicate
                } else if err.code() == Some(&SqlState::IN_FAILED_SQL_TRANSACTION) {
                    InsertOutcome::AbortedTransaction
                } else {
                    InsertOutcome::Failed(err)
                }
            }
        }
    }
}

fn is_textual(ty: &Type) -> bool {
    *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR
}

impl ToSql for CellValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            CellValue::Null => Ok(IsNull::Yes),
            CellValue::Text(s) => {
                if is_textual(ty) {
                    s.as_str().to_sql(ty, out)
                } else {
                    Err(format!("cannot encode text cell into column of type {ty}").into())
                }
            }
            CellValue::Numeric(v) => {
                if *ty == Type::INT2 {
                    (v.round() as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (v.round() as i32).to_sql(ty, out)
                } else if *ty == Type::INT8 {
                    (v.round() as i64).to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    v.to_sql(ty, out)
                } else if is_textual(ty) {
                    v.to_string().to_sql(ty, out)
                } else {
                    Err(format!("cannot encode numeric cell into column of type {ty}").into())
                }
            }
        }
    }

    fn accepts(ty: &Type) -> bool {
        is_textual(ty)
            || *ty == Type::INT2
            || *ty == Type::INT4
            || *ty == Type::INT8
            || *ty == Type::FLOAT4
            || *ty == Type::FLOAT8
    }

    to_sql_checked!();
}
