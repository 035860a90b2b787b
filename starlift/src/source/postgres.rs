//! Postgres implementation of the [`SqlDatabase`] capability.

use secrecy::ExposeSecret;
use starlift_config::shared::PgConnectionConfig;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;
use crate::source::base::{QueryResponse, SqlDatabase};
use crate::types::{Cell, TableRow};

/// Catalog query returning the user-visible base tables of the connected
/// database.
const BASE_TABLES_QUERY: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema = 'public' AND table_type = 'BASE TABLE'";

/// A single scoped Postgres connection.
///
/// One instance backs one stage invocation; the connection task ends when
/// the instance is dropped, so the connection is released on every exit
/// path, including failure.
#[derive(Debug)]
pub struct PgDatabase {
    client: tokio_postgres::Client,
}

impl PgDatabase {
    /// Connects using the supplied connection parameters.
    pub async fn connect(config: &PgConnectionConfig) -> PipelineResult<Self> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.name)
            .user(&config.username);
        if let Some(password) = &config.password {
            pg_config.password(password.expose_secret());
        }

        let (client, connection) = pg_config.connect(NoTls).await.map_err(|err| {
            pipeline_error!(
                ErrorKind::SourceConnectionFailed,
                "failed to connect to database",
                format!("{}:{}/{}", config.host, config.port, config.name),
                source: err
            )
        })?;

        // The connection task owns the socket; it exits once the client is
        // dropped.
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!("database connection closed with error: {err}");
            }
        });

        debug!(host = %config.host, database = %config.name, "connected to database");
        Ok(Self { client })
    }
}

impl SqlDatabase for PgDatabase {
    async fn list_base_tables(&self) -> PipelineResult<Vec<String>> {
        let rows = self
            .client
            .query(BASE_TABLES_QUERY, &[])
            .await
            .map_err(|err| {
                pipeline_error!(
                    ErrorKind::DatabaseError,
                    "failed to read table catalog",
                    source: err
                )
            })?;

        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn run_query(&self, sql: &str) -> PipelineResult<QueryResponse> {
        // The simple-query protocol returns every value in text form, which
        // is exactly what the CSV staging area stores.
        let messages = self.client.simple_query(sql).await.map_err(|err| {
            pipeline_error!(ErrorKind::DatabaseError, "query failed", sql, source: err)
        })?;

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    if columns.is_empty() {
                        columns = row
                            .columns()
                            .iter()
                            .map(|column| column.name().to_string())
                            .collect();
                    }

                    let values = (0..row.len())
                        .map(|index| match row.get(index) {
                            Some(value) => Cell::String(value.to_string()),
                            None => Cell::Null,
                        })
                        .collect();
                    rows.push(TableRow::new(values));
                }
                SimpleQueryMessage::RowDescription(description) => {
                    columns = description
                        .iter()
                        .map(|column| column.name().to_string())
                        .collect();
                }
                _ => {}
            }
        }

        Ok(QueryResponse { columns, rows })
    }

    async fn execute(&self, sql: &str, params: &[Cell]) -> PipelineResult<u64> {
        // Parameters are bound as text and coerced server-side by the
        // assignment casts of the target columns, matching the text-form
        // values flowing out of the staged CSV snapshots.
        let types = vec![Type::TEXT; params.len()];
        let statement = self
            .client
            .prepare_typed(sql, &types)
            .await
            .map_err(|err| {
                pipeline_error!(
                    ErrorKind::DatabaseError,
                    "failed to prepare statement",
                    source: err
                )
            })?;

        let values: Vec<Option<String>> = params
            .iter()
            .map(|cell| {
                if cell.is_null() {
                    None
                } else {
                    Some(cell.to_csv_field())
                }
            })
            .collect();
        let bound: Vec<&(dyn ToSql + Sync)> = values
            .iter()
            .map(|value| value as &(dyn ToSql + Sync))
            .collect();

        let rows = self.client.query(&statement, &bound).await.map_err(|err| {
            pipeline_error!(
                ErrorKind::DatabaseError,
                "statement execution failed",
                source: err
            )
        })?;

        Ok(rows.len() as u64)
    }
}
