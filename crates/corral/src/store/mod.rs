//! Backing store adapter over embedded LanceDB
//!
//! Owns the connect/reconnect lifecycle and raw query execution. A single
//! logical connection is established lazily on first use and shared; every
//! call is bounded by the configured timeout.

pub mod connection;
pub mod records;
pub mod schema;

use arrow::record_batch::{RecordBatch, RecordBatchIterator};
use futures::stream::StreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::Settings;
use crate::error::{CorralError, Result};

/// Connection-guarded client for the document store.
pub struct Datastore {
  data_dir: PathBuf,
  timeout: Duration,
  connection: OnceCell<Connection>,
}

impl Datastore {
  pub fn new(settings: &Settings) -> Self {
    Self {
      data_dir: settings.data_dir.clone(),
      timeout: settings.store_timeout,
      connection: OnceCell::new(),
    }
  }

  /// Lazily establish the shared connection.
  ///
  /// Concurrent first callers share one in-flight connect attempt; later
  /// callers observe the completed connection.
  async fn connection(&self) -> Result<&Connection> {
    self
      .connection
      .get_or_try_init(|| connection::create_connection(self.data_dir.clone()))
      .await
  }

  /// Bound a store call by the configured timeout.
  async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T>
  where
    F: Future<Output = Result<T>>,
  {
    match tokio::time::timeout(self.timeout, call).await {
      Ok(result) => result,
      Err(_) => Err(CorralError::Timeout { operation, seconds: self.timeout.as_secs() }),
    }
  }

  async fn table_exists_now(&self, table: &str) -> Result<bool> {
    let conn = self.connection().await?;
    let tables = conn
      .table_names()
      .execute()
      .await
      .map_err(|e| CorralError::backing("list_tables", e))?;
    Ok(tables.iter().any(|name| name == table))
  }

  async fn open_table(&self, operation: &'static str, table: &str) -> Result<Table> {
    let conn = self.connection().await?;
    conn
      .open_table(table)
      .execute()
      .await
      .map_err(|e| CorralError::backing(operation, format!("open table '{table}': {e}")))
  }

  /// Append a batch, creating the table with it if it does not exist yet.
  pub(crate) async fn append(
    &self,
    operation: &'static str,
    table: &str,
    batch: RecordBatch,
  ) -> Result<()> {
    self
      .bounded(operation, async {
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists_now(table).await? {
          let table = self.open_table(operation, table).await?;
          table
            .add(reader)
            .execute()
            .await
            .map_err(|e| CorralError::backing(operation, e))?;
        } else {
          let conn = self.connection().await?;
          conn
            .create_table(table, reader)
            .execute()
            .await
            .map_err(|e| CorralError::backing(operation, e))?;
          debug!(table, "created table with first batch");
        }
        Ok(())
      })
      .await
  }

  /// Count rows matching an optional filter; 0 when the table is absent.
  pub(crate) async fn count_where(
    &self,
    operation: &'static str,
    table: &str,
    filter: Option<String>,
  ) -> Result<usize> {
    self
      .bounded(operation, async {
        if !self.table_exists_now(table).await? {
          return Ok(0);
        }
        let table = self.open_table(operation, table).await?;
        table.count_rows(filter).await.map_err(|e| CorralError::backing(operation, e))
      })
      .await
  }

  /// Read all rows matching an optional filter; empty when the table is absent.
  pub(crate) async fn read_where(
    &self,
    operation: &'static str,
    table: &str,
    filter: Option<String>,
  ) -> Result<Vec<RecordBatch>> {
    self
      .bounded(operation, async {
        if !self.table_exists_now(table).await? {
          return Ok(Vec::new());
        }
        let table = self.open_table(operation, table).await?;

        let query = match filter {
          Some(predicate) => table.query().only_if(predicate),
          None => table.query(),
        };
        let mut stream =
          query.execute().await.map_err(|e| CorralError::backing(operation, e))?;

        let mut batches = Vec::new();
        while let Some(item) = stream.next().await {
          batches.push(item.map_err(|e| CorralError::backing(operation, e))?);
        }
        Ok(batches)
      })
      .await
  }

  /// Update one column on rows matching a filter.
  pub(crate) async fn update_where(
    &self,
    operation: &'static str,
    table: &str,
    filter: &str,
    column: &str,
    value_expr: &str,
  ) -> Result<()> {
    self
      .bounded(operation, async {
        if !self.table_exists_now(table).await? {
          return Ok(());
        }
        let table = self.open_table(operation, table).await?;
        let _ = table
          .update()
          .only_if(filter)
          .column(column, value_expr)
          .execute()
          .await
          .map_err(|e| CorralError::backing(operation, e))?;
        Ok(())
      })
      .await
  }

  /// Delete rows matching a filter; no-op when the table is absent.
  pub(crate) async fn delete_where(
    &self,
    operation: &'static str,
    table: &str,
    filter: &str,
  ) -> Result<()> {
    self
      .bounded(operation, async {
        if !self.table_exists_now(table).await? {
          return Ok(());
        }
        let table = self.open_table(operation, table).await?;
        table.delete(filter).await.map_err(|e| CorralError::backing(operation, e))?;
        Ok(())
      })
      .await
  }
}

/// Quote a string as a SQL literal for filter predicates
pub(crate) fn sql_str(value: &str) -> String {
  format!("'{}'", value.replace('\'', "''"))
}
