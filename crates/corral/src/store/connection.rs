//! Database connection management for the embedded store

use lancedb::{connect, Connection};
use std::path::{Path, PathBuf};

use crate::error::{CorralError, Result};

/// Create a LanceDB connection, creating the data directory if needed
pub async fn create_connection(data_dir: PathBuf) -> Result<Connection> {
  ensure_data_directory_exists(&data_dir)?;

  connect(&data_dir.to_string_lossy())
    .execute()
    .await
    .map_err(|e| CorralError::backing("connect", e))
}

/// Create data directory if it doesn't exist
fn ensure_data_directory_exists(data_dir: &Path) -> Result<()> {
  if !data_dir.exists() {
    std::fs::create_dir_all(data_dir).map_err(|e| CorralError::backing("connect", e))?;
  }
  Ok(())
}
