//! Runtime settings resolved from the environment

use dirs::home_dir;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CorralError, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Resolved runtime settings for the backing store.
#[derive(Debug, Clone)]
pub struct Settings {
  pub data_dir: PathBuf,
  pub store_timeout: Duration,
}

impl Settings {
  /// Resolve settings from the environment with sensible defaults.
  pub fn from_env() -> Result<Self> {
    Ok(Self { data_dir: resolve_data_dir()?, store_timeout: resolve_timeout() })
  }

  /// Settings rooted at an explicit data directory (used by tests and tools).
  pub fn with_data_dir(data_dir: PathBuf) -> Self {
    Self { data_dir, store_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS) }
  }
}

/// Get the store root directory (~/.corral/data)
fn resolve_data_dir() -> Result<PathBuf> {
  // Allow tests or callers to override the root directory via env var
  if let Ok(custom_root) = std::env::var("CORRAL_DATA_DIR") {
    return Ok(PathBuf::from(custom_root));
  }

  let home = home_dir()
    .ok_or_else(|| CorralError::Validation("could not find home directory".to_string()))?;
  Ok(home.join(".corral").join("data"))
}

fn resolve_timeout() -> Duration {
  let seconds = std::env::var("CORRAL_STORE_TIMEOUT_SECS")
    .ok()
    .and_then(|raw| raw.parse::<u64>().ok())
    .unwrap_or(DEFAULT_TIMEOUT_SECS);
  Duration::from_secs(seconds)
}
