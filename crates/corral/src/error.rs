//! Error taxonomy for registry, ledger and store operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CorralError>;

/// All failures surfaced by corral operations.
///
/// Every backing-store variant names the failing operation so callers never
/// see a bare driver error.
#[derive(Debug, Error)]
pub enum CorralError {
  #[error("{kind} '{id}' not found")]
  NotFound { kind: &'static str, id: String },

  #[error("{kind} '{id}' already exists")]
  Conflict { kind: &'static str, id: String },

  #[error("validation failed: {0}")]
  Validation(String),

  #[error("backing store failure in {operation}: {reason}")]
  BackingStore { operation: &'static str, reason: String },

  #[error("{operation} timed out after {seconds}s")]
  Timeout { operation: &'static str, seconds: u64 },
}

impl CorralError {
  pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
    Self::NotFound { kind, id: id.into() }
  }

  pub fn conflict(kind: &'static str, id: impl Into<String>) -> Self {
    Self::Conflict { kind, id: id.into() }
  }

  pub fn backing(operation: &'static str, reason: impl std::fmt::Display) -> Self {
    Self::BackingStore { operation, reason: reason.to_string() }
  }
}
