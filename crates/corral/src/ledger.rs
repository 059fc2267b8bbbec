//! Append-only prediction ledger
//!
//! The ledger is written by the inference path and read exclusively through
//! the metrics engine. Entries are never updated or deleted here.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CorralError, Result};
use crate::model::{Metadata, PredictionLogEntry};
use crate::store::schema::PREDICTIONS_TABLE;
use crate::store::{records, Datastore};

/// Arguments for appending one inference event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendPredictionRequest {
  pub model_id: String,
  pub version: String,
  pub input_text: String,
  pub predicted_label: String,
  /// Not range-validated; downstream aggregation tolerates garbage.
  pub confidence: f64,
  #[serde(default)]
  pub ground_truth: Option<String>,
  pub latency_ms: f64,
  /// Event time; defaults to the append time when absent.
  #[serde(default)]
  pub timestamp: Option<chrono::DateTime<Utc>>,
  #[serde(default)]
  pub metadata: Metadata,
}

pub struct PredictionLedger {
  store: Arc<Datastore>,
}

impl PredictionLedger {
  pub fn new(store: Arc<Datastore>) -> Self {
    Self { store }
  }

  /// Append one inference event; `correct` derives from the ground truth.
  pub async fn append(&self, request: AppendPredictionRequest) -> Result<()> {
    if request.model_id.is_empty() || request.version.is_empty() {
      return Err(CorralError::Validation("model_id and version must be non-empty".into()));
    }

    let correct = derive_correct(&request.predicted_label, request.ground_truth.as_deref());

    let entry = PredictionLogEntry {
      id: Uuid::new_v4(),
      model_id: request.model_id,
      version: request.version,
      input_text: request.input_text,
      predicted_label: request.predicted_label,
      confidence: request.confidence,
      ground_truth: request.ground_truth,
      correct,
      latency_ms: request.latency_ms,
      timestamp: request.timestamp.unwrap_or_else(Utc::now),
      metadata: request.metadata,
    };

    let batch = records::prediction_to_batch(&entry)?;
    self.store.append("append_prediction", PREDICTIONS_TABLE, batch).await?;

    debug!(model_id = %entry.model_id, id = %entry.id, "appended prediction");
    Ok(())
  }
}

/// `correct` is present if and only if ground truth is present.
fn derive_correct(predicted_label: &str, ground_truth: Option<&str>) -> Option<bool> {
  ground_truth.map(|truth| predicted_label == truth)
}
