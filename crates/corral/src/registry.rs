//! Versioned model registry
//!
//! Create/read of model artifacts with "latest version" resolution. Every
//! call round-trips to the backing store; there is no caching layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{CorralError, Result};
use crate::model::{ModelConfig, ModelRecord, ModelStatus, WeightsPayload};
use crate::store::schema::{DATASETS_TABLE, MODELS_TABLE};
use crate::store::{records, sql_str, Datastore};

/// Arguments for storing one model version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreModelRequest {
  pub model_id: String,
  pub version: String,
  pub config: ModelConfig,
  pub weights: WeightsPayload,
  pub categories: Vec<String>,
  #[serde(default)]
  pub trained_on: Option<String>,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub description: Option<String>,
}

/// Outcome of a model store.
///
/// `warning` carries the non-fatal consistency note when `trained_on`
/// references a dataset that is not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreModelOutcome {
  pub record_id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub warning: Option<String>,
}

/// One entry of a version listing, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersionSummary {
  pub version: String,
  pub created_at: DateTime<Utc>,
  pub categories: Vec<String>,
  pub status: ModelStatus,
  pub description: String,
}

pub struct ModelRegistry {
  store: Arc<Datastore>,
}

impl ModelRegistry {
  pub fn new(store: Arc<Datastore>) -> Self {
    Self { store }
  }

  /// Store a new model version; `(model_id, version)` must be unique.
  pub async fn store(&self, request: StoreModelRequest) -> Result<StoreModelOutcome> {
    if request.model_id.is_empty() || request.version.is_empty() {
      return Err(CorralError::Validation("model_id and version must be non-empty".into()));
    }
    if request.categories.is_empty() {
      return Err(CorralError::Validation("categories must list at least one label".into()));
    }

    let record_id = format!("{}:{}", request.model_id, request.version);
    let filter = format!(
      "model_id = {} AND version = {}",
      sql_str(&request.model_id),
      sql_str(&request.version)
    );
    if self.store.count_where("store_model", MODELS_TABLE, Some(filter)).await? > 0 {
      return Err(CorralError::conflict("model version", record_id));
    }

    let warning = self.check_trained_on(request.trained_on.as_deref()).await?;

    let record = ModelRecord {
      model_id: request.model_id,
      version: request.version,
      config: request.config,
      weights: request.weights.to_blob()?,
      categories: request.categories,
      created_at: Utc::now(),
      trained_on: request.trained_on,
      tags: request.tags,
      status: ModelStatus::Active,
      description: request.description.unwrap_or_default(),
    };

    let batch = records::model_to_batch(&record)?;
    self.store.append("store_model", MODELS_TABLE, batch).await?;

    info!(record_id = %record_id, "stored model version");
    Ok(StoreModelOutcome { record_id, warning })
  }

  /// Probe the dataset reference; a missing dataset is a warning, never an error.
  async fn check_trained_on(&self, trained_on: Option<&str>) -> Result<Option<String>> {
    let Some(dataset_id) = trained_on else {
      return Ok(None);
    };

    let filter = format!("dataset_id = {}", sql_str(dataset_id));
    if self.store.count_where("store_model", DATASETS_TABLE, Some(filter)).await? == 0 {
      let message = format!("trained_on references dataset '{dataset_id}' which is not stored");
      warn!(dataset_id, "unresolved trained_on reference");
      return Ok(Some(message));
    }
    Ok(None)
  }

  /// Load a specific version, or the latest active record when omitted.
  pub async fn load(&self, model_id: &str, version: Option<&str>) -> Result<ModelRecord> {
    match version {
      Some(version) => self.load_version(model_id, version).await,
      None => self.load_latest(model_id).await,
    }
  }

  async fn load_version(&self, model_id: &str, version: &str) -> Result<ModelRecord> {
    let filter =
      format!("model_id = {} AND version = {}", sql_str(model_id), sql_str(version));
    let batches = self.store.read_where("load_model", MODELS_TABLE, Some(filter)).await?;

    records::models_from_batches(&batches)?
      .into_iter()
      .next()
      .ok_or_else(|| CorralError::not_found("model version", format!("{model_id}:{version}")))
  }

  /// Latest = the active record with the greatest creation time.
  async fn load_latest(&self, model_id: &str) -> Result<ModelRecord> {
    let records = self.all_versions("load_model", model_id).await?;

    records
      .into_iter()
      .filter(|record| record.status == ModelStatus::Active)
      .max_by(|a, b| {
        (a.created_at, &a.version).cmp(&(b.created_at, &b.version))
      })
      .ok_or_else(|| CorralError::not_found("model", model_id))
  }

  /// Transition the status of one version (soft delete, never a row removal).
  pub async fn set_status(
    &self,
    model_id: &str,
    version: &str,
    status: ModelStatus,
  ) -> Result<()> {
    // Resolve first so an unknown version surfaces as NotFound
    self.load_version(model_id, version).await?;

    let filter =
      format!("model_id = {} AND version = {}", sql_str(model_id), sql_str(version));
    self
      .store
      .update_where("set_status", MODELS_TABLE, &filter, "status", &sql_str(status.as_str()))
      .await?;

    info!(model_id, version, status = status.as_str(), "updated model status");
    Ok(())
  }

  /// List stored versions for a model, newest first.
  pub async fn list_versions(&self, model_id: &str) -> Result<Vec<ModelVersionSummary>> {
    let mut records = self.all_versions("list_versions", model_id).await?;
    records.sort_by(|a, b| (b.created_at, &b.version).cmp(&(a.created_at, &a.version)));

    Ok(
      records
        .into_iter()
        .map(|record| ModelVersionSummary {
          version: record.version,
          created_at: record.created_at,
          categories: record.categories,
          status: record.status,
          description: record.description,
        })
        .collect(),
    )
  }

  async fn all_versions(
    &self,
    operation: &'static str,
    model_id: &str,
  ) -> Result<Vec<ModelRecord>> {
    let filter = format!("model_id = {}", sql_str(model_id));
    let batches = self.store.read_where(operation, MODELS_TABLE, Some(filter)).await?;
    records::models_from_batches(&batches)
  }
}
