//! Domain records for the registry, dataset store, ledger and vector index

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{CorralError, Result};

/// Free-form key/value metadata carried on several record kinds.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Lifecycle status of a stored model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
  Active,
  Archived,
  Deprecated,
}

impl ModelStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Archived => "archived",
      Self::Deprecated => "deprecated",
    }
  }

  pub fn parse(value: &str) -> Result<Self> {
    match value {
      "active" => Ok(Self::Active),
      "archived" => Ok(Self::Archived),
      "deprecated" => Ok(Self::Deprecated),
      other => Err(CorralError::Validation(format!("unknown model status '{other}'"))),
    }
  }
}

/// Text encoding mode the feature encoder was fitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
  Char,
  Token,
}

/// Encoder reconstruction parameters.
///
/// These must travel with every stored model; the serialized weights are
/// inert without the encoding mode and maximum length used at training time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSettings {
  pub mode: EncodingMode,
  pub max_len: usize,
}

/// Hidden-layer activation of the external learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
  Relu,
  Sigmoid,
  Tanh,
}

/// Weight initialization strategy of the external learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightInit {
  Uniform,
  Gaussian,
  Orthogonal,
}

/// Hyperparameters stored alongside every model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
  pub hidden_size: usize,
  pub activation: Activation,
  pub weight_init: WeightInit,
  pub ridge_lambda: f64,
  pub max_input_len: usize,
  pub dropout: f64,
  pub encoder: EncoderSettings,
}

/// Serialized numeric state of the external learner.
///
/// The payload is self-sufficient on reload: it embeds the encoder settings
/// next to the weight matrices so nothing has to be joined back from other
/// fields to run inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsPayload {
  pub input_hidden: Vec<Vec<f64>>,
  pub hidden_bias: Vec<f64>,
  pub hidden_output: Vec<Vec<f64>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub vocabulary: Option<BTreeMap<String, usize>>,
  pub encoder: EncoderSettings,
}

impl WeightsPayload {
  /// Encode to the opaque base64 blob stored in the models table.
  pub fn to_blob(&self) -> Result<String> {
    let json = serde_json::to_vec(self)
      .map_err(|e| CorralError::Validation(format!("weights payload not serializable: {e}")))?;
    Ok(BASE64.encode(json))
  }

  /// Decode a stored blob back into the payload.
  pub fn from_blob(blob: &str) -> Result<Self> {
    let bytes = BASE64
      .decode(blob)
      .map_err(|e| CorralError::Validation(format!("weights blob is not valid base64: {e}")))?;
    serde_json::from_slice(&bytes)
      .map_err(|e| CorralError::Validation(format!("weights blob is not a valid payload: {e}")))
  }
}

/// One trained model version. Created once, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecord {
  pub model_id: String,
  pub version: String,
  pub config: ModelConfig,
  /// Opaque base64 blob holding the serialized [`WeightsPayload`].
  pub weights: String,
  /// Ordered label list; output vectors are index-aligned with it.
  pub categories: Vec<String>,
  pub created_at: DateTime<Utc>,
  /// Optional dataset reference, carried as an opaque id and never validated.
  pub trained_on: Option<String>,
  pub tags: Vec<String>,
  pub status: ModelStatus,
  pub description: String,
}

impl ModelRecord {
  pub fn decode_weights(&self) -> Result<WeightsPayload> {
    WeightsPayload::from_blob(&self.weights)
  }
}

/// One labeled training example after coercion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
  pub text: String,
  pub label: String,
}

/// One named, immutable snapshot of labeled examples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
  pub dataset_id: String,
  pub examples: Vec<Example>,
  /// Always equal to `examples.len()`; derived, never caller-settable.
  pub size: usize,
  pub created_at: DateTime<Utc>,
  pub metadata: Metadata,
}

/// One inference event in the append-only ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionLogEntry {
  pub id: Uuid,
  pub model_id: String,
  pub version: String,
  pub input_text: String,
  pub predicted_label: String,
  pub confidence: f64,
  pub ground_truth: Option<String>,
  /// Present if and only if `ground_truth` is present.
  pub correct: Option<bool>,
  pub latency_ms: f64,
  pub timestamp: DateTime<Utc>,
  pub metadata: Metadata,
}

/// One vector entry in a named collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
  pub collection: String,
  pub item_id: String,
  pub text: String,
  pub embedding: Vec<f32>,
  pub metadata: Metadata,
  pub created_at: DateTime<Utc>,
}
