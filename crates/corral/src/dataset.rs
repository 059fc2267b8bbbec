//! Dataset registry with nested-example integrity
//!
//! Examples arrive as JSON values and are coerced to `{text, label}` string
//! pairs before the write. The nested array is stored with explicit field
//! types (see the schema module); the coercion plus declaration together
//! keep the round trip lossless.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::error::{CorralError, Result};
use crate::model::{DatasetRecord, Example, Metadata};
use crate::store::schema::DATASETS_TABLE;
use crate::store::{records, sql_str, Datastore};

/// Arguments for storing one dataset snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDatasetRequest {
  pub dataset_id: String,
  /// Raw examples as received at the JSON boundary; coerced before writing.
  pub examples: Vec<Value>,
  #[serde(default)]
  pub metadata: Metadata,
}

pub struct DatasetRegistry {
  store: Arc<Datastore>,
}

impl DatasetRegistry {
  pub fn new(store: Arc<Datastore>) -> Self {
    Self { store }
  }

  /// Store a named snapshot; `dataset_id` must be unique.
  pub async fn store(&self, request: StoreDatasetRequest) -> Result<String> {
    if request.dataset_id.is_empty() {
      return Err(CorralError::Validation("dataset_id must be non-empty".into()));
    }

    let filter = format!("dataset_id = {}", sql_str(&request.dataset_id));
    if self.store.count_where("store_dataset", DATASETS_TABLE, Some(filter)).await? > 0 {
      return Err(CorralError::conflict("dataset", request.dataset_id));
    }

    let examples = coerce_examples(&request.examples)?;
    let record = DatasetRecord {
      dataset_id: request.dataset_id,
      size: examples.len(),
      examples,
      created_at: Utc::now(),
      metadata: request.metadata,
    };

    let batch = records::dataset_to_batch(&record)?;
    self.store.append("store_dataset", DATASETS_TABLE, batch).await?;

    info!(dataset_id = %record.dataset_id, size = record.size, "stored dataset");
    Ok(record.dataset_id)
  }

  /// Load a snapshot by id.
  pub async fn load(&self, dataset_id: &str) -> Result<DatasetRecord> {
    let filter = format!("dataset_id = {}", sql_str(dataset_id));
    let batches = self.store.read_where("load_dataset", DATASETS_TABLE, Some(filter)).await?;

    records::datasets_from_batches(&batches)?
      .into_iter()
      .next()
      .ok_or_else(|| CorralError::not_found("dataset", dataset_id))
  }
}

/// Coerce raw JSON examples into string pairs.
///
/// Strings pass through, numbers and booleans render to their display form.
/// A missing or null field is rejected; an empty string is suspicious but
/// valid.
pub fn coerce_examples(raw: &[Value]) -> Result<Vec<Example>> {
  raw
    .iter()
    .enumerate()
    .map(|(index, value)| coerce_example(index, value))
    .collect()
}

fn coerce_example(index: usize, value: &Value) -> Result<Example> {
  let object = value
    .as_object()
    .ok_or_else(|| CorralError::Validation(format!("example {index} is not an object")))?;

  Ok(Example {
    text: coerce_field(index, object.get("text"), "text")?,
    label: coerce_field(index, object.get("label"), "label")?,
  })
}

fn coerce_field(index: usize, value: Option<&Value>, field: &str) -> Result<String> {
  match value {
    None | Some(Value::Null) => Err(CorralError::Validation(format!(
      "example {index} is missing required field '{field}'"
    ))),
    Some(Value::String(text)) => Ok(text.clone()),
    Some(Value::Number(number)) => Ok(number.to_string()),
    Some(Value::Bool(flag)) => Ok(flag.to_string()),
    Some(_) => Err(CorralError::Validation(format!(
      "example {index} field '{field}' cannot be coerced to a string"
    ))),
  }
}
