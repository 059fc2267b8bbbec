//! Record ⇄ Arrow RecordBatch conversion for all four tables

use arrow::array::{
  Array, BooleanArray, Float32Array, Float32Builder, Float64Array, Int64Array, ListArray,
  ListBuilder, StringArray, StringBuilder, StructArray, StructBuilder, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::schema;
use crate::error::{CorralError, Result};
use crate::model::{
  DatasetRecord, EmbeddingRecord, Example, Metadata, ModelRecord, ModelStatus, PredictionLogEntry,
};

// Write path
// ==========

/// Convert one model record into a single-row batch
pub fn model_to_batch(record: &ModelRecord) -> Result<RecordBatch> {
  let config_json = serde_json::to_string(&record.config)
    .map_err(|e| CorralError::Validation(format!("model config not serializable: {e}")))?;

  let columns: Vec<Arc<dyn Array>> = vec![
    Arc::new(StringArray::from(vec![record.model_id.as_str()])),
    Arc::new(StringArray::from(vec![record.version.as_str()])),
    Arc::new(StringArray::from(vec![config_json.as_str()])),
    Arc::new(StringArray::from(vec![record.weights.as_str()])),
    Arc::new(string_list_array(&[&record.categories])),
    Arc::new(timestamp_array(&[record.created_at])),
    Arc::new(StringArray::from(vec![record.trained_on.as_deref()])),
    Arc::new(string_list_array(&[&record.tags])),
    Arc::new(StringArray::from(vec![record.status.as_str()])),
    Arc::new(StringArray::from(vec![record.description.as_str()])),
  ];

  RecordBatch::try_new(schema::models_schema(), columns)
    .map_err(|e| CorralError::backing("store_model", e))
}

/// Convert one dataset record into a single-row batch
pub fn dataset_to_batch(record: &DatasetRecord) -> Result<RecordBatch> {
  let metadata_json = metadata_to_json(&record.metadata)?;

  let columns: Vec<Arc<dyn Array>> = vec![
    Arc::new(StringArray::from(vec![record.dataset_id.as_str()])),
    Arc::new(examples_list_array(&record.examples)?),
    Arc::new(Int64Array::from(vec![record.size as i64])),
    Arc::new(timestamp_array(&[record.created_at])),
    Arc::new(StringArray::from(vec![metadata_json.as_str()])),
  ];

  RecordBatch::try_new(schema::datasets_schema(), columns)
    .map_err(|e| CorralError::backing("store_dataset", e))
}

/// Convert one ledger entry into a single-row batch
pub fn prediction_to_batch(entry: &PredictionLogEntry) -> Result<RecordBatch> {
  let metadata_json = metadata_to_json(&entry.metadata)?;
  let id = entry.id.to_string();

  let columns: Vec<Arc<dyn Array>> = vec![
    Arc::new(StringArray::from(vec![id.as_str()])),
    Arc::new(StringArray::from(vec![entry.model_id.as_str()])),
    Arc::new(StringArray::from(vec![entry.version.as_str()])),
    Arc::new(StringArray::from(vec![entry.input_text.as_str()])),
    Arc::new(StringArray::from(vec![entry.predicted_label.as_str()])),
    Arc::new(Float64Array::from(vec![entry.confidence])),
    Arc::new(StringArray::from(vec![entry.ground_truth.as_deref()])),
    Arc::new(BooleanArray::from(vec![entry.correct])),
    Arc::new(Float64Array::from(vec![entry.latency_ms])),
    Arc::new(timestamp_array(&[entry.timestamp])),
    Arc::new(StringArray::from(vec![metadata_json.as_str()])),
  ];

  RecordBatch::try_new(schema::predictions_schema(), columns)
    .map_err(|e| CorralError::backing("append_prediction", e))
}

/// Convert a non-empty batch of embedding rows into a RecordBatch
pub fn embeddings_to_batch(rows: &[EmbeddingRecord]) -> Result<RecordBatch> {
  if rows.is_empty() {
    return Err(CorralError::Validation("cannot build a batch from zero embedding rows".into()));
  }

  let metadata_json: Vec<String> =
    rows.iter().map(|r| metadata_to_json(&r.metadata)).collect::<Result<_>>()?;

  let columns: Vec<Arc<dyn Array>> = vec![
    Arc::new(StringArray::from(rows.iter().map(|r| r.collection.as_str()).collect::<Vec<_>>())),
    Arc::new(StringArray::from(rows.iter().map(|r| r.item_id.as_str()).collect::<Vec<_>>())),
    Arc::new(StringArray::from(rows.iter().map(|r| r.text.as_str()).collect::<Vec<_>>())),
    Arc::new(f32_list_array(rows.iter().map(|r| r.embedding.as_slice()))),
    Arc::new(StringArray::from(metadata_json.iter().map(|s| s.as_str()).collect::<Vec<_>>())),
    Arc::new(timestamp_array(&rows.iter().map(|r| r.created_at).collect::<Vec<_>>())),
  ];

  RecordBatch::try_new(schema::embeddings_schema(), columns)
    .map_err(|e| CorralError::backing("insert_embeddings", e))
}

fn timestamp_array(values: &[DateTime<Utc>]) -> TimestampMicrosecondArray {
  let micros: Vec<i64> = values.iter().map(|t| t.timestamp_micros()).collect();
  TimestampMicrosecondArray::from(micros).with_timezone("UTC")
}

fn string_list_array(rows: &[&[String]]) -> ListArray {
  let mut builder = ListBuilder::new(StringBuilder::new());
  for row in rows {
    for value in row.iter() {
      builder.values().append_value(value);
    }
    builder.append(true);
  }
  builder.finish()
}

fn f32_list_array<'a>(rows: impl Iterator<Item = &'a [f32]>) -> ListArray {
  let mut builder = ListBuilder::new(Float32Builder::new());
  for row in rows {
    for &value in row {
      builder.values().append_value(value);
    }
    builder.append(true);
  }
  builder.finish()
}

/// Build the nested examples column with its struct fields declared
fn examples_list_array(examples: &[Example]) -> Result<ListArray> {
  let item_field =
    Arc::new(Field::new("item", DataType::Struct(schema::example_fields()), true));
  let struct_builder = StructBuilder::from_fields(schema::example_fields(), examples.len());
  let mut builder = ListBuilder::new(struct_builder).with_field(item_field);

  for example in examples {
    let item = builder.values();
    append_example_field(item, 0, &example.text)?;
    append_example_field(item, 1, &example.label)?;
    item.append(true);
  }
  builder.append(true);

  Ok(builder.finish())
}

fn append_example_field(builder: &mut StructBuilder, index: usize, value: &str) -> Result<()> {
  builder
    .field_builder::<StringBuilder>(index)
    .ok_or_else(|| CorralError::backing("store_dataset", "example column builder mismatch"))?
    .append_value(value);
  Ok(())
}

fn metadata_to_json(metadata: &Metadata) -> Result<String> {
  serde_json::to_string(metadata)
    .map_err(|e| CorralError::Validation(format!("metadata not serializable: {e}")))
}

// Read path
// =========

/// Decode model rows from result batches
pub fn models_from_batches(batches: &[RecordBatch]) -> Result<Vec<ModelRecord>> {
  let mut records = Vec::new();

  for batch in batches {
    let model_id = typed_column::<StringArray>(batch, "model_id")?;
    let version = typed_column::<StringArray>(batch, "version")?;
    let config = typed_column::<StringArray>(batch, "config")?;
    let weights = typed_column::<StringArray>(batch, "weights")?;
    let categories = typed_column::<ListArray>(batch, "categories")?;
    let created_at = typed_column::<TimestampMicrosecondArray>(batch, "created_at")?;
    let trained_on = typed_column::<StringArray>(batch, "trained_on")?;
    let tags = typed_column::<ListArray>(batch, "tags")?;
    let status = typed_column::<StringArray>(batch, "status")?;
    let description = typed_column::<StringArray>(batch, "description")?;

    for row in 0..batch.num_rows() {
      records.push(ModelRecord {
        model_id: model_id.value(row).to_string(),
        version: version.value(row).to_string(),
        config: serde_json::from_str(config.value(row))
          .map_err(|e| column_error("config", &format!("not a valid model config: {e}")))?,
        weights: weights.value(row).to_string(),
        categories: string_list_values(categories, row)?,
        created_at: timestamp_value(created_at, row)?,
        trained_on: optional_string(trained_on, row),
        tags: string_list_values(tags, row)?,
        status: ModelStatus::parse(status.value(row))?,
        description: description.value(row).to_string(),
      });
    }
  }

  Ok(records)
}

/// Decode dataset rows from result batches
pub fn datasets_from_batches(batches: &[RecordBatch]) -> Result<Vec<DatasetRecord>> {
  let mut records = Vec::new();

  for batch in batches {
    let dataset_id = typed_column::<StringArray>(batch, "dataset_id")?;
    let examples = typed_column::<ListArray>(batch, "examples")?;
    let size = typed_column::<Int64Array>(batch, "size")?;
    let created_at = typed_column::<TimestampMicrosecondArray>(batch, "created_at")?;
    let metadata = typed_column::<StringArray>(batch, "metadata")?;

    for row in 0..batch.num_rows() {
      let decoded = example_values(examples, row)?;
      let stored_size = size.value(row) as usize;
      if stored_size != decoded.len() {
        return Err(column_error(
          "size",
          &format!("stored size {stored_size} does not match {} examples", decoded.len()),
        ));
      }

      records.push(DatasetRecord {
        dataset_id: dataset_id.value(row).to_string(),
        size: decoded.len(),
        examples: decoded,
        created_at: timestamp_value(created_at, row)?,
        metadata: metadata_from_json(metadata.value(row))?,
      });
    }
  }

  Ok(records)
}

/// Decode ledger rows from result batches
pub fn predictions_from_batches(batches: &[RecordBatch]) -> Result<Vec<PredictionLogEntry>> {
  let mut entries = Vec::new();

  for batch in batches {
    let id = typed_column::<StringArray>(batch, "id")?;
    let model_id = typed_column::<StringArray>(batch, "model_id")?;
    let version = typed_column::<StringArray>(batch, "version")?;
    let input_text = typed_column::<StringArray>(batch, "input_text")?;
    let predicted_label = typed_column::<StringArray>(batch, "predicted_label")?;
    let confidence = typed_column::<Float64Array>(batch, "confidence")?;
    let ground_truth = typed_column::<StringArray>(batch, "ground_truth")?;
    let correct = typed_column::<BooleanArray>(batch, "correct")?;
    let latency_ms = typed_column::<Float64Array>(batch, "latency_ms")?;
    let timestamp = typed_column::<TimestampMicrosecondArray>(batch, "timestamp")?;
    let metadata = typed_column::<StringArray>(batch, "metadata")?;

    for row in 0..batch.num_rows() {
      entries.push(PredictionLogEntry {
        id: Uuid::parse_str(id.value(row))
          .map_err(|e| column_error("id", &format!("not a valid uuid: {e}")))?,
        model_id: model_id.value(row).to_string(),
        version: version.value(row).to_string(),
        input_text: input_text.value(row).to_string(),
        predicted_label: predicted_label.value(row).to_string(),
        confidence: confidence.value(row),
        ground_truth: optional_string(ground_truth, row),
        correct: optional_bool(correct, row),
        latency_ms: latency_ms.value(row),
        timestamp: timestamp_value(timestamp, row)?,
        metadata: metadata_from_json(metadata.value(row))?,
      });
    }
  }

  Ok(entries)
}

/// Decode embedding rows from result batches
pub fn embeddings_from_batches(batches: &[RecordBatch]) -> Result<Vec<EmbeddingRecord>> {
  let mut records = Vec::new();

  for batch in batches {
    let collection = typed_column::<StringArray>(batch, "collection")?;
    let item_id = typed_column::<StringArray>(batch, "item_id")?;
    let text = typed_column::<StringArray>(batch, "text")?;
    let embedding = typed_column::<ListArray>(batch, "embedding")?;
    let metadata = typed_column::<StringArray>(batch, "metadata")?;
    let created_at = typed_column::<TimestampMicrosecondArray>(batch, "created_at")?;

    for row in 0..batch.num_rows() {
      records.push(EmbeddingRecord {
        collection: collection.value(row).to_string(),
        item_id: item_id.value(row).to_string(),
        text: text.value(row).to_string(),
        embedding: f32_list_values(embedding, row)?,
        metadata: metadata_from_json(metadata.value(row))?,
        created_at: timestamp_value(created_at, row)?,
      });
    }
  }

  Ok(records)
}

/// Extract a typed column from the batch
fn typed_column<'a, A: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A> {
  batch
    .column_by_name(name)
    .ok_or_else(|| column_error(name, "column missing"))?
    .as_any()
    .downcast_ref::<A>()
    .ok_or_else(|| column_error(name, "unexpected column type"))
}

fn column_error(column: &str, reason: &str) -> CorralError {
  CorralError::backing("read_rows", format!("column '{column}': {reason}"))
}

fn optional_string(array: &StringArray, row: usize) -> Option<String> {
  if array.is_null(row) {
    None
  } else {
    Some(array.value(row).to_string())
  }
}

fn optional_bool(array: &BooleanArray, row: usize) -> Option<bool> {
  if array.is_null(row) {
    None
  } else {
    Some(array.value(row))
  }
}

fn timestamp_value(array: &TimestampMicrosecondArray, row: usize) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_micros(array.value(row))
    .ok_or_else(|| column_error("timestamp", "out of range"))
}

fn string_list_values(array: &ListArray, row: usize) -> Result<Vec<String>> {
  let values = array.value(row);
  let strings = values
    .as_any()
    .downcast_ref::<StringArray>()
    .ok_or_else(|| column_error("list", "items are not strings"))?;
  Ok((0..strings.len()).map(|i| strings.value(i).to_string()).collect())
}

fn f32_list_values(array: &ListArray, row: usize) -> Result<Vec<f32>> {
  let values = array.value(row);
  let floats = values
    .as_any()
    .downcast_ref::<Float32Array>()
    .ok_or_else(|| column_error("embedding", "items are not f32"))?;
  Ok((0..floats.len()).map(|i| floats.value(i)).collect())
}

fn example_values(array: &ListArray, row: usize) -> Result<Vec<Example>> {
  let values = array.value(row);
  let structs = values
    .as_any()
    .downcast_ref::<StructArray>()
    .ok_or_else(|| column_error("examples", "items are not structs"))?;

  let text = struct_string_field(structs, "text")?;
  let label = struct_string_field(structs, "label")?;

  Ok(
    (0..structs.len())
      .map(|i| Example { text: text.value(i).to_string(), label: label.value(i).to_string() })
      .collect(),
  )
}

fn struct_string_field<'a>(structs: &'a StructArray, name: &str) -> Result<&'a StringArray> {
  structs
    .column_by_name(name)
    .ok_or_else(|| column_error(name, "nested field missing"))?
    .as_any()
    .downcast_ref::<StringArray>()
    .ok_or_else(|| column_error(name, "nested field is not a string"))
}

fn metadata_from_json(raw: &str) -> Result<Metadata> {
  if raw.is_empty() {
    return Ok(Metadata::new());
  }
  serde_json::from_str(raw)
    .map_err(|e| column_error("metadata", &format!("not a valid JSON object: {e}")))
}
