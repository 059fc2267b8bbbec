//! Arrow schema declarations for the four record tables
//!
//! Nested field types are declared explicitly up front. The dataset
//! `examples` column in particular is a `List<Struct>` with both struct
//! fields typed; without that declaration a schema-less store can round-trip
//! the nested objects as empty shells.

use arrow::datatypes::{DataType, Field, Fields, Schema, TimeUnit};
use std::sync::Arc;

pub const MODELS_TABLE: &str = "models";
pub const DATASETS_TABLE: &str = "datasets";
pub const PREDICTIONS_TABLE: &str = "predictions";
pub const EMBEDDINGS_TABLE: &str = "embeddings";

/// Native temporal column type; timestamps are never stored as strings.
fn utc_timestamp() -> DataType {
  DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
}

fn string_list() -> DataType {
  DataType::List(Arc::new(Field::new("item", DataType::Utf8, true)))
}

/// Struct fields of one dataset example: both mandatory strings.
pub fn example_fields() -> Fields {
  Fields::from(vec![
    Field::new("text", DataType::Utf8, false),
    Field::new("label", DataType::Utf8, false),
  ])
}

pub fn models_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("model_id", DataType::Utf8, false),
    Field::new("version", DataType::Utf8, false),
    Field::new("config", DataType::Utf8, false),
    Field::new("weights", DataType::Utf8, false),
    Field::new("categories", string_list(), false),
    Field::new("created_at", utc_timestamp(), false),
    Field::new("trained_on", DataType::Utf8, true),
    Field::new("tags", string_list(), false),
    Field::new("status", DataType::Utf8, false),
    Field::new("description", DataType::Utf8, false),
  ]))
}

pub fn datasets_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("dataset_id", DataType::Utf8, false),
    Field::new(
      "examples",
      DataType::List(Arc::new(Field::new("item", DataType::Struct(example_fields()), true))),
      false,
    ),
    Field::new("size", DataType::Int64, false),
    Field::new("created_at", utc_timestamp(), false),
    Field::new("metadata", DataType::Utf8, false),
  ]))
}

pub fn predictions_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("model_id", DataType::Utf8, false),
    Field::new("version", DataType::Utf8, false),
    Field::new("input_text", DataType::Utf8, false),
    Field::new("predicted_label", DataType::Utf8, false),
    Field::new("confidence", DataType::Float64, false),
    Field::new("ground_truth", DataType::Utf8, true),
    Field::new("correct", DataType::Boolean, true),
    Field::new("latency_ms", DataType::Float64, false),
    Field::new("timestamp", utc_timestamp(), false),
    Field::new("metadata", DataType::Utf8, false),
  ]))
}

pub fn embeddings_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("collection", DataType::Utf8, false),
    Field::new("item_id", DataType::Utf8, false),
    Field::new("text", DataType::Utf8, false),
    // Variable-length on purpose: per-collection length consistency is
    // expected but not enforced at write time.
    Field::new("embedding", DataType::List(Arc::new(Field::new("item", DataType::Float32, true))), false),
    Field::new("metadata", DataType::Utf8, false),
    Field::new("created_at", utc_timestamp(), false),
  ]))
}
