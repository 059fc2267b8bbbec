//! Integration tests for the vector index

use std::sync::Arc;

use corral::config::Settings;
use corral::model::Metadata;
use corral::store::Datastore;
use corral::vectors::{EmbeddingInput, VectorIndex};
use serde_json::json;
use tempfile::TempDir;

fn temp_store() -> (TempDir, Arc<Datastore>) {
  let temp = TempDir::new().unwrap();
  let settings = Settings::with_data_dir(temp.path().to_path_buf());
  (temp, Arc::new(Datastore::new(&settings)))
}

fn item(item_id: &str, text: &str, embedding: Vec<f32>) -> EmbeddingInput {
  EmbeddingInput {
    item_id: item_id.to_string(),
    text: text.to_string(),
    embedding,
    metadata: Metadata::new(),
  }
}

#[tokio::test]
async fn search_returns_ranked_hits() {
  let (_temp, store) = temp_store();
  let index = VectorIndex::new(store);

  index
    .insert_many(
      "docs",
      vec![
        item("a", "east", vec![1.0, 0.0]),
        item("b", "north", vec![0.0, 1.0]),
        item("c", "mostly east", vec![0.9, 0.1]),
      ],
    )
    .await
    .unwrap();

  let hits = index.search_similar("docs", &[1.0, 0.0], 2).await.unwrap();
  assert_eq!(hits.len(), 2);
  assert_eq!(hits[0].item_id, "a");
  assert!((hits[0].similarity - 1.0).abs() < 1e-5);
  assert_eq!(hits[1].item_id, "c");
  assert!((hits[1].similarity - 0.9939).abs() < 1e-3);
}

#[tokio::test]
async fn insert_many_returns_written_count() {
  let (_temp, store) = temp_store();
  let index = VectorIndex::new(store);

  let count = index
    .insert_many("docs", vec![item("a", "one", vec![1.0]), item("b", "two", vec![0.5])])
    .await
    .unwrap();
  assert_eq!(count, 2);
}

#[tokio::test]
async fn empty_batch_writes_nothing() {
  let (_temp, store) = temp_store();
  let index = VectorIndex::new(store);

  let count = index.insert_many("docs", vec![]).await.unwrap();
  assert_eq!(count, 0);

  let hits = index.search_similar("docs", &[1.0], 10).await.unwrap();
  assert!(hits.is_empty());
}

#[tokio::test]
async fn reinserting_an_id_replaces_the_row() {
  let (_temp, store) = temp_store();
  let index = VectorIndex::new(store);

  index
    .insert_many("docs", vec![item("a", "old text", vec![1.0, 0.0]), item("b", "keep", vec![0.0, 1.0])])
    .await
    .unwrap();
  index.insert_many("docs", vec![item("a", "new text", vec![1.0, 0.0])]).await.unwrap();

  let hits = index.search_similar("docs", &[1.0, 0.0], 10).await.unwrap();
  assert_eq!(hits.len(), 2);
  assert_eq!(hits[0].item_id, "a");
  assert_eq!(hits[0].text, "new text");
}

#[tokio::test]
async fn duplicate_ids_in_one_batch_keep_the_last() {
  let (_temp, store) = temp_store();
  let index = VectorIndex::new(store);

  let count = index
    .insert_many(
      "docs",
      vec![item("a", "first", vec![1.0]), item("a", "second", vec![1.0])],
    )
    .await
    .unwrap();
  assert_eq!(count, 1);

  let hits = index.search_similar("docs", &[1.0], 10).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].text, "second");
}

#[tokio::test]
async fn collections_are_isolated() {
  let (_temp, store) = temp_store();
  let index = VectorIndex::new(store);

  index.insert_many("first", vec![item("a", "in first", vec![1.0, 0.0])]).await.unwrap();
  index.insert_many("second", vec![item("a", "in second", vec![1.0, 0.0])]).await.unwrap();

  let hits = index.search_similar("first", &[1.0, 0.0], 10).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].text, "in first");
}

#[tokio::test]
async fn equal_scores_break_ties_by_insertion_time() {
  let (_temp, store) = temp_store();
  let index = VectorIndex::new(store);

  // Same vector inserted in separate calls, so creation times differ
  index.insert_many("docs", vec![item("earlier", "one", vec![1.0, 0.0])]).await.unwrap();
  index.insert_many("docs", vec![item("later", "two", vec![1.0, 0.0])]).await.unwrap();

  let hits = index.search_similar("docs", &[1.0, 0.0], 10).await.unwrap();
  assert_eq!(hits.len(), 2);
  assert_eq!(hits[0].item_id, "earlier");
  assert_eq!(hits[1].item_id, "later");
}

#[tokio::test]
async fn zero_query_vector_scores_all_rows_zero() {
  let (_temp, store) = temp_store();
  let index = VectorIndex::new(store);

  index
    .insert_many("docs", vec![item("a", "one", vec![1.0, 0.0]), item("b", "two", vec![0.0, 1.0])])
    .await
    .unwrap();

  let hits = index.search_similar("docs", &[0.0, 0.0], 10).await.unwrap();
  assert_eq!(hits.len(), 2);
  assert!(hits.iter().all(|hit| hit.similarity == 0.0));
}

#[tokio::test]
async fn metadata_round_trips() {
  let (_temp, store) = temp_store();
  let index = VectorIndex::new(store);

  let mut metadata = Metadata::new();
  metadata.insert("source".to_string(), json!("wiki"));

  let mut input = item("a", "annotated", vec![1.0]);
  input.metadata = metadata.clone();
  index.insert_many("docs", vec![input]).await.unwrap();

  let hits = index.search_similar("docs", &[1.0], 1).await.unwrap();
  assert_eq!(hits[0].metadata, metadata);
}

#[tokio::test]
async fn top_k_zero_returns_nothing() {
  let (_temp, store) = temp_store();
  let index = VectorIndex::new(store);

  index.insert_many("docs", vec![item("a", "one", vec![1.0])]).await.unwrap();

  let hits = index.search_similar("docs", &[1.0], 0).await.unwrap();
  assert!(hits.is_empty());
}
