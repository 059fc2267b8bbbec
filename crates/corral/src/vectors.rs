//! Named vector collections with cosine top-k retrieval
//!
//! Similarity is computed exactly, over every record in the collection,
//! so results are deterministic and reproducible in tests.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{CorralError, Result};
use crate::model::{EmbeddingRecord, Metadata};
use crate::store::schema::EMBEDDINGS_TABLE;
use crate::store::{records, sql_str, Datastore};

/// One item of an insert batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingInput {
  pub item_id: String,
  pub text: String,
  pub embedding: Vec<f32>,
  #[serde(default)]
  pub metadata: Metadata,
}

/// One similarity search hit, descending by similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
  pub item_id: String,
  pub text: String,
  pub similarity: f32,
  pub metadata: Metadata,
}

pub struct VectorIndex {
  store: Arc<Datastore>,
}

impl VectorIndex {
  pub fn new(store: Arc<Datastore>) -> Self {
    Self { store }
  }

  /// Insert a batch into a collection; returns the number of rows written.
  ///
  /// Upsert semantics: existing `(collection, item_id)` rows are replaced,
  /// and a duplicate id within the batch keeps its last occurrence, so
  /// re-indexing the same items is idempotent.
  pub async fn insert_many(&self, collection: &str, items: Vec<EmbeddingInput>) -> Result<usize> {
    if collection.is_empty() {
      return Err(CorralError::Validation("collection name must be non-empty".into()));
    }
    if items.is_empty() {
      return Ok(0);
    }
    if items.iter().any(|item| item.item_id.is_empty()) {
      return Err(CorralError::Validation("item_id must be non-empty".into()));
    }

    let items = last_occurrence_wins(items);
    self.delete_existing(collection, &items).await?;

    let created_at = Utc::now();
    let rows: Vec<EmbeddingRecord> = items
      .into_iter()
      .map(|item| EmbeddingRecord {
        collection: collection.to_string(),
        item_id: item.item_id,
        text: item.text,
        embedding: item.embedding,
        metadata: item.metadata,
        created_at,
      })
      .collect();

    let count = rows.len();
    let batch = records::embeddings_to_batch(&rows)?;
    self.store.append("insert_embeddings", EMBEDDINGS_TABLE, batch).await?;

    info!(collection, count, "inserted embeddings");
    Ok(count)
  }

  async fn delete_existing(&self, collection: &str, items: &[EmbeddingInput]) -> Result<()> {
    let ids =
      items.iter().map(|item| sql_str(&item.item_id)).collect::<Vec<_>>().join(", ");
    let filter = format!("collection = {} AND item_id IN ({})", sql_str(collection), ids);
    self.store.delete_where("insert_embeddings", EMBEDDINGS_TABLE, &filter).await
  }

  /// Exact cosine top-k over every record in the collection.
  ///
  /// Ties break by insertion time ascending so results are deterministic.
  pub async fn search_similar(
    &self,
    collection: &str,
    query: &[f32],
    top_k: usize,
  ) -> Result<Vec<SearchHit>> {
    let filter = format!("collection = {}", sql_str(collection));
    let batches =
      self.store.read_where("search_similar", EMBEDDINGS_TABLE, Some(filter)).await?;
    let rows = records::embeddings_from_batches(&batches)?;

    let mut scored: Vec<(f32, EmbeddingRecord)> = rows
      .into_iter()
      .map(|row| (cosine_similarity(query, &row.embedding), row))
      .collect();

    scored.sort_by(|(sim_a, row_a), (sim_b, row_b)| {
      sim_b
        .partial_cmp(sim_a)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| row_a.created_at.cmp(&row_b.created_at))
    });
    scored.truncate(top_k);

    Ok(
      scored
        .into_iter()
        .map(|(similarity, row)| SearchHit {
          item_id: row.item_id,
          text: row.text,
          similarity,
          metadata: row.metadata,
        })
        .collect(),
    )
  }
}

/// Keep the last occurrence of each id, preserving first-seen order.
fn last_occurrence_wins(items: Vec<EmbeddingInput>) -> Vec<EmbeddingInput> {
  let mut positions: BTreeMap<String, usize> = BTreeMap::new();
  let mut deduped: Vec<Option<EmbeddingInput>> = Vec::with_capacity(items.len());

  for item in items {
    match positions.get(&item.item_id) {
      Some(&index) => deduped[index] = Some(item),
      None => {
        positions.insert(item.item_id.clone(), deduped.len());
        deduped.push(Some(item));
      }
    }
  }

  deduped.into_iter().flatten().collect()
}

/// Calculate cosine similarity between two embeddings
///
/// Zero vectors and length mismatches score 0.0 rather than erroring, to
/// keep the search operation total.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() {
    return 0.0;
  }

  let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
  let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

  if magnitude_a == 0.0 || magnitude_b == 0.0 {
    0.0
  } else {
    dot_product / (magnitude_a * magnitude_b)
  }
}
