//! On-demand metric aggregation over the prediction ledger
//!
//! All aggregates are computed from raw ledger rows on demand; nothing is
//! maintained incrementally. Rows are transferred and reduced client-side
//! rather than trusting opaque server-side float aggregation, which keeps
//! mixed or out-of-range values from poisoning the result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::Result;
use crate::model::PredictionLogEntry;
use crate::store::schema::PREDICTIONS_TABLE;
use crate::store::{records, sql_str, Datastore};

const SMOOTHING_EPSILON: f64 = 0.001;
const DRIFT_THRESHOLD: f64 = 0.1;

/// Half-open time window `[start, end)`; either bound may be absent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeRange {
  pub start: Option<DateTime<Utc>>,
  pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
  pub fn contains(&self, instant: DateTime<Utc>) -> bool {
    self.start.map_or(true, |start| instant >= start)
      && self.end.map_or(true, |end| instant < end)
  }
}

/// Aggregate report over a ledger slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
  /// Omitted (not zero) when no entry in range carries ground truth.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub accuracy: Option<f64>,
  pub total_predictions: u64,
  pub avg_confidence: f64,
  pub avg_latency_ms: f64,
  /// Observed labels only; labels never predicted in range are absent.
  pub predictions_per_label: BTreeMap<String, u64>,
}

/// Sparse confusion counts: `matrix[ground_truth][predicted_label]`.
pub type ConfusionMatrix = BTreeMap<String, BTreeMap<String, u64>>;

/// Result of comparing label distributions between two windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
  pub drift_detected: bool,
  pub drift_score: f64,
  pub baseline_distribution: BTreeMap<String, f64>,
  pub current_distribution: BTreeMap<String, f64>,
}

pub struct MetricsEngine {
  store: Arc<Datastore>,
}

impl MetricsEngine {
  pub fn new(store: Arc<Datastore>) -> Self {
    Self { store }
  }

  /// Aggregate accuracy, confidence, latency and label counts for a model.
  pub async fn compute_metrics(
    &self,
    model_id: &str,
    range: Option<&TimeRange>,
  ) -> Result<MetricsReport> {
    let entries = self.entries("compute_metrics", model_id, range).await?;
    Ok(summarize(&entries))
  }

  /// Sparse confusion matrix over entries carrying ground truth.
  pub async fn confusion_matrix(
    &self,
    model_id: &str,
    range: Option<&TimeRange>,
  ) -> Result<ConfusionMatrix> {
    let entries = self.entries("confusion_matrix", model_id, range).await?;

    let mut matrix = ConfusionMatrix::new();
    for entry in &entries {
      if let Some(truth) = &entry.ground_truth {
        *matrix
          .entry(truth.clone())
          .or_default()
          .entry(entry.predicted_label.clone())
          .or_default() += 1;
      }
    }
    Ok(matrix)
  }

  /// KL-divergence drift between the label distributions of two windows.
  pub async fn detect_drift(
    &self,
    model_id: &str,
    baseline: &TimeRange,
    current: &TimeRange,
  ) -> Result<DriftReport> {
    let baseline_entries = self.entries("detect_drift", model_id, Some(baseline)).await?;
    let current_entries = self.entries("detect_drift", model_id, Some(current)).await?;

    let baseline_distribution = label_distribution(&baseline_entries);
    let current_distribution = label_distribution(&current_entries);
    let drift_score = kl_divergence(&baseline_distribution, &current_distribution);

    Ok(DriftReport {
      drift_detected: drift_score > DRIFT_THRESHOLD,
      drift_score,
      baseline_distribution,
      current_distribution,
    })
  }

  /// Fetch ledger rows for a model; the window filter is applied client-side.
  async fn entries(
    &self,
    operation: &'static str,
    model_id: &str,
    range: Option<&TimeRange>,
  ) -> Result<Vec<PredictionLogEntry>> {
    let filter = format!("model_id = {}", sql_str(model_id));
    let batches = self.store.read_where(operation, PREDICTIONS_TABLE, Some(filter)).await?;

    let mut entries = records::predictions_from_batches(&batches)?;
    if let Some(range) = range {
      entries.retain(|entry| range.contains(entry.timestamp));
    }
    Ok(entries)
  }
}

fn summarize(entries: &[PredictionLogEntry]) -> MetricsReport {
  let mut predictions_per_label: BTreeMap<String, u64> = BTreeMap::new();
  for entry in entries {
    *predictions_per_label.entry(entry.predicted_label.clone()).or_default() += 1;
  }

  let graded: Vec<bool> = entries.iter().filter_map(|entry| entry.correct).collect();
  let accuracy = if graded.is_empty() {
    None
  } else {
    Some(graded.iter().filter(|correct| **correct).count() as f64 / graded.len() as f64)
  };

  MetricsReport {
    accuracy,
    total_predictions: entries.len() as u64,
    avg_confidence: finite_mean(entries.iter().map(|entry| entry.confidence)),
    avg_latency_ms: finite_mean(entries.iter().map(|entry| entry.latency_ms)),
    predictions_per_label,
  }
}

/// Arithmetic mean skipping non-finite values; 0.0 for an empty slice, never NaN.
fn finite_mean(values: impl Iterator<Item = f64>) -> f64 {
  let mut sum = 0.0;
  let mut count = 0u64;
  for value in values {
    if value.is_finite() {
      sum += value;
      count += 1;
    }
  }
  if count == 0 {
    0.0
  } else {
    sum / count as f64
  }
}

/// Normalized distribution of predicted labels; empty when no entries.
fn label_distribution(entries: &[PredictionLogEntry]) -> BTreeMap<String, f64> {
  if entries.is_empty() {
    return BTreeMap::new();
  }

  let total = entries.len() as f64;
  let mut counts: BTreeMap<String, u64> = BTreeMap::new();
  for entry in entries {
    *counts.entry(entry.predicted_label.clone()).or_default() += 1;
  }

  counts.into_iter().map(|(label, count)| (label, count as f64 / total)).collect()
}

/// KL divergence with epsilon smoothing over the union label universe.
///
/// Absent labels take probability ε = 0.001 so disjoint label sets produce a
/// large finite score instead of a division by zero.
fn kl_divergence(baseline: &BTreeMap<String, f64>, current: &BTreeMap<String, f64>) -> f64 {
  let universe: BTreeSet<&String> = baseline.keys().chain(current.keys()).collect();

  universe
    .into_iter()
    .map(|label| {
      let p = baseline.get(label).copied().unwrap_or(SMOOTHING_EPSILON);
      let q = current.get(label).copied().unwrap_or(SMOOTHING_EPSILON);
      p * (p / q).ln()
    })
    .sum()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Metadata;
  use uuid::Uuid;

  fn entry(label: &str, confidence: f64, correct: Option<bool>) -> PredictionLogEntry {
    PredictionLogEntry {
      id: Uuid::new_v4(),
      model_id: "m".into(),
      version: "v1".into(),
      input_text: "text".into(),
      predicted_label: label.into(),
      confidence,
      ground_truth: correct.map(|c| if c { label.to_string() } else { "other".to_string() }),
      correct,
      latency_ms: 4.0,
      timestamp: Utc::now(),
      metadata: Metadata::new(),
    }
  }

  #[test]
  fn summarize_empty_slice() {
    let report = summarize(&[]);
    assert_eq!(report.accuracy, None);
    assert_eq!(report.total_predictions, 0);
    assert_eq!(report.avg_confidence, 0.0);
    assert_eq!(report.avg_latency_ms, 0.0);
    assert!(report.predictions_per_label.is_empty());
  }

  #[test]
  fn summarize_mixed_entries() {
    let entries = vec![entry("pos", 0.6, Some(true)), entry("neg", 0.4, Some(false))];
    let report = summarize(&entries);
    assert_eq!(report.accuracy, Some(0.5));
    assert_eq!(report.total_predictions, 2);
    assert!((report.avg_confidence - 0.5).abs() < 1e-9);
    assert_eq!(report.predictions_per_label["pos"], 1);
    assert_eq!(report.predictions_per_label["neg"], 1);
  }

  #[test]
  fn accuracy_omitted_without_ground_truth() {
    let entries = vec![entry("pos", 0.9, None), entry("pos", 0.8, None)];
    let report = summarize(&entries);
    assert_eq!(report.accuracy, None);
    assert_eq!(report.total_predictions, 2);
  }

  #[test]
  fn non_finite_values_are_skipped_in_means() {
    let entries = vec![entry("pos", f64::NAN, None), entry("pos", 0.5, None)];
    let report = summarize(&entries);
    assert_eq!(report.avg_confidence, 0.5);
  }

  #[test]
  fn out_of_range_confidence_is_reported_faithfully() {
    let entries = vec![entry("pos", 3.0, None)];
    let report = summarize(&entries);
    assert_eq!(report.avg_confidence, 3.0);
  }

  #[test]
  fn kl_divergence_identical_distributions_is_zero() {
    let mut p = BTreeMap::new();
    p.insert("pos".to_string(), 0.5);
    p.insert("neg".to_string(), 0.5);
    let score = kl_divergence(&p, &p.clone());
    assert!(score.abs() < 1e-12);
  }

  #[test]
  fn kl_divergence_disjoint_labels_is_large() {
    let mut baseline = BTreeMap::new();
    baseline.insert("positive".to_string(), 1.0);
    let mut current = BTreeMap::new();
    current.insert("negative".to_string(), 1.0);

    let score = kl_divergence(&baseline, &current);
    assert!(score > DRIFT_THRESHOLD);
  }

  #[test]
  fn label_distribution_normalizes() {
    let entries = vec![entry("a", 0.5, None), entry("a", 0.5, None), entry("b", 0.5, None)];
    let distribution = label_distribution(&entries);
    assert!((distribution["a"] - 2.0 / 3.0).abs() < 1e-12);
    assert!((distribution["b"] - 1.0 / 3.0).abs() < 1e-12);
  }

  #[test]
  fn time_range_is_half_open() {
    let start = Utc::now();
    let end = start + chrono::Duration::seconds(10);
    let range = TimeRange { start: Some(start), end: Some(end) };

    assert!(range.contains(start));
    assert!(!range.contains(end));
    assert!(range.contains(start + chrono::Duration::seconds(5)));
  }
}
