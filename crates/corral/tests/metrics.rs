//! Integration tests for the metrics engine over the prediction ledger

use std::sync::Arc;

use chrono::{DateTime, Utc};
use corral::config::Settings;
use corral::ledger::{AppendPredictionRequest, PredictionLedger};
use corral::metrics::{MetricsEngine, TimeRange};
use corral::model::Metadata;
use corral::store::Datastore;
use tempfile::TempDir;

fn temp_store() -> (TempDir, Arc<Datastore>) {
  let temp = TempDir::new().unwrap();
  let settings = Settings::with_data_dir(temp.path().to_path_buf());
  (temp, Arc::new(Datastore::new(&settings)))
}

fn instant(raw: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

fn request(
  predicted: &str,
  confidence: f64,
  ground_truth: Option<&str>,
  timestamp: Option<&str>,
) -> AppendPredictionRequest {
  AppendPredictionRequest {
    model_id: "sentiment".to_string(),
    version: "v1".to_string(),
    input_text: "some input".to_string(),
    predicted_label: predicted.to_string(),
    confidence,
    ground_truth: ground_truth.map(str::to_string),
    latency_ms: 4.0,
    timestamp: timestamp.map(instant),
    metadata: Metadata::new(),
  }
}

#[tokio::test]
async fn empty_ledger_yields_zero_report() {
  let (_temp, store) = temp_store();
  let engine = MetricsEngine::new(store);

  let report = engine.compute_metrics("sentiment", None).await.unwrap();
  assert_eq!(report.total_predictions, 0);
  assert_eq!(report.accuracy, None);
  assert_eq!(report.avg_confidence, 0.0);
  assert_eq!(report.avg_latency_ms, 0.0);
  assert!(report.predictions_per_label.is_empty());
}

#[tokio::test]
async fn accuracy_and_confidence_over_graded_entries() {
  let (_temp, store) = temp_store();
  let ledger = PredictionLedger::new(store.clone());
  let engine = MetricsEngine::new(store);

  // predicted == truth, then predicted != truth
  ledger.append(request("positive", 0.6, Some("positive"), None)).await.unwrap();
  ledger.append(request("positive", 0.4, Some("negative"), None)).await.unwrap();

  let report = engine.compute_metrics("sentiment", None).await.unwrap();
  assert_eq!(report.total_predictions, 2);
  assert_eq!(report.accuracy, Some(0.5));
  assert!((report.avg_confidence - 0.5).abs() < 1e-9);
  assert!((report.avg_latency_ms - 4.0).abs() < 1e-9);
}

#[tokio::test]
async fn accuracy_is_omitted_without_ground_truth() {
  let (_temp, store) = temp_store();
  let ledger = PredictionLedger::new(store.clone());
  let engine = MetricsEngine::new(store);

  ledger.append(request("positive", 0.9, None, None)).await.unwrap();
  ledger.append(request("negative", 0.7, None, None)).await.unwrap();

  let report = engine.compute_metrics("sentiment", None).await.unwrap();
  assert_eq!(report.total_predictions, 2);
  assert_eq!(report.accuracy, None);
  assert!((report.avg_confidence - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn per_label_counts_list_observed_labels_only() {
  let (_temp, store) = temp_store();
  let ledger = PredictionLedger::new(store.clone());
  let engine = MetricsEngine::new(store);

  ledger.append(request("positive", 0.9, None, None)).await.unwrap();
  ledger.append(request("positive", 0.8, None, None)).await.unwrap();
  ledger.append(request("neutral", 0.5, None, None)).await.unwrap();

  let report = engine.compute_metrics("sentiment", None).await.unwrap();
  assert_eq!(report.predictions_per_label.len(), 2);
  assert_eq!(report.predictions_per_label["positive"], 2);
  assert_eq!(report.predictions_per_label["neutral"], 1);
}

#[tokio::test]
async fn models_are_isolated() {
  let (_temp, store) = temp_store();
  let ledger = PredictionLedger::new(store.clone());
  let engine = MetricsEngine::new(store);

  ledger.append(request("positive", 0.9, None, None)).await.unwrap();

  let mut other = request("positive", 0.9, None, None);
  other.model_id = "other-model".to_string();
  ledger.append(other).await.unwrap();

  let report = engine.compute_metrics("sentiment", None).await.unwrap();
  assert_eq!(report.total_predictions, 1);
}

#[tokio::test]
async fn time_window_filters_entries() {
  let (_temp, store) = temp_store();
  let ledger = PredictionLedger::new(store.clone());
  let engine = MetricsEngine::new(store);

  ledger
    .append(request("positive", 0.9, None, Some("2026-01-10T00:00:00Z")))
    .await
    .unwrap();
  ledger
    .append(request("negative", 0.2, None, Some("2026-02-10T00:00:00Z")))
    .await
    .unwrap();

  let january = TimeRange {
    start: Some(instant("2026-01-01T00:00:00Z")),
    end: Some(instant("2026-02-01T00:00:00Z")),
  };
  let report = engine.compute_metrics("sentiment", Some(&january)).await.unwrap();
  assert_eq!(report.total_predictions, 1);
  assert!((report.avg_confidence - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn confusion_matrix_counts_graded_entries_only() {
  let (_temp, store) = temp_store();
  let ledger = PredictionLedger::new(store.clone());
  let engine = MetricsEngine::new(store);

  ledger.append(request("positive", 0.9, Some("positive"), None)).await.unwrap();
  ledger.append(request("positive", 0.8, Some("negative"), None)).await.unwrap();
  ledger.append(request("negative", 0.7, Some("negative"), None)).await.unwrap();
  ledger.append(request("neutral", 0.6, None, None)).await.unwrap();

  let matrix = engine.confusion_matrix("sentiment", None).await.unwrap();
  assert_eq!(matrix["positive"]["positive"], 1);
  assert_eq!(matrix["negative"]["positive"], 1);
  assert_eq!(matrix["negative"]["negative"], 1);
  // The ungraded entry contributes nothing
  assert!(!matrix.contains_key("neutral"));
}

#[tokio::test]
async fn drift_is_flat_for_identical_distributions() {
  let (_temp, store) = temp_store();
  let ledger = PredictionLedger::new(store.clone());
  let engine = MetricsEngine::new(store);

  for timestamp in ["2026-01-10T00:00:00Z", "2026-02-10T00:00:00Z"] {
    ledger.append(request("positive", 0.9, None, Some(timestamp))).await.unwrap();
    ledger.append(request("negative", 0.9, None, Some(timestamp))).await.unwrap();
  }

  let baseline = TimeRange {
    start: Some(instant("2026-01-01T00:00:00Z")),
    end: Some(instant("2026-02-01T00:00:00Z")),
  };
  let current = TimeRange {
    start: Some(instant("2026-02-01T00:00:00Z")),
    end: Some(instant("2026-03-01T00:00:00Z")),
  };

  let report = engine.detect_drift("sentiment", &baseline, &current).await.unwrap();
  assert!(report.drift_score.abs() < 1e-9);
  assert!(!report.drift_detected);
  assert_eq!(report.baseline_distribution, report.current_distribution);
}

#[tokio::test]
async fn drift_flags_disjoint_label_sets() {
  let (_temp, store) = temp_store();
  let ledger = PredictionLedger::new(store.clone());
  let engine = MetricsEngine::new(store);

  ledger.append(request("positive", 0.9, None, Some("2026-01-10T00:00:00Z"))).await.unwrap();
  ledger.append(request("negative", 0.9, None, Some("2026-02-10T00:00:00Z"))).await.unwrap();

  let baseline = TimeRange {
    start: Some(instant("2026-01-01T00:00:00Z")),
    end: Some(instant("2026-02-01T00:00:00Z")),
  };
  let current = TimeRange {
    start: Some(instant("2026-02-01T00:00:00Z")),
    end: Some(instant("2026-03-01T00:00:00Z")),
  };

  let report = engine.detect_drift("sentiment", &baseline, &current).await.unwrap();
  assert!(report.drift_score > 0.1);
  assert!(report.drift_detected);
  assert_eq!(report.baseline_distribution["positive"], 1.0);
  assert_eq!(report.current_distribution["negative"], 1.0);
}

#[tokio::test]
async fn out_of_range_confidence_does_not_crash_aggregation() {
  let (_temp, store) = temp_store();
  let ledger = PredictionLedger::new(store.clone());
  let engine = MetricsEngine::new(store);

  // Garbage in, garbage out: the ledger does not validate the range
  ledger.append(request("positive", 17.0, None, None)).await.unwrap();

  let report = engine.compute_metrics("sentiment", None).await.unwrap();
  assert_eq!(report.total_predictions, 1);
  assert_eq!(report.avg_confidence, 17.0);
}
