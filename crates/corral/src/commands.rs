//! CLI command handlers for inspecting the store

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use colored::*;
use std::sync::Arc;

use crate::config::Settings;
use crate::dataset::DatasetRegistry;
use crate::metrics::{MetricsEngine, TimeRange};
use crate::registry::ModelRegistry;
use crate::store::Datastore;
use crate::vectors::VectorIndex;

fn open_store() -> Result<Arc<Datastore>> {
  let settings = Settings::from_env()?;
  Ok(Arc::new(Datastore::new(&settings)))
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|instant| instant.with_timezone(&Utc))
    .map_err(|e| anyhow!("'{raw}' is not an ISO-8601 datetime: {e}"))
}

fn parse_range(since: Option<&str>, until: Option<&str>) -> Result<Option<TimeRange>> {
  if since.is_none() && until.is_none() {
    return Ok(None);
  }
  Ok(Some(TimeRange {
    start: since.map(parse_instant).transpose()?,
    end: until.map(parse_instant).transpose()?,
  }))
}

/// List stored versions of a model, newest first
pub async fn list_versions(model_id: &str) -> Result<()> {
  let registry = ModelRegistry::new(open_store()?);
  let versions = registry.list_versions(model_id).await?;

  if versions.is_empty() {
    println!("No versions found for model: {}", model_id.yellow());
    return Ok(());
  }

  println!("{} Versions of {}", "📦".cyan(), model_id.blue().bold());
  for summary in versions {
    println!(
      "  {} {} ({}, {} categories) {}",
      summary.created_at.to_rfc3339().dimmed(),
      summary.version.bold(),
      summary.status.as_str(),
      summary.categories.len(),
      summary.description.dimmed()
    );
  }
  Ok(())
}

/// Show one model record (latest active when no version given)
pub async fn show_model(model_id: &str, version: Option<&str>) -> Result<()> {
  let registry = ModelRegistry::new(open_store()?);
  let record = registry.load(model_id, version).await?;

  println!("{} {}:{}", "📦".cyan(), record.model_id.blue().bold(), record.version.bold());
  println!("  status:      {}", record.status.as_str());
  println!("  created_at:  {}", record.created_at.to_rfc3339());
  println!("  categories:  {}", record.categories.join(", "));
  if let Some(trained_on) = &record.trained_on {
    println!("  trained_on:  {trained_on}");
  }
  if !record.tags.is_empty() {
    println!("  tags:        {}", record.tags.join(", "));
  }
  if !record.description.is_empty() {
    println!("  description: {}", record.description);
  }
  println!("  config:      {}", serde_json::to_string(&record.config)?);
  println!("  weights:     {} bytes (base64)", record.weights.len());
  Ok(())
}

/// Show a dataset snapshot
pub async fn show_dataset(dataset_id: &str) -> Result<()> {
  let registry = DatasetRegistry::new(open_store()?);
  let record = registry.load(dataset_id).await?;

  println!(
    "{} {} ({} examples, created {})",
    "🗂".cyan(),
    record.dataset_id.blue().bold(),
    record.size,
    record.created_at.to_rfc3339().dimmed()
  );
  for example in record.examples.iter().take(5) {
    println!("  [{}] {}", example.label.yellow(), example.text);
  }
  if record.size > 5 {
    println!("  … and {} more", record.size - 5);
  }
  Ok(())
}

/// Print aggregate metrics for a model
pub async fn show_metrics(model_id: &str, since: Option<&str>, until: Option<&str>) -> Result<()> {
  let engine = MetricsEngine::new(open_store()?);
  let range = parse_range(since, until)?;
  let report = engine.compute_metrics(model_id, range.as_ref()).await?;

  println!("{} Metrics for {}", "📊".cyan(), model_id.blue().bold());
  println!("  total predictions: {}", report.total_predictions);
  match report.accuracy {
    Some(accuracy) => println!("  accuracy:          {:.3}", accuracy),
    None => println!("  accuracy:          {}", "n/a (no ground truth)".dimmed()),
  }
  println!("  avg confidence:    {:.3}", report.avg_confidence);
  println!("  avg latency:       {:.2}ms", report.avg_latency_ms);
  for (label, count) in &report.predictions_per_label {
    println!("    {label}: {count}");
  }
  Ok(())
}

/// Print the confusion matrix for a model
pub async fn show_confusion(
  model_id: &str,
  since: Option<&str>,
  until: Option<&str>,
) -> Result<()> {
  let engine = MetricsEngine::new(open_store()?);
  let range = parse_range(since, until)?;
  let matrix = engine.confusion_matrix(model_id, range.as_ref()).await?;

  if matrix.is_empty() {
    println!("No graded predictions for model: {}", model_id.yellow());
    return Ok(());
  }

  println!("{} Confusion matrix for {}", "📊".cyan(), model_id.blue().bold());
  for (truth, row) in &matrix {
    for (predicted, count) in row {
      println!("  {} → {}: {}", truth.green(), predicted.yellow(), count);
    }
  }
  Ok(())
}

/// Compare label distributions between two windows
pub async fn show_drift(
  model_id: &str,
  baseline_start: &str,
  baseline_end: &str,
  current_start: &str,
  current_end: &str,
) -> Result<()> {
  let engine = MetricsEngine::new(open_store()?);
  let baseline = TimeRange {
    start: Some(parse_instant(baseline_start)?),
    end: Some(parse_instant(baseline_end)?),
  };
  let current = TimeRange {
    start: Some(parse_instant(current_start)?),
    end: Some(parse_instant(current_end)?),
  };

  let report = engine.detect_drift(model_id, &baseline, &current).await?;

  let verdict = if report.drift_detected { "DRIFT".red().bold() } else { "stable".green() };
  println!(
    "{} {} drift score {:.4} ({})",
    "📈".cyan(),
    model_id.blue().bold(),
    report.drift_score,
    verdict
  );
  for (label, share) in &report.baseline_distribution {
    let current_share = report.current_distribution.get(label).copied().unwrap_or(0.0);
    println!("  {label}: {share:.3} → {current_share:.3}");
  }
  Ok(())
}

/// Cosine top-k search over a vector collection
pub async fn search(collection: &str, vector_json: &str, top_k: usize) -> Result<()> {
  let index = VectorIndex::new(open_store()?);
  let query: Vec<f32> = serde_json::from_str(vector_json)
    .map_err(|e| anyhow!("--vector must be a JSON array of numbers: {e}"))?;

  let hits = index.search_similar(collection, &query, top_k).await?;

  if hits.is_empty() {
    println!("No matches in collection: {}", collection.yellow());
    return Ok(());
  }

  for hit in hits {
    println!("{} {} {}", format!("{:.4}", hit.similarity).green(), hit.item_id.bold(), hit.text);
  }
  Ok(())
}
