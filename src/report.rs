//! Recommendation sinks: JSON report on disk and an in-memory collector

use crate::pipeline::PipelineConfig;
use crate::recommend::{Recommendation, RecommendationSink, RecommendationSummary};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Document written by [`JsonReportSink`]
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationReport {
    pub generated_at: DateTime<Utc>,
    pub config: PipelineConfig,
    pub summary: Option<RecommendationSummary>,
    pub recommendations: Vec<Recommendation>,
}

impl RecommendationReport {
    pub fn new(config: PipelineConfig, recommendations: &[Recommendation]) -> Self {
        Self {
            generated_at: Utc::now(),
            config,
            summary: RecommendationSummary::from_recommendations(recommendations),
            recommendations: recommendations.to_vec(),
        }
    }
}

/// Writes each saved batch as a pretty-printed JSON report, replacing the file
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    path: PathBuf,
    config: PipelineConfig,
}

impl JsonReportSink {
    pub fn new(path: impl AsRef<Path>, config: PipelineConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecommendationSink for JsonReportSink {
    fn save(&mut self, recommendations: &[Recommendation]) -> anyhow::Result<()> {
        let report = RecommendationReport::new(self.config.clone(), recommendations);

        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create report {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &report)
            .context("Failed to serialize recommendation report")?;
        writer.flush()?;

        info!(
            "Wrote {} recommendations to {}",
            recommendations.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Keeps every saved batch in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Vec<Vec<Recommendation>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> &[Vec<Recommendation>] {
        &self.batches
    }

    /// Most recently saved batch
    pub fn latest(&self) -> Option<&[Recommendation]> {
        self.batches.last().map(Vec::as_slice)
    }
}

impl RecommendationSink for MemorySink {
    fn save(&mut self, recommendations: &[Recommendation]) -> anyhow::Result<()> {
        self.batches.push(recommendations.to_vec());
        Ok(())
    }
}
