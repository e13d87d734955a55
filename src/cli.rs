//! Command-line interface definitions and argument parsing

use crate::cluster::{ClusterCountStrategy, Linkage};
use crate::error::SlottingError;
use crate::pipeline::PipelineConfig;
use crate::similarity::Metric;
use clap::Parser;

/// Warehouse slotting recommendations from market basket clustering
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file (Online Retail layout)
    #[arg(short, long, default_value = "data.csv")]
    pub input: String,

    /// Minimum number of orders a product must appear in
    #[arg(long, default_value = "10")]
    pub min_support: usize,

    /// Similarity metric: jaccard, cosine or lift
    #[arg(short, long, default_value = "jaccard")]
    pub metric: String,

    /// Linkage criterion: complete, average or single
    #[arg(short, long, default_value = "complete")]
    pub linkage: String,

    /// Fixed number of clusters
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Stop merging once the closest clusters are this far apart
    #[arg(long)]
    pub distance_threshold: Option<f64>,

    /// Flag clusters larger than this size
    #[arg(long)]
    pub max_cluster_size: Option<usize>,

    /// Pick the cluster count by silhouette search instead of the size heuristic
    #[arg(long)]
    pub silhouette: bool,

    /// Largest cluster count tried by the silhouette search
    #[arg(long, default_value = "20")]
    pub max_k: usize,

    /// Number of recommendations to return
    #[arg(short = 'n', long, default_value = "10")]
    pub top_n: usize,

    /// Smallest cluster size eligible for a recommendation
    #[arg(long, default_value = "2")]
    pub min_size: usize,

    /// Largest cluster size eligible for a recommendation
    #[arg(long, default_value = "100")]
    pub max_size: usize,

    /// Output path for the JSON recommendation report
    #[arg(short, long, default_value = "recommendations.json")]
    pub output: String,

    /// Output path for the similarity heatmap; no plots without it
    #[arg(short, long)]
    pub plot: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Validate the textual options and build the pipeline configuration
    pub fn to_config(&self) -> crate::Result<PipelineConfig> {
        let metric: Metric = self.metric.parse()?;
        let linkage: Linkage = self.linkage.parse()?;

        let strategy = if self.silhouette {
            if self.max_k < 2 {
                return Err(SlottingError::InvalidParameter(format!(
                    "max_k must be at least 2, got {}",
                    self.max_k
                )));
            }
            ClusterCountStrategy::Silhouette {
                max_clusters: self.max_k,
            }
        } else {
            ClusterCountStrategy::Heuristic
        };

        if self.min_size > self.max_size {
            return Err(SlottingError::InvalidParameter(format!(
                "min_size ({}) exceeds max_size ({})",
                self.min_size, self.max_size
            )));
        }

        Ok(PipelineConfig {
            min_support: self.min_support,
            metric,
            linkage,
            n_clusters: self.clusters,
            distance_threshold: self.distance_threshold,
            max_cluster_size: self.max_cluster_size,
            strategy,
            top_n: self.top_n,
            min_recommend_size: self.min_size,
            max_recommend_size: self.max_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_config() {
        let mut args = Args::parse_from(["slotforge", "--metric", "cosine", "-k", "5"]);

        let config = args.to_config().unwrap();
        assert_eq!(config.metric, Metric::Cosine);
        assert_eq!(config.linkage, Linkage::Complete);
        assert_eq!(config.n_clusters, Some(5));
        assert_eq!(config.min_support, 10);
        assert_eq!(config.top_n, 10);
        assert_eq!(config.strategy, ClusterCountStrategy::Heuristic);

        args.silhouette = true;
        args.max_k = 8;
        assert_eq!(
            args.to_config().unwrap().strategy,
            ClusterCountStrategy::Silhouette { max_clusters: 8 }
        );

        args.metric = "euclidean".to_string();
        assert!(matches!(
            args.to_config(),
            Err(SlottingError::InvalidMetric(_))
        ));
    }

    #[test]
    fn test_invalid_options() {
        let args = Args::parse_from(["slotforge", "--linkage", "ward"]);
        assert!(matches!(
            args.to_config(),
            Err(SlottingError::InvalidLinkage(_))
        ));

        let args = Args::parse_from(["slotforge", "--min-size", "5", "--max-size", "3"]);
        assert!(args.to_config().is_err());

        let args = Args::parse_from(["slotforge", "--silhouette", "--max-k", "1"]);
        assert!(args.to_config().is_err());
    }
}
