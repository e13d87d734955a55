//! End-to-end pipeline: baskets, similarity, clustering, recommendations
//!
//! [`run_pipeline`] threads immutable stage results through in one call.
//! [`Pipeline`] keeps the latest result of each stage for step-by-step use
//! and refuses out-of-order calls.

use crate::basket::{build_baskets, BasketMatrix, BasketStatistics};
use crate::cluster::{
    cluster_products, ClusterCountStrategy, ClusterParams, ClusterStatistics, Clustering, Linkage,
};
use crate::data::{ProductCatalog, TransactionRecord};
use crate::error::SlottingError;
use crate::recommend::{
    generate_and_save, generate_recommendations, RecommendParams, Recommendation,
    RecommendationSink,
};
use crate::similarity::{compute_similarity, Metric, SimilarityMatrix, SimilarityStatistics};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Every tunable of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum number of orders a product must appear in
    pub min_support: usize,
    pub metric: Metric,
    pub linkage: Linkage,
    pub n_clusters: Option<usize>,
    pub distance_threshold: Option<f64>,
    pub max_cluster_size: Option<usize>,
    pub strategy: ClusterCountStrategy,
    pub top_n: usize,
    pub min_recommend_size: usize,
    pub max_recommend_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let recommend = RecommendParams::default();
        Self {
            min_support: 10,
            metric: Metric::default(),
            linkage: Linkage::default(),
            n_clusters: None,
            distance_threshold: None,
            max_cluster_size: None,
            strategy: ClusterCountStrategy::default(),
            top_n: recommend.top_n,
            min_recommend_size: recommend.min_cluster_size,
            max_recommend_size: recommend.max_cluster_size,
        }
    }
}

impl PipelineConfig {
    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            n_clusters: self.n_clusters,
            linkage: self.linkage,
            distance_threshold: self.distance_threshold,
            max_cluster_size: self.max_cluster_size,
            strategy: self.strategy,
        }
    }

    pub fn recommend_params(&self) -> RecommendParams {
        RecommendParams {
            top_n: self.top_n,
            min_cluster_size: self.min_recommend_size,
            max_cluster_size: self.max_recommend_size,
        }
    }
}

/// All stage results of one run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub baskets: BasketMatrix,
    pub similarity: SimilarityMatrix,
    pub clustering: Clustering,
    pub recommendations: Vec<Recommendation>,
}

/// Run every stage on one snapshot of transactions
pub fn run_pipeline(
    records: &[TransactionRecord],
    catalog: &ProductCatalog,
    config: &PipelineConfig,
) -> crate::Result<PipelineOutput> {
    let baskets = build_baskets(records, config.min_support)?;
    let similarity = compute_similarity(&baskets, config.metric);
    let clustering = cluster_products(&similarity, catalog, &config.cluster_params())?;
    let recommendations =
        generate_recommendations(&clustering, &similarity, catalog, &config.recommend_params())?;

    Ok(PipelineOutput {
        baskets,
        similarity,
        clustering,
        recommendations,
    })
}

/// Which stages have run, with their statistics
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub total_records: usize,
    pub unique_products: usize,
    pub baskets_created: bool,
    pub similarity_calculated: bool,
    pub clustering_performed: bool,
    pub basket_statistics: Option<BasketStatistics>,
    pub similarity_statistics: Option<SimilarityStatistics>,
    pub cluster_statistics: Option<ClusterStatistics>,
}

/// Step-by-step session over one transaction snapshot.
///
/// Rerunning a stage discards every later stage's result.
#[derive(Debug)]
pub struct Pipeline {
    records: Vec<TransactionRecord>,
    catalog: ProductCatalog,
    config: PipelineConfig,
    baskets: Option<BasketMatrix>,
    similarity: Option<SimilarityMatrix>,
    clustering: Option<Clustering>,
}

impl Pipeline {
    pub fn new(
        records: Vec<TransactionRecord>,
        catalog: ProductCatalog,
        config: PipelineConfig,
    ) -> Self {
        Self {
            records,
            catalog,
            config,
            baskets: None,
            similarity: None,
            clustering: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn build_baskets(&mut self) -> crate::Result<&BasketMatrix> {
        let baskets = build_baskets(&self.records, self.config.min_support)?;
        self.similarity = None;
        self.clustering = None;
        Ok(self.baskets.insert(baskets))
    }

    pub fn compute_similarity(&mut self) -> crate::Result<&SimilarityMatrix> {
        let baskets = self.basket_matrix_for("compute_similarity")?;
        let similarity = compute_similarity(baskets, self.config.metric);
        self.clustering = None;
        Ok(self.similarity.insert(similarity))
    }

    pub fn cluster(&mut self) -> crate::Result<&Clustering> {
        let similarity = self.similarity_for("cluster")?;
        let clustering =
            cluster_products(similarity, &self.catalog, &self.config.cluster_params())?;
        Ok(self.clustering.insert(clustering))
    }

    /// Score the current clustering, passing the top-n slice to `sink` if given
    pub fn recommend(
        &self,
        sink: Option<&mut dyn RecommendationSink>,
    ) -> crate::Result<Vec<Recommendation>> {
        let clustering = self.clustering_for("recommend")?;
        let similarity = self.similarity_for("recommend")?;
        let params = self.config.recommend_params();
        match sink {
            Some(sink) => generate_and_save(clustering, similarity, &self.catalog, &params, sink),
            None => {
                info!("Skipping recommendation save (no sink configured)");
                generate_recommendations(clustering, similarity, &self.catalog, &params)
            }
        }
    }

    pub fn basket_matrix(&self) -> crate::Result<&BasketMatrix> {
        self.basket_matrix_for("basket_matrix")
    }

    pub fn similarity(&self) -> crate::Result<&SimilarityMatrix> {
        self.similarity_for("similarity")
    }

    pub fn clustering(&self) -> crate::Result<&Clustering> {
        self.clustering_for("clustering")
    }

    pub fn cluster_coherence(&self, cluster_id: usize) -> crate::Result<f64> {
        let clustering = self.clustering_for("cluster_coherence")?;
        let similarity = self.similarity_for("cluster_coherence")?;
        Ok(clustering.coherence(cluster_id, similarity))
    }

    pub fn cluster_statistics(&self) -> crate::Result<ClusterStatistics> {
        Ok(self.clustering_for("cluster_statistics")?.statistics())
    }

    pub fn summary(&self) -> PipelineSummary {
        let unique_products = self
            .records
            .iter()
            .map(|r| r.product_id.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();

        PipelineSummary {
            total_records: self.records.len(),
            unique_products,
            baskets_created: self.baskets.is_some(),
            similarity_calculated: self.similarity.is_some(),
            clustering_performed: self.clustering.is_some(),
            basket_statistics: self.baskets.as_ref().map(BasketMatrix::statistics),
            similarity_statistics: self.similarity.as_ref().map(SimilarityMatrix::statistics),
            cluster_statistics: self.clustering.as_ref().map(Clustering::statistics),
        }
    }

    fn basket_matrix_for(&self, stage: &'static str) -> crate::Result<&BasketMatrix> {
        self.baskets.as_ref().ok_or(SlottingError::Precondition {
            stage,
            required: "build_baskets",
        })
    }

    fn similarity_for(&self, stage: &'static str) -> crate::Result<&SimilarityMatrix> {
        self.similarity.as_ref().ok_or(SlottingError::Precondition {
            stage,
            required: "compute_similarity",
        })
    }

    fn clustering_for(&self, stage: &'static str) -> crate::Result<&Clustering> {
        self.clustering.as_ref().ok_or(SlottingError::Precondition {
            stage,
            required: "cluster",
        })
    }
}
