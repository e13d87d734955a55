//! SlotForge: warehouse slotting recommendations from market basket clustering
//!
//! Orders are turned into a binary basket matrix, products are compared by
//! co-purchase similarity, grouped with agglomerative clustering, and the
//! strongest clusters are ranked as co-placement recommendations.

pub mod basket;
pub mod cli;
pub mod cluster;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod recommend;
pub mod report;
pub mod similarity;
pub mod viz;

// Re-export public items for easier access
pub use basket::{build_baskets, BasketMatrix};
pub use cli::Args;
pub use cluster::{cluster_products, ClusterParams, Clustering, Linkage};
pub use data::{load_transactions, ProductCatalog, TransactionData, TransactionRecord};
pub use error::SlottingError;
pub use pipeline::{run_pipeline, Pipeline, PipelineConfig, PipelineOutput};
pub use recommend::{generate_recommendations, Recommendation, RecommendationSink};
pub use report::{JsonReportSink, MemorySink};
pub use similarity::{compute_similarity, Metric, SimilarityMatrix};

/// Result type of the pipeline stages
pub type Result<T> = std::result::Result<T, SlottingError>;

/// Result type for I/O-bound edges (CSV loading, reports, plots)
pub type AnyResult<T> = anyhow::Result<T>;
