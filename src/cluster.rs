//! Agglomerative hierarchical clustering of products
//!
//! Clusters run over the precomputed distance matrix `1 - similarity`. The
//! number of clusters is either given, implied by a distance threshold, or
//! chosen by a [`ClusterCountSelector`].

use crate::data::{ProductCatalog, ProductSummary};
use crate::error::SlottingError;
use crate::similarity::SimilarityMatrix;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Rule for measuring distance between two clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Farthest pair of members
    #[default]
    Complete,
    /// Mean over all member pairs
    Average,
    /// Nearest pair of members
    Single,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Linkage::Complete => "complete",
            Linkage::Average => "average",
            Linkage::Single => "single",
        })
    }
}

impl FromStr for Linkage {
    type Err = SlottingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(Linkage::Complete),
            "average" => Ok(Linkage::Average),
            "single" => Ok(Linkage::Single),
            _ => Err(SlottingError::InvalidLinkage(s.to_string())),
        }
    }
}

/// When the agglomeration stops merging
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopRule {
    /// Stop once this many clusters remain
    Clusters(usize),
    /// Stop once the closest pair is at least this far apart
    Threshold(f64),
}

/// Chooses a cluster count for a distance matrix
pub trait ClusterCountSelector {
    fn select(&self, distances: &Array2<f64>, linkage: Linkage) -> usize;
}

/// Coarse lookup on the number of products
#[derive(Debug, Clone, Copy, Default)]
pub struct PracticalHeuristic;

impl ClusterCountSelector for PracticalHeuristic {
    fn select(&self, distances: &Array2<f64>, _linkage: Linkage) -> usize {
        let n = distances.nrows();
        let k = heuristic_cluster_count(n);
        info!("Using practical cluster count: {} clusters for {} products", k, n);
        k
    }
}

/// Exhaustive search over k maximising the silhouette coefficient
#[derive(Debug, Clone, Copy)]
pub struct SilhouetteSearch {
    pub max_clusters: usize,
}

impl ClusterCountSelector for SilhouetteSearch {
    fn select(&self, distances: &Array2<f64>, linkage: Linkage) -> usize {
        let n = distances.nrows();
        if n < 3 {
            return n.max(1);
        }

        let upper = self.max_clusters.min(n - 1);
        let dendrogram = Dendrogram::build(distances, linkage);
        let mut best: Option<(usize, f64)> = None;
        for k in 2..=upper {
            let labels = dendrogram.cut(StopRule::Clusters(k));
            let score = silhouette_score(distances, &labels);
            debug!("k={} silhouette={:.4}", k, score);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((k, score));
            }
        }

        match best {
            Some((k, score)) => {
                info!("Optimal number of clusters: {} (silhouette score: {:.3})", k, score);
                k
            }
            None => 2,
        }
    }
}

/// Serializable choice between the count selectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClusterCountStrategy {
    #[default]
    Heuristic,
    Silhouette { max_clusters: usize },
}

impl ClusterCountSelector for ClusterCountStrategy {
    fn select(&self, distances: &Array2<f64>, linkage: Linkage) -> usize {
        match *self {
            ClusterCountStrategy::Heuristic => PracticalHeuristic.select(distances, linkage),
            ClusterCountStrategy::Silhouette { max_clusters } => {
                SilhouetteSearch { max_clusters }.select(distances, linkage)
            }
        }
    }
}

/// Parameters for [`cluster_products`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Explicit cluster count
    pub n_clusters: Option<usize>,
    pub linkage: Linkage,
    /// Merge only while the closest clusters are nearer than this
    pub distance_threshold: Option<f64>,
    /// Size above which a cluster is reported as oversized
    pub max_cluster_size: Option<usize>,
    /// Used when neither a count nor a threshold is given
    pub strategy: ClusterCountStrategy,
}

/// One product's cluster together with its metadata, if any
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterAssignment {
    pub product_id: String,
    pub cluster_id: usize,
    pub product: Option<ProductSummary>,
}

/// Cluster size balance diagnostics. Never affects the partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BalanceReport {
    pub max_size: usize,
    pub min_size: usize,
    /// Max size exceeds three times the min size with more than two clusters
    pub imbalanced: bool,
    /// Clusters larger than the configured maximum
    pub oversized_clusters: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStatistics {
    pub total_clusters: usize,
    pub total_products: usize,
    pub avg_cluster_size: f64,
    pub std_cluster_size: f64,
    pub min_cluster_size: usize,
    pub max_cluster_size: usize,
    /// Sizes ordered by cluster id
    pub cluster_size_distribution: Vec<usize>,
}

/// Per-cluster business view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub size: usize,
    pub total_quantity: Option<i64>,
    pub avg_price: Option<f64>,
    /// Descriptions, or product ids where no metadata exists
    pub products: Vec<String>,
}

/// Result of a clustering run: a partition of the similarity index
#[derive(Debug, Clone)]
pub struct Clustering {
    assignments: Vec<ClusterAssignment>,
    n_clusters: usize,
    linkage: Linkage,
    balance: BalanceReport,
}

impl Clustering {
    /// Assignments in similarity index order
    pub fn assignments(&self) -> &[ClusterAssignment] {
        &self.assignments
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    pub fn balance(&self) -> &BalanceReport {
        &self.balance
    }

    /// Cluster labels in similarity index order
    pub fn labels(&self) -> Vec<usize> {
        self.assignments.iter().map(|a| a.cluster_id).collect()
    }

    pub fn cluster_ids(&self) -> Vec<usize> {
        (0..self.n_clusters).collect()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for assignment in &self.assignments {
            sizes[assignment.cluster_id] += 1;
        }
        sizes
    }

    pub fn cluster_of(&self, product_id: &str) -> Option<usize> {
        self.assignments
            .iter()
            .find(|a| a.product_id == product_id)
            .map(|a| a.cluster_id)
    }

    pub fn cluster_products(&self, cluster_id: usize) -> Vec<&ClusterAssignment> {
        self.assignments
            .iter()
            .filter(|a| a.cluster_id == cluster_id)
            .collect()
    }

    /// Member product ids of one cluster
    pub fn members(&self, cluster_id: usize) -> Vec<&str> {
        self.cluster_products(cluster_id)
            .into_iter()
            .map(|a| a.product_id.as_str())
            .collect()
    }

    /// Mean pairwise similarity among the cluster's members
    pub fn coherence(&self, cluster_id: usize, similarity: &SimilarityMatrix) -> f64 {
        similarity.mean_pairwise(&self.members(cluster_id))
    }

    /// Silhouette coefficient of this partition on `1 - similarity`
    pub fn silhouette(&self, similarity: &SimilarityMatrix) -> f64 {
        silhouette_score(&similarity.distance_matrix(), &self.labels())
    }

    pub fn statistics(&self) -> ClusterStatistics {
        let sizes = self.cluster_sizes();
        let k = sizes.len();
        let mean = sizes.iter().sum::<usize>() as f64 / k.max(1) as f64;
        // Sample standard deviation
        let std = if k > 1 {
            (sizes
                .iter()
                .map(|&s| (s as f64 - mean).powi(2))
                .sum::<f64>()
                / (k - 1) as f64)
                .sqrt()
        } else {
            0.0
        };

        ClusterStatistics {
            total_clusters: k,
            total_products: self.assignments.len(),
            avg_cluster_size: mean,
            std_cluster_size: std,
            min_cluster_size: sizes.iter().copied().min().unwrap_or(0),
            max_cluster_size: sizes.iter().copied().max().unwrap_or(0),
            cluster_size_distribution: sizes,
        }
    }

    pub fn cluster_analysis(&self) -> Vec<ClusterSummary> {
        self.cluster_ids()
            .into_iter()
            .map(|cluster_id| {
                let members = self.cluster_products(cluster_id);
                let known: Vec<&ProductSummary> =
                    members.iter().filter_map(|a| a.product.as_ref()).collect();

                let (total_quantity, avg_price) = if known.is_empty() {
                    (None, None)
                } else {
                    let quantity = known.iter().map(|p| p.total_quantity).sum::<i64>();
                    let price = known.iter().map(|p| p.avg_unit_price).sum::<f64>()
                        / known.len() as f64;
                    (Some(quantity), Some(price))
                };

                ClusterSummary {
                    cluster_id,
                    size: members.len(),
                    total_quantity,
                    avg_price,
                    products: members
                        .iter()
                        .map(|a| match &a.product {
                            Some(p) => p.description.clone(),
                            None => a.product_id.clone(),
                        })
                        .collect(),
                }
            })
            .collect()
    }
}

/// Cluster count keyed by the number of products, clamped to [1, n]
pub fn heuristic_cluster_count(n_products: usize) -> usize {
    let k = match n_products {
        0..=10 => 2,
        11..=50 => 5.min(n_products / 10),
        51..=200 => 8.min(n_products / 25),
        201..=1000 => 12.min(n_products / 50),
        _ => 15.min(n_products / 100),
    };
    k.clamp(1, n_products.max(1))
}

/// Cluster products by agglomerative clustering over `1 - similarity`
///
/// # Arguments
/// * `similarity` - Product similarity matrix
/// * `catalog` - Product metadata joined onto the assignments
/// * `params` - Linkage, count or threshold, and balance settings
///
/// # Returns
/// * `Clustering` assigning every indexed product to exactly one cluster
pub fn cluster_products(
    similarity: &SimilarityMatrix,
    catalog: &ProductCatalog,
    params: &ClusterParams,
) -> crate::Result<Clustering> {
    let n = similarity.len();
    if n == 0 {
        return Err(SlottingError::EmptyResult(
            "similarity matrix has no products to cluster".to_string(),
        ));
    }

    info!(
        "Performing agglomerative clustering ({} linkage) on {} products...",
        params.linkage, n
    );

    let distances = similarity.distance_matrix();
    let stop = stop_rule(&distances, params)?;
    let labels = agglomerate(&distances, params.linkage, stop);
    let n_clusters = labels.iter().max().map_or(0, |&m| m + 1);

    let assignments: Vec<ClusterAssignment> = similarity
        .products()
        .iter()
        .zip(&labels)
        .map(|(product_id, &cluster_id)| ClusterAssignment {
            product_id: product_id.clone(),
            cluster_id,
            product: catalog.get(product_id).cloned(),
        })
        .collect();

    let mut sizes = vec![0usize; n_clusters];
    for &label in &labels {
        sizes[label] += 1;
    }
    let balance = check_balance(&sizes, params.max_cluster_size);

    info!("Created {} clusters with sizes: {:?}", n_clusters, sizes);

    Ok(Clustering {
        assignments,
        n_clusters,
        linkage: params.linkage,
        balance,
    })
}

fn stop_rule(distances: &Array2<f64>, params: &ClusterParams) -> crate::Result<StopRule> {
    let n = distances.nrows();
    match (params.n_clusters, params.distance_threshold) {
        (Some(_), Some(_)) => Err(SlottingError::InvalidParameter(
            "give either n_clusters or distance_threshold, not both".to_string(),
        )),
        (Some(k), None) => {
            if k == 0 || k > n {
                Err(SlottingError::InvalidParameter(format!(
                    "n_clusters must be between 1 and {} (got {})",
                    n, k
                )))
            } else {
                Ok(StopRule::Clusters(k))
            }
        }
        (None, Some(threshold)) => {
            if !threshold.is_finite() || threshold < 0.0 {
                Err(SlottingError::InvalidParameter(format!(
                    "distance_threshold must be a non-negative number (got {})",
                    threshold
                )))
            } else {
                Ok(StopRule::Threshold(threshold))
            }
        }
        (None, None) => {
            let k = params.strategy.select(distances, params.linkage);
            Ok(StopRule::Clusters(k.clamp(1, n)))
        }
    }
}

fn check_balance(sizes: &[usize], max_cluster_size: Option<usize>) -> BalanceReport {
    let max_size = sizes.iter().copied().max().unwrap_or(0);
    let min_size = sizes.iter().copied().min().unwrap_or(0);
    let imbalanced = sizes.len() > 2 && max_size > 3 * min_size;

    if imbalanced {
        warn!(
            "Unbalanced clusters detected (max: {}, min: {}); consider adjusting parameters",
            max_size, min_size
        );
    }

    let oversized_clusters: Vec<usize> = match max_cluster_size {
        Some(limit) => sizes
            .iter()
            .enumerate()
            .filter(|&(_, &size)| size > limit)
            .map(|(cluster_id, _)| cluster_id)
            .collect(),
        None => Vec::new(),
    };
    if !oversized_clusters.is_empty() {
        warn!(
            "{} clusters exceed max_cluster_size: {:?}",
            oversized_clusters.len(),
            oversized_clusters
        );
    }

    BalanceReport {
        max_size,
        min_size,
        imbalanced,
        oversized_clusters,
    }
}

/// One merge step: cluster `absorbed` joins cluster `into` at `distance`.
///
/// Clusters are named by their lowest member index, so `into < absorbed`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub into: usize,
    pub absorbed: usize,
    pub distance: f64,
}

/// Complete merge history of an agglomerative run down to one cluster
#[derive(Debug, Clone)]
pub struct Dendrogram {
    n: usize,
    merges: Vec<Merge>,
}

impl Dendrogram {
    /// Merge until one cluster remains.
    ///
    /// Uses Lance-Williams updates on a working copy of the matrix. The
    /// closest pair is found by a full scan, taking the lowest index pair on
    /// ties, so the history is deterministic.
    pub fn build(distances: &Array2<f64>, linkage: Linkage) -> Self {
        let n = distances.nrows();
        let mut d = distances.clone();
        let mut active = vec![true; n];
        let mut sizes = vec![1usize; n];
        let mut merges = Vec::with_capacity(n.saturating_sub(1));

        loop {
            let mut closest: Option<(usize, usize, f64)> = None;
            for i in (0..n).filter(|&i| active[i]) {
                for j in ((i + 1)..n).filter(|&j| active[j]) {
                    let dist = d[[i, j]];
                    if closest.map_or(true, |(_, _, best)| dist < best) {
                        closest = Some((i, j, dist));
                    }
                }
            }

            let Some((a, b, dist)) = closest else {
                break;
            };

            // Merge b into a; a < b so a stays the lowest member index
            let (size_a, size_b) = (sizes[a] as f64, sizes[b] as f64);
            for k in (0..n).filter(|&k| active[k] && k != a && k != b) {
                let (dak, dbk) = (d[[a, k]], d[[b, k]]);
                let merged = match linkage {
                    Linkage::Complete => dak.max(dbk),
                    Linkage::Single => dak.min(dbk),
                    Linkage::Average => (size_a * dak + size_b * dbk) / (size_a + size_b),
                };
                d[[a, k]] = merged;
                d[[k, a]] = merged;
            }

            sizes[a] += sizes[b];
            active[b] = false;
            merges.push(Merge {
                into: a,
                absorbed: b,
                distance: dist,
            });
        }

        Self { n, merges }
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Labels after replaying the merges allowed by `stop`.
    ///
    /// `Clusters(k)` replays the first `n - k` merges; `Threshold(t)` replays
    /// merges up to the first one at distance `>= t`. Labels are numbered by
    /// each cluster's lowest member index.
    pub fn cut(&self, stop: StopRule) -> Vec<usize> {
        let steps = match stop {
            StopRule::Clusters(k) => self.n.saturating_sub(k.max(1)).min(self.merges.len()),
            StopRule::Threshold(threshold) => self
                .merges
                .iter()
                .take_while(|m| m.distance < threshold)
                .count(),
        };

        let mut parent: Vec<usize> = (0..self.n).collect();
        for merge in &self.merges[..steps] {
            parent[merge.absorbed] = merge.into;
        }

        let mut label_of_root = vec![None; self.n];
        let mut next_label = 0;
        let mut labels = vec![0usize; self.n];
        for i in 0..self.n {
            let mut root = i;
            while parent[root] != root {
                root = parent[root];
            }
            let label = *label_of_root[root].get_or_insert_with(|| {
                next_label += 1;
                next_label - 1
            });
            labels[i] = label;
        }
        labels
    }
}

/// Agglomerative clustering on a precomputed distance matrix
///
/// Builds the full [`Dendrogram`] and cuts it at `stop`.
pub fn agglomerate(distances: &Array2<f64>, linkage: Linkage, stop: StopRule) -> Vec<usize> {
    Dendrogram::build(distances, linkage).cut(stop)
}

/// Mean silhouette coefficient over a precomputed distance matrix.
///
/// Points in singleton clusters score 0; fewer than two clusters scores 0.
pub fn silhouette_score(distances: &Array2<f64>, labels: &[usize]) -> f64 {
    let n = labels.len();
    let n_clusters = labels.iter().max().map_or(0, |&m| m + 1);
    if n < 2 || n_clusters < 2 {
        return 0.0;
    }

    let mut by_cluster: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_cluster.entry(label).or_default().push(i);
    }
    if by_cluster.len() < 2 {
        return 0.0;
    }

    let mut silhouette_sum = 0.0;
    for i in 0..n {
        let own = &by_cluster[&labels[i]];
        if own.len() < 2 {
            continue;
        }

        // a(i): mean distance to the rest of its own cluster
        let a_i = own
            .iter()
            .filter(|&&j| j != i)
            .map(|&j| distances[[i, j]])
            .sum::<f64>()
            / (own.len() - 1) as f64;

        // b(i): smallest mean distance to another cluster
        let b_i = by_cluster
            .iter()
            .filter(|(&label, _)| label != labels[i])
            .map(|(_, others)| {
                others.iter().map(|&j| distances[[i, j]]).sum::<f64>() / others.len() as f64
            })
            .fold(f64::INFINITY, f64::min);

        let max_ab = a_i.max(b_i);
        if b_i.is_finite() && max_ab > 0.0 {
            silhouette_sum += (b_i - a_i) / max_ab;
        }
    }

    silhouette_sum / n as f64
}
