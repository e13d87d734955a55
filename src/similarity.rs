//! Pairwise product similarity over a basket matrix
//!
//! Every metric is derived from a single co-occurrence (Gram) matrix
//! `X^T X` of the binary basket matrix. Each unordered pair is scored once and
//! mirrored, so the result is exactly symmetric.

use crate::basket::BasketMatrix;
use crate::error::SlottingError;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Similarity metric between two product presence vectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Shared baskets over baskets containing either product
    #[default]
    Jaccard,
    /// Normalized dot product of the presence vectors
    Cosine,
    /// Association lift rescaled so that independence maps to 0.5
    Lift,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Jaccard => "jaccard",
            Metric::Cosine => "cosine",
            Metric::Lift => "lift",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = SlottingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jaccard" => Ok(Metric::Jaccard),
            "cosine" => Ok(Metric::Cosine),
            "lift" => Ok(Metric::Lift),
            _ => Err(SlottingError::InvalidMetric(s.to_string())),
        }
    }
}

/// Square, symmetric product similarity matrix with scores in [0, 1]
#[derive(Debug, Clone)]
pub struct SimilarityMatrix {
    products: Vec<String>,
    index: HashMap<String, usize>,
    values: Array2<f64>,
    metric: Metric,
}

/// One unordered product pair and its score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarPair {
    pub first: String,
    pub second: String,
    pub score: f64,
}

/// Distribution of the non-zero off-diagonal scores
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimilarityStatistics {
    pub mean_similarity: f64,
    pub median_similarity: f64,
    pub std_similarity: f64,
    pub min_similarity: f64,
    pub max_similarity: f64,
    /// Pairs scoring above 0.5
    pub high_similarity_pairs: usize,
    pub total_pairs: usize,
}

impl SimilarityMatrix {
    /// Wrap an externally computed matrix, checking shape, range and symmetry
    pub fn from_values(
        products: Vec<String>,
        values: Array2<f64>,
        metric: Metric,
    ) -> crate::Result<Self> {
        let n = products.len();
        if values.dim() != (n, n) {
            return Err(SlottingError::InvalidParameter(format!(
                "similarity matrix shape {:?} does not match {} products",
                values.dim(),
                n
            )));
        }
        for i in 0..n {
            for j in i..n {
                let v = values[[i, j]];
                if !(0.0..=1.0).contains(&v) {
                    return Err(SlottingError::InvalidParameter(format!(
                        "similarity {} at ({}, {}) is outside [0, 1]",
                        v, i, j
                    )));
                }
                if v != values[[j, i]] {
                    return Err(SlottingError::InvalidParameter(format!(
                        "similarity matrix is not symmetric at ({}, {})",
                        i, j
                    )));
                }
            }
        }
        Ok(Self::new_unchecked(products, values, metric))
    }

    fn new_unchecked(products: Vec<String>, values: Array2<f64>, metric: Metric) -> Self {
        let index = products
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), i))
            .collect();
        Self {
            products,
            index,
            values,
            metric,
        }
    }

    pub fn products(&self) -> &[String] {
        &self.products
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn index_of(&self, product_id: &str) -> Option<usize> {
        self.index.get(product_id).copied()
    }

    /// Score between two products, `None` if either is not indexed
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.values[[self.index_of(a)?, self.index_of(b)?]])
    }

    /// `1 - similarity` with a zero diagonal
    pub fn distance_matrix(&self) -> Array2<f64> {
        let mut distances = self.values.mapv(|s| 1.0 - s);
        distances.diag_mut().fill(0.0);
        distances
    }

    /// Mean score over the unordered pairs of `members`.
    ///
    /// Members missing from the index are skipped; returns 0 when fewer than
    /// two members are given or no indexed pair exists.
    pub fn mean_pairwise(&self, members: &[&str]) -> f64 {
        if members.len() < 2 {
            return 0.0;
        }
        let indexed: Vec<Option<usize>> = members.iter().map(|m| self.index_of(m)).collect();

        let mut sum = 0.0;
        let mut count = 0usize;
        for (a, ia) in indexed.iter().enumerate() {
            for ib in &indexed[a + 1..] {
                if let (Some(i), Some(j)) = (ia, ib) {
                    sum += self.values[[*i, *j]];
                    count += 1;
                }
            }
        }

        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// The `k` products most similar to `product_id`, excluding itself
    pub fn most_similar(&self, product_id: &str, k: usize) -> crate::Result<Vec<(String, f64)>> {
        let i = self
            .index_of(product_id)
            .ok_or_else(|| SlottingError::UnknownProduct(product_id.to_string()))?;

        let mut scored: Vec<(String, f64)> = self
            .values
            .row(i)
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(j, &score)| (self.products[j].clone(), score))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// All unordered pairs scoring at least `threshold`, highest first
    pub fn pairs_above(&self, threshold: f64) -> Vec<SimilarPair> {
        let mut pairs = Vec::new();
        for i in 0..self.len() {
            for j in (i + 1)..self.len() {
                let score = self.values[[i, j]];
                if score >= threshold {
                    pairs.push(SimilarPair {
                        first: self.products[i].clone(),
                        second: self.products[j].clone(),
                        score,
                    });
                }
            }
        }
        pairs.sort_by(|a, b| b.score.total_cmp(&a.score));
        pairs
    }

    /// Statistics over the non-zero strictly upper-triangle scores
    pub fn statistics(&self) -> SimilarityStatistics {
        let mut scores: Vec<f64> = Vec::new();
        for i in 0..self.len() {
            for j in (i + 1)..self.len() {
                let score = self.values[[i, j]];
                if score > 0.0 {
                    scores.push(score);
                }
            }
        }

        if scores.is_empty() {
            return SimilarityStatistics::default();
        }

        scores.sort_by(f64::total_cmp);
        let n = scores.len();
        let mean = scores.iter().sum::<f64>() / n as f64;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            scores[n / 2]
        } else {
            (scores[n / 2 - 1] + scores[n / 2]) / 2.0
        };

        SimilarityStatistics {
            mean_similarity: mean,
            median_similarity: median,
            std_similarity: variance.sqrt(),
            min_similarity: scores[0],
            max_similarity: scores[n - 1],
            high_similarity_pairs: scores.iter().filter(|&&s| s > 0.5).count(),
            total_pairs: n,
        }
    }
}

/// Compute the product similarity matrix for a basket matrix
///
/// # Arguments
/// * `baskets` - Binary basket matrix
/// * `metric` - Similarity metric
///
/// # Returns
/// * `SimilarityMatrix` indexed by the basket matrix's product columns
pub fn compute_similarity(baskets: &BasketMatrix, metric: Metric) -> SimilarityMatrix {
    info!("Calculating similarity matrix using {} metric...", metric);

    let x = baskets.cells().mapv(f64::from);
    let co_occurrence = x.t().dot(&x);
    let n_products = co_occurrence.nrows();
    let n_baskets = baskets.n_baskets() as f64;
    let counts: Vec<f64> = co_occurrence.diag().to_vec();

    debug!(
        "Co-occurrence matrix computed for {} products over {} baskets",
        n_products, n_baskets
    );

    // Upper triangle rows, including the diagonal
    let rows: Vec<Vec<f64>> = (0..n_products)
        .into_par_iter()
        .map(|i| {
            (i..n_products)
                .map(|j| pair_score(metric, co_occurrence[[i, j]], counts[i], counts[j], n_baskets))
                .collect()
        })
        .collect();

    let mut values = Array2::<f64>::zeros((n_products, n_products));
    for (i, row) in rows.into_iter().enumerate() {
        for (offset, score) in row.into_iter().enumerate() {
            let j = i + offset;
            values[[i, j]] = score;
            values[[j, i]] = score;
        }
    }

    SimilarityMatrix::new_unchecked(baskets.products().to_vec(), values, metric)
}

/// Parse `metric_name` and compute the similarity matrix.
///
/// An unknown metric fails before any computation.
pub fn compute_similarity_named(
    baskets: &BasketMatrix,
    metric_name: &str,
) -> crate::Result<SimilarityMatrix> {
    let metric: Metric = metric_name.parse()?;
    Ok(compute_similarity(baskets, metric))
}

/// Score one pair from its co-occurrence count and the two column counts
fn pair_score(metric: Metric, both: f64, count_i: f64, count_j: f64, n_baskets: f64) -> f64 {
    match metric {
        Metric::Jaccard => {
            let union = count_i + count_j - both;
            if union > 0.0 {
                both / union
            } else {
                0.0
            }
        }
        Metric::Cosine => {
            let norm = count_i.sqrt() * count_j.sqrt();
            if norm > 0.0 {
                (both / norm).min(1.0)
            } else {
                0.0
            }
        }
        Metric::Lift => {
            let confidence = if count_i > 0.0 { both / count_i } else { 0.0 };
            let support_j = if n_baskets > 0.0 { count_j / n_baskets } else { 0.0 };
            let lift = if support_j > 0.0 {
                confidence / support_j
            } else {
                0.0
            };
            lift_to_similarity(lift)
        }
    }
}

/// Linear rescaling of lift: independence (lift = 1) maps to 0.5
fn lift_to_similarity(lift: f64) -> f64 {
    if lift > 0.0 {
        ((lift - 1.0) / 10.0 + 0.5).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
