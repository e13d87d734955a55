//! Recommendation scoring and ranking
//!
//! Each cluster of a manageable size becomes a co-placement recommendation
//! scored by coherence and sales volume.

use crate::cluster::Clustering;
use crate::data::{ProductCatalog, MISSING_DESCRIPTION};
use crate::error::SlottingError;
use crate::similarity::SimilarityMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Size window and result count for recommendation generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendParams {
    pub top_n: usize,
    pub min_cluster_size: usize,
    pub max_cluster_size: usize,
}

impl Default for RecommendParams {
    fn default() -> Self {
        Self {
            top_n: 10,
            min_cluster_size: 2,
            max_cluster_size: 100,
        }
    }
}

/// One product placed by a recommendation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedProduct {
    pub product_id: String,
    pub description: String,
    pub quantity: i64,
}

/// A validated co-placement recommendation for one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    cluster_id: usize,
    coherence: f64,
    strength: f64,
    total_quantity_sold: i64,
    avg_unit_price: f64,
    products: Vec<RecommendedProduct>,
    explanation: String,
}

impl Recommendation {
    /// Build a recommendation, rejecting out-of-range scores
    pub fn new(
        cluster_id: usize,
        coherence: f64,
        strength: f64,
        total_quantity_sold: i64,
        avg_unit_price: f64,
        products: Vec<RecommendedProduct>,
        explanation: String,
    ) -> crate::Result<Self> {
        if !(0.0..=1.0).contains(&coherence) {
            return Err(SlottingError::InvalidRecommendation(format!(
                "coherence {} for cluster {} is outside [0, 1]",
                coherence, cluster_id
            )));
        }
        if !strength.is_finite() || strength < 0.0 {
            return Err(SlottingError::InvalidRecommendation(format!(
                "strength {} for cluster {} must be finite and non-negative",
                strength, cluster_id
            )));
        }
        if total_quantity_sold < 0 || !avg_unit_price.is_finite() {
            return Err(SlottingError::InvalidRecommendation(format!(
                "sales totals for cluster {} are invalid",
                cluster_id
            )));
        }
        if products.is_empty() {
            return Err(SlottingError::InvalidRecommendation(format!(
                "cluster {} has no products",
                cluster_id
            )));
        }

        Ok(Self {
            cluster_id,
            coherence,
            strength,
            total_quantity_sold,
            avg_unit_price,
            products,
            explanation,
        })
    }

    pub fn cluster_id(&self) -> usize {
        self.cluster_id
    }

    pub fn coherence(&self) -> f64 {
        self.coherence
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn total_quantity_sold(&self) -> i64 {
        self.total_quantity_sold
    }

    pub fn avg_unit_price(&self) -> f64 {
        self.avg_unit_price
    }

    pub fn products(&self) -> &[RecommendedProduct] {
        &self.products
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }
}

/// External persistence for the ranked recommendations
pub trait RecommendationSink {
    fn save(&mut self, recommendations: &[Recommendation]) -> anyhow::Result<()>;
}

/// Aggregate figures over a recommendation list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationSummary {
    pub total_recommendations: usize,
    pub avg_coherence_score: f64,
    pub avg_strength_score: f64,
    pub avg_cluster_size: f64,
    pub total_products_recommended: usize,
    pub min_coherence_score: f64,
    pub max_coherence_score: f64,
    pub min_strength_score: f64,
    pub max_strength_score: f64,
}

impl RecommendationSummary {
    /// `None` for an empty list
    pub fn from_recommendations(recommendations: &[Recommendation]) -> Option<Self> {
        if recommendations.is_empty() {
            return None;
        }
        let n = recommendations.len() as f64;
        let coherence: Vec<f64> = recommendations.iter().map(|r| r.coherence).collect();
        let strength: Vec<f64> = recommendations.iter().map(|r| r.strength).collect();
        let total_products: usize = recommendations.iter().map(|r| r.products.len()).sum();

        Some(Self {
            total_recommendations: recommendations.len(),
            avg_coherence_score: coherence.iter().sum::<f64>() / n,
            avg_strength_score: strength.iter().sum::<f64>() / n,
            avg_cluster_size: total_products as f64 / n,
            total_products_recommended: total_products,
            min_coherence_score: coherence.iter().copied().fold(f64::INFINITY, f64::min),
            max_coherence_score: coherence.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min_strength_score: strength.iter().copied().fold(f64::INFINITY, f64::min),
            max_strength_score: strength.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

pub fn filter_by_strength(
    recommendations: &[Recommendation],
    min_strength: f64,
) -> Vec<Recommendation> {
    recommendations
        .iter()
        .filter(|r| r.strength >= min_strength)
        .cloned()
        .collect()
}

pub fn filter_by_coherence(
    recommendations: &[Recommendation],
    min_coherence: f64,
) -> Vec<Recommendation> {
    recommendations
        .iter()
        .filter(|r| r.coherence >= min_coherence)
        .cloned()
        .collect()
}

/// Score clusters and return the `top_n` strongest recommendations
///
/// # Arguments
/// * `clustering` - Product partition
/// * `similarity` - Similarity matrix the partition was built from
/// * `catalog` - Product metadata; missing entries fall back to "N/A" and 0
/// * `params` - Result count and cluster size window
///
/// # Returns
/// * Recommendations sorted by strength, highest first
pub fn generate_recommendations(
    clustering: &Clustering,
    similarity: &SimilarityMatrix,
    catalog: &ProductCatalog,
    params: &RecommendParams,
) -> crate::Result<Vec<Recommendation>> {
    info!("Generating placement recommendations...");

    let mut recommendations = Vec::new();
    for cluster_id in clustering.cluster_ids() {
        let members = clustering.members(cluster_id);
        if members.len() < params.min_cluster_size || members.len() > params.max_cluster_size {
            debug!(
                "Skipping cluster {} with {} products (window {}..={})",
                cluster_id,
                members.len(),
                params.min_cluster_size,
                params.max_cluster_size
            );
            continue;
        }
        recommendations.push(score_cluster(cluster_id, &members, similarity, catalog)?);
    }

    // Stable: equal strengths keep cluster id order
    recommendations.sort_by(|a, b| b.strength.total_cmp(&a.strength));
    recommendations.truncate(params.top_n);

    info!("Generated {} recommendations", recommendations.len());
    Ok(recommendations)
}

/// Generate recommendations and hand the top-n slice to `sink`
pub fn generate_and_save(
    clustering: &Clustering,
    similarity: &SimilarityMatrix,
    catalog: &ProductCatalog,
    params: &RecommendParams,
    sink: &mut dyn RecommendationSink,
) -> crate::Result<Vec<Recommendation>> {
    let recommendations = generate_recommendations(clustering, similarity, catalog, params)?;
    sink.save(&recommendations)
        .map_err(|e| SlottingError::Persistence(format!("{:#}", e)))?;
    info!("Saved {} recommendations", recommendations.len());
    Ok(recommendations)
}

fn score_cluster(
    cluster_id: usize,
    members: &[&str],
    similarity: &SimilarityMatrix,
    catalog: &ProductCatalog,
) -> crate::Result<Recommendation> {
    let coherence = similarity.mean_pairwise(members);

    let known: Vec<_> = members.iter().filter_map(|id| catalog.get(id)).collect();
    let (total_quantity, avg_unit_price, strength) = if known.is_empty() {
        (0, 0.0, coherence)
    } else {
        // Net returns can push a total below zero; count it as no sales
        let total = known.iter().map(|p| p.total_quantity).sum::<i64>().max(0);
        let avg_price = known.iter().map(|p| p.avg_unit_price).sum::<f64>() / known.len() as f64;
        let volume = (total as f64 + 1.0).ln();
        (total, avg_price, coherence * volume)
    };

    let products = members
        .iter()
        .map(|&id| match catalog.get(id) {
            Some(p) => RecommendedProduct {
                product_id: id.to_string(),
                description: p.description.clone(),
                quantity: p.total_quantity,
            },
            None => RecommendedProduct {
                product_id: id.to_string(),
                description: MISSING_DESCRIPTION.to_string(),
                quantity: 0,
            },
        })
        .collect();

    let total_sales = (!known.is_empty()).then_some(total_quantity);
    Recommendation::new(
        cluster_id,
        coherence,
        strength,
        total_quantity,
        avg_unit_price,
        products,
        explanation(members.len(), total_sales),
    )
}

fn explanation(member_count: usize, total_sales: Option<i64>) -> String {
    let mut text = format!(
        "These {} products are frequently purchased together. ",
        member_count
    );
    if let Some(total) = total_sales {
        text.push_str(&format!("(total sales: {} units). ", group_thousands(total)));
    }
    text.push_str(
        "Placing them close together can reduce picking time and improve warehouse efficiency.",
    );
    text
}

/// Format an integer with comma thousands separators
fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{cluster_products, ClusterParams};
    use crate::data::ProductSummary;
    use crate::similarity::Metric;
    use ndarray::Array2;

    fn summary(id: &str, quantity: i64, price: f64) -> ProductSummary {
        ProductSummary {
            product_id: id.to_string(),
            description: format!("Item {}", id),
            avg_unit_price: price,
            total_quantity: quantity,
            order_count: 1,
        }
    }

    fn pair_similarity(score: f64) -> SimilarityMatrix {
        let values = Array2::from_shape_vec((2, 2), vec![1.0, score, score, 1.0]).unwrap();
        SimilarityMatrix::from_values(vec!["A".into(), "B".into()], values, Metric::Jaccard)
            .unwrap()
    }

    fn single_cluster(sim: &SimilarityMatrix, catalog: &ProductCatalog) -> Clustering {
        cluster_products(
            sim,
            catalog,
            &ClusterParams {
                n_clusters: Some(1),
                ..ClusterParams::default()
            },
        )
        .unwrap()
    }

    /// Groups {A, B}, {C, D, E}, {F} with different cohesion and volume
    fn three_group_fixture() -> (SimilarityMatrix, ProductCatalog, Clustering) {
        let products: Vec<String> = ["A", "B", "C", "D", "E", "F"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        #[rustfmt::skip]
        let values = Array2::from_shape_vec((6, 6), vec![
            1.0, 0.9, 0.0, 0.0, 0.0, 0.0,
            0.9, 1.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.6, 0.5, 0.0,
            0.0, 0.0, 0.6, 1.0, 0.7, 0.0,
            0.0, 0.0, 0.5, 0.7, 1.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
        ]).unwrap();
        let sim = SimilarityMatrix::from_values(products, values, Metric::Jaccard).unwrap();
        let catalog = ProductCatalog::from_summaries(vec![
            summary("A", 5, 1.0),
            summary("B", 5, 3.0),
            summary("C", 400, 2.0),
            summary("D", 300, 2.0),
            summary("E", 300, 2.0),
            summary("F", 9999, 1.0),
        ]);
        let clustering = cluster_products(
            &sim,
            &catalog,
            &ClusterParams {
                n_clusters: Some(3),
                ..ClusterParams::default()
            },
        )
        .unwrap();
        (sim, catalog, clustering)
    }

    #[derive(Default)]
    struct RecordingSink {
        saved: Vec<usize>,
    }

    impl RecommendationSink for RecordingSink {
        fn save(&mut self, recommendations: &[Recommendation]) -> anyhow::Result<()> {
            self.saved = recommendations.iter().map(|r| r.cluster_id()).collect();
            Ok(())
        }
    }

    struct FailingSink;

    impl RecommendationSink for FailingSink {
        fn save(&mut self, _recommendations: &[Recommendation]) -> anyhow::Result<()> {
            anyhow::bail!("database unavailable")
        }
    }

    #[test]
    fn test_strength_scenario() {
        let sim = pair_similarity(0.8);
        let catalog =
            ProductCatalog::from_summaries(vec![summary("A", 10, 1.0), summary("B", 20, 2.0)]);
        let clustering = single_cluster(&sim, &catalog);

        let recs =
            generate_recommendations(&clustering, &sim, &catalog, &RecommendParams::default())
                .unwrap();

        assert_eq!(recs.len(), 1);
        let rec = &recs[0];
        assert!((rec.coherence() - 0.8).abs() < 1e-12);
        assert_eq!(rec.total_quantity_sold(), 30);
        assert!((rec.strength() - 0.8 * 31f64.ln()).abs() < 1e-12);
        assert!((rec.avg_unit_price() - 1.5).abs() < 1e-12);
        assert_eq!(
            rec.explanation(),
            "These 2 products are frequently purchased together. (total sales: 30 units). \
             Placing them close together can reduce picking time and improve warehouse efficiency."
        );
    }

    #[test]
    fn test_missing_metadata_fallbacks() {
        let sim = pair_similarity(0.8);
        let catalog = ProductCatalog::default();
        let clustering = single_cluster(&sim, &catalog);

        let recs =
            generate_recommendations(&clustering, &sim, &catalog, &RecommendParams::default())
                .unwrap();
        let rec = &recs[0];

        assert!((rec.strength() - 0.8).abs() < 1e-12);
        assert_eq!(rec.total_quantity_sold(), 0);
        assert_eq!(rec.avg_unit_price(), 0.0);
        assert!(rec
            .products()
            .iter()
            .all(|p| p.description == "N/A" && p.quantity == 0));
        assert!(!rec.explanation().contains("total sales"));
    }

    #[test]
    fn test_net_negative_sales_count_as_zero() {
        let sim = pair_similarity(0.8);
        let catalog =
            ProductCatalog::from_summaries(vec![summary("A", -5, 1.0), summary("B", 2, 3.0)]);
        let clustering = single_cluster(&sim, &catalog);

        let recs =
            generate_recommendations(&clustering, &sim, &catalog, &RecommendParams::default())
                .unwrap();
        let rec = &recs[0];

        assert_eq!(rec.total_quantity_sold(), 0);
        assert!(rec.strength().abs() < 1e-12);
        assert!((rec.avg_unit_price() - 2.0).abs() < 1e-12);
        assert_eq!(rec.products()[0].quantity, -5);
        assert!(rec.explanation().contains("(total sales: 0 units)"));
    }

    #[test]
    fn test_ranking_and_size_window() {
        let (sim, catalog, clustering) = three_group_fixture();
        assert_eq!(clustering.labels(), vec![0, 0, 1, 1, 1, 2]);

        let recs =
            generate_recommendations(&clustering, &sim, &catalog, &RecommendParams::default())
                .unwrap();

        // Singleton {F} is outside the window
        assert_eq!(recs.len(), 2);
        // 0.6 * ln(1001) beats 0.9 * ln(11)
        assert_eq!(recs[0].cluster_id(), 1);
        assert_eq!(recs[1].cluster_id(), 0);
        assert!(recs.windows(2).all(|w| w[0].strength() >= w[1].strength()));
        assert_eq!(
            recs[0].explanation(),
            "These 3 products are frequently purchased together. (total sales: 1,000 units). \
             Placing them close together can reduce picking time and improve warehouse efficiency."
        );
    }

    #[test]
    fn test_top_n_and_max_size() {
        let (sim, catalog, clustering) = three_group_fixture();

        let params = RecommendParams {
            top_n: 1,
            ..RecommendParams::default()
        };
        let recs = generate_recommendations(&clustering, &sim, &catalog, &params).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].cluster_id(), 1);

        let params = RecommendParams {
            max_cluster_size: 2,
            ..RecommendParams::default()
        };
        let recs = generate_recommendations(&clustering, &sim, &catalog, &params).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].cluster_id(), 0);

        let params = RecommendParams {
            min_cluster_size: 1,
            ..RecommendParams::default()
        };
        let recs = generate_recommendations(&clustering, &sim, &catalog, &params).unwrap();
        let singleton = recs.iter().find(|r| r.cluster_id() == 2).unwrap();
        assert_eq!(singleton.coherence(), 0.0);
        assert_eq!(singleton.strength(), 0.0);
    }

    #[test]
    fn test_sink_receives_top_n() {
        let (sim, catalog, clustering) = three_group_fixture();
        let params = RecommendParams {
            top_n: 1,
            ..RecommendParams::default()
        };

        let mut sink = RecordingSink::default();
        let recs = generate_and_save(&clustering, &sim, &catalog, &params, &mut sink).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(sink.saved, vec![1]);

        let result = generate_and_save(&clustering, &sim, &catalog, &params, &mut FailingSink);
        assert!(matches!(
            result,
            Err(SlottingError::Persistence(msg)) if msg.contains("unavailable")
        ));
    }

    #[test]
    fn test_recommendation_validation() {
        let product = RecommendedProduct {
            product_id: "A".into(),
            description: "Item A".into(),
            quantity: 1,
        };
        let build = |coherence: f64, strength: f64, products: Vec<RecommendedProduct>| {
            Recommendation::new(0, coherence, strength, 1, 1.0, products, String::new())
        };
        assert!(build(1.2, 1.0, vec![product.clone()]).is_err());
        assert!(build(0.5, f64::NAN, vec![product.clone()]).is_err());
        assert!(build(0.5, 1.0, Vec::new()).is_err());
        assert!(build(0.5, 1.0, vec![product]).is_ok());
    }

    #[test]
    fn test_summary_and_filters() {
        let (sim, catalog, clustering) = three_group_fixture();
        let recs =
            generate_recommendations(&clustering, &sim, &catalog, &RecommendParams::default())
                .unwrap();

        let summary = RecommendationSummary::from_recommendations(&recs).unwrap();
        assert_eq!(summary.total_recommendations, 2);
        assert_eq!(summary.total_products_recommended, 5);
        assert!((summary.avg_cluster_size - 2.5).abs() < 1e-12);
        assert!((summary.max_coherence_score - 0.9).abs() < 1e-12);
        assert!(RecommendationSummary::from_recommendations(&[]).is_none());

        assert_eq!(filter_by_coherence(&recs, 0.8).len(), 1);
        assert_eq!(filter_by_strength(&recs, 0.0).len(), 2);
        assert!(filter_by_strength(&recs, 100.0).is_empty());
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
        assert_eq!(group_thousands(-4500), "-4,500");
    }
}
