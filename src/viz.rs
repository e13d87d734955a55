//! Visualization functions using Plotters for similarity and cluster analysis

use crate::basket::BasketMatrix;
use crate::cluster::Clustering;
use crate::recommend::Recommendation;
use crate::similarity::SimilarityMatrix;
use plotters::prelude::*;
use std::path::Path;

/// Color palette for different clusters
const CLUSTER_COLORS: [RGBColor; 5] = [RED, BLUE, GREEN, YELLOW, MAGENTA];

/// The `limit` most frequent basket products that also have a similarity row,
/// most frequent first
pub fn heatmap_products(
    baskets: &BasketMatrix,
    similarity: &SimilarityMatrix,
    limit: usize,
) -> Vec<String> {
    baskets
        .product_frequency()
        .into_iter()
        .filter(|(product, _)| similarity.index_of(product).is_some())
        .take(limit)
        .map(|(product, _)| product)
        .collect()
}

/// White at 0, dark red at 1
pub fn heat_color(score: f64) -> RGBColor {
    let t = score.clamp(0.0, 1.0);
    let fade = |full: f64| (255.0 - (255.0 - full) * t).round() as u8;
    RGBColor(fade(139.0), fade(0.0), fade(0.0))
}

/// Draw the pairwise similarity of the `top_n` most frequent products
///
/// # Arguments
/// * `baskets` - Basket matrix used to rank products by frequency
/// * `similarity` - Product similarity matrix
/// * `output_path` - Path to save the PNG plot
/// * `top_n` - Number of products on each axis
pub fn create_similarity_heatmap(
    baskets: &BasketMatrix,
    similarity: &SimilarityMatrix,
    output_path: &str,
    top_n: usize,
) -> crate::AnyResult<()> {
    let products = heatmap_products(baskets, similarity, top_n);
    if products.is_empty() {
        anyhow::bail!("No products available for the similarity heatmap");
    }
    let n = products.len();

    let root = BitMapBackend::new(output_path, (900, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let title = format!(
        "Product Similarity ({}, top {} products)",
        similarity.metric(),
        n
    );
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 26))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..n as f64, 0f64..n as f64)?;

    let labels = products.clone();
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(n.min(20))
        .y_labels(n.min(20))
        .x_label_formatter(&|v| axis_label(&labels, *v))
        .y_label_formatter(&|v| axis_label(&labels, *v))
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    let mut cells = Vec::with_capacity(n * n);
    for (i, a) in products.iter().enumerate() {
        for (j, b) in products.iter().enumerate() {
            let score = similarity.get(a, b).unwrap_or(0.0);
            cells.push(Rectangle::new(
                [(j as f64, i as f64), (j as f64 + 1.0, i as f64 + 1.0)],
                heat_color(score).filled(),
            ));
        }
    }
    chart.draw_series(cells)?;

    root.present()?;
    println!("Similarity heatmap saved to: {}", output_path);

    Ok(())
}

/// Sibling of the heatmap path: `plots/heat.png` becomes `plots/heat_sizes.png`
pub fn size_chart_path(base_output_path: &str) -> String {
    let base = Path::new(base_output_path);
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.with_file_name(format!("{}_sizes.png", stem))
        .to_string_lossy()
        .into_owned()
}

fn axis_label(products: &[String], value: f64) -> String {
    products
        .get(value.floor() as usize)
        .cloned()
        .unwrap_or_default()
}

/// Create a bar chart of cluster sizes
pub fn create_cluster_size_chart(
    clustering: &Clustering,
    output_path: &str,
) -> crate::AnyResult<()> {
    let cluster_sizes = clustering.cluster_sizes();
    let max_size = *cluster_sizes.iter().max().unwrap_or(&1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Cluster Sizes", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            -0.5f64..(clustering.n_clusters() as f64 - 0.5),
            0f64..(max_size * 1.1),
        )?;

    chart
        .configure_mesh()
        .x_desc("Cluster ID")
        .y_desc("Number of Products")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (cluster_id, &size) in cluster_sizes.iter().enumerate() {
        let color = &CLUSTER_COLORS[cluster_id % CLUSTER_COLORS.len()];
        chart.draw_series(std::iter::once(Rectangle::new(
            [
                (cluster_id as f64 - 0.4, 0.0),
                (cluster_id as f64 + 0.4, size as f64),
            ],
            color.filled(),
        )))?;
    }

    root.present()?;
    println!("Cluster size chart saved to: {}", output_path);

    Ok(())
}

/// Print cluster statistics to console
pub fn print_cluster_statistics(clustering: &Clustering, similarity: &SimilarityMatrix) {
    let stats = clustering.statistics();
    println!("\n=== Cluster Statistics ===");
    println!("Number of clusters: {}", stats.total_clusters);
    println!("Total products: {}", stats.total_products);
    println!(
        "Cluster size: avg {:.2}, std {:.2}, min {}, max {}",
        stats.avg_cluster_size,
        stats.std_cluster_size,
        stats.min_cluster_size,
        stats.max_cluster_size
    );
    println!("Silhouette score: {:.3}", clustering.silhouette(similarity));

    let balance = clustering.balance();
    if balance.imbalanced {
        println!(
            "Warning: cluster sizes are imbalanced (max {}, min {})",
            balance.max_size, balance.min_size
        );
    }

    println!("\nLargest clusters:");
    println!("  Cluster | Size | Coherence");
    println!("  --------|------|----------");
    let mut ranked: Vec<(usize, usize)> =
        clustering.cluster_sizes().into_iter().enumerate().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (cluster_id, size) in ranked.into_iter().take(10) {
        println!(
            "  {:7} | {:4} | {:9.3}",
            cluster_id,
            size,
            clustering.coherence(cluster_id, similarity)
        );
    }
}

/// Print ranked recommendations with up to five products each
pub fn print_recommendations(recommendations: &[Recommendation]) {
    println!("\n=== Slotting Recommendations ===");
    if recommendations.is_empty() {
        println!("No clusters fell inside the recommendation size window");
        return;
    }

    for (rank, rec) in recommendations.iter().enumerate() {
        println!(
            "\n#{} Cluster {} ({} products)",
            rank + 1,
            rec.cluster_id(),
            rec.products().len()
        );
        println!(
            "  Coherence: {:.3}  Strength: {:.3}  Avg price: {:.2}",
            rec.coherence(),
            rec.strength(),
            rec.avg_unit_price()
        );
        for product in rec.products().iter().take(5) {
            println!("  - {} {}", product.product_id, product.description);
        }
        if rec.products().len() > 5 {
            println!("  ... and {} more", rec.products().len() - 5);
        }
        println!("  {}", rec.explanation());
    }
}

/// Generate the heatmap and cluster size chart next to `base_output_path`
pub fn generate_visualization_report(
    baskets: &BasketMatrix,
    similarity: &SimilarityMatrix,
    clustering: &Clustering,
    base_output_path: &str,
    top_n: usize,
) -> crate::AnyResult<()> {
    create_similarity_heatmap(baskets, similarity, base_output_path, top_n)?;

    let sizes_path = size_chart_path(base_output_path);
    create_cluster_size_chart(clustering, &sizes_path)?;

    print_cluster_statistics(clustering, similarity);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basket::build_baskets;
    use crate::data::TransactionRecord;
    use crate::similarity::{compute_similarity, Metric};

    fn fixture() -> (BasketMatrix, SimilarityMatrix) {
        let orders: &[(&str, &[&str])] = &[
            ("O1", &["A", "B"]),
            ("O2", &["A", "B", "C"]),
            ("O3", &["A", "B"]),
            ("O4", &["C", "D"]),
        ];
        let records: Vec<TransactionRecord> = orders
            .iter()
            .flat_map(|(order, products)| {
                products
                    .iter()
                    .map(move |p| TransactionRecord::new(*order, *p, 1, 1.0))
            })
            .collect();
        let baskets = build_baskets(&records, 1).unwrap();
        let similarity = compute_similarity(&baskets, Metric::Jaccard);
        (baskets, similarity)
    }

    #[test]
    fn test_heatmap_products_by_frequency() {
        let (baskets, similarity) = fixture();

        assert_eq!(heatmap_products(&baskets, &similarity, 3), vec!["A", "B", "C"]);
        assert_eq!(heatmap_products(&baskets, &similarity, 10).len(), 4);
        assert!(heatmap_products(&baskets, &similarity, 0).is_empty());
    }

    #[test]
    fn test_heat_color_scale() {
        assert_eq!(heat_color(0.0), RGBColor(255, 255, 255));
        assert_eq!(heat_color(1.0), RGBColor(139, 0, 0));
        assert_eq!(heat_color(2.0), heat_color(1.0));
        assert_eq!(heat_color(-1.0), heat_color(0.0));
    }

    #[test]
    fn test_size_chart_path_differs_from_heatmap() {
        assert_eq!(size_chart_path("heatmap.png"), "heatmap_sizes.png");
        assert_eq!(size_chart_path("plots/heat.png"), "plots/heat_sizes.png");
        assert_eq!(size_chart_path("plots/heat"), "plots/heat_sizes.png");
        assert_eq!(size_chart_path("report.v2.png"), "report.v2_sizes.png");
        for base in ["heat", "heat.jpeg", "out/heat.png"] {
            assert_ne!(size_chart_path(base), base);
        }
    }

    #[test]
    fn test_axis_label() {
        let products = vec!["A".to_string(), "B".to_string()];
        assert_eq!(axis_label(&products, 1.5), "B");
        assert_eq!(axis_label(&products, 7.0), "");
    }
}
