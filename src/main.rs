//! SlotForge: warehouse slotting recommendations
//!
//! Main entrypoint that loads transactions, runs the basket, similarity,
//! clustering and recommendation stages, then writes the report and plots.

use anyhow::Result;
use clap::Parser;
use slotforge::{
    load_transactions, viz, Args, JsonReportSink, Pipeline, PipelineConfig,
};
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.to_config()?;

    if args.verbose {
        println!("SlotForge - Warehouse Slotting Recommendations");
        println!("==============================================\n");
    }

    run_full_pipeline(&args, config)
}

fn run_full_pipeline(args: &Args, config: PipelineConfig) -> Result<()> {
    println!("=== Slotting Pipeline ===\n");

    let start_time = Instant::now();

    // Step 1: Load and clean transactions
    if args.verbose {
        println!("Step 1: Loading transactions");
        println!("  Input file: {}", args.input);
    }

    let data_start = Instant::now();
    let data = load_transactions(&args.input)?;
    let data_time = data_start.elapsed();

    println!(
        "✓ Data loaded: {} line items, {} orders, {} products",
        data.records.len(),
        data.unique_orders(),
        data.catalog.len()
    );
    if args.verbose {
        println!("  Processing time: {:.2}s", data_time.as_secs_f64());
    }

    let mut pipeline = Pipeline::new(data.records, data.catalog, config.clone());

    // Step 2: Basket matrix
    let basket_start = Instant::now();
    let stats = pipeline.build_baskets()?.statistics();
    println!(
        "✓ Basket matrix: {} baskets x {} products (sparsity {:.3})",
        stats.total_baskets, stats.total_products, stats.sparsity
    );
    if args.verbose {
        println!("  Min support: {}", config.min_support);
        println!(
            "  Products per basket: avg {:.2}, max {}",
            stats.avg_products_per_basket, stats.max_products_in_basket
        );
        println!("  Build time: {:.2}s", basket_start.elapsed().as_secs_f64());
    }

    // Step 3: Similarity
    let similarity_start = Instant::now();
    let stats = pipeline.compute_similarity()?.statistics();
    println!(
        "✓ {} similarity: {} non-zero pairs, mean {:.3}",
        config.metric, stats.total_pairs, stats.mean_similarity
    );
    if args.verbose {
        println!(
            "  Similarity time: {:.2}s",
            similarity_start.elapsed().as_secs_f64()
        );
    }

    // Step 4: Clustering
    let cluster_start = Instant::now();
    let n_clusters = pipeline.cluster()?.n_clusters();
    println!(
        "✓ Clustered into {} groups ({} linkage)",
        n_clusters, config.linkage
    );
    if args.verbose {
        println!("  Clustering time: {:.2}s", cluster_start.elapsed().as_secs_f64());
    }

    // Step 5: Recommendations
    let mut sink = JsonReportSink::new(&args.output, config.clone());
    let recommendations = pipeline.recommend(Some(&mut sink))?;
    viz::print_recommendations(&recommendations);

    // Step 6: Plots
    if let Some(plot_path) = &args.plot {
        if args.verbose {
            println!("\nGenerating visualizations");
            println!("  Output file: {}", plot_path);
        }
        let viz_start = Instant::now();
        viz::generate_visualization_report(
            pipeline.basket_matrix()?,
            pipeline.similarity()?,
            pipeline.clustering()?,
            plot_path,
            30,
        )?;
        println!("\n✓ Visualizations generated");
        if args.verbose {
            println!("  Visualization time: {:.2}s", viz_start.elapsed().as_secs_f64());
        }
    }

    let total_time = start_time.elapsed();
    println!("\n=== Pipeline Complete ===");
    println!("Total processing time: {:.2}s", total_time.as_secs_f64());
    println!("Recommendations saved to: {}", sink.path().display());

    Ok(())
}
