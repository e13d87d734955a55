//! Market basket construction
//!
//! Turns order line items into a binary order x product membership matrix
//! restricted to products that appear in at least `min_support` orders.

use crate::data::TransactionRecord;
use crate::error::SlottingError;
use ndarray::{Array2, Axis};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Binary basket membership matrix.
///
/// Rows are orders that kept at least two frequent products, columns are the
/// frequent product ids in ascending order.
#[derive(Debug, Clone)]
pub struct BasketMatrix {
    orders: Vec<String>,
    products: Vec<String>,
    cells: Array2<u8>,
    min_support: usize,
}

/// Shape and density figures for a basket matrix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasketStatistics {
    pub total_baskets: usize,
    pub total_products: usize,
    pub avg_products_per_basket: f64,
    pub max_products_in_basket: usize,
    pub min_products_in_basket: usize,
    /// Fraction of zero cells
    pub sparsity: f64,
}

impl BasketMatrix {
    /// Order ids, one per row
    pub fn orders(&self) -> &[String] {
        &self.orders
    }

    /// Product ids, one per column
    pub fn products(&self) -> &[String] {
        &self.products
    }

    pub fn cells(&self) -> &Array2<u8> {
        &self.cells
    }

    pub fn n_baskets(&self) -> usize {
        self.cells.nrows()
    }

    pub fn n_products(&self) -> usize {
        self.cells.ncols()
    }

    /// Support threshold the columns were selected with
    pub fn min_support(&self) -> usize {
        self.min_support
    }

    /// Number of baskets containing each column's product
    pub fn column_counts(&self) -> Vec<usize> {
        self.cells
            .map(|&c| c as usize)
            .sum_axis(Axis(0))
            .to_vec()
    }

    pub fn statistics(&self) -> BasketStatistics {
        let row_sizes: Vec<usize> = self
            .cells
            .map(|&c| c as usize)
            .sum_axis(Axis(1))
            .to_vec();
        let total_cells = self.cells.len();
        let filled: usize = row_sizes.iter().sum();

        BasketStatistics {
            total_baskets: self.n_baskets(),
            total_products: self.n_products(),
            avg_products_per_basket: filled as f64 / self.n_baskets().max(1) as f64,
            max_products_in_basket: row_sizes.iter().copied().max().unwrap_or(0),
            min_products_in_basket: row_sizes.iter().copied().min().unwrap_or(0),
            sparsity: if total_cells == 0 {
                0.0
            } else {
                (total_cells - filled) as f64 / total_cells as f64
            },
        }
    }

    /// Basket count per product, most frequent first (ties by product id)
    pub fn product_frequency(&self) -> Vec<(String, usize)> {
        let mut frequency: Vec<(String, usize)> = self
            .products
            .iter()
            .cloned()
            .zip(self.column_counts())
            .collect();
        frequency.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        frequency
    }

    /// Restrict the matrix to products present in at least `min_frequency`
    /// baskets, dropping rows that fall below two products.
    pub fn filter_by_frequency(&self, min_frequency: usize) -> crate::Result<BasketMatrix> {
        let keep: Vec<usize> = self
            .column_counts()
            .into_iter()
            .enumerate()
            .filter(|&(_, count)| count >= min_frequency)
            .map(|(j, _)| j)
            .collect();

        let rows: Vec<usize> = (0..self.n_baskets())
            .filter(|&i| keep.iter().filter(|&&j| self.cells[[i, j]] == 1).count() >= 2)
            .collect();

        if rows.is_empty() {
            return Err(SlottingError::EmptyResult(format!(
                "no basket keeps two products with frequency >= {}",
                min_frequency
            )));
        }

        let cells = self
            .cells
            .select(Axis(1), &keep)
            .select(Axis(0), &rows);

        info!(
            "Filtered basket matrix to {} products (min_frequency={})",
            keep.len(),
            min_frequency
        );

        Ok(BasketMatrix {
            orders: rows.iter().map(|&i| self.orders[i].clone()).collect(),
            products: keep.iter().map(|&j| self.products[j].clone()).collect(),
            cells,
            min_support: self.min_support,
        })
    }
}

/// Build the binary basket matrix from line items
///
/// # Arguments
/// * `records` - Order line items; duplicates within an order count once
/// * `min_support` - Minimum number of orders a product must appear in
///
/// # Returns
/// * `BasketMatrix` with sorted product columns and sorted order rows
pub fn build_baskets(
    records: &[TransactionRecord],
    min_support: usize,
) -> crate::Result<BasketMatrix> {
    if min_support == 0 {
        return Err(SlottingError::InvalidParameter(
            "min_support must be at least 1".to_string(),
        ));
    }

    let mut baskets: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for record in records {
        baskets
            .entry(record.order_id.as_str())
            .or_default()
            .insert(record.product_id.as_str());
    }

    let mut support: HashMap<&str, usize> = HashMap::new();
    for items in baskets.values() {
        for &product in items {
            *support.entry(product).or_insert(0) += 1;
        }
    }

    let mut frequent: Vec<&str> = support
        .iter()
        .filter(|(_, &count)| count >= min_support)
        .map(|(&product, _)| product)
        .collect();
    frequent.sort_unstable();

    info!(
        "Found {} frequent products (min_support={})",
        frequent.len(),
        min_support
    );

    let column: HashMap<&str, usize> = frequent
        .iter()
        .enumerate()
        .map(|(j, &product)| (product, j))
        .collect();

    // Single-item baskets carry no co-occurrence signal
    let rows: Vec<(&str, Vec<usize>)> = baskets
        .iter()
        .filter_map(|(&order, items)| {
            let columns: Vec<usize> = items
                .iter()
                .filter_map(|product| column.get(product).copied())
                .collect();
            (columns.len() >= 2).then_some((order, columns))
        })
        .collect();

    debug!(
        "{} of {} baskets kept at least two frequent products",
        rows.len(),
        baskets.len()
    );

    if rows.is_empty() {
        return Err(SlottingError::EmptyResult(format!(
            "no order contains two products with support >= {}",
            min_support
        )));
    }

    let mut cells = Array2::<u8>::zeros((rows.len(), frequent.len()));
    for (i, (_, columns)) in rows.iter().enumerate() {
        for &j in columns {
            cells[[i, j]] = 1;
        }
    }

    info!("Created basket matrix: {} x {}", cells.nrows(), cells.ncols());

    Ok(BasketMatrix {
        orders: rows.iter().map(|(order, _)| order.to_string()).collect(),
        products: frequent.iter().map(|p| p.to_string()).collect(),
        cells,
        min_support,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders(layout: &[(&str, &[&str])]) -> Vec<TransactionRecord> {
        layout
            .iter()
            .flat_map(|(order, products)| {
                products
                    .iter()
                    .map(move |p| TransactionRecord::new(*order, *p, 1, 1.0))
            })
            .collect()
    }

    #[test]
    fn test_build_baskets_scenario() {
        let records = orders(&[
            ("O1", &["A", "B"]),
            ("O2", &["A", "B", "C"]),
            ("O3", &["A", "B"]),
            ("O4", &["C", "D"]),
        ]);

        let matrix = build_baskets(&records, 1).unwrap();

        assert_eq!(matrix.products(), &["A", "B", "C", "D"]);
        assert_eq!(matrix.orders(), &["O1", "O2", "O3", "O4"]);
        assert_eq!(matrix.column_counts(), vec![3, 3, 2, 1]);
        assert_eq!(matrix.cells()[[1, 2]], 1);
        assert_eq!(matrix.cells()[[0, 2]], 0);
    }

    #[test]
    fn test_support_and_row_invariants() {
        let records = orders(&[
            ("O1", &["A", "B", "X"]),
            ("O2", &["A", "B"]),
            ("O3", &["A", "C"]),
            ("O4", &["B", "Y"]),
            ("O5", &["C", "A", "B"]),
        ]);

        let matrix = build_baskets(&records, 2).unwrap();

        // X and Y appear once and are dropped; O4 keeps only B
        assert_eq!(matrix.products(), &["A", "B", "C"]);
        assert_eq!(matrix.orders(), &["O1", "O2", "O3", "O5"]);

        for row in matrix.cells().rows() {
            assert!(row.iter().filter(|&&c| c == 1).count() >= 2);
        }

        // Support is measured over all orders, not only the surviving ones
        let mut support: HashMap<&str, usize> = HashMap::new();
        for record in &records {
            *support.entry(record.product_id.as_str()).or_insert(0) += 1;
        }
        for product in matrix.products() {
            assert!(support[product.as_str()] >= 2);
        }
    }

    #[test]
    fn test_duplicate_lines_count_once() {
        let records = vec![
            TransactionRecord::new("O1", "A", 1, 1.0),
            TransactionRecord::new("O1", "A", 4, 1.0),
            TransactionRecord::new("O1", "B", 1, 1.0),
        ];

        let matrix = build_baskets(&records, 1).unwrap();
        assert_eq!(matrix.n_baskets(), 1);
        assert_eq!(matrix.column_counts(), vec![1, 1]);
    }

    #[test]
    fn test_empty_result() {
        let records = orders(&[("O1", &["A"]), ("O2", &["B"])]);
        let result = build_baskets(&records, 1);
        assert!(matches!(result, Err(SlottingError::EmptyResult(_))));

        let records = orders(&[("O1", &["A", "B"])]);
        let result = build_baskets(&records, 2);
        assert!(matches!(result, Err(SlottingError::EmptyResult(_))));
    }

    #[test]
    fn test_zero_support_rejected() {
        let records = orders(&[("O1", &["A", "B"])]);
        assert!(matches!(
            build_baskets(&records, 0),
            Err(SlottingError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_statistics_and_frequency() {
        let records = orders(&[
            ("O1", &["A", "B"]),
            ("O2", &["A", "B", "C"]),
            ("O3", &["A", "B"]),
            ("O4", &["C", "D"]),
        ]);
        let matrix = build_baskets(&records, 1).unwrap();

        let stats = matrix.statistics();
        assert_eq!(stats.total_baskets, 4);
        assert_eq!(stats.total_products, 4);
        assert_eq!(stats.max_products_in_basket, 3);
        assert_eq!(stats.min_products_in_basket, 2);
        assert!((stats.avg_products_per_basket - 2.25).abs() < 1e-12);
        assert!((stats.sparsity - 7.0 / 16.0).abs() < 1e-12);

        let frequency = matrix.product_frequency();
        assert_eq!(frequency[0], ("A".to_string(), 3));
        assert_eq!(frequency[1], ("B".to_string(), 3));
        assert_eq!(frequency[3], ("D".to_string(), 1));
    }

    #[test]
    fn test_filter_by_frequency() {
        let records = orders(&[
            ("O1", &["A", "B"]),
            ("O2", &["A", "B", "C"]),
            ("O3", &["A", "B"]),
            ("O4", &["C", "D"]),
        ]);
        let matrix = build_baskets(&records, 1).unwrap();

        let filtered = matrix.filter_by_frequency(2).unwrap();
        assert_eq!(filtered.products(), &["A", "B", "C"]);
        // O4 only keeps C
        assert_eq!(filtered.orders(), &["O1", "O2", "O3"]);

        assert!(matrix.filter_by_frequency(4).is_err());
    }
}
