//! Transaction loading and product summaries using Polars

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Description used when a product has no metadata
pub const MISSING_DESCRIPTION: &str = "N/A";

/// A single order line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Order (invoice) identifier
    pub order_id: String,
    /// Product (stock code) identifier
    pub product_id: String,
    /// Free-text product description, if the source carried one
    pub description: Option<String>,
    /// Units ordered
    pub quantity: i64,
    /// Price per unit
    pub unit_price: f64,
}

impl TransactionRecord {
    pub fn new(
        order_id: impl Into<String>,
        product_id: impl Into<String>,
        quantity: i64,
        unit_price: f64,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            product_id: product_id.into(),
            description: None,
            quantity,
            unit_price,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Per-product aggregate over the whole transaction snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub product_id: String,
    pub description: String,
    pub avg_unit_price: f64,
    pub total_quantity: i64,
    /// Number of distinct orders containing the product
    pub order_count: usize,
}

/// Product metadata keyed by product id
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    products: HashMap<String, ProductSummary>,
}

impl ProductCatalog {
    /// Build a catalog from an existing summary table
    pub fn from_summaries(summaries: impl IntoIterator<Item = ProductSummary>) -> Self {
        let products = summaries
            .into_iter()
            .map(|summary| (summary.product_id.clone(), summary))
            .collect();
        Self { products }
    }

    /// Aggregate line items into per-product summaries.
    ///
    /// The description is the first non-empty one seen for the product.
    pub fn from_records(records: &[TransactionRecord]) -> Self {
        struct Accumulator<'a> {
            description: Option<&'a str>,
            price_sum: f64,
            lines: usize,
            quantity: i64,
            orders: HashSet<&'a str>,
        }

        let mut acc: HashMap<&str, Accumulator> = HashMap::new();
        for record in records {
            let entry = acc
                .entry(record.product_id.as_str())
                .or_insert_with(|| Accumulator {
                    description: None,
                    price_sum: 0.0,
                    lines: 0,
                    quantity: 0,
                    orders: HashSet::new(),
                });
            if entry.description.is_none() {
                entry.description = record.description.as_deref().filter(|d| !d.is_empty());
            }
            entry.price_sum += record.unit_price;
            entry.lines += 1;
            entry.quantity += record.quantity;
            entry.orders.insert(record.order_id.as_str());
        }

        let products = acc
            .into_iter()
            .map(|(product_id, a)| {
                let summary = ProductSummary {
                    product_id: product_id.to_string(),
                    description: a.description.unwrap_or(MISSING_DESCRIPTION).to_string(),
                    avg_unit_price: a.price_sum / a.lines as f64,
                    total_quantity: a.quantity,
                    order_count: a.orders.len(),
                };
                (product_id.to_string(), summary)
            })
            .collect();

        Self { products }
    }

    pub fn get(&self, product_id: &str) -> Option<&ProductSummary> {
        self.products.get(product_id)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Summaries sorted by product id
    pub fn summaries(&self) -> Vec<&ProductSummary> {
        let mut all: Vec<&ProductSummary> = self.products.values().collect();
        all.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        all
    }
}

/// Cleaned transactions together with their product catalog
#[derive(Debug, Clone)]
pub struct TransactionData {
    pub records: Vec<TransactionRecord>,
    pub catalog: ProductCatalog,
}

impl TransactionData {
    pub fn unique_orders(&self) -> usize {
        self.records
            .iter()
            .map(|r| r.order_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Load an Online Retail style CSV and clean it into transaction records
///
/// # Arguments
/// * `file_path` - Path to a CSV with InvoiceNo, StockCode, Description,
///   Quantity and UnitPrice columns
///
/// # Returns
/// * `TransactionData` with cleaned line items and aggregated product summaries
pub fn load_transactions(file_path: &str) -> crate::AnyResult<TransactionData> {
    // Read every column as text so numeric-looking stock codes stay strings
    let df = LazyCsvReader::new(file_path)
        .has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()?
        .filter(
            col("InvoiceNo")
                .is_not_null()
                .and(col("StockCode").is_not_null())
                .and(col("Description").is_not_null()),
        )
        .with_columns([
            col("Quantity").cast(DataType::Int64),
            col("UnitPrice").cast(DataType::Float64),
        ])
        .filter(
            col("Quantity")
                .gt(lit(0))
                .and(col("UnitPrice").is_not_null())
                // Cancelled invoices are prefixed with "C"
                .and(col("InvoiceNo").str().starts_with(lit("C")).not()),
        )
        .collect()?;

    let records = extract_records(&df)?;
    if records.is_empty() {
        anyhow::bail!("No valid transactions found after cleaning");
    }

    let catalog = ProductCatalog::from_records(&records);
    Ok(TransactionData { records, catalog })
}

/// Convert the cleaned DataFrame into owned records, trimming identifiers
fn extract_records(df: &DataFrame) -> crate::AnyResult<Vec<TransactionRecord>> {
    let invoices = df.column("InvoiceNo")?.str()?;
    let stock_codes = df.column("StockCode")?.str()?;
    let descriptions = df.column("Description")?.str()?;
    let quantities = df.column("Quantity")?.i64()?;
    let prices = df.column("UnitPrice")?.f64()?;

    let mut records = Vec::with_capacity(df.height());
    for ((((invoice, stock_code), description), quantity), price) in invoices
        .into_iter()
        .zip(stock_codes.into_iter())
        .zip(descriptions.into_iter())
        .zip(quantities.into_iter())
        .zip(prices.into_iter())
    {
        let (Some(invoice), Some(stock_code), Some(description), Some(quantity), Some(price)) =
            (invoice, stock_code, description, quantity, price)
        else {
            continue;
        };

        let order_id = invoice.trim();
        let product_id = stock_code.trim();
        let description = description.trim();
        if order_id.is_empty() || product_id.is_empty() || description.is_empty() {
            continue;
        }

        records.push(
            TransactionRecord::new(order_id, product_id, quantity, price)
                .with_description(description),
        );
    }

    Ok(records)
}
