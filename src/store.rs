//! Lookup interfaces for ticker resolution and per-firm metric listings.
//!
//! The production backing store lives outside this crate. The in-memory implementations
//! here serve demos, tests, and the ticker-pair listing shipped alongside reports.

use crate::error::{AnnotatorError, Result};
use crate::schema::{FocalFirm, MetricName};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Read;

#[async_trait]
pub trait TickerStore: Send + Sync {
    /// Resolve a ticker symbol to a firm identifier. `Ok(None)` means no such ticker.
    async fn resolve(&self, ticker: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Distinct metric names populated for the firm, in store order.
    async fn list_metrics(&self, firm_id: &str) -> Result<Vec<MetricName>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTickerStore {
    by_ticker: HashMap<String, String>,
}

impl InMemoryTickerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = FocalFirm>) -> Self {
        let mut store = Self::new();
        for pair in pairs {
            store.insert(pair.ticker, pair.firm_id);
        }
        store
    }

    pub fn insert(&mut self, ticker: impl Into<String>, firm_id: impl Into<String>) {
        self.by_ticker.insert(ticker.into(), firm_id.into());
    }

    pub fn len(&self) -> usize {
        self.by_ticker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ticker.is_empty()
    }
}

#[async_trait]
impl TickerStore for InMemoryTickerStore {
    async fn resolve(&self, ticker: &str) -> Result<Option<String>> {
        Ok(self.by_ticker.get(ticker).cloned())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryMetricsStore {
    by_firm: HashMap<String, Vec<MetricName>>,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics<I, S>(mut self, firm_id: impl Into<String>, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<MetricName>,
    {
        self.insert(firm_id, metrics);
        self
    }

    /// Replaces the firm's listing. Duplicates are dropped, first occurrence wins.
    pub fn insert<I, S>(&mut self, firm_id: impl Into<String>, metrics: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<MetricName>,
    {
        let mut listing: Vec<MetricName> = Vec::new();
        for metric in metrics {
            let metric = metric.into();
            if !listing.contains(&metric) {
                listing.push(metric);
            }
        }
        self.by_firm.insert(firm_id.into(), listing);
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn list_metrics(&self, firm_id: &str) -> Result<Vec<MetricName>> {
        Ok(self.by_firm.get(firm_id).cloned().unwrap_or_default())
    }
}

/// Parse a headerless `ticker,firm_id` listing. Blank or incomplete rows are skipped.
pub fn load_ticker_pairs<R: Read>(reader: R) -> Result<Vec<FocalFirm>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut pairs = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let ticker = record.get(0).unwrap_or_default();
        let firm_id = record.get(1).unwrap_or_default();
        if ticker.is_empty() || firm_id.is_empty() {
            continue;
        }
        pairs.push(FocalFirm::new(ticker, firm_id));
    }

    Ok(pairs)
}

pub fn load_ticker_pairs_from_path(path: &std::path::Path) -> Result<Vec<FocalFirm>> {
    let file = std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AnnotatorError::Config {
                key: "ticker_pairs_path".to_string(),
                details: format!("{} does not exist", path.display()),
            }
        } else {
            AnnotatorError::IoError(e)
        }
    })?;
    load_ticker_pairs(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_ticker_pairs_skips_incomplete_rows() {
        let listing = "JPM, 852218\n\nBAC,1073757\nWFC,\n  C , 1951350 \n";
        let pairs = load_ticker_pairs(listing.as_bytes()).unwrap();

        assert_eq!(
            pairs,
            vec![
                FocalFirm::new("JPM", "852218"),
                FocalFirm::new("BAC", "1073757"),
                FocalFirm::new("C", "1951350"),
            ]
        );
    }

    #[test]
    fn test_missing_listing_is_config_error() {
        let result = load_ticker_pairs_from_path(std::path::Path::new(
            "/nonexistent/updated_ticker_rssd_id_pairs.csv",
        ));
        assert!(matches!(result, Err(AnnotatorError::Config { .. })));
    }

    #[tokio::test]
    async fn test_in_memory_ticker_store() {
        let store = InMemoryTickerStore::from_pairs(vec![FocalFirm::new("JPM", "852218")]);

        assert_eq!(store.resolve("JPM").await.unwrap(), Some("852218".to_string()));
        assert_eq!(store.resolve("jpm").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_in_memory_metrics_store_dedupes() {
        let store = InMemoryMetricsStore::new().with_metrics(
            "852218",
            ["Net Income", "Total Assets", "Net Income"],
        );

        assert_eq!(
            store.list_metrics("852218").await.unwrap(),
            vec!["Net Income".to_string(), "Total Assets".to_string()]
        );
        assert!(store.list_metrics("0").await.unwrap().is_empty());
    }
}
