//! Summaries over a model store for status reports and analysis.

use crate::types::{ListingStatus, ModelStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One line of a status report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataStatus {
    pub model: String,
    pub listing_count: usize,
    pub reading_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

impl DataStatus {
    pub fn of(store: &ModelStore) -> Self {
        Self {
            model: store.metadata.model.clone(),
            listing_count: store.len(),
            reading_count: store.reading_count(),
            last_updated: store.metadata.last_updated,
        }
    }
}

/// Aggregate statistics for one model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub model: String,
    pub total_listings: usize,
    pub active_listings: usize,
    pub disappeared_listings: usize,
    /// Listings with more than one reading.
    pub listings_with_price_changes: usize,
    pub reading_count: usize,
    pub average_current_price: Option<f64>,
    pub median_current_price: Option<f64>,
}

impl SummaryStats {
    pub fn of(store: &ModelStore) -> Self {
        let prices: Vec<u64> = store
            .listings
            .values()
            .filter_map(|l| l.current_price())
            .collect();

        let mut active = 0;
        let mut disappeared = 0;
        for listing in store.listings.values() {
            match listing.status {
                ListingStatus::Active => active += 1,
                ListingStatus::Disappeared => disappeared += 1,
            }
        }

        Self {
            model: store.metadata.model.clone(),
            total_listings: store.len(),
            active_listings: active,
            disappeared_listings: disappeared,
            listings_with_price_changes: store
                .listings
                .values()
                .filter(|l| l.price_readings.len() > 1)
                .count(),
            reading_count: store.reading_count(),
            average_current_price: mean(&prices),
            median_current_price: median(prices),
        }
    }
}

/// Price statistics for listings of one manufacturing year.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct YearSummary {
    pub year: i32,
    /// Unique listings of this year.
    pub count: usize,
    pub avg_price: f64,
    pub median_price: f64,
    pub min_price: u64,
    pub max_price: u64,
    /// Over listings that report a mileage.
    pub avg_mileage: Option<f64>,
}

/// Per-year breakdown of current prices, ascending by year.
/// Listings without a year are left out.
pub fn year_analysis(store: &ModelStore) -> Vec<YearSummary> {
    let mut by_year: BTreeMap<i32, (Vec<u64>, Vec<u64>)> = BTreeMap::new();

    for listing in store.listings.values() {
        let (Some(year), Some(price)) = (listing.year, listing.current_price()) else {
            continue;
        };
        let entry = by_year.entry(year).or_default();
        entry.0.push(price);
        if let Some(mileage) = listing.mileage {
            entry.1.push(mileage);
        }
    }

    by_year
        .into_iter()
        .filter_map(|(year, (prices, mileages))| {
            Some(YearSummary {
                year,
                count: prices.len(),
                avg_price: mean(&prices)?,
                min_price: *prices.iter().min()?,
                max_price: *prices.iter().max()?,
                avg_mileage: mean(&mileages),
                median_price: median(prices)?,
            })
        })
        .collect()
}

fn mean(values: &[u64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64)
}

fn median(mut values: Vec<u64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] as f64 + values[mid] as f64) / 2.0)
    } else {
        Some(values[mid] as f64)
    }
}
