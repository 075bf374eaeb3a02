//! Flattened time-series view of a model store.

use crate::types::{price_delta, ListingStatus, ModelStore, Timestamp, TrackedListing};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;

/// One (listing, price reading) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub id: String,
    pub scrape_date: NaiveDate,
    pub scrape_timestamp: Timestamp,
    pub price: u64,
    /// Difference from the previous reading, zero for the first one.
    pub price_change: i64,
    pub year: Option<i32>,
    pub mileage: Option<u64>,
    pub title: String,
    pub url: String,
    pub status: ListingStatus,
}

/// Lazy iterator over the rows of a store, ordered by id then timestamp.
pub struct HistoryRows<'a> {
    listings: btree_map::Values<'a, String, TrackedListing>,
    current: Option<&'a TrackedListing>,
    position: usize,
}

impl<'a> HistoryRows<'a> {
    pub fn new(store: &'a ModelStore) -> Self {
        Self {
            listings: store.listings.values(),
            current: None,
            position: 0,
        }
    }
}

impl Iterator for HistoryRows<'_> {
    type Item = HistoryRow;

    fn next(&mut self) -> Option<HistoryRow> {
        loop {
            let listing = match self.current {
                Some(listing) if self.position < listing.price_readings.len() => listing,
                _ => {
                    self.current = Some(self.listings.next()?);
                    self.position = 0;
                    continue;
                }
            };

            let reading = &listing.price_readings[self.position];
            let price_change = match self.position.checked_sub(1) {
                Some(prev) => price_delta(listing.price_readings[prev].price, reading.price),
                None => 0,
            };
            self.position += 1;

            return Some(HistoryRow {
                id: listing.id.clone(),
                scrape_date: reading.scrape_date,
                scrape_timestamp: reading.scrape_timestamp,
                price: reading.price,
                price_change,
                year: listing.year,
                mileage: listing.mileage,
                title: listing.title.clone(),
                url: listing.url.clone(),
                status: listing.status,
            });
        }
    }
}

/// A loaded store exposed read-only as a row sequence.
///
/// Every call to [`rows`](Self::rows) starts a fresh pass; nothing is cached.
#[derive(Clone, Debug)]
pub struct HistoricalData {
    store: ModelStore,
}

impl HistoricalData {
    pub fn new(store: ModelStore) -> Self {
        Self { store }
    }

    pub fn model(&self) -> &str {
        self.store.model()
    }

    pub fn rows(&self) -> HistoryRows<'_> {
        HistoryRows::new(&self.store)
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn into_store(self) -> ModelStore {
        self.store
    }
}
