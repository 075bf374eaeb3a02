//! Core types for the listing store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ValidationError;

/// Seconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp())
    }

    /// Midnight UTC of the given date.
    pub fn start_of(date: NaiveDate) -> Self {
        Timestamp(date.and_hms_opt(0, 0, 0).map_or(0, |dt| dt.and_utc().timestamp()))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed change from `from` to `to`, saturating at the `i64` bounds.
pub fn price_delta(from: u64, to: u64) -> i64 {
    let delta = to as i128 - from as i128;
    delta.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// One observation of a listing at scrape time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    /// Site-native identifier.
    pub id: String,
    pub title: String,
    pub price: u64,
    pub year: Option<i32>,
    pub mileage: Option<u64>,
    pub url: String,
    /// Storage grouping key.
    pub model: String,
    pub scrape_date: NaiveDate,
    pub scrape_timestamp: Timestamp,
}

/// One retained price point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    pub price: u64,
    pub scrape_date: NaiveDate,
    pub scrape_timestamp: Timestamp,
}

impl PriceReading {
    pub fn from_snapshot(snapshot: &ListingSnapshot) -> Self {
        Self {
            price: snapshot.price,
            scrape_date: snapshot.scrape_date,
            scrape_timestamp: snapshot.scrape_timestamp,
        }
    }
}

/// Whether a listing was present in the most recent non-empty batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Disappeared,
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingStatus::Active => f.write_str("active"),
            ListingStatus::Disappeared => f.write_str("disappeared"),
        }
    }
}

/// The persisted aggregate for one listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedListing {
    pub id: String,
    pub title: String,
    pub year: Option<i32>,
    pub mileage: Option<u64>,
    pub url: String,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub status: ListingStatus,

    /// Price changes in scrape order. Never empty, never truncated.
    pub price_readings: Vec<PriceReading>,
}

impl TrackedListing {
    /// Start tracking a listing from its first observation.
    pub fn from_snapshot(id: impl Into<String>, snapshot: &ListingSnapshot) -> Self {
        Self {
            id: id.into(),
            title: snapshot.title.clone(),
            year: snapshot.year,
            mileage: snapshot.mileage,
            url: snapshot.url.clone(),
            first_seen: snapshot.scrape_date,
            last_seen: snapshot.scrape_date,
            status: ListingStatus::Active,
            price_readings: vec![PriceReading::from_snapshot(snapshot)],
        }
    }

    /// Most recent reading.
    pub fn latest_reading(&self) -> Option<&PriceReading> {
        self.price_readings.last()
    }

    /// Current price (price of the latest reading).
    pub fn current_price(&self) -> Option<u64> {
        self.latest_reading().map(|r| r.price)
    }

    pub fn is_active(&self) -> bool {
        self.status == ListingStatus::Active
    }

    /// Check the structural invariants of a single listing.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.price_readings.is_empty() {
            return Err(format!("listing {} has no price readings", self.id));
        }
        if self.first_seen > self.last_seen {
            return Err(format!(
                "listing {} first_seen {} is after last_seen {}",
                self.id, self.first_seen, self.last_seen
            ));
        }
        for pair in self.price_readings.windows(2) {
            if pair[1].scrape_timestamp <= pair[0].scrape_timestamp {
                return Err(format!(
                    "listing {} readings out of order at timestamp {}",
                    self.id, pair[1].scrape_timestamp
                ));
            }
        }
        for reading in &self.price_readings {
            if reading.scrape_date < self.first_seen || reading.scrape_date > self.last_seen {
                return Err(format!(
                    "listing {} reading dated {} outside [{}, {}]",
                    self.id, reading.scrape_date, self.first_seen, self.last_seen
                ));
            }
        }
        Ok(())
    }
}

/// Store-level bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub model: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub total_listings: usize,
}

/// Top-level persisted unit: every listing ever seen for one model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStore {
    pub metadata: StoreMetadata,

    /// Listings keyed by identity. Ordered so the persisted form is stable.
    pub listings: BTreeMap<String, TrackedListing>,
}

impl ModelStore {
    /// A freshly initialized, empty store.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            metadata: StoreMetadata {
                model: model.into(),
                last_updated: None,
                total_listings: 0,
            },
            listings: BTreeMap::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.metadata.model
    }

    pub fn get(&self, id: &str) -> Option<&TrackedListing> {
        self.listings.get(id)
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// Total readings across all listings.
    pub fn reading_count(&self) -> usize {
        self.listings.values().map(|l| l.price_readings.len()).sum()
    }

    /// Check every invariant a loaded store must satisfy.
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (key, listing) in &self.listings {
            if key != &listing.id {
                return Err(format!("listing keyed {key} carries id {}", listing.id));
            }
            listing.validate()?;
        }
        if self.metadata.total_listings != self.listings.len() {
            return Err(format!(
                "metadata counts {} listings, found {}",
                self.metadata.total_listings,
                self.listings.len()
            ));
        }
        Ok(())
    }
}

/// One raw record the normalizer refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    /// Position in the input batch.
    pub index: usize,
    /// The record's `id`, when it had a readable one.
    pub id: Option<String>,
    pub error: ValidationError,
}

/// Outcome of merging one batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub model: String,
    pub inserted: usize,
    /// Known listings whose price changed.
    pub updated: usize,
    pub unchanged: usize,
    /// Listings newly marked disappeared by this batch.
    pub disappeared: usize,
    /// Previously disappeared listings seen again (also counted as updated or unchanged).
    pub reappeared: usize,
    pub rejected: usize,
    pub rejections: Vec<Rejection>,
    pub total_listings: usize,
}

impl MergeReport {
    /// Number of snapshots that reached the merge engine.
    pub fn merged(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} total listings, {} new, {} price changes, {} unchanged, {} disappeared, {} rejected",
            self.model,
            self.total_listings,
            self.inserted,
            self.updated,
            self.unchanged,
            self.disappeared,
            self.rejected
        )
    }
}
