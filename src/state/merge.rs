//! Batch merge into a model store.

use crate::records::IdentityStrategy;
use crate::types::{
    price_delta, ListingSnapshot, ListingStatus, MergeReport, ModelStore, PriceReading,
    TrackedListing,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Merge one scrape batch into a store.
///
/// Pure: the caller supplies the update time and persists the result.
/// Snapshots are assumed to belong to the store's model.
/// An empty batch returns the store untouched, since zero records more
/// likely means a failed scrape than an empty market.
pub fn apply_batch(
    mut store: ModelStore,
    snapshots: &[ListingSnapshot],
    identity: IdentityStrategy,
    updated_at: DateTime<Utc>,
) -> (ModelStore, MergeReport) {
    let mut report = MergeReport {
        model: store.metadata.model.clone(),
        total_listings: store.len(),
        ..Default::default()
    };

    if snapshots.is_empty() {
        return (store, report);
    }

    // Collapse duplicates: last occurrence wins, first occurrence keeps its slot.
    let mut order: Vec<(String, &ListingSnapshot)> = Vec::with_capacity(snapshots.len());
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(snapshots.len());
    for snapshot in snapshots {
        let key = identity.resolve(snapshot);
        match slots.get(&key) {
            Some(&slot) => order[slot].1 = snapshot,
            None => {
                slots.insert(key.clone(), order.len());
                order.push((key, snapshot));
            }
        }
    }

    let seen: HashSet<&str> = order.iter().map(|(key, _)| key.as_str()).collect();

    // Anything tracked before this batch but not in it has left the site.
    for (key, listing) in store.listings.iter_mut() {
        if !seen.contains(key.as_str()) && listing.status == ListingStatus::Active {
            listing.status = ListingStatus::Disappeared;
            report.disappeared += 1;
        }
    }

    for (key, snapshot) in order {
        match store.listings.get_mut(&key) {
            None => {
                store
                    .listings
                    .insert(key.clone(), TrackedListing::from_snapshot(key, snapshot));
                report.inserted += 1;
            }
            Some(listing) => {
                if listing.status == ListingStatus::Disappeared {
                    report.reappeared += 1;
                }
                if observe(listing, snapshot) {
                    report.updated += 1;
                } else {
                    report.unchanged += 1;
                }
            }
        }
    }

    store.metadata.total_listings = store.len();
    store.metadata.last_updated = Some(updated_at);
    report.total_listings = store.len();

    (store, report)
}

/// Apply an observation to a known listing. Returns true if a reading was appended.
fn observe(listing: &mut TrackedListing, snapshot: &ListingSnapshot) -> bool {
    listing.title = snapshot.title.clone();
    listing.url = snapshot.url.clone();
    listing.year = snapshot.year;
    listing.mileage = snapshot.mileage;
    listing.status = ListingStatus::Active;
    listing.last_seen = listing.last_seen.max(snapshot.scrape_date);

    let Some(last) = listing.latest_reading() else {
        listing.price_readings.push(PriceReading::from_snapshot(snapshot));
        listing.first_seen = listing.first_seen.min(snapshot.scrape_date);
        return true;
    };

    if last.price == snapshot.price {
        return false;
    }

    // Replayed or out-of-order batches never rewrite history. Both the
    // timestamp and the date must move forward, since a record may carry
    // its own date while the run supplies the timestamp.
    if snapshot.scrape_timestamp <= last.scrape_timestamp
        || snapshot.scrape_date < last.scrape_date
    {
        debug!(
            id = %listing.id,
            timestamp = %snapshot.scrape_timestamp,
            date = %snapshot.scrape_date,
            last = %last.scrape_timestamp,
            last_date = %last.scrape_date,
            "Ignoring stale price observation"
        );
        return false;
    }

    debug!(
        id = %listing.id,
        from = last.price,
        to = snapshot.price,
        change = price_delta(last.price, snapshot.price),
        "Price change detected"
    );
    listing.price_readings.push(PriceReading::from_snapshot(snapshot));
    true
}
