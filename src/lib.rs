//! # Listing Tracker
//!
//! A durable per-model store for classifieds listings with append-only
//! price history.
//!
//! ## Core Concepts
//!
//! - **Snapshots**: One validated observation of a listing at scrape time
//! - **Tracked listings**: Latest metadata plus every retained price change
//! - **Merge**: A pure transition from one store value to the next per batch
//! - **History rows**: A flattened, restartable time series for analysis
//!
//! ## Example
//!
//! ```ignore
//! use listing_tracker::{HistoryStore, ScrapeContext, StoreConfig};
//!
//! let store = HistoryStore::open(StoreConfig {
//!     data_dir: "./data".into(),
//!     ..Default::default()
//! })?;
//!
//! // Merge one scrape run
//! let report = store.merge_batch("lexus-lc", &records, Some(&ScrapeContext::now()))?;
//! println!("{report}");
//!
//! // Read the time series back
//! for row in store.get_historical_data("lexus-lc")?.rows() {
//!     println!("{} {} {}", row.id, row.scrape_date, row.price);
//! }
//! ```

pub mod error;
pub mod export;
pub mod query;
pub mod records;
pub mod state;
pub mod stats;
pub mod store;
pub mod types;

// Re-exports
pub use error::{Result, StoreError, ValidationError};
pub use export::ExportFormat;
pub use query::{HistoricalData, HistoryRow, HistoryRows};
pub use records::{normalize, normalize_batch, IdentityStrategy, NormalizedBatch, RawRecord, ScrapeContext};
pub use state::apply_batch;
pub use stats::{year_analysis, DataStatus, SummaryStats, YearSummary};
pub use store::{HistoryStore, StoreConfig};
pub use types::*;
