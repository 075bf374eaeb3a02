//! Inbound record handling.
//!
//! Raw scraper output is validated into snapshots by the normalizer, and
//! each snapshot is keyed by the identity resolver.

mod identity;
mod normalizer;

pub use identity::IdentityStrategy;
pub use normalizer::{normalize, normalize_batch, NormalizedBatch, RawRecord, ScrapeContext};
