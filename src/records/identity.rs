//! Listing identity resolution.

use crate::types::ListingSnapshot;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How a snapshot maps to the key it is tracked under.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStrategy {
    /// Trust the site's own listing id.
    #[default]
    SiteId,

    /// SHA-256 of the listing URL, for sources whose ids get reissued.
    /// Falls back to the site id when the URL is empty.
    UrlHash,
}

impl IdentityStrategy {
    /// Resolve the identity of a snapshot. Depends only on stable fields.
    pub fn resolve(&self, snapshot: &ListingSnapshot) -> String {
        match self {
            IdentityStrategy::SiteId => snapshot.id.clone(),
            IdentityStrategy::UrlHash => {
                let url = snapshot.url.trim();
                if url.is_empty() {
                    snapshot.id.clone()
                } else {
                    hash_url(url)
                }
            }
        }
    }
}

fn hash_url(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
