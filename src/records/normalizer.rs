//! Validation of raw scraped records into typed snapshots.
//!
//! The scraper hands over loosely-typed maps. Everything that crosses into
//! the merge engine goes through [`normalize`] first, so the rest of the
//! crate only ever sees [`ListingSnapshot`].

use crate::error::ValidationError;
use crate::types::{ListingSnapshot, Rejection, Timestamp};
use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::warn;

/// A raw listing record as produced by the scraper.
pub type RawRecord = Map<String, Value>;

/// Scrape-run time stamped onto records that do not carry their own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrapeContext {
    pub date: NaiveDate,
    pub timestamp: Timestamp,
}

impl ScrapeContext {
    pub fn new(date: NaiveDate, timestamp: Timestamp) -> Self {
        Self { date, timestamp }
    }

    /// The current time.
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            date: now.date_naive(),
            timestamp: Timestamp(now.timestamp()),
        }
    }

    /// A run at midnight UTC of `date`.
    pub fn on(date: NaiveDate) -> Self {
        Self {
            date,
            timestamp: Timestamp::start_of(date),
        }
    }
}

/// Result of normalizing a whole batch.
#[derive(Clone, Debug, Default)]
pub struct NormalizedBatch {
    pub snapshots: Vec<ListingSnapshot>,
    pub rejections: Vec<Rejection>,
}

impl NormalizedBatch {
    pub fn rejected(&self) -> usize {
        self.rejections.len()
    }
}

/// Normalize every record of a batch for `model`, skipping malformed ones.
pub fn normalize_batch(
    records: &[RawRecord],
    model: &str,
    context: Option<&ScrapeContext>,
) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();

    for (index, raw) in records.iter().enumerate() {
        match normalize(raw, context) {
            Ok(snapshot) if snapshot.model != model => {
                let error = ValidationError::ModelMismatch {
                    expected: model.to_string(),
                    got: snapshot.model.clone(),
                };
                warn!(model, index, id = %snapshot.id, %error, "Rejected record");
                batch.rejections.push(Rejection {
                    index,
                    id: Some(snapshot.id),
                    error,
                });
            }
            Ok(snapshot) => batch.snapshots.push(snapshot),
            Err(error) => {
                let id = raw.get("id").and_then(coerce_id);
                warn!(model, index, id = ?id, %error, "Rejected record");
                batch.rejections.push(Rejection { index, id, error });
            }
        }
    }

    batch
}

/// Validate and coerce one raw record.
pub fn normalize(
    raw: &RawRecord,
    context: Option<&ScrapeContext>,
) -> Result<ListingSnapshot, ValidationError> {
    let id = match present(raw, "id") {
        Some(value) => coerce_id(value).ok_or_else(|| invalid("id", value))?,
        None => return Err(ValidationError::MissingField("id")),
    };

    let price = match present(raw, "price") {
        Some(value) => coerce_integer(value).ok_or_else(|| invalid("price", value))?,
        None => return Err(ValidationError::MissingField("price")),
    };
    if price < 0 {
        return Err(ValidationError::NegativePrice(price));
    }

    let model = match present(raw, "model") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(value) => return Err(invalid("model", value)),
        None => return Err(ValidationError::MissingField("model")),
    };

    let year = match present(raw, "year") {
        Some(value) => {
            let year = coerce_integer(value).ok_or_else(|| invalid("year", value))?;
            Some(i32::try_from(year).map_err(|_| invalid("year", value))?)
        }
        None => None,
    };

    let mileage = match present(raw, "mileage") {
        Some(value) => {
            let mileage = coerce_integer(value).ok_or_else(|| invalid("mileage", value))?;
            if mileage < 0 {
                return Err(ValidationError::NegativeMileage(mileage));
            }
            Some(mileage as u64)
        }
        None => None,
    };

    let title = optional_string(raw, "title")?;
    let url = optional_string(raw, "url")?;

    let scrape_date = match present(raw, "scrape_date") {
        Some(value) => coerce_date(value).ok_or_else(|| invalid("scrape_date", value))?,
        None => match context {
            Some(ctx) => ctx.date,
            None => return Err(ValidationError::MissingField("scrape_date")),
        },
    };

    let scrape_timestamp = match present(raw, "scrape_timestamp") {
        Some(value) => {
            Timestamp(coerce_integer(value).ok_or_else(|| invalid("scrape_timestamp", value))?)
        }
        None => match context {
            Some(ctx) => ctx.timestamp,
            None => return Err(ValidationError::MissingField("scrape_timestamp")),
        },
    };

    Ok(ListingSnapshot {
        id,
        title,
        price: price as u64,
        year,
        mileage,
        url,
        model,
        scrape_date,
        scrape_timestamp,
    })
}

/// A field's value, treating `null` as absent.
fn present<'a>(raw: &'a RawRecord, field: &str) -> Option<&'a Value> {
    raw.get(field).filter(|v| !v.is_null())
}

fn invalid(field: &'static str, value: &Value) -> ValidationError {
    ValidationError::InvalidField {
        field,
        value: value.to_string(),
    }
}

fn optional_string(raw: &RawRecord, field: &'static str) -> Result<String, ValidationError> {
    match present(raw, field) {
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(value) => Err(invalid(field, value)),
        None => Ok(String::new()),
    }
}

fn coerce_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Integers, integral floats, and numeric strings such as `"450 000"`.
fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }
        }
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, ' ' | ',' | '_' | '\u{a0}'))
                .collect();
            if digits.is_empty() {
                return None;
            }
            digits.parse().ok()
        }
        _ => None,
    }
}

/// `YYYY-MM-DD`, optionally followed by a `T...` time part.
fn coerce_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    let day = s.split('T').next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
