//! The history store: one JSON document per model on disk.

use crate::error::{Result, StoreError};
use crate::export::{self, ExportFormat};
use crate::query::HistoricalData;
use crate::records::{normalize_batch, IdentityStrategy, RawRecord, ScrapeContext};
use crate::state::apply_batch;
use crate::stats::{year_analysis, DataStatus, SummaryStats, YearSummary};
use crate::types::{ListingSnapshot, MergeReport, ModelStore};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Directories under the data root that never hold a model.
const RESERVED_DIRS: &[&str] = &["plots"];

/// Store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory holding one subdirectory per model.
    pub data_dir: PathBuf,

    /// How listings are keyed.
    pub identity: IdentityStrategy,

    /// Pretty-print persisted JSON.
    pub pretty: bool,

    /// Whether to create the data directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            identity: IdentityStrategy::SiteId,
            pretty: true,
            create_if_missing: true,
        }
    }
}

impl StoreConfig {
    /// Load configuration from a JSON file, falling back to defaults if it is absent.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Durable per-model listing history.
///
/// Each model lives in `<data_dir>/<model>/<model>.json`. Merges hold the
/// write lock from load to save, so within one process they never
/// interleave. Separate processes pointed at the same directory are not
/// coordinated.
pub struct HistoryStore {
    config: StoreConfig,

    /// Serializes load-merge-save cycles.
    write_lock: Mutex<()>,
}

impl HistoryStore {
    /// Open a store rooted at `config.data_dir`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if !config.data_dir.is_dir() {
            if config.create_if_missing {
                fs::create_dir_all(&config.data_dir)?;
            } else {
                return Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("data directory {} does not exist", config.data_dir.display()),
                )));
            }
        }

        Ok(Self {
            config,
            write_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Path of a model's persisted document.
    pub fn model_path(&self, model: &str) -> Result<PathBuf> {
        let name = storage_name(model)?;
        Ok(self.config.data_dir.join(&name).join(format!("{name}.json")))
    }

    // --- Load / Save ---

    /// Load a model's store, or a fresh empty one if nothing was persisted yet.
    ///
    /// A file that exists but does not hold a valid store is an error; the
    /// file is left as it is.
    pub fn load(&self, model: &str) -> Result<ModelStore> {
        let path = self.model_path(model)?;

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ModelStore::new(model)),
            Err(e) => return Err(e.into()),
        };

        let store: ModelStore = serde_json::from_slice(&bytes).map_err(|e| {
            error!(model, path = %path.display(), error = %e, "Persisted store does not parse");
            StoreError::CorruptState {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        if storage_name(&store.metadata.model).ok() != Some(storage_name(model)?) {
            return Err(StoreError::CorruptState {
                path,
                reason: format!("document belongs to model {:?}", store.metadata.model),
            });
        }

        store.validate().map_err(|reason| {
            error!(model, path = %path.display(), %reason, "Persisted store fails validation");
            StoreError::CorruptState {
                path: path.clone(),
                reason,
            }
        })?;

        Ok(store)
    }

    /// Persist a model's store atomically.
    ///
    /// The document is written to a sibling temp file, synced, checked, and
    /// only then renamed over the previous version.
    pub fn save(&self, model: &str, store: &ModelStore) -> Result<()> {
        let path = self.model_path(model)?;
        let bytes = if self.config.pretty {
            serde_json::to_vec_pretty(store)?
        } else {
            serde_json::to_vec(store)?
        };

        write_atomic(&path, &bytes).map_err(|source| StoreError::StorageWrite {
            path: path.clone(),
            source,
        })
    }

    // --- Merge ---

    /// Normalize raw scraper records and merge them into `model`.
    ///
    /// Malformed records are skipped and reported. Either the merged store
    /// is saved and a report returned, or an error is returned and the
    /// persisted store is unchanged.
    pub fn merge_batch(
        &self,
        model: &str,
        records: &[RawRecord],
        context: Option<&ScrapeContext>,
    ) -> Result<MergeReport> {
        let batch = normalize_batch(records, model, context);
        let mut report = self.merge_snapshots(model, &batch.snapshots)?;
        report.rejected = batch.rejected();
        report.rejections = batch.rejections;

        if report.rejected > 0 {
            warn!(model, rejected = report.rejected, "Skipped malformed records");
        }

        Ok(report)
    }

    /// Merge already normalized snapshots into `model`.
    pub fn merge_snapshots(&self, model: &str, snapshots: &[ListingSnapshot]) -> Result<MergeReport> {
        if let Some(stray) = snapshots.iter().find(|s| s.model != model) {
            return Err(StoreError::InvalidOperation(format!(
                "listing {} belongs to model {:?}, not {:?}",
                stray.id, stray.model, model
            )));
        }

        let _lock = self.write_lock.lock();

        let current = self.load(model)?;
        let (next, report) = apply_batch(current, snapshots, self.config.identity, Utc::now());

        if snapshots.is_empty() {
            warn!(model, "Empty batch, leaving store untouched");
            return Ok(report);
        }

        // Never persist a store that load() would refuse.
        next.validate().map_err(|reason| {
            error!(model, %reason, "Merged store fails validation, not saving");
            StoreError::InvalidOperation(format!("merge produced an invalid store: {reason}"))
        })?;
        self.save(model, &next)?;

        info!(
            model,
            total = report.total_listings,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            disappeared = report.disappeared,
            "Merged batch"
        );

        Ok(report)
    }

    // --- Queries ---

    /// Load a model for read-only row access.
    pub fn get_historical_data(&self, model: &str) -> Result<HistoricalData> {
        Ok(HistoricalData::new(self.load_existing(model)?))
    }

    /// Models with a persisted store, sorted by directory name.
    pub fn list_models(&self) -> Result<Vec<String>> {
        let mut models = Vec::new();

        for entry in fs::read_dir(&self.config.data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || RESERVED_DIRS.contains(&name.as_str()) {
                continue;
            }
            if entry.path().join(format!("{name}.json")).is_file() {
                models.push(name);
            }
        }

        models.sort();
        Ok(models)
    }

    /// Status line for every persisted model.
    pub fn data_status(&self) -> Result<Vec<DataStatus>> {
        self.list_models()?
            .iter()
            .map(|model| Ok(DataStatus::of(&self.load(model)?)))
            .collect()
    }

    pub fn summary_stats(&self, model: &str) -> Result<SummaryStats> {
        Ok(SummaryStats::of(&self.load_existing(model)?))
    }

    pub fn year_analysis(&self, model: &str) -> Result<Vec<YearSummary>> {
        Ok(year_analysis(&self.load_existing(model)?))
    }

    // --- Export ---

    /// Write a model's rows to `path`. Returns the number of rows written.
    pub fn export(&self, model: &str, format: ExportFormat, path: impl AsRef<Path>) -> Result<usize> {
        let data = self.get_historical_data(model)?;
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        let count = export::write_rows(data.rows(), format, &mut writer)?;
        writer.flush()?;

        info!(model, %format, rows = count, path = %path.display(), "Exported history");
        Ok(count)
    }

    // --- Private Helpers ---

    fn load_existing(&self, model: &str) -> Result<ModelStore> {
        if !self.model_path(model)?.exists() {
            return Err(StoreError::ModelNotFound(model.to_string()));
        }
        self.load(model)
    }
}

/// Directory and file stem for a model name.
fn storage_name(model: &str) -> Result<String> {
    let name = model.trim().replace('/', "_");
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with('.')
        || name.contains(|c| c == '\\' || c == '\0')
        || RESERVED_DIRS.contains(&name.as_str())
    {
        return Err(StoreError::InvalidModelName(model.to_string()));
    }
    Ok(name)
}

/// Write-temp, fsync, verify, rename, fsync directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(dir)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;

        let written = fs::metadata(&tmp)?.len();
        if written != bytes.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("wrote {written} of {} bytes", bytes.len()),
            ));
        }

        fs::rename(&tmp, path)?;
        sync_dir(dir)
    })();

    if result.is_err() && tmp.is_file() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
