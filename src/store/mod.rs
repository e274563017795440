use std::{
    ffi::OsString,
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{TrackerError, TrackerResult},
    models::{ArtifactRef, EntityId, RecordMap, TrackingRecord},
};

mod replica;

use replica::ReplicaFeed;

pub use replica::{FileMirror, Replicator};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "fichaje::store";

use crate::{log_debug, log_error, log_info, log_warn};

/// The one handle every component uses to reach the records.
pub type SharedStore = Arc<Mutex<RecordStore>>;

/// In-memory record mapping backed by a JSON file that is rewritten in full
/// after every mutation.
pub struct RecordStore {
    path: PathBuf,
    records: RecordMap,
    replica: Option<ReplicaFeed>,
    saves: u64,
}

impl RecordStore {
    /// Loads whatever is on disk; never fails (see [`load`]).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = load(&path);
        log_info!(
            "Record store opened at {} with {} entries",
            path.display(),
            records.len()
        );
        Self {
            path,
            records,
            replica: None,
            saves: 0,
        }
    }

    /// Starts the replication worker; needs a running tokio runtime.
    pub fn with_replicator(mut self, replicator: Arc<dyn Replicator>) -> Self {
        self.replica = ReplicaFeed::spawn(replicator);
        if self.replica.is_none() {
            log_warn!("No async runtime available; replication disabled");
        }
        self
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    /// Successful saves since the store was opened.
    pub fn saves(&self) -> u64 {
        self.saves
    }

    pub fn records(&self) -> &RecordMap {
        &self.records
    }

    pub fn get(&self, entity: EntityId) -> Option<&TrackingRecord> {
        self.records.get(&entity)
    }

    /// Adds an empty record for every id not yet known. Existing records are
    /// left exactly as they are. Returns how many were added.
    pub fn ensure_entities<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = EntityId>,
    {
        let mut inserted = 0;
        for id in ids {
            if !self.records.contains_key(&id) {
                self.records.insert(id, TrackingRecord::new());
                inserted += 1;
            }
        }
        inserted
    }

    /// Replaces the record for `entity` and saves. If the save fails the
    /// previous in-memory value is restored, so memory never runs ahead of disk.
    pub fn commit(&mut self, entity: EntityId, record: TrackingRecord) -> TrackerResult<()> {
        let previous = self.records.insert(entity, record);

        if let Err(err) = self.save() {
            match previous {
                Some(previous) => {
                    self.records.insert(entity, previous);
                }
                None => {
                    self.records.remove(&entity);
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Records a new display anchor for `entity`, re-reading the current
    /// record first. Saves only when the anchor actually changes.
    pub fn set_anchor(
        &mut self,
        entity: EntityId,
        anchor: Option<ArtifactRef>,
    ) -> TrackerResult<bool> {
        let mut record = self.records.get(&entity).cloned().unwrap_or_default();
        if record.display_anchor_id() == anchor && self.records.contains_key(&entity) {
            return Ok(false);
        }
        record.set_display_anchor(anchor);
        self.commit(entity, record)?;
        Ok(true)
    }

    /// Writes the full mapping, then hands the bytes to the replication
    /// worker (if any).
    pub fn save(&mut self) -> TrackerResult<()> {
        let payload = save(&self.path, &self.records)?;
        self.saves += 1;
        log_debug!(
            "Saved {} records to {} (save #{})",
            self.records.len(),
            self.path.display(),
            self.saves
        );

        if let Some(replica) = &self.replica {
            replica.push(payload);
        }
        Ok(())
    }
}

/// Reads the durable form. A missing file yields an empty mapping. So does an
/// unreadable or corrupt one, after it has been copied aside for inspection.
/// Individual malformed entries are repaired and logged.
pub fn load(path: &Path) -> RecordMap {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            log_info!("No record file at {}; starting empty", path.display());
            return RecordMap::new();
        }
        Err(err) => {
            log_error!(
                "Failed to read record file {}: {err}; starting empty",
                path.display()
            );
            preserve_corrupt(path);
            return RecordMap::new();
        }
    };

    match decode(&raw) {
        Ok(records) => records,
        Err(reason) => {
            log_error!(
                "Record file {} is corrupt ({reason}); starting empty",
                path.display()
            );
            preserve_corrupt(path);
            RecordMap::new()
        }
    }
}

/// Serializes `records` and atomically replaces the file at `path`.
/// Returns the bytes written.
pub fn save(path: &Path, records: &RecordMap) -> TrackerResult<Vec<u8>> {
    let payload =
        serde_json::to_vec_pretty(records).map_err(|err| TrackerError::persistence(path, err))?;
    write_atomically(path, &payload)?;
    Ok(payload)
}

fn decode(raw: &str) -> Result<RecordMap, String> {
    let value: Value = serde_json::from_str(raw).map_err(|err| err.to_string())?;
    let Value::Object(entries) = value else {
        return Err("top level is not a JSON object".to_string());
    };

    let mut records = RecordMap::new();
    for (key, entry) in entries {
        let entity = match key.parse::<EntityId>() {
            Ok(entity) => entity,
            Err(err) => {
                log_warn!(
                    "{}",
                    TrackerError::MalformedRecord {
                        entity: key,
                        detail: format!("key is not a channel id ({err}); entry dropped"),
                    }
                );
                continue;
            }
        };

        let (record, repairs) = TrackingRecord::from_durable(entry);
        for detail in repairs {
            log_warn!(
                "{}",
                TrackerError::MalformedRecord {
                    entity: entity.to_string(),
                    detail,
                }
            );
        }
        records.insert(entity, record);
    }
    Ok(records)
}

/// Temp file in the same directory, fsync, rename over the target.
pub(crate) fn write_atomically(path: &Path, payload: &[u8]) -> TrackerResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| TrackerError::persistence(path, err))?;
    }

    let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(payload)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(TrackerError::persistence(path, err));
    }
    Ok(())
}

fn preserve_corrupt(path: &Path) {
    let mut backup = OsString::from(path.as_os_str());
    backup.push(".corrupt");
    let backup = PathBuf::from(backup);

    match fs::copy(path, &backup) {
        Ok(_) => log_warn!("Copied unreadable record file to {}", backup.display()),
        Err(err) => log_warn!(
            "Could not copy unreadable record file to {}: {err}",
            backup.display()
        ),
    }
}
