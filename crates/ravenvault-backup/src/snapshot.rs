//! Snapshots: one JSON array of records per entity kind.
//!
//! A [`Snapshot`] is the unit every backup, restore point, and export is
//! made of. On disk it is a folder holding one `<QualifiedName>.json` file
//! per kind; in an export it is a zip archive with the same entries.
//!
//! A restore point written while changes were still unflushed also carries
//! them in `_unsaved.json`, so the next boot re-records them and the flush
//! loop picks them up. Backups never carry that file.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use ravenvault_core::EntityStore;
use ravenvault_types::{Entity, EntityKind, Row, find_kind};
use serde::Deserialize;
use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::BackupError;

/// Suffix of every snapshot file and archive entry.
const FILE_SUFFIX: &str = ".json";

/// Unflushed changes beside a restore point, keyed by qualified name.
const UNSAVED_FILE: &str = "_unsaved.json";

/// Records of several kinds, each held as a JSON array.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<(EntityKind, Value)>,
    unsaved: serde_json::Map<String, Value>,
}

impl Snapshot {
    /// An empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture every registered set of `store`, in registration order.
    /// Does not touch any entity.
    pub fn capture(store: &EntityStore) -> Result<Self, BackupError> {
        let mut snapshot = Self::new();
        for set in store.tracked_sets() {
            let kind = set.kind();
            let value = set
                .snapshot_json()
                .map_err(BackupError::json(kind.qualified_name()))?;
            snapshot.insert_json(kind, value)?;
        }
        Ok(snapshot)
    }

    /// Like [`capture`](Self::capture), plus every change the store has not
    /// written to the database yet.
    pub fn capture_with_unsaved(store: &EntityStore) -> Result<Self, BackupError> {
        let mut snapshot = Self::capture(store)?;
        for set in store.tracked_sets() {
            if set.counts().total() == 0 {
                continue;
            }
            let kind = set.kind();
            let value = set
                .unsaved_json()
                .map_err(BackupError::json(kind.qualified_name()))?;
            snapshot
                .unsaved
                .insert(kind.qualified_name().to_owned(), value);
        }
        Ok(snapshot)
    }

    /// Whether unflushed changes travel with this snapshot.
    pub fn has_unsaved(&self) -> bool {
        !self.unsaved.is_empty()
    }

    /// Add or replace the records of one kind.
    pub fn insert<E: Entity>(&mut self, entities: &[E]) -> Result<(), BackupError> {
        let value = serde_json::to_value(entities).map_err(BackupError::json(E::QUALIFIED_NAME))?;
        self.insert_json(EntityKind::of::<E>(), value)
    }

    /// Add or replace the raw JSON array of one kind.
    pub fn insert_json(&mut self, kind: EntityKind, value: Value) -> Result<(), BackupError> {
        if !value.is_array() {
            return Err(BackupError::NotAnArray {
                kind: kind.qualified_name().to_owned(),
            });
        }
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.qualified_name() == kind.qualified_name())
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((kind, value)),
        }
        Ok(())
    }

    /// Kinds present, in insertion order.
    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.entries.iter().map(|(kind, _)| *kind)
    }

    /// Whether records of this kind are present.
    pub fn contains(&self, qualified_name: &str) -> bool {
        self.json(qualified_name).is_some()
    }

    /// Raw JSON array of one kind.
    pub fn json(&self, qualified_name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(kind, _)| kind.qualified_name() == qualified_name)
            .map(|(_, value)| value)
    }

    /// Typed records of kind `E`; empty when the kind is absent.
    pub fn entities<E: Entity>(&self) -> Result<Vec<E>, BackupError> {
        self.json(E::QUALIFIED_NAME).map_or_else(
            || Ok(Vec::new()),
            |value| Vec::<E>::deserialize(value).map_err(BackupError::json(E::QUALIFIED_NAME)),
        )
    }

    /// Table rows of one kind; empty when the kind is absent.
    pub fn rows(&self, kind: &EntityKind) -> Result<Vec<Row>, BackupError> {
        self.json(kind.qualified_name()).map_or_else(
            || Ok(Vec::new()),
            |value| kind.rows(value).map_err(BackupError::json(kind.qualified_name())),
        )
    }

    /// Number of kinds present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no kind is present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of records across kinds.
    pub fn record_count(&self) -> usize {
        self.entries
            .iter()
            .filter_map(|(_, value)| value.as_array())
            .map(Vec::len)
            .fold(0, usize::saturating_add)
    }

    /// Index every kind into the matching set of `store` without change
    /// tracking. Kinds with no registered set are skipped.
    ///
    /// Returns the number of records loaded.
    pub fn load_into(&self, store: &EntityStore) -> Result<usize, BackupError> {
        let mut loaded = 0_usize;
        for (kind, value) in &self.entries {
            let Some(set) = store.tracked(kind.name()) else {
                tracing::warn!(kind = kind.name(), "no entity set registered; kind skipped");
                continue;
            };
            let count = set
                .load_json(value)
                .map_err(BackupError::json(kind.qualified_name()))?;
            tracing::debug!(kind = kind.name(), rows = count, "snapshot kind loaded");
            loaded = loaded.saturating_add(count);
        }
        for (name, value) in &self.unsaved {
            let Some(set) = find_kind(name).and_then(|kind| store.tracked(kind.name())) else {
                tracing::warn!(kind = %name, "no entity set registered; unsaved changes skipped");
                continue;
            };
            let marked = set
                .mark_unsaved_json(value)
                .map_err(BackupError::json(name))?;
            tracing::warn!(kind = %name, changes = marked, "re-recorded changes missing from the database");
        }
        Ok(loaded)
    }

    /// Build a deflated zip archive in memory, one entry per kind.
    pub fn to_zip(&self) -> Result<Vec<u8>, BackupError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (kind, value) in &self.entries {
            let name = kind.file_name();
            let bytes = serde_json::to_vec(value).map_err(BackupError::json(kind.qualified_name()))?;
            zip.start_file(name.as_str(), options)?;
            zip.write_all(&bytes).map_err(BackupError::io(name))?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }

    /// Read an archive produced by [`to_zip`](Self::to_zip). Entries that
    /// name no known kind are skipped.
    pub fn from_zip(bytes: &[u8]) -> Result<Self, BackupError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut snapshot = Self::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            let name = file.name().to_owned();
            let Some(kind) = name.strip_suffix(FILE_SUFFIX).and_then(find_kind) else {
                tracing::warn!(entry = %name, "unknown archive entry skipped");
                continue;
            };
            let mut data = Vec::new();
            file.read_to_end(&mut data).map_err(BackupError::io(name.as_str()))?;
            let value: Value =
                serde_json::from_slice(&data).map_err(BackupError::json(kind.qualified_name()))?;
            snapshot.insert_json(kind, value)?;
        }
        Ok(snapshot)
    }

    /// Write the unflushed changes file into `dir`, or delete a stale one
    /// when there is nothing unflushed.
    pub(crate) fn write_unsaved_to(&self, dir: &Path) -> Result<(), BackupError> {
        let path = dir.join(UNSAVED_FILE);
        if self.unsaved.is_empty() {
            return match fs::remove_file(&path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    Err(BackupError::io(&path)(e))
                }
                _ => Ok(()),
            };
        }
        let bytes = serde_json::to_vec(&self.unsaved).map_err(BackupError::json(UNSAVED_FILE))?;
        fs::write(&path, bytes).map_err(BackupError::io(&path))
    }

    /// Read the unflushed changes file from `dir` if present. Returns its
    /// path when one was read.
    pub(crate) fn read_unsaved_from(&mut self, dir: &Path) -> Result<Option<PathBuf>, BackupError> {
        let path = dir.join(UNSAVED_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackupError::io(&path)(e)),
        };
        self.unsaved = serde_json::from_slice(&bytes).map_err(BackupError::json(UNSAVED_FILE))?;
        Ok(Some(path))
    }

    /// Write one file per kind into `dir`, creating it if needed.
    pub(crate) fn write_to(&self, dir: &Path) -> Result<(), BackupError> {
        fs::create_dir_all(dir).map_err(BackupError::io(dir))?;
        for (kind, value) in &self.entries {
            let path = dir.join(kind.file_name());
            let bytes = serde_json::to_vec(value).map_err(BackupError::json(kind.qualified_name()))?;
            fs::write(&path, bytes).map_err(BackupError::io(&path))?;
        }
        Ok(())
    }

    /// Read the file of each requested kind from `dir`. Missing and empty
    /// files are skipped. Returns the snapshot and the files it came from.
    pub(crate) fn read_from(
        dir: &Path,
        kinds: &[EntityKind],
    ) -> Result<(Self, Vec<PathBuf>), BackupError> {
        let mut snapshot = Self::new();
        let mut files = Vec::new();
        for kind in kinds {
            let path = dir.join(kind.file_name());
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() && meta.len() > 0 => {}
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BackupError::io(&path)(e)),
            }
            let bytes = fs::read(&path).map_err(BackupError::io(&path))?;
            let value: Value =
                serde_json::from_slice(&bytes).map_err(BackupError::json(kind.qualified_name()))?;
            snapshot.insert_json(*kind, value)?;
            files.push(path);
        }
        Ok((snapshot, files))
    }
}
