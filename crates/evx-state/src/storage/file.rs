#![forbid(unsafe_code)]

//! JSON file storage.
//!
//! Each storage key is one file in a directory:
//!
//! ```text
//! <dir>/
//! ├── settings.json
//! └── session.json
//! ```
//!
//! A file holds one JSON object whose members are the snapshot entries, in
//! snapshot order. Writes go to a dot-prefixed temp file first and are then
//! renamed over the target.
//!
//! # Failure Modes
//!
//! - Keys that are empty, start with `.` or contain path separators are
//!   rejected with [`StorageError::Unavailable`].
//! - A file that is not a JSON object, or whose values do not deserialize
//!   into `V`, fails with [`StorageError::Json`].

use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use evx_core::Snapshot;
use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{StateStorage, StorageError};
use evx_core::logging::debug;

/// Directory-backed [`StateStorage`] writing one JSON file per key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` for storage, creating it if needed.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] when the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{key}.json.tmp"))
    }
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
        return Err(StorageError::unavailable(format!(
            "`{key}` is not a valid storage key"
        )));
    }
    Ok(())
}

impl<V: Serialize + DeserializeOwned> StateStorage<V> for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Snapshot<V>>, StorageError> {
        let path = self.path_for(key)?;
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let OrderedSnapshot(state) = serde_json::from_str(&json)?;
        debug!(message = "storage.file.read", key, entries = state.len());
        Ok(Some(state))
    }

    fn set(&self, key: &str, state: &Snapshot<V>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let temp = self.temp_path_for(key);
        let json = serde_json::to_string_pretty(&SnapshotRef(state))?;
        fs::write(&temp, json)?;
        fs::rename(&temp, &path)?;
        debug!(message = "storage.file.write", key, entries = state.len());
        Ok(())
    }
}

/// Serializes a snapshot as a JSON object in entry order.
struct SnapshotRef<'a, V>(&'a Snapshot<V>);

impl<V: Serialize> Serialize for SnapshotRef<'_, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Deserializes a JSON object into a snapshot, keeping member order.
struct OrderedSnapshot<V>(Snapshot<V>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedSnapshot<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnapshotVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for SnapshotVisitor<V> {
            type Value = Snapshot<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object of state entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut state = Snapshot::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    state.insert(key, value);
                }
                Ok(state)
            }
        }

        deserializer
            .deserialize_map(SnapshotVisitor(PhantomData))
            .map(OrderedSnapshot)
    }
}
