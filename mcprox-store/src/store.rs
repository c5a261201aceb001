//! Single-writer, many-reader embedded key-value store (spec §4.1).

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use mcprox_core::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use crate::containers::{self, CURRENT_SCHEMA_VERSION};

/// Wraps a `sled::Db`. Named containers are sled trees; every mutation
/// `sled` itself serializes internally, and `Store` adds the "presumed
/// stale lock" recovery behavior spec §4.1 requires.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    path: PathBuf,
}

impl Store {
    /// Opens (creating if missing) the store at `path`. If the initial open
    /// fails — sled surfaces a locked-database error synchronously rather
    /// than blocking, so there is no literal "timeout" to observe, but we
    /// treat any open failure the same way the spec's timeout-detection
    /// does: presume a stale lock, back up the existing directory, delete
    /// it, and retry exactly once. A second failure is fatal.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_secs(5))
    }

    pub fn open_with_timeout(path: impl AsRef<Path>, _open_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match sled::open(&path) {
            Ok(db) => Self::finish_open(db, path),
            Err(first_err) => {
                warn!(
                    path = %path.display(),
                    error = %first_err,
                    "store open failed, presuming a stale lock file; attempting recovery"
                );
                Self::recover_and_reopen(&path, &first_err)
            }
        }
    }

    fn recover_and_reopen(path: &Path, first_err: &sled::Error) -> Result<Self> {
        if path.exists() {
            let backup_path = Self::timestamped_backup_path(path);
            std::fs::rename(path, &backup_path).map_err(|e| {
                Error::internal(format!(
                    "store recovery: failed to move {} aside to {}: {e}",
                    path.display(),
                    backup_path.display()
                ))
            })?;
            warn!(
                original = %path.display(),
                backup = %backup_path.display(),
                "moved presumed-corrupt store aside before reopening"
            );
        }

        sled::open(path)
            .map_err(|second_err| {
                Error::internal(format!(
                    "store recovery failed: initial open error `{first_err}`, \
                     reopen after backup also failed: `{second_err}`"
                ))
            })
            .and_then(|db| Self::finish_open(db, path.to_path_buf()))
    }

    fn timestamped_backup_path(path: &Path) -> PathBuf {
        let suffix = Utc::now().format("%Y%m%dT%H%M%S%.f");
        let mut backup = path.as_os_str().to_os_string();
        backup.push(format!(".corrupt-{suffix}"));
        PathBuf::from(backup)
    }

    fn finish_open(db: sled::Db, path: PathBuf) -> Result<Self> {
        let store = Self { db, path };
        store.ensure_schema_version()?;
        Ok(store)
    }

    fn ensure_schema_version(&self) -> Result<()> {
        let meta = self.tree(containers::META)?;
        if meta
            .get(containers::META_SCHEMA_KEY)
            .map_err(map_sled_err)?
            .is_none()
        {
            info!(version = CURRENT_SCHEMA_VERSION, "initializing schema version");
            meta.insert(
                containers::META_SCHEMA_KEY,
                &CURRENT_SCHEMA_VERSION.to_le_bytes(),
            )
            .map_err(map_sled_err)?;
            meta.flush().map_err(map_sled_err)?;
        }
        Ok(())
    }

    /// Reads the current schema version, little-endian 8-byte unsigned
    /// (spec §6).
    pub fn schema_version(&self) -> Result<u64> {
        let meta = self.tree(containers::META)?;
        match meta
            .get(containers::META_SCHEMA_KEY)
            .map_err(map_sled_err)?
        {
            Some(bytes) if bytes.len() == 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                Ok(u64::from_le_bytes(buf))
            }
            Some(_) => Err(Error::internal("schema version record has wrong width")),
            None => Ok(0),
        }
    }

    pub fn set_schema_version(&self, version: u64) -> Result<()> {
        let meta = self.tree(containers::META)?;
        meta.insert(containers::META_SCHEMA_KEY, &version.to_le_bytes())
            .map_err(map_sled_err)?;
        Ok(())
    }

    fn tree(&self, container: &str) -> Result<sled::Tree> {
        self.db.open_tree(container).map_err(map_sled_err)
    }

    /// Creates the named container if it does not already exist. Sled trees
    /// are created lazily on first access, so this is a no-op beyond
    /// touching the tree, kept as an explicit operation to mirror spec §4.1's
    /// "create-container-if-missing".
    pub fn ensure_container(&self, container: &str) -> Result<()> {
        self.tree(container)?;
        Ok(())
    }

    /// Runs within an implicit write transaction: sled's `Tree::insert`
    /// already serializes against concurrent writers to the same tree, and
    /// all *mutating* call sites for this store funnel through the single
    /// `AsyncQueue` worker (spec §4.2), so no additional locking is taken
    /// here.
    pub fn put<T: Serialize>(&self, container: &str, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| Error::internal(format!("serialize failed: {e}")))?;
        self.tree(container)?
            .insert(key.as_bytes(), bytes)
            .map_err(map_sled_err)?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, container: &str, key: &str) -> Result<Option<T>> {
        match self
            .tree(container)?
            .get(key.as_bytes())
            .map_err(map_sled_err)?
        {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    // Spec §7: a single corrupted record must not poison a
                    // listing; point reads surface the error, range scans skip it.
                    Err(Error::internal(format!(
                        "deserialize failed for {container}/{key}: {e}"
                    )))
                }
            },
            None => Ok(None),
        }
    }

    /// Tolerant of missing keys (spec §4.4 `Delete`).
    pub fn delete(&self, container: &str, key: &str) -> Result<()> {
        self.tree(container)?
            .remove(key.as_bytes())
            .map_err(map_sled_err)?;
        Ok(())
    }

    pub fn count(&self, container: &str) -> Result<usize> {
        Ok(self.tree(container)?.len())
    }

    /// Ordered (ascending by key) range scan. Corrupted records are skipped
    /// with a warning log, never fail the whole scan (spec §7).
    pub fn range_scan<T: DeserializeOwned>(&self, container: &str) -> Result<Vec<(String, T)>> {
        let tree = self.tree(container)?;
        let mut out = Vec::new();
        for item in tree.iter() {
            let (key, value) = item.map_err(map_sled_err)?;
            let key_str = match String::from_utf8(key.to_vec()) {
                Ok(k) => k,
                Err(_) => {
                    warn!(container, "skipping record with non-utf8 key");
                    continue;
                }
            };
            match serde_json::from_slice::<T>(&value) {
                Ok(v) => out.push((key_str, v)),
                Err(e) => {
                    warn!(container, key = %key_str, error = %e, "skipping corrupted record");
                    continue;
                }
            }
        }
        Ok(out)
    }

    /// Same as `range_scan` but newest-first (descending by key), used by
    /// `ActivityLog::List` since ids are time-ordered (spec §4.4).
    pub fn range_scan_rev<T: DeserializeOwned>(&self, container: &str) -> Result<Vec<(String, T)>> {
        let mut records = self.range_scan(container)?;
        records.reverse();
        Ok(records)
    }

    /// Deletes every container named after `server_id` plus the
    /// corresponding statistics entry, inside a single logical operation
    /// (spec §4.3 `CleanupStale`: "Deletions happen in one write
    /// transaction"). Sled does not expose cross-tree ACID transactions, so
    /// this executes the deletions back-to-back without yielding — since all
    /// mutating calls are already funnelled through the single AsyncQueue
    /// worker, no other mutator can interleave.
    pub fn drop_server_containers(&self, server_id: &str) -> Result<()> {
        self.db
            .drop_tree(containers::server_tool_calls(server_id))
            .map_err(map_sled_err)?;
        self.db
            .drop_tree(containers::server_diagnostics(server_id))
            .map_err(map_sled_err)?;
        self.tree(containers::SERVER_STATISTICS)?
            .remove(server_id.as_bytes())
            .map_err(map_sled_err)?;
        Ok(())
    }

    /// Full backup: flush pending writes, then copy the store directory to
    /// `dest` (spec §4.1: "copy file while holding a read transaction" —
    /// sled's on-disk format is a directory of segment files rather than a
    /// single file, so the read-transaction-equivalent guarantee here is
    /// "flushed and not concurrently mutated", which holds because backups
    /// run from the AsyncQueue worker alongside other mutations).
    pub fn backup(&self, dest: impl AsRef<Path>) -> Result<()> {
        self.db.flush().map_err(map_sled_err)?;
        copy_dir_recursive(&self.path, dest.as_ref())
            .map_err(|e| Error::internal(format!("backup failed: {e}")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let dest_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), dest_path)?;
        }
    }
    Ok(())
}

fn map_sled_err(e: sled::Error) -> Error {
    Error::internal(format!("store error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Dummy {
        n: u32,
    }

    #[test]
    fn put_get_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        store.put("c", "k1", &Dummy { n: 1 }).unwrap();
        let got: Option<Dummy> = store.get("c", "k1").unwrap();
        assert_eq!(got, Some(Dummy { n: 1 }));
        store.delete("c", "k1").unwrap();
        let got: Option<Dummy> = store.get("c", "k1").unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn delete_missing_key_is_tolerant() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        assert!(store.delete("c", "missing").is_ok());
    }

    #[test]
    fn schema_version_defaults_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
        store.set_schema_version(3).unwrap();
        assert_eq!(store.schema_version().unwrap(), 3);
    }

    #[test]
    fn range_scan_is_ordered_ascending_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        store.put("c", "b", &Dummy { n: 2 }).unwrap();
        store.put("c", "a", &Dummy { n: 1 }).unwrap();
        store.put("c", "c", &Dummy { n: 3 }).unwrap();
        let scanned: Vec<(String, Dummy)> = store.range_scan("c").unwrap();
        let keys: Vec<&str> = scanned.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn range_scan_skips_corrupted_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        store.put("c", "good", &Dummy { n: 1 }).unwrap();
        // Insert a record that won't deserialize as `Dummy`.
        let tree = store.tree("c").unwrap();
        tree.insert("bad", b"not json").unwrap();
        let scanned: Vec<(String, Dummy)> = store.range_scan("c").unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].0, "good");
    }

    #[test]
    fn backup_copies_store_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        store.put("c", "k", &Dummy { n: 7 }).unwrap();
        let backup_dir = dir.path().join("backup");
        store.backup(&backup_dir).unwrap();
        assert!(backup_dir.exists());
        assert!(std::fs::read_dir(&backup_dir).unwrap().next().is_some());
    }

    #[test]
    fn drop_server_containers_removes_trees_and_stat_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        let sid = "abc123";
        store
            .put(&containers::server_tool_calls(sid), "call1", &Dummy { n: 1 })
            .unwrap();
        store
            .put(containers::SERVER_STATISTICS, sid, &Dummy { n: 1 })
            .unwrap();
        store.drop_server_containers(sid).unwrap();
        assert_eq!(store.count(&containers::server_tool_calls(sid)).unwrap(), 0);
        let stat: Option<Dummy> = store.get(containers::SERVER_STATISTICS, sid).unwrap();
        assert_eq!(stat, None);
    }
}
