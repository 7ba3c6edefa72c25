//! File-backed store
//!
//! File layout:
//! - `cache.dots`: snapshot file with header + one JSON record per entry
//! - `cache.dots.tmp`: scratch file, renamed over the snapshot on every write

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::{Entry, MemoryStore};
use crate::parser::{create_header, parse_header, parse_records, SNAPSHOT_VERSION};
use crate::store::Store;

const SNAPSHOT_FILE: &str = "cache.dots";
const SNAPSHOT_TMP_FILE: &str = "cache.dots.tmp";

/// One snapshot line
#[derive(Serialize, Deserialize)]
struct Record {
    key: String,
    #[serde(flatten)]
    entry: Entry,
}

/// `Store` that keeps entries in memory and rewrites a snapshot file after
/// every mutation
pub struct FileStore {
    /// Path to the store directory
    path: PathBuf,

    /// Live entries
    inner: MemoryStore,

    /// Serializes mutate-then-write so the file reflects the last mutation.
    /// Guards the dirty flag: set while live entries are ahead of the file.
    write_lock: Mutex<bool>,

    /// Is the store closed?
    closed: RwLock<bool>,
}

impl FileStore {
    /// Open or create a store at the given directory
    ///
    /// # Arguments
    /// * `path` - Directory holding the snapshot file
    ///
    /// # Returns
    /// * `Result<FileStore>` - Store handle
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;

        let data_path = path.join(SNAPSHOT_FILE);
        let inner = if data_path.exists() {
            Self::open_existing(&data_path)?
        } else {
            Self::create_new(&data_path)?
        };

        debug!(path = %path.display(), entries = inner.len(), "opened file store");

        Ok(FileStore {
            path: path.to_path_buf(),
            inner,
            write_lock: Mutex::new(false),
            closed: RwLock::new(false),
        })
    }

    fn open_existing(data_path: &Path) -> Result<MemoryStore> {
        let mut data = Vec::new();
        File::open(data_path)?.read_to_end(&mut data)?;

        let (header, body) = parse_header(&data)?;
        if header.version != SNAPSHOT_VERSION {
            return Err(Error::Parse(format!(
                "Unsupported snapshot version {}",
                header.version
            )));
        }

        let lines = parse_records(body)?;
        if lines.len() != header.entry_count as usize {
            return Err(Error::Parse(format!(
                "Header declares {} records, found {}",
                header.entry_count,
                lines.len()
            )));
        }

        let mut entries = Vec::with_capacity(lines.len());
        for line in lines {
            let record: Record = serde_json::from_slice(line)?;
            entries.push((record.key, record.entry));
        }

        Ok(MemoryStore::from_entries(entries))
    }

    fn create_new(data_path: &Path) -> Result<MemoryStore> {
        let mut data_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(data_path)?;

        data_file.write_all(&create_header(SNAPSHOT_VERSION, 0))?;
        data_file.sync_all()?;

        Ok(MemoryStore::new())
    }

    /// Directory this store lives in
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Rewrite the snapshot file from the live entries
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let mut dirty = self.write_lock.lock();
        self.write_snapshot()?;
        *dirty = false;
        Ok(())
    }

    /// Close the store, writing the snapshot only if it is behind
    ///
    /// A handle that changed nothing leaves the file alone, so closing it
    /// cannot clobber writes made through another handle.
    pub fn close(&self) -> Result<()> {
        if *self.closed.read() {
            return Ok(());
        }

        {
            let mut dirty = self.write_lock.lock();
            if *dirty {
                self.write_snapshot()?;
                *dirty = false;
            }
        }

        *self.closed.write() = true;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if *self.closed.read() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Run a mutation and persist if it reports a change
    fn mutate<T>(&self, op: impl FnOnce(&MemoryStore) -> Result<(T, bool)>) -> Result<T> {
        self.ensure_open()?;
        let mut dirty = self.write_lock.lock();

        let (out, changed) = op(&self.inner)?;
        if changed {
            *dirty = true;
            self.write_snapshot()?;
            *dirty = false;
        }
        Ok(out)
    }

    fn write_snapshot(&self) -> Result<()> {
        let entries = self.inner.snapshot();

        let mut buf = create_header(SNAPSHOT_VERSION, entries.len() as u32);
        for (key, entry) in entries {
            serde_json::to_writer(&mut buf, &Record { key, entry })?;
            buf.push(b'\n');
        }

        let tmp_path = self.path.join(SNAPSHOT_TMP_FILE);
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&buf)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, self.path.join(SNAPSHOT_FILE))?;

        Ok(())
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        self.mutate(|inner| Ok((inner.put(key, value, ttl)?, true)))
    }

    fn add(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        self.mutate(|inner| {
            let added = inner.add(key, value, ttl)?;
            Ok((added, added))
        })
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.mutate(|inner| {
            let deleted = inner.delete(key)?;
            Ok((deleted, deleted))
        })
    }

    fn pull(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.mutate(|inner| {
            let value = inner.pull(key)?;
            let changed = value.is_some();
            Ok((value, changed))
        })
    }

    fn put_many(&self, entries: Vec<(String, Vec<u8>)>, ttl: Option<Duration>) -> Result<bool> {
        self.mutate(|inner| Ok((inner.put_many(entries, ttl)?, true)))
    }

    fn put_unbounded(&self, key: &str, value: Vec<u8>) -> Result<bool> {
        self.mutate(|inner| Ok((inner.put_unbounded(key, value)?, true)))
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_open() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert!(store.is_empty());
        assert!(dir.path().join(SNAPSHOT_FILE).exists());
        store.close().unwrap();

        // Reopen
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();

        {
            let store = FileStore::open(dir.path()).unwrap();
            store.put("users.1", b"alice".to_vec(), None).unwrap();
            store
                .put("users.2", b"bob".to_vec(), Some(Duration::from_secs(3600)))
                .unwrap();
            store.put("users.3", b"carol".to_vec(), None).unwrap();
            store.delete("users.3").unwrap();
        }

        {
            let store = FileStore::open(dir.path()).unwrap();
            assert_eq!(store.len(), 2);
            assert_eq!(store.get("users.1").unwrap(), Some(b"alice".to_vec()));
            assert_eq!(store.get("users.2").unwrap(), Some(b"bob".to_vec()));
            assert_eq!(store.get("users.3").unwrap(), None);
        }
    }

    #[test]
    fn test_written_through_without_close() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put("k", b"v".to_vec(), None).unwrap();

        // A second handle sees the write before the first closes
        let other = FileStore::open(dir.path()).unwrap();
        assert_eq!(other.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_idle_handle_close_keeps_other_writes() {
        let dir = TempDir::new().unwrap();
        let idle = FileStore::open(dir.path()).unwrap();

        let writer = FileStore::open(dir.path()).unwrap();
        writer.put("k", b"v".to_vec(), None).unwrap();
        drop(writer);

        // Never changed anything, so closing must not rewrite the file
        drop(idle);

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_unbounded_write_persists() {
        let dir = TempDir::new().unwrap();
        let large = vec![b'x'; crate::memory::MAX_VALUE_SIZE + 1];

        {
            let store = FileStore::open(dir.path()).unwrap();
            assert!(matches!(
                store.forever("big", large.clone()),
                Err(Error::ValueTooLarge(_))
            ));
            store.put_unbounded("big", large.clone()).unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get("big").unwrap(), Some(large));
    }

    #[test]
    fn test_corrupt_magic() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SNAPSHOT_FILE), b"NOTADOTSFILE....").unwrap();

        let result = FileStore::open(dir.path());
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_count_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut data = create_header(SNAPSHOT_VERSION, 2);
        data.extend_from_slice(b"{\"key\":\"a\",\"value\":[1],\"expires_at\":null}\n");
        fs::write(dir.path().join(SNAPSHOT_FILE), data).unwrap();

        let result = FileStore::open(dir.path());
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_unsupported_version() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(SNAPSHOT_FILE), create_header(99, 0)).unwrap();

        let result = FileStore::open(dir.path());
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[test]
    fn test_close_twice() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.close().unwrap();
        store.close().unwrap(); // Should not error
    }

    #[test]
    fn test_put_after_close() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.close().unwrap();

        let result = store.put("k", b"v".to_vec(), None);
        assert!(matches!(result, Err(Error::Closed)));
        assert!(matches!(store.get("k"), Err(Error::Closed)));
    }
}
