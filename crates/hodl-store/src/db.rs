use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use hodl_core::error::Error;
use hodl_core::types::Height;
use tracing::info;

use crate::store::{MemStore, Store};

/// Number of recent height snapshots retained for the query layer.
const SNAPSHOT_RETENTION: u64 = 100;

/// An immutable view of the full state at one committed height.
pub type Snapshot = Arc<MemStore>;

/// The versioned state database.
///
/// Consensus reads and writes go through the in-memory committed image so
/// iteration order is a property of `BTreeMap`, never of the disk format.
/// sled is write-behind: every `commit` persists the delta and flushes, and
/// `open` rebuilds the image from disk. Tests run without a disk backing.
pub struct StateDb {
    disk: Option<sled::Tree>,
    _db: Option<sled::Db>,
    committed: MemStore,
    snapshots: BTreeMap<Height, Snapshot>,
    height: Height,
}

impl StateDb {
    /// Open or create the database at `path`, loading the committed image.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let db = sled::open(path).map_err(|e| Error::Storage(e.to_string()))?;
        let tree = db
            .open_tree("state")
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut committed = MemStore::new();
        for item in tree.iter() {
            let (k, v) = item.map_err(|e| Error::Storage(e.to_string()))?;
            committed.set(&k, v.to_vec());
        }
        info!(entries = committed.len(), "state image loaded");

        Ok(Self {
            disk: Some(tree),
            _db: Some(db),
            committed,
            snapshots: BTreeMap::new(),
            height: 0,
        })
    }

    /// Ephemeral database with no disk backing.
    pub fn in_memory() -> Self {
        Self {
            disk: None,
            _db: None,
            committed: MemStore::new(),
            snapshots: BTreeMap::new(),
            height: 0,
        }
    }

    pub fn height(&self) -> Height {
        self.height
    }

    /// The live committed image, for the write pipeline.
    pub fn committed(&self) -> &MemStore {
        &self.committed
    }

    pub fn committed_mut(&mut self) -> &mut MemStore {
        &mut self.committed
    }

    /// Immutable view at `height`, or the latest when `None`. Heights outside
    /// the retention window are not served.
    pub fn snapshot_at(&self, height: Option<Height>) -> Option<Snapshot> {
        match height {
            Some(h) => self.snapshots.get(&h).cloned(),
            None => self.snapshots.values().next_back().cloned(),
        }
    }

    /// Seal the current image as the committed state for `height`: persist to
    /// disk, record the height snapshot, and return the app-hash.
    pub fn commit(&mut self, height: Height) -> Result<[u8; 32], Error> {
        if let Some(tree) = &self.disk {
            // Write-behind: replace the disk copy with the current image.
            // sled batches make the replacement atomic.
            let mut batch = sled::Batch::default();
            for item in tree.iter() {
                let (k, _) = item.map_err(|e| Error::Storage(e.to_string()))?;
                if self.committed.get(&k).is_none() {
                    batch.remove(k);
                }
            }
            for (k, v) in self.committed.iter_prefix(&[], false) {
                batch.insert(k, v);
            }
            tree.apply_batch(batch)
                .map_err(|e| Error::Storage(e.to_string()))?;
            tree.flush().map_err(|e| Error::Storage(e.to_string()))?;
        }

        self.height = height;
        self.snapshots.insert(height, Arc::new(self.committed.clone()));
        while self.snapshots.len() as u64 > SNAPSHOT_RETENTION {
            let oldest = *self.snapshots.keys().next().expect("non-empty");
            self.snapshots.remove(&oldest);
        }

        Ok(self.root())
    }

    /// Content hash of the full committed image: BLAKE3 over length-prefixed
    /// key/value pairs in byte order. Identical state → identical root on
    /// every node.
    pub fn root(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for (k, v) in self.committed.iter_prefix(&[], false) {
            hasher.update(&(k.len() as u64).to_be_bytes());
            hasher.update(&k);
            hasher.update(&(v.len() as u64).to_be_bytes());
            hasher.update(&v);
        }
        *hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_changes_with_state() {
        let mut db = StateDb::in_memory();
        let empty = db.root();
        db.committed_mut().set(b"k", vec![1]);
        assert_ne!(db.root(), empty);
    }

    #[test]
    fn identical_states_identical_roots() {
        let mut a = StateDb::in_memory();
        let mut b = StateDb::in_memory();
        // Insertion order must not matter.
        a.committed_mut().set(b"x", vec![1]);
        a.committed_mut().set(b"y", vec![2]);
        b.committed_mut().set(b"y", vec![2]);
        b.committed_mut().set(b"x", vec![1]);
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn snapshots_serve_historic_state() {
        let mut db = StateDb::in_memory();
        db.committed_mut().set(b"k", vec![1]);
        db.commit(1).unwrap();
        db.committed_mut().set(b"k", vec![2]);
        db.commit(2).unwrap();

        let at1 = db.snapshot_at(Some(1)).unwrap();
        let at2 = db.snapshot_at(None).unwrap();
        assert_eq!(at1.get(b"k"), Some(vec![1]));
        assert_eq!(at2.get(b"k"), Some(vec![2]));
    }

    #[test]
    fn disk_round_trip() {
        let dir = std::env::temp_dir().join("hodl_store_db_test");
        let _ = std::fs::remove_dir_all(&dir);
        {
            let mut db = StateDb::open(&dir).unwrap();
            db.committed_mut().set(b"persisted", vec![7]);
            db.commit(1).unwrap();
        }
        let db = StateDb::open(&dir).unwrap();
        assert_eq!(db.committed().get(b"persisted"), Some(vec![7]));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
