//! Full-store JSON snapshot, rewritten after every mutation
//!
//! The file is overwritten in place: no temp file, no rename, no fsync. A
//! crash between the in-memory apply and the write loses that mutation, and a
//! crash during the write can leave a truncated file, which the next startup
//! reads as "no existing data".

use crate::common::Result;
use crate::persistence::Durability;
use crate::store::{Mutation, StoreImage, TableStore};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub struct SnapshotFile {
    path: PathBuf,
    // serializes concurrent rewrites of the same file
    write_guard: Mutex<()>,
}

impl SnapshotFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. Missing or unparsable files yield `None`.
    pub fn load(&self) -> Result<Option<StoreImage>> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No existing data file found at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<StoreImage>(&content) {
            Ok(image) => {
                tracing::info!("Loaded data from {:?}", self.path);
                Ok(Some(image))
            }
            Err(e) => {
                tracing::warn!(
                    "Snapshot {:?} is unreadable ({}), starting with an empty store",
                    self.path,
                    e
                );
                Ok(None)
            }
        }
    }

    /// Serialize the whole store over the snapshot file
    pub fn save(&self, store: &TableStore) -> Result<()> {
        let _guard = self
            .write_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let content = serde_json::to_vec_pretty(&store.image())?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl Durability for SnapshotFile {
    fn restore(&self, store: &TableStore) -> Result<()> {
        if let Some(image) = self.load()? {
            store.restore(image);
        }
        Ok(())
    }

    fn persist(&self, store: &TableStore, _mutations: &[Mutation]) -> Result<()> {
        self.save(store)
    }

    fn describe(&self) -> String {
        format!("snapshot:{}", self.path.display())
    }
}
