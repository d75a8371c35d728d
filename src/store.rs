// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Local storage for encoded note samples.
//!
//! Stores are keyed by canonical [`SampleKey`]s and hold the encoded bytes exactly
//! as they were fetched. Entries are never evicted.

use std::path::Path;
use std::sync::Arc;

use crate::note::SampleKey;

mod disk;
mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// Encoded audio bytes for one sample. Cheap to clone and immutable.
pub type SampleBlob = Arc<[u8]>;

/// Errors returned by sample stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no sample stored for {0}")]
    NotFound(SampleKey),

    #[error("sample store I/O error for {key}: {source}")]
    Io {
        key: SampleKey,
        #[source]
        source: std::io::Error,
    },
}

/// A key-value store of encoded samples.
pub trait SampleStore: Send + Sync {
    /// Returns true if a sample is stored for the key. Never fails; any trouble
    /// reading the store is reported as absence.
    fn exists(&self, key: &SampleKey) -> bool;

    /// Gets the stored bytes for the key.
    fn get(&self, key: &SampleKey) -> Result<SampleBlob, StoreError>;

    /// Stores the bytes for the key, replacing anything already stored.
    fn put(&self, key: &SampleKey, blob: SampleBlob) -> Result<(), StoreError>;

    /// Returns the keys currently held by the store.
    fn keys(&self) -> Vec<SampleKey>;

    /// Returns the number of stored samples.
    fn len(&self) -> usize {
        self.keys().len()
    }

    /// Returns true if nothing has been stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opens the store for the given cache directory, or an in-memory store if there is none.
pub fn open(cache_dir: Option<&Path>) -> Result<Arc<dyn SampleStore>, std::io::Error> {
    match cache_dir {
        Some(dir) => Ok(Arc::new(DiskStore::open(dir)?)),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}
