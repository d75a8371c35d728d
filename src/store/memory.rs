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
use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use super::{SampleBlob, SampleStore, StoreError};
use crate::note::SampleKey;

/// A sample store that only lives as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    samples: RwLock<HashMap<SampleKey, SampleBlob>>,
}

impl MemoryStore {
    /// Creates an empty memory store.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Returns the total number of stored bytes.
    pub fn memory_size(&self) -> usize {
        self.samples.read().values().map(|blob| blob.len()).sum()
    }
}

impl SampleStore for MemoryStore {
    fn exists(&self, key: &SampleKey) -> bool {
        self.samples.read().contains_key(key)
    }

    fn get(&self, key: &SampleKey) -> Result<SampleBlob, StoreError> {
        self.samples
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn put(&self, key: &SampleKey, blob: SampleBlob) -> Result<(), StoreError> {
        self.samples.write().insert(key.clone(), blob);
        Ok(())
    }

    fn keys(&self) -> Vec<SampleKey> {
        let mut keys: Vec<SampleKey> = self.samples.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn len(&self) -> usize {
        self.samples.read().len()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("samples", &self.len())
            .field("memory_kb", &(self.memory_size() / 1024))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(note: &str) -> SampleKey {
        SampleKey::new("acoustic_grand_piano", note).unwrap()
    }

    #[test]
    fn test_missing_key() {
        let store = MemoryStore::new();
        assert!(!store.exists(&key("C4")));
        assert!(matches!(store.get(&key("C4")), Err(StoreError::NotFound(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_then_get() {
        let store = MemoryStore::new();
        let blob: SampleBlob = vec![0x49, 0x44, 0x33, 0x00, 0xff].into();
        store.put(&key("C4"), blob.clone()).unwrap();

        assert!(store.exists(&key("C4")));
        assert_eq!(&*store.get(&key("C4")).unwrap(), &*blob);
        assert_eq!(store.memory_size(), 5);
    }

    #[test]
    fn test_put_overwrites_and_is_idempotent() {
        let store = MemoryStore::new();
        store.put(&key("C4"), vec![1, 2, 3].into()).unwrap();
        store.put(&key("C4"), vec![4, 5].into()).unwrap();
        store.put(&key("C4"), vec![4, 5].into()).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(&*store.get(&key("C4")).unwrap(), &[4, 5]);
    }

    #[test]
    fn test_enharmonic_keys_share_entry() {
        let store = MemoryStore::new();
        store.put(&key("C#4"), vec![7].into()).unwrap();
        assert!(store.exists(&key("Db4")));
        assert_eq!(store.keys(), vec![key("Db4")]);
    }
}
