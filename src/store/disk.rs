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
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use super::{SampleBlob, SampleStore, StoreError};
use crate::note::SampleKey;

/// Extension used for stored samples. The mirror serves MP3s.
const SAMPLE_EXTENSION: &str = "mp3";

/// Counter used to give concurrent writers distinct temporary files.
static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(1);

/// A sample store that persists one file per sample in a directory. File names are
/// `{instrument}-{note}.mp3`, so the cache survives restarts.
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Opens (and creates if needed) a store in the given directory.
    pub fn open(dir: &Path) -> Result<DiskStore, io::Error> {
        fs::create_dir_all(dir)?;
        Ok(DiskStore {
            dir: dir.to_path_buf(),
        })
    }

    /// Returns the path a sample is stored at.
    pub fn path_for(&self, key: &SampleKey) -> PathBuf {
        self.dir.join(format!("{}.{}", key, SAMPLE_EXTENSION))
    }

    /// Parses a stored file name back into a key.
    fn key_from_path(path: &Path) -> Option<SampleKey> {
        if path.extension()? != SAMPLE_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        // Notes never contain a dash, instruments may.
        let (instrument, note) = stem.rsplit_once('-')?;
        SampleKey::new(instrument, note).ok()
    }
}

impl SampleStore for DiskStore {
    fn exists(&self, key: &SampleKey) -> bool {
        self.path_for(key).is_file()
    }

    fn get(&self, key: &SampleKey) -> Result<SampleBlob, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes.into()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(key.clone())),
            Err(e) => Err(StoreError::Io {
                key: key.clone(),
                source: e,
            }),
        }
    }

    fn put(&self, key: &SampleKey, blob: SampleBlob) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let temp_path = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            key,
            std::process::id(),
            NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed)
        ));

        let io_err = |source| StoreError::Io {
            key: key.clone(),
            source,
        };

        // Write to a temporary file and rename it into place so readers never see
        // a partially written sample.
        let result = fs::File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(&blob)?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&temp_path, &path));

        if let Err(e) = result {
            if let Err(remove_err) = fs::remove_file(&temp_path) {
                if remove_err.kind() != io::ErrorKind::NotFound {
                    warn!(path = ?temp_path, err = %remove_err, "Unable to remove temporary sample file");
                }
            }
            return Err(io_err(e));
        }

        debug!(key = %key, path = ?path, bytes = blob.len(), "Sample stored");
        Ok(())
    }

    fn keys(&self) -> Vec<SampleKey> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = ?self.dir, err = %e, "Unable to list sample store");
                return Vec::new();
            }
        };

        let mut keys: Vec<SampleKey> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| DiskStore::key_from_path(&entry.path()))
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(note: &str) -> SampleKey {
        SampleKey::new("acoustic_grand_piano", note).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let blob: SampleBlob = (0..=255u8).collect::<Vec<u8>>().into();

        assert!(!store.exists(&key("A3")));
        store.put(&key("A3"), blob.clone()).unwrap();
        assert!(store.exists(&key("A3")));
        assert_eq!(&*store.get(&key("A3")).unwrap(), &*blob);
        assert!(dir.path().join("acoustic_grand_piano-A3.mp3").is_file());
    }

    #[test]
    fn test_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        assert!(matches!(store.get(&key("A3")), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DiskStore::open(dir.path()).unwrap();
            store.put(&key("G#4"), vec![1, 2, 3].into()).unwrap();
        }

        let store = DiskStore::open(dir.path()).unwrap();
        assert!(store.exists(&key("Ab4")));
        assert_eq!(store.keys(), vec![key("Ab4")]);
    }

    #[test]
    fn test_keys_ignore_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        store.put(&key("C4"), vec![1].into()).unwrap();
        store.put(&key("Db4"), vec![2].into()).unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::write(dir.path().join(".acoustic_grand_piano-E4.mp3.1.1.tmp"), b"x").unwrap();

        assert_eq!(store.keys(), vec![key("C4"), key("Db4")]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_instrument_with_dash() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path()).unwrap();
        let key = SampleKey::new("my-synth", "Bb2").unwrap();
        store.put(&key, vec![9].into()).unwrap();
        assert_eq!(store.keys(), vec![key]);
    }
}
