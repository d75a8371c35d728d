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

//! Cache-first sample resolution.
//!
//! The fetcher looks in the local store first and only goes to the network on a
//! miss. Every successful download is written to the store before it is returned.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::note::{KeyError, SampleKey};
use crate::store::{SampleBlob, SampleStore, StoreError};

mod remote;

pub use remote::{HttpRemote, Remote, RemoteError};

/// The public MusyngKite sample-font mirror.
pub const DEFAULT_BASE_URL: &str =
    "https://raw.githubusercontent.com/RakanNimer/midi-js-soundfonts/master/MusyngKite";

/// Errors surfaced by the fetcher. Cloneable so one failure can be handed to every
/// waiter of a shared load.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    InvalidKey(#[from] KeyError),

    #[error("failed to fetch {url}: {cause}")]
    FetchFailed { url: String, cause: Arc<RemoteError> },

    #[error("unable to cache sample: {0}")]
    Store(Arc<StoreError>),
}

/// Resolves sample keys to encoded bytes.
pub struct SampleFetcher {
    store: Arc<dyn SampleStore>,
    remote: Arc<dyn Remote>,
    base_url: String,
}

impl SampleFetcher {
    /// Creates a new fetcher. Trailing slashes on the base URL are ignored.
    pub fn new(store: Arc<dyn SampleStore>, remote: Arc<dyn Remote>, base_url: &str) -> Self {
        SampleFetcher {
            store,
            remote,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Returns the store backing this fetcher.
    pub fn store(&self) -> &Arc<dyn SampleStore> {
        &self.store
    }

    /// Builds the remote address of a sample.
    pub fn url_for(&self, key: &SampleKey) -> String {
        format!(
            "{}/{}-mp3/{}.mp3",
            self.base_url,
            key.instrument(),
            key.note()
        )
    }

    /// Resolves the sample for an instrument and note name. The note is canonicalized
    /// first, so enharmonic spellings share one cache entry.
    pub async fn resolve(&self, instrument: &str, note: &str) -> Result<SampleBlob, FetchError> {
        let key = SampleKey::new(instrument, note)?;
        self.resolve_key(&key).await
    }

    /// Resolves the sample for a canonical key.
    pub async fn resolve_key(&self, key: &SampleKey) -> Result<SampleBlob, FetchError> {
        if self.store.exists(key) {
            match self.store.get(key) {
                Ok(blob) => {
                    debug!(key = %key, bytes = blob.len(), "Using cached sample");
                    return Ok(blob);
                }
                Err(e) => {
                    warn!(key = %key, err = %e, "Cached sample unreadable, fetching again");
                }
            }
        }

        let url = self.url_for(key);
        info!(key = %key, url, "Fetching sample");

        let bytes = self
            .remote
            .fetch(&url)
            .await
            .map_err(|e| FetchError::FetchFailed {
                url: url.clone(),
                cause: Arc::new(e),
            })?;

        let blob: SampleBlob = bytes.into();
        self.store
            .put(key, blob.clone())
            .map_err(|e| FetchError::Store(Arc::new(e)))?;

        info!(key = %key, bytes = blob.len(), "Sample cached");
        Ok(blob)
    }
}

impl fmt::Debug for SampleFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleFetcher")
            .field("base_url", &self.base_url)
            .field("cached_samples", &self.store.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use parking_lot::Mutex;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::store::MemoryStore;

    /// A remote that serves canned responses and records every request.
    pub(crate) struct MockRemote {
        responses: Mutex<HashMap<String, Vec<u8>>>,
        requests: Mutex<Vec<String>>,
        gate: Option<Arc<Semaphore>>,
        url_gates: Mutex<Vec<(String, Arc<Semaphore>)>>,
    }

    impl MockRemote {
        /// A remote that serves `body` for every URL.
        pub(crate) fn serving(body: Vec<u8>) -> MockRemote {
            MockRemote {
                responses: Mutex::new(HashMap::from([("*".to_string(), body)])),
                requests: Mutex::new(Vec::new()),
                gate: None,
                url_gates: Mutex::new(Vec::new()),
            }
        }

        /// A remote that fails every request with a 404.
        pub(crate) fn failing() -> MockRemote {
            MockRemote {
                responses: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                gate: None,
                url_gates: Mutex::new(Vec::new()),
            }
        }

        /// Holds every request until a permit is added to the returned semaphore.
        pub(crate) fn gated(mut self) -> (MockRemote, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            self.gate = Some(gate.clone());
            (self, gate)
        }

        /// Holds requests for URLs ending with `suffix` until a permit is added to
        /// the returned semaphore. Takes precedence over `gated`.
        pub(crate) fn gate_url(&self, suffix: &str) -> Arc<Semaphore> {
            let gate = Arc::new(Semaphore::new(0));
            self.url_gates.lock().push((suffix.to_string(), gate.clone()));
            gate
        }

        fn gate_for(&self, url: &str) -> Option<Arc<Semaphore>> {
            self.url_gates
                .lock()
                .iter()
                .find(|(suffix, _)| url.ends_with(suffix.as_str()))
                .map(|(_, gate)| gate.clone())
                .or_else(|| self.gate.clone())
        }

        /// Serves `body` for URLs ending with `suffix`, overriding the default.
        pub(crate) fn with_response(self, suffix: &str, body: Vec<u8>) -> MockRemote {
            self.responses.lock().insert(suffix.to_string(), body);
            self
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().clone()
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().len()
        }

        fn response_for(&self, url: &str) -> Option<Vec<u8>> {
            let responses = self.responses.lock();
            responses
                .iter()
                .find(|(suffix, _)| suffix.as_str() != "*" && url.ends_with(suffix.as_str()))
                .or_else(|| responses.get_key_value("*"))
                .map(|(_, body)| body.clone())
        }
    }

    impl Remote for MockRemote {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RemoteError>> {
            async move {
                self.requests.lock().push(url.to_string());
                if let Some(gate) = self.gate_for(url) {
                    if let Ok(permit) = gate.acquire().await {
                        permit.forget();
                    }
                }
                self.response_for(url).ok_or(RemoteError::Status(404))
            }
            .boxed()
        }
    }

    fn fetcher(remote: Arc<MockRemote>) -> (SampleFetcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            SampleFetcher::new(store.clone(), remote, "https://example.com/MusyngKite/"),
            store,
        )
    }

    #[tokio::test]
    async fn test_cache_miss_fetches_once_and_populates() {
        let remote = Arc::new(MockRemote::serving(vec![1, 2, 3]));
        let (fetcher, store) = fetcher(remote.clone());
        let key = SampleKey::new("acoustic_grand_piano", "A3").unwrap();

        assert!(!store.exists(&key));
        let blob = fetcher.resolve("acoustic_grand_piano", "A3").await.unwrap();

        assert_eq!(&*blob, &[1, 2, 3]);
        assert_eq!(
            remote.requests(),
            vec!["https://example.com/MusyngKite/acoustic_grand_piano-mp3/A3.mp3"]
        );
        assert!(store.exists(&key));
        assert_eq!(store.keys()[0].to_string(), "acoustic_grand_piano-A3");
    }

    #[tokio::test]
    async fn test_repeated_resolves_hit_cache() {
        let remote = Arc::new(MockRemote::serving(vec![1, 2, 3]));
        let (fetcher, _store) = fetcher(remote.clone());

        fetcher.resolve("acoustic_grand_piano", "C4").await.unwrap();
        fetcher.resolve("acoustic_grand_piano", "C4").await.unwrap();
        fetcher.resolve("acoustic_grand_piano", "C4").await.unwrap();

        assert_eq!(remote.request_count(), 1);
    }

    #[tokio::test]
    async fn test_enharmonic_requests_share_fetch() {
        let remote = Arc::new(MockRemote::serving(vec![4]));
        let (fetcher, store) = fetcher(remote.clone());

        fetcher.resolve("acoustic_grand_piano", "C#4").await.unwrap();
        fetcher.resolve("acoustic_grand_piano", "Db4").await.unwrap();

        assert_eq!(remote.request_count(), 1);
        assert!(remote.requests()[0].ends_with("/acoustic_grand_piano-mp3/Db4.mp3"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_g_sharp_is_stored_as_a_flat() {
        let remote = Arc::new(MockRemote::serving(vec![5]));
        let (fetcher, store) = fetcher(remote.clone());

        fetcher.resolve("violin", "G#4").await.unwrap();

        assert_eq!(store.keys()[0].to_string(), "violin-Ab4");
        assert!(remote.requests()[0].ends_with("/violin-mp3/Ab4.mp3"));
    }

    #[tokio::test]
    async fn test_preseeded_store_skips_network() {
        let remote = Arc::new(MockRemote::failing());
        let (fetcher, store) = fetcher(remote.clone());
        let key = SampleKey::new("violin", "E5").unwrap();
        store.put(&key, vec![8, 8].into()).unwrap();

        let blob = fetcher.resolve("violin", "E5").await.unwrap();
        assert_eq!(&*blob, &[8, 8]);
        assert_eq!(remote.request_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_store_empty() {
        let remote = Arc::new(MockRemote::failing());
        let (fetcher, store) = fetcher(remote.clone());

        let result = fetcher.resolve("violin", "E5").await;
        match result {
            Err(FetchError::FetchFailed { url, .. }) => {
                assert_eq!(url, "https://example.com/MusyngKite/violin-mp3/E5.mp3")
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(store.is_empty());

        // No retry at this layer.
        assert_eq!(remote.request_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let remote = Arc::new(MockRemote::serving(vec![1]));
        let (fetcher, _store) = fetcher(remote.clone());

        assert!(matches!(
            fetcher.resolve("violin", "H2").await,
            Err(FetchError::InvalidKey(_))
        ));
        assert_eq!(remote.request_count(), 0);
    }
}
