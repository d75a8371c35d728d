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
use std::fmt;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::debug;

/// Errors produced while downloading a sample.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("empty response body")]
    Empty,
}

/// Something that can download the bytes behind a URL.
pub trait Remote: Send + Sync {
    /// Fetches the full body of the given URL.
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RemoteError>>;
}

/// Downloads samples over HTTP(S).
#[derive(Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpRemote {
    /// Creates a new HTTP remote with the given request timeout.
    pub fn new(timeout: Duration) -> Result<HttpRemote, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpRemote { client, timeout })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(RemoteError::Empty);
        }

        debug!(url, bytes = bytes.len(), "Downloaded sample");
        Ok(bytes.to_vec())
    }
}

impl Remote for HttpRemote {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, RemoteError>> {
        self.download(url).boxed()
    }
}

impl fmt::Debug for HttpRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRemote")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::Path, http::StatusCode, routing::get, Router};

    use super::*;

    /// Serves a tiny fake sample mirror on an ephemeral port and returns its base URL.
    async fn serve() -> String {
        async fn sample(Path(file): Path<String>) -> (StatusCode, Vec<u8>) {
            match file.as_str() {
                "A3.mp3" => (StatusCode::OK, vec![0xff, 0xfb, 0x90, 0x00]),
                "Empty.mp3" => (StatusCode::OK, Vec::new()),
                _ => (StatusCode::NOT_FOUND, Vec::new()),
            }
        }

        let app = Router::new().route("/acoustic_grand_piano-mp3/:file", get(sample));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_download() {
        let base = serve().await;
        let remote = HttpRemote::new(Duration::from_secs(5)).unwrap();

        let bytes = remote
            .fetch(&format!("{}/acoustic_grand_piano-mp3/A3.mp3", base))
            .await
            .unwrap();
        assert_eq!(bytes, vec![0xff, 0xfb, 0x90, 0x00]);
    }

    #[tokio::test]
    async fn test_not_found_status() {
        let base = serve().await;
        let remote = HttpRemote::new(Duration::from_secs(5)).unwrap();

        let result = remote
            .fetch(&format!("{}/acoustic_grand_piano-mp3/Q9.mp3", base))
            .await;
        assert!(matches!(result, Err(RemoteError::Status(404))));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let base = serve().await;
        let remote = HttpRemote::new(Duration::from_secs(5)).unwrap();

        let result = remote
            .fetch(&format!("{}/acoustic_grand_piano-mp3/Empty.mp3", base))
            .await;
        assert!(matches!(result, Err(RemoteError::Empty)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Bind and immediately drop a listener so the port is closed.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let remote = HttpRemote::new(Duration::from_secs(5)).unwrap();

        let result = remote.fetch(&format!("http://{}/x.mp3", addr)).await;
        assert!(matches!(result, Err(RemoteError::Request(_))));
    }
}
