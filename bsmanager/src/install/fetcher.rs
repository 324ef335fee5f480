//! Remote archive retrieval
//!
//! Redirects are followed by hand so that one wall-clock timeout covers the
//! whole chain, and relative `Location` headers resolve against the URL that
//! produced them.

use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::logger;

/// Called per received chunk with `(received_so_far, total_or_zero)`
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Per-item limit covering connection, redirects and body
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("bsmanager/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `url` into `destination`, returning the number of bytes written.
    /// A partially written file is left for the caller to clean up.
    async fn retrieve(&self, url: &str, destination: &Path, on_progress: ProgressFn)
        -> Result<u64>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, timeout })
    }

    async fn retrieve_inner(
        &self,
        url: &str,
        destination: &Path,
        on_progress: &ProgressFn,
    ) -> Result<u64> {
        let mut current = url.to_string();

        let response = loop {
            let response = self.client.get(&current).send().await?;
            let status = response.status();

            if status.is_redirection() {
                let next = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|location| response.url().join(location).ok())
                    .ok_or(Error::RemoteError(status.as_u16()))?;
                logger::log_debug(
                    &format!("Redirect {} -> {}", current, next),
                    Some("fetcher"),
                );
                current = next.to_string();
                continue;
            }

            if !status.is_success() {
                return Err(Error::RemoteError(status.as_u16()));
            }
            break response;
        };

        let total = response.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut received = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            on_progress(received, total);
        }
        file.flush().await?;

        Ok(received)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn retrieve(
        &self,
        url: &str,
        destination: &Path,
        on_progress: ProgressFn,
    ) -> Result<u64> {
        match tokio::time::timeout(
            self.timeout,
            self.retrieve_inner(url, destination, &on_progress),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.timeout)),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What the stub serves for one content id
    #[derive(Clone)]
    pub enum StubResponse {
        Archive(Vec<u8>),
        Status(u16),
    }

    /// Serves canned archives keyed by the `{id}.zip` file name and tracks
    /// how many retrievals run at once
    #[derive(Default)]
    pub struct StubFetcher {
        responses: HashMap<String, StubResponse>,
        delay: Duration,
        current: AtomicUsize,
        pub max_concurrent: AtomicUsize,
        pub requested: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub fn new(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        pub fn serve(mut self, id: &str, response: StubResponse) -> Self {
            self.responses.insert(id.to_string(), response);
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn retrieve(
            &self,
            url: &str,
            destination: &Path,
            on_progress: ProgressFn,
        ) -> Result<u64> {
            self.requested.lock().unwrap().push(url.to_string());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            let id = url
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .trim_end_matches(".zip");
            let result = match self.responses.get(id) {
                Some(StubResponse::Archive(bytes)) => {
                    tokio::fs::write(destination, bytes).await?;
                    on_progress(bytes.len() as u64, bytes.len() as u64);
                    Ok(bytes.len() as u64)
                }
                Some(StubResponse::Status(code)) => Err(Error::RemoteError(*code)),
                None => Err(Error::RemoteError(404)),
            };

            self.current.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }
}
