//! TTL cache over a remotely hosted plain-text resource

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::metrics::SKILLS_FETCHES;

#[derive(Debug, Error)]
enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned {0}")]
    Status(u16),
    #[error("document could not be parsed")]
    Parse,
}

struct Entry<T> {
    value: T,
    fetched_at: Instant,
}

/// A remote text resource, parsed into `T` and cached for `ttl`
///
/// Fetch and parse failures are never surfaced: the caller gets the embedded
/// fallback and the next call tries the network again.
pub struct CachedResource<T> {
    name: &'static str,
    url: Option<String>,
    ttl: Duration,
    fallback: T,
    parse: fn(&str) -> Option<T>,
    client: reqwest::Client,
    entry: RwLock<Option<Entry<T>>>,
}

impl<T: Clone + Send + Sync> CachedResource<T> {
    pub fn new(
        name: &'static str,
        url: Option<String>,
        ttl: Duration,
        fallback: T,
        parse: fn(&str) -> Option<T>,
    ) -> Self {
        Self {
            name,
            url,
            ttl,
            fallback,
            parse,
            client: reqwest::Client::new(),
            entry: RwLock::new(None),
        }
    }

    /// Current value: cached if fresh, fetched if stale, fallback on failure
    pub async fn get(&self) -> T {
        if let Some(entry) = self.entry.read().await.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return entry.value.clone();
            }
        }

        let Some(url) = self.url.as_deref() else {
            return self.fallback.clone();
        };

        match self.fetch(url).await {
            Ok(value) => {
                debug!(resource = self.name, url, "Fetched configuration document");
                SKILLS_FETCHES.with_label_values(&[self.name, "ok"]).inc();
                *self.entry.write().await = Some(Entry {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                });
                value
            }
            Err(e) => {
                warn!(resource = self.name, url, error = %e, "Using embedded fallback");
                SKILLS_FETCHES.with_label_values(&[self.name, "fallback"]).inc();
                self.fallback.clone()
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<T, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let text = response.text().await?;
        (self.parse)(&text).ok_or(FetchError::Parse)
    }
}
