//! Tile retrieval with caching and grouped cancellation.
//!
//! [`FetchCache`] front-ends a [`TileFetcher`] with two disposal-aware LRU
//! caches, one for decoded rasters and one for raw payload buffers, and
//! registers every retrieval in a [`CancellationRegistry`] group so a whole
//! task's outstanding requests can be cancelled at once.
//!
//! Concurrent retrievals of the same key race with last-write-wins cache
//! semantics; payloads for a given URL are idempotent, so whichever copy
//! lands last is as good as any other.

mod cache;
mod cancel;
mod client;

pub use cache::{CacheStats, DisposalLru};
pub use cancel::{CancellationRegistry, TokenGuard};
pub use client::{ReqwestFetcher, TileFetcher};

#[cfg(test)]
pub use client::tests::MockTileFetcher;

use bytes::Bytes;
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Default capacity of the decoded-raster cache, in entries.
pub const DEFAULT_RASTER_CAPACITY: usize = 512;

/// Default capacity of the raw-buffer cache, in entries.
pub const DEFAULT_BUFFER_CAPACITY: usize = 512;

/// Failure kinds a retrieval can settle with.
///
/// `Clone` so mocks can replay canned responses.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Transport failure or non-success HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// Explicit task cancellation or per-call timeout.
    #[error("retrieval cancelled")]
    Cancelled,

    /// The payload is not a valid image or buffer.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Per-call retrieval options.
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Cancellation group this call registers under.
    pub task_id: String,
    /// Deadline after which the call is auto-cancelled.
    pub timeout: Option<Duration>,
    /// Bypass the cache in both directions: no lookup, no store.
    pub skip_cache: bool,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl RetrieveOptions {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            timeout: None,
            skip_cache: false,
            headers: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }
}

/// Caching, cancellable retrieval front-end.
///
/// Shared across concurrent requests via `Arc`; all interior state is
/// synchronized.
pub struct FetchCache<C> {
    client: C,
    rasters: DisposalLru<String, RgbaImage>,
    buffers: DisposalLru<String, Bytes>,
    cancellations: Arc<CancellationRegistry>,
}

impl<C: TileFetcher> FetchCache<C> {
    /// Creates a fetch cache with default capacities.
    pub fn new(client: C) -> Self {
        Self::with_capacities(client, DEFAULT_RASTER_CAPACITY, DEFAULT_BUFFER_CAPACITY)
    }

    /// Creates a fetch cache with explicit entry capacities for the raster
    /// and buffer caches.
    pub fn with_capacities(client: C, raster_capacity: usize, buffer_capacity: usize) -> Self {
        Self {
            client,
            rasters: DisposalLru::new(raster_capacity),
            buffers: DisposalLru::new(buffer_capacity),
            cancellations: Arc::new(CancellationRegistry::new()),
        }
    }

    /// Retrieves and decodes one raster tile.
    ///
    /// On a cache hit the stored raster is duplicated and returned without
    /// network activity. On a miss the payload is fetched under the call's
    /// cancellation token, decoded, and stored unless `skip_cache` is set.
    ///
    /// # Errors
    ///
    /// [`FetchError::Network`] for transport failures, [`FetchError::Decode`]
    /// when the payload is not a decodable image, [`FetchError::Cancelled`]
    /// on task cancellation or timeout.
    pub async fn retrieve_raster(
        &self,
        url: &str,
        options: &RetrieveOptions,
    ) -> Result<RgbaImage, FetchError> {
        if !options.skip_cache {
            if let Some(image) = self.rasters.get(url) {
                trace!(url, "raster cache hit");
                return Ok(image);
            }
        }

        let bytes = self.guarded_fetch(url, options).await?;
        let image = decode_raster(&bytes)?;
        if !options.skip_cache {
            self.rasters.insert(url.to_string(), image.clone());
        }
        debug!(url, width = image.width(), height = image.height(), "raster retrieved");
        Ok(image)
    }

    /// Retrieves one raw payload without decoding it.
    ///
    /// Used for payloads the pipeline hands to external decoders, terrain
    /// data for instance. Caching and cancellation behave exactly as in
    /// [`Self::retrieve_raster`].
    pub async fn retrieve_buffer(
        &self,
        url: &str,
        options: &RetrieveOptions,
    ) -> Result<Bytes, FetchError> {
        if !options.skip_cache {
            if let Some(bytes) = self.buffers.get(url) {
                trace!(url, "buffer cache hit");
                return Ok(bytes);
            }
        }

        let bytes = self.guarded_fetch(url, options).await?;
        if !options.skip_cache {
            self.buffers.insert(url.to_string(), bytes.clone());
        }
        debug!(url, bytes = bytes.len(), "buffer retrieved");
        Ok(bytes)
    }

    /// Cancels every outstanding retrieval registered under `task_id`.
    ///
    /// Cancellation is cooperative: each affected call observes it at its
    /// next suspension point. Retrievals under other task ids continue.
    pub fn cancel_task(&self, task_id: &str) -> usize {
        self.cancellations.cancel_task(task_id)
    }

    pub fn raster_stats(&self) -> CacheStats {
        self.rasters.stats()
    }

    pub fn buffer_stats(&self) -> CacheStats {
        self.buffers.stats()
    }

    /// Runs the network call raced against its cancellation token, with the
    /// optional per-call deadline layered outside.
    async fn guarded_fetch(
        &self,
        url: &str,
        options: &RetrieveOptions,
    ) -> Result<Bytes, FetchError> {
        let guard = self.cancellations.register(&options.task_id);
        let result = match options.timeout {
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.race_fetch(url, options, &guard)).await {
                    Ok(result) => result,
                    Err(_) => {
                        guard.token().cancel();
                        debug!(url, task_id = %options.task_id, "retrieval timed out");
                        Err(FetchError::Cancelled)
                    }
                }
            }
            None => self.race_fetch(url, options, &guard).await,
        };
        // The guard drops here, settling the call and leaving its group.
        result
    }

    async fn race_fetch(
        &self,
        url: &str,
        options: &RetrieveOptions,
        guard: &TokenGuard,
    ) -> Result<Bytes, FetchError> {
        tokio::select! {
            _ = guard.token().cancelled() => {
                debug!(url, task_id = %options.task_id, "retrieval cancelled");
                Err(FetchError::Cancelled)
            }
            result = self.client.fetch(url, &options.headers) => result,
        }
    }
}

/// Decodes an image payload into RGBA.
fn decode_raster(bytes: &[u8]) -> Result<RgbaImage, FetchError> {
    let image = image::load_from_memory(bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(image.to_rgba8())
}
