//! Origin to drive cache.
//!
//! A drive is opened the first time any request names it and is then shared
//! by every later request. Handles are cached under both the origin the
//! request used and the drive's canonical id, since peers and URLs refer to
//! drives by id while clients often use a name.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

use crate::drive::handle::DriveHandle;
use crate::drive::store::{Drive, Sdk};
use crate::error::{FetchError, FetchResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

type Flight = Arc<OnceCell<Arc<DriveHandle>>>;

pub struct DriveRegistry {
    sdk: Arc<dyn Sdk>,
    drives: RwLock<HashMap<String, Arc<DriveHandle>>>,
    /// One open in progress per origin; later callers wait on it
    pending: Mutex<HashMap<String, Flight>>,
    timeout: Duration,
    /// Bound on distinct cached drives, unbounded when `None`
    max_drives: Option<usize>,
    clock: AtomicU64,
}

impl DriveRegistry {
    pub fn new(sdk: Arc<dyn Sdk>) -> Self {
        Self {
            sdk,
            drives: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            timeout: DEFAULT_TIMEOUT,
            max_drives: None,
            clock: AtomicU64::new(0),
        }
    }

    /// Bounds how long opening a drive may take.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keeps at most `max_drives` drives cached, evicting the least
    /// recently used one when a new drive would exceed the bound.
    pub fn with_max_drives(mut self, max_drives: Option<usize>) -> Self {
        self.max_drives = max_drives.map(|max| max.max(1));
        self
    }

    /// Resolves the drive behind a request origin (a name or a key).
    pub async fn get_drive(&self, origin: &str) -> FetchResult<Arc<DriveHandle>> {
        if let Some(handle) = self.cached(origin).await {
            debug!(origin, "Drive cache hit");
            return Ok(handle);
        }

        let sdk = self.sdk.clone();
        self.single_flight(origin, || async move {
            let drive = sdk.get(origin).await?;
            drive.ready().await?;
            Ok::<_, FetchError>(drive)
        })
        .await
    }

    /// Resolves the writable drive owned by an external `key`.
    ///
    /// With `create_if_missing` unset, a key whose core was never written
    /// fails with [`FetchError::PreconditionFailed`] instead of creating a
    /// drive as a side effect of reading.
    pub async fn get_drive_from_key(
        &self,
        key: &str,
        create_if_missing: bool,
    ) -> FetchResult<Arc<DriveHandle>> {
        if let Some(handle) = self.cached(key).await {
            debug!(key, "Drive cache hit");
            return Ok(handle);
        }

        let sdk = self.sdk.clone();
        self.single_flight(key, || async move {
            if !create_if_missing && sdk.named_core_length(key).await? == 0 {
                return Err(FetchError::PreconditionFailed(
                    "Must create key with POST before reading".to_string(),
                ));
            }
            let drive = sdk.open_named(key).await?;
            drive.ready().await?;
            Ok::<_, FetchError>(drive)
        })
        .await
    }

    /// The cached handle for `origin`, if any. Counts as a use.
    pub async fn cached(&self, origin: &str) -> Option<Arc<DriveHandle>> {
        let handle = self.drives.read().await.get(origin).cloned()?;
        handle.touch(self.tick());
        Some(handle)
    }

    /// Number of distinct drives in the cache.
    pub async fn len(&self) -> usize {
        let drives = self.drives.read().await;
        distinct(&drives).len()
    }

    pub async fn is_empty(&self) -> bool {
        self.drives.read().await.is_empty()
    }

    async fn single_flight<F, Fut>(&self, origin: &str, open: F) -> FetchResult<Arc<DriveHandle>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<Arc<dyn Drive>>>,
    {
        let flight = self
            .pending
            .lock()
            .entry(origin.to_string())
            .or_default()
            .clone();

        let result = flight
            .get_or_try_init(|| async move {
                // A previous flight may have landed between the cache miss and now
                if let Some(handle) = self.cached(origin).await {
                    return Ok(handle);
                }

                let drive = tokio::time::timeout(self.timeout, open())
                    .await
                    .map_err(|_| FetchError::Timeout(self.timeout))??;
                Ok::<_, FetchError>(self.insert(origin, drive).await)
            })
            .await
            .cloned();

        let mut pending = self.pending.lock();
        if pending
            .get(origin)
            .is_some_and(|current| Arc::ptr_eq(current, &flight))
        {
            pending.remove(origin);
        }

        result
    }

    async fn insert(&self, origin: &str, drive: Arc<dyn Drive>) -> Arc<DriveHandle> {
        let id = drive.core().id();
        let mut drives = self.drives.write().await;

        // Reuse the handle when the drive is already cached under its id
        let handle = match drives.get(&id) {
            Some(existing) => existing.clone(),
            None => {
                let handle = Arc::new(DriveHandle::new(drive));
                info!(origin, drive = %handle.url(), "Drive opened");
                handle
            }
        };
        handle.touch(self.tick());

        drives.insert(origin.to_string(), handle.clone());
        drives.insert(id, handle.clone());

        if let Some(max) = self.max_drives {
            evict_over(&mut drives, max, &handle);
        }

        handle
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn distinct(drives: &HashMap<String, Arc<DriveHandle>>) -> Vec<&Arc<DriveHandle>> {
    let mut seen: Vec<&Arc<DriveHandle>> = Vec::new();
    for handle in drives.values() {
        if !seen.iter().any(|h| Arc::ptr_eq(*h, handle)) {
            seen.push(handle);
        }
    }
    seen
}

/// Drops least recently used drives, with all their aliases, until at most
/// `max` remain. `keep` is never evicted.
fn evict_over(drives: &mut HashMap<String, Arc<DriveHandle>>, max: usize, keep: &Arc<DriveHandle>) {
    loop {
        let handles = distinct(drives);
        if handles.len() <= max {
            return;
        }

        let Some(victim) = handles
            .into_iter()
            .filter(|h| !Arc::ptr_eq(*h, keep))
            .min_by_key(|h| h.last_used())
            .cloned()
        else {
            return;
        };

        drives.retain(|_, h| !Arc::ptr_eq(h, &victim));
        warn!(drive = %victim.url(), "Evicted least recently used drive");
    }
}
