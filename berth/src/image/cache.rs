//! Memoized image-existence checks.
//!
//! One probe per image reference per process, with request coalescing:
//! concurrent callers for the same uncached name await a single in-flight
//! probe. A resolved outcome (present or authoritatively not-found) is
//! cached; an unexpected probe failure is propagated and leaves the entry
//! unset so the next call re-probes.

use crate::errors::{BerthError, BerthResult};
use crate::image::ImageName;
use crate::runtime::RuntimeClient;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    exists: bool,
    #[allow(dead_code)]
    checked_at: DateTime<Utc>,
}

/// Process-wide image existence cache.
///
/// The per-name cell is inserted into the map under a sync lock *before*
/// the probe runs, so two truly simultaneous first callers land on the same
/// cell; `OnceCell` then guarantees a single initializer at a time.
#[derive(Default)]
pub struct ImageExistsCache {
    entries: parking_lot::Mutex<HashMap<String, Arc<OnceCell<CacheEntry>>>>,
}

impl ImageExistsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the image is present locally, probing the daemon at most once.
    pub async fn exists(
        &self,
        client: &Arc<dyn RuntimeClient>,
        name: &ImageName,
    ) -> BerthResult<bool> {
        let cell = self.cell_for(name);
        let entry = cell
            .get_or_try_init(|| async {
                tracing::debug!(image = %name, "probing image existence");
                let exists = client.inspect_image(name).await?;
                Ok::<_, BerthError>(CacheEntry {
                    exists,
                    checked_at: Utc::now(),
                })
            })
            .await?;
        Ok(entry.exists)
    }

    /// Ensure the image is available locally, pulling it on a miss.
    pub async fn ensure_present(
        &self,
        client: &Arc<dyn RuntimeClient>,
        name: &ImageName,
    ) -> BerthResult<()> {
        if self.exists(client, name).await? {
            return Ok(());
        }

        tracing::info!(image = %name, "image not present locally, pulling");
        client.pull(name).await?;

        // The miss is already memoized; replace it so later existence
        // checks reflect the completed pull.
        self.entries.lock().insert(
            name.canonical(),
            Arc::new(OnceCell::new_with(Some(CacheEntry {
                exists: true,
                checked_at: Utc::now(),
            }))),
        );
        Ok(())
    }

    fn cell_for(&self, name: &ImageName) -> Arc<OnceCell<CacheEntry>> {
        self.entries
            .lock()
            .entry(name.canonical())
            .or_default()
            .clone()
    }
}

impl std::fmt::Debug for ImageExistsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageExistsCache")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}
