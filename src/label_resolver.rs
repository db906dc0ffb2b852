//! Resolves a label name (or id) to the Gmail label id

use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::{debug, info};

use crate::client::GmailClient;
use crate::error::Result;

/// Number of distinct lookups kept before the least recently used is evicted
pub const LABEL_CACHE_CAPACITY: usize = 10;

/// Label lookups memoized for the lifetime of the resolver
///
/// Misses are cached as well, so asking twice for an unknown label lists
/// labels only once.
pub struct LabelResolver<C: GmailClient> {
    client: C,
    cache: LruCache<String, Option<String>>,
}

impl<C: GmailClient> LabelResolver<C> {
    pub fn new(client: C) -> Self {
        Self::with_capacity(client, LABEL_CACHE_CAPACITY)
    }

    /// A capacity of 0 is treated as 1
    pub fn with_capacity(client: C, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            client,
            cache: LruCache::new(capacity),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Whether a lookup for `name` is currently cached
    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains(name)
    }

    /// Return the id of the first label whose id or display name equals `name`
    pub async fn resolve_label_id(&mut self, name: &str) -> Result<Option<String>> {
        if let Some(cached) = self.cache.get(name) {
            debug!("Label cache hit for '{}'", name);
            return Ok(cached.clone());
        }

        let labels = self.client.list_labels().await?;
        let resolved = labels
            .into_iter()
            .find(|label| label.id == name || label.name == name)
            .map(|label| label.id);

        match &resolved {
            Some(id) => info!("Resolved label '{}' to id {}", name, id),
            None => info!("No label matches '{}'", name),
        }

        self.cache.put(name.to_string(), resolved.clone());
        Ok(resolved)
    }
}
