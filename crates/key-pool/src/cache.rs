//! Per-key client handle cache
//!
//! One handle per key index, created on first use and kept for the life of
//! the process. There is no eviction: a key that goes bad is kept out of
//! rotation by the pool's error state, and its handle simply stops being used.

use std::collections::HashMap;
use std::sync::Arc;

use common::Secret;
use inference::{ClientFactory, InferenceClient};
use tokio::sync::RwLock;
use tracing::debug;

/// Lazily populated map from key index to client handle.
///
/// Guarded by its own lock, independent of the pool mutex.
pub struct ClientCache {
    factory: Arc<dyn ClientFactory>,
    handles: RwLock<HashMap<usize, Arc<dyn InferenceClient>>>,
}

impl ClientCache {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Return the handle for `index`, building it from `api_key` on first use.
    ///
    /// Concurrent first requests for the same index build exactly one handle.
    pub async fn get(
        &self,
        index: usize,
        api_key: &Secret<String>,
    ) -> inference::Result<Arc<dyn InferenceClient>> {
        if let Some(handle) = self.handles.read().await.get(&index) {
            return Ok(handle.clone());
        }

        let mut handles = self.handles.write().await;
        if let Some(handle) = handles.get(&index) {
            return Ok(handle.clone());
        }

        let handle = self.factory.create(api_key)?;
        debug!(index, "client handle created");
        handles.insert(index, handle.clone());
        Ok(handle)
    }

    /// Number of handles built so far.
    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }
}
