use super::{ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

const MEMORY_URL_PREFIX: &str = "memory://objects/";

/// Object store kept in process memory; URLs look like `memory://objects/<key>`.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `bytes` downloadable from an arbitrary URL, e.g. a render result.
    pub async fn seed(&self, url: &str, bytes: Vec<u8>) {
        self.objects.lock().await.insert(url.to_string(), bytes);
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .await
            .keys()
            .filter_map(|url| url.strip_prefix(MEMORY_URL_PREFIX).map(str::to_string))
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        bytes: Vec<u8>,
        key: &str,
        _content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        let url = format!("{MEMORY_URL_PREFIX}{key}");
        self.objects.lock().await.insert(url.clone(), bytes);
        Ok(url)
    }

    async fn get_object(&self, url: &str) -> Result<Vec<u8>, ObjectStoreError> {
        self.objects
            .lock()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| ObjectStoreError::Get {
                url: url.to_string(),
                message: "not found".into(),
            })
    }

    async fn probe(&self, url: &str) -> bool {
        self.objects.lock().await.contains_key(url)
    }
}
