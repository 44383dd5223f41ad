use super::{ObjectStore, ObjectStoreError};
use crate::http::build_probe_client;
use crate::supabase::{SupabaseClient, status_error};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Supabase Storage bucket with public read access.
#[derive(Clone)]
pub struct SupabaseObjectStore {
    client: SupabaseClient,
    bucket: String,
    probe: Client,
}

impl SupabaseObjectStore {
    pub fn new(client: SupabaseClient, bucket: impl Into<String>, probe_timeout: Duration) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            probe: build_probe_client(probe_timeout),
        }
    }
}

#[async_trait]
impl ObjectStore for SupabaseObjectStore {
    async fn put_object(
        &self,
        bytes: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        let url = self.client.storage_object_url(&self.bucket, key);
        let put_error = |message: String| ObjectStoreError::Put {
            key: key.to_string(),
            message,
        };
        let response = self
            .client
            .send_with_retry(|| {
                self.client
                    .http()
                    .post(&url)
                    .header("Content-Type", content_type)
                    .header("x-upsert", "true")
                    .body(bytes.clone())
            })
            .await
            .map_err(|err| put_error(err.to_string()))?;
        if !response.status().is_success() {
            return Err(put_error(status_error(response).await.to_string()));
        }
        let public = self.client.public_object_url(&self.bucket, key);
        debug!(target = "catalog.storage", key = %key, size = bytes.len(), "object_stored");
        Ok(public)
    }

    async fn get_object(&self, url: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let get_error = |message: String| ObjectStoreError::Get {
            url: url.to_string(),
            message,
        };
        let response = self
            .client
            .http()
            .get(url)
            .send()
            .await
            .map_err(|err| get_error(err.to_string()))?;
        if !response.status().is_success() {
            return Err(get_error(format!("HTTP {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| get_error(err.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn probe(&self, url: &str) -> bool {
        match self.probe.head(url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(target = "catalog.storage", url = %url, status = response.status().as_u16(), "probe_unreachable");
                false
            }
            Err(err) => {
                warn!(target = "catalog.storage", url = %url, error = %err, "probe_failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupabaseSettings;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> SupabaseObjectStore {
        let client = SupabaseClient::new(
            &SupabaseSettings {
                base_url: server.uri(),
                service_key: "service".into(),
                bucket: "catalog".into(),
            },
            0,
            Duration::from_millis(1),
        );
        SupabaseObjectStore::new(client, "catalog", Duration::from_secs(2))
    }

    #[tokio::test]
    async fn upload_returns_public_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/catalog/mockups/TEE_Black.png"))
            .and(header("x-upsert", "true"))
            .and(header("Content-Type", "image/png"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"Key\":\"x\"}"))
            .mount(&server)
            .await;

        let store = store(&server);
        let url = store
            .put_object(vec![0u8; 4], "mockups/TEE_Black.png", "image/png")
            .await
            .expect("upload");
        assert_eq!(
            url,
            format!("{}/storage/v1/object/public/catalog/mockups/TEE_Black.png", server.uri())
        );
    }

    #[tokio::test]
    async fn rejected_upload_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413).set_body_string("too large"))
            .mount(&server)
            .await;

        let err = store(&server)
            .put_object(vec![0u8; 4], "original/a.png", "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::Put { .. }));
    }

    #[tokio::test]
    async fn download_and_probe() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/render.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8, 8, 7]))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/render.png"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = store(&server);
        let url = format!("{}/render.png", server.uri());
        assert_eq!(store.get_object(&url).await.unwrap(), vec![9, 8, 7]);
        assert!(store.probe(&url).await);
        assert!(!store.probe(&format!("{}/missing.png", server.uri())).await);
    }
}
