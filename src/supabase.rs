use crate::config::SupabaseSettings;
use crate::http::build_client;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    base_url: String,
    service_key: String,
    http: Client,
    max_retries: u32,
    backoff: Duration,
}

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    Deserialize(String),
}

impl SupabaseClient {
    pub fn new(settings: &SupabaseSettings, max_retries: u32, backoff: Duration) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            service_key: settings.service_key.clone(),
            http: build_client(),
            max_retries,
            backoff,
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    pub fn storage_object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            bucket,
            encode_key(key)
        )
    }

    pub fn public_object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            bucket,
            encode_key(key)
        )
    }

    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    /// Sends the request built by `build`, retrying transport failures and 5xx
    /// responses with exponential backoff. Other statuses are returned as-is.
    pub async fn send_with_retry<F>(&self, build: F) -> Result<Response, SupabaseError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = self.authorize(build()).send().await;
            let retriable = match &outcome {
                Ok(response) => response.status().is_server_error(),
                Err(_) => true,
            };
            if !retriable || attempt >= self.max_retries {
                return match outcome {
                    Ok(response) if response.status().is_server_error() => {
                        Err(status_error(response).await)
                    }
                    Ok(response) => Ok(response),
                    Err(err) => Err(SupabaseError::Request(err.to_string())),
                };
            }
            let delay = self.backoff * 2u32.saturating_pow(attempt);
            warn!(
                target = "catalog.store",
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "supabase_request_retry"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

pub async fn status_error(response: Response) -> SupabaseError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    SupabaseError::Status {
        status,
        body: body.chars().take(200).collect(),
    }
}

fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
