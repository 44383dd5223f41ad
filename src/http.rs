use reqwest::Client;
use std::time::Duration;

pub fn build_client() -> Client {
    let timeout = std::env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(15);
    let connect = std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    client_with_timeout(Duration::from_secs(timeout), Duration::from_secs(connect))
}

/// Short-lived client for accessibility probes of freshly uploaded images.
pub fn build_probe_client(timeout: Duration) -> Client {
    client_with_timeout(timeout, timeout.min(Duration::from_secs(5)))
}

fn client_with_timeout(timeout: Duration, connect: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(connect)
        .build()
        .unwrap_or_else(|_| Client::new())
}
