use crate::models::ApiError;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{self, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{convert::Infallible, sync::Arc};
use tracing::warn;

/// The single operator key guarding every catalog route.
#[derive(Clone)]
pub struct OperatorAuth {
    key: Arc<str>,
}

impl OperatorAuth {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self { key: key.into() }
    }

    fn accepts(&self, presented: &str) -> bool {
        let expected = self.key.as_bytes();
        let presented = presented.as_bytes();
        expected.len() == presented.len()
            && expected
                .iter()
                .zip(presented)
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }
}

pub async fn require_operator(
    State(auth): State<OperatorAuth>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Infallible> {
    let Some(presented) = extract_operator_key(request.headers()) else {
        return Ok(unauthorized_response(
            "missing_operator_key",
            "Provide X-Operator-Key or Bearer token",
        ));
    };
    if !auth.accepts(&presented) {
        warn!(
            target = "catalog.api",
            path = %request.uri().path(),
            "operator_key_rejected"
        );
        return Ok(unauthorized_response("invalid_operator_key", "Key not recognized"));
    }
    Ok(next.run(request).await)
}

/// Guards an auxiliary route with a shared key read from `header_name`.
/// No expected key means the route is open.
pub fn require_header_key(
    headers: &http::HeaderMap,
    header_name: &str,
    expected: Option<&str>,
) -> Result<(), Response> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let presented = headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if OperatorAuth::new(expected).accepts(presented) {
        return Ok(());
    }
    warn!(target = "catalog.api", header = header_name, "route_key_rejected");
    Err(unauthorized_response(
        "invalid_key",
        &format!("{header_name} not recognized"),
    ))
}

fn extract_operator_key(headers: &http::HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(http::header::AUTHORIZATION)
        && let Ok(raw) = value.to_str()
        && raw.len() >= 7
        && raw[..6].eq_ignore_ascii_case("bearer")
    {
        return Some(raw[6..].trim().to_string());
    }
    headers
        .get("X-Operator-Key")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn unauthorized_response(code: &str, message: &str) -> Response {
    let payload = ApiError {
        error: code.to_string(),
        detail: Some(message.to_string()),
    };
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_and_header_keys_are_extracted() {
        let mut headers = http::HeaderMap::new();
        assert_eq!(extract_operator_key(&headers), None);

        headers.insert("X-Operator-Key", HeaderValue::from_static("  op-key "));
        assert_eq!(extract_operator_key(&headers).as_deref(), Some("op-key"));

        headers.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer bearer-key"),
        );
        assert_eq!(extract_operator_key(&headers).as_deref(), Some("bearer-key"));
    }

    #[test]
    fn route_keys_reject_with_unauthorized() {
        let mut headers = http::HeaderMap::new();
        assert!(require_header_key(&headers, "X-Docs-Key", None).is_ok());

        let rejected = require_header_key(&headers, "X-Docs-Key", Some("docs")).unwrap_err();
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

        headers.insert("X-Docs-Key", HeaderValue::from_static("wrong"));
        let rejected = require_header_key(&headers, "X-Docs-Key", Some("docs")).unwrap_err();
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

        headers.insert("X-Docs-Key", HeaderValue::from_static("docs"));
        assert!(require_header_key(&headers, "X-Docs-Key", Some("docs")).is_ok());
    }

    #[test]
    fn only_the_exact_key_is_accepted() {
        let auth = OperatorAuth::new("secret");
        assert!(auth.accepts("secret"));
        assert!(!auth.accepts("secret2"));
        assert!(!auth.accepts("Secret"));
        assert!(!auth.accepts(""));
    }
}
