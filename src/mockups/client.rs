use crate::config::RenderSettings;
use crate::http::build_client;
use crate::mockups::templates::MockupTemplate;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub mockup_uuid: String,
    pub smart_object_uuid: String,
    /// `#RRGGBB` garment colour.
    pub color: String,
    pub design_url: String,
    pub width: u32,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("render response carried no export_path")]
    MissingExportPath,
}

/// Produces one mockup image URL per request.
#[async_trait]
pub trait RenderService: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<String, RenderError>;
}

pub struct DynamicMockupsClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl DynamicMockupsClient {
    pub fn new(settings: &RenderSettings) -> Self {
        Self {
            http: build_client(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        }
    }

    /// Every printable area of every mockup the account can render.
    pub async fn list_templates(&self) -> Result<Vec<MockupTemplate>, RenderError> {
        let response = self
            .http
            .get(format!("{}/mockups", self.base_url))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|err| RenderError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(RenderError::Http(format!("HTTP {}", response.status())));
        }

        let payload: MockupListResponse = response
            .json()
            .await
            .map_err(|err| RenderError::InvalidResponse(err.to_string()))?;

        Ok(payload
            .data
            .into_iter()
            .flat_map(|mockup| {
                let mockup_uuid = mockup.uuid;
                let mockup_name = mockup.name;
                mockup.smart_objects.into_iter().map(move |object| {
                    let label = match (&mockup_name, &object.name) {
                        (Some(mockup), Some(area)) => Some(format!("{mockup} / {area}")),
                        (Some(mockup), None) => Some(mockup.clone()),
                        (None, area) => area.clone(),
                    };
                    MockupTemplate {
                        mockup_uuid: mockup_uuid.clone(),
                        smart_object_uuid: object.uuid,
                        label,
                    }
                })
            })
            .collect())
    }
}

#[async_trait]
impl RenderService for DynamicMockupsClient {
    async fn render(&self, request: &RenderRequest) -> Result<String, RenderError> {
        let body = RenderBody {
            mockup_uuid: &request.mockup_uuid,
            smart_objects: vec![SmartObject {
                uuid: &request.smart_object_uuid,
                color: &request.color,
                asset: Asset {
                    url: &request.design_url,
                },
            }],
            format: "png",
            width: request.width,
            transparent_background: true,
        };

        let response = self
            .http
            .post(format!("{}/renders", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| RenderError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(RenderError::Http(format!("HTTP {}", response.status())));
        }

        let payload: RenderResponse = response
            .json()
            .await
            .map_err(|err| RenderError::InvalidResponse(err.to_string()))?;

        payload
            .data
            .and_then(|data| data.export_path)
            .filter(|path| !path.trim().is_empty())
            .ok_or(RenderError::MissingExportPath)
    }
}

#[derive(Debug, Serialize)]
struct RenderBody<'a> {
    mockup_uuid: &'a str,
    smart_objects: Vec<SmartObject<'a>>,
    format: &'static str,
    width: u32,
    transparent_background: bool,
}

#[derive(Debug, Serialize)]
struct SmartObject<'a> {
    uuid: &'a str,
    color: &'a str,
    asset: Asset<'a>,
}

#[derive(Debug, Serialize)]
struct Asset<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    #[serde(default)]
    data: Option<RenderData>,
}

#[derive(Debug, Deserialize)]
struct RenderData {
    #[serde(default)]
    export_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MockupListResponse {
    #[serde(default)]
    data: Vec<MockupSummary>,
}

#[derive(Debug, Deserialize)]
struct MockupSummary {
    uuid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    smart_objects: Vec<SmartObjectSummary>,
}

#[derive(Debug, Deserialize)]
struct SmartObjectSummary {
    uuid: String,
    #[serde(default)]
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DynamicMockupsClient {
        DynamicMockupsClient::new(&RenderSettings {
            api_key: "render-key".into(),
            base_url: server.uri(),
            concurrency: 4,
            delay: Duration::ZERO,
            width: 1500,
            default_mockup_uuid: None,
            default_smart_object_uuid: None,
            templates_file: None,
        })
    }

    fn request() -> RenderRequest {
        RenderRequest {
            mockup_uuid: "m-1".into(),
            smart_object_uuid: "so-1".into(),
            color: "#000000".into(),
            design_url: "https://cdn.example.com/original/a.png".into(),
            width: 1500,
        }
    }

    #[tokio::test]
    async fn render_posts_payload_and_reads_export_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/renders"))
            .and(header("x-api-key", "render-key"))
            .and(body_partial_json(json!({
                "mockup_uuid": "m-1",
                "smart_objects": [{
                    "uuid": "so-1",
                    "color": "#000000",
                    "asset": {"url": "https://cdn.example.com/original/a.png"}
                }],
                "format": "png",
                "width": 1500,
                "transparent_background": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"export_path": "https://renders.example.com/r1.png"}
            })))
            .mount(&server)
            .await;

        let url = client(&server).render(&request()).await.expect("render");
        assert_eq!(url, "https://renders.example.com/r1.png");
    }

    #[tokio::test]
    async fn missing_export_path_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/renders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .mount(&server)
            .await;

        let err = client(&server).render(&request()).await.unwrap_err();
        assert!(matches!(err, RenderError::MissingExportPath));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client(&server).render(&request()).await.unwrap_err();
        assert!(matches!(err, RenderError::Http(message) if message.contains("429")));
    }

    #[tokio::test]
    async fn templates_flatten_smart_objects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/mockups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"uuid": "m-1", "name": "Tee", "smart_objects": [
                        {"uuid": "so-front", "name": "Front"},
                        {"uuid": "so-back", "name": "Back"}
                    ]},
                    {"uuid": "m-2", "smart_objects": []}
                ]
            })))
            .mount(&server)
            .await;

        let templates = client(&server).list_templates().await.expect("templates");
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].smart_object_uuid, "so-front");
        assert_eq!(templates[1].label.as_deref(), Some("Tee / Back"));
    }
}
