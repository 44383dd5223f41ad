use crate::config::{ConfigError, RenderSettings};
use crate::models::CatalogRecord;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::fs;
use thiserror::Error;

/// One printable area of one mockup.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MockupTemplate {
    pub mockup_uuid: String,
    pub smart_object_uuid: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl MockupTemplate {
    pub fn new(mockup_uuid: impl Into<String>, smart_object_uuid: impl Into<String>) -> Self {
        Self {
            mockup_uuid: mockup_uuid.into(),
            smart_object_uuid: smart_object_uuid.into(),
            label: None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown mockup template `{0}`")]
    Unknown(String),
    #[error("no mockup template configured for this product")]
    NoneAvailable,
}

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    templates: Vec<MockupTemplate>,
}

/// Operator-curated templates plus the configured fallback pair.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<MockupTemplate>,
    default: Option<MockupTemplate>,
}

impl TemplateRegistry {
    pub fn new(templates: Vec<MockupTemplate>, default: Option<MockupTemplate>) -> Self {
        Self { templates, default }
    }

    pub fn from_yaml(raw: &str) -> Result<Vec<MockupTemplate>, ConfigError> {
        let file: RegistryFile =
            serde_yaml::from_str(raw).map_err(|err| ConfigError::Templates(err.to_string()))?;
        Ok(file.templates)
    }

    pub fn from_settings(settings: &RenderSettings) -> Result<Self, ConfigError> {
        let templates = match &settings.templates_file {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .map_err(|err| ConfigError::Templates(format!("{path}: {err}")))?;
                Self::from_yaml(&raw)?
            }
            None => Vec::new(),
        };
        let default = settings
            .default_mockup_uuid
            .as_ref()
            .zip(settings.default_smart_object_uuid.as_ref())
            .map(|(mockup, smart_object)| MockupTemplate {
                mockup_uuid: mockup.clone(),
                smart_object_uuid: smart_object.clone(),
                label: Some("default".into()),
            });
        Ok(Self::new(templates, default))
    }

    pub fn templates(&self) -> &[MockupTemplate] {
        &self.templates
    }

    pub fn default_template(&self) -> Option<&MockupTemplate> {
        self.default.as_ref()
    }

    /// Looks up by mockup uuid, smart object uuid or label.
    pub fn find(&self, id: &str) -> Option<&MockupTemplate> {
        let id = id.trim();
        self.templates.iter().chain(self.default.iter()).find(|template| {
            template.mockup_uuid == id
                || template.smart_object_uuid == id
                || template.label.as_deref() == Some(id)
        })
    }

    /// Templates for one workflow, first match wins: explicitly requested ids,
    /// the parent's paired template lists, its single template pair, the
    /// configured default.
    pub fn resolve(
        &self,
        requested: &[String],
        parent: Option<&CatalogRecord>,
    ) -> Result<Vec<MockupTemplate>, TemplateError> {
        if !requested.is_empty() {
            return requested
                .iter()
                .map(|id| {
                    self.find(id)
                        .cloned()
                        .ok_or_else(|| TemplateError::Unknown(id.clone()))
                })
                .collect();
        }

        if let Some(parent) = parent {
            let paired: Vec<MockupTemplate> = parent
                .mockup_ids
                .iter()
                .zip(parent.smart_object_uuids.iter())
                .filter(|(mockup, smart_object)| {
                    !mockup.trim().is_empty() && !smart_object.trim().is_empty()
                })
                .map(|(mockup, smart_object)| MockupTemplate::new(mockup.trim(), smart_object.trim()))
                .collect();
            if !paired.is_empty() {
                return Ok(paired);
            }

            let single = parent
                .mockup_id
                .as_deref()
                .zip(parent.smart_object_uuid.as_deref())
                .filter(|(mockup, smart_object)| {
                    !mockup.trim().is_empty() && !smart_object.trim().is_empty()
                });
            if let Some((mockup, smart_object)) = single {
                return Ok(vec![MockupTemplate::new(mockup.trim(), smart_object.trim())]);
            }
        }

        self.default
            .clone()
            .map(|template| vec![template])
            .ok_or(TemplateError::NoneAvailable)
    }
}
