use std::{env, time::Duration};
use thiserror::Error;

pub const DEFAULT_RENDER_BASE_URL: &str = "https://app.dynamicmockups.com/api/v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{key}`: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("template registry unreadable: {0}")]
    Templates(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Supabase,
    Memory,
}

#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub base_url: String,
    pub service_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub api_key: String,
    pub base_url: String,
    pub concurrency: usize,
    pub delay: Duration,
    pub width: u32,
    pub default_mockup_uuid: Option<String>,
    pub default_smart_object_uuid: Option<String>,
    pub templates_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: Backend,
    pub supabase: Option<SupabaseSettings>,
    pub render: RenderSettings,
    pub store_max_retries: u32,
    pub store_backoff: Duration,
    pub probe_timeout: Duration,
    pub workflow_idle: Duration,
    pub operator_key: Option<String>,
}

impl AppConfig {
    /// Reads the process environment; the first missing or malformed key wins.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let backend = match get("CATALOG_BACKEND").as_deref() {
            None => Backend::Supabase,
            Some(value) if value.eq_ignore_ascii_case("supabase") => Backend::Supabase,
            Some(value) if value.eq_ignore_ascii_case("memory") => Backend::Memory,
            Some(value) => {
                return Err(ConfigError::Invalid {
                    key: "CATALOG_BACKEND",
                    value: value.to_string(),
                });
            }
        };

        let supabase = match backend {
            Backend::Memory => None,
            Backend::Supabase => {
                let base_url = get("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?;
                let service_key = get("SUPABASE_SERVICE_ROLE_KEY")
                    .or_else(|| get("SUPABASE_SERVICE_KEY"))
                    .or_else(|| get("SUPABASE_KEY"))
                    .ok_or(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"))?;
                let bucket = get("STORAGE_BUCKET").ok_or(ConfigError::Missing("STORAGE_BUCKET"))?;
                Some(SupabaseSettings {
                    base_url: base_url.trim_end_matches('/').to_string(),
                    service_key,
                    bucket,
                })
            }
        };

        let api_key =
            get("DYNAMIC_MOCKUPS_API_KEY").ok_or(ConfigError::Missing("DYNAMIC_MOCKUPS_API_KEY"))?;
        let default_mockup_uuid = get("DEFAULT_MOCKUP_UUID");
        let default_smart_object_uuid = get("DEFAULT_SMART_OBJECT_UUID");
        match (&default_mockup_uuid, &default_smart_object_uuid) {
            (Some(_), None) => return Err(ConfigError::Missing("DEFAULT_SMART_OBJECT_UUID")),
            (None, Some(_)) => return Err(ConfigError::Missing("DEFAULT_MOCKUP_UUID")),
            _ => {}
        }

        let render = RenderSettings {
            api_key,
            base_url: get("DYNAMIC_MOCKUPS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_RENDER_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            concurrency: parse_or(&get, "RENDER_CONCURRENCY", 4usize)?.clamp(1, 8),
            delay: Duration::from_millis(parse_or(&get, "RENDER_DELAY_MS", 0u64)?),
            width: parse_or(&get, "RENDER_WIDTH", 1500u32)?,
            default_mockup_uuid,
            default_smart_object_uuid,
            templates_file: get("MOCKUP_TEMPLATES_FILE"),
        };

        Ok(Self {
            backend,
            supabase,
            render,
            store_max_retries: parse_or(&get, "STORE_MAX_RETRIES", 2u32)?,
            store_backoff: Duration::from_millis(parse_or(&get, "STORE_BACKOFF_MS", 200u64)?),
            probe_timeout: Duration::from_secs(parse_or(&get, "PROBE_TIMEOUT_SECS", 10u64)?),
            workflow_idle: Duration::from_secs(parse_or(&get, "WORKFLOW_IDLE_SECS", 3600u64)?),
            operator_key: get("OPERATOR_API_KEY"),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn memory_backend_needs_only_render_key() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("CATALOG_BACKEND", "memory"),
            ("DYNAMIC_MOCKUPS_API_KEY", "k"),
        ]))
        .expect("config");
        assert_eq!(cfg.backend, Backend::Memory);
        assert!(cfg.supabase.is_none());
        assert_eq!(cfg.render.concurrency, 4);
        assert_eq!(cfg.render.width, 1500);
        assert_eq!(cfg.render.base_url, DEFAULT_RENDER_BASE_URL);
    }

    #[test]
    fn missing_render_key_is_reported() {
        let err = AppConfig::from_lookup(lookup(&[("CATALOG_BACKEND", "memory")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DYNAMIC_MOCKUPS_API_KEY"));
    }

    #[test]
    fn supabase_backend_requires_credentials() {
        let err = AppConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://x.supabase.co/"),
            ("DYNAMIC_MOCKUPS_API_KEY", "k"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY"));

        let cfg = AppConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "https://x.supabase.co/"),
            ("SUPABASE_KEY", "secret"),
            ("STORAGE_BUCKET", "catalog"),
            ("DYNAMIC_MOCKUPS_API_KEY", "k"),
        ]))
        .expect("config");
        let supabase = cfg.supabase.expect("supabase settings");
        assert_eq!(supabase.base_url, "https://x.supabase.co");
        assert_eq!(supabase.service_key, "secret");
    }

    #[test]
    fn default_template_needs_both_halves() {
        let err = AppConfig::from_lookup(lookup(&[
            ("CATALOG_BACKEND", "memory"),
            ("DYNAMIC_MOCKUPS_API_KEY", "k"),
            ("DEFAULT_MOCKUP_UUID", "m"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("DEFAULT_SMART_OBJECT_UUID"));
    }

    #[test]
    fn numeric_settings_are_validated_and_clamped() {
        let err = AppConfig::from_lookup(lookup(&[
            ("CATALOG_BACKEND", "memory"),
            ("DYNAMIC_MOCKUPS_API_KEY", "k"),
            ("RENDER_DELAY_MS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RENDER_DELAY_MS", .. }));

        let cfg = AppConfig::from_lookup(lookup(&[
            ("CATALOG_BACKEND", "memory"),
            ("DYNAMIC_MOCKUPS_API_KEY", "k"),
            ("RENDER_CONCURRENCY", "64"),
        ]))
        .expect("config");
        assert_eq!(cfg.render.concurrency, 8);
    }
}
