//! Loosely typed catalog columns decoded once when a row leaves the store.
//!
//! `size`, `color`, `mockup_urls` and the template id lists are stored as
//! either plain text or JSON-encoded text. Decoding never fails: anything that
//! does not parse falls back to its raw text.

use crate::catalog::color::{hex_to_name, is_hex_color, normalize_hex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
enum ParseError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected {0}")]
    Shape(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEntry {
    pub name: String,
    pub sku: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantEntry {
    Named { name: String, sku: Option<String> },
    Text(String),
}

impl VariantEntry {
    /// Display form: names as-is, hex strings resolved to colour names.
    pub fn display(&self) -> String {
        match self {
            VariantEntry::Named { name, .. } => name.clone(),
            VariantEntry::Text(value) if is_hex_color(value) => hex_to_name(value),
            VariantEntry::Text(value) => value.clone(),
        }
    }

    pub fn sku(&self) -> Option<&str> {
        match self {
            VariantEntry::Named { sku, .. } => sku.as_deref().filter(|s| !s.is_empty()),
            VariantEntry::Text(_) => None,
        }
    }

    fn from_value(value: &Value) -> Self {
        match value {
            Value::String(text) => VariantEntry::Text(text.clone()),
            Value::Object(obj) => match obj.get("name").and_then(Value::as_str) {
                Some(name) => VariantEntry::Named {
                    name: name.to_string(),
                    sku: obj.get("sku").and_then(Value::as_str).map(str::to_string),
                },
                None => VariantEntry::Text(value.to_string()),
            },
            other => VariantEntry::Text(other.to_string()),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            VariantEntry::Named { name, sku } => {
                let mut obj = Map::new();
                obj.insert("name".into(), Value::String(name.clone()));
                if let Some(sku) = sku {
                    obj.insert("sku".into(), Value::String(sku.clone()));
                }
                Value::Object(obj)
            }
            VariantEntry::Text(text) => Value::String(text.clone()),
        }
    }
}

/// A `size` or `color` column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VariantField {
    #[default]
    Empty,
    Plain(String),
    Entries(Vec<VariantEntry>),
}

impl VariantField {
    pub fn decode(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return VariantField::Empty;
        }
        match parse_list(trimmed) {
            Ok(items) => VariantField::Entries(items.iter().map(VariantEntry::from_value).collect()),
            Err(err) => {
                debug!(target = "catalog.fields", error = %err, "variant_field_plain");
                VariantField::Plain(raw.to_string())
            }
        }
    }

    pub fn from_sizes(sizes: &[SizeEntry]) -> Self {
        if sizes.is_empty() {
            return VariantField::Empty;
        }
        VariantField::Entries(
            sizes
                .iter()
                .map(|size| VariantEntry::Named {
                    name: size.name.clone(),
                    sku: Some(size.sku.clone()),
                })
                .collect(),
        )
    }

    pub fn from_colors(colors: &[String]) -> Self {
        if colors.is_empty() {
            return VariantField::Empty;
        }
        VariantField::Entries(colors.iter().cloned().map(VariantEntry::Text).collect())
    }

    pub fn entries(&self) -> Vec<VariantEntry> {
        match self {
            VariantField::Empty => vec![],
            VariantField::Plain(raw) => vec![VariantEntry::Text(raw.clone())],
            VariantField::Entries(entries) => entries.clone(),
        }
    }

    /// Plain values pass through untouched; list entries are resolved for display.
    pub fn display_values(&self) -> Vec<String> {
        match self {
            VariantField::Empty => vec![],
            VariantField::Plain(raw) => vec![raw.clone()],
            VariantField::Entries(entries) => entries.iter().map(VariantEntry::display).collect(),
        }
    }

    /// Raw text values, e.g. the hex strings of a colour list.
    pub fn raw_values(&self) -> Vec<String> {
        match self {
            VariantField::Empty => vec![],
            VariantField::Plain(raw) => vec![raw.clone()],
            VariantField::Entries(entries) => entries
                .iter()
                .map(|entry| match entry {
                    VariantEntry::Named { name, .. } => name.clone(),
                    VariantEntry::Text(text) => text.clone(),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            VariantField::Empty => true,
            VariantField::Plain(raw) => raw.trim().is_empty(),
            VariantField::Entries(entries) => entries.is_empty(),
        }
    }

    fn encode(&self) -> Option<String> {
        match self {
            VariantField::Empty => None,
            VariantField::Plain(raw) => Some(raw.clone()),
            VariantField::Entries(entries) => Some(
                Value::Array(entries.iter().map(VariantEntry::to_value).collect()).to_string(),
            ),
        }
    }
}

fn parse_list(raw: &str) -> Result<Vec<Value>, ParseError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(items) => Ok(items),
        _ => Err(ParseError::Shape("a json list")),
    }
}

impl Serialize for VariantField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.encode().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VariantField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            None | Some(Value::Null) => VariantField::Empty,
            Some(Value::String(raw)) => VariantField::decode(&raw),
            Some(Value::Array(items)) => {
                VariantField::Entries(items.iter().map(VariantEntry::from_value).collect())
            }
            Some(other) => VariantField::Plain(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockupUrl {
    pub color: String,
    pub url: String,
}

/// Ordered hex colour → rendered image URL map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockupUrls(Vec<MockupUrl>);

impl MockupUrls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Value>(raw)
            .map_err(ParseError::from)
            .and_then(|value| match value {
                Value::Object(obj) => Ok(Self::from_object(&obj)),
                _ => Err(ParseError::Shape("a json object")),
            }) {
            Ok(urls) => urls,
            Err(err) => {
                debug!(target = "catalog.fields", error = %err, "mockup_urls_unreadable");
                Self::default()
            }
        }
    }

    fn from_object(obj: &Map<String, Value>) -> Self {
        let mut urls = Self::default();
        for (key, value) in obj {
            if let Some(url) = value.as_str() {
                urls.insert(key, url);
            }
        }
        urls
    }

    /// Inserts or replaces; keys are stored as canonical `#RRGGBB` when possible.
    pub fn insert(&mut self, color: &str, url: &str) {
        let key = normalize_hex(color).unwrap_or_else(|| color.trim().to_string());
        if let Some(existing) = self.0.iter_mut().find(|entry| entry.color == key) {
            existing.url = url.to_string();
        } else {
            self.0.push(MockupUrl {
                color: key,
                url: url.to_string(),
            });
        }
    }

    pub fn get(&self, color: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|entry| entry.color == color)
            .map(|entry| entry.url.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MockupUrl> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_object(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|entry| (entry.color.clone(), Value::String(entry.url.clone())))
            .collect()
    }
}

impl Serialize for MockupUrls {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_empty() {
            return serializer.serialize_none();
        }
        Value::Object(self.to_object())
            .to_string()
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MockupUrls {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::String(raw)) => MockupUrls::decode(&raw),
            Some(Value::Object(obj)) => MockupUrls::from_object(&obj),
            _ => MockupUrls::default(),
        })
    }
}

/// A numeric column that may hold text in older rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseNumber {
    Number(f64),
    Text(String),
}

impl LooseNumber {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            LooseNumber::Number(value) => Some(*value),
            LooseNumber::Text(text) => text.trim().parse::<f64>().ok(),
        }
        .filter(|value| value.is_finite())
    }
}

/// Non-numeric or missing prices export as 0.0.
pub fn coerce_price(value: Option<&LooseNumber>) -> f64 {
    value
        .and_then(LooseNumber::as_f64)
        .map(|price| price.max(0.0))
        .unwrap_or(0.0)
}

/// Non-numeric or missing quantities export as 0.
pub fn coerce_quantity(value: Option<&LooseNumber>) -> i64 {
    value
        .and_then(LooseNumber::as_f64)
        .map(|quantity| quantity.trunc().max(0.0) as i64)
        .unwrap_or(0)
}

/// `(de)serialize_with` helpers for JSON-encoded string lists such as `mockup_ids`.
pub mod json_list {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(values: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        if values.is_empty() {
            return serializer.serialize_none();
        }
        let encoded = serde_json::to_string(values).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::String(raw)) => decode(&raw),
            Some(Value::Array(items)) => strings(&items),
            _ => vec![],
        })
    }

    pub fn decode(raw: &str) -> Vec<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return vec![];
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Array(items)) => strings(&items),
            _ => vec![trimmed.to_string()],
        }
    }

    fn strings(items: &[Value]) -> Vec<String> {
        items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .filter(|text| !text.is_empty())
            .collect()
    }
}
