use crate::catalog::fields::{LooseNumber, MockupUrls, VariantField, json_list};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{DefaultOnNull, serde_as, skip_serializing_none};
use std::collections::BTreeMap;
use thiserror::Error;

pub type RecordId = i64;

/// Template uuid → hex colour → image URL.
pub type TemplateMockupUrls = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
pub enum Role {
    #[default]
    Parent,
    Child,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "Parent",
            Role::Child => "Child",
        }
    }

    pub fn from_str(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "parent" => Some(Role::Parent),
            "child" => Some(Role::Child),
            _ => None,
        }
    }
}

/// A row of the `products` table.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: RecordId,
    pub product_name: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub item_sku: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(rename = "parent_child", default)]
    pub role: Role,
    #[serde(default)]
    pub parent_sku: Option<String>,
    #[serde(default)]
    pub size: VariantField,
    #[serde(default)]
    pub color: VariantField,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub marketplace_title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tax_class: Option<String>,
    #[serde(default)]
    pub quantity: Option<LooseNumber>,
    #[serde(default)]
    pub price: Option<LooseNumber>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub mockup_id: Option<String>,
    #[serde(default)]
    pub smart_object_uuid: Option<String>,
    #[serde(default, with = "json_list")]
    pub mockup_ids: Vec<String>,
    #[serde(default, with = "json_list")]
    pub smart_object_uuids: Vec<String>,
    /// Columns this service does not know about, in the order the store sent them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Writable fields of a `products` row.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDraft {
    pub product_name: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub item_sku: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(rename = "parent_child", default)]
    pub role: Role,
    #[serde(default)]
    pub parent_sku: Option<String>,
    #[serde(default)]
    pub size: VariantField,
    #[serde(default)]
    pub color: VariantField,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub marketplace_title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tax_class: Option<String>,
    #[serde(default)]
    pub quantity: Option<LooseNumber>,
    #[serde(default)]
    pub price: Option<LooseNumber>,
    #[serde(default)]
    pub mockup_id: Option<String>,
    #[serde(default)]
    pub smart_object_uuid: Option<String>,
    #[serde(default, with = "json_list")]
    pub mockup_ids: Vec<String>,
    #[serde(default, with = "json_list")]
    pub smart_object_uuids: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("product_name is required")]
    MissingName,
    #[error("parent products must not carry a parent_sku")]
    ParentWithParentSku,
    #[error("child products require a parent_sku")]
    ChildWithoutParentSku,
    #[error("mockup_ids ({mockups}) and smart_object_uuids ({smart_objects}) differ in length")]
    TemplateListMismatch { mockups: usize, smart_objects: usize },
    #[error("{field} must not be negative")]
    Negative { field: &'static str },
}

impl CatalogDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.product_name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        let has_parent_sku = self
            .parent_sku
            .as_deref()
            .is_some_and(|sku| !sku.trim().is_empty());
        match self.role {
            Role::Parent if has_parent_sku => return Err(ValidationError::ParentWithParentSku),
            Role::Child if !has_parent_sku => return Err(ValidationError::ChildWithoutParentSku),
            _ => {}
        }
        if !self.smart_object_uuids.is_empty() && self.mockup_ids.len() != self.smart_object_uuids.len() {
            return Err(ValidationError::TemplateListMismatch {
                mockups: self.mockup_ids.len(),
                smart_objects: self.smart_object_uuids.len(),
            });
        }
        if self
            .quantity
            .as_ref()
            .and_then(LooseNumber::as_f64)
            .is_some_and(|value| value < 0.0)
        {
            return Err(ValidationError::Negative { field: "quantity" });
        }
        if self
            .price
            .as_ref()
            .and_then(LooseNumber::as_f64)
            .is_some_and(|value| value < 0.0)
        {
            return Err(ValidationError::Negative { field: "price" });
        }
        Ok(())
    }
}

/// A row of the `generated_products` table: one rendering pass for a design.
#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedProduct {
    pub id: RecordId,
    pub product_name: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub item_sku: String,
    #[serde(default)]
    pub parent_sku: Option<String>,
    #[serde(default)]
    pub parent_product_id: Option<RecordId>,
    #[serde(default)]
    pub marketplace_title: Option<String>,
    #[serde(default)]
    pub size: VariantField,
    #[serde(default)]
    pub color: VariantField,
    #[serde(default)]
    pub original_design_url: Option<String>,
    #[serde(default)]
    pub mockup_urls: MockupUrls,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub template_mockup_urls: TemplateMockupUrls,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedDraft {
    pub product_name: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub item_sku: String,
    #[serde(default)]
    pub parent_sku: Option<String>,
    #[serde(default)]
    pub parent_product_id: Option<RecordId>,
    #[serde(default)]
    pub marketplace_title: Option<String>,
    #[serde(default)]
    pub size: VariantField,
    #[serde(default)]
    pub color: VariantField,
    #[serde(default)]
    pub original_design_url: Option<String>,
    #[serde(default)]
    pub mockup_urls: MockupUrls,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub template_mockup_urls: TemplateMockupUrls,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub is_published: bool,
}

impl From<&GeneratedProduct> for GeneratedDraft {
    fn from(product: &GeneratedProduct) -> Self {
        Self {
            product_name: product.product_name.clone(),
            item_sku: product.item_sku.clone(),
            parent_sku: product.parent_sku.clone(),
            parent_product_id: product.parent_product_id,
            marketplace_title: product.marketplace_title.clone(),
            size: product.size.clone(),
            color: product.color.clone(),
            original_design_url: product.original_design_url.clone(),
            mockup_urls: product.mockup_urls.clone(),
            template_mockup_urls: product.template_mockup_urls.clone(),
            is_published: product.is_published,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
