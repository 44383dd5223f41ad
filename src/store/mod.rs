//! Persistence for catalog products and generated products.
//!
//! Both tables share one contract, [`Collection`], so the export and fan-out
//! code never cares whether rows live in Supabase or in memory.

pub mod memory;
pub mod rest;

pub use memory::MemoryCollection;
pub use rest::RestCollection;

use crate::models::{CatalogDraft, CatalogRecord, GeneratedDraft, GeneratedProduct, RecordId};
use crate::supabase::SupabaseClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{operation} failed: {message}")]
    Request { operation: String, message: String },
    #[error("{operation} returned unreadable rows: {message}")]
    Decode { operation: String, message: String },
}

impl StoreError {
    pub fn request(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Request {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn decode(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            operation: operation.into(),
            message: message.to_string(),
        }
    }
}

/// A row type with a writable draft form.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;
    /// Whether updates stamp an `updated_at` column.
    const TOUCH_ON_UPDATE: bool = false;

    type Draft: Clone + Serialize + Send + Sync + 'static;

    fn id(&self) -> RecordId;
    fn created_at(&self) -> DateTime<Utc>;
    fn from_draft(id: RecordId, draft: Self::Draft, now: DateTime<Utc>) -> Self;
    fn apply_draft(&mut self, draft: Self::Draft, now: DateTime<Utc>);
    fn matches_sku(&self, sku: &str) -> bool;
}

/// Inclusive `created_at` window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl ListFilter {
    pub fn matches(&self, created_at: DateTime<Utc>) -> bool {
        self.created_from.is_none_or(|from| created_at >= from)
            && self.created_to.is_none_or(|to| created_at <= to)
    }
}

#[async_trait]
pub trait Collection<E: Entity>: Send + Sync {
    async fn create(&self, draft: E::Draft) -> Result<RecordId, StoreError>;
    async fn get(&self, id: RecordId) -> Result<Option<E>, StoreError>;
    /// Newest first.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<E>, StoreError>;
    async fn update(&self, id: RecordId, draft: E::Draft) -> Result<bool, StoreError>;
    async fn delete(&self, id: RecordId) -> Result<bool, StoreError>;
    /// Rows whose `item_sku` or `parent_sku` equals `sku`.
    async fn find_by_sku(&self, sku: &str) -> Result<Vec<E>, StoreError>;
}

impl Entity for CatalogRecord {
    const TABLE: &'static str = "products";
    type Draft = CatalogDraft;

    fn id(&self) -> RecordId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn from_draft(id: RecordId, draft: CatalogDraft, now: DateTime<Utc>) -> Self {
        let mut record = CatalogRecord {
            id,
            product_name: String::new(),
            item_sku: String::new(),
            role: draft.role,
            parent_sku: None,
            size: Default::default(),
            color: Default::default(),
            image_url: None,
            marketplace_title: None,
            category: None,
            tax_class: None,
            quantity: None,
            price: None,
            created_at: now,
            mockup_id: None,
            smart_object_uuid: None,
            mockup_ids: Vec::new(),
            smart_object_uuids: Vec::new(),
            extra: Default::default(),
        };
        record.apply_draft(draft, now);
        record
    }

    fn apply_draft(&mut self, draft: CatalogDraft, _now: DateTime<Utc>) {
        self.product_name = draft.product_name;
        self.item_sku = draft.item_sku;
        self.role = draft.role;
        self.parent_sku = draft.parent_sku;
        self.size = draft.size;
        self.color = draft.color;
        self.image_url = draft.image_url;
        self.marketplace_title = draft.marketplace_title;
        self.category = draft.category;
        self.tax_class = draft.tax_class;
        self.quantity = draft.quantity;
        self.price = draft.price;
        self.mockup_id = draft.mockup_id;
        self.smart_object_uuid = draft.smart_object_uuid;
        self.mockup_ids = draft.mockup_ids;
        self.smart_object_uuids = draft.smart_object_uuids;
    }

    fn matches_sku(&self, sku: &str) -> bool {
        self.item_sku == sku || self.parent_sku.as_deref() == Some(sku)
    }
}

impl Entity for GeneratedProduct {
    const TABLE: &'static str = "generated_products";
    const TOUCH_ON_UPDATE: bool = true;
    type Draft = GeneratedDraft;

    fn id(&self) -> RecordId {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn from_draft(id: RecordId, draft: GeneratedDraft, now: DateTime<Utc>) -> Self {
        let mut product = GeneratedProduct {
            id,
            product_name: String::new(),
            item_sku: String::new(),
            parent_sku: None,
            parent_product_id: None,
            marketplace_title: None,
            size: Default::default(),
            color: Default::default(),
            original_design_url: None,
            mockup_urls: Default::default(),
            template_mockup_urls: Default::default(),
            is_published: false,
            created_at: now,
            updated_at: now,
            extra: Default::default(),
        };
        product.apply_draft(draft, now);
        product
    }

    fn apply_draft(&mut self, draft: GeneratedDraft, now: DateTime<Utc>) {
        self.product_name = draft.product_name;
        self.item_sku = draft.item_sku;
        self.parent_sku = draft.parent_sku;
        self.parent_product_id = draft.parent_product_id;
        self.marketplace_title = draft.marketplace_title;
        self.size = draft.size;
        self.color = draft.color;
        self.original_design_url = draft.original_design_url;
        self.mockup_urls = draft.mockup_urls;
        self.template_mockup_urls = draft.template_mockup_urls;
        self.is_published = draft.is_published;
        self.updated_at = now;
    }

    fn matches_sku(&self, sku: &str) -> bool {
        self.item_sku == sku || self.parent_sku.as_deref() == Some(sku)
    }
}

#[derive(Clone)]
pub struct CatalogStore {
    pub products: Arc<dyn Collection<CatalogRecord>>,
    pub generated: Arc<dyn Collection<GeneratedProduct>>,
}

impl CatalogStore {
    pub fn memory() -> Self {
        Self {
            products: Arc::new(MemoryCollection::<CatalogRecord>::new()),
            generated: Arc::new(MemoryCollection::<GeneratedProduct>::new()),
        }
    }

    pub fn supabase(client: SupabaseClient) -> Self {
        Self {
            products: Arc::new(RestCollection::<CatalogRecord>::new(client.clone())),
            generated: Arc::new(RestCollection::<GeneratedProduct>::new(client)),
        }
    }

    /// True when a generated product already uses `sku` as its item or parent SKU.
    pub async fn sku_exists(&self, sku: &str) -> Result<bool, StoreError> {
        Ok(!self.generated.find_by_sku(sku).await?.is_empty())
    }

    /// The parent SKU a child of product `id` should carry: the product's own
    /// `item_sku`, falling back to its `parent_sku`.
    pub async fn parent_sku_for(&self, id: RecordId) -> Result<Option<String>, StoreError> {
        let Some(record) = self.products.get(id).await? else {
            return Ok(None);
        };
        let sku = Some(record.item_sku)
            .filter(|sku| !sku.trim().is_empty())
            .or(record.parent_sku.filter(|sku| !sku.trim().is_empty()));
        Ok(sku)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::TimeZone;

    #[test]
    fn list_filter_is_inclusive() {
        let day = |d| Utc.with_ymd_and_hms(2025, 3, d, 0, 0, 0).unwrap();
        let filter = ListFilter {
            created_from: Some(day(2)),
            created_to: Some(day(4)),
        };
        assert!(filter.matches(day(2)));
        assert!(filter.matches(day(4)));
        assert!(!filter.matches(day(1)));
        assert!(!filter.matches(day(5)));
        assert!(ListFilter::default().matches(day(1)));
    }

    #[tokio::test]
    async fn sku_lookups_span_item_and_parent_columns() {
        let store = CatalogStore::memory();
        store
            .generated
            .create(GeneratedDraft {
                product_name: "Tee".into(),
                item_sku: "TEE-1".into(),
                parent_sku: Some("TEE".into()),
                ..GeneratedDraft::default()
            })
            .await
            .unwrap();
        assert!(store.sku_exists("TEE-1").await.unwrap());
        assert!(store.sku_exists("TEE").await.unwrap());
        assert!(!store.sku_exists("HOODIE").await.unwrap());
    }

    #[tokio::test]
    async fn parent_sku_prefers_item_sku() {
        let store = CatalogStore::memory();
        let id = store
            .products
            .create(CatalogDraft {
                product_name: "Tee".into(),
                item_sku: "TEE".into(),
                role: Role::Parent,
                ..CatalogDraft::default()
            })
            .await
            .unwrap();
        assert_eq!(store.parent_sku_for(id).await.unwrap().as_deref(), Some("TEE"));
        assert_eq!(store.parent_sku_for(id + 100).await.unwrap(), None);
    }
}
