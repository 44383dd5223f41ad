use super::{Collection, Entity, ListFilter, StoreError};
use crate::models::RecordId;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process table used by tests and `CATALOG_BACKEND=memory`.
pub struct MemoryCollection<E: Entity> {
    state: Arc<Mutex<MemoryState<E>>>,
}

struct MemoryState<E> {
    rows: Vec<E>,
    next_id: RecordId,
}

impl<E: Entity> MemoryCollection<E> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                rows: Vec::new(),
                next_id: 1,
            })),
        }
    }

    /// Inserts a fully formed row, keeping its id and timestamps.
    pub async fn seed(&self, row: E) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(row.id() + 1);
        state.rows.push(row);
    }
}

impl<E: Entity> Default for MemoryCollection<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> Collection<E> for MemoryCollection<E> {
    async fn create(&self, draft: E::Draft) -> Result<RecordId, StoreError> {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.rows.push(E::from_draft(id, draft, Utc::now()));
        Ok(id)
    }

    async fn get(&self, id: RecordId) -> Result<Option<E>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.rows.iter().find(|row| row.id() == id).cloned())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<E>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<E> = state
            .rows
            .iter()
            .filter(|row| filter.matches(row.created_at()))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(rows)
    }

    async fn update(&self, id: RecordId, draft: E::Draft) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.rows.iter_mut().find(|row| row.id() == id) {
            Some(row) => {
                row.apply_draft(draft, Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.rows.len();
        state.rows.retain(|row| row.id() != id);
        Ok(state.rows.len() != before)
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Vec<E>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .iter()
            .filter(|row| row.matches_sku(sku))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogDraft, CatalogRecord, GeneratedDraft, GeneratedProduct};

    fn draft(name: &str) -> CatalogDraft {
        CatalogDraft {
            product_name: name.into(),
            item_sku: format!("{name}-SKU"),
            ..CatalogDraft::default()
        }
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let products = MemoryCollection::<CatalogRecord>::new();
        let id = products.create(draft("Tee")).await.unwrap();
        let stored = products.get(id).await.unwrap().expect("row");
        assert_eq!(stored.product_name, "Tee");

        assert!(products.update(id, draft("Hoodie")).await.unwrap());
        let updated = products.get(id).await.unwrap().expect("row");
        assert_eq!(updated.product_name, "Hoodie");
        assert_eq!(updated.created_at, stored.created_at);

        assert!(products.delete(id).await.unwrap());
        assert!(!products.delete(id).await.unwrap());
        assert!(products.get(id).await.unwrap().is_none());
        assert!(!products.update(id, draft("Cap")).await.unwrap());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let products = MemoryCollection::<CatalogRecord>::new();
        for name in ["A", "B", "C"] {
            products.create(draft(name)).await.unwrap();
        }
        let names: Vec<String> = products
            .list(&ListFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.product_name)
            .collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn generated_updates_touch_updated_at() {
        let generated = MemoryCollection::<GeneratedProduct>::new();
        let id = generated
            .create(GeneratedDraft {
                product_name: "Tee".into(),
                ..GeneratedDraft::default()
            })
            .await
            .unwrap();
        let before = generated.get(id).await.unwrap().expect("row");
        let mut change = GeneratedDraft::from(&before);
        change.is_published = true;
        generated.update(id, change).await.unwrap();
        let after = generated.get(id).await.unwrap().expect("row");
        assert!(after.is_published);
        assert!(after.updated_at >= before.updated_at);
        assert_eq!(after.created_at, before.created_at);
    }
}
