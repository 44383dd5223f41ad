use super::{Collection, Entity, ListFilter, StoreError};
use crate::models::RecordId;
use crate::supabase::{SupabaseClient, status_error};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::RequestBuilder;
use serde_json::Value;
use std::marker::PhantomData;
use tracing::{debug, warn};

/// A PostgREST table behind Supabase.
pub struct RestCollection<E> {
    client: SupabaseClient,
    _rows: PhantomData<fn() -> E>,
}

type Query = Vec<(&'static str, String)>;

impl<E: Entity> RestCollection<E> {
    pub fn new(client: SupabaseClient) -> Self {
        Self {
            client,
            _rows: PhantomData,
        }
    }

    fn operation(verb: &str) -> String {
        format!("{verb} {}", E::TABLE)
    }

    async fn fetch_rows<F>(&self, verb: &str, build: F) -> Result<Vec<E>, StoreError>
    where
        F: Fn() -> RequestBuilder,
    {
        let operation = Self::operation(verb);
        let response = self
            .client
            .send_with_retry(build)
            .await
            .map_err(|err| StoreError::request(&operation, err))?;
        if !response.status().is_success() {
            return Err(StoreError::request(&operation, status_error(response).await));
        }
        let raw: Vec<Value> = response
            .json()
            .await
            .map_err(|err| StoreError::decode(&operation, err))?;
        let rows: Vec<E> = raw
            .into_iter()
            .filter_map(|row| {
                let id = row.get("id").cloned().unwrap_or(Value::Null);
                serde_json::from_value(row)
                    .map_err(|err| {
                        warn!(
                            target = "catalog.store",
                            operation = %operation,
                            id = %id,
                            error = %err,
                            "store_row_skipped"
                        );
                    })
                    .ok()
            })
            .collect();
        debug!(target = "catalog.store", operation = %operation, rows = rows.len(), "store_rows");
        Ok(rows)
    }

    fn draft_body(draft: &E::Draft, touch: bool) -> Result<Value, StoreError> {
        let mut body = serde_json::to_value(draft)
            .map_err(|err| StoreError::request(Self::operation("encode"), err))?;
        if let (true, Value::Object(fields)) = (touch, &mut body) {
            fields.insert(
                "updated_at".into(),
                Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        Ok(body)
    }

    fn by_id(id: RecordId) -> Query {
        vec![("id", format!("eq.{id}"))]
    }
}

#[async_trait]
impl<E: Entity> Collection<E> for RestCollection<E> {
    async fn create(&self, draft: E::Draft) -> Result<RecordId, StoreError> {
        let url = self.client.rest_url(E::TABLE);
        let body = Self::draft_body(&draft, false)?;
        let rows = self
            .fetch_rows("create", || {
                self.client
                    .http()
                    .post(&url)
                    .header("Prefer", "return=representation")
                    .json(&body)
            })
            .await?;
        rows.first()
            .map(|row| row.id())
            .ok_or_else(|| StoreError::decode(Self::operation("create"), "no row returned"))
    }

    async fn get(&self, id: RecordId) -> Result<Option<E>, StoreError> {
        let url = self.client.rest_url(E::TABLE);
        let mut query = Self::by_id(id);
        query.push(("select", "*".into()));
        query.push(("limit", "1".into()));
        let mut rows = self
            .fetch_rows("get", || self.client.http().get(&url).query(&query))
            .await?;
        Ok(rows.pop())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<E>, StoreError> {
        let url = self.client.rest_url(E::TABLE);
        let mut query: Query = vec![
            ("select", "*".into()),
            ("order", "created_at.desc,id.desc".into()),
        ];
        if let Some(from) = filter.created_from {
            query.push((
                "created_at",
                format!("gte.{}", from.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ));
        }
        if let Some(to) = filter.created_to {
            query.push((
                "created_at",
                format!("lte.{}", to.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ));
        }
        self.fetch_rows("list", || self.client.http().get(&url).query(&query))
            .await
    }

    async fn update(&self, id: RecordId, draft: E::Draft) -> Result<bool, StoreError> {
        let url = self.client.rest_url(E::TABLE);
        let body = Self::draft_body(&draft, E::TOUCH_ON_UPDATE)?;
        let query = Self::by_id(id);
        let rows = self
            .fetch_rows("update", || {
                self.client
                    .http()
                    .patch(&url)
                    .query(&query)
                    .header("Prefer", "return=representation")
                    .json(&body)
            })
            .await?;
        Ok(!rows.is_empty())
    }

    async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        let url = self.client.rest_url(E::TABLE);
        let query = Self::by_id(id);
        let rows = self
            .fetch_rows("delete", || {
                self.client
                    .http()
                    .delete(&url)
                    .query(&query)
                    .header("Prefer", "return=representation")
            })
            .await?;
        Ok(!rows.is_empty())
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Vec<E>, StoreError> {
        let url = self.client.rest_url(E::TABLE);
        let quoted = sku.replace('"', "\\\"");
        let query: Query = vec![
            ("select", "*".into()),
            (
                "or",
                format!("(item_sku.eq.\"{quoted}\",parent_sku.eq.\"{quoted}\")"),
            ),
        ];
        self.fetch_rows("find_by_sku", || self.client.http().get(&url).query(&query))
            .await
    }
}
