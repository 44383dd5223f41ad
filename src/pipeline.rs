use crate::catalog::color::resolve_color_input;
use crate::catalog::fields::{SizeEntry, VariantEntry, VariantField};
use crate::catalog::sku::{generate_design_sku, generate_product_sku, generate_size_sku};
use crate::config::{AppConfig, Backend};
use crate::export::{self, ExportFilter, export_filename, write_csv};
use crate::mockups::{
    DesignSpec, DynamicMockupsClient, FanOutError, FanOutSettings, MockupFanOut, MockupTemplate,
    MockupWorkflow, OnDemandRender, RenderProgress, RenderService, RenderSummary,
    TemplateRegistry,
};
use crate::models::{
    CatalogDraft, CatalogRecord, GeneratedDraft, GeneratedProduct, RecordId, StageReport,
};
use crate::storage::{MemoryObjectStore, ObjectStore, SupabaseObjectStore};
use crate::store::{CatalogStore, ListFilter, StoreError};
use crate::supabase::SupabaseClient;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{info, warn};

const DESIGN_SKU_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct Catalog {
    store: CatalogStore,
    fanout: MockupFanOut,
    templates: Arc<TemplateRegistry>,
    template_source: Option<Arc<DynamicMockupsClient>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRequest {
    pub product_name: String,
    /// Design image, plain base64 or a `data:` URL.
    pub design_base64: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Colour names or hex strings.
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub parent_product_id: Option<RecordId>,
    #[serde(default)]
    pub parent_sku: Option<String>,
    #[serde(default)]
    pub marketplace_title: Option<String>,
    #[serde(default)]
    pub design_sku: Option<String>,
    /// Template ids from the registry; empty means "use the product's own".
    #[serde(default)]
    pub templates: Vec<String>,
}

fn default_content_type() -> String {
    "image/png".into()
}

#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateListing {
    pub configured: Vec<MockupTemplate>,
    pub default: Option<MockupTemplate>,
    pub live: Vec<MockupTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_error: Option<String>,
}

impl Catalog {
    pub fn new(
        store: CatalogStore,
        objects: Arc<dyn ObjectStore>,
        renderer: Arc<dyn RenderService>,
        templates: TemplateRegistry,
        settings: FanOutSettings,
    ) -> Self {
        let fanout = MockupFanOut::new(objects, renderer, store.clone(), settings);
        Self {
            store,
            fanout,
            templates: Arc::new(templates),
            template_source: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let templates = TemplateRegistry::from_settings(&config.render)
            .map_err(|err| PipelineError::configuration("templates", err.to_string()))?;
        let renderer = Arc::new(DynamicMockupsClient::new(&config.render));
        let settings = FanOutSettings::from(&config.render);

        let (store, objects): (CatalogStore, Arc<dyn ObjectStore>) = match config.backend {
            Backend::Memory => {
                let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
                (CatalogStore::memory(), objects)
            }
            Backend::Supabase => {
                let supabase = config.supabase.as_ref().ok_or_else(|| {
                    PipelineError::configuration("config", "supabase settings are missing")
                })?;
                let client = SupabaseClient::new(
                    supabase,
                    config.store_max_retries,
                    config.store_backoff,
                );
                let objects: Arc<dyn ObjectStore> = Arc::new(SupabaseObjectStore::new(
                    client.clone(),
                    supabase.bucket.clone(),
                    config.probe_timeout,
                ));
                (CatalogStore::supabase(client), objects)
            }
        };

        info!(
            target = "catalog.api",
            backend = ?config.backend,
            templates = templates.templates().len(),
            concurrency = settings.concurrency,
            "catalog_configured"
        );
        let mut catalog = Self::new(store, objects, renderer.clone(), templates, settings);
        catalog.template_source = Some(renderer);
        Ok(catalog)
    }

    pub async fn create_product(&self, draft: CatalogDraft) -> Result<CatalogRecord, PipelineError> {
        let draft = prepare_product(draft)?;
        let id = self
            .store
            .products
            .create(draft)
            .await
            .map_err(|err| PipelineError::store("create_product", err))?;
        self.get_product(id).await
    }

    pub async fn get_product(&self, id: RecordId) -> Result<CatalogRecord, PipelineError> {
        self.store
            .products
            .get(id)
            .await
            .map_err(|err| PipelineError::store("get_product", err))?
            .ok_or_else(|| PipelineError::not_found("get_product", format!("product {id} not found")))
    }

    pub async fn list_products(&self, filter: &ListFilter) -> Result<Vec<CatalogRecord>, PipelineError> {
        self.store
            .products
            .list(filter)
            .await
            .map_err(|err| PipelineError::store("list_products", err))
    }

    pub async fn update_product(
        &self,
        id: RecordId,
        draft: CatalogDraft,
    ) -> Result<CatalogRecord, PipelineError> {
        let draft = prepare_product(draft)?;
        let updated = self
            .store
            .products
            .update(id, draft)
            .await
            .map_err(|err| PipelineError::store("update_product", err))?;
        if !updated {
            return Err(PipelineError::not_found(
                "update_product",
                format!("product {id} not found"),
            ));
        }
        self.get_product(id).await
    }

    /// Generated products made from this one are left in place.
    pub async fn delete_product(&self, id: RecordId) -> Result<(), PipelineError> {
        let deleted = self
            .store
            .products
            .delete(id)
            .await
            .map_err(|err| PipelineError::store("delete_product", err))?;
        if deleted {
            Ok(())
        } else {
            Err(PipelineError::not_found(
                "delete_product",
                format!("product {id} not found"),
            ))
        }
    }

    pub async fn get_generated(&self, id: RecordId) -> Result<GeneratedProduct, PipelineError> {
        self.store
            .generated
            .get(id)
            .await
            .map_err(|err| PipelineError::store("get_generated", err))?
            .ok_or_else(|| {
                PipelineError::not_found("get_generated", format!("generated product {id} not found"))
            })
    }

    pub async fn list_generated(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<GeneratedProduct>, PipelineError> {
        self.store
            .generated
            .list(filter)
            .await
            .map_err(|err| PipelineError::store("list_generated", err))
    }

    pub async fn update_generated(
        &self,
        id: RecordId,
        draft: GeneratedDraft,
    ) -> Result<GeneratedProduct, PipelineError> {
        if draft.product_name.trim().is_empty() {
            return Err(PipelineError::invalid_input(
                "update_generated",
                "product_name is required",
            ));
        }
        let updated = self
            .store
            .generated
            .update(id, draft)
            .await
            .map_err(|err| PipelineError::store("update_generated", err))?;
        if !updated {
            return Err(PipelineError::not_found(
                "update_generated",
                format!("generated product {id} not found"),
            ));
        }
        self.get_generated(id).await
    }

    pub async fn delete_generated(&self, id: RecordId) -> Result<(), PipelineError> {
        let deleted = self
            .store
            .generated
            .delete(id)
            .await
            .map_err(|err| PipelineError::store("delete_generated", err))?;
        if deleted {
            Ok(())
        } else {
            Err(PipelineError::not_found(
                "delete_generated",
                format!("generated product {id} not found"),
            ))
        }
    }

    /// Builds the marketplace CSV. The full product table is always loaded so
    /// parent SKUs resolve even when the filter excludes the parents.
    pub async fn export(&self, filter: &ExportFilter) -> Result<ExportFile, PipelineError> {
        let started = Instant::now();
        let catalog = self.list_products(&ListFilter::default()).await?;
        let generated = self.list_generated(&filter.window()).await?;
        let rows = export::collect_rows(&catalog, &generated, filter);
        let bytes = write_csv(&rows).map_err(|err| PipelineError::internal("export", err.to_string()))?;
        crate::metrics::export_rows(rows.len());
        crate::metrics::stage_elapsed("export", started.elapsed().as_millis());
        info!(target = "catalog.export", rows = rows.len(), bytes = bytes.len(), "export_built");
        Ok(ExportFile {
            filename: export_filename(Utc::now()),
            bytes,
            row_count: rows.len(),
        })
    }

    /// Registry templates plus whatever the rendering service reports live.
    pub async fn templates(&self) -> TemplateListing {
        let (live, live_error) = match &self.template_source {
            Some(client) => match client.list_templates().await {
                Ok(live) => (live, None),
                Err(err) => {
                    warn!(target = "catalog.mockups", error = %err, "template_listing_failed");
                    (Vec::new(), Some(err.to_string()))
                }
            },
            None => (Vec::new(), None),
        };
        TemplateListing {
            configured: self.templates.templates().to_vec(),
            default: self.templates.default_template().cloned(),
            live,
            live_error,
        }
    }

    /// Validates the request, resolves templates and SKUs, then uploads the
    /// design. An upload failure leaves no workflow behind.
    pub async fn start_workflow(
        &self,
        request: WorkflowRequest,
    ) -> Result<MockupWorkflow, PipelineError> {
        let product_name = request.product_name.trim().to_string();
        if product_name.is_empty() {
            return Err(PipelineError::invalid_input(
                "start_workflow",
                "product_name is required",
            ));
        }
        let colors = resolve_colors(&request.colors)?;
        let design = decode_design(&request.design_base64)?;

        let parent = match request.parent_product_id {
            Some(id) => Some(self.get_product(id).await?),
            None => None,
        };
        let templates = self
            .templates
            .resolve(&request.templates, parent.as_ref())
            .map_err(|err| PipelineError::invalid_input("resolve_templates", err.to_string()))?;

        let parent_sku = request
            .parent_sku
            .clone()
            .filter(|sku| !sku.trim().is_empty())
            .or_else(|| {
                parent
                    .as_ref()
                    .map(|record| record.item_sku.clone())
                    .filter(|sku| !sku.trim().is_empty())
            });

        let (sizes, base_sku) = {
            let mut rng = SmallRng::from_rng(&mut rand::rng());
            let sizes: Vec<SizeEntry> = request
                .sizes
                .iter()
                .map(|size| size.trim())
                .filter(|size| !size.is_empty())
                .map(|size| SizeEntry {
                    name: size.to_string(),
                    sku: generate_size_sku(size, &mut rng),
                })
                .collect();
            let base = parent_sku
                .clone()
                .unwrap_or_else(|| generate_product_sku(&product_name, &colors, sizes.len(), &mut rng));
            (sizes, base)
        };

        let design_sku = match request.design_sku.as_deref().map(str::trim) {
            Some(sku) if !sku.is_empty() => sku.to_string(),
            _ => self.unique_design_sku(&base_sku).await?,
        };

        let mut workflow = MockupWorkflow::new(
            DesignSpec {
                product_name,
                design_sku,
                marketplace_title: request.marketplace_title.clone(),
                parent_sku,
                parent_product_id: request.parent_product_id,
                sizes,
                colors,
            },
            templates,
        );

        let mut stages = Vec::new();
        let fanout = &self.fanout;
        let content_type = request.content_type.clone();
        let source_url = self
            .capture_stage("upload_design", &mut stages, async {
                let url = fanout
                    .upload_design(&mut workflow, design, &content_type)
                    .await
                    .map_err(|err| fanout_error("upload_design", err))?;
                Ok(StageOutcome::new(url.clone(), json!({ "source_url": url })))
            })
            .await?;
        workflow.stages_mut().extend(stages);
        info!(
            target = "catalog.mockups",
            workflow = %workflow.id,
            sku = %workflow.design.design_sku,
            templates = workflow.templates.len(),
            colors = workflow.design.colors.len(),
            source_url = %source_url,
            "workflow_started"
        );
        Ok(workflow)
    }

    pub async fn render_all<P>(
        &self,
        workflow: &mut MockupWorkflow,
        progress: P,
    ) -> Result<RenderSummary, PipelineError>
    where
        P: FnMut(RenderProgress) + Send,
    {
        let mut stages = Vec::new();
        let fanout = &self.fanout;
        let summary = self
            .capture_stage("render_all", &mut stages, async {
                let summary = fanout
                    .render_all(workflow, progress)
                    .await
                    .map_err(|err| fanout_error("render_all", err))?;
                let output = json!({
                    "total": summary.total,
                    "rendered": summary.rendered,
                    "cached": summary.cached,
                    "failed": summary.failed,
                    "cancelled": summary.cancelled,
                    "message": summary.message(),
                });
                Ok(StageOutcome::new(summary, output))
            })
            .await?;
        workflow.stages_mut().extend(stages);
        Ok(summary)
    }

    pub async fn render_on_demand(
        &self,
        workflow: &mut MockupWorkflow,
        color: &str,
        template: Option<&str>,
        slot: Option<usize>,
    ) -> Result<OnDemandRender, PipelineError> {
        let mut stages = Vec::new();
        let fanout = &self.fanout;
        let rendered = self
            .capture_stage("render_one", &mut stages, async {
                let rendered = fanout
                    .render_on_demand(workflow, color, template, slot)
                    .await
                    .map_err(|err| fanout_error("render_one", err))?;
                let output = json!({
                    "color": rendered.color,
                    "cached": rendered.cached,
                    "evicted": rendered.evicted,
                });
                Ok(StageOutcome::new(rendered, output))
            })
            .await?;
        workflow.stages_mut().extend(stages);
        Ok(rendered)
    }

    pub async fn persist(
        &self,
        workflow: &mut MockupWorkflow,
    ) -> Result<GeneratedProduct, PipelineError> {
        let mut stages = Vec::new();
        let fanout = &self.fanout;
        let id = self
            .capture_stage("persist", &mut stages, async {
                let id = fanout
                    .persist(workflow)
                    .await
                    .map_err(|err| fanout_error("persist", err))?;
                Ok(StageOutcome::new(id, json!({ "generated_id": id })))
            })
            .await?;
        workflow.stages_mut().extend(stages);
        self.get_generated(id).await
    }

    /// `base-XXXX` not yet used by any generated product. After a handful of
    /// collisions the last candidate is used anyway.
    async fn unique_design_sku(&self, base: &str) -> Result<String, PipelineError> {
        let mut rng = SmallRng::from_rng(&mut rand::rng());
        let mut candidate = generate_design_sku(base, &mut rng);
        for _ in 1..DESIGN_SKU_ATTEMPTS {
            let taken = self
                .store
                .sku_exists(&candidate)
                .await
                .map_err(|err| PipelineError::store("design_sku", err))?;
            if !taken {
                return Ok(candidate);
            }
            candidate = generate_design_sku(base, &mut rng);
        }
        warn!(target = "catalog.api", sku = %candidate, "design_sku_may_collide");
        Ok(candidate)
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

/// Validates a product draft and fills in SKUs the operator left blank.
fn prepare_product(mut draft: CatalogDraft) -> Result<CatalogDraft, PipelineError> {
    draft
        .validate()
        .map_err(|err| PipelineError::invalid_input("validate_product", err.to_string()))?;
    let mut rng = SmallRng::from_rng(&mut rand::rng());
    draft.size = assign_size_skus(std::mem::take(&mut draft.size), &mut rng);
    if draft.item_sku.trim().is_empty() {
        let colors: Vec<String> = draft
            .color
            .raw_values()
            .iter()
            .filter_map(|value| resolve_color_input(value).ok())
            .collect();
        let size_count = draft.size.entries().len();
        draft.item_sku = generate_product_sku(&draft.product_name, &colors, size_count, &mut rng);
    }
    Ok(draft)
}

fn assign_size_skus<R: Rng + ?Sized>(field: VariantField, rng: &mut R) -> VariantField {
    match field {
        VariantField::Entries(entries) => VariantField::Entries(
            entries
                .into_iter()
                .map(|entry| match entry {
                    VariantEntry::Named { name, sku } if sku.as_deref().is_some_and(|s| !s.is_empty()) => {
                        VariantEntry::Named { name, sku }
                    }
                    VariantEntry::Named { name, .. } | VariantEntry::Text(name) => {
                        let sku = generate_size_sku(&name, rng);
                        VariantEntry::Named {
                            name,
                            sku: Some(sku),
                        }
                    }
                })
                .collect(),
        ),
        other => other,
    }
}

fn resolve_colors(inputs: &[String]) -> Result<Vec<String>, PipelineError> {
    let mut colors: Vec<String> = Vec::with_capacity(inputs.len());
    for input in inputs.iter().filter(|value| !value.trim().is_empty()) {
        let hex = resolve_color_input(input)
            .map_err(|err| PipelineError::invalid_input("resolve_colors", err.to_string()))?;
        if !colors.contains(&hex) {
            colors.push(hex);
        }
    }
    if colors.is_empty() {
        return Err(PipelineError::invalid_input(
            "resolve_colors",
            "select at least one colour",
        ));
    }
    Ok(colors)
}

fn decode_design(raw: &str) -> Result<Vec<u8>, PipelineError> {
    let payload = match raw.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => raw,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|err| PipelineError::invalid_input("decode_design", err.to_string()))?;
    if bytes.is_empty() {
        return Err(PipelineError::invalid_input(
            "decode_design",
            "design image is empty",
        ));
    }
    Ok(bytes)
}

fn fanout_error(stage: &'static str, err: FanOutError) -> PipelineError {
    let message = err.to_string();
    match err {
        FanOutError::Upload(_) => PipelineError::upload(stage, message),
        FanOutError::Render(_) => PipelineError::render(stage, message),
        FanOutError::Persist(_) => PipelineError::persist(stage, message),
        FanOutError::Store(_) => PipelineError::new(stage, message, PipelineErrorKind::Store),
        FanOutError::NotUploaded
        | FanOutError::UnknownColor(_)
        | FanOutError::InvalidSlot { .. }
        | FanOutError::UnknownTemplate(_) => PipelineError::invalid_input(stage, message),
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    NotFound,
    Configuration,
    Upload,
    Render,
    Persist,
    Store,
    Internal,
}

impl PipelineError {
    fn new(stage: &'static str, message: impl Into<String>, kind: PipelineErrorKind) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::InvalidInput)
    }

    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::NotFound)
    }

    pub fn configuration(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Configuration)
    }

    pub fn upload(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Upload)
    }

    pub fn render(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Render)
    }

    pub fn persist(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Persist)
    }

    pub fn store(stage: &'static str, err: StoreError) -> Self {
        Self::new(stage, err.to_string(), PipelineErrorKind::Store)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::new(stage, message, PipelineErrorKind::Internal)
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mockups::{RenderError, RenderRequest, WorkflowStage};
    use crate::models::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubRenderer {
        objects: MemoryObjectStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RenderService for StubRenderer {
        async fn render(&self, request: &RenderRequest) -> Result<String, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let url = format!("https://renders.test/{}.png", request.color.trim_start_matches('#'));
            self.objects.seed(&url, vec![7, 7, 7]).await;
            Ok(url)
        }
    }

    fn catalog() -> (Catalog, Arc<StubRenderer>) {
        let objects = MemoryObjectStore::new();
        let renderer = Arc::new(StubRenderer {
            objects: objects.clone(),
            calls: AtomicUsize::new(0),
        });
        let templates = TemplateRegistry::new(
            Vec::new(),
            Some(MockupTemplate::new("m-default", "so-default")),
        );
        let catalog = Catalog::new(
            CatalogStore::memory(),
            Arc::new(objects),
            renderer.clone(),
            templates,
            FanOutSettings::default(),
        );
        (catalog, renderer)
    }

    fn request(colors: &[&str]) -> WorkflowRequest {
        WorkflowRequest {
            product_name: "Classic Tee".into(),
            design_base64: STANDARD.encode([137u8, 80, 78, 71]),
            content_type: "image/png".into(),
            colors: colors.iter().map(|c| c.to_string()).collect(),
            sizes: vec!["S".into(), "M".into()],
            parent_product_id: None,
            parent_sku: None,
            marketplace_title: None,
            design_sku: None,
            templates: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_product_fills_skus() {
        let (catalog, _) = catalog();
        let record = catalog
            .create_product(CatalogDraft {
                product_name: "Classic Tee".into(),
                size: VariantField::decode("[\"S\",\"M\"]"),
                color: VariantField::decode("[\"#000000\"]"),
                ..CatalogDraft::default()
            })
            .await
            .expect("create");
        assert!(record.item_sku.starts_with("CLA-B-2-"), "{}", record.item_sku);
        let skus: Vec<Option<String>> = record
            .size
            .entries()
            .iter()
            .map(|entry| entry.sku().map(str::to_string))
            .collect();
        assert!(skus.iter().all(Option::is_some));
        assert!(skus[0].as_deref().is_some_and(|sku| sku.starts_with("s-")));
    }

    #[tokio::test]
    async fn invalid_products_are_rejected() {
        let (catalog, _) = catalog();
        let err = catalog
            .create_product(CatalogDraft {
                product_name: "Tee".into(),
                role: Role::Child,
                ..CatalogDraft::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
        assert_eq!(err.stage(), "validate_product");
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let (catalog, _) = catalog();
        assert_eq!(
            catalog.get_product(42).await.unwrap_err().kind(),
            PipelineErrorKind::NotFound
        );
        assert_eq!(
            catalog.delete_generated(42).await.unwrap_err().kind(),
            PipelineErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn empty_export_is_header_only() {
        let (catalog, _) = catalog();
        let file = catalog.export(&ExportFilter::default()).await.expect("export");
        assert_eq!(file.row_count, 0);
        assert!(file.filename.starts_with("product_export_"));
        assert!(file.filename.ends_with(".csv"));
        assert_eq!(String::from_utf8(file.bytes).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn workflow_rejects_unknown_colours_and_bad_images() {
        let (catalog, _) = catalog();
        let err = catalog.start_workflow(request(&["Mauve-ish"])).await.unwrap_err();
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);

        let mut bad = request(&["Black"]);
        bad.design_base64 = "not base64!".into();
        let err = catalog.start_workflow(bad).await.unwrap_err();
        assert_eq!(err.stage(), "decode_design");

        let err = catalog.start_workflow(request(&[])).await.unwrap_err();
        assert_eq!(err.stage(), "resolve_colors");
    }

    #[tokio::test]
    async fn workflow_without_templates_is_rejected() {
        let objects = MemoryObjectStore::new();
        let renderer = Arc::new(StubRenderer {
            objects: objects.clone(),
            calls: AtomicUsize::new(0),
        });
        let catalog = Catalog::new(
            CatalogStore::memory(),
            Arc::new(objects),
            renderer,
            TemplateRegistry::default(),
            FanOutSettings::default(),
        );
        let err = catalog.start_workflow(request(&["Black"])).await.unwrap_err();
        assert_eq!(err.stage(), "resolve_templates");
    }

    #[tokio::test]
    async fn design_to_export_round_trip() {
        let (catalog, renderer) = catalog();
        let parent = catalog
            .create_product(CatalogDraft {
                product_name: "Classic Tee".into(),
                item_sku: "TEE-1".into(),
                ..CatalogDraft::default()
            })
            .await
            .unwrap();

        let mut req = request(&["Black", "#ffffff"]);
        req.parent_product_id = Some(parent.id);
        let mut workflow = catalog.start_workflow(req).await.expect("start");
        assert_eq!(workflow.stage(), WorkflowStage::Uploaded);
        assert!(workflow.design.design_sku.starts_with("TEE-1-"));
        assert_eq!(workflow.design.parent_sku.as_deref(), Some("TEE-1"));

        let summary = catalog.render_all(&mut workflow, |_| {}).await.expect("render");
        assert_eq!(summary.message(), "generated 2 of 2 mockups");
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);

        let again = catalog
            .render_on_demand(&mut workflow, "Black", None, None)
            .await
            .expect("on demand");
        assert!(again.cached);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);

        let product = catalog.persist(&mut workflow).await.expect("persist");
        assert_eq!(product.parent_sku.as_deref(), Some("TEE-1"));
        assert_eq!(product.mockup_urls.len(), 2);
        let names: Vec<String> = workflow.view().stages.into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["upload_design", "render_all", "render_one", "persist"]);

        let file = catalog.export(&ExportFilter::default()).await.expect("export");
        // one parent row plus two sizes × two colours
        assert_eq!(file.row_count, 5);
        let csv = String::from_utf8(file.bytes).unwrap();
        let black_small = csv
            .lines()
            .find(|line| line.contains(",Child,TEE-1,S,Black,"))
            .expect("black S row");
        assert!(black_small.starts_with("Classic Tee,s-"), "{black_small}");
        assert!(black_small.contains(",memory://objects/mockups/"));
    }
}
