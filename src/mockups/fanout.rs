//! Mockup generation for one design: upload, render every template × colour
//! pair, re-render single colours on demand, then persist the results as a
//! generated product.

use crate::catalog::color::{hex_to_name, resolve_color_input};
use crate::catalog::fields::{MockupUrls, SizeEntry, VariantField};
use crate::catalog::UnknownColorError;
use crate::config::RenderSettings;
use crate::metrics;
use crate::mockups::cache::RenderCache;
use crate::mockups::client::{RenderError, RenderRequest, RenderService};
use crate::mockups::templates::MockupTemplate;
use crate::models::{GeneratedDraft, RecordId, StageReport, TemplateMockupUrls};
use crate::storage::{ObjectStore, ObjectStoreError, mockup_key, original_key};
use crate::store::{CatalogStore, StoreError};
use futures::{StreamExt, future, stream};
use serde::Serialize;
use std::collections::BTreeMap;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FanOutError {
    #[error(transparent)]
    Upload(#[from] ObjectStoreError),
    #[error("design has not been uploaded")]
    NotUploaded,
    #[error(transparent)]
    UnknownColor(#[from] UnknownColorError),
    #[error("display slot {slot} does not exist ({slots} slots)")]
    InvalidSlot { slot: usize, slots: usize },
    #[error("template `{0}` is not part of this workflow")]
    UnknownTemplate(String),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    #[error("{0}")]
    Persist(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the workflow will become once persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DesignSpec {
    pub product_name: String,
    pub design_sku: String,
    pub marketplace_title: Option<String>,
    pub parent_sku: Option<String>,
    pub parent_product_id: Option<RecordId>,
    pub sizes: Vec<SizeEntry>,
    /// Selected colours as `#RRGGBB`, in display order.
    pub colors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Created,
    Uploaded,
    Rendered,
    Persisted,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderFailure {
    pub mockup_uuid: String,
    pub smart_object_uuid: String,
    pub color: String,
    pub message: String,
}

#[derive(Debug)]
pub struct MockupWorkflow {
    pub id: Uuid,
    pub design: DesignSpec,
    pub templates: Vec<MockupTemplate>,
    stage: WorkflowStage,
    source_url: Option<String>,
    cache: RenderCache,
    /// Colour currently shown in each display slot.
    slots: Vec<String>,
    failures: Vec<RenderFailure>,
    stages: Vec<StageReport>,
    generated_id: Option<RecordId>,
    cancel: Arc<AtomicBool>,
}

impl MockupWorkflow {
    pub fn new(design: DesignSpec, templates: Vec<MockupTemplate>) -> Self {
        let slots = design.colors.clone();
        Self {
            id: Uuid::new_v4(),
            design,
            templates,
            stage: WorkflowStage::Created,
            source_url: None,
            cache: RenderCache::default(),
            slots,
            failures: Vec::new(),
            stages: Vec::new(),
            generated_id: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn failures(&self) -> &[RenderFailure] {
        &self.failures
    }

    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    pub fn generated_id(&self) -> Option<RecordId> {
        self.generated_id
    }

    pub fn stages_mut(&mut self) -> &mut Vec<StageReport> {
        &mut self.stages
    }

    /// Shared flag; once set, `render_all` stops starting new renders.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn view(&self) -> WorkflowView {
        WorkflowView {
            id: self.id,
            stage: self.stage,
            design: self.design.clone(),
            source_url: self.source_url.clone(),
            templates: self
                .templates
                .iter()
                .map(|template| TemplateRenders {
                    template: template.clone(),
                    renders: self.cache.for_template(template),
                })
                .collect(),
            slots: self.slots.clone(),
            failures: self.failures.clone(),
            stages: self.stages.clone(),
            generated_id: self.generated_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateRenders {
    #[serde(flatten)]
    pub template: MockupTemplate,
    pub renders: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowView {
    pub id: Uuid,
    pub stage: WorkflowStage,
    pub design: DesignSpec,
    pub source_url: Option<String>,
    pub templates: Vec<TemplateRenders>,
    pub slots: Vec<String>,
    pub failures: Vec<RenderFailure>,
    pub stages: Vec<StageReport>,
    pub generated_id: Option<RecordId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderProgress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
    pub last: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderSummary {
    pub total: usize,
    pub rendered: usize,
    pub cached: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl RenderSummary {
    pub fn available(&self) -> usize {
        self.rendered + self.cached
    }

    pub fn message(&self) -> String {
        format!("generated {} of {} mockups", self.available(), self.total)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OnDemandRender {
    pub color: String,
    pub color_name: String,
    pub url: String,
    pub cached: bool,
    pub evicted: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct FanOutSettings {
    pub concurrency: usize,
    pub delay: Duration,
    pub width: u32,
}

impl From<&RenderSettings> for FanOutSettings {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            concurrency: settings.concurrency,
            delay: settings.delay,
            width: settings.width,
        }
    }
}

impl Default for FanOutSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            delay: Duration::ZERO,
            width: 1500,
        }
    }
}

#[derive(Clone)]
pub struct MockupFanOut {
    objects: Arc<dyn ObjectStore>,
    renderer: Arc<dyn RenderService>,
    catalog: CatalogStore,
    settings: FanOutSettings,
}

impl MockupFanOut {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        renderer: Arc<dyn RenderService>,
        catalog: CatalogStore,
        settings: FanOutSettings,
    ) -> Self {
        Self {
            objects,
            renderer,
            catalog,
            settings,
        }
    }

    /// Stores the design under `original/…`. Nothing renders until this succeeds.
    pub async fn upload_design(
        &self,
        workflow: &mut MockupWorkflow,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, FanOutError> {
        let key = original_key(content_type);
        let size = bytes.len();
        let url = self.objects.put_object(bytes, &key, content_type).await?;
        if !self.objects.probe(&url).await {
            warn!(target = "catalog.mockups", workflow = %workflow.id, url = %url, "design_not_yet_reachable");
        }
        info!(target = "catalog.mockups", workflow = %workflow.id, key = %key, size, "design_uploaded");
        workflow.source_url = Some(url.clone());
        workflow.stage = WorkflowStage::Uploaded;
        Ok(url)
    }

    pub async fn render_one(
        &self,
        source_url: &str,
        hex: &str,
        template: &MockupTemplate,
    ) -> Result<String, RenderError> {
        let request = RenderRequest {
            mockup_uuid: template.mockup_uuid.clone(),
            smart_object_uuid: template.smart_object_uuid.clone(),
            color: hex.to_string(),
            design_url: source_url.to_string(),
            width: self.settings.width,
        };
        let outcome = self.renderer.render(&request).await;
        metrics::render_outcome(&template.mockup_uuid, outcome.is_ok());
        outcome
    }

    /// Renders every uncached template × colour pair. Individual failures are
    /// recorded on the workflow and never abort the batch.
    pub async fn render_all<P>(
        &self,
        workflow: &mut MockupWorkflow,
        mut progress: P,
    ) -> Result<RenderSummary, FanOutError>
    where
        P: FnMut(RenderProgress) + Send,
    {
        let source = workflow
            .source_url
            .clone()
            .ok_or(FanOutError::NotUploaded)?;

        let mut pending = Vec::new();
        let mut summary = RenderSummary::default();
        for template in &workflow.templates {
            for hex in &workflow.design.colors {
                summary.total += 1;
                if workflow.cache.contains(template, hex) {
                    summary.cached += 1;
                } else {
                    pending.push((template.clone(), hex.clone()));
                }
            }
        }
        workflow.failures.clear();

        let fanout = self.clone();
        let source: Arc<str> = Arc::from(source);
        let cancel = workflow.cancel_handle();
        let delay = self.settings.delay;
        let calls = stream::iter(pending)
            .take_while(move |_| future::ready(!cancel.load(Ordering::SeqCst)))
            .map(move |(template, hex)| {
                let fanout = fanout.clone();
                let source = source.clone();
                async move {
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                    let outcome = fanout.render_one(&source, &hex, &template).await;
                    (template, hex, outcome)
                }
            })
            .buffer_unordered(self.settings.concurrency.max(1));
        let mut calls = pin!(calls);

        let mut completed = summary.cached;
        while let Some((template, hex, outcome)) = calls.next().await {
            completed += 1;
            match outcome {
                Ok(url) => {
                    debug!(target = "catalog.mockups", template = %template.mockup_uuid, color = %hex, "mockup_rendered");
                    workflow.cache.insert(&template, &hex, url);
                    summary.rendered += 1;
                }
                Err(err) => {
                    warn!(target = "catalog.mockups", template = %template.mockup_uuid, color = %hex, error = %err, "mockup_render_failed");
                    workflow.failures.push(RenderFailure {
                        mockup_uuid: template.mockup_uuid.clone(),
                        smart_object_uuid: template.smart_object_uuid.clone(),
                        color: hex.clone(),
                        message: err.to_string(),
                    });
                    summary.failed += 1;
                }
            }
            progress(RenderProgress {
                completed,
                total: summary.total,
                percent: percent(completed, summary.total),
                last: hex,
            });
        }

        summary.cancelled = completed < summary.total;
        if workflow.stage == WorkflowStage::Uploaded {
            workflow.stage = WorkflowStage::Rendered;
        }
        info!(
            target = "catalog.mockups",
            workflow = %workflow.id,
            total = summary.total,
            rendered = summary.rendered,
            cached = summary.cached,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "{}",
            summary.message()
        );
        Ok(summary)
    }

    /// Renders one colour now, serving it from the cache when possible. With
    /// `slot`, the colour previously shown there is replaced, and its cached
    /// render dropped, only once the new render exists.
    pub async fn render_on_demand(
        &self,
        workflow: &mut MockupWorkflow,
        color: &str,
        template: Option<&str>,
        slot: Option<usize>,
    ) -> Result<OnDemandRender, FanOutError> {
        let hex = resolve_color_input(color)?;
        let template = match template {
            Some(id) => workflow
                .templates
                .iter()
                .find(|t| t.mockup_uuid == id || t.smart_object_uuid == id)
                .cloned()
                .ok_or_else(|| FanOutError::UnknownTemplate(id.to_string()))?,
            None => workflow
                .templates
                .first()
                .cloned()
                .ok_or_else(|| FanOutError::UnknownTemplate(String::new()))?,
        };
        if let Some(slot) = slot
            && slot > workflow.slots.len()
        {
            return Err(FanOutError::InvalidSlot {
                slot,
                slots: workflow.slots.len(),
            });
        }

        let (url, cached) = match workflow.cache.get(&template, &hex) {
            Some(url) => (url.to_string(), true),
            None => {
                let source = workflow
                    .source_url
                    .clone()
                    .ok_or(FanOutError::NotUploaded)?;
                let url = self.render_one(&source, &hex, &template).await?;
                workflow.cache.insert(&template, &hex, url.clone());
                (url, false)
            }
        };

        let evicted = match slot {
            Some(slot) => replace_slot(workflow, &template, slot, &hex),
            None => {
                if !workflow.design.colors.contains(&hex) {
                    workflow.design.colors.push(hex.clone());
                }
                None
            }
        };

        Ok(OnDemandRender {
            color_name: hex_to_name(&hex),
            color: hex,
            url,
            cached,
            evicted,
        })
    }

    /// Copies every cached render of the selected colours to durable storage
    /// and records the result as a generated product.
    pub async fn persist(&self, workflow: &mut MockupWorkflow) -> Result<RecordId, FanOutError> {
        let design = &workflow.design;
        let multi_template = workflow.templates.len() > 1;
        let mut mockup_urls = MockupUrls::new();
        let mut template_mockup_urls = TemplateMockupUrls::new();
        let mut stored = 0usize;

        for hex in &design.colors {
            let color_name = hex_to_name(hex);
            for (index, template) in workflow.templates.iter().enumerate() {
                let Some(rendered) = workflow.cache.get(template, hex) else {
                    continue;
                };
                let key = mockup_key(
                    &design.design_sku,
                    &color_name,
                    multi_template.then_some(index),
                );
                let durable = match self.copy_render(rendered, &key).await {
                    Ok(url) => url,
                    Err(err) => {
                        warn!(target = "catalog.mockups", key = %key, error = %err, "mockup_persist_skipped");
                        continue;
                    }
                };
                stored += 1;
                if mockup_urls.get(hex).is_none() {
                    mockup_urls.insert(hex, &durable);
                }
                template_mockup_urls
                    .entry(template.mockup_uuid.clone())
                    .or_default()
                    .insert(hex.clone(), durable);
            }
        }

        if stored == 0 {
            return Err(FanOutError::Persist(
                "no mockups could be saved; nothing was recorded".into(),
            ));
        }

        let parent_sku = match (&design.parent_sku, design.parent_product_id) {
            (Some(sku), _) if !sku.trim().is_empty() => Some(sku.clone()),
            (_, Some(id)) => self.catalog.parent_sku_for(id).await?,
            _ => None,
        };
        if self.catalog.sku_exists(&design.design_sku).await? {
            warn!(target = "catalog.mockups", sku = %design.design_sku, "duplicate_design_sku");
        }

        let draft = GeneratedDraft {
            product_name: design.product_name.clone(),
            item_sku: design.design_sku.clone(),
            parent_sku,
            parent_product_id: design.parent_product_id,
            marketplace_title: design.marketplace_title.clone(),
            size: VariantField::from_sizes(&design.sizes),
            color: VariantField::from_colors(&design.colors),
            original_design_url: workflow.source_url.clone(),
            mockup_urls,
            template_mockup_urls,
            is_published: false,
        };
        let id = self.catalog.generated.create(draft).await?;
        info!(target = "catalog.mockups", workflow = %workflow.id, id, stored, "generated_product_saved");
        workflow.generated_id = Some(id);
        workflow.stage = WorkflowStage::Persisted;
        Ok(id)
    }

    async fn copy_render(&self, rendered: &str, key: &str) -> Result<String, ObjectStoreError> {
        let bytes = self.objects.get_object(rendered).await?;
        self.objects.put_object(bytes, key, "image/png").await
    }
}

fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed.min(total) * 100) / total) as u8
}

/// Points `slot` at `hex`, swapping it into the colour selection. Returns the
/// colour whose render was evicted, if any.
fn replace_slot(
    workflow: &mut MockupWorkflow,
    template: &MockupTemplate,
    slot: usize,
    hex: &str,
) -> Option<String> {
    if slot == workflow.slots.len() {
        workflow.slots.push(hex.to_string());
        if !workflow.design.colors.iter().any(|c| c == hex) {
            workflow.design.colors.push(hex.to_string());
        }
        return None;
    }

    let previous = std::mem::replace(&mut workflow.slots[slot], hex.to_string());
    if previous == hex {
        return None;
    }

    let still_shown = workflow.slots.iter().any(|shown| *shown == previous);
    let colors = &mut workflow.design.colors;
    let has_new = colors.iter().any(|c| c == hex);
    match colors.iter().position(|c| *c == previous) {
        Some(position) if !still_shown && !has_new => colors[position] = hex.to_string(),
        Some(position) if !still_shown => {
            colors.remove(position);
        }
        _ if !has_new => colors.push(hex.to_string()),
        _ => {}
    }

    if still_shown {
        return None;
    }
    workflow
        .cache
        .evict(template, &previous)
        .map(|_| previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    /// Renders into the shared memory store so persist can download the result.
    struct FakeRenderer {
        objects: MemoryObjectStore,
        failing: HashSet<String>,
        calls: AtomicUsize,
    }

    impl FakeRenderer {
        fn new(objects: MemoryObjectStore, failing: &[&str]) -> Self {
            Self {
                objects,
                failing: failing.iter().map(|c| c.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RenderService for FakeRenderer {
        async fn render(&self, request: &RenderRequest) -> Result<String, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&request.color) {
                return Err(RenderError::Http("HTTP 500 Internal Server Error".into()));
            }
            let url = format!(
                "https://renders.test/{}/{}.png",
                request.smart_object_uuid,
                request.color.trim_start_matches('#')
            );
            self.objects.seed(&url, vec![1, 2, 3]).await;
            Ok(url)
        }
    }

    fn design(colors: &[&str]) -> DesignSpec {
        DesignSpec {
            product_name: "Tee".into(),
            design_sku: "TEE-BW-2-AB12".into(),
            marketplace_title: None,
            parent_sku: Some("TEE".into()),
            parent_product_id: None,
            sizes: vec![SizeEntry {
                name: "S".into(),
                sku: "s-000001".into(),
            }],
            colors: colors.iter().map(|c| c.to_string()).collect(),
        }
    }

    struct Harness {
        fanout: MockupFanOut,
        renderer: Arc<FakeRenderer>,
        objects: MemoryObjectStore,
        catalog: CatalogStore,
    }

    fn harness(failing: &[&str]) -> Harness {
        let objects = MemoryObjectStore::new();
        let renderer = Arc::new(FakeRenderer::new(objects.clone(), failing));
        let catalog = CatalogStore::memory();
        let fanout = MockupFanOut::new(
            Arc::new(objects.clone()),
            renderer.clone(),
            catalog.clone(),
            FanOutSettings::default(),
        );
        Harness {
            fanout,
            renderer,
            objects,
            catalog,
        }
    }

    async fn uploaded(h: &Harness, colors: &[&str], templates: usize) -> MockupWorkflow {
        let templates = (0..templates)
            .map(|i| MockupTemplate::new(format!("m-{i}"), format!("so-{i}")))
            .collect();
        let mut workflow = MockupWorkflow::new(design(colors), templates);
        h.fanout
            .upload_design(&mut workflow, vec![0u8; 8], "image/png")
            .await
            .expect("upload");
        workflow
    }

    #[tokio::test]
    async fn render_all_fills_cache_for_every_colour() {
        let h = harness(&[]);
        let mut workflow = uploaded(&h, &["#000000", "#FFFFFF"], 1).await;
        let mut seen = Vec::new();
        let summary = h
            .fanout
            .render_all(&mut workflow, |p| seen.push(p.percent))
            .await
            .expect("render");
        assert_eq!(summary.rendered, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(workflow.cache().len(), 2);
        assert_eq!(seen.last(), Some(&100));
        assert_eq!(workflow.stage(), WorkflowStage::Rendered);
        assert_eq!(summary.message(), "generated 2 of 2 mockups");
    }

    #[tokio::test]
    async fn one_failed_render_is_counted_not_raised() {
        let h = harness(&["#FFFFFF"]);
        let mut workflow = uploaded(&h, &["#000000", "#FFFFFF"], 1).await;
        let summary = h.fanout.render_all(&mut workflow, |_| {}).await.expect("render");
        assert_eq!(summary.rendered, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(workflow.cache().len(), 1);
        assert_eq!(workflow.failures()[0].color, "#FFFFFF");
        assert_eq!(summary.message(), "generated 1 of 2 mockups");
    }

    #[tokio::test]
    async fn cached_pairs_are_not_rendered_again() {
        let h = harness(&[]);
        let mut workflow = uploaded(&h, &["#000000", "#FFFFFF"], 2).await;
        h.fanout.render_all(&mut workflow, |_| {}).await.unwrap();
        assert_eq!(h.renderer.calls(), 4);
        let summary = h.fanout.render_all(&mut workflow, |_| {}).await.unwrap();
        assert_eq!(h.renderer.calls(), 4);
        assert_eq!(summary.cached, 4);
        assert_eq!(summary.rendered, 0);
    }

    #[tokio::test]
    async fn rendering_requires_an_upload() {
        let h = harness(&[]);
        let mut workflow = MockupWorkflow::new(
            design(&["#000000"]),
            vec![MockupTemplate::new("m-0", "so-0")],
        );
        let err = h.fanout.render_all(&mut workflow, |_| {}).await.unwrap_err();
        assert!(matches!(err, FanOutError::NotUploaded));
        assert_eq!(h.renderer.calls(), 0);
    }

    #[tokio::test]
    async fn cancelled_workflow_starts_no_renders() {
        let h = harness(&[]);
        let mut workflow = uploaded(&h, &["#000000", "#FFFFFF"], 1).await;
        workflow.cancel_handle().store(true, Ordering::SeqCst);
        let summary = h.fanout.render_all(&mut workflow, |_| {}).await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(h.renderer.calls(), 0);
    }

    #[tokio::test]
    async fn on_demand_second_call_hits_cache() {
        let h = harness(&[]);
        let mut workflow = uploaded(&h, &["#FFFFFF"], 1).await;
        let first = h
            .fanout
            .render_on_demand(&mut workflow, "Black", None, None)
            .await
            .expect("first");
        let second = h
            .fanout
            .render_on_demand(&mut workflow, "Black", None, None)
            .await
            .expect("second");
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.url, second.url);
        assert_eq!(first.color, "#000000");
        assert_eq!(h.renderer.calls(), 1);
    }

    #[tokio::test]
    async fn slot_replacement_evicts_only_after_success() {
        let h = harness(&["#FF0000"]);
        let mut workflow = uploaded(&h, &["#000000", "#FFFFFF"], 1).await;
        h.fanout.render_all(&mut workflow, |_| {}).await.unwrap();
        let template = workflow.templates[0].clone();

        let err = h
            .fanout
            .render_on_demand(&mut workflow, "Red", None, Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, FanOutError::Render(_)));
        assert!(workflow.cache().contains(&template, "#000000"));
        assert_eq!(workflow.slots()[0], "#000000");

        let swapped = h
            .fanout
            .render_on_demand(&mut workflow, "#0000FF", None, Some(0))
            .await
            .expect("swap");
        assert_eq!(swapped.evicted.as_deref(), Some("#000000"));
        assert!(!workflow.cache().contains(&template, "#000000"));
        assert!(workflow.cache().contains(&template, "#0000FF"));
        assert_eq!(workflow.design.colors, vec!["#0000FF", "#FFFFFF"]);
    }

    #[tokio::test]
    async fn colour_shown_in_another_slot_stays_persistable() {
        let h = harness(&[]);
        let mut workflow = uploaded(&h, &["#000000", "#FFFFFF"], 1).await;
        h.fanout.render_all(&mut workflow, |_| {}).await.unwrap();
        let template = workflow.templates[0].clone();

        h.fanout
            .render_on_demand(&mut workflow, "Black", None, Some(1))
            .await
            .expect("duplicate black");
        assert_eq!(workflow.slots(), ["#000000", "#000000"]);
        assert_eq!(workflow.design.colors, vec!["#000000"]);

        let swapped = h
            .fanout
            .render_on_demand(&mut workflow, "Red", None, Some(0))
            .await
            .expect("swap");
        assert_eq!(swapped.evicted, None);
        assert_eq!(workflow.slots(), ["#FF0000", "#000000"]);
        assert_eq!(workflow.design.colors, vec!["#000000", "#FF0000"]);
        assert!(workflow.cache().contains(&template, "#000000"));

        h.fanout.persist(&mut workflow).await.expect("persist");
        let keys = h.objects.keys().await;
        assert!(keys.iter().any(|key| key.starts_with("mockups/") && key.contains("_Black")), "{keys:?}");
        assert!(keys.iter().any(|key| key.starts_with("mockups/") && key.contains("_Red")), "{keys:?}");
    }

    #[tokio::test]
    async fn unknown_colour_names_are_rejected() {
        let h = harness(&[]);
        let mut workflow = uploaded(&h, &["#000000"], 1).await;
        let err = h
            .fanout
            .render_on_demand(&mut workflow, "Chartreuse-ish", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FanOutError::UnknownColor(_)));
        assert_eq!(h.renderer.calls(), 0);
    }

    #[tokio::test]
    async fn persist_without_renders_is_a_hard_failure() {
        let h = harness(&["#000000"]);
        let mut workflow = uploaded(&h, &["#000000"], 1).await;
        h.fanout.render_all(&mut workflow, |_| {}).await.unwrap();
        let err = h.fanout.persist(&mut workflow).await.unwrap_err();
        assert!(matches!(err, FanOutError::Persist(_)));
        let rows = h
            .catalog
            .generated
            .list(&Default::default())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn persist_copies_renders_and_records_product() {
        let h = harness(&[]);
        let mut workflow = uploaded(&h, &["#000000", "#FFFFFF"], 2).await;
        h.fanout.render_all(&mut workflow, |_| {}).await.unwrap();
        let id = h.fanout.persist(&mut workflow).await.expect("persist");

        let keys = h.objects.keys().await;
        assert!(keys.contains(&"mockups/TEE-BW-2-AB12_Black_1.png".to_string()));
        assert!(keys.contains(&"mockups/TEE-BW-2-AB12_White_2.png".to_string()));

        let product = h.catalog.generated.get(id).await.unwrap().expect("row");
        assert_eq!(product.item_sku, "TEE-BW-2-AB12");
        assert_eq!(product.parent_sku.as_deref(), Some("TEE"));
        assert_eq!(product.mockup_urls.len(), 2);
        assert_eq!(
            product.mockup_urls.get("#000000"),
            Some("memory://objects/mockups/TEE-BW-2-AB12_Black_1.png")
        );
        assert_eq!(product.template_mockup_urls.len(), 2);
        assert_eq!(workflow.stage(), WorkflowStage::Persisted);
        assert_eq!(workflow.generated_id(), Some(id));
    }

    #[tokio::test]
    async fn single_template_keys_have_no_suffix() {
        let h = harness(&[]);
        let mut workflow = uploaded(&h, &["#ADD8E6"], 1).await;
        h.fanout.render_all(&mut workflow, |_| {}).await.unwrap();
        h.fanout.persist(&mut workflow).await.expect("persist");
        let keys = h.objects.keys().await;
        assert!(keys.iter().any(|key| key == "mockups/TEE-BW-2-AB12_Light-Blue.png"), "{keys:?}");
    }
}
