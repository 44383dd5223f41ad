use crate::{
    mockups::{MockupWorkflow, RenderProgress, RenderSummary, WorkflowView},
    pipeline::{Catalog, PipelineError},
};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_IDLE: Duration = Duration::from_secs(60 * 60);

/// In-memory workflows, discarded on delete, after sitting idle, or on restart.
#[derive(Clone)]
pub struct WorkflowRegistry {
    entries: Arc<Mutex<HashMap<Uuid, WorkflowEntry>>>,
    idle: Duration,
}

#[derive(Clone)]
struct WorkflowEntry {
    workflow: Arc<Mutex<MockupWorkflow>>,
    cancel: Arc<AtomicBool>,
    render: Arc<watch::Sender<RenderJobState>>,
    touched: Instant,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RenderJobState {
    #[default]
    Idle,
    Running {
        progress: Option<RenderProgress>,
    },
    Completed {
        summary: RenderSummary,
        message: String,
    },
    Failed {
        error: String,
        stage: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowInfo {
    pub id: Uuid,
    pub render: RenderJobState,
    /// Absent while a render holds the workflow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowView>,
}

impl WorkflowRegistry {
    pub fn new(idle: Duration) -> Self {
        Self {
            entries: Arc::default(),
            idle,
        }
    }

    pub async fn insert(&self, workflow: MockupWorkflow) -> WorkflowInfo {
        self.prune_idle().await;
        let id = workflow.id;
        let view = workflow.view();
        let entry = WorkflowEntry {
            cancel: workflow.cancel_handle(),
            workflow: Arc::new(Mutex::new(workflow)),
            render: Arc::new(watch::Sender::new(RenderJobState::Idle)),
            touched: Instant::now(),
        };
        self.entries.lock().await.insert(id, entry);
        WorkflowInfo {
            id,
            render: RenderJobState::Idle,
            workflow: Some(view),
        }
    }

    pub async fn get(&self, id: Uuid) -> Option<WorkflowInfo> {
        let entry = self.entry(id).await?;
        Some(info_for(id, &entry))
    }

    /// Signals any running render to stop and forgets the workflow.
    pub async fn remove(&self, id: Uuid) -> bool {
        let Some(entry) = self.entries.lock().await.remove(&id) else {
            return false;
        };
        entry.cancel.store(true, Ordering::SeqCst);
        info!(target = "catalog.api", workflow = %id, "workflow_discarded");
        true
    }

    /// Exclusive access for a short operation; fails while a render runs.
    pub async fn with_workflow<T, F, Fut>(&self, id: Uuid, op: F) -> Result<T, PipelineError>
    where
        F: FnOnce(tokio::sync::OwnedMutexGuard<MockupWorkflow>) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let entry = self.require(id).await?;
        let guard = entry
            .workflow
            .clone()
            .try_lock_owned()
            .map_err(|_| PipelineError::invalid_input("workflow", "workflow is busy rendering"))?;
        op(guard).await
    }

    /// Starts `render_all` in the background. Progress is published to the
    /// entry's render state as each pair finishes.
    pub async fn spawn_render(
        &self,
        catalog: Catalog,
        id: Uuid,
    ) -> Result<(RenderJobState, JoinHandle<()>), PipelineError> {
        let entry = self.require(id).await?;
        let mut guard = entry
            .workflow
            .clone()
            .try_lock_owned()
            .map_err(|_| PipelineError::invalid_input("render_all", "a render is already running"))?;

        let running = RenderJobState::Running { progress: None };
        entry.render.send_replace(running.clone());
        let render = entry.render.clone();
        let handle = tokio::spawn(async move {
            let publisher = render.clone();
            let result = catalog
                .render_all(&mut *guard, move |progress| {
                    publisher.send_replace(RenderJobState::Running {
                        progress: Some(progress),
                    });
                })
                .await;
            let state = match result {
                Ok(summary) => RenderJobState::Completed {
                    message: summary.message(),
                    summary,
                },
                Err(err) => {
                    warn!(target = "catalog.api", workflow = %id, error = %err, "render_job_failed");
                    RenderJobState::Failed {
                        error: err.detail().to_string(),
                        stage: err.stage().to_string(),
                    }
                }
            };
            render.send_replace(state);
        });
        Ok((running, handle))
    }

    /// Drops workflows untouched for longer than the idle window. A workflow
    /// held by a render is kept however old it is.
    pub async fn prune_idle(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|id, entry| {
            let stale = entry.touched.elapsed() > self.idle && entry.workflow.try_lock().is_ok();
            if stale {
                entry.cancel.store(true, Ordering::SeqCst);
                info!(target = "catalog.api", workflow = %id, "workflow_expired");
            }
            !stale
        });
        before - entries.len()
    }

    async fn entry(&self, id: Uuid) -> Option<WorkflowEntry> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&id)?;
        entry.touched = Instant::now();
        Some(entry.clone())
    }

    async fn require(&self, id: Uuid) -> Result<WorkflowEntry, PipelineError> {
        self.entry(id)
            .await
            .ok_or_else(|| PipelineError::not_found("workflow", format!("workflow {id} not found")))
    }
}

fn info_for(id: Uuid, entry: &WorkflowEntry) -> WorkflowInfo {
    let workflow = entry.workflow.try_lock().ok().map(|guard| guard.view());
    WorkflowInfo {
        id,
        render: entry.render.borrow().clone(),
        workflow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mockups::DesignSpec;

    fn workflow() -> MockupWorkflow {
        MockupWorkflow::new(
            DesignSpec {
                product_name: "Tee".into(),
                design_sku: "TEE-1-AAAA".into(),
                marketplace_title: None,
                parent_sku: None,
                parent_product_id: None,
                sizes: Vec::new(),
                colors: vec!["#000000".into()],
            },
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn removal_cancels_the_workflow() {
        let registry = WorkflowRegistry::default();
        let wf = workflow();
        let cancel = wf.cancel_handle();
        let info = registry.insert(wf).await;
        assert!(matches!(info.render, RenderJobState::Idle));
        assert!(registry.get(info.id).await.is_some());

        assert!(registry.remove(info.id).await);
        assert!(cancel.load(Ordering::SeqCst));
        assert!(registry.get(info.id).await.is_none());
        assert!(!registry.remove(info.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_workflows_expire_unless_rendering() {
        let registry = WorkflowRegistry::new(Duration::from_secs(60));
        let stale = workflow();
        let stale_cancel = stale.cancel_handle();
        let stale = registry.insert(stale).await;
        let rendering = registry.insert(workflow()).await;
        let entry = registry.entry(rendering.id).await.unwrap();
        let _held = entry.workflow.lock().await;

        tokio::time::advance(Duration::from_secs(30)).await;
        let fresh = registry.insert(workflow()).await;
        tokio::time::advance(Duration::from_secs(45)).await;

        assert_eq!(registry.prune_idle().await, 1);
        assert!(stale_cancel.load(Ordering::SeqCst));
        assert!(registry.get(stale.id).await.is_none());
        assert!(registry.get(rendering.id).await.is_some());
        assert!(registry.get(fresh.id).await.is_some());
    }

    #[tokio::test]
    async fn busy_workflows_reject_other_operations() {
        let registry = WorkflowRegistry::default();
        let info = registry.insert(workflow()).await;
        let entry = registry.entry(info.id).await.unwrap();
        let _held = entry.workflow.lock().await;

        let err = registry
            .with_workflow(info.id, |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "workflow is busy rendering");
        assert!(registry.get(info.id).await.unwrap().workflow.is_none());
    }
}
