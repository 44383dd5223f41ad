pub mod cache;
pub mod client;
pub mod fanout;
pub mod templates;

pub use cache::RenderCache;
pub use client::{DynamicMockupsClient, RenderError, RenderRequest, RenderService};
pub use fanout::{
    DesignSpec, FanOutError, FanOutSettings, MockupFanOut, MockupWorkflow, OnDemandRender,
    RenderProgress, RenderSummary, WorkflowStage, WorkflowView,
};
pub use templates::{MockupTemplate, TemplateError, TemplateRegistry};
