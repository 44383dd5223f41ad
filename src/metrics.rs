use tracing::trace;

// Trace-based counters; the Prometheus recorder only backs `/metrics`.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "catalog.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "catalog.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn render_outcome(template: &str, succeeded: bool) {
    trace!(
        target = "catalog.metrics",
        template = template,
        succeeded = succeeded,
        "render_outcome"
    );
}

pub fn export_rows(rows: usize) {
    trace!(target = "catalog.metrics", rows = rows as u64, "export_rows");
}
