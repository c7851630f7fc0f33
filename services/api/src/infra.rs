use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tax_revenue::error::AppError;
use tax_revenue::etl::gold::{GoldSnapshot, GoldStore};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) gold: Arc<GoldStore>,
}

/// Reads the published generation off the async runtime. A missing manifest is
/// `DatasetNotBuilt`.
pub(crate) async fn load_snapshot(store: Arc<GoldStore>) -> Result<GoldSnapshot, AppError> {
    let loaded = tokio::task::spawn_blocking(move || store.load())
        .await
        .map_err(|err| AppError::Io(std::io::Error::other(err)))??;
    loaded.ok_or(AppError::DatasetNotBuilt)
}
