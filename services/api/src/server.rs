use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::metric_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tax_revenue::config::AppConfig;
use tax_revenue::error::AppError;
use tax_revenue::etl::gold::GoldStore;
use tax_revenue::telemetry;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let gold = Arc::new(GoldStore::new(
        &config.pipeline.gold_dir,
        config.pipeline.gold_retain,
    ));
    match gold.manifest() {
        Ok(Some(manifest)) => info!(
            generation = manifest.generation,
            built_at = %manifest.built_at,
            "serving gold generation"
        ),
        Ok(None) => warn!(
            gold_dir = %config.pipeline.gold_dir.display(),
            "gold dataset not built yet; metric endpoints will return 404"
        ),
        Err(err) => warn!("gold manifest unreadable: {err}"),
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        gold,
    };

    let app = metric_routes()
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "tax revenue metrics api ready");

    axum::serve(listener, app).await?;
    Ok(())
}
