use crate::infra::{load_snapshot, AppState};
use axum::extract::Query;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tax_revenue::error::AppError;
use tax_revenue::etl::domain::{CompositionRow, TaxToGdpRow};
use tax_revenue::etl::gold::{GoldManifest, RunStats};
use tax_revenue::etl::query::MetricFilter;

/// Public description of the published Gold generation.
#[derive(Debug, Serialize)]
pub(crate) struct DatasetResponse {
    pub(crate) generation: u64,
    pub(crate) built_at: DateTime<Utc>,
    pub(crate) snapshot_timestamp: Option<DateTime<Utc>>,
    pub(crate) query_description: Option<String>,
    pub(crate) share_precision: u32,
    pub(crate) stats: RunStats,
}

impl From<GoldManifest> for DatasetResponse {
    fn from(manifest: GoldManifest) -> Self {
        Self {
            generation: manifest.generation,
            built_at: manifest.built_at,
            snapshot_timestamp: manifest.snapshot_timestamp,
            query_description: manifest.query_description,
            share_precision: manifest.share_precision,
            stats: manifest.stats,
        }
    }
}

pub(crate) fn metric_routes() -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/metrics/tax_to_gdp", get(tax_to_gdp_endpoint))
        .route("/api/v1/metrics/composition", get(composition_endpoint))
        .route("/api/v1/dataset", get(dataset_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn tax_to_gdp_endpoint(
    Extension(state): Extension<AppState>,
    Query(filter): Query<MetricFilter>,
) -> Result<Json<Vec<TaxToGdpRow>>, AppError> {
    let snapshot = load_snapshot(state.gold).await?;
    Ok(Json(filter.tax_to_gdp(&snapshot.tax_to_gdp)))
}

pub(crate) async fn composition_endpoint(
    Extension(state): Extension<AppState>,
    Query(filter): Query<MetricFilter>,
) -> Result<Json<Vec<CompositionRow>>, AppError> {
    let snapshot = load_snapshot(state.gold).await?;
    Ok(Json(filter.composition(&snapshot.composition)))
}

pub(crate) async fn dataset_endpoint(
    Extension(state): Extension<AppState>,
) -> Result<Json<DatasetResponse>, AppError> {
    let snapshot = load_snapshot(state.gold).await?;
    Ok(Json(snapshot.manifest.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tax_revenue::etl::domain::{FactRow, TaxCode};
    use tax_revenue::etl::gold::{self, BuildInfo, GoldStore};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn fact(country: &str, iso3: &str, year: i32, tax_code: TaxCode, value: f64) -> FactRow {
        FactRow {
            country: country.to_string(),
            iso3: iso3.to_string(),
            year,
            tax_code,
            value_pct_gdp: value,
        }
    }

    fn published_store() -> (TempDir, GoldStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldStore::new(dir.path(), 3);
        let tables = gold::build(
            &[
                fact("Germany", "DEU", 2021, TaxCode::Pit, 9.8),
                fact("Germany", "DEU", 2021, TaxCode::Vat, 7.0),
                fact("France", "FRA", 2020, TaxCode::Pit, 10.0),
                fact("France", "FRA", 2020, TaxCode::Vat, 5.0),
                fact("France", "FRA", 2021, TaxCode::Pit, 9.2),
            ],
            1,
        )
        .expect("builds");
        store
            .publish(
                &tables,
                BuildInfo {
                    built_at: Utc::now(),
                    bronze: None,
                    stats: RunStats::default(),
                },
            )
            .expect("publish");
        (dir, store)
    }

    fn app(store: GoldStore, ready: bool) -> Router {
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            gold: Arc::new(store),
        };
        metric_routes().layer(Extension(state))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("build request"),
            )
            .await
            .expect("route responds");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("read body");
        let value = serde_json::from_slice(&bytes).expect("json body");
        (status, value)
    }

    #[tokio::test]
    async fn tax_to_gdp_filters_case_insensitively() {
        let (_dir, store) = published_store();

        let (status, body) = get_json(
            app(store, true),
            "/api/v1/metrics/tax_to_gdp?country=FRANCE&year=2020",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{ "country": "France", "iso3": "FRA", "year": 2020, "tax_to_gdp": 15.0 }])
        );
    }

    #[tokio::test]
    async fn tax_to_gdp_without_filters_returns_all_rows() {
        let (_dir, store) = published_store();
        let (status, body) = get_json(app(store, true), "/api/v1/metrics/tax_to_gdp").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn composition_returns_reconciled_shares() {
        let (_dir, store) = published_store();
        let (status, body) = get_json(
            app(store, true),
            "/api/v1/metrics/composition?iso3=fra&year=2020",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["tax_code"], "PIT");
        assert_eq!(body[0]["share_pct"], 66.7);
        assert_eq!(body[1]["tax_code"], "VAT");
        assert_eq!(body[1]["share_pct"], 33.3);
    }

    #[tokio::test]
    async fn missing_gold_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GoldStore::new(dir.path().join("gold"), 3);

        let (status, body) = get_json(app(store, true), "/api/v1/metrics/tax_to_gdp").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "dataset_not_built");
    }

    #[tokio::test]
    async fn dataset_reports_published_generation() {
        let (_dir, store) = published_store();
        let (status, body) = get_json(app(store, true), "/api/v1/dataset").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["generation"], 1);
        assert_eq!(body["share_precision"], 1);
        assert!(body["snapshot_timestamp"].is_null());
    }

    #[tokio::test]
    async fn readiness_reflects_flag() {
        let (_dir, store) = published_store();
        let (status, body) = get_json(app(store, false), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "initializing");
    }
}
