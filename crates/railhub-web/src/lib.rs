//! HTTP surface for Railhub: the cron trigger endpoints, one per pipeline,
//! and the multipart facility import.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use railhub_core::Pipeline;
use railhub_sync::{
    ConfigError, FacilityImporter, ImportSummary, RunError, RunSummary, SyncPipeline,
    DEFAULT_IMPORT_SOURCE,
};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub const CRATE_NAME: &str = "railhub-web";

#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<SyncPipeline>,
    pub importer: FacilityImporter,
    pub cron_secret: Option<String>,
}

impl AppState {
    /// Shares the pipeline's store with the importer and takes the trigger
    /// secret from the pipeline's configuration.
    pub fn new(sync: Arc<SyncPipeline>) -> Self {
        Self {
            importer: FacilityImporter::new(sync.store()),
            cron_secret: sync.config().cron_secret.clone(),
            sync,
        }
    }
}

/// Refusals of a trigger request. Each maps to a non-200 JSON body; partial
/// source failures are not errors and come back as a 200 summary.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("CRON_SECRET not configured")]
    SecretNotConfigured,
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Scrape failed")]
    Failed(anyhow::Error),
}

impl From<RunError> for TriggerError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::Config(err) => TriggerError::Config(err),
            RunError::Unexpected(err) => TriggerError::Failed(err),
        }
    }
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            TriggerError::SecretNotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string() }),
            ),
            TriggerError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, json!({ "error": self.to_string() }))
            }
            TriggerError::Config(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Configuration error", "message": err.to_string() }),
            ),
            TriggerError::Failed(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string(), "message": format!("{err:#}") }),
            ),
        };
        if status.is_server_error() {
            error!(error = %body, "trigger refused");
        }
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No file provided")]
    NoFile,
    #[error("Import failed")]
    Failed(anyhow::Error),
}

impl IntoResponse for ImportError {
    fn into_response(self) -> Response {
        match &self {
            ImportError::NoFile => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            ImportError::Failed(err) => {
                error!(error = %format!("{err:#}"), "import failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": self.to_string(), "details": format!("{err:#}") })),
                )
                    .into_response()
            }
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/cron/scrape-jobs", get(scrape_jobs_handler))
        .route("/api/cron/scrape-industry", get(scrape_industry_handler))
        .route("/api/cron/scrape-regulatory", get(scrape_regulatory_handler))
        .route("/api/import", post(import_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn scrape_jobs_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RunSummary>, TriggerError> {
    trigger(&state, &headers, Pipeline::Jobs).await
}

async fn scrape_industry_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RunSummary>, TriggerError> {
    trigger(&state, &headers, Pipeline::Industry).await
}

async fn scrape_regulatory_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RunSummary>, TriggerError> {
    trigger(&state, &headers, Pipeline::Regulatory).await
}

async fn trigger(
    state: &AppState,
    headers: &HeaderMap,
    pipeline: Pipeline,
) -> Result<Json<RunSummary>, TriggerError> {
    authorize(state.cron_secret.as_deref(), headers)?;
    info!(pipeline = pipeline.as_str(), "trigger accepted");
    let summary = state.sync.run_once(pipeline).await?;
    Ok(Json(summary))
}

/// Checked before any run work; a refusal writes no ledger entries.
fn authorize(secret: Option<&str>, headers: &HeaderMap) -> Result<(), TriggerError> {
    let secret = secret.ok_or(TriggerError::SecretNotConfigured)?;
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if presented != Some(format!("Bearer {secret}").as_str()) {
        warn!("rejected trigger with bad or missing bearer token");
        return Err(TriggerError::Unauthorized);
    }
    Ok(())
}

async fn import_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ImportSummary>, ImportError> {
    let mut file = None;
    let mut source = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ImportError::Failed(e.into()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ImportError::Failed(e.into()))?;
                file = Some(bytes);
            }
            Some("source") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ImportError::Failed(e.into()))?;
                let text = text.trim();
                if !text.is_empty() {
                    source = Some(text.to_string());
                }
            }
            _ => {}
        }
    }

    let file = file.ok_or(ImportError::NoFile)?;
    let source = source.unwrap_or_else(|| DEFAULT_IMPORT_SOURCE.to_string());
    let summary = state
        .importer
        .import(&file, &source)
        .await
        .map_err(ImportError::Failed)?;
    info!(
        %source,
        imported = summary.imported,
        updated = summary.updated,
        failed = summary.failed,
        "import finished"
    );
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use railhub_core::{RunStatus, SourceId};
    use railhub_storage::MemoryStore;
    use railhub_sync::config::SourceConfig;
    use railhub_sync::{PipelineConfig, SourceRegistry};
    use tower::ServiceExt;

    const BOUNDARY: &str = "railhub-test-boundary";

    fn state(secret: Option<&str>, registry: SourceRegistry) -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = PipelineConfig {
            cron_secret: secret.map(str::to_owned),
            ..PipelineConfig::default()
        };
        let sync = SyncPipeline::new(config, registry, store.clone()).unwrap();
        (AppState::new(Arc::new(sync)), store)
    }

    fn empty_registry() -> SourceRegistry {
        SourceRegistry { sources: vec![] }
    }

    fn trigger_request(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn multipart_request(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, filename, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Request::builder()
            .method("POST")
            .uri("/api/import")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn trigger_without_configured_secret_is_a_server_error() {
        let (state, store) = state(None, empty_registry());
        let resp = app(state)
            .oneshot(trigger_request("/api/cron/scrape-jobs", Some("Bearer anything")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["error"], "CRON_SECRET not configured");
        assert!(store.ledger().await.is_empty());
    }

    #[tokio::test]
    async fn trigger_with_bad_or_missing_token_is_unauthorized() {
        let (state, store) = state(Some("s3cret"), SourceRegistry::builtin());
        let app = app(state);
        for auth in [None, Some("Bearer wrong"), Some("s3cret")] {
            let resp = app
                .clone()
                .oneshot(trigger_request("/api/cron/scrape-industry", auth))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{auth:?}");
            assert_eq!(json_body(resp).await["error"], "Unauthorized");
        }
        assert!(store.ledger().await.is_empty());
        assert!(store.sources().await.is_empty());
    }

    #[tokio::test]
    async fn authorized_trigger_returns_the_run_summary() {
        let (state, _store) = state(Some("s3cret"), empty_registry());
        let resp = app(state)
            .oneshot(trigger_request("/api/cron/scrape-regulatory", Some("Bearer s3cret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["totalExpired"], 0);
        assert!(json["perSourceCounts"].as_object().unwrap().is_empty());
        assert!(json["duration"].as_str().unwrap().ends_with('s'));
    }

    #[tokio::test]
    async fn missing_source_credential_is_reported_as_configuration_error() {
        let registry = SourceRegistry {
            sources: vec![SourceConfig {
                source_id: SourceId::Jsearch,
                enabled: true,
                notes: None,
            }],
        };
        let (state, store) = state(Some("s3cret"), registry);
        let resp = app(state)
            .oneshot(trigger_request("/api/cron/scrape-jobs", Some("Bearer s3cret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(resp).await;
        assert_eq!(json["error"], "Configuration error");
        assert!(json["message"].as_str().unwrap().contains("JSEARCH_API_KEY"));
        assert!(store.ledger().await.is_empty());
    }

    #[tokio::test]
    async fn import_creates_facilities_under_the_named_source() {
        let (state, store) = state(None, empty_registry());
        let csv = "id,name,city,state,railroads\nF-1,Gulf Transload,Houston,TX,\"UP - Union Pacific, BNSF\"\n,Nameless Yard,Dallas,TX,\n";
        let resp = app(state)
            .oneshot(multipart_request(&[
                ("source", None, "terminal-survey"),
                ("file", Some("facilities.csv"), csv),
            ]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["imported"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["total"], 2);
        assert!(json["errors"][0].as_str().unwrap().starts_with("Row 2:"));

        let facilities = store.facilities().await;
        assert_eq!(facilities.len(), 1);
        assert_eq!(facilities[0].railroads, vec!["UP".to_string(), "BNSF".to_string()]);
        let sources = store.sources().await;
        assert_eq!(sources[0].name, "terminal-survey");
        assert_eq!(store.ledger().await[0].status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn import_defaults_the_source_name() {
        let (state, store) = state(None, empty_registry());
        let resp = app(state)
            .oneshot(multipart_request(&[(
                "file",
                Some("facilities.csv"),
                "external_id,name\nF-9,Pier 9\n",
            )]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(store.sources().await[0].name, DEFAULT_IMPORT_SOURCE);
    }

    #[tokio::test]
    async fn import_without_a_file_part_is_a_bad_request() {
        let (state, store) = state(None, empty_registry());
        let resp = app(state)
            .oneshot(multipart_request(&[("source", None, "terminal-survey")]))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "No file provided");
        assert!(store.ledger().await.is_empty());
    }
}
