use crate::capture::{CaptureFile, CapturePipeline, MAX_PDF_PAGES};
use crate::config::Config;
use crate::engine::RecognitionOptions;
use crate::engines::{compiled_engines, EngineInfo, EngineRegistry};
use crate::error::LedgerError;
use crate::lookup::REGISTRY_URL;
use crate::pdf::LopdfRasterizer;
use crate::plate::normalize_plate;
use crate::preprocess::Preset;
use crate::record::Features;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use url::Url;

/// Registry pages are fetched with a browser-like agent.
const UPSTREAM_USER_AGENT: &str = "Mozilla/5.0";
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    client: reqwest::Client,
    registry_url: Arc<str>,
    engines: Arc<OnceCell<Arc<EngineRegistry>>>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .user_agent(UPSTREAM_USER_AGENT)
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(|e| LedgerError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config: Arc::new(config),
            client,
            registry_url: Arc::from(REGISTRY_URL),
            engines: Arc::new(OnceCell::new()),
        })
    }

    /// Point the proxy at another registry page.
    pub fn with_registry_url(mut self, url: &str) -> Self {
        self.registry_url = Arc::from(url);
        self
    }

    /// Engines are initialized on the first capture so the proxy endpoint
    /// never waits on model downloads.
    async fn engines(&self) -> Result<Arc<EngineRegistry>, LedgerError> {
        let config = self.config.clone();
        self.engines
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || EngineRegistry::new(&config))
                    .await
                    .map_err(|e| LedgerError::Internal(format!("Engine init panicked: {}", e)))?
                    .map(Arc::new)
            })
            .await
            .cloned()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub plate: Option<String>,
}

/// Raw registry page
#[derive(Serialize)]
pub struct ProxyResponse {
    pub html: String,
}

/// Capture response
#[derive(Serialize)]
pub struct CaptureResponse {
    pub plate: String,
    pub features: Features,
    pub summary: String,
    pub text: String,
    pub pages: usize,
    pub confidence: f32,
    pub engine: String,
    pub processing_time_ms: u64,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub engines: Vec<&'static str>,
    pub engines_ready: bool,
    /// Filled in once the engines have been loaded by a capture
    pub engine_details: Vec<EngineInfo>,
    pub ocr_language: String,
    pub max_pdf_pages: usize,
    pub max_file_size_bytes: usize,
}

pub fn router(state: AppState) -> Router {
    let max_file_size = state.config.max_file_size;

    Router::new()
        .route("/api/proxy", get(handle_proxy))
        .route("/api/capture", post(handle_capture))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = router(AppState::new(config)?);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Fetch the registry page for a plate on behalf of a browser
async fn handle_proxy(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> Result<Json<ProxyResponse>, LedgerError> {
    let plate = query.plate.as_deref().map(normalize_plate).unwrap_or_default();
    if plate.is_empty() {
        return Err(LedgerError::Validation("Missing plate".to_string()));
    }

    let url = Url::parse_with_params(&state.registry_url, &[("patente", plate.as_str())])
        .map_err(|e| LedgerError::Internal(format!("Invalid registry URL: {}", e)))?;

    tracing::debug!("Proxying registry request for {}", plate);
    let response = state.client.get(url).send().await.map_err(|e| {
        tracing::warn!("Registry unreachable: {}", e);
        LedgerError::Transport(format!("Registry unreachable: {}", e))
    })?;

    let status = response.status();
    if !status.is_success() {
        tracing::warn!("Registry answered {} for {}", status, plate);
        return Err(LedgerError::Upstream(status.as_u16()));
    }

    let html = response
        .text()
        .await
        .map_err(|e| LedgerError::Transport(format!("Failed to read registry page: {}", e)))?;

    Ok(Json(ProxyResponse { html }))
}

/// Run the capture pipeline on an uploaded document or photo
async fn handle_capture(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CaptureResponse>, LedgerError> {
    let start = Instant::now();

    let mut file: Option<(String, Option<String>, Bytes)> = None;
    let mut engine_name: Option<String> = None;
    let mut preset = Preset::Default;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| LedgerError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field.bytes().await.map_err(|e| {
                    LedgerError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?;
                file = Some((file_name, content_type, data));
            }
            "engine" => {
                engine_name = Some(field.text().await.map_err(|e| {
                    LedgerError::InvalidRequest(format!("Invalid engine: {}", e))
                })?);
            }
            "preset" => {
                let value = field.text().await.map_err(|e| {
                    LedgerError::InvalidRequest(format!("Invalid preset: {}", e))
                })?;
                preset = value.parse()?;
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let (file_name, content_type, data) = file.ok_or(LedgerError::MissingFile)?;
    if data.is_empty() {
        return Err(LedgerError::MissingFile);
    }
    if data.len() > state.config.max_file_size {
        return Err(LedgerError::FileTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    let registry = state.engines().await?;
    let engine = registry.select(engine_name.as_deref().filter(|n| !n.is_empty()))?;
    let pipeline = CapturePipeline::new(engine, Arc::new(LopdfRasterizer))
        .with_options(RecognitionOptions::for_language(&state.config.ocr_language))
        .with_preset(preset);
    let upload = CaptureFile::new(file_name, content_type, data.to_vec());

    // OCR is CPU-bound
    let output = tokio::task::spawn_blocking(move || pipeline.run(&upload))
        .await
        .map_err(|e| LedgerError::Internal(format!("Capture task panicked: {}", e)))??;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        "Capture completed in {}ms, confidence: {:.2}, plate: {:?}",
        processing_time_ms,
        output.confidence,
        output.extraction.plate
    );

    Ok(Json(CaptureResponse {
        plate: output.extraction.plate,
        features: output.extraction.features,
        summary: output.extraction.summary,
        text: output.text,
        pages: output.pages,
        confidence: output.confidence,
        engine: output.engine,
        processing_time_ms,
    }))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engines: compiled_engines(),
        engines_ready: state.engines.initialized(),
        engine_details: state
            .engines
            .get()
            .map(|registry| registry.info())
            .unwrap_or_default(),
        ocr_language: state.config.ocr_language.clone(),
        max_pdf_pages: MAX_PDF_PAGES,
        max_file_size_bytes: state.config.max_file_size,
    })
}
