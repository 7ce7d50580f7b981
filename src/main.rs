//! Valve OCR web front end - upload nameplate photos, review and edit stored products.

mod backend;
mod config;
mod error;
mod export;
mod model;
mod normalize;
mod poller;
mod products;
mod render;
mod supabase;
mod upload;

#[cfg(test)]
mod testing;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use backend::{BackendClient, OcrBackend, UploadFile};
use config::AppConfig;
use error::FrontError;
use poller::{Clock, TokioClock};
use products::ProductsPage;
use std::sync::Arc;
use supabase::SupabaseClient;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upload::Uploader;
use uuid::Uuid;

/// Cookie naming the browser session that owns a products view.
const SESSION_COOKIE: &str = "valve_session";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    backend: Arc<dyn OcrBackend>,
    clock: Arc<dyn Clock>,
    products: ProductsPage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "valve_ocr_web=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(
        "Backend at {}, database at {}",
        config.backend_url, config.supabase_url
    );

    let backend: Arc<dyn OcrBackend> = Arc::new(BackendClient::new(&config)?);
    let supabase = Arc::new(SupabaseClient::new(&config)?);

    let state = AppState {
        products: ProductsPage::new(supabase, backend.clone()),
        backend,
        clock: Arc::new(TokioClock),
        config: Arc::new(config.clone()),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(home))
        .route("/upload", get(upload_form).post(upload_files))
        .route("/products", get(list_products))
        .route("/products/load", post(load_products))
        .route("/products/clear", post(clear_products))
        .route("/products/export.csv", get(export_products))
        .route("/products/:id/fields/:field", post(save_field))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024)) // 100MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

async fn home() -> Html<String> {
    Html(render::home_page())
}

async fn upload_form(State(state): State<AppState>) -> Html<String> {
    Html(render::upload_page(&state.config.backend_url, None, None))
}

/// Forward the picked files to the OCR backend and show the normalized result.
async fn upload_files(State(state): State<AppState>, multipart: Multipart) -> Response {
    let backend_url = state.config.backend_url.as_str();

    let files = match read_files(multipart).await {
        Ok(files) => files,
        Err(message) => {
            warn!("Rejected upload: {}", message);
            let page = render::upload_page(backend_url, None, Some(&message));
            return (StatusCode::BAD_REQUEST, Html(page)).into_response();
        }
    };

    let uploader = Uploader::new(state.backend.as_ref(), state.clock.as_ref(), &state.config);
    match uploader.submit(files).await {
        Ok(batch) => Html(render::upload_page(backend_url, Some(&batch), None)).into_response(),
        Err(e) => {
            error!("Upload failed: {}", e);
            let page = render::upload_page(backend_url, None, Some(&e.to_string()));
            (status_for(&e), Html(page)).into_response()
        }
    }
}

/// Collect every non-empty `files` part.
async fn read_files(mut multipart: Multipart) -> Result<Vec<UploadFile>, String> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Multipart error: {}", e))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| format!("Failed to read file: {}", e))?;

        // browsers send one empty part when nothing was picked
        if filename.is_empty() && data.is_empty() {
            continue;
        }

        info!("Received file: {} ({} bytes)", filename, data.len());
        files.push(UploadFile {
            filename,
            content_type,
            data: data.to_vec(),
        });
    }
    Ok(files)
}

async fn list_products(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = Session::from_headers(&headers);
    state.products.ensure_loaded(&session.id).await;
    let page = render::products_page(&state.products.snapshot(&session.id));
    session.attach(Html(page).into_response())
}

#[derive(serde::Deserialize)]
struct FilterForm {
    #[serde(default)]
    batch: String,
}

async fn load_products(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<FilterForm>,
) -> Response {
    let session = Session::from_headers(&headers);
    state.products.reload(&session.id, form.batch).await;
    session.attach(Redirect::to("/products").into_response())
}

async fn clear_products(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = Session::from_headers(&headers);
    state.products.clear(&session.id).await;
    session.attach(Redirect::to("/products").into_response())
}

#[derive(serde::Deserialize)]
struct FieldForm {
    #[serde(default)]
    value: String,
}

async fn save_field(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, field)): Path<(String, String)>,
    Form(form): Form<FieldForm>,
) -> Response {
    let session = Session::from_headers(&headers);
    let resp = match state
        .products
        .save_field(&session.id, &id, &field, form.value)
        .await
    {
        Ok(_) => Redirect::to("/products").into_response(),
        Err(e) => (status_for(&e), e.to_string()).into_response(),
    };
    session.attach(resp)
}

async fn export_products(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let session = Session::from_headers(&headers);
    let resp = match state.products.export(&session.id) {
        Ok(csv) => (
            [
                (header::CONTENT_TYPE, export::CSV_CONTENT_TYPE.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", export::CSV_FILENAME),
                ),
            ],
            csv,
        )
            .into_response(),
        Err(FrontError::EmptyExport) => Redirect::to("/products").into_response(),
        Err(e) => {
            error!("CSV export failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    };
    session.attach(resp)
}

// ============================================================================
// Helper functions
// ============================================================================

/// Browser session taken from the request cookie, or a new one.
struct Session {
    id: String,
    fresh: bool,
}

impl Session {
    fn from_headers(headers: &HeaderMap) -> Self {
        let existing = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
            .map(|(_, value)| value.to_string());

        match existing {
            Some(id) => Self { id, fresh: false },
            None => Self {
                id: Uuid::new_v4().to_string(),
                fresh: true,
            },
        }
    }

    /// Set the cookie on `resp` when the session was just created.
    fn attach(&self, mut resp: Response) -> Response {
        if self.fresh {
            let cookie = format!(
                "{}={}; Path=/; HttpOnly; SameSite=Lax",
                SESSION_COOKIE, self.id
            );
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                resp.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        resp
    }
}

/// HTTP status used when a page shows `err`.
fn status_for(err: &FrontError) -> StatusCode {
    match err {
        FrontError::NoFiles | FrontError::EmptyExport | FrontError::UnknownField(_) => {
            StatusCode::BAD_REQUEST
        }
        FrontError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        FrontError::Csv(_) => StatusCode::INTERNAL_SERVER_ERROR,
        FrontError::Transport(_)
        | FrontError::InvalidJson
        | FrontError::Upstream { .. }
        | FrontError::JobFailed { .. } => StatusCode::BAD_GATEWAY,
    }
}
