use crate::{
    app::{App, AppError, NoteMatch},
    auth,
    notes::{Folder, Note, NoteCreate, NoteKind, NoteUpdate, TextBlock, User},
};
use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    app: Arc<App>,
}

async fn start_app(app: App) {
    let app = Arc::new(app);

    let signal = shutdown_signal(app.clone());
    let shared_state = Arc::new(SharedState { app: app.clone() });

    async fn shutdown_signal(app: Arc<App>) {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {
                log::warn!("shutting down, flushing stores");
                app.shutdown();
            },
            _ = terminate => {
                app.shutdown();
            },
        }
    }

    let listen_addr = {
        let config = app.config();
        let config = config.read().expect("config lock poisoned");
        config.listen_addr.clone()
    };

    let router = router(shared_state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await.unwrap();
    log::info!("listening on {listen_addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(signal)
        .await
        .unwrap();
}

fn router(shared_state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/notes/search", post(search))
        .route("/api/notes/create", post(create))
        .route("/api/notes/append", post(append))
        .route("/api/notes/update", post(update))
        .route("/api/notes/delete", post(delete))
        .route("/api/notes", get(list))
        .route("/api/folders/create", post(create_folder))
        .route("/api/folders/update", post(update_folder))
        .route("/api/folders/delete", post(delete_folder))
        .route("/api/folders", get(list_folders))
        .route("/api/config", get(get_config))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

pub fn start_daemon(app: App) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(app).await });
}

// Make our own error that wraps `AppError`.
#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            AppError::NotFound | AppError::FolderNotFound => (
                axum::http::StatusCode::NOT_FOUND,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::Unauthorized => (
                axum::http::StatusCode::UNAUTHORIZED,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::Store(crate::notes::StoreError::FolderExists(_)) => (
                axum::http::StatusCode::CONFLICT,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::IndexUnavailable(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::SERVICE_UNAVAILABLE,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            AppError::Store(_) | AppError::IO(_) | AppError::Other(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
        }
        .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Resolve the request's bearer token to a user.
fn bearer_user(state: &SharedState, headers: &HeaderMap) -> Result<User, HttpError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let token = auth::extract_bearer_token(header).ok_or(HttpError(AppError::Unauthorized))?;
    state.app.authenticate(token).map_err(HttpError)
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    device_id: String,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    user_id: u64,
    token: String,
}

async fn register(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, HttpError> {
    let user = tokio::task::block_in_place(|| state.app.register(&payload.device_id))?;
    Ok(Json(RegisterResponse {
        user_id: user.id,
        token: user.token,
    }))
}

#[derive(Debug, Clone, Deserialize)]
struct SearchRequest {
    q: String,

    /// Maximum nearest chunks fetched (defaults to config)
    #[serde(default)]
    limit: Option<usize>,

    /// Cosine-distance cutoff override [0.0, 1.0]
    #[serde(default)]
    threshold: Option<f32>,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<Vec<NoteMatch>>, HttpError> {
    let user = bearer_user(&state, &headers)?;

    log::debug!("search by user {}: {:?}", user.id, payload.q);

    tokio::task::block_in_place(move || {
        state
            .app
            .search_notes(&user, &payload.q, payload.limit, payload.threshold)
            .map(Json)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct NoteCreateRequest {
    #[serde(default)]
    title: Option<String>,

    /// Extracted text content; paragraph breaks are blank lines
    text: String,

    #[serde(default)]
    kind: Option<NoteKind>,

    #[serde(default)]
    source_uri: Option<String>,

    #[serde(default)]
    folder_id: Option<u64>,
}

async fn create(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<NoteCreateRequest>,
) -> Result<Json<Note>, HttpError> {
    let user = bearer_user(&state, &headers)?;

    let note_create = NoteCreate {
        title: payload.title.unwrap_or_else(|| "Untitled".to_string()),
        kind: payload.kind.unwrap_or_default(),
        content: vec![TextBlock::plain(payload.text)],
        source_uri: payload.source_uri,
        folder_id: payload.folder_id,
    };

    tokio::task::block_in_place(move || {
        state
            .app
            .create_note(&user, note_create)
            .map(Json)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct NoteAppendRequest {
    id: u64,
    text: String,
    #[serde(default)]
    header: Option<String>,
    #[serde(default)]
    sub_header: Option<String>,
}

async fn append(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<NoteAppendRequest>,
) -> Result<Json<Note>, HttpError> {
    let user = bearer_user(&state, &headers)?;

    let block = TextBlock {
        header: payload.header,
        sub_header: payload.sub_header,
        text: payload.text,
    };

    tokio::task::block_in_place(move || {
        state
            .app
            .append_block(&user, payload.id, block)
            .map(Json)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct NoteUpdateRequest {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    folder_id: Option<u64>,
}

async fn update(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<NoteUpdateRequest>,
) -> Result<Json<Note>, HttpError> {
    let user = bearer_user(&state, &headers)?;

    let note_update = NoteUpdate {
        title: payload.title,
        folder_id: payload.folder_id,
    };

    tokio::task::block_in_place(move || {
        state
            .app
            .update_note(&user, payload.id, note_update)
            .map(Json)
            .map_err(Into::into)
    })
}

#[derive(Debug, Deserialize)]
struct NoteDeleteRequest {
    id: u64,
}

async fn delete(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<NoteDeleteRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let user = bearer_user(&state, &headers)?;

    tokio::task::block_in_place(move || state.app.delete_note(&user, payload.id))?;
    Ok(Json(json!({"deleted": payload.id})))
}

async fn list(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Note>>, HttpError> {
    let user = bearer_user(&state, &headers)?;
    Ok(Json(state.app.list_notes(&user)))
}

#[derive(Debug, Deserialize)]
struct FolderCreateRequest {
    name: String,
}

async fn create_folder(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<FolderCreateRequest>,
) -> Result<Json<Folder>, HttpError> {
    let user = bearer_user(&state, &headers)?;
    state
        .app
        .create_folder(&user, &payload.name)
        .map(Json)
        .map_err(Into::into)
}

#[derive(Debug, Deserialize)]
struct FolderUpdateRequest {
    id: u64,
    name: String,
}

async fn update_folder(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<FolderUpdateRequest>,
) -> Result<Json<Folder>, HttpError> {
    let user = bearer_user(&state, &headers)?;
    state
        .app
        .rename_folder(&user, payload.id, &payload.name)
        .map(Json)
        .map_err(Into::into)
}

#[derive(Debug, Deserialize)]
struct FolderDeleteRequest {
    id: u64,
}

async fn delete_folder(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
    Json(payload): Json<FolderDeleteRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let user = bearer_user(&state, &headers)?;
    state.app.delete_folder(&user, payload.id)?;
    Ok(Json(json!({"deleted": payload.id})))
}

async fn list_folders(
    State(state): State<Arc<SharedState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Folder>>, HttpError> {
    let user = bearer_user(&state, &headers)?;
    Ok(Json(state.app.list_folders(&user)))
}

async fn get_config(
    State(state): State<Arc<SharedState>>,
) -> Result<impl IntoResponse, HttpError> {
    let config = state.app.config();
    let config = config
        .read()
        .map_err(|_| AppError::Other(anyhow::anyhow!("config lock poisoned")))?
        .clone();
    Ok(Json(config))
}

#[cfg(test)]
pub(crate) fn test_router(app: Arc<App>) -> Router {
    router(Arc::new(SharedState { app }))
}
