//! HTTP surface and request orchestration
//!
//! One endpoint does the work: `POST /` locates or creates an editor
//! session, blocks until the next saved increment (or exit), and
//! replies with the current content. `GET /status` is a liveness
//! probe; everything else is a 404. Each request runs in its own tokio
//! task, so the long poll inside a session blocks nobody else.

use axum::Router;
use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::editor::{
    EditOutcome, EditorConfig, EditorSession, SessionError, SessionOutcome, SessionRegistry,
};
use crate::filters::FilterSet;

/// Correlation key header, echoed by clients to reattach
const FILE_HEADER: &str = "x-file";

/// Source URL hint header, used for codec matching and file naming
const URL_HEADER: &str = "x-url";

/// Announces whether the session is still open on responses
const OPEN_HEADER: &str = "x-open";

// ============================================================================
// Application State and Router
// ============================================================================

/// Shared state handed to every request task
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EditorConfig>,
    pub registry: SessionRegistry,
    pub filters: Arc<FilterSet>,
}

/// Build the router for the daemon
pub fn app(state: AppState) -> Router {
    // Method mismatches on "/" (e.g. GET) are plain 404s, not 405s
    Router::new()
        .route("/", post(handle_edit).fallback(handle_fallback))
        .route("/status", get(handle_status))
        .fallback(handle_fallback)
        .with_state(state)
}

// ============================================================================
// Request Errors
// ============================================================================

/// Per-request failure modes, mapped onto HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Client sent no Content-Length; rejected before the body is read
    #[error("Length Required")]
    LengthRequired,

    /// Request body could not be read
    #[error("Failed to read request body: {0}")]
    BodyRead(axum::Error),

    /// Request body was not valid UTF-8 text
    #[error("Request body is not valid UTF-8")]
    InvalidUtf8,

    /// The editor process failed; reason goes to the client
    #[error("{reason}")]
    EditorFailed { reason: String },

    /// Internal session machinery failure, surfaced as a generic 404
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Session key could not be represented as a response header
    #[error("Session key is not a valid header value")]
    InvalidKeyHeader,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::LengthRequired => StatusCode::LENGTH_REQUIRED.into_response(),
            ApiError::InvalidUtf8 => {
                (StatusCode::BAD_REQUEST, "Request body is not valid UTF-8").into_response()
            }
            ApiError::EditorFailed { reason } => {
                info!("Editor failed: {}", reason);
                (StatusCode::NOT_FOUND, reason).into_response()
            }
            // The daemon never dies from one bad request; unexpected
            // failures are logged in full and reduced to a generic 404
            other => {
                error!("Unhandled request error: {}", other);
                (StatusCode::NOT_FOUND, "Not Found").into_response()
            }
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Liveness probe; always succeeds, no side effects
async fn handle_status() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        "edit-server is running.\n",
    )
}

async fn handle_fallback(uri: Uri) -> impl IntoResponse {
    (StatusCode::NOT_FOUND, format!("Not Found: {}", uri.path()))
}

async fn handle_edit(State(state): State<AppState>, request: Request) -> Response {
    info!(" --- new request --- ");
    let response = match process_edit(state, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };
    debug!("POST complete");
    response
}

/// The per-request orchestration pipeline
async fn process_edit(state: AppState, request: Request) -> Result<Response, ApiError> {
    let headers = request.headers().clone();
    debug!("Headers: {:?}", headers);

    if !headers.contains_key(CONTENT_LENGTH) {
        return Err(ApiError::LengthRequired);
    }

    let bytes = to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(ApiError::BodyRead)?;
    let contents = String::from_utf8(bytes.to_vec()).map_err(|_| ApiError::InvalidUtf8)?;

    let key = correlation_key(&headers);
    let session = state.registry.find_or_create(key.as_deref(), || {
        let codec = state.filters.select_codec(&headers, &contents);
        let url_hint = headers.get(URL_HEADER).and_then(|v| v.to_str().ok());
        EditorSession::spawn(&contents, codec, url_hint, &state.config)
    })?;

    let outcome = session.wait_for_increment().await?;
    respond_with_outcome(&state, &session, outcome).await
}

/// Build the response for the outcome the wait observed
///
/// Openness is taken from the outcome, never from live process state:
/// the editor may exit between the poll tick that reported an
/// increment and this point, and an increment must still report the
/// session open with a reattachment key. The follow-up request
/// observes the exit and runs the cleanup path.
async fn respond_with_outcome(
    state: &AppState,
    session: &EditorSession,
    outcome: EditOutcome,
) -> Result<Response, ApiError> {
    if outcome == EditOutcome::IncrementReady {
        let contents = session.current_contents().await?;
        return respond(session, contents, true);
    }

    state.registry.remove(&session.key());
    schedule_delayed_remove(session.temp_path().to_path_buf(), state.config.delete_delay);

    match session.classify_outcome() {
        SessionOutcome::Failure { reason } => Err(ApiError::EditorFailed { reason }),
        SessionOutcome::Success => {
            let contents = session.current_contents().await?;
            respond(session, contents, false)
        }
    }
}

fn respond(
    session: &EditorSession,
    contents: String,
    still_open: bool,
) -> Result<Response, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        OPEN_HEADER,
        HeaderValue::from_static(if still_open { "true" } else { "false" }),
    );
    if still_open {
        let key =
            HeaderValue::from_str(&session.key()).map_err(|_| ApiError::InvalidKeyHeader)?;
        headers.insert(FILE_HEADER, key);
    }

    Ok((StatusCode::OK, headers, contents).into_response())
}

/// Resolve the client's correlation key, normalizing the sentinel
/// values browsers send for "no session"
fn correlation_key(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(FILE_HEADER)?.to_str().ok()?.trim();
    match value {
        "" | "undefined" | "null" => None,
        key => Some(key.to_string()),
    }
}

/// Fire-and-forget deletion of a finished session's temp file after
/// the configured grace delay
fn schedule_delayed_remove(path: PathBuf, delay: Duration) {
    tokio::spawn(async move {
        debug!("sleeping {:?} before removing {}", delay, path.display());
        tokio::time::sleep(delay).await;
        debug!("removing file: {}", path.display());
        if let Err(e) = tokio::fs::remove_file(&path).await {
            error!("Unable to unlink {}: {}", path.display(), e);
        }
    });
}

// ============================================================================
// Tests
// ============================================================================
