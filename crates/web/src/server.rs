//! Viewer-facing HTTP and WebSocket surface

use crate::static_files::StaticFiles;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use shotdiff_common::{Error, RunState, TestCollection, TestDescriptor};
use shotdiff_review::events::Subscription;
use shotdiff_review::paths::{CURRENT_PREFIX, DIFF_PREFIX, REF_PREFIX};
use shotdiff_review::App;

/// Shared state of the web server
pub struct WebServerState {
    app: Arc<App>,
    auto_run: bool,
    run_in_flight: AtomicBool,
    /// Accepts rewrite reference files in place and must not overlap
    accept_lock: tokio::sync::Mutex<()>,
    static_files: StaticFiles,
}

/// Web server exposing a review [`App`] to viewers
pub struct WebServer {
    state: Arc<WebServerState>,
}

impl WebServer {
    pub fn new(app: Arc<App>, auto_run: bool) -> Self {
        Self {
            state: Arc::new(WebServerState {
                app,
                auto_run,
                run_in_flight: AtomicBool::new(false),
                accept_lock: tokio::sync::Mutex::new(()),
                static_files: StaticFiles::new(),
            }),
        }
    }

    pub fn router(&self) -> Router {
        let app = &self.state.app;

        let mut router = Router::new()
            .route("/", get(index_handler))
            .route("/viewer.js", get(viewer_js_handler))
            .route("/api/health", get(health_handler))
            .route("/api/status", get(status_handler))
            .route("/api/tests", get(tests_handler))
            .route("/api/run", post(run_handler))
            .route("/api/accept", post(accept_handler))
            .route("/api/diff", post(diff_handler))
            .route("/events", get(events_handler))
            .nest_service(CURRENT_PREFIX, ServeDir::new(app.current_dir()))
            .nest_service(DIFF_PREFIX, ServeDir::new(app.diff_dir()));

        for (browser_id, dir) in app.paths().reference_dirs() {
            let prefix = format!("{}/{}", REF_PREFIX, urlencoding::encode(browser_id));
            router = router.nest_service(&prefix, ServeDir::new(dir));
        }

        router
            .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start a run in the background unless one is already in flight.
    /// Returns whether a run was started.
    pub fn start_run(&self, tests: Option<Vec<TestDescriptor>>) -> bool {
        start_run(&self.state, tests)
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!("Review server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

fn start_run(state: &Arc<WebServerState>, tests: Option<Vec<TestDescriptor>>) -> bool {
    if state.app.state() != RunState::Ready {
        return false;
    }
    if state
        .run_in_flight
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return false;
    }

    let state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = state.app.run(tests).await {
            error!("Run failed: {}", e);
        }
        state.run_in_flight.store(false, Ordering::Release);
    });
    true
}

// ============================================================================
// Errors
// ============================================================================

/// Error returned by API handlers
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidPath { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn index_handler(State(state): State<Arc<WebServerState>>) -> impl IntoResponse {
    state.static_files.serve("index.html")
}

async fn viewer_js_handler(State(state): State<Arc<WebServerState>>) -> impl IntoResponse {
    state.static_files.serve("viewer.js")
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "shotdiff",
        "version": shotdiff_common::VERSION,
    }))
}

#[derive(Serialize)]
struct StatusResponse {
    state: RunState,
    viewers: usize,
}

async fn status_handler(State(state): State<Arc<WebServerState>>) -> impl IntoResponse {
    Json(StatusResponse {
        state: state.app.state(),
        viewers: state.app.events().subscriber_count(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TestsResponse {
    #[serde(flatten)]
    tests: TestCollection,
    auto_run: bool,
}

async fn tests_handler(State(state): State<Arc<WebServerState>>) -> impl IntoResponse {
    Json(TestsResponse {
        tests: state.app.get_tests(),
        auto_run: state.auto_run,
    })
}

#[derive(Debug, Default, Deserialize)]
struct RunRequest {
    #[serde(default)]
    tests: Option<Vec<TestDescriptor>>,
}

async fn run_handler(
    State(state): State<Arc<WebServerState>>,
    Json(request): Json<RunRequest>,
) -> Response {
    if start_run(&state, request.tests) {
        (StatusCode::ACCEPTED, Json(serde_json::json!({ "started": true }))).into_response()
    } else {
        (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": format!("cannot start a run while {}", state.app.state())
            })),
        )
            .into_response()
    }
}

async fn accept_handler(
    State(state): State<Arc<WebServerState>>,
    Json(test): Json<TestDescriptor>,
) -> Result<impl IntoResponse, ApiError> {
    let _guard = state.accept_lock.lock().await;
    let accepted = state.app.update_reference_image(&test).await?;
    Ok(Json(accepted))
}

#[derive(Serialize)]
struct DiffResponse {
    #[serde(rename = "diffURL")]
    diff_url: String,
}

async fn diff_handler(
    State(state): State<Arc<WebServerState>>,
    Json(test): Json<TestDescriptor>,
) -> Result<impl IntoResponse, ApiError> {
    let failure = state
        .app
        .find_failed_test(&test)
        .ok_or_else(|| Error::NotFound(test.to_string()))?;
    let diff_url = state.app.build_diff_image(&failure).await?;
    Ok(Json(DiffResponse { diff_url }))
}

async fn events_handler(
    State(state): State<Arc<WebServerState>>,
    ws: WebSocketUpgrade,
) -> Response {
    let subscription = state.app.events().subscribe();
    let app = state.app.clone();

    ws.on_upgrade(move |socket| async move {
        let id = subscription.id;
        forward_events(socket, subscription).await;
        app.events().unsubscribe(id);
        debug!("Viewer {} left", id);
    })
}

/// Push queued events to the socket until either side goes away
async fn forward_events(socket: WebSocket, mut subscription: Subscription) {
    let (mut ws_write, mut ws_read) = socket.split();

    loop {
        tokio::select! {
            event = subscription.events.recv() => {
                let Some(event) = event else { break };
                if ws_write.send(Message::Text(event.to_json())).await.is_err() {
                    break;
                }
            }
            msg = ws_read.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = ws_write.close().await;
}
