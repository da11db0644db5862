//! HTTP front end for the chat page.
//!
//! ## Endpoints
//!
//! - `GET /` full page rendered from the current state
//! - `GET /events` SSE stream of rendered `status` and `transcript` fragments
//! - `POST /submit` form field `message`; 202 once handed to the session,
//!   409 while the engine is not ready

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{OnceCell, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::render::{render_page, render_status_html, render_transcript_html};
use crate::bootstrap::EngineStatus;
use crate::config::AppConfig;
use crate::controller::TranscriptController;
use crate::error::{ChatError, Result};
use crate::session::{ChatSession, SessionHandle};

/// Body of `POST /submit`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitForm {
    pub message: String,
}

#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    status: watch::Receiver<EngineStatus>,
    session: Arc<OnceCell<SessionHandle>>,
}

impl AppState {
    /// The chat session, created on first use once the engine is ready.
    async fn session(&self) -> Option<SessionHandle> {
        let engine = self.status.borrow().handle().cloned()?;
        let config = Arc::clone(&self.config);
        let session = self
            .session
            .get_or_init(|| async move {
                info!(engine = engine.name(), "creating chat session");
                ChatSession::spawn(TranscriptController::from_config(engine, &config))
            })
            .await;
        Some(session.clone())
    }
}

/// Chat page server.
///
/// Serves in a background tokio task; dropping the server stops it.
pub struct ChatServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ChatServer {
    /// Bind `{config.ui.host}:{config.ui.port}` (port `0` auto-assigns) and
    /// start serving.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Server`] if the listener cannot bind.
    pub async fn start(config: &AppConfig, status: watch::Receiver<EngineStatus>) -> Result<Self> {
        let state = AppState {
            config: Arc::new(config.clone()),
            status,
            session: Arc::new(OnceCell::new()),
        };

        let app = Router::new()
            .route("/", get(handle_page))
            .route("/events", get(handle_events))
            .route("/submit", post(handle_submit))
            .with_state(state);

        let bind_addr = format!("{}:{}", config.ui.host, config.ui.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ChatError::Server(format!("chat server bind failed on {bind_addr}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ChatError::Server(format!("failed to get local addr: {e}")))?;

        info!("chat server listening on http://{addr}/");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("chat server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// `GET /`
async fn handle_page(State(state): State<AppState>) -> Html<String> {
    let status = state.status.borrow().clone();
    let snapshot = state.session().await.map(|session| session.snapshot());
    Html(render_page(&state.config.ui.title, &status, snapshot.as_ref()))
}

/// `GET /events`
///
/// Emits the current status, then the settled status if it was still
/// loading. Once ready it follows the transcript until the client leaves.
/// After a failed bootstrap the stream stays open so the browser does not
/// reconnect.
async fn handle_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let mut status_rx = state.status.clone();
        let initial = status_rx.borrow_and_update().clone();
        yield Ok(Event::default().event("status").data(render_status_html(&initial)));

        let settled = if initial.is_settled() {
            initial
        } else {
            let settled = crate::bootstrap::wait_settled(&mut status_rx).await;
            yield Ok(Event::default().event("status").data(render_status_html(&settled)));
            settled
        };

        if settled.is_ready() {
            if let Some(session) = state.session().await {
                let mut snapshots = session.subscribe();
                loop {
                    let snapshot = snapshots.borrow_and_update().clone();
                    yield Ok(Event::default()
                        .event("transcript")
                        .data(render_transcript_html(&snapshot)));
                    if snapshots.changed().await.is_err() {
                        debug!("transcript channel closed, ending event stream");
                        break;
                    }
                }
            }
        } else {
            std::future::pending::<()>().await;
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `POST /submit`
async fn handle_submit(State(state): State<AppState>, Form(form): Form<SubmitForm>) -> Response {
    let Some(session) = state.session().await else {
        debug!("submit rejected, engine not ready");
        return (StatusCode::CONFLICT, "chat engine is not ready").into_response();
    };

    match session.submit_text(form.message).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            warn!("failed to forward submit to session: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}
