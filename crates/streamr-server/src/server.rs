//! `StreamrServer`: Axum HTTP front end for channels and SSE sessions.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use streamr_core::{ChannelId, ErrorKind, SessionId, StreamError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::directory::ChannelDirectory;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::sse::resume;
use crate::sse::{ChannelTransport, Session};
use crate::telemetry;

/// Response header carrying the id of a newly opened session.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Channels and archived histories.
    pub directory: Arc<ChannelDirectory>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The streamr server.
pub struct StreamrServer {
    config: Arc<ServerConfig>,
    directory: Arc<ChannelDirectory>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl StreamrServer {
    /// Create a server.
    pub fn new(config: ServerConfig) -> Self {
        let directory = Arc::new(ChannelDirectory::new(config.archive_capacity));
        Self {
            shutdown: Arc::new(ShutdownCoordinator::new(Arc::clone(&directory))),
            directory,
            config: Arc::new(config),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            directory: Arc::clone(&self.directory),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/channels/{channel_id}/events", get(events_handler))
            .route("/channels/{channel_id}/messages", post(publish_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address and the serve task. After
    /// [`ShutdownCoordinator::shutdown`] the coordinator closes every session
    /// and the task ends once in-flight requests finish.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let signal = self.shutdown.signal();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(error = %e, "server error");
            }
        });

        info!(%addr, "streamr listening");
        Ok((addr, handle))
    }

    /// Channels and archived histories.
    pub fn directory(&self) -> &Arc<ChannelDirectory> {
        &self.directory
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Body of `POST /channels/{channel_id}/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    /// Payload sent as the `data` field.
    pub data: String,
    /// Optional event name.
    #[serde(default)]
    pub event: Option<String>,
    /// Restrict delivery to these sessions.
    #[serde(default)]
    pub session_ids: Option<Vec<SessionId>>,
}

/// Reply to a publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Channel published to.
    pub channel_id: ChannelId,
    /// Sessions that accepted the message.
    pub recipients: usize,
}

/// Error body.
#[derive(Debug, Clone, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

fn error_response(status: StatusCode, code: &'static str, message: String) -> Response {
    (status, Json(ErrorBody { code, message })).into_response()
}

fn stream_error_response(err: &StreamError) -> Response {
    let status = match err.kind() {
        ErrorKind::Argument => StatusCode::BAD_REQUEST,
        ErrorKind::State => StatusCode::CONFLICT,
        ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.code(), err.to_string())
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let channels = state.directory.channel_count().await;
    let connections = state.directory.connection_count().await;
    Json(health::health_check(state.start_time, channels, connections))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => telemetry::render(&handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /channels/{channel_id}/events
async fn events_handler(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let hint = resume::last_event_id(&headers, &query);
    let (transport, frames) = ChannelTransport::new(hint, state.config.outbound_buffer);
    let transport = Arc::new(transport);

    let channel = state
        .directory
        .get_or_create(&ChannelId::from(channel_id))
        .await;

    let mut config = state.config.session.clone();
    let prior = match query.get("session_id").filter(|id| !id.is_empty()) {
        Some(id) => {
            let session_id = SessionId::from(id.as_str());
            let prior = state.directory.reclaim_history(&channel, &session_id).await;
            config.session_id = Some(session_id);
            prior
        }
        None => None,
    };

    let opened = match prior {
        Some(history) => Session::resume(transport.clone(), config, history),
        None => Session::connect(transport.clone(), config),
    };
    let session = match opened {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "failed to open session");
            return stream_error_response(&e);
        }
    };

    if let Err(e) = channel.register(Arc::clone(&session)).await {
        warn!(error = %e, "failed to register session");
        return stream_error_response(&e);
    }
    state.directory.archive_on_close(&session);

    let mut response = axum::http::Response::builder()
        .status(StatusCode::OK)
        .header(SESSION_ID_HEADER, session.session_id().as_str());
    for (name, value) in transport.headers() {
        response = response.header(name, value);
    }
    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
    response.body(body).unwrap_or_else(|e| {
        session.close();
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INVALID_RESPONSE",
            e.to_string(),
        )
    })
}

/// POST /channels/{channel_id}/messages
async fn publish_handler(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(request): Json<PublishRequest>,
) -> Response {
    let channel_id = ChannelId::from(channel_id);
    let Some(channel) = state.directory.get(&channel_id).await else {
        return error_response(
            StatusCode::NOT_FOUND,
            "CHANNEL_NOT_FOUND",
            format!("channel {channel_id} does not exist"),
        );
    };
    let event = request.event.as_deref();

    let recipients = match request.session_ids {
        None => channel.broadcast_all_as(&request.data, event).await,
        Some(ids) => {
            let sessions = channel.sessions(&ids).await;
            if sessions.is_empty() && !ids.is_empty() {
                0
            } else {
                match channel
                    .broadcast_some_as(&request.data, event, &sessions)
                    .await
                {
                    Ok(recipients) => recipients,
                    Err(e) => return stream_error_response(&e),
                }
            }
        }
    };

    (
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            channel_id,
            recipients,
        }),
    )
        .into_response()
}
