//! HTTP server setup and the request pipeline entry point.
//!
//! # Responsibilities
//! - Create the axum Router for one listening interface
//! - Drive the three cache-negotiation phases per ordinary request
//! - Hand websocket upgrades to the stream layer
//! - Attach response headers (MIME, cache validators, Server)
//!
//! # Design Decisions
//! - One server per interface; the interface name is the request's virtual
//!   root, so it lives in the router state rather than being re-derived
//! - Resolution runs synchronously inside the request handler; its only
//!   waits are bounded filesystem reads
//! - Per-request failures answer 403/404 and never take the listener down

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::cache::negotiator::{http_date, CacheProbe, Negotiator};
use crate::config::schema::InterfaceConfig;
use crate::content::resolver::{ResolveError, ResolveRequest};
use crate::content::Origin;
use crate::http::mime::mime_type;
use crate::http::websocket;
use crate::stream::registry::ConnectionRegistry;

/// Identifies this server in every response.
pub const SERVER_HEADER: &str = "webfront";

/// State injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub negotiator: Arc<Negotiator>,
    pub registry: Arc<ConnectionRegistry>,
    /// Interface name; doubles as the virtual root for bare paths.
    pub interface: String,
}

/// HTTP server for one listening interface.
pub struct HttpServer {
    router: Router,
    interface: InterfaceConfig,
}

impl HttpServer {
    /// Create a server for `interface` over the shared pipeline state.
    pub fn new(
        interface: InterfaceConfig,
        negotiator: Arc<Negotiator>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        let state = AppState {
            negotiator,
            registry,
            interface: interface.name.clone(),
        };
        let router = Router::new()
            .route("/ws", any(ws_handler))
            .fallback(content_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http());
        Self { router, interface }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            interface = %self.interface.name,
            "HTTP server starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await?;

        tracing::info!(interface = %self.interface.name, "HTTP server stopped");
        Ok(())
    }

    pub fn interface(&self) -> &InterfaceConfig {
        &self.interface
    }
}

/// Ordinary (non-streaming) requests: probe → decision → fetch.
async fn content_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let peer = addr.to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("").to_string();
    let req = ResolveRequest {
        path: &path,
        query: &query,
        interface: &state.interface,
        peer: &peer,
    };

    // Probe phase: freshness metadata only, no content read.
    let probe = match state.negotiator.probe(&req) {
        Ok(probe) => probe,
        Err(e) => return resolve_failure(e),
    };

    // Decision phase: evaluate the peer's validators, short-circuit on 304.
    let if_none_match = header_str(&request, header::IF_NONE_MATCH);
    let if_modified_since = header_str(&request, header::IF_MODIFIED_SINCE);
    let decision = state
        .negotiator
        .decide(&req, probe, if_none_match, if_modified_since);
    if decision.not_modified {
        if let CacheProbe::Cacheable { size, mtime } = probe {
            return not_modified_response(size, mtime);
        }
    }

    // Fetch phase: full bytes, substitution and stamping applied.
    let served = match state.negotiator.fetch(&req) {
        Ok(served) => served,
        Err(e) => return resolve_failure(e),
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::SERVER, SERVER_HEADER);

    if served.origin == Origin::Dynamic {
        // No cache validators at all: dynamic responses must never be
        // cached. The wildcard origin is needed by the discovery scanner.
        builder = builder
            .header(header::CONTENT_TYPE, "text/plain")
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");
    } else {
        builder = builder.header(header::CONTENT_TYPE, mime_type(&served.path));
        if served.cacheable {
            builder = builder
                .header(
                    header::ETAG,
                    crate::cache::negotiator::etag(served.bytes.len() as u64, served.mtime),
                )
                .header(header::LAST_MODIFIED, http_date(served.mtime));
        }
    }

    tracing::debug!(
        peer = %peer,
        path = %served.path,
        size = served.bytes.len(),
        mtime = served.mtime,
        origin = ?served.origin,
        "serving content"
    );

    builder
        .body(Body::from(served.bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Websocket upgrades feed the per-connection duplex queues.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state, addr))
}

fn header_str<'a>(request: &'a Request<Body>, name: header::HeaderName) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

fn not_modified_response(size: u64, mtime: u64) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&crate::cache::negotiator::etag(size, mtime)) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&http_date(mtime)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_HEADER));
    response
}

fn resolve_failure(error: ResolveError) -> Response {
    match error {
        ResolveError::Forbidden { .. } => {
            (StatusCode::FORBIDDEN, "forbidden").into_response()
        }
        ResolveError::NotFound { .. } => {
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
        ResolveError::Io { path, source } => {
            tracing::error!(path = %path, error = %source, "content read failed");
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
    }
}
