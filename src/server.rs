//! HTTP server and routing
//!
//! One lightweight task per inbound connection; the only state shared across
//! tasks is the read-only application state. Routes:
//!
//! - `GET /stream?url=<encoded>` - generic byte-range proxy (caller already
//!   authorized)
//! - `GET /stream/{lectureId}` - gated per-lecture proxy
//! - `GET /stream/{lectureId}/manifest` - gated, HLS-aware
//! - `GET /health`, `GET /stats` - operational endpoints
//!
//! If the client disconnects mid-stream, hyper drops the response body,
//! which drops the slicer and the upstream connection with it - no task
//! leakage, no continued upstream transfer.

use crate::access::{AccessGate, CourseCatalog};
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::fetch::build_client;
use crate::manifest::ManifestRewriter;
use crate::metrics::RelayMetrics;
use crate::pipeline::StreamPipeline;
use crate::respond::{self, RelayBody};
use http::{Method, Request, Response, StatusCode};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Shared per-process state handed to every connection task.
pub struct AppState<C: CourseCatalog> {
    pub pipeline: StreamPipeline,
    pub gate: AccessGate<C>,
    pub rewriter: ManifestRewriter,
    pub metrics: Arc<RelayMetrics>,
}

/// The relay HTTP server.
pub struct RelayServer<C: CourseCatalog + 'static> {
    state: Arc<AppState<C>>,
    listen_address: SocketAddr,
}

impl<C: CourseCatalog + 'static> RelayServer<C> {
    /// Assemble the full service from configuration and a catalog
    /// implementation.
    pub fn new(config: &RelayConfig, catalog: C) -> Result<Self> {
        let listen_address = config.listen_address.parse::<SocketAddr>().map_err(|e| {
            RelayError::ConfigError(format!(
                "Invalid listen_address '{}': {}",
                config.listen_address, e
            ))
        })?;

        let client = build_client(config)?;
        let metrics = Arc::new(RelayMetrics::new());

        let state = AppState {
            pipeline: StreamPipeline::new(client.clone(), config, metrics.clone()),
            gate: AccessGate::new(catalog, config.resolved_jwt_secret()),
            rewriter: ManifestRewriter::new(
                client,
                config.probe_timeout(),
                config.fetch_timeout(),
                config.public_prefix.clone(),
            ),
            metrics,
        };

        Ok(RelayServer {
            state: Arc::new(state),
            listen_address,
        })
    }

    /// Bind the listener without starting the accept loop. Useful when the
    /// caller needs the actual bound address (e.g. port 0 in tests).
    pub async fn bind(self) -> Result<BoundRelayServer<C>> {
        let listener = TcpListener::bind(self.listen_address).await.map_err(|e| {
            RelayError::IoError(format!("Failed to bind {}: {}", self.listen_address, e))
        })?;

        Ok(BoundRelayServer {
            state: self.state,
            listener,
        })
    }

    /// Bind and serve until the process exits.
    pub async fn run(self) -> Result<()> {
        self.bind().await?.serve().await
    }
}

/// A relay server with its listener already bound.
pub struct BoundRelayServer<C: CourseCatalog + 'static> {
    state: Arc<AppState<C>>,
    listener: TcpListener,
}

impl<C: CourseCatalog + 'static> BoundRelayServer<C> {
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RelayError::IoError(e.to_string()))
    }

    /// Accept connections until the process exits.
    pub async fn serve(self) -> Result<()> {
        let listener = self.listener;
        info!(
            "Relay listening on http://{}",
            listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default()
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let state = self.state.clone();

            tokio::task::spawn(async move {
                let result = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |req| {
                            let state = state.clone();
                            async move { handle_request(state, req).await }
                        }),
                    )
                    .await;

                if let Err(err) = result {
                    // Disconnects mid-stream land here; they are routine
                    error!("Connection from {} ended with error: {:?}", peer, err);
                }
            });
        }
    }
}

/// Route one request. Always returns a response; failures are mapped to
/// JSON error payloads here, while mid-stream failures surface as connection
/// aborts inside the body stream.
pub async fn handle_request<C: CourseCatalog>(
    state: Arc<AppState<C>>,
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<Response<RelayBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("{} {}", method, path);

    if method == Method::OPTIONS {
        return Ok(preflight_response());
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let outcome = match (method.as_str(), segments.as_slice()) {
        ("GET", ["health"]) => Ok(respond::json_response(
            StatusCode::OK,
            serde_json::json!({ "status": "ok" }),
        )),
        ("GET", ["stats"]) => Ok(respond::json_response(
            StatusCode::OK,
            serde_json::to_value(state.metrics.snapshot())
                .unwrap_or_else(|_| serde_json::json!({})),
        )),
        ("GET", ["stream"]) => handle_generic_stream(&state, &req).await,
        ("GET", ["stream", lecture_id]) => handle_lecture_stream(&state, &req, lecture_id).await,
        ("GET", ["stream", lecture_id, "manifest"]) => {
            handle_lecture_manifest(&state, &req, lecture_id).await
        }
        _ => Ok(not_found()),
    };

    Ok(outcome.unwrap_or_else(|err| {
        if matches!(err, RelayError::AuthRequired | RelayError::AccessDenied) {
            state.metrics.record_denial();
        }
        warn!("{} {} failed: {}", method, path, err);
        respond::error_response(&err)
    }))
}

/// Generic proxy: the upstream URL arrives percent-encoded in the query
/// string. No gating - the caller has already authorized this URL.
async fn handle_generic_stream<C: CourseCatalog>(
    state: &AppState<C>,
    req: &Request<hyper::body::Incoming>,
) -> Result<Response<RelayBody>> {
    let query = parse_query(req);
    let target_url = query.get("url").ok_or(RelayError::MissingUrl)?;

    state.pipeline.proxy(target_url, range_header(req)).await
}

/// Gated proxy: resolve the lecture's asset URL through the access gate,
/// then run the same pipeline.
async fn handle_lecture_stream<C: CourseCatalog>(
    state: &AppState<C>,
    req: &Request<hyper::body::Incoming>,
    lecture_id: &str,
) -> Result<Response<RelayBody>> {
    let target_url = authorize(state, req, lecture_id).await?;
    state.pipeline.proxy(&target_url, range_header(req)).await
}

/// Gated manifest: same gate, then HLS-aware rewriting instead of byte
/// proxying.
async fn handle_lecture_manifest<C: CourseCatalog>(
    state: &AppState<C>,
    req: &Request<hyper::body::Incoming>,
    lecture_id: &str,
) -> Result<Response<RelayBody>> {
    let target_url = authorize(state, req, lecture_id).await?;
    let playlist = state.rewriter.rewrite_for(&target_url).await?;
    state.metrics.record_manifest();
    Ok(respond::playlist_response(playlist))
}

async fn authorize<C: CourseCatalog>(
    state: &AppState<C>,
    req: &Request<hyper::body::Incoming>,
    lecture_id: &str,
) -> Result<String> {
    let query = parse_query(req);
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    let principal = state
        .gate
        .principal_from_request(auth_header, query.get("token").map(String::as_str));

    state.gate.authorize(lecture_id, principal.as_ref()).await
}

fn range_header<'a>(req: &'a Request<hyper::body::Incoming>) -> Option<&'a str> {
    req.headers().get("range").and_then(|v| v.to_str().ok())
}

fn parse_query(req: &Request<hyper::body::Incoming>) -> HashMap<String, String> {
    url::form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
        .into_owned()
        .collect()
}

fn preflight_response() -> Response<RelayBody> {
    let mut response = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(respond::empty_body())
        .expect("static preflight response must build");
    respond::apply_cors_headers(response.headers_mut());
    response
}

fn not_found() -> Response<RelayBody> {
    respond::json_response(
        StatusCode::NOT_FOUND,
        serde_json::json!({ "error": "Not found" }),
    )
}
