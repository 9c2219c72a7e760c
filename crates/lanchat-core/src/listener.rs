//! Inbound listener
//!
//! Serves the single receiving endpoint. Every accepted request becomes one
//! remote [`Message`] handed to the event sink. A missing or undecodable
//! `content` parameter is not an error; it yields an empty message that the
//! consumer renders as a placeholder.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{RawQuery, State},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};
use url::form_urlencoded;

use crate::errors::ListenerError;
use crate::message::Message;
use crate::sink::EventSink;

/// Query parameter carrying the message text
pub const CONTENT_PARAM: &str = "content";

/// Characters the router would read as captures, wildcards or URL syntax
const RESERVED_PATH_CHARS: &[char] = &[':', '*', '{', '}', '?', '#'];

/// Whether `path` is an absolute path made only of literal segments
pub fn is_literal_path(path: &str) -> bool {
    path.starts_with('/') && !path.contains(RESERVED_PATH_CHARS)
}

#[derive(Clone)]
struct ListenerState {
    sink: Arc<dyn EventSink>,
}

/// Router exposing `GET <path>` that forwards every request to `sink`
pub fn router(path: &str, sink: Arc<dyn EventSink>) -> Router {
    Router::new()
        .route(path, get(receive))
        .layer(TraceLayer::new_for_http())
        .with_state(ListenerState { sink })
}

async fn receive(State(state): State<ListenerState>, RawQuery(query): RawQuery) -> &'static str {
    let content = extract_content(query.as_deref());
    debug!(len = content.len(), "Accepted inbound message");
    state.sink.deliver(Message::remote(content));
    "received"
}

/// Decode the `content` parameter, leniently
///
/// Absent parameter or query gives an empty string. The first occurrence wins
/// when the parameter repeats.
pub fn extract_content(query: Option<&str>) -> String {
    query
        .and_then(|q| {
            form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == CONTENT_PARAM)
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_default()
}

/// Bound receiving endpoint, ready to serve
pub struct InboundListener {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
}

impl InboundListener {
    /// Bind the endpoint. Failing here is the one startup error that is fatal.
    pub async fn bind(
        addr: SocketAddr,
        path: &str,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, ListenerError> {
        if !is_literal_path(path) {
            return Err(ListenerError::InvalidPath(path.to_string()));
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        info!("Receiving messages on http://{}{}", local_addr, path);

        Ok(Self {
            listener,
            router: router(path, sink),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve for the lifetime of the process
    pub async fn serve(self) -> Result<(), ListenerError> {
        axum::serve(self.listener, self.router)
            .await
            .map_err(ListenerError::Serve)
    }

    /// Serve until `shutdown` is cancelled
    pub async fn serve_with_shutdown(self, shutdown: CancellationToken) -> Result<(), ListenerError> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(ListenerError::Serve)
    }

    /// Serve on a background task
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<Result<(), ListenerError>> {
        tokio::spawn(self.serve_with_shutdown(shutdown))
    }
}
