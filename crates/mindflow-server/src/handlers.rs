use std::convert::Infallible;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};

use mindflow_engine::{Conversation, EventEmitter, OrchestrationSession, DEFAULT_SYSTEM_PROMPT};

use crate::error::ApiError;
use crate::request::ChatRequest;
use crate::server::AppState;

/// `POST /api/chat`: run one turn and stream its records.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if req.messages.is_empty() {
        return Err(ApiError::BadRequest("messages must not be empty".into()));
    }
    let adapter = state
        .catalog
        .resolve(req.model_provider.as_deref())
        .ok_or_else(|| ApiError::Internal("no backend is configured".into()))?;
    info!(
        backend = adapter.name(),
        model = adapter.model(),
        messages = req.messages.len(),
        "chat request"
    );

    let options = req.turn_options();
    let prompt = state
        .orchestration
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let conversation = Conversation::new(req.messages, prompt);

    let mut session = OrchestrationSession::new(adapter, state.tools.clone())
        .with_max_iterations(state.orchestration.max_iterations)
        .with_tool_timeout(std::time::Duration::from_secs(state.orchestration.tool_timeout_secs))
        .with_metrics(state.metrics.clone());
    if let Some(summarizer) = &state.summarizer {
        session = session.with_summarizer(summarizer.clone());
    }

    let (emitter, rx) = EventEmitter::channel(state.channel_capacity);
    tokio::spawn(async move {
        let summary = session.run(conversation, options, emitter).await;
        debug!(turn_id = %summary.turn_id, events = summary.events, "turn task done");
    });

    Ok(sse_response(sse_body_stream(rx)))
}

/// `GET /health`.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "backends": state.catalog.names(),
        "defaultBackend": state.catalog.default_name(),
        "tools": state.tools.count(),
    }))
}

/// `GET /metrics`: JSON snapshot of the in-process recorder.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

pub fn sse_body_stream(
    mut rx: mpsc::Receiver<Bytes>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        while let Some(record) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(record);
        }
    }
}

pub fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
{
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    (headers, Body::from_stream(stream)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn body_stream_forwards_records_until_closed() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Bytes::from_static(b"data: {}\n\n")).await.unwrap();
        tx.send(Bytes::from_static(b"data: [DONE]\n\n")).await.unwrap();
        drop(tx);

        let chunks: Vec<Bytes> = sse_body_stream(rx).map(|r| r.unwrap()).collect().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[1][..], b"data: [DONE]\n\n");
    }

    #[test]
    fn sse_headers() {
        let (_tx, rx) = mpsc::channel(1);
        let resp = sse_response(sse_body_stream(rx));
        let headers = resp.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
    }
}
