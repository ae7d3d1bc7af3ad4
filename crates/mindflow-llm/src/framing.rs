use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::{Future, Stream};

use mindflow_core::errors::GatewayError;
use mindflow_core::stream::NormalizedDelta;

pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Turns one upstream line into normalized deltas.
pub trait LineDecoder: Send + Unpin + 'static {
    /// `Err` is a fatal error frame; malformed lines are skipped by returning nothing.
    fn decode_line(&mut self, line: &str) -> Result<Vec<NormalizedDelta>, GatewayError>;

    /// Called once when the body ends.
    fn finish(&mut self) -> Vec<NormalizedDelta>;
}

/// Payload of an SSE `data:` line. Comments and other fields yield `None`.
pub fn sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).trim_end())
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Splits a response body into lines and feeds them to a decoder.
/// If no bytes arrive within `idle_duration`, yields an error and ends.
pub struct DecodedStream<D> {
    inner: ByteStream,
    decoder: D,
    buffer: Vec<u8>,
    pending: VecDeque<Result<NormalizedDelta, GatewayError>>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    done: bool,
}

impl<D: LineDecoder> DecodedStream<D> {
    pub fn new(
        byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
        decoder: D,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            decoder,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            done: false,
        }
    }

    fn decode(&mut self, line: &str) {
        match self.decoder.decode_line(line) {
            Ok(deltas) => self
                .pending
                .extend(deltas.into_iter().filter(|d| !d.is_empty()).map(Ok)),
            Err(e) => {
                self.pending.push_back(Err(e));
                self.buffer.clear();
                self.done = true;
            }
        }
    }

    fn drain_lines(&mut self) {
        while !self.done {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw);
            let line = text.trim_end_matches(['\r', '\n']);
            if !line.is_empty() {
                self.decode(line);
            }
        }
    }

    fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let text = String::from_utf8_lossy(&rest);
            let line = text.trim();
            if !line.is_empty() {
                self.decode(line);
            }
        }
        if !self.done {
            let tail = self.decoder.finish();
            self.pending
                .extend(tail.into_iter().filter(|d| !d.is_empty()).map(Ok));
        }
        self.done = true;
    }
}

impl<D: LineDecoder> Stream for DecodedStream<D> {
    type Item = Result<NormalizedDelta, GatewayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(item) = this.pending.pop_front() {
                return Poll::Ready(Some(item));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let deadline = tokio::time::Instant::now() + this.idle_duration;
                    this.idle_deadline.as_mut().reset(deadline);
                    this.buffer.extend_from_slice(&bytes);
                    this.drain_lines();
                }
                Poll::Ready(Some(Err(e))) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(GatewayError::StreamInterrupted(e.to_string()))));
                }
                Poll::Ready(None) => this.finish(),
                Poll::Pending => {
                    if this.idle_deadline.as_mut().poll(cx).is_ready() {
                        this.done = true;
                        return Poll::Ready(Some(Err(GatewayError::StreamInterrupted(format!(
                            "idle timeout after {}s",
                            this.idle_duration.as_secs()
                        )))));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}
