use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use mindflow_core::events::{OutboundEvent, DONE_RECORD};

/// Writes one turn's records, in order, to the outbound channel.
///
/// `Done` is only written by [`EventEmitter::finish`], which consumes the
/// emitter, so it appears exactly once. Once the receiver is gone every
/// further write is discarded.
pub struct EventEmitter {
    tx: mpsc::Sender<Bytes>,
    closed: bool,
    emitted: usize,
}

impl EventEmitter {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            tx,
            closed: false,
            emitted: 0,
        }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// True once the caller has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed || self.tx.is_closed()
    }

    /// Records written so far, excluding `Done`.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub async fn emit(&mut self, event: OutboundEvent) {
        if matches!(event, OutboundEvent::Done) {
            warn!("Done is written by finish(), ignoring");
            return;
        }
        let record = match event.to_wire_record() {
            Ok(record) => record,
            Err(e) => {
                warn!(event_type = event.event_type(), error = %e, "failed to encode event, dropping");
                return;
            }
        };
        if self.write(Bytes::from(record)).await {
            self.emitted += 1;
        }
    }

    /// Write the terminal record.
    pub async fn finish(mut self) {
        self.write(Bytes::from_static(DONE_RECORD.as_bytes())).await;
    }

    async fn write(&mut self, record: Bytes) -> bool {
        if self.closed {
            return false;
        }
        if self.tx.send(record).await.is_err() {
            debug!("outbound channel closed, discarding remaining records");
            self.closed = true;
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn drain(mut rx: mpsc::Receiver<Bytes>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(b) = rx.recv().await {
            out.push(String::from_utf8(b.to_vec()).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn records_in_order_then_done() {
        let (mut emitter, rx) = EventEmitter::channel(16);
        emitter.emit(OutboundEvent::Content { content: "a".into() }).await;
        emitter
            .emit(OutboundEvent::ToolCall {
                tool: "calculate".into(),
                args: json!({"expression": "1+1"}),
            })
            .await;
        assert_eq!(emitter.emitted(), 2);
        emitter.finish().await;

        let records = drain(rx).await;
        assert_eq!(records.len(), 3);
        assert!(records[0].starts_with("data: {\"type\":\"content\""));
        assert!(records[1].contains("\"type\":\"tool_call\""));
        assert_eq!(records[2], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn done_cannot_be_emitted_directly() {
        let (mut emitter, rx) = EventEmitter::channel(4);
        emitter.emit(OutboundEvent::Done).await;
        emitter.finish().await;
        let records = drain(rx).await;
        assert_eq!(records, vec!["data: [DONE]\n\n"]);
    }

    #[tokio::test]
    async fn writes_after_disconnect_are_discarded() {
        let (mut emitter, rx) = EventEmitter::channel(4);
        drop(rx);
        assert!(emitter.is_closed());
        emitter.emit(OutboundEvent::Content { content: "lost".into() }).await;
        assert_eq!(emitter.emitted(), 0);
        emitter.finish().await;
    }
}
