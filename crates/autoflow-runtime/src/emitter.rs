// crates/autoflow-runtime/src/emitter.rs

use crate::channel::ChannelSender;
use autoflow_core::{into_payload, EventKind, EventMessage, Payload, RunId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Stamps events with the run id and the next sequence number and pushes
/// them onto the event queue.
///
/// Shared by the runner loop and the heartbeat task. Sequence allocation and
/// enqueueing happen under one lock, so queue order always matches `seq`
/// order. Events that cannot be enqueued are dropped and counted.
#[derive(Clone)]
pub struct EventEmitter {
    inner: Arc<EmitterInner>,
}

struct EmitterInner {
    run_id: RunId,
    sender: ChannelSender<EventMessage>,
    seq: Mutex<u64>,
    last_seq: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl EventEmitter {
    pub fn new(run_id: RunId, sender: ChannelSender<EventMessage>) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                run_id,
                sender,
                seq: Mutex::new(0),
                last_seq: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.inner.run_id
    }

    /// Emit one event. Returns its sequence number if it was enqueued.
    ///
    /// Never fails: a full or closed queue costs the event, not the run.
    pub async fn emit(&self, kind: EventKind, data: Payload) -> Option<u64> {
        let mut seq = self.inner.seq.lock().await;
        *seq += 1;
        let this_seq = *seq;
        self.inner.last_seq.store(this_seq, Ordering::SeqCst);

        let message = EventMessage::new(kind, this_seq, Some(self.inner.run_id), data);
        match self.inner.sender.put(message).await {
            Ok(()) => {
                self.inner.delivered.fetch_add(1, Ordering::Relaxed);
                Some(this_seq)
            }
            Err(e) => {
                let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    "Dropped {} event (seq {}): {} [{} dropped so far]",
                    kind,
                    this_seq,
                    e,
                    dropped
                );
                None
            }
        }
    }

    /// Emit with a `json!({...})` payload.
    pub async fn emit_json(&self, kind: EventKind, data: serde_json::Value) -> Option<u64> {
        self.emit(kind, into_payload(data)).await
    }

    /// Highest sequence number handed out so far, delivered or not.
    pub fn last_seq(&self) -> u64 {
        self.inner.last_seq.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}
