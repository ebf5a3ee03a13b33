//! Shared test helpers: in-memory transport and recorders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc::{self, UnboundedSender};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;

use ids_stream::{
    ConnectionState, Connector, EventKind, EventRouter, FrameStream, StreamError, StreamResult,
};

pub type FrameSender = UnboundedSender<StreamResult<String>>;

enum Outcome {
    Accept(FrameStream),
    AcceptAfter(Duration, FrameStream),
    Refuse,
}

/// Scripted connector; unscripted attempts are refused
#[derive(Default)]
pub struct MockConnector {
    attempts: AtomicUsize,
    script: Mutex<VecDeque<Outcome>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Next attempt succeeds; frames are fed through the returned sender
    pub fn accept(&self) -> FrameSender {
        let (tx, rx) = mpsc::unbounded();
        self.script.lock().push_back(Outcome::Accept(rx.boxed()));
        tx
    }

    /// Next attempt succeeds only after `delay`
    pub fn accept_after(&self, delay: Duration) -> FrameSender {
        let (tx, rx) = mpsc::unbounded();
        self.script.lock().push_back(Outcome::AcceptAfter(delay, rx.boxed()));
        tx
    }

    pub fn refuse(&self) {
        self.script.lock().push_back(Outcome::Refuse);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(&self, _url: &str) -> BoxFuture<'static, StreamResult<FrameStream>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self.script.lock().pop_front();

        async move {
            match outcome {
                Some(Outcome::Accept(frames)) => Ok(frames),
                Some(Outcome::AcceptAfter(delay, frames)) => {
                    tokio::time::sleep(delay).await;
                    Ok(frames)
                }
                Some(Outcome::Refuse) | None => {
                    Err(StreamError::Transport("connection refused".to_string()))
                }
            }
        }
        .boxed()
    }
}

/// Records every connection state dispatched through a router
pub fn record_states(router: &EventRouter) -> Arc<Mutex<Vec<ConnectionState>>> {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    router.subscribe(EventKind::Connection, move |event| {
        if let Some(state) = event.as_connection() {
            sink.lock().push(state);
        }
        Ok(())
    });
    states
}

/// Let spawned tasks run without reaching any multi-second timer
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn detection_frame(flow_id: &str, prediction: &str, is_attack: bool, timestamp: &str) -> String {
    serde_json::json!({
        "event_type": "detection",
        "data": {
            "flow_id": flow_id,
            "timestamp": timestamp,
            "src_ip": "192.168.64.5",
            "src_port": 51515,
            "dst_ip": "192.168.64.2",
            "dst_port": 22,
            "protocol": "TCP",
            "packet_count": 12,
            "byte_count": 1480,
            "prediction": prediction,
            "confidence": 0.92,
            "is_attack": is_attack
        }
    })
    .to_string()
}
