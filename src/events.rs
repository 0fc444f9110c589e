use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;
use uuid::Uuid;

use crate::config::{EVENT_BUFFER_SIZE, EVENT_CHANNEL_CAPACITY};
use crate::suite::TestStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EngineEventKind {
    // Per-test
    TestRegistered {
        test_id: String,
    },
    TestStarted {
        test_id: String,
    },
    AwaitingConfirmation {
        test_id: String,
    },
    TestCompleted {
        test_id: String,
        status: TestStatus,
    },
    TestReset {
        test_id: String,
    },

    // Batch
    RunStarted {
        total: usize,
    },
    RunCompleted {
        completed: usize,
        total: usize,
    },
    AllTestsReset,

    // Reports
    ReportGenerated {
        report_id: Uuid,
        results: usize,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EngineEventKind,
}

impl EngineEvent {
    fn filter_category(&self) -> &'static str {
        match &self.kind {
            EngineEventKind::TestRegistered { .. }
            | EngineEventKind::TestStarted { .. }
            | EngineEventKind::AwaitingConfirmation { .. }
            | EngineEventKind::TestCompleted { .. }
            | EngineEventKind::TestReset { .. } => "test",

            EngineEventKind::RunStarted { .. }
            | EngineEventKind::RunCompleted { .. }
            | EngineEventKind::AllTestsReset => "run",

            EngineEventKind::ReportGenerated { .. } => "report",
        }
    }
}

/// Bounded history of engine events plus a live fan-out to subscribers.
pub struct EventLog {
    buffer: Arc<RwLock<VecDeque<EngineEvent>>>,
    sender: broadcast::Sender<EngineEvent>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(EVENT_BUFFER_SIZE))),
            sender,
        }
    }

    pub async fn emit(&self, kind: EngineEventKind) {
        let event = EngineEvent {
            timestamp: Utc::now(),
            kind,
        };

        let mut buf = self.buffer.write().await;
        if buf.len() >= EVENT_BUFFER_SIZE {
            buf.pop_front();
        }
        buf.push_back(event.clone());
        drop(buf);

        let _ = self.sender.send(event);
    }

    /// Most recent events first, optionally restricted to the `test`, `run`
    /// or `report` categories.
    pub async fn history(&self, limit: usize, filter: Option<&[String]>) -> Vec<EngineEvent> {
        let buf = self.buffer.read().await;
        let iter = buf.iter().rev();
        if let Some(filters) = filter {
            iter.filter(|e| {
                let category = e.filter_category();
                filters.iter().any(|f| f.as_str() == category)
            })
            .take(limit)
            .cloned()
            .collect()
        } else {
            iter.take(limit).cloned().collect()
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Live events as a stream. A lagging consumer skips what it missed.
    pub fn stream(&self) -> impl Stream<Item = EngineEvent> {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!("Event stream lagged, {} events dropped", n);
                None
            }
        })
    }
}
