// src/weblog.rs - bounded in-memory log ring for UI delta polling
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::json;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

pub const LEVEL_INFO: u8 = 0;
pub const LEVEL_WARN: u8 = 1;
pub const LEVEL_ERROR: u8 = 2;

const MAX_LOGS: usize = 128;
const MAX_SEND: usize = 50;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub seq: u32,
    pub ms: u64,
    pub level: u8,
    pub msg: String,
}

/// Ring of the most recent log lines, shared with the UI layer.
///
/// The sequence counter is atomic so a poller can remember the last sequence
/// it saw and fetch only newer entries with `to_json_after`.
#[derive(Debug)]
pub struct WebLog {
    entries: Mutex<VecDeque<LogEntry>>,
    seq: AtomicU32,
    started: Instant,
}

impl WebLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(VecDeque::with_capacity(MAX_LOGS)),
            seq: AtomicU32::new(0),
            started: Instant::now(),
        })
    }

    pub fn push(&self, level: u8, msg: impl Into<String>) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = LogEntry {
            seq,
            ms: self.started.elapsed().as_millis() as u64,
            level,
            msg: msg.into(),
        };
        let mut entries = self.entries.lock().unwrap();
        if entries.len() == MAX_LOGS {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn last_seq(&self) -> u32 {
        self.seq.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn entry_json(entry: &LogEntry) -> serde_json::Value {
        json!({
            "seq": entry.seq,
            "ms": entry.ms,
            "level": entry.level,
            "msg": entry.msg,
        })
    }

    /// Newest-first dump of up to `MAX_SEND` entries.
    pub fn to_json(&self) -> serde_json::Value {
        let entries = self.entries.lock().unwrap();
        let logs: Vec<_> = entries.iter().rev().take(MAX_SEND).map(Self::entry_json).collect();
        json!({
            "total": entries.len(),
            "sent": logs.len(),
            "lastSeq": self.last_seq(),
            "logs": logs,
        })
    }

    /// Newest-first dump of entries with a sequence above `after_seq`.
    pub fn to_json_after(&self, after_seq: u32) -> serde_json::Value {
        let entries = self.entries.lock().unwrap();
        let logs: Vec<_> = entries
            .iter()
            .rev()
            .take_while(|e| e.seq > after_seq)
            .take(MAX_SEND)
            .map(Self::entry_json)
            .collect();
        json!({
            "total": entries.len(),
            "sent": logs.len(),
            "lastSeq": self.last_seq(),
            "logs": logs,
        })
    }
}

/// `tracing` layer mirroring INFO and above into a `WebLog` ring, so every
/// component logs through the ordinary macros and the UI still gets its
/// delta feed.
pub struct WebLogLayer {
    log: Arc<WebLog>,
}

impl WebLogLayer {
    pub fn new(log: Arc<WebLog>) -> Self {
        Self { log }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let rendered = format!("{value:?}");
            if self.message.is_empty() {
                self.message = rendered;
            } else {
                self.message = format!("{rendered} {}", self.message);
            }
        } else {
            if !self.message.is_empty() {
                self.message.push(' ');
            }
            self.message
                .push_str(&format!("{}={:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for WebLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::INFO {
            return; // DEBUG/TRACE stay out of the UI ring
        }
        let mapped = if level == Level::ERROR {
            LEVEL_ERROR
        } else if level == Level::WARN {
            LEVEL_WARN
        } else {
            LEVEL_INFO
        };
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.log.push(mapped, visitor.message);
    }
}
