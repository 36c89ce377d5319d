//! Per-request logging handle and pipeline observers.
//!
//! Every notable step of command processing and linkification is emitted through a
//! [`RequestContext`]. The context writes the record to the `log` facade, tagged with its
//! request id, and then hands the same record to each registered [`PipelineObserver`].
//! Callers build one context per request and pass it down explicitly.

use chrono::{DateTime, SecondsFormat, Utc};
use log::Level;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    VerboseEnabled,
    DebugEnabled,
    TickerDetected { ticker: String },
    TickerResolved { ticker: String, firm_id: String },
    TickerUnresolved { ticker: String },
    CommandsComplete { consumed_lines: usize },
    FocalFirmSet { ticker: String, firm_id: String },
    LinkifyStarted { ticker: String, firm_id: String, text_len: usize },
    LinkifySkipped { reason: String },
    MetricsLoaded { firm_id: String, count: usize },
    MetricsLookupFailed { firm_id: String, reason: String },
    MetricLinked { metric: String, matched: String, graph_id: String },
    LinkifyComplete { replacements: usize, output_len: usize },
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::VerboseEnabled => write!(f, "Verbose mode enabled."),
            PipelineEvent::DebugEnabled => {
                write!(f, "Debug mode enabled (verbose mode also enabled).")
            }
            PipelineEvent::TickerDetected { ticker } => {
                write!(f, "Ticker command detected: {}.", ticker)
            }
            PipelineEvent::TickerResolved { ticker, firm_id } => {
                write!(f, "OK: resolved {} to {}", ticker, firm_id)
            }
            PipelineEvent::TickerUnresolved { ticker } => {
                write!(f, "No identifier found for ticker {}.", ticker)
            }
            PipelineEvent::CommandsComplete { consumed_lines } => {
                write!(f, "Pre-chat commands consumed {} line(s)", consumed_lines)
            }
            PipelineEvent::FocalFirmSet { ticker, firm_id } => {
                write!(f, "Focal firm set to {} ({})", ticker, firm_id)
            }
            PipelineEvent::LinkifyStarted {
                ticker,
                firm_id,
                text_len,
            } => write!(
                f,
                "Starting linkification for {} ({}), input length {}",
                ticker, firm_id, text_len
            ),
            PipelineEvent::LinkifySkipped { reason } => {
                write!(f, "Linkification skipped: {}", reason)
            }
            PipelineEvent::MetricsLoaded { firm_id, count } => {
                write!(f, "Found {} metrics for firm {}", count, firm_id)
            }
            PipelineEvent::MetricsLookupFailed { firm_id, reason } => write!(
                f,
                "Metrics lookup failed for firm {}, returning original text: {}",
                firm_id, reason
            ),
            PipelineEvent::MetricLinked { metric, matched, .. } => {
                write!(f, "Replacing \"{}\" with link (metric \"{}\")", matched, metric)
            }
            PipelineEvent::LinkifyComplete {
                replacements,
                output_len,
            } => write!(
                f,
                "Linkification complete. Made {} replacements, output length {}",
                replacements, output_len
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub request_id: String,
    pub event: PipelineEvent,
}

/// Receives every record emitted through a [`RequestContext`], synchronously and in order.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, record: &PipelineRecord);
}

impl<F> PipelineObserver for F
where
    F: Fn(&PipelineRecord) + Send + Sync,
{
    fn on_event(&self, record: &PipelineRecord) {
        self(record)
    }
}

#[derive(Clone)]
pub struct RequestContext {
    request_id: String,
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            observers: Vec::new(),
        }
    }

    /// Context for work that is not tied to a chat request, such as report rendering.
    pub fn detached() -> Self {
        Self::new("-")
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn emit(&self, level: Level, event: PipelineEvent) {
        log::log!(level, "[{}] {}", self.request_id, event);

        if self.observers.is_empty() {
            return;
        }

        let record = PipelineRecord {
            timestamp: Utc::now(),
            level,
            request_id: self.request_id.clone(),
            event,
        };
        for observer in &self.observers {
            observer.on_event(&record);
        }
    }

    pub fn info(&self, event: PipelineEvent) {
        self.emit(Level::Info, event);
    }

    pub fn debug(&self, event: PipelineEvent) {
        self.emit(Level::Debug, event);
    }

    pub fn warn(&self, event: PipelineEvent) {
        self.emit(Level::Warn, event);
    }
}

/// Collects records as `<pre>` lines so a debug-mode reply can carry its own log.
#[derive(Debug, Default)]
pub struct TranscriptObserver {
    lines: Mutex<Vec<String>>,
}

impl TranscriptObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(record: &PipelineRecord) -> String {
        format!(
            "<pre>{} - {}: {}</pre>",
            record
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            record.level.as_str().to_uppercase(),
            record.event
        )
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl PipelineObserver for TranscriptObserver {
    fn on_event(&self, record: &PipelineRecord) {
        let line = Self::render(record);
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line);
    }
}

/// Keeps the raw events, mostly useful for assertions.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Mutex<Vec<PipelineEvent>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl PipelineObserver for EventCollector {
    fn on_event(&self, record: &PipelineRecord) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.event.clone());
    }
}
