//! tracing integration
//!
//! [`StoreLayer`] is a `tracing_subscriber` layer that turns every event it
//! sees into an [`EventRecord`] and hands it to a single background worker
//! owning a [`DatabaseLogWriter`]. The application builds the layer, adds it
//! to its subscriber and keeps the returned [`SinkHandle`] to flush or shut
//! the worker down.
//!
//! Events from dblog itself and from the storage engine are skipped so the
//! sink never writes about its own writes.

use std::fmt;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber, warn};
use tracing_subscriber::layer::{Context, Layer};

use crate::error::WriteError;
use crate::record::{EventRecord, ExceptionInfo, FieldValue, Level};
use crate::writer::{DatabaseLogWriter, EmitOutcome, FailurePolicy};

/// Exit status used when the failure policy stops the process
pub const FATAL_EXIT_CODE: i32 = 1;

/// Targets never forwarded to the store
pub const DEFAULT_IGNORED_TARGETS: &[&str] = &["dblog", "redb"];

/// Collects the fields of one tracing event into a record
struct RecordVisitor<'a> {
    record: &'a mut EventRecord,
}

impl RecordVisitor<'_> {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        if field.name() == "message" {
            self.record.message = value.to_string();
        } else {
            self.record.extra.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for RecordVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, FieldValue::Float(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, FieldValue::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, FieldValue::UInt(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, FieldValue::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, FieldValue::Str(value.to_string()));
    }

    fn record_bytes(&mut self, field: &Field, value: &[u8]) {
        self.insert(field, FieldValue::Bytes(value.to_vec()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record.exception = Some(ExceptionInfo::from_dyn(field.name(), value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, FieldValue::Display(format!("{value:?}")));
    }
}

/// Build a record from a tracing event
///
/// The `message` field becomes the record message; every other field goes
/// into `extra`. A field recorded as `&dyn Error` becomes the record's
/// exception.
pub fn record_from_event(event: &Event<'_>) -> EventRecord {
    let metadata = event.metadata();
    let mut record = EventRecord::new(Level::from(*metadata.level()), String::new())
        .with_name(metadata.target());
    record.file = metadata.file().map(str::to_string);
    record.line = metadata.line();

    event.record(&mut RecordVisitor {
        record: &mut record,
    });
    record
}

enum SinkMessage {
    Record(EventRecord),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Counters reported by the sink worker when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    /// Records written normally
    pub stored: u64,
    /// Diagnostic payloads written in place of records
    pub fallbacks: u64,
    /// Records the store refused
    pub failed: u64,
}

/// Layer forwarding tracing events to the store worker
pub struct StoreLayer {
    sender: mpsc::UnboundedSender<SinkMessage>,
    ignored_targets: Vec<String>,
}

/// Handle on the background worker behind a [`StoreLayer`]
pub struct SinkHandle {
    sender: mpsc::UnboundedSender<SinkMessage>,
    worker: JoinHandle<SinkReport>,
}

impl StoreLayer {
    /// Start the worker on the current tokio runtime and return the layer
    /// feeding it
    pub fn spawn(writer: DatabaseLogWriter, policy: FailurePolicy) -> (Self, SinkHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(writer, policy, receiver));

        let layer = Self {
            sender: sender.clone(),
            ignored_targets: DEFAULT_IGNORED_TARGETS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        };

        (layer, SinkHandle { sender, worker })
    }

    /// Skip events from `target` and its submodules (`target::*`)
    pub fn ignore_target(mut self, target: impl Into<String>) -> Self {
        self.ignored_targets.push(target.into());
        self
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_targets.iter().any(|ignored| {
            target
                .strip_prefix(ignored.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
        })
    }
}

impl<S: Subscriber> Layer<S> for StoreLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if self.is_ignored(event.metadata().target()) {
            return;
        }

        let record = record_from_event(event);
        if let Err(mpsc::error::SendError(SinkMessage::Record(record))) =
            self.sender.send(SinkMessage::Record(record))
        {
            // The worker is gone; stderr is the only place left
            eprintln!(
                "dblog: sink stopped, record not stored: [{}] {} {}",
                record.level, record.name, record.message
            );
        }
    }
}

impl SinkHandle {
    /// Wait until every record sent before this call has been written
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(SinkMessage::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Write everything queued so far, stop the worker and report
    pub async fn shutdown(self) -> SinkReport {
        let _ = self.sender.send(SinkMessage::Shutdown);
        self.worker.await.unwrap_or_default()
    }
}

async fn run_worker(
    writer: DatabaseLogWriter,
    policy: FailurePolicy,
    mut receiver: mpsc::UnboundedReceiver<SinkMessage>,
) -> SinkReport {
    let mut report = SinkReport::default();

    while let Some(message) = receiver.recv().await {
        match message {
            SinkMessage::Record(record) => match writer.emit(record).await {
                Ok(EmitOutcome::Stored(_)) => report.stored += 1,
                Ok(outcome) => {
                    report.fallbacks += 1;
                    match policy.apply(outcome) {
                        Err(WriteError::Fatal { key, diagnostic }) => {
                            eprintln!(
                                "dblog: logging failed, diagnostic stored under {key}; \
                                 shutting down\n{diagnostic}"
                            );
                            std::process::exit(FATAL_EXIT_CODE);
                        }
                        Ok(outcome) => {
                            warn!(key = %outcome.key(), "Stored diagnostic payload in place of a log record");
                        }
                        Err(other) => warn!(error = %other, "Unexpected failure policy result"),
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    eprintln!("dblog: failed to store log record: {err}");
                }
            },
            SinkMessage::Flush(ack) => {
                let _ = ack.send(());
            }
            // Refuse new messages but drain what is already queued
            SinkMessage::Shutdown => receiver.close(),
        }
    }

    report
}
