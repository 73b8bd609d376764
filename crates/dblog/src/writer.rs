//! Write path
//!
//! [`DatabaseLogWriter::emit`] finalizes a record, keys it by its creation
//! time and performs exactly one `put`. A record that cannot be encoded is
//! never dropped: a diagnostic payload is written under its key instead and
//! the outcome says so, leaving the caller to apply its [`FailurePolicy`].

use std::collections::HashMap;
use std::sync::Arc;

use dblog_store::{Store, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::codec::{EventCodec, SerializeResult};
use crate::config::DbLogConfig;
use crate::error::{ConfigError, WriteError};
use crate::format::FixedWidthFormatter;
use crate::key::OrderedKey;
use crate::record::{EventRecord, interpolate, now_secs};

/// What the owner of a writer does after a diagnostic payload was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Treat the logging path as broken and stop the process
    #[default]
    Exit,
    /// Report the diagnostic and keep logging
    Continue,
}

impl FailurePolicy {
    /// Turn a fallback outcome into `WriteError::Fatal` under `Exit`
    pub fn apply(self, outcome: EmitOutcome) -> Result<EmitOutcome, WriteError> {
        match (self, outcome) {
            (FailurePolicy::Exit, EmitOutcome::Fallback { key, diagnostic }) => {
                Err(WriteError::Fatal { key, diagnostic })
            }
            (_, outcome) => Ok(outcome),
        }
    }
}

/// Result of a successful `put`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The record was stored in its normal encoding
    Stored(OrderedKey),
    /// A diagnostic payload was stored in place of the record
    Fallback { key: OrderedKey, diagnostic: String },
}

impl EmitOutcome {
    pub fn key(&self) -> OrderedKey {
        match self {
            EmitOutcome::Stored(key) | EmitOutcome::Fallback { key, .. } => *key,
        }
    }

    /// True when the logging path can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, EmitOutcome::Fallback { .. })
    }
}

/// Writes records into one table of a [`Store`]
pub struct DatabaseLogWriter {
    store: Arc<dyn Store>,
    table: String,
    codec: EventCodec,
    formatter: FixedWidthFormatter,
}

impl DatabaseLogWriter {
    /// Create a writer for `table`, setting the table up if needed
    pub async fn new(store: Arc<dyn Store>, table: impl Into<String>) -> Result<Self, StoreError> {
        Self::with_codec(store, table, EventCodec::default()).await
    }

    /// Create a writer with a specific codec
    #[instrument(skip_all, fields(table = tracing::field::Empty))]
    pub async fn with_codec(
        store: Arc<dyn Store>,
        table: impl Into<String>,
        codec: EventCodec,
    ) -> Result<Self, StoreError> {
        let table = table.into();
        tracing::Span::current().record("table", table.as_str());

        store
            .setup_namespace(&HashMap::from([(table.clone(), 1)]))
            .await?;
        debug!("Log writer ready");

        Ok(Self {
            store,
            table,
            codec,
            formatter: FixedWidthFormatter::new(),
        })
    }

    /// Open the configured store and create a writer on it
    ///
    /// Fails with [`ConfigError::MissingStore`] when the configuration has
    /// no store section.
    pub async fn from_config(config: &DbLogConfig) -> Result<Self, ConfigError> {
        let store = config.open_store()?;
        Ok(Self::with_codec(store, config.table_name.clone(), config.codec()).await?)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Interpolate the message and fill the derived display fields,
    /// returning a description of anything that went wrong
    fn finalize(&self, record: &mut EventRecord) -> Vec<String> {
        let mut failures = Vec::new();

        if !record.args.is_empty() {
            match interpolate(&record.message, &record.args) {
                Ok(text) => {
                    record.message = text;
                    record.args.clear();
                }
                Err(e) => {
                    failures.push("failed to run string formatting on provided args".to_string());
                    failures.push(format!("reason: {e}"));
                }
            }
        }

        record.humantime = record.format_humantime();
        record.exc_text = record
            .exception
            .as_ref()
            .map(|exception| exception.format_trace())
            .unwrap_or_default();
        record.formatted = self.formatter.format(record);

        failures
    }

    /// Store one record
    pub async fn emit(&self, mut record: EventRecord) -> Result<EmitOutcome, WriteError> {
        let mut failures = self.finalize(&mut record);

        let key = match OrderedKey::encode(record.created, None, None) {
            Ok(key) => key,
            Err(e) => {
                failures.push(format!("failed to build a key from the record time: {e}"));
                OrderedKey::encode(now_secs(), None, None)?
            }
        };

        let encoded = if failures.is_empty() {
            self.codec.serialize(&record)
        } else {
            SerializeResult::Fallback(EventCodec::fallback_payload(&record, &failures))
        };

        let diagnostic = encoded.diagnostic();
        self.store
            .put(&self.table, key.as_bytes(), encoded.as_bytes())
            .await?;

        match diagnostic {
            None => {
                debug!(%key, "Stored log record");
                Ok(EmitOutcome::Stored(key))
            }
            Some(diagnostic) => {
                warn!(%key, "Stored diagnostic payload in place of a log record");
                Ok(EmitOutcome::Fallback { key, diagnostic })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use dblog_store::InMemoryStore;

    use super::*;
    use crate::codec::FALLBACK_RECORD_NAME;
    use crate::record::{ExceptionInfo, FieldValue, Level};

    async fn writer() -> (Arc<InMemoryStore>, DatabaseLogWriter) {
        let store = Arc::new(InMemoryStore::new());
        let writer = DatabaseLogWriter::new(store.clone(), "log").await.unwrap();
        (store, writer)
    }

    async fn stored(store: &InMemoryStore, key: &OrderedKey) -> EventRecord {
        let payload = store.get("log", key.as_bytes()).await.unwrap().unwrap();
        EventCodec::deserialize(&payload)
    }

    #[tokio::test]
    async fn test_emit_single_put() {
        let (store, writer) = writer().await;
        let record = EventRecord::new(Level::Info, "copied {} files to {}")
            .at(1_000_000.5)
            .with_args([FieldValue::from(12), FieldValue::from("/backup")]);

        let outcome = writer.emit(record).await.unwrap();
        assert!(!outcome.is_fatal());
        assert_eq!(store.len("log"), 1);

        let key = outcome.key();
        assert_eq!(key.timestamp(), 1_000_000.5);

        let decoded = stored(&store, &key).await;
        assert_eq!(decoded.message, "copied 12 files to /backup");
        assert!(decoded.args.is_empty());
        assert_eq!(decoded.humantime, "1970-01-12T13:46:40.500Z");
        assert!(decoded.formatted.ends_with("copied 12 files to /backup"));
    }

    #[tokio::test]
    async fn test_exception_text_is_derived() {
        let (store, writer) = writer().await;
        let record = EventRecord::new(Level::Error, "upload failed").with_exception(ExceptionInfo {
            kind: "io::Error".into(),
            message: "connection reset".into(),
            chain: vec!["peer closed".into()],
        });

        let outcome = writer.emit(record).await.unwrap();
        let decoded = stored(&store, &outcome.key()).await;
        assert_eq!(
            decoded.exc_text,
            "io::Error: connection reset\n  caused by: peer closed"
        );
    }

    #[tokio::test]
    async fn test_bad_args_write_fallback() {
        let (store, writer) = writer().await;
        let record = EventRecord::new(Level::Info, "{} {} {}").with_arg(1);

        let outcome = writer.emit(record).await.unwrap();
        assert!(outcome.is_fatal());
        assert_eq!(store.len("log"), 1);

        let decoded = stored(&store, &outcome.key()).await;
        assert_eq!(decoded.level, Level::Critical);
        assert_eq!(decoded.name, FALLBACK_RECORD_NAME);
        assert!(decoded.message.contains("failed to run string formatting"));
        assert!(decoded.message.contains("record.args"));
    }

    #[tokio::test]
    async fn test_unkeyable_time_still_written() {
        let (store, writer) = writer().await;
        let record = EventRecord::new(Level::Info, "from the far future").at(1e300);

        let outcome = writer.emit(record).await.unwrap();
        assert!(outcome.is_fatal());
        assert_eq!(store.len("log"), 1);
        if let EmitOutcome::Fallback { diagnostic, .. } = outcome {
            assert!(diagnostic.contains("from the far future"));
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let (store, writer) = writer().await;
        store.set_available(false);

        let err = writer
            .emit(EventRecord::new(Level::Info, "nowhere to go"))
            .await
            .unwrap_err();
        assert!(matches!(err, WriteError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_repeated_construction_is_safe() {
        let store = Arc::new(InMemoryStore::new());
        let first = DatabaseLogWriter::new(store.clone(), "log").await.unwrap();
        first.emit(EventRecord::new(Level::Info, "one")).await.unwrap();

        let second = DatabaseLogWriter::new(store.clone(), "log").await.unwrap();
        second.emit(EventRecord::new(Level::Info, "two")).await.unwrap();
        assert_eq!(store.len("log"), 2);
    }

    #[test]
    fn test_failure_policy() {
        let key = OrderedKey::encode(1.0, Some(0), Some(0)).unwrap();
        let fallback = EmitOutcome::Fallback {
            key,
            diagnostic: "boom".into(),
        };

        assert!(matches!(
            FailurePolicy::Exit.apply(fallback.clone()),
            Err(WriteError::Fatal { .. })
        ));
        assert_eq!(
            FailurePolicy::Continue.apply(fallback.clone()).unwrap(),
            fallback
        );
        assert!(FailurePolicy::Exit.apply(EmitOutcome::Stored(key)).is_ok());
    }

    #[tokio::test]
    async fn test_from_config_requires_store() {
        let config = DbLogConfig::default();
        assert!(matches!(
            DatabaseLogWriter::from_config(&config).await,
            Err(ConfigError::MissingStore)
        ));
    }
}
