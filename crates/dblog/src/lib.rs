//! # dblog
//!
//! Time-ordered structured log storage on an ordered key-value store.
//!
//! Records are written under 16-byte [`OrderedKey`]s whose byte order is
//! their time order, so a range scan over keys is a time-range query. The
//! [`LogQuery`] engine turns those scans into a lazy stream with optional
//! message filtering and a polling tail mode.
//!
//! # Features
//!
//! - **Graceful writes**: a record that cannot be encoded is replaced by a
//!   diagnostic payload, never dropped
//! - **Robust reads**: corrupt payloads decode to synthetic records instead
//!   of aborting a scan
//! - **Tail mode**: follow new records as they are written
//! - **tracing integration**: [`StoreLayer`] forwards events from any
//!   `tracing` subscriber into the store
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use dblog::{DatabaseLogWriter, EventRecord, Level, LogQuery, ScanRequest};
//! use dblog_store::InMemoryStore;
//! use futures::TryStreamExt;
//!
//! let store = Arc::new(InMemoryStore::new());
//! let writer = DatabaseLogWriter::new(store.clone(), "log").await?;
//! writer.emit(EventRecord::new(Level::Info, "copied {} files").with_arg(12)).await?;
//!
//! let query = LogQuery::new(store, "log").await?;
//! let records: Vec<_> = query.scan(ScanRequest::new()).try_collect().await?;
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod key;
pub mod layer;
pub mod query;
pub mod record;
pub mod subscriber;
pub mod timestamp;
pub mod writer;

pub use codec::{EventCodec, SerializeResult};
pub use config::{
    ConsoleConfig, DbLogConfig, FileConfig, LoggingConfig, RotationStrategy, StoreConfig,
};
pub use error::{
    ConfigError, InitError, InterpolateError, KeyError, QueryError, TimestampError, WriteError,
};
pub use format::FixedWidthFormatter;
pub use key::OrderedKey;
pub use layer::{SinkHandle, SinkReport, StoreLayer};
pub use query::{LogQuery, MessageFilter, QueryCursor, ScanRequest};
pub use record::{EventRecord, ExceptionInfo, FieldValue, Level};
pub use subscriber::DbLogSubscriberBuilder;
pub use timestamp::{QueryWindow, complete_zulu_timestamp, parse_zulu_timestamp};
pub use writer::{DatabaseLogWriter, EmitOutcome, FailurePolicy};
