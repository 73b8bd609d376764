//! Range, filter and tail queries over stored records
//!
//! [`LogQuery::scan`] turns a [`ScanRequest`] into a lazy stream of
//! `(OrderedKey, EventRecord)` pairs in ascending key order. The store is
//! read in batches of `batch_size`; each follow-up scan restarts at the last
//! key seen, and the [`QueryCursor`] drops that repeated boundary entry.
//! In tail mode the stream sleeps for `poll_interval` after every pass and
//! rescans from the cursor with no upper bound. It only ends when the
//! caller drops it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use dblog_store::{KeyRange, Store, StoreError};
use futures::{Stream, StreamExt};
use regex::Regex;
use tracing::{debug, trace, warn};

use crate::codec::EventCodec;
use crate::config::DbLogConfig;
use crate::error::{ConfigError, KeyError, QueryError};
use crate::key::OrderedKey;
use crate::record::EventRecord;

/// Pause between tail polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Entries requested per store scan
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// A batch must hold the repeated boundary entry plus at least one new one
const MIN_BATCH_SIZE: usize = 2;

/// Regular expression matched against the start of a record's message
#[derive(Clone)]
pub struct MessageFilter {
    pattern: String,
    regex: Regex,
}

impl MessageFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})"))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as given, without the start anchor
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, message: &str) -> bool {
        self.regex.is_match(message)
    }
}

impl fmt::Debug for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageFilter").field(&self.pattern).finish()
    }
}

impl FromStr for MessageFilter {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// What to read: an optional time window, an optional message filter and
/// whether to keep following new records
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    /// Earliest creation time, inclusive
    pub begin: Option<f64>,
    /// Latest creation time, inclusive at key resolution
    pub end: Option<f64>,
    pub filter: Option<MessageFilter>,
    pub tail: bool,
}

impl ScanRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(mut self, begin: f64) -> Self {
        self.begin = Some(begin);
        self
    }

    pub fn end(mut self, end: f64) -> Self {
        self.end = Some(end);
        self
    }

    /// Set both ends of the window; `None` leaves that side open
    pub fn window(mut self, begin: Option<f64>, end: Option<f64>) -> Self {
        self.begin = begin;
        self.end = end;
        self
    }

    pub fn filter(mut self, filter: MessageFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Compile `pattern` and use it as the message filter
    pub fn filter_pattern(self, pattern: &str) -> Result<Self, QueryError> {
        Ok(self.filter(MessageFilter::new(pattern)?))
    }

    pub fn tail(mut self, tail: bool) -> Self {
        self.tail = tail;
        self
    }

    /// Key range covering the window, or `None` when `begin` is after `end`
    pub fn key_range(&self) -> Result<Option<KeyRange>, KeyError> {
        if let (Some(begin), Some(end)) = (self.begin, self.end) {
            if begin > end {
                return Ok(None);
            }
        }

        let start = self
            .begin
            .map(OrderedKey::lower_bound)
            .transpose()?
            .map(|key| key.to_vec());
        let end = self
            .end
            .map(OrderedKey::upper_bound)
            .transpose()?
            .map(|key| key.to_vec());

        Ok(Some(KeyRange::new(start, end)))
    }
}

/// Last key observed by one scan
///
/// Holds raw bytes rather than a decoded key so an entry with a malformed
/// key still moves the cursor forward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryCursor {
    last: Option<Vec<u8>>,
}

impl QueryCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&[u8]> {
        self.last.as_deref()
    }

    /// The last key, if it was a well-formed one
    pub fn last_key(&self) -> Option<OrderedKey> {
        self.last.as_deref().and_then(|raw| OrderedKey::decode(raw).ok())
    }

    /// Record `key` as seen; false when it repeats the previous key
    pub fn observe(&mut self, key: &[u8]) -> bool {
        if self.last.as_deref() == Some(key) {
            return false;
        }
        self.last = Some(key.to_vec());
        true
    }

    /// Where the next scan starts: the last key, or `origin` before
    /// anything was seen
    fn resume_from(&self, origin: Option<&Vec<u8>>) -> Option<Vec<u8>> {
        self.last.clone().or_else(|| origin.cloned())
    }
}

/// Query engine over one table of a [`Store`]
#[derive(Clone)]
pub struct LogQuery {
    store: Arc<dyn Store>,
    table: String,
    poll_interval: Duration,
    batch_size: usize,
}

impl LogQuery {
    /// Create a query engine for `table`, setting the table up if needed
    pub async fn new(store: Arc<dyn Store>, table: impl Into<String>) -> Result<Self, StoreError> {
        let table = table.into();
        store
            .setup_namespace(&HashMap::from([(table.clone(), 1)]))
            .await?;

        Ok(Self {
            store,
            table,
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Open the configured store and create a query engine on it
    pub async fn from_config(config: &DbLogConfig) -> Result<Self, ConfigError> {
        let store = config.open_store()?;
        let query = Self::new(store, config.table_name.clone())
            .await?
            .with_poll_interval(config.poll_interval())
            .with_batch_size(config.scan_batch_size);
        Ok(query)
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Entries per store scan, raised to at least 2
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(MIN_BATCH_SIZE);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Stream the records selected by `request` in key order
    ///
    /// A store error is yielded once and ends the stream. Payloads that do
    /// not decode come back as synthetic records instead of errors.
    pub fn scan(
        &self,
        request: ScanRequest,
    ) -> impl Stream<Item = Result<(OrderedKey, EventRecord), QueryError>> + Send + 'static {
        let store = Arc::clone(&self.store);
        let table = self.table.clone();
        let poll_interval = self.poll_interval;
        let batch_size = self.batch_size;

        stream! {
            let mut range = match request.key_range() {
                Ok(Some(range)) => range,
                Ok(None) => {
                    debug!(begin = ?request.begin, end = ?request.end, "Empty query window");
                    return;
                }
                Err(e) => {
                    yield Err(QueryError::Key(e));
                    return;
                }
            };
            let origin = range.start.clone();
            let mut cursor = QueryCursor::new();

            loop {
                loop {
                    let entries = match store.scan(&table, &range, batch_size).await {
                        Ok(entries) => entries,
                        Err(e) => {
                            yield Err(QueryError::Store(e));
                            return;
                        }
                    };
                    trace!(count = entries.len(), "Scanned batch");
                    let full = entries.len() >= batch_size;

                    for (raw_key, payload) in entries {
                        if !cursor.observe(&raw_key) {
                            continue;
                        }
                        let key = match OrderedKey::decode(&raw_key) {
                            Ok(key) => key,
                            Err(e) => {
                                warn!(error = %e, key = %hex::encode(&raw_key), "Skipping entry with malformed key");
                                continue;
                            }
                        };

                        let record = EventCodec::deserialize_at(&payload, key.timestamp());
                        if let Some(filter) = &request.filter {
                            if !filter.matches(&record.message) {
                                continue;
                            }
                        }
                        yield Ok((key, record));
                    }

                    if !full {
                        break;
                    }
                    range = KeyRange::new(cursor.resume_from(origin.as_ref()), range.end.clone());
                }

                if !request.tail {
                    break;
                }
                tokio::time::sleep(poll_interval).await;
                range = KeyRange::new(cursor.resume_from(origin.as_ref()), None);
            }
        }
    }

    /// Delete one record, returning whether it existed
    pub async fn delete(&self, key: &OrderedKey) -> Result<bool, QueryError> {
        Ok(self.store.delete(&self.table, key.as_bytes()).await?)
    }

    /// Number of records a single pass of `request` returns
    pub async fn count(&self, request: ScanRequest) -> Result<usize, QueryError> {
        let mut stream = std::pin::pin!(self.scan(request.tail(false)));
        let mut count = 0;
        while let Some(item) = stream.next().await {
            item?;
            count += 1;
        }
        Ok(count)
    }
}
