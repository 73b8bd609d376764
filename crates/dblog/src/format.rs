//! Fixed-column rendering of records
//!
//! Lines look like
//!
//! ```text
//! 2014-03-01 12:00:00.125 pid=4242  writer.rs:118     INFO     stored 12 records
//! ```
//!
//! The same formatter fills the `formatted` field at write time, prints
//! query results in the CLI and renders console output as a
//! `tracing_subscriber` event formatter.

use std::fmt;
use std::path::Path;

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::layer::record_from_event;
use crate::record::{EventRecord, datetime_from_secs};

/// Fixed-width record formatter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWidthFormatter {
    /// Width of the `file:line` column
    pub filename_width: usize,
    /// Width of the level column
    pub levelname_width: usize,
}

impl Default for FixedWidthFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedWidthFormatter {
    pub fn new() -> Self {
        Self {
            filename_width: 17,
            levelname_width: 8,
        }
    }

    /// `file:line`, file name cut so the pair fits the column
    pub fn filename_lineno(&self, record: &EventRecord) -> String {
        let filename = record
            .file
            .as_deref()
            .map(|file| {
                Path::new(file)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.to_string())
            })
            .unwrap_or_else(|| "?".to_string());
        let lineno = record.line.unwrap_or(0).to_string();

        let max_filename = self.filename_width.saturating_sub(3 + lineno.len());
        let filename: String = filename.chars().take(max_filename).collect();

        format!(
            "{:<width$}",
            format!("{filename}:{lineno}"),
            width = self.filename_width
        )
    }

    /// Render one record, appending its exception trace if present
    pub fn format(&self, record: &EventRecord) -> String {
        let asctime = match datetime_from_secs(record.created) {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            None => format!("{}", record.created),
        };

        let mut line = format!(
            "{:<23} pid={:<5} {} {:<width$} {}",
            asctime,
            record.pid,
            self.filename_lineno(record),
            record.level.as_str(),
            record.message,
            width = self.levelname_width
        );

        if !record.exc_text.is_empty() {
            line.push('\n');
            line.push_str(&record.exc_text);
        }

        line
    }
}

impl<S, N> FormatEvent<S, N> for FixedWidthFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut record = record_from_event(event);
        if let Some(exception) = &record.exception {
            record.exc_text = exception.format_trace();
        }
        writeln!(writer, "{}", self.format(&record))
    }
}
