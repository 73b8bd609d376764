//! `dblog query` and `dblog log`

use std::future::Future;
use std::io::{BufRead, Write};

use anyhow::Context;
use dblog::{
    DatabaseLogWriter, DbLogConfig, EmitOutcome, EventRecord, FixedWidthFormatter, LogQuery,
    QueryWindow, ScanRequest,
};
use futures::StreamExt;
use tracing::{debug, info};

use crate::config::{LogArgs, QueryArgs};

/// A parsed `dblog query` invocation
#[derive(Debug, Clone)]
pub struct QueryCommand {
    pub table: String,
    pub request: ScanRequest,
    pub clear: bool,
    pub assume_yes: bool,
}

impl QueryCommand {
    pub fn from_args(args: &QueryArgs, config: &DbLogConfig, now: f64) -> anyhow::Result<Self> {
        let window = QueryWindow::resolve(args.begin.as_deref(), args.end.as_deref(), args.past, now)?;
        let mut request = ScanRequest::new()
            .window(window.begin, window.end)
            .tail(args.tail);
        if let Some(pattern) = &args.filter {
            request = request
                .filter_pattern(pattern)
                .with_context(|| format!("bad --filter {pattern:?}"))?;
        }

        Ok(Self {
            table: args.table.clone().unwrap_or_else(|| config.table_name.clone()),
            request,
            clear: args.clear,
            assume_yes: args.yes,
        })
    }

    /// Ask before deleting; true when the user typed the table name
    fn confirm_clear<W: Write, R: BufRead>(&self, out: &mut W, input: &mut R) -> anyhow::Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        write!(
            out,
            "Delete all logs between {:?} and {:?} in {:?}?  Enter table name: ",
            self.request.begin, self.request.end, self.table
        )?;
        out.flush()?;

        let mut response = String::new();
        input.read_line(&mut response)?;
        Ok(response.trim_end_matches(['\r', '\n']) == self.table)
    }

    /// Print matching records and report how many there were
    ///
    /// Stops early when `cancel` completes, which is the only way a tailing
    /// query ends.
    pub async fn run<W, R, F>(
        &self,
        query: &LogQuery,
        out: &mut W,
        input: &mut R,
        cancel: F,
    ) -> anyhow::Result<usize>
    where
        W: Write,
        R: BufRead,
        F: Future<Output = ()>,
    {
        if self.clear {
            if !self.confirm_clear(out, input)? {
                writeln!(out, "not deleting anything")?;
                return Ok(0);
            }
            writeln!(
                out,
                "deleting logs between {:?} and {:?} in {:?}",
                self.request.begin, self.request.end, self.table
            )?;
        }

        let formatter = FixedWidthFormatter::new();
        let mut stream = std::pin::pin!(query.scan(self.request.clone()));
        let mut cancel = std::pin::pin!(cancel);
        let mut count = 0;

        loop {
            let item = tokio::select! {
                item = stream.next() => item,
                _ = &mut cancel => {
                    debug!("Query cancelled");
                    break;
                }
            };
            let Some(item) = item else { break };
            let (key, record) = item?;

            writeln!(out, "{}", formatter.format(&record))?;
            if self.clear {
                query.delete(&key).await?;
            }
            count += 1;
        }

        if count == 0 {
            writeln!(out, "no log records found")?;
        } else {
            writeln!(out, "returned {count} log records")?;
            if self.clear {
                writeln!(out, "and deleted all of them.")?;
            }
        }
        Ok(count)
    }
}

/// Store one record built from `dblog log` arguments
pub async fn log(writer: &DatabaseLogWriter, config: &DbLogConfig, args: &LogArgs) -> anyhow::Result<EmitOutcome> {
    let record = EventRecord::new(args.level, args.message.clone()).with_name(args.name.clone());
    let outcome = config.failure_policy.apply(writer.emit(record).await?)?;
    info!(key = %outcome.key(), table = writer.table(), "Stored log record");
    Ok(outcome)
}
