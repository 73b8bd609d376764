//! The stored event record
//!
//! An [`EventRecord`] has a fixed set of well-known fields plus one
//! extension map for anything else a front end wants to attach. Values in
//! the extension map are [`FieldValue`]s, so every record has a total,
//! typed serialization.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InterpolateError;

/// Severity of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(Level::Trace),
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" | "FATAL" => Ok(Level::Critical),
            other => Err(format!("unknown level {other:?}")),
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// A single structured value
///
/// `Display` carries the string form of anything that is not a primitive,
/// such as a type name or a `Debug` rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Display(String),
}

impl FieldValue {
    /// String form of any displayable value
    pub fn display(value: impl fmt::Display) -> Self {
        FieldValue::Display(value.to_string())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::UInt(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Str(v) | FieldValue::Display(v) => f.write_str(v),
            FieldValue::Bytes(v) => write!(f, "b\"{}\"", v.escape_ascii()),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v.into())
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::UInt(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::UInt(v.into())
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

/// Structured error detail attached to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    /// Error type name, or the field name it was recorded under
    pub kind: String,
    /// Top-level error message
    pub message: String,
    /// Messages of the source chain, outermost first
    pub chain: Vec<String>,
}

impl ExceptionInfo {
    /// Capture a typed error and its source chain
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        Self::from_dyn(std::any::type_name::<E>(), err)
    }

    /// Capture an untyped error under the given kind
    pub fn from_dyn(kind: impl Into<String>, err: &dyn std::error::Error) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind: kind.into(),
            message: err.to_string(),
            chain,
        }
    }

    /// Multi-line rendering used for `exc_text`
    pub fn format_trace(&self) -> String {
        let mut text = format!("{}: {}", self.kind, self.message);
        for cause in &self.chain {
            text.push_str("\n  caused by: ");
            text.push_str(cause);
        }
        text
    }
}

/// One stored log event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Creation time, seconds since the epoch
    pub created: f64,
    /// Human-readable `created`, filled in at write time
    #[serde(default)]
    pub humantime: String,
    pub level: Level,
    /// Logger name or tracing target
    #[serde(default)]
    pub name: String,
    /// Message template before finalization, final text after
    pub message: String,
    /// Positional arguments for `{}` placeholders in `message`
    #[serde(skip)]
    pub args: Vec<FieldValue>,
    /// Fixed-width rendering, filled in at write time
    #[serde(default)]
    pub formatted: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
    /// Formatted trace of `exception`, empty when there is none
    #[serde(default)]
    pub exc_text: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub extra: BTreeMap<String, FieldValue>,
}

/// Current time as fractional seconds since the epoch
pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Convert fractional epoch seconds to a UTC datetime
pub fn datetime_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let micros = (secs * 1_000_000.0).round();
    if micros < i64::MIN as f64 || micros >= i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_micros(micros as i64)
}

impl EventRecord {
    /// Create a record stamped with the current time and process id
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            created: now_secs(),
            humantime: String::new(),
            level,
            name: String::new(),
            message: message.into(),
            args: Vec::new(),
            formatted: String::new(),
            exception: None,
            exc_text: String::new(),
            file: None,
            line: None,
            pid: std::process::id(),
            extra: BTreeMap::new(),
        }
    }

    /// Override the creation time
    pub fn at(mut self, created: f64) -> Self {
        self.created = created;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_arg(mut self, arg: impl Into<FieldValue>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, V>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// `humantime` for the record's creation time
    pub fn format_humantime(&self) -> String {
        match datetime_from_secs(self.created) {
            Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            None => format!("invalid-time({})", self.created),
        }
    }
}

/// Substitute `{}` placeholders in `template` with `args`, in order
///
/// `{{` and `}}` produce literal braces. Every argument has to be used.
pub fn interpolate(template: &str, args: &[FieldValue]) -> Result<String, InterpolateError> {
    let mut out = String::with_capacity(template.len());
    let mut next_arg = 0;
    let mut chars = template.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        match c {
            '{' => match chars.peek() {
                Some((_, '{')) => {
                    chars.next();
                    out.push('{');
                }
                Some((_, '}')) => {
                    chars.next();
                    let arg = args
                        .get(next_arg)
                        .ok_or(InterpolateError::MissingArgument { given: args.len() })?;
                    out.push_str(&arg.to_string());
                    next_arg += 1;
                }
                _ => return Err(InterpolateError::UnmatchedBrace { brace: '{', position }),
            },
            '}' => match chars.peek() {
                Some((_, '}')) => {
                    chars.next();
                    out.push('}');
                }
                _ => return Err(InterpolateError::UnmatchedBrace { brace: '}', position }),
            },
            other => out.push(other),
        }
    }

    if next_arg != args.len() {
        return Err(InterpolateError::UnusedArguments {
            used: next_arg,
            given: args.len(),
        });
    }

    Ok(out)
}
