use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dblog::Level;

#[derive(Parser, Debug)]
#[command(name = "dblog", about = "Write and query log records stored in a database")]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Produce more output (repeatable)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Produce less output (repeatable)
    #[arg(long, short = 'q', action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Enable debug logging for a specific target (repeatable)
    #[arg(long, value_name = "TARGET", global = true)]
    pub debug: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Retrieve stored log records
    Query(QueryArgs),
    /// Store one log record
    Log(LogArgs),
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Only show records at or after this time (YYYY-MM-DDTHH:MM:SS.ffffffZ,
    /// truncated at any depth)
    #[arg(long)]
    pub begin: Option<String>,

    /// Only show records at or before this time
    #[arg(long)]
    pub end: Option<String>,

    /// Show the most recent N seconds of records. If negative, scan from
    /// the earliest record up to N seconds ago
    #[arg(long, value_name = "N", default_value_t = 60, allow_negative_numbers = true)]
    pub past: i64,

    /// Only show records whose message starts with a match of this regex
    #[arg(long)]
    pub filter: Option<String>,

    /// Keep polling for new records
    #[arg(long)]
    pub tail: bool,

    /// Delete every record returned
    #[arg(long)]
    pub clear: bool,

    /// Assume "yes" and skip confirmation questions
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Table to read (overrides the configuration)
    #[arg(long)]
    pub table: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Severity (trace, debug, info, warning, error, critical)
    #[arg(long, short = 'l', default_value = "info")]
    pub level: Level,

    /// Logger name stored with the record
    #[arg(long, default_value = "dblog-cli")]
    pub name: String,

    /// Table to write (overrides the configuration)
    #[arg(long)]
    pub table: Option<String>,

    /// Message text
    pub message: String,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_query_defaults() {
        let cli = Cli::try_parse_from(["dblog", "query"]).unwrap();
        let Command::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(args.past, 60);
        assert!(!args.clear);
        assert!(!args.yes);
        assert!(args.begin.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_query_flags() {
        let cli = Cli::try_parse_from([
            "dblog", "-vv", "--debug", "dblog::query", "query", "--begin", "2014-03",
            "--past", "-30", "--filter", "disk", "--clear", "-y", "--table", "events",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.debug, vec!["dblog::query"]);
        let Command::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(args.begin.as_deref(), Some("2014-03"));
        assert_eq!(args.past, -30);
        assert_eq!(args.filter.as_deref(), Some("disk"));
        assert!(args.clear && args.yes);
        assert_eq!(args.table.as_deref(), Some("events"));
    }

    #[test]
    fn test_log_args() {
        let cli = Cli::try_parse_from(["dblog", "log", "--level", "warning", "disk low"]).unwrap();
        let Command::Log(args) = cli.command else {
            panic!("expected log");
        };
        assert_eq!(args.level, Level::Warn);
        assert_eq!(args.message, "disk low");

        assert!(Cli::try_parse_from(["dblog", "log", "--level", "loud", "x"]).is_err());
    }
}
