mod commands;
mod config;

use std::io;

use anyhow::Context;
use clap::Parser;
use dblog::record::now_secs;
use dblog::{DatabaseLogWriter, DbLogConfig, DbLogSubscriberBuilder, LogQuery};

use crate::commands::QueryCommand;
use crate::config::{Cli, Command};

fn load_config(cli: &Cli) -> anyhow::Result<DbLogConfig> {
    match &cli.config {
        Some(path) => DbLogConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(DbLogConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let mut logging = DbLogSubscriberBuilder::new()
        .with_config(config.logging.clone())
        .with_verbosity(cli.verbose, cli.quiet);
    for target in &cli.debug {
        logging = logging.with_debug_target(target.clone());
    }
    let _guard = logging.try_init()?;

    let store = config.open_store()?;

    match cli.command {
        Command::Query(args) => {
            let command = QueryCommand::from_args(&args, &config, now_secs())?;
            let query = LogQuery::new(store, command.table.clone())
                .await?
                .with_poll_interval(config.poll_interval())
                .with_batch_size(config.scan_batch_size);

            let cancel = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            let stdin = io::stdin();
            command
                .run(&query, &mut io::stdout(), &mut stdin.lock(), cancel)
                .await?;
        }

        Command::Log(args) => {
            let table = args.table.clone().unwrap_or_else(|| config.table_name.clone());
            let writer = DatabaseLogWriter::with_codec(store, table, config.codec()).await?;
            commands::log(&writer, &config, &args).await?;
        }
    }

    Ok(())
}
