// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

mod backfill;
mod cli;
mod config;
mod launcher;
mod service;
mod store;
mod tables;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Result, bail};
use backfill::Backfill;
use clap::Parser;
use cli::{Cli, Command, RunArgs};
use config::{Configuration, LauncherConfiguration};
use env_logger::Env;
use launcher::Launcher;
use service::{Notifications, ShutdownSignals};
use store::{ScyllaStore, Store};

async fn launch(config_file: Option<PathBuf>, args: Vec<OsString>) -> Result<ExitCode> {
    let configuration = LauncherConfiguration::load(config_file)?;
    let args = launcher::forwarded(args, &std::env::args_os().collect::<Vec<_>>());

    let mut launcher = Launcher::from_config(&configuration);
    let code = launcher.run(&args, &mut std::io::stdout().lock()).await?;
    Ok(ExitCode::from(code))
}

async fn run(mut configuration: Configuration, args: RunArgs) -> Result<ExitCode> {
    Notifications::starting()?;
    let settings = configuration.backfill_mut();

    if let Some(batch_size) = args.batch_size {
        settings.set_batch_size(batch_size);
        log::info!("using command line batch size: {batch_size}");
    }
    if let Some(max_workers) = args.max_workers {
        settings.set_max_workers(max_workers);
        log::info!("using command line max workers: {max_workers}");
    }
    if args.no_resume {
        settings.disable_resume();
        log::info!("resume capability disabled");
    }
    if args.no_parallel {
        settings.disable_parallel();
        log::info!("parallel processing disabled");
    }

    let tables = tables::resolve(args.tables, configuration.backfill().tables_file())?;
    let shutdown = ShutdownSignals::new()?.watch();

    log::info!("starting ScyllaDB data backfill");
    let source = ScyllaStore::connect(&configuration.source()?).await?;
    let target = ScyllaStore::connect(&configuration.target()?).await?;
    log::info!(
        "copying {} tables from {:?} to {:?}",
        tables.len(),
        source.keyspace(),
        target.keyspace()
    );
    Notifications::ready(tables.len())?;

    let report = Backfill::new(
        &source,
        &target,
        configuration.backfill().clone(),
        shutdown,
    )
    .run(&tables)
    .await;

    drop(source);
    drop(target);
    log::info!("database connections closed");

    if report.success() {
        log::info!("backfill completed successfully");
        Ok(ExitCode::SUCCESS)
    } else if report.interrupted {
        bail!("backfill interrupted");
    } else {
        bail!(
            "backfill finished with {} failed tables and {} integrity mismatches",
            report.errors,
            report.mismatches
        );
    }
}

async fn check(configuration: Configuration, tables: Vec<String>) -> Result<ExitCode> {
    let tables = tables::resolve(tables, configuration.backfill().tables_file())?;
    let clusters = [
        ("source", configuration.source()?),
        ("target", configuration.target()?),
    ];

    for (name, cluster) in clusters {
        let store = ScyllaStore::connect(&cluster).await?;
        log::info!("checking {name} tables in {:?}", store.keyspace());
        count_tables(name, &store, &tables).await;
    }

    log::info!("all database connections successful");
    Ok(ExitCode::SUCCESS)
}

/// Logs the row count of every table and returns how many could be counted.
async fn count_tables(name: &str, store: &impl Store, tables: &[String]) -> usize {
    let mut counted = 0;
    for table in tables {
        match store.count(table).await {
            Ok(count) => {
                log::info!("{name} {table}: {count} records");
                counted += 1;
            }
            Err(err) => log::error!("failed to count {name} {table}: {err:#}"),
        }
    }
    counted
}

async fn process(args: Cli) -> Result<ExitCode> {
    match args.command {
        Command::Launch { args: forwarded } => launch(args.config, forwarded).await,
        Command::Run(run_args) => run(Configuration::load(args.config)?, run_args).await,
        Command::Check { tables } => check(Configuration::load(args.config)?, tables).await,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(args.log_level.as_str())).init();

    match process(args).await {
        Ok(code) => Ok(code),
        Err(err) => {
            _ = Notifications::failed(1, &err.to_string());
            Err(err)
        }
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::count_tables;
    use crate::store::memory::{MemoryStore, row};

    #[test(tokio::test)]
    async fn check_continues_past_failed_counts() {
        let store = MemoryStore::default()
            .with_table("events", &["id", "name"], vec![row(1, "a"), row(2, "b")])
            .with_table("users", &["id", "name"], Vec::new());
        let tables = ["events", "sessions", "users"].map(String::from);

        assert_eq!(count_tables("source", &store, &tables).await, 2);
    }
}
