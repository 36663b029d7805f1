// SPDX-FileCopyrightText: © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub(crate) struct Cli {
    /// configuration file (defaults to `proto_backfill.toml`, if present)
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,

    /// log filter, e.g. `debug` or `proto_backfill=trace`
    #[arg(long, default_value = "info")]
    pub(crate) log_level: String,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Check for the isolated environment, then run the backfill program
    /// inside it with all remaining arguments
    #[command(disable_help_flag = true)]
    Launch {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<OsString>,
    },
    /// Copy tables from the source cluster to the target cluster
    Run(RunArgs),
    /// Count the rows of every table on both clusters
    Check {
        /// tables to count (defaults to the tables file, then the built-in list)
        tables: Vec<String>,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// tables to process
    #[arg(long, num_args = 1..)]
    pub(crate) tables: Vec<String>,

    /// rows per batch
    #[arg(long)]
    pub(crate) batch_size: Option<usize>,

    /// maximum number of batches written concurrently
    #[arg(long)]
    pub(crate) max_workers: Option<usize>,

    /// ignore and do not write checkpoints
    #[arg(long)]
    pub(crate) no_resume: bool,

    /// write batches one at a time
    #[arg(long)]
    pub(crate) no_parallel: bool,
}
