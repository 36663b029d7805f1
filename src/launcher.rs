// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::{Context, Result};
use tokio::process::Command;

use crate::config::LauncherConfiguration;

/// An isolated environment directory the backfill program runs in.
#[derive(Debug, Clone)]
pub(crate) struct Environment {
    root: PathBuf,
}

impl Environment {
    /// Returns `None` if `root` is not an existing directory.
    pub(crate) fn locate(root: &Path) -> Option<Self> {
        root.is_dir().then(|| Self {
            root: root.to_path_buf(),
        })
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Variables the child process sees in place of activating the environment.
    pub(crate) fn variables(&self, path: Option<&OsStr>) -> Result<Vec<(OsString, OsString)>> {
        let mut paths = vec![self.bin_dir()];
        if let Some(path) = path {
            paths.extend(std::env::split_paths(path));
        }
        let path = std::env::join_paths(paths).context("failed to build PATH")?;

        Ok(vec![
            ("VIRTUAL_ENV".into(), self.root.clone().into_os_string()),
            ("PATH".into(), path),
        ])
    }
}

/// The program the launcher hands its arguments to.
pub(crate) trait Delegate {
    async fn invoke(&mut self, environment: &Environment, args: &[OsString]) -> Result<ExitStatus>;
}

/// Runs `program` as a child process, optionally through an interpreter
/// that lives inside the environment.
#[derive(Debug)]
pub(crate) struct Process {
    interpreter: Option<PathBuf>,
    program: PathBuf,
}

impl Process {
    pub(crate) fn new(interpreter: Option<&Path>, program: &Path) -> Self {
        Self {
            interpreter: interpreter.map(Path::to_path_buf),
            program: program.to_path_buf(),
        }
    }

    fn command(&self, environment: &Environment, args: &[OsString]) -> Result<Command> {
        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut command = Command::new(environment.root().join(interpreter));
                command.arg(&self.program);
                command
            }
            None => Command::new(&self.program),
        };

        command
            .args(args)
            .envs(environment.variables(std::env::var_os("PATH").as_deref())?)
            .env_remove("PYTHONHOME");

        Ok(command)
    }
}

impl Delegate for Process {
    async fn invoke(&mut self, environment: &Environment, args: &[OsString]) -> Result<ExitStatus> {
        let mut command = self.command(environment, args)?;
        log::debug!("spawning {command:?}");

        command
            .status()
            .await
            .with_context(|| format!("failed to run {:?}", self.program))
    }
}

#[derive(Debug)]
pub(crate) struct Launcher<D> {
    environment: PathBuf,
    delegate: D,
}

impl Launcher<Process> {
    pub(crate) fn from_config(config: &LauncherConfiguration) -> Self {
        Self::new(
            config.environment(),
            Process::new(config.interpreter(), config.program()),
        )
    }
}

impl<D: Delegate> Launcher<D> {
    pub(crate) fn new(environment: &Path, delegate: D) -> Self {
        Self {
            environment: environment.to_path_buf(),
            delegate,
        }
    }

    /// Runs the delegate with `args` and returns the exit code for this process.
    pub(crate) async fn run(&mut self, args: &[OsString], out: &mut impl Write) -> Result<u8> {
        let Some(environment) = Environment::locate(&self.environment) else {
            writeln!(
                out,
                "Isolated environment {:?} not found. Please create it first.",
                self.environment
            )?;
            log::error!("missing environment {:?}", self.environment);
            return Ok(1);
        };

        writeln!(out, "Starting backfill process...")?;
        out.flush()?;

        let status = self.delegate.invoke(&environment, args).await?;
        let code = exit_code(status);

        if code == 0 {
            writeln!(out, "Backfill process completed.")?;
        } else {
            writeln!(out, "Backfill process failed with exit code {code}.")?;
        }
        out.flush()?;

        Ok(code)
    }
}

/// Puts back a `--` that clap took as its own separator right after `launch`.
///
/// `parsed` always ends `argv`, so the token in front of it is either the
/// subcommand or the swallowed separator.
pub(crate) fn forwarded(parsed: Vec<OsString>, argv: &[OsString]) -> Vec<OsString> {
    let swallowed = argv
        .len()
        .checked_sub(parsed.len() + 1)
        .is_some_and(|index| argv[index] == "--");

    if swallowed {
        std::iter::once(OsString::from("--")).chain(parsed).collect()
    } else {
        parsed
    }
}

fn exit_code(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return u8::try_from(code).unwrap_or(1);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return u8::try_from(128 + signal).unwrap_or(1);
        }
    }

    1
}
