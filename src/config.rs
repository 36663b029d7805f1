// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

mod legacy;

use std::path::{Path, PathBuf};
use std::{fmt::Debug, fs::read_to_string};

use anyhow::{Context, Error, Result};
use config::{Config, ConfigError, Environment, File, FileFormat, FileSourceFile};
use serde::Deserialize;

use legacy::LegacyEnvironment;

const DEFAULT_CONFIG_FILE: &str = "proto_backfill.toml";

#[derive(Debug, Deserialize)]
pub(crate) struct Configuration {
    source: ClusterConfiguration,
    target: ClusterConfiguration,
    #[serde(default)]
    backfill: BackfillConfiguration,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct LauncherConfiguration {
    environment: PathBuf,
    interpreter: PathBuf,
    program: PathBuf,
}

impl Default for LauncherConfiguration {
    fn default() -> Self {
        Self {
            environment: PathBuf::from("venv"),
            interpreter: PathBuf::from("bin/python"),
            program: PathBuf::from("proto_backfill_main.py"),
        }
    }
}

impl LauncherConfiguration {
    /// Reads only the `launcher` section. An unreadable default file falls
    /// back to the built-in settings; an explicitly given one is an error.
    pub(crate) fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let (path, required) = config_path(config_file);
        Self::load_from(&path, required)
    }

    fn load_from(path: &Path, required: bool) -> Result<Self> {
        match Self::read(path, required) {
            Ok(launcher) => Ok(launcher),
            Err(err) if !required => {
                log::warn!("ignoring configuration file {path:?}: {err:#}");
                Ok(Self::default())
            }
            Err(err) => Err(err),
        }
    }

    fn read(path: &Path, required: bool) -> Result<Self> {
        let settings = Config::builder()
            .add_source(config_file(path, required)?)
            .add_source(
                Environment::with_prefix("PROTO_BACKFILL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        match settings.get::<Self>("launcher") {
            Ok(launcher) => Ok(launcher),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(err) => Err(err).context("failed to parse launcher configuration"),
        }
    }

    pub(crate) fn environment(&self) -> &Path {
        &self.environment
    }

    /// Interpreter inside the environment, `None` if the program is run directly.
    pub(crate) fn interpreter(&self) -> Option<&Path> {
        (!self.interpreter.as_os_str().is_empty()).then_some(self.interpreter.as_path())
    }

    pub(crate) fn program(&self) -> &Path {
        &self.program
    }
}

#[derive(Debug, Deserialize)]
struct ClusterConfiguration {
    contact_points: Vec<String>,
    username: String,
    password: String,
    password_file: Option<PathBuf>,
    keyspace: String,
}

pub(crate) struct Cluster {
    contact_points: Vec<String>,
    username: String,
    password: String,
    keyspace: String,
}

impl Cluster {
    pub(crate) fn contact_points(&self) -> &[String] {
        &self.contact_points
    }

    pub(crate) fn credentials(&self) -> (&str, &str) {
        (&self.username, &self.password)
    }

    pub(crate) fn keyspace(&self) -> &str {
        &self.keyspace
    }
}

impl Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("contact_points", &self.contact_points)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("keyspace", &self.keyspace)
            .finish()
    }
}

impl TryFrom<&ClusterConfiguration> for Cluster {
    type Error = Error;

    fn try_from(value: &ClusterConfiguration) -> std::result::Result<Self, Self::Error> {
        let password = match &value.password_file {
            Some(file) => read_to_string(file)
                .with_context(|| format!("failed to read password file {file:?}"))?
                .trim_end()
                .to_string(),
            None => value.password.clone(),
        };

        Ok(Self {
            contact_points: value.contact_points.clone(),
            username: value.username.clone(),
            password,
            keyspace: value.keyspace.clone(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct BackfillConfiguration {
    batch_size: usize,
    max_retries: usize,
    max_workers: usize,
    enable_resume: bool,
    enable_parallel: bool,
    checkpoint_dir: PathBuf,
    tables_file: PathBuf,
}

impl Default for BackfillConfiguration {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            max_retries: 3,
            max_workers: 4,
            enable_resume: true,
            enable_parallel: true,
            checkpoint_dir: PathBuf::from("checkpoints"),
            tables_file: PathBuf::from("tables.json"),
        }
    }
}

impl BackfillConfiguration {
    pub(crate) fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub(crate) fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size;
    }

    pub(crate) fn max_retries(&self) -> usize {
        self.max_retries
    }

    #[cfg(test)]
    pub(crate) fn set_max_retries(&mut self, max_retries: usize) {
        self.max_retries = max_retries;
    }

    pub(crate) fn max_workers(&self) -> usize {
        self.max_workers.max(1)
    }

    pub(crate) fn set_max_workers(&mut self, max_workers: usize) {
        self.max_workers = max_workers;
    }

    pub(crate) fn resume(&self) -> bool {
        self.enable_resume
    }

    pub(crate) fn disable_resume(&mut self) {
        self.enable_resume = false;
    }

    pub(crate) fn parallel(&self) -> bool {
        self.enable_parallel
    }

    pub(crate) fn disable_parallel(&mut self) {
        self.enable_parallel = false;
    }

    pub(crate) fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    #[cfg(test)]
    pub(crate) fn set_checkpoint_dir(&mut self, checkpoint_dir: &Path) {
        self.checkpoint_dir = checkpoint_dir.to_path_buf();
    }

    pub(crate) fn tables_file(&self) -> &Path {
        &self.tables_file
    }
}

fn config_path(config_file: Option<PathBuf>) -> (PathBuf, bool) {
    match config_file {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    }
}

fn config_file(path: &Path, required: bool) -> Result<File<FileSourceFile, FileFormat>> {
    let name = path
        .to_str()
        .with_context(|| format!("invalid configuration file path {path:?}"))?;
    Ok(File::new(name, FileFormat::Toml).required(required))
}

impl Configuration {
    pub(crate) fn load(config_file: Option<PathBuf>) -> Result<Self> {
        Self::load_from(config_file, LegacyEnvironment::from_process())
    }

    fn load_from(config_file: Option<PathBuf>, legacy: LegacyEnvironment) -> Result<Self> {
        let (path, required) = config_path(config_file);

        let settings = Config::builder()
            .set_default("source.contact_points", vec!["localhost"])?
            .set_default("source.username", "admin")?
            .set_default("source.password", "password")?
            .set_default("source.keyspace", "source_keyspace")?
            .set_default("target.contact_points", vec!["localhost"])?
            .set_default("target.username", "admin")?
            .set_default("target.password", "password")?
            .set_default("target.keyspace", "target_keyspace")?
            .add_source(self::config_file(&path, required)?)
            .add_source(legacy)
            .add_source(
                Environment::with_prefix("PROTO_BACKFILL")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("source.contact_points")
                    .with_list_parse_key("target.contact_points")
                    .try_parsing(true),
            )
            .build()?;

        settings
            .try_deserialize::<Configuration>()
            .context("failed to parse configuration")
    }

    pub(crate) fn source(&self) -> Result<Cluster> {
        (&self.source).try_into()
    }

    pub(crate) fn target(&self) -> Result<Cluster> {
        (&self.target).try_into()
    }

    pub(crate) fn backfill(&self) -> &BackfillConfiguration {
        &self.backfill
    }

    pub(crate) fn backfill_mut(&mut self) -> &mut BackfillConfiguration {
        &mut self.backfill
    }
}
