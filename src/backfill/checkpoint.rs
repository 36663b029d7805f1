// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::metrics::grouped;

/// Progress of one table copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Checkpoint {
    pub(crate) table_name: String,
    pub(crate) processed_count: u64,
    pub(crate) total_count: u64,
    pub(crate) timestamp: NaiveDateTime,
    pub(crate) batch_size: usize,
}

impl Checkpoint {
    pub(crate) fn new(table: &str, processed: u64, total: u64, batch_size: usize) -> Self {
        Self {
            table_name: table.to_string(),
            processed_count: processed,
            total_count: total,
            timestamp: Local::now().naive_local(),
            batch_size,
        }
    }
}

/// One JSON file per table. Failures are logged and otherwise ignored.
#[derive(Debug, Clone)]
pub(crate) struct Checkpoints {
    dir: PathBuf,
}

impl Checkpoints {
    pub(crate) fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.json"))
    }

    pub(crate) fn save(&self, checkpoint: &Checkpoint) {
        let write = || -> Result<()> {
            fs::create_dir_all(&self.dir)?;
            fs::write(
                self.path(&checkpoint.table_name),
                serde_json::to_string_pretty(checkpoint)?,
            )?;
            Ok(())
        };

        match write() {
            Ok(()) => log::debug!(
                "checkpoint saved: {}/{} for {}",
                grouped(checkpoint.processed_count),
                grouped(checkpoint.total_count),
                checkpoint.table_name
            ),
            Err(err) => log::warn!("failed to save checkpoint: {err}"),
        }
    }

    pub(crate) fn load(&self, table: &str) -> Option<Checkpoint> {
        let path = self.path(table);
        if !path.exists() {
            return None;
        }

        let read = || -> Result<Checkpoint> { Ok(serde_json::from_str(&fs::read_to_string(&path)?)?) };

        match read() {
            Ok(checkpoint) => Some(checkpoint),
            Err(err) => {
                log::warn!("failed to load checkpoint {path:?}: {err}");
                None
            }
        }
    }

    pub(crate) fn clear(&self, table: &str) {
        let path = self.path(table);
        if !path.exists() {
            return;
        }

        match fs::remove_file(&path) {
            Ok(()) => log::debug!("checkpoint cleared for {table}"),
            Err(err) => log::warn!("failed to clear checkpoint {path:?}: {err}"),
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::PathBuf;

    use test_log::test;

    use super::{Checkpoint, Checkpoints};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "proto-backfill-checkpoint-{}-{name}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn save_load_clear() {
        let checkpoints = Checkpoints::new(&scratch_dir("cycle").join("nested"));
        let checkpoint = Checkpoint::new("events", 20_000, 50_000, 1000);

        assert_eq!(checkpoints.load("events"), None);
        checkpoints.save(&checkpoint);
        assert_eq!(checkpoints.load("events"), Some(checkpoint));
        checkpoints.clear("events");
        assert_eq!(checkpoints.load("events"), None);
        checkpoints.clear("events");
    }

    #[test]
    fn reads_files_written_by_the_old_tool() {
        let dir = scratch_dir("legacy");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("product_details.json"),
            r#"{
  "table_name": "product_details",
  "processed_count": 50000,
  "total_count": 123456,
  "timestamp": "2024-05-01T13:37:00.123456",
  "batch_size": 5000
}"#,
        )
        .unwrap();

        let checkpoint = Checkpoints::new(&dir).load("product_details").unwrap();

        assert_eq!(checkpoint.processed_count, 50_000);
        assert_eq!(checkpoint.total_count, 123_456);
        assert_eq!(checkpoint.batch_size, 5000);
    }

    #[test]
    fn corrupt_checkpoint_is_ignored() {
        let dir = scratch_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("events.json"), "{").unwrap();

        assert_eq!(Checkpoints::new(&dir).load("events"), None);
    }
}
