// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

pub(crate) mod checkpoint;
pub(crate) mod metrics;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::{StreamExt, future::join_all};
use tokio::sync::watch;

use crate::{
    config::BackfillConfiguration,
    service::Notifications,
    store::{Row, Store},
};
use checkpoint::{Checkpoint, Checkpoints};
use metrics::{PerformanceMetrics, Sampler, grouped};

/// Rows compared between source and target after a copy.
const SAMPLE_SIZE: usize = 100;
/// A checkpoint is written every this many batches.
const CHECKPOINT_INTERVAL: usize = 10;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
pub(crate) struct Report {
    pub(crate) tables_processed: usize,
    pub(crate) records_processed: u64,
    pub(crate) errors: usize,
    pub(crate) mismatches: usize,
    pub(crate) interrupted: bool,
    pub(crate) performance_metrics: BTreeMap<String, PerformanceMetrics>,
    pub(crate) duration: Duration,
}

impl Report {
    pub(crate) fn success(&self) -> bool {
        self.errors == 0 && self.mismatches == 0 && !self.interrupted
    }

    fn log(&self) {
        log::info!(
            "statistics: {} tables, {} records, {} errors, {} integrity mismatches in {:.2}s",
            self.tables_processed,
            grouped(self.records_processed),
            self.errors,
            self.mismatches,
            self.duration.as_secs_f64()
        );
        for (table, metrics) in &self.performance_metrics {
            log::info!(
                "  {table}: {} records at {:.2} records/s",
                grouped(metrics.total_records),
                metrics.records_per_second
            );
        }
    }
}

#[derive(Debug)]
enum Copied {
    Done {
        records: u64,
        metrics: PerformanceMetrics,
    },
    Empty,
    Interrupted,
}

#[derive(Debug)]
struct Progress<'a> {
    table: &'a str,
    total: u64,
    processed: u64,
    batches: usize,
}

impl Progress<'_> {
    fn log(&self) {
        let percent = self.processed as f64 / self.total as f64 * 100.0;
        log::info!(
            "progress: {}/{} ({percent:.1}%) - {}",
            grouped(self.processed),
            grouped(self.total),
            self.table
        );
    }
}

/// Copies tables from `source` to `target`, one after another.
#[derive(Debug)]
pub(crate) struct Backfill<'a, S> {
    source: &'a S,
    target: &'a S,
    settings: BackfillConfiguration,
    checkpoints: Checkpoints,
    sampler: Sampler,
    shutdown: watch::Receiver<bool>,
}

impl<'a, S: Store> Backfill<'a, S> {
    pub(crate) fn new(
        source: &'a S,
        target: &'a S,
        settings: BackfillConfiguration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            target,
            checkpoints: Checkpoints::new(settings.checkpoint_dir()),
            settings,
            sampler: Sampler::new(),
            shutdown,
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(crate) async fn run(&mut self, tables: &[String]) -> Report {
        let started = Instant::now();
        let mut report = Report::default();
        log::info!(
            "using batch size: {} records per batch",
            grouped(self.settings.batch_size() as u64)
        );

        for table in tables {
            if self.shutdown_requested() {
                log::info!("shutdown requested, stopping processing");
                report.interrupted = true;
                break;
            }

            _ = Notifications::status(&format!("backfilling {table}"));

            match self.copy_table(table).await {
                Ok(Copied::Done { records, metrics }) => {
                    report.tables_processed += 1;
                    report.records_processed += records;
                    report.performance_metrics.insert(table.clone(), metrics);
                }
                Ok(Copied::Empty) => {}
                Ok(Copied::Interrupted) => {
                    report.interrupted = true;
                    break;
                }
                Err(err) => {
                    log::error!("failed to copy {table}: {err:#}");
                    report.errors += 1;
                    continue;
                }
            }

            if !self.validate(table).await {
                report.mismatches += 1;
            }
        }

        report.duration = started.elapsed();
        report.log();
        report
    }

    async fn copy_table(&mut self, table: &str) -> Result<Copied> {
        let started = Instant::now();
        log::info!("processing table {table}");

        let checkpoint = if self.settings.resume() {
            self.checkpoints.load(table)
        } else {
            None
        };
        if let Some(checkpoint) = &checkpoint {
            log::info!(
                "found checkpoint for {table}: {}/{} at {}",
                grouped(checkpoint.processed_count),
                grouped(checkpoint.total_count),
                checkpoint.timestamp
            );
        }

        let total = self.source.count(table).await?;
        if total == 0 {
            log::warn!("no data found in source {table}");
            return Ok(Copied::Empty);
        }
        log::info!("total records in source {table}: {}", grouped(total));

        let Some(columns) = self.source.columns(table).await? else {
            log::warn!("could not get a sample row from source {table}");
            return Ok(Copied::Empty);
        };

        let skip = match checkpoint {
            Some(checkpoint) if checkpoint.total_count == total => {
                let skip = checkpoint.processed_count.min(total);
                log::info!("resuming {table} after {} records", grouped(skip));
                skip
            }
            Some(checkpoint) => {
                log::warn!(
                    "{table} held {} records at the checkpoint and now holds {}, starting over",
                    grouped(checkpoint.total_count),
                    grouped(total)
                );
                0
            }
            None => 0,
        };

        let statement = self.target.prepare_insert(table, &columns).await?;
        let batch_size = self.settings.batch_size();
        let group_size = if self.settings.parallel() {
            self.settings.max_workers()
        } else {
            1
        };
        log::info!(
            "streaming {table} in batches of {}, {group_size} at a time",
            grouped(batch_size as u64)
        );

        let mut rows = self.source.scan(table).await?.skip(skip as usize);
        let mut progress = Progress {
            table,
            total,
            processed: skip,
            batches: 0,
        };
        let mut pending = Vec::with_capacity(group_size);
        let mut batch = Vec::with_capacity(batch_size);

        while let Some(row) = rows.next().await {
            batch.push(row?);
            if batch.len() < batch_size {
                continue;
            }

            pending.push(std::mem::replace(&mut batch, Vec::with_capacity(batch_size)));
            if pending.len() < group_size {
                continue;
            }

            self.flush(&statement, &mut pending, &mut progress).await?;
            if self.shutdown_requested() {
                self.save_checkpoint(&progress);
                log::info!(
                    "shutdown requested, stopped {table} after {} records",
                    grouped(progress.processed)
                );
                return Ok(Copied::Interrupted);
            }
        }

        if !batch.is_empty() {
            pending.push(batch);
        }
        if !pending.is_empty() {
            self.flush(&statement, &mut pending, &mut progress).await?;
            self.save_checkpoint(&progress);
        }

        let records = progress.processed - skip;
        let metrics = self.sampler.measure(started.elapsed(), records);
        metrics.log(table);
        log::info!(
            "copied {} records of {table} from source to target",
            grouped(records)
        );

        if self.settings.resume() {
            self.checkpoints.clear(table);
        }

        Ok(Copied::Done { records, metrics })
    }

    async fn flush(
        &self,
        statement: &S::Insert,
        pending: &mut Vec<Vec<Row>>,
        progress: &mut Progress<'_>,
    ) -> Result<()> {
        let table = progress.table;
        let batches = std::mem::take(pending);
        let results = join_all(
            batches
                .iter()
                .map(|batch| self.insert(table, statement, batch)),
        )
        .await;
        for result in results {
            result?;
        }

        let before = progress.batches;
        progress.batches += batches.len();
        progress.processed += batches.iter().map(|batch| batch.len() as u64).sum::<u64>();

        if before / CHECKPOINT_INTERVAL != progress.batches / CHECKPOINT_INTERVAL {
            self.save_checkpoint(progress);
        }
        progress.log();

        Ok(())
    }

    async fn insert(&self, table: &str, statement: &S::Insert, rows: &[Row]) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.target.insert(statement, rows).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.settings.max_retries() => {
                    attempt += 1;
                    log::warn!(
                        "writing {} records into {table} failed (attempt {attempt}/{}): {err:#}",
                        rows.len(),
                        self.settings.max_retries() + 1
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt as u32).await;
                }
                Err(err) => {
                    return Err(err.context(format!(
                        "failed to write {} records into {table}",
                        rows.len()
                    )));
                }
            }
        }
    }

    fn save_checkpoint(&self, progress: &Progress<'_>) {
        if self.settings.resume() {
            self.checkpoints.save(&Checkpoint::new(
                progress.table,
                progress.processed,
                progress.total,
                self.settings.batch_size(),
            ));
        }
    }

    async fn validate(&self, table: &str) -> bool {
        match self.compare(table).await {
            Ok(matches) => matches,
            Err(err) => {
                log::error!("integrity validation of {table} failed: {err:#}");
                false
            }
        }
    }

    async fn compare(&self, table: &str) -> Result<bool> {
        let source_count = self.source.count(table).await?;
        let target_count = self.target.count(table).await?;

        if source_count != target_count {
            log::error!(
                "integrity check of {table} failed: source={}, target={}",
                grouped(source_count),
                grouped(target_count)
            );
            return Ok(false);
        }

        let sample_size = SAMPLE_SIZE.min(source_count as usize);
        if sample_size > 0 {
            let source_rows = self.source.sample(table, sample_size).await?;
            let target_rows = self.target.sample(table, sample_size).await?;

            if let Some(index) = source_rows
                .iter()
                .zip(&target_rows)
                .position(|(source, target)| source != target)
            {
                log::error!("data mismatch in sample record {index} of {table}");
                return Ok(false);
            }
        }

        log::info!(
            "integrity verified: {} records of {table} match (sample validated)",
            grouped(source_count)
        );
        Ok(true)
    }
}
