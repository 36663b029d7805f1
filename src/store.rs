// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

#[cfg(test)]
pub(crate) mod memory;
mod scylla;

use anyhow::Result;
use futures::stream::BoxStream;

pub(crate) use ::scylla::value::Row;
pub(crate) use self::scylla::ScyllaStore;

pub(crate) type RowStream = BoxStream<'static, Result<Row>>;

/// One cluster session, bound to a keyspace.
pub(crate) trait Store {
    /// A write into one table, prepared once and reused for every batch.
    type Insert;

    async fn count(&self, table: &str) -> Result<u64>;

    /// Column names of a sample row, `None` if the table is empty.
    async fn columns(&self, table: &str) -> Result<Option<Vec<String>>>;

    async fn scan(&self, table: &str) -> Result<RowStream>;

    async fn sample(&self, table: &str, limit: usize) -> Result<Vec<Row>>;

    async fn prepare_insert(&self, table: &str, columns: &[String]) -> Result<Self::Insert>;

    async fn insert(&self, statement: &Self::Insert, rows: &[Row]) -> Result<()>;
}
