// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use scylla::value::CqlValue;

use super::{Row, RowStream, Store};

#[derive(Debug, Default)]
struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

fn duplicate(row: &Row) -> Row {
    Row {
        columns: row.columns.clone(),
    }
}

impl Clone for Table {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().map(duplicate).collect(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    failing_inserts: usize,
    inserted: usize,
    prepared: usize,
}

#[derive(Debug)]
pub(crate) struct Insert {
    table: String,
    columns: Vec<String>,
}

/// Rows keyed by their first column, like a single-column primary key.
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
}

pub(crate) fn row(id: i32, name: &str) -> Row {
    Row {
        columns: vec![Some(CqlValue::Int(id)), Some(CqlValue::Text(name.to_string()))],
    }
}

impl MemoryStore {
    pub(crate) fn with_table(self, table: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        self.state.lock().unwrap().tables.insert(
            table.to_string(),
            Table {
                columns: columns.iter().map(|column| column.to_string()).collect(),
                rows,
            },
        );
        self
    }

    /// Lets the next `count` inserts fail.
    pub(crate) fn fail_inserts(&self, count: usize) {
        self.state.lock().unwrap().failing_inserts = count;
    }

    /// Number of rows written through [`Store::insert`].
    pub(crate) fn inserted(&self) -> usize {
        self.state.lock().unwrap().inserted
    }

    /// Number of inserts prepared through [`Store::prepare_insert`].
    pub(crate) fn prepared(&self) -> usize {
        self.state.lock().unwrap().prepared
    }

    pub(crate) fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|table| table.rows.iter().map(duplicate).collect())
            .unwrap_or_default()
    }

    fn table(&self, table: &str) -> Result<Table> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .cloned()
            .with_context(|| format!("unconfigured table {table}"))
    }
}

impl Store for MemoryStore {
    type Insert = Insert;

    async fn count(&self, table: &str) -> Result<u64> {
        Ok(self.table(table)?.rows.len() as u64)
    }

    async fn columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        let table = self.table(table)?;
        Ok((!table.rows.is_empty()).then_some(table.columns))
    }

    async fn scan(&self, table: &str) -> Result<RowStream> {
        let rows = self.table(table)?.rows;
        Ok(futures::stream::iter(rows.into_iter().map(Ok)).boxed())
    }

    async fn sample(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        Ok(self.table(table)?.rows.into_iter().take(limit).collect())
    }

    async fn prepare_insert(&self, table: &str, columns: &[String]) -> Result<Insert> {
        self.state.lock().unwrap().prepared += 1;
        Ok(Insert {
            table: table.to_string(),
            columns: columns.to_vec(),
        })
    }

    async fn insert(&self, statement: &Insert, rows: &[Row]) -> Result<()> {
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if state.failing_inserts > 0 {
            state.failing_inserts -= 1;
            bail!("write timeout");
        }

        let target = state.tables.entry(statement.table.clone()).or_default();
        if target.columns.is_empty() {
            target.columns = statement.columns.clone();
        }
        for row in rows {
            let key = row.columns.first();
            match target
                .rows
                .iter_mut()
                .find(|existing| existing.columns.first() == key)
            {
                Some(existing) => *existing = duplicate(row),
                None => target.rows.push(duplicate(row)),
            }
        }
        state.inserted += rows.len();

        Ok(())
    }
}
