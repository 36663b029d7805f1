// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use anyhow::{Context, Result};
use futures::{StreamExt, TryStreamExt};
use scylla::{
    client::{session::Session, session_builder::SessionBuilder},
    statement::{Consistency, prepared::PreparedStatement},
};

use super::{Row, RowStream, Store};
use crate::config::Cluster;

pub(crate) struct ScyllaStore {
    session: Session,
    keyspace: String,
}

impl std::fmt::Debug for ScyllaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScyllaStore")
            .field("keyspace", &self.keyspace)
            .finish_non_exhaustive()
    }
}

impl ScyllaStore {
    pub(crate) async fn connect(cluster: &Cluster) -> Result<Self> {
        let (username, password) = cluster.credentials();
        let session = SessionBuilder::new()
            .known_nodes(cluster.contact_points())
            .user(username, password)
            .use_keyspace(cluster.keyspace(), false)
            .build()
            .await
            .with_context(|| {
                format!(
                    "failed to connect to keyspace {:?} at {:?}",
                    cluster.keyspace(),
                    cluster.contact_points()
                )
            })?;
        log::info!("connected to keyspace {:?}", cluster.keyspace());

        Ok(Self {
            session,
            keyspace: cluster.keyspace().to_string(),
        })
    }

    pub(crate) fn keyspace(&self) -> &str {
        &self.keyspace
    }
}

impl Store for ScyllaStore {
    type Insert = PreparedStatement;

    async fn count(&self, table: &str) -> Result<u64> {
        let (count,) = self
            .session
            .query_unpaged(format!("SELECT COUNT(*) FROM {table}"), ())
            .await?
            .into_rows_result()?
            .single_row::<(i64,)>()?;

        Ok(u64::try_from(count)?)
    }

    async fn columns(&self, table: &str) -> Result<Option<Vec<String>>> {
        let result = self
            .session
            .query_unpaged(format!("SELECT * FROM {table} LIMIT 1"), ())
            .await?
            .into_rows_result()?;

        if result.rows_num() == 0 {
            return Ok(None);
        }

        Ok(Some(
            result
                .column_specs()
                .iter()
                .map(|spec| spec.name().to_string())
                .collect(),
        ))
    }

    async fn scan(&self, table: &str) -> Result<RowStream> {
        let pager = self
            .session
            .query_iter(format!("SELECT * FROM {table}"), ())
            .await?;

        Ok(pager
            .rows_stream::<Row>()?
            .map_err(anyhow::Error::from)
            .boxed())
    }

    async fn sample(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        let rows = self
            .session
            .query_unpaged(format!("SELECT * FROM {table} LIMIT {limit}"), ())
            .await?
            .into_rows_result()?
            .rows::<Row>()?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    async fn prepare_insert(&self, table: &str, columns: &[String]) -> Result<Self::Insert> {
        let placeholders = vec!["?"; columns.len()].join(", ");
        let mut statement = self
            .session
            .prepare(format!(
                "INSERT INTO {table} ({}) VALUES ({placeholders})",
                columns.join(", ")
            ))
            .await
            .with_context(|| format!("failed to prepare insert into {table}"))?;
        statement.set_consistency(Consistency::LocalQuorum);

        Ok(statement)
    }

    async fn insert(&self, statement: &Self::Insert, rows: &[Row]) -> Result<()> {
        for row in rows {
            self.session.execute_unpaged(statement, &row.columns).await?;
        }

        Ok(())
    }
}
