use crate::config::Settings;
use crate::constants::{ANALYSIS_TABLE, EXPORT_KEY};
use crate::datasets::ANALYSIS_SCHEMA;
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::parquet_io;
use crate::storage::ObjectStore;
use crate::types::{ColumnDef, QueryService, QueryState, TableDef};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Query the joined table, wait for the execution to finish within the
/// configured deadline, rebuild the rows under the declared schema, and
/// upload the result as a single Parquet file at the fixed export key.
#[instrument(skip(store, query, settings))]
pub async fn run(
    store: &dyn ObjectStore,
    query: &dyn QueryService,
    settings: &Settings,
) -> Result<usize> {
    let execution_id = query
        .start_query(&format!("SELECT * FROM {ANALYSIS_TABLE}"))
        .await?;
    let state = wait_for_query(
        query,
        &execution_id,
        Duration::from_secs(settings.query.poll_interval_secs),
        Duration::from_secs(settings.query.export_timeout_secs),
    )
    .await?;
    if state != QueryState::Succeeded {
        return Err(EtlError::Query {
            message: format!("export query ended in state {state:?}"),
        });
    }

    let rows = fetch_rows(query, &execution_id).await?;
    let schema: Vec<ColumnDef> =
        TableDef::from_schema(ANALYSIS_TABLE, "", ANALYSIS_SCHEMA).columns;
    let frame = Frame::from_text_rows(&schema, rows);
    let row_count = frame.rows.len();

    let bytes = parquet_io::frame_to_parquet(&frame)?;
    let local = Path::new(&settings.pipeline.staging_dir).join(EXPORT_KEY);
    if let Some(parent) = local.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&local, &bytes)?;
    store.put(EXPORT_KEY, &bytes).await?;

    info!(rows = row_count, key = EXPORT_KEY, "exported analytical table");
    metrics::counter!("etl_rows_exported").increment(row_count as u64);
    Ok(row_count)
}

/// Poll until the execution reaches a terminal state or the deadline passes.
/// A non-terminating query becomes a `QueryTimeout`, never a hung process.
pub async fn wait_for_query(
    query: &dyn QueryService,
    execution_id: &str,
    poll_interval: Duration,
    deadline: Duration,
) -> Result<QueryState> {
    let mut waited = Duration::ZERO;
    loop {
        let state = query.query_state(execution_id).await?;
        if state.is_terminal() {
            return Ok(state);
        }
        if waited >= deadline {
            return Err(EtlError::QueryTimeout { waited_secs: waited.as_secs() });
        }
        tokio::time::sleep(poll_interval).await;
        waited += poll_interval;
    }
}

/// Drain every result page. The service puts a header row at the top of the
/// first page; it is dropped here so only data rows come back.
pub async fn fetch_rows(
    query: &dyn QueryService,
    execution_id: &str,
) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut token: Option<String> = None;
    let mut first_page = true;
    loop {
        let page = query.result_page(execution_id, token).await?;
        let mut page_rows = page.rows.into_iter();
        if first_page {
            page_rows.next();
            first_page = false;
        }
        rows.extend(page_rows);
        match page.next_token {
            Some(next) => token = Some(next),
            None => return Ok(rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::QueryResultPage;
    use async_trait::async_trait;

    struct NeverFinishes;

    #[async_trait]
    impl QueryService for NeverFinishes {
        async fn register_table(&self, _table: &TableDef) -> Result<()> {
            Ok(())
        }
        async fn refresh_partitions(&self, _table: &str) -> Result<()> {
            Ok(())
        }
        async fn replace_table(&self, _table: &TableDef) -> Result<()> {
            Ok(())
        }
        async fn start_query(&self, _sql: &str) -> Result<String> {
            Ok("e1".to_string())
        }
        async fn query_state(&self, _execution_id: &str) -> Result<QueryState> {
            Ok(QueryState::Running)
        }
        async fn result_page(
            &self,
            _execution_id: &str,
            _page_token: Option<String>,
        ) -> Result<QueryResultPage> {
            Err(EtlError::Query { message: "still running".to_string() })
        }
    }

    #[tokio::test]
    async fn bounded_wait_times_out_with_the_dedicated_error() {
        let service = NeverFinishes;
        let result = wait_for_query(
            &service,
            "e1",
            Duration::from_millis(5),
            Duration::from_millis(20),
        )
        .await;
        assert!(matches!(result, Err(EtlError::QueryTimeout { .. })));
    }

    struct TwoPages;

    #[async_trait]
    impl QueryService for TwoPages {
        async fn register_table(&self, _table: &TableDef) -> Result<()> {
            Ok(())
        }
        async fn refresh_partitions(&self, _table: &str) -> Result<()> {
            Ok(())
        }
        async fn replace_table(&self, _table: &TableDef) -> Result<()> {
            Ok(())
        }
        async fn start_query(&self, _sql: &str) -> Result<String> {
            Ok("e1".to_string())
        }
        async fn query_state(&self, _execution_id: &str) -> Result<QueryState> {
            Ok(QueryState::Succeeded)
        }
        async fn result_page(
            &self,
            _execution_id: &str,
            page_token: Option<String>,
        ) -> Result<QueryResultPage> {
            let columns = vec!["user_id".to_string()];
            match page_token.as_deref() {
                None => Ok(QueryResultPage {
                    columns: columns.clone(),
                    rows: vec![columns, vec!["1".to_string()]],
                    next_token: Some("2".to_string()),
                }),
                Some("2") => Ok(QueryResultPage {
                    columns,
                    rows: vec![vec!["2".to_string()]],
                    next_token: None,
                }),
                Some(other) => Err(EtlError::Query {
                    message: format!("unexpected token {other}"),
                }),
            }
        }
    }

    #[tokio::test]
    async fn fetch_skips_the_header_row_on_the_first_page_only() {
        let rows = fetch_rows(&TwoPages, "e1").await.unwrap();
        assert_eq!(rows, vec![vec!["1".to_string()], vec!["2".to_string()]]);
    }
}
