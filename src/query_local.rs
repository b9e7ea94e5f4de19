use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::parquet_io;
use crate::storage::ObjectStore;
use crate::types::{QueryResultPage, QueryService, QueryState, TableDef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

const CATALOG_KEY: &str = ".catalog/tables.json";
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogEntry {
    table: TableDef,
    /// Files the service has discovered under the table location. A table
    /// registered but never refreshed serves no data.
    files: Vec<String>,
}

#[derive(Debug)]
struct Execution {
    state: QueryState,
    message: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Query service backed by the object store itself: a persisted catalog of
/// table definitions plus Parquet scans. Supports the statements the
/// pipeline actually issues (`SELECT * FROM <table>`), and reproduces the
/// managed service's paging behavior, including the leading header row.
pub struct LocalQueryService {
    store: Arc<dyn ObjectStore>,
    catalog: Mutex<HashMap<String, CatalogEntry>>,
    executions: Mutex<HashMap<String, Execution>>,
    page_size: usize,
}

impl LocalQueryService {
    pub async fn open(store: Arc<dyn ObjectStore>) -> Result<Self> {
        let catalog = match store.get(CATALOG_KEY).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(_) => {
                debug!("no existing catalog at {CATALOG_KEY}, starting empty");
                HashMap::new()
            }
        };
        Ok(Self {
            store,
            catalog: Mutex::new(catalog),
            executions: Mutex::new(HashMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    #[cfg(test)]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    async fn save_catalog(&self, catalog: &HashMap<String, CatalogEntry>) -> Result<()> {
        let bytes = serde_json::to_vec(catalog)?;
        self.store.put(CATALOG_KEY, &bytes).await
    }

    async fn scan_table(&self, entry: &CatalogEntry) -> Result<Frame> {
        let mut frame = Frame::new(entry.table.columns.clone());
        for key in &entry.files {
            let bytes = self.store.get(key).await?;
            let part = parquet_to_aligned(&bytes, &entry.table)?;
            frame.concat(part)?;
        }
        Ok(frame)
    }
}

fn parquet_to_aligned(bytes: &[u8], table: &TableDef) -> Result<Frame> {
    let raw = parquet_io::parquet_to_frame(bytes)?;
    // Bind the physical columns to the declared schema; mismatches surface
    // as nulls at query time, not as registration errors.
    Ok(raw.align_to_schema(&table.columns))
}

fn parse_select(sql: &str) -> Option<String> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    let lowered = trimmed.to_lowercase();
    let rest = lowered.strip_prefix("select * from ")?;
    let name = rest.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    // Return the original-cased table name token.
    Some(trimmed[trimmed.len() - name.len()..].to_string())
}

#[async_trait]
impl QueryService for LocalQueryService {
    async fn register_table(&self, table: &TableDef) -> Result<()> {
        let mut catalog = self.catalog.lock().await;
        if let Some(existing) = catalog.get(&table.name) {
            if existing.table == *table {
                debug!("table {} already registered, no-op", table.name);
            } else {
                warn!(
                    "table {} exists with a different definition; keeping the existing one",
                    table.name
                );
            }
            return Ok(());
        }
        catalog.insert(
            table.name.clone(),
            CatalogEntry { table: table.clone(), files: Vec::new() },
        );
        self.save_catalog(&catalog).await
    }

    async fn refresh_partitions(&self, table: &str) -> Result<()> {
        let mut catalog = self.catalog.lock().await;
        let entry = catalog.get_mut(table).ok_or_else(|| EtlError::Query {
            message: format!("cannot refresh unknown table {table}"),
        })?;
        let files = self
            .store
            .list(&entry.table.location)
            .await?
            .into_iter()
            .filter(|k| k.ends_with(".parquet"))
            .collect::<Vec<_>>();
        debug!("discovered {} file(s) for table {}", files.len(), table);
        entry.files = files;
        let snapshot = catalog.clone();
        drop(catalog);
        self.save_catalog(&snapshot).await
    }

    async fn replace_table(&self, table: &TableDef) -> Result<()> {
        let files = self
            .store
            .list(&table.location)
            .await?
            .into_iter()
            .filter(|k| k.ends_with(".parquet"))
            .collect::<Vec<_>>();
        let mut catalog = self.catalog.lock().await;
        catalog.insert(table.name.clone(), CatalogEntry { table: table.clone(), files });
        let snapshot = catalog.clone();
        drop(catalog);
        self.save_catalog(&snapshot).await
    }

    async fn start_query(&self, sql: &str) -> Result<String> {
        let execution_id = Uuid::new_v4().to_string();
        let execution = match parse_select(sql) {
            Some(table_name) => {
                let entry = {
                    let catalog = self.catalog.lock().await;
                    catalog.get(&table_name).cloned()
                };
                match entry {
                    Some(entry) => match self.scan_table(&entry).await {
                        Ok(frame) => Execution {
                            state: QueryState::Succeeded,
                            message: String::new(),
                            columns: frame.column_names(),
                            rows: frame
                                .rows
                                .iter()
                                .map(|row| row.iter().map(|v| v.render()).collect())
                                .collect(),
                        },
                        Err(e) => Execution {
                            state: QueryState::Failed,
                            message: format!("scan of {table_name} failed: {e}"),
                            columns: Vec::new(),
                            rows: Vec::new(),
                        },
                    },
                    None => Execution {
                        state: QueryState::Failed,
                        message: format!("table not found: {table_name}"),
                        columns: Vec::new(),
                        rows: Vec::new(),
                    },
                }
            }
            None => Execution {
                state: QueryState::Failed,
                message: format!("unsupported query: {sql}"),
                columns: Vec::new(),
                rows: Vec::new(),
            },
        };
        self.executions.lock().await.insert(execution_id.clone(), execution);
        Ok(execution_id)
    }

    async fn query_state(&self, execution_id: &str) -> Result<QueryState> {
        let executions = self.executions.lock().await;
        let execution = executions.get(execution_id).ok_or_else(|| EtlError::Query {
            message: format!("unknown execution id {execution_id}"),
        })?;
        Ok(execution.state)
    }

    async fn result_page(
        &self,
        execution_id: &str,
        page_token: Option<String>,
    ) -> Result<QueryResultPage> {
        let executions = self.executions.lock().await;
        let execution = executions.get(execution_id).ok_or_else(|| EtlError::Query {
            message: format!("unknown execution id {execution_id}"),
        })?;
        if execution.state != QueryState::Succeeded {
            return Err(EtlError::Query {
                message: format!(
                    "no results for execution {execution_id}: {}",
                    execution.message
                ),
            });
        }

        let offset: usize = match &page_token {
            Some(token) => token.parse().map_err(|_| EtlError::Query {
                message: format!("invalid page token {token}"),
            })?,
            None => 0,
        };

        // Logical result rows are the header row followed by the data, the
        // way the managed service returns them.
        let total = execution.rows.len() + 1;
        let end = (offset + self.page_size).min(total);
        let mut rows = Vec::new();
        for i in offset..end {
            if i == 0 {
                rows.push(execution.columns.clone());
            } else {
                rows.push(execution.rows[i - 1].clone());
            }
        }
        let next_token = if end < total { Some(end.to_string()) } else { None };
        Ok(QueryResultPage { columns: execution.columns.clone(), rows, next_token })
    }
}
