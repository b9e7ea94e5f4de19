use crate::error::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A single scalar cell in a tabular dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Double(f64),
    Str(String),
    Date(NaiveDate),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text rendering used for query results and BI extracts. Null renders
    /// as the empty string.
    pub fn render(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Str(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Null => String::new(),
        }
    }
}

// Full-row deduplication and join keys need total equality, so doubles
// compare and hash by bit pattern.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(i) => i.hash(state),
            Value::Double(d) => d.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Null => {}
        }
    }
}

/// Column types supported across CSV inference, Parquet output and the
/// catalog schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Int,
    Double,
    Str,
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// A catalog table: a name and fixed schema bound to a storage location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub location: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn from_schema(
        name: impl Into<String>,
        location: impl Into<String>,
        schema: &[(&str, ColumnType)],
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            columns: schema.iter().map(|(n, ty)| ColumnDef::new(*n, *ty)).collect(),
        }
    }
}

/// Lifecycle of an asynchronous query execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryState::Succeeded | QueryState::Failed | QueryState::Cancelled)
    }
}

/// One page of query results. The first page starts with a header row that
/// repeats the column names; consumers must skip it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResultPage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub next_token: Option<String>,
}

/// BI extract payload: every column is text, no type-specific encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extract {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// The named BI project does not exist; publishing is skipped.
    ProjectNotFound,
}

/// Source of raw dataset archives (zip with one or more CSVs inside).
#[async_trait::async_trait]
pub trait DatasetProvider: Send + Sync {
    async fn fetch_dataset(&self, slug: &str) -> Result<Vec<u8>>;
}

/// The interactive query service: catalog DDL plus asynchronous queries.
#[async_trait::async_trait]
pub trait QueryService: Send + Sync {
    /// Declare a table. Re-declaring an identical table is a no-op; a table
    /// that already exists with a different definition is kept as-is.
    async fn register_table(&self, table: &TableDef) -> Result<()>;

    /// Make the service aware of all physical files under the table's
    /// location. Skipping this after registration silently misses data.
    async fn refresh_partitions(&self, table: &str) -> Result<()>;

    /// Create-or-replace a table definition (materialization target).
    async fn replace_table(&self, table: &TableDef) -> Result<()>;

    /// Submit a query; returns an execution id to poll.
    async fn start_query(&self, sql: &str) -> Result<String>;

    async fn query_state(&self, execution_id: &str) -> Result<QueryState>;

    /// Fetch one page of results for a succeeded execution.
    async fn result_page(
        &self,
        execution_id: &str,
        page_token: Option<String>,
    ) -> Result<QueryResultPage>;
}

/// BI server endpoint that accepts tabular extracts into a named project.
#[async_trait::async_trait]
pub trait ExtractPublisher: Send + Sync {
    async fn publish(&self, project: &str, name: &str, extract: &Extract)
        -> Result<PublishOutcome>;
}
