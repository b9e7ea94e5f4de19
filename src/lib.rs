pub mod config;
pub mod constants;
pub mod datasets;
pub mod error;
pub mod frame;
pub mod infra;
pub mod logging;
pub mod parquet_io;
pub mod pipeline;
pub mod query_local;
pub mod storage;
pub mod types;

pub use error::{EtlError, Result};
