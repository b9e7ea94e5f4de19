/// Object-store prefix for raw, as-downloaded CSV files.
pub const RAW_PREFIX: &str = "ROW_DATA";

/// Object-store prefix for normalized Parquet output.
pub const PROCESSED_PREFIX: &str = "PROCESSED_DATA";

/// Object-store prefix for the materialized analytical table.
pub const ANALYSIS_PREFIX: &str = "ANALYSIS_DATA";

/// Run-scoped staging area; promoted into the live prefixes on success.
pub const RUNS_PREFIX: &str = "RUNS";

/// Name of the joined analytical table.
pub const ANALYSIS_TABLE: &str = "health_analysis";

/// Fixed key the Exporter uploads the joined table to.
pub const EXPORT_KEY: &str = "health_analysis.parquet";

/// Lock object guarding against concurrent pipeline runs.
pub const RUN_LOCK_KEY: &str = ".locks/pipeline";

/// Parquet part file name within a dataset prefix.
pub const PART_FILE: &str = "part-00000.parquet";
