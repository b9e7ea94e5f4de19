use crate::constants::PROCESSED_PREFIX;
use crate::datasets::{DatasetSpec, DATASETS};
use crate::error::Result;
use crate::types::{QueryService, TableDef};
use tracing::{info, instrument};

pub fn table_for(spec: &DatasetSpec) -> TableDef {
    TableDef::from_schema(
        spec.table,
        format!("{PROCESSED_PREFIX}/{}", spec.name),
        spec.schema,
    )
}

/// Declare every dataset table in the catalog and refresh partition
/// discovery so the freshly promoted Parquet files are visible. Catalog
/// errors are stage-fatal: a query over an unregistered table cannot work.
#[instrument(skip(query))]
pub async fn run(query: &dyn QueryService) -> Result<()> {
    for spec in DATASETS {
        let table = table_for(spec);
        query.register_table(&table).await?;
        query.refresh_partitions(&table.name).await?;
        info!(table = %table.name, location = %table.location, "registered table");
    }
    Ok(())
}
