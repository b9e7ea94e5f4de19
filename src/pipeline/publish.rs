use crate::config::PublishSettings;
use crate::constants::EXPORT_KEY;
use crate::error::Result;
use crate::parquet_io;
use crate::storage::ObjectStore;
use crate::types::{Extract, ExtractPublisher, PublishOutcome};
use tracing::{info, instrument, warn};

/// Push the exported table to the BI server as an all-text extract. A
/// missing BI project is reported and skipped, not an error: the data run
/// itself succeeded.
#[instrument(skip(store, publisher, settings))]
pub async fn run(
    store: &dyn ObjectStore,
    publisher: &dyn ExtractPublisher,
    settings: &PublishSettings,
) -> Result<PublishOutcome> {
    let bytes = store.get(EXPORT_KEY).await?;
    let frame = parquet_io::parquet_to_frame(&bytes)?;
    let extract = Extract {
        columns: frame.column_names(),
        rows: frame
            .rows
            .iter()
            .map(|row| row.iter().map(|v| v.render()).collect())
            .collect(),
    };

    let outcome = publisher
        .publish(&settings.project, &settings.extract_name, &extract)
        .await?;
    match outcome {
        PublishOutcome::Published => {
            info!(
                project = %settings.project,
                extract = %settings.extract_name,
                rows = extract.rows.len(),
                "published extract"
            );
        }
        PublishOutcome::ProjectNotFound => {
            warn!(project = %settings.project, "BI project not found, skipping publish");
        }
    }
    Ok(outcome)
}
