use crate::config::Settings;
use crate::constants::RUN_LOCK_KEY;
use crate::error::{EtlError, Result};
use crate::pipeline::{catalog, export, extract, join, normalize, publish, raw_store};
use crate::storage::ObjectStore;
use crate::types::{DatasetProvider, ExtractPublisher, QueryService};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

/// Everything a pipeline run needs: settings plus one implementation of
/// each capability trait, and a run id that scopes the staged output.
pub struct PipelineContext {
    pub settings: Settings,
    pub store: Arc<dyn ObjectStore>,
    pub query: Arc<dyn QueryService>,
    pub provider: Arc<dyn DatasetProvider>,
    pub publisher: Arc<dyn ExtractPublisher>,
    pub run_id: String,
}

impl PipelineContext {
    pub fn new(
        settings: Settings,
        store: Arc<dyn ObjectStore>,
        query: Arc<dyn QueryService>,
        provider: Arc<dyn DatasetProvider>,
        publisher: Arc<dyn ExtractPublisher>,
    ) -> Self {
        Self {
            settings,
            store,
            query,
            provider,
            publisher,
            run_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Run all seven stages in order under the single-run lock. The first stage
/// error stops the run; retrying is the scheduler's job, not ours. The lock
/// is released whether the run succeeded or not.
pub async fn run_all(ctx: &PipelineContext) -> Result<()> {
    if !ctx
        .store
        .put_if_absent(RUN_LOCK_KEY, ctx.run_id.as_bytes())
        .await?
    {
        return Err(EtlError::RunLocked);
    }
    let started = Instant::now();
    let result = run_stages(ctx).await;
    if let Err(e) = ctx.store.delete(RUN_LOCK_KEY).await {
        error!("failed to release run lock: {e}");
    }
    match &result {
        Ok(()) => {
            info!(run_id = %ctx.run_id, elapsed = ?started.elapsed(), "pipeline run complete");
            metrics::histogram!("etl_run_duration_seconds")
                .record(started.elapsed().as_secs_f64());
        }
        Err(e) => error!(run_id = %ctx.run_id, "pipeline run failed: {e}"),
    }
    result
}

async fn run_stages(ctx: &PipelineContext) -> Result<()> {
    let staging = Path::new(&ctx.settings.pipeline.staging_dir);
    info!(run_id = %ctx.run_id, "starting pipeline run");

    extract::run(ctx.provider.as_ref(), staging).await?;
    raw_store::run(ctx.store.as_ref(), staging).await?;
    normalize::run(ctx.store.as_ref(), &ctx.run_id).await?;
    catalog::run(ctx.query.as_ref()).await?;
    join::run(ctx.store.as_ref(), ctx.query.as_ref(), &ctx.run_id).await?;
    export::run(ctx.store.as_ref(), ctx.query.as_ref(), &ctx.settings).await?;
    publish::run(
        ctx.store.as_ref(),
        ctx.publisher.as_ref(),
        &ctx.settings.publish,
    )
    .await?;
    Ok(())
}
