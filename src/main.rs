use clap::{Parser, Subcommand};
use health_etl::config::Settings;
use health_etl::error::{EtlError, Result};
use health_etl::infra::{HttpExtractPublisher, HttpObjectStore, HttpQueryService, KaggleProvider};
use health_etl::logging::init_logging;
use health_etl::pipeline::{self, PipelineContext};
use health_etl::query_local::LocalQueryService;
use health_etl::storage::{FsObjectStore, ObjectStore};
use health_etl::types::{PublishOutcome, QueryService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "health_etl")]
#[command(about = "Batch ETL pipeline joining public health and fitness datasets")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every dataset archive and unpack it into the staging dir
    Extract,
    /// Upload staged files to raw object storage
    LoadRaw,
    /// Normalize raw CSVs into Parquet under the processed prefix
    Transform,
    /// Register the dataset tables in the catalog
    Register,
    /// Join the datasets into the analytical table
    Join,
    /// Query the analytical table and upload the export
    Export,
    /// Publish the export to the BI server
    Publish,
    /// Run all stages in order under the run lock
    Run,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_logging();
    // Stage counters and histograms go through the `metrics` facade; they
    // are no-ops unless the embedding host installs a recorder.

    let cli = Cli::parse();
    if let Err(e) = execute(cli).await {
        error!("command failed: {e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    let staging = Path::new(&settings.pipeline.staging_dir).to_path_buf();
    let run_id = Uuid::new_v4().to_string();

    match cli.command {
        Commands::Extract => {
            let provider = KaggleProvider::from_env()?;
            let files = pipeline::extract::run(&provider, &staging).await?;
            println!("Extracted {files} file(s) into {}", staging.display());
        }
        Commands::LoadRaw => {
            let store = build_store(&settings)?;
            let uploaded = pipeline::raw_store::run(store.as_ref(), &staging).await?;
            println!("Uploaded {uploaded} raw file(s)");
        }
        Commands::Transform => {
            let store = build_store(&settings)?;
            let stats = pipeline::normalize::run(store.as_ref(), &run_id).await?;
            for report in &stats.reports {
                println!(
                    "{}: {} row(s) written ({} malformed, {} null, {} duplicate dropped)",
                    report.dataset,
                    report.rows_written,
                    report.malformed_rows,
                    report.null_rows_dropped,
                    report.duplicate_rows_dropped
                );
            }
            for failed in &stats.failed {
                println!("{failed}: FAILED (see logs)");
            }
        }
        Commands::Register => {
            let store = build_store(&settings)?;
            let query = build_query(&settings, store).await?;
            pipeline::catalog::run(query.as_ref()).await?;
            println!("Registered all dataset tables");
        }
        Commands::Join => {
            let store = build_store(&settings)?;
            let query = build_query(&settings, store.clone()).await?;
            let rows = pipeline::join::run(store.as_ref(), query.as_ref(), &run_id).await?;
            println!("Joined analytical table: {rows} row(s)");
        }
        Commands::Export => {
            let store = build_store(&settings)?;
            let query = build_query(&settings, store.clone()).await?;
            let rows = pipeline::export::run(store.as_ref(), query.as_ref(), &settings).await?;
            println!("Exported {rows} row(s)");
        }
        Commands::Publish => {
            let store = build_store(&settings)?;
            let publisher = HttpExtractPublisher::from_env()?;
            match pipeline::publish::run(store.as_ref(), &publisher, &settings.publish).await? {
                PublishOutcome::Published => println!(
                    "Published extract '{}' to project '{}'",
                    settings.publish.extract_name, settings.publish.project
                ),
                PublishOutcome::ProjectNotFound => println!(
                    "Project '{}' not found, publish skipped",
                    settings.publish.project
                ),
            }
        }
        Commands::Run => {
            let store = build_store(&settings)?;
            let query = build_query(&settings, store.clone()).await?;
            let ctx = PipelineContext::new(
                settings,
                store,
                query,
                Arc::new(KaggleProvider::from_env()?),
                Arc::new(HttpExtractPublisher::from_env()?),
            );
            pipeline::tasks::run_all(&ctx).await?;
            println!("Pipeline run {} complete", ctx.run_id);
        }
    }
    Ok(())
}

fn build_store(settings: &Settings) -> Result<Arc<dyn ObjectStore>> {
    match settings.storage.backend.as_str() {
        "fs" => Ok(Arc::new(FsObjectStore::new(&settings.storage.root))),
        "http" => Ok(Arc::new(HttpObjectStore::from_env()?)),
        other => Err(EtlError::Config(format!("unknown storage backend: {other}"))),
    }
}

async fn build_query(
    settings: &Settings,
    store: Arc<dyn ObjectStore>,
) -> Result<Arc<dyn QueryService>> {
    match settings.query.backend.as_str() {
        "local" => Ok(Arc::new(LocalQueryService::open(store).await?)),
        "http" => Ok(Arc::new(HttpQueryService::from_env(&settings.query.database)?)),
        other => Err(EtlError::Config(format!("unknown query backend: {other}"))),
    }
}
