use crate::constants::{ANALYSIS_PREFIX, ANALYSIS_TABLE, PART_FILE, PROCESSED_PREFIX, RUNS_PREFIX};
use crate::datasets::{by_name, DatasetSpec, ANALYSIS_SCHEMA};
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::parquet_io;
use crate::storage::ObjectStore;
use crate::types::{QueryService, TableDef};
use tracing::{info, instrument};

/// Output column for each aliased source column, in output order.
const PROJECTION: &[(&str, &str)] = &[
    ("cardio.id", "user_id"),
    ("cardio.age", "age"),
    ("cardio.sex", "sex"),
    ("cardio.bmi", "bmi"),
    ("cardio.sysbp", "sysbp"),
    ("cardio.diabp", "diabp"),
    ("cardio.glucose", "glucose"),
    ("cardio.tenyearchd", "tenyearchd"),
    ("food.food_item", "food_item"),
    ("food.calories", "calories"),
    ("food.protein", "protein"),
    ("food.fat", "fat"),
    ("fitness.steps", "steps"),
    ("fitness.heart_rate", "heart_rate"),
    ("fitness.active_minutes", "active_minutes"),
    ("heart.cholesterol", "cholesterol"),
    ("heart.max_heart_rate", "max_heart_rate"),
    ("heart.exercise_angina", "exercise_angina"),
    ("sleep.sleep_duration", "sleep_duration"),
    ("sleep.stress_level", "stress_level"),
    ("sleep.quality_of_sleep", "quality_of_sleep"),
];

/// Join all five normalized tables into the analytical table, materialize it
/// under the analysis prefix, and point the catalog definition at it. Any
/// failure is stage-fatal.
#[instrument(skip(store, query))]
pub async fn run(
    store: &dyn ObjectStore,
    query: &dyn QueryService,
    run_id: &str,
) -> Result<usize> {
    let cardio = load_table(store, dataset("Cardiovascular_Data")?).await?;
    let food = load_table(store, dataset("Daily_Food_Nutrition_Dataset")?).await?;
    let fitness = load_table(store, dataset("User_Fitness_Activity_Data")?).await?;
    let heart = load_table(store, dataset("Heart_Data")?).await?;
    let sleep = load_table(store, dataset("Sleep_Data")?).await?;

    let joined = join_frames(cardio, food, fitness, heart, sleep)?;
    let rows = joined.rows.len();
    metrics::counter!("etl_rows_joined").increment(rows as u64);

    let run_prefix = format!("{RUNS_PREFIX}/{run_id}/{ANALYSIS_PREFIX}/{ANALYSIS_TABLE}");
    let live_prefix = format!("{ANALYSIS_PREFIX}/{ANALYSIS_TABLE}");
    let bytes = parquet_io::frame_to_parquet(&joined)?;
    store.put(&format!("{run_prefix}/{PART_FILE}"), &bytes).await?;
    store.promote(&run_prefix, &live_prefix).await?;

    let table = TableDef::from_schema(ANALYSIS_TABLE, live_prefix.clone(), ANALYSIS_SCHEMA);
    query.replace_table(&table).await?;

    info!(rows, location = %live_prefix, "materialized analytical table");
    Ok(rows)
}

fn dataset(name: &str) -> Result<&'static DatasetSpec> {
    by_name(name).ok_or_else(|| EtlError::Schema(format!("unknown dataset: {name}")))
}

/// Read every Parquet part of a normalized dataset and bind it to the
/// declared catalog schema.
async fn load_table(store: &dyn ObjectStore, spec: &DatasetSpec) -> Result<Frame> {
    let location = format!("{PROCESSED_PREFIX}/{}", spec.name);
    let schema = TableDef::from_schema(spec.table, location.clone(), spec.schema).columns;
    let keys: Vec<String> = store
        .list(&location)
        .await?
        .into_iter()
        .filter(|k| k.ends_with(".parquet"))
        .collect();
    if keys.is_empty() {
        return Err(EtlError::Storage(format!("no normalized data under {location}")));
    }
    let mut frame = Frame::new(schema.clone());
    for key in &keys {
        let bytes = store.get(key).await?;
        let part = parquet_io::parquet_to_frame(&bytes)?.align_to_schema(&schema);
        frame.concat(part)?;
    }
    Ok(frame)
}

/// The pure join recipe: alias-qualify every column, run the left-join
/// chain anchored on the cardiovascular table, project the output columns,
/// then drop null rows and exact duplicates.
pub fn join_frames(
    mut cardio: Frame,
    mut food: Frame,
    mut fitness: Frame,
    mut heart: Frame,
    mut sleep: Frame,
) -> Result<Frame> {
    cardio.prefix_columns("cardio");
    food.prefix_columns("food");
    fitness.prefix_columns("fitness");
    heart.prefix_columns("heart");
    sleep.prefix_columns("sleep");

    let joined = cardio
        .left_join(&food, "cardio.id", "food.user_id")?
        .left_join(&fitness, "cardio.id", "fitness.user_id")?
        .left_join(&heart, "cardio.age", "heart.age")?
        .left_join(&sleep, "cardio.id", "sleep.person_id")?;

    let mut out = joined.select(PROJECTION)?;
    out.drop_null_rows();
    out.drop_duplicate_rows();
    Ok(out)
}
