use crate::constants::{PART_FILE, PROCESSED_PREFIX, RUNS_PREFIX};
use crate::datasets::{canonicalize, DatasetSpec, DATASETS};
use crate::error::{EtlError, Result};
use crate::frame::Frame;
use crate::parquet_io;
use crate::storage::ObjectStore;
use tracing::{error, info, instrument, warn};

const DATE_PATTERN: &str = "%Y-%m-%d";
const INDEX_COLUMN: &str = "_c0";

#[derive(Debug)]
pub struct DatasetReport {
    pub dataset: &'static str,
    pub rows_written: usize,
    pub malformed_rows: usize,
    pub null_rows_dropped: usize,
    pub duplicate_rows_dropped: usize,
}

#[derive(Debug, Default)]
pub struct NormalizeStats {
    pub reports: Vec<DatasetReport>,
    pub failed: Vec<&'static str>,
}

/// Normalize every dataset from its raw CSVs into one Parquet file under
/// `PROCESSED_DATA/<dataset>/`. Datasets are isolated: a failure in one is
/// logged and the siblings continue; the stage only errors when nothing at
/// all was produced.
#[instrument(skip(store))]
pub async fn run(store: &dyn ObjectStore, run_id: &str) -> Result<NormalizeStats> {
    let mut stats = NormalizeStats::default();
    for spec in DATASETS {
        match normalize_dataset(store, run_id, spec).await {
            Ok(report) => {
                metrics::counter!("etl_rows_normalized")
                    .increment(report.rows_written as u64);
                metrics::counter!("etl_rows_dropped").increment(
                    (report.malformed_rows
                        + report.null_rows_dropped
                        + report.duplicate_rows_dropped) as u64,
                );
                stats.reports.push(report);
            }
            Err(e) => {
                error!(dataset = spec.name, "normalization failed: {e}");
                stats.failed.push(spec.name);
            }
        }
    }
    if stats.reports.is_empty() {
        return Err(EtlError::Storage(
            "normalization produced no datasets".to_string(),
        ));
    }
    Ok(stats)
}

async fn normalize_dataset(
    store: &dyn ObjectStore,
    run_id: &str,
    spec: &DatasetSpec,
) -> Result<DatasetReport> {
    let raw_prefix = format!("{}/{}", crate::constants::RAW_PREFIX, spec.name);
    let keys: Vec<String> = store
        .list(&raw_prefix)
        .await?
        .into_iter()
        .filter(|k| k.to_lowercase().ends_with(".csv"))
        .collect();
    if keys.is_empty() {
        return Err(EtlError::Storage(format!("no raw CSV files under {raw_prefix}")));
    }

    // Multiple files for one dataset are concatenated; later files bind to
    // the schema the first file inferred.
    let mut combined: Option<Frame> = None;
    let mut malformed = 0usize;
    for key in &keys {
        let bytes = store.get(key).await?;
        let (frame, bad) = Frame::from_csv(&bytes)?;
        malformed += bad;
        combined = Some(match combined {
            None => frame,
            Some(mut acc) => {
                let aligned = frame.align_to_schema(&acc.columns);
                acc.concat(aligned)?;
                acc
            }
        });
    }
    let frame = combined.unwrap_or_else(|| Frame::new(Vec::new()));

    let (frame, mut report) = apply(spec, frame)?;
    report.malformed_rows = malformed;

    let run_prefix = format!("{RUNS_PREFIX}/{run_id}/{PROCESSED_PREFIX}/{}", spec.name);
    let live_prefix = format!("{PROCESSED_PREFIX}/{}", spec.name);
    let bytes = parquet_io::frame_to_parquet(&frame)?;
    store.put(&format!("{run_prefix}/{PART_FILE}"), &bytes).await?;
    store.promote(&run_prefix, &live_prefix).await?;

    info!(
        dataset = spec.name,
        rows = report.rows_written,
        malformed = report.malformed_rows,
        nulls_dropped = report.null_rows_dropped,
        duplicates_dropped = report.duplicate_rows_dropped,
        "normalized dataset"
    );
    Ok(report)
}

/// The pure normalization recipe for one dataset: canonicalize column names,
/// reparse declared date columns, drop the positional index column where the
/// source carries one, then drop null rows and exact duplicates.
pub fn apply(spec: &DatasetSpec, mut frame: Frame) -> Result<(Frame, DatasetReport)> {
    frame.rename_columns(|name| canonicalize(name, spec.policy));
    for column in spec.date_columns {
        let canonical = canonicalize(column, spec.policy);
        frame.reparse_date(&canonical, DATE_PATTERN)?;
    }
    if spec.drop_index_column {
        frame.drop_column(INDEX_COLUMN);
    }
    let null_rows_dropped = frame.drop_null_rows();
    let duplicate_rows_dropped = frame.drop_duplicate_rows();
    if frame.is_empty() {
        warn!(dataset = spec.name, "dataset is empty after normalization");
    }
    let report = DatasetReport {
        dataset: spec.name,
        rows_written: frame.rows.len(),
        malformed_rows: 0,
        null_rows_dropped,
        duplicate_rows_dropped,
    };
    Ok((frame, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::by_name;
    use crate::storage::{InMemoryObjectStore, ObjectStore};

    #[test]
    fn heart_dataset_drops_index_column_and_snake_cases() {
        let spec = by_name("Heart_Data").unwrap();
        let data = b",age,Max Heart Rate\n0,45,170\n1,50,150\n1,50,150\n";
        let (frame, _) = Frame::from_csv(data).unwrap();
        let (out, report) = apply(spec, frame).unwrap();
        assert_eq!(out.column_names(), vec!["age", "max_heart_rate"]);
        assert_eq!(out.rows.len(), 2);
        assert_eq!(report.duplicate_rows_dropped, 1);
    }

    #[test]
    fn food_dataset_truncates_names_and_reparses_dates() {
        let spec = by_name("Daily_Food_Nutrition_Dataset").unwrap();
        let data =
            b"Date,User_ID,Calories (kcal)\n2024-01-05,1,520\nnot-a-date,2,410\n";
        let (frame, _) = Frame::from_csv(data).unwrap();
        let (out, report) = apply(spec, frame).unwrap();
        assert_eq!(out.column_names(), vec!["Date", "User_ID", "Calories"]);
        // the unparseable date became null and fell out at the null-drop
        assert_eq!(out.rows.len(), 1);
        assert_eq!(report.null_rows_dropped, 1);
    }

    #[test]
    fn all_null_rows_leave_an_empty_dataset_without_erroring() {
        let spec = by_name("User_Fitness_Activity_Data").unwrap();
        // every data row carries at least one null, so the null-drop
        // empties the dataset; that is a warning, not a failure
        let data = b"User_ID,Steps\n1,\n,9500\n";
        let (frame, _) = Frame::from_csv(data).unwrap();
        let (out, report) = apply(spec, frame).unwrap();
        assert!(out.is_empty());
        assert_eq!(report.rows_written, 0);
        assert_eq!(report.null_rows_dropped, 2);
        // an empty frame still serializes, so the stage can promote it
        assert!(parquet_io::frame_to_parquet(&out).is_ok());
    }

    #[test]
    fn normalization_is_idempotent_on_identical_input() {
        let spec = by_name("Sleep_Data").unwrap();
        let data = b"Person ID,Sleep Duration\n1,7.5\n2,6.1\n";
        let (a, _) = Frame::from_csv(data).unwrap();
        let (b, _) = Frame::from_csv(data).unwrap();
        let (out_a, _) = apply(spec, a).unwrap();
        let (out_b, _) = apply(spec, b).unwrap();
        assert_eq!(out_a, out_b);
        assert_eq!(
            parquet_io::frame_to_parquet(&out_a).unwrap(),
            parquet_io::frame_to_parquet(&out_b).unwrap()
        );
    }

    #[tokio::test]
    async fn one_broken_dataset_does_not_stop_the_others() {
        let store = InMemoryObjectStore::new();
        // Only the sleep dataset has raw data; the other four will fail with
        // a missing-prefix error and be reported, not propagated.
        store
            .put(
                "ROW_DATA/Sleep_Data/sleep.csv",
                b"Person ID,Gender,Age,Occupation,Sleep Duration,Quality of Sleep,\
Physical Activity Level,Stress Level,BMI Category,Blood Pressure,Heart Rate,\
Daily Steps,Sleep Disorder\n1,Male,29,Engineer,7.5,8,60,4,Normal,120/80,70,8000,None\n",
            )
            .await
            .unwrap();

        let stats = run(&store, "run-1").await.unwrap();
        assert_eq!(stats.reports.len(), 1);
        assert_eq!(stats.failed.len(), 4);
        assert!(store
            .get("PROCESSED_DATA/Sleep_Data/part-00000.parquet")
            .await
            .is_ok());
        // nothing left under the run prefix after promotion
        assert!(store.list("RUNS").await.unwrap().is_empty());
    }
}
