use async_trait::async_trait;
use health_etl::config::Settings;
use health_etl::constants::{EXPORT_KEY, RUN_LOCK_KEY};
use health_etl::datasets::ANALYSIS_SCHEMA;
use health_etl::error::{EtlError, Result};
use health_etl::pipeline::{tasks, PipelineContext};
use health_etl::query_local::LocalQueryService;
use health_etl::storage::{InMemoryObjectStore, ObjectStore};
use health_etl::types::{DatasetProvider, Extract, ExtractPublisher, PublishOutcome};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zip::write::FileOptions;

// Three overlapping subjects:
//   id 1 (age 45): present in every dataset
//   id 2 (age 50): no food rows
//   id 3 (age 60): no sleep row, age 60 absent from the heart table
// Only subject 1 has a fully populated joined row.

const CARDIO_CSV: &str = "\
id,age,education,sex,is_smoking,cigsPerDay,BPMeds,prevalentStroke,prevalentHyp,diabetes,totChol,sysBP,diaBP,BMI,heartRate,glucose,TenYearCHD
1,45,2,M,NO,0,0,0,0,0,195,120,80,24.5,70,90,0
2,50,3,F,NO,0,0,0,0,0,210,130,85,26.1,72,95,1
3,60,1,M,YES,10,0,0,1,0,250,140,90,28.0,75,100,1
";

const FOOD_CSV: &str = "\
Date,User_ID,Food_Item,Category,Calories (kcal),Protein (g),Carbohydrates (g),Fat (g),Fiber (g),Sugars (g),Sodium (mg),Cholesterol (mg),Meal_Type,Water_Intake (ml)
2024-01-05,1,Oatmeal,Breakfast,520,30.2,60.1,12.4,5.0,10.2,300,20,Breakfast,250
2024-01-06,3,Salad,Lunch,410,12.0,35.5,8.8,4.2,6.1,250,10,Lunch,300
";

const HEART_CSV: &str = "\
,age,sex,chest pain type,resting bps,cholesterol,fasting blood sugar,resting ecg,max heart rate,exercise angina,oldpeak,ST slope,target
0,45,1,2,120,200,0,0,170,0,1.2,2,1
1,50,0,3,130,233,1,0,150,0,2.3,1,1
";

const SLEEP_CSV: &str = "\
Person ID,Gender,Age,Occupation,Sleep Duration,Quality of Sleep,Physical Activity Level,Stress Level,BMI Category,Blood Pressure,Heart Rate,Daily Steps,Sleep Disorder
1,Male,29,Engineer,7.5,8,60,4,Normal,120/80,70,8000,None
2,Female,31,Doctor,6.1,6,45,7,Overweight,125/80,75,6000,Insomnia
";

const FITNESS_CSV: &str = "\
User_ID,Steps,Heart_Rate,Calories_Burned,BMI,Workout_Intensity,Active_Minutes
1,8000,70,300,24.5,Moderate,45
2,9500,72,350,26.1,High,60
3,4000,68,200,28.0,Low,25
";

fn zip_with(name: &str, content: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file(name, FileOptions::default()).unwrap();
    writer.write_all(content.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

struct ZipProvider {
    archives: HashMap<&'static str, Vec<u8>>,
}

impl ZipProvider {
    fn with_all_datasets() -> Self {
        let mut archives = HashMap::new();
        archives.insert(
            "mamta1999/cardiovascular-risk-data",
            zip_with("cardio.csv", CARDIO_CSV),
        );
        archives.insert(
            "adilshamim8/daily-food-and-nutrition-dataset",
            zip_with("food.csv", FOOD_CSV),
        );
        archives.insert("winson13/heart-disease-dataset", zip_with("heart.csv", HEART_CSV));
        archives.insert(
            "uom190346a/sleep-health-and-lifestyle-dataset",
            zip_with("sleep.csv", SLEEP_CSV),
        );
        archives.insert("fajobgiua/fitness-tracker-data", zip_with("fitness.csv", FITNESS_CSV));
        Self { archives }
    }
}

#[async_trait]
impl DatasetProvider for ZipProvider {
    async fn fetch_dataset(&self, slug: &str) -> Result<Vec<u8>> {
        self.archives
            .get(slug)
            .cloned()
            .ok_or_else(|| EtlError::Api { message: format!("no archive for {slug}") })
    }
}

struct BrokenProvider;

#[async_trait]
impl DatasetProvider for BrokenProvider {
    async fn fetch_dataset(&self, slug: &str) -> Result<Vec<u8>> {
        Err(EtlError::Api { message: format!("download failed for {slug}") })
    }
}

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<(String, String, Extract)>>,
}

#[async_trait]
impl ExtractPublisher for RecordingPublisher {
    async fn publish(
        &self,
        project: &str,
        name: &str,
        extract: &Extract,
    ) -> Result<PublishOutcome> {
        self.published.lock().unwrap().push((
            project.to_string(),
            name.to_string(),
            extract.clone(),
        ));
        Ok(PublishOutcome::Published)
    }
}

async fn build_context(
    staging: &TempDir,
    store: Arc<InMemoryObjectStore>,
    provider: Arc<dyn DatasetProvider>,
    publisher: Arc<RecordingPublisher>,
) -> PipelineContext {
    let mut settings = Settings::default();
    settings.pipeline.staging_dir = staging.path().to_string_lossy().to_string();
    let query = Arc::new(LocalQueryService::open(store.clone()).await.unwrap());
    PipelineContext::new(settings, store, query, provider, publisher)
}

#[tokio::test]
async fn full_run_produces_exactly_one_complete_subject() {
    let staging = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let ctx = build_context(
        &staging,
        store.clone(),
        Arc::new(ZipProvider::with_all_datasets()),
        publisher.clone(),
    )
    .await;

    tasks::run_all(&ctx).await.unwrap();

    // the export landed at the fixed key
    assert!(store.get(EXPORT_KEY).await.is_ok());
    // the run lock was released
    assert!(store.get(RUN_LOCK_KEY).await.is_err());
    // nothing lingers under the run-scoped prefix
    assert!(store.list("RUNS").await.unwrap().is_empty());

    let published = publisher.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    let (project, name, extract) = &published[0];
    assert_eq!(project, "project1");
    assert_eq!(name, "health_analysis");

    let expected_columns: Vec<String> =
        ANALYSIS_SCHEMA.iter().map(|(n, _)| n.to_string()).collect();
    assert_eq!(extract.columns, expected_columns);

    // only subject 1 survived the null-drop after the join chain
    assert_eq!(extract.rows.len(), 1);
    let row = &extract.rows[0];
    assert_eq!(row[0], "1"); // user_id
    assert_eq!(row[1], "45"); // age
    assert_eq!(row[8], "Oatmeal"); // food_item
    assert_eq!(row[15], "200"); // cholesterol
    assert_eq!(row[18], "7.5"); // sleep_duration
}

#[tokio::test]
async fn a_failed_download_halts_the_run_before_any_write() {
    let staging = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new());
    let publisher = Arc::new(RecordingPublisher::default());
    let ctx = build_context(&staging, store.clone(), Arc::new(BrokenProvider), publisher.clone())
        .await;

    assert!(tasks::run_all(&ctx).await.is_err());

    // no downstream stage ran: storage is untouched apart from the lock,
    // which was released again
    assert!(store.list("ROW_DATA").await.unwrap().is_empty());
    assert!(store.list("PROCESSED_DATA").await.unwrap().is_empty());
    assert!(store.get(RUN_LOCK_KEY).await.is_err());
    assert!(publisher.published.lock().unwrap().is_empty());
}
