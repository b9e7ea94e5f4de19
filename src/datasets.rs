use crate::types::ColumnType;

use ColumnType::{Date, Double, Int, Str};

/// How raw column names are canonicalized for a dataset. The original feeds
/// carried two conventions, so the policy is an explicit per-dataset value
/// rather than an accident of the transform code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnPolicy {
    /// Lowercase, interior spaces become underscores: "Sleep Duration" ->
    /// "sleep_duration".
    SnakeCase,
    /// Truncate to the first whitespace-delimited token, case kept:
    /// "Total Cholesterol Level" -> "Total".
    FirstToken,
}

pub fn canonicalize(name: &str, policy: ColumnPolicy) -> String {
    match policy {
        ColumnPolicy::SnakeCase => name.trim().to_lowercase().replace(' ', "_"),
        ColumnPolicy::FirstToken => {
            name.split_whitespace().next().unwrap_or_default().to_string()
        }
    }
}

/// Everything the pipeline knows about one source dataset: where it comes
/// from, how to normalize it, and the fixed schema it is cataloged with.
/// The catalog schema is hand-specified, never re-inferred from the data.
#[derive(Debug)]
pub struct DatasetSpec {
    /// Directory name used for staging and storage partitioning.
    pub name: &'static str,
    /// Provider slug for the download API.
    pub slug: &'static str,
    /// Catalog table name.
    pub table: &'static str,
    pub policy: ColumnPolicy,
    /// Columns reparsed from a fixed `%Y-%m-%d` pattern after renaming.
    pub date_columns: &'static [&'static str],
    /// Whether a positional artifact column is dropped when present.
    pub drop_index_column: bool,
    /// Declared catalog schema, lowercase identifiers.
    pub schema: &'static [(&'static str, ColumnType)],
}

pub static DATASETS: &[DatasetSpec] = &[
    DatasetSpec {
        name: "Cardiovascular_Data",
        slug: "mamta1999/cardiovascular-risk-data",
        table: "cardiovascular_data",
        policy: ColumnPolicy::SnakeCase,
        date_columns: &[],
        drop_index_column: false,
        schema: &[
            ("id", Int),
            ("age", Int),
            ("education", Double),
            ("sex", Str),
            ("is_smoking", Str),
            ("cigsperday", Double),
            ("bpmeds", Double),
            ("prevalentstroke", Int),
            ("prevalenthyp", Int),
            ("diabetes", Int),
            ("totchol", Double),
            ("sysbp", Double),
            ("diabp", Double),
            ("bmi", Double),
            ("heartrate", Double),
            ("glucose", Double),
            ("tenyearchd", Int),
        ],
    },
    DatasetSpec {
        name: "Daily_Food_Nutrition_Dataset",
        slug: "adilshamim8/daily-food-and-nutrition-dataset",
        table: "daily_food_nutrition_data",
        policy: ColumnPolicy::FirstToken,
        date_columns: &["Date"],
        drop_index_column: false,
        schema: &[
            ("date", Date),
            ("user_id", Int),
            ("food_item", Str),
            ("category", Str),
            ("calories", Int),
            ("protein", Double),
            ("carbohydrates", Double),
            ("fat", Double),
            ("fiber", Double),
            ("sugars", Double),
            ("sodium", Int),
            ("cholesterol", Int),
            ("meal_type", Str),
            ("water_intake", Int),
        ],
    },
    DatasetSpec {
        name: "Heart_Data",
        slug: "winson13/heart-disease-dataset",
        table: "heart_data",
        policy: ColumnPolicy::SnakeCase,
        date_columns: &[],
        drop_index_column: true,
        schema: &[
            ("age", Int),
            ("sex", Int),
            ("chest_pain_type", Int),
            ("resting_bps", Int),
            ("cholesterol", Double),
            ("fasting_blood_sugar", Int),
            ("resting_ecg", Int),
            ("max_heart_rate", Int),
            ("exercise_angina", Int),
            ("oldpeak", Double),
            ("st_slope", Int),
            ("target", Int),
        ],
    },
    DatasetSpec {
        name: "Sleep_Data",
        slug: "uom190346a/sleep-health-and-lifestyle-dataset",
        table: "sleep_data",
        policy: ColumnPolicy::SnakeCase,
        date_columns: &[],
        drop_index_column: false,
        schema: &[
            ("person_id", Int),
            ("gender", Str),
            ("age", Int),
            ("occupation", Str),
            ("sleep_duration", Double),
            ("quality_of_sleep", Int),
            ("physical_activity_level", Int),
            ("stress_level", Int),
            ("bmi_category", Str),
            ("blood_pressure", Str),
            ("heart_rate", Int),
            ("daily_steps", Int),
            ("sleep_disorder", Str),
        ],
    },
    DatasetSpec {
        name: "User_Fitness_Activity_Data",
        slug: "fajobgiua/fitness-tracker-data",
        table: "fitness_data",
        policy: ColumnPolicy::SnakeCase,
        date_columns: &[],
        drop_index_column: false,
        schema: &[
            ("user_id", Int),
            ("steps", Int),
            ("heart_rate", Int),
            ("calories_burned", Int),
            ("bmi", Double),
            ("workout_intensity", Str),
            ("active_minutes", Int),
        ],
    },
];

/// Projection of the joined analytical table, in output order.
pub static ANALYSIS_SCHEMA: &[(&str, ColumnType)] = &[
    ("user_id", Int),
    ("age", Int),
    ("sex", Str),
    ("bmi", Double),
    ("sysbp", Double),
    ("diabp", Double),
    ("glucose", Double),
    ("tenyearchd", Int),
    ("food_item", Str),
    ("calories", Int),
    ("protein", Double),
    ("fat", Double),
    ("steps", Int),
    ("heart_rate", Int),
    ("active_minutes", Int),
    ("cholesterol", Double),
    ("max_heart_rate", Int),
    ("exercise_angina", Int),
    ("sleep_duration", Double),
    ("stress_level", Int),
    ("quality_of_sleep", Int),
];

pub fn by_name(name: &str) -> Option<&'static DatasetSpec> {
    DATASETS.iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_policy_lowercases_and_underscores() {
        assert_eq!(canonicalize("Sleep Duration", ColumnPolicy::SnakeCase), "sleep_duration");
        assert_eq!(canonicalize("sysBP", ColumnPolicy::SnakeCase), "sysbp");
        assert_eq!(canonicalize("id", ColumnPolicy::SnakeCase), "id");
    }

    #[test]
    fn first_token_policy_keeps_case_and_truncates() {
        assert_eq!(
            canonicalize("Total Cholesterol Level", ColumnPolicy::FirstToken),
            "Total"
        );
        assert_eq!(canonicalize("Calories (kcal)", ColumnPolicy::FirstToken), "Calories");
        assert_eq!(canonicalize("User_ID", ColumnPolicy::FirstToken), "User_ID");
    }

    #[test]
    fn registry_covers_all_five_datasets() {
        assert_eq!(DATASETS.len(), 5);
        assert_eq!(by_name("Heart_Data").unwrap().table, "heart_data");
        assert!(by_name("Heart_Data").unwrap().drop_index_column);

        let widths: Vec<usize> = DATASETS.iter().map(|d| d.schema.len()).collect();
        assert_eq!(widths, vec![17, 14, 12, 13, 7]);
        assert_eq!(ANALYSIS_SCHEMA.len(), 21);
    }
}
