use crate::constants::RAW_PREFIX;
use crate::datasets::DATASETS;
use crate::error::Result;
use crate::storage::ObjectStore;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, instrument};

/// Upload every staged file to `ROW_DATA/<dataset>/<file>`. Failures are
/// isolated per file: one unreadable or unuploadable file is logged and the
/// rest continue.
#[instrument(skip(store))]
pub async fn run(store: &dyn ObjectStore, staging_dir: &Path) -> Result<usize> {
    let mut uploaded = 0usize;
    for spec in DATASETS {
        let dir = staging_dir.join(spec.name);
        if !dir.is_dir() {
            info!(dataset = spec.name, "no staged files, skipping");
            continue;
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            let key = format!("{RAW_PREFIX}/{}/{}", spec.name, file_name);
            match upload_file(store, &path, &key).await {
                Ok(()) => uploaded += 1,
                Err(e) => error!(key = %key, "raw upload failed: {e}"),
            }
        }
    }
    metrics::counter!("etl_raw_files_uploaded").increment(uploaded as u64);
    info!(uploaded, "raw load complete");
    Ok(uploaded)
}

async fn upload_file(store: &dyn ObjectStore, path: &Path, key: &str) -> Result<()> {
    let bytes = fs::read(path)?;
    let digest = hex::encode(Sha256::digest(&bytes));
    debug!(key = %key, digest = %digest, size = bytes.len(), "uploading raw file");
    store.put(key, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryObjectStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn stages_every_dataset_file_under_the_raw_prefix() {
        let dir = tempdir().unwrap();
        let heart = dir.path().join("Heart_Data");
        fs::create_dir_all(&heart).unwrap();
        fs::write(heart.join("heart.csv"), "age\n45\n").unwrap();

        let store = InMemoryObjectStore::new();
        let uploaded = run(&store, dir.path()).await.unwrap();
        assert_eq!(uploaded, 1);
        assert_eq!(store.get("ROW_DATA/Heart_Data/heart.csv").await.unwrap(), b"age\n45\n");
    }
}
