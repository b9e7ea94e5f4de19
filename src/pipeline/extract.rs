use crate::datasets::DATASETS;
use crate::error::{EtlError, Result};
use crate::types::DatasetProvider;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tracing::{info, instrument};

/// Download every dataset archive and unpack it into
/// `<staging_dir>/<dataset>/`. Any failure here is stage-fatal: the rest of
/// the pipeline has nothing to work with if a source is missing.
#[instrument(skip(provider))]
pub async fn run(provider: &dyn DatasetProvider, staging_dir: &Path) -> Result<usize> {
    let mut extracted = 0usize;
    for spec in DATASETS {
        let archive = provider.fetch_dataset(spec.slug).await?;
        let target = staging_dir.join(spec.name);
        let count = unpack_archive(&archive, &target)?;
        info!(dataset = spec.name, files = count, "unpacked dataset archive");
        metrics::counter!("etl_files_extracted").increment(count as u64);
        extracted += count;
    }
    Ok(extracted)
}

/// Unpack a zip archive into a directory, flattening is not performed; entry
/// paths are sanitized so an archive cannot write outside the target.
pub fn unpack_archive(bytes: &[u8], target: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    fs::create_dir_all(target)?;
    let mut count = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                return Err(EtlError::Storage(format!(
                    "archive entry has an unsafe path: {}",
                    entry.name()
                )))
            }
        };
        let out_path = target.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&out_path)?;
        std::io::copy(&mut entry, &mut file)?;
        count += 1;
    }
    Ok(count)
}
