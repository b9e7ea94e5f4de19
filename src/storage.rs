use crate::error::{EtlError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Object storage as the pipeline sees it: flat keys with `/` separators,
/// overwrite-on-put, plus the primitives for run-scoped promotion and the
/// single-run lock.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    /// All keys under a prefix, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
    /// Replace everything under `live_prefix` with the objects under
    /// `run_prefix`, then remove the run prefix.
    async fn promote(&self, run_prefix: &str, live_prefix: &str) -> Result<()>;
    /// Create an object only if the key does not exist. Returns whether the
    /// write happened.
    async fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<bool>;
}

/// Object store rooted in a local directory. Promotion is a directory
/// rename, so readers never observe a half-written live prefix.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        if key.split('/').any(|part| part == "..") {
            return Err(EtlError::Storage(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(key))
    }

    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::walk(&path, root, out)?;
            } else if let Ok(rel) = path.strip_prefix(root) {
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        debug!("wrote {} bytes to {}", bytes.len(), key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.key_path(key)?;
        fs::read(&path).map_err(|e| EtlError::Storage(format!("cannot read {key}: {e}")))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        Self::walk(&self.root, &self.root, &mut keys)?;
        let normalized = prefix.trim_end_matches('/');
        keys.retain(|k| {
            k == normalized || k.starts_with(&format!("{normalized}/")) || normalized.is_empty()
        });
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let path = self.key_path(prefix.trim_end_matches('/'))?;
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    async fn promote(&self, run_prefix: &str, live_prefix: &str) -> Result<()> {
        let run_dir = self.key_path(run_prefix.trim_end_matches('/'))?;
        let live_dir = self.key_path(live_prefix.trim_end_matches('/'))?;
        if !run_dir.is_dir() {
            return Err(EtlError::Storage(format!(
                "run prefix {run_prefix} does not exist, nothing to promote"
            )));
        }
        if let Some(parent) = live_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        // Swap the previous live directory out of the way first so the
        // final rename is a single atomic step.
        let retired = live_dir.with_extension("retired");
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }
        let had_previous = live_dir.exists();
        if had_previous {
            fs::rename(&live_dir, &retired)?;
        }
        fs::rename(&run_dir, &live_dir)?;
        if had_previous {
            fs::remove_dir_all(&retired)?;
        }
        debug!("promoted {} -> {}", run_prefix, live_prefix);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<bool> {
        let path = self.key_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                use std::io::Write;
                file.write_all(bytes)?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory object store for tests and dry runs.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| EtlError::Storage(format!("cannot read {key}: no such object")))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let normalized = prefix.trim_end_matches('/');
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .keys()
            .filter(|k| {
                normalized.is_empty()
                    || *k == normalized
                    || k.starts_with(&format!("{normalized}/"))
            })
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let normalized = prefix.trim_end_matches('/').to_string();
        let mut objects = self.objects.lock().unwrap();
        objects.retain(|k, _| {
            !(k == &normalized || k.starts_with(&format!("{normalized}/")))
        });
        Ok(())
    }

    async fn promote(&self, run_prefix: &str, live_prefix: &str) -> Result<()> {
        let run = run_prefix.trim_end_matches('/').to_string();
        let live = live_prefix.trim_end_matches('/').to_string();
        let mut objects = self.objects.lock().unwrap();
        let moved: Vec<(String, Vec<u8>)> = objects
            .iter()
            .filter(|(k, _)| k.starts_with(&format!("{run}/")))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if moved.is_empty() {
            return Err(EtlError::Storage(format!(
                "run prefix {run_prefix} does not exist, nothing to promote"
            )));
        }
        objects.retain(|k, _| !(k == &live || k.starts_with(&format!("{live}/"))));
        for (key, value) in moved {
            let suffix = key[run.len()..].to_string();
            objects.insert(format!("{live}{suffix}"), value);
            objects.remove(&key);
        }
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, bytes: &[u8]) -> Result<bool> {
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(key) {
            return Ok(false);
        }
        objects.insert(key.to_string(), bytes.to_vec());
        Ok(true)
    }
}
