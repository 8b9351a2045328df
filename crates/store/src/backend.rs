//! Storage backends: the capability trait, the filesystem and in-memory
//! implementations, and the registry used to construct clients from config.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{StorageClientConfig, StorageKind};
use crate::{Error, Result};

const WRITE_ATTEMPTS: usize = 3;

/// Capability set every storage backend provides.
///
/// Object store implementations are expected to use multipart uploads
/// (5 MiB parts) for large payloads and pre-signed URLs with a TTL of at
/// least one hour as access paths.
pub trait StorageBackend: Send + Sync {
    /// Create a directory and any missing parents. Idempotent.
    fn mkdirs(&self, dir: &str) -> Result<()>;

    /// Store a named blob under `dir`, returns the stored path.
    fn upload_bytes(&self, name: &str, bytes: &[u8], dir: &str) -> Result<String>;

    /// Store a local file under `dir`, returns the stored path.
    fn upload_file(&self, local: &Path, name: &str, dir: &str) -> Result<String>;

    /// Whether an object is present.
    fn exists(&self, path: &str) -> bool;

    /// Whether an object can actually be fetched. An access controlled object
    /// may exist without being accessible.
    fn is_accessible(&self, path: &str) -> bool;

    /// Remove an object. Removing an absent object is a success.
    fn delete(&self, path: &str) -> Result<()>;

    /// A locally openable path or a pre-signed URL, none when not accessible.
    fn access_path(&self, path: &str) -> Option<String>;

    fn size_of(&self, path: &str) -> Option<u64>;
}

/// Filesystem backend rooted at a base directory.
pub struct FsBackend {
    base: PathBuf,
}

impl FsBackend {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        FsBackend { base: base.into() }
    }

    pub fn from_params(params: &serde_json::Value) -> Result<Self> {
        let base = params
            .get("base_directory")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Config("fs storage requires a 'base_directory' parameter".to_string()))?;
        Ok(FsBackend::new(base))
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.base.join(path.trim_start_matches('/'))
    }

    fn write_with_retry(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        let mut last_err = None;
        for attempt in 1..=WRITE_ATTEMPTS {
            match std::fs::File::create(target).and_then(|mut file| file.write_all(bytes)) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    log::warn!("Write attempt {attempt}/{WRITE_ATTEMPTS} for {} failed: {err}", target.display());
                    last_err = Some(err);
                }
            }
        }

        Err(Error::Backend(format!(
            "Failed to write {}: {}",
            target.display(),
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

impl StorageBackend for FsBackend {
    fn mkdirs(&self, dir: &str) -> Result<()> {
        std::fs::create_dir_all(self.resolve(dir))?;
        Ok(())
    }

    fn upload_bytes(&self, name: &str, bytes: &[u8], dir: &str) -> Result<String> {
        self.mkdirs(dir)?;
        let stored = format!("{}/{name}", dir.trim_end_matches('/'));
        self.write_with_retry(&self.resolve(&stored), bytes)?;
        Ok(stored)
    }

    fn upload_file(&self, local: &Path, name: &str, dir: &str) -> Result<String> {
        self.mkdirs(dir)?;
        let stored = format!("{}/{name}", dir.trim_end_matches('/'));
        std::fs::copy(local, self.resolve(&stored)).map_err(|err| Error::Backend(format!("Failed to copy {}: {err}", local.display())))?;
        Ok(stored)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn is_accessible(&self, path: &str) -> bool {
        let resolved = self.resolve(path);
        if resolved.is_file() {
            std::fs::File::open(&resolved).is_ok()
        } else {
            resolved.is_dir()
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        let resolved = self.resolve(path);
        let result = if resolved.is_dir() {
            std::fs::remove_dir_all(&resolved)
        } else {
            std::fs::remove_file(&resolved)
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Backend(format!("Failed to delete {}: {err}", resolved.display()))),
        }
    }

    fn access_path(&self, path: &str) -> Option<String> {
        let resolved = self.resolve(path);
        self.is_accessible(path).then(|| resolved.to_string_lossy().into_owned())
    }

    fn size_of(&self, path: &str) -> Option<u64> {
        std::fs::metadata(self.resolve(path)).ok().map(|meta| meta.len())
    }
}

/// In-memory backend, the reference implementation used by tests.
/// Counts fetch style operations so tests can assert on backend traffic.
#[derive(Default)]
pub struct MemoryBackend {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    requests: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }

    /// Number of operations that touched the object map.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn read_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.touch();
        self.objects().get(path).cloned()
    }

    fn touch(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StorageBackend for MemoryBackend {
    fn mkdirs(&self, _dir: &str) -> Result<()> {
        Ok(())
    }

    fn upload_bytes(&self, name: &str, bytes: &[u8], dir: &str) -> Result<String> {
        self.touch();
        let stored = format!("{}/{name}", dir.trim_end_matches('/'));
        self.objects().insert(stored.clone(), bytes.to_vec());
        Ok(stored)
    }

    fn upload_file(&self, local: &Path, name: &str, dir: &str) -> Result<String> {
        let bytes = std::fs::read(local)?;
        self.upload_bytes(name, &bytes, dir)
    }

    fn exists(&self, path: &str) -> bool {
        self.touch();
        self.objects().contains_key(path)
    }

    fn is_accessible(&self, path: &str) -> bool {
        self.exists(path)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.touch();
        self.objects().remove(path);
        Ok(())
    }

    fn access_path(&self, path: &str) -> Option<String> {
        self.touch();
        self.objects().contains_key(path).then(|| format!("memory://{path}"))
    }

    fn size_of(&self, path: &str) -> Option<u64> {
        self.touch();
        self.objects().get(path).map(|bytes| bytes.len() as u64)
    }
}

type BackendConstructor = Box<dyn Fn(&serde_json::Value) -> Result<Arc<dyn StorageBackend>> + Send + Sync>;

/// Creates storage backends from configuration entries.
///
/// Filesystem and memory clients are built in; object store drivers (s3,
/// ceph_rgw, obs) are registered by the embedding application.
pub struct BackendRegistry {
    constructors: HashMap<StorageKind, BackendConstructor>,
}

impl BackendRegistry {
    pub fn with_defaults() -> Self {
        let mut registry = BackendRegistry {
            constructors: HashMap::new(),
        };

        registry.register(StorageKind::Fs, |params| Ok(Arc::new(FsBackend::from_params(params)?)));
        registry.register(StorageKind::Memory, |_params| Ok(Arc::new(MemoryBackend::new())));
        registry
    }

    pub fn register<F>(&mut self, kind: StorageKind, constructor: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn StorageBackend>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Box::new(constructor));
    }

    pub fn create(&self, config: &StorageClientConfig) -> Result<Arc<dyn StorageBackend>> {
        match self.constructors.get(&config.kind) {
            Some(constructor) => constructor(&config.configure_params),
            None => Err(Error::Config(format!(
                "No storage driver registered for '{}' backends",
                config.kind
            ))),
        }
    }
}
