//! Process wide worker pool for background tile uploads, deletes and cache
//! warm-up fetches.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel;

use crate::cache::{DEFAULT_TILE_TTL, TileCache};
use crate::{Result, StorageBackend};

pub const POOL_WORKERS: usize = 8;
const QUEUE_CAPACITY: usize = 1024;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Fire and forget background tasks. Failures are logged (uploads, deletes)
/// or silent (cache fills), never returned.
pub enum PoolTask {
    UploadTile {
        backend: Arc<dyn StorageBackend>,
        name: String,
        bytes: Vec<u8>,
        dir: String,
    },
    DeleteTile {
        backend: Arc<dyn StorageBackend>,
        path: String,
    },
    CacheTile {
        cache: Arc<TileCache>,
        access_path: String,
    },
}

/// Fixed size worker pool over a bounded FIFO queue.
pub struct WorkPool {
    sender: Option<channel::Sender<PoolTask>>,
    workers: Vec<JoinHandle<()>>,
    http: Arc<reqwest::blocking::Client>,
}

impl WorkPool {
    pub fn new() -> Self {
        WorkPool::with_workers(POOL_WORKERS)
    }

    pub fn with_workers(worker_count: usize) -> Self {
        let (sender, receiver) = channel::bounded::<PoolTask>(QUEUE_CAPACITY);
        let http = Arc::new(
            reqwest::blocking::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
        );

        let workers = (0..worker_count.max(1))
            .map(|index| {
                let receiver = receiver.clone();
                let http = Arc::clone(&http);
                std::thread::Builder::new()
                    .name(format!("edm-pool-{index}"))
                    .spawn(move || {
                        for task in receiver.iter() {
                            run_task(task, &http);
                        }
                    })
                    .expect("failed to spawn pool worker")
            })
            .collect();

        WorkPool {
            sender: Some(sender),
            workers,
            http,
        }
    }

    /// Queue a task. Blocks when the queue is full, tasks run oldest first.
    pub fn submit(&self, task: PoolTask) {
        if let Some(sender) = &self.sender {
            if sender.send(task).is_err() {
                log::warn!("Worker pool is shut down, dropping task");
            }
        }
    }

    /// Synchronous fetch of an access path, also used by the cache fill task.
    pub fn fetch_access_bytes(&self, access_path: &str) -> Result<Vec<u8>> {
        fetch_access_bytes(&self.http, access_path)
    }

    /// Drain the queue and join every worker.
    pub fn shutdown(mut self) {
        self.stop_workers();
    }

    fn stop_workers(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Worker pool thread panicked");
            }
        }
    }
}

impl Default for WorkPool {
    fn default() -> Self {
        WorkPool::new()
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

fn run_task(task: PoolTask, http: &reqwest::blocking::Client) {
    match task {
        PoolTask::UploadTile { backend, name, bytes, dir } => {
            if let Err(err) = backend.upload_bytes(&name, &bytes, &dir) {
                log::error!("Background upload of {dir}/{name} failed: {err}");
            }
        }
        PoolTask::DeleteTile { backend, path } => {
            if let Err(err) = backend.delete(&path) {
                log::error!("Background delete of {path} failed: {err}");
            }
        }
        PoolTask::CacheTile { cache, access_path } => match fetch_access_bytes(http, &access_path) {
            Ok(bytes) => cache.set(&access_path, bytes, DEFAULT_TILE_TTL),
            Err(err) => log::debug!("Cache fill for {access_path} failed: {err}"),
        },
    }
}

fn fetch_access_bytes(http: &reqwest::blocking::Client, access_path: &str) -> Result<Vec<u8>> {
    if access_path.starts_with("http://") || access_path.starts_with("https://") {
        let response = http.get(access_path).send()?.error_for_status()?;
        return Ok(response.bytes()?.to_vec());
    }

    Ok(std::fs::read(access_path)?)
}
