#![warn(clippy::unwrap_used)]

pub type Result<T = ()> = std::result::Result<T, Error>;

mod backend;
mod cache;
pub mod config;
pub mod metadata;
pub mod path;
mod pool;

use thiserror::Error;

#[doc(inline)]
pub use {
    backend::BackendRegistry, backend::FsBackend, backend::MemoryBackend, backend::StorageBackend, cache::TileCache, pool::PoolTask,
    pool::WorkPool,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Path error: {0}")]
    Path(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
