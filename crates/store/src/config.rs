//! Store configuration: storage clients, metadata database, datasources and
//! cache sizing. The config file is JSON or YAML, located through the
//! `EDM_STORE_CONFIG_PATH` environment variable with fallbacks in `/etc`,
//! `~/.config` and the working directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const CONFIG_ENV_VAR: &str = "EDM_STORE_CONFIG_PATH";
const CONFIG_FILE_STEM: &str = "edm_store";

pub const DEFAULT_MAX_POOL_SIZE: u32 = 16;
pub const DEFAULT_CACHE_SIZE: usize = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Obs,
    CephRgw,
    S3,
    Fs,
    Memory,
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StorageKind::Obs => "obs",
            StorageKind::CephRgw => "ceph_rgw",
            StorageKind::S3 => "s3",
            StorageKind::Fs => "fs",
            StorageKind::Memory => "memory",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageClientConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    #[serde(default)]
    pub configure_params: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default, rename = "tzAware")]
    pub tz_aware: Option<bool>,
    #[serde(default)]
    pub connect: Option<bool>,
    #[serde(default = "default_max_pool_size", rename = "maxPoolSize")]
    pub max_pool_size: u32,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_max_pool_size() -> u32 {
    DEFAULT_MAX_POOL_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Create,
    Delete,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasourceConfig {
    pub alias: String,
    #[serde(default)]
    pub authority: Vec<Authority>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_size")]
    pub max_cache_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetadataConfig {
    pub db_config: DbConfig,
    #[serde(default)]
    pub datasource_config: BTreeMap<String, DatasourceConfig>,
    #[serde(default)]
    pub cache_config: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Storage name to client config. The first entry is the default storage.
    /// serde_json preserves the insertion order of the document here.
    pub storage_client_config: serde_json::Map<String, serde_json::Value>,
    pub metadata_config: MetadataConfig,
}

impl StoreConfig {
    /// Locate and parse the configuration file.
    pub fn load() -> Result<StoreConfig> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return StoreConfig::from_file(Path::new(&path));
        }

        for candidate in StoreConfig::candidate_paths() {
            if candidate.is_file() {
                return StoreConfig::from_file(&candidate);
            }
        }

        Err(Error::Config(format!(
            "No configuration found, set {CONFIG_ENV_VAR} or provide {CONFIG_FILE_STEM}.json/.yaml in /etc, ~/.config or the working directory"
        )))
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut dirs = vec![PathBuf::from("/etc")];
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(Path::new(&home).join(".config"));
        }
        if let Ok(cwd) = std::env::current_dir() {
            dirs.push(cwd);
        }

        dirs.into_iter()
            .flat_map(|dir| {
                [
                    dir.join(format!("{CONFIG_FILE_STEM}.json")),
                    dir.join(format!("{CONFIG_FILE_STEM}.yaml")),
                ]
            })
            .collect()
    }

    pub fn from_file(path: &Path) -> Result<StoreConfig> {
        let contents =
            std::fs::read_to_string(path).map_err(|err| Error::Config(format!("Cannot read config {}: {err}", path.display())))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&contents)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&contents)?),
            other => Err(Error::Config(format!(
                "Unsupported config extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    /// The typed storage client entries, in document order.
    pub fn storage_clients(&self) -> Result<Vec<(String, StorageClientConfig)>> {
        self.storage_client_config
            .iter()
            .map(|(name, value)| {
                let cfg: StorageClientConfig = serde_json::from_value(value.clone())
                    .map_err(|err| Error::Config(format!("Invalid storage client '{name}': {err}")))?;
                Ok((name.clone(), cfg))
            })
            .collect()
    }

    /// The first configured storage defines the default.
    pub fn default_storage(&self) -> Option<&str> {
        self.storage_client_config.keys().next().map(String::as_str)
    }

    pub fn datasource(&self, key: &str) -> Option<&DatasourceConfig> {
        self.metadata_config.datasource_config.get(key)
    }

    pub fn create_allowed(&self, datasource: &str) -> bool {
        self.datasource(datasource)
            .is_some_and(|ds| ds.authority.contains(&Authority::Create))
    }

    pub fn delete_allowed(&self, datasource: &str) -> bool {
        self.datasource(datasource)
            .is_some_and(|ds| ds.authority.contains(&Authority::Delete))
    }
}
