//! Metadata model and the key-value document interface.
//!
//! Band and image descriptors are parsed into typed structs up front and
//! validated on insert/update. The document store itself is a collaborator
//! behind [`MetadataStore`]; an in-memory implementation defines the
//! contract and backs the tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

pub const BAND_COLLECTION_PREFIX: &str = "band_";
pub const IMAGE_COLLECTION_PREFIX: &str = "image_";

pub const SUPPORTED_TILE_SIZES: [usize; 4] = [256, 512, 1024, 2048];

/// Where a band's pixel blobs live: the storage client name and the physical
/// directory (tiled store) or file (whole-file band).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub backend: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandMetadata {
    pub band_path: String,
    pub storage: StorageLocation,
    pub crs: String,
    pub transform: [f64; 6],
    /// (rows, cols)
    pub shape: [usize; 2],
    pub tile_size: usize,
    /// true: tiled store, false: whole file
    pub cropped: bool,
    #[serde(default)]
    pub readonly: bool,
    /// one nodata value per raster
    pub nodata: Vec<f64>,
    pub dtype: String,
    pub raster_count: usize,
    /// pyramid factor table, `[1, 2, 4, ...]`
    pub factors: Vec<u32>,
    pub scale_x: Vec<f64>,
    pub scale_y: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_image: Option<String>,
    /// WGS84 boundary ring used by the spatial index
    #[serde(default)]
    pub extent: Vec<[f64; 2]>,
}

impl BandMetadata {
    pub fn nodata_value(&self) -> f64 {
        self.nodata.first().copied().unwrap_or(0.0)
    }

    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_document(doc: &Value) -> Result<BandMetadata> {
        Ok(serde_json::from_value(doc.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub image_path: String,
    /// WGS84 boundary ring
    pub wgs_boundary: Vec<[f64; 2]>,
    /// acquisition day as yyyymmdd
    pub date: u32,
    pub year: u16,
    #[serde(default)]
    pub provider: String,
    /// band name to band path
    #[serde(default)]
    pub bands: BTreeMap<String, String>,
}

impl ImageMetadata {
    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_document(doc: &Value) -> Result<ImageMetadata> {
        Ok(serde_json::from_value(doc.clone())?)
    }
}

pub fn validate_band(meta: &BandMetadata) -> Result<()> {
    let fail = |msg: String| Err(Error::Validation(msg));

    if meta.band_path.is_empty() {
        return fail("band_path must not be empty".to_string());
    }
    if !SUPPORTED_TILE_SIZES.contains(&meta.tile_size) {
        return fail(format!("tile_size {} not in {SUPPORTED_TILE_SIZES:?}", meta.tile_size));
    }
    if meta.shape[0] == 0 || meta.shape[1] == 0 {
        return fail(format!("shape {:?} must be positive", meta.shape));
    }
    if meta.transform[1] == 0.0 || meta.transform[5] == 0.0 {
        return fail("transform cell sizes must be non zero".to_string());
    }
    if meta.factors.first() != Some(&1) {
        return fail(format!("factors {:?} must start with 1", meta.factors));
    }
    if meta.scale_x.len() != meta.factors.len() || meta.scale_y.len() != meta.factors.len() {
        return fail("scale vectors must match the factor table".to_string());
    }
    if meta.raster_count == 0 {
        return fail("raster_count must be positive".to_string());
    }
    if meta.nodata.len() != meta.raster_count {
        return fail(format!(
            "expected {} nodata values, got {}",
            meta.raster_count,
            meta.nodata.len()
        ));
    }

    Ok(())
}

pub fn validate_image(meta: &ImageMetadata) -> Result<()> {
    if meta.image_path.is_empty() {
        return Err(Error::Validation("image_path must not be empty".to_string()));
    }
    if meta.wgs_boundary.len() < 3 {
        return Err(Error::Validation("wgs_boundary must be a polygon ring".to_string()));
    }

    Ok(())
}

fn validate_document(collection: &str, doc: &Value) -> Result<()> {
    if collection.starts_with(BAND_COLLECTION_PREFIX) {
        validate_band(&BandMetadata::from_document(doc)?)
    } else if collection.starts_with(IMAGE_COLLECTION_PREFIX) {
        validate_image(&ImageMetadata::from_document(doc)?)
    } else {
        Ok(())
    }
}

/// Document filters: equality and membership on top level fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Value),
    In(String, Vec<Value>),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Filter {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn is_in(field: &str, values: impl IntoIterator<Item = impl Into<Value>>) -> Filter {
        Filter::In(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => doc.get(field) == Some(value),
            Filter::In(field, values) => doc.get(field).is_some_and(|v| values.contains(v)),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

/// Index descriptors created on the first write of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSpec {
    Unique(&'static str),
    Geo2dSphere(&'static str),
    Descending(&'static str),
}

fn indexes_for_collection(collection: &str) -> Vec<IndexSpec> {
    if collection.starts_with(BAND_COLLECTION_PREFIX) {
        vec![IndexSpec::Unique("band_path"), IndexSpec::Geo2dSphere("extent")]
    } else if collection.starts_with(IMAGE_COLLECTION_PREFIX) {
        vec![
            IndexSpec::Unique("image_path"),
            IndexSpec::Geo2dSphere("wgs_boundary"),
            IndexSpec::Descending("date"),
            IndexSpec::Descending("year"),
        ]
    } else {
        Vec::new()
    }
}

/// The key-value document operations, shared by direct stores and open
/// transactions. The transactional variant carries its session internally,
/// there is no session parameter on the operations themselves.
pub trait MetadataOps {
    fn insert(&self, collection: &str, doc: Value, validate: bool) -> Result<()>;
    fn update(&self, collection: &str, filter: &Filter, set: Value, validate: bool, upsert: bool) -> Result<()>;
    fn delete(&self, collection: &str, filter: &Filter) -> Result<usize>;
    fn find(&self, collection: &str, filter: &Filter, limit: Option<usize>, projection: Option<&[&str]>) -> Result<Vec<Value>>;

    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        Ok(self.find(collection, filter, Some(1), None)?.into_iter().next())
    }
}

/// An open transaction. Operations are buffered and applied atomically on
/// commit; dropping without commit aborts.
pub trait MetadataSession: MetadataOps {
    fn commit(self: Box<Self>) -> Result<()>;
    fn abort(self: Box<Self>);
}

pub trait MetadataStore: MetadataOps + Send + Sync {
    fn transaction(&self) -> Result<Box<dyn MetadataSession + '_>>;
}

#[derive(Default, Clone)]
struct StoreState {
    collections: HashMap<String, Vec<Value>>,
    indexes: HashMap<String, Vec<IndexSpec>>,
}

impl StoreState {
    fn ensure_indexes(&mut self, collection: &str) {
        if !self.indexes.contains_key(collection) {
            self.indexes.insert(collection.to_string(), indexes_for_collection(collection));
        }
    }

    fn check_unique(&self, collection: &str, doc: &Value, ignore: Option<&Value>) -> Result<()> {
        let Some(indexes) = self.indexes.get(collection) else {
            return Ok(());
        };

        for index in indexes {
            let IndexSpec::Unique(field) = index else { continue };
            let Some(value) = doc.get(*field) else { continue };

            let duplicate = self
                .collections
                .get(collection)
                .into_iter()
                .flatten()
                .filter(|existing| ignore != Some(*existing))
                .any(|existing| existing.get(*field) == Some(value));

            if duplicate {
                return Err(Error::Validation(format!("Duplicate value for unique field '{field}': {value}")));
            }
        }

        Ok(())
    }

    fn insert(&mut self, collection: &str, doc: Value, validate: bool) -> Result<()> {
        if validate {
            validate_document(collection, &doc)?;
        }

        self.ensure_indexes(collection);
        self.check_unique(collection, &doc, None)?;
        self.collections.entry(collection.to_string()).or_default().push(doc);
        Ok(())
    }

    fn update(&mut self, collection: &str, filter: &Filter, set: Value, validate: bool, upsert: bool) -> Result<()> {
        let Value::Object(set_fields) = &set else {
            return Err(Error::Validation("update requires an object of fields to set".to_string()));
        };

        self.ensure_indexes(collection);

        let docs = self.collections.entry(collection.to_string()).or_default();
        let mut updated: Vec<Value> = Vec::new();
        let mut matched = false;
        for doc in docs.iter().filter(|doc| filter.matches(doc)) {
            matched = true;
            let mut next = doc.clone();
            if let Value::Object(fields) = &mut next {
                for (key, value) in set_fields {
                    fields.insert(key.clone(), value.clone());
                }
            }
            if validate {
                validate_document(collection, &next)?;
            }
            updated.push(next);
        }

        if !matched {
            if upsert {
                return self.insert(collection, set, validate);
            }
            return Ok(());
        }

        // apply after the validation pass so failures leave the state untouched
        let mut iter = updated.into_iter();
        let docs = self.collections.entry(collection.to_string()).or_default();
        for doc in docs.iter_mut() {
            if filter.matches(doc) {
                if let Some(next) = iter.next() {
                    *doc = next;
                }
            }
        }

        Ok(())
    }

    fn delete(&mut self, collection: &str, filter: &Filter) -> Result<usize> {
        let Some(docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = docs.len();
        docs.retain(|doc| !filter.matches(doc));
        Ok(before - docs.len())
    }

    fn find(&self, collection: &str, filter: &Filter, limit: Option<usize>, projection: Option<&[&str]>) -> Result<Vec<Value>> {
        let docs = self
            .collections
            .get(collection)
            .into_iter()
            .flatten()
            .filter(|doc| filter.matches(doc))
            .take(limit.unwrap_or(usize::MAX))
            .map(|doc| project(doc, projection))
            .collect();

        Ok(docs)
    }
}

fn project(doc: &Value, projection: Option<&[&str]>) -> Value {
    match projection {
        None => doc.clone(),
        Some(fields) => {
            let mut out = serde_json::Map::new();
            for field in fields {
                if let Some(value) = doc.get(*field) {
                    out.insert((*field).to_string(), value.clone());
                }
            }
            Value::Object(out)
        }
    }
}

/// In-memory metadata store. Defines the contract for real document database
/// drivers and backs the test-suite.
#[derive(Default, Clone)]
pub struct MemoryMetadataStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        MemoryMetadataStore::default()
    }

    pub fn indexes(&self, collection: &str) -> Vec<IndexSpec> {
        self.lock().indexes.get(collection).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MetadataOps for MemoryMetadataStore {
    fn insert(&self, collection: &str, doc: Value, validate: bool) -> Result<()> {
        self.lock().insert(collection, doc, validate)
    }

    fn update(&self, collection: &str, filter: &Filter, set: Value, validate: bool, upsert: bool) -> Result<()> {
        self.lock().update(collection, filter, set, validate, upsert)
    }

    fn delete(&self, collection: &str, filter: &Filter) -> Result<usize> {
        self.lock().delete(collection, filter)
    }

    fn find(&self, collection: &str, filter: &Filter, limit: Option<usize>, projection: Option<&[&str]>) -> Result<Vec<Value>> {
        self.lock().find(collection, filter, limit, projection)
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn transaction(&self) -> Result<Box<dyn MetadataSession + '_>> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            working: Mutex::new(self.lock().clone()),
        }))
    }
}

/// Transaction over the in-memory store: works on a copy of the state and
/// swaps it in atomically on commit.
pub struct MemoryTransaction<'a> {
    store: &'a MemoryMetadataStore,
    working: Mutex<StoreState>,
}

impl MemoryTransaction<'_> {
    fn working(&self) -> MutexGuard<'_, StoreState> {
        self.working.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MetadataOps for MemoryTransaction<'_> {
    fn insert(&self, collection: &str, doc: Value, validate: bool) -> Result<()> {
        self.working().insert(collection, doc, validate)
    }

    fn update(&self, collection: &str, filter: &Filter, set: Value, validate: bool, upsert: bool) -> Result<()> {
        self.working().update(collection, filter, set, validate, upsert)
    }

    fn delete(&self, collection: &str, filter: &Filter) -> Result<usize> {
        self.working().delete(collection, filter)
    }

    fn find(&self, collection: &str, filter: &Filter, limit: Option<usize>, projection: Option<&[&str]>) -> Result<Vec<Value>> {
        self.working().find(collection, filter, limit, projection)
    }
}

impl MetadataSession for MemoryTransaction<'_> {
    fn commit(self: Box<Self>) -> Result<()> {
        let working = self.working().clone();
        *self.store.lock() = working;
        Ok(())
    }

    fn abort(self: Box<Self>) {}
}
