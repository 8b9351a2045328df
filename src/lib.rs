//! Tiled raster store for geospatial imagery.
//!
//! This crate composes the workspace pieces into a running store: the
//! configuration, the storage backends, the shared byte cache, the background
//! worker pool and the metadata store. The heavy lifting lives in the member
//! crates: `geo` (primitives and warping), `store` (persistence concerns) and
//! `band` (the tiling and windowed-I/O engine).

#![warn(clippy::unwrap_used)]

pub type Result<T = ()> = std::result::Result<T, Error>;

use std::collections::HashMap;
use std::sync::{Arc, Once};

use thiserror::Error;

pub use {band, geo, store};

pub use band::{Band, MAX_REGION_SIZE, PixelWindow, ReadOptions, SlicedBand, TileLattice, TileReadPlan, UnSlicedBand};
pub use geo::{AnyDenseArray, ArrayDataType, DenseArray, GeoTransform, RasterSize};
pub use store::config::StoreConfig;
pub use store::metadata::{BandMetadata, Filter, ImageMetadata, MemoryMetadataStore, MetadataOps, MetadataStore, StorageLocation};
pub use store::{BackendRegistry, FsBackend, MemoryBackend, StorageBackend, TileCache, WorkPool};

use store::metadata::{validate_band, validate_image};
use store::path::{self, LogicalPath, PathKind};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Band(#[from] band::Error),
    #[error(transparent)]
    Geo(#[from] geo::Error),
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

static GDAL_LOG_BRIDGE: Once = Once::new();

/// The composed raster store.
///
/// All shared resources are owned here and injected into the bands this
/// store opens; [`EdmStore::shutdown`] stops the workers and drains the
/// cache.
pub struct EdmStore {
    config: StoreConfig,
    backends: HashMap<String, Arc<dyn StorageBackend>>,
    default_storage: String,
    cache: Arc<TileCache>,
    pool: Arc<WorkPool>,
    metadata: Arc<dyn MetadataStore>,
}

impl EdmStore {
    /// Compose a store from configuration, a backend registry and a metadata
    /// store implementation.
    pub fn open(config: StoreConfig, registry: &BackendRegistry, metadata: Arc<dyn MetadataStore>) -> Result<EdmStore> {
        GDAL_LOG_BRIDGE.call_once(geo::gdalinterop::setup_logging);

        let mut backends = HashMap::new();
        for (name, client_config) in config.storage_clients()? {
            backends.insert(name, registry.create(&client_config)?);
        }

        let default_storage = config
            .default_storage()
            .ok_or_else(|| store::Error::Config("At least one storage client must be configured".to_string()))?
            .to_string();

        let cache = Arc::new(TileCache::with_capacity(config.metadata_config.cache_config.max_cache_size));
        let pool = Arc::new(WorkPool::new());

        Ok(EdmStore {
            config,
            backends,
            default_storage,
            cache,
            pool,
            metadata,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn default_storage(&self) -> &str {
        &self.default_storage
    }

    pub fn backend(&self, storage: &str) -> Result<Arc<dyn StorageBackend>> {
        self.backends
            .get(storage)
            .cloned()
            .ok_or_else(|| store::Error::Config(format!("No storage client named '{storage}' is configured")).into())
    }

    fn parse_known_path(&self, raw: &str) -> Result<LogicalPath> {
        let parsed = path::parse(raw)?;
        if self.config.datasource(&parsed.datasource).is_none() {
            return Err(store::Error::Path(format!("Unknown datasource in path: {raw}")).into());
        }

        Ok(parsed)
    }

    fn band_collection(datasource: &str) -> String {
        format!("{}{datasource}", store::metadata::BAND_COLLECTION_PREFIX)
    }

    fn image_collection(datasource: &str) -> String {
        format!("{}{datasource}", store::metadata::IMAGE_COLLECTION_PREFIX)
    }

    /// Fetch band metadata by logical path.
    pub fn get_band(&self, band_path: &str) -> Result<BandMetadata> {
        let parsed = self.parse_known_path(band_path)?;
        let normalized = parsed.to_path();

        let doc = self
            .metadata
            .find_one(&Self::band_collection(&parsed.datasource), &Filter::eq("band_path", normalized.clone()))
            .map_err(store::Error::from)?;

        match doc {
            Some(doc) => Ok(BandMetadata::from_document(&doc).map_err(store::Error::from)?),
            None => Err(Error::NotFound(format!("Band {normalized} does not exist"))),
        }
    }

    pub fn get_image(&self, image_path: &str) -> Result<ImageMetadata> {
        let parsed = self.parse_known_path(image_path)?;
        let normalized = parsed.to_path();

        let doc = self
            .metadata
            .find_one(&Self::image_collection(&parsed.datasource), &Filter::eq("image_path", normalized.clone()))
            .map_err(store::Error::from)?;

        match doc {
            Some(doc) => Ok(ImageMetadata::from_document(&doc).map_err(store::Error::from)?),
            None => Err(Error::NotFound(format!("Image {normalized} does not exist"))),
        }
    }

    /// Whether a band or image exists at the given logical path.
    pub fn exists(&self, logical_path: &str) -> Result<bool> {
        let parsed = self.parse_known_path(logical_path)?;
        match parsed.kind {
            PathKind::Band => self.get_band(logical_path).map(|_| true).or_else(not_found_is_false),
            PathKind::Image => self.get_image(logical_path).map(|_| true).or_else(not_found_is_false),
        }
    }

    /// Register a new band. The band path datasource must grant create
    /// authority; the storage directory is created eagerly.
    pub fn create_band(&self, mut meta: BandMetadata) -> Result<()> {
        let parsed = self.parse_known_path(&meta.band_path)?;
        if !self.config.create_allowed(&parsed.datasource) {
            return Err(store::Error::Path(format!("Datasource '{}' does not allow create", parsed.datasource)).into());
        }

        meta.band_path = parsed.to_path();
        validate_band(&meta).map_err(store::Error::from)?;

        let backend = self.backend(&meta.storage.backend)?;
        backend.mkdirs(&meta.storage.path).map_err(store::Error::from)?;

        self.metadata
            .insert(
                &Self::band_collection(&parsed.datasource),
                meta.to_document().map_err(store::Error::from)?,
                true,
            )
            .map_err(store::Error::from)?;
        Ok(())
    }

    pub fn create_image(&self, mut meta: ImageMetadata) -> Result<()> {
        let parsed = self.parse_known_path(&meta.image_path)?;
        if !self.config.create_allowed(&parsed.datasource) {
            return Err(store::Error::Path(format!("Datasource '{}' does not allow create", parsed.datasource)).into());
        }

        meta.image_path = parsed.to_path();
        validate_image(&meta).map_err(store::Error::from)?;

        self.metadata
            .insert(
                &Self::image_collection(&parsed.datasource),
                meta.to_document().map_err(store::Error::from)?,
                true,
            )
            .map_err(store::Error::from)?;
        Ok(())
    }

    /// Open a band for reading and writing; the `cropped` flag picks the
    /// tiled or whole-file adapter.
    pub fn open_band(&self, band_path: &str) -> Result<Band> {
        let meta = self.get_band(band_path)?;
        let backend = self.backend(&meta.storage.backend)?;
        Ok(Band::open(meta, backend, Arc::clone(&self.cache), Some(Arc::clone(&self.pool)))?)
    }

    /// Open a tiled band addressed in sub tiles of `tile_size` (read-only).
    pub fn open_band_with_tile_size(&self, band_path: &str, tile_size: usize) -> Result<Band> {
        let meta = self.get_band(band_path)?;
        let backend = self.backend(&meta.storage.backend)?;
        Ok(Band::open_with_tile_size(
            meta,
            backend,
            Arc::clone(&self.cache),
            Some(Arc::clone(&self.pool)),
            tile_size,
        )?)
    }

    /// Delete a band: its tile blobs (in the background), its storage
    /// directory and its metadata. Deleting an absent band is a success.
    pub fn delete_band(&self, band_path: &str) -> Result<()> {
        self.delete_bands(std::slice::from_ref(&band_path.to_string()))
    }

    /// Delete several bands in one metadata operation (`$in` membership).
    pub fn delete_bands(&self, band_paths: &[String]) -> Result<()> {
        let mut by_datasource: HashMap<String, Vec<String>> = HashMap::new();
        for raw in band_paths {
            let parsed = self.parse_known_path(raw)?;
            if !self.config.delete_allowed(&parsed.datasource) {
                return Err(store::Error::Path(format!("Datasource '{}' does not allow delete", parsed.datasource)).into());
            }
            by_datasource.entry(parsed.datasource).or_default().push(parsed.to_path());
        }

        for (datasource, normalized) in by_datasource {
            let collection = Self::band_collection(&datasource);
            let filter = Filter::is_in("band_path", normalized);

            for doc in self.metadata.find(&collection, &filter, None, None).map_err(store::Error::from)? {
                if let Ok(meta) = BandMetadata::from_document(&doc) {
                    self.remove_band_storage(&meta)?;
                }
            }

            self.metadata.delete(&collection, &filter).map_err(store::Error::from)?;
        }

        Ok(())
    }

    /// Delete an image together with its bands; the metadata removal is one
    /// transaction.
    pub fn delete_image(&self, image_path: &str) -> Result<()> {
        self.delete_images(std::slice::from_ref(&image_path.to_string()))
    }

    pub fn delete_images(&self, image_paths: &[String]) -> Result<()> {
        for raw in image_paths {
            let parsed = self.parse_known_path(raw)?;
            if !self.config.delete_allowed(&parsed.datasource) {
                return Err(store::Error::Path(format!("Datasource '{}' does not allow delete", parsed.datasource)).into());
            }

            let image = match self.get_image(raw) {
                Ok(image) => image,
                Err(Error::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };

            let band_paths: Vec<String> = image.bands.values().cloned().collect();
            let band_collection = Self::band_collection(&parsed.datasource);
            let band_filter = Filter::is_in("band_path", band_paths);

            let band_docs = self
                .metadata
                .find(&band_collection, &band_filter, None, None)
                .map_err(store::Error::from)?;

            {
                let tx = self.metadata.transaction().map_err(store::Error::from)?;
                tx.delete(&Self::image_collection(&parsed.datasource), &Filter::eq("image_path", parsed.to_path()))
                    .map_err(store::Error::from)?;
                tx.delete(&band_collection, &band_filter).map_err(store::Error::from)?;
                tx.commit().map_err(store::Error::from)?;
            }

            for doc in band_docs {
                if let Ok(meta) = BandMetadata::from_document(&doc) {
                    self.remove_band_storage(&meta)?;
                }
            }
        }

        Ok(())
    }

    fn remove_band_storage(&self, meta: &BandMetadata) -> Result<()> {
        let backend = self.backend(&meta.storage.backend)?;

        if meta.cropped {
            if let Ok(band) = SlicedBand::open(meta.clone(), Arc::clone(&backend), Arc::clone(&self.cache), None) {
                for (tile_x, tile_y) in band.lattice().tiles() {
                    self.pool.submit(store::PoolTask::DeleteTile {
                        backend: Arc::clone(&backend),
                        path: format!("{}/{tile_x}_{tile_y}.tif", meta.storage.path.trim_end_matches('/')),
                    });
                }
            }
        }

        backend.delete(&meta.storage.path).map_err(store::Error::from)?;
        Ok(())
    }

    /// Stop the workers and drop every cached byte buffer.
    pub fn shutdown(self) {
        let EdmStore { cache, pool, .. } = self;
        if let Ok(pool) = Arc::try_unwrap(pool) {
            pool.shutdown();
        }
        cache.clear();
    }
}

fn not_found_is_false(err: Error) -> Result<bool> {
    match err {
        Error::NotFound(_) => Ok(false),
        other => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    const TRANSFORM: [f64; 6] = [12_834_619.0, 30.0, 0.0, 5_011_732.0, 0.0, -30.0];
    const CRS: &str = "EPSG:3857";
    const NODATA: f64 = 0.0;

    fn test_config(base_dir: &std::path::Path) -> StoreConfig {
        let json = serde_json::json!({
            "storage_client_config": {
                "main_fs": {"type": "fs", "configure_params": {"base_directory": base_dir.to_string_lossy()}}
            },
            "metadata_config": {
                "db_config": {"host": "localhost", "port": 27017},
                "datasource_config": {
                    "test": {"alias": "default", "authority": ["create", "delete"]}
                },
                "cache_config": {"max_cache_size": 67108864}
            }
        });

        serde_json::from_value(json).expect("test config")
    }

    fn open_store(base_dir: &std::path::Path) -> EdmStore {
        EdmStore::open(test_config(base_dir), &BackendRegistry::with_defaults(), Arc::new(MemoryMetadataStore::new())).expect("store")
    }

    fn band_meta(band_path: &str, shape: [usize; 2], tile_size: usize, cropped: bool, storage_path: &str) -> BandMetadata {
        BandMetadata {
            band_path: band_path.to_string(),
            storage: StorageLocation {
                backend: "main_fs".to_string(),
                path: storage_path.to_string(),
            },
            crs: CRS.to_string(),
            transform: TRANSFORM,
            shape,
            tile_size,
            cropped,
            readonly: false,
            nodata: vec![NODATA],
            dtype: "int16".to_string(),
            raster_count: 1,
            factors: vec![1, 2, 4, 8],
            scale_x: vec![30.0, 60.0, 120.0, 240.0],
            scale_y: vec![-30.0, -60.0, -120.0, -240.0],
            parent_image: None,
            extent: Vec::new(),
        }
    }

    fn gradient_tile(size: usize) -> AnyDenseArray {
        let data: Vec<i16> = (0..size * size).map(|i| (i % 31 + 1) as i16).collect();
        AnyDenseArray::from(DenseArray::new(RasterSize::square(size), data).expect("array"))
    }

    fn ones(size: usize) -> AnyDenseArray {
        AnyDenseArray::from(DenseArray::filled_with(1i16, RasterSize::square(size)))
    }

    fn assert_all_equal(array: &AnyDenseArray, expected: f64) {
        let size = array.size();
        for row in [0, size.rows / 2, size.rows - 1] {
            for col in [0, size.cols / 2, size.cols - 1] {
                assert_eq!(array.value_as_f64(row, col), expected, "mismatch at ({row}, {col})");
            }
        }
    }

    #[test]
    fn identity_read_equals_tile_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let meta = band_meta("/edm_store/test/e1.BAND", [2000, 2000], 2048, true, "bands/e1");
        store.create_band(meta).expect("create band");

        let band = store.open_band("/edm_store/test/e1.TIF").expect("open band");
        let tile = gradient_tile(2048);
        assert!(band.write_tile(0, 0, &tile).expect("write tile"));

        let (transform, size) = band.tile_info(0, 0);
        let region = band.read_region(&transform, size.cols, size.rows).expect("read region");
        let tile_back = band.read_tile(0, 0).expect("read tile");

        assert_eq!(region.size(), RasterSize::square(2048));
        assert_eq!(region, tile_back);
        assert_eq!(region, tile);

        store.shutdown();
    }

    #[test]
    fn four_tile_overhang_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let meta = band_meta("/edm_store/test/e2.BAND", [2000, 2000], 2048, true, "bands/e2");
        store.create_band(meta).expect("create band");
        let band = store.open_band("/edm_store/test/e2.BAND").expect("open band");

        let (transform, _) = band.tile_info(0, 0);
        assert!(band.write_region(&transform, &ones(4096)).expect("write region"));

        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            let tile = band.read_tile(x, y).expect("read tile");
            assert_eq!(tile.size(), RasterSize::square(2048));
            assert_all_equal(&tile, 1.0);
        }

        store.shutdown();
    }

    #[test]
    fn resized_open_maps_sub_tiles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let meta = band_meta("/edm_store/test/e3.BAND", [2000, 2000], 2048, true, "bands/e3");
        store.create_band(meta).expect("create band");

        // seed storage tile (0, 0) through a writable handle
        let writer = store.open_band("/edm_store/test/e3.BAND").expect("open band");
        assert!(writer.write_tile(0, 0, &gradient_tile(2048)).expect("write tile"));

        let band = store.open_band_with_tile_size("/edm_store/test/e3.BAND", 1024).expect("open resized");
        let lattice = band.lattice();

        assert_eq!(lattice.tile_index_and_offset(0, 0), ((0, 0), (0, 0, 1024, 1024)));
        assert_eq!(lattice.tile_index_and_offset(1, 0), ((0, 0), (1024, 0, 1024, 1024)));
        assert_eq!(lattice.tile_index_and_offset(0, 1), ((0, 0), (0, 1024, 1024, 1024)));
        assert_eq!(lattice.tile_index_and_offset(1, 1), ((0, 0), (1024, 1024, 1024, 1024)));

        // the sub tile reads the stored tile's pixels
        let sub = band.read_tile(0, 0).expect("read sub tile");
        assert_eq!(sub.size(), RasterSize::square(1024));
        let full = writer.read_tile(0, 0).expect("read full tile");
        assert_eq!(sub.value_as_f64(0, 0), full.value_as_f64(0, 0));
        assert_eq!(sub.value_as_f64(1023, 1023), full.value_as_f64(1023, 1023));

        // resized handles refuse writes
        assert!(!band.writeable());
        assert!(!band.write_tile(0, 0, &gradient_tile(1024)).expect("refused write"));

        store.shutdown();
    }

    #[test]
    fn pyramid_level_selection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let meta = band_meta("/edm_store/test/e4.BAND", [2000, 2000], 2048, true, "bands/e4");
        store.create_band(meta).expect("create band");
        let band = store.open_band("/edm_store/test/e4.BAND").expect("open band");

        let (tile_transform, size) = band.tile_info(0, 0);
        let mut scaled = tile_transform.coefficients();
        scaled[1] *= 3.0;
        scaled[5] *= 3.0;

        let (rebuilt, _, need_reproject, zoom) = band
            .lattice()
            .rebuild_transform_to_target_crs(&GeoTransform::new(scaled), size, CRS, CRS)
            .expect("rebuild");

        assert_eq!(zoom, 1);
        assert_eq!(rebuilt.cell_size_x(), 2.0 * TRANSFORM[1]);
        assert!(need_reproject);

        store.shutdown();
    }

    #[test]
    fn reprojected_read_keeps_the_requested_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let meta = band_meta("/edm_store/test/e5.BAND", [2000, 2000], 2048, true, "bands/e5");
        store.create_band(meta).expect("create band");
        let band = store.open_band("/edm_store/test/e5.BAND").expect("open band");
        assert!(band.write_tile(0, 0, &gradient_tile(2048)).expect("write tile"));

        // request the dataset envelope in WGS84 on a 60x60 grid
        let env = GeoTransform::new(TRANSFORM).envelope(RasterSize::square(2000));
        let wgs_env = geo::crs::reproject_envelope(
            &env,
            &geo::crs::SpatialReference::from_definition(CRS).expect("crs"),
            &geo::crs::SpatialReference::from_definition("EPSG:4326").expect("crs"),
        )
        .expect("envelope");

        let wgs_transform = GeoTransform::new([
            wgs_env.left(),
            wgs_env.width() / 60.0,
            0.0,
            wgs_env.top(),
            0.0,
            -(wgs_env.height() / 60.0),
        ]);

        let options = ReadOptions {
            project: Some("EPSG:4326".to_string()),
            ..Default::default()
        };
        let region = band.read_region_with(&wgs_transform, 60, 60, &options).expect("read region");

        assert_eq!(region.size(), RasterSize::square(60));
        assert_eq!(region.data_type(), ArrayDataType::Int16);

        store.shutdown();
    }

    #[test]
    fn whole_file_band_reads_and_refuses_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        // store a 256x256 raster file as the band payload
        let projection = geo::crs::SpatialReference::from_definition(CRS)
            .and_then(|srs| srs.to_wkt())
            .expect("projection");
        let source = gradient_tile(256);
        let bytes = band::codec::encode_tile(&source, &GeoTransform::new(TRANSFORM), &projection, NODATA, &[1]).expect("encode");

        let backend = store.backend("main_fs").expect("backend");
        backend.upload_bytes("full.tif", &bytes, "bands/u1").expect("upload");

        let mut meta = band_meta("/edm_store/test/u1.BAND", [256, 256], 256, false, "bands/u1/full.tif");
        meta.factors = vec![1];
        meta.scale_x = vec![30.0];
        meta.scale_y = vec![-30.0];
        store.create_band(meta).expect("create band");

        let band = store.open_band("/edm_store/test/u1.BAND").expect("open band");
        assert!(matches!(band, Band::UnSliced(_)));
        assert!(!band.writeable());

        // the native grid read reproduces the file
        let region = band
            .read_region(&GeoTransform::new(TRANSFORM), 256, 256)
            .expect("read region");
        assert_eq!(region, source);

        // the lattice tile overlaps the file with an offset, the overhang is nodata
        let tile = band.read_tile(0, 0).expect("read tile");
        assert_eq!(tile.size(), RasterSize::square(256));
        assert_eq!(tile.value_as_f64(0, 0), NODATA);

        let offset = ((TRANSFORM[0] - band.tile_info(0, 0).0.coefficients()[0]) / TRANSFORM[1]) as usize;
        assert_eq!(tile.value_as_f64(offset, offset), source.value_as_f64(0, 0));

        assert!(!band.write_tile(0, 0, &source).expect("refused"));

        store.shutdown();
    }

    #[test]
    fn catalog_round_trip_and_bulk_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        for name in ["b1", "b2"] {
            let meta = band_meta(
                &format!("/edm_store/test/{name}.BAND"),
                [2000, 2000],
                2048,
                true,
                &format!("bands/{name}"),
            );
            store.create_band(meta).expect("create band");
        }

        assert!(store.exists("/edm_store/test/b1.BAND").expect("exists"));
        assert!(store.exists("/edm_store/test/b1.TIF").expect("exists via tif alias"));
        assert!(!store.exists("/edm_store/test/b3.BAND").expect("exists"));

        let fetched = store.get_band("/edm_store/test/b2.tiff").expect("get band");
        assert_eq!(fetched.band_path, "/edm_store/test/b2.BAND");
        assert_eq!(fetched.tile_size, 2048);

        store
            .delete_bands(&["/edm_store/test/b1.BAND".to_string(), "/edm_store/test/b2.BAND".to_string()])
            .expect("bulk delete");
        assert!(!store.exists("/edm_store/test/b1.BAND").expect("exists"));
        assert!(!store.exists("/edm_store/test/b2.BAND").expect("exists"));

        // idempotent: deleting the absent bands succeeds
        store.delete_band("/edm_store/test/b1.BAND").expect("idempotent delete");

        store.shutdown();
    }

    #[test]
    fn image_delete_removes_its_bands() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let meta = band_meta("/edm_store/test/scene-b2.BAND", [2000, 2000], 2048, true, "bands/scene-b2");
        store.create_band(meta).expect("create band");

        let image = ImageMetadata {
            image_path: "/edm_store/test/scene.IMAGE".to_string(),
            wgs_boundary: vec![[115.0, 40.0], [116.0, 40.0], [116.0, 41.0], [115.0, 41.0]],
            date: 20060629,
            year: 2006,
            provider: "landsat".to_string(),
            bands: [("B2".to_string(), "/edm_store/test/scene-b2.BAND".to_string())]
                .into_iter()
                .collect(),
        };
        store.create_image(image).expect("create image");

        assert!(store.exists("/edm_store/test/scene.IMAGE").expect("image exists"));
        store.delete_image("/edm_store/test/scene.IMAGE").expect("delete image");

        assert!(!store.exists("/edm_store/test/scene.IMAGE").expect("image gone"));
        assert!(!store.exists("/edm_store/test/scene-b2.BAND").expect("band gone"));

        store.shutdown();
    }

    #[test]
    fn create_rejects_disallowed_datasources() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = open_store(dir.path());

        let meta = band_meta("/edm_store/other/b1.BAND", [2000, 2000], 2048, true, "bands/other-b1");
        assert!(store.create_band(meta).is_err());

        store.shutdown();
    }
}
