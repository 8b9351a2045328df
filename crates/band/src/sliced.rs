//! The tiled-store band adapter: windowed reads and read-modify-write region
//! writes against the global tile lattice.

use std::sync::Arc;

use crossbeam::channel;

use geo::crs::SpatialReference;
use geo::resample::ResampleMethod;
use geo::warp::{WarpSource, WarpTarget};
use geo::{AnyDenseArray, ArrayDataType, GeoTransform, RasterSize};
use store::metadata::BandMetadata;
use store::{PoolTask, StorageBackend, TileCache, WorkPool};

use crate::codec;
use crate::lattice::TileLattice;
use crate::window::{PixelWindow, TileReadPlan};
use crate::{Error, Result, clamp_region_size};

/// Number of workers for the per-call parallel tile fetch and write.
const TILE_CONCURRENCY: usize = 8;

/// Options for region reads.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Target CRS of the returned buffer; the band CRS when absent.
    pub project: Option<String>,
    pub resample: ResampleMethod,
}

/// A band stored as a grid of fixed size tile blobs. Readable and, unless
/// the band is read-only or opened with a resized tile stride, writable.
pub struct SlicedBand {
    meta: BandMetadata,
    lattice: TileLattice,
    data_type: ArrayDataType,
    projection: String,
    backend: Arc<dyn StorageBackend>,
    cache: Arc<TileCache>,
    pool: Option<Arc<WorkPool>>,
}

impl SlicedBand {
    pub fn open(
        meta: BandMetadata,
        backend: Arc<dyn StorageBackend>,
        cache: Arc<TileCache>,
        pool: Option<Arc<WorkPool>>,
    ) -> Result<SlicedBand> {
        let transform = GeoTransform::new(meta.transform);
        let size = RasterSize::with_rows_cols(meta.shape[0], meta.shape[1]);
        let lattice = if meta.factors.is_empty() {
            TileLattice::new(transform, size, meta.tile_size)?
        } else {
            TileLattice::with_pyramid(
                transform,
                size,
                meta.tile_size,
                meta.factors.clone(),
                meta.scale_x.clone(),
                meta.scale_y.clone(),
            )?
        };

        let data_type = ArrayDataType::parse(&meta.dtype);
        let projection = SpatialReference::from_definition(&meta.crs)?.to_wkt()?;

        Ok(SlicedBand {
            meta,
            lattice,
            data_type,
            projection,
            backend,
            cache,
            pool,
        })
    }

    /// Open with a smaller tile stride; the band is then read-only.
    pub fn open_with_tile_size(
        meta: BandMetadata,
        backend: Arc<dyn StorageBackend>,
        cache: Arc<TileCache>,
        pool: Option<Arc<WorkPool>>,
        tile_size: usize,
    ) -> Result<SlicedBand> {
        let mut band = SlicedBand::open(meta, backend, cache, pool)?;
        if tile_size != band.lattice.tile_size() {
            band.lattice.resize(tile_size)?;
        }

        Ok(band)
    }

    pub fn metadata(&self) -> &BandMetadata {
        &self.meta
    }

    pub fn lattice(&self) -> &TileLattice {
        &self.lattice
    }

    pub fn data_type(&self) -> ArrayDataType {
        self.data_type
    }

    pub fn nodata(&self) -> f64 {
        self.meta.nodata_value()
    }

    pub fn writeable(&self) -> bool {
        !self.meta.readonly && self.lattice.writeable()
    }

    fn tile_name(tile_x: i64, tile_y: i64) -> String {
        format!("{tile_x}_{tile_y}.tif")
    }

    fn tile_blob_path(&self, tile_x: i64, tile_y: i64) -> String {
        format!("{}/{}", self.meta.storage.path.trim_end_matches('/'), Self::tile_name(tile_x, tile_y))
    }

    /// Read one lattice tile, nodata filled where the blob is absent.
    pub fn read_tile(&self, tile_x: i64, tile_y: i64) -> Result<AnyDenseArray> {
        let tile_size = self.lattice.tile_size() as i64;
        let entry = TileReadPlan {
            tile_x,
            tile_y,
            read: PixelWindow::new(0, tile_size - 1, 0, tile_size - 1),
            fill: PixelWindow::new(0, tile_size - 1, 0, tile_size - 1),
        };

        match self.fetch_tile_window(&entry, 0)? {
            Some(array) => Ok(array),
            None => Ok(AnyDenseArray::filled_with_nodata(
                self.data_type,
                self.nodata(),
                RasterSize::square(self.lattice.tile_size()),
            )),
        }
    }

    /// Read an arbitrary window on the band's native grid and CRS.
    pub fn read_region(&self, transform: &GeoTransform, x_size: usize, y_size: usize) -> Result<AnyDenseArray> {
        self.read_region_with(transform, x_size, y_size, &ReadOptions::default())
    }

    /// Read an arbitrary window, optionally reprojected to another CRS.
    ///
    /// The returned buffer always has the requested shape; pixels without
    /// data carry the band nodata value.
    pub fn read_region_with(&self, transform: &GeoTransform, x_size: usize, y_size: usize, options: &ReadOptions) -> Result<AnyDenseArray> {
        let (x_size, y_size) = clamp_region_size(x_size, y_size);
        let request_size = RasterSize::with_rows_cols(y_size, x_size);
        let request_crs = options.project.clone().unwrap_or_else(|| self.meta.crs.clone());

        let (intermediate_transform, intermediate_size, need_reproject, level) =
            self.lattice
                .rebuild_transform_to_target_crs(transform, request_size, &request_crs, &self.meta.crs)?;

        let Some(plan) = self
            .lattice
            .sliced_read_windows(&intermediate_transform, intermediate_size.cols, intermediate_size.rows, level)
        else {
            // nothing to fetch, the request misses the data envelope entirely
            return Ok(AnyDenseArray::filled_with_nodata(self.data_type, self.nodata(), request_size));
        };

        let mut intermediate = AnyDenseArray::filled_with_nodata(self.data_type, self.nodata(), intermediate_size);
        self.fetch_plan_into(&plan, level, &mut intermediate);

        if !need_reproject {
            return Ok(intermediate);
        }

        let target_projection = SpatialReference::from_definition(&request_crs)?.to_wkt()?;
        Ok(geo::warp::reproject(
            &WarpSource {
                array: &intermediate,
                transform: intermediate_transform,
                projection: self.projection.clone(),
                nodata: self.nodata(),
            },
            &WarpTarget {
                transform: *transform,
                projection: target_projection,
                size: request_size,
                nodata: self.nodata(),
                data_type: self.data_type,
            },
            options.resample,
        )?)
    }

    /// Write one full tile. Returns false (with a warning or an error log)
    /// when the band is not writable or the upload fails.
    pub fn write_tile(&self, tile_x: i64, tile_y: i64, array: &AnyDenseArray) -> Result<bool> {
        let Some(bytes) = self.encode_tile_checked(tile_x, tile_y, array)? else {
            return Ok(false);
        };

        match self
            .backend
            .upload_bytes(&Self::tile_name(tile_x, tile_y), &bytes, &self.meta.storage.path)
        {
            Ok(_) => {
                self.invalidate_cached_tile(tile_x, tile_y);
                Ok(true)
            }
            Err(err) => {
                log::error!("Upload of tile ({tile_x}, {tile_y}) for {} failed: {err}", self.meta.band_path);
                Ok(false)
            }
        }
    }

    /// Like [`SlicedBand::write_tile`] but the upload is queued on the worker
    /// pool and not awaited; upload failures are only logged.
    pub fn write_tile_background(&self, tile_x: i64, tile_y: i64, array: &AnyDenseArray) -> Result<bool> {
        let Some(pool) = &self.pool else {
            return self.write_tile(tile_x, tile_y, array);
        };

        let Some(bytes) = self.encode_tile_checked(tile_x, tile_y, array)? else {
            return Ok(false);
        };

        self.invalidate_cached_tile(tile_x, tile_y);
        pool.submit(PoolTask::UploadTile {
            backend: Arc::clone(&self.backend),
            name: Self::tile_name(tile_x, tile_y),
            bytes,
            dir: self.meta.storage.path.clone(),
        });

        Ok(true)
    }

    /// Write a region on the band's native CRS. The input grid is resampled
    /// onto the native grid when the cell sizes differ; every touched tile is
    /// read, patched and written back so pixels outside the window survive.
    pub fn write_region(&self, transform: &GeoTransform, data: &AnyDenseArray) -> Result<bool> {
        if !self.writeable() {
            log::warn!("Band {} is not writable", self.meta.band_path);
            return Ok(false);
        }
        if data.data_type() != self.data_type {
            return Err(Error::Shape(format!(
                "Cannot write {} data into a {} band",
                data.data_type(),
                self.data_type
            )));
        }

        let input_size = data.size();
        let native = transform.cell_size_x() == self.lattice.transform().cell_size_x()
            && transform.cell_size_y() == self.lattice.transform().cell_size_y();

        let (aligned_transform, aligned_size, aligned) = if native {
            (*transform, input_size, None)
        } else {
            let env = transform.envelope(input_size);
            let (snap_transform, snap_size) = self.lattice.snap_envelope_to_level(&env, 0);
            let resampled = geo::warp::resample_to_grid(
                data,
                transform,
                &self.projection,
                self.nodata(),
                &snap_transform,
                snap_size,
                ResampleMethod::Nearest,
            )?;
            (snap_transform, snap_size, Some(resampled))
        };
        let source = aligned.as_ref().unwrap_or(data);

        let Some(plan) = self
            .lattice
            .sliced_read_windows(&aligned_transform, aligned_size.cols, aligned_size.rows, 0)
        else {
            log::warn!("Write region does not intersect band {}", self.meta.band_path);
            return Ok(false);
        };

        let (result_tx, result_rx) = channel::unbounded::<bool>();
        let (task_tx, task_rx) = channel::unbounded::<&TileReadPlan>();
        for entry in &plan {
            if task_tx.send(entry).is_err() {
                return Err(Error::Runtime("Write queue closed unexpectedly".to_string()));
            }
        }
        drop(task_tx);

        std::thread::scope(|scope| {
            for _ in 0..TILE_CONCURRENCY.min(plan.len()) {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for entry in task_rx.iter() {
                        let ok = self.patch_tile(entry, source).unwrap_or_else(|err| {
                            log::error!("Write of tile ({}, {}) failed: {err}", entry.tile_x, entry.tile_y);
                            false
                        });
                        let _ = result_tx.send(ok);
                    }
                });
            }
        });
        drop(result_tx);

        Ok(result_rx.iter().all(|ok| ok))
    }

    /// Read-modify-write one tile of a region write.
    fn patch_tile(&self, entry: &TileReadPlan, source: &AnyDenseArray) -> Result<bool> {
        let mut tile = self.read_tile(entry.tile_x, entry.tile_y)?;
        tile.copy_block(
            source,
            (entry.fill.y0 as usize, entry.fill.x0 as usize),
            (entry.read.y0 as usize, entry.read.x0 as usize),
            RasterSize::with_rows_cols(entry.read.height(), entry.read.width()),
        )?;

        self.write_tile(entry.tile_x, entry.tile_y, &tile)
    }

    /// Fetch every planned tile window in parallel and blit the results into
    /// the intermediate buffer. Fetch failures are absorbed, the affected
    /// fill windows keep their nodata initialisation.
    fn fetch_plan_into(&self, plan: &[TileReadPlan], level: usize, intermediate: &mut AnyDenseArray) {
        debug_assert!(fills_are_disjoint(plan), "planner emitted overlapping fill windows");

        let (task_tx, task_rx) = channel::unbounded::<&TileReadPlan>();
        for entry in plan {
            if task_tx.send(entry).is_err() {
                return;
            }
        }
        drop(task_tx);

        let (result_tx, result_rx) = channel::unbounded::<(&TileReadPlan, AnyDenseArray)>();
        std::thread::scope(|scope| {
            for _ in 0..TILE_CONCURRENCY.min(plan.len()) {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for entry in task_rx.iter() {
                        match self.fetch_tile_window(entry, level) {
                            Ok(Some(array)) => {
                                let _ = result_tx.send((entry, array));
                            }
                            Ok(None) => {}
                            Err(err) => log::error!("Fetch of tile ({}, {}) failed: {err}", entry.tile_x, entry.tile_y),
                        }
                    }
                });
            }
            drop(result_tx);

            for (entry, array) in result_rx.iter() {
                let block = RasterSize::with_rows_cols(entry.fill.height(), entry.fill.width());
                if let Err(err) = intermediate.copy_block(&array, (0, 0), (entry.fill.y0 as usize, entry.fill.x0 as usize), block) {
                    log::error!("Blit of tile ({}, {}) failed: {err}", entry.tile_x, entry.tile_y);
                }
            }
        });
    }

    /// Fetch and decode one tile window at the given pyramid level. `None`
    /// when the tile blob does not exist or is not accessible.
    fn fetch_tile_window(&self, entry: &TileReadPlan, level: usize) -> Result<Option<AnyDenseArray>> {
        let (stored, offset) = self.lattice.tile_index_and_offset(entry.tile_x, entry.tile_y);
        let factor = self.lattice.factors().get(level).copied().unwrap_or(1) as i64;
        let window = entry.read.translated(offset.0 as i64 / factor, offset.1 as i64 / factor);

        let blob_path = self.tile_blob_path(stored.0, stored.1);
        if !self.backend.exists(&blob_path) {
            return Ok(None);
        }
        let Some(access) = self.backend.access_path(&blob_path) else {
            log::warn!("Tile blob {blob_path} exists but is not accessible");
            return Ok(None);
        };

        if let Some(bytes) = self.cache.get(&access) {
            return codec::decode_window(bytes.as_ref().clone(), &window, level, self.data_type).map(Some);
        }

        if let Some(pool) = &self.pool {
            pool.submit(PoolTask::CacheTile {
                cache: Arc::clone(&self.cache),
                access_path: access.clone(),
            });
        }

        codec::read_from_access_path(&access, &window, level, self.data_type).map(Some)
    }

    /// Shared write-path validation and encoding. `None` means the write was
    /// refused (band not writable).
    fn encode_tile_checked(&self, tile_x: i64, tile_y: i64, array: &AnyDenseArray) -> Result<Option<Vec<u8>>> {
        if !self.writeable() {
            log::warn!("Band {} is not writable", self.meta.band_path);
            return Ok(None);
        }

        let tile_size = RasterSize::square(self.lattice.tile_size());
        if array.size() != tile_size {
            return Err(Error::Shape(format!(
                "Tile array is {}, expected {tile_size}",
                array.size()
            )));
        }
        if array.data_type() != self.data_type {
            return Err(Error::Shape(format!(
                "Cannot write {} data into a {} band",
                array.data_type(),
                self.data_type
            )));
        }

        let (transform, _) = self.lattice.tile_info(tile_x, tile_y);
        let bytes = codec::encode_tile(array, &transform, &self.projection, self.nodata(), self.lattice.factors())?;
        Ok(Some(bytes))
    }

    fn invalidate_cached_tile(&self, tile_x: i64, tile_y: i64) {
        if let Some(access) = self.backend.access_path(&self.tile_blob_path(tile_x, tile_y)) {
            self.cache.delete(&access);
        }
    }
}

pub(crate) fn fills_are_disjoint(plan: &[TileReadPlan]) -> bool {
    plan.iter()
        .enumerate()
        .all(|(i, a)| plan.iter().skip(i + 1).all(|b| !a.fill.intersects(&b.fill)))
}

#[cfg(test)]
mod tests {
    use geo::DenseArray;
    use store::metadata::StorageLocation;
    use store::MemoryBackend;

    use super::*;

    const TRANSFORM: [f64; 6] = [12_834_619.0, 30.0, 0.0, 5_011_732.0, 0.0, -30.0];
    const NODATA: f64 = 0.0;

    fn band_meta(band_path: &str, storage_path: &str) -> BandMetadata {
        BandMetadata {
            band_path: band_path.to_string(),
            storage: StorageLocation {
                backend: "memory".to_string(),
                path: storage_path.to_string(),
            },
            crs: "EPSG:3857".to_string(),
            transform: TRANSFORM,
            shape: [2000, 2000],
            tile_size: 2048,
            cropped: true,
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

    fn open_with_memory_backend(meta: BandMetadata) -> (SlicedBand, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let cache = Arc::new(TileCache::with_capacity(1024 * 1024));
        let band = SlicedBand::open(meta, Arc::clone(&backend) as Arc<dyn StorageBackend>, cache, None).expect("open band");
        (band, backend)
    }

    fn assert_all_nodata(array: &AnyDenseArray) {
        let size = array.size();
        for row in [0, size.rows / 2, size.rows - 1] {
            for col in [0, size.cols / 2, size.cols - 1] {
                assert_eq!(array.value_as_f64(row, col), NODATA, "expected nodata at ({row}, {col})");
            }
        }
    }

    #[test]
    fn read_outside_the_envelope_touches_no_backend() {
        let (band, backend) = open_with_memory_backend(band_meta("/edm_store/test/e6.BAND", "bands/e6"));

        let mut far = TRANSFORM;
        far[0] += 1.0e7;
        far[3] += 1.0e7;

        let region = band.read_region(&GeoTransform::new(far), 512, 512).expect("read region");
        assert_eq!(region.size(), RasterSize::square(512));
        assert_all_nodata(&region);
        assert_eq!(backend.request_count(), 0, "no backend requests may be issued");
    }

    #[test]
    fn missing_tiles_read_as_nodata() {
        let (band, _backend) = open_with_memory_backend(band_meta("/edm_store/test/missing.BAND", "bands/missing"));

        let tile = band.read_tile(1, 1).expect("read tile");
        assert_eq!(tile.size(), RasterSize::square(2048));
        assert_eq!(tile.data_type(), ArrayDataType::Int16);
        assert_all_nodata(&tile);
    }

    #[test]
    fn readonly_bands_refuse_writes() {
        let mut meta = band_meta("/edm_store/test/ro.BAND", "bands/ro");
        meta.readonly = true;
        let (band, backend) = open_with_memory_backend(meta);

        let array = AnyDenseArray::from(DenseArray::filled_with(1i16, RasterSize::square(2048)));
        assert!(!band.writeable());
        assert!(!band.write_tile(0, 0, &array).expect("refused"));
        assert!(!band.write_region(&band.lattice().tile_info(0, 0).0, &array).expect("refused"));
        assert_eq!(backend.request_count(), 0, "refused writes must not touch the backend");
    }
}
