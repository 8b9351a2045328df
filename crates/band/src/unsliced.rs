//! The whole-file band adapter: read-only access to a single raster blob
//! through the same lattice geometry as the tiled store.

use std::sync::Arc;

use geo::crs::SpatialReference;
use geo::warp::{WarpSource, WarpTarget};
use geo::{AnyDenseArray, ArrayDataType, GeoTransform, RasterSize};
use store::metadata::BandMetadata;
use store::{PoolTask, StorageBackend, TileCache, WorkPool};

use crate::codec;
use crate::lattice::TileLattice;
use crate::sliced::ReadOptions;
use crate::{Result, clamp_region_size};

/// A band backed by one raster file. The lattice treats the whole dataset as
/// a single virtual tile; writes are always refused.
pub struct UnSlicedBand {
    meta: BandMetadata,
    lattice: TileLattice,
    data_type: ArrayDataType,
    projection: String,
    backend: Arc<dyn StorageBackend>,
    cache: Arc<TileCache>,
    pool: Option<Arc<WorkPool>>,
}

impl UnSlicedBand {
    pub fn open(
        meta: BandMetadata,
        backend: Arc<dyn StorageBackend>,
        cache: Arc<TileCache>,
        pool: Option<Arc<WorkPool>>,
    ) -> Result<UnSlicedBand> {
        let transform = GeoTransform::new(meta.transform);
        let size = RasterSize::with_rows_cols(meta.shape[0], meta.shape[1]);
        let lattice = TileLattice::new(transform, size, meta.tile_size)?;
        let data_type = ArrayDataType::parse(&meta.dtype);
        let projection = SpatialReference::from_definition(&meta.crs)?.to_wkt()?;

        Ok(UnSlicedBand {
            meta,
            lattice,
            data_type,
            projection,
            backend,
            cache,
            pool,
        })
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
        false
    }

    /// Read the lattice tile at (x, y); a plain region read on the tile grid.
    pub fn read_tile(&self, tile_x: i64, tile_y: i64) -> Result<AnyDenseArray> {
        let (transform, size) = self.lattice.tile_info(tile_x, tile_y);
        self.read_region(&transform, size.cols, size.rows)
    }

    pub fn read_region(&self, transform: &GeoTransform, x_size: usize, y_size: usize) -> Result<AnyDenseArray> {
        self.read_region_with(transform, x_size, y_size, &ReadOptions::default())
    }

    pub fn read_region_with(&self, transform: &GeoTransform, x_size: usize, y_size: usize, options: &ReadOptions) -> Result<AnyDenseArray> {
        let (x_size, y_size) = clamp_region_size(x_size, y_size);
        let request_size = RasterSize::with_rows_cols(y_size, x_size);
        let request_crs = options.project.clone().unwrap_or_else(|| self.meta.crs.clone());

        let (intermediate_transform, intermediate_size, need_reproject, level) =
            self.lattice
                .rebuild_transform_to_target_crs(transform, request_size, &request_crs, &self.meta.crs)?;

        let Some((read, fill)) = self
            .lattice
            .unsliced_read_window(&intermediate_transform, intermediate_size.cols, intermediate_size.rows)
        else {
            return Ok(AnyDenseArray::filled_with_nodata(self.data_type, self.nodata(), request_size));
        };

        let mut intermediate = AnyDenseArray::filled_with_nodata(self.data_type, self.nodata(), intermediate_size);
        if let Some(window) = self.fetch_window(&read, level)? {
            let block = RasterSize::with_rows_cols(fill.height(), fill.width());
            intermediate.copy_block(&window, (0, 0), (fill.y0 as usize, fill.x0 as usize), block)?;
        }

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

    /// Whole-file bands are immutable.
    pub fn write_tile(&self, tile_x: i64, tile_y: i64, _array: &AnyDenseArray) -> Result<bool> {
        log::warn!(
            "Band {} is a whole-file band, refusing to write tile ({tile_x}, {tile_y})",
            self.meta.band_path
        );
        Ok(false)
    }

    pub fn write_region(&self, _transform: &GeoTransform, _data: &AnyDenseArray) -> Result<bool> {
        log::warn!("Band {} is a whole-file band, refusing to write", self.meta.band_path);
        Ok(false)
    }

    fn fetch_window(&self, window: &crate::PixelWindow, level: usize) -> Result<Option<AnyDenseArray>> {
        let blob_path = &self.meta.storage.path;
        if !self.backend.exists(blob_path) {
            return Ok(None);
        }
        let Some(access) = self.backend.access_path(blob_path) else {
            log::warn!("Band file {blob_path} exists but is not accessible");
            return Ok(None);
        };

        if let Some(bytes) = self.cache.get(&access) {
            return codec::decode_window(bytes.as_ref().clone(), window, level, self.data_type).map(Some);
        }

        if let Some(pool) = &self.pool {
            pool.submit(PoolTask::CacheTile {
                cache: Arc::clone(&self.cache),
                access_path: access.clone(),
            });
        }

        codec::read_from_access_path(&access, window, level, self.data_type).map(Some)
    }
}
