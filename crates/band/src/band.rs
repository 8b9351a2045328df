use std::sync::Arc;

use geo::{AnyDenseArray, ArrayDataType, GeoTransform, RasterSize};
use store::metadata::BandMetadata;
use store::{StorageBackend, TileCache, WorkPool};

use crate::lattice::TileLattice;
use crate::sliced::{ReadOptions, SlicedBand};
use crate::unsliced::UnSlicedBand;
use crate::Result;

/// A raster band, either a tiled store or a single whole-file raster. The
/// `cropped` metadata flag decides the adapter.
pub enum Band {
    Sliced(SlicedBand),
    UnSliced(UnSlicedBand),
}

impl Band {
    pub fn open(
        meta: BandMetadata,
        backend: Arc<dyn StorageBackend>,
        cache: Arc<TileCache>,
        pool: Option<Arc<WorkPool>>,
    ) -> Result<Band> {
        if meta.cropped {
            Ok(Band::Sliced(SlicedBand::open(meta, backend, cache, pool)?))
        } else {
            Ok(Band::UnSliced(UnSlicedBand::open(meta, backend, cache, pool)?))
        }
    }

    /// Open a tiled band addressing the store in sub tiles of `tile_size`.
    pub fn open_with_tile_size(
        meta: BandMetadata,
        backend: Arc<dyn StorageBackend>,
        cache: Arc<TileCache>,
        pool: Option<Arc<WorkPool>>,
        tile_size: usize,
    ) -> Result<Band> {
        if meta.cropped {
            Ok(Band::Sliced(SlicedBand::open_with_tile_size(meta, backend, cache, pool, tile_size)?))
        } else {
            Ok(Band::UnSliced(UnSlicedBand::open(meta, backend, cache, pool)?))
        }
    }

    pub fn metadata(&self) -> &BandMetadata {
        match self {
            Band::Sliced(band) => band.metadata(),
            Band::UnSliced(band) => band.metadata(),
        }
    }

    pub fn lattice(&self) -> &TileLattice {
        match self {
            Band::Sliced(band) => band.lattice(),
            Band::UnSliced(band) => band.lattice(),
        }
    }

    pub fn data_type(&self) -> ArrayDataType {
        match self {
            Band::Sliced(band) => band.data_type(),
            Band::UnSliced(band) => band.data_type(),
        }
    }

    pub fn nodata(&self) -> f64 {
        match self {
            Band::Sliced(band) => band.nodata(),
            Band::UnSliced(band) => band.nodata(),
        }
    }

    pub fn writeable(&self) -> bool {
        match self {
            Band::Sliced(band) => band.writeable(),
            Band::UnSliced(band) => band.writeable(),
        }
    }

    pub fn tile_info(&self, tile_x: i64, tile_y: i64) -> (GeoTransform, RasterSize) {
        self.lattice().tile_info(tile_x, tile_y)
    }

    pub fn read_tile(&self, tile_x: i64, tile_y: i64) -> Result<AnyDenseArray> {
        match self {
            Band::Sliced(band) => band.read_tile(tile_x, tile_y),
            Band::UnSliced(band) => band.read_tile(tile_x, tile_y),
        }
    }

    pub fn read_region(&self, transform: &GeoTransform, x_size: usize, y_size: usize) -> Result<AnyDenseArray> {
        match self {
            Band::Sliced(band) => band.read_region(transform, x_size, y_size),
            Band::UnSliced(band) => band.read_region(transform, x_size, y_size),
        }
    }

    pub fn read_region_with(&self, transform: &GeoTransform, x_size: usize, y_size: usize, options: &ReadOptions) -> Result<AnyDenseArray> {
        match self {
            Band::Sliced(band) => band.read_region_with(transform, x_size, y_size, options),
            Band::UnSliced(band) => band.read_region_with(transform, x_size, y_size, options),
        }
    }

    pub fn write_tile(&self, tile_x: i64, tile_y: i64, array: &AnyDenseArray) -> Result<bool> {
        match self {
            Band::Sliced(band) => band.write_tile(tile_x, tile_y, array),
            Band::UnSliced(band) => band.write_tile(tile_x, tile_y, array),
        }
    }

    pub fn write_region(&self, transform: &GeoTransform, data: &AnyDenseArray) -> Result<bool> {
        match self {
            Band::Sliced(band) => band.write_region(transform, data),
            Band::UnSliced(band) => band.write_region(transform, data),
        }
    }
}
