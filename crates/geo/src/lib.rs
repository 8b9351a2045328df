#![warn(clippy::unwrap_used)]

pub type Result<T = ()> = std::result::Result<T, Error>;

mod densearray;
mod geotransform;
mod pixeltype;
mod rastersize;
mod rect;

pub mod crs;
pub mod gdalinterop;
pub mod resample;
pub mod warp;

use thiserror::Error;

#[doc(inline)]
pub use {
    densearray::AnyDenseArray, densearray::DenseArray, geotransform::GeoTransform, pixeltype::ArrayDataType, rastersize::RasterSize,
    rect::Point, rect::Rect,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
    #[error("Geometry error: {0}")]
    Geometry(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Array dimensions do not match ({}x{}) <-> ({}x{})", .size1.0, .size1.1, .size2.0, .size2.1)]
    SizeMismatch {
        size1: (usize, usize),
        size2: (usize, usize),
    },
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::ffi::NulError),
}
