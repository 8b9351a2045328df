#![warn(clippy::unwrap_used)]

pub type Result<T = ()> = std::result::Result<T, Error>;

mod band;
pub mod codec;
mod lattice;
mod sliced;
mod unsliced;
mod window;

use thiserror::Error;

#[doc(inline)]
pub use {
    band::Band, lattice::TileLattice, sliced::ReadOptions, sliced::SlicedBand, unsliced::UnSlicedBand, window::PixelWindow,
    window::TileReadPlan,
};

/// Inclusive upper bound for region read and write extents.
pub const MAX_REGION_SIZE: usize = 4096;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Geo error: {0}")]
    Geo(#[from] geo::Error),
    #[error("Store error: {0}")]
    Store(#[from] store::Error),
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
    #[error("Shape error: {0}")]
    Shape(String),
    #[error("Geometry error: {0}")]
    Geometry(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::ffi::NulError),
}

/// Clamp a requested region extent to [`MAX_REGION_SIZE`], warning when the
/// caller asked for more.
pub(crate) fn clamp_region_size(x_size: usize, y_size: usize) -> (usize, usize) {
    if x_size > MAX_REGION_SIZE || y_size > MAX_REGION_SIZE {
        log::warn!("Region size {x_size}x{y_size} exceeds the maximum of {MAX_REGION_SIZE}, clamping");
    }

    (x_size.min(MAX_REGION_SIZE), y_size.min(MAX_REGION_SIZE))
}
