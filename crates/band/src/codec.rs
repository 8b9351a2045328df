//! Encode and decode single tile GeoTIFFs.
//!
//! Tiles are single band, LZW compressed GeoTIFFs with internal overviews
//! built from the lattice factor table using nearest resampling. Encoding and
//! byte level decoding run through GDAL's in-memory filesystem; access paths
//! may be local files or HTTP(S) URLs (opened through `/vsicurl/`).

use gdal::raster::GdalType;

use geo::gdalinterop::{self, MemFile, check_pointer};
use geo::{AnyDenseArray, ArrayDataType, DenseArray, GeoTransform, RasterSize};

use crate::window::PixelWindow;
use crate::{Error, Result};

/// Compose the tile blob: pixel data, grid, projection, nodata and overviews.
pub fn encode_tile(
    array: &AnyDenseArray,
    transform: &GeoTransform,
    projection: &str,
    nodata: f64,
    overview_factors: &[u32],
) -> Result<Vec<u8>> {
    match array {
        AnyDenseArray::Uint8(arr) => encode_typed(arr, transform, projection, nodata, overview_factors),
        AnyDenseArray::Uint16(arr) => encode_typed(arr, transform, projection, nodata, overview_factors),
        AnyDenseArray::Int16(arr) => encode_typed(arr, transform, projection, nodata, overview_factors),
        AnyDenseArray::Uint32(arr) => encode_typed(arr, transform, projection, nodata, overview_factors),
        AnyDenseArray::Int32(arr) => encode_typed(arr, transform, projection, nodata, overview_factors),
        AnyDenseArray::Float32(arr) => encode_typed(arr, transform, projection, nodata, overview_factors),
        AnyDenseArray::Float64(arr) => encode_typed(arr, transform, projection, nodata, overview_factors),
    }
}

fn encode_typed<T: GdalType + Copy>(
    array: &DenseArray<T>,
    transform: &GeoTransform,
    projection: &str,
    nodata: f64,
    overview_factors: &[u32],
) -> Result<Vec<u8>> {
    let mut ds = gdalinterop::create_in_memory_with_data(array.size(), transform, projection, Some(nodata), array.as_slice())?;

    let overviews: Vec<i32> = overview_factors.iter().skip(1).map(|&f| f as i32).collect();
    if !overviews.is_empty() {
        ds.build_overviews("NEAREST", &overviews, &[])?;
    }

    let mem = MemFile::reserve("tif");
    let driver = gdal::DriverManager::get_driver_by_name("GTiff")?;
    let options = gdalinterop::create_string_list(&[
        "COMPRESS=LZW".to_string(),
        "COPY_SRC_OVERVIEWS=YES".to_string(),
    ])?;

    let path = std::ffi::CString::new(mem.path())?;
    unsafe {
        let handle = check_pointer(
            gdal_sys::GDALCreateCopy(
                driver.c_driver(),
                path.as_ptr(),
                ds.c_dataset(),
                gdalinterop::FALSE,
                options.as_ptr(),
                Some(gdal_sys::GDALDummyProgress),
                std::ptr::null_mut(),
            ),
            "GDALCreateCopy",
        )
        .map_err(|err| Error::Runtime(format!("Failed to encode tile: {err}")))?;
        gdal_sys::GDALClose(handle);
    }

    Ok(mem.read_bytes()?)
}

/// Decode a window from raw tile bytes at the given pyramid level.
pub fn decode_window(bytes: Vec<u8>, window: &PixelWindow, level: usize, data_type: ArrayDataType) -> Result<AnyDenseArray> {
    let mem = MemFile::with_bytes("tif", bytes)?;
    let ds = gdal::Dataset::open(mem.path())?;
    read_window_from_dataset(&ds, window, level, data_type)
}

/// Decode a window from an access path: a locally openable file or a
/// pre-signed HTTP(S) URL.
pub fn read_from_access_path(access_path: &str, window: &PixelWindow, level: usize, data_type: ArrayDataType) -> Result<AnyDenseArray> {
    let gdal_path = if access_path.starts_with("http://") || access_path.starts_with("https://") {
        format!("/vsicurl/{access_path}")
    } else {
        access_path.to_string()
    };

    let ds = gdal::Dataset::open(&gdal_path)
        .map_err(|err| Error::NotFound(format!("Cannot open raster at {access_path}: {err}")))?;
    read_window_from_dataset(&ds, window, level, data_type)
}

/// Read a window from an open dataset. Pyramid level `z` addresses overview
/// `z - 1`, level 0 the base band; a missing overview is an error, readers
/// never silently fall back to the base level.
pub fn read_window_from_dataset(ds: &gdal::Dataset, window: &PixelWindow, level: usize, data_type: ArrayDataType) -> Result<AnyDenseArray> {
    if window.is_empty() {
        return Err(Error::Shape(format!("Cannot read an empty window: {window:?}")));
    }

    let band = ds.rasterband(1)?;
    let band = if level > 0 {
        band.overview(level - 1)
            .map_err(|err| Error::NotFound(format!("Overview level {level} is not present: {err}")))?
    } else {
        band
    };

    match data_type {
        ArrayDataType::Uint8 => read_typed::<u8>(&band, window).map(AnyDenseArray::from),
        ArrayDataType::Uint16 => read_typed::<u16>(&band, window).map(AnyDenseArray::from),
        ArrayDataType::Int16 => read_typed::<i16>(&band, window).map(AnyDenseArray::from),
        ArrayDataType::Uint32 => read_typed::<u32>(&band, window).map(AnyDenseArray::from),
        ArrayDataType::Int32 => read_typed::<i32>(&band, window).map(AnyDenseArray::from),
        ArrayDataType::Float32 => read_typed::<f32>(&band, window).map(AnyDenseArray::from),
        ArrayDataType::Float64 => read_typed::<f64>(&band, window).map(AnyDenseArray::from),
    }
}

fn read_typed<T: GdalType + Copy + num::Zero>(band: &gdal::raster::RasterBand, window: &PixelWindow) -> Result<DenseArray<T>> {
    let size = RasterSize::with_rows_cols(window.height(), window.width());
    let mut data = vec![T::zero(); size.cell_count()];
    band.read_into_slice::<T>(
        (window.x0 as isize, window.y0 as isize),
        (size.cols, size.rows),
        (size.cols, size.rows),
        &mut data,
        None,
    )?;

    Ok(DenseArray::new(size, data)?)
}
