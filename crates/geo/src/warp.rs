//! Array to array reprojection through the GDAL warp operation.

use std::ffi::{c_double, c_int};

use gdal::raster::GdalType;

use crate::densearray::any_dense_array_dispatch;
use crate::gdalinterop::{self, check_pointer, check_rc};
use crate::resample::ResampleMethod;
use crate::{AnyDenseArray, ArrayDataType, DenseArray, Error, GeoTransform, RasterSize, Result};

/// Source side of a warp: pixel data plus the grid it lives on.
pub struct WarpSource<'a> {
    pub array: &'a AnyDenseArray,
    pub transform: GeoTransform,
    pub projection: String,
    pub nodata: f64,
}

/// Destination grid of a warp.
pub struct WarpTarget {
    pub transform: GeoTransform,
    pub projection: String,
    pub size: RasterSize,
    pub nodata: f64,
    pub data_type: ArrayDataType,
}

/// Warp the source array onto the target grid.
///
/// The result has the target pixel type and is nodata initialised, cells the
/// source does not cover stay nodata. Nodata is honoured on both sides with a
/// unified source nodata value.
pub fn reproject(source: &WarpSource, target: &WarpTarget, method: ResampleMethod) -> Result<AnyDenseArray> {
    if !source.transform.is_valid() || !target.transform.is_valid() {
        return Err(Error::InvalidArgument("Warp requires valid transforms on both sides".to_string()));
    }

    let src_ds = any_dense_array_dispatch!(source.array, arr => {
        gdalinterop::create_in_memory_with_data(
            arr.size(),
            &source.transform,
            &source.projection,
            Some(source.nodata),
            arr.as_slice(),
        )?
    });

    match target.data_type {
        ArrayDataType::Uint8 => warp_into::<u8>(&src_ds, target, method).map(AnyDenseArray::from),
        ArrayDataType::Uint16 => warp_into::<u16>(&src_ds, target, method).map(AnyDenseArray::from),
        ArrayDataType::Int16 => warp_into::<i16>(&src_ds, target, method).map(AnyDenseArray::from),
        ArrayDataType::Uint32 => warp_into::<u32>(&src_ds, target, method).map(AnyDenseArray::from),
        ArrayDataType::Int32 => warp_into::<i32>(&src_ds, target, method).map(AnyDenseArray::from),
        ArrayDataType::Float32 => warp_into::<f32>(&src_ds, target, method).map(AnyDenseArray::from),
        ArrayDataType::Float64 => warp_into::<f64>(&src_ds, target, method).map(AnyDenseArray::from),
    }
}

fn warp_into<T: GdalType + Copy + num::NumCast + num::Zero>(
    src_ds: &gdal::Dataset,
    target: &WarpTarget,
    method: ResampleMethod,
) -> Result<DenseArray<T>> {
    let fill: T = num::NumCast::from(target.nodata).unwrap_or_else(T::zero);
    let mut data = vec![fill; target.size.cell_count()];

    {
        let dst_ds = gdalinterop::create_in_memory_with_data_mut(
            target.size,
            &target.transform,
            &target.projection,
            Some(target.nodata),
            &mut data,
        )?;
        warp_datasets(src_ds, &dst_ds, method)?;
    }

    DenseArray::new(target.size, data)
}

/// Run the warp operation between two single band datasets.
///
/// Warp options per the read path contract: unified source nodata, 21 sample
/// steps on a sampling grid, one extra source pixel and all cpu worker threads.
fn warp_datasets(src_ds: &gdal::Dataset, dst_ds: &gdal::Dataset, method: ResampleMethod) -> Result<()> {
    let str_options = gdalinterop::create_string_list(&[
        "UNIFIED_SRC_NODATA=YES".to_string(),
        "SAMPLE_STEPS=21".to_string(),
        "SAMPLE_GRID=YES".to_string(),
        "SOURCE_EXTRA=1".to_string(),
        "NUM_THREADS=ALL_CPUS".to_string(),
    ])?;

    unsafe {
        let warp_options = gdal_sys::GDALCreateWarpOptions();
        (*warp_options).papszWarpOptions = gdal_sys::CSLDuplicate(str_options.as_ptr());
        (*warp_options).hSrcDS = src_ds.c_dataset();
        (*warp_options).hDstDS = dst_ds.c_dataset();
        (*warp_options).eResampleAlg = method.to_gdal();
        (*warp_options).nBandCount = 1;

        let band_size = std::mem::size_of::<c_int>();
        (*warp_options).panSrcBands = gdal_sys::CPLMalloc(band_size).cast::<c_int>();
        (*warp_options).panSrcBands.write(1);
        (*warp_options).panDstBands = gdal_sys::CPLMalloc(band_size).cast::<c_int>();
        (*warp_options).panDstBands.write(1);

        let nodata_size = std::mem::size_of::<c_double>();
        if let Some(src_nodata) = src_ds.rasterband(1)?.no_data_value() {
            // freed by gdal when the options are destroyed
            (*warp_options).padfSrcNoDataReal = gdal_sys::CPLMalloc(nodata_size).cast::<c_double>();
            (*warp_options).padfSrcNoDataReal.write(src_nodata);
        }

        if let Some(dst_nodata) = dst_ds.rasterband(1)?.no_data_value() {
            (*warp_options).padfDstNoDataReal = gdal_sys::CPLMalloc(nodata_size).cast::<c_double>();
            (*warp_options).padfDstNoDataReal.write(dst_nodata);
        }

        (*warp_options).pfnTransformer = Some(gdal_sys::GDALGenImgProjTransform);
        (*warp_options).pTransformerArg = gdal_sys::GDALCreateGenImgProjTransformer(
            src_ds.c_dataset(),
            std::ptr::null_mut(),
            dst_ds.c_dataset(),
            std::ptr::null_mut(),
            gdalinterop::FALSE,
            0.0,
            0,
        );

        if (*warp_options).pTransformerArg.is_null() {
            gdal_sys::GDALDestroyWarpOptions(warp_options);
            return Err(Error::Runtime("Failed to create warp transformer".to_string()));
        }

        let operation = gdal_sys::GDALCreateWarpOperation(warp_options);
        if operation.is_null() {
            gdal_sys::GDALDestroyGenImgProjTransformer((*warp_options).pTransformerArg);
            gdal_sys::GDALDestroyWarpOptions(warp_options);
            return Err(Error::Runtime("Failed to create warp operation".to_string()));
        }

        let (cols, rows) = dst_ds.raster_size();
        let rc = check_rc(gdal_sys::GDALChunkAndWarpImage(operation, 0, 0, cols as c_int, rows as c_int));

        gdal_sys::GDALDestroyWarpOperation(operation);
        gdal_sys::GDALDestroyGenImgProjTransformer((*warp_options).pTransformerArg);
        (*warp_options).pTransformerArg = std::ptr::null_mut();
        gdal_sys::GDALDestroyWarpOptions(warp_options);

        rc?;
    }

    Ok(())
}

/// Convenience wrapper: warp between grids that share a projection, used to
/// align pixel grids before tiled writes.
pub fn resample_to_grid(
    array: &AnyDenseArray,
    transform: &GeoTransform,
    projection: &str,
    nodata: f64,
    target_transform: &GeoTransform,
    target_size: RasterSize,
    method: ResampleMethod,
) -> Result<AnyDenseArray> {
    let source = WarpSource {
        array,
        transform: *transform,
        projection: projection.to_string(),
        nodata,
    };
    let target = WarpTarget {
        transform: *target_transform,
        projection: projection.to_string(),
        size: target_size,
        nodata,
        data_type: array.data_type(),
    };

    reproject(&source, &target, method)
}
