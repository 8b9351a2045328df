//! Low level helpers around the GDAL C API: return code checks, in-memory
//! datasets over borrowed buffers and scratch files in GDAL's virtual memory
//! filesystem.

use std::ffi::CString;
use std::sync::atomic::{AtomicU64, Ordering};

use gdal::cpl::CslStringList;
use gdal::errors::GdalError;
use gdal::raster::GdalType;

use crate::{Error, GeoTransform, RasterSize, Result};

pub const FALSE: libc::c_int = 0;

pub fn check_rc(rc: gdal_sys::CPLErr::Type) -> std::result::Result<(), GdalError> {
    if rc != 0 {
        let msg = last_error_message();
        let last_err_no = unsafe { gdal_sys::CPLGetLastErrorNo() };
        Err(GdalError::CplError {
            class: rc,
            number: last_err_no,
            msg,
        })
    } else {
        Ok(())
    }
}

pub fn check_pointer(ptr: *mut libc::c_void, method_name: &'static str) -> std::result::Result<*mut libc::c_void, GdalError> {
    if ptr.is_null() {
        let msg = last_error_message();
        unsafe { gdal_sys::CPLErrorReset() };
        Err(GdalError::NullPointer { method_name, msg })
    } else {
        Ok(ptr)
    }
}

fn last_error_message() -> String {
    let c_str = unsafe { std::ffi::CStr::from_ptr(gdal_sys::CPLGetLastErrorMsg()) };
    c_str.to_string_lossy().into_owned()
}

/// Route GDAL diagnostics through the log crate.
pub fn setup_logging() {
    gdal::config::set_error_handler(|sev, _ec, msg| {
        use gdal::errors::CplErrType;
        match sev {
            CplErrType::Debug => log::debug!("GDAL: {msg}"),
            CplErrType::Warning => log::warn!("GDAL: {msg}"),
            CplErrType::Failure | CplErrType::Fatal => log::error!("GDAL: {msg}"),
            CplErrType::None => {}
        }
    });
}

pub fn create_string_list(options: &[String]) -> Result<CslStringList> {
    let mut result = CslStringList::new();
    for opt in options {
        result.add_string(opt)?;
    }

    Ok(result)
}

/// Creates an in-memory dataset without any bands.
pub fn create_in_memory(size: RasterSize) -> Result<gdal::Dataset> {
    let mem_driver = gdal::DriverManager::get_driver_by_name("MEM")?;
    Ok(mem_driver.create("in-mem", size.cols, size.rows, 0)?)
}

/// Creates a single band in-memory dataset whose band reads go directly
/// through the provided buffer. The buffer must keep its address and outlive
/// the dataset.
pub fn create_in_memory_with_data<T: GdalType>(
    size: RasterSize,
    transform: &GeoTransform,
    projection: &str,
    nodata: Option<f64>,
    data: &[T],
) -> Result<gdal::Dataset> {
    debug_assert_eq!(data.len(), size.cell_count());
    in_memory_over_pointer::<T>(size, transform, projection, nodata, data.as_ptr().cast_mut())
}

/// Mutable variant of [`create_in_memory_with_data`] for datasets that are
/// written through, e.g. warp destinations.
pub fn create_in_memory_with_data_mut<T: GdalType>(
    size: RasterSize,
    transform: &GeoTransform,
    projection: &str,
    nodata: Option<f64>,
    data: &mut [T],
) -> Result<gdal::Dataset> {
    debug_assert_eq!(data.len(), size.cell_count());
    in_memory_over_pointer::<T>(size, transform, projection, nodata, data.as_mut_ptr())
}

fn in_memory_over_pointer<T: GdalType>(
    size: RasterSize,
    transform: &GeoTransform,
    projection: &str,
    nodata: Option<f64>,
    data: *mut T,
) -> Result<gdal::Dataset> {
    let mut ds = create_in_memory(size)?;

    let data_ptr = format!("DATAPOINTER={data:p}");
    let mut str_options = CslStringList::new();
    str_options.add_string(data_ptr.as_str())?;
    check_rc(unsafe { gdal_sys::GDALAddBand(ds.c_dataset(), T::gdal_ordinal(), str_options.as_ptr()) })?;

    ds.set_geo_transform(&transform.coefficients())?;
    ds.set_projection(projection)?;
    ds.rasterband(1)?.set_no_data_value(nodata)?;

    Ok(ds)
}

static MEM_FILE_ID: AtomicU64 = AtomicU64::new(0);

/// Scratch file in the `/vsimem/` virtual filesystem, unlinked on drop.
pub struct MemFile {
    path: String,
}

impl MemFile {
    /// Reserve a unique path without creating the file, for GDAL to create into.
    pub fn reserve(extension: &str) -> MemFile {
        let id = MEM_FILE_ID.fetch_add(1, Ordering::Relaxed);
        MemFile {
            path: format!("/vsimem/edm-{:x}-{id}.{extension}", std::process::id()),
        }
    }

    /// Create a memory file holding the provided bytes.
    pub fn with_bytes(extension: &str, bytes: Vec<u8>) -> Result<MemFile> {
        let file = MemFile::reserve(extension);
        gdal::vsi::create_mem_file(&file.path, bytes)?;
        Ok(file)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Copy the current contents of the memory file.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let path = CString::new(self.path.as_str())?;
        let mut length: gdal_sys::vsi_l_offset = 0;
        let ptr = unsafe { gdal_sys::VSIGetMemFileBuffer(path.as_ptr(), &mut length, FALSE) };
        if ptr.is_null() {
            return Err(Error::Runtime(format!("No data in memory file {}", self.path)));
        }

        Ok(unsafe { std::slice::from_raw_parts(ptr, length as usize) }.to_vec())
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        if let Err(err) = gdal::vsi::unlink_mem_file(&self.path) {
            log::debug!("Failed to unlink memory file {}: {err}", self.path);
        }
    }
}
