use num::NumCast;

use crate::{ArrayDataType, Error, RasterSize, Result};

/// Owned 2-D pixel buffer in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseArray<T> {
    size: RasterSize,
    data: Vec<T>,
}

impl<T: Copy> DenseArray<T> {
    pub fn new(size: RasterSize, data: Vec<T>) -> Result<Self> {
        if data.len() != size.cell_count() {
            return Err(Error::SizeMismatch {
                size1: (size.rows, size.cols),
                size2: (data.len(), 1),
            });
        }

        Ok(DenseArray { size, data })
    }

    pub fn filled_with(val: T, size: RasterSize) -> Self {
        DenseArray {
            size,
            data: vec![val; size.cell_count()],
        }
    }

    pub fn size(&self) -> RasterSize {
        self.size
    }

    pub fn rows(&self) -> usize {
        self.size.rows
    }

    pub fn cols(&self) -> usize {
        self.size.cols
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_raw_parts(self) -> (RasterSize, Vec<T>) {
        (self.size, self.data)
    }

    pub fn value(&self, row: usize, col: usize) -> T {
        debug_assert!(row < self.size.rows && col < self.size.cols);
        self.data[row * self.size.cols + col]
    }

    pub fn fill(&mut self, val: T) {
        self.data.fill(val);
    }

    /// Copy a `size`-sized block from `src` at `src_origin` into this array at `dst_origin`.
    /// Origins are (row, col).
    pub fn copy_block(&mut self, src: &DenseArray<T>, src_origin: (usize, usize), dst_origin: (usize, usize), size: RasterSize) -> Result {
        if src_origin.0 + size.rows > src.rows()
            || src_origin.1 + size.cols > src.cols()
            || dst_origin.0 + size.rows > self.rows()
            || dst_origin.1 + size.cols > self.cols()
        {
            return Err(Error::SizeMismatch {
                size1: (size.rows, size.cols),
                size2: (self.rows(), self.cols()),
            });
        }

        let src_cols = src.cols();
        let dst_cols = self.cols();
        for row in 0..size.rows {
            let src_off = (src_origin.0 + row) * src_cols + src_origin.1;
            let dst_off = (dst_origin.0 + row) * dst_cols + dst_origin.1;
            self.data[dst_off..dst_off + size.cols].copy_from_slice(&src.data[src_off..src_off + size.cols]);
        }

        Ok(())
    }
}

/// Dispatch a closure over the typed variant of an [`AnyDenseArray`].
macro_rules! any_dense_array_dispatch {
    ($any:expr, $arr:ident => $body:expr) => {
        match $any {
            AnyDenseArray::Uint8($arr) => $body,
            AnyDenseArray::Uint16($arr) => $body,
            AnyDenseArray::Int16($arr) => $body,
            AnyDenseArray::Uint32($arr) => $body,
            AnyDenseArray::Int32($arr) => $body,
            AnyDenseArray::Float32($arr) => $body,
            AnyDenseArray::Float64($arr) => $body,
        }
    };
}

/// A [`DenseArray`] whose pixel type is only known at runtime, driven by band metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyDenseArray {
    Uint8(DenseArray<u8>),
    Uint16(DenseArray<u16>),
    Int16(DenseArray<i16>),
    Uint32(DenseArray<u32>),
    Int32(DenseArray<i32>),
    Float32(DenseArray<f32>),
    Float64(DenseArray<f64>),
}

impl AnyDenseArray {
    /// Allocate an array of the given type with every cell set to `nodata`.
    /// The nodata value is cast to the pixel type, saturating casts that do not fit to zero.
    pub fn filled_with_nodata(data_type: ArrayDataType, nodata: f64, size: RasterSize) -> AnyDenseArray {
        fn filled<T: Copy + NumCast + num::Zero>(nodata: f64, size: RasterSize) -> DenseArray<T> {
            DenseArray::filled_with(NumCast::from(nodata).unwrap_or_else(T::zero), size)
        }

        match data_type {
            ArrayDataType::Uint8 => AnyDenseArray::Uint8(filled(nodata, size)),
            ArrayDataType::Uint16 => AnyDenseArray::Uint16(filled(nodata, size)),
            ArrayDataType::Int16 => AnyDenseArray::Int16(filled(nodata, size)),
            ArrayDataType::Uint32 => AnyDenseArray::Uint32(filled(nodata, size)),
            ArrayDataType::Int32 => AnyDenseArray::Int32(filled(nodata, size)),
            ArrayDataType::Float32 => AnyDenseArray::Float32(filled(nodata, size)),
            ArrayDataType::Float64 => AnyDenseArray::Float64(filled(nodata, size)),
        }
    }

    pub fn data_type(&self) -> ArrayDataType {
        match self {
            AnyDenseArray::Uint8(_) => ArrayDataType::Uint8,
            AnyDenseArray::Uint16(_) => ArrayDataType::Uint16,
            AnyDenseArray::Int16(_) => ArrayDataType::Int16,
            AnyDenseArray::Uint32(_) => ArrayDataType::Uint32,
            AnyDenseArray::Int32(_) => ArrayDataType::Int32,
            AnyDenseArray::Float32(_) => ArrayDataType::Float32,
            AnyDenseArray::Float64(_) => ArrayDataType::Float64,
        }
    }

    pub fn size(&self) -> RasterSize {
        any_dense_array_dispatch!(self, arr => arr.size())
    }

    pub fn rows(&self) -> usize {
        self.size().rows
    }

    pub fn cols(&self) -> usize {
        self.size().cols
    }

    /// Copy a block between arrays of the same pixel type, see [`DenseArray::copy_block`].
    pub fn copy_block(&mut self, src: &AnyDenseArray, src_origin: (usize, usize), dst_origin: (usize, usize), size: RasterSize) -> Result {
        match (self, src) {
            (AnyDenseArray::Uint8(dst), AnyDenseArray::Uint8(src)) => dst.copy_block(src, src_origin, dst_origin, size),
            (AnyDenseArray::Uint16(dst), AnyDenseArray::Uint16(src)) => dst.copy_block(src, src_origin, dst_origin, size),
            (AnyDenseArray::Int16(dst), AnyDenseArray::Int16(src)) => dst.copy_block(src, src_origin, dst_origin, size),
            (AnyDenseArray::Uint32(dst), AnyDenseArray::Uint32(src)) => dst.copy_block(src, src_origin, dst_origin, size),
            (AnyDenseArray::Int32(dst), AnyDenseArray::Int32(src)) => dst.copy_block(src, src_origin, dst_origin, size),
            (AnyDenseArray::Float32(dst), AnyDenseArray::Float32(src)) => dst.copy_block(src, src_origin, dst_origin, size),
            (AnyDenseArray::Float64(dst), AnyDenseArray::Float64(src)) => dst.copy_block(src, src_origin, dst_origin, size),
            (dst, src) => Err(Error::InvalidArgument(format!(
                "Pixel type mismatch: {} <-> {}",
                dst.data_type(),
                src.data_type()
            ))),
        }
    }

    /// The cell value at (row, col) widened to f64, for inspection and tests.
    pub fn value_as_f64(&self, row: usize, col: usize) -> f64 {
        any_dense_array_dispatch!(self, arr => {
            NumCast::from(arr.value(row, col)).unwrap_or(f64::NAN)
        })
    }
}

macro_rules! any_dense_array_from {
    ($prim:ty, $variant:ident) => {
        impl From<DenseArray<$prim>> for AnyDenseArray {
            fn from(arr: DenseArray<$prim>) -> Self {
                AnyDenseArray::$variant(arr)
            }
        }

        impl TryFrom<AnyDenseArray> for DenseArray<$prim> {
            type Error = Error;

            fn try_from(arr: AnyDenseArray) -> Result<Self> {
                match arr {
                    AnyDenseArray::$variant(arr) => Ok(arr),
                    other => Err(Error::InvalidArgument(format!(
                        "Expected {} array, got {}",
                        stringify!($prim),
                        other.data_type()
                    ))),
                }
            }
        }
    };
}

any_dense_array_from!(u8, Uint8);
any_dense_array_from!(u16, Uint16);
any_dense_array_from!(i16, Int16);
any_dense_array_from!(u32, Uint32);
any_dense_array_from!(i32, Int32);
any_dense_array_from!(f32, Float32);
any_dense_array_from!(f64, Float64);

pub(crate) use any_dense_array_dispatch;
