use gdal::raster::GdalDataType;

/// Pixel data types supported by the store, the classic GDAL set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayDataType {
    Uint8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Float32,
    Float64,
}

impl ArrayDataType {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Parse a type name, including the legacy aliases of the metadata documents
    /// (`int` means int32, `float` means float64).
    pub fn from_name(name: &str) -> Option<ArrayDataType> {
        match name.to_ascii_lowercase().as_str() {
            "uint8" | "byte" => Some(Self::Uint8),
            "uint16" => Some(Self::Uint16),
            "int16" => Some(Self::Int16),
            "uint32" => Some(Self::Uint32),
            "int32" | "int" => Some(Self::Int32),
            "float32" => Some(Self::Float32),
            "float64" | "float" | "double" => Some(Self::Float64),
            _ => None,
        }
    }

    /// Like [`ArrayDataType::from_name`] but unrecognised names fall back to uint8,
    /// matching the behaviour of the metadata ingest path.
    pub fn parse(name: &str) -> ArrayDataType {
        Self::from_name(name).unwrap_or_else(|| {
            log::warn!("Unknown pixel type '{name}', falling back to uint8");
            Self::Uint8
        })
    }

    pub fn gdal_type(self) -> GdalDataType {
        match self {
            Self::Uint8 => GdalDataType::UInt8,
            Self::Uint16 => GdalDataType::UInt16,
            Self::Int16 => GdalDataType::Int16,
            Self::Uint32 => GdalDataType::UInt32,
            Self::Int32 => GdalDataType::Int32,
            Self::Float32 => GdalDataType::Float32,
            Self::Float64 => GdalDataType::Float64,
        }
    }

    pub fn from_gdal(data_type: GdalDataType) -> Option<ArrayDataType> {
        match data_type {
            GdalDataType::UInt8 => Some(Self::Uint8),
            GdalDataType::UInt16 => Some(Self::Uint16),
            GdalDataType::Int16 => Some(Self::Int16),
            GdalDataType::UInt32 => Some(Self::Uint32),
            GdalDataType::Int32 => Some(Self::Int32),
            GdalDataType::Float32 => Some(Self::Float32),
            GdalDataType::Float64 => Some(Self::Float64),
            _ => None,
        }
    }

    pub fn size_bytes(self) -> usize {
        match self {
            Self::Uint8 => 1,
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint32 | Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }
}

impl std::fmt::Display for ArrayDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_aliases() {
        assert_eq!(ArrayDataType::from_name("int"), Some(ArrayDataType::Int32));
        assert_eq!(ArrayDataType::from_name("float"), Some(ArrayDataType::Float64));
        assert_eq!(ArrayDataType::from_name("float32"), Some(ArrayDataType::Float32));
        assert_eq!(ArrayDataType::from_name("int16"), Some(ArrayDataType::Int16));
        assert_eq!(ArrayDataType::from_name("bogus"), None);
        assert_eq!(ArrayDataType::parse(""), ArrayDataType::Uint8);
    }

    #[test]
    fn gdal_round_trip() {
        for dt in [
            ArrayDataType::Uint8,
            ArrayDataType::Uint16,
            ArrayDataType::Int16,
            ArrayDataType::Uint32,
            ArrayDataType::Int32,
            ArrayDataType::Float32,
            ArrayDataType::Float64,
        ] {
            assert_eq!(ArrayDataType::from_gdal(dt.gdal_type()), Some(dt));
            assert_eq!(ArrayDataType::from_name(dt.to_str()), Some(dt));
        }
    }
}
