//! Resampling method identifiers.

/// Named resampling methods accepted by the read and write paths.
///
/// The declaration order matches the `GDALResampleAlg` ordinals one to one and
/// the positional index is used in configs and on the wire, so the order here
/// must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum ResampleMethod {
    #[default]
    Nearest = 0,
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
    Mode,
    Gauss,
    Max,
    Min,
    Med,
    Q1,
    Q3,
    Sum,
    Rms,
}

impl ResampleMethod {
    const ALL: [ResampleMethod; 15] = [
        Self::Nearest,
        Self::Bilinear,
        Self::Cubic,
        Self::CubicSpline,
        Self::Lanczos,
        Self::Average,
        Self::Mode,
        Self::Gauss,
        Self::Max,
        Self::Min,
        Self::Med,
        Self::Q1,
        Self::Q3,
        Self::Sum,
        Self::Rms,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Bilinear => "bilinear",
            Self::Cubic => "cubic",
            Self::CubicSpline => "cubic_spline",
            Self::Lanczos => "lanczos",
            Self::Average => "average",
            Self::Mode => "mode",
            Self::Gauss => "gauss",
            Self::Max => "max",
            Self::Min => "min",
            Self::Med => "med",
            Self::Q1 => "q1",
            Self::Q3 => "q3",
            Self::Sum => "sum",
            Self::Rms => "rms",
        }
    }

    pub fn from_name(name: &str) -> Option<ResampleMethod> {
        Self::ALL.iter().copied().find(|method| method.name() == name)
    }

    pub fn from_index(index: u32) -> Option<ResampleMethod> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn to_gdal(self) -> gdal_sys::GDALResampleAlg::Type {
        self as gdal_sys::GDALResampleAlg::Type
    }
}

impl std::fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
