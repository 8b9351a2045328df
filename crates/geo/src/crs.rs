//! Spatial reference handling and envelope reprojection.

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};

use crate::{Error, Point, Rect, Result};

const EDGE_SAMPLE_COUNT: usize = 25;

/// Wrapper around a GDAL spatial reference.
///
/// Axis order is always forced to traditional GIS order (lon/lat) so transforms
/// never silently swap axes depending on the authority definition.
pub struct SpatialReference {
    srs: SpatialRef,
}

impl SpatialReference {
    /// Accepts any definition GDAL understands: "EPSG:xxxx", WKT, proj4 strings.
    pub fn from_definition(def: &str) -> Result<Self> {
        let mut srs = SpatialRef::from_definition(def).map_err(|err| Error::Geometry(format!("Cannot parse CRS '{def}': {err}")))?;
        srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        Ok(SpatialReference { srs })
    }

    pub fn from_epsg(epsg: u32) -> Result<Self> {
        let mut srs = SpatialRef::from_epsg(epsg)?;
        srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        Ok(SpatialReference { srs })
    }

    pub fn to_wkt(&self) -> Result<String> {
        Ok(self.srs.to_wkt()?)
    }

    pub fn srs(&self) -> &SpatialRef {
        &self.srs
    }

    /// Driver decided equivalence, string equality of definitions is not sufficient.
    pub fn is_same(&self, other: &SpatialReference) -> bool {
        unsafe { gdal_sys::OSRIsSame(self.srs.to_c_hsrs(), other.srs.to_c_hsrs()) == 1 }
    }
}

/// Whether two CRS definitions describe the same reference system.
pub fn equal(a: &str, b: &str) -> Result<bool> {
    Ok(SpatialReference::from_definition(a)?.is_same(&SpatialReference::from_definition(b)?))
}

pub fn transform_point(point: Point, source: &SpatialReference, target: &SpatialReference) -> Result<Point> {
    let transform = CoordTransform::new(source.srs(), target.srs())?;
    let mut xs = [point.x()];
    let mut ys = [point.y()];
    let mut zs = [0.0];
    transform.transform_coords(&mut xs, &mut ys, &mut zs)?;
    Ok(Point::new(xs[0], ys[0]))
}

/// Reproject an axis aligned envelope by sampling points along its edges and
/// taking the bounding box of the transformed samples. Corner-only math under
/// estimates envelopes of projections with curved edges.
pub fn reproject_envelope(envelope: &Rect, source: &SpatialReference, target: &SpatialReference) -> Result<Rect> {
    let transform = CoordTransform::new(source.srs(), target.srs())?;

    let mut xs = Vec::with_capacity(EDGE_SAMPLE_COUNT * 4);
    let mut ys = Vec::with_capacity(EDGE_SAMPLE_COUNT * 4);
    let mut add_edge = |start: Point, end: Point| {
        for i in 0..EDGE_SAMPLE_COUNT {
            let t = i as f64 / (EDGE_SAMPLE_COUNT - 1) as f64;
            xs.push(start.x() + t * (end.x() - start.x()));
            ys.push(start.y() + t * (end.y() - start.y()));
        }
    };

    add_edge(envelope.top_left(), envelope.top_right());
    add_edge(envelope.top_right(), envelope.bottom_right());
    add_edge(envelope.bottom_right(), envelope.bottom_left());
    add_edge(envelope.bottom_left(), envelope.top_left());

    let mut zs = vec![0.0; xs.len()];
    transform
        .transform_coords(&mut xs, &mut ys, &mut zs)
        .map_err(|err| Error::Geometry(format!("Envelope reprojection failed: {err}")))?;

    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        if !x.is_finite() || !y.is_finite() {
            return Err(Error::Geometry("Envelope reprojection produced non finite coordinates".to_string()));
        }
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    Ok(Rect::from_nw_se(Point::new(min_x, max_y), Point::new(max_x, min_y)))
}
