use std::fmt::Debug;

use approx::{AbsDiffEq, RelativeEq};

use crate::{Error, Point, RasterSize, Rect, Result};

/// Affine mapping from pixel indices to projected coordinates.
///
/// Coefficient order: [top left x, pixel width, row rotation, top left y, column rotation, pixel height].
/// A negative pixel height is the usual north-up orientation, but nothing here assumes it.
#[derive(Clone, Copy, PartialEq, Default)]
pub struct GeoTransform([f64; 6]);

impl GeoTransform {
    pub const fn new(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }

    pub fn from_origin_and_cell_size(ox: f64, oy: f64, sx: f64, sy: f64) -> Self {
        GeoTransform([ox, sx, 0.0, oy, 0.0, sy])
    }

    /// Translates a (col, row) position to a projected point.
    /// Position (0, 0) is the top left corner of the raster.
    pub fn apply(&self, col: f64, row: f64) -> Point {
        let x = self.0[0] + self.0[1] * col + self.0[2] * row;
        let y = self.0[3] + self.0[4] * col + self.0[5] * row;
        Point::new(x, y)
    }

    pub fn origin(&self) -> Point {
        Point::new(self.0[0], self.0[3])
    }

    pub fn cell_size_x(&self) -> f64 {
        self.0[1]
    }

    pub fn cell_size_y(&self) -> f64 {
        self.0[5]
    }

    pub fn set_origin(&mut self, x: f64, y: f64) {
        self.0[0] = x;
        self.0[3] = y;
    }

    pub fn set_cell_size(&mut self, sx: f64, sy: f64) {
        self.0[1] = sx;
        self.0[5] = sy;
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0[1] != 0.0 && self.0[5] != 0.0
    }

    /// The projected bounding box of a raster with this transform and the given size.
    pub fn envelope(&self, size: RasterSize) -> Rect {
        let p1 = self.apply(0.0, 0.0);
        let p2 = self.apply(size.cols as f64, size.rows as f64);
        Rect::from_points(p1, p2)
    }

    pub fn invert(&self) -> Result<Self> {
        let gt = &self.0;
        if gt[2] == 0.0 && gt[4] == 0.0 && gt[1] != 0.0 && gt[5] != 0.0 {
            // No rotation, avoid the determinant to sidestep precision issues.
            return Ok(GeoTransform([
                -gt[0] / gt[1],
                1.0 / gt[1],
                0.0,
                -gt[3] / gt[5],
                0.0,
                1.0 / gt[5],
            ]));
        }

        let det = gt[1] * gt[5] - gt[2] * gt[4];
        let magnitude = f64::max(f64::max(gt[1].abs(), gt[2].abs()), f64::max(gt[4].abs(), gt[5].abs()));
        if det.abs() <= 1e-10 * magnitude * magnitude {
            return Err(Error::Geometry("Transform is not invertible".to_string()));
        }

        let inv_det = 1.0 / det;
        Ok(GeoTransform([
            (gt[2] * gt[3] - gt[0] * gt[5]) * inv_det,
            gt[5] * inv_det,
            -gt[2] * inv_det,
            (-gt[1] * gt[3] + gt[0] * gt[4]) * inv_det,
            -gt[4] * inv_det,
            gt[1] * inv_det,
        ]))
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(trans: GeoTransform) -> [f64; 6] {
        trans.0
    }
}

impl Debug for GeoTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GeoTransform(origin: ({}, {}), cell size: ({}, {}))",
            self.0[0],
            self.0[3],
            self.cell_size_x(),
            self.cell_size_y()
        )
    }
}

impl AbsDiffEq for GeoTransform {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.0.abs_diff_eq(&other.0, epsilon)
    }
}

impl RelativeEq for GeoTransform {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.0.relative_eq(&other.0, epsilon, max_relative)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn apply_and_invert() -> Result {
        let trans = GeoTransform::new([12_834_619.0, 30.0, 0.0, 5_011_732.0, 0.0, -30.0]);
        let p = trans.apply(100.0, 200.0);
        assert_relative_eq!(p.x(), 12_834_619.0 + 3000.0);
        assert_relative_eq!(p.y(), 5_011_732.0 - 6000.0);

        let inv = trans.invert()?;
        let q = inv.apply(p.x(), p.y());
        assert_relative_eq!(q.x(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(q.y(), 200.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn envelope_north_up() {
        let trans = GeoTransform::new([1000.0, 30.0, 0.0, 2000.0, 0.0, -30.0]);
        let env = trans.envelope(RasterSize::with_rows_cols(10, 20));
        assert_relative_eq!(env.top_left().x(), 1000.0);
        assert_relative_eq!(env.top_left().y(), 2000.0);
        assert_relative_eq!(env.bottom_right().x(), 1000.0 + 20.0 * 30.0);
        assert_relative_eq!(env.bottom_right().y(), 2000.0 - 10.0 * 30.0);
    }

    #[test]
    fn envelope_south_up() {
        // positive pixel height still yields a well formed envelope
        let trans = GeoTransform::new([1000.0, 30.0, 0.0, 2000.0, 0.0, 30.0]);
        let env = trans.envelope(RasterSize::with_rows_cols(10, 20));
        assert_relative_eq!(env.top_left().y(), 2000.0 + 300.0);
        assert_relative_eq!(env.bottom_right().y(), 2000.0);
    }

    #[test]
    fn invert_degenerate() {
        let trans = GeoTransform::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(trans.invert().is_err());
    }
}
