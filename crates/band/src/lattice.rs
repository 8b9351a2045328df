//! The global tile lattice: an origin aligned grid of fixed size tiles
//! derived from a dataset's affine transform, with the window planning that
//! maps arbitrary read and write requests onto it.

use geo::crs::{self, SpatialReference};
use geo::{GeoTransform, RasterSize, Rect};

use crate::window::{PixelWindow, TileReadPlan, normalise_pair};
use crate::{Error, Result};

/// Factor synthesis halves the longest dataset axis until it drops below this.
const PYRAMID_STOP_SIZE: usize = 256;

/// Tolerance for deciding that a floating point grid position sits exactly on
/// a grid line.
const GRID_EPS: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct TileLattice {
    transform: GeoTransform,
    size: RasterSize,
    stored_tile_size: usize,
    tile_size: usize,
    /// top left corner of tile (0, 0), identical for every dataset sharing
    /// the grid
    origin_x: f64,
    origin_y: f64,
    /// tile counts at the stored tile size
    base_range_x: usize,
    base_range_y: usize,
    factors: Vec<u32>,
    scale_x: Vec<f64>,
    scale_y: Vec<f64>,
}

impl TileLattice {
    pub fn new(transform: GeoTransform, size: RasterSize, tile_size: usize) -> Result<TileLattice> {
        let factors = synthesize_factors(size, tile_size);
        let scale_x = factors.iter().map(|&f| transform.cell_size_x() * f as f64).collect();
        let scale_y = factors.iter().map(|&f| transform.cell_size_y() * f as f64).collect();
        TileLattice::with_pyramid(transform, size, tile_size, factors, scale_x, scale_y)
    }

    /// Build a lattice with a persisted pyramid table instead of synthesising one.
    pub fn with_pyramid(
        transform: GeoTransform,
        size: RasterSize,
        tile_size: usize,
        factors: Vec<u32>,
        scale_x: Vec<f64>,
        scale_y: Vec<f64>,
    ) -> Result<TileLattice> {
        if !transform.is_valid() {
            return Err(Error::Geometry("Lattice requires non zero cell sizes".to_string()));
        }
        if size.is_empty() || tile_size == 0 {
            return Err(Error::Shape(format!("Invalid lattice extents: {size} with tile size {tile_size}")));
        }
        if factors.first() != Some(&1) || factors.len() != scale_x.len() || factors.len() != scale_y.len() {
            return Err(Error::Shape("Pyramid factors and scale vectors are inconsistent".to_string()));
        }

        let [ox, sx, _, oy, _, sy] = transform.coefficients();

        // snap the lattice origin onto the global grid, removing sub pixel drift
        let snap_x = ox - (ox / sx).floor() * sx;
        let snap_y = oy - (oy / sy.abs()).floor() * sy.abs();

        let span_x = tile_size as f64 * sx;
        let span_y = tile_size as f64 * sy;

        // index of the tile containing the dataset's top left pixel becomes (0, 0)
        let kx = grid_floor((ox - snap_x) / span_x);
        let ky = grid_floor((oy - snap_y) / span_y);
        let origin_x = snap_x + kx as f64 * span_x;
        let origin_y = snap_y + ky as f64 * span_y;

        let end_x = ox + size.cols as f64 * sx;
        let end_y = oy + size.rows as f64 * sy;
        let base_range_x = grid_ceil((end_x - origin_x) / span_x).max(1) as usize;
        let base_range_y = grid_ceil((end_y - origin_y) / span_y).max(1) as usize;

        Ok(TileLattice {
            transform,
            size,
            stored_tile_size: tile_size,
            tile_size,
            origin_x,
            origin_y,
            base_range_x,
            base_range_y,
            factors,
            scale_x,
            scale_y,
        })
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn size(&self) -> RasterSize {
        self.size
    }

    pub fn factors(&self) -> &[u32] {
        &self.factors
    }

    pub fn scale_x(&self) -> &[f64] {
        &self.scale_x
    }

    pub fn scale_y(&self) -> &[f64] {
        &self.scale_y
    }

    /// Per level tile extents in pixels.
    pub fn level_tile_sizes(&self) -> Vec<usize> {
        self.factors.iter().map(|&f| self.tile_size / f as usize).collect()
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    pub fn stored_tile_size(&self) -> usize {
        self.stored_tile_size
    }

    pub fn range_x(&self) -> usize {
        self.base_range_x * self.ratio()
    }

    pub fn range_y(&self) -> usize {
        self.base_range_y * self.ratio()
    }

    fn ratio(&self) -> usize {
        self.stored_tile_size / self.tile_size
    }

    fn cell_size_x(&self) -> f64 {
        self.transform.cell_size_x()
    }

    fn cell_size_y(&self) -> f64 {
        self.transform.cell_size_y()
    }

    fn span_x(&self) -> f64 {
        self.tile_size as f64 * self.cell_size_x()
    }

    fn span_y(&self) -> f64 {
        self.tile_size as f64 * self.cell_size_y()
    }

    fn data_envelope(&self) -> Rect {
        self.transform.envelope(self.size)
    }

    /// Switch to a smaller tile stride; the stored tile is then addressed as
    /// `(ratio x ratio)` sub tiles. Only divisors of the stored size are
    /// supported and a resized lattice is not writable.
    pub fn resize(&mut self, tile_size: usize) -> Result<()> {
        if tile_size == 0 || tile_size > self.stored_tile_size || self.stored_tile_size % tile_size != 0 {
            return Err(Error::Shape(format!(
                "Tile size {tile_size} is not supported, expected a divisor of {}",
                self.stored_tile_size
            )));
        }

        self.tile_size = tile_size;
        Ok(())
    }

    /// A lattice is writable as long as it addresses tiles at the stored stride.
    pub fn writeable(&self) -> bool {
        self.tile_size == self.stored_tile_size
    }

    /// The lattice grid as a transform plus the pixel extent covering every tile.
    pub fn grid_info(&self) -> (GeoTransform, RasterSize) {
        let transform = GeoTransform::from_origin_and_cell_size(self.origin_x, self.origin_y, self.cell_size_x(), self.cell_size_y());
        let size = RasterSize::with_rows_cols(self.range_y() * self.tile_size, self.range_x() * self.tile_size);
        (transform, size)
    }

    /// Grid geometry of a single tile.
    pub fn tile_info(&self, tile_x: i64, tile_y: i64) -> (GeoTransform, RasterSize) {
        let transform = GeoTransform::from_origin_and_cell_size(
            self.origin_x + tile_x as f64 * self.span_x(),
            self.origin_y + tile_y as f64 * self.span_y(),
            self.cell_size_x(),
            self.cell_size_y(),
        );

        (transform, RasterSize::square(self.tile_size))
    }

    /// Every tile index of the lattice, row by row.
    pub fn tiles(&self) -> Vec<(i64, i64)> {
        let mut tiles = Vec::with_capacity(self.range_x() * self.range_y());
        for y in 0..self.range_y() as i64 {
            for x in 0..self.range_x() as i64 {
                tiles.push((x, y));
            }
        }

        tiles
    }

    pub fn all_tile_infos(&self) -> Vec<((i64, i64), GeoTransform, RasterSize)> {
        self.tiles()
            .into_iter()
            .map(|(x, y)| {
                let (transform, size) = self.tile_info(x, y);
                ((x, y), transform, size)
            })
            .collect()
    }

    /// Map a (possibly resized) tile index onto the stored tile holding its
    /// pixels, plus the pixel offset window inside that stored tile.
    pub fn tile_index_and_offset(&self, tile_x: i64, tile_y: i64) -> ((i64, i64), (usize, usize, usize, usize)) {
        let ratio = self.ratio() as i64;
        let stored = (tile_x.div_euclid(ratio), tile_y.div_euclid(ratio));
        let offset = (
            tile_x.rem_euclid(ratio) as usize * self.tile_size,
            tile_y.rem_euclid(ratio) as usize * self.tile_size,
            self.tile_size,
            self.tile_size,
        );

        (stored, offset)
    }

    /// Plan a read of `x_size` x `y_size` pixels on the given grid against the
    /// tiled store at pyramid `level`. Returns `None` when the request does
    /// not intersect the data envelope; boundary tiles are planned in full,
    /// their missing pixels carry nodata.
    pub fn sliced_read_windows(&self, transform: &GeoTransform, x_size: usize, y_size: usize, level: usize) -> Option<Vec<TileReadPlan>> {
        let request_env = transform.envelope(RasterSize::with_rows_cols(y_size, x_size));
        if !request_env.intersects(&self.data_envelope()) {
            return None;
        }

        let factor = *self.factors.get(level)? as usize;
        let level_tile_size = (self.tile_size / factor).max(1) as i64;

        let [req_ox, req_sx, _, req_oy, _, req_sy] = transform.coefficients();

        // touched tile range along each axis, in lattice tile indices
        let (start_x, end_x) = self.touched_tiles(req_ox, req_ox + x_size as f64 * req_sx, self.origin_x, self.span_x(), self.range_x())?;
        let (start_y, end_y) = self.touched_tiles(req_oy, req_oy + y_size as f64 * req_sy, self.origin_y, self.span_y(), self.range_y())?;

        let mut plan = Vec::new();
        for tile_y in start_y..=end_y {
            for tile_x in start_x..=end_x {
                // tile edges in request pixel units
                let tile_left = self.origin_x + tile_x as f64 * self.span_x();
                let tile_top = self.origin_y + tile_y as f64 * self.span_y();

                let (tc0, tc1) = sorted((tile_left - req_ox) / req_sx, (tile_left + self.span_x() - req_ox) / req_sx);
                let (tr0, tr1) = sorted((tile_top - req_oy) / req_sy, (tile_top + self.span_y() - req_oy) / req_sy);

                let ic0 = tc0.max(0.0);
                let ic1 = tc1.min(x_size as f64);
                let ir0 = tr0.max(0.0);
                let ir1 = tr1.min(y_size as f64);
                if ic1 - ic0 <= 0.0 || ir1 - ir0 <= 0.0 {
                    continue;
                }

                let mut read = PixelWindow::new(
                    stable_round(ic0 - tc0).max(0),
                    (stable_round(ic1 - tc0) - 1).min(level_tile_size - 1),
                    stable_round(ir0 - tr0).max(0),
                    (stable_round(ir1 - tr0) - 1).min(level_tile_size - 1),
                );
                let mut fill = PixelWindow::new(
                    stable_round(ic0).max(0),
                    (stable_round(ic1) - 1).min(x_size as i64 - 1),
                    stable_round(ir0).max(0),
                    (stable_round(ir1) - 1).min(y_size as i64 - 1),
                );

                // sub pixel slivers round away entirely, do not emit them
                if read.is_empty() || fill.is_empty() {
                    continue;
                }

                normalise_pair(
                    &mut read,
                    (0, level_tile_size - 1, 0, level_tile_size - 1),
                    &mut fill,
                    (0, x_size as i64 - 1, 0, y_size as i64 - 1),
                );

                plan.push(TileReadPlan {
                    tile_x,
                    tile_y,
                    read,
                    fill,
                });
            }
        }

        if plan.is_empty() { None } else { Some(plan) }
    }

    fn touched_tiles(&self, edge_a: f64, edge_b: f64, origin: f64, span: f64, range: usize) -> Option<(i64, i64)> {
        let (lo, hi) = sorted((edge_a - origin) / span, (edge_b - origin) / span);
        let start = grid_floor(lo).max(0);
        let end = (grid_ceil(hi) - 1).min(range as i64 - 1);
        (start <= end).then_some((start, end))
    }

    /// Plan a read against a whole-file band: one read window in source pixel
    /// units and its fill window in the request buffer, or `None` when the
    /// request misses the data envelope.
    pub fn unsliced_read_window(&self, transform: &GeoTransform, x_size: usize, y_size: usize) -> Option<(PixelWindow, PixelWindow)> {
        let request_env = transform.envelope(RasterSize::with_rows_cols(y_size, x_size));
        if !request_env.intersects(&self.data_envelope()) {
            return None;
        }

        let [req_ox, req_sx, _, req_oy, _, req_sy] = transform.coefficients();
        let [ox, sx, _, oy, _, sy] = self.transform.coefficients();

        // dataset edges in request pixel units
        let (dc0, dc1) = sorted((ox - req_ox) / req_sx, (ox + self.size.cols as f64 * sx - req_ox) / req_sx);
        let (dr0, dr1) = sorted((oy - req_oy) / req_sy, (oy + self.size.rows as f64 * sy - req_oy) / req_sy);

        let ic0 = dc0.max(0.0);
        let ic1 = dc1.min(x_size as f64);
        let ir0 = dr0.max(0.0);
        let ir1 = dr1.min(y_size as f64);
        if ic1 - ic0 <= 0.0 || ir1 - ir0 <= 0.0 {
            return None;
        }

        let mut read = PixelWindow::new(
            stable_round(ic0 - dc0),
            stable_round(ic1 - dc0) - 1,
            stable_round(ir0 - dr0),
            stable_round(ir1 - dr0) - 1,
        );
        let mut fill = PixelWindow::new(
            stable_round(ic0).max(0),
            (stable_round(ic1) - 1).min(x_size as i64 - 1),
            stable_round(ir0).max(0),
            (stable_round(ir1) - 1).min(y_size as i64 - 1),
        );

        if read.is_empty() || fill.is_empty() {
            return None;
        }

        // the source may not be read past the data extent, in request pixel units
        let data_cols = stable_round(dc1 - dc0);
        let data_rows = stable_round(dr1 - dr0);
        normalise_pair(
            &mut read,
            (0, data_cols - 1, 0, data_rows - 1),
            &mut fill,
            (0, x_size as i64 - 1, 0, y_size as i64 - 1),
        );

        Some((read, fill))
    }

    /// Map a requested grid onto the band's native grid: reproject the request
    /// envelope into the band CRS, pick the pyramid level whose resolution is
    /// the finest one not exceeding the request, snap the envelope onto the
    /// lattice at that level and clip it against the data envelope.
    ///
    /// Returns the intermediate `(transform, size, need_reproject, level)`.
    /// `need_reproject` is false only when the CRS and both cell sizes match
    /// the native grid exactly.
    pub fn rebuild_transform_to_target_crs(
        &self,
        transform: &GeoTransform,
        size: RasterSize,
        source_crs: &str,
        band_crs: &str,
    ) -> Result<(GeoTransform, RasterSize, bool, usize)> {
        let same_crs = crs::equal(source_crs, band_crs)?;
        if same_crs && transform.cell_size_x() == self.cell_size_x() && transform.cell_size_y() == self.cell_size_y() {
            return Ok((*transform, size, false, 0));
        }

        let mut env = transform.envelope(size);
        if !same_crs {
            env = crs::reproject_envelope(
                &env,
                &SpatialReference::from_definition(source_crs)?,
                &SpatialReference::from_definition(band_crs)?,
            )?;
        }

        let effective_sx = env.width() / size.cols as f64;
        let level = self.pick_level(effective_sx);
        let (rebuilt, shape) = self.snap_envelope_to_level(&env, level);

        Ok((rebuilt, shape, true, level))
    }

    /// Snap an envelope onto the lattice pixel grid of a pyramid level:
    /// left/top and right/bottom edges move outward to the next grid line,
    /// then the result is clipped against the data envelope so the rebuilt
    /// grid never leaves the data.
    pub fn snap_envelope_to_level(&self, env: &Rect, level: usize) -> (GeoTransform, RasterSize) {
        let sx = self.scale_x[level];
        let sy = self.scale_y[level];
        let sx_abs = sx.abs();
        let sy_abs = sy.abs();

        let left = self.origin_x + grid_floor((env.left() - self.origin_x) / sx_abs) as f64 * sx_abs;
        let right = self.origin_x + grid_ceil((env.right() - self.origin_x) / sx_abs) as f64 * sx_abs;
        let top = self.origin_y + grid_ceil((env.top() - self.origin_y) / sy_abs) as f64 * sy_abs;
        let bottom = self.origin_y + grid_floor((env.bottom() - self.origin_y) / sy_abs) as f64 * sy_abs;
        let mut snapped = Rect::from_nw_se(geo::Point::new(left, top), geo::Point::new(right, bottom));

        // requests that miss the data envelope stay unclipped, the planner
        // resolves them to an empty plan
        let data = self.data_envelope();
        if snapped.intersects(&data) && env.intersects(&data) {
            snapped = snapped.intersection(&data);
        }

        let cols = grid_ceil(snapped.width() / sx_abs).max(1) as usize;
        let rows = grid_ceil(snapped.height() / sy_abs).max(1) as usize;

        let origin_x = if sx > 0.0 { snapped.left() } else { snapped.right() };
        let origin_y = if sy < 0.0 { snapped.top() } else { snapped.bottom() };
        let transform = GeoTransform::from_origin_and_cell_size(origin_x, origin_y, sx, sy);

        (transform, RasterSize::with_rows_cols(rows, cols))
    }

    /// The largest pyramid level whose resolution does not exceed the request.
    fn pick_level(&self, effective_sx: f64) -> usize {
        let mut level = 0;
        for (index, scale) in self.scale_x.iter().enumerate() {
            if scale.abs() <= effective_sx * (1.0 + GRID_EPS) {
                level = index;
            } else {
                break;
            }
        }

        level
    }
}

fn synthesize_factors(size: RasterSize, tile_size: usize) -> Vec<u32> {
    let mut extent = size.rows.max(size.cols);
    let mut factors = vec![1u32];
    while extent > PYRAMID_STOP_SIZE && (*factors.last().unwrap_or(&1) as usize) * 2 <= tile_size {
        extent /= 2;
        factors.push(factors[factors.len() - 1] * 2);
    }

    factors
}

fn sorted(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

fn grid_floor(value: f64) -> i64 {
    let rounded = value.round();
    if (value - rounded).abs() < GRID_EPS {
        rounded as i64
    } else {
        value.floor() as i64
    }
}

fn grid_ceil(value: f64) -> i64 {
    let rounded = value.round();
    if (value - rounded).abs() < GRID_EPS {
        rounded as i64
    } else {
        value.ceil() as i64
    }
}

/// Round a sub pixel offset to a pixel index. Exact halves are nudged up by
/// one ulp first so both sides of a shared tile edge always round the same
/// way under floating point drift.
pub(crate) fn stable_round(value: f64) -> i64 {
    let floor = value.floor();
    if (value - floor - 0.5).abs() < 1e-9 {
        floor as i64 + 1
    } else {
        value.round() as i64
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const TRANSFORM: [f64; 6] = [12_834_619.0, 30.0, 0.0, 5_011_732.0, 0.0, -30.0];

    fn lattice(rows: usize, cols: usize, tile_size: usize) -> TileLattice {
        TileLattice::new(GeoTransform::new(TRANSFORM), RasterSize::with_rows_cols(rows, cols), tile_size).expect("lattice")
    }

    #[test]
    fn factor_synthesis() {
        let lattice = lattice(2000, 2000, 2000);

        assert_eq!(lattice.factors(), &[1, 2, 4, 8]);
        assert_eq!(lattice.scale_x(), &[30.0, 60.0, 120.0, 240.0]);
        assert_eq!(lattice.scale_y(), &[-30.0, -60.0, -120.0, -240.0]);
        assert_eq!(lattice.level_tile_sizes(), vec![2000, 1000, 500, 250]);
    }

    #[test]
    fn origin_is_aligned_with_the_global_grid() {
        let lattice = lattice(2000, 2000, 2048);
        let (grid_transform, _) = lattice.grid_info();
        let [gox, gsx, _, goy, _, gsy] = grid_transform.coefficients();

        // lattice alignment invariant: same sub pixel remainder as the dataset
        assert_relative_eq!(gox.rem_euclid(gsx), TRANSFORM[0].rem_euclid(TRANSFORM[1]), epsilon = 1e-6);
        assert_relative_eq!(goy.rem_euclid(gsy.abs()), TRANSFORM[3].rem_euclid(TRANSFORM[5].abs()), epsilon = 1e-6);

        // the grid contains the dataset
        assert!(gox <= TRANSFORM[0]);
        assert!(goy >= TRANSFORM[3]);
        let (_, grid_size) = lattice.grid_info();
        assert!(gox + grid_size.cols as f64 * gsx >= TRANSFORM[0] + 2000.0 * 30.0);
        assert!(goy + grid_size.rows as f64 * gsy <= TRANSFORM[3] - 2000.0 * 30.0);
    }

    #[test]
    fn grid_is_stable_under_retiling_and_translation() {
        let lattice1 = lattice(2000, 2000, 2048);
        let (grid_transform, grid_size) = lattice1.grid_info();
        let tile00 = lattice1.tile_info(0, 0);

        // tiling the grid itself reproduces the grid
        let lattice2 = TileLattice::new(grid_transform, grid_size, 2048).expect("lattice");
        let (t2, _) = lattice2.grid_info();
        assert_relative_eq!(t2, grid_transform, epsilon = 1e-6);
        assert_relative_eq!(lattice2.tile_info(0, 0).0, tile00.0, epsilon = 1e-6);

        // shifting the dataset 20 pixels right and down keeps the same grid
        let mut shifted = grid_transform.coefficients();
        shifted[0] += shifted[1] * 20.0;
        shifted[3] += shifted[5] * 20.0;
        let lattice3 = TileLattice::new(GeoTransform::new(shifted), grid_size, 2048).expect("lattice");
        assert_relative_eq!(lattice3.grid_info().0, grid_transform, epsilon = 1e-6);
        assert_relative_eq!(lattice3.tile_info(0, 0).0, tile00.0, epsilon = 1e-6);

        // shifting 20 pixels left moves the old tile (0, 0) to index (1, 0)
        let mut shifted = grid_transform.coefficients();
        shifted[0] -= shifted[1] * 20.0;
        let lattice4 = TileLattice::new(GeoTransform::new(shifted), grid_size, 2048).expect("lattice");
        assert_relative_eq!(lattice4.tile_info(1, 0).0, tile00.0, epsilon = 1e-6);
    }

    #[test]
    fn resize_doubles_the_ranges() {
        let mut lattice = lattice(2000, 2000, 2048);
        let range = (lattice.range_x(), lattice.range_y());
        assert_eq!(lattice.tile_info(0, 0).1, RasterSize::square(2048));

        lattice.resize(1024).expect("divisor resize");
        assert_eq!(lattice.tile_info(0, 0).1, RasterSize::square(1024));
        assert_eq!(lattice.range_x(), range.0 * 2);
        assert_eq!(lattice.range_y(), range.1 * 2);

        let err = lattice.resize(2049);
        assert!(matches!(err, Err(Error::Shape(msg)) if msg.contains("not supported")));
    }

    #[test]
    fn resize_toggles_writability() {
        let mut lattice = lattice(2000, 2000, 2048);
        assert!(lattice.writeable());

        lattice.resize(1024).expect("resize");
        assert!(!lattice.writeable());

        lattice.resize(2048).expect("restore");
        assert!(lattice.writeable());
    }

    #[test]
    fn tile_enumeration_matches_tile_info() {
        let lattice = lattice(2000, 2000, 2048);
        assert_eq!(lattice.tiles().len(), lattice.range_x() * lattice.range_y());

        for ((x, y), transform, size) in lattice.all_tile_infos() {
            let (expected_transform, expected_size) = lattice.tile_info(x, y);
            assert_relative_eq!(transform, expected_transform);
            assert_eq!(size, expected_size);
        }
    }

    #[test]
    fn sub_tile_offsets_after_resize() {
        let mut lattice = lattice(2000, 2000, 2048);
        assert_eq!(lattice.tile_index_and_offset(0, 0), ((0, 0), (0, 0, 2048, 2048)));

        lattice.resize(1024).expect("resize");
        assert_eq!(lattice.tile_index_and_offset(0, 0), ((0, 0), (0, 0, 1024, 1024)));
        assert_eq!(lattice.tile_index_and_offset(0, 1), ((0, 0), (0, 1024, 1024, 1024)));
        assert_eq!(lattice.tile_index_and_offset(1, 0), ((0, 0), (1024, 0, 1024, 1024)));
        assert_eq!(lattice.tile_index_and_offset(1, 1), ((0, 0), (1024, 1024, 1024, 1024)));
    }

    #[test]
    fn sliced_plan_outside_the_data_envelope_is_none() {
        let lattice = lattice(2000, 2000, 2048);
        let (transform, _) = lattice.tile_info(0, 0);

        // the first 50 pixels of tile (0, 0) lie before the dataset origin
        assert!(lattice.sliced_read_windows(&transform, 50, 50, 0).is_none());
    }

    #[test]
    fn sliced_plan_for_a_full_tile() {
        let lattice = lattice(2000, 2000, 2048);
        let (transform, _) = lattice.tile_info(0, 0);

        let plan = lattice.sliced_read_windows(&transform, 2048, 2048, 0).expect("plan");
        assert_eq!(plan.len(), 1);
        assert_eq!((plan[0].tile_x, plan[0].tile_y), (0, 0));
        assert_eq!(plan[0].read, PixelWindow::new(0, 2047, 0, 2047));
        assert_eq!(plan[0].fill, PixelWindow::new(0, 2047, 0, 2047));
    }

    #[test]
    fn sliced_plan_for_a_partial_tile() {
        let lattice = lattice(2000, 2000, 2048);
        let (transform, _) = lattice.tile_info(1, 1);

        let plan = lattice.sliced_read_windows(&transform, 80, 50, 0).expect("plan");
        assert_eq!(plan.len(), 1);
        assert_eq!((plan[0].tile_x, plan[0].tile_y), (1, 1));
        assert_eq!(plan[0].read, PixelWindow::new(0, 79, 0, 49));
        assert_eq!(plan[0].fill, PixelWindow::new(0, 79, 0, 49));
    }

    #[test]
    fn sliced_plan_covers_the_buffer_with_disjoint_fills() {
        let lattice = lattice(2000, 2000, 2048);
        let (tile_transform, _) = lattice.tile_info(0, 0);

        // a 4096 x 4096 request starting at tile (0, 0) touches all four tiles
        let plan = lattice.sliced_read_windows(&tile_transform, 4096, 4096, 0).expect("plan");
        assert_eq!(plan.len(), 4);

        let mut covered = 0usize;
        for entry in &plan {
            assert_eq!(entry.read.width(), entry.fill.width());
            assert_eq!(entry.read.height(), entry.fill.height());
            covered += entry.fill.width() * entry.fill.height();
        }
        assert_eq!(covered, 4096 * 4096);

        for (i, a) in plan.iter().enumerate() {
            for b in plan.iter().skip(i + 1) {
                assert!(!a.fill.intersects(&b.fill), "fill windows must be pairwise disjoint");
            }
        }
    }

    #[test]
    fn sliced_plan_at_a_pyramid_level() {
        let lattice = lattice(9000, 9000, 2048);
        let (tile_transform, _) = lattice.tile_info(0, 0);
        let mut coefficients = tile_transform.coefficients();
        coefficients[1] *= 2.0;
        coefficients[5] *= 2.0;

        // a full tile at level 1 resolution covers 1024 x 1024 level pixels
        let plan = lattice
            .sliced_read_windows(&GeoTransform::new(coefficients), 1024, 1024, 1)
            .expect("plan");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].read, PixelWindow::new(0, 1023, 0, 1023));
        assert_eq!(plan[0].fill, PixelWindow::new(0, 1023, 0, 1023));
    }

    #[test]
    fn unsliced_window_with_overhang() {
        let lattice = lattice(9000, 9000, 2048);

        let (transform, _) = lattice.tile_info(0, 0);
        let offset = ((transform.coefficients()[0] - TRANSFORM[0]) / TRANSFORM[1]).abs() as i64;
        let (read, fill) = lattice.unsliced_read_window(&transform, 2048, 2048).expect("window");
        assert_eq!(read, PixelWindow::new(0, 2047 - offset, 0, 2047 - offset));
        assert_eq!(fill, PixelWindow::new(offset, 2047, offset, 2047));

        let (transform, _) = lattice.tile_info(1, 1);
        let (read, fill) = lattice.unsliced_read_window(&transform, 2048, 2048).expect("window");
        assert_eq!(read, PixelWindow::new(2048 - offset, 4095 - offset, 2048 - offset, 4095 - offset));
        assert_eq!(fill, PixelWindow::new(0, 2047, 0, 2047));
    }

    #[test]
    fn unsliced_window_misses_the_envelope() {
        let lattice = lattice(2000, 2000, 2048);
        let mut far = TRANSFORM;
        far[0] += 1e7;
        assert!(lattice.unsliced_read_window(&GeoTransform::new(far), 100, 100).is_none());
    }

    #[test]
    fn rebuild_same_grid_is_identity() {
        let lattice = lattice(9000, 9000, 2048);
        let (transform, size) = lattice.tile_info(0, 0);

        let (rebuilt, shape, need, level) = lattice
            .rebuild_transform_to_target_crs(&transform, size, "epsg:3857", "epsg:3857")
            .expect("rebuild");

        assert_relative_eq!(rebuilt, transform);
        assert_eq!(shape, size);
        assert!(!need);
        assert_eq!(level, 0);
    }

    #[test]
    fn rebuild_picks_the_pyramid_level() {
        let lattice = lattice(9000, 9000, 2048);
        let (transform, size) = lattice.tile_info(0, 0);

        let mut scaled = transform.coefficients();
        scaled[1] *= 3.0;
        scaled[5] *= 3.0;

        let (rebuilt, _, need, level) = lattice
            .rebuild_transform_to_target_crs(&GeoTransform::new(scaled), size, "epsg:3857", "epsg:3857")
            .expect("rebuild");

        assert_eq!(level, 1);
        assert_relative_eq!(rebuilt.cell_size_x(), transform.cell_size_x() * 2.0);
        assert!(need);
    }

    #[test]
    fn rebuild_upscales_from_level_zero() {
        let lattice = lattice(9000, 9000, 2048);
        let (transform, size) = lattice.tile_info(0, 0);

        let mut finer = transform.coefficients();
        finer[1] /= 2.0;
        finer[5] /= 2.0;

        let (rebuilt, _, need, level) = lattice
            .rebuild_transform_to_target_crs(&GeoTransform::new(finer), size, "epsg:3857", "epsg:3857")
            .expect("rebuild");

        assert_eq!(level, 0);
        assert_relative_eq!(rebuilt.cell_size_x(), transform.cell_size_x());
        assert!(need);
    }

    #[test]
    fn rebuild_clips_to_the_data_envelope() {
        let lattice = lattice(9000, 9000, 2048);
        let (transform, size) = lattice.tile_info(0, 0);

        let mut scaled = transform.coefficients();
        scaled[1] *= 3.0;
        scaled[5] *= 3.0;

        let (rebuilt, shape, _, level) = lattice
            .rebuild_transform_to_target_crs(&GeoTransform::new(scaled), size, "epsg:3857", "epsg:3857")
            .expect("rebuild");

        let data = GeoTransform::new(TRANSFORM).envelope(RasterSize::square(9000));
        let env = rebuilt.envelope(shape);
        let eps = lattice.scale_x()[level];
        assert!(env.left() >= data.left() - eps);
        assert!(env.top() <= data.top() + eps);
    }

    #[test]
    fn rebuild_across_crs() {
        let lattice = lattice(9000, 9000, 2048);
        let (transform, size) = lattice.tile_info(0, 0);

        // rebuild the 3x grid's envelope expressed in WGS84 back onto the native grid
        let mut scaled = transform.coefficients();
        scaled[1] *= 3.0;
        scaled[5] *= 3.0;
        let env = GeoTransform::new(scaled).envelope(size);
        let wgs_env = crs::reproject_envelope(
            &env,
            &SpatialReference::from_definition("EPSG:3857").expect("crs"),
            &SpatialReference::from_definition("EPSG:4326").expect("crs"),
        )
        .expect("reprojected envelope");

        let wgs_transform = GeoTransform::new([
            wgs_env.left(),
            wgs_env.width() / 2048.0,
            0.0,
            wgs_env.top(),
            0.0,
            -(wgs_env.height() / 2048.0),
        ]);

        let (rebuilt, _, need, level) = lattice
            .rebuild_transform_to_target_crs(&wgs_transform, RasterSize::square(2048), "EPSG:4326", "EPSG:3857")
            .expect("rebuild");

        assert_eq!(level, 1);
        assert_relative_eq!(rebuilt.cell_size_x(), transform.cell_size_x() * 2.0);
        assert!(need);
    }

    #[test]
    fn stable_rounding_pushes_halves_up() {
        assert_eq!(stable_round(1.5), 2);
        assert_eq!(stable_round(2.5), 3);
        assert_eq!(stable_round(-0.5), 0);
        assert_eq!(stable_round(2.4999), 2);
        assert_eq!(stable_round(2.5001), 3);
        // drift of one ulp around the half still rounds up
        assert_eq!(stable_round(1.5 - f64::EPSILON), 2);
    }
}
