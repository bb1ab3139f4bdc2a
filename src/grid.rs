use crate::*;

/// The node layout of a rectangular grid.
///
/// Nodes sit on the corners of `ncol - 1` by `nrow - 1` cells, so the first and last columns lie
/// exactly on `min[0]` and `max[0]`. Spacing is `(max - min) / (n - 1)` on each axis and the x
/// and y spacings may differ.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GridGeometry {
    ncol: usize,
    nrow: usize,
    min: Point2,
    max: Point2,
}

impl GridGeometry {
    /// Fails if either count is below 2, or the extents are inverted, zero sized, or not finite.
    pub fn new(ncol: usize, nrow: usize, min: Point2, max: Point2) -> SurfaceResult<Self> {
        if ncol < 2 || nrow < 2 {
            return Err(SurfaceError::GridTooSmall { ncol, nrow });
        }
        let finite = min.into_iter().chain(max).all(f64::is_finite);
        if !finite || max[0] <= min[0] || max[1] <= min[1] {
            return Err(SurfaceError::InvalidExtents);
        }
        Ok(Self {
            ncol,
            nrow,
            min,
            max,
        })
    }

    pub fn from_extents(ncol: usize, nrow: usize, ext: Extents2) -> SurfaceResult<Self> {
        Self::new(ncol, nrow, ext.origin, ext.max())
    }

    /// Build a geometry covering at least `min..max` with square cells of `spacing`.
    ///
    /// The maximum is pushed out so that it lands on a whole number of cells.
    pub fn with_spacing(min: Point2, max: Point2, spacing: f64) -> SurfaceResult<Self> {
        if !(spacing > 0.0 && spacing.is_finite()) {
            return Err(SurfaceError::InvalidOption("grid spacing"));
        }
        let [w, h] = max.sub(min);
        if !(w > 0.0 && h > 0.0) {
            return Err(SurfaceError::InvalidExtents);
        }
        let ncol = ((w / spacing).ceil() as usize).max(1) + 1;
        let nrow = ((h / spacing).ceil() as usize).max(1) + 1;
        let max = min.add([(ncol - 1) as f64, (nrow - 1) as f64].scale(spacing));
        Self::new(ncol, nrow, min, max)
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn min(&self) -> Point2 {
        self.min
    }

    pub fn max(&self) -> Point2 {
        self.max
    }

    pub fn extents(&self) -> Extents2 {
        Extents2::from_min_max(self.min, self.max)
    }

    pub fn xspace(&self) -> f64 {
        (self.max[0] - self.min[0]) / (self.ncol - 1) as f64
    }

    pub fn yspace(&self) -> f64 {
        (self.max[1] - self.min[1]) / (self.nrow - 1) as f64
    }

    /// Total node count.
    pub fn len(&self) -> usize {
        self.ncol * self.nrow
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The plan location of node `(col, row)`.
    ///
    /// The last column and row land exactly on the maximum extents.
    pub fn node_xy(&self, col: usize, row: usize) -> Point2 {
        let x = if col + 1 == self.ncol {
            self.max[0]
        } else {
            self.min[0] + col as f64 * self.xspace()
        };
        let y = if row + 1 == self.nrow {
            self.max[1]
        } else {
            self.min[1] + row as f64 * self.yspace()
        };
        [x, y]
    }

    /// The fractional `(col, row)` position of a plan location.
    pub fn frac(&self, p: impl ToPoint2) -> (f64, f64) {
        let [x, y] = p.to_p2();
        (
            (x - self.min[0]) / self.xspace(),
            (y - self.min[1]) / self.yspace(),
        )
    }

    /// Returns if the plan location is inside the grid, with a tolerance of a thousandth of a
    /// cell.
    pub fn contains(&self, p: impl ToPoint2) -> bool {
        let (c, r) = self.frac(p);
        let t = 1e-3;
        c >= -t && r >= -t && c <= (self.ncol - 1) as f64 + t && r <= (self.nrow - 1) as f64 + t
    }

    /// Index in row first storage.
    pub fn idx(&self, col: usize, row: usize) -> usize {
        if col >= self.ncol {
            panic!("column '{}' is outside grid bounds", col);
        }
        if row >= self.nrow {
            panic!("row '{}' is outside grid bounds", row);
        }
        row * self.ncol + col
    }
}

/// A grid of generic data.
///
/// A grid is axis aligned with even spacing on each axis. Undefined nodes are `None`.
///
/// > `PartialEq` is derived and is _exact_ on the float values. This is useful for debugging but
/// should not be used for actual grid equality
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenericGrid<T> {
    geom: GridGeometry,

    /// The z values, stored row-first.
    zs: Vec<Option<T>>,
}

pub struct GridPoint<'a, T> {
    pub grid: &'a GenericGrid<T>,
    pub z: &'a T,
    x: usize,
    y: usize,
}

impl<T> GenericGrid<T> {
    /// Create a new, empty, grid with the given geometry.
    pub fn blank(geom: GridGeometry) -> Self {
        let zs = std::iter::repeat_with(|| None).take(geom.len()).collect();
        Self { geom, zs }
    }

    /// Create a new, empty, grid, reporting allocation failure.
    pub fn try_blank(geom: GridGeometry) -> SurfaceResult<Self> {
        let mut zs = Vec::new();
        zs.try_reserve_exact(geom.len())
            .map_err(|_| SurfaceError::Alloc)?;
        zs.extend(std::iter::repeat_with(|| None).take(geom.len()));
        Ok(Self { geom, zs })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geom
    }

    /// The x,y of the node at coord 0,0.
    pub fn origin(&self) -> Point2 {
        self.geom.min
    }

    /// The 2D plan extents that this grid covers.
    ///
    /// This does not account for grid point existence.
    pub fn extents(&self) -> Extents2 {
        self.geom.extents()
    }

    /// The number of grid points in the x-axis.
    pub fn x_count(&self) -> usize {
        self.geom.ncol
    }

    /// The number of grid points in the y-axis.
    pub fn y_count(&self) -> usize {
        self.geom.nrow
    }

    /// The _size_ of the grid, this **includes** empty points.
    /// (`x_count * y_count`)
    pub fn len(&self) -> usize {
        self.zs.len()
    }

    /// The number of points that are **not** `None`.
    pub fn len_nonempty(&self) -> usize {
        self.zs.iter().filter(|x| x.is_some()).count()
    }

    /// Returns if the grid is zero-sized, that is, has no points **at all**.
    pub fn is_empty(&self) -> bool {
        self.zs.is_empty()
    }

    /// Returns if the grid has no non-`None` points.
    pub fn is_blank(&self) -> bool {
        self.len_nonempty() == 0
    }

    /// Returns the [`Point2`] coordinates of the `x` and `y` indices.
    ///
    /// Note that this will always return a value, even if a grid point does not exist.
    pub fn get_xy(&self, x: usize, y: usize) -> Point2 {
        self.geom.node_xy(x, y)
    }

    pub fn get(&self, x: usize, y: usize) -> Option<GridPoint<T>> {
        self.zs[self.idx(x, y)].as_ref().map(|z| GridPoint {
            grid: self,
            z,
            x,
            y,
        })
    }

    /// Get a mutable point.
    ///
    /// This differs from [`get`] in that it returns just a mutable reference to the z value.
    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut T> {
        let i = self.idx(x, y);
        self.zs[i].as_mut()
    }

    /// Get a point by index rather than location.
    /// **Be sure that idx is taken from a GridPoint**
    pub fn get_idx(&self, idx: usize) -> Option<GridPoint<T>> {
        self.zs[idx].as_ref().map(|z| {
            let y = idx / self.geom.ncol;
            let x = idx - y * self.geom.ncol;
            GridPoint {
                grid: self,
                z,
                x,
                y,
            }
        })
    }

    pub fn set(&mut self, x: usize, y: usize, z: impl Into<Option<T>>) {
        let idx = self.idx(x, y);
        self.zs[idx] = z.into();
    }

    /// Set a point by index rather than location.
    pub fn set_idx(&mut self, idx: usize, z: impl Into<Option<T>>) {
        self.zs[idx] = z.into();
    }

    /// Take a point, replacing it with `None`.
    pub fn take(&mut self, x: usize, y: usize) -> Option<T> {
        let i = self.idx(x, y);
        std::mem::take(&mut self.zs[i])
    }

    fn idx(&self, x: usize, y: usize) -> usize {
        self.geom.idx(x, y)
    }

    pub fn points(&self) -> impl Iterator<Item = GridPoint<T>> {
        (0..self.y_count())
            .flat_map(move |y| (0..self.x_count()).map(move |x| (x, y)))
            .filter_map(move |(x, y)| self.get(x, y))
    }

    /// Parallel points iterator. The order should not be relied upon.
    pub fn points_par(&self) -> impl rayon::iter::ParallelIterator<Item = GridPoint<T>>
    where
        T: Send + Sync,
    {
        use rayon::prelude::*;
        (0..self.y_count())
            .into_par_iter()
            .flat_map(move |y| (0..self.x_count()).into_par_iter().map(move |x| (x, y)))
            .filter_map(move |(x, y)| self.get(x, y))
    }

    pub fn map<F: FnMut(T) -> U, U>(self, mut f: F) -> GenericGrid<U> {
        let Self { geom, zs } = self;
        let zs = zs.into_iter().map(|x| x.map(&mut f)).collect();
        GenericGrid { geom, zs }
    }

    /// The raw node slots, row first.
    pub fn zs(&self) -> &[Option<T>] {
        &self.zs
    }

    pub(crate) fn zs_mut(&mut self) -> &mut [Option<T>] {
        &mut self.zs
    }

    /// Move the same node values onto another geometry of equal dimensions.
    pub(crate) fn relocate(self, geom: GridGeometry) -> Self {
        assert_eq!(
            (geom.ncol, geom.nrow),
            (self.geom.ncol, self.geom.nrow),
            "relocated grid must keep its dimensions"
        );
        Self { geom, zs: self.zs }
    }

    /// Consume the grid, returning the backing data array.
    pub fn into_zs(self) -> Vec<Option<T>> {
        self.zs
    }
}

impl<T: Copy> GenericGrid<T> {
    /// The value at node `(x, y)`, `None` if undefined.
    pub fn z(&self, x: usize, y: usize) -> Option<T> {
        self.zs[self.idx(x, y)]
    }

    /// Like [`Self::z`] but with signed indices, `None` outside the grid.
    pub fn z_checked(&self, x: isize, y: isize) -> Option<T> {
        if x < 0 || y < 0 || x as usize >= self.x_count() || y as usize >= self.y_count() {
            return None;
        }
        self.z(x as usize, y as usize)
    }
}

impl<'a, T> GridPoint<'a, T> {
    pub fn x(&self) -> f64 {
        self.p2()[0]
    }

    pub fn y(&self) -> f64 {
        self.p2()[1]
    }

    pub fn x_idx(&self) -> usize {
        self.x
    }

    pub fn y_idx(&self) -> usize {
        self.y
    }

    pub fn loc(&self) -> (usize, usize) {
        (self.x, self.y)
    }

    /// Index in backing data structure.
    pub fn idx(&self) -> usize {
        self.grid.idx(self.x, self.y)
    }

    pub fn p2(&self) -> Point2 {
        self.grid.get_xy(self.x, self.y)
    }
}

impl<'a> GridPoint<'a, f64> {
    pub fn p3(&self) -> Point3 {
        self.p2().with_z(*self.z)
    }
}

impl<'a, T> Clone for GridPoint<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T> Copy for GridPoint<'a, T> {}

impl<T: fmt::Debug> fmt::Debug for GridPoint<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GridPoint: ({x}, {y}) -> ", x = self.x, y = self.y).and_then(|_| self.z.fmt(f))
    }
}

impl<T> PartialEq for GridPoint<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.grid, other.grid) // same grid reference
            && self.x == other.x && self.y == other.y // same x,y position
    }
}

impl From<GridPoint<'_, f64>> for Point3 {
    fn from(g: GridPoint<f64>) -> Self {
        g.p3()
    }
}

impl<T> ToPoint2 for GridPoint<'_, T> {
    fn to_p2(self) -> Point2 {
        self.p2()
    }
}

/// Type alias for a common grid of float values.
pub type Grid = GenericGrid<f64>;

/// Per node reliability flags of a calculated grid.
pub type MaskGrid = GenericGrid<NodeMask>;

impl Grid {
    /// Build a grid from row first values. Values at or beyond [`NULL_THRESHOLD`] are undefined.
    pub fn from_values(geom: GridGeometry, values: &[f64]) -> SurfaceResult<Self> {
        if values.len() != geom.len() {
            return Err(SurfaceError::InvalidOption("value count does not match grid size"));
        }
        let mut zs = Vec::new();
        zs.try_reserve_exact(values.len())
            .map_err(|_| SurfaceError::Alloc)?;
        zs.extend(values.iter().map(|&z| (!is_null(z)).then(|| z)));
        Ok(Self { geom, zs })
    }

    /// Row first values, undefined nodes written as [`NULL_VALUE`].
    pub fn to_values(&self) -> Vec<f64> {
        self.zs.iter().map(|z| z.unwrap_or(NULL_VALUE)).collect()
    }

    /// The minimum and maximum defined values.
    pub fn z_range(&self) -> Option<(f64, f64)> {
        self.zs.iter().flatten().fold(None, |acc, &z| match acc {
            None => Some((z, z)),
            Some((lo, hi)) => Some((lo.min(z), hi.max(z))),
        })
    }

    /// Write the grid to the diagnostic dump, if enabled.
    pub(crate) fn dump(&self, label: &str) {
        if !debug_dump_enabled() {
            return;
        }
        let g = &self.geom;
        log::debug!(
            target: "geosurf::dump",
            "grid {}: {}x{} ({:?})-({:?}) defined {}",
            label,
            g.ncol,
            g.nrow,
            g.min,
            g.max,
            self.len_nonempty()
        );
        for p in self.points() {
            let [x, y, z] = p.p3();
            log::debug!(target: "geosurf::dump", "{} {} {}", x, y, z);
        }
    }
}

/// Write points to the diagnostic dump, if enabled.
pub(crate) fn dump_points(label: &str, points: &[Point3]) {
    if !debug_dump_enabled() {
        return;
    }
    log::debug!(target: "geosurf::dump", "points {}: {}", label, points.len());
    for [x, y, z] in points {
        log::debug!(target: "geosurf::dump", "{} {} {}", x, y, z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_grid() {
        let geom = GridGeometry::new(10, 20, [0.0, 0.0], [135.0, 285.0]).unwrap();
        let g = Grid::blank(geom);
        assert_eq!(g.origin(), [0.0, 0.0]);
        assert_eq!(g.x_count(), 10);
        assert_eq!(g.y_count(), 20);
        assert_eq!(geom.xspace(), 15.0);
        assert_eq!(geom.yspace(), 15.0);
        assert_eq!(g.len(), 200);
        assert!(g.is_blank());
    }

    #[test]
    fn invalid_geometry() {
        assert_eq!(
            GridGeometry::new(1, 5, [0.0, 0.0], [1.0, 1.0])
                .unwrap_err()
                .code(),
            4
        );
        assert_eq!(
            GridGeometry::new(5, 5, [1.0, 0.0], [1.0, 1.0])
                .unwrap_err()
                .code(),
            5
        );
        assert!(GridGeometry::new(5, 5, [2.0, 0.0], [1.0, 1.0]).is_err());
        assert!(GridGeometry::new(5, 5, [0.0, 0.0], [f64::NAN, 1.0]).is_err());
    }

    #[test]
    fn geometry_with_spacing() {
        let g = GridGeometry::with_spacing([0.0, 0.0], [10.0, 4.5], 1.0).unwrap();
        assert_eq!(g.ncol(), 11);
        assert_eq!(g.nrow(), 6);
        assert_eq!(g.max(), [10.0, 5.0]);
    }

    #[test]
    fn get_xy_test() {
        let geom = GridGeometry::new(10, 20, [0.0, 0.0], [135.0, 285.0]).unwrap();
        let g = Grid::blank(geom);
        assert_eq!(g.get_xy(0, 0), [0.0, 0.0]);
        assert_eq!(g.get_xy(1, 0), [15.0, 0.0]);
        assert_eq!(g.get_xy(0, 1), [0.0, 15.0]);
        assert_eq!(g.get_xy(3, 4), [45.0, 60.0]);
        assert_eq!(g.get_xy(9, 19), [135.0, 285.0]);

        let (c, r) = geom.frac([22.5, 30.0]);
        assert_eq!((c, r), (1.5, 2.0));
        assert!(geom.contains([135.0, 0.0]));
        assert!(!geom.contains([136.0, 0.0]));
    }

    #[test]
    fn populate_grid() {
        let g = dummy_grid();

        assert_eq!(
            &g.zs,
            &[
                Some(1.0),
                Some(2.0),
                Some(3.0),
                Some(4.0),
                Some(5.0),
                Some(6.0)
            ]
        );

        assert_eq!(g.get(0, 0).map(|p| p.p3()), Some([0.0, 0.0, 1.0]));
        assert_eq!(g.get(1, 0).map(|p| p.p3()), Some([15.0, 0.0, 2.0]));
        assert_eq!(g.get(0, 1).map(|p| p.p3()), Some([0.0, 15.0, 3.0]));
        assert_eq!(g.get(1, 1).map(|p| p.p3()), Some([15.0, 15.0, 4.0]));
        assert_eq!(g.get(0, 2).map(|p| p.p3()), Some([0.0, 30.0, 5.0]));
        assert_eq!(g.get(1, 2).map(|p| p.p3()), Some([15.0, 30.0, 6.0]));
        assert_eq!(g.z_range(), Some((1.0, 6.0)));
    }

    #[test]
    fn grid_points() {
        let g = dummy_grid();
        let mut points = g.points();

        let p = points.next().unwrap();
        assert_eq!(p.x(), 0.0);
        assert_eq!(p.x_idx(), 0);
        assert_eq!(p.y(), 0.0);
        assert_eq!(p.y_idx(), 0);
        assert_eq!(p.p2(), [0.0, 0.0]);
        assert_eq!(p.p3(), [0.0, 0.0, 1.0]);

        assert_eq!(
            points.next().map(|p| (p.idx(), p.p3())),
            Some((1, [15.0, 0.0, 2.0]))
        );
        assert_eq!(
            points.next().map(|p| (p.idx(), p.p3())),
            Some((2, [0.0, 15.0, 3.0]))
        );
        assert_eq!(points.next().map(|p| p.p3()), Some([15.0, 15.0, 4.0]));
        assert_eq!(points.next().map(|p| p.p3()), Some([0.0, 30.0, 5.0]));
        assert_eq!(
            points.next().map(|p| (p.idx(), p.p3())),
            Some((5, [15.0, 30.0, 6.0]))
        );
    }

    #[test]
    fn values_round_trip_nulls() {
        let geom = GridGeometry::new(2, 2, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let g = Grid::from_values(geom, &[1.0, 1e30, -2e25, 4.0]).unwrap();
        assert_eq!(g.len_nonempty(), 2);
        assert_eq!(g.z(1, 0), None);
        assert_eq!(g.to_values(), vec![1.0, NULL_VALUE, NULL_VALUE, 4.0]);

        assert!(Grid::from_values(geom, &[1.0]).is_err());
    }

    #[test]
    fn checked_access() {
        let g = dummy_grid();
        assert_eq!(g.z_checked(-1, 0), None);
        assert_eq!(g.z_checked(1, 2), Some(6.0));
        assert_eq!(g.z_checked(2, 0), None);
    }
}
