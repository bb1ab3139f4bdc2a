use crate::*;

/// Temporarily shifts a point buffer so its minimum x/y sits at the origin.
///
/// Large projected coordinates lose precision in the interpolation arithmetic, so calculations
/// run on the shifted values. The original coordinates are restored bit for bit when the guard
/// drops, including on early returns.
///
/// ```rust
/// # use geosurf::*;
/// let mut pts = vec![[500_000.0, 7_000_000.0, 1.0], [500_010.0, 7_000_020.0, 2.0]];
/// {
///     let s = ScopedShift::new(&mut pts);
///     assert_eq!(s.points()[1], [10.0, 20.0, 2.0]);
///     assert_eq!(s.offset(), [500_000.0, 7_000_000.0]);
/// }
/// assert_eq!(pts[0], [500_000.0, 7_000_000.0, 1.0]);
/// ```
pub struct ScopedShift<'a> {
    points: &'a mut [Point3],
    offset: Point2,
    // x - o + o is not always x in floating point
    original: Vec<Point2>,
}

impl<'a> ScopedShift<'a> {
    pub fn new(points: &'a mut [Point3]) -> Self {
        let offset = points
            .iter()
            .map(ToPoint2::to_p2)
            .reduce(Point2::min_all)
            .unwrap_or_default();
        let original = points.iter().map(ToPoint2::to_p2).collect();
        for p in points.iter_mut() {
            p[0] -= offset[0];
            p[1] -= offset[1];
        }
        Self {
            points,
            offset,
            original,
        }
    }

    /// The amount subtracted from each x/y.
    pub fn offset(&self) -> Point2 {
        self.offset
    }

    /// The shifted points.
    pub fn points(&self) -> &[Point3] {
        self.points
    }

    /// Shift an external extent or point into the same frame.
    pub fn apply(&self, p: Point2) -> Point2 {
        p.sub(self.offset)
    }
}

impl Drop for ScopedShift<'_> {
    fn drop(&mut self) {
        for (p, [x, y]) in self.points.iter_mut().zip(&self.original) {
            p[0] = *x;
            p[1] = *y;
        }
    }
}
