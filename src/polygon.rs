use crate::*;

/// A closed plan polygon, used to trim meshes.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Polygon2(Vec<Point2>);

impl Polygon2 {
    /// A closing point that repeats the first is dropped. Fails with fewer than 3 points.
    pub fn new<I, P>(points: I) -> SurfaceResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: ToPoint2,
    {
        let mut points = points.into_iter().map(ToPoint2::to_p2).collect::<Vec<_>>();
        if points.len() > 3 && points.first() == points.last() {
            points.pop();
        }
        if points.len() < 3 {
            return Err(SurfaceError::TooFewPoints {
                needed: 3,
                found: points.len(),
            });
        }
        Ok(Polygon2(points))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pts(&self) -> &[Point2] {
        &self.0
    }

    /// The sides of the polygon, including the closing side.
    pub fn sides(&self) -> impl Iterator<Item = (Point2, Point2)> + '_ {
        let n = self.0.len();
        (0..n).map(move |i| (self.0[i], self.0[(i + 1) % n]))
    }

    /// Winding number of the polygon about `p`.
    fn winding(&self, [x, y]: Point2) -> i32 {
        self.sides().fold(0, |w, (a, b)| {
            if a[1] <= y {
                if b[1] > y && orient2d(a, b, [x, y]) > 0.0 {
                    return w + 1;
                }
            } else if b[1] <= y && orient2d(a, b, [x, y]) < 0.0 {
                return w - 1;
            }
            w
        })
    }
}

/// Test if a point is inside the polygon by a non-zero winding number. Points on the lower and
/// left sides count as inside, points on the upper and right sides do not.
impl<O: ToPoint2> Envelops<O> for Polygon2 {
    fn envelops(&self, p: O) -> bool {
        self.winding(p.to_p2()) != 0
    }
}

impl Area for Polygon2 {
    /// Plan area.
    ///
    /// # Example
    /// ```rust
    /// use geosurf::*;
    /// let p = Polygon2::new([
    ///     [0.0, 0.0],
    ///     [2.0, 0.0],
    ///     [2.0, 3.0],
    ///     [0.0, 3.0]
    /// ]).unwrap();
    ///
    /// assert!((p.area() - 6.0).abs() < 1e-9);
    /// ```
    fn area(&self) -> f64 {
        let twice: f64 = self.sides().map(|([ax, ay], [bx, by])| ax * by - ay * bx).sum();
        twice.abs() * 0.5
    }
}

impl TryFrom<&FaultLine> for Polygon2 {
    type Error = SurfaceError;

    /// The plan outline of a closed line.
    fn try_from(line: &FaultLine) -> SurfaceResult<Self> {
        Polygon2::new(line.points().iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction() {
        assert!(Polygon2::new([[0.0, 0.0], [1.0, 0.0]]).is_err());

        // closing point is dropped
        let p = Polygon2::new([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]).unwrap();
        assert_eq!(p.len(), 3);
        assert_eq!(p.sides().count(), 3);
        assert!((p.area() - 0.5).abs() < 1e-11);

        // clockwise
        let p = Polygon2::new([[0.0, 0.0], [0.0, 2.0], [3.0, 2.0], [3.0, 0.0]]).unwrap();
        assert!((p.area() - 6.0).abs() < 1e-11);

        let line = FaultLine::boundary([
            [0.0, 0.0, NULL_VALUE],
            [4.0, 0.0, NULL_VALUE],
            [4.0, 4.0, NULL_VALUE],
            [0.0, 0.0, NULL_VALUE],
        ])
        .unwrap();
        let p = Polygon2::try_from(&line).unwrap();
        assert_eq!(p.pts(), &[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0]]);
    }

    #[test]
    fn point_inside() {
        let polygon = Polygon2::new([[0.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, 0.0]]).unwrap();
        assert!(polygon.envelops([0.5, 0.5]));
        assert!(polygon.envelops([0.9, 0.9]));
        assert!(polygon.envelops([0.9999999, 0.999999]));
        assert!(polygon.envelops([0.00001, 0.00001]));
        assert!(polygon.envelops([0.3, 0.1]));

        assert!(!polygon.envelops([-0.3, 0.1]));
        assert!(!polygon.envelops([0.3, -0.1]));
        assert!(!polygon.envelops([1.1, 0.1]));
        assert!(!polygon.envelops([0.5, 1.1]));
        assert!(!polygon.envelops([1.5, 1.1]));

        // lower and left sides are in, upper and right are out
        assert!(polygon.envelops([0.0, 0.0]));
        assert!(polygon.envelops([0.5, 0.0]));
        assert!(!polygon.envelops([1.0, 0.5]));
        assert!(!polygon.envelops([0.5, 1.0]));
        assert!(!polygon.envelops([1.0, 1.0]));

        // 3D points test in plan
        assert!(polygon.envelops([0.5, 0.5, 100.0]));
    }
}
