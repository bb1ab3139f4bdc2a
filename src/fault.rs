use crate::*;

/// Total fault vertices accepted by a single calculation.
pub const MAX_FAULT_POINTS: usize = 500_000;

/// How a constraint line behaves.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LineKind {
    /// A soft constraint: the surface passes through the line with a single shared value.
    Boundary,
    /// A fault: each side of the line keeps an independent value, and no interpolation crosses
    /// the line.
    Discontinuity,
}

/// An ordered polyline of at least two distinct points, with a [`LineKind`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FaultLine {
    points: Vec<Point3>,
    kind: LineKind,
}

impl FaultLine {
    /// Build a line. Consecutive repeated points are dropped.
    ///
    /// Fails with [`SurfaceError::InvalidLine`] if fewer than two distinct points remain.
    pub fn new<I>(points: I, kind: LineKind) -> SurfaceResult<Self>
    where
        I: IntoIterator<Item = Point3>,
    {
        let mut pts: Vec<Point3> = Vec::new();
        for p in points {
            if p[0].is_nan() || p[1].is_nan() {
                return Err(SurfaceError::InvalidLine);
            }
            if pts.last().map(|&l| zero_len_xy(l.sub(p))) != Some(true) {
                pts.push(p);
            }
        }
        if pts.len() < 2 {
            Err(SurfaceError::InvalidLine)
        } else {
            Ok(Self { points: pts, kind })
        }
    }

    pub fn discontinuity<I: IntoIterator<Item = Point3>>(points: I) -> SurfaceResult<Self> {
        Self::new(points, LineKind::Discontinuity)
    }

    pub fn boundary<I: IntoIterator<Item = Point3>>(points: I) -> SurfaceResult<Self> {
        Self::new(points, LineKind::Boundary)
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn kind(&self) -> LineKind {
        self.kind
    }

    pub fn is_discontinuity(&self) -> bool {
        self.kind == LineKind::Discontinuity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Consecutive point pairs.
    pub fn segments(&self) -> impl Iterator<Item = (Point3, Point3)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }
}

impl IntoIterator for FaultLine {
    type Item = Point3;
    type IntoIter = std::vec::IntoIter<Self::Item>;
    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl Aabb for FaultLine {
    type Space = Point3;
    fn aabb(&self) -> Extents3 {
        self.points.iter().copied().collect()
    }
}

/// Check a set of faults can be used in a calculation.
pub fn validate_faults(faults: &[FaultLine]) -> SurfaceResult<()> {
    let n: usize = faults.iter().map(FaultLine::len).sum();
    if n > MAX_FAULT_POINTS {
        return Err(SurfaceError::TooManyFaultPoints);
    }
    if faults
        .iter()
        .flat_map(|f| f.points())
        .any(|p| !p[0].is_finite() || !p[1].is_finite())
    {
        return Err(SurfaceError::FaultMismatch("fault vertex is not finite"));
    }
    Ok(())
}

/// A spatial index of barrier segments.
///
/// Answers whether the straight path between two points crosses any barrier. Segments are
/// bucketed on a coarse square lattice so a query only tests nearby segments.
#[derive(Clone, Debug, Default)]
pub struct FaultSet {
    segs: Vec<[Point2; 2]>,
    bins: HashMap<(i64, i64), Vec<u32>>,
    origin: Point2,
    cell: f64,
}

impl FaultSet {
    /// Index the discontinuity lines in `faults`. Boundary lines are not barriers.
    pub fn new(faults: &[FaultLine]) -> Self {
        let segs = faults
            .iter()
            .filter(|f| f.is_discontinuity())
            .flat_map(|f| f.segments())
            .map(|(a, b)| [a.to_p2(), b.to_p2()]);
        Self::from_segments(segs)
    }

    /// Index raw barrier segments.
    pub fn from_segments<I: IntoIterator<Item = [Point2; 2]>>(segs: I) -> Self {
        let segs: Vec<_> = segs.into_iter().collect();
        if segs.is_empty() {
            return Self::default();
        }

        let ext: Extents2 = segs.iter().flat_map(|s| s.iter().copied()).collect();
        let avg_len = segs.iter().map(|[a, b]| dist_xy(*a, *b)).sum::<f64>() / segs.len() as f64;
        let mut cell = avg_len.max(ext.size.max_of() / 64.0);
        if !(cell > 0.0) {
            cell = 1.0;
        }

        let mut set = Self {
            segs: Vec::new(),
            bins: HashMap::default(),
            origin: ext.origin,
            cell,
        };
        for s in segs {
            set.insert(s);
        }
        set
    }

    fn bin(&self, p: Point2) -> (i64, i64) {
        let [x, y] = p.sub(self.origin).scale(self.cell.recip());
        (x.floor() as i64, y.floor() as i64)
    }

    fn insert(&mut self, seg: [Point2; 2]) {
        let id = self.segs.len() as u32;
        let (x0, y0) = self.bin(seg[0].min_all(seg[1]));
        let (x1, y1) = self.bin(seg[0].max_all(seg[1]));
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.bins.entry((x, y)).or_default().push(id);
            }
        }
        self.segs.push(seg);
    }

    pub fn is_empty(&self) -> bool {
        self.segs.is_empty()
    }

    /// Number of barrier segments.
    pub fn len(&self) -> usize {
        self.segs.len()
    }

    pub fn segments(&self) -> &[[Point2; 2]] {
        &self.segs
    }

    /// Returns if the path from `p` to `q` crosses a barrier.
    pub fn blocks(&self, p: impl ToPoint2, q: impl ToPoint2) -> bool {
        if self.segs.is_empty() {
            return false;
        }
        let (p, q) = (p.to_p2(), q.to_p2());
        let (x0, y0) = self.bin(p.min_all(q));
        let (x1, y1) = self.bin(p.max_all(q));
        let span = (x1 - x0 + 1).saturating_mul(y1 - y0 + 1);

        let crosses = |&[a, b]: &[Point2; 2]| segments_cross(p, q, a, b);

        if span as usize > self.segs.len() {
            return self.segs.iter().any(crosses);
        }

        (y0..=y1)
            .flat_map(|y| (x0..=x1).map(move |x| (x, y)))
            .filter_map(|k| self.bins.get(&k))
            .flatten()
            .any(|&i| crosses(&self.segs[i as usize]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_validation() {
        assert!(FaultLine::discontinuity([[0.0, 0.0, 0.0]]).is_err());
        assert!(FaultLine::discontinuity([[1.0, 1.0, 0.0], [1.0, 1.0, 5.0]]).is_err());
        let f = FaultLine::discontinuity([[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [1.0, 0.0, 0.0]])
            .unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(
            FaultLine::boundary([[0.0, 0.0, 0.0]]).unwrap_err().code(),
            21
        );
    }

    #[test]
    fn barrier_blocks() {
        let f = FaultLine::discontinuity([[5.0, -1.0, 0.0], [5.0, 11.0, 0.0]]).unwrap();
        let set = FaultSet::new(&[f]);
        assert_eq!(set.len(), 1);
        assert!(set.blocks([0.0, 0.0], [10.0, 0.0]));
        assert!(set.blocks([0.0, 5.0], [10.0, 6.0]));
        assert!(!set.blocks([0.0, 0.0], [4.0, 10.0]));
        assert!(!set.blocks([6.0, 0.0], [9.0, 10.0]));
        // a path around the end of the fault is clear
        assert!(!set.blocks([0.0, -2.0], [10.0, -2.0]));
    }

    #[test]
    fn boundary_lines_are_not_barriers() {
        let f = FaultLine::boundary([[5.0, -1.0, 0.0], [5.0, 11.0, 0.0]]).unwrap();
        let set = FaultSet::new(&[f]);
        assert!(set.is_empty());
        assert!(!set.blocks([0.0, 0.0], [10.0, 0.0]));
    }

    #[test]
    fn blocked_through_vertex() {
        let f =
            FaultLine::discontinuity([[5.0, -5.0, 0.0], [5.0, 0.0, 0.0], [5.0, 5.0, 0.0]]).unwrap();
        let set = FaultSet::new(&[f]);
        assert!(set.blocks([0.0, 0.0], [10.0, 0.0]));
    }

    #[test]
    fn long_query_uses_all_segments() {
        let segs = (0..10).map(|i| {
            let x = i as f64 * 10.0 + 5.0;
            [[x, -1.0], [x, 1.0]]
        });
        let set = FaultSet::from_segments(segs);
        assert!(set.blocks([0.0, 0.0], [1000.0, 0.0]));
        assert!(!set.blocks([0.0, 2.0], [1000.0, 2.0]));
    }
}
