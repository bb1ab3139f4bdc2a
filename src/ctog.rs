//! Gridding of contour lines.
//!
//! Contour segments are intersected with the grid rows and columns. Each cell side keeps the
//! crossings nearest its two end nodes. Grid corners are extrapolated from the crossings along
//! the boundary, the rest of the boundary is interpolated between crossings, and interior nodes
//! blend a row wise and a column wise interpolation, favouring whichever has the closer
//! crossing. Boundary nodes that no crossing reaches are fitted with a local plane.
use crate::*;
use rayon::prelude::*;

/// Most samples collected for one local plane fit.
const MAX_FIT_SAMPLES: usize = 99;

/// A polyline at a constant elevation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ContourLine {
    points: Vec<Point2>,
    z: f64,
}

impl ContourLine {
    /// Build a contour. Consecutive repeated points are dropped.
    ///
    /// Fails with [`SurfaceError::InvalidLine`] if fewer than two distinct points remain or the
    /// level is undefined.
    pub fn new<I, P>(points: I, z: f64) -> SurfaceResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: ToPoint2,
    {
        if is_null(z) {
            return Err(SurfaceError::InvalidLine);
        }
        let mut pts: Vec<Point2> = Vec::new();
        for p in points.into_iter().map(|p| p.to_p2()) {
            if !p[0].is_finite() || !p[1].is_finite() {
                return Err(SurfaceError::InvalidLine);
            }
            if pts.last().map(|&l| zero_len_xy(l.sub(p))) != Some(true) {
                pts.push(p);
            }
        }
        if pts.len() < 2 {
            return Err(SurfaceError::InvalidLine);
        }
        Ok(Self { points: pts, z })
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    /// Consecutive point pairs, at the contour level.
    pub fn segments(&self) -> impl Iterator<Item = (Point3, Point3)> + '_ {
        self.points
            .windows(2)
            .map(move |w| (w[0].with_z(self.z), w[1].with_z(self.z)))
    }
}

/// The crossings recorded on one cell side.
///
/// Positions are fractions along the side, from its lower left node. Only the crossing nearest
/// each end is kept, so `pct1` and `pct2` bracket every crossing seen. A single crossing sets
/// both ends.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Crossing {
    pct1: f64,
    zlev1: f64,
    pct2: f64,
    zlev2: f64,
    ncross: usize,
}

impl Crossing {
    pub fn new(pct: f64, z: f64) -> Self {
        Self {
            pct1: pct,
            zlev1: z,
            pct2: pct,
            zlev2: z,
            ncross: 1,
        }
    }

    /// Add a crossing. It replaces an end only if it lies beyond it.
    pub fn record(&mut self, pct: f64, z: f64) {
        if pct < self.pct1 {
            self.pct1 = pct;
            self.zlev1 = z;
        } else if pct > self.pct2 {
            self.pct2 = pct;
            self.zlev2 = z;
        }
        self.ncross += 1;
    }

    pub fn pct1(&self) -> f64 {
        self.pct1
    }

    pub fn z1(&self) -> f64 {
        self.zlev1
    }

    pub fn pct2(&self) -> f64 {
        self.pct2
    }

    pub fn z2(&self) -> f64 {
        self.zlev2
    }

    /// Number of crossings seen, including the discarded ones.
    pub fn count(&self) -> usize {
        self.ncross
    }
}

fn record_in(slot: &mut Option<Crossing>, pct: f64, z: f64) {
    match slot {
        Some(c) => c.record(pct, z),
        None => *slot = Some(Crossing::new(pct, z)),
    }
}

/// Indices of the grid lines at `origin + i·space` that lie within `lo..=hi`.
fn lines_between(lo: f64, hi: f64, origin: f64, space: f64, n: usize) -> std::ops::Range<usize> {
    let first = ((lo - origin) / space).ceil().max(0.0);
    let last = ((hi - origin) / space).floor().min((n - 1) as f64);
    if last < first {
        0..0
    } else {
        first as usize..last as usize + 1
    }
}

/// Crossings of contour and fault segments with the sides of grid cells.
///
/// Horizontal sides run from node `(col, row)` to `(col + 1, row)`, vertical sides from
/// `(col, row)` to `(col, row + 1)`.
#[derive(Clone, Debug)]
pub struct CrossingGrid {
    geom: GridGeometry,
    hcross: Vec<Option<Crossing>>,
    vcross: Vec<Option<Crossing>>,
    barriers: Vec<[Point2; 2]>,
    faulted: bool,
    zrange: Option<(f64, f64)>,
}

impl CrossingGrid {
    pub fn new(geom: GridGeometry) -> SurfaceResult<Self> {
        Ok(Self {
            geom,
            hcross: alloc_vec(geom.len(), None)?,
            vcross: alloc_vec(geom.len(), None)?,
            barriers: Vec::new(),
            faulted: false,
            zrange: None,
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geom
    }

    /// Samples a local plane fit gathers before it stops searching, once they show relief.
    fn fit_samples_needed(&self) -> usize {
        if self.faulted {
            10
        } else {
            3
        }
    }

    pub fn add_contour(&mut self, contour: &ContourLine) {
        for (a, b) in contour.segments() {
            self.add_segment(a, b);
        }
    }

    /// Record the crossings of a fault line.
    ///
    /// Segments with defined elevations at both ends add crossings. Discontinuities also
    /// become barriers to the local plane fits. Any fault makes the plane fits gather more
    /// samples.
    pub fn add_fault(&mut self, fault: &FaultLine) {
        self.faulted = true;
        for (a, b) in fault.segments() {
            self.add_segment(a, b);
            if fault.is_discontinuity() {
                self.barriers.push([a.to_p2(), b.to_p2()]);
            }
        }
    }

    /// Record where the segment `a-b` crosses grid rows and columns, with the elevation
    /// interpolated along the segment. Segments with an undefined end are skipped.
    pub fn add_segment(&mut self, a: Point3, b: Point3) {
        let [x1, y1, z1] = a;
        let [x2, y2, z2] = b;
        let g = self.geom;
        let [xmin, ymin] = g.min();
        let [xmax, ymax] = g.max();
        if (x1 < xmin && x2 < xmin)
            || (x1 > xmax && x2 > xmax)
            || (y1 < ymin && y2 < ymin)
            || (y1 > ymax && y2 > ymax)
            || is_null(z1)
            || is_null(z2)
        {
            return;
        }
        let (ncol, nrow) = (g.ncol(), g.nrow());
        let (xs, ys) = (g.xspace(), g.yspace());

        if y1 != y2 {
            for r in lines_between(y1.min(y2), y1.max(y2), ymin, ys, nrow) {
                let t = (ymin + r as f64 * ys - y1) / (y2 - y1);
                let x = x1 + t * (x2 - x1);
                if !(0.0..=1.0).contains(&t) || x < xmin || x > xmax {
                    continue;
                }
                let c = (((x - xmin) / xs + 0.01) as usize).min(ncol - 2);
                let pct = ((x - xmin) / xs - c as f64).clamp(0.01, 0.99);
                let z = z1 + t * (z2 - z1);
                record_in(&mut self.hcross[r * ncol + c], pct, z);
                self.extend_range(z);
            }
        }

        if x1 != x2 {
            for c in lines_between(x1.min(x2), x1.max(x2), xmin, xs, ncol) {
                let t = (xmin + c as f64 * xs - x1) / (x2 - x1);
                let y = y1 + t * (y2 - y1);
                if !(0.0..=1.0).contains(&t) || y < ymin || y > ymax {
                    continue;
                }
                let r = (((y - ymin) / ys + 0.01) as usize).min(nrow - 2);
                let pct = ((y - ymin) / ys - r as f64).clamp(0.01, 0.99);
                let z = z1 + t * (z2 - z1);
                record_in(&mut self.vcross[r * ncol + c], pct, z);
                self.extend_range(z);
            }
        }
    }

    fn extend_range(&mut self, z: f64) {
        self.zrange = Some(match self.zrange {
            None => (z, z),
            Some((lo, hi)) => (lo.min(z), hi.max(z)),
        });
    }

    /// The crossings of the side from `(col, row)` to `(col + 1, row)`.
    pub fn horizontal(&self, col: usize, row: usize) -> Option<Crossing> {
        self.hcross[self.geom.idx(col, row)]
    }

    /// The crossings of the side from `(col, row)` to `(col, row + 1)`.
    pub fn vertical(&self, col: usize, row: usize) -> Option<Crossing> {
        self.vcross[self.geom.idx(col, row)]
    }

    /// Number of cell sides with at least one crossing.
    pub fn len(&self) -> usize {
        self.hcross.iter().chain(&self.vcross).flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn row_crossings(&self, row: usize) -> Vec<(usize, Crossing)> {
        let ncol = self.geom.ncol();
        (0..ncol - 1)
            .filter_map(|c| self.hcross[row * ncol + c].map(|x| (c, x)))
            .collect()
    }

    fn col_crossings(&self, col: usize) -> Vec<(usize, Crossing)> {
        let ncol = self.geom.ncol();
        (0..self.geom.nrow() - 1)
            .filter_map(|r| self.vcross[r * ncol + col].map(|x| (r, x)))
            .collect()
    }

    /// Sample points of the crossings on the two sides leaving node `(col, row)`.
    fn crossing_points(&self, col: usize, row: usize) -> impl Iterator<Item = Point3> + '_ {
        let [x, y] = self.geom.node_xy(col, row);
        let (xs, ys) = (self.geom.xspace(), self.geom.yspace());
        let h = self
            .horizontal(col, row)
            .map(|c| [x + c.pct1 * xs, y, c.zlev1]);
        let v = self.vertical(col, row).map(|c| [x, y + c.pct1 * ys, c.zlev1]);
        h.into_iter().chain(v)
    }

    /// Interpolate the grid from the recorded crossings.
    ///
    /// Fails with [`SurfaceError::TooFewPoints`] if nothing crossed the grid.
    pub fn into_grid(self) -> SurfaceResult<Grid> {
        let (zmin, zmax) = self.zrange.ok_or(SurfaceError::TooFewPoints {
            needed: 1,
            found: 0,
        })?;
        let geom = self.geom;
        let mut solver = Solver {
            ztiny: ((zmax - zmin) / 1000.0).max(0.0),
            tiny: (geom.xspace() + geom.yspace()) / 200.0,
            barriers: FaultSet::from_segments(self.barriers.iter().copied()),
            needed: self.fit_samples_needed(),
            z: alloc_vec(geom.len(), NULL_VALUE)?,
            cg: &self,
        };
        solver.corner_points();
        solver.interpolate_on_boundary();
        solver.interpolate_between_crossings()?;
        Grid::from_values(geom, &solver.z)
    }
}

struct Solver<'a> {
    cg: &'a CrossingGrid,
    barriers: FaultSet,
    needed: usize,
    ztiny: f64,
    tiny: f64,
    z: Vec<f64>,
}

impl Solver<'_> {
    fn corner_points(&mut self) {
        let g = self.cg.geom;
        let (ncol, nrow) = (g.ncol(), g.nrow());
        for (c, r) in [(0, 0), (ncol - 1, 0), (0, nrow - 1), (ncol - 1, nrow - 1)] {
            let row = self.cg.row_crossings(r);
            let col = self.cg.col_crossings(c);
            let along_row = if c == 0 {
                extrapolate_start(&row, g.xspace())
            } else {
                extrapolate_end(&row, g.xspace(), ncol)
            };
            let along_col = if r == 0 {
                extrapolate_start(&col, g.yspace())
            } else {
                extrapolate_end(&col, g.yspace(), nrow)
            };
            let z = match (along_row, along_col) {
                (Some(a), Some(b)) => (a + b) * 0.5,
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => self.plane_fit(c, r),
            };
            self.z[g.idx(c, r)] = z;
        }
    }

    fn interpolate_on_boundary(&mut self) {
        let g = self.cg.geom;
        let (ncol, nrow) = (g.ncol(), g.nrow());
        let lines = [
            (self.cg.row_crossings(0), (0..ncol).collect::<Vec<_>>(), g.xspace()),
            (
                self.cg.row_crossings(nrow - 1),
                (0..ncol).map(|c| g.idx(c, nrow - 1)).collect(),
                g.xspace(),
            ),
            (
                self.cg.col_crossings(0),
                (0..nrow).map(|r| g.idx(0, r)).collect(),
                g.yspace(),
            ),
            (
                self.cg.col_crossings(ncol - 1),
                (0..nrow).map(|r| g.idx(ncol - 1, r)).collect(),
                g.yspace(),
            ),
        ];

        for (crossings, nodes, space) in lines {
            let n = nodes.len();
            if crossings.is_empty() {
                for &i in &nodes[1..n - 1] {
                    let z = self.plane_fit(i % ncol, i / ncol);
                    self.z[i] = z;
                }
                continue;
            }
            let mut line = nodes.iter().map(|&i| self.z[i]).collect::<Vec<_>>();
            let mut dist = vec![0; n];
            sweep(&mut line, &mut dist, &crossings, space, self.tiny);
            for (&i, z) in nodes[1..n - 1].iter().zip(&line[1..n - 1]) {
                self.z[i] = *z;
            }
        }
    }

    fn interpolate_between_crossings(&mut self) -> SurfaceResult<()> {
        let g = self.cg.geom;
        let (ncol, nrow) = (g.ncol(), g.nrow());
        if ncol < 3 || nrow < 3 {
            return Ok(());
        }
        let (cg, tiny) = (self.cg, self.tiny);

        // row wise pass, keeping the node distance to the nearest crossing
        let mut hdist = alloc_vec(g.len(), 0usize)?;
        self.z
            .par_chunks_mut(ncol)
            .zip(hdist.par_chunks_mut(ncol))
            .enumerate()
            .filter(|(r, _)| *r > 0 && *r < nrow - 1)
            .for_each(|(r, (line, dist))| {
                sweep(line, dist, &cg.row_crossings(r), g.xspace(), tiny);
            });

        // column wise pass, blended with the rows
        let z = &self.z;
        let columns = (1..ncol - 1)
            .into_par_iter()
            .map(|c| {
                let mut line = (0..nrow).map(|r| z[g.idx(c, r)]).collect::<Vec<_>>();
                let mut dist = vec![0; nrow];
                sweep(&mut line, &mut dist, &cg.col_crossings(c), g.yspace(), tiny);
                (c, line, dist)
            })
            .collect::<Vec<_>>();

        let weight = |d: usize| (1.0 / (d as f64 + 1.0)).powi(2);
        for (c, line, vdist) in columns {
            for r in 1..nrow - 1 {
                let i = g.idx(c, r);
                let (wh, wv) = (weight(hdist[i]), weight(vdist[r]));
                self.z[i] = (self.z[i] * wh + line[r] * wv) / (wh + wv);
            }
        }
        Ok(())
    }

    /// Evaluate a local plane through the crossings nearest node `(col, row)`.
    ///
    /// Square rings around the node are searched until enough samples with some relief are
    /// found. With faults, more samples are gathered, and those across a barrier are dropped.
    fn plane_fit(&self, col: usize, row: usize) -> f64 {
        let g = self.cg.geom;
        let (ncol, nrow) = (g.ncol(), g.nrow());
        let node = g.node_xy(col, row);
        let needed = self.needed;

        let mut samples: Vec<Point3> = Vec::with_capacity(MAX_FIT_SAMPLES);
        let (mut zmin, mut zmax) = (f64::INFINITY, f64::NEG_INFINITY);
        for level in 0..ncol.max(nrow) {
            let pts = ring(col, row, level, ncol, nrow).flat_map(|(c, r)| self.cg.crossing_points(c, r));
            for p in pts.take(MAX_FIT_SAMPLES - samples.len()) {
                zmin = zmin.min(p[2]);
                zmax = zmax.max(p[2]);
                samples.push(p);
            }
            if samples.len() >= MAX_FIT_SAMPLES
                || (samples.len() > needed && zmax > zmin + self.ztiny)
            {
                break;
            }
        }

        assert!(
            !samples.is_empty(),
            "no crossings found for the plane fit at node ({}, {})",
            col,
            row
        );
        if zmax - zmin <= self.ztiny {
            return zmin;
        }

        let first = samples[0][2];
        if !self.barriers.is_empty() {
            samples.retain(|p| !self.barriers.blocks(node, *p));
        }
        if samples.len() < 3 {
            return samples.first().map_or(first, |p| p[2]);
        }

        let local = samples
            .iter()
            .map(|p| p.sub(node.with_z(0.0)))
            .collect::<Vec<_>>();
        // the node is at the local origin
        fit_z(&local).map_or(samples[0][2], |[a, _, _]| a)
    }
}

/// The cells of the square ring `level` cells out from `(col, row)`, clipped to the grid.
fn ring(
    col: usize,
    row: usize,
    level: usize,
    ncol: usize,
    nrow: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let (c, r, l) = (col as isize, row as isize, level as isize);
    (r - l..=r + l)
        .flat_map(move |y| (c - l..=c + l).map(move |x| (x, y)))
        .filter(move |&(x, y)| (x - c).abs() == l || (y - r).abs() == l)
        .filter(move |&(x, y)| x >= 0 && y >= 0 && (x as usize) < ncol && (y as usize) < nrow)
        .map(|(x, y)| (x as usize, y as usize))
}

fn interp(p0: f64, z0: f64, p1: f64, z1: f64, p: f64, tiny: f64) -> f64 {
    z0 + (p - p0) / (p1 - p0).max(tiny) * (z1 - z0)
}

/// Interpolate the inner values of one grid line between its crossings.
///
/// `line` holds the values along the line, of which the two ends must be set. `dist` receives
/// each inner node's distance, in nodes, to the nearest crossing; a line without crossings
/// gets the line length.
fn sweep(line: &mut [f64], dist: &mut [usize], crossings: &[(usize, Crossing)], space: f64, tiny: f64) {
    let n = line.len();
    let (mut p0, mut z0) = (0.0, line[0]);
    let mut next = 1;
    let mut bracketed = false;

    for &(k, c) in crossings {
        let p1 = (k as f64 + c.pct1) * space;
        let last = k.min(n - 2);
        for j in next..=last {
            let mut d = last - j;
            if bracketed {
                d = d.min(j - next);
            }
            dist[j] = d;
            line[j] = interp(p0, z0, p1, c.zlev1, j as f64 * space, tiny);
        }
        next = next.max(k + 1);
        p0 = (k as f64 + c.pct2) * space;
        z0 = c.zlev2;
        bracketed = true;
    }

    let end = (n - 1) as f64 * space;
    let zend = line[n - 1];
    for j in next..n - 1 {
        dist[j] = if bracketed { j - next } else { n };
        line[j] = interp(p0, z0, end, zend, j as f64 * space, tiny);
    }
}

fn extrapolate_start(crossings: &[(usize, Crossing)], space: f64) -> Option<f64> {
    match crossings {
        [(k1, c1), (k2, c2), ..] => {
            let p1 = (*k1 as f64 + c1.pct2) * space;
            let p2 = (*k2 as f64 + c2.pct1) * space;
            Some(interp(p1, c1.zlev2, p2, c2.zlev1, 0.0, 0.0))
        }
        _ => None,
    }
}

fn extrapolate_end(crossings: &[(usize, Crossing)], space: f64, n: usize) -> Option<f64> {
    match crossings {
        [.., (k2, c2), (k1, c1)] => {
            let p1 = (*k1 as f64 + c1.pct1) * space;
            let p2 = (*k2 as f64 + c2.pct2) * space;
            let end = (n - 1) as f64 * space;
            Some(c1.zlev1 + (end - p1) / (p2 - p1) * (c2.zlev2 - c1.zlev1))
        }
        _ => None,
    }
}

/// Calculate a grid from contour lines.
///
/// Faults are honoured: segments with defined elevations add crossings, and discontinuities
/// stop the local plane fits used where no crossing reaches the grid boundary. The result is
/// clamped to the value limits of `opts`.
///
/// Fails with [`SurfaceError::Empty`] without contours and with [`SurfaceError::TooFewPoints`]
/// if no contour or fault crosses a grid row or column.
pub fn contours_to_grid(
    contours: &[ContourLine],
    faults: &[FaultLine],
    geom: GridGeometry,
    opts: &GridOptions,
) -> SurfaceResult<Grid> {
    record(contours_inner(contours, faults, geom, opts))
}

fn contours_inner(
    contours: &[ContourLine],
    faults: &[FaultLine],
    geom: GridGeometry,
    opts: &GridOptions,
) -> SurfaceResult<Grid> {
    if contours.is_empty() {
        return Err(SurfaceError::Empty);
    }
    opts.validate()?;
    validate_faults(faults)?;

    let mut cg = CrossingGrid::new(geom)?;
    for c in contours {
        cg.add_contour(c);
    }
    for f in faults {
        cg.add_fault(f);
    }
    log::debug!(
        "{} contours crossed {} cell sides of a {}x{} grid",
        contours.len(),
        cg.len(),
        geom.ncol(),
        geom.nrow()
    );

    let mut grid = cg.into_grid()?;
    for z in grid.zs_mut().iter_mut().flatten() {
        *z = opts.clamp(*z);
    }
    grid.dump("contours_to_grid");
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;

    fn geom5() -> GridGeometry {
        GridGeometry::new(5, 5, [0.0, 0.0], [4.0, 4.0]).unwrap()
    }

    /// Vertical contours at `x = k + 0.5` with `z = x + offset(x)`.
    fn vertical_contours<F: Fn(f64) -> f64>(f: F) -> Vec<ContourLine> {
        (-1..5)
            .map(|k| {
                let x = k as f64 + 0.5;
                ContourLine::new([[x, -1.0], [x, 5.0]], f(x)).unwrap()
            })
            .collect()
    }

    #[quickcheck]
    fn crossings_bracket_all(pcts: Vec<u8>) -> TestResult {
        if pcts.is_empty() {
            return TestResult::discard();
        }
        let ps = pcts
            .iter()
            .map(|&p| 0.01 + 0.98 * p as f64 / 255.0)
            .collect::<Vec<_>>();
        let mut c = Crossing::new(ps[0], 0.0);
        for (i, &p) in ps.iter().enumerate().skip(1) {
            c.record(p, i as f64);
        }
        TestResult::from_bool(
            ps.iter().all(|&p| c.pct1() <= p && p <= c.pct2()) && c.count() == ps.len(),
        )
    }

    #[test]
    fn crossing_keeps_outermost() {
        let mut c = Crossing::new(0.5, 5.0);
        assert_eq!((c.pct1(), c.pct2()), (0.5, 0.5));
        c.record(0.3, 3.0);
        c.record(0.8, 8.0);
        c.record(0.6, 6.0);
        assert_eq!((c.pct1(), c.z1()), (0.3, 3.0));
        assert_eq!((c.pct2(), c.z2()), (0.8, 8.0));
        assert_eq!(c.count(), 4);
    }

    #[test]
    fn segment_crossings() {
        let mut cg = CrossingGrid::new(geom5()).unwrap();
        cg.add_segment([0.5, -1.0, 0.0], [0.5, 5.0, 6.0]);
        assert_eq!(cg.len(), 5);
        for r in 0..5 {
            let c = cg.horizontal(0, r).unwrap();
            assert!((c.pct1() - 0.5).abs() < 1e-12);
            assert!((c.z1() - (r as f64 + 1.0)).abs() < 1e-12);
        }
        assert!(cg.vertical(0, 0).is_none());

        // crossings near a node are kept off it
        cg.add_segment([1.0005, -1.0, 0.0], [1.0005, 5.0, 0.0]);
        let c = cg.horizontal(1, 2).unwrap();
        assert_eq!(c.pct1(), 0.01);

        // outside the grid
        cg.add_segment([5.0, 0.0, 0.0], [6.0, 4.0, 0.0]);
        assert_eq!(cg.len(), 10);
    }

    #[test]
    fn planar_contours_reproduce_plane() {
        let g = contours_to_grid(&vertical_contours(|x| x), &[], geom5(), &GridOptions::default())
            .unwrap();
        assert_eq!(g.len_nonempty(), 25);
        for p in g.points() {
            let x = p.z - p.x();
            assert!(x.abs() < 1e-9, "{:?}", p);
        }
    }

    #[test]
    fn diagonal_contours() {
        let lines = (0..8)
            .map(|k| {
                let c = k as f64 + 0.5;
                ContourLine::new([[c + 1.0, -1.0], [-1.0, c + 1.0]], c).unwrap()
            })
            .collect::<Vec<_>>();
        let g = contours_to_grid(&lines, &[], geom5(), &GridOptions::default()).unwrap();
        for p in g.points() {
            let x = p.z - (p.x() + p.y());
            assert!(x.abs() < 1e-9, "{:?}", p);
        }
    }

    #[test]
    fn fault_separates_plane_fits() {
        let lines = vertical_contours(|x| if x < 2.2 { x } else { x + 10.0 });
        let fault =
            FaultLine::discontinuity([[2.2, -1.0, NULL_VALUE], [2.2, 5.0, NULL_VALUE]]).unwrap();
        let g = contours_to_grid(&lines, &[fault], geom5(), &GridOptions::default()).unwrap();
        for r in 0..5 {
            assert!(g.z(0, r).unwrap().abs() < 1e-9);
            assert!((g.z(4, r).unwrap() - 14.0).abs() < 1e-9);
        }
    }

    #[test]
    fn any_fault_widens_plane_fits() {
        let mut cg = CrossingGrid::new(geom5()).unwrap();
        assert_eq!(cg.fit_samples_needed(), 3);
        let edge =
            FaultLine::boundary([[-1.0, 2.2, NULL_VALUE], [5.0, 2.2, NULL_VALUE]]).unwrap();
        cg.add_fault(&edge);
        assert_eq!(cg.fit_samples_needed(), 10);
        assert!(cg.barriers.is_empty());

        let g = contours_to_grid(&vertical_contours(|x| x), &[edge], geom5(), &GridOptions::default())
            .unwrap();
        assert_eq!(g.len_nonempty(), 25);
        for p in g.points() {
            let x = p.z - p.x();
            assert!(x.abs() < 1e-9, "{:?}", p);
        }
    }

    #[test]
    fn clamped_to_limits() {
        let opts = GridOptions::default().with_max_value(2.0);
        let g = contours_to_grid(&vertical_contours(|x| x), &[], geom5(), &opts).unwrap();
        let (lo, hi) = g.z_range().unwrap();
        assert!(lo.abs() < 1e-9);
        assert_eq!(hi, 2.0);
    }

    #[test]
    fn nothing_crosses() {
        let far = ContourLine::new([[10.0, 10.0], [20.0, 20.0]], 1.0).unwrap();
        let r = contours_to_grid(&[far], &[], geom5(), &GridOptions::default());
        assert!(r.is_err());
        assert_eq!(last_error_code(), 6);

        assert!(contours_to_grid(&[], &[], geom5(), &GridOptions::default()).is_err());
        assert_eq!(last_error_code(), 2);
        assert!(ContourLine::new([[0.0, 0.0], [0.0, 0.0]], 1.0).is_err());
        assert!(ContourLine::new([[0.0, 0.0], [1.0, 0.0]], NULL_VALUE).is_err());
    }
}
