//! Gridding of scattered points.
//!
//! Each node is evaluated from its nearest data points by an inverse distance weighted local
//! plane (a moving trend surface). Discontinuity faults are barriers: a data point is only used
//! by a node if the straight path between them does not cross a fault.
use crate::*;
use rayon::prelude::*;

/// Coordinates whose midpoint exceeds this multiple of their range lose too much precision.
const WILD_RATIO: f64 = 50_000.0;

/// Fails with [`SurfaceError::WildRange`] if the magnitude of the `min..max` midpoint is too
/// large relative to the range to be handled safely in reduced precision.
///
/// The remedy is to use [`calc_grid_double`], which shifts the coordinates first.
///
/// ```rust
/// # use geosurf::*;
/// assert!(check_range(500_000.0, 510_000.0).is_ok());
/// assert!(check_range(1e9, 1e9 + 10.0).is_err());
/// // zero range is never wild
/// assert!(check_range(1e9, 1e9).is_ok());
/// ```
pub fn check_range(min: f64, max: f64) -> SurfaceResult<()> {
    let mid = ((min + max) * 0.5).abs();
    let range = max - min;
    if range > 0.0 && mid > WILD_RATIO * range {
        Err(SurfaceError::WildRange)
    } else {
        Ok(())
    }
}

/// Calculate a grid from scattered points.
///
/// Points with an undefined z are ignored and points sharing a location are merged. At least 3
/// distinct, non colinear points must remain. The x and y coordinate ranges (data and grid
/// together) must pass [`check_range`].
///
/// Nodes beyond the search limits of [`GridOptions`] are filled outward from the computed
/// nodes, so the returned grid is fully defined.
pub fn calc_grid(
    points: &[Point3],
    faults: &[FaultLine],
    geom: GridGeometry,
    opts: &GridOptions,
) -> SurfaceResult<Grid> {
    record(calc_checked(points, faults, geom, opts).map(|(g, _)| g))
}

/// Like [`calc_grid`], but also returns the reliability of each node.
pub fn calc_grid_with_mask(
    points: &[Point3],
    faults: &[FaultLine],
    geom: GridGeometry,
    opts: &GridOptions,
) -> SurfaceResult<(Grid, MaskGrid)> {
    record(calc_checked(points, faults, geom, opts))
}

/// Calculate a grid from points with large coordinates.
///
/// The points are shifted so their minimum x/y sits at the origin while the grid is
/// calculated, and restored before returning (including on failure). No range check is done.
pub fn calc_grid_double(
    points: &mut [Point3],
    faults: &[FaultLine],
    geom: GridGeometry,
    opts: &GridOptions,
) -> SurfaceResult<Grid> {
    record(calc_shifted(points, faults, geom, opts))
}

fn calc_shifted(
    points: &mut [Point3],
    faults: &[FaultLine],
    geom: GridGeometry,
    opts: &GridOptions,
) -> SurfaceResult<Grid> {
    let shift = ScopedShift::new(points);
    let off = shift.offset().with_z(0.0);
    let local_geom = GridGeometry::new(
        geom.ncol(),
        geom.nrow(),
        shift.apply(geom.min()),
        shift.apply(geom.max()),
    )?;
    let local_faults = faults
        .iter()
        .map(|f| FaultLine::new(f.points().iter().map(|p| p.sub(off)), f.kind()))
        .collect::<SurfaceResult<Vec<_>>>()?;

    let (g, _) = calc(shift.points(), &local_faults, local_geom, opts)?;
    Ok(g.relocate(geom))
}

/// Calculate a grid that conforms to the shape of `shape`.
///
/// The data are gridded as residuals from `shape`, and the residual grid is added back onto
/// `shape` sampled at the new nodes. Away from data the result follows `shape` offset by the
/// nearby residuals. Points outside the defined area of `shape` are ignored.
pub fn calc_conformable_grid(
    points: &[Point3],
    faults: &[FaultLine],
    geom: GridGeometry,
    shape: &Grid,
    opts: &GridOptions,
) -> SurfaceResult<Grid> {
    record(calc_conformable(points, faults, geom, shape, opts))
}

fn calc_conformable(
    points: &[Point3],
    faults: &[FaultLine],
    geom: GridGeometry,
    shape: &Grid,
    opts: &GridOptions,
) -> SurfaceResult<Grid> {
    let fset = FaultSet::new(faults);
    let residuals = points
        .iter()
        .filter(|p| !is_null(p[2]))
        .filter_map(|&p| {
            sample_grid(shape, p.to_p2(), ResampleMethod::Bilinear, Some(&fset))
                .map(|t| p.to_p2().with_z(p[2] - t))
        })
        .collect::<Vec<_>>();

    let (mut g, _) = calc_checked(&residuals, faults, geom, opts)?;

    for (i, z) in g.zs_mut().iter_mut().enumerate() {
        let p = geom.node_xy(i % geom.ncol(), i / geom.ncol());
        let t = sample_grid(shape, p, ResampleMethod::Bilinear, Some(&fset));
        *z = match (t, *z) {
            (Some(t), Some(r)) => Some(opts.clamp(t + r)),
            _ => None,
        };
    }
    if g.zs().iter().any(Option::is_none) {
        fill_with(&mut g, &fset, opts.extrapolate_trend)?;
    }
    g.dump("conformable");
    Ok(g)
}

fn calc_checked(
    points: &[Point3],
    faults: &[FaultLine],
    geom: GridGeometry,
    opts: &GridOptions,
) -> SurfaceResult<(Grid, MaskGrid)> {
    let (xmin, xmax, ymin, ymax) = points
        .iter()
        .filter(|p| p[0].is_finite() && p[1].is_finite())
        .fold(
            (geom.min()[0], geom.max()[0], geom.min()[1], geom.max()[1]),
            |(a, b, c, d), p| (a.min(p[0]), b.max(p[0]), c.min(p[1]), d.max(p[1])),
        );
    check_range(xmin, xmax)?;
    check_range(ymin, ymax)?;
    check_range(geom.min()[0], geom.max()[0])?;
    check_range(geom.min()[1], geom.max()[1])?;

    calc(points, faults, geom, opts)
}

fn calc(
    points: &[Point3],
    faults: &[FaultLine],
    geom: GridGeometry,
    opts: &GridOptions,
) -> SurfaceResult<(Grid, MaskGrid)> {
    opts.validate()?;
    validate_faults(faults)?;
    let pts = prepare_points(points)?;
    dump_points("calc_grid input", &pts);

    let gridder = Gridder::new(pts, faults, geom, opts);

    let mut grid = Grid::try_blank(geom)?;
    let mut mask = MaskGrid::try_blank(geom)?;
    let ncol = geom.ncol();

    grid.zs_mut()
        .par_iter_mut()
        .zip(mask.zs_mut().par_iter_mut())
        .enumerate()
        .for_each(|(i, (z, m))| {
            let p = geom.node_xy(i % ncol, i / ncol);
            let (v, mk) = gridder.node(p);
            *z = v.map(|v| opts.clamp(v));
            *m = Some(mk);
        });

    let undefined = grid.len() - grid.len_nonempty();
    if undefined > 0 {
        log::debug!("{} nodes beyond search limits, filling", undefined);
        if grid.is_blank() {
            // search limits excluded everything; fall back to the whole data set
            let unlimited = Gridder {
                max_dist: f64::INFINITY,
                ..gridder
            };
            grid.zs_mut().par_iter_mut().enumerate().for_each(|(i, z)| {
                let p = geom.node_xy(i % ncol, i / ncol);
                *z = unlimited.node(p).0.map(|v| opts.clamp(v));
            });
        } else {
            fill_with(&mut grid, &FaultSet::new(faults), opts.extrapolate_trend)?;
            for z in grid.zs_mut().iter_mut().flatten() {
                *z = opts.clamp(*z);
            }
        }
    }

    grid.dump("calc_grid");
    Ok((grid, mask))
}

/// Drop unusable points and merge points at the same location (averaging z).
fn prepare_points(points: &[Point3]) -> SurfaceResult<Vec<Point3>> {
    if points.is_empty() {
        return Err(SurfaceError::Empty);
    }

    let mut order = Vec::new();
    let mut merged: HashMap<(u64, u64), (f64, usize)> = HashMap::default();
    for &[x, y, z] in points {
        if !x.is_finite() || !y.is_finite() || is_null(z) {
            continue;
        }
        // normalise -0.0
        let key = ((x + 0.0).to_bits(), (y + 0.0).to_bits());
        let e = merged.entry(key).or_insert_with(|| {
            order.push([x, y]);
            (0.0, 0)
        });
        e.0 += z;
        e.1 += 1;
    }

    let pts = order
        .into_iter()
        .map(|[x, y]| {
            let (sz, n) = merged[&((x + 0.0).to_bits(), (y + 0.0).to_bits())];
            [x, y, sz / n as f64]
        })
        .collect::<Vec<_>>();

    if pts.len() < 3 {
        return Err(SurfaceError::TooFewPoints {
            needed: 3,
            found: pts.len(),
        });
    }
    if colinear(&pts) {
        return Err(SurfaceError::Degenerate);
    }
    Ok(pts)
}

fn colinear(pts: &[Point3]) -> bool {
    let p0 = pts[0];
    let far = pts
        .iter()
        .copied()
        .max_by(|a, b| dist_xy(p0, *a).total_cmp(&dist_xy(p0, *b)))
        .unwrap_or(p0);
    let d = dist_xy(p0, far);
    if d == 0.0 {
        return true;
    }
    let off = pts
        .iter()
        .map(|&p| orient2d(p0, far, p).abs())
        .fold(0.0, f64::max);
    off <= 1e-9 * d * d
}

/// Buckets points on a square lattice for nearest neighbour searches.
pub(crate) struct PointIndex {
    pts: Vec<Point3>,
    origin: Point2,
    cell: f64,
    ncol: isize,
    nrow: isize,
    bins: Vec<Vec<u32>>,
}

impl PointIndex {
    pub fn new(pts: Vec<Point3>) -> Self {
        let n = pts.len().max(1) as f64;
        let ext: Extents2 = pts.iter().map(ToPoint2::to_p2).collect();
        let [w, h] = ext.size;
        let area = (w * h).max(w.max(h).powi(2) / n);
        let mut cell = (area * 4.0 / n).sqrt();
        if !(cell > 0.0 && cell.is_finite()) {
            cell = 1.0;
        }
        let ncol = (w / cell).floor() as isize + 1;
        let nrow = (h / cell).floor() as isize + 1;

        let mut bins = vec![Vec::new(); (ncol * nrow) as usize];
        let mut index = Self {
            pts: Vec::new(),
            origin: ext.origin,
            cell,
            ncol,
            nrow,
            bins: Vec::new(),
        };
        for (i, p) in pts.iter().enumerate() {
            let (c, r) = index.bin_of(p.to_p2());
            let (c, r) = (c.clamp(0, ncol - 1), r.clamp(0, nrow - 1));
            bins[(r * ncol + c) as usize].push(i as u32);
        }
        index.pts = pts;
        index.bins = bins;
        index
    }

    pub fn points(&self) -> &[Point3] {
        &self.pts
    }

    /// The lattice cell size, about twice the average data spacing.
    pub fn cell(&self) -> f64 {
        self.cell
    }

    fn bin_of(&self, p: Point2) -> (isize, isize) {
        let [x, y] = p.sub(self.origin).scale(self.cell.recip());
        (x.floor() as isize, y.floor() as isize)
    }

    /// The `k` nearest points to `p` within `max_dist` that pass `accept`, nearest first.
    ///
    /// Returns `(distance, index)` pairs.
    pub fn nearest<F>(&self, p: Point2, k: usize, max_dist: f64, accept: F) -> Vec<(f64, u32)>
    where
        F: Fn(&Point3) -> bool,
    {
        let (bc, br) = self.bin_of(p);
        let max_ring = [bc, self.ncol - 1 - bc, br, self.nrow - 1 - br]
            .into_iter()
            .map(isize::abs)
            .max()
            .unwrap_or(0);

        let mut found: Vec<(f64, u32)> = Vec::with_capacity(k * 2);
        for ring in 0..=max_ring {
            let inner = (ring - 1).max(0) as f64 * self.cell;
            if inner > max_dist || (found.len() >= k && inner > found[k - 1].0) {
                break;
            }

            for (c, r) in ring_cells(bc, br, ring) {
                if c < 0 || r < 0 || c >= self.ncol || r >= self.nrow {
                    continue;
                }
                for &i in &self.bins[(r * self.ncol + c) as usize] {
                    let q = &self.pts[i as usize];
                    let d = dist_xy(p, *q);
                    if d <= max_dist && accept(q) {
                        found.push((d, i));
                    }
                }
            }

            found.sort_by(|a, b| a.0.total_cmp(&b.0));
            found.truncate(k);
        }
        found
    }
}

/// The lattice cells at Chebyshev distance `ring` from `(c, r)`.
fn ring_cells(c: isize, r: isize, ring: isize) -> impl Iterator<Item = (isize, isize)> {
    (r - ring..=r + ring).flat_map(move |y| {
        let edge = y == r - ring || y == r + ring;
        let step = if edge || ring == 0 {
            1
        } else {
            (2 * ring) as usize
        };
        (c - ring..=c + ring).step_by(step).map(move |x| (x, y))
    })
}

struct Gridder {
    index: PointIndex,
    faults: FaultSet,
    /// Anisotropy scaling applied to x and y.
    scale: Point2,
    k: usize,
    power: f64,
    max_dist: f64,
    avg_spacing: f64,
    extrapolate: bool,
    step: bool,
    poor_dist: f64,
    outside: Extents2,
}

impl Gridder {
    fn new(pts: Vec<Point3>, faults: &[FaultLine], geom: GridGeometry, opts: &GridOptions) -> Self {
        let ext: Extents2 = pts.iter().map(ToPoint2::to_p2).collect();
        let [w, h] = ext.size;
        let scale = if opts.anisotropy && w > 0.0 && h > 0.0 {
            let a = (w / h).sqrt();
            [a.recip(), a]
        } else {
            [1.0, 1.0]
        };
        let xfm = |p: Point2| p.xfm(scale, |a, b| a * b);

        let n = pts.len() as f64;
        let scaled = pts
            .into_iter()
            .map(|p| xfm(p.to_p2()).with_z(p[2]))
            .collect::<Vec<_>>();
        let index = PointIndex::new(scaled);
        let avg_spacing = index.cell() * 0.5;

        let faults = FaultSet::from_segments(
            faults
                .iter()
                .filter(|f| f.is_discontinuity())
                .flat_map(|f| f.segments())
                .map(|(a, b)| [xfm(a.to_p2()), xfm(b.to_p2())]),
        );

        let mut max_dist = opts.search_radius.unwrap_or(f64::INFINITY);
        if opts.size_multiplier > 0.0 {
            max_dist = max_dist.min(opts.size_multiplier * avg_spacing);
        }

        let [xs, ys] = [geom.xspace(), geom.yspace()];
        let poor_dist = 2.0 * xs.max(ys).max(avg_spacing);
        let outside = ext.expand(xs.max(ys));

        log::debug!(
            "gridding {} points, average spacing {:.4}, search limit {}",
            n,
            avg_spacing,
            max_dist
        );

        Self {
            index,
            faults,
            scale,
            k: opts.num_local_points,
            power: opts.distance_power,
            max_dist,
            avg_spacing,
            extrapolate: opts.extrapolate_trend,
            step: opts.grid_type == GridFileType::Step,
            poor_dist,
            outside,
        }
    }

    /// Evaluate a node at the (unscaled) plan location `p`.
    fn node(&self, p: Point2) -> (Option<f64>, NodeMask) {
        let q = p.xfm(self.scale, |a, b| a * b);
        let near = self
            .index
            .nearest(q, self.k, self.max_dist, |pt| !self.faults.blocks(q, *pt));

        let mask = match near.first() {
            _ if !self.outside.envelops(p) => NodeMask::Outside,
            Some((d, _)) if *d <= self.poor_dist => NodeMask::Valid,
            _ => NodeMask::Poor,
        };

        (self.value(q, &near), mask)
    }

    fn value(&self, q: Point2, near: &[(f64, u32)]) -> Option<f64> {
        let pts = self.index.points();
        let &(d0, i0) = near.first()?;
        if d0 <= self.avg_spacing * 1e-9 || self.step {
            return Some(pts[i0 as usize][2]);
        }

        let rel = near
            .iter()
            .map(|&(_, i)| {
                let p = pts[i as usize];
                [p[0] - q[0], p[1] - q[1], p[2]]
            })
            .collect::<Vec<_>>();
        let weights = near
            .iter()
            .map(|&(d, _)| (d / self.avg_spacing).powf(-self.power))
            .collect::<Vec<_>>();

        let idw = || {
            let sw: f64 = weights.iter().sum();
            rel.iter().zip(&weights).map(|(p, w)| p[2] * w).sum::<f64>() / sw
        };

        if rel.len() < 3 || !well_spread(&rel) {
            return Some(idw());
        }

        let z = match fit_z_weighted(&rel, &weights) {
            Some([a, _, _]) => a,
            None => idw(),
        };

        if self.extrapolate {
            Some(z)
        } else {
            let (lo, hi) = rel
                .iter()
                .fold((f64::MAX, f64::MIN), |(lo, hi), p| (lo.min(p[2]), hi.max(p[2])));
            Some(z.clamp(lo, hi))
        }
    }
}

/// Returns if the points spread in two dimensions enough to support a plane.
fn well_spread(rel: &[Point3]) -> bool {
    let n = rel.len() as f64;
    let [mx, my] = rel
        .iter()
        .fold([0.0, 0.0], |[a, b], p| [a + p[0], b + p[1]])
        .scale(n.recip());
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in rel {
        let (dx, dy) = (p[0] - mx, p[1] - my);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    // eigenvalues of the 2x2 covariance
    let tr = sxx + syy;
    let det = sxx * syy - sxy * sxy;
    let disc = (tr * tr * 0.25 - det).max(0.0).sqrt();
    let lo = tr * 0.5 - disc;
    let hi = tr * 0.5 + disc;
    hi > 0.0 && lo > 1e-4 * hi
}

/// Recommend a grid geometry for the data.
///
/// The node count grows with the number of points (with fewer nodes per point on large data
/// sets), columns and rows follow the aspect of the area, and the count is reduced where the
/// data cluster with several points per cell.
///
/// If `bounds` is `None`, or has a coordinate beyond [`NULL_THRESHOLD`], or is inverted, the
/// data extents plus a margin of a fortieth of each side are used.
pub fn recommended_size(points: &[Point3], bounds: Option<Extents2>) -> SurfaceResult<GridGeometry> {
    record(recommend(points, bounds))
}

fn recommend(points: &[Point3], bounds: Option<Extents2>) -> SurfaceResult<GridGeometry> {
    let pts = points
        .iter()
        .filter(|p| p[0].is_finite() && p[1].is_finite())
        .map(ToPoint2::to_p2)
        .collect::<Vec<_>>();
    if pts.is_empty() {
        return Err(SurfaceError::Empty);
    }
    let data: Extents2 = pts.iter().copied().collect();

    let bounds = bounds.filter(|b| {
        b.is_proper() && b.origin.into_iter().chain(b.max()).all(|v| !is_null(v))
    });

    let area = match bounds {
        Some(b) => b,
        None => {
            let [mut xt, mut yt] = data.size.scale(1.0 / 40.0);
            if xt <= 0.0 && yt <= 0.0 {
                return Err(SurfaceError::Degenerate);
            }
            if xt <= 0.0 {
                xt = yt;
            }
            if yt <= 0.0 {
                yt = xt;
            }
            Extents2 {
                origin: data.origin.sub([xt, yt]),
                size: data.size.add([2.0 * xt, 2.0 * yt]),
            }
        }
    };

    let data_area = data.size[0].max(f64::MIN_POSITIVE) * data.size[1].max(f64::MIN_POSITIVE);
    let datapct = (data_area / (area.size[0] * area.size[1]))
        .sqrt()
        .sqrt()
        .clamp(0.1, 1.0);

    let n = pts.len();
    let mut ngrid = match n {
        0..=49 => 50 * n,
        50..=99 => 25 * n,
        100..=499 => 15 * n * (500 / n).min(3),
        500..=1999 => 10 * n,
        2000..=4999 => 9 * n,
        5000..=19999 => 7 * n,
        20000..=99999 => 5 * n,
        100000..=299999 => 3 * n,
        _ => n,
    };
    ngrid = ((ngrid as f64 * datapct) as usize).clamp(25, 1_000_000);

    let [w, h] = area.size;
    let aspect = h / w;
    let xt = (ngrid as f64 / aspect).sqrt();
    let yt = ngrid as f64 / xt;
    let mut nx = ((xt + 1.5) as usize).max(2);
    let mut ny = ((yt + 1.5) as usize).max(2);

    // clustered data: several points per cell means the grid can be coarser
    let xspace = w / (nx - 1) as f64;
    let yspace = h / (ny - 1) as f64;
    let mut counts = vec![0u32; nx * ny];
    for [x, y] in &pts {
        let c = ((x - area.origin[0]) / xspace) as isize;
        let r = ((y - area.origin[1]) / yspace) as isize;
        if c >= 0 && r >= 0 && (c as usize) < nx && (r as usize) < ny {
            counts[r as usize * nx + c as usize] += 1;
        }
    }
    let mut percell = 1;
    while percell < 9 {
        let n1 = counts.iter().filter(|&&c| c > 0).count();
        let n2 = counts.iter().filter(|&&c| c > percell).count();
        if n2 < n1 * 4 / 5 {
            break;
        }
        percell += 1;
    }
    if percell > 1 {
        let f = (percell as f64).sqrt();
        nx = ((nx as f64 / f) as usize).max(2);
        ny = ((ny as f64 / f) as usize).max(2);
    }

    GridGeometry::from_extents(nx, ny, area)
}
