use crate::*;
use rayon::prelude::*;

/// Grids larger than this multiple of the source are refused when faults must be honoured.
const MAX_FAULTED_GROWTH: usize = 2000;

/// Resample `grid` onto a new geometry.
///
/// Nodes of the new geometry outside `grid`, or whose surrounding source nodes are undefined,
/// are undefined. Source nodes on the far side of a discontinuity from the new node are not used.
pub fn resample(
    grid: &Grid,
    geom: GridGeometry,
    method: ResampleMethod,
    faults: &[FaultLine],
) -> SurfaceResult<Grid> {
    record(resample_inner(grid, geom, method, faults))
}

fn resample_inner(
    grid: &Grid,
    geom: GridGeometry,
    method: ResampleMethod,
    faults: &[FaultLine],
) -> SurfaceResult<Grid> {
    if grid.is_blank() {
        return Err(SurfaceError::Empty);
    }
    validate_faults(faults)?;
    let fset = FaultSet::new(faults);
    if !fset.is_empty() && geom.len() > grid.len().saturating_mul(MAX_FAULTED_GROWTH) {
        return Err(SurfaceError::InvalidOption(
            "resampled grid is too large to honour faults",
        ));
    }
    let fs = (!fset.is_empty()).then(|| &fset);

    let mut out = Grid::try_blank(geom)?;
    let ncol = geom.ncol();
    out.zs_mut().par_iter_mut().enumerate().for_each(|(i, z)| {
        let p = geom.node_xy(i % ncol, i / ncol);
        *z = sample_grid(grid, p, method, fs);
    });
    out.dump("resample");
    Ok(out)
}

/// Evaluate the surface of `grid` at each plan location.
///
/// A location outside the grid, or whose closest node is undefined, evaluates to `None`.
pub fn back_interpolate(
    grid: &Grid,
    points: &[Point2],
    faults: &[FaultLine],
    method: ResampleMethod,
) -> SurfaceResult<Vec<Option<f64>>> {
    record(back_interpolate_inner(grid, points, faults, method))
}

fn back_interpolate_inner(
    grid: &Grid,
    points: &[Point2],
    faults: &[FaultLine],
    method: ResampleMethod,
) -> SurfaceResult<Vec<Option<f64>>> {
    if points.is_empty() || grid.is_blank() {
        return Err(SurfaceError::Empty);
    }
    validate_faults(faults)?;
    let fset = FaultSet::new(faults);
    let fs = (!fset.is_empty()).then(|| &fset);
    Ok(points
        .par_iter()
        .map(|&p| sample_grid(grid, p, method, fs))
        .collect())
}

/// The slope magnitude and the uphill direction of the surface at each node.
///
/// The direction is in degrees counter-clockwise from the +x axis, in `0..360`. Slopes use
/// central differences where both neighbours are defined and one sided differences where only
/// one is; a node with no defined neighbour on either axis has no gradient.
pub fn horizontal_gradient(grid: &Grid) -> SurfaceResult<(Grid, Grid)> {
    if grid.is_blank() {
        return record(Err(SurfaceError::Empty));
    }
    let geom = *grid.geometry();
    let (xs, ys) = (geom.xspace(), geom.yspace());
    let mut slope = Grid::blank(geom);
    let mut dir = Grid::blank(geom);

    for p in grid.points() {
        let (c, r) = (p.x_idx() as isize, p.y_idx() as isize);
        let z = *p.z;
        let dx = diff(grid.z_checked(c - 1, r), z, grid.z_checked(c + 1, r), xs);
        let dy = diff(grid.z_checked(c, r - 1), z, grid.z_checked(c, r + 1), ys);
        if let (Some(dx), Some(dy)) = (dx, dy) {
            slope.set_idx(p.idx(), dx.hypot(dy));
            dir.set_idx(p.idx(), dy.atan2(dx).to_degrees().rem_euclid(360.0));
        }
    }
    record(Ok((slope, dir)))
}

fn diff(lo: Option<f64>, z: f64, hi: Option<f64>, h: f64) -> Option<f64> {
    match (lo, hi) {
        (Some(a), Some(b)) => Some((b - a) / (2.0 * h)),
        (Some(a), None) => Some((z - a) / h),
        (None, Some(b)) => Some((b - z) / h),
        (None, None) => None,
    }
}

/// Sample the surface of `grid` at `p`.
///
/// Returns `None` outside the grid or if the node closest to `p` is undefined.
pub(crate) fn sample_grid(
    grid: &Grid,
    p: Point2,
    method: ResampleMethod,
    faults: Option<&FaultSet>,
) -> Option<f64> {
    let geom = grid.geometry();
    if !geom.contains(p) {
        return None;
    }

    let (fc, fr) = geom.frac(p);
    let c0 = (fc.floor().max(0.0) as usize).min(geom.ncol() - 2);
    let r0 = (fr.floor().max(0.0) as usize).min(geom.nrow() - 2);
    let fx = (fc - c0 as f64).clamp(0.0, 1.0);
    let fy = (fr - r0 as f64).clamp(0.0, 1.0);

    let near_c = c0 + (fx >= 0.5) as usize;
    let near_r = r0 + (fy >= 0.5) as usize;
    let nearest = grid.z(near_c, near_r)?;

    let clear = |c: usize, r: usize| match faults {
        Some(f) => !f.blocks(p, geom.node_xy(c, r)),
        None => true,
    };

    match method {
        ResampleMethod::Step => Some(nearest),
        ResampleMethod::Bilinear => Some(bilinear(grid, (c0, r0), (fx, fy), &clear).unwrap_or(nearest)),
        ResampleMethod::Bicubic => bicubic(grid, (c0, r0), (fx, fy), &clear)
            .or_else(|| bilinear(grid, (c0, r0), (fx, fy), &clear))
            .or(Some(nearest)),
    }
}

/// Bilinear weights renormalised over the defined, unblocked cell corners.
fn bilinear<F>(grid: &Grid, (c0, r0): (usize, usize), (fx, fy): (f64, f64), clear: &F) -> Option<f64>
where
    F: Fn(usize, usize) -> bool,
{
    let corners = [
        (c0, r0, (1.0 - fx) * (1.0 - fy)),
        (c0 + 1, r0, fx * (1.0 - fy)),
        (c0, r0 + 1, (1.0 - fx) * fy),
        (c0 + 1, r0 + 1, fx * fy),
    ];
    let (mut sw, mut sz) = (0.0, 0.0);
    for (c, r, w) in corners {
        if w <= 0.0 {
            continue;
        }
        if let Some(z) = grid.z(c, r).filter(|_| clear(c, r)) {
            sw += w;
            sz += w * z;
        }
    }
    (sw > 1e-12).then(|| sz / sw)
}

/// Catmull-Rom interpolation over the surrounding 4x4 nodes, which must all be defined.
fn bicubic<F>(grid: &Grid, (c0, r0): (usize, usize), (fx, fy): (f64, f64), clear: &F) -> Option<f64>
where
    F: Fn(usize, usize) -> bool,
{
    let (c0, r0) = (c0 as isize, r0 as isize);
    let mut rows = [0f64; 4];
    for (j, row) in rows.iter_mut().enumerate() {
        let r = r0 - 1 + j as isize;
        let mut v = [0f64; 4];
        for (i, vi) in v.iter_mut().enumerate() {
            let c = c0 - 1 + i as isize;
            let z = grid.z_checked(c, r)?;
            if !clear(c as usize, r as usize) {
                return None;
            }
            *vi = z;
        }
        *row = catmull_rom(v, fx);
    }
    Some(catmull_rom(rows, fy))
}

fn catmull_rom([p0, p1, p2, p3]: [f64; 4], t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * (2.0 * p1
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_surface_is_reproduced() {
        let f = |x: f64, y: f64| 3.0 * x - 2.0 * y + 1.0;
        let g = fn_grid(11, 11, 10.0, 10.0, f);
        let geom = GridGeometry::new(23, 17, [0.5, 0.5], [9.5, 9.5]).unwrap();
        for m in [ResampleMethod::Bilinear, ResampleMethod::Bicubic] {
            let r = resample(&g, geom, m, &[]).unwrap();
            assert_eq!(r.len_nonempty(), r.len());
            for p in r.points() {
                let x = p.z - f(p.x(), p.y());
                assert!(x.abs() < 1e-9, "{:?} {:?}", m, p);
            }
        }
    }

    #[test]
    fn step_uses_nearest_node() {
        let g = dummy_grid();
        let zs = back_interpolate(
            &g,
            &[[1.0, 1.0], [14.0, 1.0], [1.0, 29.0], [8.0, 16.0]],
            &[],
            ResampleMethod::Step,
        )
        .unwrap();
        assert_eq!(zs, vec![Some(1.0), Some(2.0), Some(5.0), Some(4.0)]);
    }

    #[test]
    fn outside_and_null_neighbourhood() {
        let mut g = fn_grid(5, 5, 4.0, 4.0, |x, y| x + y);
        g.set(2, 2, None);
        let zs = back_interpolate(
            &g,
            &[[-1.0, 0.0], [2.1, 1.9], [0.5, 0.5], [4.0, 4.0]],
            &[],
            ResampleMethod::Bilinear,
        )
        .unwrap();
        assert_eq!(zs[0], None);
        assert_eq!(zs[1], None);
        assert!((zs[2].unwrap() - 1.0).abs() < 1e-12);
        assert!((zs[3].unwrap() - 8.0).abs() < 1e-12);

        assert!(back_interpolate(&g, &[], &[], ResampleMethod::Bilinear).is_err());
        assert_eq!(last_error_code(), 2);
    }

    #[test]
    fn fault_excludes_far_corners() {
        let g = fn_grid(3, 2, 2.0, 1.0, |x, _| if x < 1.5 { 0.0 } else { 100.0 });
        let fault = FaultLine::discontinuity([[1.5, -1.0, 0.0], [1.5, 2.0, 0.0]]).unwrap();
        let zs = back_interpolate(&g, &[[1.4, 0.5]], &[fault], ResampleMethod::Bilinear).unwrap();
        assert_eq!(zs[0], Some(0.0));
        let zs = back_interpolate(&g, &[[1.4, 0.5]], &[], ResampleMethod::Bilinear).unwrap();
        assert!((zs[0].unwrap() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn oversized_resample_with_faults() {
        let g = flat_grid(2, 2, 1.0);
        let fault = FaultLine::discontinuity([[0.5, 0.0, 0.0], [0.5, 1.0, 0.0]]).unwrap();
        let geom = GridGeometry::new(100, 100, [0.0, 0.0], [1.0, 1.0]).unwrap();
        assert!(resample(&g, geom, ResampleMethod::Bilinear, &[fault]).is_err());
        assert!(resample(&g, geom, ResampleMethod::Bilinear, &[]).is_ok());
    }

    #[test]
    fn gradients() {
        let g = fn_grid(5, 4, 8.0, 6.0, |x, y| 0.5 * x - 2.0 * y);
        let (slope, dir) = horizontal_gradient(&g).unwrap();
        assert_eq!(slope.len_nonempty(), 20);
        let want = (-2f64).atan2(0.5).to_degrees() + 360.0;
        for p in slope.points() {
            assert!((p.z - 4.25f64.sqrt()).abs() < 1e-9);
        }
        for p in dir.points() {
            assert!((p.z - want).abs() < 1e-9);
        }
    }
}
