use crate::*;
use rayon::prelude::*;

const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Replace undefined nodes by expanding the defined values outward.
///
/// Each pass fills the undefined nodes that touch a defined node. A filled value blends the
/// gradient extrapolated from each neighbour (when `opts.extrapolate_trend` is set) with the
/// inverse distance average of the neighbours. Values never flow across a discontinuity in
/// `faults`; nodes that can only be reached across a fault are filled last, ignoring faults.
///
/// Returns the number of nodes filled.
pub fn fill_nulls(
    grid: &mut Grid,
    faults: &[FaultLine],
    opts: &GridOptions,
) -> SurfaceResult<usize> {
    let r = validate_faults(faults)
        .and_then(|_| fill_with(grid, &FaultSet::new(faults), opts.extrapolate_trend));
    record(r)
}

pub(crate) fn fill_with(grid: &mut Grid, faults: &FaultSet, extrapolate: bool) -> SurfaceResult<usize> {
    if grid.is_blank() {
        return Err(SurfaceError::Empty);
    }

    let mut nulls: Vec<usize> = (0..grid.len())
        .filter(|&i| grid.zs()[i].is_none())
        .collect();
    let total = nulls.len();
    let mut honour_faults = !faults.is_empty();
    // every pass fills at least one node, but cap it anyway
    let max_passes = 2 * (grid.x_count() + grid.y_count());

    for _ in 0..max_passes {
        if nulls.is_empty() {
            break;
        }
        let fset = honour_faults.then(|| faults);
        let updates: Vec<(usize, f64)> = nulls
            .par_iter()
            .filter_map(|&i| estimate(grid, i, fset, extrapolate).map(|z| (i, z)))
            .collect();

        if updates.is_empty() {
            if honour_faults {
                log::debug!(
                    "{} nodes are unreachable without crossing a fault, filling across faults",
                    nulls.len()
                );
                honour_faults = false;
                continue;
            }
            break;
        }

        for (i, z) in updates {
            grid.set_idx(i, z);
        }
        nulls.retain(|&i| grid.zs()[i].is_none());
    }

    if !nulls.is_empty() {
        log::warn!("{} nodes could not be filled", nulls.len());
    }

    Ok(total - nulls.len())
}

fn estimate(grid: &Grid, i: usize, faults: Option<&FaultSet>, extrapolate: bool) -> Option<f64> {
    let geom = grid.geometry();
    let ncol = geom.ncol();
    let (c, r) = ((i % ncol) as isize, (i / ncol) as isize);
    let p = geom.node_xy(c as usize, r as usize);
    let (xs, ys) = (geom.xspace(), geom.yspace());

    let clear = |cc: isize, rr: isize| match faults {
        Some(f) => !f.blocks(p, geom.node_xy(cc as usize, rr as usize)),
        None => true,
    };

    let (mut sw, mut sz, mut se) = (0.0, 0.0, 0.0);
    for (dc, dr) in NEIGHBOURS {
        let (c1, r1) = (c + dc, r + dr);
        let z1 = match grid.z_checked(c1, r1) {
            Some(z) if clear(c1, r1) => z,
            _ => continue,
        };
        let d = (dc as f64 * xs).hypot(dr as f64 * ys);
        let w = (d * d).recip();

        let (c2, r2) = (c + 2 * dc, r + 2 * dr);
        let e = match grid.z_checked(c2, r2) {
            Some(z2) if clear(c2, r2) => 2.0 * z1 - z2,
            _ => z1,
        };

        sw += w;
        sz += w * z1;
        se += w * e;
    }

    if sw == 0.0 {
        return None;
    }

    let avg = sz / sw;
    if extrapolate {
        Some(0.5 * (se / sw) + 0.5 * avg)
    } else {
        Some(avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_interior_of_linear_surface() {
        let mut g = fn_grid(7, 7, 6.0, 6.0, |x, y| 2.0 * x - y + 3.0);
        g.set(3, 3, None);
        let n = fill_nulls(&mut g, &[], &GridOptions::default()).unwrap();
        assert_eq!(n, 1);
        assert_eq!(g.len_nonempty(), 49);

        let x = g.z(3, 3).unwrap() - (2.0 * 3.0 - 3.0 + 3.0);
        assert!(x.abs() < 1e-9);
    }

    #[test]
    fn extrapolates_linear_trend_to_edge() {
        let mut g = fn_grid(6, 4, 5.0, 3.0, |x, _| x * 10.0);
        for r in 0..4 {
            g.set(5, r, None);
        }
        let opts = GridOptions::default();
        fill_nulls(&mut g, &[], &opts).unwrap();
        // the gradient half of the blend continues the slope, the average half flattens it
        for r in 0..4 {
            let z = g.z(5, r).unwrap();
            assert!(z > 40.0 && z <= 50.0 + 1e-9, "{}", z);
        }

        let mut g2 = fn_grid(6, 4, 5.0, 3.0, |x, _| x * 10.0);
        for r in 0..4 {
            g2.set(5, r, None);
        }
        fill_nulls(&mut g2, &[], &opts.with_extrapolate_trend(false)).unwrap();
        assert!(g2.z(5, 1).unwrap() < g.z(5, 1).unwrap());
    }

    #[test]
    fn fill_does_not_cross_fault() {
        let mut g = fn_grid(6, 3, 5.0, 2.0, |x, _| if x < 2.5 { 0.0 } else { 100.0 });
        for r in 0..3 {
            g.set(3, r, None);
        }
        let fault = FaultLine::discontinuity([[2.5, -1.0, 0.0], [2.5, 3.0, 0.0]]).unwrap();
        fill_nulls(&mut g, &[fault], &GridOptions::default()).unwrap();
        for r in 0..3 {
            let x = g.z(3, r).unwrap() - 100.0;
            assert!(x.abs() < 1e-9);
        }
    }

    #[test]
    fn isolated_region_filled_across_fault() {
        let mut g = fn_grid(6, 3, 5.0, 2.0, |_, _| 7.0);
        for r in 0..3 {
            for c in 3..6 {
                g.set(c, r, None);
            }
        }
        let fault = FaultLine::discontinuity([[2.5, -1.0, 0.0], [2.5, 3.0, 0.0]]).unwrap();
        let n = fill_nulls(&mut g, &[fault], &GridOptions::default()).unwrap();
        assert_eq!(n, 9);
        assert!((g.z(5, 2).unwrap() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn blank_grid_is_an_error() {
        let geom = GridGeometry::new(3, 3, [0.0, 0.0], [1.0, 1.0]).unwrap();
        let mut g = Grid::blank(geom);
        assert!(fill_nulls(&mut g, &[], &GridOptions::default()).is_err());
        assert_eq!(last_error_code(), 2);
    }
}
