use crate::*;
use rayon::prelude::*;

/// Find single node outliers and replace them with the value predicted by their neighbours.
///
/// Each defined node is compared to a plane fitted through its defined neighbours (ignoring
/// neighbours across a discontinuity). A node deviating from the plane by more than a multiple
/// of the neighbours' own scatter about the plane is a spike. `severity` 1 uses a multiple of 3,
/// `severity` 2 a multiple of 2 and so catches smaller spikes.
///
/// Returns the number of nodes replaced.
pub fn filter_spikes(grid: &mut Grid, faults: &[FaultLine], severity: u8) -> SurfaceResult<usize> {
    record(filter_spikes_inner(grid, faults, severity))
}

fn filter_spikes_inner(grid: &mut Grid, faults: &[FaultLine], severity: u8) -> SurfaceResult<usize> {
    let k = match severity {
        1 => 3.0,
        2 => 2.0,
        _ => return Err(SurfaceError::InvalidOption("spike severity must be 1 or 2")),
    };
    validate_faults(faults)?;
    let (lo, hi) = grid.z_range().ok_or(SurfaceError::Empty)?;
    let tiny = (hi - lo) * 1e-6;
    let fset = FaultSet::new(faults);

    let g = &*grid;
    let updates: Vec<(usize, f64)> = (0..g.len())
        .into_par_iter()
        .filter_map(|i| {
            let z = g.zs()[i]?;
            let pred = predict(g, i, &fset)?;
            ((z - pred.z).abs() > k * pred.scatter + tiny).then(|| (i, pred.z))
        })
        .collect();

    for &(i, z) in &updates {
        grid.set_idx(i, z);
    }
    if !updates.is_empty() {
        log::debug!("replaced {} grid spikes", updates.len());
    }
    Ok(updates.len())
}

struct Prediction {
    z: f64,
    /// RMS deviation of the neighbours from the fitted plane.
    scatter: f64,
}

fn predict(grid: &Grid, i: usize, faults: &FaultSet) -> Option<Prediction> {
    let geom = grid.geometry();
    let ncol = geom.ncol();
    let (c, r) = ((i % ncol) as isize, (i / ncol) as isize);
    let p = geom.node_xy(c as usize, r as usize);

    let mut near = Vec::with_capacity(8);
    for dr in -1..=1 {
        for dc in -1..=1 {
            if dr == 0 && dc == 0 {
                continue;
            }
            let (cc, rr) = (c + dc, r + dr);
            if let Some(z) = grid.z_checked(cc, rr) {
                let q = geom.node_xy(cc as usize, rr as usize);
                if !faults.blocks(p, q) {
                    near.push([q[0] - p[0], q[1] - p[1], z]);
                }
            }
        }
    }
    if near.len() < 4 {
        return None;
    }

    let [a, b, c] = fit_z(&near)?;
    let ss = near
        .iter()
        .map(|&[x, y, z]| (z - (a + b * x + c * y)).powi(2))
        .sum::<f64>();
    Some(Prediction {
        z: a,
        scatter: (ss / near.len() as f64).sqrt(),
    })
}

/// Smooth a grid.
///
/// `strength` runs from 1 (lightest) to 9 (heaviest): higher strengths average over a wider
/// neighbourhood and repeat the averaging. A negative strength returns the residual (the
/// original minus the smoothed surface) instead. The smoothed values are clamped to `min` and
/// `max` when given. Averaging does not cross a discontinuity and undefined nodes stay undefined.
pub fn smooth(
    grid: &Grid,
    faults: &[FaultLine],
    strength: i32,
    min: Option<f64>,
    max: Option<f64>,
) -> SurfaceResult<Grid> {
    record(smooth_inner(grid, faults, strength, min, max))
}

fn smooth_inner(
    grid: &Grid,
    faults: &[FaultLine],
    strength: i32,
    min: Option<f64>,
    max: Option<f64>,
) -> SurfaceResult<Grid> {
    if strength == 0 || strength.abs() > 9 {
        return Err(SurfaceError::InvalidOption("smoothing strength must be 1 to 9"));
    }
    if grid.is_blank() {
        return Err(SurfaceError::Empty);
    }
    validate_faults(faults)?;
    let fset = FaultSet::new(faults);

    let s = strength.unsigned_abs() as isize;
    let radius = 1 + (s - 1) / 3;
    let passes = 1 + (s - 1) % 3;

    let mut smoothed = grid.clone();
    for _ in 0..passes {
        let src = &smoothed;
        let zs: Vec<Option<f64>> = (0..src.len())
            .into_par_iter()
            .map(|i| src.zs()[i].map(|_| average(src, i, radius, &fset)))
            .collect();
        let mut next = Grid::blank(*grid.geometry());
        for (i, z) in zs.into_iter().enumerate() {
            next.set_idx(i, z);
        }
        smoothed = next;
    }

    for z in smoothed.zs_mut().iter_mut().flatten() {
        if let Some(lo) = min {
            *z = z.max(lo);
        }
        if let Some(hi) = max {
            *z = z.min(hi);
        }
    }

    if strength < 0 {
        for (s, o) in smoothed.zs_mut().iter_mut().zip(grid.zs()) {
            if let (Some(s), Some(o)) = (s.as_mut(), o) {
                *s = o - *s;
            }
        }
    }

    smoothed.dump("smooth");
    Ok(smoothed)
}

fn average(grid: &Grid, i: usize, radius: isize, faults: &FaultSet) -> f64 {
    let geom = grid.geometry();
    let ncol = geom.ncol();
    let (c, r) = ((i % ncol) as isize, (i / ncol) as isize);
    let p = geom.node_xy(c as usize, r as usize);

    let (mut sw, mut sz) = (0.0, 0.0);
    for dr in -radius..=radius {
        for dc in -radius..=radius {
            let (cc, rr) = (c + dc, r + dr);
            let z = match grid.z_checked(cc, rr) {
                Some(z) => z,
                None => continue,
            };
            if (dr, dc) != (0, 0) && faults.blocks(p, geom.node_xy(cc as usize, rr as usize)) {
                continue;
            }
            let w = (1.0 + (dc * dc + dr * dr) as f64).recip();
            sw += w;
            sz += w * z;
        }
    }
    sz / sw
}

/// Undefine every node that `mask` flags as outside or poorly determined.
///
/// Returns the number of nodes undefined.
pub fn set_hard_nulls(grid: &mut Grid, mask: &MaskGrid) -> SurfaceResult<usize> {
    let g = grid.geometry();
    let m = mask.geometry();
    if (g.ncol(), g.nrow()) != (m.ncol(), m.nrow()) {
        return record(Err(SurfaceError::InvalidOption(
            "mask dimensions do not match grid",
        )));
    }
    let mut n = 0;
    for (z, m) in grid.zs_mut().iter_mut().zip(mask.zs()) {
        if matches!(m, Some(NodeMask::Outside | NodeMask::Poor)) && z.is_some() {
            *z = None;
            n += 1;
        }
    }
    record(Ok(n))
}
