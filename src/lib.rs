//! Earth-surface geometry.
//!
//! Scattered points and contour lines are gridded with fault lines acting as interpolation
//! barriers, grids are converted into topologically checked triangle meshes (and back again),
//! constraint lines are inserted into meshes, and detailed surfaces can be padded out to larger
//! extents.
use rustc_hash::FxHashMap as HashMap;
use rustc_hash::FxHashSet as HashSet;
use std::{
    cmp, fmt,
    iter::FromIterator,
    sync::atomic::{AtomicBool, Ordering},
};

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

mod calc;
mod ctog;
mod error;
mod extents;
mod fault;
mod fill;
mod filter;
mod grid;
#[cfg(feature = "io")]
pub mod io;
mod line;
mod options;
mod pad;
mod plane;
mod point;
mod polygon;
mod resample;
mod sgp;
mod shift;
mod trimesh;

pub use calc::*;
pub use ctog::*;
pub use error::*;
pub use extents::*;
pub use fault::*;
pub use fill::*;
pub use filter::*;
pub use grid::*;
pub use line::*;
pub use options::*;
pub use pad::*;
pub use plane::*;
pub use point::*;
pub use polygon::*;
pub use resample::*;
pub use sgp::*;
pub use shift::*;
pub use trimesh::*;

/// The value written for an undefined elevation.
pub const NULL_VALUE: f64 = 1e30;

/// Any elevation at or beyond this magnitude is undefined.
pub const NULL_THRESHOLD: f64 = 1e20;

/// Returns if `z` is an undefined elevation (non-finite, or beyond [`NULL_THRESHOLD`]).
pub fn is_null(z: f64) -> bool {
    !z.is_finite() || z.abs() >= NULL_THRESHOLD
}

static DEBUG_DUMP: AtomicBool = AtomicBool::new(false);

/// Turn the diagnostic snapshot output on or off.
///
/// When on, gridding and padding write their intermediate points, grids, and meshes to the
/// `geosurf::dump` log target at debug level. Results are never affected.
pub fn set_debug_dump(on: bool) {
    DEBUG_DUMP.store(on, Ordering::Relaxed);
}

/// Returns if diagnostic snapshots are enabled.
pub fn debug_dump_enabled() -> bool {
    DEBUG_DUMP.load(Ordering::Relaxed)
}

pub trait Envelops<O> {
    fn envelops(&self, object: O) -> bool;
}

/// Area can be calculated from an object.
///
/// Note that area is contextual from the object.
/// For instance, a [`Polygon2`] would be the _plan_ area, a [`TriMesh`] would be the _surface
/// area_, etc.
/// If implementing this trait be sure to be **explicit** about the area being calculated.
pub trait Area {
    /// Calculate the area of an object.
    fn area(&self) -> f64;
}

/// A 2x3 grid over `(0,0)-(15,30)` with values 1..=6, row first.
#[cfg(test)]
fn dummy_grid() -> Grid {
    let geom = GridGeometry::new(2, 3, [0.0, 0.0], [15.0, 30.0]).unwrap();
    let mut g = Grid::blank(geom);
    (0..3)
        .flat_map(|y| (0..2).map(move |x| (x, y)))
        .zip(1..7)
        .for_each(|((x, y), z)| g.set(x, y, z as f64));
    g
}

/// A flat, fully populated grid.
#[cfg(test)]
fn flat_grid(ncol: usize, nrow: usize, z: f64) -> Grid {
    let geom = GridGeometry::new(ncol, nrow, [0.0, 0.0], [(ncol - 1) as f64, (nrow - 1) as f64])
        .unwrap();
    let mut g = Grid::blank(geom);
    for y in 0..nrow {
        for x in 0..ncol {
            g.set(x, y, z);
        }
    }
    g
}

/// A grid sampled from `f(x, y)` over `(0,0)-(w,h)`.
#[cfg(test)]
fn fn_grid<F: Fn(f64, f64) -> f64>(ncol: usize, nrow: usize, w: f64, h: f64, f: F) -> Grid {
    let geom = GridGeometry::new(ncol, nrow, [0.0, 0.0], [w, h]).unwrap();
    let mut g = Grid::blank(geom);
    for y in 0..nrow {
        for x in 0..ncol {
            let [px, py] = geom.node_xy(x, y);
            g.set(x, y, f(px, py));
        }
    }
    g
}
