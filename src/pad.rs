//! Extending detailed surfaces out to larger extents.
//!
//! A padded surface is a coarse grid laid over the wider area, calculated with the detailed
//! surface as control, and converted back into a mesh. Fault surfaces are usually steep, so
//! they can be gridded in the frame of a [`SurfaceGroupPlane`] where they are close to flat.
use crate::*;

/// Caps the gridding search radius at this multiple of the average data spacing, through
/// [`GridOptions::with_size_multiplier`]. The grid resolution is set separately.
const SIZE_MULTIPLIER: f64 = 4.0;

/// The result of padding: the coarse grid and the mesh built from it.
///
/// When a [`SurfaceGroupPlane`] is set the grid is in the plane frame, while the mesh nodes
/// are always in model coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct PaddedSurface {
    pub grid: Grid,
    pub mesh: TriMesh,
}

/// Node lists that steer which way a fault surface is extended.
///
/// `low` and `high` hold indices into the mesh nodes (or points). The footprint is extended
/// towards whichever `y` edge (in the working frame) the majority of each list lies closest
/// to. The extension beyond the unpadded footprint is capped at `low_pct` percent of its
/// height below, and `high_pct` percent above.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extension {
    pub low: Vec<usize>,
    pub high: Vec<usize>,
    pub low_pct: f64,
    pub high_pct: f64,
}

/// Pads surfaces, sharing a plane frame and shape grid between related surfaces.
///
/// ```rust
/// # use geosurf::*;
/// let pts = (0..25)
///     .map(|i| {
///         let (x, y) = ((i % 5) as f64 * 10.0, (i / 5) as f64 * 10.0);
///         [x, y, 0.1 * x + 0.2 * y]
///     })
///     .collect::<Vec<_>>();
/// let padded = PadSurface::new().pad_fault_points(&pts, &[], 10.0).unwrap();
/// assert_eq!(padded.grid.geometry().min(), [-20.0, -20.0]);
/// assert!(padded.mesh.check_topology().is_ok());
/// ```
#[derive(Clone, Debug, Default)]
pub struct PadSurface<'a> {
    plane: Option<&'a SurfaceGroupPlane>,
    detachment: Option<Vec<Point3>>,
    shape: Option<&'a Grid>,
    sim_padding: bool,
}

impl<'a> PadSurface<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grid in the frame of `plane`. The plane must be fitted before padding.
    pub fn set_surface_group_plane(&mut self, plane: &'a SurfaceGroupPlane) -> &mut Self {
        self.plane = Some(plane);
        self
    }

    /// A detachment contact line, limiting the fault padding in `x` to its end points and in
    /// depth to just below its deepest point.
    pub fn set_detachment_contact(&mut self, line: &[Point3]) -> SurfaceResult<&mut Self> {
        if line.len() < 2 || line.iter().any(|p| p.iter().any(|c| !c.is_finite())) {
            return record(Err(SurfaceError::InvalidLine));
        }
        self.detachment = Some(line.to_vec());
        Ok(self)
    }

    /// A grid whose footprint is reused, and whose shape subsequent surfaces conform to.
    ///
    /// The grid must be in the frame of the surface group plane in use.
    pub fn set_shape_grid(&mut self, grid: &'a Grid) -> &mut Self {
        self.shape = Some(grid);
        self
    }

    /// When unset (the default) wide footprints get more rows, giving steep faults more
    /// resolution down dip.
    pub fn set_sim_padding(&mut self, on: bool) -> &mut Self {
        self.sim_padding = on;
        self
    }

    /// Pad a surface over the plan area of `target`, at roughly `spacing` between nodes.
    ///
    /// The surface is regridded in model coordinates with the mesh nodes as data. No plane
    /// transform or filtering is applied.
    pub fn pad_surface(
        &self,
        mesh: &TriMesh,
        target: Extents3,
        spacing: f64,
    ) -> SurfaceResult<PaddedSurface> {
        record(self.pad_surface_inner(mesh, target, spacing))
    }

    fn pad_surface_inner(
        &self,
        mesh: &TriMesh,
        target: Extents3,
        spacing: f64,
    ) -> SurfaceResult<PaddedSurface> {
        if !(spacing > 0.0 && spacing.is_finite()) {
            return Err(SurfaceError::InvalidOption("padding spacing must be positive"));
        }
        let mut pts = live_points(mesh.nodes().iter().map(|n| (n.is_deleted(), n.p3())));
        if pts.is_empty() {
            return Err(SurfaceError::Empty);
        }
        let ext = Extents2::from(target);
        if !(ext.size[0] > 0.0 && ext.size[1] > 0.0) {
            return Err(SurfaceError::InvalidExtents);
        }
        dump_points("pad input", &pts);

        let [w, h] = ext.size;
        let ncol = ((w / spacing) as usize).max(2);
        let nrow = ((h / spacing) as usize).max(2);
        let geom = GridGeometry::from_extents(ncol, nrow, ext)?;
        let opts = GridOptions::default().with_size_multiplier(SIZE_MULTIPLIER);

        let grid = self.grid_points(&mut pts, geom, &opts)?;
        let mesh = TriMesh::from_grid(&grid, TriMeshStyle::Equilateral)?;
        log::debug!(
            "padded {} points to a {}x{} grid",
            pts.len(),
            geom.ncol(),
            geom.nrow()
        );
        mesh.dump("pad");
        Ok(PaddedSurface { grid, mesh })
    }

    /// Pad a fault surface out to include the `target` box.
    ///
    /// The mesh nodes and the box corners are moved into the surface group plane frame, when
    /// one is set. Without a shape grid the footprint covers both, plus a margin of a
    /// twentieth each side. A detachment contact overrides the `x` limits. `extension`, when
    /// given, replaces the margin with a one sided extension toward the listed nodes.
    pub fn pad_fault_surface(
        &self,
        mesh: &TriMesh,
        target: Extents3,
        spacing: f64,
        extension: Option<&Extension>,
    ) -> SurfaceResult<PaddedSurface> {
        record(self.pad_fault_surface_inner(mesh, target, spacing, extension))
    }

    fn pad_fault_surface_inner(
        &self,
        mesh: &TriMesh,
        target: Extents3,
        spacing: f64,
        extension: Option<&Extension>,
    ) -> SurfaceResult<PaddedSurface> {
        let mut nodes = mesh.nodes().iter().map(Node::p3).collect::<Vec<_>>();
        if mesh.is_empty() {
            return Err(SurfaceError::Empty);
        }
        dump_points("pad fault input", &nodes);

        // the detachment pulls the bottom of the box to just under its deepest point
        let [_, _, zmin] = target.origin;
        let [_, _, zmax] = target.max();
        let zmin = match &self.detachment {
            Some(d) => {
                let lo = d.iter().map(|p| p[2]).fold(f64::INFINITY, f64::min);
                lo - (zmax - zmin) / 1000.0
            }
            None => zmin,
        };
        let mut corners = Extents3::from_min_max(
            target.origin.to_p2().with_z(zmin),
            target.max().to_p2().with_z(zmax),
        )
        .corners();
        let mut det = self
            .detachment
            .as_ref()
            .and_then(|d| Some([*d.first()?, *d.last()?]));

        if let Some(sgp) = self.plane {
            sgp.convert_to_plane(&mut nodes)?;
            sgp.convert_to_plane(&mut corners)?;
            if let Some(d) = det.as_mut() {
                sgp.convert_to_plane(d)?;
            }
            dump_points("pad fault plane frame", &nodes);
        }

        let lists = extension.filter(|e| !e.low.is_empty() || !e.high.is_empty());
        let mut ext = match self.shape {
            Some(shape) => shape.extents(),
            None => {
                let live = nodes
                    .iter()
                    .zip(mesh.nodes())
                    .filter(|(_, n)| !n.is_deleted())
                    .map(|(p, _)| p.to_p2());
                let ext = live
                    .chain(corners.iter().map(ToPoint2::to_p2))
                    .collect::<Extents2>();
                if lists.is_some() {
                    ext
                } else {
                    margin(ext, 20.0)
                }
            }
        };

        if let Some([a, b]) = det {
            let (x0, x1) = if a[0] < b[0] { (a[0], b[0]) } else { (b[0], a[0]) };
            ext.origin[0] = x0;
            ext.size[0] = x1 - x0;
        }

        if let Some(e) = lists {
            ext = extend(&nodes, ext, e)?;
        }

        let pts = live_points(
            mesh.nodes()
                .iter()
                .zip(&nodes)
                .map(|(n, p)| (n.is_deleted(), *p)),
        );
        self.pad_fault(pts, ext, spacing, 100)
    }

    /// Pad a fault surface given as scattered points.
    ///
    /// Without a shape grid the footprint is the points' extents plus half their size each
    /// side. When `low` lists point indices, there is no margin and the footprint is extended
    /// one way only, toward the listed points. A `spacing` of zero or less uses a hundredth of
    /// the footprint's width plus height.
    pub fn pad_fault_points(
        &self,
        points: &[Point3],
        low: &[usize],
        spacing: f64,
    ) -> SurfaceResult<PaddedSurface> {
        record(self.pad_fault_points_inner(points, low, spacing))
    }

    fn pad_fault_points_inner(
        &self,
        points: &[Point3],
        low: &[usize],
        spacing: f64,
    ) -> SurfaceResult<PaddedSurface> {
        if points.is_empty() {
            return Err(SurfaceError::Empty);
        }
        let mut pts = points.to_vec();
        dump_points("pad fault input", &pts);
        if let Some(sgp) = self.plane {
            sgp.convert_to_plane(&mut pts)?;
            dump_points("pad fault plane frame", &pts);
        }

        let mut ext = match self.shape {
            Some(shape) => shape.extents(),
            None => {
                let ext = pts.iter().map(ToPoint2::to_p2).collect::<Extents2>();
                if low.is_empty() {
                    margin(ext, 2.0)
                } else {
                    ext
                }
            }
        };
        if !low.is_empty() {
            let ys = list_ys(&pts, low)?;
            extend_toward(&ys, &mut ext);
        }

        let spacing = if spacing > 0.0 {
            spacing
        } else {
            (ext.size[0] + ext.size[1]) / 100.0
        };
        let pts = pts.into_iter().filter(|p| !is_null(p[2])).collect();
        self.pad_fault(pts, ext, spacing, 200)
    }

    /// Grid, filter, and mesh a fault in the working frame over `ext`.
    fn pad_fault(
        &self,
        mut pts: Vec<Point3>,
        ext: Extents2,
        spacing: f64,
        smooth_above: usize,
    ) -> SurfaceResult<PaddedSurface> {
        if !(spacing > 0.0 && spacing.is_finite()) {
            return Err(SurfaceError::InvalidOption("padding spacing must be positive"));
        }
        if !(ext.size[0] > 0.0 && ext.size[1] > 0.0) {
            return Err(SurfaceError::InvalidExtents);
        }

        let [w, h] = ext.size;
        let ncol = ((w / spacing) as usize).max(2);
        let mut nrow = ((h / spacing) as usize).max(2);
        if !self.sim_padding && w > 2.0 * h {
            nrow = ((nrow as f64 * (2.0 * w / h).sqrt()) as usize).max(2);
        }
        let geom = GridGeometry::from_extents(ncol, nrow, ext)?;

        // without a fitted plane the trend is not carried far from the data
        let opts = GridOptions::default()
            .with_size_multiplier(SIZE_MULTIPLIER)
            .with_anisotropy(true)
            .with_extrapolate_trend(self.plane.map_or(false, SurfaceGroupPlane::is_fitted));

        let n = pts.len();
        let mut grid = self.grid_points(&mut pts, geom, &opts)?;
        let severity = if n > 500 { 2 } else { 1 };
        let spikes = filter_spikes(&mut grid, &[], severity)?;
        if n > smooth_above {
            grid = smooth(&grid, &[], 1, None, None)?;
        }
        log::debug!(
            "padded fault of {} points to a {}x{} grid, {} spikes removed",
            n,
            ncol,
            nrow,
            spikes
        );
        grid.dump("pad fault");

        let mut mesh = TriMesh::from_grid(&grid, TriMeshStyle::Equilateral)?;
        mesh.dump("pad fault plane frame");
        if let Some(sgp) = self.plane {
            sgp.convert_trimesh_from_plane(&mut mesh)?;
        }
        mesh.dump("pad fault");
        Ok(PaddedSurface { grid, mesh })
    }

    fn grid_points(
        &self,
        pts: &mut [Point3],
        geom: GridGeometry,
        opts: &GridOptions,
    ) -> SurfaceResult<Grid> {
        match self.shape {
            Some(shape) => calc_conformable_grid(pts, &[], geom, shape, opts),
            None => calc_grid_double(pts, &[], geom, opts),
        }
    }
}

fn live_points<I: Iterator<Item = (bool, Point3)>>(nodes: I) -> Vec<Point3> {
    nodes
        .filter(|(deleted, p)| !deleted && !is_null(p[2]))
        .map(|(_, p)| p)
        .collect()
}

/// Grow each side by `1/div` of the size.
fn margin(mut ext: Extents2, div: f64) -> Extents2 {
    let d = ext.size.scale(1.0 / div);
    ext.origin = ext.origin.sub(d);
    ext.size = ext.size.add(d.scale(2.0));
    ext
}

fn list_ys(pts: &[Point3], list: &[usize]) -> SurfaceResult<Vec<f64>> {
    list.iter()
        .map(|&i| pts.get(i).map(|p| p[1]))
        .collect::<Option<Vec<_>>>()
        .ok_or(SurfaceError::InvalidOption("extension list index out of range"))
}

/// Extend the footprint by its height toward the `y` edge most of `ys` are nearer.
///
/// Short, wide footprints extend further, by the square root of the aspect.
fn extend_toward(ys: &[f64], ext: &mut Extents2) {
    let (ymin, ymax) = (ext.origin[1], ext.max()[1]);
    let (mut top, mut bottom) = (0, 0);
    for &y in ys {
        let (d1, d2) = ((ymax - y).abs(), (ymin - y).abs());
        if d1 < d2 {
            top += 1;
        } else if d2 < d1 {
            bottom += 1;
        }
    }

    let [w, mut dy] = ext.size;
    if dy < w {
        dy *= (w / dy).sqrt();
    }
    if top > bottom {
        ext.size[1] += dy;
    } else if bottom > top {
        ext.origin[1] -= dy;
        ext.size[1] += dy;
    }
}

fn extend(nodes: &[Point3], ext: Extents2, e: &Extension) -> SurfaceResult<Extents2> {
    let (y0, y1) = (ext.origin[1], ext.max()[1]);
    let h = y1 - y0;
    let mut out = ext;
    if !e.low.is_empty() {
        extend_toward(&list_ys(nodes, &e.low)?, &mut out);
    }
    if !e.high.is_empty() {
        extend_toward(&list_ys(nodes, &e.high)?, &mut out);
    }

    let lo = out.origin[1].max(y0 - h * e.low_pct / 100.0);
    let hi = out.max()[1].min(y1 + h * e.high_pct / 100.0);
    out.origin[1] = lo;
    out.size[1] = hi - lo;
    Ok(out)
}
