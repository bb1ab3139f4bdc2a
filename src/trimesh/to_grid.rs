use super::*;
use rayon::prelude::*;

/// Buckets live triangles by the grid cells their bounding boxes overlap.
struct TriIndex<'a> {
    mesh: &'a TriMesh,
    origin: Point2,
    cell: f64,
    ncol: usize,
    nrow: usize,
    bins: Vec<Vec<usize>>,
}

impl<'a> TriIndex<'a> {
    fn new(mesh: &'a TriMesh) -> SurfaceResult<Self> {
        let ext = Extents2::from(mesh.bounding_box().ok_or(SurfaceError::Empty)?);
        let n = mesh.tri_count().max(1) as f64;
        let [w, h] = ext.size;
        // about 2 triangles per bin
        let cell = ((w * h * 2.0) / n).sqrt().max(w.max(h) / 1000.0).max(1e-12);
        let ncol = (w / cell) as usize + 1;
        let nrow = (h / cell) as usize + 1;
        let mut bins = alloc_vec(ncol * nrow, Vec::new())?;

        for t in mesh.live_tris() {
            let b = Extents2::from(mesh.tri_points(t).aabb());
            let (c0, r0) = Self::loc(ext.origin, cell, b.origin);
            let (c1, r1) = Self::loc(ext.origin, cell, b.max());
            for r in r0..=r1.min(nrow - 1) {
                for c in c0..=c1.min(ncol - 1) {
                    bins[r * ncol + c].push(t);
                }
            }
        }

        Ok(Self {
            mesh,
            origin: ext.origin,
            cell,
            ncol,
            nrow,
            bins,
        })
    }

    fn loc(origin: Point2, cell: f64, [x, y]: Point2) -> (usize, usize) {
        let c = ((x - origin[0]) / cell).floor().max(0.0) as usize;
        let r = ((y - origin[1]) / cell).floor().max(0.0) as usize;
        (c, r)
    }

    fn locate(&self, p: Point2) -> Option<usize> {
        let [x, y] = p;
        let (ox, oy) = (self.origin[0], self.origin[1]);
        let tol = self.cell * 1e-9;
        if x < ox - tol || y < oy - tol {
            return None;
        }
        let (c, r) = Self::loc(self.origin, self.cell, p);
        if c >= self.ncol || r >= self.nrow {
            return None;
        }
        self.bins[r * self.ncol + c]
            .iter()
            .copied()
            .find(|&t| self.mesh.tri_contains(t, p))
    }

    fn z_at(&self, p: Point2) -> Option<f64> {
        let t = self.locate(p)?;
        let z = self.mesh.tri_z(t, p);
        (!is_null(z)).then(|| z)
    }
}

impl TriMesh {
    /// Evaluate the mesh surface at each plan location, `None` where no triangle covers it.
    pub fn back_interpolate(&self, points: &[Point2]) -> SurfaceResult<Vec<Option<f64>>> {
        record(self.back_interpolate_inner(points))
    }

    fn back_interpolate_inner(&self, points: &[Point2]) -> SurfaceResult<Vec<Option<f64>>> {
        if self.is_empty() || points.is_empty() {
            return Err(SurfaceError::Empty);
        }
        let index = TriIndex::new(self)?;
        Ok(points.par_iter().map(|&p| index.z_at(p)).collect())
    }
}

/// Sample a mesh onto a grid.
///
/// A grid node that coincides with a mesh node takes that node's elevation exactly; other grid
/// nodes are interpolated on the triangle covering them. Grid nodes off the mesh are undefined.
pub fn grid_from_trimesh_nodes(mesh: &TriMesh, geom: GridGeometry) -> SurfaceResult<Grid> {
    record(grid_from_trimesh_inner(mesh, geom))
}

fn grid_from_trimesh_inner(mesh: &TriMesh, geom: GridGeometry) -> SurfaceResult<Grid> {
    if mesh.is_empty() {
        return Err(SurfaceError::Empty);
    }
    let index = TriIndex::new(mesh)?;
    let mut grid = Grid::try_blank(geom)?;
    let ncol = geom.ncol();

    grid.zs_mut().par_iter_mut().enumerate().for_each(|(i, z)| {
        *z = index.z_at(geom.node_xy(i % ncol, i / ncol));
    });

    // exact node hits override the interpolation
    let tol = geom.xspace().min(geom.yspace()) * 1e-9;
    for n in mesh.nodes().iter().filter(|n| !n.is_deleted() && !is_null(n.z)) {
        if !geom.contains(n.p2()) {
            continue;
        }
        let (fc, fr) = geom.frac(n.p2());
        let (c, r) = (fc.round().max(0.0) as usize, fr.round().max(0.0) as usize);
        if c >= ncol || r >= geom.nrow() {
            continue;
        }
        if dist_xy(geom.node_xy(c, r), n.p2()) <= tol {
            grid.set(c, r, n.z);
        }
    }

    grid.dump("grid_from_trimesh");
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_round_trip() {
        let g = fn_grid(7, 5, 6.3, 4.1, |x, y| (x * 1.3).sin() + y * y * 0.7);
        let t = TriMesh::from_grid(&g, TriMeshStyle::Equilateral).unwrap();
        let g2 = grid_from_trimesh_nodes(&t, *g.geometry()).unwrap();
        assert_eq!(g2, g);
    }

    #[test]
    fn interpolates_between_nodes() {
        let g = fn_grid(3, 3, 2.0, 2.0, |x, y| x + 2.0 * y);
        let t = TriMesh::from_grid(&g, TriMeshStyle::CellDiagonals).unwrap();
        let fine = GridGeometry::new(5, 5, [0.0, 0.0], [2.0, 2.0]).unwrap();
        let g2 = grid_from_trimesh_nodes(&t, fine).unwrap();
        assert_eq!(g2.len_nonempty(), 25);
        for p in g2.points() {
            let x = p.z - (p.x() + 2.0 * p.y());
            assert!(x.abs() < 1e-9);
        }

        let big = GridGeometry::new(3, 3, [-2.0, -2.0], [4.0, 4.0]).unwrap();
        let g3 = grid_from_trimesh_nodes(&t, big).unwrap();
        assert_eq!(g3.len_nonempty(), 1);
        assert!((g3.z(1, 1).unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn back_interpolation() {
        let mut g = fn_grid(3, 3, 2.0, 2.0, |x, y| x - y);
        g.set(2, 2, None);
        let t = TriMesh::from_grid(&g, TriMeshStyle::CellDiagonals).unwrap();
        let zs = t
            .back_interpolate(&[[0.5, 0.5], [1.9, 1.9], [3.0, 0.0], [2.0, 0.0]])
            .unwrap();
        assert!(zs[0].unwrap().abs() < 1e-12);
        assert_eq!(zs[1], None);
        assert_eq!(zs[2], None);
        assert!((zs[3].unwrap() - 2.0).abs() < 1e-12);

        assert!(TriMesh::default().back_interpolate(&[[0.0, 0.0]]).is_err());
    }
}
