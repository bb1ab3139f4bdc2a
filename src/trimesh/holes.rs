use super::*;

/// Element counts removed by [`TriMesh::calc_holes`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct HoleStats {
    pub nodes: usize,
    pub edges: usize,
    pub triangles: usize,
}

impl TriMesh {
    /// Cut holes where the mesh has unreliable elevations.
    ///
    /// Every edge touching a node that is null or outside `zmin..=zmax` is deleted along with
    /// the triangles using it. The deletion cascades until no triangle is missing an edge and no
    /// edge is left without a triangle, then the mesh is compacted.
    pub fn calc_holes(&mut self, zmin: f64, zmax: f64) -> SurfaceResult<HoleStats> {
        record(self.calc_holes_inner(zmin, zmax))
    }

    fn calc_holes_inner(&mut self, zmin: f64, zmax: f64) -> SurfaceResult<HoleStats> {
        if zmin > zmax || zmin.is_nan() || zmax.is_nan() {
            return Err(SurfaceError::InvalidOption("hole range minimum exceeds maximum"));
        }
        if self.is_empty() {
            return Err(SurfaceError::Empty);
        }

        let before = (self.node_count(), self.edge_count(), self.tri_count());
        let bad = |n: &Node| is_null(n.z) || n.z < zmin || n.z > zmax;

        let doomed = self
            .live_edges()
            .filter(|&e| {
                let [a, b] = self.edges[e].nodes();
                bad(&self.nodes[a]) || bad(&self.nodes[b])
            })
            .collect::<Vec<_>>();
        for e in &doomed {
            self.delete_edge(*e);
        }
        for n in self.nodes.iter_mut().filter(|n| bad(n)) {
            n.deleted = true;
        }
        self.cleanup();

        let stats = HoleStats {
            nodes: before.0 - self.node_count(),
            edges: before.1 - self.edge_count(),
            triangles: before.2 - self.tri_count(),
        };
        log::debug!(
            "holes removed {} nodes, {} edges, {} triangles",
            stats.nodes,
            stats.edges,
            stats.triangles
        );
        self.dump("holes");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_node_is_cut_out() {
        let mut t = TriMesh::from_grid(&flat_grid(4, 4, 50.0), TriMeshStyle::CellDiagonals).unwrap();
        let centre = t
            .nodes()
            .iter()
            .position(|n| n.p2() == [1.0, 1.0])
            .unwrap();
        t.nodes[centre].z = NULL_VALUE;
        let (n, e, tr) = (t.node_count(), t.edge_count(), t.tri_count());

        let s = t.calc_holes(0.0, 100.0).unwrap();
        assert_topology(&t);
        assert_eq!(s.nodes, 1);
        // an interior node of a diagonal mesh has 6 edges and 6 triangles
        assert_eq!(s.edges, 6);
        assert_eq!(s.triangles, 6);
        assert!(t.node_count() < n && t.edge_count() < e && t.tri_count() < tr);
        assert!(t.nodes().iter().all(|n| n.z == 50.0));
        assert_eq!(t.outline_boundary().len(), 2);
    }

    #[test]
    fn range_limits() {
        let g = fn_grid(3, 3, 2.0, 2.0, |x, _| x * 10.0);
        let mut t = TriMesh::from_grid(&g, TriMeshStyle::CellDiagonals).unwrap();
        let s = t.calc_holes(0.0, 100.0).unwrap();
        assert_eq!(s, HoleStats::default());

        // removing the x = 20 column leaves the left column of cells
        let s = t.calc_holes(0.0, 15.0).unwrap();
        assert_topology(&t);
        assert_eq!(s.nodes, 3);
        assert_eq!(t.tri_count(), 4);

        assert!(t.calc_holes(5.0, 1.0).is_err());
        assert_eq!(last_error_code(), 3);
    }

    #[test]
    fn everything_removed() {
        let mut t = TriMesh::from_grid(&flat_grid(2, 2, 500.0), TriMeshStyle::CellDiagonals).unwrap();
        let s = t.calc_holes(0.0, 100.0).unwrap();
        assert_eq!(s.triangles, 2);
        assert!(t.is_empty());
        assert!(t.nodes().is_empty());
        assert!(t.calc_holes(0.0, 100.0).is_err());
    }
}
