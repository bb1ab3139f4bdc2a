use super::*;

impl TriMesh {
    /// Trim the mesh to a polygon.
    ///
    /// Edges whose mid point falls on the discarded side of `polygon` are deleted, along with
    /// their triangles. With `keep_inside` the outside is discarded, otherwise the inside is.
    /// Works best when the polygon was inserted as a boundary constraint first, so that mesh
    /// edges follow it. Returns the number of triangles removed.
    pub fn clip_to_polygon(&mut self, polygon: &Polygon2, keep_inside: bool) -> SurfaceResult<usize> {
        if self.is_empty() {
            return record(Err(SurfaceError::Empty));
        }
        let before = self.tri_count();

        let doomed = self
            .live_edges()
            .filter(|&e| {
                let [a, b] = self.edges[e].nodes();
                let mid = lerp(self.nodes[a].p2(), self.nodes[b].p2(), 0.5);
                polygon.envelops(mid) != keep_inside
            })
            .collect::<Vec<_>>();
        for e in doomed {
            self.delete_edge(e);
        }
        self.cleanup();

        record(Ok(before - self.tri_count()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(lo: f64, hi: f64) -> Polygon2 {
        Polygon2::new(vec![[lo, lo], [hi, lo], [hi, hi], [lo, hi]]).unwrap()
    }

    #[test]
    fn keep_inside() {
        let mut t = TriMesh::from_grid(&flat_grid(5, 5, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        let n = t.clip_to_polygon(&square(0.9, 3.1), true).unwrap();
        assert_topology(&t);
        // the middle 2x2 cells survive
        assert_eq!(t.tri_count(), 8);
        assert_eq!(n, 24);
        let b = t.bounding_box().unwrap();
        assert_eq!(b.origin, [1.0, 1.0, 0.0]);
        assert_eq!(b.max(), [3.0, 3.0, 0.0]);
    }

    #[test]
    fn keep_outside() {
        let mut t = TriMesh::from_grid(&flat_grid(5, 5, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        t.clip_to_polygon(&square(1.9, 2.1), false).unwrap();
        assert_topology(&t);
        // only edges with a mid point near (2,2) go, and no edge has its mid point there
        assert_eq!(t.tri_count(), 32);

        t.clip_to_polygon(&square(1.4, 2.6), false).unwrap();
        assert_topology(&t);
        assert!(t.tri_count() < 32);
        assert!(!t.envelops([2.0, 2.0]));
        assert!(t.envelops([0.2, 0.2]));
    }
}
