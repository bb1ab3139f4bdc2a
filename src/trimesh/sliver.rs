use super::*;

const MAX_SLIVER_PASSES: usize = 10;

impl TriMesh {
    /// Height over base of triangle `t`, measured on its longest edge, and that edge.
    pub(crate) fn height_base_ratio(&self, t: usize) -> (f64, usize) {
        let edges = self.tris[t].edges;
        let (base_edge, base) = edges
            .iter()
            .map(|&e| (e, self.edge_len(e)))
            .fold((edges[0], 0.0), |acc, x| if x.1 > acc.1 { x } else { acc });
        if base == 0.0 {
            return (0.0, base_edge);
        }
        let [a, b, c] = self.tri_nodes(t).map(|n| self.nodes[n].p2());
        let height = orient2d(a, b, c).abs() / base;
        (height / base, base_edge)
    }

    fn edge_len(&self, e: usize) -> f64 {
        let [a, b] = self.edges[e].nodes();
        dist_xy(self.nodes[a].p2(), self.nodes[b].p2())
    }

    /// Remove triangles thinner than `ratio` (height over longest side).
    ///
    /// A sliver inside the mesh has its longest edge swapped when that makes the thinner of the
    /// two triangles sharing it fatter. A sliver that still remains and touches the mesh
    /// boundary is deleted. Otherwise its shortest edge is collapsed, as long as that moves no
    /// constraint or boundary node. Constraint edges are never swapped. Runs at most 10 passes,
    /// logs a warning if slivers remain, then compacts the mesh. Returns the number of slivers
    /// fixed.
    pub fn remove_slivers(&mut self, ratio: f64) -> SurfaceResult<usize> {
        record(self.remove_slivers_inner(ratio))
    }

    fn remove_slivers_inner(&mut self, ratio: f64) -> SurfaceResult<usize> {
        if !(ratio > 0.0 && ratio.is_finite()) {
            return Err(SurfaceError::InvalidOption("sliver ratio must be positive"));
        }
        if self.is_empty() {
            return Err(SurfaceError::Empty);
        }

        let mut fixed = 0;
        for _ in 0..MAX_SLIVER_PASSES {
            let mut changed = 0;
            for t in 0..self.tris.len() {
                if self.tris[t].deleted {
                    continue;
                }
                let (r, base) = self.height_base_ratio(t);
                if r >= ratio {
                    continue;
                }
                if self.improve_by_flip(t, base, r) {
                    changed += 1;
                    continue;
                }
                let on_boundary = self.tris[t]
                    .edges
                    .iter()
                    .any(|&e| self.edges[e].tri_count() == 1);
                if on_boundary {
                    self.delete_triangle(t);
                    changed += 1;
                } else if self.collapse_short_edge(t) {
                    changed += 1;
                }
            }
            fixed += changed;
            if changed == 0 {
                break;
            }
        }

        let left = self
            .live_tris()
            .filter(|&t| self.height_base_ratio(t).0 < ratio)
            .count();
        if left > 0 {
            log::warn!("{} triangles remain thinner than {}", left, ratio);
        }
        self.cleanup();
        log::debug!("fixed {} sliver triangles", fixed);
        Ok(fixed)
    }

    /// Flip `e` if the thinner of its two triangles gets fatter. Returns if flipped.
    fn improve_by_flip(&mut self, t: usize, e: usize, r: f64) -> bool {
        let other = match self.edges[e].other_tri(t) {
            Some(o) => o,
            None => return false,
        };
        let before = r.min(self.height_base_ratio(other).0);
        if self.flip_edge(e).is_err() {
            return false;
        }
        let after = self.height_base_ratio(t).0.min(self.height_base_ratio(other).0);
        if after > before {
            true
        } else {
            // flipping again restores the diagonal
            let _ = self.flip_edge(e);
            false
        }
    }

    /// Collapse an edge of `t` no longer than half its longest edge, shortest first.
    /// Returns if one was collapsed.
    fn collapse_short_edge(&mut self, t: usize) -> bool {
        let mut edges = self.tris[t].edges.map(|e| (self.edge_len(e), e));
        edges.sort_by(|a, b| a.0.total_cmp(&b.0));
        let longest = edges[2].0;
        for (len, e) in edges {
            if len > longest * 0.5 {
                break;
            }
            let [a, b] = self.edges[e].nodes();
            // the newer node usually made the sliver
            for gone in [a.max(b), a.min(b)] {
                if self.collapse_edge(e, gone).is_ok() {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min_ratio(t: &TriMesh) -> f64 {
        t.live_tris()
            .map(|x| t.height_base_ratio(x).0)
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn regular_mesh_untouched() {
        let mut t = TriMesh::from_grid(&flat_grid(4, 4, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        let before = t.clone();
        assert_eq!(t.remove_slivers(0.1).unwrap(), 0);
        assert_eq!(t, before);
        let x = min_ratio(&t) - 0.5;
        assert!(x.abs() < 1e-12);
    }

    #[test]
    fn boundary_sliver_removed() {
        let mut t = TriMesh::from_grid(&flat_grid(3, 3, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        let e = t.edge_between(0, 1).unwrap();
        t.split_edge(e, [0.999, 0.0, 0.0]).unwrap();
        assert!(min_ratio(&t) < 0.01);

        let n = t.remove_slivers(0.01).unwrap();
        assert!(n >= 1);
        assert_topology(&t);
        assert!(min_ratio(&t) >= 0.01);
        assert!(t.tri_count() >= 8);
    }

    #[test]
    fn interior_sliver_flipped() {
        // a node close to an interior diagonal makes two slivers that a flip cannot fix, but
        // the neighbouring diagonal can be swapped
        let mut t = TriMesh::from_grid(&flat_grid(3, 3, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        let e = t.edge_between(4, 1).unwrap();
        t.split_edge(e, [1.0, 0.001, 0.0]).unwrap();
        let count = t.tri_count();
        t.remove_slivers(0.05).unwrap();
        assert_topology(&t);
        assert!(t.tri_count() <= count);
        assert!(t.tri_count() > 0);
        assert!(min_ratio(&t) >= 0.05);
    }

    #[test]
    fn interior_sliver_collapsed() {
        // far from the boundary, a node just off a grid node leaves slivers no flip can fix
        let mut t = TriMesh::from_grid(&flat_grid(5, 5, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        let e = t.edge_between(12, 7).unwrap();
        t.split_edge(e, [2.0, 1.001, 0.0]).unwrap();
        assert!(min_ratio(&t) < 0.05);

        let n = t.remove_slivers(0.05).unwrap();
        assert!(n >= 1);
        assert_topology(&t);
        assert!(min_ratio(&t) >= 0.05);
        assert_eq!(t.node_count(), 25);
        assert_eq!(t.tri_count(), 32);
    }

    #[test]
    fn constraint_sliver_kept() {
        let mut t = TriMesh::from_grid(&flat_grid(5, 5, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        let e = t.edge_between(12, 7).unwrap();
        let m = t.split_edge(e, [2.0, 1.001, 0.0]).unwrap();
        t.nodes[m].flag = DISCONTINUITY_FLAG;
        t.nodes[7].flag = DISCONTINUITY_FLAG;
        let e = t.edge_between(7, m).unwrap();
        t.edges[e].flag = DISCONTINUITY_FLAG;

        t.remove_slivers(0.05).unwrap();
        assert_topology(&t);
        assert_eq!(t.node_count(), 26);
        assert!(min_ratio(&t) < 0.05);
    }

    #[test]
    fn ratio_validated() {
        let mut t = TriMesh::from_grid(&flat_grid(2, 2, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        assert!(t.remove_slivers(0.0).is_err());
        assert!(t.remove_slivers(f64::NAN).is_err());
        assert_eq!(last_error_code(), 3);
    }
}
