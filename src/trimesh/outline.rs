use super::*;
use std::collections::VecDeque;

impl TriMesh {
    /// The closed boundary loops of the mesh.
    ///
    /// Each loop lists its nodes in walking order without repeating the first node, so a loop
    /// has as many points as boundary edges. Disjoint parts of the mesh and holes each produce
    /// their own loop.
    pub fn outline_boundary(&self) -> Vec<Vec<Point3>> {
        let tris = self.live_tris().collect::<Vec<_>>();
        self.outline_triangles(&tris)
    }

    /// The closed outlines of a subset of triangles.
    ///
    /// An edge is on the outline if exactly one of its triangles is in `tris`. Deleted or
    /// unknown triangle indices are ignored.
    pub fn outline_triangles(&self, tris: &[usize]) -> Vec<Vec<Point3>> {
        let free = free_edges(self, tris);
        let mut pairs = free
            .into_iter()
            .map(|e| self.edges[e].nodes())
            .collect::<Vec<_>>();
        // stable output regardless of the hash order
        pairs.sort_unstable();

        get_outlines(pairs)
            .into_iter()
            .map(|ring| ring.into_iter().map(|n| self.nodes[n].p3()).collect())
            .collect()
    }
}

/// Edges used by exactly one triangle of the subset.
fn free_edges(mesh: &TriMesh, tris: &[usize]) -> HashSet<usize> {
    let mut set: HashSet<usize> =
        HashSet::with_capacity_and_hasher(tris.len() * 2, Default::default());
    let mut seen: HashSet<usize> = HashSet::default();
    let mut ins = |e: usize| {
        if !set.remove(&e) {
            set.insert(e);
        }
    };

    for &t in tris {
        let live = mesh.tris.get(t).map(|t| !t.deleted).unwrap_or(false);
        if !live || !seen.insert(t) {
            continue;
        }
        for e in mesh.tris[t].edges {
            ins(e);
        }
    }

    set
}

fn join_edges(edges: &mut Vec<[usize; 2]>) -> VecDeque<usize> {
    // worst case is O(n²)
    let mut v = VecDeque::with_capacity(edges.len());
    match edges.pop() {
        Some([a, b]) => {
            v.push_back(a);
            v.push_back(b);
        }
        None => return v,
    }

    // swap_remove pulls the last edge into the searched slot, so search backwards
    let mut get = |pos: usize| {
        for i in (0..edges.len()).rev() {
            let [a, b] = edges[i];
            if a == pos {
                edges.swap_remove(i);
                return Some(b);
            } else if b == pos {
                edges.swap_remove(i);
                return Some(a);
            }
        }
        None
    };

    let (mut has_front, mut has_back) = (true, true);

    while has_front || has_back {
        if v.len() > 2 && v.front() == v.back() {
            // closed
            v.pop_back();
            break;
        }

        if has_front {
            match v.front().copied().and_then(&mut get) {
                Some(x) => v.push_front(x),
                None => has_front = false,
            }
        }

        if v.len() > 2 && v.front() == v.back() {
            v.pop_back();
            break;
        }

        if has_back {
            match v.back().copied().and_then(&mut get) {
                Some(x) => v.push_back(x),
                None => has_back = false,
            }
        }
    }

    v
}

fn get_outlines(free_edges: Vec<[usize; 2]>) -> Vec<VecDeque<usize>> {
    let mut edges = free_edges;
    let mut v = Vec::new();

    while !edges.is_empty() {
        let shape = join_edges(&mut edges);
        if shape.len() < 3 {
            log::debug!("dropping an open outline of {} nodes", shape.len());
            continue;
        }
        v.push(shape);
    }

    v
}
