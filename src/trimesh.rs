use crate::*;

mod clip;
mod constraint;
mod holes;
mod outline;
mod sliver;
mod to_grid;

pub use to_grid::*;

/// Triangle represented by 3 points (A, B, C).
pub type Tri = [Point3; 3];

impl Aabb for Tri {
    type Space = Point3;
    fn aabb(&self) -> Extents<Self::Space> {
        Extents::from_iter(*self)
    }
}

/// Flag of nodes and edges that lie along a boundary constraint line.
pub const BOUNDARY_FLAG: i32 = 1;
/// Flag of nodes and edges that lie along a discontinuity (fault) line.
pub const DISCONTINUITY_FLAG: i32 = 2;

/// Passes of the cleanup cascade before it gives up on reaching a fixed point.
const MAX_CLEANUP_PASSES: usize = 10;

#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub flag: i32,
    #[serde(skip)]
    deleted: bool,
}

impl Node {
    pub fn new([x, y, z]: Point3) -> Self {
        Self {
            x,
            y,
            z,
            flag: 0,
            deleted: false,
        }
    }

    #[must_use]
    pub fn with_flag(mut self, flag: i32) -> Self {
        self.flag = flag;
        self
    }

    pub fn p3(&self) -> Point3 {
        [self.x, self.y, self.z]
    }

    pub fn p2(&self) -> Point2 {
        [self.x, self.y]
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// A mesh edge between two nodes, with up to two adjacent triangles.
///
/// An edge with a single triangle lies on the mesh boundary (or along one side of a fault).
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Edge {
    node1: usize,
    node2: usize,
    tri1: Option<usize>,
    tri2: Option<usize>,
    pub flag: i32,
    #[serde(skip)]
    deleted: bool,
}

impl Edge {
    pub fn new(node1: usize, node2: usize, tri1: Option<usize>, tri2: Option<usize>) -> Self {
        Self {
            node1,
            node2,
            tri1,
            tri2,
            flag: 0,
            deleted: false,
        }
    }

    #[must_use]
    pub fn with_flag(mut self, flag: i32) -> Self {
        self.flag = flag;
        self
    }

    pub fn node1(&self) -> usize {
        self.node1
    }

    pub fn node2(&self) -> usize {
        self.node2
    }

    pub fn nodes(&self) -> [usize; 2] {
        [self.node1, self.node2]
    }

    pub fn tri1(&self) -> Option<usize> {
        self.tri1
    }

    pub fn tri2(&self) -> Option<usize> {
        self.tri2
    }

    pub fn tris(&self) -> [Option<usize>; 2] {
        [self.tri1, self.tri2]
    }

    pub fn tri_count(&self) -> usize {
        self.tri1.is_some() as usize + self.tri2.is_some() as usize
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn has_node(&self, n: usize) -> bool {
        self.node1 == n || self.node2 == n
    }

    /// The node at the other end from `n`.
    pub fn other_node(&self, n: usize) -> usize {
        if self.node1 == n {
            self.node2
        } else {
            self.node1
        }
    }

    /// The triangle on the other side from `t`.
    pub fn other_tri(&self, t: usize) -> Option<usize> {
        if self.tri1 == Some(t) {
            self.tri2
        } else if self.tri2 == Some(t) {
            self.tri1
        } else {
            None
        }
    }

    fn lists_tri(&self, t: usize) -> bool {
        self.tri1 == Some(t) || self.tri2 == Some(t)
    }

    /// Remove `t` from the triangle slots, keeping the first slot filled first.
    fn unlink_tri(&mut self, t: usize) {
        if self.tri2 == Some(t) {
            self.tri2 = None;
        }
        if self.tri1 == Some(t) {
            self.tri1 = self.tri2.take();
        }
    }

    fn link_tri(&mut self, t: usize) -> SurfaceResult<()> {
        if self.tri1.is_none() {
            self.tri1 = Some(t);
        } else if self.tri2.is_none() {
            self.tri2 = Some(t);
        } else {
            return Err(SurfaceError::Topology(format!(
                "edge {}-{} already has two triangles",
                self.node1, self.node2
            )));
        }
        Ok(())
    }

    fn relink_tri(&mut self, old: usize, new: usize) {
        if self.tri1 == Some(old) {
            self.tri1 = Some(new);
        } else if self.tri2 == Some(old) {
            self.tri2 = Some(new);
        }
    }
}

/// A triangle bounded by three edges.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Triangle {
    edges: [usize; 3],
    pub flag: i32,
    #[serde(skip)]
    deleted: bool,
}

impl Triangle {
    pub fn new(edges: [usize; 3]) -> Self {
        Self {
            edges,
            flag: 0,
            deleted: false,
        }
    }

    #[must_use]
    pub fn with_flag(mut self, flag: i32) -> Self {
        self.flag = flag;
        self
    }

    pub fn edges(&self) -> [usize; 3] {
        self.edges
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// A triangulated surface with explicit node, edge, and triangle adjacency.
///
/// Every live edge lists the live triangles that use it, and every live triangle is bounded by
/// three live edges that list it back. All edits go through methods that keep this adjacency
/// consistent. Deleting elements only marks them; [`TriMesh::cleanup`] removes them and
/// renumbers the survivors.
///
/// `PartialEq` compares the node, edge, and triangle arrays exactly, including element order.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TriMesh {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    tris: Vec<Triangle>,
    /// Edges touching each node. Only used while it has a slot for every node; entries for
    /// deleted edges are skipped on lookup.
    #[serde(skip)]
    node_edges: Vec<Vec<usize>>,
}

impl PartialEq for TriMesh {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.edges == other.edges && self.tris == other.tris
    }
}

impl TriMesh {
    /// Build a mesh from raw arrays, checking the adjacency.
    pub fn from_raw(
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        tris: Vec<Triangle>,
    ) -> SurfaceResult<Self> {
        let mut mesh = Self {
            nodes,
            edges,
            tris,
            node_edges: Vec::new(),
        };
        mesh.check_topology()?;
        mesh.index_edges();
        Ok(mesh)
    }

    /// All node slots, including deleted nodes not yet cleaned up.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.tris
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.deleted).count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|e| !e.deleted).count()
    }

    pub fn tri_count(&self) -> usize {
        self.tris.iter().filter(|t| !t.deleted).count()
    }

    /// Returns if there are no live triangles.
    pub fn is_empty(&self) -> bool {
        self.tri_count() == 0
    }

    /// Transform every node location. Topology is unchanged.
    pub fn map_nodes<F: FnMut(Point3) -> Point3>(&mut self, mut f: F) {
        for n in &mut self.nodes {
            let [x, y, z] = f(n.p3());
            n.x = x;
            n.y = y;
            n.z = z;
        }
    }

    /// The corner nodes of triangle `t`, counter-clockwise unless the triangle is degenerate.
    pub fn tri_nodes(&self, t: usize) -> [usize; 3] {
        let [e0, e1, _] = self.tris[t].edges;
        let [a, b] = self.edges[e0].nodes();
        let [p, q] = self.edges[e1].nodes();
        let c = if p == a || p == b { q } else { p };
        if orient2d(self.nodes[a].p2(), self.nodes[b].p2(), self.nodes[c].p2()) < 0.0 {
            [b, a, c]
        } else {
            [a, b, c]
        }
    }

    pub fn tri_points(&self, t: usize) -> Tri {
        self.tri_nodes(t).map(|n| self.nodes[n].p3())
    }

    /// The points of every live triangle.
    pub fn tris(&self) -> impl Iterator<Item = Tri> + '_ {
        self.live_tris().map(move |t| self.tri_points(t))
    }

    pub(crate) fn live_tris(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.tris.len()).filter(move |&t| !self.tris[t].deleted)
    }

    pub(crate) fn live_edges(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.edges.len()).filter(move |&e| !self.edges[e].deleted)
    }

    /// The extents of the live nodes.
    pub fn bounding_box(&self) -> Option<Extents3> {
        let mut pts = self.nodes.iter().filter(|n| !n.deleted).map(Node::p3).peekable();
        pts.peek()?;
        Some(pts.collect())
    }

    /// Check the adjacency of every live element.
    pub fn check_topology(&self) -> SurfaceResult<()> {
        let err = |s: String| Err(SurfaceError::Topology(s));
        let (nn, ne, nt) = (self.nodes.len(), self.edges.len(), self.tris.len());

        for (i, e) in self.edges.iter().enumerate().filter(|(_, e)| !e.deleted) {
            if e.node1 >= nn || e.node2 >= nn {
                return err(format!("edge {} references a missing node", i));
            }
            if e.node1 == e.node2 {
                return err(format!("edge {} starts and ends on node {}", i, e.node1));
            }
            if self.nodes[e.node1].deleted || self.nodes[e.node2].deleted {
                return err(format!("edge {} references a deleted node", i));
            }
            if e.tri1.is_none() && e.tri2.is_none() {
                return err(format!("edge {} has no triangles", i));
            }
            if e.tri1.is_some() && e.tri1 == e.tri2 {
                return err(format!("edge {} lists the same triangle twice", i));
            }
            for t in e.tris().into_iter().flatten() {
                if t >= nt || self.tris[t].deleted || !self.tris[t].edges.contains(&i) {
                    return err(format!("edge {} lists triangle {} which does not use it", i, t));
                }
            }
        }

        for (i, t) in self.tris.iter().enumerate().filter(|(_, t)| !t.deleted) {
            for &e in &t.edges {
                if e >= ne || self.edges[e].deleted {
                    return err(format!("triangle {} uses a missing edge", i));
                }
                if !self.edges[e].lists_tri(i) {
                    return err(format!("triangle {} uses edge {} which does not list it", i, e));
                }
            }
            let [a, b, c] = t.edges.map(|e| self.edges[e]);
            if a.nodes() == b.nodes() || a.nodes() == c.nodes() || b.nodes() == c.nodes() {
                return err(format!("triangle {} repeats an edge", i));
            }
            // each node of the triangle must be shared by exactly two of its edges
            for n in [a.node1, a.node2, b.node1, b.node2, c.node1, c.node2] {
                let k = [a, b, c].iter().filter(|e| e.has_node(n)).count();
                if k != 2 {
                    return err(format!("triangle {} edges do not close", i));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn push_node(&mut self, node: Node) -> usize {
        if self.indexed() {
            self.node_edges.push(Vec::new());
        }
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn push_edge(&mut self, a: usize, b: usize, flag: i32) -> usize {
        let e = self.edges.len();
        self.edges.push(Edge::new(a, b, None, None).with_flag(flag));
        if self.indexed() {
            for n in [a, b] {
                if let Some(v) = self.node_edges.get_mut(n) {
                    v.push(e);
                }
            }
        }
        e
    }

    /// Move edge `e` onto nodes `a` and `b`.
    fn set_edge_nodes(&mut self, e: usize, a: usize, b: usize) {
        if self.indexed() {
            for n in self.edges[e].nodes() {
                if let Some(v) = self.node_edges.get_mut(n) {
                    v.retain(|&x| x != e);
                }
            }
            for n in [a, b] {
                if let Some(v) = self.node_edges.get_mut(n) {
                    v.push(e);
                }
            }
        }
        self.edges[e].node1 = a;
        self.edges[e].node2 = b;
    }

    /// Rebuild the node to edge lookup from the live edges.
    fn index_edges(&mut self) {
        let mut index = vec![Vec::new(); self.nodes.len()];
        for (i, e) in self.edges.iter().enumerate().filter(|(_, e)| !e.deleted) {
            for n in e.nodes() {
                if let Some(v) = index.get_mut(n) {
                    v.push(i);
                }
            }
        }
        self.node_edges = index;
    }

    fn indexed(&self) -> bool {
        self.node_edges.len() == self.nodes.len()
    }

    /// The live edges touching node `n`.
    ///
    /// A mesh that came through serde has no lookup until its next cleanup, and falls back
    /// to scanning every edge.
    pub(crate) fn edges_at(&self, n: usize) -> impl Iterator<Item = usize> + '_ {
        let listed: &[usize] = match self.node_edges.get(n) {
            Some(v) if self.indexed() => v.as_slice(),
            _ => &[],
        };
        let scan = (!self.indexed()).then(|| self.live_edges()).into_iter().flatten();
        listed
            .iter()
            .copied()
            .chain(scan)
            .filter(move |&e| !self.edges[e].deleted && self.edges[e].has_node(n))
    }

    /// Add a triangle over existing edges, linking the edges to it.
    fn push_tri(&mut self, edges: [usize; 3]) -> SurfaceResult<usize> {
        let t = self.tris.len();
        for e in edges {
            self.edges[e].link_tri(t)?;
        }
        self.tris.push(Triangle::new(edges));
        Ok(t)
    }

    fn live_edge(&self, e: usize) -> SurfaceResult<Edge> {
        match self.edges.get(e) {
            Some(edge) if !edge.deleted => Ok(*edge),
            _ => Err(SurfaceError::Topology(format!("edge {} does not exist", e))),
        }
    }

    fn live_tri(&self, t: usize) -> SurfaceResult<Triangle> {
        match self.tris.get(t) {
            Some(tri) if !tri.deleted => Ok(*tri),
            _ => Err(SurfaceError::Topology(format!("triangle {} does not exist", t))),
        }
    }

    /// The edge of triangle `t` joining nodes `a` and `b`.
    fn tri_edge(&self, t: usize, a: usize, b: usize) -> Option<usize> {
        self.tris[t]
            .edges
            .iter()
            .copied()
            .find(|&e| self.edges[e].has_node(a) && self.edges[e].has_node(b))
    }

    /// The node of triangle `t` that is not on edge `e`.
    pub(crate) fn opposite_node(&self, t: usize, e: usize) -> usize {
        let edge = self.edges[e];
        self.tri_nodes(t)
            .into_iter()
            .find(|&n| !edge.has_node(n))
            .unwrap_or(edge.node1)
    }

    /// A live edge joining `a` and `b`.
    pub(crate) fn edge_between(&self, a: usize, b: usize) -> Option<usize> {
        self.edges_at(a).find(|&e| self.edges[e].has_node(b))
    }

    /// Mark a triangle deleted and unlink it from its edges. Edges left without triangles are
    /// deleted too.
    pub fn delete_triangle(&mut self, t: usize) {
        match self.tris.get_mut(t) {
            Some(tri) if !tri.deleted => tri.deleted = true,
            _ => return,
        }
        for e in self.tris[t].edges {
            if let Some(edge) = self.edges.get_mut(e) {
                edge.unlink_tri(t);
                if edge.tri1.is_none() {
                    edge.deleted = true;
                }
            }
        }
    }

    /// Mark an edge deleted along with the triangles that use it.
    pub fn delete_edge(&mut self, e: usize) {
        let edge = match self.edges.get(e) {
            Some(edge) if !edge.deleted => *edge,
            _ => return,
        };
        for t in edge.tris().into_iter().flatten() {
            self.delete_triangle(t);
        }
        self.edges[e].deleted = true;
    }

    /// Remove deleted elements and renumber the survivors.
    ///
    /// First cascades deletions until the adjacency is consistent: triangles using a missing
    /// edge are deleted, dangling triangle references on edges are dropped, and edges left with
    /// no triangle are deleted. The cascade is capped at 10 passes. Nodes not used by any live
    /// edge are removed. Running cleanup twice is the same as running it once.
    pub fn cleanup(&mut self) {
        for pass in 0..MAX_CLEANUP_PASSES {
            if !self.cascade_pass() {
                break;
            }
            if pass + 1 == MAX_CLEANUP_PASSES {
                log::warn!(
                    "mesh cleanup stopped after {} passes without settling",
                    MAX_CLEANUP_PASSES
                );
            }
        }

        let mut used = vec![false; self.nodes.len()];
        for e in self.edges.iter().filter(|e| !e.deleted) {
            used[e.node1] = true;
            used[e.node2] = true;
        }
        for (n, u) in self.nodes.iter_mut().zip(used) {
            if !u {
                n.deleted = true;
            }
        }

        self.compact();
    }

    /// One pass of deletion cascade. Returns if anything changed.
    fn cascade_pass(&mut self) -> bool {
        let mut changed = false;
        let (nn, ne) = (self.nodes.len(), self.edges.len());

        for i in 0..self.edges.len() {
            let e = self.edges[i];
            if e.deleted {
                continue;
            }
            let bad_nodes = e.node1 >= nn
                || e.node2 >= nn
                || e.node1 == e.node2
                || self.nodes[e.node1].deleted
                || self.nodes[e.node2].deleted;
            if bad_nodes {
                self.delete_edge(i);
                changed = true;
            }
        }

        for t in 0..self.tris.len() {
            if self.tris[t].deleted {
                continue;
            }
            let bad = self.tris[t]
                .edges
                .iter()
                .any(|&e| e >= ne || self.edges[e].deleted || !self.edges[e].lists_tri(t));
            if bad {
                self.delete_triangle(t);
                changed = true;
            }
        }

        for e in 0..self.edges.len() {
            if self.edges[e].deleted {
                continue;
            }
            for t in self.edges[e].tris().into_iter().flatten() {
                let dangling = t >= self.tris.len()
                    || self.tris[t].deleted
                    || !self.tris[t].edges.contains(&e);
                if dangling {
                    self.edges[e].unlink_tri(t);
                    changed = true;
                }
            }
            if self.edges[e].tri1.is_none() {
                self.edges[e].deleted = true;
                changed = true;
            }
        }

        changed
    }

    fn compact(&mut self) {
        fn remap<T>(v: &mut Vec<T>, deleted: impl Fn(&T) -> bool) -> Vec<Option<usize>> {
            let mut map = Vec::with_capacity(v.len());
            let mut next = 0;
            for x in v.iter() {
                if deleted(x) {
                    map.push(None);
                } else {
                    map.push(Some(next));
                    next += 1;
                }
            }
            v.retain(|x| !deleted(x));
            map
        }

        let nmap = remap(&mut self.nodes, |n| n.deleted);
        let emap = remap(&mut self.edges, |e| e.deleted);
        let tmap = remap(&mut self.tris, |t| t.deleted);

        for e in &mut self.edges {
            // live edges only reference live nodes after the cascade
            e.node1 = nmap[e.node1].unwrap_or(usize::MAX);
            e.node2 = nmap[e.node2].unwrap_or(usize::MAX);
            e.tri1 = e.tri1.and_then(|t| tmap[t]);
            e.tri2 = e.tri2.and_then(|t| tmap[t]);
        }
        for t in &mut self.tris {
            t.edges = t.edges.map(|e| emap[e].unwrap_or(usize::MAX));
        }
        self.index_edges();
    }

    /// Split edge `e` at `p`, joining the new node to the far corner of each adjacent triangle.
    ///
    /// The new node and the second half of the edge take the edge's flag, and each new
    /// triangle takes the flag of the triangle it was cut from. Returns the new node.
    pub fn split_edge(&mut self, e: usize, p: Point3) -> SurfaceResult<usize> {
        let edge = self.live_edge(e)?;
        let [n1, n2] = edge.nodes();

        // gather the corners before the edge changes
        let mut sides = Vec::with_capacity(2);
        for t in edge.tris().into_iter().flatten() {
            let c = self.opposite_node(t, e);
            let ea = self
                .tri_edge(t, n2, c)
                .ok_or_else(|| SurfaceError::Topology(format!("triangle {} is open", t)))?;
            sides.push((t, c, ea));
        }

        let m = self.push_node(Node::new(p).with_flag(edge.flag));
        let e2 = self.push_edge(m, n2, edge.flag);
        self.set_edge_nodes(e, n1, m);

        for (t, c, ea) in sides {
            let emc = self.push_edge(m, c, 0);
            // t keeps n1-m and c-n1, swapping n2-c for m-c
            let slot = self.tris[t].edges.iter().position(|&x| x == ea);
            if let Some(i) = slot {
                self.tris[t].edges[i] = emc;
            }
            self.edges[ea].unlink_tri(t);
            self.edges[emc].link_tri(t)?;
            let nt = self.push_tri([e2, ea, emc])?;
            self.tris[nt].flag = self.tris[t].flag;
        }

        Ok(m)
    }

    /// Split triangle `t` into three by a new node at `p`, which must lie inside it.
    ///
    /// Returns the new node.
    pub fn split_triangle(&mut self, t: usize, p: Point3) -> SurfaceResult<usize> {
        let tri = self.live_tri(t)?;
        let [a, b, c] = self.tri_nodes(t);
        let (pa, pb, pc) = (self.nodes[a].p2(), self.nodes[b].p2(), self.nodes[c].p2());
        let inside = orient2d(pa, pb, p) > 0.0 && orient2d(pb, pc, p) > 0.0 && orient2d(pc, pa, p) > 0.0;
        if !inside {
            return Err(SurfaceError::NoTriangle);
        }
        let find = |x, y| {
            self.tri_edge(t, x, y)
                .ok_or_else(|| SurfaceError::Topology(format!("triangle {} is open", t)))
        };
        let (eab, ebc, eca) = (find(a, b)?, find(b, c)?, find(c, a)?);

        let m = self.push_node(Node::new(p));
        let ema = self.push_edge(m, a, 0);
        let emb = self.push_edge(m, b, 0);
        let emc = self.push_edge(m, c, 0);

        self.tris[t] = Triangle::new([eab, emb, ema]).with_flag(tri.flag);
        self.edges[ema].link_tri(t)?;
        self.edges[emb].link_tri(t)?;
        self.edges[ebc].unlink_tri(t);
        self.edges[eca].unlink_tri(t);
        let t2 = self.push_tri([ebc, emc, emb])?;
        let t3 = self.push_tri([eca, ema, emc])?;
        self.tris[t2].flag = tri.flag;
        self.tris[t3].flag = tri.flag;

        Ok(m)
    }

    /// Swap edge `e` to join the far corners of its two triangles.
    ///
    /// Fails on boundary edges, constraint edges, and where the two triangles do not form a
    /// convex quadrilateral.
    pub fn flip_edge(&mut self, e: usize) -> SurfaceResult<()> {
        let edge = self.live_edge(e)?;
        let (t1, t2) = match edge.tris() {
            [Some(t1), Some(t2)] => (t1, t2),
            _ => return Err(SurfaceError::Topology(format!("edge {} is on the boundary", e))),
        };
        if edge.flag != 0 {
            return Err(SurfaceError::Topology(format!("edge {} is a constraint", e)));
        }
        let [a, b] = edge.nodes();
        let c = self.opposite_node(t1, e);
        let d = self.opposite_node(t2, e);
        let p = |n: usize| self.nodes[n].p2();

        let convex = orient2d(p(a), p(b), p(c)) * orient2d(p(a), p(b), p(d)) < 0.0
            && orient2d(p(c), p(d), p(a)) * orient2d(p(c), p(d), p(b)) < 0.0;
        if !convex || c == d {
            return Err(SurfaceError::Topology(format!("edge {} cannot be flipped", e)));
        }

        let open = || SurfaceError::Topology(format!("edge {} has an open triangle", e));
        let e_bc = self.tri_edge(t1, b, c).ok_or_else(open)?;
        let e_ca = self.tri_edge(t1, c, a).ok_or_else(open)?;
        let e_ad = self.tri_edge(t2, a, d).ok_or_else(open)?;
        let e_db = self.tri_edge(t2, d, b).ok_or_else(open)?;

        self.set_edge_nodes(e, c, d);
        self.tris[t1].edges = [e_ca, e_ad, e];
        self.tris[t2].edges = [e_db, e_bc, e];
        self.edges[e_ad].relink_tri(t2, t1);
        self.edges[e_bc].relink_tri(t1, t2);
        Ok(())
    }

    /// Merge node `gone` into the other end of edge `e`, dropping the two triangles on `e`.
    ///
    /// Fails where `gone` or `e` carries a constraint flag, where `gone` touches the mesh
    /// boundary, where the two ends share a neighbour other than the far corners of the
    /// dropped triangles, and where a surrounding triangle would fold over. Call
    /// [`TriMesh::cleanup`] afterwards to compact. Returns the kept node.
    pub fn collapse_edge(&mut self, e: usize, gone: usize) -> SurfaceResult<usize> {
        let edge = self.live_edge(e)?;
        let refuse = |why: &str| {
            Err(SurfaceError::Topology(format!(
                "edge {} cannot be collapsed: {}",
                e, why
            )))
        };
        if !edge.has_node(gone) {
            return refuse("node is not on the edge");
        }
        let keep = edge.other_node(gone);
        let (t1, t2) = match edge.tris() {
            [Some(t1), Some(t2)] => (t1, t2),
            _ => return refuse("edge is on the boundary"),
        };
        if edge.flag != 0 || self.nodes[gone].flag != 0 {
            return refuse("constraint");
        }
        let fan = self.edges_at(gone).collect::<Vec<_>>();
        if fan.iter().any(|&x| self.edges[x].tri_count() < 2) {
            return refuse("node is on the boundary");
        }

        let a = self.opposite_node(t1, e);
        let b = self.opposite_node(t2, e);
        let ring = |n: usize| {
            self.edges_at(n)
                .map(|x| self.edges[x].other_node(n))
                .collect::<Vec<_>>()
        };
        let (near_gone, near_keep) = (ring(gone), ring(keep));
        let shared = near_gone.iter().filter(|n| near_keep.contains(n)).count();
        if a == b || shared != 2 {
            return refuse("ends share other neighbours");
        }

        let mut fan_tris = fan
            .iter()
            .flat_map(|&x| self.edges[x].tris().into_iter().flatten())
            .filter(|&t| t != t1 && t != t2)
            .collect::<Vec<_>>();
        fan_tris.sort_unstable();
        fan_tris.dedup();
        let pk = self.nodes[keep].p2();
        for &t in &fan_tris {
            let [p, q, r] = self
                .tri_nodes(t)
                .map(|n| if n == gone { pk } else { self.nodes[n].p2() });
            if orient2d(p, q, r) <= 0.0 {
                return refuse("a triangle would fold");
            }
        }

        let open = || SurfaceError::Topology(format!("edge {} has an open triangle", e));
        let mut sides = Vec::with_capacity(2);
        for (t, c) in [(t1, a), (t2, b)] {
            let e_gc = self.tri_edge(t, gone, c).ok_or_else(open)?;
            let e_kc = self.tri_edge(t, keep, c).ok_or_else(open)?;
            let s = self.edges[e_gc].other_tri(t).ok_or_else(open)?;
            sides.push((t, e_gc, e_kc, s));
        }

        // the triangle beyond each dropped side edge takes over the kept side edge
        self.edges[e].deleted = true;
        for (t, e_gc, e_kc, s) in sides {
            for slot in self.tris[s].edges.iter_mut().filter(|x| **x == e_gc) {
                *slot = e_kc;
            }
            self.edges[e_kc].relink_tri(t, s);
            self.edges[e_gc].deleted = true;
            self.tris[t].deleted = true;
        }
        for x in fan {
            if !self.edges[x].deleted {
                let other = self.edges[x].other_node(gone);
                self.set_edge_nodes(x, keep, other);
            }
        }
        self.nodes[gone].deleted = true;
        Ok(keep)
    }

    /// The live triangle containing the plan location `p`, if any.
    pub fn locate(&self, p: Point2) -> Option<usize> {
        self.live_tris().find(|&t| self.tri_contains(t, p))
    }

    pub(crate) fn tri_contains(&self, t: usize, p: Point2) -> bool {
        let [a, b, c] = self.tri_nodes(t).map(|n| self.nodes[n].p2());
        let area = orient2d(a, b, c);
        if area <= 0.0 {
            return false;
        }
        let tol = -1e-9 * area;
        orient2d(a, b, p) >= tol && orient2d(b, c, p) >= tol && orient2d(c, a, p) >= tol
    }

    /// The elevation of the plane through triangle `t` at `p`.
    pub fn tri_z(&self, t: usize, p: Point2) -> f64 {
        let [a, b, c] = self.tri_points(t);
        let area = orient2d(a, b, c);
        if area == 0.0 {
            return (a[2] + b[2] + c[2]) / 3.0;
        }
        let wa = orient2d(b, c, p) / area;
        let wb = orient2d(c, a, p) / area;
        let wc = 1.0 - wa - wb;
        wa * a[2] + wb * b[2] + wc * c[2]
    }

    /// Build a mesh from the defined nodes of a grid.
    ///
    /// Each cell with four defined corners becomes two triangles split on one diagonal
    /// (`style` decides which); a cell with three defined corners becomes one triangle, so the
    /// split always avoids the undefined corner. Mesh nodes sit exactly on the grid nodes.
    pub fn from_grid(grid: &Grid, style: TriMeshStyle) -> SurfaceResult<Self> {
        record(Self::from_grid_inner(grid, style))
    }

    fn from_grid_inner(grid: &Grid, style: TriMeshStyle) -> SurfaceResult<Self> {
        if grid.is_blank() {
            return Err(SurfaceError::Empty);
        }
        let (ncol, nrow) = (grid.x_count(), grid.y_count());

        let mut ids = alloc_vec(grid.len(), None)?;
        let mut mesh = TriMesh::default();
        for p in grid.points() {
            ids[p.idx()] = Some(mesh.push_node(Node::new(p.p3())));
        }

        let mut edge_map: HashMap<(usize, usize), usize> =
            HashMap::with_capacity_and_hasher(grid.len() * 3, Default::default());
        let id = |c: usize, r: usize| ids[r * ncol + c];

        for r in 0..nrow - 1 {
            for c in 0..ncol - 1 {
                let corners = (id(c, r), id(c + 1, r), id(c + 1, r + 1), id(c, r + 1));
                // upper left to lower right unless alternating
                let ul_lr = match style {
                    TriMeshStyle::CellDiagonals => true,
                    TriMeshStyle::Equilateral => (c + r) % 2 == 0,
                };
                match corners {
                    (Some(ll), Some(lr), Some(ur), Some(ul)) => {
                        if ul_lr {
                            mesh.add_tri_nodes([ll, lr, ul], &mut edge_map)?;
                            mesh.add_tri_nodes([lr, ur, ul], &mut edge_map)?;
                        } else {
                            mesh.add_tri_nodes([ll, lr, ur], &mut edge_map)?;
                            mesh.add_tri_nodes([ll, ur, ul], &mut edge_map)?;
                        }
                    }
                    (None, Some(lr), Some(ur), Some(ul)) => {
                        mesh.add_tri_nodes([lr, ur, ul], &mut edge_map)?;
                    }
                    (Some(ll), None, Some(ur), Some(ul)) => {
                        mesh.add_tri_nodes([ll, ur, ul], &mut edge_map)?;
                    }
                    (Some(ll), Some(lr), None, Some(ul)) => {
                        mesh.add_tri_nodes([ll, lr, ul], &mut edge_map)?;
                    }
                    (Some(ll), Some(lr), Some(ur), None) => {
                        mesh.add_tri_nodes([ll, lr, ur], &mut edge_map)?;
                    }
                    _ => (),
                }
            }
        }

        if mesh.tris.is_empty() {
            return Err(SurfaceError::Degenerate);
        }
        // drops nodes that ended up in no triangle
        mesh.cleanup();
        mesh.dump("from_grid");
        Ok(mesh)
    }

    /// Add a triangle by its corner nodes, sharing edges through `edge_map`.
    fn add_tri_nodes(
        &mut self,
        [a, b, c]: [usize; 3],
        edge_map: &mut HashMap<(usize, usize), usize>,
    ) -> SurfaceResult<usize> {
        let mut edge = |x: usize, y: usize| {
            let key = (x.min(y), x.max(y));
            *edge_map
                .entry(key)
                .or_insert_with(|| self.push_edge(x, y, 0))
        };
        let edges = [edge(a, b), edge(b, c), edge(c, a)];
        self.push_tri(edges)
    }

    /// Write the mesh to the diagnostic dump, if enabled.
    pub(crate) fn dump(&self, label: &str) {
        if !debug_dump_enabled() {
            return;
        }
        log::debug!(
            target: "geosurf::dump",
            "trimesh {}: {} nodes {} edges {} triangles",
            label,
            self.node_count(),
            self.edge_count(),
            self.tri_count()
        );
        for n in self.nodes.iter().filter(|n| !n.deleted) {
            log::debug!(target: "geosurf::dump", "{} {} {} {}", n.x, n.y, n.z, n.flag);
        }
    }
}

/// Test if a point lays **on** a [`TriMesh`].
///
/// Note this solely tests for 2D intersection.
impl Envelops<Point2> for TriMesh {
    fn envelops(&self, p: Point2) -> bool {
        match self.bounding_box() {
            Some(b) if Extents2::from(b).envelops(p) => self.locate(p).is_some(),
            _ => false,
        }
    }
}

impl Aabb for TriMesh {
    type Space = Point3;
    fn aabb(&self) -> Extents3 {
        self.bounding_box().unwrap_or_else(Extents3::zero)
    }
}

/// The 3D _surface_ area of the live triangles.
impl Area for TriMesh {
    fn area(&self) -> f64 {
        self.tris()
            .map(|[a, b, c]| xprod(b.sub(a), c.sub(a)).mag() * 0.5)
            .sum()
    }
}

#[cfg(test)]
pub(crate) fn assert_topology(mesh: &TriMesh) {
    if let Err(e) = mesh.check_topology() {
        panic!("{}", e);
    }
    for n in 0..mesh.nodes.len() {
        let mut listed = mesh.edges_at(n).collect::<Vec<_>>();
        let mut scanned = mesh
            .live_edges()
            .filter(|&e| mesh.edges[e].has_node(n))
            .collect::<Vec<_>>();
        listed.sort_unstable();
        scanned.sort_unstable();
        assert_eq!(listed, scanned, "edges at node {}", n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;

    #[test]
    fn from_grid_cells() {
        let t = TriMesh::from_grid(&dummy_grid(), TriMeshStyle::CellDiagonals).unwrap();
        assert_topology(&t);
        assert_eq!(t.node_count(), 6);
        assert_eq!(t.tri_count(), 4);
        // 2 cells: 7 outer edges and 2 diagonals
        assert_eq!(t.edge_count(), 9);

        let pts = t.nodes().iter().map(Node::p3).collect::<Vec<_>>();
        assert_eq!(
            pts,
            vec![
                [0.0, 0.0, 1.0],
                [15.0, 0.0, 2.0],
                [0.0, 15.0, 3.0],
                [15.0, 15.0, 4.0],
                [0.0, 30.0, 5.0],
                [15.0, 30.0, 6.0],
            ]
        );
        // diagonals run from upper left to lower right
        assert!(t.edge_between(2, 1).is_some());
        assert!(t.edge_between(0, 3).is_none());
    }

    #[test]
    fn from_grid_avoids_null_corners() {
        let mut g = dummy_grid();
        g.set(0, 0, None);
        g.set(1, 2, None);
        let t = TriMesh::from_grid(&g, TriMeshStyle::CellDiagonals).unwrap();
        assert_topology(&t);
        assert_eq!(t.node_count(), 4);
        assert_eq!(t.tri_count(), 2);
        assert!(t.tris().all(|tri| tri.iter().all(|p| p[2] < 1e20)));
    }

    #[test]
    fn equilateral_alternates() {
        let g = flat_grid(3, 3, 0.0);
        let t = TriMesh::from_grid(&g, TriMeshStyle::Equilateral).unwrap();
        assert_topology(&t);
        assert_eq!(t.tri_count(), 8);
        // cell (0,0) uses ul-lr, cell (1,0) uses ll-ur
        assert!(t.edge_between(3, 1).is_some());
        assert!(t.edge_between(1, 5).is_some());
    }

    #[test]
    fn blank_grid_fails() {
        let geom = GridGeometry::new(3, 3, [0.0, 0.0], [1.0, 1.0]).unwrap();
        assert!(TriMesh::from_grid(&Grid::blank(geom), TriMeshStyle::CellDiagonals).is_err());
        assert_eq!(last_error_code(), 2);
    }

    #[test]
    fn split_edge_keeps_adjacency() {
        let mut t = TriMesh::from_grid(&flat_grid(3, 3, 1.0), TriMeshStyle::CellDiagonals).unwrap();
        let e = t.edge_between(4, 1).unwrap();
        let m = t.split_edge(e, [1.0, 0.5, 1.0]).unwrap();
        assert_topology(&t);
        assert_eq!(t.tri_count(), 10);
        assert_eq!(t.nodes()[m].p3(), [1.0, 0.5, 1.0]);
        assert!(t.edge_between(m, 4).is_some());
        assert!(t.edge_between(m, 1).is_some());

        // boundary edge has one side
        let e = t.edge_between(0, 1).unwrap();
        t.split_edge(e, [0.5, 0.0, 1.0]).unwrap();
        assert_topology(&t);
        assert_eq!(t.tri_count(), 11);
    }

    #[test]
    fn split_triangle_and_flip() {
        let mut t = TriMesh::from_grid(&flat_grid(2, 2, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        let tri = t.locate([0.25, 0.25]).unwrap();
        let m = t.split_triangle(tri, [0.25, 0.25, 0.0]).unwrap();
        assert_topology(&t);
        assert_eq!(t.tri_count(), 4);
        assert_eq!(t.edge_count(), 8);
        assert!(t.split_triangle(tri, [5.0, 5.0, 0.0]).is_err());

        // diagonal 2-1 becomes m-3
        let e = t.edge_between(2, 1).unwrap();
        t.flip_edge(e).unwrap();
        assert_topology(&t);
        assert!(t.edge_between(2, 1).is_none());
        assert!(t.edge_between(m, 3).is_some());

        // boundary edges cannot flip
        let b = t.edge_between(0, 1).unwrap();
        assert!(t.flip_edge(b).is_err());
    }

    #[test]
    fn cleanup_compacts() {
        let mut t = TriMesh::from_grid(&flat_grid(3, 3, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        let before = (t.node_count(), t.edge_count(), t.tri_count());
        let tri = t.locate([0.2, 0.2]).unwrap();
        t.delete_triangle(tri);
        t.cleanup();
        assert_topology(&t);
        let after = (t.node_count(), t.edge_count(), t.tri_count());
        assert_eq!(after.2, before.2 - 1);
        // the corner node only belonged to that triangle
        assert_eq!(after.0, before.0 - 1);
        assert_eq!(t.nodes().len(), after.0);

        let once = t.clone();
        t.cleanup();
        assert_eq!(t, once);
    }

    #[test]
    fn delete_edge_cascades() {
        let mut t = TriMesh::from_grid(&flat_grid(3, 3, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        let e = t.edge_between(4, 1).unwrap();
        t.delete_edge(e);
        t.cleanup();
        assert_topology(&t);
        assert_eq!(t.tri_count(), 6);
    }

    #[test]
    fn split_edge_keeps_triangle_flags() {
        let mut t = TriMesh::from_grid(&flat_grid(3, 3, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        for tri in &mut t.tris {
            tri.flag = 3;
        }
        let e = t.edge_between(4, 1).unwrap();
        t.split_edge(e, [1.0, 0.5, 0.0]).unwrap();
        let e = t.edge_between(0, 1).unwrap();
        t.split_edge(e, [0.5, 0.0, 0.0]).unwrap();
        assert_topology(&t);
        assert_eq!(t.tri_count(), 11);
        assert!(t.triangles().iter().all(|x| x.flag == 3));
    }

    #[test]
    fn collapse_edge_undoes_split() {
        let mut t = TriMesh::from_grid(&flat_grid(4, 4, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        let before = t.clone();
        let e = t.edge_between(5, 6).unwrap();
        let m = t.split_edge(e, [1.5, 1.0, 0.0]).unwrap();
        let e = t.edge_between(5, m).unwrap();
        assert_eq!(t.collapse_edge(e, m).unwrap(), 5);
        assert_topology(&t);
        t.cleanup();
        assert_topology(&t);
        assert_eq!(
            (t.node_count(), t.edge_count(), t.tri_count()),
            (before.node_count(), before.edge_count(), before.tri_count())
        );
        assert_eq!(t.nodes(), before.nodes());
        assert!(t.edge_between(5, 6).is_some());
    }

    #[test]
    fn collapse_edge_keeps_constraints() {
        let mut t = TriMesh::from_grid(&flat_grid(3, 3, 0.0), TriMeshStyle::CellDiagonals).unwrap();
        // node on the outer edge
        let e = t.edge_between(0, 1).unwrap();
        let m = t.split_edge(e, [0.5, 0.0, 0.0]).unwrap();
        let e = t.edge_between(0, m).unwrap();
        assert!(t.collapse_edge(e, m).is_err());
        assert!(t.collapse_edge(e, 4).is_err());

        let e = t.edge_between(4, 1).unwrap();
        let m = t.split_edge(e, [1.0, 0.5, 0.0]).unwrap();
        t.nodes[m].flag = BOUNDARY_FLAG;
        let e = t.edge_between(4, m).unwrap();
        assert!(t.collapse_edge(e, m).is_err());
        assert_topology(&t);

        t.nodes[m].flag = 0;
        assert_eq!(t.collapse_edge(e, m).unwrap(), 4);
        t.cleanup();
        assert_topology(&t);
        assert_eq!(t.tri_count(), 9);
    }

    #[test]
    fn edge_lookup_follows_edits() {
        let mut t = TriMesh::from_grid(&flat_grid(4, 4, 0.0), TriMeshStyle::Equilateral).unwrap();
        let tri = t.locate([1.3, 1.2]).unwrap();
        let m = t.split_triangle(tri, [1.3, 1.2, 0.0]).unwrap();
        assert_topology(&t);
        let e = t.edges_at(m).next().unwrap();
        let [a, b] = t.edges[e].nodes();
        let mid = lerp(t.nodes[a].p3(), t.nodes[b].p3(), 0.5);
        let n = t.split_edge(e, mid).unwrap();
        assert_topology(&t);
        let flipped = t
            .edges_at(n)
            .collect::<Vec<_>>()
            .into_iter()
            .filter(|&e| t.flip_edge(e).is_ok())
            .count();
        assert!(flipped > 0);
        assert_topology(&t);
        t.cleanup();
        assert_topology(&t);

        // a mesh without the lookup scans instead
        let raw = TriMesh {
            node_edges: Vec::new(),
            ..t.clone()
        };
        assert_eq!(raw, t);
        assert!(!raw.indexed());
        assert_topology(&raw);
        assert_eq!(raw.edge_between(m, n), t.edge_between(m, n));
    }

    #[test]
    fn raw_topology_checked() {
        let nodes = vec![
            Node::new([0.0, 0.0, 0.0]),
            Node::new([1.0, 0.0, 0.0]),
            Node::new([0.0, 1.0, 0.0]),
        ];
        let edges = vec![
            Edge::new(0, 1, Some(0), None),
            Edge::new(1, 2, Some(0), None),
            Edge::new(2, 0, Some(0), None),
        ];
        let tris = vec![Triangle::new([0, 1, 2])];
        let t = TriMesh::from_raw(nodes.clone(), edges.clone(), tris.clone()).unwrap();
        assert_eq!(t.tri_count(), 1);
        let x = t.area() - 0.5;
        assert!(x.abs() < 1e-12);

        let mut bad = edges.clone();
        bad[1] = Edge::new(1, 2, None, None);
        assert!(TriMesh::from_raw(nodes.clone(), bad, tris.clone()).is_err());

        let mut bad = edges;
        bad[2] = Edge::new(2, 2, Some(0), None);
        assert_eq!(
            TriMesh::from_raw(nodes, bad, tris).unwrap_err().code(),
            23
        );
    }

    #[test]
    fn envelops_and_bounds() {
        let t = TriMesh::from_grid(&dummy_grid(), TriMeshStyle::CellDiagonals).unwrap();
        assert!(t.envelops([7.0, 20.0]));
        assert!(!t.envelops([16.0, 20.0]));
        assert_eq!(
            t.aabb(),
            Extents3 {
                origin: [0.0, 0.0, 1.0],
                size: [15.0, 30.0, 5.0],
            }
        );
        let tri = t.locate([7.5, 7.5]).unwrap();
        let x = t.tri_z(tri, [7.5, 7.5]) - 2.5;
        assert!(x.abs() < 1e-12);
    }

    #[quickcheck]
    fn random_deletions_keep_adjacency(dels: Vec<u8>, ncol: u8, nrow: u8) -> TestResult {
        let (ncol, nrow) = (ncol as usize % 6 + 2, nrow as usize % 6 + 2);
        let mut t = TriMesh::from_grid(&flat_grid(ncol, nrow, 0.0), TriMeshStyle::Equilateral)
            .unwrap();
        if dels.is_empty() {
            return TestResult::discard();
        }
        let before = (t.node_count(), t.edge_count(), t.tri_count());
        for (i, d) in dels.into_iter().enumerate() {
            if i % 2 == 0 {
                t.delete_triangle(d as usize % t.triangles().len());
            } else {
                t.delete_edge(d as usize % t.edges().len());
            }
        }
        t.cleanup();
        let after = (t.node_count(), t.edge_count(), t.tri_count());
        TestResult::from_bool(
            t.check_topology().is_ok()
                && after.0 <= before.0
                && after.1 <= before.1
                && after.2 <= before.2
                && after == (t.nodes().len(), t.edges().len(), t.triangles().len()),
        )
    }
}
