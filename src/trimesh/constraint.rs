use super::*;

/// What the walk along a constraint segment meets next.
#[derive(Debug, Clone, Copy)]
enum Step {
    /// An existing node on the segment, joined to the current node by an edge.
    Node(usize),
    /// The segment crosses an edge opposite the current node.
    Cross(usize, Point2),
    /// The segment end lies on an edge through the current node.
    OnEdge(usize),
    /// The segment end lies inside a triangle.
    Inside(usize),
}

impl Step {
    /// Preference when two steps are the same distance along the segment.
    fn rank(&self) -> u8 {
        match self {
            Step::Node(_) => 0,
            Step::Cross(..) => 1,
            Step::OnEdge(_) => 2,
            Step::Inside(_) => 3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Tolerance {
    /// Coincidence distance.
    tol: f64,
    /// Distance within which a new point moves onto an existing node. Zero for exact insertion.
    snap: f64,
}

impl Tolerance {
    fn reach(&self) -> f64 {
        self.tol.max(self.snap)
    }
}

impl TriMesh {
    /// Insert constraint lines so that each runs along mesh edges.
    ///
    /// Triangles crossed by a line are split where the line crosses their edges and at the line
    /// vertices. With `exact` the new nodes sit exactly on the line; otherwise a crossing close
    /// to an existing node uses that node instead, which avoids thin triangles at the cost of
    /// bending the line slightly.
    ///
    /// Edges and nodes along a line are flagged with [`BOUNDARY_FLAG`] or
    /// [`DISCONTINUITY_FLAG`]. Nodes along a boundary line take their elevation from the line
    /// (unless the line value is null). The mesh is cut along discontinuity lines: the two sides
    /// get separate edges and separate nodes, so each side keeps an independent elevation.
    /// Line portions off the mesh are skipped.
    ///
    /// Returns the number of constraint edges inserted.
    pub fn add_lines(&mut self, lines: &[FaultLine], exact: bool) -> SurfaceResult<usize> {
        record(self.add_lines_inner(lines, exact))
    }

    fn add_lines_inner(&mut self, lines: &[FaultLine], exact: bool) -> SurfaceResult<usize> {
        if self.is_empty() || lines.is_empty() {
            return Err(SurfaceError::Empty);
        }
        validate_faults(lines)?;

        let (sum, n) = self
            .live_edges()
            .map(|e| {
                let [a, b] = self.edges[e].nodes();
                dist_xy(self.nodes[a].p2(), self.nodes[b].p2())
            })
            .fold((0.0, 0usize), |(s, n), l| (s + l, n + 1));
        let avg = sum / n.max(1) as f64;
        let tol = Tolerance {
            tol: avg * 1e-7,
            snap: if exact { 0.0 } else { avg * 0.3 },
        };

        let mut total = 0;
        let mut touched = 0;
        for line in lines {
            match self.insert_line(line, tol)? {
                Some(n) => {
                    touched += 1;
                    total += n;
                }
                None => log::warn!("constraint line of {} points is off the mesh", line.len()),
            }
        }
        if touched == 0 {
            return Err(SurfaceError::NoTriangle);
        }

        if lines.iter().any(FaultLine::is_discontinuity) {
            self.cut_discontinuities();
        }
        self.dump("add_lines");
        Ok(total)
    }

    /// Walk one line through the mesh. Returns the number of chain edges, or `None` if the
    /// line never touched the mesh.
    fn insert_line(&mut self, line: &FaultLine, tol: Tolerance) -> SurfaceResult<Option<usize>> {
        let flag = match line.kind() {
            LineKind::Boundary => BOUNDARY_FLAG,
            LineKind::Discontinuity => DISCONTINUITY_FLAG,
        };
        let mut chain = Vec::new();
        let mut touched = false;
        let mut cur: Option<usize> = None;

        for (p, q) in line.segments() {
            let q2 = q.to_p2();
            if cur.is_none() {
                cur = self.start_at(p.to_p2(), q2, tol)?;
            }
            if let Some(n) = cur {
                touched = true;
                self.mark_node(n, flag, (p, q));
            }

            let max_steps = 4 * self.edges.len() + 64;
            let mut steps = 0;
            while let Some(c) = cur {
                if dist_xy(self.nodes[c].p2(), q2) <= tol.reach() {
                    break;
                }
                steps += 1;
                if steps > max_steps {
                    log::warn!("constraint walk did not reach its segment end, skipping the rest");
                    cur = None;
                    break;
                }

                match self.next_step(c, q2, tol.tol) {
                    Some(step) => {
                        let n = self.apply_step(c, step, q2, tol)?;
                        if n == c {
                            break;
                        }
                        if let Some(e) = self.edge_between(c, n) {
                            self.edges[e].flag |= flag;
                            chain.push(e);
                        }
                        self.mark_node(n, flag, (p, q));
                        cur = Some(n);
                    }
                    None => {
                        // the segment leaves the mesh here
                        cur = self.enter(self.nodes[c].p2(), q2, Some(c), tol)?;
                        if let Some(n) = cur {
                            self.mark_node(n, flag, (p, q));
                        }
                    }
                }
            }
        }

        chain.sort_unstable();
        chain.dedup();
        Ok(touched.then(|| chain.len()))
    }

    fn mark_node(&mut self, n: usize, flag: i32, (p, q): (Point3, Point3)) {
        let node = &mut self.nodes[n];
        node.flag |= flag;
        if flag == BOUNDARY_FLAG {
            let (_, s) = dist_to_segment(node.p2(), p, q);
            let z = lerp(p, q, s)[2];
            if !is_null(z) && !is_null(p[2]) && !is_null(q[2]) {
                node.z = z;
            }
        }
    }

    /// The node to start a segment from: an existing node, a new node inside the mesh, or the
    /// first point where the segment enters the mesh.
    fn start_at(&mut self, p: Point2, q: Point2, tol: Tolerance) -> SurfaceResult<Option<usize>> {
        if let Some(n) = self.nearest_node(p, tol.reach()) {
            return Ok(Some(n));
        }
        match self.locate(p) {
            Some(t) => self.insert_in_tri(t, p, tol).map(Some),
            None => self.enter(p, q, None, tol),
        }
    }

    fn nearest_node(&self, p: Point2, within: f64) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.deleted)
            .map(|(i, n)| (dist_xy(n.p2(), p), i))
            .filter(|(d, _)| *d <= within)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, i)| i)
    }

    /// Insert `p` into triangle `t`, on an edge if it lies on one.
    fn insert_in_tri(&mut self, t: usize, p: Point2, tol: Tolerance) -> SurfaceResult<usize> {
        let [a, b, c] = self.tri_nodes(t);
        for n in [a, b, c] {
            if dist_xy(self.nodes[n].p2(), p) <= tol.reach() {
                return Ok(n);
            }
        }
        let nearest_edge = self.tris[t]
            .edges
            .iter()
            .map(|&e| {
                let [x, y] = self.edges[e].nodes();
                (dist_to_segment(p, self.nodes[x].p2(), self.nodes[y].p2()).0, e)
            })
            .fold((f64::INFINITY, 0), |acc, x| if x.0 < acc.0 { x } else { acc });
        if nearest_edge.0 <= tol.tol {
            return self.split_edge(nearest_edge.1, self.edge_point(nearest_edge.1, p));
        }
        let z = self.tri_z(t, p);
        match self.split_triangle(t, [p[0], p[1], z]) {
            Err(SurfaceError::NoTriangle) => {
                // on an edge within rounding
                self.split_edge(nearest_edge.1, self.edge_point(nearest_edge.1, p))
            }
            r => r,
        }
    }

    /// `p` placed on edge `e`, with the elevation interpolated along the edge.
    fn edge_point(&self, e: usize, p: Point2) -> Point3 {
        let [a, b] = self.edges[e].nodes();
        let (pa, pb) = (self.nodes[a].p3(), self.nodes[b].p3());
        let (_, s) = dist_to_segment(p, pa, pb);
        [p[0], p[1], lerp(pa, pb, s)[2]]
    }

    /// The first event on the way from node `cur` to `q`, or `None` if the path leaves the mesh
    /// at `cur`.
    fn next_step(&self, cur: usize, q: Point2, tol: f64) -> Option<Step> {
        let c = self.nodes[cur].p2();
        let len = dist_xy(c, q);
        let eps = tol / len;
        let mut best: Option<(f64, Step)> = None;
        let mut offer = |s: f64, step: Step| {
            let better = match best {
                None => true,
                Some((bs, b)) => s < bs - 1e-12 || (s <= bs + 1e-12 && step.rank() < b.rank()),
            };
            if better {
                best = Some((s, step));
            }
        };

        for t in self.incident_tris(cur) {
            let others = self
                .tri_nodes(t)
                .into_iter()
                .filter(|&n| n != cur)
                .collect::<Vec<_>>();
            let (x, y) = match others[..] {
                [x, y] => (x, y),
                _ => continue,
            };
            let (px, py) = (self.nodes[x].p2(), self.nodes[y].p2());

            for (n, pn) in [(x, px), (y, py)] {
                let (d, s) = dist_to_segment(pn, c, q);
                if d <= tol && s > eps {
                    offer(s, Step::Node(n));
                }
            }

            let opp = match self.tri_edge(t, x, y) {
                Some(e) => e,
                None => continue,
            };
            let ueps = tol / dist_xy(px, py).max(tol);
            if let Some((pt, s, u)) = segment_intersection(c, q, px, py) {
                if s > eps && u > ueps && u < 1.0 - ueps {
                    offer(s, Step::Cross(opp, pt));
                }
            }

            if self.tri_contains(t, q) {
                let through = [(x, px), (y, py)].into_iter().find_map(|(n, pn)| {
                    let (d, s) = dist_to_segment(q, c, pn);
                    (d <= tol && s > 0.0 && s < 1.0)
                        .then(|| self.tri_edge(t, cur, n))
                        .flatten()
                });
                match through {
                    Some(e) => offer(1.0, Step::OnEdge(e)),
                    None => offer(1.0, Step::Inside(t)),
                }
            }
        }

        best.map(|(_, step)| step)
    }

    fn incident_tris(&self, n: usize) -> Vec<usize> {
        let mut v = self
            .edges_at(n)
            .flat_map(|e| self.edges[e].tris().into_iter().flatten())
            .collect::<Vec<_>>();
        v.sort_unstable();
        v.dedup();
        v
    }

    /// Carry out a step from `cur`, returning the node reached.
    fn apply_step(&mut self, cur: usize, step: Step, q: Point2, tol: Tolerance) -> SurfaceResult<usize> {
        match step {
            Step::Node(n) => Ok(n),
            Step::Cross(e, pt) => {
                if let Some(n) = self.snap_to_edge_end(e, pt, tol.snap) {
                    return Ok(n);
                }
                self.split_edge(e, self.edge_point(e, pt))
            }
            Step::OnEdge(e) => {
                if let Some(n) = self.snap_to_edge_end(e, q, tol.snap) {
                    return Ok(n);
                }
                self.split_edge(e, self.edge_point(e, q))
            }
            Step::Inside(t) => {
                if tol.snap > 0.0 {
                    let near = self
                        .tri_nodes(t)
                        .into_iter()
                        .map(|n| (dist_xy(self.nodes[n].p2(), q), n))
                        .filter(|(d, _)| *d <= tol.snap)
                        .min_by(|a, b| a.0.total_cmp(&b.0));
                    if let Some((_, n)) = near {
                        return Ok(n);
                    }
                }
                let n = self.insert_in_tri(t, q, tol)?;
                if self.edge_between(cur, n).is_none() {
                    log::debug!("constraint end {:?} is not joined to node {}", q, cur);
                }
                Ok(n)
            }
        }
    }

    fn snap_to_edge_end(&self, e: usize, p: Point2, snap: f64) -> Option<usize> {
        if snap <= 0.0 {
            return None;
        }
        let [a, b] = self.edges[e].nodes();
        let (da, db) = (dist_xy(self.nodes[a].p2(), p), dist_xy(self.nodes[b].p2(), p));
        if da <= db && da <= snap {
            Some(a)
        } else if db <= snap {
            Some(b)
        } else {
            None
        }
    }

    /// Where the path `from -> q` next enters the mesh across a boundary edge.
    ///
    /// Boundary edges touching `exclude` are ignored. Returns the entry node, splitting the
    /// boundary edge if needed.
    fn enter(
        &mut self,
        from: Point2,
        q: Point2,
        exclude: Option<usize>,
        tol: Tolerance,
    ) -> SurfaceResult<Option<usize>> {
        let len = dist_xy(from, q);
        if len <= tol.tol {
            return Ok(None);
        }
        let eps = tol.tol / len;
        let entry = self
            .live_edges()
            .filter(|&e| self.edges[e].tri_count() == 1)
            .filter(|&e| exclude.map(|x| !self.edges[e].has_node(x)).unwrap_or(true))
            .filter_map(|e| {
                let [a, b] = self.edges[e].nodes();
                segment_intersection(from, q, self.nodes[a].p2(), self.nodes[b].p2())
                    .filter(|(_, s, _)| *s > eps || exclude.is_none())
                    .map(|(pt, s, _)| (s, e, pt))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let (e, pt) = match entry {
            Some((_, e, pt)) => (e, pt),
            None => return Ok(None),
        };
        let [a, b] = self.edges[e].nodes();
        let within = tol.reach();
        for n in [a, b] {
            if dist_xy(self.nodes[n].p2(), pt) <= within {
                return Ok(Some(n));
            }
        }
        self.split_edge(e, self.edge_point(e, pt)).map(Some)
    }

    /// Separate the two sides of every discontinuity edge.
    ///
    /// Each discontinuity edge with two triangles gets a twin edge for its second triangle.
    /// Each discontinuity node whose surrounding triangles then fall into several groups (no
    /// longer joined through shared edges) gets a copy per extra group. Repeating the cut
    /// changes nothing.
    pub(crate) fn cut_discontinuities(&mut self) {
        let cut = self
            .live_edges()
            .filter(|&e| self.edges[e].flag & DISCONTINUITY_FLAG != 0)
            .collect::<Vec<_>>();

        for e in cut {
            let t2 = match self.edges[e].tri2 {
                Some(t) => t,
                None => continue,
            };
            let [a, b] = self.edges[e].nodes();
            let twin = self.push_edge(a, b, self.edges[e].flag);
            for slot in self.tris[t2].edges.iter_mut().filter(|s| **s == e) {
                *slot = twin;
            }
            self.edges[e].tri2 = None;
            self.edges[twin].tri1 = Some(t2);
        }

        let mut fans: HashMap<usize, Vec<usize>> = HashMap::default();
        for e in self.live_edges() {
            for n in self.edges[e].nodes() {
                if self.nodes[n].flag & DISCONTINUITY_FLAG != 0 {
                    fans.entry(n).or_default().push(e);
                }
            }
        }
        let mut keys = fans.keys().copied().collect::<Vec<_>>();
        keys.sort_unstable();

        let mut copies = 0;
        for n in keys {
            let edges = &fans[&n];
            let groups = tri_groups(&self.edges, edges);
            for group in groups.iter().skip(1) {
                let m = self.push_node(self.nodes[n]);
                copies += 1;
                for &e in edges {
                    let edge = self.edges[e];
                    let in_group = edge.tri1.map(|t| group.contains(&t)).unwrap_or(false);
                    if !in_group {
                        continue;
                    }
                    if edge.node1 == n {
                        self.set_edge_nodes(e, m, edge.node2);
                    } else if edge.node2 == n {
                        self.set_edge_nodes(e, edge.node1, m);
                    }
                }
            }
        }
        if copies > 0 {
            log::debug!("split {} nodes along discontinuities", copies);
        }
    }
}

/// Group the triangles around a node, joining two triangles when they share one of `edges`.
fn tri_groups(all: &[Edge], edges: &[usize]) -> Vec<Vec<usize>> {
    let mut tris = edges
        .iter()
        .flat_map(|&e| all[e].tris().into_iter().flatten())
        .collect::<Vec<_>>();
    tris.sort_unstable();
    tris.dedup();

    let mut group = vec![usize::MAX; tris.len()];
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for start in 0..tris.len() {
        if group[start] != usize::MAX {
            continue;
        }
        let g = groups.len();
        let mut members = vec![tris[start]];
        group[start] = g;
        let mut stack = vec![tris[start]];
        while let Some(t) = stack.pop() {
            for &e in edges {
                if let [Some(a), Some(b)] = all[e].tris() {
                    let next = if a == t {
                        b
                    } else if b == t {
                        a
                    } else {
                        continue;
                    };
                    if let Ok(i) = tris.binary_search(&next) {
                        if group[i] == usize::MAX {
                            group[i] = g;
                            members.push(next);
                            stack.push(next);
                        }
                    }
                }
            }
        }
        groups.push(members);
    }
    groups
}
