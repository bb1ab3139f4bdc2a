use crate::*;

/// A best fit plane through a group of related surfaces, and a coordinate frame aligned to it.
///
/// Points and meshes are registered with [`add_points_for_fit`](Self::add_points_for_fit) and
/// [`add_trimesh_for_fit`](Self::add_trimesh_for_fit), then
/// [`calc_plane_coefs`](Self::calc_plane_coefs) fits the plane. After the fit, coordinates
/// can be moved into the plane frame, where the plane is `z = 0`, and back out again.
///
/// In the plane frame `x` runs along strike, `y` up dip, and `z` along the upward normal, with
/// the origin at the centroid of the fit points. The transform is a rigid motion, so
/// distances are preserved.
#[derive(Clone, Debug, Default)]
pub struct SurfaceGroupPlane {
    points: Vec<Point3>,
    normal_sum: Point3,
    normal_count: usize,
    frame: Option<Frame>,
}

#[derive(Clone, Debug)]
struct Frame {
    plane: Plane,
    origin: Point3,
    axes: [Point3; 3],
}

impl Frame {
    fn new(plane: Plane) -> Self {
        let mut n = plane.normal().unit();
        if n[2] < 0.0 {
            n = n.scale(-1.0);
        }
        let s = Plane::new(plane.centroid(), n).strike();
        let u = if s.mag() < 1e-9 { [1.0, 0.0, 0.0] } else { s.unit() };
        let v = xprod(n, u);
        Self {
            origin: plane.centroid(),
            plane,
            axes: [u, v, n],
        }
    }

    fn to_plane(&self, p: Point3) -> Point3 {
        let d = p.sub(self.origin);
        self.axes.map(|a| dot_prod(d, a))
    }

    fn from_plane(&self, [x, y, z]: Point3) -> Point3 {
        let [u, v, n] = self.axes;
        self.origin
            .add(u.scale(x))
            .add(v.scale(y))
            .add(n.scale(z))
    }
}

impl SurfaceGroupPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register points for the fit. Points with an undefined elevation are skipped.
    pub fn add_points_for_fit(&mut self, points: &[Point3]) -> SurfaceResult<()> {
        if self.points.try_reserve(points.len()).is_err() {
            return record(Err(SurfaceError::Alloc));
        }
        self.points
            .extend(points.iter().filter(|p| !is_null(p[2])).copied());
        record(Ok(()))
    }

    /// Register the live nodes of a mesh for the fit, along with its average triangle normal.
    pub fn add_trimesh_for_fit(&mut self, mesh: &TriMesh) -> SurfaceResult<()> {
        let mut sum = Point3::zero();
        let mut n = 0;
        for t in mesh.live_tris() {
            let [a, b, c] = mesh.tri_points(t);
            let mut nrm = xprod(b.sub(a), c.sub(a));
            if nrm.mag() <= 1e-10 {
                continue;
            }
            if nrm[2] < 0.0 {
                nrm = nrm.scale(-1.0);
            }
            sum = sum.add(nrm.unit());
            n += 1;
        }
        if n > 0 {
            self.normal_sum = self.normal_sum.add(sum.scale(1.0 / n as f64));
            self.normal_count += 1;
        }

        let nodes = mesh
            .nodes()
            .iter()
            .filter(|n| !n.is_deleted())
            .map(Node::p3)
            .collect::<Vec<_>>();
        self.add_points_for_fit(&nodes)
    }

    /// Number of points registered for the fit.
    pub fn fit_point_count(&self) -> usize {
        self.points.len()
    }

    /// The mean of the average normals of the registered meshes.
    pub fn average_normal(&self) -> Option<Point3> {
        (self.normal_count > 0).then(|| self.normal_sum.scale(1.0 / self.normal_count as f64))
    }

    /// Fit the plane through the registered points.
    ///
    /// The fit minimises the perpendicular distance to the plane, so steep and vertical
    /// surfaces are handled. If the points are colinear the average mesh normal is used
    /// instead. Fails with [`SurfaceError::TooFewPoints`] below 3 points and
    /// [`SurfaceError::Degenerate`] if no plane can be found.
    pub fn calc_plane_coefs(&mut self) -> SurfaceResult<()> {
        record(self.calc_inner())
    }

    fn calc_inner(&mut self) -> SurfaceResult<()> {
        if self.points.len() < 3 {
            return Err(SurfaceError::TooFewPoints {
                needed: 3,
                found: self.points.len(),
            });
        }
        let ext: Extents3 = self.points.iter().copied().collect();
        if ext.size[0] <= 0.0 && ext.size[1] <= 0.0 {
            return Err(SurfaceError::Degenerate);
        }

        let plane = match Plane::fit_least_sqs(&self.points) {
            Some(p) => p,
            None => {
                let n = self
                    .average_normal()
                    .filter(|n| n.mag() > 1e-9)
                    .ok_or(SurfaceError::Degenerate)?;
                let c = self
                    .points
                    .iter()
                    .fold(Point3::zero(), |a, &p| a.add(p))
                    .scale(1.0 / self.points.len() as f64);
                log::debug!("colinear fit points, using the average mesh normal");
                Plane::new(c, n)
            }
        };

        let frame = Frame::new(plane);
        log::debug!(
            "fitted group plane through {} points, normal {:?}",
            self.points.len(),
            frame.axes[2]
        );
        self.frame = Some(frame);
        Ok(())
    }

    /// Use a previously fitted plane.
    pub fn set_plane(&mut self, plane: Plane) {
        self.frame = Some(Frame::new(plane));
    }

    pub fn is_fitted(&self) -> bool {
        self.frame.is_some()
    }

    pub fn plane(&self) -> Option<&Plane> {
        self.frame.as_ref().map(|f| &f.plane)
    }

    /// The plane as `z = c1 + c2·x + c3·y`. `None` before the fit, or if the plane is vertical.
    pub fn coefs(&self) -> Option<[f64; 3]> {
        let p = self.plane()?;
        let c = p.c();
        if c.abs() < 1e-9 * p.normal().mag() {
            return None;
        }
        Some([p.d() / c, -p.a() / c, -p.b() / c])
    }

    /// The origin of the plane frame.
    pub fn origin(&self) -> Option<Point3> {
        self.frame.as_ref().map(|f| f.origin)
    }

    fn frame(&self) -> SurfaceResult<&Frame> {
        self.frame.as_ref().ok_or(SurfaceError::PlaneNotFitted)
    }

    /// Move points into the plane frame, in place.
    pub fn convert_to_plane(&self, points: &mut [Point3]) -> SurfaceResult<()> {
        let f = record(self.frame())?;
        points.iter_mut().for_each(|p| *p = f.to_plane(*p));
        Ok(())
    }

    /// Move points out of the plane frame, in place.
    pub fn convert_from_plane(&self, points: &mut [Point3]) -> SurfaceResult<()> {
        let f = record(self.frame())?;
        points.iter_mut().for_each(|p| *p = f.from_plane(*p));
        Ok(())
    }

    /// Move the nodes of a mesh into the plane frame.
    pub fn convert_trimesh_to_plane(&self, mesh: &mut TriMesh) -> SurfaceResult<()> {
        let f = record(self.frame())?;
        mesh.map_nodes(|p| f.to_plane(p));
        Ok(())
    }

    /// Move the nodes of a mesh out of the plane frame.
    pub fn convert_trimesh_from_plane(&self, mesh: &mut TriMesh) -> SurfaceResult<()> {
        let f = record(self.frame())?;
        mesh.map_nodes(|p| f.from_plane(p));
        Ok(())
    }
}
