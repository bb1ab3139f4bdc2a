use crate::*;

/// Ax + By + Cz = D
#[derive(Debug, Clone)]
pub struct Plane {
    d: f64,
    normal: Point3,
    centroid: Point3,
}

impl Plane {
    pub fn new(centroid: Point3, normal: Point3) -> Self {
        let d = dot_prod(normal, centroid);
        Self {
            d,
            normal,
            centroid,
        }
    }

    /// Fits a plane using the least squares method.
    /// Returns `None` if less than three points are used.
    ///
    /// Algorithm from <https://www.ilikebigbits.com/2015_03_04_plane_from_points.html>
    #[allow(clippy::suspicious_operation_groupings)]
    #[allow(clippy::float_cmp)]
    pub fn fit_least_sqs(points: &[Point3]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }

        // Calculate centroid
        let centroid = points
            .iter()
            .copied()
            .fold(Point3::default(), Point3::add)
            .scale((points.len() as f64).recip());

        // Calculate full 3x3 covariance matrix, excluding symmetries
        let n_centroid = centroid.scale(-1.0); // negative centroid.
        let [mut xx, mut xy, mut xz, mut yy, mut yz, mut zz] = [0f64; 6];
        for p in points {
            let [x, y, z] = p.add(n_centroid); // subtract centroid from point
            xx += x * x; // xx
            xy += x * y; // xy
            xz += x * z; // xz
            yy += y * y; // yy
            yz += y * z; // yz
            zz += z * z; // zz
        }

        // Determinants
        let (detx, dety, detz) = (yy * zz - yz * yz, xx * zz - xz * xz, xx * yy - xy * xy);
        let det_max = if detx > dety && detx > detz {
            detx
        } else if dety > detz {
            dety
        } else {
            detz
        };
        if det_max <= 0.0 {
            return None;
        }

        // Pick path with best conditioning
        let dir = if det_max == detx {
            [detx, xz * yz - xy * zz, xy * yz - xz * yy]
        } else if det_max == dety {
            [xz * yz - xy * zz, dety, xy * xz - yz * xx]
        } else {
            [xy * yz - xz * yy, xy * xz - yz * xx, detz]
        };

        Some(Self::new(centroid, dir))
    }

    pub fn a(&self) -> f64 {
        self.normal[0]
    }

    pub fn b(&self) -> f64 {
        self.normal[1]
    }

    pub fn c(&self) -> f64 {
        self.normal[2]
    }

    pub fn d(&self) -> f64 {
        self.d
    }

    pub fn centroid(&self) -> Point3 {
        self.centroid
    }

    pub fn normal(&self) -> Point3 {
        self.normal
    }

    /// The horizontal direction along the plane, zero if the plane is horizontal.
    pub fn strike(&self) -> Point3 {
        [self.b(), self.a() * -1.0, 0.0]
    }
}

impl From<Tri> for Plane {
    fn from([p0, p1, p2]: Tri) -> Self {
        let a = p1.sub(p0);
        let b = p2.sub(p0);
        Plane::new(p0, xprod(a, b))
    }
}

/// Fit `z = a + b·x + c·y` to the points by least squares, returning `[a, b, c]`.
///
/// Returns `None` if there are fewer than three points or the points are colinear in plan.
pub fn fit_z(points: &[Point3]) -> Option<[f64; 3]> {
    fit_z_inner(points.iter().map(|&p| (p, 1.0)))
}

/// Fit `z = a + b·x + c·y` by weighted least squares, returning `[a, b, c]`.
///
/// `weights` pairs with `points`; extra entries of either are ignored.
pub fn fit_z_weighted(points: &[Point3], weights: &[f64]) -> Option<[f64; 3]> {
    fit_z_inner(points.iter().copied().zip(weights.iter().copied()))
}

fn fit_z_inner<I>(samples: I) -> Option<[f64; 3]>
where
    I: Iterator<Item = (Point3, f64)> + Clone,
{
    // centre on the weighted mean for conditioning
    let (mut sw, mut mx, mut my, mut n) = (0.0, 0.0, 0.0, 0usize);
    for ([x, y, _], w) in samples.clone() {
        sw += w;
        mx += w * x;
        my += w * y;
        n += 1;
    }
    if n < 3 || !(sw > 0.0) {
        return None;
    }
    mx /= sw;
    my /= sw;

    let mut m = [[0f64; 4]; 3];
    for ([x, y, z], w) in samples {
        let row = [1.0, x - mx, y - my];
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] += w * row[i] * row[j];
            }
            m[i][3] += w * row[i] * z;
        }
    }

    let [a, b, c] = solve3(m)?;
    Some([a - b * mx - c * my, b, c])
}

/// Gaussian elimination with partial pivoting on an augmented 3x4 matrix.
fn solve3(mut m: [[f64; 4]; 3]) -> Option<[f64; 3]> {
    let scale = m
        .iter()
        .flat_map(|r| r[..3].iter())
        .fold(0f64, |a, b| a.max(b.abs()));
    if !(scale > 0.0) {
        return None;
    }
    let tiny = scale * 1e-12;

    for col in 0..3 {
        let piv = (col..3).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[piv][col].abs() <= tiny {
            return None;
        }
        m.swap(col, piv);
        for r in col + 1..3 {
            let f = m[r][col] / m[col][col];
            for k in col..4 {
                m[r][k] -= f * m[col][k];
            }
        }
    }

    let mut x = [0f64; 3];
    for i in (0..3).rev() {
        let s = (i + 1..3).map(|k| m[i][k] * x[k]).sum::<f64>();
        x[i] = (m[i][3] - s) / m[i][i];
    }
    x.iter().all(|v| v.is_finite()).then(|| x)
}
