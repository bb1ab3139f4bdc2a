use std::ops;

pub trait Point: Copy + Sized + IntoIterator<Item = f64> {
    /// Set all the values to this value.
    fn all(v: f64) -> Self;

    /// Set all values to zero.
    fn zero() -> Self {
        Self::all(0.)
    }

    /// Scale point by multiplying all dimensions by `scalar`.
    fn scale(self, scalar: f64) -> Self;

    /// Calculate the magnitude of the vector.
    fn mag(self) -> f64 {
        self.into_iter()
            .zip(self)
            .map(|(a, b)| a * b)
            .sum::<f64>()
            .sqrt()
    }

    /// Normalise the vector by the magnitude.
    fn unit(self) -> Self {
        self.scale(self.mag().recip())
    }

    /// Return the minimum of each dimension.
    fn min_all(self, b: Self) -> Self {
        xfm(self, b, f64::min)
    }

    /// Return the maximum of each dimension.
    fn max_all(self, b: Self) -> Self {
        xfm(self, b, f64::max)
    }

    /// Return the maximum value of all dimensions.
    fn max_of(self) -> f64 {
        self.into_iter().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Perform a transformation on each pair of dimensions.
    fn xfm<F: Fn(f64, f64) -> f64>(self, b: Self, f: F) -> Self;
}

pub trait Add<Rhs = Self> {
    fn add(self, rhs: Rhs) -> Self;
    fn sub(self, rhs: Rhs) -> Self
    where
        Self: Sized + Copy,
        Rhs: Point,
    {
        self.add(rhs.scale(-1.0))
    }
}

/// 2D Point (X,Y).
pub type Point2 = [f64; 2];

/// 3D Point (X,Y,Z).
pub type Point3 = [f64; 3];

macro_rules! impl_point {
    ($n:literal) => {
        impl Add for [f64; $n] {
            fn add(self, rhs: Self) -> Self {
                xfm(self, rhs, ops::Add::add)
            }

            fn sub(self, rhs: Self) -> Self {
                xfm(self, rhs, ops::Sub::sub)
            }
        }

        impl Point for [f64; $n] {
            fn all(v: f64) -> Self {
                [v; $n]
            }

            fn scale(self, scalar: f64) -> Self {
                self.map(|f| f * scalar)
            }

            fn xfm<F: Fn(f64, f64) -> f64>(self, b: Self, f: F) -> Self {
                std::array::from_fn(|i| f(self[i], b[i]))
            }
        }
    };
}

impl_point!(2);
impl_point!(3);

pub trait ToPoint2 {
    fn to_p2(self) -> Point2;
}

impl ToPoint2 for Point2 {
    fn to_p2(self) -> Point2 {
        self
    }
}
impl ToPoint2 for &Point2 {
    fn to_p2(self) -> Point2 {
        *self
    }
}
impl ToPoint2 for Point3 {
    fn to_p2(self) -> Point2 {
        let [x, y, _] = self;
        [x, y]
    }
}
impl ToPoint2 for &Point3 {
    fn to_p2(self) -> Point2 {
        (*self).to_p2()
    }
}

pub trait WithZ: ToPoint2 + Sized {
    fn with_z(self, z: f64) -> Point3 {
        let [x, y] = self.to_p2();
        [x, y, z]
    }
}

impl WithZ for Point2 {}
impl WithZ for Point3 {}

pub fn dot_prod(a: Point3, b: Point3) -> f64 {
    a.into_iter().zip(b).map(|(a, b)| a * b).sum()
}

#[allow(clippy::many_single_char_names)]
pub fn xprod(a: Point3, b: Point3) -> Point3 {
    let [ax, ay, az] = a;
    let [bx, by, bz] = b;
    let x = ay * bz - az * by;
    let y = az * bx - ax * bz;
    let z = ax * by - ay * bx;
    [x, y, z]
}

pub fn zero_len_xy(p: impl ToPoint2) -> bool {
    let [x, y] = p.to_p2();
    x.abs() < 1e-7 && y.abs() < 1e-7
}

/// Plan distance between two points.
pub fn dist_xy(a: impl ToPoint2, b: impl ToPoint2) -> f64 {
    a.to_p2().sub(b.to_p2()).mag()
}

/// Twice the signed plan area of the triangle `a, b, c`.
///
/// Positive if `c` lies left of `a -> b` (counter-clockwise), negative if right, zero if the
/// points are colinear.
pub fn orient2d(a: impl ToPoint2, b: impl ToPoint2, c: impl ToPoint2) -> f64 {
    let [ax, ay] = a.to_p2();
    let [bx, by] = b.to_p2();
    let [cx, cy] = c.to_p2();
    (bx - ax) * (cy - ay) - (by - ay) * (cx - ax)
}

/// Linear interpolation between `a` and `b` at ratio `t`.
pub fn lerp<P: Point + Add>(a: P, b: P, t: f64) -> P {
    a.add(b.sub(a).scale(t))
}

/// Helper function which effectively transforms to [`Point::xfm`].
#[inline(always)]
pub fn xfm<P: Point, F: Fn(f64, f64) -> f64>(a: P, b: P, f: F) -> P {
    P::xfm(a, b, f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_adding() {
        let p = [0.0, 1.0].add([3.0, 1.0]);
        assert_eq!(p, [3.0, 2.0]);

        let p = [0.0, 1.0, 5.0].add([3.0, 1.0, 5.0]);
        assert_eq!(p, [3.0, 2.0, 10.0]);
    }

    #[test]
    fn point_scaling() {
        let p = [0.0, 1.0].scale(2.0);
        assert_eq!(p, [0.0, 2.0]);

        let p = [-2.0, 0.5, 3.0].scale(-0.5);
        assert_eq!(p, [1.0, -0.25, -1.5]);
    }

    #[test]
    fn to_point_testing() {
        assert_eq!([0.0, 1.0].to_p2(), [0.0, 1.0]);
        assert_eq!([0.0, 1.0, 2.0].to_p2(), [0.0, 1.0]);
    }

    #[test]
    fn xproduct_test() {
        let v = xprod([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        assert_eq!(v, [0.0, 0.0, 1.0]);

        let v = xprod([1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]);
        assert_eq!(v, [0.0, -0.0, 2.0]);
    }

    #[test]
    fn plan_length() {
        assert_eq!(zero_len_xy([0.0, 0.0, 1.0]), true);
        assert_eq!(zero_len_xy([0.0, 1.0, 1.0]), false);
        assert_eq!(zero_len_xy([1.0, 0.0, 1.0]), false);
        assert_eq!(zero_len_xy([1.0, 1.0, 1.0]), false);
    }

    #[test]
    fn mag_testing() {
        let m = [3.0, 4.0].mag() - 5.0;
        assert!(m.abs() < 1e-11);

        let m = [3.0, -4.0].mag() - 5.0;
        assert!(m.abs() < 1e-11);

        let m = [-3.0, 4.0].mag() - 5.0;
        assert!(m.abs() < 1e-11);

        let m = [2.0, 3.0, 6.0].mag() - 7.0;
        assert!(m.abs() < 1e-11);

        let m = [2.0, -3.0, 6.0].mag() - 7.0;
        assert!(m.abs() < 1e-11);

        let m = [-2.0, -3.0, 6.0].mag() - 7.0;
        assert!(m.abs() < 1e-11);

        let m = [-2.0, -3.0, -6.0].mag() - 7.0;
        assert!(m.abs() < 1e-11);
    }

    #[test]
    fn orientation() {
        assert!(orient2d([0.0, 0.0], [1.0, 0.0], [0.5, 1.0]) > 0.0);
        assert!(orient2d([0.0, 0.0], [1.0, 0.0], [0.5, -1.0]) < 0.0);
        assert_eq!(orient2d([0.0, 0.0], [1.0, 1.0], [2.0, 2.0]), 0.0);
    }

    #[test]
    fn lerp_and_distance() {
        let p = lerp([0.0, 0.0, 0.0], [10.0, 20.0, 30.0], 0.25);
        assert_eq!(p, [2.5, 5.0, 7.5]);

        let d = dist_xy([1.0, 1.0, 100.0], [4.0, 5.0, -3.0]) - 5.0;
        assert!(d.abs() < 1e-11);
    }

    #[test]
    fn unit_vector() {
        let u = [2.0, 0.0].unit();
        assert_eq!(u, [1.0, 0.0]);

        let u = [0.0, 0.0, 2.0].unit();
        assert_eq!(u, [0.0, 0.0, 1.0]);
    }
}
