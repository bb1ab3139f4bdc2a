use crate::*;

pub type Extents2 = Extents<Point2>;
pub type Extents3 = Extents<Point3>;

/// An axis aligned box, stored as its minimum corner and its size.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Extents<P> {
    pub origin: P,
    pub size: P,
}

impl<P> Extents<P>
where
    P: Copy + Point + Add,
{
    pub fn zero() -> Self {
        Self {
            origin: P::zero(),
            size: P::zero(),
        }
    }

    pub fn from_min_max(min: P, max: P) -> Self {
        Self {
            origin: min,
            size: max.sub(min),
        }
    }

    pub fn max(&self) -> P {
        self.origin.add(self.size)
    }

    /// Returns if every side has a positive, finite length.
    pub fn is_proper(&self) -> bool {
        self.size.into_iter().all(|s| s.is_finite() && s > 0.0)
    }

    /// Expand the extents by a value on every side.
    ///
    /// A negative value shrinks the extents, and shrinking past a zero size gives
    /// [`Self::zero`]. Non-finite values leave the extents unchanged.
    ///
    /// # Example
    /// ```rust
    /// # use geosurf::*;
    /// let e = Extents2::from_min_max([0.0, 0.0], [10.0, 4.0]);
    ///
    /// assert_eq!(e.expand(1.0), Extents2::from_min_max([-1.0, -1.0], [11.0, 5.0]));
    /// assert_eq!(e.expand(-3.0), Extents2::zero());
    /// ```
    pub fn expand(self, by: f64) -> Self {
        if !by.is_finite() {
            return self;
        }
        let d = P::all(by);
        let size = self.size.add(d.scale(2.0));
        if size.into_iter().any(|s| s < 0.0) {
            return Self::zero();
        }
        Self {
            origin: self.origin.sub(d),
            size,
        }
    }
}

impl Extents3 {
    /// The 8 corners of the box, bottom face first.
    pub fn corners(&self) -> [Point3; 8] {
        let [x0, y0, z0] = self.origin;
        let [x1, y1, z1] = self.max();
        [
            [x0, y0, z0],
            [x1, y0, z0],
            [x1, y1, z0],
            [x0, y1, z0],
            [x0, y0, z1],
            [x1, y0, z1],
            [x1, y1, z1],
            [x0, y1, z1],
        ]
    }
}

impl From<Extents3> for Extents2 {
    /// The plan footprint.
    fn from(Extents { origin, size }: Extents3) -> Self {
        Self {
            origin: origin.to_p2(),
            size: size.to_p2(),
        }
    }
}

/// The bounds of the points, or [`Extents::zero`] if there are none.
impl<P> FromIterator<P> for Extents<P>
where
    P: Copy + Point + Add,
{
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = P>,
    {
        let mut iter = iter.into_iter();
        match iter.next() {
            Some(p) => {
                let (min, max) = iter.fold((p, p), |(lo, hi), p| (lo.min_all(p), hi.max_all(p)));
                Self::from_min_max(min, max)
            }
            None => Self::zero(),
        }
    }
}

/// Inclusive on every side.
impl<P> Envelops<P> for Extents<P>
where
    P: Copy + Point + Add,
{
    fn envelops(&self, p: P) -> bool {
        let lo = self.origin.into_iter().zip(p).all(|(o, v)| v >= o);
        lo && self.max().into_iter().zip(p).all(|(m, v)| v <= m)
    }
}

/// Objects with an axis aligned bounding box.
pub trait Aabb {
    type Space;

    fn aabb(&self) -> Extents<Self::Space>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;

    #[quickcheck]
    fn footprint_drops_z(a: (f64, f64, f64), b: (f64, f64, f64)) -> TestResult {
        let (a, b) = ([a.0, a.1, a.2], [b.0, b.1, b.2]);
        if a.iter().chain(&b).any(|v| !v.is_finite()) {
            return TestResult::discard();
        }
        let e3 = Extents3::from_iter([a, b]);
        let e2 = Extents2::from(e3);
        TestResult::from_bool(e2.origin == e3.origin.to_p2() && e2.size == e3.size.to_p2())
    }

    #[test]
    fn bounds_of_points() {
        let e: Extents2 = vec![[3.0, -1.0], [0.5, 4.0], [2.0, 2.0]].into_iter().collect();
        assert_eq!(e.origin, [0.5, -1.0]);
        assert_eq!(e.max(), [3.0, 4.0]);
        assert!(e.is_proper());

        let e: Extents3 = std::iter::empty::<Point3>().collect();
        assert_eq!(e, Extents3::zero());
        assert!(!e.is_proper());
    }

    #[test]
    fn envelops_inclusive() {
        let e = Extents2::from_min_max([0.0, 0.0], [2.0, 1.0]);
        assert!(e.envelops([0.0, 0.0]));
        assert!(e.envelops([2.0, 1.0]));
        assert!(e.envelops([1.0, 0.5]));
        assert!(!e.envelops([2.01, 0.5]));
        assert!(!e.envelops([1.0, -0.01]));

        let e = Extents3::from_min_max([0.0; 3], [1.0; 3]);
        assert!(!e.envelops([0.5, 0.5, 1.5]));
    }

    #[test]
    fn box_corners() {
        let b = Extents3::from_min_max([0.0, 1.0, 2.0], [3.0, 4.0, 5.0]);
        let cs = b.corners();
        assert_eq!(cs[0], [0.0, 1.0, 2.0]);
        assert_eq!(cs[6], [3.0, 4.0, 5.0]);
        assert_eq!(Extents3::from_iter(cs), b);
    }

    #[test]
    fn expanding() {
        let e = Extents2::from_min_max([0.0, 0.0], [1.0, 1.0]);
        assert_eq!(
            e.expand(0.5),
            Extents2 {
                origin: [-0.5, -0.5],
                size: [2.0, 2.0]
            }
        );
        assert_eq!(
            e.expand(-0.25),
            Extents2 {
                origin: [0.25, 0.25],
                size: [0.5, 0.5],
            }
        );
        assert_eq!(e.expand(-0.8), Extents2::zero());
        assert_eq!(e.expand(f64::NAN), e);
    }
}
