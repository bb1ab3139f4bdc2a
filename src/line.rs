use crate::*;

/// The intersection of segments `a1 -> a2` and `b1 -> b2`.
///
/// Returns the intersection point with the parametric positions along each segment
/// (`0..=1`). Parallel and colinear segments return `None`.
pub fn segment_intersection(
    a1: impl ToPoint2,
    a2: impl ToPoint2,
    b1: impl ToPoint2,
    b2: impl ToPoint2,
) -> Option<(Point2, f64, f64)> {
    let (a1, a2, b1, b2) = (a1.to_p2(), a2.to_p2(), b1.to_p2(), b2.to_p2());
    let r = a2.sub(a1);
    let s = b2.sub(b1);
    let den = r[0] * s[1] - r[1] * s[0];
    let scale = r.mag() * s.mag();
    if scale == 0.0 || den.abs() <= 1e-12 * scale {
        return None;
    }

    let d = b1.sub(a1);
    let t = (d[0] * s[1] - d[1] * s[0]) / den;
    let u = (d[0] * r[1] - d[1] * r[0]) / den;

    const T: f64 = 1e-12;
    if t < -T || t > 1.0 + T || u < -T || u > 1.0 + T {
        return None;
    }

    let t = t.clamp(0.0, 1.0);
    let u = u.clamp(0.0, 1.0);
    Some((a1.add(r.scale(t)), t, u))
}

/// Returns if segments `a1 -> a2` and `b1 -> b2` cross, excluding touching at the endpoints of
/// `a`.
///
/// This is the test used for interpolation barriers: a segment that merely starts or ends on a
/// barrier does not cross it.
pub fn segments_cross(
    a1: impl ToPoint2,
    a2: impl ToPoint2,
    b1: impl ToPoint2,
    b2: impl ToPoint2,
) -> bool {
    const T: f64 = 1e-9;
    match segment_intersection(a1, a2, b1, b2) {
        Some((_, t, _)) => t > T && t < 1.0 - T,
        None => false,
    }
}

/// The plan distance from `p` to the segment `a -> b`, and the parametric position of the
/// closest point along the segment.
pub fn dist_to_segment(p: impl ToPoint2, a: impl ToPoint2, b: impl ToPoint2) -> (f64, f64) {
    let (p, a, b) = (p.to_p2(), a.to_p2(), b.to_p2());
    let ab = b.sub(a);
    let len2 = ab[0] * ab[0] + ab[1] * ab[1];
    if len2 == 0.0 {
        return (dist_xy(p, a), 0.0);
    }
    let ap = p.sub(a);
    let t = ((ap[0] * ab[0] + ap[1] * ab[1]) / len2).clamp(0.0, 1.0);
    (dist_xy(p, a.add(ab.scale(t))), t)
}
