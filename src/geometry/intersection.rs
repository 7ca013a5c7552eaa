//! Simple-polygon check for interactively drawn rings.
//!
//! Vertices are projected onto a plane with `x = lng`, `y = lat`. Two edges
//! intersect only when they properly cross: the endpoints of each edge lie
//! strictly on opposite sides of the other edge's line. Any orientation of zero
//! breaks the tie towards "no crossing", so
//!
//! * a zero-length edge (two consecutive identical vertices) never intersects
//!   anything;
//! * a vertex resting exactly on another edge is not a crossing;
//! * collinear overlapping edges are not reported either. A ring that folds
//!   back onto itself along a straight line is therefore accepted.
//!
//! Rings crossing the antimeridian are not supported.

use std::cmp::Ordering;

use super::GeoPoint;

/// Sign of the turn `a -> b -> c`: `Greater` when `c` is counter-clockwise of
/// the directed line `a -> b`, `Equal` when collinear.
fn orientation(a: &GeoPoint, b: &GeoPoint, c: &GeoPoint) -> Ordering {
    let lhs = (c.lat - a.lat) * (b.lng - a.lng);
    let rhs = (b.lat - a.lat) * (c.lng - a.lng);
    lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal)
}

fn opposite_sides(first: Ordering, second: Ordering) -> bool {
    matches!(
        (first, second),
        (Ordering::Less, Ordering::Greater) | (Ordering::Greater, Ordering::Less)
    )
}

/// Proper crossing of segment `p1-p2` with segment `p3-p4`.
pub fn segments_cross(p1: &GeoPoint, p2: &GeoPoint, p3: &GeoPoint, p4: &GeoPoint) -> bool {
    opposite_sides(orientation(p3, p4, p1), orientation(p3, p4, p2))
        && opposite_sides(orientation(p1, p2, p3), orientation(p1, p2, p4))
}

/// Whether the closed ring through `points` crosses itself.
///
/// Fewer than four vertices can never cross. O(n²) in the vertex count.
pub fn is_self_intersecting(points: &[GeoPoint]) -> bool {
    let n = points.len();
    if n < 4 {
        return false;
    }

    for i in 0..n {
        for j in (i + 2)..n {
            // first and last edges share vertex 0
            if i == 0 && j == n - 1 {
                continue;
            }
            let p1 = &points[i];
            let p2 = &points[(i + 1) % n];
            let p3 = &points[j];
            let p4 = &points[(j + 1) % n];
            if segments_cross(p1, p2, p3, p4) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(coords: &[(f64, f64)]) -> Vec<GeoPoint> {
        coords
            .iter()
            .map(|&(lat, lng)| GeoPoint::new(lat, lng))
            .collect()
    }

    #[test]
    fn triangles_never_intersect() {
        let triangles = [
            ring(&[(0.0, 0.0), (0.0, 1.0), (1.0, 0.0)]),
            ring(&[(10.0, 10.0), (-5.0, 3.0), (7.5, -20.0)]),
            ring(&[(45.1, 7.2), (45.2, 7.25), (45.05, 7.4)]),
        ];
        for triangle in &triangles {
            assert!(!is_self_intersecting(triangle));
        }
    }

    #[test]
    fn square_is_simple() {
        let square = ring(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
        assert!(!is_self_intersecting(&square));
    }

    #[test]
    fn bowtie_is_detected() {
        // square with its second and third vertices exchanged
        let bowtie = ring(&[(0.0, 0.0), (1.0, 1.0), (0.0, 1.0), (1.0, 0.0)]);
        assert!(is_self_intersecting(&bowtie));
    }

    #[test]
    fn concave_ring_is_simple() {
        let arrow = ring(&[
            (0.0, 0.0),
            (0.0, 4.0),
            (4.0, 4.0),
            (2.0, 2.0),
            (4.0, 0.0),
        ]);
        assert!(!is_self_intersecting(&arrow));
    }

    #[test]
    fn crossing_between_distant_edges() {
        // the last edge cuts back across the first two
        let zigzag = ring(&[
            (0.0, 0.0),
            (0.0, 4.0),
            (2.0, 4.0),
            (2.0, 2.0),
            (-1.0, 2.0),
        ]);
        assert!(is_self_intersecting(&zigzag));
    }

    #[test]
    fn zero_length_edges_do_not_cross() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 1.0);
        let c = GeoPoint::new(0.0, 1.0);
        assert!(!segments_cross(&a, &a, &b, &c));

        let duplicated = ring(&[(0.0, 0.0), (0.0, 1.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
        assert!(!is_self_intersecting(&duplicated));
    }

    #[test]
    fn touching_vertex_is_not_a_crossing() {
        let p1 = GeoPoint::new(0.0, 0.0);
        let p2 = GeoPoint::new(0.0, 2.0);
        let p3 = GeoPoint::new(0.0, 1.0);
        let p4 = GeoPoint::new(1.0, 1.0);
        assert!(!segments_cross(&p1, &p2, &p3, &p4));
    }
}
