use super::GeoPoint;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const SQUARE_METERS_PER_HECTARE: f64 = 10_000.0;

/// Area enclosed by the ring on a spherical Earth, in hectares.
///
/// Line-integral approximation; valid for rings that neither contain a pole nor
/// cross the antimeridian. Rings with fewer than three vertices have no area.
pub fn geodesic_area_hectares(points: &[GeoPoint]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }

    let mut sum = 0.0;
    for i in 0..n {
        let a = &points[i];
        let b = &points[(i + 1) % n];
        let lat1 = a.lat.to_radians();
        let lat2 = b.lat.to_radians();
        let lng1 = a.lng.to_radians();
        let lng2 = b.lng.to_radians();
        sum += (lng2 - lng1) * (2.0 + lat1.sin() + lat2.sin());
    }

    let square_meters = (sum * EARTH_RADIUS_M * EARTH_RADIUS_M / 2.0).abs();
    square_meters / SQUARE_METERS_PER_HECTARE
}
