//! Geographic value types - vertices, rings and bounding boxes

mod area;
mod intersection;

use serde::{Deserialize, Serialize};

pub use area::{geodesic_area_hectares, EARTH_RADIUS_M, SQUARE_METERS_PER_HECTARE};
pub use intersection::{is_self_intersecting, segments_cross};

/// A vertex in degrees. Serialized as `[lat, lng]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Planar distance in degrees, good enough for nearest-sample lookups
    pub fn degree_distance(&self, other: &GeoPoint) -> f64 {
        let dlat = self.lat - other.lat;
        let dlng = self.lng - other.lng;
        (dlat * dlat + dlng * dlng).sqrt()
    }
}

impl From<[f64; 2]> for GeoPoint {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(value: GeoPoint) -> Self {
        [value.lat, value.lng]
    }
}

/// Ordered vertex list interpreted as a closed ring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    points: Vec<GeoPoint>,
}

impl Polygon {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> Vec<GeoPoint> {
        self.points
    }

    pub fn area_hectares(&self) -> f64 {
        geodesic_area_hectares(&self.points)
    }

    pub fn is_self_intersecting(&self) -> bool {
        is_self_intersecting(&self.points)
    }

    /// Vertex average; `None` for an empty ring
    pub fn centroid(&self) -> Option<GeoPoint> {
        if self.points.is_empty() {
            return None;
        }
        let n = self.points.len() as f64;
        let lat = self.points.iter().map(|p| p.lat).sum::<f64>() / n;
        let lng = self.points.iter().map(|p| p.lng).sum::<f64>() / n;
        Some(GeoPoint::new(lat, lng))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::enclosing(&self.points)
    }
}

/// Axis-aligned lat/lng box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    pub fn world() -> Self {
        Self::new(90.0, -90.0, 180.0, -180.0)
    }

    pub fn enclosing(points: &[GeoPoint]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Self::new(first.lat, first.lat, first.lng, first.lng);
        for point in &points[1..] {
            bounds.north = bounds.north.max(point.lat);
            bounds.south = bounds.south.min(point.lat);
            bounds.east = bounds.east.max(point.lng);
            bounds.west = bounds.west.min(point.lng);
        }
        Some(bounds)
    }

    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    pub fn lng_span(&self) -> f64 {
        self.east - self.west
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat <= self.north
            && point.lat >= self.south
            && point.lng <= self.east
            && point.lng >= self.west
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_point_serializes_as_pair() {
        let point = GeoPoint::new(51.5, -0.13);
        let json = serde_json::to_string(&point).unwrap();
        assert_eq!(json, "[51.5,-0.13]");

        let back: GeoPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn polygon_centroid_and_bounds() {
        let polygon = Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 2.0),
            GeoPoint::new(2.0, 2.0),
            GeoPoint::new(2.0, 0.0),
        ]);

        let centroid = polygon.centroid().unwrap();
        assert_eq!(centroid, GeoPoint::new(1.0, 1.0));

        let bounds = polygon.bounds().unwrap();
        assert_eq!(bounds, Bounds::new(2.0, 0.0, 2.0, 0.0));
        assert!(bounds.contains(&centroid));
        assert!(!bounds.contains(&GeoPoint::new(3.0, 1.0)));
    }

    #[test]
    fn empty_polygon_has_no_centroid() {
        let polygon = Polygon::default();
        assert!(polygon.is_empty());
        assert!(polygon.centroid().is_none());
        assert!(polygon.bounds().is_none());
        assert_eq!(polygon.area_hectares(), 0.0);
    }
}
