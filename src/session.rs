//! Polygon edit session - the command/query controller behind the territory editor.
//!
//! Every mutation recomputes the derived [`ValiditySignal`] from the current vertex
//! list, so a burst of drag events simply overwrites the previous result.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::geometry::{geodesic_area_hectares, is_self_intersecting, GeoPoint, Polygon};
use crate::store::TerritoryId;

/// Minimum vertex count of a closed territory ring.
pub const MIN_VERTICES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "mode", content = "territoryId")]
pub enum EditMode {
    Idle,
    Drawing,
    Editing(TerritoryId),
}

/// Live feedback consumed by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValiditySignal {
    pub is_valid: bool,
    pub self_intersecting: bool,
    pub area_hectares: f64,
    pub vertex_count: usize,
}

impl ValiditySignal {
    pub fn evaluate(points: &[GeoPoint]) -> Self {
        let self_intersecting = is_self_intersecting(points);
        let vertex_count = points.len();
        Self {
            is_valid: vertex_count >= MIN_VERTICES && !self_intersecting,
            self_intersecting,
            area_hectares: geodesic_area_hectares(points),
            vertex_count,
        }
    }

    fn empty() -> Self {
        Self::evaluate(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error("vertices can only be added while drawing")]
    NotDrawing,
    #[error("no territory is being drawn or edited")]
    Inactive,
    #[error("vertex index {index} out of range for {len} vertices")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("a territory must keep at least 3 vertices")]
    TooFewVertices,
    #[error("at least 3 vertices are required, got {count}")]
    InsufficientVertices { count: usize },
    #[error("territory boundary crosses itself")]
    SelfIntersecting,
}

/// Result of a successful [`PolygonEditSession::finalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedPolygon {
    pub polygon: Polygon,
    pub area_hectares: f64,
    /// Set when the session was editing a saved territory
    pub territory: Option<TerritoryId>,
}

#[derive(Debug, Clone)]
pub struct PolygonEditSession {
    mode: EditMode,
    points: Vec<GeoPoint>,
    signal: ValiditySignal,
}

impl Default for PolygonEditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PolygonEditSession {
    pub fn new() -> Self {
        Self {
            mode: EditMode::Idle,
            points: Vec::new(),
            signal: ValiditySignal::empty(),
        }
    }

    /// Start drawing a fresh territory, dropping anything uncommitted.
    pub fn start_drawing(&mut self) -> ValiditySignal {
        self.mode = EditMode::Drawing;
        self.points.clear();
        self.refresh()
    }

    /// Load a saved territory's ring for vertex dragging.
    pub fn edit(&mut self, territory: TerritoryId, polygon: &Polygon) -> ValiditySignal {
        self.mode = EditMode::Editing(territory);
        self.points = polygon.points().to_vec();
        self.refresh()
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn signal(&self) -> ValiditySignal {
        self.signal
    }

    pub fn add_vertex(&mut self, point: GeoPoint) -> Result<ValiditySignal, EditError> {
        if self.mode != EditMode::Drawing {
            return Err(EditError::NotDrawing);
        }
        self.points.push(point);
        Ok(self.refresh())
    }

    pub fn move_vertex(
        &mut self,
        index: usize,
        point: GeoPoint,
    ) -> Result<ValiditySignal, EditError> {
        self.ensure_active()?;
        let len = self.points.len();
        let slot = self
            .points
            .get_mut(index)
            .ok_or(EditError::IndexOutOfRange { index, len })?;
        *slot = point;
        Ok(self.refresh())
    }

    pub fn remove_vertex(&mut self, index: usize) -> Result<ValiditySignal, EditError> {
        self.ensure_active()?;
        let len = self.points.len();
        if index >= len {
            return Err(EditError::IndexOutOfRange { index, len });
        }
        if len - 1 < MIN_VERTICES {
            return Err(EditError::TooFewVertices);
        }
        self.points.remove(index);
        Ok(self.refresh())
    }

    /// Commit the current ring. On failure the session keeps its vertices so the
    /// user can continue editing.
    pub fn finalize(&mut self) -> Result<FinalizedPolygon, EditError> {
        self.ensure_active()?;
        let count = self.points.len();
        if count < MIN_VERTICES {
            return Err(EditError::InsufficientVertices { count });
        }
        if self.signal.self_intersecting {
            return Err(EditError::SelfIntersecting);
        }

        let territory = match self.mode {
            EditMode::Editing(id) => Some(id),
            _ => None,
        };
        let area_hectares = self.signal.area_hectares;
        let polygon = Polygon::new(std::mem::take(&mut self.points));
        self.mode = EditMode::Idle;
        self.refresh();
        debug!(vertices = count, area_hectares, "polygon finalized");

        Ok(FinalizedPolygon {
            polygon,
            area_hectares,
            territory,
        })
    }

    /// Drop uncommitted vertices and return to idle.
    pub fn cancel(&mut self) -> ValiditySignal {
        self.mode = EditMode::Idle;
        self.points.clear();
        self.refresh()
    }

    fn ensure_active(&self) -> Result<(), EditError> {
        match self.mode {
            EditMode::Idle => Err(EditError::Inactive),
            EditMode::Drawing | EditMode::Editing(_) => Ok(()),
        }
    }

    fn refresh(&mut self) -> ValiditySignal {
        self.signal = ValiditySignal::evaluate(&self.points);
        self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawing_with(coords: &[(f64, f64)]) -> PolygonEditSession {
        let mut session = PolygonEditSession::new();
        session.start_drawing();
        for &(lat, lng) in coords {
            session.add_vertex(GeoPoint::new(lat, lng)).unwrap();
        }
        session
    }

    #[test]
    fn add_vertex_requires_drawing_mode() {
        let mut session = PolygonEditSession::new();
        assert_eq!(
            session.add_vertex(GeoPoint::new(0.0, 0.0)),
            Err(EditError::NotDrawing)
        );
    }

    #[test]
    fn signal_tracks_vertex_count() {
        let mut session = drawing_with(&[(0.0, 0.0), (0.0, 1.0)]);
        let signal = session.signal();
        assert_eq!(signal.vertex_count, 2);
        assert!(!signal.is_valid);
        assert_eq!(signal.area_hectares, 0.0);

        let signal = session.add_vertex(GeoPoint::new(1.0, 1.0)).unwrap();
        assert_eq!(signal.vertex_count, 3);
        assert!(signal.is_valid);
        assert!(signal.area_hectares > 0.0);
    }

    #[test]
    fn remove_vertex_keeps_three() {
        let mut session = drawing_with(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
        assert!(session.remove_vertex(3).is_ok());
        assert_eq!(session.remove_vertex(0), Err(EditError::TooFewVertices));
        assert_eq!(session.points().len(), 3);
    }

    #[test]
    fn move_vertex_out_of_range() {
        let mut session = drawing_with(&[(0.0, 0.0)]);
        assert_eq!(
            session.move_vertex(4, GeoPoint::new(1.0, 1.0)),
            Err(EditError::IndexOutOfRange { index: 4, len: 1 })
        );
        assert!(session.move_vertex(0, GeoPoint::new(1.0, 1.0)).is_ok());
    }

    #[test]
    fn finalize_rejects_short_rings() {
        let mut session = drawing_with(&[(0.0, 0.0), (0.0, 1.0)]);
        assert_eq!(
            session.finalize(),
            Err(EditError::InsufficientVertices { count: 2 })
        );
        assert_eq!(session.mode(), EditMode::Drawing);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut session = drawing_with(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        let first = session.cancel();
        let second = session.cancel();
        assert_eq!(first, second);
        assert_eq!(session.mode(), EditMode::Idle);
        assert!(session.points().is_empty());
    }

    #[test]
    fn editing_a_saved_territory() {
        let polygon = Polygon::new(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 1.0),
            GeoPoint::new(1.0, 1.0),
        ]);
        let id = TerritoryId::from_raw(7);
        let mut session = PolygonEditSession::new();
        session.edit(id, &polygon);

        assert_eq!(
            session.add_vertex(GeoPoint::new(2.0, 2.0)),
            Err(EditError::NotDrawing)
        );
        session.move_vertex(2, GeoPoint::new(2.0, 2.0)).unwrap();

        let finalized = session.finalize().unwrap();
        assert_eq!(finalized.territory, Some(id));
        assert_eq!(finalized.polygon.points()[2], GeoPoint::new(2.0, 2.0));
        assert_eq!(session.mode(), EditMode::Idle);
    }
}
