//! Lattice-snapped inverse-distance interpolation.
//!
//! Samples are snapped onto a `size x size` lattice covering the whole globe
//! (columns follow longitude eastwards, rows follow latitude southwards). Queries
//! only ever look at a bounded neighbourhood of cells, so their cost does not
//! depend on the number of samples.

use serde::{Deserialize, Serialize};

use super::Sample;
use crate::geometry::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterpolationSettings {
    pub grid_size: u32,
    pub fallback_radius: u32,
    /// Added to corner distances before inverting
    pub epsilon: f64,
    /// Added to offset distances in the fallback scan
    pub fallback_epsilon: f64,
}

impl Default for InterpolationSettings {
    fn default() -> Self {
        Self {
            grid_size: 50,
            fallback_radius: 3,
            epsilon: 0.01,
            fallback_epsilon: 0.1,
        }
    }
}

/// Integer lattice cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPos {
    pub x: u32,
    pub y: u32,
}

/// Dense lattice of the last sample value written to each cell.
#[derive(Debug, Clone)]
pub struct SampleGrid {
    size: u32,
    cells: Vec<Option<f64>>,
    occupied: usize,
}

impl SampleGrid {
    /// Later samples overwrite earlier ones in the same cell. Non-finite
    /// values are skipped.
    pub fn build(size: u32, samples: &[Sample]) -> Self {
        let size = size.max(1);
        let mut grid = Self {
            size,
            cells: vec![None; (size as usize) * (size as usize)],
            occupied: 0,
        };
        for sample in samples {
            if !sample.value.is_finite() {
                continue;
            }
            let pos = grid.cell_of(&sample.point());
            let index = grid.index(pos);
            if grid.cells[index].is_none() {
                grid.occupied += 1;
            }
            grid.cells[index] = Some(sample.value);
        }
        grid
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Continuous lattice coordinates of a point
    pub fn coords_of(&self, point: &GeoPoint) -> (f64, f64) {
        let size = self.size as f64;
        let gx = (point.lng + 180.0) / 360.0 * size;
        let gy = (90.0 - point.lat) / 180.0 * size;
        (gx, gy)
    }

    /// Cell a point snaps to. Points on the east or south edge land in the
    /// last column or row.
    pub fn cell_of(&self, point: &GeoPoint) -> CellPos {
        let (gx, gy) = self.coords_of(point);
        let last = (self.size - 1) as f64;
        CellPos {
            x: gx.floor().clamp(0.0, last) as u32,
            y: gy.floor().clamp(0.0, last) as u32,
        }
    }

    /// Value stored at a signed cell coordinate; `None` outside the lattice.
    pub fn get(&self, x: i64, y: i64) -> Option<f64> {
        let size = self.size as i64;
        if x < 0 || y < 0 || x >= size || y >= size {
            return None;
        }
        self.cells[(y * size + x) as usize]
    }

    fn index(&self, pos: CellPos) -> usize {
        pos.y as usize * self.size as usize + pos.x as usize
    }
}

#[derive(Debug, Clone)]
pub struct SpatialInterpolator {
    grid: SampleGrid,
    settings: InterpolationSettings,
}

impl SpatialInterpolator {
    pub fn new(settings: InterpolationSettings, samples: &[Sample]) -> Self {
        Self {
            grid: SampleGrid::build(settings.grid_size, samples),
            settings,
        }
    }

    pub fn grid(&self) -> &SampleGrid {
        &self.grid
    }

    pub fn settings(&self) -> &InterpolationSettings {
        &self.settings
    }

    pub fn value_at_point(&self, point: &GeoPoint) -> Option<f64> {
        let (gx, gy) = self.grid.coords_of(point);
        self.value_at(gx, gy)
    }

    /// Interpolated value at continuous lattice coordinates, or `None` when no
    /// sample lies within the fallback radius.
    pub fn value_at(&self, gx: f64, gy: f64) -> Option<f64> {
        if self.grid.is_empty() || !gx.is_finite() || !gy.is_finite() {
            return None;
        }
        // nothing beyond the fallback reach of the lattice can have data
        let reach = self.settings.fallback_radius as f64 + 1.0;
        let limit = self.grid.size() as f64 + reach;
        if gx < -reach || gy < -reach || gx > limit || gy > limit {
            return None;
        }

        let x0 = gx.floor() as i64;
        let y0 = gy.floor() as i64;
        let x1 = gx.ceil() as i64;
        let y1 = gy.ceil() as i64;
        // integer coordinates collapse floor and ceil onto one cell
        let xs = [x0, x1];
        let ys = [y0, y1];
        let x_count = if x0 == x1 { 1 } else { 2 };
        let y_count = if y0 == y1 { 1 } else { 2 };

        let mut weighted = WeightedMean::default();
        for &y in &ys[..y_count] {
            for &x in &xs[..x_count] {
                if let Some(value) = self.grid.get(x, y) {
                    let distance = (gx - x as f64).hypot(gy - y as f64);
                    weighted.add(value, 1.0 / (distance + self.settings.epsilon));
                }
            }
        }
        if let Some(value) = weighted.mean() {
            return Some(value);
        }

        let radius = self.settings.fallback_radius as i64;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if let Some(value) = self.grid.get(x0 + dx, y0 + dy) {
                    let distance = (dx as f64).hypot(dy as f64);
                    weighted.add(value, 1.0 / (distance + self.settings.fallback_epsilon));
                }
            }
        }
        weighted.mean()
    }
}

#[derive(Default)]
struct WeightedMean {
    sum: f64,
    weight: f64,
}

impl WeightedMean {
    fn add(&mut self, value: f64, weight: f64) {
        self.sum += value * weight;
        self.weight += weight;
    }

    fn mean(&self) -> Option<f64> {
        if self.weight > 0.0 {
            Some(self.sum / self.weight)
        } else {
            None
        }
    }
}
