//! Heat surface - sparse samples to an interpolated, colour-mapped raster

mod interpolator;
mod ramp;
mod renderer;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::geometry::GeoPoint;
use crate::store::Territory;

pub use interpolator::{CellPos, InterpolationSettings, SampleGrid, SpatialInterpolator};
pub use ramp::{ColorRamp, ColorStop, RampError, RampMode, Rgb};
pub use renderer::{
    HeatSurfaceRenderer, RasterBuffer, Viewport, ViewportError, DEFAULT_ALPHA, MAX_PIXELS,
};

/// One externally sourced measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub lat: f64,
    pub lng: f64,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Sample {
    pub fn new(lat: f64, lng: f64, value: f64) -> Self {
        Self {
            lat,
            lng,
            value,
            location: None,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl SampleStats {
    pub fn of(samples: &[Sample]) -> Option<Self> {
        let mut values = samples.iter().map(|s| s.value).filter(|v| v.is_finite());
        let first = values.next()?;
        let mut stats = Self {
            count: 1,
            min: first,
            max: first,
            mean: 0.0,
        };
        let mut sum = first;
        for value in values {
            stats.count += 1;
            stats.min = stats.min.min(value);
            stats.max = stats.max.max(value);
            sum += value;
        }
        stats.mean = sum / stats.count as f64;
        Some(stats)
    }
}

pub fn nearest_sample<'a>(samples: &'a [Sample], point: &GeoPoint) -> Option<&'a Sample> {
    samples.iter().min_by(|a, b| {
        a.point()
            .degree_distance(point)
            .total_cmp(&b.point().degree_distance(point))
    })
}

/// Value of the sample closest to the territory's centroid.
pub fn territory_reading(territory: &Territory, samples: &[Sample]) -> Option<f64> {
    let centroid = territory.centroid()?;
    nearest_sample(samples, &centroid).map(|sample| sample.value)
}

/// Immutable view of one sample batch; renders without touching the layer.
#[derive(Clone)]
pub struct HeatSurface {
    renderer: Arc<HeatSurfaceRenderer>,
    interpolator: Arc<SpatialInterpolator>,
}

impl HeatSurface {
    pub fn render(&self, viewport: &Viewport) -> RasterBuffer {
        self.renderer.render(viewport, &self.interpolator)
    }
}

/// Current sample batch with its interpolator, ready to render any viewport.
pub struct HeatLayer {
    settings: InterpolationSettings,
    renderer: Arc<HeatSurfaceRenderer>,
    samples: Vec<Sample>,
    interpolator: Arc<SpatialInterpolator>,
}

impl HeatLayer {
    pub fn new(settings: InterpolationSettings, renderer: HeatSurfaceRenderer) -> Self {
        Self {
            settings,
            renderer: Arc::new(renderer),
            samples: Vec::new(),
            interpolator: Arc::new(SpatialInterpolator::new(settings, &[])),
        }
    }

    /// Swap in a new batch; the lattice is rebuilt from scratch.
    pub fn replace_samples(&mut self, samples: Vec<Sample>) {
        self.interpolator = Arc::new(SpatialInterpolator::new(self.settings, &samples));
        info!(
            samples = samples.len(),
            cells = self.interpolator.grid().occupied(),
            "heat samples replaced"
        );
        self.samples = samples;
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn stats(&self) -> Option<SampleStats> {
        SampleStats::of(&self.samples)
    }

    pub fn interpolator(&self) -> &SpatialInterpolator {
        &self.interpolator
    }

    /// Cheap handle on the current batch, safe to render on another thread.
    pub fn surface(&self) -> HeatSurface {
        HeatSurface {
            renderer: Arc::clone(&self.renderer),
            interpolator: Arc::clone(&self.interpolator),
        }
    }

    pub fn render(&self, viewport: &Viewport) -> RasterBuffer {
        self.surface().render(viewport)
    }
}
