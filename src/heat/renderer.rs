use std::io::Cursor;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbaImage};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::interpolator::SpatialInterpolator;
use super::ramp::ColorRamp;
use crate::geometry::{Bounds, GeoPoint};

/// Alpha used for painted pixels unless configured otherwise
pub const DEFAULT_ALPHA: u8 = 200;

/// Largest raster a viewport may request (4096 x 4096).
pub const MAX_PIXELS: u64 = 4096 * 4096;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewportError {
    #[error("raster must be at least 1x1 pixels, got {width}x{height}")]
    EmptyRaster { width: u32, height: u32 },
    #[error("raster of {width}x{height} pixels exceeds the 4096x4096 limit")]
    TooLarge { width: u32, height: u32 },
    #[error("viewport bounds are inverted or empty")]
    InvertedBounds,
    #[error("viewport bounds must lie within lat [-90, 90] and lng [-180, 180]")]
    OutOfRange,
}

/// Visible map area and the pixel size of the raster drawn over it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    bounds: Bounds,
    width: u32,
    height: u32,
}

impl Viewport {
    pub fn new(bounds: Bounds, width: u32, height: u32) -> Result<Self, ViewportError> {
        if width == 0 || height == 0 {
            return Err(ViewportError::EmptyRaster { width, height });
        }
        match (width as u64).checked_mul(height as u64) {
            Some(pixels) if pixels <= MAX_PIXELS => {}
            _ => return Err(ViewportError::TooLarge { width, height }),
        }
        let world = Bounds::world();
        if !(world.contains(&GeoPoint::new(bounds.north, bounds.east))
            && world.contains(&GeoPoint::new(bounds.south, bounds.west)))
        {
            return Err(ViewportError::OutOfRange);
        }
        if !(bounds.lat_span() > 0.0 && bounds.lng_span() > 0.0) {
            return Err(ViewportError::InvertedBounds);
        }
        Ok(Self {
            bounds,
            width,
            height,
        })
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Geographic position of a pixel's top-left corner
    pub fn pixel_to_point(&self, x: u32, y: u32) -> GeoPoint {
        let lng = self.bounds.west + x as f64 / self.width as f64 * self.bounds.lng_span();
        let lat = self.bounds.north - y as f64 / self.height as f64 * self.bounds.lat_span();
        GeoPoint::new(lat, lng)
    }
}

/// RGBA pixels plus the bounds they cover.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    viewport: Viewport,
    pixels: Vec<u8>,
}

impl RasterBuffer {
    pub fn transparent(viewport: Viewport) -> Self {
        let len = viewport.width as usize * viewport.height as usize * 4;
        Self {
            viewport,
            pixels: vec![0; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.viewport.width
    }

    pub fn height(&self) -> u32 {
        self.viewport.height
    }

    pub fn bounds(&self) -> Bounds {
        self.viewport.bounds
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let offset = self.offset(x, y);
        let mut rgba = [0u8; 4];
        rgba.copy_from_slice(&self.pixels[offset..offset + 4]);
        Some(rgba)
    }

    pub fn painted_pixels(&self) -> usize {
        self.pixels.chunks_exact(4).filter(|px| px[3] != 0).count()
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let image = RgbaImage::from_raw(self.width(), self.height(), self.pixels.clone())
            .ok_or_else(|| anyhow!("raster buffer does not match its dimensions"))?;
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("failed to encode heat surface as PNG")?;
        Ok(bytes)
    }

    fn put(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let offset = self.offset(x, y);
        self.pixels[offset..offset + 4].copy_from_slice(&rgba);
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width() as usize + x as usize) * 4
    }
}

pub struct HeatSurfaceRenderer {
    ramp: ColorRamp,
    alpha: u8,
}

impl Default for HeatSurfaceRenderer {
    fn default() -> Self {
        Self::new(ColorRamp::default(), DEFAULT_ALPHA)
    }
}

impl HeatSurfaceRenderer {
    pub fn new(ramp: ColorRamp, alpha: u8) -> Self {
        Self { ramp, alpha }
    }

    pub fn ramp(&self) -> &ColorRamp {
        &self.ramp
    }

    /// Rasterize the interpolated field over `viewport`. Pixels without a
    /// value stay fully transparent.
    pub fn render(&self, viewport: &Viewport, interpolator: &SpatialInterpolator) -> RasterBuffer {
        let start = Instant::now();
        let mut raster = RasterBuffer::transparent(*viewport);
        if interpolator.grid().is_empty() {
            return raster;
        }

        for y in 0..viewport.height {
            for x in 0..viewport.width {
                let point = viewport.pixel_to_point(x, y);
                if let Some(value) = interpolator.value_at_point(&point) {
                    let [r, g, b] = self.ramp.color_for(value);
                    raster.put(x, y, [r, g, b, self.alpha]);
                }
            }
        }

        debug!(
            width = viewport.width,
            height = viewport.height,
            painted = raster.painted_pixels(),
            duration_ms = start.elapsed().as_secs_f64() * 1_000.0,
            "heat surface rendered"
        );
        raster
    }
}
