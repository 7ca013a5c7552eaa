use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Rgb = [u8; 3];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampMode {
    /// Colour of the highest breakpoint not above the value
    #[default]
    Step,
    /// Blend between the two surrounding breakpoints
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub value: f64,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RampError {
    #[error("colour ramp needs at least one breakpoint")]
    Empty,
    #[error("breakpoint {index} is not above the previous one")]
    Unordered { index: usize },
}

/// Ordered value-to-colour mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    stops: Vec<ColorStop>,
    mode: RampMode,
}

impl ColorRamp {
    pub fn new(stops: Vec<ColorStop>, mode: RampMode) -> Result<Self, RampError> {
        if stops.is_empty() {
            return Err(RampError::Empty);
        }
        for (index, pair) in stops.windows(2).enumerate() {
            if !(pair[1].value > pair[0].value) {
                return Err(RampError::Unordered { index: index + 1 });
            }
        }
        Ok(Self { stops, mode })
    }

    /// Air temperature in °C, from navy below -20 to crimson from 40 upwards.
    pub fn temperature(mode: RampMode) -> Self {
        const STOPS: [(f64, Rgb); 12] = [
            (-30.0, [0x00, 0x00, 0x80]),
            (-20.0, [0x00, 0x00, 0xCD]),
            (-10.0, [0x41, 0x69, 0xE1]),
            (0.0, [0x1E, 0x90, 0xFF]),
            (5.0, [0x00, 0xBF, 0xFF]),
            (10.0, [0x87, 0xCE, 0xEB]),
            (15.0, [0x98, 0xFB, 0x98]),
            (20.0, [0xFF, 0xD7, 0x00]),
            (25.0, [0xFF, 0xA5, 0x00]),
            (30.0, [0xFF, 0x8C, 0x00]),
            (35.0, [0xFF, 0x45, 0x00]),
            (40.0, [0xDC, 0x14, 0x3C]),
        ];
        Self {
            stops: STOPS
                .iter()
                .map(|&(value, color)| ColorStop { value, color })
                .collect(),
            mode,
        }
    }

    pub fn mode(&self) -> RampMode {
        self.mode
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    pub fn color_for(&self, value: f64) -> Rgb {
        let first = self.stops[0];
        let last = self.stops[self.stops.len() - 1];
        if value.is_nan() || value <= first.value {
            return first.color;
        }
        if value >= last.value {
            return last.color;
        }

        // first stop strictly above the value; exists because value < last
        let upper = self.stops.partition_point(|stop| stop.value <= value);
        let lower = self.stops[upper - 1];
        match self.mode {
            RampMode::Step => lower.color,
            RampMode::Linear => {
                let upper = self.stops[upper];
                let t = (value - lower.value) / (upper.value - lower.value);
                let mut color = [0u8; 3];
                for (channel, out) in color.iter_mut().enumerate() {
                    let a = lower.color[channel] as f64;
                    let b = upper.color[channel] as f64;
                    *out = (a + (b - a) * t).round().clamp(0.0, 255.0) as u8;
                }
                color
            }
        }
    }
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self::temperature(RampMode::Step)
    }
}
