//! PM2.5 concentration to air-quality index conversion.
//!
//! The index is a piecewise-linear interpolation over fixed breakpoints.
//! Concentrations above the last breakpoint extrapolate along the slope of
//! the final band instead of being clamped.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub c_lo: f64,
    pub c_hi: f64,
    pub i_lo: f64,
    pub i_hi: f64,
}

impl Breakpoint {
    const fn new(c_lo: f64, c_hi: f64, i_lo: f64, i_hi: f64) -> Self {
        Self {
            c_lo,
            c_hi,
            i_lo,
            i_hi,
        }
    }

    fn interpolate(&self, concentration: f64) -> f64 {
        (self.i_hi - self.i_lo) / (self.c_hi - self.c_lo) * (concentration - self.c_lo) + self.i_lo
    }
}

/// PM2.5 breakpoints in µg/m³, ordered by concentration.
pub const PM25_BREAKPOINTS: [Breakpoint; 4] = [
    Breakpoint::new(0.0, 12.0, 0.0, 50.0),
    Breakpoint::new(12.1, 35.4, 51.0, 100.0),
    Breakpoint::new(35.5, 55.4, 101.0, 150.0),
    Breakpoint::new(55.5, 150.4, 151.0, 200.0),
];

/// Negative and NaN concentrations are read as zero.
pub fn index(concentration: f64) -> u32 {
    let c = concentration.max(0.0);
    let band = PM25_BREAKPOINTS
        .iter()
        .find(|bp| c <= bp.c_hi)
        .unwrap_or(&PM25_BREAKPOINTS[PM25_BREAKPOINTS.len() - 1]);
    let value = band.interpolate(c).round();
    if value >= u32::MAX as f64 {
        u32::MAX
    } else {
        value as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
}

impl AqiCategory {
    pub fn label(&self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            AqiCategory::Good => "#00e400",
            AqiCategory::Moderate => "#ffff00",
            AqiCategory::UnhealthyForSensitiveGroups => "#ff7e00",
            AqiCategory::Unhealthy => "#ff0000",
            AqiCategory::VeryUnhealthy => "#8f3f97",
        }
    }
}

pub fn category(index: u32) -> AqiCategory {
    match index {
        0..=50 => AqiCategory::Good,
        51..=100 => AqiCategory::Moderate,
        101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
        151..=200 => AqiCategory::Unhealthy,
        _ => AqiCategory::VeryUnhealthy,
    }
}
