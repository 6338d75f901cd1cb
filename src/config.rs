//! Simulation and compositing parameters.
//!
//! Field names serialize in camelCase, so a partial JSON document such as
//! `{"bloom": false, "curl": 30}` overlays the defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FluidConfiguration {
    /// Short-axis size of the velocity and pressure grids.
    pub sim_resolution: u32,
    /// Short-axis size of the dye grid.
    pub dye_resolution: u32,
    pub density_dissipation: f32,
    pub velocity_dissipation: f32,
    /// Fraction of last frame's pressure kept as the solver's first guess.
    pub pressure: f32,
    pub pressure_iterations: u32,
    /// Vorticity confinement strength.
    pub curl: f32,
    pub splat_radius: f32,
    pub splat_force: f32,
    pub shading: bool,
    pub transparent: bool,
    /// Background in 0-255 units, drawn when `transparent` is off.
    pub back_color: Rgb,

    pub bloom: bool,
    pub bloom_iterations: u32,
    pub bloom_resolution: u32,
    pub bloom_intensity: f32,
    pub bloom_threshold: f32,
    pub bloom_soft_knee: f32,

    pub sunrays: bool,
    pub sunrays_resolution: u32,
    pub sunrays_weight: f32,
}

impl Default for FluidConfiguration {
    fn default() -> Self {
        Self {
            sim_resolution: 256,
            dye_resolution: 1024,
            density_dissipation: 1.0,
            velocity_dissipation: 0.0,
            pressure: 0.0,
            pressure_iterations: 20,
            curl: 0.0,
            splat_radius: 0.1,
            splat_force: 6000.0,
            shading: true,
            transparent: true,
            back_color: Rgb::BLACK,
            bloom: true,
            bloom_iterations: 8,
            bloom_resolution: 256,
            bloom_intensity: 0.1,
            bloom_threshold: 0.0,
            bloom_soft_knee: 0.7,
            sunrays: true,
            sunrays_resolution: 196,
            sunrays_weight: 1.0,
        }
    }
}

impl FluidConfiguration {
    /// Long-lived smoke trails with no glow.
    pub fn smoke() -> Self {
        Self {
            velocity_dissipation: 0.75,
            bloom: false,
            sunrays: false,
            ..Self::default()
        }
    }

    /// Opaque background, small splats, a cheap pressure solve.
    pub fn circle() -> Self {
        Self {
            density_dissipation: 0.75,
            pressure_iterations: 5,
            splat_radius: 0.01,
            transparent: false,
            sunrays: false,
            ..Self::default()
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "smoke" => Some(Self::smoke()),
            "circle" => Some(Self::circle()),
            _ => None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_overlays_defaults() {
        let config = FluidConfiguration::from_json(r#"{"bloom": false, "curl": 30}"#).unwrap();
        assert!(!config.bloom);
        assert_eq!(config.curl, 30.0);
        assert_eq!(config.pressure_iterations, 20);
        assert_eq!(config.sunrays_resolution, 196);
    }

    #[test]
    fn keys_are_camel_case() {
        let config = FluidConfiguration::from_json(
            r#"{"pressureIterations": 5, "backColor": {"r": 10, "g": 20, "b": 30}}"#,
        )
        .unwrap();
        assert_eq!(config.pressure_iterations, 5);
        assert_eq!(config.back_color, Rgb::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn json_round_trip() {
        let config = FluidConfiguration::circle();
        let parsed = FluidConfiguration::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn presets() {
        let smoke = FluidConfiguration::smoke();
        assert_eq!(smoke.velocity_dissipation, 0.75);
        assert!(!smoke.bloom && !smoke.sunrays);

        let circle = FluidConfiguration::circle();
        assert_eq!(circle.pressure_iterations, 5);
        assert_eq!(circle.splat_radius, 0.01);
        assert!(!circle.transparent);
        assert!(circle.bloom);

        assert!(FluidConfiguration::preset("ink").is_none());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = FluidConfiguration::from_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::error::FluidError::Config(_)));
    }
}
