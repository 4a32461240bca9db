use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Source identity
// ---------------------------------------------------------------------------

/// Identity of one contributing instrument.
///
/// The tiled network records two site-dependent channel families which are
/// treated as independent sources throughout the pipeline: each carries its
/// own frequency coverage and competes separately for fused channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceId {
    /// Single-dish multi-Stokes receiver.
    SingleDish,
    /// Multi-band sweep spectrograph.
    SweepSpectrograph,
    /// Tiled wide-field network, low channel family.
    TiledLow,
    /// Tiled wide-field network, high channel family.
    TiledHigh,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceId::SingleDish => "single-dish",
            SourceId::SweepSpectrograph => "sweep",
            SourceId::TiledLow => "tiled-low",
            SourceId::TiledHigh => "tiled-high",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Background normalization
// ---------------------------------------------------------------------------

/// Time window over which the per-channel baseline median is taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BaselineMode {
    /// Median over the first K time samples. Assumes a stable pre-event
    /// quiet period at the start of the observation.
    FirstSamples(usize),
    /// Median over the entire time axis. Used for survey-style instruments
    /// where a leading quiet window would span an arbitrary file boundary.
    FullAxis,
}

impl Default for BaselineMode {
    fn default() -> Self {
        BaselineMode::FirstSamples(DEFAULT_BASELINE_SAMPLES)
    }
}

/// Default K for [`BaselineMode::FirstSamples`].
pub const DEFAULT_BASELINE_SAMPLES: usize = 100;

/// Configuration for the background normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundConfig {
    #[serde(default)]
    pub mode: BaselineMode,
    /// Apply log10 to the clipped intensities before baseline subtraction.
    #[serde(default = "default_log_transform")]
    pub log_transform: bool,
    /// Positive floor applied before any logarithmic transform, so zero or
    /// negative raw samples never hit a log domain error.
    #[serde(default = "default_intensity_floor")]
    pub intensity_floor: f64,
}

fn default_log_transform() -> bool {
    true
}

fn default_intensity_floor() -> f64 {
    1e-4
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        BackgroundConfig {
            mode: BaselineMode::default(),
            log_transform: default_log_transform(),
            intensity_floor: default_intensity_floor(),
        }
    }
}

// ---------------------------------------------------------------------------
// Fusion
// ---------------------------------------------------------------------------

/// Caller-supplied contract for one fusion run. Replaces any ambient state:
/// every stage receives what it needs by argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Requested observation window, inclusive on both ends.
    pub time_window: (DateTime<Utc>, DateTime<Utc>),
    /// Requested combined frequency range in MHz, inclusive.
    pub freq_window: (f64, f64),
    /// Seconds per sample of the fused time axis. `None` derives the
    /// cadence from the finest-resolution contributing instrument.
    #[serde(default)]
    pub cadence: Option<f64>,
    /// Application order for the merge. Sources are written onto the grid
    /// in this order, so a later entry overwrites earlier ones wherever
    /// their frequency coverage overlaps: the last entry has the highest
    /// priority. No blending is ever performed.
    #[serde(default = "default_priority_order")]
    pub priority_order: Vec<SourceId>,
}

/// Site convention: finest sub-band instrument wins over the wide-sweep
/// spectrograph, which wins over the single-dish receiver.
pub fn default_priority_order() -> Vec<SourceId> {
    vec![
        SourceId::SingleDish,
        SourceId::SweepSpectrograph,
        SourceId::TiledLow,
        SourceId::TiledHigh,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fusion_config_deserializes_with_defaults() {
        let cfg: FusionConfig = serde_json::from_str(
            r#"{
                "time_window": ["2024-07-14T10:00:00Z", "2024-07-14T11:00:00Z"],
                "freq_window": [10.0, 700.0]
            }"#,
        )
        .expect("minimal config should parse");
        assert!(cfg.cadence.is_none());
        assert_eq!(cfg.priority_order, default_priority_order());
        assert_eq!(
            *cfg.priority_order.last().unwrap(),
            SourceId::TiledHigh,
            "finest sub-band family must be applied last (highest priority)"
        );
    }

    #[test]
    fn background_config_defaults() {
        let cfg = BackgroundConfig::default();
        assert_eq!(cfg.mode, BaselineMode::FirstSamples(100));
        assert!(cfg.log_transform);
        assert!(cfg.intensity_floor > 0.0);
    }
}
