use log::{debug, warn};

use crate::config::{BackgroundConfig, BaselineMode};
use crate::dynspec::model::{IntensityUnit, Spectrogram};

// ---------------------------------------------------------------------------
// Background normalization
// ---------------------------------------------------------------------------

/// Per-frequency-channel baseline recorded during subtraction, so callers
/// can undo the subtraction or inspect the instrumental response.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub per_channel: Vec<f64>,
}

impl Baseline {
    fn empty() -> Self {
        Baseline {
            per_channel: Vec::new(),
        }
    }
}

/// Remove the slowly varying instrumental response from a spectrogram,
/// in place.
///
/// Intensities are clipped to `intensity_floor`, optionally log10
/// transformed, then reduced per frequency channel by the median over the
/// configured time window and subtracted across all times. NaN cells
/// (synthetic gap channels, missing samples) pass through untouched.
///
/// Applying this to an already-subtracted spectrogram would subtract the
/// near-zero baseline of normalized data; that is not a supported
/// operation, so it is refused as a warned no-op.
pub fn subtract_background(spec: &mut Spectrogram, cfg: &BackgroundConfig) -> Baseline {
    if spec.is_empty() {
        return Baseline::empty();
    }
    if spec.unit == IntensityUnit::BackgroundSubtracted {
        warn!(
            "{}: background already subtracted; refusing a second pass",
            spec.source
        );
        return Baseline::empty();
    }

    let floor = cfg.intensity_floor;
    spec.data.mapv_inplace(|v| if v.is_nan() { v } else { v.max(floor) });
    if cfg.log_transform {
        spec.data.mapv_inplace(|v| v.log10());
        spec.unit = IntensityUnit::LogPower;
    }

    let window_rows = match cfg.mode {
        BaselineMode::FirstSamples(k) => {
            let k = k.min(spec.times.len());
            if k < spec.times.len() {
                debug!(
                    "{}: baseline from the first {k} of {} samples",
                    spec.source,
                    spec.times.len()
                );
            }
            k
        }
        BaselineMode::FullAxis => spec.times.len(),
    };

    let mut per_channel = Vec::with_capacity(spec.freqs.len());
    for col in spec.data.columns() {
        let mut window: Vec<f64> = col
            .iter()
            .take(window_rows)
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        per_channel.push(median(&mut window));
    }

    for (mut col, &base) in spec.data.columns_mut().into_iter().zip(&per_channel) {
        if base.is_nan() {
            continue; // all-NaN channel; nothing to subtract
        }
        col.mapv_inplace(|v| v - base);
    }
    spec.unit = IntensityUnit::BackgroundSubtracted;
    Baseline { per_channel }
}

/// Median of the finite values; NaN when the window is empty.
fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        0.5 * (values[mid - 1] + values[mid])
    }
}
