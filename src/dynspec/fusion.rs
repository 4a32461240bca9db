use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use ndarray::Array2;

use crate::config::FusionConfig;
use crate::dynspec::model::{FusionGrid, Spectrogram};
use crate::error::{FuseError, Result};

// ---------------------------------------------------------------------------
// Cross-instrument fusion
// ---------------------------------------------------------------------------

/// Resample and merge 0–N normalized spectrograms onto one common
/// time/frequency lattice.
///
/// Sources are applied in `cfg.priority_order`; for every channel of the
/// common frequency axis, the last-applied source whose native coverage
/// interval contains that channel is authoritative and owns the whole
/// channel. There is no blending inside overlaps. Cells no source covers
/// stay NaN. Empty sources contribute nothing and never abort the run;
/// only a run with zero usable contributions fails.
pub fn fuse(specs: &[Spectrogram], cfg: &FusionConfig) -> Result<FusionGrid> {
    let mut contributors: Vec<&Spectrogram> = Vec::new();
    for id in &cfg.priority_order {
        match specs.iter().find(|s| s.source == *id) {
            Some(s) if !s.is_empty() => contributors.push(s),
            Some(_) | None => {
                warn!("{}", FuseError::SourceUnavailable(*id));
            }
        }
    }
    for spec in specs {
        if !cfg.priority_order.contains(&spec.source) {
            warn!(
                "{}: not in the priority order; contributes no coverage",
                spec.source
            );
        }
    }
    if contributors.is_empty() {
        return Err(FuseError::NoUsableSources);
    }

    let times = common_time_axis(&contributors, cfg)?;
    let freqs = common_freq_axis(&contributors, cfg)?;

    let mut data = Array2::from_elem((times.len(), freqs.len()), f64::NAN);
    let epoch = times[0];
    let grid_times_s: Vec<f64> = times.iter().map(|t| seconds_since(epoch, *t)).collect();

    let mut usable = 0usize;
    for spec in &contributors {
        match apply_source(spec, &grid_times_s, &freqs, epoch, &mut data) {
            Ok(channels) => {
                debug!("{}: wrote {channels} fused channel(s)", spec.source);
                usable += 1;
            }
            Err(err) => {
                // Per-instrument failure stays per-instrument.
                warn!("{}: dropped from fusion: {err}", spec.source);
            }
        }
    }
    if usable == 0 {
        return Err(FuseError::NoUsableSources);
    }

    Ok(FusionGrid { times, freqs, data })
}

/// Fixed-cadence axis spanning `[t_start, t_end]` inclusive. The cadence is
/// the caller's, or else the finest native cadence among contributors.
fn common_time_axis(
    contributors: &[&Spectrogram],
    cfg: &FusionConfig,
) -> Result<Vec<DateTime<Utc>>> {
    let (t_start, t_end) = cfg.time_window;
    if t_end <= t_start {
        return Err(FuseError::InsufficientAxis {
            axis: "time",
            got: usize::from(t_end == t_start),
        });
    }
    let cadence_s = match cfg.cadence {
        Some(c) if c > 0.0 && c.is_finite() => c,
        Some(_) | None => contributors
            .iter()
            .filter_map(|s| s.native_cadence())
            .fold(f64::INFINITY, f64::min),
    };
    if !cadence_s.is_finite() {
        // No caller cadence and no contributor had two samples to infer one.
        return Err(FuseError::NoUsableSources);
    }
    let step_us = (cadence_s * 1e6).round().max(1.0) as i64;
    let span_us = (t_end - t_start)
        .num_microseconds()
        .ok_or(FuseError::InsufficientAxis { axis: "time", got: 0 })?;
    let n = (span_us / step_us) as usize + 1;
    let times: Vec<DateTime<Utc>> = (0..n)
        .map(|i| t_start + Duration::microseconds(i as i64 * step_us))
        .collect();
    if times.len() < 2 {
        return Err(FuseError::InsufficientAxis {
            axis: "time",
            got: times.len(),
        });
    }
    Ok(times)
}

/// Union of all contributing raw frequencies inside the requested range,
/// deduplicated and ascending. Fewer than two matched samples is fatal: no
/// channel edge widths can be computed for plotting.
fn common_freq_axis(contributors: &[&Spectrogram], cfg: &FusionConfig) -> Result<Vec<f64>> {
    let (f_min, f_max) = cfg.freq_window;
    let mut freqs: Vec<f64> = contributors
        .iter()
        .flat_map(|s| s.freqs.iter().copied())
        .filter(|f| *f >= f_min && *f <= f_max)
        .collect();
    freqs.sort_unstable_by(|a, b| a.total_cmp(b));
    freqs.dedup();
    if freqs.len() < 2 {
        return Err(FuseError::InsufficientAxis {
            axis: "frequency",
            got: freqs.len(),
        });
    }
    Ok(freqs)
}

/// Z-score one source and bilinearly resample it onto the lattice, writing
/// every channel inside its native coverage interval. Returns the number of
/// channels written.
fn apply_source(
    spec: &Spectrogram,
    grid_times_s: &[f64],
    grid_freqs: &[f64],
    epoch: DateTime<Utc>,
    data: &mut Array2<f64>,
) -> Result<usize> {
    if spec.times.len() < 2 {
        return Err(FuseError::InsufficientAxis {
            axis: "time",
            got: spec.times.len(),
        });
    }
    if spec.freqs.len() < 2 {
        return Err(FuseError::InsufficientAxis {
            axis: "frequency",
            got: spec.freqs.len(),
        });
    }

    let (cov_lo, cov_hi) = spec.freq_coverage().expect("non-empty spectrogram");
    let owned: Vec<usize> = (0..grid_freqs.len())
        .filter(|&j| grid_freqs[j] >= cov_lo && grid_freqs[j] <= cov_hi)
        .collect();
    if owned.is_empty() {
        return Err(FuseError::InsufficientAxis {
            axis: "frequency",
            got: 0,
        });
    }

    let src_times_s: Vec<f64> = spec.times.iter().map(|t| seconds_since(epoch, *t)).collect();
    let z = zscore(&spec.data);

    for (ti, &t) in grid_times_s.iter().enumerate() {
        let t_bracket = bracket(&src_times_s, t);
        for &j in &owned {
            data[[ti, j]] = match (t_bracket, bracket(&spec.freqs, grid_freqs[j])) {
                (Some((t0, wt)), Some((f0, wf))) => bilinear(&z, t0, wt, f0, wf),
                // Authoritative channel, but outside this source's convex
                // time coverage: missing, never extrapolated.
                _ => f64::NAN,
            };
        }
    }
    Ok(owned.len())
}

fn seconds_since(epoch: DateTime<Utc>, t: DateTime<Utc>) -> f64 {
    (t - epoch).num_microseconds().map_or(f64::NAN, |us| us as f64 * 1e-6)
}

/// Zero-mean, unit-variance copy over the finite cells, so instruments with
/// different native intensity scales become visually comparable.
fn zscore(data: &Array2<f64>) -> Array2<f64> {
    let finite: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return data.clone();
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / finite.len() as f64;
    let std = if var > 0.0 { var.sqrt() } else { 1.0 };
    data.mapv(|v| (v - mean) / std)
}

/// Locate `x` inside sorted `xs`: the left bracket index and the fractional
/// weight toward the right neighbor. `None` outside the hull.
fn bracket(xs: &[f64], x: f64) -> Option<(usize, f64)> {
    if xs.len() < 2 || x < xs[0] || x > xs[xs.len() - 1] {
        return None;
    }
    let hi = xs.partition_point(|&v| v < x).clamp(1, xs.len() - 1);
    let lo = hi - 1;
    let span = xs[hi] - xs[lo];
    let w = if span > 0.0 { (x - xs[lo]) / span } else { 0.0 };
    Some((lo, w))
}

/// Pointwise bilinear interpolation; any NaN corner poisons the result,
/// which keeps synthetic gap channels visible in the fused grid.
fn bilinear(z: &Array2<f64>, t0: usize, wt: f64, f0: usize, wf: f64) -> f64 {
    let (a, b) = (z[[t0, f0]], z[[t0, f0 + 1]]);
    let (c, d) = (z[[t0 + 1, f0]], z[[t0 + 1, f0 + 1]]);
    let top = a * (1.0 - wf) + b * wf;
    let bottom = c * (1.0 - wf) + d * wf;
    top * (1.0 - wt) + bottom * wt
}
