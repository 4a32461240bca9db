use log::warn;
use ndarray::{concatenate, s, Array2, Axis};

use crate::config::SourceId;
use crate::error::{FuseError, Result};

// ---------------------------------------------------------------------------
// Frequency-axis stitching
// ---------------------------------------------------------------------------

/// Synthetic NaN channels inserted at each sub-band discontinuity, so a
/// plotted spectrum shows a visible gap instead of a false linear blend
/// between unrelated bands.
pub const GAP_CHANNELS: usize = 5;

/// Bands separated by more than this multiple of the local channel spacing
/// are considered non-adjacent.
const ADJACENCY_FACTOR: f64 = 2.0;

/// One sub-band: its frequency vector and the matching intensity columns.
/// The frequency vector may arrive in either orientation.
#[derive(Debug, Clone)]
pub struct SubBand {
    pub freqs: Vec<f64>,
    pub data: Array2<f64>,
}

impl SubBand {
    fn is_descending(&self) -> bool {
        self.freqs.first().zip(self.freqs.last()).map_or(false, |(a, b)| a > b)
    }

    /// Flip a descending band into ascending orientation, columns included.
    fn ascending(mut self) -> SubBand {
        if self.is_descending() {
            self.freqs.reverse();
            self.data = self.data.slice(s![.., ..;-1]).to_owned();
        }
        self
    }
}

/// Concatenate one instrument's sub-bands into a single strictly increasing
/// frequency axis with matching intensity columns.
///
/// Concatenation order is decided by comparing band extrema, never assumed
/// from the field order in the file. Non-adjacent neighbors get
/// [`GAP_CHANNELS`] synthetic NaN channels between them; bands whose ranges
/// interleave are merged by a global permutation sort instead, with no gap
/// insertion.
pub fn stitch(source: SourceId, bands: Vec<SubBand>) -> Result<(Vec<f64>, Array2<f64>)> {
    let mut bands: Vec<SubBand> = bands
        .into_iter()
        .filter(|b| !b.freqs.is_empty())
        .map(SubBand::ascending)
        .collect();
    if bands.is_empty() {
        return Ok((Vec::new(), Array2::zeros((0, 0))));
    }

    for band in &bands {
        if band.freqs.len() != band.data.ncols() {
            return Err(FuseError::AxisMismatch {
                axis: "sub-band frequency",
                left: band.freqs.len(),
                right: band.data.ncols(),
            });
        }
    }

    // All bands of one file share the time axis; tolerate a ragged edge by
    // clipping to the shortest band.
    let nt = bands.iter().map(|b| b.data.nrows()).min().unwrap_or(0);
    if bands.iter().any(|b| b.data.nrows() != nt) {
        warn!("{source}: sub-bands disagree on sample count; clipping to {nt} rows");
        for band in &mut bands {
            if band.data.nrows() != nt {
                band.data = band.data.slice(s![..nt, ..]).to_owned();
            }
        }
    }

    // Lower-frequency-first vs higher-frequency-first is a property of the
    // data, not of the recording order.
    bands.sort_by(|a, b| a.freqs[0].total_cmp(&b.freqs[0]));

    if bands_interleave(&bands) {
        return Ok(merge_sorted(bands));
    }

    let mut freqs: Vec<f64> = Vec::new();
    let mut pieces: Vec<Array2<f64>> = Vec::new();
    for band in bands {
        if let Some(&prev_max) = freqs.last() {
            let next_min = band.freqs[0];
            let spacing = edge_spacing(&freqs, &band.freqs);
            if next_min - prev_max > ADJACENCY_FACTOR * spacing {
                let step = (next_min - prev_max) / (GAP_CHANNELS + 1) as f64;
                for k in 1..=GAP_CHANNELS {
                    freqs.push(prev_max + step * k as f64);
                }
                pieces.push(Array2::from_elem((nt, GAP_CHANNELS), f64::NAN));
            }
        }
        freqs.extend_from_slice(&band.freqs);
        pieces.push(band.data);
    }

    let views: Vec<_> = pieces.iter().map(|p| p.view()).collect();
    let data = concatenate(Axis(1), &views).map_err(|_| FuseError::AxisMismatch {
        axis: "stitched sub-band",
        left: freqs.len(),
        right: pieces.iter().map(|p| p.ncols()).sum(),
    })?;
    Ok((freqs, data))
}

/// True when any neighbor pair overlaps in frequency after sorting by
/// band minimum.
fn bands_interleave(bands: &[SubBand]) -> bool {
    bands
        .windows(2)
        .any(|w| w[1].freqs[0] <= *w[0].freqs.last().unwrap())
}

/// Representative channel spacing at the junction of two bands: the larger
/// of the two edge spacings, so slightly stretched band ends do not fake a
/// discontinuity.
fn edge_spacing(lower: &[f64], upper: &[f64]) -> f64 {
    let tail = match lower {
        [.., a, b] => b - a,
        _ => 0.0,
    };
    let head = match upper {
        [a, b, ..] => b - a,
        _ => 0.0,
    };
    tail.max(head).max(f64::EPSILON)
}

/// Overlapping bands: concatenate everything, then reorder columns by a
/// single global argsort of the frequency axis.
fn merge_sorted(bands: Vec<SubBand>) -> (Vec<f64>, Array2<f64>) {
    let mut freqs: Vec<f64> = Vec::new();
    let mut pieces: Vec<Array2<f64>> = Vec::new();
    for band in bands {
        freqs.extend_from_slice(&band.freqs);
        pieces.push(band.data);
    }
    let views: Vec<_> = pieces.iter().map(|p| p.view()).collect();
    let data = concatenate(Axis(1), &views).expect("bands share row count after clipping");

    let mut perm: Vec<usize> = (0..freqs.len()).collect();
    perm.sort_by(|&a, &b| freqs[a].total_cmp(&freqs[b]));
    let sorted_freqs: Vec<f64> = perm.iter().map(|&i| freqs[i]).collect();
    let sorted_data = data.select(Axis(1), &perm);
    (sorted_freqs, sorted_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(freqs: Vec<f64>, fill: f64, nt: usize) -> SubBand {
        let nf = freqs.len();
        SubBand {
            freqs,
            data: Array2::from_elem((nt, nf), fill),
        }
    }

    fn strictly_increasing(xs: &[f64]) -> bool {
        xs.windows(2).all(|w| w[1] > w[0])
    }

    #[test]
    fn disjoint_bands_gain_gap_channels() {
        // 25-50 MHz and 180-200 MHz: clearly non-adjacent.
        let b1 = band(vec![25.0, 30.0, 35.0, 40.0, 45.0, 50.0], 1.0, 3);
        let b2 = band(vec![180.0, 190.0, 200.0], 2.0, 3);
        let (freqs, data) = stitch(SourceId::SweepSpectrograph, vec![b2, b1]).unwrap();
        assert_eq!(freqs.len(), 6 + 3 + GAP_CHANNELS, "information content law");
        assert!(strictly_increasing(&freqs));
        assert_eq!(data.dim(), (3, freqs.len()));
        // Gap columns are NaN, real columns untouched.
        assert!(data[[0, 6]].is_nan());
        assert_eq!(data[[0, 5]], 1.0);
        assert_eq!(data[[0, 6 + GAP_CHANNELS]], 2.0);
    }

    #[test]
    fn adjacent_bands_join_without_gap() {
        let b1 = band(vec![10.0, 11.0, 12.0], 1.0, 2);
        let b2 = band(vec![13.0, 14.0, 15.0], 2.0, 2);
        let (freqs, _) = stitch(SourceId::SweepSpectrograph, vec![b1, b2]).unwrap();
        assert_eq!(freqs.len(), 6);
        assert!(strictly_increasing(&freqs));
    }

    #[test]
    fn descending_band_is_flipped_with_its_columns() {
        let mut b = band(vec![30.0, 20.0, 10.0], 0.0, 1);
        b.data[[0, 0]] = 3.0; // belongs to 30 MHz
        b.data[[0, 2]] = 1.0; // belongs to 10 MHz
        let (freqs, data) = stitch(SourceId::TiledLow, vec![b]).unwrap();
        assert_eq!(freqs, vec![10.0, 20.0, 30.0]);
        assert_eq!(data[[0, 0]], 1.0);
        assert_eq!(data[[0, 2]], 3.0);
    }

    #[test]
    fn interleaved_bands_merge_by_global_sort() {
        let b1 = band(vec![10.0, 30.0, 50.0], 1.0, 2);
        let b2 = band(vec![20.0, 40.0, 60.0], 2.0, 2);
        let (freqs, data) = stitch(SourceId::SweepSpectrograph, vec![b1, b2]).unwrap();
        assert_eq!(freqs, vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0]);
        // Column ownership follows the frequencies through the permutation.
        assert_eq!(data[[0, 0]], 1.0);
        assert_eq!(data[[0, 1]], 2.0);
        assert!(!data.iter().any(|v| v.is_nan()), "no gaps inside overlap");
    }

    #[test]
    fn ragged_sample_counts_clip_to_shortest() {
        let b1 = band(vec![10.0, 11.0], 1.0, 4);
        let b2 = band(vec![12.0, 13.0], 2.0, 3);
        let (_, data) = stitch(SourceId::SweepSpectrograph, vec![b1, b2]).unwrap();
        assert_eq!(data.nrows(), 3);
    }
}
