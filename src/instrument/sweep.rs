use chrono::{DateTime, Duration, Utc};
use log::warn;
use ndarray::{concatenate, Array2, Axis};

use crate::config::SourceId;
use crate::dynspec::model::{IntensityUnit, Spectrogram};
use crate::dynspec::stitch::{self, SubBand};
use crate::dynspec::timeline;
use crate::error::{FuseError, Result};
use crate::instrument::Cursor;

// ---------------------------------------------------------------------------
// Multi-band sweep spectrograph
// ---------------------------------------------------------------------------

pub const RECORD_MAGIC: [u8; 4] = *b"SWPB";
const KIND: &str = "sweep";

/// One named sub-band of a sweep file: its frequency vector and intensity
/// columns for every sample of the file.
#[derive(Debug, Clone)]
pub struct SweepBand {
    pub label: String,
    pub freqs_mhz: Vec<f64>,
    pub data: Array2<f64>,
}

/// One decoded sweep file: a start epoch, a fixed sample cadence, and
/// several sub-bands recorded as separately labeled fields.
#[derive(Debug, Clone)]
pub struct SweepRecord {
    pub start: DateTime<Utc>,
    pub cadence_s: f64,
    pub bands: Vec<SweepBand>,
}

/// Decode one record: magic, start epoch (µs), cadence, sample count, then
/// each band's label, frequency vector, and intensity block.
pub fn decode_record(bytes: &[u8]) -> Result<SweepRecord> {
    let mut cur = Cursor::new(KIND, bytes);
    cur.magic(RECORD_MAGIC)?;
    let start = cur.epoch_us()?;
    let cadence_s = cur.f64()?;
    if !cadence_s.is_finite() || cadence_s <= 0.0 {
        return Err(FuseError::decode(KIND, format!("invalid cadence {cadence_s}")));
    }
    let n_samp = cur.u32()? as usize;
    let n_bands = cur.u32()? as usize;
    let mut bands = Vec::with_capacity(n_bands);
    for _ in 0..n_bands {
        let label = cur.label()?;
        let n_chan = cur.u32()? as usize;
        let freqs_mhz = cur.f64s(n_chan)?;
        let cells = n_samp
            .checked_mul(n_chan)
            .ok_or_else(|| FuseError::decode(KIND, "band dimensions overflow"))?;
        let flat = cur.f32s(cells)?;
        let data = Array2::from_shape_vec((n_samp, n_chan), flat)
            .expect("shape matches read length");
        bands.push(SweepBand {
            label,
            freqs_mhz,
            data,
        });
    }
    Ok(SweepRecord {
        start,
        cadence_s,
        bands,
    })
}

/// Adapt decoded sweep files into one spectrogram in raw counts.
///
/// Per file, the sub-bands are stitched into a single monotonic frequency
/// axis (band order decided by extrema, gaps marked with synthetic NaN
/// channels). Files are concatenated along time and reconciled; a file
/// whose stitched axis differs from the first one's is skipped.
pub fn produce(records: Vec<SweepRecord>) -> Spectrogram {
    let source = SourceId::SweepSpectrograph;
    let mut freqs: Option<Vec<f64>> = None;
    let mut times: Vec<DateTime<Utc>> = Vec::new();
    let mut pieces: Vec<Array2<f64>> = Vec::new();

    for (i, rec) in records.into_iter().enumerate() {
        let bands: Vec<SubBand> = rec
            .bands
            .into_iter()
            .map(|b| SubBand {
                freqs: b.freqs_mhz,
                data: b.data,
            })
            .collect();
        let (band_freqs, data) = match stitch::stitch(source, bands) {
            Ok(stitched) => stitched,
            Err(err) => {
                warn!("{source}: record {i} failed to stitch: {err}; skipping");
                continue;
            }
        };
        if band_freqs.is_empty() {
            warn!("{source}: record {i} has no channels; skipping");
            continue;
        }

        match &freqs {
            None => freqs = Some(band_freqs),
            Some(axis) if *axis == band_freqs => {}
            Some(_) => {
                warn!("{source}: record {i} stitched axis differs from the first file; skipping");
                continue;
            }
        }

        let step = Duration::nanoseconds((rec.cadence_s * 1e9).round() as i64);
        times.extend((0..data.nrows()).map(|k| rec.start + step * k as i32));
        pieces.push(data);
    }

    let freqs = match freqs {
        Some(f) if !times.is_empty() => f,
        _ => {
            warn!("{source}: no usable records");
            return Spectrogram::empty(source);
        }
    };
    let views: Vec<_> = pieces.iter().map(|p| p.view()).collect();
    let stacked = concatenate(Axis(0), &views).expect("records share the stitched axis");
    let (axis, aligned) = timeline::reconcile(source, &times, stacked.view());
    Spectrogram::from_parts(source, axis, freqs, aligned, IntensityUnit::RawCounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynspec::stitch::GAP_CHANNELS;
    use chrono::TimeZone;

    fn band(label: &str, freqs: Vec<f64>, fill: f64, nt: usize) -> SweepBand {
        let nf = freqs.len();
        SweepBand {
            label: label.into(),
            freqs_mhz: freqs,
            data: Array2::from_elem((nt, nf), fill),
        }
    }

    fn record(start_s: i64, bands: Vec<SweepBand>) -> SweepRecord {
        SweepRecord {
            start: Utc.timestamp_opt(1_700_000_000 + start_s, 0).unwrap(),
            cadence_s: 1.0,
            bands,
        }
    }

    fn encode(rec: &SweepRecord) -> Vec<u8> {
        let n_samp = rec.bands.first().map_or(0, |b| b.data.nrows());
        let mut out = Vec::new();
        out.extend_from_slice(&RECORD_MAGIC);
        out.extend_from_slice(&rec.start.timestamp_micros().to_le_bytes());
        out.extend_from_slice(&rec.cadence_s.to_le_bytes());
        out.extend_from_slice(&(n_samp as u32).to_le_bytes());
        out.extend_from_slice(&(rec.bands.len() as u32).to_le_bytes());
        for b in &rec.bands {
            out.push(b.label.len() as u8);
            out.extend_from_slice(b.label.as_bytes());
            out.extend_from_slice(&(b.freqs_mhz.len() as u32).to_le_bytes());
            for v in &b.freqs_mhz {
                out.extend_from_slice(&v.to_le_bytes());
            }
            for v in b.data.iter() {
                out.extend_from_slice(&(*v as f32).to_le_bytes());
            }
        }
        out
    }

    #[test]
    fn decode_round_trips_bands() {
        let rec = record(
            0,
            vec![
                band("A", vec![25.0, 30.0], 1.0, 2),
                band("B", vec![75.0, 80.0], 2.0, 2),
            ],
        );
        let decoded = decode_record(&encode(&rec)).unwrap();
        assert_eq!(decoded.bands.len(), 2);
        assert_eq!(decoded.bands[0].label, "A");
        assert_eq!(decoded.bands[1].freqs_mhz, vec![75.0, 80.0]);
        assert_eq!(decoded.cadence_s, 1.0);
    }

    #[test]
    fn decode_rejects_nonpositive_cadence() {
        let mut rec = record(0, vec![band("A", vec![25.0, 30.0], 1.0, 1)]);
        rec.cadence_s = 0.0;
        assert!(decode_record(&encode(&rec)).is_err());
    }

    #[test]
    fn bands_recorded_high_first_still_sort_ascending() {
        let rec = record(
            0,
            vec![
                band("hi", vec![180.0, 190.0], 2.0, 2),
                band("lo", vec![25.0, 30.0], 1.0, 2),
            ],
        );
        let spec = produce(vec![rec]);
        assert_eq!(spec.freqs.len(), 4 + GAP_CHANNELS);
        assert!(spec.freqs.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(spec.data[[0, 0]], 1.0, "low band lands first");
    }

    #[test]
    fn files_concatenate_along_time() {
        let a = record(0, vec![band("A", vec![25.0, 30.0], 1.0, 2)]);
        let b = record(2, vec![band("A", vec![25.0, 30.0], 2.0, 2)]);
        let spec = produce(vec![a, b]);
        assert_eq!(spec.times.len(), 4);
        assert_eq!(spec.data[[3, 0]], 2.0);
    }

    #[test]
    fn mismatched_file_axis_is_skipped() {
        let a = record(0, vec![band("A", vec![25.0, 30.0], 1.0, 2)]);
        let b = record(10, vec![band("A", vec![40.0, 45.0], 2.0, 2)]);
        let spec = produce(vec![a, b]);
        assert_eq!(spec.times.len(), 2, "second file rejected");
        assert_eq!(spec.freqs, vec![25.0, 30.0]);
    }

    #[test]
    fn no_records_yield_an_empty_spectrogram() {
        let spec = produce(Vec::new());
        assert!(spec.is_empty());
    }
}
