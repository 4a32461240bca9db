use chrono::{DateTime, Duration, Utc};
use log::warn;
use ndarray::{concatenate, s, Array2, Axis};

use crate::config::SourceId;
use crate::dynspec::model::{IntensityUnit, Spectrogram};
use crate::dynspec::timeline;
use crate::error::{FuseError, Result};
use crate::instrument::Cursor;

// ---------------------------------------------------------------------------
// Single-dish multi-Stokes receiver
// ---------------------------------------------------------------------------

pub const RECORD_MAGIC: [u8; 4] = *b"SDMS";
const KIND: &str = "single-dish";

/// Stokes component the adapter extracts from the dual-polarization data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stokes {
    /// Total intensity.
    I,
    /// Circular polarization.
    V,
}

/// One decoded measurement file. The time axis is an explicit per-sample
/// offset field relative to a file-level observation start; both Stokes
/// matrices share the frequency axis.
#[derive(Debug, Clone)]
pub struct DishRecord {
    pub start: DateTime<Utc>,
    /// Seconds since `start`, one per sample row (may exceed the data rows
    /// by one when the last edge record was cut off mid-write).
    pub offsets_s: Vec<f64>,
    pub freqs_mhz: Vec<f64>,
    pub stokes_i: Array2<f64>,
    pub stokes_v: Array2<f64>,
}

/// Decode one record from its self-describing binary layout:
/// magic, start epoch (µs), offset/row/channel counts, then the offset,
/// frequency, and per-Stokes intensity fields.
pub fn decode_record(bytes: &[u8]) -> Result<DishRecord> {
    let mut cur = Cursor::new(KIND, bytes);
    cur.magic(RECORD_MAGIC)?;
    let start = cur.epoch_us()?;
    let n_off = cur.u32()? as usize;
    let n_rows = cur.u32()? as usize;
    let n_chan = cur.u32()? as usize;
    let offsets_s = cur.f64s(n_off)?;
    let freqs_mhz = cur.f64s(n_chan)?;
    let stokes_i = read_matrix(&mut cur, n_rows, n_chan)?;
    let stokes_v = read_matrix(&mut cur, n_rows, n_chan)?;
    Ok(DishRecord {
        start,
        offsets_s,
        freqs_mhz,
        stokes_i,
        stokes_v,
    })
}

fn read_matrix(cur: &mut Cursor<'_>, rows: usize, cols: usize) -> Result<Array2<f64>> {
    let cells = rows
        .checked_mul(cols)
        .ok_or_else(|| FuseError::decode(KIND, "matrix dimensions overflow"))?;
    let flat = cur.f32s(cells)?;
    Ok(Array2::from_shape_vec((rows, cols), flat).expect("shape matches read length"))
}

/// Adapt decoded records into one spectrogram of the selected Stokes
/// component, in raw counts.
///
/// The offset and data-row counts may disagree by one (edge-record
/// truncation); the excess entry is dropped. A larger disagreement means
/// the record itself is corrupt and it is skipped. Files are concatenated
/// along time and reconciled into a strictly increasing axis.
pub fn produce(records: Vec<DishRecord>, stokes: Stokes) -> Spectrogram {
    let source = SourceId::SingleDish;
    let mut freqs: Option<Vec<f64>> = None;
    let mut times: Vec<DateTime<Utc>> = Vec::new();
    let mut pieces: Vec<Array2<f64>> = Vec::new();

    for (i, rec) in records.into_iter().enumerate() {
        let data = match stokes {
            Stokes::I => rec.stokes_i,
            Stokes::V => rec.stokes_v,
        };
        let diff = rec.offsets_s.len().abs_diff(data.nrows());
        if diff > 1 {
            warn!(
                "{source}: record {i} has {} offsets for {} rows; skipping",
                rec.offsets_s.len(),
                data.nrows()
            );
            continue;
        }
        let nt = rec.offsets_s.len().min(data.nrows());
        if diff == 1 {
            warn!("{source}: record {i} edge-truncated by one sample");
        }

        match &freqs {
            None => freqs = Some(rec.freqs_mhz),
            Some(axis) if *axis == rec.freqs_mhz => {}
            Some(_) => {
                warn!("{source}: record {i} frequency axis differs from the first file; skipping");
                continue;
            }
        }

        times.extend(
            rec.offsets_s[..nt]
                .iter()
                .map(|&s| rec.start + Duration::nanoseconds((s * 1e9).round() as i64)),
        );
        pieces.push(if data.nrows() == nt {
            data
        } else {
            data.slice(s![..nt, ..]).to_owned()
        });
    }

    let freqs = match freqs {
        Some(f) if !times.is_empty() => f,
        _ => {
            warn!("{source}: no usable records");
            return Spectrogram::empty(source);
        }
    };
    let views: Vec<_> = pieces.iter().map(|p| p.view()).collect();
    let stacked = concatenate(Axis(0), &views).expect("records share channel count");
    let (axis, aligned) = timeline::reconcile(source, &times, stacked.view());
    Spectrogram::from_parts(source, axis, freqs, aligned, IntensityUnit::RawCounts)
}
