use chrono::{DateTime, Duration, Utc};
use log::warn;
use ndarray::{concatenate, s, Array2, Axis};

use crate::config::SourceId;
use crate::dynspec::model::{IntensityUnit, Spectrogram};
use crate::dynspec::timeline;
use crate::error::{FuseError, Result};
use crate::instrument::Cursor;

// ---------------------------------------------------------------------------
// Tiled wide-field spectrograph network
// ---------------------------------------------------------------------------

pub const RECORD_MAGIC: [u8; 4] = *b"TILE";
const KIND: &str = "tiled";

/// Leading channels discarded from every file after reorientation. The
/// lowest channels of each sub-band sit on the analog filter edge and are
/// unusable.
pub const LEADING_DISCARD: usize = 10;

/// Site-dependent channel family; each family is a separate fusion source
/// with its own frequency coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFamily {
    Low,
    High,
}

impl ChannelFamily {
    pub fn source_id(self) -> SourceId {
        match self {
            ChannelFamily::Low => SourceId::TiledLow,
            ChannelFamily::High => SourceId::TiledHigh,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(ChannelFamily::Low),
            1 => Ok(ChannelFamily::High),
            other => Err(FuseError::decode(KIND, format!("unknown family tag {other}"))),
        }
    }
}

/// One decoded tile file: a short slice of one channel family's day. The
/// frequency vector is stored highest-first and must be reoriented before
/// use; many such files make up one observation.
#[derive(Debug, Clone)]
pub struct TiledRecord {
    pub family: ChannelFamily,
    pub start: DateTime<Utc>,
    pub cadence_s: f64,
    /// Descending, as written by the instrument.
    pub freqs_mhz: Vec<f64>,
    pub data: Array2<f64>,
}

/// Decode one tile: magic, family tag, start epoch (µs), cadence, counts,
/// then the descending frequency vector and the intensity block.
pub fn decode_record(bytes: &[u8]) -> Result<TiledRecord> {
    let mut cur = Cursor::new(KIND, bytes);
    cur.magic(RECORD_MAGIC)?;
    let family = ChannelFamily::from_tag(cur.u8()?)?;
    let start = cur.epoch_us()?;
    let cadence_s = cur.f64()?;
    if !cadence_s.is_finite() || cadence_s <= 0.0 {
        return Err(FuseError::decode(KIND, format!("invalid cadence {cadence_s}")));
    }
    let n_samp = cur.u32()? as usize;
    let n_chan = cur.u32()? as usize;
    let freqs_mhz = cur.f64s(n_chan)?;
    let cells = n_samp
        .checked_mul(n_chan)
        .ok_or_else(|| FuseError::decode(KIND, "tile dimensions overflow"))?;
    let flat = cur.f32s(cells)?;
    let data = Array2::from_shape_vec((n_samp, n_chan), flat).expect("shape matches read length");
    Ok(TiledRecord {
        family,
        start,
        cadence_s,
        freqs_mhz,
        data,
    })
}

/// Adapt one channel family's files into a spectrogram in raw counts.
///
/// Per file: reverse the frequency vector (and the matching columns) into
/// ascending order, then discard the [`LEADING_DISCARD`] lowest-quality
/// channels. All files of the family are concatenated along time and
/// reconciled. Zero usable files yield an empty spectrogram, not an error.
pub fn produce(family: ChannelFamily, records: Vec<TiledRecord>) -> Spectrogram {
    let source = family.source_id();
    let mut freqs: Option<Vec<f64>> = None;
    let mut times: Vec<DateTime<Utc>> = Vec::new();
    let mut pieces: Vec<Array2<f64>> = Vec::new();

    for (i, rec) in records.into_iter().enumerate() {
        if rec.family != family {
            warn!("{source}: record {i} belongs to the other channel family; skipping");
            continue;
        }
        if rec.freqs_mhz.len() != rec.data.ncols() {
            warn!(
                "{source}: record {i} has {} frequencies for {} columns; skipping",
                rec.freqs_mhz.len(),
                rec.data.ncols()
            );
            continue;
        }
        if rec.freqs_mhz.len() <= LEADING_DISCARD {
            warn!(
                "{source}: record {i} has only {} channels, all below the quality cut; skipping",
                rec.freqs_mhz.len()
            );
            continue;
        }

        // Highest-first on disk → ascending, then drop the filter-edge
        // channels that now lead the axis.
        let mut rec_freqs: Vec<f64> = rec.freqs_mhz.iter().rev().copied().collect();
        let reversed = rec.data.slice(s![.., ..;-1]);
        let trimmed = reversed.slice(s![.., LEADING_DISCARD..]).to_owned();
        rec_freqs.drain(..LEADING_DISCARD);

        match &freqs {
            None => freqs = Some(rec_freqs),
            Some(axis) if *axis == rec_freqs => {}
            Some(_) => {
                warn!("{source}: record {i} frequency axis differs from the first file; skipping");
                continue;
            }
        }

        let step = Duration::nanoseconds((rec.cadence_s * 1e9).round() as i64);
        times.extend((0..trimmed.nrows()).map(|k| rec.start + step * k as i32));
        pieces.push(trimmed);
    }

    let freqs = match freqs {
        Some(f) if !times.is_empty() => f,
        _ => {
            warn!("{source}: no usable records");
            return Spectrogram::empty(source);
        }
    };
    let views: Vec<_> = pieces.iter().map(|p| p.view()).collect();
    let stacked = concatenate(Axis(0), &views).expect("files share the trimmed axis");
    let (axis, aligned) = timeline::reconcile(source, &times, stacked.view());
    Spectrogram::from_parts(source, axis, freqs, aligned, IntensityUnit::RawCounts)
}
