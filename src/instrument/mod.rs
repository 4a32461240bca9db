/// Instrument adapters: one per raw-file shape, one common capability.
///
/// Architecture:
/// ```text
///   raw record bytes (read by the caller)
///        │
///        ▼
///   ┌─────────────────┐
///   │ decode_record    │  per-instrument self-describing binary layout
///   └─────────────────┘
///        │
///        ▼
///   ┌─────────────────┐
///   │ RawObservation   │  closed set of variants, selected by identity
///   │    .produce()    │  → normalized Spectrogram (native units)
///   └─────────────────┘
/// ```
///
/// A record that fails to decode or validate is reported and skipped; an
/// instrument with zero usable records yields an empty `Spectrogram`
/// ("no data for this source"), never an error.
pub mod single_dish;
pub mod sweep;
pub mod tiled;

use chrono::{DateTime, TimeZone, Utc};

use crate::config::SourceId;
use crate::dynspec::model::Spectrogram;
use crate::error::{FuseError, Result};

pub use single_dish::{DishRecord, Stokes};
pub use sweep::{SweepBand, SweepRecord};
pub use tiled::{ChannelFamily, TiledRecord};

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Decoded raw records for one instrument, ready for adaptation. Each
/// record type belongs to exactly one adapter and is never shared between
/// them; this enum is the only seam the rest of the pipeline sees.
#[derive(Debug, Clone)]
pub enum RawObservation {
    SingleDish {
        stokes: Stokes,
        records: Vec<DishRecord>,
    },
    Sweep {
        records: Vec<SweepRecord>,
    },
    Tiled {
        family: ChannelFamily,
        records: Vec<TiledRecord>,
    },
}

impl RawObservation {
    pub fn source_id(&self) -> SourceId {
        match self {
            RawObservation::SingleDish { .. } => SourceId::SingleDish,
            RawObservation::Sweep { .. } => SourceId::SweepSpectrograph,
            RawObservation::Tiled { family, .. } => family.source_id(),
        }
    }

    /// Normalize this instrument's records into a `Spectrogram` in native
    /// units. Degraded inputs (bad records, ragged axes) are repaired or
    /// skipped with a report; the result is always structurally valid.
    pub fn produce(self) -> Spectrogram {
        match self {
            RawObservation::SingleDish { stokes, records } => {
                single_dish::produce(records, stokes)
            }
            RawObservation::Sweep { records } => sweep::produce(records),
            RawObservation::Tiled { family, records } => tiled::produce(family, records),
        }
    }
}

// ---------------------------------------------------------------------------
// Binary record cursor
// ---------------------------------------------------------------------------

/// Little-endian reader over one in-memory record. Every read failure maps
/// to a `Decode` error carrying the instrument kind and byte position.
pub(crate) struct Cursor<'a> {
    kind: &'static str,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(kind: &'static str, buf: &'a [u8]) -> Self {
        Cursor { kind, buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(FuseError::decode(
                self.kind,
                format!("record truncated at byte {}", self.pos),
            )),
        }
    }

    pub(crate) fn magic(&mut self, expected: [u8; 4]) -> Result<()> {
        let got = self.take(4)?;
        if got != &expected[..] {
            return Err(FuseError::decode(
                self.kind,
                format!("bad magic {:?}, expected {:?}", got, expected),
            ));
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().expect("4 bytes")))
    }

    pub(crate) fn i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes(b.try_into().expect("8 bytes")))
    }

    pub(crate) fn f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes(b.try_into().expect("8 bytes")))
    }

    pub(crate) fn f64s(&mut self, n: usize) -> Result<Vec<f64>> {
        let b = self.take(n.checked_mul(8).unwrap_or(usize::MAX))?;
        Ok(b.chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().expect("8 bytes")))
            .collect())
    }

    /// f32 samples on disk, widened to f64 in memory.
    pub(crate) fn f32s(&mut self, n: usize) -> Result<Vec<f64>> {
        let b = self.take(n.checked_mul(4).unwrap_or(usize::MAX))?;
        Ok(b.chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().expect("4 bytes")) as f64)
            .collect())
    }

    pub(crate) fn label(&mut self) -> Result<String> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| FuseError::decode(self.kind, "label is not valid UTF-8"))
    }

    /// Header-encoded start time: microseconds since the Unix epoch.
    pub(crate) fn epoch_us(&mut self) -> Result<DateTime<Utc>> {
        let us = self.i64()?;
        let secs = us.div_euclid(1_000_000);
        let nanos = (us.rem_euclid(1_000_000) * 1_000) as u32;
        Utc.timestamp_opt(secs, nanos)
            .single()
            .ok_or_else(|| FuseError::decode(self.kind, format!("start epoch {us} out of range")))
    }
}
