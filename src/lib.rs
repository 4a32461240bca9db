//! radiofuse – multi-instrument radio dynamic-spectrum alignment and fusion.
//!
//! Three ground instruments record the same sky through very different
//! raw-file shapes: a single-dish multi-Stokes receiver, a multi-band sweep
//! spectrograph, and a tiled network of wide-field spectrographs with split
//! frequency sub-bands. This crate normalizes each instrument's time and
//! frequency axes, repairs per-instrument defects (duplicate timestamps,
//! sub-band discontinuities, missing samples), removes the slowly varying
//! instrumental background, and merges everything onto one common
//! time/frequency lattice with deterministic conflict resolution.
//!
//! File download and rendering stay with the caller: this crate consumes
//! decoded raw records and hands back a [`FusionGrid`] (NaN = no coverage)
//! for a plotting collaborator to map to an image.
//!
//! ```no_run
//! use radiofuse::{fuse, subtract_background, BackgroundConfig, FusionConfig, RawObservation};
//! # fn records() -> Vec<radiofuse::instrument::DishRecord> { Vec::new() }
//! # fn config() -> FusionConfig { unimplemented!() }
//! let obs = RawObservation::SingleDish {
//!     stokes: radiofuse::instrument::Stokes::I,
//!     records: records(),
//! };
//! let mut spec = obs.produce();
//! subtract_background(&mut spec, &BackgroundConfig::default());
//! let _grid = fuse(&[spec], &config())?;
//! # Ok::<(), radiofuse::FuseError>(())
//! ```

pub mod config;
pub mod dynspec;
pub mod error;
pub mod instrument;

pub use config::{BackgroundConfig, BaselineMode, FusionConfig, SourceId};
pub use dynspec::background::{subtract_background, Baseline};
pub use dynspec::fusion::fuse;
pub use dynspec::model::{FusionGrid, IntensityUnit, Spectrogram};
pub use error::{FuseError, Result};
pub use instrument::RawObservation;
