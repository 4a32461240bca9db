/// Numerical core: spectrogram model and the alignment/fusion stages.
///
/// Architecture:
/// ```text
///   adapter output (per instrument)
///        │
///        ▼
///   ┌──────────┐
///   │ timeline  │  dedup + sort concatenated timestamps → aligned rows
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  stitch   │  join sub-bands → one monotonic frequency axis
///   └──────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ background  │  clip → log → per-channel median subtraction
///   └────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  fusion   │  resample + merge all instruments → FusionGrid
///   └──────────┘
/// ```
pub mod background;
pub mod fusion;
pub mod model;
pub mod stitch;
pub mod timeline;
