use thiserror::Error;

use crate::config::SourceId;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Errors produced by the alignment/fusion core.
///
/// Per-instrument failures are isolated: one instrument failing to
/// contribute never aborts the others. Only [`FuseError::NoUsableSources`]
/// ends a run.
#[derive(Debug, Error)]
pub enum FuseError {
    /// No raw records exist for an instrument. Non-fatal for a fusion run;
    /// the instrument simply contributes no coverage.
    #[error("no data available for source {0}")]
    SourceUnavailable(SourceId),

    /// Two axis/field lengths that should agree do not, beyond what the
    /// truncate-to-shorter recovery is allowed to absorb.
    #[error("axis mismatch on {axis}: {left} entries vs {right}")]
    AxisMismatch {
        axis: &'static str,
        left: usize,
        right: usize,
    },

    /// Fewer than two samples remain on an axis after window filtering.
    /// Fatal for one instrument's contribution; fatal for the run only when
    /// it strikes the fused axes themselves.
    #[error("{axis} axis has {got} sample(s) inside the requested window; at least two are required")]
    InsufficientAxis { axis: &'static str, got: usize },

    /// A raw record could not be decoded or validated. The record is
    /// skipped and the run continues with the remaining ones.
    #[error("failed to decode {kind} record: {reason}")]
    Decode { kind: &'static str, reason: String },

    /// Every requested instrument failed to contribute anything usable.
    #[error("no usable instrument contributions for the requested window")]
    NoUsableSources,
}

impl FuseError {
    pub(crate) fn decode(kind: &'static str, reason: impl Into<String>) -> Self {
        FuseError::Decode {
            kind,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FuseError>;
