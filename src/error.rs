// error.rs — Error types shared by the remap and alignment halves.
//
// Remap failures are hard errors: they abort the current frame and are
// returned to the caller. A rejected offset estimate is not an error in
// that sense; it is a value (`EstimationReject`) the seam aligner absorbs
// by dropping the correction for one frame.

use crate::gpu::device::GpuError;

/// Errors surfaced by the remap path (field resource, kernel binding,
/// handler) and by backend construction.
#[derive(thiserror::Error, Debug)]
pub enum RemapError {
    /// Unsupported format, missing field data, empty image, mismatched
    /// frame sizes or malformed kernel arguments.
    #[error("parameter error: {0}")]
    Parameter(String),

    /// The backend could not create the field buffer or its image view.
    #[error("allocation error: {0}")]
    Allocation(String),

    /// A host-visible map or unmap of the field buffer failed.
    #[error("map error: {0}")]
    Map(String),

    /// The operation needs setup that has not happened yet.
    #[error("unconfigured: {0}")]
    Unconfigured(String),

    /// The field was already divided by the source size once.
    #[error("displacement field is already normalized")]
    AlreadyNormalized,

    /// Device or kernel setup failed.
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// The robust mean refused to produce an estimate.
///
/// Carries the mean it stopped at and the inlier count of the last
/// completed pass so the caller can still record them as "last seen"
/// values.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
#[error("offset estimate rejected (mean {mean:.2}, count {count})")]
pub struct EstimationReject {
    /// Seed mean, or the diverged mean; 0.0 when too few offsets to seed.
    pub mean: f32,
    /// Inlier count of the last completed pass (the input count before any).
    pub count: usize,
}

/// Errors from loading configuration or field data from text.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The JSON document did not match the config schema.
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),

    /// A value parsed but is out of its valid range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}
