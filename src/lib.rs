// geoseam: GPU geometric remap and adaptive seam alignment for
// multi-camera NV12 stitching.
//
// Two halves:
//   - remap: a displacement field warps each camera frame on the GPU
//     (field.rs → field_resource.rs → kernel.rs → remap.rs, executed by a
//     `ComputeBackend`: gpu::remap::WgpuBackend or host::HostBackend)
//   - alignment: per frame, the horizontal offset between overlapping
//     crops is estimated and the crop rectangles follow it
//     (detectors + klt → correspondence.rs → seam.rs)

pub mod backend;
pub mod error;
pub mod field;
pub mod field_resource;
pub mod gpu;
pub mod host;
pub mod kernel;
pub mod remap;
pub mod video;

pub mod color;
pub mod config;
pub mod convolution;
pub mod correspondence;
pub mod debug;
pub mod detector;
pub mod fast;
pub mod gftt;
pub mod gradient;
pub mod image;
pub mod klt;
pub mod orb;
pub mod pyramid;
pub mod seam;

pub use backend::{ComputeBackend, WorkSize};
pub use color::{Nv12Image, Rect};
pub use config::{AlignerConfig, RemapConfig};
pub use correspondence::{Correspondence, FeatureCorrespondenceEstimator, RobustMean};
pub use error::{ConfigError, EstimationReject, RemapError};
pub use field::{DisplacementField, GeoPos};
pub use field_resource::GpuFieldResource;
pub use host::{HostBackend, HostVideoBuffer};
pub use kernel::RemapKernelBinding;
pub use remap::{HandlerState, RemapHandler};
pub use seam::{CropSet, SeamAligner, SeamOutcome, SeamState};
pub use video::{VideoBuffer, VideoBufferInfo};
