// config.rs — Tunables for remap and seam alignment.
//
// Every struct carries its calibrated constants in `Default`, and all of
// them (de)serialize with serde so a host application can ship overrides
// as JSON. Missing keys fall back to the defaults (`#[serde(default)]`).

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Shi-Tomasi / Harris "good features to track" settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GfttConfig {
    pub max_corners: usize,
    /// Minimum accepted response as a fraction of the strongest one.
    pub quality_level: f32,
    /// Minimum Euclidean distance between returned corners.
    pub min_distance: f32,
    /// Side of the square structure-tensor window (odd).
    pub block_size: usize,
    pub use_harris: bool,
    pub harris_k: f32,
}

impl Default for GfttConfig {
    fn default() -> Self {
        GfttConfig {
            max_corners: 300,
            quality_level: 0.01,
            min_distance: 5.0,
            block_size: 5,
            use_harris: false,
            harris_k: 0.04,
        }
    }
}

/// Oriented-FAST keypoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbConfig {
    pub max_features: usize,
    /// Ratio between consecutive pyramid levels (> 1).
    pub scale_factor: f32,
    pub n_levels: usize,
    /// Border in pixels where no keypoint is detected, per level.
    pub edge_threshold: usize,
    pub fast_threshold: u8,
    /// Diameter of the orientation patch.
    pub patch_size: usize,
    pub harris_k: f32,
}

impl Default for OrbConfig {
    fn default() -> Self {
        OrbConfig {
            max_features: 200,
            scale_factor: 1.5,
            n_levels: 2,
            edge_threshold: 9,
            fast_threshold: 20,
            patch_size: 31,
            harris_k: 0.04,
        }
    }
}

/// Both feature sources used by the correspondence estimator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub gftt: GfttConfig,
    pub orb: OrbConfig,
}

/// Pyramidal Lucas-Kanade settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Half-size of the tracking window; 2 gives a 5×5 window.
    pub window_half_size: usize,
    /// Pyramid levels including the source resolution.
    pub max_levels: usize,
    pub max_iterations: usize,
    /// Stop when the update step is shorter than this (pixels).
    pub epsilon: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            window_half_size: 2,
            max_levels: 3,
            max_iterations: 10,
            epsilon: 0.01,
        }
    }
}

/// Correspondence filtering and robust-mean settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrespondenceConfig {
    /// Tracks with a larger error are dropped.
    pub max_track_error: f32,
    /// Tracks must satisfy |dy| < max_dy.
    pub max_dy: f32,
    /// Fewer accepted offsets than this rejects the estimate.
    pub min_count: usize,
    /// Offsets further than this from the running mean are outliers.
    pub inlier_window: f32,
    pub max_passes: usize,
    /// A pass may move the mean by at most this times the last movement.
    pub divergence_factor: f32,
    /// Movement allowance before the first refinement pass.
    pub initial_delta: f32,
}

impl Default for CorrespondenceConfig {
    fn default() -> Self {
        CorrespondenceConfig {
            max_track_error: 16.0,
            max_dy: 4.0,
            min_count: 8,
            inlier_window: 4.0,
            max_passes: 3,
            divergence_factor: 1.2,
            initial_delta: 20.0,
        }
    }
}

/// Temporal smoothing of the per-seam offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Accept when the new mean is this close to the last frame's mean.
    pub delta_mean: f32,
    /// Or when it is this close to the smoothed offset.
    pub delta_offset: f32,
    /// Weight kept from the previous smoothed offset.
    pub factor: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        SmoothingConfig {
            delta_mean: 1.0,
            delta_offset: 12.0,
            factor: 0.8,
        }
    }
}

/// Crop-window geometry around each seam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Fixed seam width after recentering.
    pub seam_width: i32,
    /// Grid the overlap and seam start are snapped to.
    pub alignment: i32,
}

impl Default for StitchConfig {
    fn default() -> Self {
        StitchConfig { seam_width: 56, alignment: 8 }
    }
}

/// Everything the seam aligner needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub correspondence: CorrespondenceConfig,
    pub smoothing: SmoothingConfig,
    pub stitch: StitchConfig,
}

impl AlignerConfig {
    /// Parse a (possibly partial) JSON document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: AlignerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        let d = &self.detector;
        if d.gftt.block_size % 2 == 0 {
            return invalid("gftt.block_size must be odd");
        }
        if !(0.0..=1.0).contains(&d.gftt.quality_level) {
            return invalid("gftt.quality_level must be in [0, 1]");
        }
        if d.orb.scale_factor <= 1.0 {
            return invalid("orb.scale_factor must be > 1");
        }
        if d.orb.n_levels == 0 {
            return invalid("orb.n_levels must be >= 1");
        }
        if self.tracker.max_levels == 0 || self.tracker.window_half_size == 0 {
            return invalid("tracker.max_levels and tracker.window_half_size must be >= 1");
        }
        if self.correspondence.min_count == 0 {
            return invalid("correspondence.min_count must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.smoothing.factor) {
            return invalid("smoothing.factor must be in [0, 1]");
        }
        if self.stitch.alignment <= 0 || self.stitch.seam_width <= 0 {
            return invalid("stitch.alignment and stitch.seam_width must be positive");
        }
        Ok(())
    }
}

/// Output sizing and dispatch geometry of the remap handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemapConfig {
    /// Explicit output size; `None` adopts the first input's size.
    pub output_size: Option<(u32, u32)>,
    /// Output frames are padded to this many pixels in both dimensions.
    pub output_alignment: u32,
    /// Workgroup shape of the remap kernel.
    pub local_size: (u32, u32),
}

impl RemapConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RemapConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_size.0 == 0 || self.local_size.1 == 0 {
            return Err(ConfigError::Invalid("local_size components must be >= 1".into()));
        }
        if self.output_alignment == 0 {
            return Err(ConfigError::Invalid("output_alignment must be >= 1".into()));
        }
        if matches!(self.output_size, Some((0, _)) | Some((_, 0))) {
            return Err(ConfigError::Invalid("output_size must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for RemapConfig {
    fn default() -> Self {
        RemapConfig {
            output_size: None,
            output_alignment: 16,
            local_size: (16, 4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_calibration() {
        let c = AlignerConfig::default();
        assert_eq!(c.detector.gftt.max_corners, 300);
        assert_eq!(c.detector.orb.max_features, 200);
        assert_eq!(c.tracker.max_levels, 3);
        assert_eq!(c.correspondence.min_count, 8);
        assert_eq!(c.stitch.seam_width, 56);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c = AlignerConfig::from_json_str(r#"{ "smoothing": { "factor": 0.5 } }"#).unwrap();
        assert_eq!(c.smoothing.factor, 0.5);
        assert_eq!(c.smoothing.delta_offset, 12.0);
        assert_eq!(c.tracker, TrackerConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AlignerConfig::from_json_str(r#"{ "stitch": { "alignment": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = AlignerConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_remap_config_rejects_zero_sizes() {
        let err = RemapConfig::from_json_str(r#"{ "local_size": [0, 4] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = RemapConfig::from_json_str(r#"{ "output_alignment": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let c = RemapConfig::from_json_str(r#"{ "local_size": [8, 8] }"#).unwrap();
        assert_eq!(c.local_size, (8, 8));
        assert_eq!(c.output_alignment, 16);
        assert!(RemapConfig::default().validate().is_ok());
    }

    #[test]
    fn test_remap_config_round_trip() {
        let c = RemapConfig { output_size: Some((1920, 960)), ..RemapConfig::default() };
        let s = serde_json::to_string(&c).unwrap();
        let back: RemapConfig = serde_json::from_str(&s).unwrap();
        assert_eq!(back, c);
    }
}
