// seam.rs — Per-seam offset smoothing and crop-rectangle adjustment.
//
// Two cameras, two seams. Seam 0 pairs the left crop of image 0 with the
// right crop of image 1 (they wrap around the panorama); seam 1 pairs the
// right crop of image 0 with the left crop of image 1.
//
// Every frame, per seam:
//   - estimate the horizontal offset between the two crops
//   - fold it into the smoothed offset (or reset it on a rejected estimate)
//   - shift one crop by the smoothed offset, then recenter both crops on
//     the overlap midpoint with the fixed seam width
//   - if recentering moved anything, the offset has been consumed and the
//     smoothed value restarts from 0
//
// State lives in the aligner instance, one `SeamState` per seam, so frame
// N+1 sees frame N's smoothing.

use log::{debug, info, warn};

use crate::color::{Nv12Image, Rect};
use crate::config::{AlignerConfig, SmoothingConfig, StitchConfig};
use crate::correspondence::{Estimate, FeatureCorrespondenceEstimator, RobustMean};
use crate::debug::{AlignmentObserver, SeamReport};
use crate::error::{EstimationReject, RemapError};
use crate::image::Image;

/// The four crop rectangles the stitcher blends, two per seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropSet {
    pub image0_left: Rect,
    pub image0_right: Rect,
    pub image1_left: Rect,
    pub image1_right: Rect,
}

/// What the smoothing step did with this frame's estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingDecision {
    /// Close to the last mean or to the smoothed offset: blended in.
    Blended,
    /// Valid but too far from both: smoothed offset left as is.
    Skipped,
    /// Estimate rejected: smoothed offset set to 0.
    Reset,
}

/// Smoothing memory of one seam.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SeamState {
    pub last_count: usize,
    pub last_mean_offset: f32,
    pub smoothed_offset: f32,
}

impl SeamState {
    pub fn update(
        &mut self,
        result: &Result<RobustMean, EstimationReject>,
        config: &SmoothingConfig,
    ) -> SmoothingDecision {
        let (decision, mean, count) = match result {
            Ok(r) => {
                let near_last = (r.mean - self.last_mean_offset).abs() < config.delta_mean;
                let near_smoothed = (r.mean - self.smoothed_offset).abs() < config.delta_offset;
                if near_last || near_smoothed {
                    self.smoothed_offset = self.smoothed_offset * config.factor + r.mean * (1.0 - config.factor);
                    (SmoothingDecision::Blended, r.mean, r.count)
                } else {
                    (SmoothingDecision::Skipped, r.mean, r.count)
                }
            }
            Err(reject) => {
                self.smoothed_offset = 0.0;
                (SmoothingDecision::Reset, reject.mean, reject.count)
            }
        };
        self.last_count = count;
        self.last_mean_offset = mean;
        decision
    }
}

/// Result of one seam for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SeamOutcome {
    pub seam: usize,
    pub estimate: Result<RobustMean, EstimationReject>,
    pub decision: SmoothingDecision,
    /// Smoothed offset applied to the crop this frame.
    pub applied_offset: f32,
    /// True when recentering changed the crops and the offset restarted.
    pub crop_reset: bool,
}

/// Round to the nearest multiple of `alignment` (halves round up for
/// non-negative values).
#[inline]
pub fn align_around(value: i32, alignment: i32) -> i32 {
    (value + alignment / 2) / alignment * alignment
}

/// Recenter a seam's two crops around the midpoint of their overlap.
///
/// `stitch0` is the crop near the right edge of the panorama, `stitch1`
/// the one near the left edge; the overlap width is what both cover
/// together across the wrap at `dst_width`.
///
/// `stitch1.x` always lands on the alignment grid. `stitch0.x` does only
/// when `dst_width` is itself a multiple of `config.alignment`.
pub fn adjust_stitch_area(dst_width: i32, stitch0: &mut Rect, stitch1: &mut Rect, config: &StitchConfig) {
    let seam = config.seam_width;
    if dst_width % config.alignment != 0 {
        warn!("panorama width {dst_width} is not a multiple of {}, right crop x will be unaligned", config.alignment);
    }
    let mut overlap = align_around(stitch1.right() + dst_width - stitch0.right(), config.alignment);
    if overlap < seam {
        warn!("overlap {overlap} narrower than seam width {seam}, widening");
        overlap = (seam + config.alignment - 1) / config.alignment * config.alignment;
    }
    let center = overlap / 2;

    stitch1.x = align_around(center - seam / 2, config.alignment);
    stitch1.width = seam;
    stitch0.x = dst_width - overlap + stitch1.x;
    stitch0.width = seam;
}

pub struct SeamAligner {
    estimator: FeatureCorrespondenceEstimator,
    smoothing: SmoothingConfig,
    stitch: StitchConfig,
    states: [SeamState; 2],
    frames: u64,
    observer: Option<Box<dyn AlignmentObserver>>,
}

impl SeamAligner {
    pub fn new(config: &AlignerConfig) -> Self {
        Self::with_estimator(FeatureCorrespondenceEstimator::new(config), config)
    }

    pub fn with_estimator(estimator: FeatureCorrespondenceEstimator, config: &AlignerConfig) -> Self {
        SeamAligner {
            estimator,
            smoothing: config.smoothing.clone(),
            stitch: config.stitch.clone(),
            states: [SeamState::default(); 2],
            frames: 0,
            observer: None,
        }
    }

    /// Receive per-seam reports (debug images and the like). Off by default.
    pub fn set_observer(&mut self, observer: Box<dyn AlignmentObserver>) {
        self.observer = Some(observer);
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn state(&self, seam: usize) -> Option<&SeamState> {
        self.states.get(seam)
    }

    pub fn frames_aligned(&self) -> u64 {
        self.frames
    }

    /// Estimate both seams and update `crops` in place.
    ///
    /// A crop outside its frame is a parameter error; the seam states are
    /// not touched in that case.
    pub fn align(
        &mut self,
        image0: &Nv12Image,
        image1: &Nv12Image,
        dst_width: i32,
        crops: &mut CropSet,
    ) -> Result<[SeamOutcome; 2], RemapError> {
        let gray0_left = image0.gray_region(crops.image0_left)?;
        let gray0_right = image0.gray_region(crops.image0_right)?;
        let gray1_left = image1.gray_region(crops.image1_left)?;
        let gray1_right = image1.gray_region(crops.image1_right)?;
        self.frames += 1;

        let estimate0 = self.estimator.estimate(&gray0_left, &gray1_right);
        self.report(0, &gray0_left, &gray1_right, &estimate0);
        let outcome0 = self.finish_seam(0, estimate0, dst_width, crops);
        info!(
            "Stitching area 0: image0_left_area(x:{}, width:{}), image1_right_area(x:{}, width:{})",
            crops.image0_left.x, crops.image0_left.width, crops.image1_right.x, crops.image1_right.width
        );

        let estimate1 = self.estimator.estimate(&gray0_right, &gray1_left);
        self.report(1, &gray0_right, &gray1_left, &estimate1);
        let outcome1 = self.finish_seam(1, estimate1, dst_width, crops);
        info!(
            "Stitching area 1: image0_right_area(x:{}, width:{}), image1_left_area(x:{}, width:{})",
            crops.image0_right.x, crops.image0_right.width, crops.image1_left.x, crops.image1_left.width
        );

        Ok([outcome0, outcome1])
    }

    fn report(&mut self, seam: usize, image0: &Image<u8>, image1: &Image<u8>, estimate: &Estimate) {
        if let Some(observer) = self.observer.as_mut() {
            observer.on_seam(&SeamReport { seam, frame: self.frames, image0, image1, estimate });
        }
    }

    fn finish_seam(&mut self, seam: usize, estimate: Estimate, dst_width: i32, crops: &mut CropSet) -> SeamOutcome {
        let state = &mut self.states[seam];
        let decision = state.update(&estimate.result, &self.smoothing);
        let offset = state.smoothed_offset;
        debug!("seam {seam}: {decision:?}, smoothed offset {offset:.2}");

        // Seam 0 moves image 1's right crop forward, seam 1 moves image 0's
        // right crop back.
        let (stitch0, stitch1, shift) = match seam {
            0 => (&mut crops.image1_right, &mut crops.image0_left, offset),
            _ => (&mut crops.image0_right, &mut crops.image1_left, -offset),
        };
        let before = (*stitch0, *stitch1);
        stitch0.x = (stitch0.x as f32 + shift) as i32;
        adjust_stitch_area(dst_width, stitch0, stitch1, &self.stitch);

        let crop_reset = (*stitch0, *stitch1) != before;
        if crop_reset {
            state.smoothed_offset = 0.0;
        }
        SeamOutcome { seam, estimate: estimate.result, decision, applied_offset: offset, crop_reset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ok(mean: f32, count: usize) -> Result<RobustMean, EstimationReject> {
        Ok(RobustMean { mean, count, passes: 1 })
    }

    #[test]
    fn test_align_around() {
        assert_eq!(align_around(85, 8), 88);
        assert_eq!(align_around(83, 8), 80);
        assert_eq!(align_around(12, 8), 16);
        assert_eq!(align_around(11, 8), 8);
        assert_eq!(align_around(0, 8), 0);
    }

    #[test]
    fn test_reject_resets_smoothing() {
        let cfg = SmoothingConfig::default();
        let mut s = SeamState { last_count: 30, last_mean_offset: 4.0, smoothed_offset: 3.5 };
        let d = s.update(&Err(EstimationReject { mean: 0.0, count: 5 }), &cfg);
        assert_eq!(d, SmoothingDecision::Reset);
        assert_eq!(s.smoothed_offset, 0.0);
        assert_eq!(s.last_count, 5);
        assert_eq!(s.last_mean_offset, 0.0);
    }

    #[test]
    fn test_rejected_mean_still_anchors_next_frame() {
        let cfg = SmoothingConfig::default();
        let estimator = FeatureCorrespondenceEstimator::new(&AlignerConfig::default());
        let scattered: Vec<f32> = (0..12).map(|i| i as f32 * 5.0).collect();
        let reject = estimator.robust_mean(&scattered, scattered.iter().sum(), scattered.len());

        let mut s = SeamState { last_count: 30, last_mean_offset: 4.0, smoothed_offset: 3.5 };
        assert_eq!(s.update(&reject, &cfg), SmoothingDecision::Reset);
        assert_eq!(s.smoothed_offset, 0.0);
        assert_abs_diff_eq!(s.last_mean_offset, 27.5);
        assert_eq!(s.last_count, 12);

        // Within 1.0 of the rejected frame's mean: blended from 0.
        assert_eq!(s.update(&ok(28.0, 20), &cfg), SmoothingDecision::Blended);
        assert_abs_diff_eq!(s.smoothed_offset, 5.6, epsilon = 1e-5);
    }

    #[test]
    fn test_far_estimate_skipped_then_blended() {
        let cfg = SmoothingConfig::default();
        let mut s = SeamState::default();
        assert_eq!(s.update(&ok(20.0, 12), &cfg), SmoothingDecision::Skipped);
        assert_eq!(s.smoothed_offset, 0.0);
        assert_eq!(s.last_mean_offset, 20.0);
        assert_eq!(s.last_count, 12);

        // Close to the last mean now, though still far from the smoothed value.
        assert_eq!(s.update(&ok(20.5, 12), &cfg), SmoothingDecision::Blended);
        assert_abs_diff_eq!(s.smoothed_offset, 4.1, epsilon = 1e-5);
    }

    #[test]
    fn test_blend_near_smoothed() {
        let cfg = SmoothingConfig::default();
        let mut s = SeamState { last_count: 10, last_mean_offset: -8.0, smoothed_offset: 2.0 };
        assert_eq!(s.update(&ok(5.0, 10), &cfg), SmoothingDecision::Blended);
        assert_abs_diff_eq!(s.smoothed_offset, 2.6, epsilon = 1e-5);
    }

    #[test]
    fn test_adjust_fixed_point() {
        let cfg = StitchConfig::default();
        let mut s0 = Rect::new(568, 0, 56, 96);
        let mut s1 = Rect::new(16, 0, 56, 96);
        adjust_stitch_area(640, &mut s0, &mut s1, &cfg);
        assert_eq!((s0.x, s0.width, s1.x, s1.width), (568, 56, 16, 56));
    }

    #[test]
    fn test_adjust_absorbs_small_shift() {
        let cfg = StitchConfig::default();
        let mut s0 = Rect::new(571, 0, 56, 96);
        let mut s1 = Rect::new(16, 0, 56, 96);
        adjust_stitch_area(640, &mut s0, &mut s1, &cfg);
        assert_eq!((s0.x, s1.x), (568, 16));
    }

    #[test]
    fn test_adjust_moves_on_larger_shift() {
        let cfg = StitchConfig::default();
        let mut s0 = Rect::new(573, 0, 56, 96);
        let mut s1 = Rect::new(16, 0, 56, 96);
        adjust_stitch_area(640, &mut s0, &mut s1, &cfg);
        assert_eq!((s0.x, s1.x), (576, 16));
        assert_eq!(s1.x % cfg.alignment, 0);
    }

    #[test]
    fn test_narrow_overlap_widened_to_seam() {
        let cfg = StitchConfig::default();
        let mut s0 = Rect::new(620, 0, 56, 96);
        let mut s1 = Rect::new(0, 0, 56, 96);
        adjust_stitch_area(640, &mut s0, &mut s1, &cfg);
        assert_eq!((s0.x, s0.width, s1.x, s1.width), (584, 56, 0, 56));
    }

    #[test]
    fn test_unaligned_panorama_width() {
        let cfg = StitchConfig::default();
        let mut s0 = Rect::new(572, 0, 56, 96);
        let mut s1 = Rect::new(16, 0, 56, 96);
        adjust_stitch_area(644, &mut s0, &mut s1, &cfg);
        assert_eq!(s1.x % cfg.alignment, 0);
        // Overlap 72 + 644 - 628 = 88; s0.x = 644 - 88 + 16.
        assert_eq!((s0.x, s1.x), (572, 16));
        assert_ne!(s0.x % cfg.alignment, 0);
    }
}
