// correspondence.rs — Horizontal offset between two overlapping crops.
//
// Per seam and frame:
//   1. detect corners in crop 0 with every configured detector (the lists
//      are concatenated, duplicates and all)
//   2. track them into crop 1 with pyramidal KLT
//   3. keep tracks that succeeded, have error ≤ 16 and |dy| < 4, and record
//      their x offsets
//   4. robust mean of the offsets
//
// Robust mean: seeded from the median, then up to 3 passes that keep the
// offsets within 4.0 of the current mean and recompute it. A pass rejects
// the estimate when fewer than 8 offsets survive or when the mean moves by
// more than 1.2× the previous pass's movement. Passes stop early once the
// kept set no longer changes.
//
// A rejection still reports the mean it stopped at (the seed, or the
// diverged mean) and the count of the last completed pass, so the seam
// state can compare the next frame against it.

use log::{debug, info, warn};

use crate::config::{AlignerConfig, CorrespondenceConfig};
use crate::detector::Detector;
use crate::error::EstimationReject;
use crate::gftt::GoodFeaturesDetector;
use crate::image::Image;
use crate::klt::{KltTracker, TrackStatus};
use crate::orb::OrbDetector;

/// One tracked point pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub p0: (f32, f32),
    pub p1: (f32, f32),
    pub status: TrackStatus,
    pub error: f32,
}

impl Correspondence {
    pub fn offset_x(&self) -> f32 {
        self.p1.0 - self.p0.0
    }

    pub fn offset_y(&self) -> f32 {
        self.p1.1 - self.p0.1
    }
}

/// Offsets of the accepted correspondences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OffsetSet {
    pub offsets: Vec<f32>,
    pub sum: f32,
    /// Parallel to the correspondence list.
    pub accepted: Vec<bool>,
}

impl OffsetSet {
    pub fn count(&self) -> usize {
        self.offsets.len()
    }
}

/// A converged robust mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustMean {
    pub mean: f32,
    /// Offsets in the final kept set.
    pub count: usize,
    /// Refinement passes run.
    pub passes: usize,
}

/// Everything one estimate produced, for the aligner and the debug hook.
#[derive(Debug, Clone)]
pub struct Estimate {
    pub correspondences: Vec<Correspondence>,
    pub offsets: OffsetSet,
    pub result: Result<RobustMean, EstimationReject>,
}

pub struct FeatureCorrespondenceEstimator {
    detectors: Vec<Box<dyn Detector>>,
    tracker: KltTracker,
    config: CorrespondenceConfig,
}

impl FeatureCorrespondenceEstimator {
    /// GFTT + ORB detectors and the KLT tracker, as configured.
    pub fn new(config: &AlignerConfig) -> Self {
        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(GoodFeaturesDetector::new(config.detector.gftt.clone())),
            Box::new(OrbDetector::new(config.detector.orb.clone())),
        ];
        Self::with_detectors(detectors, KltTracker::new(config.tracker.clone()), config.correspondence.clone())
    }

    pub fn with_detectors(
        detectors: Vec<Box<dyn Detector>>,
        tracker: KltTracker,
        config: CorrespondenceConfig,
    ) -> Self {
        FeatureCorrespondenceEstimator { detectors, tracker, config }
    }

    pub fn config(&self) -> &CorrespondenceConfig {
        &self.config
    }

    /// Union of every detector's keypoints.
    pub fn detect(&self, image: &Image<u8>) -> Vec<(f32, f32)> {
        let mut points = Vec::new();
        for det in &self.detectors {
            let kps = det.detect(image);
            debug!("{}: {} keypoints", det.name(), kps.len());
            points.extend(kps.iter().map(|k| (k.x, k.y)));
        }
        points
    }

    pub fn track(&self, image0: &Image<u8>, image1: &Image<u8>, points0: &[(f32, f32)]) -> Vec<Correspondence> {
        self.tracker
            .track(image0, image1, points0)
            .into_iter()
            .zip(points0)
            .map(|(r, &p0)| Correspondence { p0, p1: (r.x, r.y), status: r.status, error: r.error })
            .collect()
    }

    /// Accept tracked pairs with a small error and little vertical motion.
    pub fn filter_offsets(&self, correspondences: &[Correspondence]) -> OffsetSet {
        let mut set = OffsetSet { accepted: Vec::with_capacity(correspondences.len()), ..OffsetSet::default() };
        for c in correspondences {
            let ok = c.status == TrackStatus::Tracked
                && c.error <= self.config.max_track_error
                && c.offset_y().abs() < self.config.max_dy;
            set.accepted.push(ok);
            if ok {
                set.offsets.push(c.offset_x());
                set.sum += c.offset_x();
            }
        }
        set
    }

    pub fn robust_mean(&self, offsets: &[f32], sum: f32, count: usize) -> Result<RobustMean, EstimationReject> {
        let cfg = &self.config;
        if count < cfg.min_count || offsets.len() < cfg.min_count {
            warn!("only {count} offsets, need {}", cfg.min_count);
            return Err(EstimationReject { mean: 0.0, count });
        }
        info!("X-axis mean offset:{:.2}, pre_mean_offset:{:.2} (0 times, count:{count})", sum / count as f32, 0.0);

        let mut mean = median(offsets);
        let mut pre_mean = mean;
        let mut delta = cfg.initial_delta;
        let mut count = count;
        let mut passes = 0;
        let mut kept_before = vec![true; offsets.len()];

        for pass in 1..=cfg.max_passes {
            let kept: Vec<bool> = offsets.iter().map(|o| (o - mean).abs() < cfg.inlier_window).collect();
            let (kept_sum, kept_count) = offsets
                .iter()
                .zip(&kept)
                .filter(|(_, k)| **k)
                .fold((0.0f32, 0usize), |(s, n), (o, _)| (s + o, n + 1));
            if kept_count < cfg.min_count {
                warn!("pass {pass}: {kept_count} offsets within {} of {mean:.2}", cfg.inlier_window);
                return Err(EstimationReject { mean, count });
            }

            let new_mean = kept_sum / kept_count as f32;
            info!("X-axis mean offset:{new_mean:.2}, pre_mean_offset:{pre_mean:.2} ({pass} times, count:{kept_count})");
            if (new_mean - pre_mean).abs() > delta.abs() * cfg.divergence_factor {
                warn!("mean offset diverged: {pre_mean:.2} -> {new_mean:.2}");
                return Err(EstimationReject { mean: new_mean, count });
            }

            delta = new_mean - pre_mean;
            pre_mean = new_mean;
            mean = new_mean;
            count = kept_count;
            passes = pass;
            if kept == kept_before {
                break;
            }
            kept_before = kept;
        }
        Ok(RobustMean { mean, count, passes })
    }

    /// detect → track → filter → robust mean.
    pub fn estimate(&self, image0: &Image<u8>, image1: &Image<u8>) -> Estimate {
        let points = self.detect(image0);
        let correspondences = self.track(image0, image1, &points);
        let offsets = self.filter_offsets(&correspondences);
        debug!(
            "{} points, {} tracked, {} accepted",
            points.len(),
            correspondences.iter().filter(|c| c.status == TrackStatus::Tracked).count(),
            offsets.count()
        );
        let result = self.robust_mean(&offsets.offsets, offsets.sum, offsets.count());
        Estimate { correspondences, offsets, result }
    }
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}
