// detector.rs — Common keypoint type and the `Detector` trait.
//
// The correspondence estimator holds a list of boxed detectors and simply
// concatenates what each one returns, so adding a feature source means
// implementing this trait and nothing else.

use crate::fast::FastDetector;
use crate::gftt::GoodFeaturesDetector;
use crate::image::Image;
use crate::orb::OrbDetector;

/// A detected keypoint in level-0 pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Detector-specific strength; larger is stronger.
    pub response: f32,
    /// Pyramid level the keypoint was found on.
    pub octave: usize,
    /// Orientation in radians, for detectors that compute one.
    pub angle: Option<f32>,
}

pub trait Detector {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    fn detect(&self, image: &Image<u8>) -> Vec<Keypoint>;

    /// Detect, then keep only keypoints where `mask > 0`.
    fn detect_masked(&self, image: &Image<u8>, mask: &Image<u8>) -> Vec<Keypoint> {
        self.detect(image)
            .into_iter()
            .filter(|k| {
                let (x, y) = (k.x as usize, k.y as usize);
                x < mask.width() && y < mask.height() && mask.get(x, y) > 0
            })
            .collect()
    }
}

impl Detector for FastDetector {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn detect(&self, image: &Image<u8>) -> Vec<Keypoint> {
        FastDetector::detect(self, image)
    }
}

impl Detector for GoodFeaturesDetector {
    fn name(&self) -> &'static str {
        "gftt"
    }

    fn detect(&self, image: &Image<u8>) -> Vec<Keypoint> {
        GoodFeaturesDetector::detect(self, image)
    }
}

impl Detector for OrbDetector {
    fn name(&self) -> &'static str {
        "orb"
    }

    fn detect(&self, image: &Image<u8>) -> Vec<Keypoint> {
        OrbDetector::detect(self, image)
    }
}
