// orb.rs — Oriented FAST keypoints on a scale pyramid (the detection half
// of ORB; descriptors are not needed for optical-flow seeding).
//
// Per level l (scale s^l):
//   1. Resize the source by 1/s^l (bilinear).
//   2. FAST-9 with an `edge_threshold` border.
//   3. Keep the 2×quota best by FAST score, re-rank by Harris response,
//      keep the quota.
//   4. Orientation from the intensity centroid of a circular patch.
// Quotas follow a geometric series so finer levels get more keypoints.

use crate::config::OrbConfig;
use crate::detector::Keypoint;
use crate::fast::FastDetector;
use crate::gradient::StructureTensor;
use crate::image::{resize_bilinear, to_u8, Image};

/// Structure-tensor window for the Harris re-ranking.
const HARRIS_BLOCK_SIZE: usize = 7;

#[derive(Debug, Clone)]
pub struct OrbDetector {
    pub config: OrbConfig,
    fast: FastDetector,
}

impl OrbDetector {
    pub fn new(config: OrbConfig) -> Self {
        let fast = FastDetector::new(config.fast_threshold, 9);
        OrbDetector { config, fast }
    }

    /// Keypoints from all levels, in level-0 coordinates, strongest first
    /// within each level.
    pub fn detect(&self, image: &Image<u8>) -> Vec<Keypoint> {
        let cfg = &self.config;
        let quotas = level_quotas(cfg.max_features, cfg.scale_factor, cfg.n_levels);
        let mut out = Vec::with_capacity(cfg.max_features);

        for (level, &quota) in quotas.iter().enumerate() {
            let scale = cfg.scale_factor.powi(level as i32);
            let lw = (image.width() as f32 / scale).round() as usize;
            let lh = (image.height() as f32 / scale).round() as usize;
            if lw <= 2 * cfg.edge_threshold || lh <= 2 * cfg.edge_threshold || quota == 0 {
                break;
            }
            let level_img = if level == 0 {
                image.clone()
            } else {
                to_u8(&resize_bilinear(image, lw, lh))
            };

            for mut kp in self.detect_level(&level_img, level, quota) {
                kp.x *= scale;
                kp.y *= scale;
                out.push(kp);
            }
        }
        out
    }

    fn detect_level(&self, img: &Image<u8>, level: usize, quota: usize) -> Vec<Keypoint> {
        let mut kps = self.fast.detect_with_border(img, self.config.edge_threshold, level);
        if kps.is_empty() {
            return kps;
        }

        kps.sort_by(|a, b| b.response.total_cmp(&a.response));
        kps.truncate(2 * quota);

        let tensor = StructureTensor::compute(img, HARRIS_BLOCK_SIZE);
        for kp in &mut kps {
            kp.response = tensor.harris(kp.x as usize, kp.y as usize, self.config.harris_k);
        }
        kps.sort_by(|a, b| b.response.total_cmp(&a.response));
        kps.truncate(quota);

        let radius = (self.config.patch_size / 2) as isize;
        for kp in &mut kps {
            kp.angle = Some(intensity_centroid_angle(img, kp.x as usize, kp.y as usize, radius));
        }
        kps
    }
}

/// Split `total` keypoints over `n_levels` with ratio 1/scale_factor.
pub fn level_quotas(total: usize, scale_factor: f32, n_levels: usize) -> Vec<usize> {
    if n_levels == 0 {
        return Vec::new();
    }
    let factor = 1.0 / scale_factor;
    let first = total as f32 * (1.0 - factor) / (1.0 - factor.powi(n_levels as i32));
    let mut quotas = Vec::with_capacity(n_levels);
    let mut assigned = 0usize;
    let mut desired = first;
    for _ in 0..n_levels - 1 {
        let q = (desired.round() as usize).min(total - assigned);
        quotas.push(q);
        assigned += q;
        desired *= factor;
    }
    quotas.push(total - assigned);
    quotas
}

/// atan2(m01, m10) over a disc of `radius`, clipped to the image.
fn intensity_centroid_angle(img: &Image<u8>, cx: usize, cy: usize, radius: isize) -> f32 {
    let (w, h) = (img.width() as isize, img.height() as isize);
    let r2 = radius * radius;
    let (mut m01, mut m10) = (0.0f32, 0.0f32);
    for dy in -radius..=radius {
        let y = cy as isize + dy;
        if y < 0 || y >= h {
            continue;
        }
        for dx in -radius..=radius {
            let x = cx as isize + dx;
            if x < 0 || x >= w || dx * dx + dy * dy > r2 {
                continue;
            }
            let v = img.get(x as usize, y as usize) as f32;
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(w: usize, h: usize) -> Image<u8> {
        let mut img = Image::from_vec(w, h, vec![25u8; w * h]);
        for by in 0..(h / 24) {
            for bx in 0..(w / 24) {
                if (bx + by) % 2 == 0 {
                    continue;
                }
                for y in by * 24 + 4..by * 24 + 16 {
                    for x in bx * 24 + 4..bx * 24 + 16 {
                        img.set(x, y, 210);
                    }
                }
            }
        }
        img
    }

    #[test]
    fn test_quotas_sum_to_total() {
        let q = level_quotas(200, 1.5, 2);
        assert_eq!(q.len(), 2);
        assert_eq!(q.iter().sum::<usize>(), 200);
        assert_eq!(q[0], 120);
        assert!(q[0] > q[1]);
    }

    #[test]
    fn test_detects_on_both_levels() {
        let img = blocks(192, 144);
        let kps = OrbDetector::new(OrbConfig::default()).detect(&img);
        assert!(!kps.is_empty());
        assert!(kps.len() <= 200);
        assert!(kps.iter().any(|k| k.octave == 0));
        assert!(kps.iter().any(|k| k.octave == 1));
        assert!(kps.iter().all(|k| k.angle.is_some()));
    }

    #[test]
    fn test_edge_threshold_border() {
        let img = blocks(192, 144);
        let cfg = OrbConfig { n_levels: 1, ..OrbConfig::default() };
        let kps = OrbDetector::new(cfg).detect(&img);
        for k in &kps {
            assert!(k.x >= 9.0 && k.y >= 9.0 && k.x < 183.0 && k.y < 135.0);
        }
    }

    #[test]
    fn test_orientation_points_to_bright_side() {
        let mut img = Image::from_vec(31, 31, vec![0u8; 961]);
        for y in 0..31 {
            for x in 16..31 {
                img.set(x, y, 200);
            }
        }
        let a = intensity_centroid_angle(&img, 15, 15, 7);
        assert!(a.abs() < 0.05, "angle {a}");
    }
}
