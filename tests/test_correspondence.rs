// tests/test_correspondence.rs — Integration tests for the offset
// estimator: the robust mean on hand-made offset lists, and the full
// detect → track → filter → mean chain on synthetic seam crops.

use geoseam::config::AlignerConfig;
use geoseam::correspondence::FeatureCorrespondenceEstimator;
use geoseam::image::Image;

fn estimator() -> FeatureCorrespondenceEstimator {
    FeatureCorrespondenceEstimator::new(&AlignerConfig::default())
}

fn robust(offsets: &[f32]) -> Result<geoseam::RobustMean, geoseam::EstimationReject> {
    estimator().robust_mean(offsets, offsets.iter().sum(), offsets.len())
}

/// 56-wide crop with a staggered grid of soft blobs, moved right by `shift`.
fn seam_crop(shift: f32) -> Image<u8> {
    let (w, h) = (56usize, 96usize);
    let mut centers = Vec::new();
    for row in 0..6 {
        for col in 0..3 {
            centers.push((10.0 + col as f32 * 13.0 + (row % 2) as f32 * 4.0, 10.0 + row as f32 * 15.0));
        }
    }
    let mut img = Image::<u8>::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut v = 35.0f32;
            for &(cx, cy) in &centers {
                let dx = x as f32 - cx - shift;
                let dy = y as f32 - cy;
                v += 180.0 * (-(dx * dx + dy * dy) / 18.0).exp();
            }
            img.set(x, y, v.min(255.0) as u8);
        }
    }
    img
}

// ===== Robust mean =====

#[test]
fn outliers_are_dropped() {
    let mut offsets = vec![10.0f32; 20];
    offsets.extend([100.0f32; 5]);
    let r = robust(&offsets).unwrap();
    assert!((r.mean - 10.0).abs() < 1e-4);
    assert_eq!(r.count, 20);
    assert_eq!(r.passes, 2);
}

#[test]
fn stable_set_converges_in_one_pass() {
    let r = robust(&[14.3f32; 30]).unwrap();
    assert!((r.mean - 14.3).abs() < 1e-3);
    assert_eq!(r.count, 30);
    assert_eq!(r.passes, 1);
}

#[test]
fn spread_set_converges_in_one_pass() {
    // 14.3 ± 1.5 in symmetric steps, all inside the window.
    let mut offsets: Vec<f32> = (0..28).map(|i| 14.3 + [-1.5, -0.5, 0.5, 1.5][i % 4]).collect();
    offsets.extend([14.3f32; 2]);
    let r = robust(&offsets).unwrap();
    assert!((r.mean - 14.3).abs() < 1e-3);
    assert_eq!(r.count, 30);
    assert_eq!(r.passes, 1);
}

#[test]
fn too_few_offsets_rejected() {
    let err = robust(&[2.0f32; 7]).unwrap_err();
    assert_eq!(err.count, 7);
    assert_eq!(err.mean, 0.0);
    assert!(robust(&[]).is_err());
}

#[test]
fn too_few_inliers_rejected() {
    // Twelve offsets five apart: at most two share a window.
    let offsets: Vec<f32> = (0..12).map(|i| i as f32 * 5.0).collect();
    let err = robust(&offsets).unwrap_err();
    // The reject keeps the seed mean and the incoming count.
    assert!((err.mean - 27.5).abs() < 1e-4);
    assert_eq!(err.count, 12);
}

#[test]
fn diverging_mean_rejected() {
    // The first pass barely moves the mean, which pulls a whole cluster
    // just outside the window into the second pass.
    let mut offsets = vec![0.0f32; 20];
    offsets.extend([-3.5, 3.99]);
    offsets.extend([4.02f32; 10]);
    let err = robust(&offsets).unwrap_err();
    // Count of the last completed pass: the 22 offsets kept by pass 1.
    assert_eq!(err.count, 22);
    assert!((err.mean - 1.27).abs() < 0.01, "mean {}", err.mean);
}

#[test]
fn negative_offsets() {
    let mut offsets = vec![-6.0f32; 10];
    offsets.extend([-5.0f32; 10]);
    let r = robust(&offsets).unwrap();
    assert!((r.mean + 5.5).abs() < 1e-4);
    assert_eq!(r.count, 20);
}

// ===== Full estimate =====

#[test]
fn estimates_horizontal_shift_between_crops() {
    let a = seam_crop(0.0);
    let b = seam_crop(3.0);
    let est = estimator().estimate(&a, &b);
    assert_eq!(est.correspondences.len(), est.offsets.accepted.len());
    assert!(est.offsets.count() >= 8, "only {} accepted", est.offsets.count());
    let r = est.result.unwrap();
    assert!((r.mean - 3.0).abs() < 0.5, "mean {}", r.mean);
    assert!(r.count >= 8);
}

#[test]
fn identical_crops_give_zero_offset() {
    let a = seam_crop(0.0);
    let r = estimator().estimate(&a, &a).result.unwrap();
    assert!(r.mean.abs() < 0.1, "mean {}", r.mean);
}

#[test]
fn featureless_crops_are_rejected() {
    let flat = Image::from_vec(56, 96, vec![120u8; 56 * 96]);
    let est = estimator().estimate(&flat, &flat);
    assert!(est.correspondences.is_empty());
    let err = est.result.unwrap_err();
    assert_eq!(err.count, 0);
    assert_eq!(err.mean, 0.0);
}

#[test]
fn accepted_offsets_sum_matches() {
    let a = seam_crop(0.0);
    let b = seam_crop(2.0);
    let est = estimator().estimate(&a, &b);
    let sum: f32 = est.offsets.offsets.iter().sum();
    assert!((sum - est.offsets.sum).abs() < 1e-3);
    assert_eq!(est.offsets.accepted.iter().filter(|a| **a).count(), est.offsets.count());
}
