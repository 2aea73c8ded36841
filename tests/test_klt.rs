// tests/test_klt.rs — Integration tests for the pyramidal KLT tracker,
// driven the way the seam estimator drives it: detect in one crop, track
// into a horizontally shifted copy.

use geoseam::config::{GfttConfig, TrackerConfig};
use geoseam::gftt::GoodFeaturesDetector;
use geoseam::image::Image;
use geoseam::klt::{KltTracker, TrackStatus};
use geoseam::pyramid::Pyramid;

/// Smooth blobs on a gray background; `shift_x` moves all of them.
fn blob_strip(w: usize, h: usize, shift_x: f32) -> Image<u8> {
    let centers: Vec<(f32, f32)> = (0..8).map(|i| (18.0 + (i % 3) as f32 * 12.0, 16.0 + i as f32 * 22.0)).collect();
    let mut img = Image::<u8>::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut v = 40.0f32;
            for &(cx, cy) in &centers {
                let dx = x as f32 - cx - shift_x;
                let dy = y as f32 - cy;
                v += 170.0 * (-(dx * dx + dy * dy) / 30.0).exp();
            }
            img.set(x, y, v.min(255.0) as u8);
        }
    }
    img
}

fn tracker() -> KltTracker {
    KltTracker::new(TrackerConfig::default())
}

#[test]
fn detect_then_track_recovers_shift() {
    let a = blob_strip(72, 190, 0.0);
    let b = blob_strip(72, 190, 4.0);
    let points: Vec<(f32, f32)> = GoodFeaturesDetector::new(GfttConfig::default())
        .detect(&a)
        .iter()
        .map(|k| (k.x, k.y))
        .collect();
    assert!(points.len() >= 8, "only {} points", points.len());

    let results = tracker().track(&a, &b, &points);
    assert_eq!(results.len(), points.len());

    let shifts: Vec<f32> = results
        .iter()
        .zip(&points)
        .filter(|(r, _)| r.is_tracked() && r.error <= 16.0)
        .map(|(r, p)| r.x - p.0)
        .collect();
    assert!(shifts.len() * 2 >= points.len(), "tracked {} of {}", shifts.len(), points.len());
    let mut sorted = shifts.clone();
    sorted.sort_by(f32::total_cmp);
    let median = sorted[sorted.len() / 2];
    assert!((median - 4.0).abs() < 0.5, "median shift {median}");
}

#[test]
fn sub_pixel_shift() {
    let a = blob_strip(72, 190, 0.0);
    let b = blob_strip(72, 190, 1.5);
    let r = tracker().track(&a, &b, &[(18.0, 16.0), (30.0, 38.0)]);
    for t in &r {
        assert!(t.is_tracked());
    }
    assert!((r[0].x - 19.5).abs() < 0.5, "x = {}", r[0].x);
    assert!((r[1].y - 38.0).abs() < 0.5, "y = {}", r[1].y);
}

#[test]
fn pyramids_can_be_reused() {
    let a = blob_strip(72, 190, 0.0);
    let b = blob_strip(72, 190, 3.0);
    let t = tracker();
    let min_size = 2 * t.config.window_half_size + 1;
    let pa = Pyramid::build(&a, t.config.max_levels, min_size);
    let pb = Pyramid::build(&b, t.config.max_levels, min_size);
    let direct = t.track(&a, &b, &[(30.0, 38.0)]);
    let reused = t.track_pyramids(&pa, &pb, &[(30.0, 38.0)]);
    assert_eq!(direct[0].status, reused[0].status);
    assert!((direct[0].x - reused[0].x).abs() < 1e-3);
}

#[test]
fn points_outside_are_not_tracked() {
    let a = blob_strip(72, 190, 0.0);
    let r = tracker().track(&a, &a, &[(-5.0, 10.0), (80.0, 10.0)]);
    assert!(r.iter().all(|t| t.status != TrackStatus::Tracked));
}

#[test]
fn empty_point_list() {
    let a = blob_strip(72, 190, 0.0);
    assert!(tracker().track(&a, &a, &[]).is_empty());
}
