// tests/test_seam.rs — Integration tests for the seam aligner on
// synthetic two-camera frames.
//
// Frames are 640×96. Seam 0 compares image 0 at x 16..72 with image 1 at
// x 568..624; seam 1 compares image 0 at 568..624 with image 1 at 16..72.
// That crop set is a fixed point of the recentering step for a 640-wide
// destination.

use std::cell::RefCell;
use std::rc::Rc;

use geoseam::color::{Nv12Image, Rect};
use geoseam::config::AlignerConfig;
use geoseam::debug::{AlignmentObserver, SeamReport};
use geoseam::error::RemapError;
use geoseam::image::Image;
use geoseam::seam::{CropSet, SeamAligner, SmoothingDecision};

const W: usize = 640;
const H: usize = 96;

fn fixed_crops() -> CropSet {
    CropSet {
        image0_left: Rect::new(16, 0, 56, H as i32),
        image0_right: Rect::new(568, 0, 56, H as i32),
        image1_left: Rect::new(16, 0, 56, H as i32),
        image1_right: Rect::new(568, 0, 56, H as i32),
    }
}

/// Flat frame with a patch of soft blobs whose local origin is `origin_x`.
fn frame_with_blobs(origin_x: Option<f32>) -> Nv12Image {
    let mut y_plane = Image::from_vec(W, H, vec![60u8; W * H]);
    if let Some(ox) = origin_x {
        let mut centers = Vec::new();
        for row in 0..6 {
            for col in 0..3 {
                centers.push((ox + 10.0 + col as f32 * 13.0 + (row % 2) as f32 * 4.0, 10.0 + row as f32 * 15.0));
            }
        }
        for y in 0..H {
            for x in 0..W {
                let mut v = 60.0f32;
                for &(cx, cy) in &centers {
                    let dx = x as f32 - cx;
                    let dy = y as f32 - cy;
                    v += 170.0 * (-(dx * dx + dy * dy) / 18.0).exp();
                }
                y_plane.set(x, y, v.min(235.0) as u8);
            }
        }
    }
    Nv12Image { y: y_plane, uv: Image::from_vec(W, H / 2, vec![128u8; W * H / 2]) }
}

#[test]
fn featureless_frames_keep_crops_and_reset() {
    let frame = frame_with_blobs(None);
    let mut aligner = SeamAligner::new(&AlignerConfig::default());
    let mut crops = fixed_crops();
    let out = aligner.align(&frame, &frame, W as i32, &mut crops).unwrap();
    assert_eq!(crops, fixed_crops());
    for o in &out {
        assert!(o.estimate.is_err());
        assert_eq!(o.decision, SmoothingDecision::Reset);
        assert!(!o.crop_reset);
    }
    assert_eq!(aligner.state(0).unwrap().smoothed_offset, 0.0);
    assert_eq!(aligner.frames_aligned(), 1);
}

#[test]
fn offset_is_smoothed_across_frames() {
    // Image 1's right crop shows image 0's left-crop content 3 px further right.
    let image0 = frame_with_blobs(Some(16.0));
    let image1 = frame_with_blobs(Some(568.0 + 3.0));
    let mut aligner = SeamAligner::new(&AlignerConfig::default());
    let mut crops = fixed_crops();

    let out = aligner.align(&image0, &image1, W as i32, &mut crops).unwrap();
    let mean = out[0].estimate.as_ref().unwrap().mean;
    assert!((mean - 3.0).abs() < 0.5, "mean {mean}");
    assert_eq!(out[0].decision, SmoothingDecision::Blended);
    let first = aligner.state(0).unwrap().smoothed_offset;
    assert!((first - mean * 0.2).abs() < 1e-4);
    // A 0.6 px shift truncates away; nothing moves.
    assert!(!out[0].crop_reset);
    assert_eq!(crops, fixed_crops());
    // Seam 1 sees flat crops.
    assert_eq!(out[1].decision, SmoothingDecision::Reset);

    let out = aligner.align(&image0, &image1, W as i32, &mut crops).unwrap();
    assert_eq!(out[0].decision, SmoothingDecision::Blended);
    let second = aligner.state(0).unwrap().smoothed_offset;
    assert!(second > first, "{second} <= {first}");
    assert_eq!(aligner.frames_aligned(), 2);
}

#[test]
fn crop_outside_frame_is_rejected() {
    let frame = frame_with_blobs(None);
    let mut aligner = SeamAligner::new(&AlignerConfig::default());
    let mut crops = fixed_crops();
    crops.image1_right.x = 600;
    let err = aligner.align(&frame, &frame, W as i32, &mut crops).unwrap_err();
    assert!(matches!(err, RemapError::Parameter(_)));
    assert_eq!(aligner.frames_aligned(), 0);
    assert_eq!(crops.image1_right.x, 600);
}

#[test]
fn recentering_snaps_crops_to_seam_width() {
    let frame = frame_with_blobs(None);
    let mut aligner = SeamAligner::new(&AlignerConfig::default());
    let mut crops = fixed_crops();
    crops.image0_left = Rect::new(20, 0, 48, H as i32);
    let out = aligner.align(&frame, &frame, W as i32, &mut crops).unwrap();
    assert!(out[0].crop_reset);
    for r in [crops.image0_left, crops.image1_right, crops.image0_right, crops.image1_left] {
        assert_eq!(r.width, 56);
    }
    assert_eq!(crops.image0_left.x % 8, 0);
}

struct Recorder(Rc<RefCell<Vec<(u64, usize, usize)>>>);

impl AlignmentObserver for Recorder {
    fn on_seam(&mut self, report: &SeamReport<'_>) {
        self.0.borrow_mut().push((report.frame, report.seam, report.image0.width()));
    }
}

#[test]
fn observer_sees_every_seam() {
    let frame = frame_with_blobs(None);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut aligner = SeamAligner::new(&AlignerConfig::default());
    aligner.set_observer(Box::new(Recorder(seen.clone())));
    let mut crops = fixed_crops();
    aligner.align(&frame, &frame, W as i32, &mut crops).unwrap();
    aligner.align(&frame, &frame, W as i32, &mut crops).unwrap();
    assert_eq!(*seen.borrow(), vec![(1, 0, 56), (1, 1, 56), (2, 0, 56), (2, 1, 56)]);

    aligner.clear_observer();
    aligner.align(&frame, &frame, W as i32, &mut crops).unwrap();
    assert_eq!(seen.borrow().len(), 4);
}
