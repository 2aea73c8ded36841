// fast.rs — FAST segment-test corners.
//
// 16 pixels on a radius-3 Bresenham circle are classified brighter/darker
// than the center ± threshold; a corner needs `arc_length` contiguous hits.
// The contiguity test runs on a doubled u16 mask so the wrap from index 15
// to 0 needs no special case.
//
// The ORB detector runs this on every pyramid level and re-ranks the
// candidates with a Harris score, so the FAST score here only has to be
// monotone in contrast.

use crate::detector::Keypoint;
use crate::image::Image;

/// Circle offsets, clockwise from 12 o'clock.
pub(crate) const CIRCLE_OFFSETS: [(isize, isize); 16] = [
    ( 0, -3), ( 1, -3), ( 2, -2), ( 3, -1),
    ( 3,  0), ( 3,  1), ( 2,  2), ( 1,  3),
    ( 0,  3), (-1,  3), (-2,  2), (-3,  1),
    (-3,  0), (-3, -1), (-2, -2), (-1, -3),
];

/// FAST-N corner detector.
#[derive(Debug, Clone)]
pub struct FastDetector {
    /// Intensity difference a circle pixel must exceed.
    pub threshold: u8,
    /// Contiguous pixels required, 9..=12.
    pub arc_length: usize,
}

impl FastDetector {
    /// # Panics
    /// Panics if `arc_length` is not in 9..=12.
    pub fn new(threshold: u8, arc_length: usize) -> Self {
        assert!(
            (9..=12).contains(&arc_length),
            "arc_length must be 9..=12 (got {arc_length})"
        );
        FastDetector { threshold, arc_length }
    }

    /// Corners anywhere the circle fits (3-pixel border).
    pub fn detect(&self, image: &Image<u8>) -> Vec<Keypoint> {
        self.detect_with_border(image, 3, 0)
    }

    /// Corners at least `border` pixels from every edge, tagged with
    /// `octave`. `border` is raised to 3 if smaller.
    pub fn detect_with_border(&self, image: &Image<u8>, border: usize, octave: usize) -> Vec<Keypoint> {
        let border = border.max(3);
        let (w, h) = (image.width(), image.height());
        let mut out = Vec::new();
        if w <= 2 * border || h <= 2 * border {
            return out;
        }

        let thresh = self.threshold as i16;
        let min_cardinals: u8 = if self.arc_length >= 12 { 3 } else { 2 };
        let at = |x: usize, y: usize, (dx, dy): (isize, isize)| -> i16 {
            // SAFETY: callers stay >= 3 pixels inside the image and every
            // circle offset is within ±3.
            unsafe { image.get_unchecked((x as isize + dx) as usize, (y as isize + dy) as usize) as i16 }
        };

        for y in border..h - border {
            for x in border..w - border {
                let center = at(x, y, (0, 0));

                // Cardinal points first; most pixels stop here.
                let mut bright = 0u8;
                let mut dark = 0u8;
                for &i in &[0usize, 4, 8, 12] {
                    let v = at(x, y, CIRCLE_OFFSETS[i]);
                    bright += (v > center + thresh) as u8;
                    dark += (v < center - thresh) as u8;
                }
                if bright < min_cardinals && dark < min_cardinals {
                    continue;
                }

                let mut circle = [0i16; 16];
                for (slot, &off) in circle.iter_mut().zip(CIRCLE_OFFSETS.iter()) {
                    *slot = at(x, y, off);
                }
                if let Some(score) = self.segment_score(center, &circle, thresh) {
                    out.push(Keypoint {
                        x: x as f32,
                        y: y as f32,
                        response: score,
                        octave,
                        angle: None,
                    });
                }
            }
        }
        out
    }

    /// `Some(score)` if a long enough bright or dark arc exists. The score
    /// sums `|diff| - threshold` over the longest qualifying arc.
    fn segment_score(&self, center: i16, circle: &[i16; 16], thresh: i16) -> Option<f32> {
        let mut bright_mask: u16 = 0;
        let mut dark_mask: u16 = 0;
        for (i, &v) in circle.iter().enumerate() {
            let diff = v - center;
            if diff > thresh {
                bright_mask |= 1 << i;
            } else if diff < -thresh {
                dark_mask |= 1 << i;
            }
        }

        [bright_mask, dark_mask]
            .into_iter()
            .filter(|&m| has_run(m, self.arc_length))
            .map(|m| arc_score(center, circle, thresh, m))
            .reduce(f32::max)
    }
}

/// True if the circular 16-bit mask has `n` contiguous set bits.
fn has_run(mask: u16, n: usize) -> bool {
    if (mask.count_ones() as usize) < n {
        return false;
    }
    let mut acc = (mask as u32) | ((mask as u32) << 16);
    for _ in 1..n {
        acc &= acc >> 1;
    }
    acc != 0
}

fn arc_score(center: i16, circle: &[i16; 16], thresh: i16, mask: u16) -> f32 {
    let m32 = (mask as u32) | ((mask as u32) << 16);
    let (mut best_start, mut best_len) = (0usize, 0usize);
    let mut i = 0usize;
    while i < 16 {
        if m32 & (1 << i) == 0 {
            i += 1;
            continue;
        }
        let start = i;
        while i < 32 && m32 & (1 << i) != 0 {
            i += 1;
        }
        if i - start > best_len {
            best_len = i - start;
            best_start = start;
        }
    }
    (best_start..best_start + best_len.min(16))
        .map(|j| ((circle[j % 16] - center).abs() - thresh).max(0) as f32)
        .sum()
}
