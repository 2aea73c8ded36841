// gftt.rs — "Good features to track" (Shi-Tomasi) corner detector.
//
// 1. Structure tensor over a block_size × block_size box window.
// 2. Score each pixel by the smaller eigenvalue (or the Harris response).
// 3. Drop scores below quality_level × strongest score.
// 4. Keep 3×3 local maxima.
// 5. Greedy min-distance suppression, strongest first, until max_corners.
//
// The suppression uses a grid of min_distance-sized cells so each
// candidate only checks its 3×3 neighbourhood of cells.

use crate::config::GfttConfig;
use crate::detector::Keypoint;
use crate::gradient::StructureTensor;
use crate::image::Image;

#[derive(Debug, Clone)]
pub struct GoodFeaturesDetector {
    pub config: GfttConfig,
}

impl GoodFeaturesDetector {
    pub fn new(config: GfttConfig) -> Self {
        GoodFeaturesDetector { config }
    }

    /// Per-pixel corner score.
    pub fn corner_response(&self, image: &Image<u8>) -> Image<f32> {
        let tensor = StructureTensor::compute(image, self.config.block_size);
        let (w, h) = (image.width(), image.height());
        let mut score = Image::<f32>::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let s = if self.config.use_harris {
                    tensor.harris(x, y, self.config.harris_k)
                } else {
                    tensor.min_eigen(x, y)
                };
                // SAFETY: x < w, y < h.
                unsafe { score.set_unchecked(x, y, s) };
            }
        }
        score
    }

    /// Corners sorted by descending response.
    pub fn detect(&self, image: &Image<u8>) -> Vec<Keypoint> {
        let cfg = &self.config;
        let (w, h) = (image.width(), image.height());
        let border = cfg.block_size / 2 + 1;
        if cfg.max_corners == 0 || w <= 2 * border || h <= 2 * border {
            return Vec::new();
        }

        let score = self.corner_response(image);
        let max_score = score.pixels().map(|(_, _, v)| v).fold(0.0f32, f32::max);
        if max_score <= 0.0 {
            return Vec::new();
        }
        let floor = max_score * cfg.quality_level;

        let mut candidates = Vec::new();
        for y in border..h - border {
            for x in border..w - border {
                let v = score.get(x, y);
                if v <= floor || v <= 0.0 {
                    continue;
                }
                if is_local_max(&score, x, y, v) {
                    candidates.push((x, y, v));
                }
            }
        }
        // Stable on ties so the scan order decides.
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

        let mut grid = MinDistanceGrid::new(w, h, cfg.min_distance);
        let mut out = Vec::with_capacity(cfg.max_corners.min(candidates.len()));
        for (x, y, v) in candidates {
            let (fx, fy) = (x as f32, y as f32);
            if !grid.try_insert(fx, fy) {
                continue;
            }
            out.push(Keypoint { x: fx, y: fy, response: v, octave: 0, angle: None });
            if out.len() == cfg.max_corners {
                break;
            }
        }
        out
    }
}

fn is_local_max(score: &Image<f32>, x: usize, y: usize, v: f32) -> bool {
    for ny in y - 1..=y + 1 {
        for nx in x - 1..=x + 1 {
            if score.get(nx, ny) > v {
                return false;
            }
        }
    }
    true
}

/// Accepted points bucketed into min_distance-sized cells.
struct MinDistanceGrid {
    cell: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<(f32, f32)>>,
    min_dist_sq: f32,
}

impl MinDistanceGrid {
    fn new(w: usize, h: usize, min_distance: f32) -> Self {
        let cell = min_distance.max(1.0);
        let cols = (w as f32 / cell).ceil() as usize + 1;
        let rows = (h as f32 / cell).ceil() as usize + 1;
        MinDistanceGrid {
            cell,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
            min_dist_sq: min_distance * min_distance,
        }
    }

    /// Insert unless an accepted point lies closer than min_distance.
    fn try_insert(&mut self, x: f32, y: f32) -> bool {
        let cx = (x / self.cell) as usize;
        let cy = (y / self.cell) as usize;
        if self.min_dist_sq > 0.0 {
            for gy in cy.saturating_sub(1)..=(cy + 1).min(self.rows - 1) {
                for gx in cx.saturating_sub(1)..=(cx + 1).min(self.cols - 1) {
                    let near = self.cells[gy * self.cols + gx].iter().any(|&(px, py)| {
                        let (dx, dy) = (px - x, py - y);
                        dx * dx + dy * dy < self.min_dist_sq
                    });
                    if near {
                        return false;
                    }
                }
            }
        }
        self.cells[cy * self.cols + cx].push((x, y));
        true
    }
}
