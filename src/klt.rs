// klt.rs — Pyramidal Lucas-Kanade sparse optical flow.
//
// Forward-additive formulation: every iteration re-samples the current
// frame at the warped position and recomputes the gradients there, so the
// 2×2 Hessian is rebuilt per iteration. Coarse-to-fine: the displacement
// found at level L seeds level L-1 after doubling.
//
// Besides the new position each point gets a status and an error: the
// mean absolute difference between the template patch and the tracked
// patch at full resolution. The correspondence filter thresholds on it.

use crate::config::TrackerConfig;
use crate::image::{interpolate_bilinear, Image};
use crate::pyramid::Pyramid;

/// Outcome of tracking one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackStatus {
    Tracked,
    /// Singular system (flat or edge-only patch).
    Lost,
    /// Final position outside the image.
    OutOfBounds,
}

/// Tracked position of one input point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackResult {
    pub x: f32,
    pub y: f32,
    pub status: TrackStatus,
    /// Mean absolute patch difference at level 0 (intensity units).
    /// `f32::INFINITY` unless tracked.
    pub error: f32,
}

impl TrackResult {
    pub fn is_tracked(&self) -> bool {
        self.status == TrackStatus::Tracked
    }
}

enum LkResult {
    Converged(f32, f32),
    MaxIter(f32, f32),
    Singular,
}

/// Pyramidal KLT tracker.
#[derive(Debug, Clone)]
pub struct KltTracker {
    pub config: TrackerConfig,
}

impl KltTracker {
    pub fn new(config: TrackerConfig) -> Self {
        KltTracker { config }
    }

    /// Build pyramids for both frames and track `points` from `prev` to `curr`.
    pub fn track(&self, prev: &Image<u8>, curr: &Image<u8>, points: &[(f32, f32)]) -> Vec<TrackResult> {
        let min_size = 2 * self.config.window_half_size + 1;
        let prev_pyr = Pyramid::build(prev, self.config.max_levels, min_size);
        let curr_pyr = Pyramid::build(curr, self.config.max_levels, min_size);
        self.track_pyramids(&prev_pyr, &curr_pyr, points)
    }

    /// Track with pre-built pyramids.
    pub fn track_pyramids(&self, prev_pyr: &Pyramid, curr_pyr: &Pyramid, points: &[(f32, f32)]) -> Vec<TrackResult> {
        let levels = self
            .config
            .max_levels
            .min(prev_pyr.num_levels())
            .min(curr_pyr.num_levels());
        points
            .iter()
            .map(|&(x, y)| self.track_point(prev_pyr, curr_pyr, x, y, levels))
            .collect()
    }

    fn track_point(&self, prev_pyr: &Pyramid, curr_pyr: &Pyramid, x: f32, y: f32, levels: usize) -> TrackResult {
        let mut dx = 0.0f32;
        let mut dy = 0.0f32;

        for level in (0..levels).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            let result = self.lk_forward_additive(
                prev_pyr.level(level),
                curr_pyr.level(level),
                x * scale,
                y * scale,
                dx,
                dy,
            );
            match result {
                LkResult::Converged(ndx, ndy) | LkResult::MaxIter(ndx, ndy) => {
                    dx = ndx;
                    dy = ndy;
                }
                LkResult::Singular => {
                    return TrackResult {
                        x: x + dx / scale,
                        y: y + dy / scale,
                        status: TrackStatus::Lost,
                        error: f32::INFINITY,
                    };
                }
            }
            if level > 0 {
                dx *= 2.0;
                dy *= 2.0;
            }
        }

        let (nx, ny) = (x + dx, y + dy);
        let base = prev_pyr.level(0);
        if nx < 0.0 || ny < 0.0 || nx >= base.width() as f32 || ny >= base.height() as f32 {
            return TrackResult { x: nx, y: ny, status: TrackStatus::OutOfBounds, error: f32::INFINITY };
        }
        let error = self.patch_error(base, curr_pyr.level(0), x, y, dx, dy);
        TrackResult { x: nx, y: ny, status: TrackStatus::Tracked, error }
    }

    fn lk_forward_additive(
        &self,
        prev_img: &Image<f32>,
        curr_img: &Image<f32>,
        fx: f32,
        fy: f32,
        mut dx: f32,
        mut dy: f32,
    ) -> LkResult {
        let half = self.config.window_half_size as isize;
        let eps_sq = self.config.epsilon * self.config.epsilon;

        for _ in 0..self.config.max_iterations {
            let (mut h00, mut h01, mut h11) = (0.0f32, 0.0f32, 0.0f32);
            let (mut b0, mut b1) = (0.0f32, 0.0f32);

            for py in -half..=half {
                for px in -half..=half {
                    let (ox, oy) = (px as f32, py as f32);
                    let t = interpolate_bilinear(prev_img, fx + ox, fy + oy);
                    let wx = fx + dx + ox;
                    let wy = fy + dy + oy;
                    let e = t - interpolate_bilinear(curr_img, wx, wy);

                    let gx = 0.5
                        * (interpolate_bilinear(curr_img, wx + 1.0, wy)
                            - interpolate_bilinear(curr_img, wx - 1.0, wy));
                    let gy = 0.5
                        * (interpolate_bilinear(curr_img, wx, wy + 1.0)
                            - interpolate_bilinear(curr_img, wx, wy - 1.0));

                    h00 += gx * gx;
                    h01 += gx * gy;
                    h11 += gy * gy;
                    b0 += gx * e;
                    b1 += gy * e;
                }
            }

            let det = h00 * h11 - h01 * h01;
            if det.abs() < 1e-6 {
                return LkResult::Singular;
            }
            let inv_det = 1.0 / det;
            let step_x = inv_det * (h11 * b0 - h01 * b1);
            let step_y = inv_det * (h00 * b1 - h01 * b0);
            dx += step_x;
            dy += step_y;

            if step_x * step_x + step_y * step_y < eps_sq {
                return LkResult::Converged(dx, dy);
            }
        }
        LkResult::MaxIter(dx, dy)
    }

    fn patch_error(&self, prev: &Image<f32>, curr: &Image<f32>, fx: f32, fy: f32, dx: f32, dy: f32) -> f32 {
        let half = self.config.window_half_size as isize;
        let mut sum = 0.0f32;
        let mut n = 0usize;
        for py in -half..=half {
            for px in -half..=half {
                let (ox, oy) = (px as f32, py as f32);
                let t = interpolate_bilinear(prev, fx + ox, fy + oy);
                let i = interpolate_bilinear(curr, fx + dx + ox, fy + dy + oy);
                sum += (t - i).abs();
                n += 1;
            }
        }
        sum / n as f32
    }
}
