// gradient.rs — Sobel gradients and the windowed structure tensor.
//
// Sobel is separable:
//   Sobel_x: rows [-1, 0, 1], cols [1, 2, 1]
//   Sobel_y: rows [ 1, 2, 1], cols [-1, 0, 1]
//
// Both corner detectors (min-eigenvalue and Harris) start from the same
// box-summed tensor [[Sxx, Sxy], [Sxy, Syy]], so it lives here.

use crate::convolution::{box_sum, convolve_separable};
use crate::image::{Image, Pixel};

const SOBEL_DERIV: [f32; 3] = [-1.0, 0.0, 1.0];
const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Horizontal gradient; positive where intensity rises to the right.
pub fn sobel_x<T: Pixel>(src: &Image<T>) -> Image<f32> {
    convolve_separable(src, &SOBEL_DERIV, &SOBEL_SMOOTH)
}

/// Vertical gradient; positive where intensity rises downward.
pub fn sobel_y<T: Pixel>(src: &Image<T>) -> Image<f32> {
    convolve_separable(src, &SOBEL_SMOOTH, &SOBEL_DERIV)
}

pub fn sobel_xy<T: Pixel>(src: &Image<T>) -> (Image<f32>, Image<f32>) {
    (sobel_x(src), sobel_y(src))
}

/// Per-pixel second-moment matrix summed over a square block.
pub struct StructureTensor {
    pub sxx: Image<f32>,
    pub sxy: Image<f32>,
    pub syy: Image<f32>,
}

impl StructureTensor {
    /// Compute Sobel products and box-sum them over `block_size × block_size`.
    pub fn compute<T: Pixel>(src: &Image<T>, block_size: usize) -> Self {
        let (ix, iy) = sobel_xy(src);
        let (w, h) = (src.width(), src.height());
        let mut ixx = Image::<f32>::new(w, h);
        let mut ixy = Image::<f32>::new(w, h);
        let mut iyy = Image::<f32>::new(w, h);
        for y in 0..h {
            for x in 0..w {
                // SAFETY: all three images share the source dimensions.
                unsafe {
                    let gx = ix.get_unchecked(x, y);
                    let gy = iy.get_unchecked(x, y);
                    ixx.set_unchecked(x, y, gx * gx);
                    ixy.set_unchecked(x, y, gx * gy);
                    iyy.set_unchecked(x, y, gy * gy);
                }
            }
        }
        StructureTensor {
            sxx: box_sum(&ixx, block_size),
            sxy: box_sum(&ixy, block_size),
            syy: box_sum(&iyy, block_size),
        }
    }

    /// Smaller eigenvalue of the tensor at (x, y) (Shi-Tomasi score).
    #[inline]
    pub fn min_eigen(&self, x: usize, y: usize) -> f32 {
        let a = self.sxx.get(x, y);
        let b = self.sxy.get(x, y);
        let c = self.syy.get(x, y);
        let half_trace = 0.5 * (a + c);
        let disc = (0.25 * (a - c) * (a - c) + b * b).sqrt();
        half_trace - disc
    }

    /// Harris response det(M) - k * trace(M)^2 at (x, y).
    #[inline]
    pub fn harris(&self, x: usize, y: usize, k: f32) -> f32 {
        let a = self.sxx.get(x, y);
        let b = self.sxy.get(x, y);
        let c = self.syy.get(x, y);
        a * c - b * b - k * (a + c) * (a + c)
    }
}
