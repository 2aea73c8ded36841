// pyramid.rs — Gaussian image pyramid for coarse-to-fine tracking.
//
// Each level is the previous one blurred with the 5-tap binomial
// [1, 4, 6, 4, 1] / 16 and decimated by two. Odd sizes round up so the
// last column/row still contributes, which keeps level sizes at
// ceil(w / 2^n) × ceil(h / 2^n).

use crate::convolution::convolve_separable;
use crate::image::{to_f32, Image, Pixel};

const BINOMIAL_5: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// A Gaussian image pyramid. `levels[0]` is the source resolution.
pub struct Pyramid {
    pub levels: Vec<Image<f32>>,
}

impl Pyramid {
    /// Build up to `num_levels` levels, stopping early once a level would
    /// be smaller than `min_size` pixels on either side.
    pub fn build<T: Pixel>(src: &Image<T>, num_levels: usize, min_size: usize) -> Self {
        assert!(num_levels >= 1, "pyramid must have at least 1 level");

        let mut levels = Vec::with_capacity(num_levels);
        levels.push(to_f32(src));

        while levels.len() < num_levels {
            let prev = &levels[levels.len() - 1];
            if prev.width().div_ceil(2) < min_size || prev.height().div_ceil(2) < min_size {
                break;
            }
            let blurred = convolve_separable(prev, &BINOMIAL_5, &BINOMIAL_5);
            let down = downsample_2x(&blurred);
            levels.push(down);
        }

        Pyramid { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &Image<f32> {
        &self.levels[level]
    }
}

/// Take every other pixel; odd sizes round up.
fn downsample_2x(src: &Image<f32>) -> Image<f32> {
    let new_w = src.width().div_ceil(2);
    let new_h = src.height().div_ceil(2);
    let mut dst = Image::new(new_w, new_h);
    for y in 0..new_h {
        for x in 0..new_w {
            // SAFETY: 2x <= width-1 and 2y <= height-1 by the ceil bound.
            unsafe { dst.set_unchecked(x, y, src.get_unchecked(x * 2, y * 2)) };
        }
    }
    dst
}
