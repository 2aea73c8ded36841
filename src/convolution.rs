// convolution.rs — Separable filtering on Image<T>.
//
// Two 1D passes (rows, then columns) with clamp-to-edge borders. Used by
// the pyramid (Gaussian), the Sobel gradients and the corner detectors
// (box window over the structure tensor).
//
// Border pixels take the clamped path; the interior skips bounds checks.

use crate::image::{Image, Pixel};

#[inline]
fn check_kernel(kernel: &[f32]) {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());
}

/// Convolve each row of `src` with a centered 1D kernel.
pub fn convolve_rows<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    check_kernel(kernel);
    let (w, h) = (src.width(), src.height());
    let half = kernel.len() / 2;
    let mut dst = Image::<f32>::new(w, h);
    if w == 0 {
        return dst;
    }

    let clamped = |x: usize, y: usize| -> f32 {
        kernel
            .iter()
            .enumerate()
            .map(|(ki, &kv)| {
                let sx = (x + ki).saturating_sub(half).min(w - 1);
                src.get(sx, y).to_f32() * kv
            })
            .sum()
    };

    for y in 0..h {
        for x in 0..w {
            let v = if x >= half && x + half < w {
                let mut acc = 0.0f32;
                for (ki, &kv) in kernel.iter().enumerate() {
                    // SAFETY: x - half .. x + half lies inside the row.
                    acc += unsafe { src.get_unchecked(x + ki - half, y) }.to_f32() * kv;
                }
                acc
            } else {
                clamped(x, y)
            };
            // SAFETY: x < w, y < h.
            unsafe { dst.set_unchecked(x, y, v) };
        }
    }
    dst
}

/// Convolve each column of `src` with a centered 1D kernel.
pub fn convolve_cols(src: &Image<f32>, kernel: &[f32]) -> Image<f32> {
    check_kernel(kernel);
    let (w, h) = (src.width(), src.height());
    let half = kernel.len() / 2;
    let mut dst = Image::<f32>::new(w, h);
    if h == 0 {
        return dst;
    }

    for y in 0..h {
        let interior = y >= half && y + half < h;
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = if interior {
                    y + ki - half
                } else {
                    (y + ki).saturating_sub(half).min(h - 1)
                };
                // SAFETY: sy is clamped into [0, h).
                acc += unsafe { src.get_unchecked(x, sy) } * kv;
            }
            unsafe { dst.set_unchecked(x, y, acc) };
        }
    }
    dst
}

/// Separable 2D convolution: rows with `kernel_row`, then columns with
/// `kernel_col`. Output is always f32.
///
/// # Panics
/// Panics if either kernel is empty or has even length.
pub fn convolve_separable<T: Pixel>(
    src: &Image<T>,
    kernel_row: &[f32],
    kernel_col: &[f32],
) -> Image<f32> {
    let intermediate = convolve_rows(src, kernel_row);
    convolve_cols(&intermediate, kernel_col)
}

/// Normalized 1D Gaussian of length `2 * half_size + 1`.
///
/// # Examples
/// ```
/// let k = geoseam::convolution::gaussian_kernel_1d(2, 1.0);
/// assert_eq!(k.len(), 5);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
/// ```
pub fn gaussian_kernel_1d(half_size: usize, sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "sigma must be positive");
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..2 * half_size + 1)
        .map(|i| {
            let x = i as f32 - half_size as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}

/// Unnormalized box sum over a `size × size` window (size must be odd).
///
/// Corner detectors accumulate the structure tensor this way; the scale
/// factor cancels in the relative quality threshold.
pub fn box_sum(src: &Image<f32>, size: usize) -> Image<f32> {
    let ones = vec![1.0f32; size];
    convolve_separable(src, &ones, &ones)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_kernel_shape() {
        let k = gaussian_kernel_1d(2, 1.0);
        assert_eq!(k.len(), 5);
        assert!((k[0] - k[4]).abs() < 1e-6);
        assert!(k[2] > k[1] && k[1] > k[0]);
    }

    #[test]
    fn test_identity_kernel() {
        let img = Image::from_vec(4, 3, (0..12).collect::<Vec<u8>>());
        let kernel = [0.0, 0.0, 1.0, 0.0, 0.0];
        let out = convolve_separable(&img, &kernel, &kernel);
        for (x, y, v) in img.pixels() {
            assert!((out.get(x, y) - v as f32).abs() < 1e-6, "mismatch at ({x}, {y})");
        }
    }

    #[test]
    fn test_constant_image_unchanged() {
        let img = Image::from_vec(5, 5, vec![100.0f32; 25]);
        let k = gaussian_kernel_1d(2, 1.0);
        let out = convolve_separable(&img, &k, &k);
        assert!(out.pixels().all(|(_, _, v)| (v - 100.0).abs() < 1e-4));
    }

    #[test]
    fn test_clamp_border() {
        // x=0 replicates the edge: 0.25*10 + 0.5*10 + 0.25*20 = 12.5
        let img = Image::from_vec(3, 1, vec![10.0f32, 20.0, 30.0]);
        let out = convolve_rows(&img, &[0.25, 0.5, 0.25]);
        assert!((out.get(0, 0) - 12.5).abs() < 1e-6);
        assert!((out.get(2, 0) - 27.5).abs() < 1e-6);
    }

    #[test]
    fn test_box_sum_counts_window() {
        let mut img = Image::<f32>::new(7, 7);
        img.set(3, 3, 1.0);
        let s = box_sum(&img, 5);
        assert_eq!(s.get(3, 3), 1.0);
        assert_eq!(s.get(1, 1), 1.0);
        assert_eq!(s.get(0, 0), 0.0);
    }

    #[test]
    #[should_panic(expected = "odd")]
    fn test_even_kernel_panics() {
        let img = Image::from_vec(4, 4, vec![0.0f32; 16]);
        convolve_rows(&img, &[0.5, 0.5]);
    }
}
