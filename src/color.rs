// color.rs — NV12 host frames and the color conversions the aligner needs.
//
// The estimator works on grayscale crops. They are produced the way the
// camera pipeline sees them: NV12 → RGB with the BT.601 video-range matrix,
// then RGB → gray with the BT.601 luma weights. Gray values therefore
// match a debug dump of the RGB frame, not the raw Y plane.
//
// Conversion is done per pixel for the requested region only; the full
// frame RGB image is built only for debug output.

use log::error;

use crate::error::RemapError;
use crate::host::HostVideoBuffer;
use crate::image::Image;
use crate::video::{VideoBuffer, VideoBufferInfo, VideoFormat};

/// Integer rectangle in pixel coordinates. `x` may be negative or run past
/// the frame while the aligner shifts crops; conversion rejects such
/// rectangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }
}

/// An NV12 frame copied into host images.
#[derive(Debug, Clone)]
pub struct Nv12Image {
    /// Full resolution luma.
    pub y: Image<u8>,
    /// Half height, interleaved U/V bytes (`width` bytes per row).
    pub uv: Image<u8>,
}

impl Nv12Image {
    /// Copy the planes out of a linear NV12 allocation.
    pub fn from_bytes(data: &[u8], info: &VideoBufferInfo) -> Result<Self, RemapError> {
        if info.format != VideoFormat::Nv12 {
            error!("cannot convert {:?} frame to NV12 image", info.format);
            return Err(RemapError::Parameter(format!("expected NV12, got {:?}", info.format)));
        }
        if data.len() < info.size as usize {
            return Err(RemapError::Parameter(format!(
                "frame needs {} bytes, got {}",
                info.size,
                data.len()
            )));
        }
        let w = (info.width & !1) as usize;
        let h = (info.height & !1) as usize;
        let (yp, uvp) = (info.plane(0)?, info.plane(1)?);

        let copy_plane = |offset: u32, stride: u32, rows: usize| {
            let mut out = Vec::with_capacity(w * rows);
            for r in 0..rows {
                let start = offset as usize + r * stride as usize;
                out.extend_from_slice(&data[start..start + w]);
            }
            Image::from_vec(w, rows, out)
        };
        Ok(Nv12Image {
            y: copy_plane(yp.offset, yp.stride, h),
            uv: copy_plane(uvp.offset, uvp.stride, h / 2),
        })
    }

    pub fn from_host_buffer(frame: &HostVideoBuffer) -> Result<Self, RemapError> {
        Self::from_bytes(&frame.bytes(), frame.info())
    }

    pub fn width(&self) -> usize {
        self.y.width()
    }

    pub fn height(&self) -> usize {
        self.y.height()
    }

    /// RGB of pixel (x, y).
    #[inline]
    pub fn rgb_at(&self, x: usize, y: usize) -> [u8; 3] {
        let cx = (x / 2) * 2;
        let luma = self.y.get(x, y);
        let u = self.uv.get(cx, y / 2);
        let v = self.uv.get(cx + 1, y / 2);
        yuv_to_rgb(luma, u, v)
    }

    /// Whole frame as an `image` crate RGB buffer.
    pub fn to_rgb(&self) -> image::RgbImage {
        let (w, h) = (self.width(), self.height());
        image::RgbImage::from_fn(w as u32, h as u32, |x, y| image::Rgb(self.rgb_at(x as usize, y as usize)))
    }

    /// Gray crop of `rect` (NV12 → RGB → gray).
    pub fn gray_region(&self, rect: Rect) -> Result<Image<u8>, RemapError> {
        if rect.x < 0
            || rect.y < 0
            || rect.width <= 0
            || rect.height <= 0
            || rect.right() as usize > self.width()
            || (rect.y + rect.height) as usize > self.height()
        {
            error!("crop {rect:?} outside {}x{} frame", self.width(), self.height());
            return Err(RemapError::Parameter(format!(
                "crop {rect:?} outside {}x{} frame",
                self.width(),
                self.height()
            )));
        }
        let (w, h) = (rect.width as usize, rect.height as usize);
        let mut out = Image::new(w, h);
        for y in 0..h {
            let row = out.row_mut(y);
            for (x, px) in row.iter_mut().enumerate() {
                *px = rgb_to_gray(self.rgb_at(rect.x as usize + x, rect.y as usize + y));
            }
        }
        Ok(out)
    }
}

/// BT.601 video range YUV → RGB.
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 1.164 * (y as f32 - 16.0);
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(c + 1.596 * e),
        clamp(c - 0.391 * d - 0.813 * e),
        clamp(c + 2.018 * d),
    ]
}

/// BT.601 luma: Y = 0.299 R + 0.587 G + 0.114 B.
#[inline]
pub fn rgb_to_gray(rgb: [u8; 3]) -> u8 {
    let g = 0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32;
    g.round().clamp(0.0, 255.0) as u8
}
