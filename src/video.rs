// video.rs — Video buffer metadata and per-frame plane views.
//
// A video buffer is one linear allocation holding every plane of a frame.
// The remap kernel never sees a "frame"; it sees plane views: a borrowed
// frame plus a byte offset, a row pitch and an element format. Views are
// cheap, built fresh for each frame and dropped right after the dispatch.

use crate::error::RemapError;

/// Pixel layout of a whole video buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    /// 8-bit luma plane followed by an interleaved half-resolution UV plane.
    Nv12,
    /// Packed 8-bit RGBA, single plane.
    Rgba,
}

/// Geometry of one plane inside a video buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneInfo {
    /// Width in samples of this plane (UV pairs for the NV12 chroma plane).
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes.
    pub stride: u32,
    /// Byte offset of the plane's first row.
    pub offset: u32,
}

/// Layout description of a video buffer as negotiated with the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoBufferInfo {
    pub format: VideoFormat,
    /// Logical frame size in pixels.
    pub width: u32,
    pub height: u32,
    /// Padded size the planes are laid out for.
    pub aligned_width: u32,
    pub aligned_height: u32,
    pub planes: Vec<PlaneInfo>,
    /// Total bytes of the allocation.
    pub size: u32,
}

#[inline]
pub fn align_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

#[inline]
pub fn align_down(value: u32, alignment: u32) -> u32 {
    (value / alignment) * alignment
}

impl VideoBufferInfo {
    /// NV12 layout with the luma size padded up to (`align_w`, `align_h`).
    pub fn nv12(width: u32, height: u32, align_w: u32, align_h: u32) -> Self {
        let aligned_width = align_up(width, align_w.max(2));
        let aligned_height = align_up(height, align_h.max(2));
        let stride = aligned_width;
        let luma = PlaneInfo { width, height, stride, offset: 0 };
        let chroma = PlaneInfo {
            width: width / 2,
            height: height / 2,
            stride,
            offset: stride * aligned_height,
        };
        VideoBufferInfo {
            format: VideoFormat::Nv12,
            width,
            height,
            aligned_width,
            aligned_height,
            planes: vec![luma, chroma],
            size: stride * aligned_height * 3 / 2,
        }
    }

    /// Tightly packed RGBA layout.
    pub fn rgba(width: u32, height: u32) -> Self {
        let stride = width * 4;
        VideoBufferInfo {
            format: VideoFormat::Rgba,
            width,
            height,
            aligned_width: width,
            aligned_height: height,
            planes: vec![PlaneInfo { width, height, stride, offset: 0 }],
            size: stride * height,
        }
    }

    pub fn plane(&self, index: usize) -> Result<&PlaneInfo, RemapError> {
        self.planes.get(index).ok_or_else(|| {
            RemapError::Parameter(format!("{:?} buffer has no plane {index}", self.format))
        })
    }

    pub fn require_nv12(&self) -> Result<(), RemapError> {
        if self.format != VideoFormat::Nv12 {
            return Err(RemapError::Parameter(format!(
                "only NV12 frames are supported, got {:?}",
                self.format
            )));
        }
        Ok(())
    }
}

/// Anything the remap path can bind as a frame.
pub trait VideoBuffer {
    fn info(&self) -> &VideoBufferInfo;
}

/// Element format of a 2D image view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// One byte per element (luma).
    R8,
    /// Two bytes per element (interleaved UV).
    Rg8,
    /// Four bytes per element, written as one packed word.
    Packed8x4,
    /// Four f32 channels per element (displacement field cells).
    Rgba32F,
}

impl ImageFormat {
    pub fn bytes_per_element(self) -> u32 {
        match self {
            ImageFormat::R8 => 1,
            ImageFormat::Rg8 => 2,
            ImageFormat::Packed8x4 => 4,
            ImageFormat::Rgba32F => 16,
        }
    }
}

/// Shape of a 2D image view over linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub format: ImageFormat,
    /// Width in elements.
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes.
    pub row_pitch: u32,
}

impl ImageDesc {
    /// Bytes spanned from the first element to the end of the last row.
    pub fn span_bytes(&self) -> u64 {
        if self.height == 0 {
            return 0;
        }
        (self.height as u64 - 1) * self.row_pitch as u64
            + self.width as u64 * self.format.bytes_per_element() as u64
    }

    fn validate(&self) -> Result<(), RemapError> {
        if self.width == 0 || self.height == 0 {
            return Err(RemapError::Parameter(format!("empty image view {self:?}")));
        }
        if self.row_pitch < self.width * self.format.bytes_per_element() {
            return Err(RemapError::Parameter(format!("row pitch too small for {self:?}")));
        }
        Ok(())
    }
}

/// A plane of `frame` seen as a 2D image starting at `offset` bytes.
#[derive(Debug)]
pub struct PlaneView<'a, F> {
    pub frame: &'a F,
    pub desc: ImageDesc,
    pub offset: u32,
}

impl<'a, F> Clone for PlaneView<'a, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, F> Copy for PlaneView<'a, F> {}

impl<'a, F: VideoBuffer> PlaneView<'a, F> {
    /// Validate the view against the frame allocation.
    pub fn new(frame: &'a F, desc: ImageDesc, offset: u32) -> Result<Self, RemapError> {
        desc.validate()?;
        let size = frame.info().size as u64;
        if offset as u64 + desc.span_bytes() > size {
            return Err(RemapError::Parameter(format!(
                "plane view {desc:?} at offset {offset} exceeds buffer of {size} bytes"
            )));
        }
        if desc.format == ImageFormat::Packed8x4 && (offset % 4 != 0 || desc.row_pitch % 4 != 0) {
            return Err(RemapError::Parameter(format!(
                "packed plane view needs 4-byte aligned offset and pitch (offset {offset}, pitch {})",
                desc.row_pitch
            )));
        }
        Ok(PlaneView { frame, desc, offset })
    }

    /// Input views: luma `R8` and chroma `Rg8` at the even-aligned size.
    pub fn input_nv12(frame: &'a F) -> Result<[Self; 2], RemapError> {
        let info = frame.info();
        info.require_nv12()?;
        let (y, uv) = (info.plane(0)?, info.plane(1)?);
        let w = align_down(info.width, 2);
        let h = align_down(info.height, 2);
        Ok([
            Self::new(frame, ImageDesc { format: ImageFormat::R8, width: w, height: h, row_pitch: y.stride }, y.offset)?,
            Self::new(
                frame,
                ImageDesc { format: ImageFormat::Rg8, width: w / 2, height: h / 2, row_pitch: uv.stride },
                uv.offset,
            )?,
        ])
    }

    /// Output views: both planes as packed 4-byte words.
    pub fn output_nv12(frame: &'a F) -> Result<[Self; 2], RemapError> {
        let info = frame.info();
        info.require_nv12()?;
        let (y, uv) = (info.plane(0)?, info.plane(1)?);
        let words = align_down(info.width, 4) / 4;
        let h = align_down(info.height, 2);
        Ok([
            Self::new(
                frame,
                ImageDesc { format: ImageFormat::Packed8x4, width: words, height: h, row_pitch: y.stride },
                y.offset,
            )?,
            Self::new(
                frame,
                ImageDesc { format: ImageFormat::Packed8x4, width: words, height: h / 2, row_pitch: uv.stride },
                uv.offset,
            )?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(VideoBufferInfo);

    impl VideoBuffer for Dummy {
        fn info(&self) -> &VideoBufferInfo {
            &self.0
        }
    }

    #[test]
    fn test_nv12_layout() {
        let info = VideoBufferInfo::nv12(640, 480, 16, 16);
        assert_eq!(info.planes[0].stride, 640);
        assert_eq!(info.planes[1].offset, 640 * 480);
        assert_eq!(info.size, 640 * 480 * 3 / 2);

        let padded = VideoBufferInfo::nv12(100, 50, 16, 16);
        assert_eq!((padded.aligned_width, padded.aligned_height), (112, 64));
        assert_eq!(padded.planes[1].offset, 112 * 64);
        assert_eq!(padded.width, 100);
    }

    #[test]
    fn test_input_views_use_even_size() {
        let frame = Dummy(VideoBufferInfo::nv12(101, 51, 16, 16));
        let [y, uv] = PlaneView::input_nv12(&frame).unwrap();
        assert_eq!((y.desc.width, y.desc.height), (100, 50));
        assert_eq!((uv.desc.width, uv.desc.height), (50, 25));
        assert_eq!(uv.offset, 112 * 64);
    }

    #[test]
    fn test_output_views_are_packed_words() {
        let frame = Dummy(VideoBufferInfo::nv12(256, 256, 16, 16));
        let [y, uv] = PlaneView::output_nv12(&frame).unwrap();
        assert_eq!(y.desc.format, ImageFormat::Packed8x4);
        assert_eq!((y.desc.width, y.desc.height), (64, 256));
        assert_eq!((uv.desc.width, uv.desc.height), (64, 128));
    }

    #[test]
    fn test_non_nv12_rejected() {
        let frame = Dummy(VideoBufferInfo::rgba(64, 64));
        assert!(matches!(PlaneView::input_nv12(&frame), Err(RemapError::Parameter(_))));
    }

    #[test]
    fn test_view_past_end_rejected() {
        let frame = Dummy(VideoBufferInfo::nv12(64, 64, 16, 16));
        let desc = ImageDesc { format: ImageFormat::R8, width: 64, height: 65, row_pitch: 64 };
        assert!(PlaneView::new(&frame, desc, frame.0.planes[1].offset).is_err());
    }

    #[test]
    fn test_packed_view_alignment() {
        let frame = Dummy(VideoBufferInfo::nv12(64, 64, 16, 16));
        let desc = ImageDesc { format: ImageFormat::Packed8x4, width: 4, height: 4, row_pitch: 64 };
        assert!(PlaneView::new(&frame, desc, 2).is_err());
        assert!(PlaneView::new(&frame, desc, 4).is_ok());
    }
}
