// field_resource.rs — Device-side storage of the displacement field.
//
// One linear buffer of width × height cells, 4 f32 channels each, plus the
// image description that lets the kernel address it in 2D. Both live in one
// `FieldStorage` so they are created and dropped together. The host is the
// only writer: every change goes through a scoped map → edit → unmap cycle
// on the backend, never through a kernel.

use log::{debug, error, info};

use crate::backend::{ComputeBackend, FieldView, FIELD_CELL_BYTES, FIELD_CHANNELS};
use crate::error::RemapError;
use crate::field::GeoPos;
use crate::video::{ImageDesc, ImageFormat};

struct FieldStorage<Buf> {
    buffer: Buf,
    desc: ImageDesc,
    written: bool,
}

/// Owner of the field buffer and its image view.
pub struct GpuFieldResource<B: ComputeBackend> {
    storage: Option<FieldStorage<B::Buffer>>,
    normalized: bool,
}

impl<B: ComputeBackend> Default for GpuFieldResource<B> {
    fn default() -> Self {
        GpuFieldResource { storage: None, normalized: false }
    }
}

impl<B: ComputeBackend> GpuFieldResource<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field dimensions in cells, if allocated.
    pub fn dims(&self) -> Option<(u32, u32)> {
        self.storage.as_ref().map(|s| (s.desc.width, s.desc.height))
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn is_written(&self) -> bool {
        self.storage.as_ref().is_some_and(|s| s.written)
    }

    /// Bytes held by the buffer (0 when nothing is allocated).
    pub fn capacity_bytes(&self, backend: &B) -> usize {
        self.storage.as_ref().map_or(0, |s| backend.buffer_size(&s.buffer))
    }

    /// Kernel view of the written field.
    pub fn view(&self) -> Result<FieldView<'_, B::Buffer>, RemapError> {
        match &self.storage {
            Some(s) if s.written => Ok(FieldView { buffer: &s.buffer, desc: s.desc }),
            _ => Err(RemapError::Unconfigured("no displacement field has been written".into())),
        }
    }

    /// Make sure storage for `width × height` cells exists. Returns true
    /// if it (re)allocated. Reallocation drops old contents and clears
    /// the normalized flag.
    pub fn ensure_capacity(&mut self, backend: &B, width: u32, height: u32) -> Result<bool, RemapError> {
        if self.dims() == Some((width, height)) {
            return Ok(false);
        }

        // Release first: a failed allocation must not leave a stale pair.
        self.release();

        if width == 0 || height == 0 {
            error!("geo map buffer of {width}x{height} cells requested");
            return Err(RemapError::Allocation(format!("empty field of {width}x{height} cells")));
        }
        let desc = ImageDesc {
            format: ImageFormat::Rgba32F,
            width,
            height,
            row_pitch: width * FIELD_CELL_BYTES,
        };
        let size = (desc.row_pitch * height) as usize;
        let buffer = backend.create_buffer(size).map_err(|e| {
            error!("creating geo map buffer of {size} bytes failed: {e}");
            e
        })?;
        if (backend.buffer_size(&buffer) as u64) < desc.span_bytes() {
            // `buffer` drops here with the rest of the partial state.
            error!("geo map image view {desc:?} does not fit its buffer");
            return Err(RemapError::Allocation("field image view does not fit its buffer".into()));
        }

        info!("allocated geo map of {width}x{height} cells ({size} bytes)");
        self.storage = Some(FieldStorage { buffer, desc, written: false });
        Ok(true)
    }

    /// Copy `cells` into channels 0-1 of each cell; channels 2-3 keep
    /// their previous contents. Clears the normalized flag.
    pub fn write_cells(&mut self, backend: &B, cells: &[GeoPos], width: u32, height: u32) -> Result<(), RemapError> {
        if cells.len() != (width as usize) * (height as usize) {
            error!("geo map data has {} cells, expected {width}x{height}", cells.len());
            return Err(RemapError::Parameter(format!(
                "field data has {} cells, expected {}",
                cells.len(),
                width * height
            )));
        }
        self.ensure_capacity(backend, width, height)?;
        let storage = self
            .storage
            .as_mut()
            .ok_or_else(|| RemapError::Unconfigured("field storage missing after allocation".into()))?;

        let pitch_floats = (storage.desc.row_pitch / 4) as usize;
        backend
            .map_buffer(&mut storage.buffer, |data| {
                for (y, row) in cells.chunks_exact(width as usize).enumerate() {
                    let line = &mut data[y * pitch_floats..];
                    for (x, c) in row.iter().enumerate() {
                        line[x * FIELD_CHANNELS] = c.x;
                        line[x * FIELD_CHANNELS + 1] = c.y;
                    }
                }
            })
            .map_err(|e| {
                error!("mapping geo map buffer for write failed: {e}");
                e
            })?;

        storage.written = true;
        self.normalized = false;
        debug!("wrote {width}x{height} geo map cells");
        Ok(())
    }

    /// Divide x by `src_w` and y by `src_h` in every cell, once.
    pub fn normalize_in_place(&mut self, backend: &B, src_w: u32, src_h: u32) -> Result<(), RemapError> {
        if self.normalized {
            error!("geo map is already normalized");
            return Err(RemapError::AlreadyNormalized);
        }
        if src_w == 0 || src_h == 0 {
            return Err(RemapError::Parameter(format!("cannot normalize against {src_w}x{src_h}")));
        }
        let storage = match self.storage.as_mut() {
            Some(s) if s.written => s,
            _ => {
                error!("normalizing geo map before any data was written");
                return Err(RemapError::Unconfigured("no displacement field has been written".into()));
            }
        };

        let (w, h) = (storage.desc.width as usize, storage.desc.height as usize);
        let pitch_floats = (storage.desc.row_pitch / 4) as usize;
        let (sw, sh) = (src_w as f32, src_h as f32);
        backend
            .map_buffer(&mut storage.buffer, |data| {
                for y in 0..h {
                    let line = &mut data[y * pitch_floats..];
                    for x in 0..w {
                        line[x * FIELD_CHANNELS] /= sw;
                        line[x * FIELD_CHANNELS + 1] /= sh;
                    }
                }
            })
            .map_err(|e| {
                error!("mapping geo map buffer for normalization failed: {e}");
                e
            })?;

        self.normalized = true;
        info!("normalized {w}x{h} geo map against {src_w}x{src_h}");
        Ok(())
    }

    /// Mark already-normalized data as such (data loaded as fractions).
    pub fn assume_normalized(&mut self) -> Result<(), RemapError> {
        if !self.is_written() {
            return Err(RemapError::Unconfigured("no displacement field has been written".into()));
        }
        self.normalized = true;
        Ok(())
    }

    /// Read channels 0-1 back (diagnostics and tests).
    pub fn read_cells(&mut self, backend: &B) -> Result<Vec<GeoPos>, RemapError> {
        let storage = self
            .storage
            .as_mut()
            .ok_or_else(|| RemapError::Unconfigured("no displacement field allocated".into()))?;
        let (w, h) = (storage.desc.width as usize, storage.desc.height as usize);
        let pitch_floats = (storage.desc.row_pitch / 4) as usize;
        backend.map_buffer(&mut storage.buffer, |data| {
            let mut out = Vec::with_capacity(w * h);
            for y in 0..h {
                for x in 0..w {
                    let i = y * pitch_floats + x * FIELD_CHANNELS;
                    out.push(GeoPos::new(data[i], data[i + 1]));
                }
            }
            out
        })
    }

    /// Drop buffer and view together.
    pub fn release(&mut self) {
        if self.storage.take().is_some() {
            debug!("released geo map storage");
        }
        self.normalized = false;
    }
}
