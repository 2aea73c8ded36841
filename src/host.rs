// host.rs — CPU execution of the geo-map kernel.
//
// `HostBackend` keeps field buffers in host memory and runs the kernel
// invocation by invocation, exactly as the WGSL shader does on a device.
// It is the reference the GPU path is checked against and lets the whole
// remap state machine run in tests without an adapter.
//
// Kernel contract, per invocation (gx, gy) over the output chroma plane:
//   - luma: columns 4gx..4gx+3 of rows 2gy and 2gy+1, one packed word per row
//   - chroma: UV pairs 2gx and 2gx+1 of chroma row gy, one packed word
// Each output pixel center p samples the field at
//   (p - out_size / 2) / (field_size * cell_unit) + 0.5
// and the resulting [0, 1] source position samples the input planes.
// Positions outside [0, 1] produce black (Y 0, UV 128).

use std::cell::{Ref, RefCell};

use log::{debug, error};

use crate::backend::{ComputeBackend, GeoMapArgs, KernelArg, WorkSize, FIELD_CHANNELS};
use crate::error::RemapError;
use crate::video::{ImageDesc, VideoBuffer, VideoBufferInfo};

/// Host memory field buffer.
#[derive(Debug, Clone)]
pub struct HostBuffer {
    data: Vec<f32>,
}

/// A video frame in host memory.
///
/// The kernel writes through a shared reference, so the bytes sit in a
/// `RefCell`.
#[derive(Debug)]
pub struct HostVideoBuffer {
    info: VideoBufferInfo,
    data: RefCell<Vec<u8>>,
}

impl HostVideoBuffer {
    /// Zero-filled frame.
    pub fn new(info: VideoBufferInfo) -> Self {
        let data = RefCell::new(vec![0u8; info.size as usize]);
        HostVideoBuffer { info, data }
    }

    pub fn from_bytes(info: VideoBufferInfo, bytes: Vec<u8>) -> Result<Self, RemapError> {
        if bytes.len() < info.size as usize {
            return Err(RemapError::Parameter(format!(
                "frame needs {} bytes, got {}",
                info.size,
                bytes.len()
            )));
        }
        Ok(HostVideoBuffer { info, data: RefCell::new(bytes) })
    }

    pub fn bytes(&self) -> Ref<'_, Vec<u8>> {
        self.data.borrow()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    fn luma_index(&self, x: u32, y: u32) -> usize {
        let p = &self.info.planes[0];
        (p.offset + y * p.stride + x) as usize
    }

    fn chroma_index(&self, x: u32, y: u32) -> usize {
        let p = &self.info.planes[1];
        (p.offset + y * p.stride + 2 * x) as usize
    }

    /// Luma sample at (x, y). NV12 frames only.
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        self.data.borrow()[self.luma_index(x, y)]
    }

    pub fn set_luma(&self, x: u32, y: u32, v: u8) {
        let i = self.luma_index(x, y);
        self.data.borrow_mut()[i] = v;
    }

    /// (U, V) of chroma sample (x, y), in chroma-plane coordinates.
    pub fn chroma(&self, x: u32, y: u32) -> (u8, u8) {
        let i = self.chroma_index(x, y);
        let d = self.data.borrow();
        (d[i], d[i + 1])
    }

    pub fn set_chroma(&self, x: u32, y: u32, uv: (u8, u8)) {
        let i = self.chroma_index(x, y);
        let mut d = self.data.borrow_mut();
        d[i] = uv.0;
        d[i + 1] = uv.1;
    }
}

impl VideoBuffer for HostVideoBuffer {
    fn info(&self) -> &VideoBufferInfo {
        &self.info
    }
}

/// CPU backend.
#[derive(Debug, Clone)]
pub struct HostBackend {
    max_buffer_bytes: usize,
}

impl Default for HostBackend {
    fn default() -> Self {
        HostBackend { max_buffer_bytes: 256 << 20 }
    }
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject buffers larger than `bytes`, like a device limit would.
    pub fn with_max_buffer_bytes(bytes: usize) -> Self {
        HostBackend { max_buffer_bytes: bytes }
    }
}

impl ComputeBackend for HostBackend {
    type Buffer = HostBuffer;
    type Frame = HostVideoBuffer;

    fn create_buffer(&self, size: usize) -> Result<HostBuffer, RemapError> {
        if size == 0 {
            return Err(RemapError::Allocation("zero-sized buffer".into()));
        }
        if size > self.max_buffer_bytes {
            return Err(RemapError::Allocation(format!(
                "buffer of {size} bytes exceeds limit of {}",
                self.max_buffer_bytes
            )));
        }
        Ok(HostBuffer { data: vec![0.0; size.div_ceil(4)] })
    }

    fn buffer_size(&self, buffer: &HostBuffer) -> usize {
        buffer.data.len() * 4
    }

    fn map_buffer<R>(&self, buffer: &mut HostBuffer, f: impl FnOnce(&mut [f32]) -> R) -> Result<R, RemapError> {
        Ok(f(&mut buffer.data))
    }

    fn run_geo_map(
        &self,
        args: &[KernelArg<'_, HostVideoBuffer, HostBuffer>],
        work: WorkSize,
    ) -> Result<(), RemapError> {
        let a = GeoMapArgs::decode(args)?;

        // Everything is computed under shared borrows first, so an output
        // frame that aliases the input never sees a half-written image.
        let results = {
            let in_y = a.in_y.frame.data.borrow();
            let in_uv = a.in_uv.frame.data.borrow();
            let sampler = GeoSampler {
                in_y: Plane { bytes: &in_y, desc: a.in_y.desc, offset: a.in_y.offset },
                in_uv: Plane { bytes: &in_uv, desc: a.in_uv.desc, offset: a.in_uv.offset },
                field: &a.field.buffer.data,
                field_desc: a.field.desc,
                cell_unit: a.cell_unit,
                out_size: a.out_size,
            };
            let mut results = Vec::new();
            for gy in 0..work.global[1] {
                for gx in 0..work.global[0] {
                    if gx >= a.out_uv.desc.width || gy >= a.out_uv.desc.height {
                        continue;
                    }
                    results.push((gx, gy, sampler.invocation(gx, gy)));
                }
            }
            results
        };

        let write_word = |frame: &HostVideoBuffer, addr: u32, word: u32| -> Result<(), RemapError> {
            let mut d = frame.data.try_borrow_mut().map_err(|_| {
                error!("output frame is borrowed elsewhere");
                RemapError::Parameter("output frame is busy".into())
            })?;
            let addr = addr as usize;
            d[addr..addr + 4].copy_from_slice(&word.to_le_bytes());
            Ok(())
        };

        for (gx, gy, out) in &results {
            for (r, word) in out.luma.iter().enumerate() {
                let row = 2 * gy + r as u32;
                if row < a.out_y.desc.height && *gx < a.out_y.desc.width {
                    write_word(a.out_y.frame, a.out_y.offset + row * a.out_y.desc.row_pitch + 4 * gx, *word)?;
                }
            }
            write_word(a.out_uv.frame, a.out_uv.offset + gy * a.out_uv.desc.row_pitch + 4 * gx, out.uv)?;
        }
        debug!("host geo map ran {} invocations", results.len());
        Ok(())
    }
}

struct Plane<'d> {
    bytes: &'d [u8],
    desc: ImageDesc,
    offset: u32,
}

impl Plane<'_> {
    #[inline]
    fn texel(&self, x: u32, y: u32, channel: u32) -> f32 {
        let bpe = self.desc.format.bytes_per_element();
        self.bytes[(self.offset + y * self.desc.row_pitch + x * bpe + channel) as usize] as f32
    }

    /// Bilinear, clamp-to-edge, at texel coordinates.
    fn sample(&self, tx: f32, ty: f32, channel: u32) -> f32 {
        let (w, h) = (self.desc.width, self.desc.height);
        let tx = tx.clamp(0.0, (w - 1) as f32);
        let ty = ty.clamp(0.0, (h - 1) as f32);
        let (x0, y0) = (tx.floor() as u32, ty.floor() as u32);
        let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
        let (fx, fy) = (tx - x0 as f32, ty - y0 as f32);
        let top = self.texel(x0, y0, channel) * (1.0 - fx) + self.texel(x1, y0, channel) * fx;
        let bottom = self.texel(x0, y1, channel) * (1.0 - fx) + self.texel(x1, y1, channel) * fx;
        top * (1.0 - fy) + bottom * fy
    }
}

struct Invocation {
    luma: [u32; 2],
    uv: u32,
}

struct GeoSampler<'d> {
    in_y: Plane<'d>,
    in_uv: Plane<'d>,
    field: &'d [f32],
    field_desc: ImageDesc,
    cell_unit: [f32; 2],
    out_size: [f32; 2],
}

impl GeoSampler<'_> {
    fn field_cell(&self, x: u32, y: u32) -> [f32; 2] {
        let i = (y * self.field_desc.row_pitch / 4) as usize + x as usize * FIELD_CHANNELS;
        [self.field[i], self.field[i + 1]]
    }

    /// Normalized source position for output pixel center (px, py).
    fn source_pos(&self, px: f32, py: f32) -> [f32; 2] {
        let (fw, fh) = (self.field_desc.width, self.field_desc.height);
        let u = (px - self.out_size[0] * 0.5) / (fw as f32 * self.cell_unit[0]) + 0.5;
        let v = (py - self.out_size[1] * 0.5) / (fh as f32 * self.cell_unit[1]) + 0.5;
        let tx = (u * fw as f32 - 0.5).clamp(0.0, (fw - 1) as f32);
        let ty = (v * fh as f32 - 0.5).clamp(0.0, (fh - 1) as f32);
        let (x0, y0) = (tx.floor() as u32, ty.floor() as u32);
        let (x1, y1) = ((x0 + 1).min(fw - 1), (y0 + 1).min(fh - 1));
        let (ax, ay) = (tx - x0 as f32, ty - y0 as f32);
        let mix = |a: [f32; 2], b: [f32; 2], t: f32| [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t];
        let top = mix(self.field_cell(x0, y0), self.field_cell(x1, y0), ax);
        let bottom = mix(self.field_cell(x0, y1), self.field_cell(x1, y1), ax);
        mix(top, bottom, ay)
    }

    fn inside(pos: [f32; 2]) -> bool {
        (0.0..=1.0).contains(&pos[0]) && (0.0..=1.0).contains(&pos[1])
    }

    fn luma_at(&self, pos: [f32; 2]) -> u32 {
        if !Self::inside(pos) {
            return 0;
        }
        let tx = pos[0] * self.in_y.desc.width as f32 - 0.5;
        let ty = pos[1] * self.in_y.desc.height as f32 - 0.5;
        to_byte(self.in_y.sample(tx, ty, 0))
    }

    fn chroma_at(&self, pos: [f32; 2]) -> (u32, u32) {
        if !Self::inside(pos) {
            return (128, 128);
        }
        let tx = pos[0] * self.in_uv.desc.width as f32 - 0.5;
        let ty = pos[1] * self.in_uv.desc.height as f32 - 0.5;
        (to_byte(self.in_uv.sample(tx, ty, 0)), to_byte(self.in_uv.sample(tx, ty, 1)))
    }

    fn invocation(&self, gx: u32, gy: u32) -> Invocation {
        let mut luma = [0u32; 2];
        for (r, word) in luma.iter_mut().enumerate() {
            let py = (2 * gy + r as u32) as f32 + 0.5;
            for i in 0..4 {
                let px = (4 * gx + i) as f32 + 0.5;
                *word |= self.luma_at(self.source_pos(px, py)) << (8 * i);
            }
        }
        let mut uv = 0u32;
        for j in 0..2 {
            let cx = 2 * gx + j;
            let pos = self.source_pos((2 * cx + 1) as f32, (2 * gy + 1) as f32);
            let (u, v) = self.chroma_at(pos);
            uv |= (u << (16 * j)) | (v << (16 * j + 8));
        }
        Invocation { luma, uv }
    }
}

#[inline]
fn to_byte(v: f32) -> u32 {
    v.round().clamp(0.0, 255.0) as u32
}
