// backend.rs — The seam between the remap logic and whatever executes it.
//
// The handler, the field resource and the kernel binding only talk to a
// `ComputeBackend`: allocate a field buffer, map it on the host for a
// scoped read/write, and run the geo-map kernel with an ordered argument
// list. `gpu::remap::WgpuBackend` runs it on a device; `host::HostBackend`
// runs the same kernel on the CPU.

use crate::error::RemapError;
use crate::video::{ImageDesc, PlaneView, VideoBuffer};

/// Floats per field cell (x, y and two unused channels).
pub const FIELD_CHANNELS: usize = 4;

/// Bytes per field cell.
pub const FIELD_CELL_BYTES: u32 = (FIELD_CHANNELS * std::mem::size_of::<f32>()) as u32;

/// 2D dispatch geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSize {
    pub global: [u32; 2],
    pub local: [u32; 2],
}

impl WorkSize {
    pub fn workgroups(&self) -> [u32; 2] {
        [self.global[0] / self.local[0], self.global[1] / self.local[1]]
    }
}

/// The field buffer seen as a 2D image of `Rgba32F` cells.
#[derive(Debug)]
pub struct FieldView<'a, Buf> {
    pub buffer: &'a Buf,
    pub desc: ImageDesc,
}

impl<'a, Buf> Clone for FieldView<'a, Buf> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, Buf> Copy for FieldView<'a, Buf> {}

/// One positional kernel argument.
#[derive(Debug)]
pub enum KernelArg<'a, F, Buf> {
    Plane(PlaneView<'a, F>),
    Field(FieldView<'a, Buf>),
    Float2([f32; 2]),
}

/// Execution engine for the geo-map kernel.
pub trait ComputeBackend {
    /// Linear buffer backing a displacement field.
    type Buffer;
    /// Frame type the kernel reads and writes.
    type Frame: VideoBuffer;

    /// Allocate `size` bytes. Zero size or a device rejection is an
    /// `Allocation` error.
    fn create_buffer(&self, size: usize) -> Result<Self::Buffer, RemapError>;

    /// Size in bytes of a buffer created by `create_buffer`.
    fn buffer_size(&self, buffer: &Self::Buffer) -> usize;

    /// Map the buffer as f32s, run `f`, then unmap. Changes made by `f`
    /// are visible to the next kernel run. Failures are `Map` errors.
    fn map_buffer<R>(
        &self,
        buffer: &mut Self::Buffer,
        f: impl FnOnce(&mut [f32]) -> R,
    ) -> Result<R, RemapError>;

    /// Run the geo-map kernel to completion.
    fn run_geo_map(
        &self,
        args: &[KernelArg<'_, Self::Frame, Self::Buffer>],
        work: WorkSize,
    ) -> Result<(), RemapError>;
}

/// Kernel parameters decoded from an argument list, shared by both
/// backends.
#[derive(Debug)]
pub struct GeoMapArgs<'a, F, Buf> {
    pub in_y: PlaneView<'a, F>,
    pub in_uv: PlaneView<'a, F>,
    pub field: FieldView<'a, Buf>,
    pub cell_unit: [f32; 2],
    pub out_y: PlaneView<'a, F>,
    pub out_uv: PlaneView<'a, F>,
    pub out_size: [f32; 2],
}

impl<'a, F, Buf> GeoMapArgs<'a, F, Buf> {
    /// Check the positional layout and pull the arguments apart.
    pub fn decode(args: &[KernelArg<'a, F, Buf>]) -> Result<Self, RemapError> {
        let bad = |i: usize, want: &str| {
            RemapError::Parameter(format!("geo map argument {i} must be a {want}"))
        };
        if args.len() != 7 {
            return Err(RemapError::Parameter(format!(
                "geo map takes 7 arguments, got {}",
                args.len()
            )));
        }
        let plane = |i: usize| match &args[i] {
            KernelArg::Plane(p) => Ok(*p),
            _ => Err(bad(i, "plane")),
        };
        let float2 = |i: usize| match &args[i] {
            KernelArg::Float2(v) => Ok(*v),
            _ => Err(bad(i, "float2")),
        };
        let field = match &args[2] {
            KernelArg::Field(f) => *f,
            _ => return Err(bad(2, "field image")),
        };
        Ok(GeoMapArgs {
            in_y: plane(0)?,
            in_uv: plane(1)?,
            field,
            cell_unit: float2(3)?,
            out_y: plane(4)?,
            out_uv: plane(5)?,
            out_size: float2(6)?,
        })
    }
}
