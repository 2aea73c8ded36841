// kernel.rs — Argument list and dispatch geometry of the geo-map kernel.
//
// Argument order is part of the kernel ABI:
//   0 input luma   1 input chroma   2 field image   3 cell unit (float2)
//   4 output luma  5 output chroma  6 output size in pixels (float2)
//
// The dispatch is 2D over the output chroma plane (one invocation per
// packed chroma word), rounded up to whole workgroups. The kernel bounds
// checks, so the padding invocations do nothing.

use log::{debug, error};

use crate::backend::{FieldView, KernelArg, WorkSize};
use crate::error::RemapError;
use crate::video::{align_up, ImageFormat, PlaneView};

/// Builds geo-map arguments for a fixed workgroup shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemapKernelBinding {
    local: [u32; 2],
}

impl Default for RemapKernelBinding {
    fn default() -> Self {
        RemapKernelBinding { local: [16, 4] }
    }
}

impl RemapKernelBinding {
    pub fn new(local: [u32; 2]) -> Self {
        RemapKernelBinding { local }
    }

    pub fn local_size(&self) -> [u32; 2] {
        self.local
    }

    /// Smallest multiple of the local size covering the output chroma plane.
    pub fn work_size(&self, out_uv_width: u32, out_uv_height: u32) -> WorkSize {
        WorkSize {
            global: [align_up(out_uv_width, self.local[0]), align_up(out_uv_height, self.local[1])],
            local: self.local,
        }
    }

    pub fn prepare_arguments<'a, F, Buf>(
        &self,
        input: &[PlaneView<'a, F>; 2],
        output: &[PlaneView<'a, F>; 2],
        field: FieldView<'a, Buf>,
        cell_unit: (f32, f32),
        output_size: (u32, u32),
    ) -> Result<(Vec<KernelArg<'a, F, Buf>>, WorkSize), RemapError> {
        if input[0].desc.format != ImageFormat::R8 || input[1].desc.format != ImageFormat::Rg8 {
            error!("geo map input planes must be R8 + Rg8");
            return Err(RemapError::Parameter("input planes must be R8 luma and Rg8 chroma".into()));
        }
        if output.iter().any(|p| p.desc.format != ImageFormat::Packed8x4) {
            error!("geo map output planes must be packed words");
            return Err(RemapError::Parameter("output planes must be Packed8x4".into()));
        }
        if field.desc.format != ImageFormat::Rgba32F {
            return Err(RemapError::Parameter("field image must be Rgba32F".into()));
        }
        if !(cell_unit.0 > 0.0 && cell_unit.1 > 0.0) {
            error!("geo map cell unit {cell_unit:?} is not positive");
            return Err(RemapError::Parameter(format!("invalid cell unit {cell_unit:?}")));
        }
        if output_size.0 == 0 || output_size.1 == 0 {
            return Err(RemapError::Parameter("output size must not be empty".into()));
        }
        if self.local.contains(&0) {
            error!("geo map local size {:?} has a zero component", self.local);
            return Err(RemapError::Parameter(format!("invalid local size {:?}", self.local)));
        }

        let work = self.work_size(output[1].desc.width, output[1].desc.height);
        let args = vec![
            KernelArg::Plane(input[0]),
            KernelArg::Plane(input[1]),
            KernelArg::Field(field),
            KernelArg::Float2([cell_unit.0, cell_unit.1]),
            KernelArg::Plane(output[0]),
            KernelArg::Plane(output[1]),
            KernelArg::Float2([output_size.0 as f32, output_size.1 as f32]),
        ];
        debug!(
            "geo map dispatch global {:?} local {:?} (out chroma {}x{})",
            work.global, work.local, output[1].desc.width, output[1].desc.height
        );
        Ok((args, work))
    }
}
