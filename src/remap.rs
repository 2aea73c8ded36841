// remap.rs — Per-frame driver of the geo-map kernel.
//
// Lifecycle:
//   Unconfigured --set_field_data--> FieldLoaded --first prepare_frame--> Normalized
// Loading new field data at any point returns to FieldLoaded; the next
// frame normalizes it again against the (even-aligned) input size.
//
// Each frame runs prepare_frame → execute → execute_done. Plane views are
// rebuilt from the frames' layout every time and live only inside the
// returned `FrameBinding`, which execute_done consumes.

use log::{debug, error, info, warn};

use crate::backend::{ComputeBackend, WorkSize};
use crate::config::RemapConfig;
use crate::error::{ConfigError, RemapError};
use crate::field::{cell_unit_resolved, resolve_cell_unit, DisplacementField, GeoPos};
use crate::field_resource::GpuFieldResource;
use crate::kernel::RemapKernelBinding;
use crate::video::{align_down, PlaneView, VideoBuffer, VideoBufferInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Unconfigured,
    FieldLoaded,
    Normalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputSizeSource {
    Explicit,
    FirstInput,
}

/// Plane views of one input/output pair, valid for one dispatch.
#[derive(Debug)]
pub struct FrameBinding<'f, F> {
    pub input: [PlaneView<'f, F>; 2],
    pub output: [PlaneView<'f, F>; 2],
    pub output_size: (u32, u32),
}

pub struct RemapHandler<B: ComputeBackend> {
    backend: B,
    kernel: RemapKernelBinding,
    output_alignment: u32,
    field: GpuFieldResource<B>,
    state: HandlerState,
    cell_unit: (f32, f32),
    output_size: Option<((u32, u32), OutputSizeSource)>,
    frames: u64,
}

impl<B: ComputeBackend> RemapHandler<B> {
    pub fn new(backend: B) -> Self {
        Self::build(backend, &RemapConfig::default())
    }

    pub fn with_config(backend: B, config: &RemapConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(backend, config))
    }

    fn build(backend: B, config: &RemapConfig) -> Self {
        RemapHandler {
            backend,
            kernel: RemapKernelBinding::new([config.local_size.0, config.local_size.1]),
            output_alignment: config.output_alignment,
            field: GpuFieldResource::new(),
            state: HandlerState::Unconfigured,
            cell_unit: (0.0, 0.0),
            output_size: config.output_size.map(|s| (s, OutputSizeSource::Explicit)),
            frames: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> HandlerState {
        self.state
    }

    pub fn field_resource(&self) -> &GpuFieldResource<B> {
        &self.field
    }

    /// Field cells as currently stored on the backend.
    pub fn read_field(&mut self) -> Result<Vec<GeoPos>, RemapError> {
        self.field.read_cells(&self.backend)
    }

    /// Load raw (source pixel) field data.
    pub fn set_field_data(&mut self, cells: &[GeoPos], width: u32, height: u32) -> Result<(), RemapError> {
        self.field.write_cells(&self.backend, cells, width, height)?;
        self.state = HandlerState::FieldLoaded;
        info!("geo map data set: {width}x{height} cells");
        Ok(())
    }

    /// Load a host field. Its cell unit is adopted when resolved; an
    /// already normalized field skips normalization.
    pub fn set_field(&mut self, field: &DisplacementField) -> Result<(), RemapError> {
        self.set_field_data(field.cells(), field.width(), field.height())?;
        if field.is_cell_unit_resolved() {
            let (ux, uy) = field.cell_unit();
            self.set_cell_unit(ux, uy);
        }
        if field.is_normalized() {
            self.field.assume_normalized()?;
            self.state = HandlerState::Normalized;
        }
        Ok(())
    }

    pub fn set_cell_unit(&mut self, unit_x: f32, unit_y: f32) {
        self.cell_unit = (unit_x, unit_y);
    }

    pub fn cell_unit(&self) -> (f32, f32) {
        self.cell_unit
    }

    pub fn set_output_size(&mut self, width: u32, height: u32) {
        self.output_size = Some(((width, height), OutputSizeSource::Explicit));
    }

    /// Logical output size, once known.
    pub fn output_size(&self) -> Option<(u32, u32)> {
        self.output_size.map(|(s, _)| s)
    }

    /// Output size as the float pair passed to the kernel.
    pub fn output_pixel_size(&self) -> Option<[f32; 2]> {
        self.output_size().map(|(w, h)| [w as f32, h as f32])
    }

    /// Output size the field spans: field cells times cell unit.
    pub fn field_scale_size(&self) -> Option<(f32, f32)> {
        self.field
            .dims()
            .map(|(w, h)| (w as f32 * self.cell_unit.0, h as f32 * self.cell_unit.1))
    }

    /// Layout for the output pool: NV12 at the output size (the input's
    /// size unless set explicitly), padded to the output alignment.
    pub fn prepare_output_info(&mut self, input: &VideoBufferInfo) -> Result<VideoBufferInfo, RemapError> {
        if let Err(e) = input.require_nv12() {
            error!("geo map output negotiation: {e}");
            return Err(e);
        }
        let (w, h) = match self.output_size {
            Some((size, _)) => size,
            None => {
                let size = (input.width, input.height);
                self.output_size = Some((size, OutputSizeSource::FirstInput));
                size
            }
        };
        let a = self.output_alignment;
        info!("geo map output info {w}x{h} (aligned to {a})");
        Ok(VideoBufferInfo::nv12(w, h, a, a))
    }

    fn resolve_output_size(&mut self, input: &VideoBufferInfo) -> Result<(u32, u32), RemapError> {
        match self.output_size {
            None => {
                let size = (input.width, input.height);
                info!("geo map output size taken from first input: {}x{}", size.0, size.1);
                self.output_size = Some((size, OutputSizeSource::FirstInput));
                Ok(size)
            }
            Some((size, OutputSizeSource::FirstInput)) if size != (input.width, input.height) => {
                error!(
                    "input size {}x{} differs from first input {}x{}",
                    input.width, input.height, size.0, size.1
                );
                Err(RemapError::Parameter("input frame size changed".into()))
            }
            Some((size, _)) => Ok(size),
        }
    }

    /// Validate a frame pair, finish field setup and build plane views.
    pub fn prepare_frame<'f>(
        &mut self,
        input: &'f B::Frame,
        output: &'f B::Frame,
    ) -> Result<FrameBinding<'f, B::Frame>, RemapError> {
        let in_info = input.info();
        let out_info = output.info();
        for info in [in_info, out_info] {
            if let Err(e) = info.require_nv12() {
                error!("geo map frame rejected: {e}");
                return Err(e);
            }
        }
        let (field_w, field_h) = match (self.state, self.field.dims()) {
            (HandlerState::Unconfigured, _) | (_, None) => {
                error!("geo map frame without field data");
                return Err(RemapError::Parameter("no displacement field set".into()));
            }
            (_, Some(dims)) => dims,
        };

        let output_size = self.resolve_output_size(in_info)?;
        if (out_info.width, out_info.height) != output_size {
            error!(
                "output frame {}x{} does not match output size {}x{}",
                out_info.width, out_info.height, output_size.0, output_size.1
            );
            return Err(RemapError::Parameter("output frame size mismatch".into()));
        }

        if !cell_unit_resolved(self.cell_unit) {
            self.cell_unit = resolve_cell_unit(self.cell_unit, (field_w, field_h), output_size);
            info!("geo map cell unit derived from output size: {:?}", self.cell_unit);
        }

        if self.state == HandlerState::FieldLoaded {
            let src_w = align_down(in_info.width, 2);
            let src_h = align_down(in_info.height, 2);
            if let Err(e) = self.field.normalize_in_place(&self.backend, src_w, src_h) {
                error!("geo map normalization failed: {e}");
                return Err(e);
            }
            self.state = HandlerState::Normalized;
        }

        let input_views = PlaneView::input_nv12(input).map_err(|e| {
            error!("input plane views: {e}");
            e
        })?;
        let output_views = PlaneView::output_nv12(output).map_err(|e| {
            error!("output plane views: {e}");
            e
        })?;
        Ok(FrameBinding { input: input_views, output: output_views, output_size })
    }

    /// Bind arguments and run the kernel for one prepared frame.
    pub fn execute(&self, binding: &FrameBinding<'_, B::Frame>) -> Result<WorkSize, RemapError> {
        let field = self.field.view()?;
        let (args, work) = self.kernel.prepare_arguments(
            &binding.input,
            &binding.output,
            field,
            self.cell_unit,
            binding.output_size,
        )?;
        self.backend.run_geo_map(&args, work).map_err(|e| {
            error!("geo map kernel failed: {e}");
            e
        })?;
        Ok(work)
    }

    /// Release the frame's plane views.
    pub fn execute_done(&mut self, binding: FrameBinding<'_, B::Frame>) {
        drop(binding);
        self.frames += 1;
        debug!("geo map frame {} done", self.frames);
    }

    /// prepare_frame → execute → execute_done.
    pub fn process(&mut self, input: &B::Frame, output: &B::Frame) -> Result<WorkSize, RemapError> {
        let binding = self.prepare_frame(input, output)?;
        let result = self.execute(&binding);
        if result.is_err() {
            warn!("geo map frame {} dropped", self.frames + 1);
        }
        self.execute_done(binding);
        result
    }

    /// Frames completed so far.
    pub fn frames_processed(&self) -> u64 {
        self.frames
    }
}
