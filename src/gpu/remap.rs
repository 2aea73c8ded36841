// gpu/remap.rs — wgpu execution of the geo-map kernel.
//
// Frames live in one storage buffer each, exactly like a linear NV12
// allocation: the shader addresses planes by byte offset and row pitch.
// The field is a second storage buffer of vec4<f32> cells.
//
// Host access to the field goes through a staging copy: read the whole
// buffer back, let the caller edit it, write it back with
// `queue.write_buffer` and wait for the queue. The field is small (tens of
// cells), so this costs nothing next to a frame.
//
// Bindings (must match geo_map.wgsl):
//   0 input frame words (read)   1 field cells (read)
//   2 output frame words (rw)    3 plane parameters (uniform)
//
// wgpu does not allow one buffer to be bound read-only and read-write in
// the same dispatch, so an in-place remap first copies the input frame to a
// scratch buffer.

use std::sync::mpsc;

use log::{debug, error, info};
use wgpu::util::DeviceExt;

use crate::backend::{ComputeBackend, GeoMapArgs, KernelArg, WorkSize};
use crate::error::RemapError;
use crate::gpu::device::{GpuDevice, GpuError, WorkgroupSize};
use crate::video::{align_up, ImageDesc, VideoBuffer, VideoBufferInfo};

// ---------------------------------------------------------------------------
// GPU-side structs (repr(C), must match geo_map.wgsl)
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
struct PlaneParams {
    offset: u32,
    width: u32,
    height: u32,
    pitch: u32,
}

impl PlaneParams {
    fn new(desc: &ImageDesc, offset: u32) -> Self {
        PlaneParams { offset, width: desc.width, height: desc.height, pitch: desc.row_pitch }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct GeoMapParams {
    in_y: PlaneParams,
    in_uv: PlaneParams,
    out_y: PlaneParams,
    out_uv: PlaneParams,
    field: PlaneParams,
    cell_unit: [f32; 2],
    out_size: [f32; 2],
}

// ---------------------------------------------------------------------------
// Buffers
// ---------------------------------------------------------------------------

/// Device buffer holding a displacement field.
pub struct GpuFieldBuffer {
    buffer: wgpu::Buffer,
    size: usize,
}

/// An NV12 frame in one device storage buffer.
pub struct GpuVideoBuffer {
    info: VideoBufferInfo,
    buffer: wgpu::Buffer,
}

impl GpuVideoBuffer {
    /// Allocation size, padded to whole words.
    pub fn padded_size(&self) -> u64 {
        self.buffer.size()
    }
}

impl VideoBuffer for GpuVideoBuffer {
    fn info(&self) -> &VideoBufferInfo {
        &self.info
    }
}

// ---------------------------------------------------------------------------
// WgpuBackend
// ---------------------------------------------------------------------------

/// Geo-map kernel on a wgpu device.
///
/// The pipeline is compiled once for a fixed workgroup size; dispatches
/// with another local size are rejected.
pub struct WgpuBackend {
    gpu: GpuDevice,
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    workgroup: WorkgroupSize,
}

impl WgpuBackend {
    /// Compile the kernel for the default 16×4 local size.
    pub fn new(gpu: GpuDevice) -> Result<Self, GpuError> {
        let ws = WorkgroupSize::default();
        Self::with_workgroup_size(gpu, ws.x, ws.y)
    }

    pub fn with_workgroup_size(gpu: GpuDevice, x: u32, y: u32) -> Result<Self, GpuError> {
        let workgroup = gpu.validate_workgroup_size(x, y)?;

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("geo_map.wgsl"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/geo_map.wgsl").into()),
        });

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("geo_map BGL"),
            entries: &[
                storage(0, true),
                storage(1, true),
                storage(2, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("geo_map pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let constants = workgroup.as_constants();
        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("geo_map"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "geo_map",
            compilation_options: wgpu::PipelineCompilationOptions {
                constants: &constants,
                ..Default::default()
            },
            cache: None,
        });

        if let Some(e) = pollster::block_on(gpu.device.pop_error_scope()) {
            error!("geo map pipeline: {e}");
            return Err(GpuError::ShaderBuild(e.to_string()));
        }
        info!("geo map pipeline ready, workgroup {workgroup}");
        Ok(WgpuBackend { gpu, pipeline, bgl, workgroup })
    }

    pub fn device(&self) -> &GpuDevice {
        &self.gpu
    }

    pub fn workgroup_size(&self) -> WorkgroupSize {
        self.workgroup
    }

    /// Allocate a zeroed frame for `info`.
    pub fn create_frame(&self, info: VideoBufferInfo) -> Result<GpuVideoBuffer, RemapError> {
        let size = align_up(info.size, 4) as u64;
        let buffer = self.checked_buffer(
            "geo_map frame",
            size,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        )?;
        Ok(GpuVideoBuffer { info, buffer })
    }

    /// Allocate a frame and fill it with `bytes` (at least `info.size`).
    pub fn upload_frame(&self, info: VideoBufferInfo, bytes: &[u8]) -> Result<GpuVideoBuffer, RemapError> {
        if bytes.len() < info.size as usize {
            return Err(RemapError::Parameter(format!(
                "frame needs {} bytes, got {}",
                info.size,
                bytes.len()
            )));
        }
        let frame = self.create_frame(info)?;
        let mut padded = bytes[..frame.info.size as usize].to_vec();
        padded.resize(frame.buffer.size() as usize, 0);
        self.gpu.queue.write_buffer(&frame.buffer, 0, &padded);
        Ok(frame)
    }

    /// Copy a frame back to the host, `info.size` bytes.
    ///
    /// Synchronous: stalls until every queued dispatch is done. Tests and
    /// debug output only.
    pub fn read_frame(&self, frame: &GpuVideoBuffer) -> Result<Vec<u8>, RemapError> {
        let mut bytes = self.read_buffer(&frame.buffer)?;
        bytes.truncate(frame.info.size as usize);
        Ok(bytes)
    }

    /// Create a buffer, turning device out-of-memory and limit violations
    /// into `Allocation` errors instead of a device-lost panic.
    fn checked_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> Result<wgpu::Buffer, RemapError> {
        if size == 0 {
            return Err(RemapError::Allocation(format!("{label}: zero-sized buffer")));
        }
        if size > self.gpu.max_storage_binding() {
            return Err(RemapError::Allocation(format!(
                "{label}: {size} bytes exceeds the storage binding limit of {}",
                self.gpu.max_storage_binding()
            )));
        }
        let device = &self.gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        let validation = pollster::block_on(device.pop_error_scope());
        let oom = pollster::block_on(device.pop_error_scope());
        if let Some(e) = validation.or(oom) {
            error!("{label}: buffer of {size} bytes rejected: {e}");
            return Err(RemapError::Allocation(e.to_string()));
        }
        Ok(buffer)
    }

    fn read_buffer(&self, src: &wgpu::Buffer) -> Result<Vec<u8>, RemapError> {
        let device = &self.gpu.device;
        let size = src.size();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("geo_map readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("geo_map readback"),
        });
        encoder.copy_buffer_to_buffer(src, 0, &staging, 0, size);
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver outlives the poll below.
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| RemapError::Map("map callback never fired".into()))?
            .map_err(|e| RemapError::Map(e.to_string()))?;

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }
}

impl ComputeBackend for WgpuBackend {
    type Buffer = GpuFieldBuffer;
    type Frame = GpuVideoBuffer;

    fn create_buffer(&self, size: usize) -> Result<GpuFieldBuffer, RemapError> {
        let padded = align_up(size as u32, 4) as u64;
        let buffer = self.checked_buffer(
            "geo_map field",
            padded,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        )?;
        Ok(GpuFieldBuffer { buffer, size })
    }

    fn buffer_size(&self, buffer: &GpuFieldBuffer) -> usize {
        buffer.size
    }

    fn map_buffer<R>(&self, buffer: &mut GpuFieldBuffer, f: impl FnOnce(&mut [f32]) -> R) -> Result<R, RemapError> {
        let bytes = self.read_buffer(&buffer.buffer)?;
        let mut floats: Vec<f32> = bytemuck::cast_slice::<u8, [u8; 4]>(&bytes)
            .iter()
            .map(|b| f32::from_le_bytes(*b))
            .collect();
        let out = f(&mut floats);
        self.gpu.queue.write_buffer(&buffer.buffer, 0, bytemuck::cast_slice(&floats));
        self.gpu.queue.submit(std::iter::empty());
        self.gpu.device.poll(wgpu::Maintain::Wait);
        Ok(out)
    }

    fn run_geo_map(
        &self,
        args: &[KernelArg<'_, GpuVideoBuffer, GpuFieldBuffer>],
        work: WorkSize,
    ) -> Result<(), RemapError> {
        let a = GeoMapArgs::decode(args)?;
        if work.local != [self.workgroup.x, self.workgroup.y] {
            return Err(RemapError::Parameter(format!(
                "pipeline is built for local size {}, dispatch asks for {:?}",
                self.workgroup, work.local
            )));
        }
        if !std::ptr::eq(a.in_y.frame, a.in_uv.frame) || !std::ptr::eq(a.out_y.frame, a.out_uv.frame) {
            return Err(RemapError::Parameter("luma and chroma planes must share one frame buffer".into()));
        }

        let params = GeoMapParams {
            in_y: PlaneParams::new(&a.in_y.desc, a.in_y.offset),
            in_uv: PlaneParams::new(&a.in_uv.desc, a.in_uv.offset),
            out_y: PlaneParams::new(&a.out_y.desc, a.out_y.offset),
            out_uv: PlaneParams::new(&a.out_uv.desc, a.out_uv.offset),
            field: PlaneParams::new(&a.field.desc, 0),
            cell_unit: a.cell_unit,
            out_size: a.out_size,
        };

        let device = &self.gpu.device;
        let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("geo_map params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("geo_map"),
        });

        let in_place = std::ptr::eq(a.in_y.frame, a.out_y.frame);
        let scratch = if in_place {
            let size = a.in_y.frame.buffer.size();
            let copy = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("geo_map input copy"),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            encoder.copy_buffer_to_buffer(&a.in_y.frame.buffer, 0, &copy, 0, size);
            Some(copy)
        } else {
            None
        };
        let src = scratch.as_ref().unwrap_or(&a.in_y.frame.buffer);

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("geo_map BG"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: src.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: a.field.buffer.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: a.out_y.frame.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: params_buf.as_entire_binding() },
            ],
        });

        let [wx, wy] = work.workgroups();
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("geo_map"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(wx, wy, 1);
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        self.gpu.device.poll(wgpu::Maintain::Wait);
        debug!("geo map dispatched {wx}x{wy} workgroups{}", if in_place { " (in place)" } else { "" });
        Ok(())
    }
}
