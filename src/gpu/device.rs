// gpu/device.rs — wgpu device for the geo-map kernel.
//
// Responsibilities:
//   - Enumerate Vulkan adapters and prefer real hardware over software
//     renderers.
//   - Expose a `DeviceProfile` that caps device limits so a desktop run
//     rejects dispatches an embedded camera SoC would reject.
//   - Validate the kernel's workgroup shape against the profile and hand it
//     to pipeline creation as WGSL override constants.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` may pick llvmpipe when a software
// Vulkan driver is installed next to the real one. We enumerate explicitly
// and take a hardware adapter first, anything else last.
//
// DEVICE LIMITS:
// Under a non-Native profile the device is requested with *lower* limits
// than the hardware supports. wgpu validates every dispatch and buffer
// against the requested limits, so oversized field buffers or workgroups
// fail here instead of on the target.

use std::collections::HashMap;
use std::fmt;

use log::{debug, info, warn};

/// Hardware profile controlling the requested device limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// The adapter's default limits.
    Native,
    /// Embedded camera SoC: 256 invocations per workgroup, 128 MiB storage
    /// bindings.
    Embedded,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::Embedded => write!(f, "Embedded (simulated limits)"),
        }
    }
}

/// Local size of a 2D compute dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub x: u32,
    pub y: u32,
}

impl Default for WorkgroupSize {
    /// 16×4: one row of 16 chroma words, four chroma rows.
    fn default() -> Self {
        WorkgroupSize { x: 16, y: 4 }
    }
}

impl WorkgroupSize {
    pub fn total(&self) -> u32 {
        self.x * self.y
    }

    /// Override constants for `PipelineCompilationOptions::constants`.
    ///
    /// ```wgsl
    /// override WORKGROUP_X: u32 = 16u;
    /// override WORKGROUP_Y: u32 = 4u;
    ///
    /// @compute @workgroup_size(WORKGROUP_X, WORKGROUP_Y, 1)
    /// ```
    pub fn as_constants(&self) -> HashMap<String, f64> {
        HashMap::from([
            ("WORKGROUP_X".to_string(), self.x as f64),
            ("WORKGROUP_Y".to_string(), self.y as f64),
        ])
    }
}

impl fmt::Display for WorkgroupSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{} ({} invocations)", self.x, self.y, self.total())
    }
}

/// Adapter information kept for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// Adapter, device, queue and active profile.
///
/// Create one per process and share it; device creation is expensive.
///
/// # Field drop order
/// Fields drop top to bottom. `_instance` is declared last so the
/// `wgpu::Instance` outlives `device` and `queue`; some Vulkan layers
/// crash when the instance goes away before device-level objects.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// First hardware Vulkan adapter with `DeviceProfile::Native` limits.
    pub fn new() -> Result<Self, GpuError> {
        Self::new_with_profile(DeviceProfile::Native)
    }

    pub fn new_with_profile(profile: DeviceProfile) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(profile))
    }

    async fn init_async(profile: DeviceProfile) -> Result<Self, GpuError> {
        // Non-conformant layers (dzn on WSL2) are still fine for plain
        // storage-buffer compute, so they are enumerated too.
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            flags,
            ..Default::default()
        });

        let all_adapters: Vec<wgpu::Adapter> = instance.enumerate_adapters(wgpu::Backends::VULKAN);
        if all_adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }
        for a in &all_adapters {
            let info = a.get_info();
            debug!("Vulkan adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }

        // Hardware first; a software renderer only when nothing else exists.
        let mut fallback = None;
        let mut adapter = None;
        for a in all_adapters {
            if a.get_info().device_type == wgpu::DeviceType::Cpu {
                fallback.get_or_insert(a);
            } else if adapter.is_none() {
                adapter = Some(a);
            }
        }
        let adapter = match (adapter, fallback) {
            (Some(a), _) => a,
            (None, Some(a)) => {
                warn!("only a software Vulkan adapter is available: {}", a.get_info().name);
                a
            }
            (None, None) => return Err(GpuError::NoSuitableAdapter),
        };

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("geoseam"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits_for_profile(profile),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        info!("geo map device: {adapter_info}, profile {profile}");
        Ok(GpuDevice { device, queue, profile, adapter_info, _instance: instance })
    }

    /// Check a kernel local size against the active profile.
    pub fn validate_workgroup_size(&self, x: u32, y: u32) -> Result<WorkgroupSize, GpuError> {
        validate_for_profile(self.profile, x, y)
    }

    /// Largest storage binding the device accepts, in bytes.
    pub fn max_storage_binding(&self) -> u64 {
        self.device.limits().max_storage_buffer_binding_size as u64
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuDevice {{ adapter: {}, profile: {} }}", self.adapter_info, self.profile)
    }
}

// ============================================================
// Limits helpers
// ============================================================

fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),
        DeviceProfile::Embedded => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_storage_buffer_binding_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

fn validate_for_profile(profile: DeviceProfile, x: u32, y: u32) -> Result<WorkgroupSize, GpuError> {
    let limits = limits_for_profile(profile);
    let total = x.saturating_mul(y);
    if x == 0 || y == 0 || x > limits.max_compute_workgroup_size_x || y > limits.max_compute_workgroup_size_y {
        return Err(GpuError::WorkgroupTooLarge { total, max: limits.max_compute_invocations_per_workgroup });
    }
    if total > limits.max_compute_invocations_per_workgroup {
        return Err(GpuError::WorkgroupTooLarge { total, max: limits.max_compute_invocations_per_workgroup });
    }
    Ok(WorkgroupSize { x, y })
}

// ============================================================
// Error type
// ============================================================

/// Errors from device initialization and pipeline setup.
#[derive(thiserror::Error, Debug)]
pub enum GpuError {
    /// No Vulkan adapter at all. Check that `vulkaninfo` lists a device.
    #[error("no suitable Vulkan adapter found")]
    NoSuitableAdapter,

    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Local size is empty or exceeds the profile's invocation limits.
    #[error("workgroup size {total} is outside the profile limit of {max} invocations")]
    WorkgroupTooLarge { total: u32, max: u32 },

    /// The geo-map shader failed validation.
    #[error("shader build failed: {0}")]
    ShaderBuild(String),
}
