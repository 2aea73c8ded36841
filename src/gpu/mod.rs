// gpu/mod.rs — wgpu execution of the geo-map kernel.
//
// `host::HostBackend` is the reference; `remap::WgpuBackend` runs the same
// kernel (shaders/geo_map.wgsl) on a Vulkan device and is checked against
// the host output byte for byte, within one level of rounding.
//
// The seam aligner stays on the CPU: it works on two small crops per seam
// and needs the tracked positions on the host every frame anyway.

pub mod device;
pub mod remap;
