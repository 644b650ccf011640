//! A test-pattern kernel that writes into mapped partitions.

use wgpu::util::DeviceExt;

use super::compute::{WgpuArray, WgpuCompute};
use super::devices::GpuDevices;
use super::error::{scoped, WgpuError};
use super::pipeline_helpers::{compute_uniform_buffer, create_compute_pipeline};
use crate::pipeline::{DeviceId, MapAccess};
use crate::ring::MappedPartition;

const WORKGROUP: u32 = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct PatternParams {
    origin_x: u32,
    full_width: u32,
    frame: u32,
    _pad: u32,
}

struct DeviceKernel {
    pipeline: wgpu::ComputePipeline,
    params_layout: wgpu::BindGroupLayout,
}

/// Animated gradient over the full surface, so partition seams are visible
/// if the layout is wrong.
pub struct PatternKernel {
    access: MapAccess,
    kernels: Vec<Option<DeviceKernel>>,
}

/// Pattern source with the storage access matching `access`.
fn shader_source(access: MapAccess) -> String {
    let source = include_str!("../../assets/shaders/pattern.wgsl");
    match access {
        MapAccess::WriteDiscard => source.to_owned(),
        MapAccess::ReadWrite => {
            source.replace("rgba8unorm, write>", "rgba8unorm, read_write>")
        }
    }
}

impl PatternKernel {
    /// Compile the kernel on every device of `compute` for arrays mapped
    /// with `access`. Devices that cannot bind `access` get no kernel.
    #[must_use]
    pub fn new(compute: &WgpuCompute, access: MapAccess) -> Self {
        let source = shader_source(access);
        let kernels = compute
            .devices()
            .iter()
            .map(|gpu| {
                let surface_layout = compute.bind_group_layout(gpu.id, access)?;
                let params_layout = gpu.device.create_bind_group_layout(
                    &wgpu::BindGroupLayoutDescriptor {
                        label: Some("Pattern Params Layout"),
                        entries: &[compute_uniform_buffer(0)],
                    },
                );
                let shader = gpu.device.create_shader_module(
                    wgpu::ShaderModuleDescriptor {
                        label: Some("Pattern Shader"),
                        source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
                    },
                );
                let pipeline = create_compute_pipeline(
                    &gpu.device,
                    "Pattern",
                    &shader,
                    &[surface_layout, &params_layout],
                );
                Some(DeviceKernel {
                    pipeline,
                    params_layout,
                })
            })
            .collect();
        Self { access, kernels }
    }

    /// Storage access the kernel was built for.
    #[must_use]
    pub fn access(&self) -> MapAccess {
        self.access
    }

    /// Fill one mapped partition. `full_width` is the width of the whole
    /// surface; `frame` animates the pattern.
    ///
    /// # Errors
    ///
    /// Fails if the partition's device is not open, if the array was mapped
    /// with a different access than the kernel's, or if wgpu rejects the
    /// dispatch.
    pub fn dispatch(
        &self,
        devices: &GpuDevices,
        part: &MappedPartition<'_, WgpuArray>,
        full_width: u32,
        frame: u32,
    ) -> Result<(), WgpuError> {
        if part.array.access() != self.access {
            return Err(WgpuError::AccessMismatch {
                kernel: self.access,
                array: part.array.access(),
            });
        }
        let unknown = || WgpuError::UnknownDevice(part.device);
        let gpu = devices.get(part.device).ok_or_else(unknown)?;
        let kernel = self
            .kernels
            .get(part.device.0 as usize)
            .and_then(Option::as_ref)
            .ok_or_else(unknown)?;

        let params = PatternParams {
            origin_x: part.partition.x,
            full_width,
            frame,
            _pad: 0,
        };
        let buffer =
            gpu.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Pattern Params"),
                    contents: bytemuck::bytes_of(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
        let params_group =
            gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Pattern Params"),
                layout: &kernel.params_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });

        let extent = part.array.extent();
        scoped(&gpu.device, || {
            let mut encoder = gpu.create_encoder("Pattern Encoder");
            {
                let mut pass =
                    encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("Pattern Pass"),
                        timestamp_writes: None,
                    });
                pass.set_pipeline(&kernel.pipeline);
                pass.set_bind_group(0, part.array.bind_group(), &[]);
                pass.set_bind_group(1, &params_group, &[]);
                pass.dispatch_workgroups(
                    extent.width.div_ceil(WORKGROUP),
                    extent.height.div_ceil(WORKGROUP),
                    1,
                );
            }
            gpu.submit(encoder);
        })
    }

    /// Whether the kernel compiled on `device`.
    #[must_use]
    pub fn supports(&self, device: DeviceId) -> bool {
        self.kernels
            .get(device.0 as usize)
            .is_some_and(Option::is_some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::devices::tests::try_open;
    use crate::gpu::{WgpuDisplay, WgpuStream};
    use crate::options::InteropOptions;
    use crate::partition::Partition;
    use crate::pipeline::{ComputePipeline, DisplayPipeline, Extent};
    use crate::ring::InteropRing;

    type WgpuRing = InteropRing<WgpuDisplay, WgpuCompute>;

    /// Open the adapters and build a single-device ring mapping with
    /// `access`, or `None` when no adapter can provide it.
    fn wgpu_ring(access: MapAccess) -> Option<(GpuDevices, WgpuRing)> {
        let devices = try_open()?;
        let gpu = devices.get(DeviceId(0))?;
        if access == MapAccess::ReadWrite && !gpu.read_write_storage {
            return None;
        }
        let mut options = InteropOptions::default();
        options.compute.access = access;
        let ring = InteropRing::with_options(
            WgpuDisplay::headless(devices.clone()),
            WgpuCompute::new(devices.clone()),
            vec![DeviceId(0)],
            &options,
        )
        .unwrap();
        Some((devices, ring))
    }

    fn near(actual: u8, expected: u8) -> bool {
        actual.abs_diff(expected) <= 2
    }

    fn ring_frame_writes_the_pattern(access: MapAccess) {
        let Some((devices, mut ring)) = wgpu_ring(access) else {
            return;
        };
        let kernel = PatternKernel::new(ring.compute(), access);
        assert!(kernel.supports(DeviceId(0)));
        ring.resize(64, 32).unwrap();
        ring.clear().unwrap();

        ring.map(&WgpuStream).unwrap();
        let parts = ring.array_get().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].array.access(), access);
        for part in &parts {
            kernel.dispatch(&devices, part, 64, 0).unwrap();
        }
        drop(parts);
        ring.unmap(&WgpuStream).unwrap();

        let targets = ring.slot_targets(ring.index());
        let (_, target) = targets[0];
        let pixels = ring.display().read_target(target).unwrap();
        assert_eq!(pixels.len(), 64 * 32 * 4);
        let at = |x: usize, y: usize| &pixels[(y * 64 + x) * 4..][..4];

        // Frame 0: red follows the column, green the row, blue is 1.
        assert!(near(at(0, 0)[0], 128) && near(at(0, 0)[1], 128));
        assert!(near(at(16, 0)[0], 255));
        assert!(near(at(0, 8)[1], 255));
        assert!(pixels.chunks(4).all(|p| near(p[2], 255) && p[3] == 255));

        drop(targets);
        ring.swap().unwrap();
        ring.teardown().unwrap();
    }

    #[test]
    fn ring_frame_with_write_discard_access() {
        ring_frame_writes_the_pattern(MapAccess::WriteDiscard);
    }

    #[test]
    fn ring_frame_with_read_write_access() {
        ring_frame_writes_the_pattern(MapAccess::ReadWrite);
    }

    #[test]
    fn kernel_refuses_an_array_with_other_access() {
        let Some((devices, mut ring)) = wgpu_ring(MapAccess::ReadWrite) else {
            return;
        };
        let kernel = PatternKernel::new(ring.compute(), MapAccess::WriteDiscard);
        ring.resize(16, 16).unwrap();
        ring.map(&WgpuStream).unwrap();
        let parts = ring.array_get().unwrap();
        let err = kernel.dispatch(&devices, &parts[0], 16, 0).unwrap_err();
        assert!(matches!(
            err,
            WgpuError::AccessMismatch {
                kernel: MapAccess::WriteDiscard,
                array: MapAccess::ReadWrite,
            }
        ));
        drop(parts);
        ring.unmap(&WgpuStream).unwrap();
    }

    #[test]
    fn kernel_writes_an_opaque_pattern() {
        let Some(devices) = try_open() else {
            return;
        };
        let d = DeviceId(0);
        let mut display = WgpuDisplay::headless(devices.clone());
        let mut compute = WgpuCompute::new(devices.clone());
        let kernel = PatternKernel::new(&compute, MapAccess::WriteDiscard);
        assert!(kernel.supports(d));

        let extent = Extent::new(20, 10);
        let target = display.create_target(d, extent).unwrap();
        display.clear(d, &target, [0.0; 4]).unwrap();
        let backing = display.create_backing(d, &target).unwrap();
        let resource = compute
            .register(d, &backing, MapAccess::WriteDiscard)
            .unwrap();

        compute.map(d, &resource, &WgpuStream).unwrap();
        let array = compute.mapped_array(d, &resource).unwrap();
        let part = MappedPartition {
            device: d,
            partition: Partition::full(20),
            height: 10,
            array: &array,
        };
        kernel.dispatch(&devices, &part, 20, 0).unwrap();
        drop(array);
        compute.unmap(d, &resource, &WgpuStream).unwrap();

        let pixels = display.read_target(&target).unwrap();
        assert!(pixels.chunks(4).all(|p| p[3] == 255));

        compute.unregister(d, resource).unwrap();
        display.destroy_backing(d, backing);
        display.destroy_target(d, target);
    }
}
