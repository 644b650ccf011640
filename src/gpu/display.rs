//! wgpu display pipeline.
//!
//! Targets are [`InteropTexture`]s. Presenting draws each partition as a
//! full-screen triangle clipped to its column range of the surface.
//! Partitions that live on another device than the presenting one are read
//! back and uploaded to a mirror texture on the presenting device first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::devices::{GpuDevice, GpuDevices};
use super::error::{scoped, WgpuError};
use super::pipeline_helpers::{
    create_screen_space_pipeline, filtering_sampler, linear_sampler,
    texture_2d,
};
use super::texture::{extent_3d, padded_bytes_per_row, InteropTexture};
use super::SURFACE_FORMAT;
use crate::pipeline::{DeviceId, DisplayPipeline, Extent, PresentLayer};

/// A display target on one device.
pub struct WgpuTarget {
    device: DeviceId,
    surface: InteropTexture,
}

impl WgpuTarget {
    /// Device owning the target.
    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Target size.
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.surface.extent
    }

    /// Sampling view of the target.
    #[must_use]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.surface.view
    }
}

/// The storage behind a [`WgpuTarget`]: a second handle to its texture.
pub struct WgpuBacking {
    pub(crate) device: DeviceId,
    pub(crate) texture: wgpu::Texture,
    pub(crate) extent: Extent,
}

struct Mirror {
    surface: InteropTexture,
}

/// Surface, pipelines and mirrors used by [`WgpuDisplay::present`].
struct Presenter {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    upright: wgpu::RenderPipeline,
    flipped: wgpu::RenderPipeline,
    mirrors: FxHashMap<DeviceId, Mirror>,
}

impl Presenter {
    fn new(
        gpu: &GpuDevice,
        surface: wgpu::Surface<'static>,
        size: (u32, u32),
    ) -> Result<Self, WgpuError> {
        let mut config = surface
            .get_default_config(&gpu.adapter, size.0.max(1), size.1.max(1))
            .ok_or(WgpuError::NoSurface)?;
        config.present_mode = wgpu::PresentMode::Fifo;
        surface.configure(&gpu.device, &config);

        let device = &gpu.device;
        let layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Present Layout"),
                entries: &[texture_2d(0), filtering_sampler(1)],
            });
        let shader =
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Present Shader"),
                source: wgpu::ShaderSource::Wgsl(
                    include_str!("../../assets/shaders/present.wgsl").into(),
                ),
            });
        let pipeline = |entry| {
            create_screen_space_pipeline(
                device,
                "Present",
                &shader,
                entry,
                config.format,
                &[&layout],
            )
        };
        let upright = pipeline("vs_main");
        let flipped = pipeline("vs_flip");

        Ok(Self {
            sampler: linear_sampler(device, "Present Sampler"),
            surface,
            config,
            layout,
            upright,
            flipped,
            mirrors: FxHashMap::default(),
        })
    }
}

/// Display half of the wgpu backend.
pub struct WgpuDisplay {
    devices: GpuDevices,
    presenter: Option<Presenter>,
}

impl WgpuDisplay {
    /// A display without a surface. Targets can be created, cleared and
    /// read back; presenting fails with [`WgpuError::NoSurface`].
    #[must_use]
    pub fn headless(devices: GpuDevices) -> Self {
        Self {
            devices,
            presenter: None,
        }
    }

    /// A display presenting to `surface` from device 0.
    ///
    /// # Errors
    ///
    /// Fails if there is no device or device 0 cannot configure `surface`.
    pub fn with_surface(
        devices: GpuDevices,
        surface: wgpu::Surface<'static>,
        size: (u32, u32),
    ) -> Result<Self, WgpuError> {
        let gpu = devices
            .get(DeviceId(0))
            .ok_or(WgpuError::UnknownDevice(DeviceId(0)))?;
        let presenter = Presenter::new(gpu, surface, size)?;
        Ok(Self {
            devices,
            presenter: Some(presenter),
        })
    }

    /// Reconfigure the surface for a new window size. Ignores zero-sized
    /// dimensions.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        let (Some(p), Some(gpu)) =
            (self.presenter.as_mut(), self.devices.get(DeviceId(0)))
        else {
            return;
        };
        if width > 0 && height > 0 {
            p.config.width = width;
            p.config.height = height;
            p.surface.configure(&gpu.device, &p.config);
        }
    }

    /// The devices this pipeline runs on.
    #[must_use]
    pub fn devices(&self) -> &GpuDevices {
        &self.devices
    }

    /// Copy `target` back to host memory as tightly packed RGBA8 rows.
    /// Blocks until the copy completes.
    ///
    /// # Errors
    ///
    /// Fails if the device is unknown or the buffer cannot be mapped.
    pub fn read_target(&self, target: &WgpuTarget) -> Result<Vec<u8>, WgpuError> {
        let gpu = self.device(target.device)?;
        let extent = target.extent();
        let padded = padded_bytes_per_row(extent.width) as usize;
        let row = extent.width as usize * 4;
        let mut out = Vec::with_capacity(row * extent.height as usize);
        readback(gpu, &target.surface, |data| {
            for chunk in data.chunks(padded) {
                out.extend_from_slice(&chunk[..row]);
            }
        })?;
        Ok(out)
    }

    fn device(&self, id: DeviceId) -> Result<&GpuDevice, WgpuError> {
        self.devices.get(id).ok_or(WgpuError::UnknownDevice(id))
    }

    /// Copy a partition from its own device into the presenting device's
    /// mirror texture for that device.
    fn refresh_mirror(
        presenter: &mut Presenter,
        present_gpu: &GpuDevice,
        source_gpu: &GpuDevice,
        target: &WgpuTarget,
    ) -> Result<(), WgpuError> {
        let extent = target.extent();
        let stale = presenter
            .mirrors
            .get(&target.device)
            .is_none_or(|m| m.surface.extent != extent);
        if stale {
            let surface = scoped(&present_gpu.device, || {
                InteropTexture::new(
                    &present_gpu.device,
                    "Partition Mirror",
                    extent,
                    SURFACE_FORMAT,
                )
            })?;
            let _ = presenter.mirrors.insert(target.device, Mirror { surface });
        }
        let mirror = presenter
            .mirrors
            .get(&target.device)
            .ok_or(WgpuError::UnknownDevice(target.device))?;

        readback(source_gpu, &target.surface, |data| {
            present_gpu.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &mirror.surface.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row(extent.width)),
                    rows_per_image: Some(extent.height),
                },
                extent_3d(extent),
            );
        })
    }
}

/// Copy `surface` into a staging buffer on `gpu`, wait for it, and hand the
/// padded rows to `f`.
fn readback(
    gpu: &GpuDevice,
    surface: &InteropTexture,
    f: impl FnOnce(&[u8]),
) -> Result<(), WgpuError> {
    let extent = surface.extent;
    let bytes_per_row = padded_bytes_per_row(extent.width);
    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Partition Readback"),
        size: u64::from(bytes_per_row) * u64::from(extent.height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = gpu.create_encoder("Readback Encoder");
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &surface.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(extent.height),
            },
        },
        extent_3d(extent),
    );
    gpu.submit(encoder);

    let map_complete = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&map_complete);
    let slice = staging.slice(..);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        if result.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });
    let _ = gpu.device
        .poll(wgpu::PollType::Wait)
        .map_err(|e| WgpuError::Readback(e.to_string()))?;
    if !map_complete.load(Ordering::SeqCst) {
        return Err(WgpuError::Readback("staging buffer did not map".into()));
    }

    {
        let data = slice.get_mapped_range();
        f(&data[..]);
    }
    staging.unmap();
    Ok(())
}

impl DisplayPipeline for WgpuDisplay {
    type Target = WgpuTarget;
    type Backing = WgpuBacking;
    type Error = WgpuError;

    fn create_target(
        &mut self,
        device: DeviceId,
        extent: Extent,
    ) -> Result<WgpuTarget, WgpuError> {
        let gpu = self.device(device)?;
        let max = gpu.device.limits().max_texture_dimension_2d;
        if extent.width > max || extent.height > max {
            return Err(WgpuError::ExtentTooLarge { extent, max });
        }
        let surface = scoped(&gpu.device, || {
            InteropTexture::new(
                &gpu.device,
                "Interop Surface",
                extent,
                SURFACE_FORMAT,
            )
        })?;
        Ok(WgpuTarget { device, surface })
    }

    fn create_backing(
        &mut self,
        device: DeviceId,
        target: &WgpuTarget,
    ) -> Result<WgpuBacking, WgpuError> {
        if target.device != device {
            return Err(WgpuError::WrongDevice {
                expected: target.device,
                got: device,
            });
        }
        Ok(WgpuBacking {
            device,
            texture: target.surface.texture.clone(),
            extent: target.surface.extent,
        })
    }

    fn destroy_backing(&mut self, _device: DeviceId, backing: WgpuBacking) {
        drop(backing);
    }

    fn destroy_target(&mut self, _device: DeviceId, target: WgpuTarget) {
        target.surface.texture.destroy();
    }

    fn clear(
        &mut self,
        device: DeviceId,
        target: &WgpuTarget,
        color: [f32; 4],
    ) -> Result<(), WgpuError> {
        let gpu = self.device(device)?;
        let [r, g, b, a] = color.map(f64::from);
        let mut encoder = gpu.create_encoder("Clear Encoder");
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.surface.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
        }
        gpu.submit(encoder);
        Ok(())
    }

    fn present(
        &mut self,
        layers: &[PresentLayer<'_, WgpuTarget>],
        flip_vertical: bool,
    ) -> Result<(), WgpuError> {
        let present_id = DeviceId(0);
        let present_gpu = self
            .devices
            .get(present_id)
            .ok_or(WgpuError::UnknownDevice(present_id))?;
        let presenter = self.presenter.as_mut().ok_or(WgpuError::NoSurface)?;

        for layer in layers.iter().filter(|l| l.device != present_id) {
            let source_gpu = self
                .devices
                .get(layer.device)
                .ok_or(WgpuError::UnknownDevice(layer.device))?;
            Self::refresh_mirror(presenter, present_gpu, source_gpu, layer.target)?;
        }

        let frame = presenter
            .surface
            .get_current_texture()
            .map_err(WgpuError::Surface)?;
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut bind_groups = Vec::with_capacity(layers.len());
        for layer in layers {
            let view = if layer.device == present_id {
                &layer.target.surface.view
            } else {
                presenter
                    .mirrors
                    .get(&layer.device)
                    .map(|m| &m.surface.view)
                    .ok_or(WgpuError::UnknownDevice(layer.device))?
            };
            bind_groups.push(present_gpu.device.create_bind_group(
                &wgpu::BindGroupDescriptor {
                    label: Some("Present Bind Group"),
                    layout: &presenter.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(
                                &presenter.sampler,
                            ),
                        },
                    ],
                },
            ));
        }

        let total_width =
            layers.iter().map(|l| l.partition.end()).max().unwrap_or(1).max(1);
        let scale = presenter.config.width as f32 / total_width as f32;
        let surface_height = presenter.config.height as f32;
        let pipeline = if flip_vertical {
            &presenter.flipped
        } else {
            &presenter.upright
        };

        let mut encoder = present_gpu.create_encoder("Present Encoder");
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
            pass.set_pipeline(pipeline);
            for (layer, bind_group) in layers.iter().zip(&bind_groups) {
                let x = layer.partition.x as f32 * scale;
                let w = layer.partition.width as f32 * scale;
                if w < 1.0 {
                    continue;
                }
                pass.set_viewport(x, 0.0, w, surface_height, 0.0, 1.0);
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }
        present_gpu.submit(encoder);
        frame.present();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::devices::tests::try_open;
    use crate::gpu::WgpuCompute;
    use crate::pipeline::{ComputePipeline, MapAccess};

    #[test]
    fn oversized_target_is_rejected() {
        let Some(devices) = try_open() else {
            return;
        };
        let mut display = WgpuDisplay::headless(devices);
        let max = display
            .devices()
            .get(DeviceId(0))
            .map_or(0, |g| g.device.limits().max_texture_dimension_2d);
        let err = display
            .create_target(DeviceId(0), Extent::new(max + 1, 4))
            .err()
            .unwrap();
        assert!(matches!(err, WgpuError::ExtentTooLarge { .. }));
    }

    #[test]
    fn clear_is_visible_in_readback() {
        let Some(devices) = try_open() else {
            return;
        };
        let mut display = WgpuDisplay::headless(devices);
        let target = display
            .create_target(DeviceId(0), Extent::new(70, 3))
            .unwrap();
        display
            .clear(DeviceId(0), &target, [1.0, 0.0, 0.0, 1.0])
            .unwrap();
        let pixels = display.read_target(&target).unwrap();
        assert_eq!(pixels.len(), 70 * 3 * 4);
        assert!(pixels.chunks(4).all(|p| p == [255, 0, 0, 255]));
        display.destroy_target(DeviceId(0), target);
    }

    #[test]
    fn present_without_surface_fails() {
        let Some(devices) = try_open() else {
            return;
        };
        let mut display = WgpuDisplay::headless(devices);
        assert!(matches!(
            display.present(&[], true),
            Err(WgpuError::NoSurface)
        ));
    }

    #[test]
    fn compute_tracks_mappings() {
        let Some(devices) = try_open() else {
            return;
        };
        let mut display = WgpuDisplay::headless(devices.clone());
        let mut compute = WgpuCompute::new(devices);
        let d = DeviceId(0);
        let target = display.create_target(d, Extent::new(8, 8)).unwrap();
        let backing = display.create_backing(d, &target).unwrap();
        let resource = compute
            .register(d, &backing, MapAccess::WriteDiscard)
            .unwrap();
        let stream = crate::gpu::WgpuStream;

        assert!(matches!(
            compute.mapped_array(d, &resource),
            Err(WgpuError::NotMapped)
        ));
        compute.map(d, &resource, &stream).unwrap();
        assert!(matches!(
            compute.map(d, &resource, &stream),
            Err(WgpuError::AlreadyMapped)
        ));
        let array = compute.mapped_array(d, &resource).unwrap();
        assert_eq!(array.extent(), Extent::new(8, 8));
        compute.unmap(d, &resource, &stream).unwrap();
        compute.unregister(d, resource).unwrap();
        display.destroy_backing(d, backing);
        display.destroy_target(d, target);
    }
}
