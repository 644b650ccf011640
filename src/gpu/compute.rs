//! wgpu compute pipeline: interop textures bound as storage textures.
//!
//! Registration creates a storage view of the display backing. Mapping hands
//! out a bind group (`@group(0) @binding(0)`, a `texture_storage_2d`) that
//! kernels dispatch against. wgpu tracks texture usage per submission, so
//! map and unmap only move ownership in the bookkeeping; the queue orders
//! the display's work and the kernel's work.

use rustc_hash::FxHashSet;

use super::devices::{GpuDevice, GpuDevices};
use super::display::WgpuBacking;
use super::error::{scoped, WgpuError};
use super::pipeline_helpers::storage_texture_2d;
use super::SURFACE_FORMAT;
use crate::pipeline::{ComputePipeline, DeviceId, Extent, MapAccess};

/// Execution stream for the wgpu backend.
///
/// wgpu exposes one queue per device, so every stream on a device is that
/// queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WgpuStream;

/// A registered backing.
pub struct WgpuResource {
    id: u64,
    device: DeviceId,
    access: MapAccess,
    extent: Extent,
    view: wgpu::TextureView,
}

/// A mapped partition as a compute bind group.
pub struct WgpuArray {
    device: DeviceId,
    access: MapAccess,
    extent: Extent,
    bind_group: wgpu::BindGroup,
}

impl WgpuArray {
    /// Device the array lives on.
    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Access the storage texture is bound with.
    #[must_use]
    pub fn access(&self) -> MapAccess {
        self.access
    }

    /// Storage texture size.
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Bind group holding the storage texture at binding 0. Set it as
    /// group 0 of a pipeline built with
    /// [`WgpuCompute::bind_group_layout`].
    #[must_use]
    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

struct DeviceLayouts {
    write_only: wgpu::BindGroupLayout,
    read_write: Option<wgpu::BindGroupLayout>,
}

/// Compute half of the wgpu backend.
pub struct WgpuCompute {
    devices: GpuDevices,
    layouts: Vec<DeviceLayouts>,
    mapped: FxHashSet<u64>,
    next_id: u64,
}

impl WgpuCompute {
    /// Build storage-texture layouts on every device.
    #[must_use]
    pub fn new(devices: GpuDevices) -> Self {
        let layouts = devices.iter().map(create_layouts).collect();
        Self {
            devices,
            layouts,
            mapped: FxHashSet::default(),
            next_id: 0,
        }
    }

    /// Layout of the bind group [`WgpuArray::bind_group`] returns for
    /// `access`, or `None` if the device cannot provide that access.
    #[must_use]
    pub fn bind_group_layout(
        &self,
        device: DeviceId,
        access: MapAccess,
    ) -> Option<&wgpu::BindGroupLayout> {
        let layouts = self.layouts.get(device.0 as usize)?;
        match access {
            MapAccess::WriteDiscard => Some(&layouts.write_only),
            MapAccess::ReadWrite => layouts.read_write.as_ref(),
        }
    }

    /// The devices this pipeline runs on.
    #[must_use]
    pub fn devices(&self) -> &GpuDevices {
        &self.devices
    }

    fn device(&self, id: DeviceId) -> Result<&GpuDevice, WgpuError> {
        self.devices.get(id).ok_or(WgpuError::UnknownDevice(id))
    }
}

fn create_layouts(gpu: &GpuDevice) -> DeviceLayouts {
    let layout = |access, label| {
        gpu.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[storage_texture_2d(0, SURFACE_FORMAT, access)],
            })
    };
    DeviceLayouts {
        write_only: layout(MapAccess::WriteDiscard, "Interop Write Layout"),
        read_write: gpu
            .read_write_storage
            .then(|| layout(MapAccess::ReadWrite, "Interop Read-Write Layout")),
    }
}

fn check_owner(expected: DeviceId, got: DeviceId) -> Result<(), WgpuError> {
    if expected == got {
        Ok(())
    } else {
        Err(WgpuError::WrongDevice { expected, got })
    }
}

impl ComputePipeline<WgpuBacking> for WgpuCompute {
    type Resource = WgpuResource;
    type Array = WgpuArray;
    type Stream = WgpuStream;
    type Error = WgpuError;

    fn register(
        &mut self,
        device: DeviceId,
        backing: &WgpuBacking,
        access: MapAccess,
    ) -> Result<WgpuResource, WgpuError> {
        check_owner(backing.device, device)?;
        if self.bind_group_layout(device, access).is_none() {
            return Err(WgpuError::ReadWriteUnsupported(device));
        }
        let gpu = self.device(device)?;
        let view = scoped(&gpu.device, || {
            backing.texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Interop Storage View"),
                ..Default::default()
            })
        })?;
        self.next_id += 1;
        Ok(WgpuResource {
            id: self.next_id,
            device,
            access,
            extent: backing.extent,
            view,
        })
    }

    fn unregister(
        &mut self,
        device: DeviceId,
        resource: WgpuResource,
    ) -> Result<(), WgpuError> {
        check_owner(resource.device, device)?;
        if self.mapped.contains(&resource.id) {
            return Err(WgpuError::StillMapped);
        }
        Ok(())
    }

    fn map(
        &mut self,
        device: DeviceId,
        resource: &WgpuResource,
        _stream: &WgpuStream,
    ) -> Result<(), WgpuError> {
        check_owner(resource.device, device)?;
        if !self.mapped.insert(resource.id) {
            return Err(WgpuError::AlreadyMapped);
        }
        Ok(())
    }

    fn mapped_array(
        &mut self,
        device: DeviceId,
        resource: &WgpuResource,
    ) -> Result<WgpuArray, WgpuError> {
        check_owner(resource.device, device)?;
        if !self.mapped.contains(&resource.id) {
            return Err(WgpuError::NotMapped);
        }
        let layout = self
            .bind_group_layout(device, resource.access)
            .ok_or(WgpuError::ReadWriteUnsupported(device))?;
        let gpu = self.device(device)?;
        let bind_group = scoped(&gpu.device, || {
            gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Interop Array"),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&resource.view),
                }],
            })
        })?;
        Ok(WgpuArray {
            device,
            access: resource.access,
            extent: resource.extent,
            bind_group,
        })
    }

    fn unmap(
        &mut self,
        device: DeviceId,
        resource: &WgpuResource,
        _stream: &WgpuStream,
    ) -> Result<(), WgpuError> {
        check_owner(resource.device, device)?;
        if !self.mapped.remove(&resource.id) {
            return Err(WgpuError::NotMapped);
        }
        Ok(())
    }
}
