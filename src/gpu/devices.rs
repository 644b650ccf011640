use std::fmt;

use crate::options::DeviceOptions;
use crate::pipeline::DeviceId;

/// Errors that can occur while opening GPU devices.
#[derive(Debug)]
pub enum GpuContextError {
    /// Failed to create a wgpu surface from the window handle.
    SurfaceCreation(wgpu::CreateSurfaceError),
    /// No adapter passed the selection filters.
    NoAdapter,
    /// GPU device request failed (limits or features not met).
    DeviceRequest(wgpu::RequestDeviceError),
    /// The presenting adapter cannot drive the given surface.
    UnsupportedSurface,
}

impl fmt::Display for GpuContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SurfaceCreation(e) => {
                write!(f, "surface creation failed: {e}")
            }
            Self::NoAdapter => write!(f, "no compatible GPU adapter found"),
            Self::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            Self::UnsupportedSurface => {
                write!(f, "surface configuration not supported by adapter")
            }
        }
    }
}

impl std::error::Error for GpuContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SurfaceCreation(e) => Some(e),
            Self::DeviceRequest(e) => Some(e),
            Self::NoAdapter | Self::UnsupportedSurface => None,
        }
    }
}

/// One opened adapter: its logical device and queue.
#[derive(Clone)]
pub struct GpuDevice {
    /// Position in the device list; the ring's [`DeviceId`].
    pub id: DeviceId,
    /// The adapter the device was opened on.
    pub adapter: wgpu::Adapter,
    /// Adapter name/backend/type, for logging.
    pub info: wgpu::AdapterInfo,
    /// The wgpu logical device.
    pub device: wgpu::Device,
    /// The device's only queue. Every map, dispatch, clear and present on
    /// this device is ordered by submission to it.
    pub queue: wgpu::Queue,
    /// Whether `Rgba8Unorm` can be bound as a read-write storage texture.
    pub read_write_storage: bool,
}

impl GpuDevice {
    /// Create a new command encoder for recording GPU commands.
    pub fn create_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(label),
            })
    }

    /// Finish the encoder and submit its command buffer to the queue.
    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        let _ = self.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// The set of devices a ring runs on, in partition order.
///
/// Device 0 is the presenting device: when a surface is supplied it is the
/// first adapter that supports it.
#[derive(Clone)]
pub struct GpuDevices {
    devices: Vec<GpuDevice>,
}

impl GpuDevices {
    /// Open every adapter `instance` exposes that passes `options`.
    ///
    /// # Errors
    ///
    /// Returns [`GpuContextError`] if no adapter qualifies, the first adapter
    /// cannot present to `surface`, or a device request fails.
    pub async fn open(
        instance: &wgpu::Instance,
        options: &DeviceOptions,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, GpuContextError> {
        let mut adapters: Vec<wgpu::Adapter> = instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .filter(|a| {
                options.allow_software
                    || a.get_info().device_type != wgpu::DeviceType::Cpu
            })
            .collect();
        if let Some(surface) = surface {
            // Stable sort keeps the backend's preference among equals.
            adapters.sort_by_key(|a| !a.is_surface_supported(surface));
            if !adapters.first().is_some_and(|a| a.is_surface_supported(surface))
            {
                return Err(if adapters.is_empty() {
                    GpuContextError::NoAdapter
                } else {
                    GpuContextError::UnsupportedSurface
                });
            }
        }
        if options.max_devices > 0 {
            adapters.truncate(options.max_devices);
        }
        if adapters.is_empty() {
            return Err(GpuContextError::NoAdapter);
        }

        let mut devices = Vec::with_capacity(adapters.len());
        for (i, adapter) in adapters.into_iter().enumerate() {
            devices.push(Self::open_adapter(DeviceId(i as u32), adapter).await?);
        }
        Ok(Self { devices })
    }

    async fn open_adapter(
        id: DeviceId,
        adapter: wgpu::Adapter,
    ) -> Result<GpuDevice, GpuContextError> {
        let info = adapter.get_info();
        let adapter_specific =
            wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        let required_features = adapter.features() & adapter_specific;
        let read_write_storage = required_features.contains(adapter_specific)
            && adapter
                .get_texture_format_features(super::SURFACE_FORMAT)
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::STORAGE_READ_WRITE);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Interop Device"),
                required_features,
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await
            .map_err(GpuContextError::DeviceRequest)?;

        log::debug!(
            "{id}: {} ({:?}, {:?}), read-write storage: {read_write_storage}",
            info.name,
            info.backend,
            info.device_type
        );

        Ok(GpuDevice {
            id,
            adapter,
            info,
            device,
            queue,
            read_write_storage,
        })
    }

    /// Look up a device.
    #[must_use]
    pub fn get(&self, id: DeviceId) -> Option<&GpuDevice> {
        self.devices.get(id.0 as usize)
    }

    /// Device ids, in partition order.
    #[must_use]
    pub fn ids(&self) -> Vec<DeviceId> {
        self.devices.iter().map(|d| d.id).collect()
    }

    /// Number of opened devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is open. Never true for a value built by
    /// [`open`](Self::open).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Iterate over the devices in partition order.
    pub fn iter(&self) -> impl Iterator<Item = &GpuDevice> {
        self.devices.iter()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Open whatever hardware is available, or `None` on machines without
    /// a usable adapter.
    pub(crate) fn try_open() -> Option<GpuDevices> {
        let instance = wgpu::Instance::default();
        let options = DeviceOptions {
            max_devices: 0,
            allow_software: true,
        };
        pollster::block_on(GpuDevices::open(&instance, &options, None)).ok()
    }

    #[test]
    fn devices_are_numbered_in_order() {
        let Some(devices) = try_open() else {
            return;
        };
        assert!(!devices.is_empty());
        for (i, d) in devices.iter().enumerate() {
            assert_eq!(d.id, DeviceId(i as u32));
            assert_eq!(devices.get(d.id).map(|g| g.id), Some(d.id));
        }
        assert_eq!(devices.ids().len(), devices.len());
    }

    #[test]
    fn max_devices_truncates() {
        let instance = wgpu::Instance::default();
        let options = DeviceOptions {
            max_devices: 1,
            allow_software: true,
        };
        let Ok(devices) =
            pollster::block_on(GpuDevices::open(&instance, &options, None))
        else {
            return;
        };
        assert_eq!(devices.len(), 1);
    }
}
