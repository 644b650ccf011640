use std::fmt;

use crate::pipeline::{DeviceId, Extent, MapAccess};

/// Failure reported by the wgpu display or compute pipeline.
#[derive(Debug)]
pub enum WgpuError {
    /// The device id is not in the [`GpuDevices`](super::GpuDevices) list.
    UnknownDevice(DeviceId),
    /// A handle was passed to a device other than the one that created it.
    WrongDevice {
        /// Device that owns the handle.
        expected: DeviceId,
        /// Device the call targeted.
        got: DeviceId,
    },
    /// The requested texture exceeds the device's 2D texture limit.
    ExtentTooLarge {
        /// Requested extent.
        extent: Extent,
        /// `max_texture_dimension_2d` of the device.
        max: u32,
    },
    /// A validation error captured by an error scope.
    Validation(String),
    /// The device ran out of memory.
    OutOfMemory,
    /// The adapter cannot bind `Rgba8Unorm` as a read-write storage texture.
    ReadWriteUnsupported(DeviceId),
    /// A kernel built for one storage access was handed an array bound
    /// with another.
    AccessMismatch {
        /// Access the kernel was built for.
        kernel: MapAccess,
        /// Access of the mapped array.
        array: MapAccess,
    },
    /// The resource is already mapped.
    AlreadyMapped,
    /// The resource is not mapped.
    NotMapped,
    /// Unregistering a resource that is still mapped.
    StillMapped,
    /// The display was created without a surface.
    NoSurface,
    /// Acquiring the next surface texture failed.
    Surface(wgpu::SurfaceError),
    /// Reading a partition back from its device failed.
    Readback(String),
}

impl fmt::Display for WgpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDevice(d) => write!(f, "{d} is not open"),
            Self::WrongDevice { expected, got } => {
                write!(f, "handle belongs to {expected}, used on {got}")
            }
            Self::ExtentTooLarge { extent, max } => write!(
                f,
                "{}x{} exceeds the device texture limit of {max}",
                extent.width, extent.height
            ),
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::ReadWriteUnsupported(d) => {
                write!(f, "{d} has no read-write storage textures")
            }
            Self::AccessMismatch { kernel, array } => write!(
                f,
                "kernel expects {kernel:?} storage, array is bound {array:?}"
            ),
            Self::AlreadyMapped => write!(f, "resource is already mapped"),
            Self::NotMapped => write!(f, "resource is not mapped"),
            Self::StillMapped => write!(f, "resource is still mapped"),
            Self::NoSurface => write!(f, "display has no surface"),
            Self::Surface(e) => write!(f, "surface error: {e}"),
            Self::Readback(msg) => write!(f, "readback failed: {msg}"),
        }
    }
}

impl std::error::Error for WgpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Surface(e) => Some(e),
            _ => None,
        }
    }
}

/// Run `f` inside out-of-memory and validation error scopes on `device`,
/// turning a captured error into [`WgpuError`].
pub(crate) fn scoped<T>(
    device: &wgpu::Device,
    f: impl FnOnce() -> T,
) -> Result<T, WgpuError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());
    match (oom, validation) {
        (Some(_), _) => Err(WgpuError::OutOfMemory),
        (None, Some(e)) => Err(WgpuError::Validation(e.to_string())),
        (None, None) => Ok(value),
    }
}
