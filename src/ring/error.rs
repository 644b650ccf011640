//! Errors reported by [`InteropRing`](super::InteropRing) operations.

use std::fmt;

use crate::partition::PartitionError;
use crate::pipeline::{DeviceId, PipelineError};

/// Invalid static configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The ring needs at least one slot.
    NoSlots,
    /// At least one device is required.
    NoDevices,
    /// Single-GPU mode was given more than one device.
    SingleDeviceExpected {
        /// Number of devices supplied.
        count: usize,
    },
    /// The same device appears twice in the device list.
    DuplicateDevice(DeviceId),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSlots => write!(f, "slot count must be at least 1"),
            Self::NoDevices => write!(f, "no devices supplied"),
            Self::SingleDeviceExpected { count } => write!(
                f,
                "single-GPU mode takes exactly one device, got {count}"
            ),
            Self::DuplicateDevice(d) => write!(f, "{d} listed twice"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The step of a resize that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeStep {
    /// Releasing an outstanding compute mapping.
    Unmap,
    /// Dropping a compute registration.
    Unregister,
    /// Creating the display target.
    CreateTarget,
    /// Creating the display backing.
    CreateBacking,
    /// Registering the backing with compute.
    Register,
}

impl fmt::Display for ResizeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unmap => "unmap",
            Self::Unregister => "unregister",
            Self::CreateTarget => "create target",
            Self::CreateBacking => "create backing",
            Self::Register => "register",
        };
        f.write_str(name)
    }
}

/// Resize failure. The ring keeps its previous dimensions.
#[derive(Debug)]
pub enum ResizeError {
    /// Width and height must both be non-zero.
    ZeroExtent {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// The width cannot be split across the configured devices.
    Partition(PartitionError),
    /// A pipeline call failed.
    Pipeline {
        /// Which step failed.
        step: ResizeStep,
        /// Ring slot being processed.
        slot: usize,
        /// Device the call targeted.
        device: DeviceId,
        /// Status reported by the pipeline.
        source: PipelineError,
    },
}

impl fmt::Display for ResizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroExtent { width, height } => {
                write!(f, "cannot resize to {width}x{height}")
            }
            Self::Partition(e) => write!(f, "partitioning failed: {e}"),
            Self::Pipeline {
                step,
                slot,
                device,
                source,
            } => write!(f, "{step} failed for slot {slot} on {device}: {source}"),
        }
    }
}

impl std::error::Error for ResizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ZeroExtent { .. } => None,
            Self::Partition(e) => Some(e),
            Self::Pipeline { source, .. } => Some(&**source),
        }
    }
}

impl From<PartitionError> for ResizeError {
    fn from(e: PartitionError) -> Self {
        Self::Partition(e)
    }
}

/// `map` / `array_get` failure.
#[derive(Debug)]
pub enum MapError {
    /// The slot has no registered resources (no resize yet, or the last
    /// resize failed).
    NotRegistered {
        /// Ring slot.
        slot: usize,
    },
    /// The slot is already mapped for compute.
    AlreadyMapped {
        /// Ring slot.
        slot: usize,
    },
    /// The slot is not mapped, so there is no array to hand out.
    NotMapped {
        /// Ring slot.
        slot: usize,
    },
    /// A pipeline call failed. Devices mapped before it are unmapped again;
    /// any whose unmap also fails stay mapped until the next `unmap`.
    Pipeline {
        /// Ring slot.
        slot: usize,
        /// Device the call targeted.
        device: DeviceId,
        /// Status reported by the pipeline.
        source: PipelineError,
    },
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRegistered { slot } => {
                write!(f, "slot {slot} has no registered surface")
            }
            Self::AlreadyMapped { slot } => {
                write!(f, "slot {slot} is already mapped")
            }
            Self::NotMapped { slot } => write!(f, "slot {slot} is not mapped"),
            Self::Pipeline {
                slot,
                device,
                source,
            } => write!(f, "mapping slot {slot} on {device} failed: {source}"),
        }
    }
}

impl std::error::Error for MapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pipeline { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

/// `unmap` failure.
#[derive(Debug)]
pub enum UnmapError {
    /// The slot is not mapped.
    NotMapped {
        /// Ring slot.
        slot: usize,
    },
    /// A pipeline call failed. Devices unmapped before the failure stay
    /// unmapped; a retry only touches the ones still mapped.
    Pipeline {
        /// Ring slot.
        slot: usize,
        /// Device the call targeted.
        device: DeviceId,
        /// Status reported by the pipeline.
        source: PipelineError,
    },
}

impl fmt::Display for UnmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotMapped { slot } => write!(f, "slot {slot} is not mapped"),
            Self::Pipeline {
                slot,
                device,
                source,
            } => {
                write!(f, "unmapping slot {slot} on {device} failed: {source}")
            }
        }
    }
}

impl std::error::Error for UnmapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NotMapped { .. } => None,
            Self::Pipeline { source, .. } => Some(&**source),
        }
    }
}

/// `swap` was called while compute still owns the current slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapError {
    /// The slot being left is still mapped.
    SlotMapped {
        /// Ring slot.
        slot: usize,
    },
}

impl fmt::Display for SwapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlotMapped { slot } => {
                write!(f, "cannot swap away from mapped slot {slot}")
            }
        }
    }
}

impl std::error::Error for SwapError {}

/// `clear` / `blit` failure.
#[derive(Debug)]
pub enum PresentError {
    /// The slot has no display target yet.
    NotAllocated {
        /// Ring slot.
        slot: usize,
    },
    /// The slot is owned by compute.
    SlotMapped {
        /// Ring slot.
        slot: usize,
    },
    /// Clearing a partition failed.
    Clear {
        /// Ring slot.
        slot: usize,
        /// Device the call targeted.
        device: DeviceId,
        /// Status reported by the pipeline.
        source: PipelineError,
    },
    /// Presenting the slot failed.
    Blit {
        /// Ring slot.
        slot: usize,
        /// Status reported by the pipeline.
        source: PipelineError,
    },
}

impl fmt::Display for PresentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAllocated { slot } => {
                write!(f, "slot {slot} has no display target")
            }
            Self::SlotMapped { slot } => {
                write!(f, "slot {slot} is mapped for compute")
            }
            Self::Clear {
                slot,
                device,
                source,
            } => write!(f, "clearing slot {slot} on {device} failed: {source}"),
            Self::Blit { slot, source } => {
                write!(f, "presenting slot {slot} failed: {source}")
            }
        }
    }
}

impl std::error::Error for PresentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Clear { source, .. } | Self::Blit { source, .. } => {
                Some(&**source)
            }
            _ => None,
        }
    }
}
