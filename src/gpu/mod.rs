//! wgpu backend.
//!
//! [`GpuDevices`] opens one logical device per adapter. [`WgpuDisplay`] and
//! [`WgpuCompute`] implement the two pipeline traits on top of them, sharing
//! textures: the display target, its backing and the compute storage view
//! all refer to the same `Rgba8Unorm` texture.

mod compute;
mod devices;
mod display;
mod error;
mod pattern;
/// Shared wgpu boilerplate for the present pass and compute kernels.
pub mod pipeline_helpers;
/// Interop surface textures.
pub mod texture;

pub use compute::{WgpuArray, WgpuCompute, WgpuResource, WgpuStream};
pub use devices::{GpuContextError, GpuDevice, GpuDevices};
pub use display::{WgpuBacking, WgpuDisplay, WgpuTarget};
pub use error::WgpuError;
pub use pattern::PatternKernel;

/// Pixel format of every interop surface.
pub const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
