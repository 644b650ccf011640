//! Collaborator seams: the display pipeline and the compute pipeline.
//!
//! The ring never talks to a graphics API directly. Everything it needs from
//! the outside world goes through [`DisplayPipeline`] (render targets,
//! clearing, presentation) and [`ComputePipeline`] (registration and
//! map/unmap of the display backing). Every per-device call carries an
//! explicit [`DeviceId`]; there is no ambient "current device".
//!
//! Two implementations ship with the crate: the in-memory [`host`] backend
//! used for tests and headless runs, and the wgpu backend in
//! [`crate::gpu`].

pub mod host;

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::partition::Partition;

/// Boxed error produced by a collaborator pipeline.
pub type PipelineError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Index of a physical device in the caller's device list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device {}", self.0)
    }
}

/// Pixel dimensions of a surface or sub-surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Extent {
    /// Extent of `width` x `height` pixels.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    #[must_use]
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// How the compute pipeline is allowed to touch a registered backing.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Default,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MapAccess {
    /// Compute only writes; previous contents are discarded on map.
    #[default]
    WriteDiscard,
    /// Compute may load and store existing contents.
    ReadWrite,
}

/// One partition of a slot handed to [`DisplayPipeline::present`].
pub struct PresentLayer<'a, T> {
    /// Device owning `target`.
    pub device: DeviceId,
    /// Columns of the full surface this layer covers.
    pub partition: Partition,
    /// Surface height in pixels.
    pub height: u32,
    /// The display target to composite.
    pub target: &'a T,
}

/// The display/rasterization side: owns render targets and their storage,
/// and presents them.
pub trait DisplayPipeline {
    /// A 2D target the display pipeline can render into and present.
    type Target;
    /// Renderable storage behind a target, registrable with compute.
    type Backing;
    /// Failure status reported by the pipeline.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create a render target of the given extent on `device`.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error if the target cannot be allocated.
    fn create_target(
        &mut self,
        device: DeviceId,
        extent: Extent,
    ) -> Result<Self::Target, Self::Error>;

    /// Create (or attach) the storage backing `target`.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error if the storage cannot be created.
    fn create_backing(
        &mut self,
        device: DeviceId,
        target: &Self::Target,
    ) -> Result<Self::Backing, Self::Error>;

    /// Release a backing. Must only be called once it is unregistered.
    fn destroy_backing(&mut self, device: DeviceId, backing: Self::Backing);

    /// Release a target. Must only be called after its backing is gone.
    fn destroy_target(&mut self, device: DeviceId, target: Self::Target);

    /// Clear `target` to `color` (linear RGBA).
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error if the clear cannot be issued.
    fn clear(
        &mut self,
        device: DeviceId,
        target: &Self::Target,
        color: [f32; 4],
    ) -> Result<(), Self::Error>;

    /// Composite `layers` into the visible output.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error if presentation fails.
    fn present(
        &mut self,
        layers: &[PresentLayer<'_, Self::Target>],
        flip_vertical: bool,
    ) -> Result<(), Self::Error>;
}

/// The compute side: registers display backings and maps them for writing.
///
/// `B` is the display pipeline's backing type.
pub trait ComputePipeline<B> {
    /// Registration token for a backing.
    type Resource;
    /// Compute-addressable handle valid while mapped.
    type Array;
    /// Execution stream map/unmap are ordered on.
    type Stream: Clone;
    /// Failure status reported by the pipeline.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Make `backing` visible to compute.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error if registration fails.
    fn register(
        &mut self,
        device: DeviceId,
        backing: &B,
        access: MapAccess,
    ) -> Result<Self::Resource, Self::Error>;

    /// Drop a registration. The token is consumed even on failure.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error if unregistration fails.
    fn unregister(
        &mut self,
        device: DeviceId,
        resource: Self::Resource,
    ) -> Result<(), Self::Error>;

    /// Take compute ownership of `resource`, ordered on `stream`.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error if the mapping fails.
    fn map(
        &mut self,
        device: DeviceId,
        resource: &Self::Resource,
        stream: &Self::Stream,
    ) -> Result<(), Self::Error>;

    /// Fetch the array handle of a mapped resource.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error if the array is unavailable.
    fn mapped_array(
        &mut self,
        device: DeviceId,
        resource: &Self::Resource,
    ) -> Result<Self::Array, Self::Error>;

    /// Hand `resource` back to the display pipeline, ordered on `stream`.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error if the unmapping fails.
    fn unmap(
        &mut self,
        device: DeviceId,
        resource: &Self::Resource,
        stream: &Self::Stream,
    ) -> Result<(), Self::Error>;
}
