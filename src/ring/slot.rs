//! Ring slot records and their per-device compute state machine.

use crate::partition::Partition;
use crate::pipeline::{
    ComputePipeline, DeviceId, DisplayPipeline, MapAccess, PipelineError,
};

use super::error::ResizeStep;

/// Observable state of one ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No surface allocated (before the first resize, or after a failed one).
    Unallocated,
    /// Registered with compute and owned by the display pipeline.
    Registered,
    /// Owned by compute between `map` and `unmap`.
    Mapped,
}

/// Compute-side state of one sub-slot.
pub(crate) enum ComputeState<R, A, S> {
    Unregistered,
    Registered(R),
    Mapped { resource: R, array: A, stream: S },
}

/// One device's share of a ring slot: a display target, its backing, and
/// the compute registration on top of them.
pub(crate) struct SubSlot<D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    pub(crate) device: DeviceId,
    pub(crate) partition: Partition,
    pub(crate) target: D::Target,
    pub(crate) backing: D::Backing,
    pub(crate) compute: ComputeState<C::Resource, C::Array, C::Stream>,
}

impl<D, C> SubSlot<D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    pub(crate) fn is_mapped(&self) -> bool {
        matches!(self.compute, ComputeState::Mapped { .. })
    }

    pub(crate) fn is_registered(&self) -> bool {
        !matches!(self.compute, ComputeState::Unregistered)
    }

    pub(crate) fn array(&self) -> Option<&C::Array> {
        match &self.compute {
            ComputeState::Mapped { array, .. } => Some(array),
            _ => None,
        }
    }

    /// Register the backing. Only valid while unregistered.
    pub(crate) fn register(
        &mut self,
        compute: &mut C,
        access: MapAccess,
    ) -> Result<(), PipelineError> {
        if self.is_registered() {
            return Err("sub-slot is already registered".into());
        }
        let resource = compute.register(self.device, &self.backing, access)?;
        self.compute = ComputeState::Registered(resource);
        Ok(())
    }

    /// Map for compute and fetch the array. If fetching the array fails the
    /// mapping is undone before returning.
    pub(crate) fn map(
        &mut self,
        compute: &mut C,
        stream: &C::Stream,
    ) -> Result<(), PipelineError> {
        let resource = match std::mem::replace(
            &mut self.compute,
            ComputeState::Unregistered,
        ) {
            ComputeState::Registered(resource) => resource,
            other => {
                self.compute = other;
                return Err("sub-slot is not registered-unmapped".into());
            }
        };

        if let Err(e) = compute.map(self.device, &resource, stream) {
            self.compute = ComputeState::Registered(resource);
            return Err(PipelineError::from(e));
        }

        match compute.mapped_array(self.device, &resource) {
            Ok(array) => {
                self.compute = ComputeState::Mapped {
                    resource,
                    array,
                    stream: stream.clone(),
                };
                Ok(())
            }
            Err(e) => {
                if let Err(undo) = compute.unmap(self.device, &resource, stream)
                {
                    log::warn!(
                        "{}: unmap after failed array fetch: {undo}",
                        self.device
                    );
                }
                self.compute = ComputeState::Registered(resource);
                Err(PipelineError::from(e))
            }
        }
    }

    /// Hand the sub-slot back to the display pipeline on `stream`. On
    /// failure the sub-slot stays mapped.
    pub(crate) fn unmap(
        &mut self,
        compute: &mut C,
        stream: &C::Stream,
    ) -> Result<(), PipelineError> {
        match std::mem::replace(&mut self.compute, ComputeState::Unregistered)
        {
            ComputeState::Mapped {
                resource,
                array,
                stream: mapped_on,
            } => match compute.unmap(self.device, &resource, stream) {
                Ok(()) => {
                    drop(array);
                    self.compute = ComputeState::Registered(resource);
                    Ok(())
                }
                Err(e) => {
                    self.compute = ComputeState::Mapped {
                        resource,
                        array,
                        stream: mapped_on,
                    };
                    Err(PipelineError::from(e))
                }
            },
            other => {
                self.compute = other;
                Err("sub-slot is not mapped".into())
            }
        }
    }

    /// Release everything in reverse dependency order: unmap (on the stream
    /// it was mapped on), unregister, destroy backing, destroy target.
    ///
    /// Every step runs even if an earlier one failed, so nothing is leaked;
    /// the first failure is returned.
    pub(crate) fn release(
        self,
        display: &mut D,
        compute: &mut C,
    ) -> Result<(), (ResizeStep, PipelineError)> {
        let device = self.device;
        let mut first: Option<(ResizeStep, PipelineError)> = None;

        let resource = match self.compute {
            ComputeState::Unregistered => None,
            ComputeState::Registered(resource) => Some(resource),
            ComputeState::Mapped {
                resource,
                array,
                stream,
            } => {
                drop(array);
                if let Err(e) = compute.unmap(device, &resource, &stream) {
                    first = Some((ResizeStep::Unmap, PipelineError::from(e)));
                }
                Some(resource)
            }
        };

        if let Some(resource) = resource {
            if let Err(e) = compute.unregister(device, resource) {
                if first.is_none() {
                    first = Some((ResizeStep::Unregister, PipelineError::from(e)));
                }
            }
        }

        display.destroy_backing(device, self.backing);
        display.destroy_target(device, self.target);

        first.map_or(Ok(()), Err)
    }
}

/// One ring slot: a sub-slot per participating device, in partition order.
/// Empty until the first successful resize.
pub(crate) struct Slot<D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    pub(crate) subs: Vec<SubSlot<D, C>>,
}

impl<D, C> Slot<D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    pub(crate) fn empty() -> Self {
        Self { subs: Vec::new() }
    }

    /// Mapped if any device is still mapped, so that a partially failed
    /// unmap is still reported as compute-owned.
    pub(crate) fn state(&self) -> SlotState {
        if self.subs.is_empty() || !self.subs.iter().all(SubSlot::is_registered)
        {
            SlotState::Unallocated
        } else if self.subs.iter().any(SubSlot::is_mapped) {
            SlotState::Mapped
        } else {
            SlotState::Registered
        }
    }
}
