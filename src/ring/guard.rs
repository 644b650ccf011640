//! Scope guards that undo partially completed fan-outs.
//!
//! Both guards release whatever they have acquired when dropped without
//! `commit`, so an early `?` return leaves every device consistent.

use crate::partition::Partition;
use crate::pipeline::{
    ComputePipeline, DeviceId, DisplayPipeline, Extent, MapAccess,
    PipelineError,
};

use super::error::{ResizeError, ResizeStep};
use super::slot::{ComputeState, Slot, SubSlot};

/// Maps the sub-slots of one slot in device order. Dropping it before
/// [`commit`](Self::commit) unmaps the ones already mapped.
pub(crate) struct MapGuard<'a, D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    compute: &'a mut C,
    subs: &'a mut [SubSlot<D, C>],
    stream: &'a C::Stream,
    mapped: usize,
}

impl<'a, D, C> MapGuard<'a, D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    pub(crate) fn new(
        compute: &'a mut C,
        subs: &'a mut [SubSlot<D, C>],
        stream: &'a C::Stream,
    ) -> Self {
        Self {
            compute,
            subs,
            stream,
            mapped: 0,
        }
    }

    /// Map every sub-slot, stopping at the first failure.
    pub(crate) fn map_all(&mut self) -> Result<(), (DeviceId, PipelineError)> {
        while self.mapped < self.subs.len() {
            let sub = &mut self.subs[self.mapped];
            sub.map(self.compute, self.stream)
                .map_err(|e| (sub.device, e))?;
            self.mapped += 1;
        }
        Ok(())
    }

    /// Keep the mappings.
    pub(crate) fn commit(mut self) {
        self.mapped = 0;
    }
}

impl<D, C> Drop for MapGuard<'_, D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    fn drop(&mut self) {
        for sub in self.subs[..self.mapped].iter_mut().rev() {
            if let Err(e) = sub.unmap(self.compute, self.stream) {
                log::warn!("{}: rollback unmap failed: {e}", sub.device);
            }
        }
    }
}

/// Builds a fresh set of slots for a resize. Dropping it before
/// [`commit`](Self::commit) releases everything built so far.
pub(crate) struct ResizeBatch<'a, D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    display: &'a mut D,
    compute: &'a mut C,
    slots: Vec<Slot<D, C>>,
}

impl<'a, D, C> ResizeBatch<'a, D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    pub(crate) fn new(display: &'a mut D, compute: &'a mut C) -> Self {
        Self {
            display,
            compute,
            slots: Vec::new(),
        }
    }

    /// Build the next slot: one registered sub-slot per `(device,
    /// partition)` pair, each `height` rows tall.
    pub(crate) fn build_slot(
        &mut self,
        layout: &[(DeviceId, Partition)],
        height: u32,
        access: MapAccess,
    ) -> Result<(), ResizeError> {
        let slot = self.slots.len();
        self.slots.push(Slot::empty());

        for &(device, partition) in layout {
            let fail = |step: ResizeStep, source: PipelineError| {
                ResizeError::Pipeline {
                    step,
                    slot,
                    device,
                    source,
                }
            };

            let extent = Extent::new(partition.width, height);
            let target = self
                .display
                .create_target(device, extent)
                .map_err(|e| fail(ResizeStep::CreateTarget, e.into()))?;
            let backing = match self.display.create_backing(device, &target) {
                Ok(backing) => backing,
                Err(e) => {
                    self.display.destroy_target(device, target);
                    return Err(fail(ResizeStep::CreateBacking, e.into()));
                }
            };

            let subs = &mut self.slots[slot].subs;
            subs.push(SubSlot {
                device,
                partition,
                target,
                backing,
                compute: ComputeState::Unregistered,
            });
            if let Some(sub) = subs.last_mut() {
                sub.register(self.compute, access)
                    .map_err(|e| fail(ResizeStep::Register, e))?;
            }
        }
        Ok(())
    }

    /// Keep the built slots.
    pub(crate) fn commit(mut self) -> Vec<Slot<D, C>> {
        std::mem::take(&mut self.slots)
    }
}

impl<D, C> Drop for ResizeBatch<'_, D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    fn drop(&mut self) {
        for slot in self.slots.drain(..).rev() {
            for sub in slot.subs.into_iter().rev() {
                let device = sub.device;
                if let Err((step, e)) = sub.release(self.display, self.compute)
                {
                    log::warn!("{device}: rollback {step} failed: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::host::{HostCompute, HostDisplay, HostGpu, HostOp};

    fn layout(devices: u32, width: u32) -> Vec<(DeviceId, Partition)> {
        crate::partition::split_columns(width, devices as usize)
            .unwrap()
            .into_iter()
            .enumerate()
            .map(|(i, p)| (DeviceId(i as u32), p))
            .collect()
    }

    #[test]
    fn dropped_batch_releases_everything() {
        let gpu = HostGpu::new(2);
        let (mut display, mut compute) = (gpu.display(), gpu.compute());
        {
            let mut batch: ResizeBatch<'_, HostDisplay, HostCompute> =
                ResizeBatch::new(&mut display, &mut compute);
            batch
                .build_slot(&layout(2, 64), 8, MapAccess::WriteDiscard)
                .unwrap();
            batch
                .build_slot(&layout(2, 64), 8, MapAccess::WriteDiscard)
                .unwrap();
            assert_eq!(gpu.live_total().registrations, 4);
        }
        assert!(gpu.live_total().is_empty());
        assert!(gpu.violations().is_empty());
    }

    #[test]
    fn failed_register_rolls_back_the_half_built_slot() {
        let gpu = HostGpu::new(2);
        let (mut display, mut compute) = (gpu.display(), gpu.compute());
        gpu.fail_next(HostOp::Register, DeviceId(1));

        let mut batch: ResizeBatch<'_, HostDisplay, HostCompute> =
            ResizeBatch::new(&mut display, &mut compute);
        let err = batch
            .build_slot(&layout(2, 64), 8, MapAccess::WriteDiscard)
            .unwrap_err();
        assert!(matches!(
            err,
            ResizeError::Pipeline {
                step: ResizeStep::Register,
                slot: 0,
                device: DeviceId(1),
                ..
            }
        ));
        drop(batch);
        assert!(gpu.live_total().is_empty());
        assert!(gpu.violations().is_empty());
    }

    #[test]
    fn failed_backing_destroys_its_target() {
        let gpu = HostGpu::new(1);
        let (mut display, mut compute) = (gpu.display(), gpu.compute());
        gpu.fail_next(HostOp::CreateBacking, DeviceId(0));

        let mut batch: ResizeBatch<'_, HostDisplay, HostCompute> =
            ResizeBatch::new(&mut display, &mut compute);
        assert!(batch
            .build_slot(&layout(1, 16), 4, MapAccess::WriteDiscard)
            .is_err());
        assert_eq!(gpu.live(DeviceId(0)).targets, 0);
    }

    #[test]
    fn map_guard_unmaps_earlier_devices_on_failure() {
        let gpu = HostGpu::new(3);
        let (mut display, mut compute) = (gpu.display(), gpu.compute());
        let mut slots = {
            let mut batch = ResizeBatch::new(&mut display, &mut compute);
            batch
                .build_slot(&layout(3, 30), 2, MapAccess::WriteDiscard)
                .unwrap();
            batch.commit()
        };

        gpu.fail_next(HostOp::Map, DeviceId(2));
        let stream = crate::pipeline::host::HostStream(0);
        {
            let mut guard: MapGuard<'_, HostDisplay, HostCompute> =
                MapGuard::new(&mut compute, &mut slots[0].subs, &stream);
            let (device, _) = guard.map_all().unwrap_err();
            assert_eq!(device, DeviceId(2));
        }
        assert_eq!(gpu.live_total().mappings, 0);
        assert!(slots[0].subs.iter().all(|s| !s.is_mapped()));

        for sub in slots.remove(0).subs {
            sub.release(&mut display, &mut compute).unwrap();
        }
        assert!(gpu.live_total().is_empty());
    }
}
