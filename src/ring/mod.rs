//! The interop surface ring.
//!
//! [`InteropRing`] owns a fixed number of surface slots. Each slot is a
//! display target plus its backing, registered once with the compute
//! pipeline and then handed back and forth every frame:
//!
//! ```text
//! map(stream) -> array_get() -> (compute writes) -> unmap(stream)
//!     -> swap() -> blit()
//! ```
//!
//! In multi-GPU mode every slot holds one sub-slot per device, each covering
//! a contiguous column range of the surface. `map`, `unmap` and `resize` fan
//! out over the sub-slots; a failure on one device never leaves another
//! device of the same call mapped.
//!
//! `map` and `unmap` only enqueue ownership transfers on the caller's stream.
//! They never wait for the GPU; ordering between the two pipelines comes
//! from the stream/queue the pipeline implementations submit on.

mod error;
mod guard;
mod slot;

use std::collections::BTreeSet;

pub use error::{
    ConfigError, MapError, PresentError, ResizeError, ResizeStep, SwapError,
    UnmapError,
};
use guard::{MapGuard, ResizeBatch};
use slot::Slot;
pub use slot::SlotState;

use crate::options::{InteropOptions, PresentOptions};
use crate::partition::{split_columns, Partition};
use crate::pipeline::{
    ComputePipeline, DeviceId, DisplayPipeline, Extent, MapAccess,
    PresentLayer,
};

/// A device's mapped share of the current slot, as returned by
/// [`InteropRing::array_get`].
#[derive(Debug)]
pub struct MappedPartition<'a, A> {
    /// Device the array lives on.
    pub device: DeviceId,
    /// Columns of the full surface this array covers.
    pub partition: Partition,
    /// Surface height in pixels.
    pub height: u32,
    /// Compute-addressable handle, valid until the next `unmap`.
    pub array: &'a A,
}

/// Fixed-size ring of surfaces shared between a display pipeline `D` and a
/// compute pipeline `C`.
pub struct InteropRing<D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    display: D,
    compute: C,
    devices: Vec<DeviceId>,
    multi_gpu: bool,
    access: MapAccess,
    present: PresentOptions,
    slots: Vec<Slot<D, C>>,
    index: usize,
    extent: Option<Extent>,
    partitions: Vec<Partition>,
}

impl<D, C> InteropRing<D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    /// Create a ring of `slot_count` slots over `devices`.
    ///
    /// No GPU resources are allocated until the first [`resize`](Self::resize).
    /// Single-GPU mode takes exactly one device; multi-GPU mode takes one or
    /// more, in partition order (left to right).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an empty ring, an empty or duplicated
    /// device list, or more than one device in single-GPU mode.
    pub fn configure(
        display: D,
        compute: C,
        devices: Vec<DeviceId>,
        slot_count: usize,
        multi_gpu: bool,
    ) -> Result<Self, ConfigError> {
        if slot_count < 1 {
            return Err(ConfigError::NoSlots);
        }
        if devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        if !multi_gpu && devices.len() != 1 {
            return Err(ConfigError::SingleDeviceExpected {
                count: devices.len(),
            });
        }
        let mut seen = BTreeSet::new();
        if let Some(&dup) = devices.iter().find(|d| !seen.insert(**d)) {
            return Err(ConfigError::DuplicateDevice(dup));
        }

        log::debug!(
            "interop ring: {slot_count} slot(s), {} device(s), multi_gpu={multi_gpu}",
            devices.len()
        );

        Ok(Self {
            display,
            compute,
            devices,
            multi_gpu,
            access: MapAccess::default(),
            present: PresentOptions::default(),
            slots: (0..slot_count).map(|_| Slot::empty()).collect(),
            index: 0,
            extent: None,
            partitions: Vec::new(),
        })
    }

    /// Create a ring from an options file's `[ring]`, `[present]` and
    /// `[compute]` sections.
    ///
    /// # Errors
    ///
    /// Same as [`configure`](Self::configure).
    pub fn with_options(
        display: D,
        compute: C,
        devices: Vec<DeviceId>,
        options: &InteropOptions,
    ) -> Result<Self, ConfigError> {
        let mut ring = Self::configure(
            display,
            compute,
            devices,
            options.ring.slot_count,
            options.ring.multi_gpu,
        )?;
        ring.access = options.compute.access;
        ring.present = options.present.clone();
        Ok(ring)
    }

    /// Reallocate every slot at `width` x `height`.
    ///
    /// Outstanding mappings are unmapped on the stream they were mapped on,
    /// then every old resource is released before the new ones are built.
    /// Calling it with the current size rebuilds the same layout.
    ///
    /// On failure the reported size stays at its previous value and the ring
    /// holds no resources: resources built by the failed attempt are
    /// released, and `map` reports [`MapError::NotRegistered`] until a
    /// resize succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ResizeError`] naming the failing step, slot and device.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ResizeError> {
        if width == 0 || height == 0 {
            return Err(ResizeError::ZeroExtent { width, height });
        }
        let partitions = if self.multi_gpu {
            split_columns(width, self.devices.len())?
        } else {
            vec![Partition::full(width)]
        };

        self.partitions.clear();
        if let Some(err) =
            release_slots(&mut self.slots, &mut self.display, &mut self.compute)
        {
            return Err(err);
        }

        let layout: Vec<(DeviceId, Partition)> = self
            .devices
            .iter()
            .copied()
            .zip(partitions.iter().copied())
            .collect();

        let mut batch = ResizeBatch::new(&mut self.display, &mut self.compute);
        for _ in 0..self.slots.len() {
            batch.build_slot(&layout, height, self.access)?;
        }
        self.slots = batch.commit();
        self.partitions = partitions;
        self.extent = Some(Extent::new(width, height));

        log::debug!(
            "interop ring resized to {width}x{height} across {} partition(s)",
            self.partitions.len()
        );
        Ok(())
    }

    /// Current `(width, height)`; `(0, 0)` before the first successful
    /// resize.
    #[must_use]
    pub fn get_size(&self) -> (u32, u32) {
        self.extent.map_or((0, 0), |e| (e.width, e.height))
    }

    /// Hand the current slot to compute, on every device, ordered on
    /// `stream`.
    ///
    /// # Errors
    ///
    /// Fails if the slot is unregistered or already mapped, or if a pipeline
    /// call fails. In the last case the devices mapped so far are unmapped
    /// again. If one of those unmaps also fails, the slot stays
    /// [`SlotState::Mapped`] and [`unmap`](Self::unmap) retries the devices
    /// still mapped.
    pub fn map(&mut self, stream: &C::Stream) -> Result<(), MapError> {
        let slot = self.index;
        match self.slots[slot].state() {
            SlotState::Unallocated => {
                return Err(MapError::NotRegistered { slot });
            }
            SlotState::Mapped => return Err(MapError::AlreadyMapped { slot }),
            SlotState::Registered => {}
        }

        let mut guard =
            MapGuard::new(&mut self.compute, &mut self.slots[slot].subs, stream);
        guard.map_all().map_err(|(device, source)| MapError::Pipeline {
            slot,
            device,
            source,
        })?;
        guard.commit();
        Ok(())
    }

    /// Compute handles of the current slot, one per device in partition
    /// order.
    ///
    /// # Errors
    ///
    /// Fails unless every device of the current slot is mapped.
    pub fn array_get(
        &self,
    ) -> Result<Vec<MappedPartition<'_, C::Array>>, MapError> {
        let slot = self.index;
        let current = &self.slots[slot];
        if current.state() == SlotState::Unallocated {
            return Err(MapError::NotRegistered { slot });
        }
        let height = self.extent.map_or(0, |e| e.height);
        current
            .subs
            .iter()
            .map(|sub| {
                let array = sub.array().ok_or(MapError::NotMapped { slot })?;
                Ok(MappedPartition {
                    device: sub.device,
                    partition: sub.partition,
                    height,
                    array,
                })
            })
            .collect()
    }

    /// Hand the current slot back to the display pipeline, ordered on
    /// `stream`.
    ///
    /// # Errors
    ///
    /// Fails if the slot is not mapped, or on the first device whose unmap
    /// fails. Devices unmapped before that stay unmapped; calling `unmap`
    /// again retries the rest.
    pub fn unmap(&mut self, stream: &C::Stream) -> Result<(), UnmapError> {
        let slot = self.index;
        if self.slots[slot].state() != SlotState::Mapped {
            return Err(UnmapError::NotMapped { slot });
        }
        for sub in self.slots[slot].subs.iter_mut().filter(|s| s.is_mapped()) {
            sub.unmap(&mut self.compute, stream).map_err(|source| {
                UnmapError::Pipeline {
                    slot,
                    device: sub.device,
                    source,
                }
            })?;
        }
        Ok(())
    }

    /// Advance to the next slot.
    ///
    /// # Errors
    ///
    /// Fails if compute still owns the current slot.
    pub fn swap(&mut self) -> Result<(), SwapError> {
        if self.slots[self.index].state() == SlotState::Mapped {
            return Err(SwapError::SlotMapped { slot: self.index });
        }
        self.index = (self.index + 1) % self.slots.len();
        Ok(())
    }

    /// Clear the current slot's targets to the configured clear color.
    ///
    /// # Errors
    ///
    /// Fails if the slot is unallocated or mapped, or if a clear fails.
    pub fn clear(&mut self) -> Result<(), PresentError> {
        let slot = self.index;
        self.check_display_owned(slot)?;
        let color = self.present.clear_color;
        for sub in &self.slots[slot].subs {
            self.display
                .clear(sub.device, &sub.target, color)
                .map_err(|e| PresentError::Clear {
                    slot,
                    device: sub.device,
                    source: e.into(),
                })?;
        }
        Ok(())
    }

    /// Present the slot last swapped away from.
    ///
    /// # Errors
    ///
    /// Fails if that slot is unallocated or mapped, or if presentation
    /// fails.
    pub fn blit(&mut self) -> Result<(), PresentError> {
        let slot = self.previous_index();
        self.check_display_owned(slot)?;
        let height = self.extent.map_or(0, |e| e.height);
        let layers: Vec<_> = self.slots[slot]
            .subs
            .iter()
            .map(|sub| PresentLayer {
                device: sub.device,
                partition: sub.partition,
                height,
                target: &sub.target,
            })
            .collect();
        self.display
            .present(&layers, self.present.flip_vertical)
            .map_err(|e| PresentError::Blit {
                slot,
                source: e.into(),
            })
    }

    /// Release every slot's resources. Safe to call more than once; the
    /// ring can be resized again afterwards.
    ///
    /// # Errors
    ///
    /// Returns the first release failure. Every release step is attempted
    /// regardless.
    pub fn teardown(&mut self) -> Result<(), ResizeError> {
        let result =
            release_slots(&mut self.slots, &mut self.display, &mut self.compute);
        self.partitions.clear();
        self.extent = None;
        result.map_or(Ok(()), Err)
    }

    /// Index of the current slot.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of slots in the ring.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether surfaces are split across devices.
    #[must_use]
    pub fn is_multi_gpu(&self) -> bool {
        self.multi_gpu
    }

    /// Participating devices, in partition order.
    #[must_use]
    pub fn devices(&self) -> &[DeviceId] {
        &self.devices
    }

    /// Column partitions of the current layout. Empty while unallocated.
    #[must_use]
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// State of slot `slot`, or `None` if out of range.
    #[must_use]
    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(Slot::state)
    }

    /// Display targets of slot `slot`, one per device in partition order.
    /// Empty if the slot is out of range or unallocated.
    #[must_use]
    pub fn slot_targets(&self, slot: usize) -> Vec<(DeviceId, &D::Target)> {
        self.slots.get(slot).map_or_else(Vec::new, |s| {
            s.subs.iter().map(|sub| (sub.device, &sub.target)).collect()
        })
    }

    /// The display pipeline.
    #[must_use]
    pub fn display(&self) -> &D {
        &self.display
    }

    /// The display pipeline, mutably (e.g. to reconfigure its output).
    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    /// The compute pipeline.
    #[must_use]
    pub fn compute(&self) -> &C {
        &self.compute
    }

    fn previous_index(&self) -> usize {
        let n = self.slots.len();
        (self.index + n - 1) % n
    }

    fn check_display_owned(&self, slot: usize) -> Result<(), PresentError> {
        match self.slots[slot].state() {
            SlotState::Unallocated => Err(PresentError::NotAllocated { slot }),
            SlotState::Mapped => Err(PresentError::SlotMapped { slot }),
            SlotState::Registered => Ok(()),
        }
    }
}

impl<D, C> Drop for InteropRing<D, C>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            log::warn!("interop ring teardown: {e}");
        }
    }
}

/// Release every sub-slot of every slot, leaving each slot empty. Keeps
/// going past failures and returns the first one.
fn release_slots<D, C>(
    slots: &mut [Slot<D, C>],
    display: &mut D,
    compute: &mut C,
) -> Option<ResizeError>
where
    D: DisplayPipeline,
    C: ComputePipeline<D::Backing>,
{
    let mut first = None;
    for (i, slot) in slots.iter_mut().enumerate() {
        for sub in std::mem::take(&mut slot.subs) {
            let device = sub.device;
            if let Err((step, source)) = sub.release(display, compute) {
                log::warn!("{device}: {step} failed releasing slot {i}: {source}");
                if first.is_none() {
                    first = Some(ResizeError::Pipeline {
                        step,
                        slot: i,
                        device,
                        source,
                    });
                }
            }
        }
    }
    first
}
