//! In-memory reference backend.
//!
//! [`HostGpu`] simulates any number of devices with plain host memory. Its
//! display half ([`HostDisplay`]) and compute half ([`HostCompute`]) share one
//! bookkeeping table, so the backend can:
//!
//! - count live targets, backings, registrations and mappings per device,
//! - record protocol violations it observes (double free, destroying a
//!   backing that is still registered, unregistering while mapped, ...),
//! - fail the next call of a given kind on a given device,
//! - composite presented layers into a readable framebuffer.
//!
//! A target, its backing and every array mapped from it share the same pixel
//! storage, so what compute writes through a [`HostArray`] is exactly what
//! the display side clears and presents.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use rustc_hash::FxHashMap;

use super::{
    ComputePipeline, DeviceId, DisplayPipeline, Extent, MapAccess,
    PresentLayer,
};

/// An RGBA8 pixel.
pub type Rgba = [u8; 4];

type Pixels = Rc<RefCell<Vec<Rgba>>>;

/// Pipeline calls that can be made to fail with [`HostGpu::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    /// [`DisplayPipeline::create_target`].
    CreateTarget,
    /// [`DisplayPipeline::create_backing`].
    CreateBacking,
    /// [`ComputePipeline::register`].
    Register,
    /// [`ComputePipeline::unregister`].
    Unregister,
    /// [`ComputePipeline::map`].
    Map,
    /// [`ComputePipeline::mapped_array`].
    MappedArray,
    /// [`ComputePipeline::unmap`].
    Unmap,
    /// [`DisplayPipeline::clear`].
    Clear,
    /// [`DisplayPipeline::present`].
    Present,
}

/// Errors reported by the host backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The device id is outside the simulated device range.
    UnknownDevice(DeviceId),
    /// A failure armed with [`HostGpu::fail_next`].
    Injected {
        /// The failed call.
        op: HostOp,
        /// Device the call targeted.
        device: DeviceId,
    },
    /// A handle that was never created or was already released.
    UnknownHandle(u64),
    /// A handle used on a device other than the one that owns it.
    WrongDevice {
        /// Owning device.
        expected: DeviceId,
        /// Device passed to the call.
        got: DeviceId,
    },
    /// Surfaces must have a non-zero extent.
    ZeroExtent,
    /// The resource is already mapped.
    AlreadyMapped(u64),
    /// The resource is not mapped.
    NotMapped(u64),
    /// The resource is still mapped and cannot be unregistered.
    StillMapped(u64),
    /// The array handle outlived its mapping.
    ArrayExpired,
    /// Coordinates outside the array.
    OutOfBounds {
        /// Column.
        x: u32,
        /// Row.
        y: u32,
    },
    /// Reads are not allowed through a write-discard mapping.
    WriteOnly,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDevice(d) => write!(f, "unknown {d}"),
            Self::Injected { op, device } => {
                write!(f, "injected {op:?} failure on {device}")
            }
            Self::UnknownHandle(id) => write!(f, "unknown handle #{id}"),
            Self::WrongDevice { expected, got } => {
                write!(f, "handle belongs to {expected}, used on {got}")
            }
            Self::ZeroExtent => write!(f, "surface extent must be non-zero"),
            Self::AlreadyMapped(id) => {
                write!(f, "resource #{id} is already mapped")
            }
            Self::NotMapped(id) => write!(f, "resource #{id} is not mapped"),
            Self::StillMapped(id) => {
                write!(f, "resource #{id} is still mapped")
            }
            Self::ArrayExpired => write!(f, "array used after unmap"),
            Self::OutOfBounds { x, y } => {
                write!(f, "pixel ({x}, {y}) is out of bounds")
            }
            Self::WriteOnly => write!(f, "array is mapped write-discard"),
        }
    }
}

impl std::error::Error for HostError {}

/// Live resource counts for one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiveResources {
    /// Display targets.
    pub targets: usize,
    /// Display backings.
    pub backings: usize,
    /// Compute registrations.
    pub registrations: usize,
    /// Outstanding compute mappings.
    pub mappings: usize,
}

impl LiveResources {
    /// No resources of any kind.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Stream id used by the host backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HostStream(pub u32);

/// A host display target.
#[derive(Debug)]
pub struct HostTarget {
    id: u64,
    device: DeviceId,
    extent: Extent,
    pixels: Pixels,
}

impl HostTarget {
    /// Target extent.
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Copy of the target's current contents, row-major.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Rgba> {
        self.pixels.borrow().clone()
    }
}

/// A host display backing; shares pixel storage with its target.
#[derive(Debug)]
pub struct HostBacking {
    id: u64,
    device: DeviceId,
    extent: Extent,
    pixels: Pixels,
}

/// A host compute registration.
#[derive(Debug)]
pub struct HostResource {
    id: u64,
    device: DeviceId,
}

/// Compute view of a mapped backing.
///
/// Writes go straight to the backing storage. The handle stops working as
/// soon as the resource is unmapped.
#[derive(Debug)]
pub struct HostArray {
    device: DeviceId,
    extent: Extent,
    access: MapAccess,
    pixels: Pixels,
    live: Rc<Cell<bool>>,
}

impl HostArray {
    /// Device the array lives on.
    #[must_use]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Array extent (the partition's width and the full height).
    #[must_use]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Whether the mapping behind this handle is still outstanding.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.get()
    }

    fn index(&self, x: u32, y: u32) -> Result<usize, HostError> {
        if !self.live.get() {
            return Err(HostError::ArrayExpired);
        }
        if x >= self.extent.width || y >= self.extent.height {
            return Err(HostError::OutOfBounds { x, y });
        }
        Ok(y as usize * self.extent.width as usize + x as usize)
    }

    /// Store one pixel at local coordinates.
    ///
    /// # Errors
    ///
    /// Fails if the mapping expired or the coordinates are out of bounds.
    pub fn write(&self, x: u32, y: u32, pixel: Rgba) -> Result<(), HostError> {
        let i = self.index(x, y)?;
        self.pixels.borrow_mut()[i] = pixel;
        Ok(())
    }

    /// Load one pixel at local coordinates.
    ///
    /// # Errors
    ///
    /// Fails if the mapping expired, the coordinates are out of bounds, or
    /// the mapping is write-discard.
    pub fn read(&self, x: u32, y: u32) -> Result<Rgba, HostError> {
        if self.access == MapAccess::WriteDiscard {
            return Err(HostError::WriteOnly);
        }
        let i = self.index(x, y)?;
        Ok(self.pixels.borrow()[i])
    }

    /// Overwrite every pixel with `f(x, y)` in local coordinates.
    ///
    /// # Errors
    ///
    /// Fails if the mapping expired.
    pub fn fill(
        &self,
        mut f: impl FnMut(u32, u32) -> Rgba,
    ) -> Result<(), HostError> {
        if !self.live.get() {
            return Err(HostError::ArrayExpired);
        }
        let width = self.extent.width;
        let mut pixels = self.pixels.borrow_mut();
        for (i, px) in pixels.iter_mut().enumerate() {
            let i = i as u32;
            *px = f(i % width, i / width);
        }
        Ok(())
    }
}

struct TargetRecord {
    device: DeviceId,
}

struct BackingRecord {
    device: DeviceId,
    target: u64,
}

struct ResourceRecord {
    device: DeviceId,
    backing: u64,
    access: MapAccess,
    extent: Extent,
    pixels: Pixels,
    mapping: Option<MappingRecord>,
}

struct MappingRecord {
    stream: HostStream,
    live: Rc<Cell<bool>>,
}

/// What the simulated screen shows after the last present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Framebuffer {
    /// Framebuffer extent.
    pub extent: Extent,
    /// Row-major pixels, row 0 at the top.
    pub pixels: Vec<Rgba>,
    /// Number of successful presents so far.
    pub presents: u64,
}

impl Framebuffer {
    /// Pixel at `(x, y)`, if inside the framebuffer.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.extent.width || y >= self.extent.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.extent.width as usize + x as usize)
            .copied()
    }
}

struct HostState {
    device_count: u32,
    next_id: u64,
    targets: FxHashMap<u64, TargetRecord>,
    backings: FxHashMap<u64, BackingRecord>,
    resources: FxHashMap<u64, ResourceRecord>,
    armed: Vec<(HostOp, DeviceId)>,
    violations: Vec<String>,
    framebuffer: Framebuffer,
    last_stream: Option<HostStream>,
}

impl HostState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&mut self, op: HostOp, device: DeviceId) -> Result<(), HostError> {
        if device.0 >= self.device_count {
            return Err(HostError::UnknownDevice(device));
        }
        if let Some(pos) =
            self.armed.iter().position(|&(o, d)| o == op && d == device)
        {
            let _ = self.armed.remove(pos);
            return Err(HostError::Injected { op, device });
        }
        Ok(())
    }

    fn resource(
        &mut self,
        device: DeviceId,
        id: u64,
    ) -> Result<&mut ResourceRecord, HostError> {
        let record =
            self.resources.get_mut(&id).ok_or(HostError::UnknownHandle(id))?;
        if record.device != device {
            return Err(HostError::WrongDevice {
                expected: record.device,
                got: device,
            });
        }
        Ok(record)
    }
}

/// Shared handle to the simulated devices.
#[derive(Clone)]
pub struct HostGpu {
    state: Rc<RefCell<HostState>>,
}

impl HostGpu {
    /// Simulate `device_count` devices, ids `0..device_count`.
    #[must_use]
    pub fn new(device_count: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(HostState {
                device_count,
                next_id: 0,
                targets: FxHashMap::default(),
                backings: FxHashMap::default(),
                resources: FxHashMap::default(),
                armed: Vec::new(),
                violations: Vec::new(),
                framebuffer: Framebuffer::default(),
                last_stream: None,
            })),
        }
    }

    /// The device ids this backend simulates.
    #[must_use]
    pub fn device_ids(&self) -> Vec<DeviceId> {
        (0..self.state.borrow().device_count).map(DeviceId).collect()
    }

    /// Display half of the backend.
    #[must_use]
    pub fn display(&self) -> HostDisplay {
        HostDisplay { gpu: self.clone() }
    }

    /// Compute half of the backend.
    #[must_use]
    pub fn compute(&self) -> HostCompute {
        HostCompute { gpu: self.clone() }
    }

    /// Make the next `op` call on `device` fail.
    pub fn fail_next(&self, op: HostOp, device: DeviceId) {
        self.state.borrow_mut().armed.push((op, device));
    }

    /// Live resource counts on `device`.
    #[must_use]
    pub fn live(&self, device: DeviceId) -> LiveResources {
        let state = self.state.borrow();
        LiveResources {
            targets: state
                .targets
                .values()
                .filter(|t| t.device == device)
                .count(),
            backings: state
                .backings
                .values()
                .filter(|b| b.device == device)
                .count(),
            registrations: state
                .resources
                .values()
                .filter(|r| r.device == device)
                .count(),
            mappings: state
                .resources
                .values()
                .filter(|r| r.device == device && r.mapping.is_some())
                .count(),
        }
    }

    /// Live resource counts summed over every device.
    #[must_use]
    pub fn live_total(&self) -> LiveResources {
        self.device_ids().into_iter().map(|d| self.live(d)).fold(
            LiveResources::default(),
            |acc, l| LiveResources {
                targets: acc.targets + l.targets,
                backings: acc.backings + l.backings,
                registrations: acc.registrations + l.registrations,
                mappings: acc.mappings + l.mappings,
            },
        )
    }

    /// Protocol violations observed so far.
    #[must_use]
    pub fn violations(&self) -> Vec<String> {
        self.state.borrow().violations.clone()
    }

    /// Copy of the framebuffer as of the last present.
    #[must_use]
    pub fn framebuffer(&self) -> Framebuffer {
        self.state.borrow().framebuffer.clone()
    }

    /// Stream of the most recent map or unmap.
    #[must_use]
    pub fn last_stream(&self) -> Option<HostStream> {
        self.state.borrow().last_stream
    }
}

/// Display half of [`HostGpu`].
pub struct HostDisplay {
    gpu: HostGpu,
}

impl DisplayPipeline for HostDisplay {
    type Target = HostTarget;
    type Backing = HostBacking;
    type Error = HostError;

    fn create_target(
        &mut self,
        device: DeviceId,
        extent: Extent,
    ) -> Result<HostTarget, HostError> {
        let mut state = self.gpu.state.borrow_mut();
        state.check(HostOp::CreateTarget, device)?;
        if extent.area() == 0 {
            return Err(HostError::ZeroExtent);
        }
        let id = state.alloc_id();
        let _ = state.targets.insert(id, TargetRecord { device });
        Ok(HostTarget {
            id,
            device,
            extent,
            pixels: Rc::new(RefCell::new(vec![[0; 4]; extent.area()])),
        })
    }

    fn create_backing(
        &mut self,
        device: DeviceId,
        target: &HostTarget,
    ) -> Result<HostBacking, HostError> {
        let mut state = self.gpu.state.borrow_mut();
        state.check(HostOp::CreateBacking, device)?;
        if target.device != device {
            return Err(HostError::WrongDevice {
                expected: target.device,
                got: device,
            });
        }
        if !state.targets.contains_key(&target.id) {
            return Err(HostError::UnknownHandle(target.id));
        }
        let id = state.alloc_id();
        let _ = state.backings.insert(
            id,
            BackingRecord {
                device,
                target: target.id,
            },
        );
        Ok(HostBacking {
            id,
            device,
            extent: target.extent,
            pixels: Rc::clone(&target.pixels),
        })
    }

    fn destroy_backing(&mut self, device: DeviceId, backing: HostBacking) {
        let mut state = self.gpu.state.borrow_mut();
        if state.resources.values().any(|r| r.backing == backing.id) {
            state.violations.push(format!(
                "backing #{} destroyed while still registered",
                backing.id
            ));
        }
        if state.backings.remove(&backing.id).is_none() {
            state
                .violations
                .push(format!("backing #{} destroyed twice", backing.id));
        }
        if backing.device != device {
            state.violations.push(format!(
                "backing #{} destroyed on {device}",
                backing.id
            ));
        }
    }

    fn destroy_target(&mut self, device: DeviceId, target: HostTarget) {
        let mut state = self.gpu.state.borrow_mut();
        if state.backings.values().any(|b| b.target == target.id) {
            state.violations.push(format!(
                "target #{} destroyed before its backing",
                target.id
            ));
        }
        if state.targets.remove(&target.id).is_none() {
            state
                .violations
                .push(format!("target #{} destroyed twice", target.id));
        }
        if target.device != device {
            state.violations.push(format!(
                "target #{} destroyed on {device}",
                target.id
            ));
        }
    }

    fn clear(
        &mut self,
        device: DeviceId,
        target: &HostTarget,
        color: [f32; 4],
    ) -> Result<(), HostError> {
        let mut state = self.gpu.state.borrow_mut();
        state.check(HostOp::Clear, device)?;
        if !state.targets.contains_key(&target.id) {
            return Err(HostError::UnknownHandle(target.id));
        }
        if state.resources.values().any(|r| {
            r.mapping.is_some() && Rc::ptr_eq(&r.pixels, &target.pixels)
        }) {
            state.violations.push(format!(
                "target #{} cleared while mapped by compute",
                target.id
            ));
        }
        let px = to_rgba8(color);
        target.pixels.borrow_mut().fill(px);
        Ok(())
    }

    fn present(
        &mut self,
        layers: &[PresentLayer<'_, HostTarget>],
        flip_vertical: bool,
    ) -> Result<(), HostError> {
        let mut state = self.gpu.state.borrow_mut();
        for layer in layers {
            state.check(HostOp::Present, layer.device)?;
            if !state.targets.contains_key(&layer.target.id) {
                return Err(HostError::UnknownHandle(layer.target.id));
            }
            if state.resources.values().any(|r| {
                r.mapping.is_some() && Rc::ptr_eq(&r.pixels, &layer.target.pixels)
            }) {
                state.violations.push(format!(
                    "target #{} presented while mapped by compute",
                    layer.target.id
                ));
            }
        }

        let width = layers.iter().map(|l| l.partition.end()).max().unwrap_or(0);
        let height = layers.iter().map(|l| l.height).max().unwrap_or(0);
        let fb = &mut state.framebuffer;
        if fb.extent != Extent::new(width, height) {
            fb.extent = Extent::new(width, height);
            fb.pixels = vec![[0; 4]; fb.extent.area()];
        }

        for layer in layers {
            let src = layer.target.pixels.borrow();
            let src_width = layer.target.extent.width as usize;
            let rows = layer.target.extent.height.min(height) as usize;
            for y in 0..rows {
                let dst_y = if flip_vertical { height as usize - 1 - y } else { y };
                let src_row = &src[y * src_width..(y + 1) * src_width];
                let dst_start = dst_y * width as usize + layer.partition.x as usize;
                let n = src_width.min(layer.partition.width as usize);
                fb.pixels[dst_start..dst_start + n]
                    .copy_from_slice(&src_row[..n]);
            }
        }
        fb.presents += 1;
        Ok(())
    }
}

/// Compute half of [`HostGpu`].
pub struct HostCompute {
    gpu: HostGpu,
}

impl ComputePipeline<HostBacking> for HostCompute {
    type Resource = HostResource;
    type Array = HostArray;
    type Stream = HostStream;
    type Error = HostError;

    fn register(
        &mut self,
        device: DeviceId,
        backing: &HostBacking,
        access: MapAccess,
    ) -> Result<HostResource, HostError> {
        let mut state = self.gpu.state.borrow_mut();
        state.check(HostOp::Register, device)?;
        if backing.device != device {
            return Err(HostError::WrongDevice {
                expected: backing.device,
                got: device,
            });
        }
        if !state.backings.contains_key(&backing.id) {
            return Err(HostError::UnknownHandle(backing.id));
        }
        let id = state.alloc_id();
        let _ = state.resources.insert(
            id,
            ResourceRecord {
                device,
                backing: backing.id,
                access,
                extent: backing.extent,
                pixels: Rc::clone(&backing.pixels),
                mapping: None,
            },
        );
        Ok(HostResource { id, device })
    }

    fn unregister(
        &mut self,
        device: DeviceId,
        resource: HostResource,
    ) -> Result<(), HostError> {
        let mut state = self.gpu.state.borrow_mut();
        state.check(HostOp::Unregister, device)?;
        let record = state.resource(device, resource.id)?;
        if record.mapping.is_some() {
            return Err(HostError::StillMapped(resource.id));
        }
        let _ = state.resources.remove(&resource.id);
        Ok(())
    }

    fn map(
        &mut self,
        device: DeviceId,
        resource: &HostResource,
        stream: &HostStream,
    ) -> Result<(), HostError> {
        let mut state = self.gpu.state.borrow_mut();
        state.check(HostOp::Map, device)?;
        let record = state.resource(device, resource.id)?;
        if record.mapping.is_some() {
            return Err(HostError::AlreadyMapped(resource.id));
        }
        record.mapping = Some(MappingRecord {
            stream: *stream,
            live: Rc::new(Cell::new(true)),
        });
        state.last_stream = Some(*stream);
        Ok(())
    }

    fn mapped_array(
        &mut self,
        device: DeviceId,
        resource: &HostResource,
    ) -> Result<HostArray, HostError> {
        let mut state = self.gpu.state.borrow_mut();
        state.check(HostOp::MappedArray, device)?;
        let record = state.resource(device, resource.id)?;
        let mapping = record
            .mapping
            .as_ref()
            .ok_or(HostError::NotMapped(resource.id))?;
        Ok(HostArray {
            device: resource.device,
            extent: record.extent,
            access: record.access,
            pixels: Rc::clone(&record.pixels),
            live: Rc::clone(&mapping.live),
        })
    }

    fn unmap(
        &mut self,
        device: DeviceId,
        resource: &HostResource,
        stream: &HostStream,
    ) -> Result<(), HostError> {
        let mut state = self.gpu.state.borrow_mut();
        state.check(HostOp::Unmap, device)?;
        let record = state.resource(device, resource.id)?;
        let mapping =
            record.mapping.take().ok_or(HostError::NotMapped(resource.id))?;
        mapping.live.set(false);
        if mapping.stream != *stream {
            log::debug!(
                "resource #{} mapped on {:?}, unmapped on {:?}",
                resource.id,
                mapping.stream,
                stream
            );
        }
        state.last_stream = Some(*stream);
        Ok(())
    }
}

fn to_rgba8(color: [f32; 4]) -> Rgba {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Partition;

    const D0: DeviceId = DeviceId(0);

    fn surface(
        display: &mut HostDisplay,
        compute: &mut HostCompute,
    ) -> (HostTarget, HostBacking, HostResource) {
        let target = display.create_target(D0, Extent::new(4, 2)).unwrap();
        let backing = display.create_backing(D0, &target).unwrap();
        let resource = compute
            .register(D0, &backing, MapAccess::ReadWrite)
            .unwrap();
        (target, backing, resource)
    }

    #[test]
    fn counts_follow_lifecycle() {
        let gpu = HostGpu::new(1);
        let (mut display, mut compute) = (gpu.display(), gpu.compute());
        let (target, backing, resource) = surface(&mut display, &mut compute);
        assert_eq!(
            gpu.live(D0),
            LiveResources {
                targets: 1,
                backings: 1,
                registrations: 1,
                mappings: 0
            }
        );

        compute.map(D0, &resource, &HostStream(3)).unwrap();
        assert_eq!(gpu.live(D0).mappings, 1);
        assert_eq!(gpu.last_stream(), Some(HostStream(3)));
        compute.unmap(D0, &resource, &HostStream(3)).unwrap();

        compute.unregister(D0, resource).unwrap();
        display.destroy_backing(D0, backing);
        display.destroy_target(D0, target);
        assert!(gpu.live(D0).is_empty());
        assert!(gpu.violations().is_empty());
    }

    #[test]
    fn array_expires_on_unmap() {
        let gpu = HostGpu::new(1);
        let (mut display, mut compute) = (gpu.display(), gpu.compute());
        let (target, _backing, resource) = surface(&mut display, &mut compute);

        compute.map(D0, &resource, &HostStream(0)).unwrap();
        let array = compute.mapped_array(D0, &resource).unwrap();
        array.write(1, 1, [9, 8, 7, 6]).unwrap();
        assert_eq!(array.read(1, 1), Ok([9, 8, 7, 6]));
        assert_eq!(target.snapshot()[5], [9, 8, 7, 6]);

        compute.unmap(D0, &resource, &HostStream(0)).unwrap();
        assert!(!array.is_live());
        assert_eq!(array.write(0, 0, [1; 4]), Err(HostError::ArrayExpired));
    }

    #[test]
    fn backend_rejects_double_map_and_unregister_while_mapped() {
        let gpu = HostGpu::new(1);
        let (mut display, mut compute) = (gpu.display(), gpu.compute());
        let (_t, _b, resource) = surface(&mut display, &mut compute);
        compute.map(D0, &resource, &HostStream(0)).unwrap();
        assert_eq!(
            compute.map(D0, &resource, &HostStream(0)),
            Err(HostError::AlreadyMapped(resource.id))
        );
        assert_eq!(
            compute.unregister(D0, resource),
            Err(HostError::StillMapped(3))
        );
    }

    #[test]
    fn injected_failure_fires_once_on_matching_device() {
        let gpu = HostGpu::new(2);
        let mut display = gpu.display();
        gpu.fail_next(HostOp::CreateTarget, DeviceId(1));
        assert!(display.create_target(D0, Extent::new(1, 1)).is_ok());
        assert_eq!(
            display
                .create_target(DeviceId(1), Extent::new(1, 1))
                .unwrap_err(),
            HostError::Injected {
                op: HostOp::CreateTarget,
                device: DeviceId(1)
            }
        );
        assert!(display.create_target(DeviceId(1), Extent::new(1, 1)).is_ok());
        assert_eq!(
            display
                .create_target(DeviceId(2), Extent::new(1, 1))
                .unwrap_err(),
            HostError::UnknownDevice(DeviceId(2))
        );
    }

    #[test]
    fn destroying_registered_backing_is_a_violation() {
        let gpu = HostGpu::new(1);
        let (mut display, mut compute) = (gpu.display(), gpu.compute());
        let (_target, backing, _resource) = surface(&mut display, &mut compute);
        display.destroy_backing(D0, backing);
        assert_eq!(gpu.violations().len(), 1);
    }

    #[test]
    fn present_flips_rows() {
        let gpu = HostGpu::new(1);
        let mut display = gpu.display();
        let target = display.create_target(D0, Extent::new(2, 2)).unwrap();
        target.pixels.borrow_mut()[0] = [1, 0, 0, 255];
        let layer = PresentLayer {
            device: D0,
            partition: Partition::full(2),
            height: 2,
            target: &target,
        };

        display.present(&[layer], false).unwrap();
        assert_eq!(gpu.framebuffer().pixel(0, 0), Some([1, 0, 0, 255]));

        let layer = PresentLayer {
            device: D0,
            partition: Partition::full(2),
            height: 2,
            target: &target,
        };
        display.present(&[layer], true).unwrap();
        let fb = gpu.framebuffer();
        assert_eq!(fb.pixel(0, 1), Some([1, 0, 0, 255]));
        assert_eq!(fb.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(fb.presents, 2);
    }

    #[test]
    fn clear_converts_linear_color() {
        let gpu = HostGpu::new(1);
        let mut display = gpu.display();
        let target = display.create_target(D0, Extent::new(3, 1)).unwrap();
        display.clear(D0, &target, [1.0, 0.5, 0.0, 1.0]).unwrap();
        assert!(target.snapshot().iter().all(|&p| p == [255, 128, 0, 255]));
    }
}
