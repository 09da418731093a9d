use std::collections::HashMap;
use std::sync::Arc;

use raven_rhi::backend::{AccessType, Buffer, Image, RHIError, RawHandle, RenderDevice};

use crate::graph_resource::{GraphResourceDesc, GraphResourceHandle, ResourceClass};
use crate::resource::{ResourceDesc, ResourceKind};
use crate::transient_resource_cache::TransientResourceCache;

/// A GPU object owned by the render graph.
#[derive(Debug)]
pub(crate) enum PhysicalResource {
    Image(Image),
    Buffer(Buffer),
}

impl PhysicalResource {
    pub(crate) fn raw(&self) -> RawHandle {
        match self {
            PhysicalResource::Image(image) => image.raw,
            PhysicalResource::Buffer(buffer) => buffer.raw,
        }
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            PhysicalResource::Image(image) => &image.name,
            PhysicalResource::Buffer(buffer) => &buffer.name,
        }
    }

    pub(crate) fn desc(&self) -> GraphResourceDesc {
        match self {
            PhysicalResource::Image(image) => GraphResourceDesc::Image(image.desc),
            PhysicalResource::Buffer(buffer) => GraphResourceDesc::Buffer(buffer.desc),
        }
    }

    fn create(device: &dyn RenderDevice, desc: GraphResourceDesc, name: &str) -> Result<Self, RHIError> {
        match desc {
            GraphResourceDesc::Image(desc) => device.create_image(desc, name).map(PhysicalResource::Image),
            GraphResourceDesc::Buffer(desc) => device.create_buffer(desc, name).map(PhysicalResource::Buffer),
        }
    }

    fn destroy(self, device: &dyn RenderDevice) {
        match self {
            PhysicalResource::Image(image) => device.destroy_image(image),
            PhysicalResource::Buffer(buffer) => device.destroy_buffer(buffer),
        }
    }
}

/// Objects handed out when a resource has no physical backing.
pub(crate) struct Placeholders {
    pub(crate) image: Arc<Image>,
    pub(crate) buffer: Arc<Buffer>,
}

struct TrackedResource {
    resource: PhysicalResource,
    /// Access state the last frame using the object left it in.
    access: Vec<AccessType>,
    last_used_frame: Option<u64>,
}

enum OwnedStorage {
    Single(Option<TrackedResource>),
    NBuffered(Vec<Option<TrackedResource>>),
    History {
        current: Option<TrackedResource>,
        previous: Option<TrackedResource>,
        written_since_swap: bool,
    },
}

impl OwnedStorage {
    fn new(class: ResourceClass, frames_in_flight: usize) -> Self {
        match class {
            ResourceClass::NBuffered => OwnedStorage::NBuffered((0..frames_in_flight.max(1)).map(|_| None).collect()),
            ResourceClass::History => OwnedStorage::History {
                current: None,
                previous: None,
                written_since_swap: false,
            },
            _ => OwnedStorage::Single(None),
        }
    }

    fn slot_mut(&mut self, index: SlotIndex) -> Option<&mut Option<TrackedResource>> {
        match (self, index) {
            (OwnedStorage::Single(slot), SlotIndex::Single) => Some(slot),
            (OwnedStorage::NBuffered(copies), SlotIndex::Copy(idx)) => copies.get_mut(idx),
            (OwnedStorage::History { current, .. }, SlotIndex::Current) => Some(current),
            (OwnedStorage::History { previous, .. }, SlotIndex::Previous) => Some(previous),
            _ => None,
        }
    }

    fn slot(&self, index: SlotIndex) -> Option<&TrackedResource> {
        match (self, index) {
            (OwnedStorage::Single(slot), SlotIndex::Single) => slot.as_ref(),
            (OwnedStorage::NBuffered(copies), SlotIndex::Copy(idx)) => copies.get(idx).and_then(Option::as_ref),
            (OwnedStorage::History { current, .. }, SlotIndex::Current) => current.as_ref(),
            (OwnedStorage::History { previous, .. }, SlotIndex::Previous) => previous.as_ref(),
            _ => None,
        }
    }

    fn into_resources(self) -> Vec<TrackedResource> {
        match self {
            OwnedStorage::Single(slot) => slot.into_iter().collect(),
            OwnedStorage::NBuffered(copies) => copies.into_iter().flatten().collect(),
            OwnedStorage::History { current, previous, .. } => current.into_iter().chain(previous).collect(),
        }
    }
}

struct OwnedSlot {
    name: String,
    class: ResourceClass,
    storage: OwnedStorage,
}

/// Which half of a history pair a binding refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum HistorySide {
    /// The object written this frame. Every non history resource only has this side.
    Current,
    /// The content from before this frame.
    Previous,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SlotIndex {
    Single,
    Copy(usize),
    Current,
    Previous,
}

impl SlotIndex {
    fn of(class: ResourceClass, side: HistorySide, frame: u64, frames_in_flight: usize) -> Self {
        match (class, side) {
            (ResourceClass::NBuffered, _) => SlotIndex::Copy((frame % frames_in_flight.max(1) as u64) as usize),
            (ResourceClass::History, HistorySide::Current) => SlotIndex::Current,
            (ResourceClass::History, HistorySide::Previous) => SlotIndex::Previous,
            _ => SlotIndex::Single,
        }
    }
}

/// Where an acquired object goes back to after use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ResourceOrigin {
    Owned {
        handle: GraphResourceHandle,
        slot: SlotIndex,
    },
    Transient,
}

pub(crate) struct AllocationRequest<'a> {
    pub(crate) handle: GraphResourceHandle,
    pub(crate) name: &'a str,
    pub(crate) desc: GraphResourceDesc,
    pub(crate) class: ResourceClass,
    pub(crate) side: HistorySide,
    /// Some pass writes this binding in the current frame.
    pub(crate) written: bool,
}

pub(crate) enum Allocation {
    Owned {
        resource: PhysicalResource,
        origin: ResourceOrigin,
        access: Vec<AccessType>,
        /// Freshly created, content is undefined.
        created: bool,
    },
    /// Nothing backs the request, bind the placeholder of its kind.
    Placeholder,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub objects_created: u64,
    pub objects_destroyed: u64,
    /// Transient objects handed out again inside the frame that released them.
    pub aliased: u64,
    /// Transient objects reused from an earlier, retired frame.
    pub reused: u64,
    pub reallocations: u64,
    pub allocation_failures: u64,
    /// Times the CPU waited on the device to destroy an object a frame still used.
    pub stalls: u64,
}

/// Maps logical resources to physical objects and keeps them alive across frames.
pub(crate) struct ResourceAllocator {
    device: Arc<dyn RenderDevice>,
    frames_in_flight: usize,
    owned: HashMap<GraphResourceHandle, OwnedSlot>,
    transient_cache: TransientResourceCache,
    /// Objects to destroy once the frame that used them last is retired.
    pending_destroy: Vec<(Option<u64>, PhysicalResource)>,
    history_swapped_for: Option<u64>,
    placeholders: Placeholders,
    placeholder_access: [Vec<AccessType>; 2],
    placeholders_cleared: [bool; 2],
    stats: AllocatorStats,
}

fn kind_idx(kind: ResourceKind) -> usize {
    match kind {
        ResourceKind::Buffer => 0,
        ResourceKind::Texture => 1,
    }
}

impl ResourceAllocator {
    pub(crate) fn new(device: Arc<dyn RenderDevice>) -> Result<Self, RHIError> {
        let image = device.create_image(<Image as crate::resource::Resource>::Desc::placeholder(), "rg placeholder image")?;
        let buffer = device.create_buffer(<Buffer as crate::resource::Resource>::Desc::placeholder(), "rg placeholder buffer")?;

        Ok(Self {
            frames_in_flight: device.frames_in_flight(),
            device,
            owned: HashMap::new(),
            transient_cache: TransientResourceCache::new(),
            pending_destroy: Vec::new(),
            history_swapped_for: None,
            placeholders: Placeholders {
                image: Arc::new(image),
                buffer: Arc::new(buffer),
            },
            placeholder_access: Default::default(),
            placeholders_cleared: [false; 2],
            stats: AllocatorStats::default(),
        })
    }

    pub(crate) fn stats(&self) -> AllocatorStats {
        self.stats
    }

    pub(crate) fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }

    pub(crate) fn pooled_transients(&self) -> usize {
        self.transient_cache.len()
    }

    /// Physical identity currently backing `handle`, `None` if nothing is allocated.
    pub(crate) fn raw_of(&self, handle: GraphResourceHandle, side: HistorySide, frame: u64) -> Option<RawHandle> {
        let slot = self.owned.get(&handle)?;
        let index = SlotIndex::of(slot.class, side, frame, self.frames_in_flight);
        slot.storage.slot(index).map(|tracked| tracked.resource.raw())
    }

    /// Frame start bookkeeping, safe to call again for the same frame.
    /// Swaps history pairs and destroys retired objects.
    pub(crate) fn begin_frame(&mut self, frame: u64) {
        if self.history_swapped_for != Some(frame) {
            self.history_swapped_for = Some(frame);

            for slot in self.owned.values_mut() {
                if let OwnedStorage::History { current, previous, written_since_swap } = &mut slot.storage {
                    if *written_since_swap {
                        std::mem::swap(current, previous);
                        *written_since_swap = false;
                    }
                }
            }
        }

        self.destroy_retired();
    }

    /// Access state the next use of the binding starts from.
    pub(crate) fn planned_access(&self, handle: GraphResourceHandle, class: ResourceClass, side: HistorySide, frame: u64) -> Vec<AccessType> {
        if class == ResourceClass::Transient {
            return Vec::new();
        }

        self.owned.get(&handle)
            .filter(|slot| slot.class == class)
            .and_then(|slot| slot.storage.slot(SlotIndex::of(class, side, frame, self.frames_in_flight)))
            .map(|tracked| tracked.access.clone())
            .unwrap_or_default()
    }

    pub(crate) fn placeholder_access(&self, kind: ResourceKind) -> Vec<AccessType> {
        self.placeholder_access[kind_idx(kind)].clone()
    }

    pub(crate) fn set_placeholder_access(&mut self, kind: ResourceKind, access: Vec<AccessType>) {
        self.placeholder_access[kind_idx(kind)] = access;
    }

    /// True the first time the placeholder of `kind` is bound, so it gets cleared once.
    pub(crate) fn take_placeholder_clear(&mut self, kind: ResourceKind) -> bool {
        !std::mem::replace(&mut self.placeholders_cleared[kind_idx(kind)], true)
    }

    pub(crate) fn acquire(&mut self, request: &AllocationRequest, frame: u64, enable_aliasing: bool) -> Allocation {
        match request.class {
            ResourceClass::Transient => self.acquire_transient(request, frame, enable_aliasing),
            _ => self.acquire_owned(request, frame),
        }
    }

    fn acquire_transient(&mut self, request: &AllocationRequest, frame: u64, enable_aliasing: bool) -> Allocation {
        // the resource became transient, whatever it owned before goes away
        if let Some(slot) = self.owned.remove(&request.handle) {
            self.retire_resources(slot.storage.into_resources());
        }

        if !request.written {
            return Allocation::Placeholder;
        }

        let device = self.device.clone();
        let reusable = |last_used: u64| {
            if last_used == frame {
                enable_aliasing
            } else {
                device.is_frame_retired(last_used)
            }
        };

        let cached = match request.desc {
            GraphResourceDesc::Image(desc) => self.transient_cache
                .get_image(&desc, reusable)
                .map(|(image, access, last_used)| (PhysicalResource::Image(image), access, last_used)),
            GraphResourceDesc::Buffer(desc) => self.transient_cache
                .get_buffer(&desc, reusable)
                .map(|(buffer, access, last_used)| (PhysicalResource::Buffer(buffer), access, last_used)),
        };

        if let Some((resource, access, last_used)) = cached {
            if last_used == frame {
                glog::debug!("{} aliases {} ({})", request.name, resource.name(), resource.raw());
                self.stats.aliased += 1;
            } else {
                self.stats.reused += 1;
            }

            return Allocation::Owned {
                resource,
                origin: ResourceOrigin::Transient,
                access,
                created: false,
            };
        }

        match self.create(request.name, request.desc) {
            Some(resource) => Allocation::Owned {
                resource,
                origin: ResourceOrigin::Transient,
                access: Vec::new(),
                created: true,
            },
            None => Allocation::Placeholder,
        }
    }

    fn acquire_owned(&mut self, request: &AllocationRequest, frame: u64) -> Allocation {
        let frames_in_flight = self.frames_in_flight;

        let slot = self.owned
            .entry(request.handle)
            .or_insert_with(|| OwnedSlot {
                name: request.name.to_owned(),
                class: request.class,
                storage: OwnedStorage::new(request.class, frames_in_flight),
            });

        if slot.class != request.class {
            let old_storage = std::mem::replace(&mut slot.storage, OwnedStorage::new(request.class, frames_in_flight));
            glog::debug!("{} changes from {:?} to {:?}", slot.name, slot.class, request.class);

            let mut to_retire = Vec::new();
            match (old_storage, &mut slot.storage) {
                // what the resource held so far is the history of the coming writes
                (OwnedStorage::Single(old), OwnedStorage::History { previous, .. }) => *previous = old,
                (OwnedStorage::Single(old), OwnedStorage::Single(new)) => *new = old,
                (old, _) => to_retire = old.into_resources(),
            }

            slot.class = request.class;
            self.retire_resources(to_retire);
        }

        let index = SlotIndex::of(request.class, request.side, frame, frames_in_flight);
        let existing = self.owned
            .get_mut(&request.handle)
            .and_then(|slot| slot.storage.slot_mut(index))
            .and_then(Option::take);
        let origin = ResourceOrigin::Owned {
            handle: request.handle,
            slot: index,
        };

        match existing {
            Some(tracked) if tracked.resource.desc() == request.desc || index == SlotIndex::Previous => Allocation::Owned {
                resource: tracked.resource,
                origin,
                access: tracked.access,
                created: false,
            },
            Some(tracked) => {
                // descriptor changed, the old content does not survive
                match self.create(request.name, request.desc) {
                    Some(resource) => {
                        glog::debug!(
                            "{} reallocated: {} ({}) replaced by {}",
                            request.name, tracked.resource.name(), tracked.resource.raw(), resource.raw()
                        );
                        self.stats.reallocations += 1;
                        self.destroy_now(tracked);

                        Allocation::Owned {
                            resource,
                            origin,
                            access: Vec::new(),
                            created: true,
                        }
                    }
                    None => {
                        glog::warn!("{} keeps its previous object after a failed reallocation", request.name);
                        Allocation::Owned {
                            resource: tracked.resource,
                            origin,
                            access: tracked.access,
                            created: false,
                        }
                    }
                }
            }
            None => {
                let create = index != SlotIndex::Previous && (request.written || request.class == ResourceClass::Persistent);
                if !create {
                    return Allocation::Placeholder;
                }

                match self.create(request.name, request.desc) {
                    Some(resource) => Allocation::Owned {
                        resource,
                        origin,
                        access: Vec::new(),
                        created: true,
                    },
                    None => Allocation::Placeholder,
                }
            }
        }
    }

    /// Put an acquired object back after the frame (or for transients, after their last use).
    pub(crate) fn release(
        &mut self,
        origin: ResourceOrigin,
        resource: PhysicalResource,
        access: Vec<AccessType>,
        frame: u64,
        written: bool,
    ) {
        match origin {
            ResourceOrigin::Transient => self.transient_cache.store(resource, access, frame),
            ResourceOrigin::Owned { handle, slot: index } => {
                let tracked = TrackedResource {
                    resource,
                    access,
                    last_used_frame: Some(frame),
                };

                let Some(slot) = self.owned.get_mut(&handle) else {
                    // evicted while in use
                    self.pending_destroy.push((tracked.last_used_frame, tracked.resource));
                    return;
                };

                if written && index == SlotIndex::Current {
                    if let OwnedStorage::History { written_since_swap, .. } = &mut slot.storage {
                        *written_since_swap = true;
                    }
                }

                match slot.storage.slot_mut(index) {
                    Some(target) => {
                        if let Some(old) = target.replace(tracked) {
                            self.pending_destroy.push((old.last_used_frame, old.resource));
                        }
                    }
                    None => self.pending_destroy.push((tracked.last_used_frame, tracked.resource)),
                }
            }
        }
    }

    /// Forget a logical resource, its objects are destroyed once no frame uses them.
    pub(crate) fn release_slot(&mut self, handle: GraphResourceHandle) {
        if let Some(slot) = self.owned.remove(&handle) {
            glog::debug!("{} evicted", slot.name);
            self.retire_resources(slot.storage.into_resources());
        }
    }

    /// Drop every pooled transient object, they are derived again by the next frame.
    pub(crate) fn abandon_transients(&mut self) {
        let drained = self.transient_cache.drain();
        glog::debug!("{} pooled transient objects dropped", drained.len());

        self.pending_destroy.extend(drained.into_iter().map(|(resource, last_used)| (Some(last_used), resource)));
        self.destroy_retired();
    }

    /// Drop pooled transients nobody used for `retire_after` frames.
    pub(crate) fn trim_transients(&mut self, frame: u64, retire_after: u64) {
        let drained = self.transient_cache.drain_older_than(frame.saturating_sub(retire_after));
        self.pending_destroy.extend(drained.into_iter().map(|(resource, last_used)| (Some(last_used), resource)));
    }

    /// Wait for the device and destroy every object.
    pub(crate) fn shutdown(&mut self) {
        self.device.wait_idle();

        let owned = std::mem::take(&mut self.owned);
        for (_, slot) in owned {
            self.retire_resources(slot.storage.into_resources());
        }
        self.abandon_transients();
        self.destroy_retired();

        if !self.pending_destroy.is_empty() {
            glog::error!("{} objects are still in use after the device went idle", self.pending_destroy.len());
        }
    }

    fn create(&mut self, name: &str, desc: GraphResourceDesc) -> Option<PhysicalResource> {
        match PhysicalResource::create(self.device.as_ref(), desc, name) {
            Ok(resource) => {
                glog::debug!("{} allocated as {} ({} bytes)", name, resource.raw(), desc.estimate_memory());
                self.stats.objects_created += 1;
                Some(resource)
            }
            Err(err) => {
                glog::warn!("{}, falling back", err);
                self.stats.allocation_failures += 1;
                None
            }
        }
    }

    /// Destroy an object right away, waiting for the device if a frame still uses it.
    fn destroy_now(&mut self, tracked: TrackedResource) {
        if let Some(last_used) = tracked.last_used_frame {
            if !self.device.is_frame_retired(last_used) {
                glog::warn!("Stalling on frame {} to release {}", last_used, tracked.resource.name());
                self.device.wait_for_frame(last_used);
                self.stats.stalls += 1;
            }
        }

        tracked.resource.destroy(self.device.as_ref());
        self.stats.objects_destroyed += 1;
    }

    fn retire_resources(&mut self, resources: Vec<TrackedResource>) {
        self.pending_destroy.extend(resources.into_iter().map(|tracked| (tracked.last_used_frame, tracked.resource)));
    }

    fn destroy_retired(&mut self) {
        let device = self.device.clone();
        let (retired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_destroy)
            .into_iter()
            .partition(|(last_used, _)| last_used.map_or(true, |frame| device.is_frame_retired(frame)));

        self.pending_destroy = pending;
        for (_, resource) in retired {
            glog::trace!("{} ({}) destroyed", resource.name(), resource.raw());
            resource.destroy(device.as_ref());
            self.stats.objects_destroyed += 1;
        }
    }
}

impl Drop for ResourceAllocator {
    fn drop(&mut self) {
        self.shutdown();

        let placeholders = std::mem::replace(&mut self.placeholders, Placeholders {
            image: Arc::new(Image {
                raw: RawHandle::NULL,
                desc: <Image as crate::resource::Resource>::Desc::placeholder(),
                name: String::new(),
            }),
            buffer: Arc::new(Buffer {
                raw: RawHandle::NULL,
                desc: <Buffer as crate::resource::Resource>::Desc::placeholder(),
                name: String::new(),
            }),
        });

        match (Arc::try_unwrap(placeholders.image), Arc::try_unwrap(placeholders.buffer)) {
            (Ok(image), Ok(buffer)) => {
                self.device.destroy_image(image);
                self.device.destroy_buffer(buffer);
            }
            _ => glog::error!("Placeholders are still referenced when the allocator is dropped"),
        }
    }
}
