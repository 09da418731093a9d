use std::collections::HashMap;

use crate::error::ConfigurationError;
use crate::graph_resource::{GraphResourceDesc, GraphResourceHandle, ResourceClass};

/// A logical resource that outlives single frames.
#[derive(Debug, Clone)]
pub(crate) struct ResourceEntry {
    pub(crate) name: String,
    pub(crate) desc: GraphResourceDesc,
    pub(crate) class: ResourceClass,
    pub(crate) last_declared_frame: u64,
    declared_in_build: u64,
}

enum Slot {
    Occupied {
        generation: u32,
        entry: ResourceEntry,
    },
    Free {
        generation: u32,
    },
}

impl Slot {
    fn generation(&self) -> u32 {
        match self {
            Slot::Occupied { generation, .. } | Slot::Free { generation } => *generation,
        }
    }
}

/// Name to logical resource registry.
///
/// Slots are reused through a free list, every reuse bumps the slot generation so that
/// handles into a freed slot fail to resolve instead of aliasing the new occupant.
#[derive(Default)]
pub struct ResourceTable {
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    name_to_slot: HashMap<String, u32>,
    /// Bumped once per graph build, descriptor conflicts are only reported inside one build.
    build_id: u64,
}

impl ResourceTable {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.name_to_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_slot.is_empty()
    }

    pub(crate) fn begin_build(&mut self) {
        self.build_id += 1;
    }

    pub fn lookup(&self, name: &str) -> Option<GraphResourceHandle> {
        self.name_to_slot.get(name).map(|&id| GraphResourceHandle {
            id,
            generation: self.slots[id as usize].generation(),
        })
    }

    pub(crate) fn get(&self, handle: GraphResourceHandle) -> Option<&ResourceEntry> {
        match self.slots.get(handle.id as usize) {
            Some(Slot::Occupied { generation, entry }) if *generation == handle.generation => Some(entry),
            _ => None,
        }
    }

    fn get_mut(&mut self, handle: GraphResourceHandle) -> Option<&mut ResourceEntry> {
        match self.slots.get_mut(handle.id as usize) {
            Some(Slot::Occupied { generation, entry }) if *generation == handle.generation => Some(entry),
            _ => None,
        }
    }

    pub fn is_alive(&self, handle: GraphResourceHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Declare `name` with `desc`.
    ///
    /// The same name with an identical descriptor always yields the same handle. A different
    /// descriptor in a later build replaces the stored one, the allocator notices the mismatch and
    /// reallocates. A different descriptor twice within one build is a conflict.
    pub(crate) fn lookup_or_create(
        &mut self,
        name: &str,
        desc: GraphResourceDesc,
        class: ResourceClass,
        frame: u64,
        declarer: &str,
    ) -> Result<GraphResourceHandle, ConfigurationError> {
        let build_id = self.build_id;

        let existing = self.lookup(name);
        if let Some(handle) = existing {
            let Some(entry) = self.get_mut(handle) else {
                unreachable!("name map out of sync with slots");
            };

            if entry.desc.kind() != desc.kind() {
                return Err(ConfigurationError::KindMismatch {
                    pass: declarer.to_owned(),
                    resource: name.to_owned(),
                    expected: entry.desc.kind(),
                    found: desc.kind(),
                });
            }

            let same_build = entry.declared_in_build == build_id;
            if entry.desc != desc {
                if same_build {
                    return Err(ConfigurationError::DescriptorConflict {
                        pass: declarer.to_owned(),
                        resource: name.to_owned(),
                        previous: format!("{:?}", entry.desc),
                        requested: format!("{:?}", desc),
                    });
                }

                glog::debug!("{} descriptor changed, marked for reallocation", name);
                entry.desc = desc;
            }

            entry.class = merge_class(entry.class, class, same_build);
            entry.last_declared_frame = frame;
            entry.declared_in_build = build_id;

            return Ok(handle);
        }

        let entry = ResourceEntry {
            name: name.to_owned(),
            desc,
            class,
            last_declared_frame: frame,
            declared_in_build: build_id,
        };

        let handle = if let Some(id) = self.free_slots.pop() {
            let generation = self.slots[id as usize].generation();
            self.slots[id as usize] = Slot::Occupied { generation, entry };
            GraphResourceHandle { id, generation }
        } else {
            let id = self.slots.len() as u32;
            self.slots.push(Slot::Occupied { generation: 0, entry });
            GraphResourceHandle { id, generation: 0 }
        };

        glog::trace!("{} registered as {:?}", name, handle);
        self.name_to_slot.insert(name.to_owned(), handle.id);
        Ok(handle)
    }

    /// Keep the resource alive for this frame without redeclaring its descriptor.
    pub(crate) fn touch(&mut self, handle: GraphResourceHandle, frame: u64) {
        if let Some(entry) = self.get_mut(handle) {
            entry.last_declared_frame = frame;
        }
    }

    pub(crate) fn promote(&mut self, handle: GraphResourceHandle, class: ResourceClass) {
        if let Some(entry) = self.get_mut(handle) {
            if entry.class != class && class.is_temporal() && entry.class != ResourceClass::History {
                glog::debug!("{} promoted from {:?} to {:?}", entry.name, entry.class, class);
                entry.class = class;
            }
        }
    }

    /// Free the slot. Outstanding handles stop resolving.
    pub(crate) fn remove(&mut self, handle: GraphResourceHandle) -> Option<ResourceEntry> {
        self.get(handle)?;

        let next = handle.expired();
        let slot = std::mem::replace(&mut self.slots[handle.id as usize], Slot::Free { generation: next.generation });

        self.free_slots.push(handle.id);
        match slot {
            Slot::Occupied { entry, .. } => {
                self.name_to_slot.remove(&entry.name);
                Some(entry)
            }
            Slot::Free { .. } => None,
        }
    }

    /// Remove non temporal resources nobody declared for `retire_after` frames.
    pub(crate) fn evict_unused(&mut self, frame: u64, retire_after: u64) -> Vec<(GraphResourceHandle, ResourceEntry)> {
        let stale: Vec<_> = self.iter()
            .filter(|(_, entry)| !entry.class.is_temporal() && frame.saturating_sub(entry.last_declared_frame) > retire_after)
            .map(|(handle, _)| handle)
            .collect();

        stale.into_iter()
            .filter_map(|handle| self.remove(handle).map(|entry| (handle, entry)))
            .collect()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (GraphResourceHandle, &ResourceEntry)> {
        self.slots.iter()
            .enumerate()
            .filter_map(|(id, slot)| match slot {
                Slot::Occupied { generation, entry } => Some((
                    GraphResourceHandle { id: id as u32, generation: *generation },
                    entry,
                )),
                Slot::Free { .. } => None,
            })
    }
}

fn merge_class(current: ResourceClass, requested: ResourceClass, same_build: bool) -> ResourceClass {
    match (current, requested) {
        // temporal resources stay temporal, history is the strongest
        (ResourceClass::History, _) => ResourceClass::History,
        (ResourceClass::Persistent, ResourceClass::History) => ResourceClass::History,
        (ResourceClass::Persistent, _) => ResourceClass::Persistent,
        (_, requested) if requested.is_temporal() => requested,
        // first declaration in a build decides
        (current, _) if same_build => current,
        (_, requested) => requested,
    }
}

#[cfg(test)]
mod tests {
    use raven_rhi::backend::{BufferDesc, BufferUsageFlags, Format, ImageDesc};

    use super::*;

    fn depth(extent: [u32; 2]) -> GraphResourceDesc {
        ImageDesc::new_2d(extent, Format::R32Sfloat).into()
    }

    #[test]
    fn same_descriptor_same_handle() {
        let mut table = ResourceTable::new();
        table.begin_build();
        let a = table.lookup_or_create("Depth", depth([1920, 1080]), ResourceClass::Retained, 0, "Fill").unwrap();
        let b = table.lookup_or_create("Depth", depth([1920, 1080]), ResourceClass::Retained, 0, "Other").unwrap();
        assert_eq!(a, b);

        table.begin_build();
        let c = table.lookup_or_create("Depth", depth([1920, 1080]), ResourceClass::Retained, 1, "Fill").unwrap();
        assert_eq!(a, c);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn descriptor_change_across_builds_keeps_handle() {
        let mut table = ResourceTable::new();
        table.begin_build();
        let a = table.lookup_or_create("Depth", depth([1920, 1080]), ResourceClass::Retained, 0, "Fill").unwrap();

        table.begin_build();
        let b = table.lookup_or_create("Depth", depth([1280, 720]), ResourceClass::Retained, 1, "Fill").unwrap();
        assert_eq!(a, b);
        assert_eq!(table.get(b).unwrap().desc, depth([1280, 720]));
    }

    #[test]
    fn descriptor_conflict_within_build() {
        let mut table = ResourceTable::new();
        table.begin_build();
        table.lookup_or_create("Depth", depth([1920, 1080]), ResourceClass::Retained, 0, "Fill").unwrap();
        let err = table.lookup_or_create("Depth", depth([64, 64]), ResourceClass::Retained, 0, "Other").unwrap_err();
        assert!(matches!(err, ConfigurationError::DescriptorConflict { ref pass, .. } if pass == "Other"));

        let buffer: GraphResourceDesc = BufferDesc::new_gpu_only(4, BufferUsageFlags::STORAGE).into();
        let err = table.lookup_or_create("Depth", buffer, ResourceClass::Retained, 0, "Other").unwrap_err();
        assert!(matches!(err, ConfigurationError::KindMismatch { .. }));
    }

    #[test]
    fn removed_slot_is_reused_with_new_generation() {
        let mut table = ResourceTable::new();
        table.begin_build();
        let old = table.lookup_or_create("A", depth([4, 4]), ResourceClass::Retained, 0, "P").unwrap();
        assert!(table.remove(old).is_some());
        assert!(!table.is_alive(old));
        assert!(table.lookup("A").is_none());

        let new = table.lookup_or_create("B", depth([4, 4]), ResourceClass::Retained, 0, "P").unwrap();
        assert_eq!(new.id, old.id);
        assert_ne!(new.generation, old.generation);
        assert!(table.get(old).is_none());
    }

    #[test]
    fn eviction_skips_temporal_resources() {
        let mut table = ResourceTable::new();
        table.begin_build();
        let retained = table.lookup_or_create("Scratch", depth([4, 4]), ResourceClass::Retained, 0, "P").unwrap();
        let history = table.lookup_or_create("TaaOutput", depth([4, 4]), ResourceClass::History, 0, "P").unwrap();

        assert!(table.evict_unused(3, 4).is_empty());

        let evicted = table.evict_unused(10, 4);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, retained);
        assert!(table.is_alive(history));
    }

    #[test]
    fn temporal_classes_are_sticky() {
        assert_eq!(merge_class(ResourceClass::Persistent, ResourceClass::Retained, false), ResourceClass::Persistent);
        assert_eq!(merge_class(ResourceClass::Retained, ResourceClass::History, true), ResourceClass::History);
        assert_eq!(merge_class(ResourceClass::Retained, ResourceClass::Transient, true), ResourceClass::Retained);
        assert_eq!(merge_class(ResourceClass::Retained, ResourceClass::Transient, false), ResourceClass::Transient);
    }
}
