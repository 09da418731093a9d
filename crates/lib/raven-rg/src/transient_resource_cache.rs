use std::collections::HashMap;
use std::hash::Hash;

use raven_rhi::backend::{AccessType, Buffer, BufferDesc, Image, ImageDesc};

use crate::allocator::PhysicalResource;

struct CachedResource<T> {
    resource: T,
    access: Vec<AccessType>,
    last_used_frame: u64,
}

/// Pool of transient resources, keyed by descriptor.
///
/// # Note
///
/// Every entry remembers the last frame that used it. An entry used by the current frame
/// can be handed out again within that frame (its previous user is done with it), an entry
/// of an older frame only once that frame is retired by the device.
pub(crate) struct TransientResourceCache {
    images: HashMap<ImageDesc, Vec<CachedResource<Image>>>,
    buffers: HashMap<BufferDesc, Vec<CachedResource<Buffer>>>,
}

fn take_reusable<K: Hash + Eq, T>(
    pool: &mut HashMap<K, Vec<CachedResource<T>>>,
    desc: &K,
    reusable: impl Fn(u64) -> bool,
) -> Option<(T, Vec<AccessType>, u64)> {
    let vec = pool.get_mut(desc)?;
    // most recently stored first, it is the most likely to be retired
    let idx = vec.iter().rposition(|cached| reusable(cached.last_used_frame))?;
    let cached = vec.swap_remove(idx);
    Some((cached.resource, cached.access, cached.last_used_frame))
}

impl TransientResourceCache {
    pub fn new() -> Self {
        Self {
            images: Default::default(),
            buffers: Default::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.images.values().map(Vec::len).sum::<usize>() + self.buffers.values().map(Vec::len).sum::<usize>()
    }

    /// Returns the image, its last known access and the frame that used it last.
    pub fn get_image(&mut self, desc: &ImageDesc, reusable: impl Fn(u64) -> bool) -> Option<(Image, Vec<AccessType>, u64)> {
        take_reusable(&mut self.images, desc, reusable)
    }

    pub fn get_buffer(&mut self, desc: &BufferDesc, reusable: impl Fn(u64) -> bool) -> Option<(Buffer, Vec<AccessType>, u64)> {
        take_reusable(&mut self.buffers, desc, reusable)
    }

    pub fn store(&mut self, resource: PhysicalResource, access: Vec<AccessType>, last_used_frame: u64) {
        match resource {
            PhysicalResource::Image(image) => {
                self.images.entry(image.desc).or_default().push(CachedResource {
                    resource: image,
                    access,
                    last_used_frame,
                });
            }
            PhysicalResource::Buffer(buffer) => {
                self.buffers.entry(buffer.desc).or_default().push(CachedResource {
                    resource: buffer,
                    access,
                    last_used_frame,
                });
            }
        }
    }

    /// Remove entries nobody used since `oldest_kept`.
    pub fn drain_older_than(&mut self, oldest_kept: u64) -> Vec<(PhysicalResource, u64)> {
        let mut drained = Vec::new();

        for vec in self.images.values_mut() {
            let (old, kept): (Vec<_>, Vec<_>) = vec.drain(..).partition(|cached| cached.last_used_frame < oldest_kept);
            *vec = kept;
            drained.extend(old.into_iter().map(|cached| (PhysicalResource::Image(cached.resource), cached.last_used_frame)));
        }

        for vec in self.buffers.values_mut() {
            let (old, kept): (Vec<_>, Vec<_>) = vec.drain(..).partition(|cached| cached.last_used_frame < oldest_kept);
            *vec = kept;
            drained.extend(old.into_iter().map(|cached| (PhysicalResource::Buffer(cached.resource), cached.last_used_frame)));
        }

        self.images.retain(|_, vec| !vec.is_empty());
        self.buffers.retain(|_, vec| !vec.is_empty());

        drained
    }

    /// Empty the whole cache, returning each object with the last frame that used it.
    pub fn drain(&mut self) -> Vec<(PhysicalResource, u64)> {
        self.drain_older_than(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use raven_rhi::backend::{BufferUsageFlags, RawHandle};

    use super::*;

    fn buffer(raw: u64, size: usize) -> PhysicalResource {
        PhysicalResource::Buffer(Buffer {
            raw: RawHandle(raw),
            desc: BufferDesc::new_gpu_only(size, BufferUsageFlags::STORAGE),
            name: format!("buffer {}", raw),
        })
    }

    #[test]
    fn only_reusable_entries_are_handed_out() {
        let mut cache = TransientResourceCache::new();
        let desc = BufferDesc::new_gpu_only(64, BufferUsageFlags::STORAGE);

        cache.store(buffer(1, 64), vec![AccessType::TransferWrite], 3);
        assert!(cache.get_buffer(&desc, |frame| frame < 3).is_none());

        let (reused, access, last_used) = cache.get_buffer(&desc, |frame| frame <= 3).unwrap();
        assert_eq!(reused.raw, RawHandle(1));
        assert_eq!(access, vec![AccessType::TransferWrite]);
        assert_eq!(last_used, 3);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn descriptors_do_not_mix() {
        let mut cache = TransientResourceCache::new();
        cache.store(buffer(1, 64), Vec::new(), 0);

        let other = BufferDesc::new_gpu_only(128, BufferUsageFlags::STORAGE);
        assert!(cache.get_buffer(&other, |_| true).is_none());
    }

    #[test]
    fn old_entries_are_drained() {
        let mut cache = TransientResourceCache::new();
        cache.store(buffer(1, 64), Vec::new(), 1);
        cache.store(buffer(2, 64), Vec::new(), 8);

        let drained = cache.drain_older_than(5);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0.raw(), RawHandle(1));
        assert_eq!(cache.len(), 1);
    }
}
