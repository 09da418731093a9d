use std::sync::Arc;

use raven_rhi::backend::{AccessType, Buffer, Image};

use crate::allocator::{HistorySide, PhysicalResource, ResourceOrigin};
use crate::graph::RenderGraph;
use crate::graph_resource::{GraphResource, GraphResourceHandle, ResourceClass};
use crate::pass::PassResource;
use crate::resource::ResourceKind;

/// Span of a resource in execution order, both ends inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceLifetime {
    /// Position in the execution order of the first pass using the resource.
    pub first: usize,
    /// Position of the last one. Exported and temporal resources live until the end of the frame.
    pub last: usize,
}

impl ResourceLifetime {
    #[inline]
    pub fn overlaps(&self, other: &ResourceLifetime) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// The transition a pass needs on one resource, assuming every object keeps the state its
/// last use left it in.
///
/// Transient objects are only picked from the pool at execution, so their first use is planned
/// from an empty state. A pooled or aliased object starts from whatever its previous user left,
/// the recorded barrier then differs in `prev_access` (never in `next_access`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedTransition {
    pub resource: String,
    pub prev_access: Vec<AccessType>,
    pub next_access: Vec<AccessType>,
    pub needs_barrier: bool,
    pub discard_contents: bool,
}

/// Identity of one physical binding inside a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum BindingKey {
    Resource(GraphResourceHandle, HistorySide),
    /// All unbacked reads of one kind share the placeholder.
    Placeholder(ResourceKind),
}

/// Which physical object a pass touches through `entry`.
pub(crate) fn binding_key(res: &GraphResource, entry: &PassResource) -> BindingKey {
    let (Some(handle), Some(_)) = (res.handle, res.desc) else {
        return BindingKey::Placeholder(res.kind);
    };

    let reads_previous_content = res.is_history
        || (res.class == ResourceClass::History
            && entry.write.is_none()
            && entry.read.map_or(false, |read| res.resolve(read) == 0));

    if reads_previous_content {
        BindingKey::Resource(handle, HistorySide::Previous)
    } else {
        BindingKey::Resource(handle, HistorySide::Current)
    }
}

/// Render graph with its execution order resolved.
pub struct CompiledRenderGraph {
    pub(crate) render_graph: RenderGraph,
    /// Pass ids in execution order.
    pub(crate) order: Vec<usize>,
    pub(crate) culled: usize,
    pub(crate) lifetimes: Vec<Option<ResourceLifetime>>,
    /// Indexed by pass id.
    pub(crate) transitions: Vec<Vec<PlannedTransition>>,
}

impl CompiledRenderGraph {
    pub fn frame(&self) -> u64 {
        self.render_graph.frame()
    }

    /// Names of the passes in the order they will execute.
    pub fn pass_order(&self) -> Vec<&str> {
        self.order.iter()
            .map(|&pass| self.render_graph.passes[pass].name.as_str())
            .collect()
    }

    pub fn culled_passes(&self) -> usize {
        self.culled
    }

    /// Planned transitions of the pass called `pass`, in declaration order of its resources.
    /// `None` if the pass does not exist or got culled.
    pub fn transitions_of(&self, pass: &str) -> Option<&[PlannedTransition]> {
        self.order.iter()
            .find(|&&idx| self.render_graph.passes[idx].name == pass)
            .map(|&idx| self.transitions[idx].as_slice())
    }

    pub fn lifetime_of(&self, resource: &str) -> Option<ResourceLifetime> {
        self.render_graph.resources.iter()
            .position(|res| res.name == resource && !res.is_history)
            .and_then(|idx| self.lifetimes[idx])
    }
}

pub(crate) enum GraphPreparedResource {
    Owned {
        resource: PhysicalResource,
        origin: ResourceOrigin,
    },
    PlaceholderImage(Arc<Image>),
    PlaceholderBuffer(Arc<Buffer>),
    /// Given back to the allocator after its last use.
    Released,
}

// used to borrow inner resource from GraphPreparedResource, and flatten out the differences of Owned or Placeholder.
pub(crate) enum GraphPreparedResourceRef<'a> {
    Image(&'a Image),
    Buffer(&'a Buffer),
}

impl GraphPreparedResource {
    pub fn borrow(&self) -> Option<GraphPreparedResourceRef<'_>> {
        match self {
            GraphPreparedResource::Owned { resource: PhysicalResource::Image(image), .. } => Some(GraphPreparedResourceRef::Image(image)),
            GraphPreparedResource::Owned { resource: PhysicalResource::Buffer(buffer), .. } => Some(GraphPreparedResourceRef::Buffer(buffer)),
            GraphPreparedResource::PlaceholderImage(image) => Some(GraphPreparedResourceRef::Image(image)),
            GraphPreparedResource::PlaceholderBuffer(buffer) => Some(GraphPreparedResourceRef::Buffer(buffer)),
            GraphPreparedResource::Released => None,
        }
    }
}

/// A physical binding of the executing frame together with its live access state.
pub(crate) struct RegisteredResource {
    pub(crate) key: BindingKey,
    pub(crate) resource: GraphPreparedResource,
    pub(crate) access: Vec<AccessType>,
    /// Some pass writes this binding in this frame.
    pub(crate) written: bool,
    /// Position in the execution order of the last pass using the binding.
    pub(crate) last_use: usize,
    /// Cleared on creation, the first pass must keep the cleared content.
    pub(crate) cleared: bool,
}

impl RegisteredResource {
    pub fn get_current_access(&self) -> &[AccessType] {
        &self.access
    }

    #[inline]
    pub fn transition_to(&mut self, dst_access: &[AccessType]) {
        self.access.clear();
        self.access.extend_from_slice(dst_access);
    }

    /// Read only accesses that did not need a barrier pile up.
    #[inline]
    pub fn accumulate(&mut self, accesses: &[AccessType]) {
        for access in accesses {
            if !self.access.contains(access) {
                self.access.push(*access);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifetimes_overlap_inclusively() {
        let a = ResourceLifetime { first: 0, last: 2 };
        let b = ResourceLifetime { first: 2, last: 4 };
        let c = ResourceLifetime { first: 3, last: 3 };

        assert!(a.overlaps(&b));
        assert!(b.overlaps(&c));
        assert!(!a.overlaps(&c));
    }
}
