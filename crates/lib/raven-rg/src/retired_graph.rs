use crate::allocator::ResourceAllocator;
use crate::compiled_graph::{BindingKey, GraphPreparedResource, RegisteredResource};
use crate::resource::ResourceKind;

/// A frame whose commands are recorded, holding on to the objects it used.
pub(crate) struct RetiredRenderGraph {
    pub(crate) frame: u64,
    pub(crate) registered_resources: Vec<RegisteredResource>,
}

impl RetiredRenderGraph {
    /// Release all the resources that is created by the render graph.
    /// The allocator keeps them together with the access state this frame left them in,
    /// so the next frame starts its transitions from there.
    pub fn release_owned_resources(self, allocator: &mut ResourceAllocator) {
        for res in self.registered_resources.into_iter() {
            match res.resource {
                GraphPreparedResource::Owned { resource, origin } => {
                    allocator.release(origin, resource, res.access, self.frame, res.written);
                }
                GraphPreparedResource::PlaceholderImage(_) => {
                    // one binding per kind, other keys only alias it
                    if res.key == BindingKey::Placeholder(ResourceKind::Texture) {
                        allocator.set_placeholder_access(ResourceKind::Texture, res.access);
                    }
                }
                GraphPreparedResource::PlaceholderBuffer(_) => {
                    if res.key == BindingKey::Placeholder(ResourceKind::Buffer) {
                        allocator.set_placeholder_access(ResourceKind::Buffer, res.access);
                    }
                }
                GraphPreparedResource::Released => {}
            }
        }
    }
}
