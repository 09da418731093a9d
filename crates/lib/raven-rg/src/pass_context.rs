use std::sync::Arc;

use raven_rhi::backend::{Buffer, CommandBuffer, Image, RenderDevice};

use crate::allocator::Placeholders;
use crate::compiled_graph::{GraphPreparedResourceRef, RegisteredResource};
use crate::graph_resource::GraphResourceRef;
use crate::resource::{ResourceView, RT, SRV, UAV};

/// Physical bindings of the executing frame, as seen by one pass.
pub(crate) struct GraphResourceRegistry<'a> {
    pub(crate) registered_resources: &'a [RegisteredResource],
    /// `(frame local resource, registered resource)` for every resource the pass declared.
    pub(crate) pass_bindings: &'a [(usize, usize)],
    pub(crate) placeholders: &'a Placeholders,
}

impl<'a> GraphResourceRegistry<'a> {
    fn binding_of(&self, resource: usize) -> Option<GraphPreparedResourceRef<'a>> {
        let binding = self.pass_bindings.iter()
            .find(|(res, _)| *res == resource)
            .map(|(_, binding)| *binding);

        debug_assert!(binding.is_some(), "Resolving resource {} which the pass never declared", resource);

        let registered: &'a [RegisteredResource] = self.registered_resources;
        binding.and_then(|binding| registered[binding].resource.borrow())
    }

    fn image(&self, resource: usize) -> &'a Image {
        match self.binding_of(resource) {
            Some(GraphPreparedResourceRef::Image(image)) => image,
            _ => {
                let placeholders: &'a Placeholders = self.placeholders;
                &placeholders.image
            }
        }
    }

    fn buffer(&self, resource: usize) -> &'a Buffer {
        match self.binding_of(resource) {
            Some(GraphPreparedResourceRef::Buffer(buffer)) => buffer,
            _ => {
                let placeholders: &'a Placeholders = self.placeholders;
                &placeholders.buffer
            }
        }
    }
}

/// Everything a pass can touch while it executes.
pub struct PassContext<'a> {
    pub(crate) cb: &'a CommandBuffer,
    pub(crate) device: &'a Arc<dyn RenderDevice>,
    pub(crate) pass_name: &'a str,
    pub(crate) frame_index: u64,
    pub(crate) color_attachments: &'a [usize],
    pub(crate) depth_attachment: Option<usize>,
    pub(crate) registry: GraphResourceRegistry<'a>,
}

impl<'a> PassContext<'a> {
    #[inline]
    pub fn command_buffer(&self) -> &'a CommandBuffer {
        self.cb
    }

    #[inline]
    pub fn device(&self) -> &'a dyn RenderDevice {
        &**self.device
    }

    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[inline]
    pub fn pass_name(&self) -> &'a str {
        self.pass_name
    }

    pub fn get_read_texture(&self, texture: &GraphResourceRef<Image, SRV>) -> &'a Image {
        self.check_frame(texture);
        self.registry.image(texture.resource)
    }

    pub fn get_read_buffer(&self, buffer: &GraphResourceRef<Buffer, SRV>) -> &'a Buffer {
        self.check_frame(buffer);
        self.registry.buffer(buffer.resource)
    }

    pub fn get_write_texture(&self, texture: &GraphResourceRef<Image, UAV>) -> &'a Image {
        self.check_frame(texture);
        self.registry.image(texture.resource)
    }

    pub fn get_write_buffer(&self, buffer: &GraphResourceRef<Buffer, UAV>) -> &'a Buffer {
        self.check_frame(buffer);
        self.registry.buffer(buffer.resource)
    }

    pub fn get_attachment(&self, attachment: &GraphResourceRef<Image, RT>) -> &'a Image {
        self.check_frame(attachment);
        self.registry.image(attachment.resource)
    }

    /// Color attachments in the order `add_color_output` declared them.
    pub fn color_attachment(&self, idx: usize) -> Option<&'a Image> {
        self.color_attachments.get(idx).map(|&resource| self.registry.image(resource))
    }

    pub fn depth_attachment(&self) -> Option<&'a Image> {
        self.depth_attachment.map(|resource| self.registry.image(resource))
    }

    #[inline]
    fn check_frame<Res: crate::resource::Resource, View: ResourceView>(&self, refer: &GraphResourceRef<Res, View>) {
        debug_assert_eq!(
            refer.frame, self.frame_index,
            "Pass {} resolves a reference declared in frame {}", self.pass_name, refer.frame
        );
    }
}
