use std::collections::HashMap;
use std::sync::Arc;

use arrayvec::ArrayVec;

use raven_rhi::backend::{barrier, AccessType, BufferBarrier, CommandBuffer, ImageBarrier, RenderDevice};

use crate::allocator::{Allocation, AllocationRequest, HistorySide, ResourceAllocator};
use crate::compiled_graph::{
    binding_key, BindingKey, CompiledRenderGraph, GraphPreparedResource, GraphPreparedResourceRef, RegisteredResource,
};
use crate::graph_executor::RenderGraphConfig;
use crate::graph_resource::GraphResource;
use crate::pass::Pass;
use crate::pass_context::{GraphResourceRegistry, PassContext};
use crate::resource::ResourceKind;
use crate::retired_graph::RetiredRenderGraph;

const MAX_TRANSITION_PER_BATCH: usize = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ExecutionCounters {
    pub(crate) passes_executed: usize,
    pub(crate) barriers: usize,
    pub(crate) clears: usize,
    pub(crate) executor_errors: usize,
}

struct PendingTransition {
    binding: usize,
    prev_access: Vec<AccessType>,
    next_access: Vec<AccessType>,
    discard_contents: bool,
}

pub(crate) struct ExecutingRenderGraph<'exec> {
    device: &'exec Arc<dyn RenderDevice>,
    allocator: &'exec mut ResourceAllocator,
    config: &'exec RenderGraphConfig,
    frame: u64,

    passes: Vec<Pass>,
    resources: Vec<GraphResource>,
    order: Vec<usize>,

    registered_resources: Vec<RegisteredResource>,
    bindings: HashMap<BindingKey, usize>,
    /// Position in the execution order after which a binding is not used anymore.
    binding_last_use: HashMap<BindingKey, usize>,

    counters: ExecutionCounters,
}

impl<'exec> ExecutingRenderGraph<'exec> {
    pub(crate) fn new(
        compiled: CompiledRenderGraph,
        device: &'exec Arc<dyn RenderDevice>,
        allocator: &'exec mut ResourceAllocator,
        config: &'exec RenderGraphConfig,
    ) -> Self {
        let frame = compiled.frame();
        let order = compiled.order;
        let passes = compiled.render_graph.passes;
        let resources = compiled.render_graph.resources;

        let mut binding_last_use = HashMap::new();
        for (pos, &pass) in order.iter().enumerate() {
            for entry in &passes[pass].resources {
                let res = &resources[entry.resource];
                // exported and temporal content outlives the last pass
                let last = if res.exported || res.class.is_temporal() { usize::MAX } else { pos };

                binding_last_use
                    .entry(binding_key(res, entry))
                    .and_modify(|prev: &mut usize| *prev = (*prev).max(last))
                    .or_insert(last);
            }
        }

        Self {
            device,
            allocator,
            config,
            frame,
            passes,
            resources,
            order,
            registered_resources: Vec::new(),
            bindings: HashMap::new(),
            binding_last_use,
            counters: ExecutionCounters::default(),
        }
    }

    pub(crate) fn record_commands(&mut self, cb: &CommandBuffer) {
        let order = std::mem::take(&mut self.order);

        for (pos, &pass) in order.iter().enumerate() {
            self.record_pass_commands(cb, pos, pass);
            self.release_dead_transients(pos);
        }

        self.order = order;
    }

    pub(crate) fn finish(self) -> (RetiredRenderGraph, ExecutionCounters) {
        (
            RetiredRenderGraph {
                frame: self.frame,
                registered_resources: self.registered_resources,
            },
            self.counters,
        )
    }

    fn record_pass_commands(&mut self, cb: &CommandBuffer, pos: usize, pass_idx: usize) {
        let device = self.device;
        let executor = self.passes[pass_idx].executor.take();

        device.cmd_begin_label(cb, &self.passes[pass_idx].name);

        // bind every resource of the pass and transition it to the pass access
        let mut pass_bindings = Vec::with_capacity(self.passes[pass_idx].resources.len());
        let mut transitions = Vec::new();

        for entry_idx in 0..self.passes[pass_idx].resources.len() {
            let (resource, key, next_access, discard_contents) = {
                let entry = &self.passes[pass_idx].resources[entry_idx];
                let res = &self.resources[entry.resource];
                (entry.resource, binding_key(res, entry), entry.accesses.to_vec(), entry.read.is_none())
            };

            let binding = self.bind(cb, key, resource, pos);
            pass_bindings.push((resource, binding));

            let is_image = self.resources[resource].kind == ResourceKind::Texture;
            let registered = &mut self.registered_resources[binding];
            let just_cleared = std::mem::take(&mut registered.cleared);
            let discard_contents = discard_contents && !just_cleared;

            if barrier::needs_barrier(registered.get_current_access(), &next_access, is_image) {
                transitions.push(PendingTransition {
                    binding,
                    prev_access: registered.get_current_access().to_vec(),
                    next_access: next_access.clone(),
                    discard_contents,
                });
                // do NOT forget to update the access
                registered.transition_to(&next_access);
            } else {
                registered.accumulate(&next_access);
            }
        }

        self.resource_transition_batched(cb, &transitions);

        let pass = &self.passes[pass_idx];
        match executor {
            Some(executor) => {
                let mut context = PassContext {
                    cb,
                    device,
                    pass_name: &pass.name,
                    frame_index: self.frame,
                    color_attachments: &pass.color_attachments,
                    depth_attachment: pass.depth_attachment,
                    registry: GraphResourceRegistry {
                        registered_resources: &self.registered_resources,
                        pass_bindings: &pass_bindings,
                        placeholders: self.allocator.placeholders(),
                    },
                };

                if let Err(err) = executor.execute(&mut context) {
                    glog::error!("Pass {} failed to execute: {:?}", pass.name, err);
                    self.counters.executor_errors += 1;
                }
            }
            None => glog::trace!("Pass {} has no executor bound", pass.name),
        }

        device.cmd_end_label(cb);
        self.counters.passes_executed += 1;
    }

    /// Registered resource backing `key`, acquiring it from the allocator on first use.
    fn bind(&mut self, cb: &CommandBuffer, key: BindingKey, resource: usize, pos: usize) -> usize {
        if let Some(&binding) = self.bindings.get(&key) {
            return binding;
        }

        let res = &self.resources[resource];
        let kind = res.kind;
        let (prepared, access, created, written) = match key {
            BindingKey::Placeholder(kind) => {
                let created = self.allocator.take_placeholder_clear(kind);
                let placeholders = self.allocator.placeholders();
                let prepared = match kind {
                    ResourceKind::Texture => GraphPreparedResource::PlaceholderImage(placeholders.image.clone()),
                    ResourceKind::Buffer => GraphPreparedResource::PlaceholderBuffer(placeholders.buffer.clone()),
                };
                (prepared, self.allocator.placeholder_access(kind), created, false)
            }
            BindingKey::Resource(handle, side) => {
                let Some(desc) = res.desc else {
                    return self.bind_placeholder(cb, key, kind, resource, pos);
                };

                let written = side == HistorySide::Current && !res.writers.is_empty();
                let request = AllocationRequest {
                    handle,
                    name: &res.name,
                    desc,
                    class: res.class,
                    side,
                    written,
                };

                match self.allocator.acquire(&request, self.frame, self.config.enable_aliasing) {
                    Allocation::Owned { resource: physical, origin, access, created } => {
                        (GraphPreparedResource::Owned { resource: physical, origin }, access, created, written)
                    }
                    Allocation::Placeholder => return self.bind_placeholder(cb, key, kind, resource, pos),
                }
            }
        };

        let binding = self.registered_resources.len();
        self.registered_resources.push(RegisteredResource {
            key,
            resource: prepared,
            access,
            written,
            last_use: self.binding_last_use.get(&key).copied().unwrap_or(pos),
            cleared: false,
        });
        self.bindings.insert(key, binding);

        if created && self.config.clear_new_resources {
            self.clear_resource(cb, binding);
        }

        binding
    }

    fn bind_placeholder(&mut self, cb: &CommandBuffer, key: BindingKey, kind: ResourceKind, resource: usize, pos: usize) -> usize {
        let binding = self.bind(cb, BindingKey::Placeholder(kind), resource, pos);
        self.bindings.insert(key, binding);
        binding
    }

    /// Freshly created objects start from zero instead of garbage.
    fn clear_resource(&mut self, cb: &CommandBuffer, binding: usize) {
        let registered = &mut self.registered_resources[binding];
        let prev_access = registered.get_current_access().to_vec();
        let next_access = [AccessType::TransferWrite];
        registered.transition_to(&next_access);
        registered.cleared = true;

        let registered = &self.registered_resources[binding];
        match registered.resource.borrow() {
            Some(GraphPreparedResourceRef::Image(image)) => {
                self.device.cmd_pipeline_barrier(cb, &[], &[ImageBarrier {
                    image,
                    prev_access: &prev_access,
                    next_access: &next_access,
                    discard_contents: true,
                }]);
                self.device.cmd_clear_image(cb, image, [0.0; 4]);
            }
            Some(GraphPreparedResourceRef::Buffer(buffer)) => {
                self.device.cmd_pipeline_barrier(cb, &[BufferBarrier {
                    buffer,
                    prev_access: &prev_access,
                    next_access: &next_access,
                }], &[]);
                self.device.cmd_fill_buffer(cb, buffer, 0);
            }
            None => return,
        }

        self.counters.barriers += 1;
        self.counters.clears += 1;
    }

    /// Hand transient objects back after their last use, later passes of this frame may alias them.
    fn release_dead_transients(&mut self, pos: usize) {
        for registered in self.registered_resources.iter_mut().filter(|registered| registered.last_use == pos) {
            let is_transient = matches!(
                registered.resource,
                GraphPreparedResource::Owned { origin: crate::allocator::ResourceOrigin::Transient, .. }
            );
            if !is_transient {
                continue;
            }

            if let GraphPreparedResource::Owned { resource, origin } = std::mem::replace(&mut registered.resource, GraphPreparedResource::Released) {
                glog::trace!("{} ({}) released after its last use", resource.name(), resource.raw());
                self.allocator.release(origin, resource, registered.access.clone(), self.frame, registered.written);
            }
        }
    }

    /// Use this function to transition resources if possible.
    /// Record transition command one by one is less efficient than transition them all together!
    fn resource_transition_batched(&mut self, cb: &CommandBuffer, transitions: &[PendingTransition]) {
        for batch in transitions.chunks(MAX_TRANSITION_PER_BATCH) {
            let mut buf_barriers: ArrayVec<BufferBarrier, MAX_TRANSITION_PER_BATCH> = ArrayVec::new();
            let mut img_barriers: ArrayVec<ImageBarrier, MAX_TRANSITION_PER_BATCH> = ArrayVec::new();

            for transition in batch {
                match self.registered_resources[transition.binding].resource.borrow() {
                    Some(GraphPreparedResourceRef::Image(image)) => img_barriers.push(ImageBarrier {
                        image,
                        prev_access: &transition.prev_access,
                        next_access: &transition.next_access,
                        discard_contents: transition.discard_contents,
                    }),
                    Some(GraphPreparedResourceRef::Buffer(buffer)) => buf_barriers.push(BufferBarrier {
                        buffer,
                        prev_access: &transition.prev_access,
                        next_access: &transition.next_access,
                    }),
                    None => glog::error!("Transition on a released resource in frame {}", self.frame),
                }
            }

            self.counters.barriers += buf_barriers.len() + img_barriers.len();
            // transition them all together
            if !buf_barriers.is_empty() || !img_barriers.is_empty() {
                self.device.cmd_pipeline_barrier(cb, &buf_barriers, &img_barriers);
            }
        }
    }
}
