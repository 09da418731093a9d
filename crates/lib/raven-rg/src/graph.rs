use std::collections::HashMap;
use std::marker::PhantomData;

use raven_core::result::ResultFlattener;
use raven_rhi::backend::{barrier, AccessType};

use crate::allocator::ResourceAllocator;
use crate::compiled_graph::{binding_key, BindingKey, CompiledRenderGraph, PlannedTransition, ResourceLifetime};
use crate::dependency_graph::{Dependency, DependencyGraph, DependencyKind};
use crate::error::{ConfigurationError, ConfigurationErrors};
use crate::graph_executor::RenderGraphConfig;
use crate::graph_resource::{GraphResource, GraphResourceDesc, GraphResourceHandle, Handle, ResourceClass};
use crate::pass::{Pass, PassBuilder};
use crate::resource::{Resource, ResourceDesc, ResourceKind, TypeEqualTo};
use crate::resource_table::ResourceTable;

/// Handle carried by placeholder resources, never resolves in the resource table.
pub(crate) const INVALID_HANDLE: GraphResourceHandle = GraphResourceHandle {
    id: u32::MAX,
    generation: u32::MAX,
};

const PLACEHOLDER_NAME: &str = "<placeholder>";

/// One frame's render graph.
///
/// Passes declare what they read and write by name (or by handle), resources get versioned by
/// every write. Nothing is allocated here, the graph is compiled into an execution order first.
pub struct RenderGraph {
    frame: u64,
    pub(crate) passes: Vec<Pass>,
    pub(crate) resources: Vec<GraphResource>,
    resource_by_name: HashMap<String, usize>,
    history_by_name: HashMap<String, usize>,
    /// History reads of names the resource table did not know yet, with the declaring pass.
    pending_history: Vec<(String, String)>,
    pub(crate) errors: Vec<ConfigurationError>,
    table: ResourceTable,
}

impl RenderGraph {
    pub(crate) fn new(frame: u64, table: ResourceTable) -> Self {
        Self {
            frame,
            passes: Vec::new(),
            resources: Vec::new(),
            resource_by_name: HashMap::new(),
            history_by_name: HashMap::new(),
            pending_history: Vec::new(),
            errors: Vec::new(),
            table,
        }
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Add a new render pass to the render graph.
    pub fn add_pass<'rg>(&'rg mut self, name: &str) -> PassBuilder<'rg> {
        PassBuilder::new(self, name)
    }

    /// Actully add the new pass to the render graph.
    pub(crate) fn finish_add_pass(&mut self, pass: Pass) {
        glog::trace!("Pass {} declared with {} resources", pass.name, pass.resources.len());
        self.passes.push(pass);
    }

    pub(crate) fn create_handle<Desc: ResourceDesc>(
        &mut self,
        name: &str,
        desc: Desc,
        class: ResourceClass,
        declarer: &str,
    ) -> Handle<<Desc as ResourceDesc>::Resource>
    where
        Desc: TypeEqualTo<Other = <<Desc as ResourceDesc>::Resource as Resource>::Desc>,
    {
        let resource = self.declare_resource(name, desc.into(), class, declarer);
        let res = &self.resources[resource];

        Handle {
            handle: res.handle.unwrap_or(INVALID_HANDLE),
            resource,
            version: res.latest_version(),
            frame: self.frame,
            // here we need Resource::Desc, it is not ResourceDesc, so we need to tell compiler there two types are the same by using TypeEqualTo trait
            desc: TypeEqualTo::same(desc),
            _marker: PhantomData,
        }
    }

    pub(crate) fn mark_exported(&mut self, resource: usize) {
        if let Some(res) = self.resources.get_mut(resource) {
            res.exported = true;
        }
    }

    /// Declare `name` with a descriptor, registering it in the resource table.
    /// Returns a placeholder resource if the declaration conflicts with an earlier one.
    pub(crate) fn declare_resource(
        &mut self,
        name: &str,
        desc: GraphResourceDesc,
        class: ResourceClass,
        declarer: &str,
    ) -> usize {
        if let Some(&resource) = self.resource_by_name.get(name) {
            let res = &self.resources[resource];
            if res.kind != desc.kind() {
                self.errors.push(ConfigurationError::KindMismatch {
                    pass: declarer.to_owned(),
                    resource: name.to_owned(),
                    expected: res.kind,
                    found: desc.kind(),
                });
                return self.placeholder_resource(desc.kind());
            }
        }

        match self.table.lookup_or_create(name, desc, class, self.frame, declarer) {
            Ok(handle) => {
                let class = self.table.get(handle).map_or(class, |entry| entry.class);
                let resource = self.local_resource(name, desc.kind());

                let res = &mut self.resources[resource];
                res.handle = Some(handle);
                res.desc = Some(desc);
                res.class = class;
                resource
            }
            Err(err) => {
                self.errors.push(err);
                self.placeholder_resource(desc.kind())
            }
        }
    }

    /// Frame local resource called `name`, for reading.
    /// Names the resource table does not know stay unbacked and read the placeholder.
    pub(crate) fn resource_by_name(&mut self, name: &str, kind: ResourceKind, declarer: &str) -> usize {
        if let Some(&resource) = self.resource_by_name.get(name) {
            let found = self.resources[resource].kind;
            if found != kind {
                self.errors.push(ConfigurationError::KindMismatch {
                    pass: declarer.to_owned(),
                    resource: name.to_owned(),
                    expected: found,
                    found: kind,
                });
                return self.placeholder_resource(kind);
            }
            return resource;
        }

        let known = self.table.lookup(name).and_then(|handle| {
            self.table.get(handle).map(|entry| (handle, entry.desc, entry.class))
        });

        if let Some((_, desc, _)) = known {
            if desc.kind() != kind {
                self.errors.push(ConfigurationError::KindMismatch {
                    pass: declarer.to_owned(),
                    resource: name.to_owned(),
                    expected: desc.kind(),
                    found: kind,
                });
                return self.placeholder_resource(kind);
            }
        }

        let resource = self.local_resource(name, kind);
        if let Some((handle, desc, class)) = known {
            self.table.touch(handle, self.frame);

            let res = &mut self.resources[resource];
            res.handle = Some(handle);
            res.desc = Some(desc);
            res.class = class;
        } else {
            glog::trace!("{} read by {} is unknown, reads the placeholder unless written later", name, declarer);
        }

        resource
    }

    /// Name of the resource a handle from an earlier frame refers to.
    pub(crate) fn reintern(&mut self, handle: GraphResourceHandle, kind: ResourceKind, declarer: &str) -> Option<String> {
        match self.table.get(handle) {
            Some(entry) => Some(entry.name.clone()),
            None => {
                self.errors.push(ConfigurationError::UnresolvedRead {
                    pass: declarer.to_owned(),
                    resource: format!("{:?} slot {} generation {}", kind, handle.id, handle.generation),
                });
                None
            }
        }
    }

    /// The previous frame's content of `name`.
    pub(crate) fn history_resource(&mut self, name: &str, declarer: &str) -> usize {
        if let Some(&resource) = self.history_by_name.get(name) {
            return resource;
        }

        let mut res = GraphResource::new(name, ResourceKind::Texture);
        res.is_history = true;
        res.class = ResourceClass::History;

        match self.table.lookup(name) {
            Some(handle) => {
                let entry_desc = self.table.get(handle).map(|entry| entry.desc);
                match entry_desc {
                    Some(desc) if desc.kind() == ResourceKind::Texture => {
                        self.table.promote(handle, ResourceClass::History);
                        self.table.touch(handle, self.frame);
                        res.handle = Some(handle);
                        res.desc = Some(desc);
                    }
                    Some(desc) => {
                        self.errors.push(ConfigurationError::KindMismatch {
                            pass: declarer.to_owned(),
                            resource: name.to_owned(),
                            expected: desc.kind(),
                            found: ResourceKind::Texture,
                        });
                    }
                    None => {}
                }
            }
            None => self.pending_history.push((name.to_owned(), declarer.to_owned())),
        }

        let resource = self.resources.len();
        self.resources.push(res);
        self.history_by_name.insert(name.to_owned(), resource);
        resource
    }

    pub(crate) fn placeholder_resource(&mut self, kind: ResourceKind) -> usize {
        let resource = self.resources.len();
        self.resources.push(GraphResource::new(PLACEHOLDER_NAME, kind));
        resource
    }

    fn local_resource(&mut self, name: &str, kind: ResourceKind) -> usize {
        if let Some(&resource) = self.resource_by_name.get(name) {
            return resource;
        }

        let resource = self.resources.len();
        self.resources.push(GraphResource::new(name, kind));
        self.resource_by_name.insert(name.to_owned(), resource);
        resource
    }

    /// Settle everything that depends on the whole frame's declarations, then hand the resource table back.
    pub(crate) fn finish_declarations(&mut self) -> ResourceTable {
        // history of names first written after the history read
        for (name, declarer) in std::mem::take(&mut self.pending_history) {
            match self.table.lookup(&name) {
                Some(handle) => {
                    glog::debug!("{} read as history by {} before any previous frame wrote it", name, declarer);
                    self.table.promote(handle, ResourceClass::History);
                }
                None => glog::debug!("History of {} read by {} is never written", name, declarer),
            }
        }

        // the table class is final now
        for res in self.resources.iter_mut().filter(|res| !res.is_history) {
            if let Some(entry) = res.handle.and_then(|handle| self.table.get(handle)) {
                res.class = entry.class;
            }
        }

        std::mem::take(&mut self.table)
    }
}

/// Compile Render Graph relative functions.
impl RenderGraph {
    fn build_dependency_graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new(self.passes.len());

        for pass in &self.passes {
            for entry in &pass.resources {
                let res = &self.resources[entry.resource];

                if let Some(read) = entry.read {
                    let version = res.resolve(read);

                    if let Some(writer) = res.writer_of(version) {
                        graph.add_edge(writer, pass.id, Dependency {
                            kind: DependencyKind::ReadAfterWrite,
                            resource: entry.resource,
                        });
                    }

                    // the next version must not overwrite what this pass still reads
                    if let Some(next_writer) = res.writer_of(version + 1) {
                        graph.add_edge(pass.id, next_writer, Dependency {
                            kind: DependencyKind::WriteAfterRead,
                            resource: entry.resource,
                        });
                    }
                }

                if let Some(version) = entry.write {
                    if let Some(prev_writer) = res.writer_of(version - 1) {
                        graph.add_edge(prev_writer, pass.id, Dependency {
                            kind: DependencyKind::WriteAfterWrite,
                            resource: entry.resource,
                        });
                    }
                }
            }
        }

        glog::trace!("Frame {}: {} passes, {} dependencies", self.frame, self.passes.len(), graph.edge_count());
        graph
    }

    /// Passes contributing to an exported resource. Temporal resources count as exported,
    /// their content is read by later frames.
    fn cull_passes(&self, graph: &DependencyGraph) -> Vec<usize> {
        if !self.resources.iter().any(|res| res.exported) {
            glog::debug!("Nothing exported in frame {}, pass culling skipped", self.frame);
            return (0..self.passes.len()).collect();
        }

        let roots: Vec<usize> = self.resources.iter()
            .filter(|res| res.exported || res.class.is_temporal())
            .filter_map(|res| res.writers.last().copied())
            .collect();

        let needed = graph.contributors(&roots);
        for pass in self.passes.iter().filter(|pass| !needed[pass.id]) {
            glog::debug!("Pass {} culled, it contributes to no exported resource", pass.name);
        }

        (0..self.passes.len()).filter(|&idx| needed[idx]).collect()
    }

    /// Every reader runs after the writer of the version it reads and before the next writer.
    fn respects_versions(&self, order: &[usize]) -> bool {
        let mut position = vec![usize::MAX; self.passes.len()];
        for (pos, &pass) in order.iter().enumerate() {
            position[pass] = pos;
        }

        order.iter().all(|&pass| {
            self.passes[pass].resources.iter().all(|entry| {
                let res = &self.resources[entry.resource];
                let Some(read) = entry.read else { return true };
                let version = res.resolve(read);

                let after_writer = res.writer_of(version).map_or(true, |writer| writer == pass || position[writer] < position[pass]);
                let before_next = res.writer_of(version + 1).map_or(true, |next| next == pass || position[next] > position[pass]);
                after_writer && before_next
            })
        })
    }

    fn compute_lifetimes(&self, order: &[usize]) -> Vec<Option<ResourceLifetime>> {
        let mut lifetimes: Vec<Option<ResourceLifetime>> = vec![None; self.resources.len()];

        for (pos, &pass) in order.iter().enumerate() {
            for entry in &self.passes[pass].resources {
                let lifetime = &mut lifetimes[entry.resource];
                *lifetime = Some(match lifetime {
                    Some(lifetime) => ResourceLifetime {
                        first: lifetime.first,
                        last: lifetime.last.max(pos),
                    },
                    None => ResourceLifetime { first: pos, last: pos },
                });
            }
        }

        // for those exported resources, expand their lifetimes
        let last_pos = order.len().saturating_sub(1);
        for (res, lifetime) in self.resources.iter().zip(lifetimes.iter_mut()) {
            if res.exported || res.class.is_temporal() {
                if let Some(lifetime) = lifetime {
                    lifetime.last = last_pos;
                }
            }
        }

        lifetimes
    }

    fn plan_transitions(&self, order: &[usize], allocator: &ResourceAllocator) -> Vec<Vec<PlannedTransition>> {
        let mut transitions: Vec<Vec<PlannedTransition>> = self.passes.iter().map(|_| Vec::new()).collect();
        let mut states: HashMap<BindingKey, Vec<AccessType>> = HashMap::new();

        for &pass in order {
            for entry in &self.passes[pass].resources {
                let res = &self.resources[entry.resource];
                let key = binding_key(res, entry);

                let state = states.entry(key).or_insert_with(|| match key {
                    BindingKey::Resource(handle, side) => allocator.planned_access(handle, res.class, side, self.frame),
                    BindingKey::Placeholder(kind) => allocator.placeholder_access(kind),
                });

                let next_access = entry.accesses.to_vec();
                let needs_barrier = barrier::needs_barrier(state, &next_access, res.kind == ResourceKind::Texture);

                transitions[pass].push(PlannedTransition {
                    resource: res.display_name(),
                    prev_access: state.clone(),
                    next_access: next_access.clone(),
                    needs_barrier,
                    discard_contents: needs_barrier && entry.read.is_none(),
                });

                if needs_barrier {
                    *state = next_access;
                } else {
                    for access in next_access {
                        if !state.contains(&access) {
                            state.push(access);
                        }
                    }
                }
            }
        }

        transitions
    }

    fn report_memory(&self, lifetimes: &[Option<ResourceLifetime>], frames_in_flight: usize) {
        let mut buffer_bytes = 0u64;
        let mut image_bytes = 0u64;
        let mut transient_bytes = 0u64;

        for (res, lifetime) in self.resources.iter().zip(lifetimes) {
            if lifetime.is_none() || res.is_history || res.handle.is_none() {
                continue;
            }
            let Some(desc) = res.desc else { continue };

            let copies = match res.class {
                ResourceClass::NBuffered => frames_in_flight as u64,
                ResourceClass::History => 2,
                _ => 1,
            };
            let bytes = desc.estimate_memory() * copies;

            match res.kind {
                ResourceKind::Buffer => buffer_bytes += bytes,
                ResourceKind::Texture => image_bytes += bytes,
            }
            if res.class == ResourceClass::Transient {
                transient_bytes += bytes;
            }
        }

        glog::trace!(
            "Frame {} graph memory: buffers {:.2} MiB, textures {:.2} MiB, {:.2} MiB of it transient",
            self.frame,
            buffer_bytes as f64 / (1024.0 * 1024.0),
            image_bytes as f64 / (1024.0 * 1024.0),
            transient_bytes as f64 / (1024.0 * 1024.0),
        );
    }

    /// Resolve the execution order and the transitions of every pass.
    /// Every problem found in the frame is returned at once.
    pub(crate) fn compile(
        mut self,
        config: &RenderGraphConfig,
        allocator: &ResourceAllocator,
    ) -> Result<CompiledRenderGraph, ConfigurationErrors> {
        let mut errors: ResultFlattener<(), ConfigurationErrors> = std::mem::take(&mut self.errors)
            .into_iter()
            .map(|err| Err(ConfigurationErrors::from(err)))
            .collect();

        let graph = self.build_dependency_graph();
        let active = if config.cull_unused_passes {
            self.cull_passes(&graph)
        } else {
            (0..self.passes.len()).collect()
        };

        let order = match graph.topological_order(&active) {
            Ok(order) => order,
            Err(cycle) => {
                errors.push_error(ConfigurationError::DependencyCycle {
                    passes: cycle.passes.iter().map(|&pass| self.passes[pass].name.clone()).collect(),
                    resources: cycle.resources.iter().map(|&res| self.resources[res].display_name()).collect(),
                }.into());
                Vec::new()
            }
        };

        errors.finish()?;

        debug_assert!(self.respects_versions(&order), "execution order breaks a resource version");

        let culled = self.passes.len() - order.len();
        glog::debug!(
            "Frame {} order: [{}]",
            self.frame,
            order.iter().map(|&pass| self.passes[pass].name.as_str()).collect::<Vec<_>>().join(", ")
        );

        let lifetimes = self.compute_lifetimes(&order);
        let transitions = self.plan_transitions(&order, allocator);
        self.report_memory(&lifetimes, config.frames_in_flight);

        Ok(CompiledRenderGraph {
            render_graph: self,
            order,
            culled,
            lifetimes,
            transitions,
        })
    }
}
