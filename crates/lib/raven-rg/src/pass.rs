use std::marker::PhantomData;

use arrayvec::ArrayVec;

use raven_rhi::backend::{self, AccessType, Buffer, BufferDesc, Image, ImageDesc};

use crate::error::ConfigurationError;
use crate::executor::{Executor, PassExecutor};
use crate::graph::RenderGraph;
use crate::graph_resource::{GraphResourceRef, Handle, ReadVersion, ResourceClass};
use crate::pass_context::PassContext;
use crate::resource::{Resource, ResourceDesc, ResourceView, TypeEqualTo, RT, SRV, UAV};

pub(crate) const MAX_ACCESS_PER_RESOURCE: usize = 4;
pub(crate) const MAX_COLOR_ATTACHMENTS: usize = 8;

/// Everything one pass does with one resource.
///
/// Reads and writes of the same resource inside a pass are merged into one entry,
/// so the resource gets exactly one transition when the pass begins.
#[derive(Debug)]
pub(crate) struct PassResource {
    pub(crate) resource: usize,
    pub(crate) read: Option<ReadVersion>,
    /// Version this pass produces.
    pub(crate) write: Option<u32>,
    pub(crate) accesses: ArrayVec<AccessType, MAX_ACCESS_PER_RESOURCE>,
}

impl PassResource {
    fn new(resource: usize) -> Self {
        Self {
            resource,
            read: None,
            write: None,
            accesses: ArrayVec::new(),
        }
    }
}

/// Render Pass in the render graph.
/// Each Pass instructs how GPU should do rendering at a given region of time.
/// Each Pass may import some render resources and may output some too.
pub(crate) struct Pass {
    /// Declaration index of the pass in the render graph.
    pub(crate) id: usize,
    pub(crate) name: String,
    pub(crate) resources: Vec<PassResource>,
    pub(crate) color_attachments: ArrayVec<usize, MAX_COLOR_ATTACHMENTS>,
    pub(crate) depth_attachment: Option<usize>,
    pub(crate) executor: Option<PassExecutor>,
}

impl Pass {
    /// Create a new empty pass.
    pub(crate) fn new_empty(id: usize, name: String) -> Self {
        Self {
            id,
            name,
            resources: Vec::new(),
            color_attachments: ArrayVec::new(),
            depth_attachment: None,
            executor: None,
        }
    }

    pub(crate) fn entry(&self, resource: usize) -> Option<&PassResource> {
        self.resources.iter().find(|entry| entry.resource == resource)
    }

}

fn entry_mut(resources: &mut Vec<PassResource>, resource: usize) -> &mut PassResource {
    let idx = match resources.iter().position(|entry| entry.resource == resource) {
        Some(idx) => idx,
        None => {
            resources.push(PassResource::new(resource));
            resources.len() - 1
        }
    };
    &mut resources[idx]
}

/// Helper struct to build a Pass.
pub struct PassBuilder<'rg> {
    pub(crate) rg: &'rg mut RenderGraph,
    pub(crate) pass: Option<Pass>,
}

impl<'rg> Drop for PassBuilder<'rg> {
    /// When dropping, add the built pass back into the render graph to finish adding.
    fn drop(&mut self) {
        if let Some(pass) = self.pass.take() {
            self.rg.finish_add_pass(pass);
        }
    }
}

impl<'rg> PassBuilder<'rg> {
    pub(crate) fn new(rg: &'rg mut RenderGraph, name: &str) -> Self {
        let id = rg.passes.len();
        Self {
            rg,
            pass: Some(Pass::new_empty(id, name.to_owned())),
        }
    }

    pub fn name(&self) -> &str {
        self.pass.as_ref().map(|pass| pass.name.as_str()).unwrap_or_default()
    }

    pub fn frame_index(&self) -> u64 {
        self.rg.frame()
    }

    /// Create a transient resource, only alive inside this frame.
    pub fn create<Desc: ResourceDesc>(
        &mut self,
        name: &str,
        desc: Desc,
    ) -> Handle<<Desc as ResourceDesc>::Resource>
    where
        Desc: TypeEqualTo<Other = <<Desc as ResourceDesc>::Resource as Resource>::Desc>,
    {
        let declarer = self.name().to_owned();
        self.rg.create_handle(name, desc, ResourceClass::Transient, &declarer)
    }

    /// Read-In Resource to be used in this pass.
    /// Returns a Reference to the render graph with SRV (because it is for read purpose).
    pub fn read<ResType: Resource>(
        &mut self,
        handle: &Handle<ResType>,
        access_type: AccessType,
    ) -> GraphResourceRef<ResType, SRV> {
        debug_assert!(backend::barrier::is_read_only_access(&access_type), "Invalid read access type: {:?}", &access_type);

        self.read_handle_impl(handle, access_type)
    }

    /// Write-Out Resource to be exported in this pass.
    /// `handle` steps to the version this pass produces.
    pub fn write<ResType: Resource>(
        &mut self,
        handle: &mut Handle<ResType>,
        access_type: AccessType,
    ) -> GraphResourceRef<ResType, UAV> {
        debug_assert!(backend::barrier::is_write_access(&access_type), "Invalid write access type: {:?}", &access_type);

        self.write_handle_impl(handle, access_type)
    }

    /// Same as [`Self::read`], but for attachments (e.g. depth test without depth write).
    pub fn raster_read<ResType: Resource>(
        &mut self,
        handle: &Handle<ResType>,
        access_type: AccessType,
    ) -> GraphResourceRef<ResType, RT> {
        debug_assert!(
            backend::barrier::is_raster_access(&access_type) && backend::barrier::is_read_only_access(&access_type),
            "Invalid raster read access type: {:?}", &access_type
        );

        self.read_handle_impl(handle, access_type)
    }

    /// Same as [`Self::write`], but for attachments.
    pub fn raster_write<ResType: Resource>(
        &mut self,
        handle: &mut Handle<ResType>,
        access_type: AccessType,
    ) -> GraphResourceRef<ResType, RT> {
        debug_assert!(
            backend::barrier::is_raster_access(&access_type) && backend::barrier::is_write_access(&access_type),
            "Invalid raster write access type: {:?}", &access_type
        );

        self.write_handle_impl(handle, access_type)
    }

    /// Declare a read of the texture called `name`.
    ///
    /// Reads the latest version written so far in this frame. If nothing wrote it yet, the read
    /// binds to whatever the frame writes last, or to the content from before this frame.
    pub fn read_texture(&mut self, name: &str, access_type: AccessType) -> GraphResourceRef<Image, SRV> {
        debug_assert!(backend::barrier::is_read_only_access(&access_type), "Invalid read access type: {:?}", &access_type);
        self.read_by_name_impl(name, access_type)
    }

    pub fn read_buffer(&mut self, name: &str, access_type: AccessType) -> GraphResourceRef<Buffer, SRV> {
        debug_assert!(backend::barrier::is_read_only_access(&access_type), "Invalid read access type: {:?}", &access_type);
        self.read_by_name_impl(name, access_type)
    }

    /// Declare a write of the texture called `name`, creating it if needed.
    ///
    /// A descriptor different from the previous frame's reallocates the texture,
    /// the old content is gone and this pass is responsible for filling the new one.
    pub fn write_texture(&mut self, name: &str, desc: ImageDesc, access_type: AccessType) -> GraphResourceRef<Image, UAV> {
        debug_assert!(backend::barrier::is_write_access(&access_type), "Invalid write access type: {:?}", &access_type);
        self.write_by_name_impl(name, desc, access_type)
    }

    pub fn write_buffer(&mut self, name: &str, desc: BufferDesc, access_type: AccessType) -> GraphResourceRef<Buffer, UAV> {
        debug_assert!(backend::barrier::is_write_access(&access_type), "Invalid write access type: {:?}", &access_type);
        self.write_by_name_impl(name, desc, access_type)
    }

    /// Read the content `name` had at the end of the previous frame.
    ///
    /// The texture is kept as a current/previous pair from now on. Resolves to a placeholder until
    /// there is a previous frame to read from.
    pub fn read_history_texture(&mut self, name: &str, access_type: AccessType) -> GraphResourceRef<Image, SRV> {
        debug_assert!(backend::barrier::is_read_only_access(&access_type), "Invalid read access type: {:?}", &access_type);

        let declarer = self.name().to_owned();
        let resource = self.rg.history_resource(name, &declarer);
        self.declare_read(resource, ReadVersion::Fixed(0), access_type);
        self.make_ref(resource, 0)
    }
}

// specialized declarations
impl<'rg> PassBuilder<'rg> {
    pub fn add_color_output(&mut self, name: &str, desc: ImageDesc) -> GraphResourceRef<Image, RT> {
        let output = self.write_by_name_impl(name, desc, AccessType::ColorAttachmentWrite);
        if let Some(pass) = self.pass.as_mut() {
            if !pass.color_attachments.contains(&output.resource) && pass.color_attachments.try_push(output.resource).is_err() {
                glog::error!("Pass {} has more than {} color attachments, {} is ignored", pass.name, MAX_COLOR_ATTACHMENTS, name);
            }
        }
        output
    }

    pub fn add_depth_output(&mut self, name: &str, desc: ImageDesc) -> GraphResourceRef<Image, RT> {
        debug_assert!(desc.format.is_depth(), "{} is not a depth format", name);

        let output = self.write_by_name_impl(name, desc, AccessType::DepthStencilAttachmentWrite);
        if let Some(pass) = self.pass.as_mut() {
            if let Some(old) = pass.depth_attachment.replace(output.resource) {
                if old != output.resource {
                    glog::warn!("Pass {} replaces its depth attachment with {}", pass.name, name);
                }
            }
        }
        output
    }

    pub fn add_storage_image_output(&mut self, name: &str, desc: ImageDesc) -> GraphResourceRef<Image, UAV> {
        self.write_by_name_impl(name, desc, AccessType::AnyShaderWrite)
    }

    pub fn add_transfer_output<Desc: ResourceDesc>(
        &mut self,
        name: &str,
        desc: Desc,
    ) -> GraphResourceRef<<Desc as ResourceDesc>::Resource, UAV>
    where
        Desc: TypeEqualTo<Other = <<Desc as ResourceDesc>::Resource as Resource>::Desc>,
    {
        self.write_by_name_impl(name, desc, AccessType::TransferWrite)
    }

    pub fn add_storage_output(&mut self, name: &str, desc: BufferDesc) -> GraphResourceRef<Buffer, UAV> {
        self.write_by_name_impl(name, desc, AccessType::AnyShaderWrite)
    }

    pub fn add_uniform_input(&mut self, name: &str) -> GraphResourceRef<Buffer, SRV> {
        self.read_by_name_impl(name, AccessType::AnyShaderReadUniformBuffer)
    }

    pub fn add_texture_input(&mut self, name: &str) -> GraphResourceRef<Image, SRV> {
        self.read_by_name_impl(name, AccessType::AnyShaderReadSampledImageOrUniformTexelBuffer)
    }

    pub fn add_indirect_input(&mut self, name: &str) -> GraphResourceRef<Buffer, SRV> {
        self.read_by_name_impl(name, AccessType::IndirectBuffer)
    }

    pub fn add_vertex_input(&mut self, name: &str) -> GraphResourceRef<Buffer, SRV> {
        self.read_by_name_impl(name, AccessType::VertexBuffer)
    }

    pub fn add_index_input(&mut self, name: &str) -> GraphResourceRef<Buffer, SRV> {
        self.read_by_name_impl(name, AccessType::IndexBuffer)
    }
}

// executor binding
impl<'rg> PassBuilder<'rg> {
    /// Bind an executor object to this pass.
    pub fn set_executor(&mut self, executor: Box<dyn Executor>) {
        self.bind_executor(PassExecutor::Object(executor));
    }

    /// Bind a render callback to this pass.
    pub fn render(
        mut self,
        func: impl (FnOnce(&mut PassContext) -> anyhow::Result<()>) + 'static,
    ) {
        self.bind_executor(PassExecutor::Callback(Box::new(func)));
    }

    fn bind_executor(&mut self, executor: PassExecutor) {
        if let Some(pass) = self.pass.as_mut() {
            let old_executor = pass.executor.replace(executor);
            debug_assert!(old_executor.is_none(), "Pass {} already has an executor", pass.name);
        }
    }
}

impl<'rg> PassBuilder<'rg> {
    fn make_ref<ResType: Resource, ViewType: ResourceView>(
        &self,
        resource: usize,
        version: u32,
    ) -> GraphResourceRef<ResType, ViewType> {
        let res = &self.rg.resources[resource];

        GraphResourceRef {
            handle: res.handle.unwrap_or(crate::graph::INVALID_HANDLE),
            resource,
            version,
            frame: self.rg.frame(),
            desc: res.desc
                .as_ref()
                .and_then(<ResType as Resource>::Desc::from_graph_desc)
                .unwrap_or_else(<ResType as Resource>::Desc::placeholder),
            _marker: PhantomData,
        }
    }

    fn read_by_name_impl<ResType: Resource, ViewType: ResourceView>(
        &mut self,
        name: &str,
        access_type: AccessType,
    ) -> GraphResourceRef<ResType, ViewType> {
        let declarer = self.name().to_owned();
        let resource = self.rg.resource_by_name(name, ResType::KIND, &declarer);

        let res = &self.rg.resources[resource];
        let read = if res.writers.is_empty() {
            ReadVersion::Latest
        } else {
            ReadVersion::Fixed(res.latest_version())
        };
        let version = res.latest_version();

        self.declare_read(resource, read, access_type);
        self.make_ref(resource, version)
    }

    fn write_by_name_impl<Desc: ResourceDesc, ViewType: ResourceView>(
        &mut self,
        name: &str,
        desc: Desc,
        access_type: AccessType,
    ) -> GraphResourceRef<<Desc as ResourceDesc>::Resource, ViewType> {
        let declarer = self.name().to_owned();
        let desc = desc.into();
        let resource = self.rg.declare_resource(name, desc, ResourceClass::for_write(&desc), &declarer);

        let version = self.declare_write(resource, None, access_type);
        self.make_ref(resource, version)
    }

    fn read_handle_impl<ResType: Resource, ViewType: ResourceView>(
        &mut self,
        handle: &Handle<ResType>,
        access_type: AccessType,
    ) -> GraphResourceRef<ResType, ViewType> {
        let declarer = self.name().to_owned();

        if handle.frame == self.rg.frame() {
            self.declare_read(handle.resource, ReadVersion::Fixed(handle.version), access_type);
            self.make_ref(handle.resource, handle.version)
        } else {
            // handle cached from an earlier frame, resolve it again through the resource table
            match self.rg.reintern(handle.handle, ResType::KIND, &declarer) {
                Some(name) => self.read_by_name_impl(&name, access_type),
                None => {
                    let resource = self.rg.placeholder_resource(ResType::KIND);
                    self.declare_read(resource, ReadVersion::Fixed(0), access_type);
                    self.make_ref(resource, 0)
                }
            }
        }
    }

    fn write_handle_impl<ResType: Resource, ViewType: ResourceView>(
        &mut self,
        handle: &mut Handle<ResType>,
        access_type: AccessType,
    ) -> GraphResourceRef<ResType, ViewType> {
        let declarer = self.name().to_owned();

        let (resource, expected) = if handle.frame == self.rg.frame() {
            (handle.resource, Some(handle.version))
        } else {
            match self.rg.reintern(handle.handle, ResType::KIND, &declarer) {
                Some(name) => (self.rg.resource_by_name(&name, ResType::KIND, &declarer), None),
                None => (self.rg.placeholder_resource(ResType::KIND), None),
            }
        };

        let version = self.declare_write(resource, expected, access_type);
        let output: GraphResourceRef<ResType, ViewType> = self.make_ref(resource, version);

        // after written, the handle names the new version
        handle.handle = output.handle;
        handle.resource = resource;
        handle.version = version;
        handle.frame = output.frame;

        output
    }

    fn declare_read(&mut self, resource: usize, read: ReadVersion, access_type: AccessType) {
        let Some(pass) = self.pass.as_mut() else { return };
        let res = &self.rg.resources[resource];
        let entry = entry_mut(&mut pass.resources, resource);

        match (entry.write, read) {
            // reads through the handle of its own write, or of the version it overwrites
            (Some(output), ReadVersion::Fixed(version)) if version + 1 >= output => {
                entry.read = Some(ReadVersion::Fixed(output - 1));
            }
            (Some(output), ReadVersion::Fixed(version)) => {
                self.rg.errors.push(ConfigurationError::VersionConflict {
                    pass: pass.name.clone(),
                    resource: res.display_name(),
                    expected: output - 1,
                    found: version,
                });
            }
            (Some(output), ReadVersion::Latest) => {
                entry.read = Some(ReadVersion::Fixed(output - 1));
            }
            (None, read) => match entry.read {
                None => entry.read = Some(read),
                // one pass can only see a single version of a resource
                Some(kept) if kept != read => {
                    self.rg.errors.push(ConfigurationError::VersionConflict {
                        pass: pass.name.clone(),
                        resource: res.display_name(),
                        expected: res.resolve(kept),
                        found: res.resolve(read),
                    });
                }
                Some(_) => {}
            },
        }

        push_access(entry, access_type, &pass.name, &res.name);
    }

    /// Returns the version the pass produces.
    fn declare_write(&mut self, resource: usize, expected: Option<u32>, access_type: AccessType) -> u32 {
        let Some(pass) = self.pass.as_mut() else { return 0 };
        let res = &mut self.rg.resources[resource];

        // placeholders are never versioned, the error that produced them is already recorded
        if res.handle.is_none() || res.is_history {
            let entry = entry_mut(&mut pass.resources, resource);
            push_access(entry, access_type, &pass.name, &res.name);
            return 0;
        }

        if let Some(output) = pass.entry(resource).and_then(|entry| entry.write) {
            if let Some(expected) = expected {
                if expected != output && expected + 1 != output {
                    self.rg.errors.push(ConfigurationError::VersionConflict {
                        pass: pass.name.clone(),
                        resource: res.display_name(),
                        expected: output - 1,
                        found: expected,
                    });
                }
            }

            let entry = entry_mut(&mut pass.resources, resource);
            push_access(entry, access_type, &pass.name, &res.name);
            return output;
        }

        let current = res.latest_version();
        if let Some(expected) = expected {
            if expected != current {
                // someone else already wrote the version this handle names
                self.rg.errors.push(ConfigurationError::VersionConflict {
                    pass: pass.name.clone(),
                    resource: res.display_name(),
                    expected: current,
                    found: expected,
                });
            }
        }

        res.writers.push(pass.id);
        let output = current + 1;

        let entry = entry_mut(&mut pass.resources, resource);
        entry.write = Some(output);
        match entry.read {
            Some(ReadVersion::Latest) => entry.read = Some(ReadVersion::Fixed(current)),
            Some(ReadVersion::Fixed(version)) if version < current => {
                self.rg.errors.push(ConfigurationError::VersionConflict {
                    pass: pass.name.clone(),
                    resource: res.display_name(),
                    expected: current,
                    found: version,
                });
            }
            _ => {}
        }

        push_access(entry, access_type, &pass.name, &res.name);
        output
    }
}

fn push_access(entry: &mut PassResource, access_type: AccessType, pass: &str, resource: &str) {
    if entry.accesses.contains(&access_type) {
        return;
    }

    if entry.accesses.try_push(access_type).is_err() {
        glog::error!(
            "Pass {} declares more than {} accesses on {}, {:?} is ignored",
            pass, MAX_ACCESS_PER_RESOURCE, resource, access_type
        );
    }
}
