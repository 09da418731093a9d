use std::marker::PhantomData;

use raven_rhi::backend::{BufferDesc, ImageDesc};

use crate::resource::{Resource, ResourceKind, ResourceView};

/// Because GraphResource can NOT have any generic type parameters,
/// we have to create a ResourceDesc for render graph to hold the data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphResourceDesc {
    Image(ImageDesc),
    Buffer(BufferDesc),
}

impl GraphResourceDesc {
    pub fn kind(&self) -> ResourceKind {
        match self {
            GraphResourceDesc::Image(_) => ResourceKind::Texture,
            GraphResourceDesc::Buffer(_) => ResourceKind::Buffer,
        }
    }

    pub fn estimate_memory(&self) -> u64 {
        match self {
            GraphResourceDesc::Image(desc) => desc.estimate_memory(),
            GraphResourceDesc::Buffer(desc) => desc.estimate_memory(),
        }
    }

    /// CPU visible resources get one physical copy per frame in flight.
    pub fn is_cpu_visible(&self) -> bool {
        match self {
            GraphResourceDesc::Image(_) => false,
            GraphResourceDesc::Buffer(desc) => desc.memory_location.is_cpu_visible(),
        }
    }
}

/// How the physical backing of a logical resource lives across frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// One object per name, kept while the descriptor does not change.
    Retained,
    /// One object per frame in flight, picked by the frame index.
    NBuffered,
    /// Pooled by descriptor and may alias other transients within a frame.
    Transient,
    /// Exactly one object, never aliased, survives abandoned frames.
    Persistent,
    /// A current/previous pair swapped at frame start.
    History,
}

impl ResourceClass {
    pub fn is_temporal(&self) -> bool {
        matches!(self, ResourceClass::Persistent | ResourceClass::History)
    }

    pub(crate) fn for_write(desc: &GraphResourceDesc) -> Self {
        if desc.is_cpu_visible() {
            ResourceClass::NBuffered
        } else {
            ResourceClass::Retained
        }
    }
}

/// Render graph resource handle to the slot of the resource table.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct GraphResourceHandle {
    /// Slot id of the resources in the resource table.
    pub(crate) id: u32,
    /// Generation of the slot, bumped every time the slot is freed.
    pub(crate) generation: u32,
}

impl GraphResourceHandle {
    /// This resource had been expired, step to next generation.
    pub(crate) fn expired(self) -> Self {
        Self {
            id: self.id,
            generation: self.generation.wrapping_add(1),
        }
    }
}

/// Handle of any render resource in the render graph.
///
/// Carries the version it refers to, so a handle obtained from a write names exactly
/// the content that write produced. A handle can be cached across frames, it is re-resolved
/// against the resource table when used in a later frame.
#[derive(Debug)]
pub struct Handle<ResourceType: Resource> {
    /// Handle of the resource table slot.
    pub(crate) handle: GraphResourceHandle,
    /// Index of the resource inside the graph of `frame`.
    pub(crate) resource: usize,
    pub(crate) version: u32,
    pub(crate) frame: u64,
    /// Description of this resource.
    pub(crate) desc: <ResourceType as Resource>::Desc,
    /// Rust: Use PhantomData to tell rust Handle holds a ResourceType object.
    pub(crate) _marker: PhantomData<ResourceType>,
}

impl<ResourceType: Resource> Handle<ResourceType> {
    pub fn desc(&self) -> &<ResourceType as Resource>::Desc {
        &self.desc
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl<ResourceType: Resource> Clone for Handle<ResourceType> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            resource: self.resource,
            version: self.version,
            frame: self.frame,
            desc: self.desc,
            _marker: PhantomData,
        }
    }
}

impl<ResourceType: Resource> PartialEq for Handle<ResourceType> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && self.version == other.version && self.frame == other.frame
    }
}

impl<ResourceType: Resource> Eq for Handle<ResourceType> {}

/// Same as Handle, but add ResourceView as a marker to indicate the view type to be used inside the pass.
pub struct GraphResourceRef<ResType: Resource, ViewType: ResourceView> {
    pub(crate) handle: GraphResourceHandle,
    pub(crate) resource: usize,
    pub(crate) version: u32,
    pub(crate) frame: u64,
    pub(crate) desc: <ResType as Resource>::Desc,
    pub(crate) _marker: PhantomData<(ResType, ViewType)>,
}

impl<ResType: Resource, ViewType: ResourceView> GraphResourceRef<ResType, ViewType> {
    pub fn desc(&self) -> &<ResType as Resource>::Desc {
        &self.desc
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Handle naming the content this reference reads, or (for writable views) produces.
    pub fn handle(&self) -> Handle<ResType> {
        Handle {
            handle: self.handle,
            resource: self.resource,
            version: self.version,
            frame: self.frame,
            desc: self.desc,
            _marker: PhantomData,
        }
    }
}

impl<ResType: Resource, ViewType: ResourceView> Clone for GraphResourceRef<ResType, ViewType> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            resource: self.resource,
            version: self.version,
            frame: self.frame,
            desc: self.desc,
            _marker: PhantomData,
        }
    }
}

/// Which content a pass reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ReadVersion {
    Fixed(u32),
    /// No writer was declared before the read, bind to the last version written in this frame.
    Latest,
}

/// One logical resource as seen by a single frame's graph.
#[derive(Debug)]
pub(crate) struct GraphResource {
    pub(crate) name: String,
    pub(crate) kind: ResourceKind,
    /// `None` if the name is unknown to the resource table (read only, resolves to a placeholder).
    pub(crate) handle: Option<GraphResourceHandle>,
    pub(crate) desc: Option<GraphResourceDesc>,
    pub(crate) class: ResourceClass,
    /// Reads last frame's content of `name`.
    pub(crate) is_history: bool,
    /// `writers[i]` is the pass producing version `i + 1`. Version 0 is the content before this frame.
    pub(crate) writers: Vec<usize>,
    pub(crate) exported: bool,
}

impl GraphResource {
    pub(crate) fn new(name: &str, kind: ResourceKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            handle: None,
            desc: None,
            class: ResourceClass::Retained,
            is_history: false,
            writers: Vec::new(),
            exported: false,
        }
    }

    #[inline]
    pub(crate) fn latest_version(&self) -> u32 {
        self.writers.len() as u32
    }

    /// Pass producing `version`, `None` for the content the resource had before this frame.
    #[inline]
    pub(crate) fn writer_of(&self, version: u32) -> Option<usize> {
        if version == 0 {
            None
        } else {
            self.writers.get(version as usize - 1).copied()
        }
    }

    pub(crate) fn resolve(&self, read: ReadVersion) -> u32 {
        match read {
            ReadVersion::Fixed(version) => version,
            ReadVersion::Latest => self.latest_version(),
        }
    }

    pub(crate) fn display_name(&self) -> String {
        if self.is_history {
            format!("{} (history)", self.name)
        } else {
            self.name.clone()
        }
    }
}
