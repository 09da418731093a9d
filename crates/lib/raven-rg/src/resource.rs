use raven_rhi::backend::{Buffer, BufferDesc, BufferUsageFlags, Format, Image, ImageDesc, ImageUsageFlags};

use super::graph_resource::GraphResourceDesc;

/// Used this trait to transmute one type to other type.
pub trait TypeEqualTo {
    type Other;

    fn same(v: Self) -> Self::Other;
}

impl<T: Sized> TypeEqualTo for T {
    type Other = T;

    fn same(v: Self) -> Self::Other {
        v
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
}

/// Any outer render resource.
pub trait Resource {
    type Desc: ResourceDesc;

    const KIND: ResourceKind;
}

impl Resource for Buffer {
    type Desc = BufferDesc;

    const KIND: ResourceKind = ResourceKind::Buffer;
}

impl Resource for Image {
    type Desc = ImageDesc;

    const KIND: ResourceKind = ResourceKind::Texture;
}

/// Any outer resource description.
pub trait ResourceDesc: Copy + PartialEq + Into<GraphResourceDesc> + std::fmt::Debug {
    type Resource: Resource;

    /// Description of the object a read falls back to when nothing backs the resource.
    fn placeholder() -> Self;

    fn from_graph_desc(desc: &GraphResourceDesc) -> Option<Self>;
}

impl ResourceDesc for BufferDesc {
    type Resource = Buffer;

    fn placeholder() -> Self {
        BufferDesc::new_gpu_only(
            256,
            BufferUsageFlags::STORAGE | BufferUsageFlags::UNIFORM | BufferUsageFlags::TRANSFER_DST,
        )
    }

    fn from_graph_desc(desc: &GraphResourceDesc) -> Option<Self> {
        match desc {
            GraphResourceDesc::Buffer(desc) => Some(*desc),
            GraphResourceDesc::Image(_) => None,
        }
    }
}

impl ResourceDesc for ImageDesc {
    type Resource = Image;

    fn placeholder() -> Self {
        ImageDesc::new_2d([1, 1], Format::R8G8B8A8Unorm)
            .usage_flags(ImageUsageFlags::SAMPLED | ImageUsageFlags::STORAGE | ImageUsageFlags::TRANSFER_DST)
    }

    fn from_graph_desc(desc: &GraphResourceDesc) -> Option<Self> {
        match desc {
            GraphResourceDesc::Image(desc) => Some(*desc),
            GraphResourceDesc::Buffer(_) => None,
        }
    }
}

impl From<ImageDesc> for GraphResourceDesc {
    fn from(desc: ImageDesc) -> Self {
        GraphResourceDesc::Image(desc)
    }
}

impl From<BufferDesc> for GraphResourceDesc {
    fn from(desc: BufferDesc) -> Self {
        GraphResourceDesc::Buffer(desc)
    }
}

/// Shader Resource View.
pub struct SRV;
/// Unordered Access View.
pub struct UAV;
/// Render Target.
pub struct RT;

/// Used as compiled time marker to determine a resource's view type.
pub trait ResourceView {
    const IS_WRITABLE: bool;
}

impl ResourceView for SRV {
    const IS_WRITABLE: bool = false;
}

impl ResourceView for UAV {
    const IS_WRITABLE: bool = true;
}

impl ResourceView for RT {
    const IS_WRITABLE: bool = true;
}
