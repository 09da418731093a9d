use super::{Buffer, Image};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PipelineStageFlags: u32 {
        const TOP_OF_PIPE             = 1 << 0;
        const DRAW_INDIRECT           = 1 << 1;
        const VERTEX_INPUT            = 1 << 2;
        const VERTEX_SHADER           = 1 << 3;
        const FRAGMENT_SHADER         = 1 << 4;
        const EARLY_FRAGMENT_TESTS    = 1 << 5;
        const LATE_FRAGMENT_TESTS     = 1 << 6;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 7;
        const COMPUTE_SHADER          = 1 << 8;
        const TRANSFER                = 1 << 9;
        const BOTTOM_OF_PIPE          = 1 << 10;
        const HOST                    = 1 << 11;
        const ACCELERATION_STRUCTURE_BUILD = 1 << 12;
        const RAY_TRACING_SHADER      = 1 << 13;
        const ALL_COMMANDS            = 1 << 14;
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const INDIRECT_COMMAND_READ          = 1 << 0;
        const INDEX_READ                     = 1 << 1;
        const VERTEX_ATTRIBUTE_READ          = 1 << 2;
        const UNIFORM_READ                   = 1 << 3;
        const INPUT_ATTACHMENT_READ          = 1 << 4;
        const SHADER_READ                    = 1 << 5;
        const SHADER_WRITE                   = 1 << 6;
        const COLOR_ATTACHMENT_READ          = 1 << 7;
        const COLOR_ATTACHMENT_WRITE         = 1 << 8;
        const DEPTH_STENCIL_ATTACHMENT_READ  = 1 << 9;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 10;
        const TRANSFER_READ                  = 1 << 11;
        const TRANSFER_WRITE                 = 1 << 12;
        const HOST_READ                      = 1 << 13;
        const HOST_WRITE                     = 1 << 14;
        const MEMORY_READ                    = 1 << 15;
        const MEMORY_WRITE                   = 1 << 16;
        const ACCELERATION_STRUCTURE_READ    = 1 << 17;
        const ACCELERATION_STRUCTURE_WRITE   = 1 << 18;

        const ANY_WRITE = Self::SHADER_WRITE.bits()
            | Self::COLOR_ATTACHMENT_WRITE.bits()
            | Self::DEPTH_STENCIL_ATTACHMENT_WRITE.bits()
            | Self::TRANSFER_WRITE.bits()
            | Self::HOST_WRITE.bits()
            | Self::MEMORY_WRITE.bits()
            | Self::ACCELERATION_STRUCTURE_WRITE.bits();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    PresentSrc,
}

/// How a pass touches a resource.
///
/// One value names the pipeline stage, the memory access and (for images) the layout at once,
/// so a pass only declares "what it does" and the graph derives the synchronization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessType {
    Nothing,

    // read only accesses
    IndirectBuffer,
    IndexBuffer,
    VertexBuffer,
    VertexShaderReadUniformBuffer,
    VertexShaderReadSampledImageOrUniformTexelBuffer,
    VertexShaderReadOther,
    FragmentShaderReadUniformBuffer,
    FragmentShaderReadSampledImageOrUniformTexelBuffer,
    FragmentShaderReadColorInputAttachment,
    FragmentShaderReadDepthStencilInputAttachment,
    FragmentShaderReadOther,
    ColorAttachmentRead,
    DepthStencilAttachmentRead,
    ComputeShaderReadUniformBuffer,
    ComputeShaderReadSampledImageOrUniformTexelBuffer,
    ComputeShaderReadOther,
    AnyShaderReadUniformBuffer,
    AnyShaderReadSampledImageOrUniformTexelBuffer,
    AnyShaderReadOther,
    TransferRead,
    HostRead,
    Present,
    AccelerationStructureBuildRead,
    RayTracingShaderReadSampledImage,
    RayTracingShaderReadOther,

    // write only accesses
    VertexShaderWrite,
    FragmentShaderWrite,
    ColorAttachmentWrite,
    DepthStencilAttachmentWrite,
    ComputeShaderWrite,
    AnyShaderWrite,
    TransferWrite,
    HostWrite,
    AccelerationStructureBuildWrite,

    // read and write at once
    ColorAttachmentReadWrite,
    General,
}

pub struct AccessInfo {
    pub stage_mask: PipelineStageFlags,
    pub access_mask: AccessFlags,
    pub image_layout: ImageLayout,
}

const fn info(stage_mask: PipelineStageFlags, access_mask: AccessFlags, image_layout: ImageLayout) -> AccessInfo {
    AccessInfo { stage_mask, access_mask, image_layout }
}

pub fn get_access_info(access_type: AccessType) -> AccessInfo {
    use AccessType::*;
    type S = PipelineStageFlags;
    type A = AccessFlags;
    type L = ImageLayout;

    let depth_tests = S::EARLY_FRAGMENT_TESTS.union(S::LATE_FRAGMENT_TESTS);

    match access_type {
        Nothing => info(S::empty(), A::empty(), L::Undefined),

        IndirectBuffer => info(S::DRAW_INDIRECT, A::INDIRECT_COMMAND_READ, L::Undefined),
        IndexBuffer => info(S::VERTEX_INPUT, A::INDEX_READ, L::Undefined),
        VertexBuffer => info(S::VERTEX_INPUT, A::VERTEX_ATTRIBUTE_READ, L::Undefined),
        VertexShaderReadUniformBuffer => info(S::VERTEX_SHADER, A::UNIFORM_READ, L::Undefined),
        VertexShaderReadSampledImageOrUniformTexelBuffer => info(S::VERTEX_SHADER, A::SHADER_READ, L::ShaderReadOnlyOptimal),
        VertexShaderReadOther => info(S::VERTEX_SHADER, A::SHADER_READ, L::General),
        FragmentShaderReadUniformBuffer => info(S::FRAGMENT_SHADER, A::UNIFORM_READ, L::Undefined),
        FragmentShaderReadSampledImageOrUniformTexelBuffer => info(S::FRAGMENT_SHADER, A::SHADER_READ, L::ShaderReadOnlyOptimal),
        FragmentShaderReadColorInputAttachment => info(S::FRAGMENT_SHADER, A::INPUT_ATTACHMENT_READ, L::ShaderReadOnlyOptimal),
        FragmentShaderReadDepthStencilInputAttachment => info(S::FRAGMENT_SHADER, A::INPUT_ATTACHMENT_READ, L::DepthStencilReadOnlyOptimal),
        FragmentShaderReadOther => info(S::FRAGMENT_SHADER, A::SHADER_READ, L::General),
        ColorAttachmentRead => info(S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_READ, L::ColorAttachmentOptimal),
        DepthStencilAttachmentRead => info(depth_tests, A::DEPTH_STENCIL_ATTACHMENT_READ, L::DepthStencilReadOnlyOptimal),
        ComputeShaderReadUniformBuffer => info(S::COMPUTE_SHADER, A::UNIFORM_READ, L::Undefined),
        ComputeShaderReadSampledImageOrUniformTexelBuffer => info(S::COMPUTE_SHADER, A::SHADER_READ, L::ShaderReadOnlyOptimal),
        ComputeShaderReadOther => info(S::COMPUTE_SHADER, A::SHADER_READ, L::General),
        AnyShaderReadUniformBuffer => info(S::ALL_COMMANDS, A::UNIFORM_READ, L::Undefined),
        AnyShaderReadSampledImageOrUniformTexelBuffer => info(S::ALL_COMMANDS, A::SHADER_READ, L::ShaderReadOnlyOptimal),
        AnyShaderReadOther => info(S::ALL_COMMANDS, A::SHADER_READ, L::General),
        TransferRead => info(S::TRANSFER, A::TRANSFER_READ, L::TransferSrcOptimal),
        HostRead => info(S::HOST, A::HOST_READ, L::General),
        Present => info(S::empty(), A::empty(), L::PresentSrc),
        AccelerationStructureBuildRead => info(S::ACCELERATION_STRUCTURE_BUILD, A::ACCELERATION_STRUCTURE_READ, L::Undefined),
        RayTracingShaderReadSampledImage => info(S::RAY_TRACING_SHADER, A::SHADER_READ, L::ShaderReadOnlyOptimal),
        RayTracingShaderReadOther => info(S::RAY_TRACING_SHADER, A::SHADER_READ, L::General),

        VertexShaderWrite => info(S::VERTEX_SHADER, A::SHADER_WRITE, L::General),
        FragmentShaderWrite => info(S::FRAGMENT_SHADER, A::SHADER_WRITE, L::General),
        ColorAttachmentWrite => info(S::COLOR_ATTACHMENT_OUTPUT, A::COLOR_ATTACHMENT_WRITE, L::ColorAttachmentOptimal),
        DepthStencilAttachmentWrite => info(depth_tests, A::DEPTH_STENCIL_ATTACHMENT_WRITE, L::DepthStencilAttachmentOptimal),
        ComputeShaderWrite => info(S::COMPUTE_SHADER, A::SHADER_WRITE, L::General),
        AnyShaderWrite => info(S::ALL_COMMANDS, A::SHADER_WRITE, L::General),
        TransferWrite => info(S::TRANSFER, A::TRANSFER_WRITE, L::TransferDstOptimal),
        HostWrite => info(S::HOST, A::HOST_WRITE, L::General),
        AccelerationStructureBuildWrite => info(S::ACCELERATION_STRUCTURE_BUILD, A::ACCELERATION_STRUCTURE_WRITE, L::Undefined),

        ColorAttachmentReadWrite => info(
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_READ.union(A::COLOR_ATTACHMENT_WRITE),
            L::ColorAttachmentOptimal,
        ),
        General => info(S::ALL_COMMANDS, A::MEMORY_READ.union(A::MEMORY_WRITE), L::General),
    }
}

#[inline]
pub fn is_write_access(access: &AccessType) -> bool {
    get_access_info(*access).access_mask.intersects(AccessFlags::ANY_WRITE)
}

#[inline]
pub fn is_read_only_access(access: &AccessType) -> bool {
    !matches!(access, AccessType::Nothing) && !is_write_access(access)
}

#[inline]
pub fn is_write_only_access(access: &AccessType) -> bool {
    let mask = get_access_info(*access).access_mask;
    mask.intersects(AccessFlags::ANY_WRITE) && (mask - AccessFlags::ANY_WRITE).is_empty()
}

#[inline]
pub fn is_raster_access(access: &AccessType) -> bool {
    use AccessType::*;
    matches!(
        access,
        ColorAttachmentRead
            | DepthStencilAttachmentRead
            | ColorAttachmentWrite
            | DepthStencilAttachmentWrite
            | ColorAttachmentReadWrite
    )
}

/// The layout an image has to be in for all of these accesses at once.
/// Mixed layouts collapse into `General`.
pub fn image_layout_of(accesses: &[AccessType]) -> ImageLayout {
    let mut layout = None;
    for access in accesses {
        let next = get_access_info(*access).image_layout;
        match layout {
            None => layout = Some(next),
            Some(prev) if prev != next => return ImageLayout::General,
            _ => {}
        }
    }
    layout.unwrap_or(ImageLayout::Undefined)
}

/// Decide whether going from `prev` to `next` needs a barrier at all.
///
/// Read after read in the same layout never does. Anything involving a write does,
/// even when the access is identical (write after write on the same storage image still races).
pub fn needs_barrier(prev: &[AccessType], next: &[AccessType], is_image: bool) -> bool {
    if next.is_empty() {
        return false;
    }

    if prev.iter().chain(next.iter()).any(is_write_access) {
        return true;
    }

    if is_image {
        image_layout_of(prev) != image_layout_of(next)
    } else {
        false
    }
}

pub struct ImageBarrier<'a> {
    pub image: &'a Image,
    pub prev_access: &'a [AccessType],
    pub next_access: &'a [AccessType],
    /// Content does not need to survive the transition (e.g. freshly created or aliased).
    pub discard_contents: bool,
}

pub struct BufferBarrier<'a> {
    pub buffer: &'a Buffer,
    pub prev_access: &'a [AccessType],
    pub next_access: &'a [AccessType],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_classification() {
        assert!(is_read_only_access(&AccessType::ComputeShaderReadOther));
        assert!(!is_read_only_access(&AccessType::Nothing));
        assert!(is_write_only_access(&AccessType::ColorAttachmentWrite));
        assert!(!is_write_only_access(&AccessType::General));
        assert!(is_write_access(&AccessType::General));
        assert!(is_raster_access(&AccessType::DepthStencilAttachmentWrite));
    }

    #[test]
    fn same_read_needs_no_barrier() {
        let read = [AccessType::FragmentShaderReadSampledImageOrUniformTexelBuffer];
        assert!(!needs_barrier(&read, &read, true));
        assert!(!needs_barrier(&read, &[AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer], true));
    }

    #[test]
    fn layout_change_needs_barrier_only_for_images() {
        let prev = [AccessType::ComputeShaderReadOther];
        let next = [AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer];
        assert!(needs_barrier(&prev, &next, true));
        assert!(!needs_barrier(&prev, &next, false));
    }

    #[test]
    fn writes_always_need_barrier() {
        let write = [AccessType::ComputeShaderWrite];
        assert!(needs_barrier(&write, &write, false));
        assert!(needs_barrier(&[AccessType::ComputeShaderReadOther], &write, false));
        assert!(needs_barrier(&write, &[AccessType::ComputeShaderReadOther], false));
    }

    #[test]
    fn mixed_layouts_collapse_to_general() {
        let accesses = [AccessType::ComputeShaderReadSampledImageOrUniformTexelBuffer, AccessType::ComputeShaderWrite];
        assert_eq!(image_layout_of(&accesses), ImageLayout::General);
        assert_eq!(image_layout_of(&[]), ImageLayout::Undefined);
    }
}
