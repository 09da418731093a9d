/// Texel formats the frame graph knows how to size and clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Undefined,
    R8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    R16Sfloat,
    R16G16Sfloat,
    R16G16B16A16Sfloat,
    R32Uint,
    R32Sfloat,
    R32G32Sfloat,
    R32G32B32A32Sfloat,
    B10G11R11UfloatPack32,
    A2B10G10R10UnormPack32,
    D16Unorm,
    D24UnormS8Uint,
    D32Sfloat,
    D32SfloatS8Uint,
}

impl Default for Format {
    fn default() -> Self {
        Format::Undefined
    }
}

impl Format {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            Format::Undefined => 0,
            Format::R8Unorm => 1,
            Format::R16Sfloat | Format::D16Unorm => 2,
            Format::R8G8B8A8Unorm
            | Format::R8G8B8A8Srgb
            | Format::B8G8R8A8Unorm
            | Format::R16G16Sfloat
            | Format::R32Uint
            | Format::R32Sfloat
            | Format::B10G11R11UfloatPack32
            | Format::A2B10G10R10UnormPack32
            | Format::D24UnormS8Uint
            | Format::D32Sfloat => 4,
            Format::D32SfloatS8Uint => 5,
            Format::R16G16B16A16Sfloat | Format::R32G32Sfloat => 8,
            Format::R32G32B32A32Sfloat => 16,
        }
    }

    #[inline]
    pub fn is_depth(&self) -> bool {
        matches!(self, Format::D16Unorm | Format::D24UnormS8Uint | Format::D32Sfloat | Format::D32SfloatS8Uint)
    }

    #[inline]
    pub fn has_stencil(&self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32SfloatS8Uint)
    }
}
