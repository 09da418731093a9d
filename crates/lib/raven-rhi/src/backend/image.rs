use super::{Format, RawHandle};

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ImageUsageFlags: u32 {
        const TRANSFER_SRC             = 1 << 0;
        const TRANSFER_DST             = 1 << 1;
        const SAMPLED                  = 1 << 2;
        const STORAGE                  = 1 << 3;
        const COLOR_ATTACHMENT         = 1 << 4;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 5;
        const INPUT_ATTACHMENT         = 1 << 6;
    }
}

// image type is associated with image view type.
// use this for both types.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ImageType {
    Tex1d = 0,
    Tex1dArray = 1,
    Tex2d = 2,
    Tex2dArray = 3,
    Tex3d = 4,
    Cube = 5,
    CubeArray = 6,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum SampleCount {
    Type1 = 1,
    Type2 = 2,
    Type4 = 4,
    Type8 = 8,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct ImageDesc {
    pub extent: [u32; 3],
    pub image_type: ImageType,
    pub usage: ImageUsageFlags,
    pub format: Format,
    pub sample: SampleCount,
    pub array_elements: u32,
    pub mip_levels: u16,
}

impl Default for ImageDesc {
    fn default() -> Self {
        Self {
            extent: [0, 0, 0],
            image_type: ImageType::Tex2d,
            usage: ImageUsageFlags::empty(),
            format: Format::R8G8B8A8Unorm,
            sample: SampleCount::Type1,
            array_elements: 1,
            mip_levels: 1,
        }
    }
}

impl ImageDesc {
    pub fn new_1d(extent: u32, format: Format) -> Self {
        Self {
            extent: [extent, 1, 1],
            format,
            image_type: ImageType::Tex1d,
            ..Default::default()
        }
    }

    pub fn new_2d(extent: [u32; 2], format: Format) -> Self {
        Self {
            extent: [extent[0], extent[1], 1],
            format,
            image_type: ImageType::Tex2d,
            ..Default::default()
        }
    }

    pub fn new_2d_array(extent: [u32; 2], format: Format, array_elements: u32) -> Self {
        Self::new_2d(extent, format).array_elements(array_elements).image_type(ImageType::Tex2dArray)
    }

    pub fn new_3d(extent: [u32; 3], format: Format) -> Self {
        Self {
            extent,
            format,
            image_type: ImageType::Tex3d,
            ..Default::default()
        }
    }

    pub fn new_cube(extent: u32, format: Format) -> Self {
        Self {
            extent: [extent, extent, 1],
            format,
            image_type: ImageType::Cube,
            ..Default::default()
        }.array_elements(6)
    }

    #[inline]
    pub fn array_elements(mut self, num: u32) -> Self {
        self.array_elements = num;
        self
    }

    #[inline]
    pub fn usage_flags(mut self, flags: ImageUsageFlags) -> Self {
        self.usage = flags;
        self
    }

    #[inline]
    pub fn image_type(mut self, image_type: ImageType) -> Self {
        self.image_type = image_type;
        self
    }

    #[inline]
    pub fn mip_levels(mut self, mip_levels: u16) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Full mip chain down to 1x1.
    #[inline]
    pub fn all_mip_levels(self) -> Self {
        let max_extent = self.extent[0].max(self.extent[1]).max(self.extent[2]).max(1);
        let levels = 32 - max_extent.leading_zeros();
        self.mip_levels(levels as u16)
    }

    #[inline]
    pub fn extent_2d(&self) -> [u32; 2] {
        [self.extent[0], self.extent[1]]
    }

    /// Rough memory footprint, summed over every mip and layer.
    pub fn estimate_memory(&self) -> u64 {
        let bpp = self.format.bytes_per_pixel() as u64;
        let samples = self.sample as u64;
        let mut total = 0u64;

        for mip in 0..self.mip_levels.max(1) as u32 {
            let w = (self.extent[0] >> mip).max(1) as u64;
            let h = (self.extent[1] >> mip).max(1) as u64;
            let d = (self.extent[2] >> mip).max(1) as u64;
            total += w * h * d * bpp * samples;
        }

        total * self.array_elements.max(1) as u64
    }
}

/// Image object created by a [`RenderDevice`](super::RenderDevice).
#[derive(Debug)]
pub struct Image {
    pub raw: RawHandle,
    pub desc: ImageDesc,
    pub name: String,
}
