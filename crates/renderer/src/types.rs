use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use template::{ElementKind, TextureFilter, TextureFormat, TextureWrap};

macro_rules! gpu_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct $name(pub NonZeroU32);
        )*
    };
}

gpu_handle! {
    /// Linked program object.
    ProgramHandle;
    BufferHandle;
    TextureHandle;
    VertexArrayHandle;
    FramebufferHandle;
    RenderbufferHandle;
}

/// Uniform location as reported by the driver after linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Step of a program build that can fail with compiler diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Vertex,
    Fragment,
    Link,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStage::Vertex => f.write_str("vertex"),
            BuildStage::Fragment => f.write_str("fragment"),
            BuildStage::Link => f.write_str("link"),
        }
    }
}

/// Sized internal formats for textures and renderbuffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InternalFormat {
    R8,
    Rg8,
    Rgb8,
    #[default]
    Rgba8,
    Luminance,
    R16F,
    Rg16F,
    Rgba16F,
    R32F,
    Rg32F,
    Rgb32F,
    Rgba32F,
}

impl InternalFormat {
    pub fn is_float(self) -> bool {
        matches!(
            self,
            InternalFormat::R16F
                | InternalFormat::Rg16F
                | InternalFormat::Rgba16F
                | InternalFormat::R32F
                | InternalFormat::Rg32F
                | InternalFormat::Rgb32F
                | InternalFormat::Rgba32F
        )
    }

    pub fn is_half_float(self) -> bool {
        matches!(
            self,
            InternalFormat::R16F | InternalFormat::Rg16F | InternalFormat::Rgba16F
        )
    }
}

/// Component type of pixel transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PixelType {
    #[default]
    UnsignedByte,
    Float,
}

impl PixelType {
    pub fn byte_size(self) -> usize {
        match self {
            PixelType::UnsignedByte => 1,
            PixelType::Float => 4,
        }
    }
}

/// Element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U8,
    U16,
    U32,
}

impl IndexType {
    pub fn from_element(kind: ElementKind) -> Option<Self> {
        match kind {
            ElementKind::U8 => Some(IndexType::U8),
            ElementKind::U16 => Some(IndexType::U16),
            ElementKind::U32 => Some(IndexType::U32),
            _ => None,
        }
    }
}

/// How one vertex attribute reads its bound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub components: i32,
    pub element: ElementKind,
    /// Integer attributes keep their values unconverted.
    pub integer: bool,
}

impl VertexLayout {
    pub fn stride(&self) -> i32 {
        self.components * self.element.byte_size() as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureImage {
    pub internal: InternalFormat,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pixel_type: PixelType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureParameters {
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    pub wrap: TextureWrap,
}
