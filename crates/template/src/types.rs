use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Shader primitive kinds a token can be declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Float,
    Int,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    IVec2,
    IVec3,
    IVec4,
    BVec2,
    BVec3,
    BVec4,
    Mat2,
    Mat3,
    Mat4,
    Sampler2D,
}

impl DataType {
    /// GLSL spelling used in declarations.
    pub fn glsl_name(self) -> &'static str {
        match self {
            DataType::Float => "float",
            DataType::Int => "int",
            DataType::Bool => "bool",
            DataType::Vec2 => "vec2",
            DataType::Vec3 => "vec3",
            DataType::Vec4 => "vec4",
            DataType::IVec2 => "ivec2",
            DataType::IVec3 => "ivec3",
            DataType::IVec4 => "ivec4",
            DataType::BVec2 => "bvec2",
            DataType::BVec3 => "bvec3",
            DataType::BVec4 => "bvec4",
            DataType::Mat2 => "mat2",
            DataType::Mat3 => "mat3",
            DataType::Mat4 => "mat4",
            DataType::Sampler2D => "sampler2D",
        }
    }

    /// Number of scalar components one value of this type occupies.
    pub fn components(self) -> usize {
        match self {
            DataType::Float | DataType::Int | DataType::Bool | DataType::Sampler2D => 1,
            DataType::Vec2 | DataType::IVec2 | DataType::BVec2 => 2,
            DataType::Vec3 | DataType::IVec3 | DataType::BVec3 => 3,
            DataType::Vec4 | DataType::IVec4 | DataType::BVec4 | DataType::Mat2 => 4,
            DataType::Mat3 => 9,
            DataType::Mat4 => 16,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::IVec2 | DataType::IVec3 | DataType::IVec4
        )
    }

    pub fn is_bool(self) -> bool {
        matches!(
            self,
            DataType::Bool | DataType::BVec2 | DataType::BVec3 | DataType::BVec4
        )
    }

    pub fn is_matrix(self) -> bool {
        matches!(self, DataType::Mat2 | DataType::Mat3 | DataType::Mat4)
    }

    /// Matrix dimension (2, 3 or 4) for matrix types.
    pub fn matrix_dimension(self) -> Option<usize> {
        match self {
            DataType::Mat2 => Some(2),
            DataType::Mat3 => Some(3),
            DataType::Mat4 => Some(4),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glsl_name())
    }
}

/// Element type of a [`TypedArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    F32,
    I8,
    I16,
    I32,
    U8,
    U16,
    U32,
}

impl ElementKind {
    pub fn byte_size(self) -> usize {
        match self {
            ElementKind::I8 | ElementKind::U8 => 1,
            ElementKind::I16 | ElementKind::U16 => 2,
            ElementKind::F32 | ElementKind::I32 | ElementKind::U32 => 4,
        }
    }

    pub fn is_integer(self) -> bool {
        !matches!(self, ElementKind::F32)
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::F32 => "f32",
            ElementKind::I8 => "i8",
            ElementKind::I16 => "i16",
            ElementKind::I32 => "i32",
            ElementKind::U8 => "u8",
            ElementKind::U16 => "u16",
            ElementKind::U32 => "u32",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference-counted host buffer backing attributes and textures.
///
/// Cloning is cheap and keeps the same allocation, which is what the binder
/// compares against to decide whether an upload is needed. Producing a new
/// buffer (even with identical contents) counts as a change.
#[derive(Debug, Clone)]
pub enum TypedArray {
    F32(Rc<[f32]>),
    I8(Rc<[i8]>),
    I16(Rc<[i16]>),
    I32(Rc<[i32]>),
    U8(Rc<[u8]>),
    U16(Rc<[u16]>),
    U32(Rc<[u32]>),
}

impl TypedArray {
    pub fn len(&self) -> usize {
        match self {
            TypedArray::F32(data) => data.len(),
            TypedArray::I8(data) => data.len(),
            TypedArray::I16(data) => data.len(),
            TypedArray::I32(data) => data.len(),
            TypedArray::U8(data) => data.len(),
            TypedArray::U16(data) => data.len(),
            TypedArray::U32(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_kind(&self) -> ElementKind {
        match self {
            TypedArray::F32(_) => ElementKind::F32,
            TypedArray::I8(_) => ElementKind::I8,
            TypedArray::I16(_) => ElementKind::I16,
            TypedArray::I32(_) => ElementKind::I32,
            TypedArray::U8(_) => ElementKind::U8,
            TypedArray::U16(_) => ElementKind::U16,
            TypedArray::U32(_) => ElementKind::U32,
        }
    }

    /// Raw bytes in native endianness, ready for a buffer or texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            TypedArray::F32(data) => bytemuck::cast_slice(data),
            TypedArray::I8(data) => bytemuck::cast_slice(data),
            TypedArray::I16(data) => bytemuck::cast_slice(data),
            TypedArray::I32(data) => bytemuck::cast_slice(data),
            TypedArray::U8(data) => data,
            TypedArray::U16(data) => bytemuck::cast_slice(data),
            TypedArray::U32(data) => bytemuck::cast_slice(data),
        }
    }

    /// Reference identity: true only when both point at the same allocation.
    pub fn same_buffer(&self, other: &TypedArray) -> bool {
        match (self, other) {
            (TypedArray::F32(a), TypedArray::F32(b)) => Rc::ptr_eq(a, b),
            (TypedArray::I8(a), TypedArray::I8(b)) => Rc::ptr_eq(a, b),
            (TypedArray::I16(a), TypedArray::I16(b)) => Rc::ptr_eq(a, b),
            (TypedArray::I32(a), TypedArray::I32(b)) => Rc::ptr_eq(a, b),
            (TypedArray::U8(a), TypedArray::U8(b)) => Rc::ptr_eq(a, b),
            (TypedArray::U16(a), TypedArray::U16(b)) => Rc::ptr_eq(a, b),
            (TypedArray::U32(a), TypedArray::U32(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

macro_rules! typed_array_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Rc<[$ty]>> for TypedArray {
                fn from(data: Rc<[$ty]>) -> Self {
                    TypedArray::$variant(data)
                }
            }

            impl From<Vec<$ty>> for TypedArray {
                fn from(data: Vec<$ty>) -> Self {
                    TypedArray::$variant(data.into())
                }
            }

            impl From<&[$ty]> for TypedArray {
                fn from(data: &[$ty]) -> Self {
                    TypedArray::$variant(data.into())
                }
            }
        )*
    };
}

typed_array_from! {
    f32 => F32,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    u8 => U8,
    u16 => U16,
    u32 => U32,
}

/// Host-side value of a uniform token.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    IVec2([i32; 2]),
    IVec3([i32; 3]),
    IVec4([i32; 4]),
    BVec2([bool; 2]),
    BVec3([bool; 3]),
    BVec4([bool; 4]),
    Mat2([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
}

impl UniformValue {
    pub fn data_type(&self) -> DataType {
        match self {
            UniformValue::Float(_) => DataType::Float,
            UniformValue::Int(_) => DataType::Int,
            UniformValue::Bool(_) => DataType::Bool,
            UniformValue::Vec2(_) => DataType::Vec2,
            UniformValue::Vec3(_) => DataType::Vec3,
            UniformValue::Vec4(_) => DataType::Vec4,
            UniformValue::IVec2(_) => DataType::IVec2,
            UniformValue::IVec3(_) => DataType::IVec3,
            UniformValue::IVec4(_) => DataType::IVec4,
            UniformValue::BVec2(_) => DataType::BVec2,
            UniformValue::BVec3(_) => DataType::BVec3,
            UniformValue::BVec4(_) => DataType::BVec4,
            UniformValue::Mat2(_) => DataType::Mat2,
            UniformValue::Mat3(_) => DataType::Mat3,
            UniformValue::Mat4(_) => DataType::Mat4,
        }
    }

    /// Float payload for float, vector and matrix values.
    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            UniformValue::Float(value) => Some(std::slice::from_ref(value)),
            UniformValue::Vec2(value) => Some(&value[..]),
            UniformValue::Vec3(value) => Some(&value[..]),
            UniformValue::Vec4(value) | UniformValue::Mat2(value) => Some(&value[..]),
            UniformValue::Mat3(value) => Some(&value[..]),
            UniformValue::Mat4(value) => Some(&value[..]),
            _ => None,
        }
    }

    /// Integer payload for int and bool values; bools become 0/1.
    pub fn to_ints(&self) -> Option<Vec<i32>> {
        let ints = match self {
            UniformValue::Int(value) => vec![*value],
            UniformValue::IVec2(value) => value.to_vec(),
            UniformValue::IVec3(value) => value.to_vec(),
            UniformValue::IVec4(value) => value.to_vec(),
            UniformValue::Bool(value) => vec![i32::from(*value)],
            UniformValue::BVec2(value) => value.iter().map(|b| i32::from(*b)).collect(),
            UniformValue::BVec3(value) => value.iter().map(|b| i32::from(*b)).collect(),
            UniformValue::BVec4(value) => value.iter().map(|b| i32::from(*b)).collect(),
            _ => return None,
        };
        Some(ints)
    }
}

/// Primitive topology of a draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// Buffer binding point an attribute token uploads into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferTarget {
    /// Per-vertex data read through a vertex attribute pointer.
    #[default]
    Array,
    /// Index data feeding an indexed draw.
    ElementArray,
}

/// Channel layout of texture and readback pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFormat {
    Red,
    Rg,
    Rgb,
    #[default]
    Rgba,
    Luminance,
}

impl TextureFormat {
    pub fn components(self) -> usize {
        match self {
            TextureFormat::Red | TextureFormat::Luminance => 1,
            TextureFormat::Rg => 2,
            TextureFormat::Rgb => 3,
            TextureFormat::Rgba => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextureWrap {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_buffer_tracks_allocation_not_contents() {
        let data: Rc<[f32]> = vec![1.0, 2.0].into();
        let a = TypedArray::from(data.clone());
        let b = TypedArray::from(data);
        let c = TypedArray::from(vec![1.0_f32, 2.0]);
        assert!(a.same_buffer(&b));
        assert!(!a.same_buffer(&c));
    }

    #[test]
    fn bytes_cover_every_element() {
        let array = TypedArray::from(vec![1_u16, 2, 3]);
        assert_eq!(array.as_bytes().len(), 6);
        assert_eq!(array.element_kind().byte_size(), 2);
    }

    #[test]
    fn bool_uniforms_flatten_to_ints() {
        let value = UniformValue::BVec3([true, false, true]);
        assert_eq!(value.to_ints(), Some(vec![1, 0, 1]));
        assert!(value.as_floats().is_none());
        assert_eq!(UniformValue::Mat3([0.0; 9]).as_floats().map(<[f32]>::len), Some(9));
    }
}
