//! Per-type token constructors, one function per shader data type.
//!
//! `attribute::vec3(accessor)` reads like the GLSL it produces. Every
//! constructor has a `_with` sibling taking the full options struct.

/// Vertex attribute constructors.
///
/// Attribute buffers are validated on construction, so every constructor is
/// fallible.
pub mod attribute {
    use crate::token::{AttributeOptions, Token, TokenError};
    use crate::types::{BufferTarget, DataType, TypedArray};

    macro_rules! attribute_constructors {
        ($($name:ident, $with:ident => $data_type:expr;)*) => {
            $(
                pub fn $name<F, A>(value: F) -> Result<Token, TokenError>
                where
                    F: Fn() -> A + 'static,
                    A: Into<TypedArray>,
                {
                    Token::attribute($data_type, value, AttributeOptions::default())
                }

                pub fn $with<F, A>(value: F, options: AttributeOptions) -> Result<Token, TokenError>
                where
                    F: Fn() -> A + 'static,
                    A: Into<TypedArray>,
                {
                    Token::attribute($data_type, value, options)
                }
            )*
        };
    }

    attribute_constructors! {
        float, float_with => DataType::Float;
        int, int_with => DataType::Int;
        bool, bool_with => DataType::Bool;
        vec2, vec2_with => DataType::Vec2;
        vec3, vec3_with => DataType::Vec3;
        vec4, vec4_with => DataType::Vec4;
        ivec2, ivec2_with => DataType::IVec2;
        ivec3, ivec3_with => DataType::IVec3;
        ivec4, ivec4_with => DataType::IVec4;
        bvec2, bvec2_with => DataType::BVec2;
        bvec3, bvec3_with => DataType::BVec3;
        bvec4, bvec4_with => DataType::BVec4;
    }

    /// Index buffer feeding an indexed draw instead of a shader input.
    pub fn indices<F, A>(value: F) -> Result<Token, TokenError>
    where
        F: Fn() -> A + 'static,
        A: Into<TypedArray>,
    {
        Token::attribute(
            DataType::Int,
            value,
            AttributeOptions {
                target: BufferTarget::ElementArray,
                ..AttributeOptions::default()
            },
        )
    }
}

/// Uniform and sampler constructors.
///
/// Typed accessors make scalar, vector and matrix uniforms infallible.
pub mod uniform {
    use std::rc::Rc;

    use crate::token::{SamplerOptions, TextureSource, Token, TokenError, UniformOptions};
    use crate::types::{DataType, UniformValue};

    macro_rules! uniform_constructors {
        ($($name:ident, $with:ident: $ty:ty => $variant:ident;)*) => {
            $(
                pub fn $name<F>(value: F) -> Token
                where
                    F: Fn() -> $ty + 'static,
                {
                    $with(value, UniformOptions::default())
                }

                pub fn $with<F>(value: F, options: UniformOptions) -> Token
                where
                    F: Fn() -> $ty + 'static,
                {
                    Token::uniform_unchecked(
                        DataType::$variant,
                        Rc::new(move || UniformValue::$variant(value())),
                        options,
                    )
                }
            )*
        };
    }

    uniform_constructors! {
        float, float_with: f32 => Float;
        int, int_with: i32 => Int;
        bool, bool_with: bool => Bool;
        vec2, vec2_with: [f32; 2] => Vec2;
        vec3, vec3_with: [f32; 3] => Vec3;
        vec4, vec4_with: [f32; 4] => Vec4;
        ivec2, ivec2_with: [i32; 2] => IVec2;
        ivec3, ivec3_with: [i32; 3] => IVec3;
        ivec4, ivec4_with: [i32; 4] => IVec4;
        bvec2, bvec2_with: [bool; 2] => BVec2;
        bvec3, bvec3_with: [bool; 3] => BVec3;
        bvec4, bvec4_with: [bool; 4] => BVec4;
        mat2, mat2_with: [f32; 4] => Mat2;
        mat3, mat3_with: [f32; 9] => Mat3;
        mat4, mat4_with: [f32; 16] => Mat4;
    }

    /// Sampler over pixel data or a rendered surface.
    pub fn sampler2d<F, S>(value: F, options: SamplerOptions) -> Result<Token, TokenError>
    where
        F: Fn() -> S + 'static,
        S: Into<TextureSource>,
    {
        Token::sampler2d(value, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{TokenKind, TokenType};
    use crate::types::{BufferTarget, DataType, UniformValue};

    #[test]
    fn typed_uniform_reads_through_accessor() {
        let token = uniform::vec3(|| [1.0, 2.0, 3.0]);
        assert_eq!(token.data_type(), Some(DataType::Vec3));
        match token.kind() {
            TokenKind::Uniform(uniform) => {
                assert_eq!(uniform.value(), UniformValue::Vec3([1.0, 2.0, 3.0]))
            }
            _ => panic!("expected a uniform token"),
        }
    }

    #[test]
    fn indices_target_the_element_buffer() {
        let token = attribute::indices(|| vec![0_u16, 1, 2]).unwrap();
        assert_eq!(token.token_type(), TokenType::Attribute);
        match token.kind() {
            TokenKind::Attribute(attribute) => {
                assert_eq!(attribute.options().target, BufferTarget::ElementArray)
            }
            _ => panic!("expected an attribute token"),
        }
        assert!(attribute::indices(|| vec![0.0_f32, 1.0]).is_err());
    }

    #[test]
    fn float_attribute_accepts_integer_buffers() {
        assert!(attribute::vec2(|| vec![0_i8, 1, 2, 3]).is_ok());
        assert!(attribute::bvec2(|| vec![0.5_f32, 1.0]).is_err());
    }
}
