//! Immutable descriptors of shader-bound values.
//!
//! A [`Token`] pairs a value accessor with the shader-side shape it will be
//! declared as. Tokens are cheap to clone (they share one allocation) and are
//! recreated every time an authoring function rebuilds its template. Nothing in
//! here touches the GPU: construction only validates the backing value against
//! the declared shape.

use std::fmt;
use std::num::NonZeroU32;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{
    BufferTarget, DataType, DrawMode, ElementKind, TextureFilter, TextureFormat, TextureWrap,
    TypedArray, UniformValue,
};

/// Errors raised while constructing tokens.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token shape for {token}: {reason}")]
    InvalidTokenShape { token: String, reason: String },
}

impl TokenError {
    fn shape(token: impl Into<String>, reason: impl Into<String>) -> Self {
        TokenError::InvalidTokenShape {
            token: token.into(),
            reason: reason.into(),
        }
    }
}

/// Process-unique identity of a token; distinguishes tokens that look alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u64);

impl TokenId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TokenId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which declaration namespace a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Attribute,
    Uniform,
    Sampler2D,
    Scope,
}

pub type Accessor<T> = Rc<dyn Fn() -> T>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeOptions {
    /// Explicit shader-side name; falls back to a synthesized one when taken.
    pub name: Option<String>,
    pub target: BufferTarget,
    /// Primitive topology a program should use when its config leaves it open.
    pub mode: Option<DrawMode>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformOptions {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplerOptions {
    pub name: Option<String>,
    /// Texel width; defaults to `len / components` of the pixel data.
    pub width: Option<u32>,
    /// Texel height; defaults to 1.
    pub height: Option<u32>,
    pub format: TextureFormat,
    pub mag_filter: TextureFilter,
    pub min_filter: TextureFilter,
    pub wrap: TextureWrap,
}

/// Something previously rendered that a sampler can read from.
pub trait RenderedSurface {
    /// Raw colour texture name, once allocated.
    fn texture_id(&self) -> Option<NonZeroU32>;
    /// Incremented every time new content is rendered into the surface.
    fn generation(&self) -> u64;
    fn size(&self) -> (u32, u32);
    /// Registers a callback run after each new render into the surface.
    fn on_render(&self, listener: Box<dyn Fn()>);
}

/// Pixel source of a sampler token.
#[derive(Clone)]
pub enum TextureSource {
    Pixels(TypedArray),
    Surface(Rc<dyn RenderedSurface>),
}

impl fmt::Debug for TextureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureSource::Pixels(data) => f
                .debug_tuple("Pixels")
                .field(&data.element_kind())
                .field(&data.len())
                .finish(),
            TextureSource::Surface(surface) => f
                .debug_tuple("Surface")
                .field(&surface.texture_id())
                .finish(),
        }
    }
}

impl From<TypedArray> for TextureSource {
    fn from(data: TypedArray) -> Self {
        TextureSource::Pixels(data)
    }
}

macro_rules! texture_source_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for TextureSource {
                fn from(data: Vec<$ty>) -> Self {
                    TextureSource::Pixels(data.into())
                }
            }

            impl From<Rc<[$ty]>> for TextureSource {
                fn from(data: Rc<[$ty]>) -> Self {
                    TextureSource::Pixels(data.into())
                }
            }
        )*
    };
}

texture_source_from!(f32, i8, i16, i32, u8, u16, u32);

/// Resolved texel layout of a pixel upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureLayout {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub element: ElementKind,
}

pub struct AttributeToken {
    value: Accessor<TypedArray>,
    options: AttributeOptions,
}

impl AttributeToken {
    /// Reads the current backing buffer.
    pub fn value(&self) -> TypedArray {
        (self.value)()
    }

    /// Shared handle to the accessor, for callers that outlive the token.
    pub fn accessor(&self) -> Accessor<TypedArray> {
        self.value.clone()
    }

    pub fn options(&self) -> &AttributeOptions {
        &self.options
    }
}

pub struct UniformToken {
    value: Accessor<UniformValue>,
    options: UniformOptions,
}

impl UniformToken {
    pub fn value(&self) -> UniformValue {
        (self.value)()
    }

    pub fn accessor(&self) -> Accessor<UniformValue> {
        self.value.clone()
    }

    pub fn options(&self) -> &UniformOptions {
        &self.options
    }
}

pub struct Sampler2DToken {
    value: Accessor<TextureSource>,
    options: SamplerOptions,
}

impl Sampler2DToken {
    pub fn value(&self) -> TextureSource {
        (self.value)()
    }

    pub fn accessor(&self) -> Accessor<TextureSource> {
        self.value.clone()
    }

    pub fn options(&self) -> &SamplerOptions {
        &self.options
    }
}

/// Reference to a name declared by another compilation unit.
pub struct ScopedVariableToken {
    name: String,
}

impl ScopedVariableToken {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub enum TokenKind {
    Attribute(AttributeToken),
    Uniform(UniformToken),
    Sampler2D(Sampler2DToken),
    Scope(ScopedVariableToken),
}

struct TokenInner {
    id: TokenId,
    data_type: Option<DataType>,
    kind: TokenKind,
}

/// Shared handle to an immutable token descriptor.
#[derive(Clone)]
pub struct Token(Rc<TokenInner>);

impl Token {
    /// Builds an attribute token backed by a typed buffer accessor.
    ///
    /// The accessor is read once to validate its element type and length
    /// against `data_type`.
    pub fn attribute<F, A>(
        data_type: DataType,
        value: F,
        options: AttributeOptions,
    ) -> Result<Token, TokenError>
    where
        F: Fn() -> A + 'static,
        A: Into<TypedArray>,
    {
        let value: Accessor<TypedArray> = Rc::new(move || value().into());
        check_attribute_data(data_type, options.target, &value())?;
        Ok(Token::from_kind(
            Some(data_type),
            TokenKind::Attribute(AttributeToken { value, options }),
        ))
    }

    /// Builds a uniform token; the accessor's first value must match `data_type`.
    pub fn uniform<F>(
        data_type: DataType,
        value: F,
        options: UniformOptions,
    ) -> Result<Token, TokenError>
    where
        F: Fn() -> UniformValue + 'static,
    {
        if data_type == DataType::Sampler2D {
            return Err(TokenError::shape(
                "sampler2D uniform",
                "samplers are built with Token::sampler2d",
            ));
        }
        check_uniform_value(data_type, &value())?;
        Ok(Token::uniform_unchecked(data_type, Rc::new(value), options))
    }

    pub(crate) fn uniform_unchecked(
        data_type: DataType,
        value: Accessor<UniformValue>,
        options: UniformOptions,
    ) -> Token {
        Token::from_kind(
            Some(data_type),
            TokenKind::Uniform(UniformToken { value, options }),
        )
    }

    /// Builds a sampler2D token backed by pixel data or a rendered surface.
    pub fn sampler2d<F, S>(value: F, options: SamplerOptions) -> Result<Token, TokenError>
    where
        F: Fn() -> S + 'static,
        S: Into<TextureSource>,
    {
        let value: Accessor<TextureSource> = Rc::new(move || value().into());
        if let TextureSource::Pixels(data) = value() {
            texture_layout(&options, &data)?;
        }
        Ok(Token::from_kind(
            Some(DataType::Sampler2D),
            TokenKind::Sampler2D(Sampler2DToken { value, options }),
        ))
    }

    /// Builds a scope token referring to `name` as declared elsewhere.
    pub fn scope(name: impl Into<String>) -> Result<Token, TokenError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(TokenError::shape(
                "scope",
                format!("'{name}' is not a valid GLSL identifier"),
            ));
        }
        Ok(Token::from_kind(
            None,
            TokenKind::Scope(ScopedVariableToken { name }),
        ))
    }

    fn from_kind(data_type: Option<DataType>, kind: TokenKind) -> Token {
        Token(Rc::new(TokenInner {
            id: TokenId::next(),
            data_type,
            kind,
        }))
    }

    /// Returns a new token sharing this one's accessor but requesting `name`.
    ///
    /// The result is a distinct token with its own identity.
    pub fn with_name(&self, name: impl Into<String>) -> Token {
        let name = name.into();
        let kind = match &self.0.kind {
            TokenKind::Attribute(attribute) => TokenKind::Attribute(AttributeToken {
                value: attribute.value.clone(),
                options: AttributeOptions {
                    name: Some(name),
                    ..attribute.options.clone()
                },
            }),
            TokenKind::Uniform(uniform) => TokenKind::Uniform(UniformToken {
                value: uniform.value.clone(),
                options: UniformOptions { name: Some(name) },
            }),
            TokenKind::Sampler2D(sampler) => TokenKind::Sampler2D(Sampler2DToken {
                value: sampler.value.clone(),
                options: SamplerOptions {
                    name: Some(name),
                    ..sampler.options.clone()
                },
            }),
            TokenKind::Scope(_) => TokenKind::Scope(ScopedVariableToken { name }),
        };
        Token::from_kind(self.0.data_type, kind)
    }

    pub fn id(&self) -> TokenId {
        self.0.id
    }

    pub fn kind(&self) -> &TokenKind {
        &self.0.kind
    }

    pub fn token_type(&self) -> TokenType {
        match self.0.kind {
            TokenKind::Attribute(_) => TokenType::Attribute,
            TokenKind::Uniform(_) => TokenType::Uniform,
            TokenKind::Sampler2D(_) => TokenType::Sampler2D,
            TokenKind::Scope(_) => TokenType::Scope,
        }
    }

    /// Declared shader type; `None` for scope tokens.
    pub fn data_type(&self) -> Option<DataType> {
        self.0.data_type
    }

    /// Name requested by the author, if any.
    pub fn explicit_name(&self) -> Option<&str> {
        match &self.0.kind {
            TokenKind::Attribute(attribute) => attribute.options.name.as_deref(),
            TokenKind::Uniform(uniform) => uniform.options.name.as_deref(),
            TokenKind::Sampler2D(sampler) => sampler.options.name.as_deref(),
            TokenKind::Scope(scope) => Some(&scope.name),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.0.id)
            .field("type", &self.token_type())
            .field("data_type", &self.0.data_type)
            .field("name", &self.explicit_name())
            .finish()
    }
}

/// Checks an attribute buffer against its declared type and target.
pub fn check_attribute_data(
    data_type: DataType,
    target: BufferTarget,
    data: &TypedArray,
) -> Result<(), TokenError> {
    let label = format!("{data_type} attribute");
    if target == BufferTarget::ElementArray {
        return match data.element_kind() {
            ElementKind::U8 | ElementKind::U16 | ElementKind::U32 => Ok(()),
            other => Err(TokenError::shape(
                label,
                format!("element-array buffers need unsigned indices, got {other}"),
            )),
        };
    }
    if data_type.is_matrix() || data_type == DataType::Sampler2D {
        return Err(TokenError::shape(
            label,
            "matrices and samplers cannot be vertex attributes",
        ));
    }
    if (data_type.is_integer() || data_type.is_bool()) && !data.element_kind().is_integer() {
        return Err(TokenError::shape(
            label,
            format!("expected an integer buffer, got {}", data.element_kind()),
        ));
    }
    let components = data_type.components();
    if data.len() % components != 0 {
        return Err(TokenError::shape(
            label,
            format!(
                "buffer length {} is not a multiple of {components} components",
                data.len()
            ),
        ));
    }
    Ok(())
}

/// Checks that a uniform value matches its declared type.
pub fn check_uniform_value(data_type: DataType, value: &UniformValue) -> Result<(), TokenError> {
    if value.data_type() == data_type {
        Ok(())
    } else {
        Err(TokenError::shape(
            format!("{data_type} uniform"),
            format!("accessor produced a {} value", value.data_type()),
        ))
    }
}

/// Resolves the texel layout of pixel data for a sampler.
pub fn texture_layout(
    options: &SamplerOptions,
    data: &TypedArray,
) -> Result<TextureLayout, TokenError> {
    let element = data.element_kind();
    match element {
        ElementKind::U8 => {}
        ElementKind::F32 if options.format != TextureFormat::Luminance => {}
        ElementKind::F32 => {
            return Err(TokenError::shape(
                "sampler2D uniform",
                "luminance textures need u8 pixel data",
            ))
        }
        other => {
            return Err(TokenError::shape(
                "sampler2D uniform",
                format!("pixel data must be u8 or f32, got {other}"),
            ))
        }
    }

    let components = options.format.components();
    let texels = data.len() / components;
    if data.len() % components != 0 {
        return Err(TokenError::shape(
            "sampler2D uniform",
            format!(
                "{} values do not split into {components}-component texels",
                data.len()
            ),
        ));
    }
    let height = options.height.unwrap_or(1);
    let width = match options.width {
        Some(width) => width,
        None if height == 0 => 0,
        None => (texels / height as usize) as u32,
    };
    if width as usize * height as usize != texels {
        return Err(TokenError::shape(
            "sampler2D uniform",
            format!("{width}x{height} texels do not match {texels} supplied"),
        ));
    }
    Ok(TextureLayout {
        width,
        height,
        format: options.format,
        element,
    })
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_attribute_rejects_ragged_buffer() {
        let err = Token::attribute(
            DataType::Vec3,
            || vec![0.0_f32; 7],
            AttributeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TokenError::InvalidTokenShape { .. }));
    }

    #[test]
    fn integer_attribute_rejects_float_buffer() {
        assert!(Token::attribute(DataType::IVec2, || vec![0.0_f32; 4], Default::default()).is_err());
        assert!(Token::attribute(DataType::IVec2, || vec![0_i32; 4], Default::default()).is_ok());
        assert!(Token::attribute(DataType::Vec2, || vec![0_i16; 4], Default::default()).is_ok());
    }

    #[test]
    fn matrix_attribute_is_rejected() {
        assert!(Token::attribute(DataType::Mat4, || vec![0.0_f32; 16], Default::default()).is_err());
    }

    #[test]
    fn uniform_value_must_match_declared_type() {
        let err = Token::uniform(DataType::Float, || UniformValue::Bool(true), Default::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid token shape for float uniform: accessor produced a bool value"
        );
        assert!(Token::uniform(DataType::Float, || UniformValue::Float(1.0), Default::default()).is_ok());
    }

    #[test]
    fn sampler_layout_defaults_to_single_row() {
        let options = SamplerOptions::default();
        let layout = texture_layout(&options, &TypedArray::from(vec![0_u8; 16])).unwrap();
        assert_eq!((layout.width, layout.height), (4, 1));
    }

    #[test]
    fn sampler_rejects_unsupported_pixels() {
        assert!(Token::sampler2d(|| vec![0_i32; 4], SamplerOptions::default()).is_err());
        let options = SamplerOptions {
            width: Some(3),
            height: Some(3),
            ..Default::default()
        };
        assert!(Token::sampler2d(|| vec![0_u8; 16], options).is_err());
    }

    #[test]
    fn with_name_mints_a_new_identity() {
        let token = Token::uniform(DataType::Int, || UniformValue::Int(3), Default::default()).unwrap();
        let named = token.with_name("u_count");
        assert_ne!(token.id(), named.id());
        assert_eq!(named.explicit_name(), Some("u_count"));
        assert_eq!(named.data_type(), Some(DataType::Int));
    }

    #[test]
    fn scope_requires_identifier() {
        assert!(Token::scope("v_coord").is_ok());
        assert!(Token::scope("1abc").is_err());
        assert_eq!(Token::scope("v_coord").unwrap().data_type(), None);
    }
}
