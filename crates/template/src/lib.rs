//! Shader templates whose interpolated slots are live values.
//!
//! An author interleaves GLSL text with [`Token`]s (attributes, uniforms,
//! samplers and scope references). Compiling the resulting [`ShaderTemplate`]
//! names every token, declares the shader inputs right after the version and
//! precision preamble and returns a [`CompiledShader`] the renderer can bind:
//!
//! ```text
//!   glsl!(text, token, text, …) ──▶ ShaderTemplate ──▶ compile() ──▶ CompiledShader
//!                                      │ TemplateId                    │ source + named tokens
//!                                      ▼                               ▼
//!                              program cache key               renderer::bind
//! ```
//!
//! Nothing in this crate touches a graphics context. Token construction only
//! validates that the backing value fits the declared shader type.

mod compile;
mod constructors;
mod template;
mod token;
mod types;

pub use compile::{CompiledShader, NamedToken};
pub use constructors::{attribute, uniform};
pub use template::{Part, ShaderTemplate, Slot, TemplateBuilder, TemplateId};
pub use token::{
    check_attribute_data, check_uniform_value, texture_layout, Accessor, AttributeOptions,
    AttributeToken, RenderedSurface, Sampler2DToken, SamplerOptions, ScopedVariableToken,
    TextureLayout, TextureSource, Token, TokenError, TokenId, TokenKind, TokenType,
    UniformOptions, UniformToken,
};
pub use types::{
    BufferTarget, DataType, DrawMode, ElementKind, TextureFilter, TextureFormat, TextureWrap,
    TypedArray, UniformValue,
};

/// Builds a [`ShaderTemplate`] from alternating text and slots.
///
/// Each expansion site owns one [`TemplateId`], minted on first evaluation and
/// reused afterwards, so re-running the same authoring code yields templates
/// that hit the same compiled program.
///
/// ```
/// use template::{glsl, uniform};
///
/// let time = uniform::float(|| 0.25);
/// let shader = glsl!(
///     "#version 300 es\nprecision highp float;\nout vec4 color;\n",
///     "void main() { color = vec4(", time, "); }",
/// );
/// assert!(shader.compile().source().contains("uniform float u_0;"));
/// ```
#[macro_export]
macro_rules! glsl {
    ($($part:expr),* $(,)?) => {{
        static SITE: ::std::sync::OnceLock<$crate::TemplateId> = ::std::sync::OnceLock::new();
        let builder = $crate::ShaderTemplate::builder(*SITE.get_or_init($crate::TemplateId::next));
        $(let builder = builder.push($part);)*
        builder.build()
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shader(scale: f32) -> ShaderTemplate {
        glsl!("void main() { float s = ", uniform::float(move || scale), "; }")
    }

    #[test]
    fn same_site_reuses_identity() {
        assert_eq!(shader(1.0).id(), shader(2.0).id());
    }

    #[test]
    fn distinct_sites_get_distinct_identities() {
        let a = glsl!("void main() {}");
        let b = glsl!("void main() {}");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.compile().source(), b.compile().source());
    }
}
