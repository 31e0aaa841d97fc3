//! Resource binding, program management and frame composition for compiled
//! GLSL templates.
//!
//! The flow from a template pair to pixels on screen:
//!
//! ```text
//!   ShaderTemplate ──compile()──▶ CompiledShader (source + named tokens)
//!          │                              │
//!          │ TemplateId                   │ BindShader::bind
//!          ▼                              ▼
//!   ProgramManager ──link / cache──▶ Program ──▶ UpdateQueue (one slot per input)
//!                                         │
//!   Stack::render ──▶ RenderTexture layers ──▶ Program::render ──▶ draw call
//! ```
//!
//! Every GPU call goes through [`GraphicsContext`]. The `glow` feature
//! provides [`GlowContext`] over a live OpenGL ES 3 context, and
//! [`HeadlessContext`] records calls for tests and offline replay.

mod bind;
mod compute;
mod context;
mod error;
#[cfg(feature = "glow")]
mod glow_backend;
mod headless;
mod program;
mod stack;
mod texture;
mod types;
mod uniforms;

pub use bind::{
    BindShader, BindingSlot, MissingBinding, MissingReason, ProgramState, RedrawRequest,
    UpdateFn, UpdateQueue,
};
pub use compute::{Computation, ComputeConfig};
pub use context::{GraphicsContext, Surface};
pub use error::{RenderError, Result};
#[cfg(feature = "glow")]
pub use glow_backend::GlowContext;
pub use headless::{CallStats, GlCall, HeadlessContext, HeadlessSurface};
pub use program::{Draw, Program, ProgramConfig, ProgramManager};
pub use stack::{PixelBuffer, ReadConfig, Stack, StackOptions};
pub use texture::{texture_image, RenderTexture};
pub use types::{
    BufferHandle, BuildStage, FramebufferHandle, IndexType, InternalFormat, PixelType,
    ProgramHandle, RenderbufferHandle, ShaderStage, TextureHandle, TextureImage,
    TextureParameters, UniformLocation, VertexArrayHandle, VertexLayout,
};
pub use uniforms::UniformSetter;
