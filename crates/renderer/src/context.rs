//! The seam between the binding engine and an actual graphics API.
//!
//! Everything above this trait speaks in opaque handles; the `glow` backend
//! and the recording [`HeadlessContext`](crate::headless::HeadlessContext)
//! implement it. Methods take `&self` because a context is shared by every
//! program, texture and framebuffer created from it.

use std::rc::Rc;

use template::{BufferTarget, DrawMode, TextureFormat};

use crate::error::Result;
use crate::types::{
    BufferHandle, FramebufferHandle, IndexType, InternalFormat, PixelType, ProgramHandle,
    RenderbufferHandle, TextureHandle, TextureImage, TextureParameters, UniformLocation,
    VertexArrayHandle, VertexLayout,
};

pub trait GraphicsContext {
    /// Compiles both stages and links them; diagnostics land in the error.
    fn create_program(&self, vertex: &str, fragment: &str) -> Result<ProgramHandle>;
    fn delete_program(&self, program: ProgramHandle);
    fn use_program(&self, program: Option<ProgramHandle>);
    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;

    fn create_vertex_array(&self) -> Result<VertexArrayHandle>;
    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>);
    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle);

    fn create_buffer(&self) -> Result<BufferHandle>;
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferHandle>);
    /// Replaces the contents of the buffer bound to `target`.
    fn buffer_data(&self, target: BufferTarget, data: &[u8]);
    fn delete_buffer(&self, buffer: BufferHandle);
    /// Enables `location` and points it at the bound array buffer.
    fn vertex_attrib_pointer(&self, location: u32, layout: VertexLayout);

    fn uniform_f32(&self, location: UniformLocation, components: usize, values: &[f32]);
    fn uniform_i32(&self, location: UniformLocation, components: usize, values: &[i32]);
    fn uniform_matrix(&self, location: UniformLocation, dimension: usize, values: &[f32]);

    fn create_texture(&self) -> Result<TextureHandle>;
    fn active_texture(&self, unit: u32);
    fn bind_texture(&self, texture: Option<TextureHandle>);
    fn texture_parameters(&self, parameters: TextureParameters);
    /// Uploads (or with `None`, allocates) the bound texture's level 0.
    fn tex_image_2d(&self, image: TextureImage, pixels: Option<&[u8]>);
    fn delete_texture(&self, texture: TextureHandle);

    fn create_framebuffer(&self) -> Result<FramebufferHandle>;
    fn bind_framebuffer(&self, framebuffer: Option<FramebufferHandle>);
    fn framebuffer_texture(&self, texture: TextureHandle);
    fn create_renderbuffer(&self) -> Result<RenderbufferHandle>;
    fn renderbuffer_storage(
        &self,
        renderbuffer: RenderbufferHandle,
        internal: InternalFormat,
        width: u32,
        height: u32,
    );
    fn framebuffer_renderbuffer(&self, renderbuffer: RenderbufferHandle);
    fn framebuffer_complete(&self) -> bool;
    fn delete_framebuffer(&self, framebuffer: FramebufferHandle);
    fn delete_renderbuffer(&self, renderbuffer: RenderbufferHandle);

    fn viewport(&self, x: i32, y: i32, width: u32, height: u32);
    /// Clears colour and depth with depth testing set to `LEQUAL`.
    fn clear(&self, color: [f32; 4], depth: f32);
    fn draw_arrays(&self, mode: DrawMode, first: i32, count: i32);
    fn draw_elements(&self, mode: DrawMode, count: i32, index_type: IndexType);
    #[allow(clippy::too_many_arguments)]
    fn read_pixels(
        &self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixel_type: PixelType,
        out: &mut [u8],
    );

    /// Returns `false` when the extension is not available.
    fn enable_extension(&self, name: &str) -> bool;
}

/// Provider of a graphics context plus its current size.
pub trait Surface {
    /// Fails with [`RenderError::UnsupportedContext`](crate::RenderError) when
    /// no context can be created.
    fn context(&self) -> Result<Rc<dyn GraphicsContext>>;
    fn size(&self) -> (u32, u32);
}
