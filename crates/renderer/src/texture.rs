use std::cell::{Cell, RefCell};
use std::num::NonZeroU32;
use std::rc::Rc;

use template::{ElementKind, RenderedSurface, TextureFormat, TextureLayout};
use tracing::debug;

use crate::context::GraphicsContext;
use crate::error::{RenderError, Result};
use crate::program::Program;
use crate::stack::CLEAR_COLOR;
use crate::types::{
    FramebufferHandle, InternalFormat, PixelType, TextureHandle, TextureImage, TextureParameters,
};

/// Derives the sized upload description for a sampler's pixel data.
pub fn texture_image(layout: TextureLayout) -> Option<TextureImage> {
    let (internal, pixel_type) = match (layout.element, layout.format) {
        (ElementKind::U8, TextureFormat::Red) => (InternalFormat::R8, PixelType::UnsignedByte),
        (ElementKind::U8, TextureFormat::Rg) => (InternalFormat::Rg8, PixelType::UnsignedByte),
        (ElementKind::U8, TextureFormat::Rgb) => (InternalFormat::Rgb8, PixelType::UnsignedByte),
        (ElementKind::U8, TextureFormat::Rgba) => (InternalFormat::Rgba8, PixelType::UnsignedByte),
        (ElementKind::U8, TextureFormat::Luminance) => {
            (InternalFormat::Luminance, PixelType::UnsignedByte)
        }
        (ElementKind::F32, TextureFormat::Red) => (InternalFormat::R32F, PixelType::Float),
        (ElementKind::F32, TextureFormat::Rg) => (InternalFormat::Rg32F, PixelType::Float),
        (ElementKind::F32, TextureFormat::Rgb) => (InternalFormat::Rgb32F, PixelType::Float),
        (ElementKind::F32, TextureFormat::Rgba) => (InternalFormat::Rgba32F, PixelType::Float),
        _ => return None,
    };
    Some(TextureImage {
        internal,
        width: layout.width,
        height: layout.height,
        format: layout.format,
        pixel_type,
    })
}

/// Offscreen colour target that programs can be drawn into and sampled from.
///
/// Sampler tokens accept an `Rc<RenderTexture>` as their source. Every
/// [`render`](Self::render) bumps the generation so consumers know to redraw.
pub struct RenderTexture {
    programs: RefCell<Vec<Program>>,
    gl: Rc<dyn GraphicsContext>,
    texture: TextureHandle,
    framebuffer: FramebufferHandle,
    size: (u32, u32),
    generation: Cell<u64>,
    listeners: RefCell<Vec<Box<dyn Fn()>>>,
}

impl RenderTexture {
    pub fn new(gl: Rc<dyn GraphicsContext>, width: u32, height: u32) -> Result<Rc<Self>> {
        if width == 0 || height == 0 {
            return Err(RenderError::Resource(format!(
                "render texture needs a non-empty size, got {width}x{height}"
            )));
        }
        let texture = gl.create_texture()?;
        gl.bind_texture(Some(texture));
        gl.texture_parameters(TextureParameters::default());
        gl.tex_image_2d(
            TextureImage {
                internal: InternalFormat::Rgba8,
                width,
                height,
                format: TextureFormat::Rgba,
                pixel_type: PixelType::UnsignedByte,
            },
            None,
        );
        gl.bind_texture(None);

        let framebuffer = match gl.create_framebuffer() {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                gl.delete_texture(texture);
                return Err(err);
            }
        };
        gl.bind_framebuffer(Some(framebuffer));
        gl.framebuffer_texture(texture);
        let complete = gl.framebuffer_complete();
        gl.bind_framebuffer(None);
        if !complete {
            gl.delete_framebuffer(framebuffer);
            gl.delete_texture(texture);
            return Err(RenderError::Resource(
                "render texture framebuffer is incomplete".into(),
            ));
        }

        debug!(width, height, texture = ?texture, "created render texture");
        Ok(Rc::new(Self {
            programs: RefCell::new(Vec::new()),
            gl,
            texture,
            framebuffer,
            size: (width, height),
            generation: Cell::new(0),
            listeners: RefCell::new(Vec::new()),
        }))
    }

    /// Appends a program; programs draw in insertion order.
    pub fn add(&self, program: Program) {
        self.programs.borrow_mut().push(program);
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    /// Draws every program into the texture, then rebinds `restore`.
    pub fn render_into(&self, restore: Option<FramebufferHandle>, viewport: (u32, u32)) {
        let (width, height) = self.size;
        self.gl.bind_framebuffer(Some(self.framebuffer));
        self.gl.viewport(0, 0, width, height);
        self.gl.clear(CLEAR_COLOR, 1.0);
        for program in self.programs.borrow_mut().iter_mut() {
            program.render();
        }
        self.gl.bind_framebuffer(restore);
        self.gl.viewport(0, 0, viewport.0, viewport.1);
        self.generation.set(self.generation.get() + 1);
        for listener in self.listeners.borrow().iter() {
            listener();
        }
    }

    /// Draws into the texture and returns to the default framebuffer.
    pub fn render(&self) {
        self.render_into(None, self.size);
    }
}

impl RenderedSurface for RenderTexture {
    fn texture_id(&self) -> Option<NonZeroU32> {
        Some(self.texture.0)
    }

    fn generation(&self) -> u64 {
        self.generation.get()
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn on_render(&self, listener: Box<dyn Fn()>) {
        self.listeners.borrow_mut().push(listener);
    }
}

impl Drop for RenderTexture {
    fn drop(&mut self) {
        self.programs.borrow_mut().clear();
        self.gl.delete_framebuffer(self.framebuffer);
        self.gl.delete_texture(self.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_pixels_map_to_float_formats() {
        let image = texture_image(TextureLayout {
            width: 4,
            height: 1,
            format: TextureFormat::Red,
            element: ElementKind::F32,
        })
        .unwrap();
        assert_eq!(image.internal, InternalFormat::R32F);
        assert_eq!(image.pixel_type, PixelType::Float);
    }

    #[test]
    fn luminance_requires_bytes() {
        let layout = TextureLayout {
            width: 1,
            height: 1,
            format: TextureFormat::Luminance,
            element: ElementKind::F32,
        };
        assert!(texture_image(layout).is_none());
        let bytes = TextureLayout {
            element: ElementKind::U8,
            ..layout
        };
        assert_eq!(texture_image(bytes).unwrap().internal, InternalFormat::Luminance);
    }
}
