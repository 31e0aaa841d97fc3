use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use template::{CompiledShader, RenderedSurface, TextureFormat};
use tracing::{debug, info, warn};

use crate::bind::RedrawRequest;
use crate::context::{GraphicsContext, Surface};
use crate::error::{RenderError, Result};
use crate::program::{Program, ProgramConfig, ProgramManager};
use crate::texture::RenderTexture;
use crate::types::{FramebufferHandle, InternalFormat, PixelType, RenderbufferHandle};

const FLOAT_EXTENSION: &str = "EXT_color_buffer_float";
const HALF_FLOAT_EXTENSION: &str = "EXT_color_buffer_half_float";

/// Opaque black.
pub(crate) const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackOptions {
    /// Enables rendering into 32-bit float targets.
    pub float_extension: bool,
    pub half_float_extension: bool,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            float_extension: true,
            half_float_extension: false,
        }
    }
}

/// Region and pixel format of a readback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadConfig {
    pub x: i32,
    pub y: i32,
    /// Defaults to the stack width.
    pub width: Option<u32>,
    /// Defaults to the stack height.
    pub height: Option<u32>,
    pub format: TextureFormat,
    pub data_type: PixelType,
    pub internal_format: InternalFormat,
}

/// Pixels returned by [`Stack::read`].
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

impl PixelBuffer {
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(pixels) => pixels.len(),
            PixelBuffer::F32(pixels) => pixels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct ReadTarget {
    framebuffer: FramebufferHandle,
    renderbuffer: RenderbufferHandle,
}

type ResizeListener = Box<dyn FnMut(u32, u32)>;

/// Ordered set of programs drawing into one surface.
///
/// Render-texture layers draw first, then programs in insertion order, so later
/// programs layer over earlier ones.
pub struct Stack {
    programs: Vec<Program>,
    layers: Vec<Rc<RenderTexture>>,
    read_targets: HashMap<ReadConfig, ReadTarget>,
    manager: ProgramManager,
    resize_listeners: Vec<ResizeListener>,
    redraw: RedrawRequest,
    gl: Rc<dyn GraphicsContext>,
    options: StackOptions,
    size: (u32, u32),
}

impl Stack {
    pub fn new(surface: &dyn Surface, options: StackOptions) -> Result<Self> {
        let gl = surface.context()?;
        let size = surface.size();
        enable_extensions(gl.as_ref(), options);
        gl.viewport(0, 0, size.0, size.1);
        info!(width = size.0, height = size.1, "stack created");
        Ok(Self {
            programs: Vec::new(),
            layers: Vec::new(),
            read_targets: HashMap::new(),
            manager: ProgramManager::new(gl.clone()),
            resize_listeners: Vec::new(),
            redraw: RedrawRequest::default(),
            gl,
            options,
            size,
        })
    }

    pub fn context(&self) -> &Rc<dyn GraphicsContext> {
        &self.gl
    }

    pub fn options(&self) -> StackOptions {
        self.options
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn manager(&self) -> &ProgramManager {
        &self.manager
    }

    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    /// Compiles a program against this stack's context without adding it.
    pub fn compile(
        &mut self,
        vertex: &CompiledShader,
        fragment: &CompiledShader,
        config: ProgramConfig,
    ) -> Result<Program> {
        self.manager.compile(vertex, fragment, config, &self.redraw)
    }

    pub fn add(&mut self, program: Program) {
        self.programs.push(program);
    }

    /// Creates an offscreen target sharing this stack's context.
    pub fn render_texture(&self, width: u32, height: u32) -> Result<Rc<RenderTexture>> {
        RenderTexture::new(self.gl.clone(), width, height)
    }

    /// Renders `layer` at the start of every frame.
    pub fn add_layer(&mut self, layer: Rc<RenderTexture>) {
        self.layers.push(layer);
    }

    pub fn render(&mut self) {
        self.render_to(None, self.size);
    }

    fn render_to(&mut self, framebuffer: Option<FramebufferHandle>, viewport: (u32, u32)) {
        if let Some(target) = framebuffer {
            self.gl.bind_framebuffer(Some(target));
            self.gl.viewport(0, 0, viewport.0, viewport.1);
        }
        let mut rendered = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            layer.render_into(framebuffer, viewport);
            rendered.extend(layer.texture_id());
        }
        for program in &mut self.programs {
            program.render();
        }
        // Layers drawn this frame were already sampled fresh.
        self.redraw.discard(&rendered);
    }

    /// Clears to opaque black with depth 1.0.
    pub fn clear(&self) {
        self.gl.clear(CLEAR_COLOR, 1.0);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.size == (width, height) {
            return;
        }
        self.size = (width, height);
        self.gl.viewport(0, 0, width, height);
        debug!(width, height, "stack resized");
        for listener in &mut self.resize_listeners {
            listener(width, height);
        }
    }

    pub fn on_resize(&mut self, listener: impl FnMut(u32, u32) + 'static) {
        self.resize_listeners.push(Box::new(listener));
    }

    /// Whether a sampled render texture changed since this stack last drew;
    /// clears the request.
    pub fn take_redraw_request(&self) -> bool {
        self.redraw.take()
    }

    /// Clears an offscreen target described by `config`, renders into it and
    /// reads it back.
    pub fn read(&mut self, config: ReadConfig) -> Result<PixelBuffer> {
        let width = config.width.unwrap_or(self.size.0);
        let height = config.height.unwrap_or(self.size.1);
        validate_read(&config, width, height)?;

        let framebuffer = self.read_target(config, width, height)?;
        self.gl.clear(CLEAR_COLOR, 1.0);
        self.render_to(Some(framebuffer), (width, height));

        let components = config.format.components();
        let texels = width as usize * height as usize * components;
        let pixels = match config.data_type {
            PixelType::UnsignedByte => {
                let mut out = vec![0_u8; texels];
                self.gl.read_pixels(
                    config.x, config.y, width, height, config.format, config.data_type, &mut out,
                );
                PixelBuffer::U8(out)
            }
            PixelType::Float => {
                let mut out = vec![0_f32; texels];
                self.gl.read_pixels(
                    config.x,
                    config.y,
                    width,
                    height,
                    config.format,
                    config.data_type,
                    bytemuck::cast_slice_mut(&mut out),
                );
                PixelBuffer::F32(out)
            }
        };

        self.gl.bind_framebuffer(None);
        self.gl.viewport(0, 0, self.size.0, self.size.1);
        Ok(pixels)
    }

    fn read_target(
        &mut self,
        config: ReadConfig,
        width: u32,
        height: u32,
    ) -> Result<FramebufferHandle> {
        // The cache key carries the resolved size so a resize reallocates.
        let key = ReadConfig {
            width: Some(width),
            height: Some(height),
            ..config
        };
        if let Some(target) = self.read_targets.get(&key) {
            self.gl.bind_framebuffer(Some(target.framebuffer));
            return Ok(target.framebuffer);
        }

        let gl = self.gl.as_ref();
        let renderbuffer = gl.create_renderbuffer()?;
        gl.renderbuffer_storage(renderbuffer, config.internal_format, width, height);
        let framebuffer = match gl.create_framebuffer() {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                gl.delete_renderbuffer(renderbuffer);
                return Err(err);
            }
        };
        gl.bind_framebuffer(Some(framebuffer));
        gl.framebuffer_renderbuffer(renderbuffer);
        if !gl.framebuffer_complete() {
            gl.bind_framebuffer(None);
            gl.delete_framebuffer(framebuffer);
            gl.delete_renderbuffer(renderbuffer);
            return Err(RenderError::Resource(format!(
                "readback framebuffer with {:?} is incomplete",
                config.internal_format
            )));
        }
        debug!(width, height, format = ?config.internal_format, "allocated readback target");
        self.read_targets.insert(
            key,
            ReadTarget {
                framebuffer,
                renderbuffer,
            },
        );
        Ok(framebuffer)
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.programs.clear();
        self.layers.clear();
        for (_, target) in self.read_targets.drain() {
            self.gl.delete_framebuffer(target.framebuffer);
            self.gl.delete_renderbuffer(target.renderbuffer);
        }
    }
}

fn enable_extensions(gl: &dyn GraphicsContext, options: StackOptions) {
    let requested = [
        (options.float_extension, FLOAT_EXTENSION),
        (options.half_float_extension, HALF_FLOAT_EXTENSION),
    ];
    for (enabled, name) in requested {
        if !enabled {
            continue;
        }
        if gl.enable_extension(name) {
            debug!(extension = name, "enabled extension");
        } else {
            warn!(extension = name, "extension unavailable");
        }
    }
}

fn validate_read(config: &ReadConfig, width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidReadback(format!(
            "region {width}x{height} is empty"
        )));
    }
    if config.format == TextureFormat::Luminance {
        return Err(RenderError::InvalidReadback(
            "luminance cannot be read back".into(),
        ));
    }
    let float_target = config.internal_format.is_float();
    match (float_target, config.data_type) {
        (true, PixelType::Float) | (false, PixelType::UnsignedByte) => Ok(()),
        _ => Err(RenderError::InvalidReadback(format!(
            "{:?} target cannot be read as {:?}",
            config.internal_format, config.data_type
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GlCall, HeadlessSurface};

    #[test]
    fn default_read_covers_rgba_surface() {
        let surface = HeadlessSurface::new(100, 100);
        let mut stack = Stack::new(&surface, StackOptions::default()).unwrap();
        let pixels = stack.read(ReadConfig::default()).unwrap();
        assert_eq!(pixels.len(), 100 * 100 * 4);
    }

    #[test]
    fn float_read_needs_float_target() {
        let surface = HeadlessSurface::new(4, 4);
        let mut stack = Stack::new(&surface, StackOptions::default()).unwrap();
        let config = ReadConfig {
            data_type: PixelType::Float,
            ..ReadConfig::default()
        };
        assert!(matches!(stack.read(config), Err(RenderError::InvalidReadback(_))));

        let config = ReadConfig {
            data_type: PixelType::Float,
            internal_format: InternalFormat::R32F,
            format: TextureFormat::Red,
            ..ReadConfig::default()
        };
        assert!(matches!(stack.read(config), Ok(PixelBuffer::F32(pixels)) if pixels.len() == 16));
    }

    #[test]
    fn resize_notifies_listeners_once_per_change() {
        let surface = HeadlessSurface::new(8, 8);
        let mut stack = Stack::new(&surface, StackOptions::default()).unwrap();
        let seen = Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = seen.clone();
        stack.on_resize(move |w, h| sink.borrow_mut().push((w, h)));
        stack.resize(16, 9);
        stack.resize(16, 9);
        assert_eq!(*seen.borrow(), [(16, 9)]);
        assert_eq!(stack.size(), (16, 9));
    }

    #[test]
    fn cleared_readback_is_opaque_black() {
        let surface = HeadlessSurface::new(1, 1);
        let mut stack = Stack::new(&surface, StackOptions::default()).unwrap();
        stack.clear();
        assert_eq!(
            stack.read(ReadConfig::default()).unwrap(),
            PixelBuffer::U8(vec![0, 0, 0, 255])
        );
    }

    #[test]
    fn every_read_clears_its_target_before_drawing() {
        let surface = HeadlessSurface::new(2, 2);
        let gl = surface.context_handle().clone();
        let mut stack = Stack::new(&surface, StackOptions::default()).unwrap();
        for _ in 0..2 {
            gl.reset();
            stack.read(ReadConfig::default()).unwrap();
            let calls = gl.calls();
            let bound = calls
                .iter()
                .position(|call| matches!(call, GlCall::BindFramebuffer(Some(_))))
                .unwrap();
            let read = calls
                .iter()
                .position(|call| matches!(call, GlCall::ReadPixels { .. }))
                .unwrap();
            assert!(calls[bound..read].contains(&GlCall::Clear), "{calls:?}");
        }
    }

    #[test]
    fn readback_targets_are_reused() {
        let surface = HeadlessSurface::new(2, 2);
        let mut stack = Stack::new(&surface, StackOptions::default()).unwrap();
        stack.read(ReadConfig::default()).unwrap();
        stack.read(ReadConfig::default()).unwrap();
        assert_eq!(surface.context_handle().stats().framebuffers, 1);
    }
}
