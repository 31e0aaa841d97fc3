//! [`GraphicsContext`] over a live OpenGL (ES) 3 context through `glow`.

use glow::HasContext;
use template::{BufferTarget, DrawMode, ElementKind, TextureFilter, TextureFormat, TextureWrap};
use tracing::{debug, warn};

use crate::context::GraphicsContext;
use crate::error::{RenderError, Result};
use crate::types::{
    BufferHandle, BuildStage, FramebufferHandle, IndexType, InternalFormat, PixelType,
    ProgramHandle, RenderbufferHandle, TextureHandle, TextureImage, TextureParameters,
    UniformLocation, VertexArrayHandle, VertexLayout,
};

pub struct GlowContext {
    gl: glow::Context,
}

impl GlowContext {
    pub fn new(gl: glow::Context) -> Self {
        let version = gl.version();
        debug!(
            major = version.major,
            minor = version.minor,
            embedded = version.is_embedded,
            "wrapped glow context"
        );
        Self { gl }
    }

    pub fn inner(&self) -> &glow::Context {
        &self.gl
    }

    fn compile_stage(&self, stage: BuildStage, kind: u32, source: &str) -> Result<glow::NativeShader> {
        unsafe {
            let shader = self
                .gl
                .create_shader(kind)
                .map_err(|err| RenderError::UnsupportedContext(format!("create_shader: {err}")))?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if !self.gl.get_shader_compile_status(shader) {
                let log = self.gl.get_shader_info_log(shader);
                self.gl.delete_shader(shader);
                return Err(RenderError::ProgramBuildFailure { stage, log });
            }
            Ok(shader)
        }
    }
}

fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn element_type(kind: ElementKind) -> u32 {
    match kind {
        ElementKind::F32 => glow::FLOAT,
        ElementKind::I8 => glow::BYTE,
        ElementKind::I16 => glow::SHORT,
        ElementKind::I32 => glow::INT,
        ElementKind::U8 => glow::UNSIGNED_BYTE,
        ElementKind::U16 => glow::UNSIGNED_SHORT,
        ElementKind::U32 => glow::UNSIGNED_INT,
    }
}

fn draw_mode(mode: DrawMode) -> u32 {
    match mode {
        DrawMode::Points => glow::POINTS,
        DrawMode::Lines => glow::LINES,
        DrawMode::LineStrip => glow::LINE_STRIP,
        DrawMode::LineLoop => glow::LINE_LOOP,
        DrawMode::Triangles => glow::TRIANGLES,
        DrawMode::TriangleStrip => glow::TRIANGLE_STRIP,
        DrawMode::TriangleFan => glow::TRIANGLE_FAN,
    }
}

fn index_type(index: IndexType) -> u32 {
    match index {
        IndexType::U8 => glow::UNSIGNED_BYTE,
        IndexType::U16 => glow::UNSIGNED_SHORT,
        IndexType::U32 => glow::UNSIGNED_INT,
    }
}

fn internal_format(internal: InternalFormat) -> u32 {
    match internal {
        InternalFormat::R8 => glow::R8,
        InternalFormat::Rg8 => glow::RG8,
        InternalFormat::Rgb8 => glow::RGB8,
        InternalFormat::Rgba8 => glow::RGBA8,
        InternalFormat::Luminance => glow::LUMINANCE,
        InternalFormat::R16F => glow::R16F,
        InternalFormat::Rg16F => glow::RG16F,
        InternalFormat::Rgba16F => glow::RGBA16F,
        InternalFormat::R32F => glow::R32F,
        InternalFormat::Rg32F => glow::RG32F,
        InternalFormat::Rgb32F => glow::RGB32F,
        InternalFormat::Rgba32F => glow::RGBA32F,
    }
}

fn pixel_format(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::Red => glow::RED,
        TextureFormat::Rg => glow::RG,
        TextureFormat::Rgb => glow::RGB,
        TextureFormat::Rgba => glow::RGBA,
        TextureFormat::Luminance => glow::LUMINANCE,
    }
}

fn pixel_type(pixel: PixelType) -> u32 {
    match pixel {
        PixelType::UnsignedByte => glow::UNSIGNED_BYTE,
        PixelType::Float => glow::FLOAT,
    }
}

fn filter(filter: TextureFilter) -> i32 {
    match filter {
        TextureFilter::Nearest => glow::NEAREST as i32,
        TextureFilter::Linear => glow::LINEAR as i32,
    }
}

fn wrap(wrap: TextureWrap) -> i32 {
    match wrap {
        TextureWrap::ClampToEdge => glow::CLAMP_TO_EDGE as i32,
        TextureWrap::Repeat => glow::REPEAT as i32,
        TextureWrap::MirroredRepeat => glow::MIRRORED_REPEAT as i32,
    }
}

fn location(location: UniformLocation) -> glow::NativeUniformLocation {
    glow::NativeUniformLocation(location.0)
}

fn created<T>(what: &str, result: std::result::Result<T, String>) -> Result<T> {
    result.map_err(|err| RenderError::Resource(format!("{what}: {err}")))
}

impl GraphicsContext for GlowContext {
    fn create_program(&self, vertex: &str, fragment: &str) -> Result<ProgramHandle> {
        let vs = self.compile_stage(BuildStage::Vertex, glow::VERTEX_SHADER, vertex)?;
        let fs = match self.compile_stage(BuildStage::Fragment, glow::FRAGMENT_SHADER, fragment) {
            Ok(fs) => fs,
            Err(err) => {
                unsafe { self.gl.delete_shader(vs) };
                return Err(err);
            }
        };
        unsafe {
            let program = match self.gl.create_program() {
                Ok(program) => program,
                Err(err) => {
                    self.gl.delete_shader(vs);
                    self.gl.delete_shader(fs);
                    return Err(RenderError::UnsupportedContext(format!("create_program: {err}")));
                }
            };
            self.gl.attach_shader(program, vs);
            self.gl.attach_shader(program, fs);
            self.gl.link_program(program);
            self.gl.detach_shader(program, vs);
            self.gl.detach_shader(program, fs);
            self.gl.delete_shader(vs);
            self.gl.delete_shader(fs);
            if !self.gl.get_program_link_status(program) {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                return Err(RenderError::ProgramBuildFailure {
                    stage: BuildStage::Link,
                    log,
                });
            }
            Ok(ProgramHandle(program.0))
        }
    }

    fn delete_program(&self, program: ProgramHandle) {
        unsafe { self.gl.delete_program(glow::NativeProgram(program.0)) }
    }

    fn use_program(&self, program: Option<ProgramHandle>) {
        unsafe {
            self.gl
                .use_program(program.map(|program| glow::NativeProgram(program.0)))
        }
    }

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        unsafe {
            self.gl
                .get_attrib_location(glow::NativeProgram(program.0), name)
        }
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        unsafe {
            self.gl
                .get_uniform_location(glow::NativeProgram(program.0), name)
                .map(|location| UniformLocation(location.0))
        }
    }

    fn create_vertex_array(&self) -> Result<VertexArrayHandle> {
        let vertex_array = created("create_vertex_array", unsafe { self.gl.create_vertex_array() })?;
        Ok(VertexArrayHandle(vertex_array.0))
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>) {
        unsafe {
            self.gl
                .bind_vertex_array(vertex_array.map(|array| glow::NativeVertexArray(array.0)))
        }
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle) {
        unsafe {
            self.gl
                .delete_vertex_array(glow::NativeVertexArray(vertex_array.0))
        }
    }

    fn create_buffer(&self) -> Result<BufferHandle> {
        let buffer = created("create_buffer", unsafe { self.gl.create_buffer() })?;
        Ok(BufferHandle(buffer.0))
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferHandle>) {
        unsafe {
            self.gl.bind_buffer(
                buffer_target(target),
                buffer.map(|buffer| glow::NativeBuffer(buffer.0)),
            )
        }
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8]) {
        unsafe {
            self.gl
                .buffer_data_u8_slice(buffer_target(target), data, glow::DYNAMIC_DRAW)
        }
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        unsafe { self.gl.delete_buffer(glow::NativeBuffer(buffer.0)) }
    }

    fn vertex_attrib_pointer(&self, location: u32, layout: VertexLayout) {
        let data_type = element_type(layout.element);
        unsafe {
            self.gl.enable_vertex_attrib_array(location);
            if layout.integer {
                self.gl
                    .vertex_attrib_pointer_i32(location, layout.components, data_type, 0, 0);
            } else {
                self.gl.vertex_attrib_pointer_f32(
                    location,
                    layout.components,
                    data_type,
                    false,
                    0,
                    0,
                );
            }
        }
    }

    fn uniform_f32(&self, at: UniformLocation, components: usize, values: &[f32]) {
        let at = location(at);
        unsafe {
            match components {
                1 => self.gl.uniform_1_f32_slice(Some(&at), values),
                2 => self.gl.uniform_2_f32_slice(Some(&at), values),
                3 => self.gl.uniform_3_f32_slice(Some(&at), values),
                4 => self.gl.uniform_4_f32_slice(Some(&at), values),
                other => warn!(components = other, "no float uniform setter"),
            }
        }
    }

    fn uniform_i32(&self, at: UniformLocation, components: usize, values: &[i32]) {
        let at = location(at);
        unsafe {
            match components {
                1 => self.gl.uniform_1_i32_slice(Some(&at), values),
                2 => self.gl.uniform_2_i32_slice(Some(&at), values),
                3 => self.gl.uniform_3_i32_slice(Some(&at), values),
                4 => self.gl.uniform_4_i32_slice(Some(&at), values),
                other => warn!(components = other, "no int uniform setter"),
            }
        }
    }

    fn uniform_matrix(&self, at: UniformLocation, dimension: usize, values: &[f32]) {
        let at = location(at);
        unsafe {
            match dimension {
                2 => self.gl.uniform_matrix_2_f32_slice(Some(&at), false, values),
                3 => self.gl.uniform_matrix_3_f32_slice(Some(&at), false, values),
                4 => self.gl.uniform_matrix_4_f32_slice(Some(&at), false, values),
                other => warn!(dimension = other, "no matrix uniform setter"),
            }
        }
    }

    fn create_texture(&self) -> Result<TextureHandle> {
        let texture = created("create_texture", unsafe { self.gl.create_texture() })?;
        Ok(TextureHandle(texture.0))
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture(&self, texture: Option<TextureHandle>) {
        unsafe {
            self.gl.bind_texture(
                glow::TEXTURE_2D,
                texture.map(|texture| glow::NativeTexture(texture.0)),
            )
        }
    }

    fn texture_parameters(&self, parameters: TextureParameters) {
        unsafe {
            let target = glow::TEXTURE_2D;
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, filter(parameters.min_filter));
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, filter(parameters.mag_filter));
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrap(parameters.wrap));
            self.gl
                .tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrap(parameters.wrap));
        }
    }

    fn tex_image_2d(&self, image: TextureImage, pixels: Option<&[u8]>) {
        unsafe {
            // Rows of single-channel and RGB textures are not 4-byte aligned.
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal_format(image.internal) as i32,
                image.width as i32,
                image.height as i32,
                0,
                pixel_format(image.format),
                pixel_type(image.pixel_type),
                pixels,
            );
        }
    }

    fn delete_texture(&self, texture: TextureHandle) {
        unsafe { self.gl.delete_texture(glow::NativeTexture(texture.0)) }
    }

    fn create_framebuffer(&self) -> Result<FramebufferHandle> {
        let framebuffer = created("create_framebuffer", unsafe { self.gl.create_framebuffer() })?;
        Ok(FramebufferHandle(framebuffer.0))
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferHandle>) {
        unsafe {
            self.gl.bind_framebuffer(
                glow::FRAMEBUFFER,
                framebuffer.map(|framebuffer| glow::NativeFramebuffer(framebuffer.0)),
            )
        }
    }

    fn framebuffer_texture(&self, texture: TextureHandle) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(glow::NativeTexture(texture.0)),
                0,
            )
        }
    }

    fn create_renderbuffer(&self) -> Result<RenderbufferHandle> {
        let renderbuffer =
            created("create_renderbuffer", unsafe { self.gl.create_renderbuffer() })?;
        Ok(RenderbufferHandle(renderbuffer.0))
    }

    fn renderbuffer_storage(
        &self,
        renderbuffer: RenderbufferHandle,
        internal: InternalFormat,
        width: u32,
        height: u32,
    ) {
        unsafe {
            self.gl.bind_renderbuffer(
                glow::RENDERBUFFER,
                Some(glow::NativeRenderbuffer(renderbuffer.0)),
            );
            self.gl.renderbuffer_storage(
                glow::RENDERBUFFER,
                internal_format(internal),
                width as i32,
                height as i32,
            );
            self.gl.bind_renderbuffer(glow::RENDERBUFFER, None);
        }
    }

    fn framebuffer_renderbuffer(&self, renderbuffer: RenderbufferHandle) {
        unsafe {
            self.gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::RENDERBUFFER,
                Some(glow::NativeRenderbuffer(renderbuffer.0)),
            )
        }
    }

    fn framebuffer_complete(&self) -> bool {
        unsafe { self.gl.check_framebuffer_status(glow::FRAMEBUFFER) == glow::FRAMEBUFFER_COMPLETE }
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferHandle) {
        unsafe {
            self.gl
                .delete_framebuffer(glow::NativeFramebuffer(framebuffer.0))
        }
    }

    fn delete_renderbuffer(&self, renderbuffer: RenderbufferHandle) {
        unsafe {
            self.gl
                .delete_renderbuffer(glow::NativeRenderbuffer(renderbuffer.0))
        }
    }

    fn viewport(&self, x: i32, y: i32, width: u32, height: u32) {
        unsafe { self.gl.viewport(x, y, width as i32, height as i32) }
    }

    fn clear(&self, color: [f32; 4], depth: f32) {
        unsafe {
            self.gl.clear_color(color[0], color[1], color[2], color[3]);
            self.gl.clear_depth_f32(depth);
            self.gl.enable(glow::DEPTH_TEST);
            self.gl.depth_func(glow::LEQUAL);
            self.gl
                .clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
    }

    fn draw_arrays(&self, mode: DrawMode, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(draw_mode(mode), first, count) }
    }

    fn draw_elements(&self, mode: DrawMode, count: i32, index: IndexType) {
        unsafe {
            self.gl
                .draw_elements(draw_mode(mode), count, index_type(index), 0)
        }
    }

    fn read_pixels(
        &self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixel: PixelType,
        out: &mut [u8],
    ) {
        unsafe {
            self.gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            self.gl.read_pixels(
                x,
                y,
                width as i32,
                height as i32,
                pixel_format(format),
                pixel_type(pixel),
                glow::PixelPackData::Slice(out),
            );
        }
    }

    fn enable_extension(&self, name: &str) -> bool {
        let extensions = self.gl.supported_extensions();
        if extensions.contains(name) || extensions.contains(&format!("GL_{name}")) {
            return true;
        }
        // Float colour buffers are core on desktop GL 3.0+.
        !self.gl.version().is_embedded
    }
}
