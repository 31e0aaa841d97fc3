//! A recording [`GraphicsContext`] with no GPU behind it.
//!
//! Programs "compile" when each stage has an entry point and no `#error`
//! directive. Locations come from the declarations in the linked sources, and
//! declared inputs that are never referenced are elided the way a driver would
//! optimize them out. Every state-changing call is appended to a log.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::rc::Rc;

use serde::Serialize;
use template::{BufferTarget, DrawMode, TextureFormat};
use tracing::trace;

use crate::context::{GraphicsContext, Surface};
use crate::error::{RenderError, Result};
use crate::types::{
    BufferHandle, BuildStage, FramebufferHandle, IndexType, InternalFormat, PixelType,
    ProgramHandle, RenderbufferHandle, TextureHandle, TextureImage, TextureParameters,
    UniformLocation, VertexArrayHandle, VertexLayout,
};

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    LinkProgram(ProgramHandle),
    DeleteProgram(ProgramHandle),
    UseProgram(Option<ProgramHandle>),
    BindVertexArray(Option<VertexArrayHandle>),
    BindBuffer {
        target: BufferTarget,
        buffer: Option<BufferHandle>,
    },
    BufferData {
        target: BufferTarget,
        bytes: usize,
    },
    VertexAttribPointer {
        location: u32,
        layout: VertexLayout,
    },
    UniformF32 {
        location: UniformLocation,
        values: Vec<f32>,
    },
    UniformI32 {
        location: UniformLocation,
        values: Vec<i32>,
    },
    UniformMatrix {
        location: UniformLocation,
        dimension: usize,
    },
    ActiveTexture(u32),
    BindTexture(Option<TextureHandle>),
    TexParameters(TextureParameters),
    TexImage2D {
        image: TextureImage,
        uploaded: bool,
    },
    BindFramebuffer(Option<FramebufferHandle>),
    RenderbufferStorage {
        internal: InternalFormat,
        width: u32,
        height: u32,
    },
    Viewport {
        width: u32,
        height: u32,
    },
    Clear,
    DrawArrays {
        mode: DrawMode,
        first: i32,
        count: i32,
    },
    DrawElements {
        mode: DrawMode,
        count: i32,
        index_type: IndexType,
    },
    ReadPixels {
        width: u32,
        height: u32,
    },
    DeleteBuffer(BufferHandle),
    DeleteTexture(TextureHandle),
    DeleteVertexArray(VertexArrayHandle),
    DeleteFramebuffer(FramebufferHandle),
}

/// Running totals of the calls that cost bandwidth or work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CallStats {
    pub links: usize,
    pub buffer_uploads: usize,
    pub texture_uploads: usize,
    pub uniform_pushes: usize,
    pub vertex_pointers: usize,
    pub draws: usize,
    pub framebuffers: usize,
    pub reads: usize,
}

impl CallStats {
    /// Calls made after `earlier` was captured.
    pub fn since(&self, earlier: &CallStats) -> CallStats {
        CallStats {
            links: self.links.saturating_sub(earlier.links),
            buffer_uploads: self.buffer_uploads.saturating_sub(earlier.buffer_uploads),
            texture_uploads: self.texture_uploads.saturating_sub(earlier.texture_uploads),
            uniform_pushes: self.uniform_pushes.saturating_sub(earlier.uniform_pushes),
            vertex_pointers: self.vertex_pointers.saturating_sub(earlier.vertex_pointers),
            draws: self.draws.saturating_sub(earlier.draws),
            framebuffers: self.framebuffers.saturating_sub(earlier.framebuffers),
            reads: self.reads.saturating_sub(earlier.reads),
        }
    }
}

#[derive(Debug, Default)]
struct LinkedProgram {
    attributes: HashMap<String, u32>,
    uniforms: HashMap<String, UniformLocation>,
}

pub struct HeadlessContext {
    calls: RefCell<Vec<GlCall>>,
    stats: Cell<CallStats>,
    next_id: Cell<u32>,
    programs: RefCell<HashMap<ProgramHandle, LinkedProgram>>,
    extensions: Vec<String>,
    clear_color: Cell<[f32; 4]>,
}

impl Default for HeadlessContext {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessContext {
    /// A context offering both colour-buffer float extensions.
    pub fn new() -> Self {
        Self::with_extensions(&["EXT_color_buffer_float", "EXT_color_buffer_half_float"])
    }

    pub fn with_extensions(extensions: &[&str]) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            stats: Cell::new(CallStats::default()),
            next_id: Cell::new(1),
            programs: RefCell::new(HashMap::new()),
            extensions: extensions.iter().map(|name| (*name).to_owned()).collect(),
            clear_color: Cell::new([0.0; 4]),
        }
    }

    pub fn calls(&self) -> Vec<GlCall> {
        self.calls.borrow().clone()
    }

    pub fn stats(&self) -> CallStats {
        self.stats.get()
    }

    /// Forgets recorded calls and totals, keeping linked programs.
    pub fn reset(&self) {
        self.calls.borrow_mut().clear();
        self.stats.set(CallStats::default());
    }

    fn record(&self, call: GlCall) {
        trace!(?call, "gl");
        self.calls.borrow_mut().push(call);
    }

    fn count(&self, bump: impl FnOnce(&mut CallStats)) {
        let mut stats = self.stats.get();
        bump(&mut stats);
        self.stats.set(stats);
    }

    fn mint(&self) -> NonZeroU32 {
        let id = self.next_id.get();
        self.next_id.set(id.saturating_add(1));
        NonZeroU32::new(id).unwrap_or(NonZeroU32::MAX)
    }
}

fn check_stage(stage: BuildStage, source: &str) -> Result<()> {
    if let Some(line) = source
        .lines()
        .position(|line| line.trim_start().starts_with("#error"))
    {
        return Err(RenderError::ProgramBuildFailure {
            stage,
            log: format!("ERROR: 0:{}: '#error' : user error directive", line + 1),
        });
    }
    if !source.contains("void main") {
        return Err(RenderError::ProgramBuildFailure {
            stage,
            log: "ERROR: 0:0: 'main' : missing entry point".into(),
        });
    }
    Ok(())
}

/// Names declared with `keyword` (`in` or `uniform`), in source order.
fn declarations<'a>(source: &'a str, keyword: &str) -> Vec<&'a str> {
    source
        .lines()
        .filter_map(|line| {
            let statement = line.trim().strip_suffix(';')?;
            let mut words = statement.split_whitespace();
            if words.next()? != keyword {
                return None;
            }
            let name = words.last()?;
            Some(name.split('[').next().unwrap_or(name))
        })
        .collect()
}

/// Uses of `name` outside `//` comments.
fn references(source: &str, name: &str) -> usize {
    source
        .lines()
        .map(|line| line.split("//").next().unwrap_or(line))
        .flat_map(|code| code.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')))
        .filter(|word| *word == name)
        .count()
}

fn link(vertex: &str, fragment: &str) -> LinkedProgram {
    let mut linked = LinkedProgram::default();
    for name in declarations(vertex, "in") {
        if references(vertex, name) > 1 && !linked.attributes.contains_key(name) {
            let location = linked.attributes.len() as u32;
            linked.attributes.insert(name.to_owned(), location);
        }
    }
    for (source, other) in [(vertex, fragment), (fragment, vertex)] {
        for name in declarations(source, "uniform") {
            if linked.uniforms.contains_key(name) {
                continue;
            }
            let used = references(source, name) > 1
                || (declarations(other, "uniform").contains(&name) && references(other, name) > 1);
            if used {
                let location = UniformLocation(linked.uniforms.len() as u32);
                linked.uniforms.insert(name.to_owned(), location);
            }
        }
    }
    linked
}

impl GraphicsContext for HeadlessContext {
    fn create_program(&self, vertex: &str, fragment: &str) -> Result<ProgramHandle> {
        check_stage(BuildStage::Vertex, vertex)?;
        check_stage(BuildStage::Fragment, fragment)?;
        let handle = ProgramHandle(self.mint());
        self.programs
            .borrow_mut()
            .insert(handle, link(vertex, fragment));
        self.count(|stats| stats.links += 1);
        self.record(GlCall::LinkProgram(handle));
        Ok(handle)
    }

    fn delete_program(&self, program: ProgramHandle) {
        self.programs.borrow_mut().remove(&program);
        self.record(GlCall::DeleteProgram(program));
    }

    fn use_program(&self, program: Option<ProgramHandle>) {
        self.record(GlCall::UseProgram(program));
    }

    fn attribute_location(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs
            .borrow()
            .get(&program)?
            .attributes
            .get(name)
            .copied()
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.programs
            .borrow()
            .get(&program)?
            .uniforms
            .get(name)
            .copied()
    }

    fn create_vertex_array(&self) -> Result<VertexArrayHandle> {
        Ok(VertexArrayHandle(self.mint()))
    }

    fn bind_vertex_array(&self, vertex_array: Option<VertexArrayHandle>) {
        self.record(GlCall::BindVertexArray(vertex_array));
    }

    fn delete_vertex_array(&self, vertex_array: VertexArrayHandle) {
        self.record(GlCall::DeleteVertexArray(vertex_array));
    }

    fn create_buffer(&self) -> Result<BufferHandle> {
        Ok(BufferHandle(self.mint()))
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferHandle>) {
        self.record(GlCall::BindBuffer { target, buffer });
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8]) {
        self.count(|stats| stats.buffer_uploads += 1);
        self.record(GlCall::BufferData {
            target,
            bytes: data.len(),
        });
    }

    fn delete_buffer(&self, buffer: BufferHandle) {
        self.record(GlCall::DeleteBuffer(buffer));
    }

    fn vertex_attrib_pointer(&self, location: u32, layout: VertexLayout) {
        self.count(|stats| stats.vertex_pointers += 1);
        self.record(GlCall::VertexAttribPointer { location, layout });
    }

    fn uniform_f32(&self, location: UniformLocation, _components: usize, values: &[f32]) {
        self.count(|stats| stats.uniform_pushes += 1);
        self.record(GlCall::UniformF32 {
            location,
            values: values.to_vec(),
        });
    }

    fn uniform_i32(&self, location: UniformLocation, _components: usize, values: &[i32]) {
        self.count(|stats| stats.uniform_pushes += 1);
        self.record(GlCall::UniformI32 {
            location,
            values: values.to_vec(),
        });
    }

    fn uniform_matrix(&self, location: UniformLocation, dimension: usize, _values: &[f32]) {
        self.count(|stats| stats.uniform_pushes += 1);
        self.record(GlCall::UniformMatrix {
            location,
            dimension,
        });
    }

    fn create_texture(&self) -> Result<TextureHandle> {
        Ok(TextureHandle(self.mint()))
    }

    fn active_texture(&self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&self, texture: Option<TextureHandle>) {
        self.record(GlCall::BindTexture(texture));
    }

    fn texture_parameters(&self, parameters: TextureParameters) {
        self.record(GlCall::TexParameters(parameters));
    }

    fn tex_image_2d(&self, image: TextureImage, pixels: Option<&[u8]>) {
        if pixels.is_some() {
            self.count(|stats| stats.texture_uploads += 1);
        }
        self.record(GlCall::TexImage2D {
            image,
            uploaded: pixels.is_some(),
        });
    }

    fn delete_texture(&self, texture: TextureHandle) {
        self.record(GlCall::DeleteTexture(texture));
    }

    fn create_framebuffer(&self) -> Result<FramebufferHandle> {
        self.count(|stats| stats.framebuffers += 1);
        Ok(FramebufferHandle(self.mint()))
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferHandle>) {
        self.record(GlCall::BindFramebuffer(framebuffer));
    }

    fn framebuffer_texture(&self, _texture: TextureHandle) {}

    fn create_renderbuffer(&self) -> Result<RenderbufferHandle> {
        Ok(RenderbufferHandle(self.mint()))
    }

    fn renderbuffer_storage(
        &self,
        _renderbuffer: RenderbufferHandle,
        internal: InternalFormat,
        width: u32,
        height: u32,
    ) {
        self.record(GlCall::RenderbufferStorage {
            internal,
            width,
            height,
        });
    }

    fn framebuffer_renderbuffer(&self, _renderbuffer: RenderbufferHandle) {}

    fn framebuffer_complete(&self) -> bool {
        true
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferHandle) {
        self.record(GlCall::DeleteFramebuffer(framebuffer));
    }

    fn delete_renderbuffer(&self, _renderbuffer: RenderbufferHandle) {}

    fn viewport(&self, _x: i32, _y: i32, width: u32, height: u32) {
        self.record(GlCall::Viewport { width, height });
    }

    fn clear(&self, color: [f32; 4], _depth: f32) {
        self.clear_color.set(color);
        self.record(GlCall::Clear);
    }

    fn draw_arrays(&self, mode: DrawMode, first: i32, count: i32) {
        self.count(|stats| stats.draws += 1);
        self.record(GlCall::DrawArrays { mode, first, count });
    }

    fn draw_elements(&self, mode: DrawMode, count: i32, index_type: IndexType) {
        self.count(|stats| stats.draws += 1);
        self.record(GlCall::DrawElements {
            mode,
            count,
            index_type,
        });
    }

    fn read_pixels(
        &self,
        _x: i32,
        _y: i32,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixel_type: PixelType,
        out: &mut [u8],
    ) {
        // Reads back the last clear colour.
        let color = self.clear_color.get();
        let components = format.components();
        let size = pixel_type.byte_size();
        for (index, texel) in out.chunks_exact_mut(size).enumerate() {
            let value = color[index % components];
            match pixel_type {
                PixelType::UnsignedByte => texel[0] = (value.clamp(0.0, 1.0) * 255.0).round() as u8,
                PixelType::Float => texel.copy_from_slice(&value.to_ne_bytes()),
            }
        }
        self.count(|stats| stats.reads += 1);
        self.record(GlCall::ReadPixels { width, height });
    }

    fn enable_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|supported| supported == name)
    }
}

/// Fixed-size surface backed by a shared [`HeadlessContext`].
pub struct HeadlessSurface {
    context: Rc<HeadlessContext>,
    size: Cell<(u32, u32)>,
    supported: bool,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            context: Rc::new(HeadlessContext::new()),
            size: Cell::new((width, height)),
            supported: true,
        }
    }

    /// A surface that refuses to hand out a context.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new(1, 1)
        }
    }

    pub fn context_handle(&self) -> &Rc<HeadlessContext> {
        &self.context
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.size.set((width, height));
    }
}

impl Surface for HeadlessSurface {
    fn context(&self) -> Result<Rc<dyn GraphicsContext>> {
        if !self.supported {
            return Err(RenderError::UnsupportedContext(
                "headless surface has no graphics context".into(),
            ));
        }
        Ok(self.context.clone())
    }

    fn size(&self) -> (u32, u32) {
        self.size.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = "#version 300 es\nin vec2 a_0;\nin vec2 a_1;\nuniform mat4 u_view;\n\
                          void main() { gl_Position = u_view * vec4(a_0, 0.0, 1.0); }";
    const FRAGMENT: &str = "#version 300 es\nprecision highp float;\nuniform vec4 u_0;\n\
                            uniform float u_unused;\nout vec4 c;\nvoid main() { c = u_0; }";

    #[test]
    fn unreferenced_inputs_are_elided() {
        let gl = HeadlessContext::new();
        let program = gl.create_program(VERTEX, FRAGMENT).unwrap();
        assert_eq!(gl.attribute_location(program, "a_0"), Some(0));
        assert_eq!(gl.attribute_location(program, "a_1"), None);
        assert!(gl.uniform_location(program, "u_view").is_some());
        assert!(gl.uniform_location(program, "u_0").is_some());
        assert_eq!(gl.uniform_location(program, "u_unused"), None);
    }

    #[test]
    fn commented_uses_do_not_keep_an_input_alive() {
        let gl = HeadlessContext::new();
        let fragment = "#version 300 es\nprecision highp float;\nuniform float u_0;\n\
                        // u_0\nout vec4 c;\nvoid main() { c = vec4(1.0); }";
        let program = gl.create_program(VERTEX, fragment).unwrap();
        assert_eq!(gl.uniform_location(program, "u_0"), None);
    }

    #[test]
    fn error_directive_fails_the_stage() {
        let gl = HeadlessContext::new();
        let err = gl
            .create_program(VERTEX, "#error nope\nvoid main() {}")
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::ProgramBuildFailure {
                stage: BuildStage::Fragment,
                log: "ERROR: 0:1: '#error' : user error directive".into(),
            }
        );
        assert!(gl.create_program("in vec2 a;", FRAGMENT).is_err());
        assert_eq!(gl.stats().links, 0);
    }

    #[test]
    fn unsupported_surface_has_no_context() {
        let surface = HeadlessSurface::unsupported();
        assert!(matches!(
            surface.context(),
            Err(RenderError::UnsupportedContext(_))
        ));
    }

    #[test]
    fn reads_back_the_clear_colour() {
        let gl = HeadlessContext::new();
        gl.clear([1.0, 0.0, 0.0, 1.0], 1.0);
        let mut out = [0_u8; 8];
        gl.read_pixels(0, 0, 2, 1, TextureFormat::Rgba, PixelType::UnsignedByte, &mut out);
        assert_eq!(out, [255, 0, 0, 255, 255, 0, 0, 255]);
    }
}
