//! Resource binder: turns compiled tokens into GPU resources and update closures.
//!
//! Binding runs once per (shader, program). Each token allocates what it needs
//! up front and registers one closure in the program's [`UpdateQueue`]; the
//! closure is what runs every frame. Attribute buffers and texture pixels are
//! only re-uploaded when the accessor hands back a different allocation.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroU32;
use std::rc::Rc;

use template::{
    check_attribute_data, texture_layout, AttributeToken, BufferTarget, CompiledShader,
    DataType, NamedToken, Sampler2DToken, SamplerOptions, TextureSource, Token, TokenKind,
    TokenType, TypedArray, UniformToken, UniformValue,
};
use tracing::{debug, trace, warn};

use crate::context::GraphicsContext;
use crate::error::{RenderError, Result};
use crate::texture::texture_image;
use crate::types::{
    BufferHandle, IndexType, ProgramHandle, ShaderStage, TextureHandle, TextureParameters,
    UniformLocation, VertexArrayHandle, VertexLayout,
};
use crate::uniforms::UniformSetter;

pub type UpdateFn = Box<dyn FnMut(&dyn GraphicsContext)>;

/// GPU-side binding point that identifies an update closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSlot {
    Attribute(u32),
    Elements,
    Uniform(UniformLocation),
}

/// Per-program closures, flushed in registration order before each draw.
#[derive(Default)]
pub struct UpdateQueue {
    entries: Vec<(BindingSlot, UpdateFn)>,
}

impl UpdateQueue {
    /// Registers `update` for `slot`, replacing any closure already there.
    ///
    /// Returns `true` when an existing closure was replaced.
    pub fn register(&mut self, slot: BindingSlot, update: UpdateFn) -> bool {
        match self.entries.iter_mut().find(|(existing, _)| *existing == slot) {
            Some(entry) => {
                entry.1 = update;
                true
            }
            None => {
                self.entries.push((slot, update));
                false
            }
        }
    }

    pub fn flush(&mut self, gl: &dyn GraphicsContext) {
        for (_, update) in &mut self.entries {
            update(gl);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn slots(&self) -> impl Iterator<Item = BindingSlot> + '_ {
        self.entries.iter().map(|(slot, _)| *slot)
    }
}

impl fmt::Debug for UpdateQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.slots()).finish()
    }
}

/// Render targets whose new content means the owning stack should draw again.
#[derive(Clone, Default)]
pub struct RedrawRequest {
    pending: Rc<RefCell<Vec<NonZeroU32>>>,
}

impl RedrawRequest {
    pub fn request(&self, source: NonZeroU32) {
        let mut pending = self.pending.borrow_mut();
        if !pending.contains(&source) {
            pending.push(source);
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    /// Clears pending requests, reporting whether there were any.
    pub fn take(&self) -> bool {
        let mut pending = self.pending.borrow_mut();
        let any = !pending.is_empty();
        pending.clear();
        any
    }

    pub(crate) fn discard(&self, sources: &[NonZeroU32]) {
        self.pending
            .borrow_mut()
            .retain(|source| !sources.contains(source));
    }

    /// Callback that records a request without keeping the stack alive.
    fn listener(&self, source: NonZeroU32) -> Box<dyn Fn()> {
        let pending = Rc::downgrade(&self.pending);
        Box::new(move || {
            if let Some(pending) = pending.upgrade() {
                let mut pending = pending.borrow_mut();
                if !pending.contains(&source) {
                    pending.push(source);
                }
            }
        })
    }
}

/// Why a token could not be attached to its shader input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReason {
    /// Declared in the source but optimized away by the shader compiler.
    Elided,
    /// Not declared where the program can see it; usually a name mismatch.
    Undeclared,
}

/// A skipped binding. Never fatal: the draw proceeds without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingBinding {
    pub name: String,
    pub token_type: TokenType,
    pub stage: ShaderStage,
    pub reason: MissingReason,
}

impl MissingBinding {
    fn report(&self) {
        match self.reason {
            MissingReason::Elided => debug!(
                name = %self.name,
                stage = ?self.stage,
                reason = "elided",
                "binding skipped: input optimized out by the shader compiler"
            ),
            MissingReason::Undeclared => warn!(
                name = %self.name,
                stage = ?self.stage,
                reason = "undeclared",
                "binding skipped: no matching declaration"
            ),
        }
    }
}

/// Index count and type of the buffer bound to a program's vertex array.
pub(crate) type ElementCount = Rc<Cell<Option<(usize, IndexType)>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
}

/// Everything binding writes into on behalf of one program.
pub struct ProgramState {
    pub(crate) handle: ProgramHandle,
    pub(crate) vertex_array: VertexArrayHandle,
    pub(crate) queue: UpdateQueue,
    pub(crate) resources: Vec<Resource>,
    pub(crate) next_unit: u32,
    pub(crate) elements: ElementCount,
    pub(crate) missing: Vec<MissingBinding>,
    pub(crate) attribute_modes: Vec<template::DrawMode>,
}

impl ProgramState {
    pub(crate) fn new(handle: ProgramHandle, vertex_array: VertexArrayHandle) -> Self {
        Self {
            handle,
            vertex_array,
            queue: UpdateQueue::default(),
            resources: Vec::new(),
            next_unit: 0,
            elements: Rc::new(Cell::new(None)),
            missing: Vec::new(),
            attribute_modes: Vec::new(),
        }
    }

    /// Frees every buffer and texture allocated by binding.
    pub(crate) fn release(&mut self, gl: &dyn GraphicsContext) {
        for resource in self.resources.drain(..) {
            match resource {
                Resource::Buffer(buffer) => gl.delete_buffer(buffer),
                Resource::Texture(texture) => gl.delete_texture(texture),
            }
        }
    }
}

/// Attaches a compiled shader's tokens to a program.
pub trait BindShader {
    fn bind(
        &self,
        gl: &Rc<dyn GraphicsContext>,
        state: &mut ProgramState,
        stage: ShaderStage,
        redraw: &RedrawRequest,
    ) -> Result<()>;
}

impl BindShader for CompiledShader {
    fn bind(
        &self,
        gl: &Rc<dyn GraphicsContext>,
        state: &mut ProgramState,
        stage: ShaderStage,
        redraw: &RedrawRequest,
    ) -> Result<()> {
        let declared: HashSet<&str> = self.declared_names().collect();
        let mut binder = Binder {
            gl: gl.as_ref(),
            state,
            stage,
            declared,
            redraw,
        };
        for named in self.tokens() {
            binder.bind_token(named)?;
        }
        Ok(())
    }
}

/// Binds an index token handed to the program outside of its shader text.
pub(crate) fn bind_index_token(
    gl: &Rc<dyn GraphicsContext>,
    state: &mut ProgramState,
    token: &Token,
) -> Result<()> {
    let TokenKind::Attribute(attribute) = token.kind() else {
        return Err(RenderError::Resource(format!(
            "{:?} token cannot feed an indexed draw",
            token.token_type()
        )));
    };
    if attribute.options().target != BufferTarget::ElementArray {
        return Err(RenderError::Resource(
            "index token must target the element array".into(),
        ));
    }
    let name = token.explicit_name().unwrap_or("indices");
    let redraw = RedrawRequest::default();
    let mut binder = Binder {
        gl: gl.as_ref(),
        state,
        stage: ShaderStage::Vertex,
        declared: HashSet::new(),
        redraw: &redraw,
    };
    binder.bind_elements(name, attribute)
}

struct Binder<'a> {
    gl: &'a dyn GraphicsContext,
    state: &'a mut ProgramState,
    stage: ShaderStage,
    declared: HashSet<&'a str>,
    redraw: &'a RedrawRequest,
}

impl Binder<'_> {
    fn bind_token(&mut self, named: &NamedToken) -> Result<()> {
        let Some(data_type) = named.token.data_type() else {
            return Ok(());
        };
        match named.token.kind() {
            TokenKind::Attribute(attribute) => match attribute.options().target {
                BufferTarget::Array => self.bind_attribute(&named.name, data_type, attribute),
                BufferTarget::ElementArray => self.bind_elements(&named.name, attribute),
            },
            TokenKind::Uniform(uniform) => {
                self.bind_uniform(&named.name, data_type, uniform);
                Ok(())
            }
            TokenKind::Sampler2D(sampler) => self.bind_sampler(&named.name, sampler),
            TokenKind::Scope(_) => Ok(()),
        }
    }

    fn missing(&mut self, name: &str, token_type: TokenType) {
        let reason = if token_type == TokenType::Attribute && self.stage == ShaderStage::Fragment
        {
            MissingReason::Undeclared
        } else if self.declared.contains(name) {
            MissingReason::Elided
        } else {
            MissingReason::Undeclared
        };
        let missing = MissingBinding {
            name: name.to_owned(),
            token_type,
            stage: self.stage,
            reason,
        };
        missing.report();
        self.state.missing.push(missing);
    }

    fn register(&mut self, name: &str, slot: BindingSlot, update: UpdateFn) {
        if self.state.queue.register(slot, update) {
            debug!(name = %name, slot = ?slot, "replaced update closure for bound slot");
        }
    }

    fn bind_attribute(
        &mut self,
        name: &str,
        data_type: DataType,
        attribute: &AttributeToken,
    ) -> Result<()> {
        let Some(location) = self.gl.attribute_location(self.state.handle, name) else {
            self.missing(name, TokenType::Attribute);
            return Ok(());
        };
        if let Some(mode) = attribute.options().mode {
            self.state.attribute_modes.push(mode);
        }

        let gl = self.gl;
        let data = attribute.value();
        let buffer = gl.create_buffer()?;
        self.state.resources.push(Resource::Buffer(buffer));

        let integer = data_type.is_integer() || data_type.is_bool();
        let layout = move |data: &TypedArray| VertexLayout {
            components: data_type.components() as i32,
            element: data.element_kind(),
            integer,
        };
        gl.bind_vertex_array(Some(self.state.vertex_array));
        gl.bind_buffer(BufferTarget::Array, Some(buffer));
        gl.buffer_data(BufferTarget::Array, data.as_bytes());
        gl.vertex_attrib_pointer(location, layout(&data));
        gl.bind_vertex_array(None);
        trace!(name = %name, location, bytes = data.as_bytes().len(), "bound attribute");

        let accessor = attribute.accessor();
        let label = name.to_owned();
        let mut uploaded = data;
        self.register(
            name,
            BindingSlot::Attribute(location),
            Box::new(move |gl: &dyn GraphicsContext| {
                let current = accessor();
                if current.same_buffer(&uploaded) {
                    return;
                }
                if let Err(err) = check_attribute_data(data_type, BufferTarget::Array, &current) {
                    warn!(name = %label, %err, "attribute buffer rejected; keeping previous upload");
                    return;
                }
                gl.bind_buffer(BufferTarget::Array, Some(buffer));
                gl.buffer_data(BufferTarget::Array, current.as_bytes());
                if current.element_kind() != uploaded.element_kind() {
                    gl.vertex_attrib_pointer(location, layout(&current));
                }
                uploaded = current;
            }),
        );
        Ok(())
    }

    fn bind_elements(&mut self, name: &str, attribute: &AttributeToken) -> Result<()> {
        let gl = self.gl;
        let data = attribute.value();
        let Some(index_type) = IndexType::from_element(data.element_kind()) else {
            warn!(name = %name, element = %data.element_kind(), "index buffer needs unsigned data");
            return Ok(());
        };
        let buffer = gl.create_buffer()?;
        self.state.resources.push(Resource::Buffer(buffer));
        gl.bind_vertex_array(Some(self.state.vertex_array));
        gl.bind_buffer(BufferTarget::ElementArray, Some(buffer));
        gl.buffer_data(BufferTarget::ElementArray, data.as_bytes());
        gl.bind_vertex_array(None);
        self.state.elements.set(Some((data.len(), index_type)));

        let accessor = attribute.accessor();
        let elements = self.state.elements.clone();
        let label = name.to_owned();
        let mut uploaded = data;
        self.register(
            name,
            BindingSlot::Elements,
            Box::new(move |gl: &dyn GraphicsContext| {
                let current = accessor();
                if current.same_buffer(&uploaded) {
                    return;
                }
                let Some(index_type) = IndexType::from_element(current.element_kind()) else {
                    warn!(name = %label, "index buffer rejected; keeping previous upload");
                    return;
                };
                gl.bind_buffer(BufferTarget::ElementArray, Some(buffer));
                gl.buffer_data(BufferTarget::ElementArray, current.as_bytes());
                elements.set(Some((current.len(), index_type)));
                uploaded = current;
            }),
        );
        Ok(())
    }

    fn bind_uniform(&mut self, name: &str, data_type: DataType, uniform: &UniformToken) {
        let Some(location) = self.gl.uniform_location(self.state.handle, name) else {
            self.missing(name, TokenType::Uniform);
            return;
        };
        let setter = UniformSetter::for_type(data_type);
        let accessor = uniform.accessor();
        trace!(name = %name, ?location, ?setter, "bound uniform");
        self.register(
            name,
            BindingSlot::Uniform(location),
            Box::new(move |gl: &dyn GraphicsContext| setter.apply(gl, location, &accessor())),
        );
    }

    fn bind_sampler(&mut self, name: &str, sampler: &Sampler2DToken) -> Result<()> {
        let Some(location) = self.gl.uniform_location(self.state.handle, name) else {
            self.missing(name, TokenType::Sampler2D);
            return Ok(());
        };
        let gl = self.gl;
        let options = sampler.options().clone();
        let texture = gl.create_texture()?;
        self.state.resources.push(Resource::Texture(texture));
        let unit = self.state.next_unit;
        self.state.next_unit += 1;
        let setter = UniformSetter::for_type(DataType::Sampler2D);
        let unit_value = UniformValue::Int(unit as i32);

        gl.active_texture(unit);
        gl.bind_texture(Some(texture));
        gl.texture_parameters(TextureParameters {
            min_filter: options.min_filter,
            mag_filter: options.mag_filter,
            wrap: options.wrap,
        });
        debug!(name = %name, unit, texture = ?texture, "assigned texture unit");

        let accessor = sampler.accessor();
        let redraw = self.redraw.clone();
        let label = name.to_owned();
        let mut uploaded: Option<TypedArray> = None;
        // Surfaces keep their listeners, so each one is subscribed at most once.
        let mut subscribed: HashSet<NonZeroU32> = HashSet::new();
        if let TextureSource::Surface(surface) = accessor() {
            subscribe(&redraw, surface.as_ref(), &mut subscribed);
        }
        self.register(
            name,
            BindingSlot::Uniform(location),
            Box::new(move |gl: &dyn GraphicsContext| {
                gl.active_texture(unit);
                match accessor() {
                    TextureSource::Pixels(data) => {
                        gl.bind_texture(Some(texture));
                        if !uploaded.as_ref().is_some_and(|last| last.same_buffer(&data)) {
                            upload_pixels(gl, &label, &options, &data);
                            uploaded = Some(data);
                        }
                    }
                    TextureSource::Surface(surface) => {
                        let source = surface.texture_id();
                        gl.bind_texture(Some(source.map_or(texture, TextureHandle)));
                        subscribe(&redraw, surface.as_ref(), &mut subscribed);
                    }
                }
                setter.apply(gl, location, &unit_value);
            }),
        );
        Ok(())
    }
}

fn subscribe(
    redraw: &RedrawRequest,
    surface: &dyn template::RenderedSurface,
    subscribed: &mut HashSet<NonZeroU32>,
) {
    if let Some(source) = surface.texture_id() {
        if subscribed.insert(source) {
            surface.on_render(redraw.listener(source));
        }
    }
}

fn upload_pixels(gl: &dyn GraphicsContext, name: &str, options: &SamplerOptions, data: &TypedArray) {
    let layout = match texture_layout(options, data) {
        Ok(layout) => layout,
        Err(err) => {
            warn!(name = %name, %err, "texture data rejected; keeping previous upload");
            return;
        }
    };
    let Some(image) = texture_image(layout) else {
        warn!(name = %name, element = %layout.element, "no texture format for pixel data");
        return;
    };
    gl.tex_image_2d(image, Some(data.as_bytes()));
    trace!(name = %name, width = image.width, height = image.height, "uploaded texture");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, label: &'static str) -> UpdateFn {
        let log = log.clone();
        Box::new(move |_: &dyn GraphicsContext| log.borrow_mut().push(label))
    }

    #[test]
    fn registering_an_existing_slot_replaces_in_place() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = UpdateQueue::default();
        assert!(!queue.register(BindingSlot::Attribute(0), recorder(&log, "a")));
        assert!(!queue.register(BindingSlot::Uniform(UniformLocation(0)), recorder(&log, "u")));
        assert!(queue.register(BindingSlot::Attribute(0), recorder(&log, "a2")));
        assert_eq!(queue.len(), 2);

        let gl = crate::headless::HeadlessContext::new();
        queue.flush(&gl);
        assert_eq!(*log.borrow(), ["a2", "u"]);
    }

    #[test]
    fn redraw_listener_does_not_outlive_request() {
        let request = RedrawRequest::default();
        let source = NonZeroU32::new(3).unwrap();
        let listener = request.listener(source);
        listener();
        listener();
        assert!(request.is_pending());
        request.discard(&[source]);
        assert!(!request.take());
        drop(request);
        listener();
    }
}
