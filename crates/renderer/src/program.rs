use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use template::{BufferTarget, CompiledShader, DrawMode, TemplateId, Token, TypedArray};
use tracing::{debug, info, warn};

use crate::bind::{
    bind_index_token, BindShader, MissingBinding, ProgramState, RedrawRequest, Resource, UpdateQueue,
};
use crate::context::GraphicsContext;
use crate::error::{RenderError, Result};
use crate::types::{BuildStage, IndexType, ProgramHandle, ShaderStage};

/// Which vertices a draw consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draw {
    Arrays { first: i32, count: i32 },
    /// Indexed draw. An index token bound to the program takes over from
    /// these indices and its current length becomes the draw count.
    Elements(Vec<u32>),
}

impl Draw {
    pub fn arrays(count: i32) -> Self {
        Draw::Arrays { first: 0, count }
    }
}

pub struct ProgramConfig {
    /// Primitive topology; defaults to the first attribute's mode hint, then triangles.
    pub mode: Option<DrawMode>,
    pub draw: Draw,
    /// Index buffer read through a token, re-uploaded when its allocation changes.
    pub indices: Option<Token>,
    /// Reuse the linked program of an identical template pair.
    pub cache_enabled: bool,
    /// Runs after the update queue flush, right before the draw.
    pub on_render: Option<Box<dyn FnMut()>>,
}

impl ProgramConfig {
    pub fn new(draw: Draw) -> Self {
        Self {
            mode: None,
            draw,
            indices: None,
            cache_enabled: false,
            on_render: None,
        }
    }

    pub fn mode(mut self, mode: DrawMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Draws indexed from `token`, an [`attribute::indices`](template::attribute::indices) token.
    pub fn indices(mut self, token: Token) -> Self {
        if matches!(self.draw, Draw::Arrays { .. }) {
            self.draw = Draw::Elements(Vec::new());
        }
        self.indices = Some(token);
        self
    }

    pub fn cached(mut self, cache_enabled: bool) -> Self {
        self.cache_enabled = cache_enabled;
        self
    }

    pub fn on_render(mut self, hook: impl FnMut() + 'static) -> Self {
        self.on_render = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for ProgramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramConfig")
            .field("mode", &self.mode)
            .field("draw", &self.draw)
            .field("indices", &self.indices)
            .field("cache_enabled", &self.cache_enabled)
            .field("on_render", &self.on_render.is_some())
            .finish()
    }
}

/// Compiles and links template pairs, caching by template identity.
///
/// The cache is nested (vertex identity, then fragment identity) and never
/// evicts: template identities are tied to call sites, so it stays bounded.
pub struct ProgramManager {
    gl: Rc<dyn GraphicsContext>,
    cache: HashMap<TemplateId, HashMap<TemplateId, ProgramHandle>>,
    links: usize,
}

impl ProgramManager {
    pub fn new(gl: Rc<dyn GraphicsContext>) -> Self {
        Self {
            gl,
            cache: HashMap::new(),
            links: 0,
        }
    }

    /// Number of programs linked so far.
    pub fn links(&self) -> usize {
        self.links
    }

    pub fn cached(&self, vertex: TemplateId, fragment: TemplateId) -> Option<ProgramHandle> {
        self.cache.get(&vertex)?.get(&fragment).copied()
    }

    /// Links (or reuses) a program for the pair and binds every token to it.
    pub fn compile(
        &mut self,
        vertex: &CompiledShader,
        fragment: &CompiledShader,
        config: ProgramConfig,
        redraw: &RedrawRequest,
    ) -> Result<Program> {
        check_shared_names(vertex, fragment)?;
        let (handle, owned) = self.link(vertex, fragment, config.cache_enabled)?;
        let vertex_array = match self.gl.create_vertex_array() {
            Ok(vertex_array) => vertex_array,
            Err(err) => {
                if owned {
                    self.gl.delete_program(handle);
                }
                return Err(err);
            }
        };

        let mut program = Program {
            state: ProgramState::new(handle, vertex_array),
            gl: self.gl.clone(),
            mode: DrawMode::Triangles,
            draw: config.draw,
            on_render: config.on_render,
            owned,
        };
        vertex.bind(&self.gl, &mut program.state, ShaderStage::Vertex, redraw)?;
        fragment.bind(&self.gl, &mut program.state, ShaderStage::Fragment, redraw)?;
        if let Some(token) = &config.indices {
            bind_index_token(&self.gl, &mut program.state, token)?;
        }

        program.mode = config
            .mode
            .or_else(|| program.state.attribute_modes.first().copied())
            .unwrap_or_default();
        if let Draw::Elements(indices) = program.draw.clone() {
            if program.state.elements.get().is_none() {
                program.upload_indices(&indices)?;
            }
        }
        debug!(
            program = ?handle,
            mode = ?program.mode,
            updates = program.state.queue.len(),
            missing = program.state.missing.len(),
            "program ready"
        );
        Ok(program)
    }

    fn link(
        &mut self,
        vertex: &CompiledShader,
        fragment: &CompiledShader,
        cache_enabled: bool,
    ) -> Result<(ProgramHandle, bool)> {
        if cache_enabled {
            if let Some(handle) = self.cached(vertex.template(), fragment.template()) {
                debug!(
                    program = ?handle,
                    vertex = vertex.template().get(),
                    fragment = fragment.template().get(),
                    "program cache hit"
                );
                return Ok((handle, false));
            }
        }

        let handle = self.gl.create_program(vertex.source(), fragment.source())?;
        self.links += 1;
        info!(
            program = ?handle,
            vertex = vertex.template().get(),
            fragment = fragment.template().get(),
            cached = cache_enabled,
            "linked program"
        );
        if cache_enabled {
            self.cache
                .entry(vertex.template())
                .or_default()
                .insert(fragment.template(), handle);
        }
        Ok((handle, !cache_enabled))
    }
}

impl Drop for ProgramManager {
    fn drop(&mut self) {
        for handle in self.cache.values().flat_map(HashMap::values) {
            self.gl.delete_program(*handle);
        }
    }
}

/// Both stages may synthesize the same name for different tokens. Matching
/// types link and share one location, so the fragment binding wins; differing
/// types cannot link.
fn check_shared_names(vertex: &CompiledShader, fragment: &CompiledShader) -> Result<()> {
    for named in fragment.tokens() {
        let Some(fragment_type) = named.token.data_type() else {
            continue;
        };
        let Some(other) = vertex
            .tokens()
            .iter()
            .find(|other| other.name == named.name && other.token.id() != named.token.id())
        else {
            continue;
        };
        match other.token.data_type() {
            Some(vertex_type) if vertex_type != fragment_type => {
                return Err(RenderError::ProgramBuildFailure {
                    stage: BuildStage::Link,
                    log: format!(
                        "'{}' is declared {vertex_type} in the vertex stage and {fragment_type} \
                         in the fragment stage; give one of the tokens an explicit name",
                        named.name
                    ),
                });
            }
            Some(_) => warn!(
                name = %named.name,
                "vertex and fragment stages bind different tokens to the same name; \
                 the fragment binding wins"
            ),
            None => {}
        }
    }
    Ok(())
}

/// A linked program together with its bindings and draw call.
pub struct Program {
    state: ProgramState,
    gl: Rc<dyn GraphicsContext>,
    mode: DrawMode,
    draw: Draw,
    on_render: Option<Box<dyn FnMut()>>,
    owned: bool,
}

impl Program {
    pub fn handle(&self) -> ProgramHandle {
        self.state.handle
    }

    pub fn mode(&self) -> DrawMode {
        self.mode
    }

    pub fn draw(&self) -> &Draw {
        &self.draw
    }

    pub fn queue(&self) -> &UpdateQueue {
        &self.state.queue
    }

    /// Bindings skipped because their input could not be located.
    pub fn missing_bindings(&self) -> &[MissingBinding] {
        &self.state.missing
    }

    /// Activates the program, flushes its updates and issues the draw.
    pub fn render(&mut self) {
        let gl = self.gl.as_ref();
        gl.use_program(Some(self.state.handle));
        gl.bind_vertex_array(Some(self.state.vertex_array));
        self.state.queue.flush(gl);
        if let Some(hook) = self.on_render.as_mut() {
            hook();
        }
        match &self.draw {
            Draw::Arrays { first, count } => gl.draw_arrays(self.mode, *first, *count),
            Draw::Elements(_) => match self.state.elements.get() {
                Some((count, index_type)) => gl.draw_elements(self.mode, count as i32, index_type),
                None => warn!(program = ?self.state.handle, "indexed draw without an index buffer"),
            },
        }
        gl.bind_vertex_array(None);
    }

    fn upload_indices(&mut self, indices: &[u32]) -> Result<()> {
        let gl = self.gl.as_ref();
        let data = TypedArray::from(indices);
        let buffer = gl.create_buffer()?;
        self.state.resources.push(Resource::Buffer(buffer));
        gl.bind_vertex_array(Some(self.state.vertex_array));
        gl.bind_buffer(BufferTarget::ElementArray, Some(buffer));
        gl.buffer_data(BufferTarget::ElementArray, data.as_bytes());
        gl.bind_vertex_array(None);
        self.state.elements.set(Some((indices.len(), IndexType::U32)));
        Ok(())
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("handle", &self.state.handle)
            .field("mode", &self.mode)
            .field("draw", &self.draw)
            .field("queue", &self.state.queue)
            .finish()
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        self.state.release(self.gl.as_ref());
        self.gl.delete_vertex_array(self.state.vertex_array);
        if self.owned {
            self.gl.delete_program(self.state.handle);
        }
    }
}
