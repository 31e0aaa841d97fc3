//! Bundled demo scenes.
//!
//! Each scene is a list of passes (a template pair plus its draw). Building a
//! scene creates its tokens; mounting it compiles every pass into a stack.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::{Context, Result};
use renderer::{Draw, RenderTexture, Stack};
use stackconfig::LiveConfig;
use template::{
    attribute, glsl, uniform, SamplerOptions, ShaderTemplate, TextureFilter, TextureSource, Token,
};

const LAYER_SIZE: (u32, u32) = (64, 64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneKind {
    HelloWorld,
    Cube,
    RenderTexture,
}

impl SceneKind {
    pub const ALL: [SceneKind; 3] = [
        SceneKind::HelloWorld,
        SceneKind::Cube,
        SceneKind::RenderTexture,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SceneKind::HelloWorld => "hello-world",
            SceneKind::Cube => "cube",
            SceneKind::RenderTexture => "render-texture",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SceneKind::HelloWorld => "array draw of one triangle with a time uniform",
            SceneKind::Cube => "indexed cube with per-vertex colours and a cached program",
            SceneKind::RenderTexture => "the cube rendered into a texture sampled by a second pass",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Screen,
    Layer,
}

pub struct Pass {
    pub label: &'static str,
    pub vertex: ShaderTemplate,
    pub fragment: ShaderTemplate,
    pub draw: Draw,
    pub indices: Option<Token>,
    pub cached: bool,
    pub target: Target,
}

type LayerSlot = Rc<RefCell<Option<Rc<RenderTexture>>>>;

pub struct Scene {
    pub kind: SceneKind,
    pub passes: Vec<Pass>,
    /// Seconds of scene time; advanced by the replay loop.
    pub time: Rc<Cell<f32>>,
    layer: Option<LayerSlot>,
}

impl Scene {
    pub fn build(kind: SceneKind) -> Result<Self> {
        let time = Rc::new(Cell::new(0.0_f32));
        let mut scene = Scene {
            kind,
            passes: Vec::new(),
            time: time.clone(),
            layer: None,
        };
        match kind {
            SceneKind::HelloWorld => scene.passes.push(hello_world(&time)?),
            SceneKind::Cube => scene.passes.push(cube(&time, 1.0, Target::Screen)?),
            SceneKind::RenderTexture => {
                let slot: LayerSlot = Rc::new(RefCell::new(None));
                scene.passes.push(cube(&time, 1.0, Target::Layer)?);
                scene.passes.push(textured_quad(&slot)?);
                scene.layer = Some(slot);
            }
        }
        Ok(scene)
    }

    /// Compiles every pass into `stack`, creating the render texture first.
    pub fn mount(&self, stack: &mut Stack, config: &LiveConfig) -> Result<()> {
        let layer = match &self.layer {
            Some(slot) => {
                let texture = stack
                    .render_texture(LAYER_SIZE.0, LAYER_SIZE.1)
                    .context("failed to create render texture")?;
                *slot.borrow_mut() = Some(texture.clone());
                stack.add_layer(texture.clone());
                Some(texture)
            }
            None => None,
        };

        for pass in &self.passes {
            let mut program_config = config.program_config(pass.draw.clone());
            if let Some(indices) = &pass.indices {
                program_config = program_config.indices(indices.clone());
            }
            let cached = program_config.cache_enabled || pass.cached;
            let program = stack
                .compile(
                    &pass.vertex.compile(),
                    &pass.fragment.compile(),
                    program_config.cached(cached),
                )
                .with_context(|| format!("failed to build {} pass", pass.label))?;
            for missing in program.missing_bindings() {
                tracing::debug!(
                    pass = pass.label,
                    name = %missing.name,
                    reason = ?missing.reason,
                    "binding skipped"
                );
            }
            match (pass.target, &layer) {
                (Target::Layer, Some(texture)) => texture.add(program),
                _ => stack.add(program),
            }
        }
        Ok(())
    }
}

fn hello_world(time: &Rc<Cell<f32>>) -> Result<Pass> {
    let corners: Rc<[f32]> = vec![-0.5, -0.5, 0.5, -0.5, 0.0, 0.5].into();
    let position = attribute::vec2(move || corners.clone())
        .context("invalid triangle positions")?
        .with_name("a_position");
    let clock = time.clone();
    let seconds = uniform::float(move || clock.get()).with_name("u_time");

    Ok(Pass {
        label: "triangle",
        vertex: glsl!(
            "#version 300 es\nvoid main() { gl_Position = vec4(",
            &position,
            ", 0.0, 1.0); }",
        ),
        fragment: glsl!(
            "#version 300 es\nprecision highp float;\nout vec4 color;\n",
            "void main() { color = vec4(0.5 + 0.5 * sin(",
            &seconds,
            "), 0.3, 0.8, 1.0); }",
        ),
        draw: Draw::arrays(3),
        indices: None,
        cached: false,
        target: Target::Screen,
    })
}

const CUBE_CORNERS: [f32; 24] = [
    -1.0, -1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, -1.0, //
    -1.0, -1.0, 1.0, 1.0, -1.0, 1.0, 1.0, 1.0, 1.0, -1.0, 1.0, 1.0,
];

const CUBE_FACES: [u16; 36] = [
    0, 1, 2, 0, 2, 3, 4, 6, 5, 4, 7, 6, 0, 4, 5, 0, 5, 1, //
    3, 2, 6, 3, 6, 7, 0, 3, 7, 0, 7, 4, 1, 5, 6, 1, 6, 2,
];

fn cube(time: &Rc<Cell<f32>>, aspect: f32, target: Target) -> Result<Pass> {
    let corners: Rc<[f32]> = CUBE_CORNERS[..].into();
    let colors: Rc<[f32]> = CUBE_CORNERS.iter().map(|c| c * 0.5 + 0.5).collect();
    let faces: Rc<[u16]> = CUBE_FACES[..].into();

    let position = attribute::vec3(move || corners.clone())
        .context("invalid cube positions")?
        .with_name("a_position");
    let color = attribute::vec3(move || colors.clone())
        .context("invalid cube colours")?
        .with_name("a_color");
    let indices = attribute::indices(move || faces.clone()).context("invalid cube indices")?;
    let clock = time.clone();
    let model = uniform::mat4(move || model_matrix(clock.get())).with_name("u_model");
    let projection = uniform::mat4(move || perspective(aspect)).with_name("u_projection");
    let varying = Token::scope("v_color").context("invalid varying name")?;

    Ok(Pass {
        label: "cube",
        vertex: glsl!(
            "#version 300 es\nout vec3 ",
            &varying,
            ";\nvoid main() {\n  ",
            &varying,
            " = ",
            &color,
            ";\n  gl_Position = ",
            &projection,
            " * ",
            &model,
            " * vec4(",
            &position,
            ", 1.0);\n}",
        ),
        fragment: glsl!(
            "#version 300 es\nprecision highp float;\nin vec3 ",
            &varying,
            ";\nout vec4 color;\nvoid main() { color = vec4(",
            &varying,
            ", 1.0); }",
        ),
        draw: Draw::Elements(Vec::new()),
        indices: Some(indices),
        cached: true,
        target,
    })
}

fn textured_quad(slot: &LayerSlot) -> Result<Pass> {
    let corners: Rc<[f32]> = vec![
        -1.0, -1.0, 1.0, -1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0, 1.0,
    ]
    .into();
    let position = attribute::vec2(move || corners.clone())
        .context("invalid quad positions")?
        .with_name("a_corner");

    let source = slot.clone();
    let blank: Rc<[u8]> = vec![0, 0, 0, 255].into();
    let scene = uniform::sampler2d(
        move || match source.borrow().as_ref() {
            Some(layer) => TextureSource::Surface(layer.clone()),
            None => TextureSource::from(blank.clone()),
        },
        SamplerOptions {
            mag_filter: TextureFilter::Linear,
            min_filter: TextureFilter::Linear,
            ..SamplerOptions::default()
        },
    )
    .context("invalid scene sampler")?
    .with_name("u_scene");
    let uv = Token::scope("v_uv").context("invalid varying name")?;

    Ok(Pass {
        label: "composite",
        vertex: glsl!(
            "#version 300 es\nout vec2 ",
            &uv,
            ";\nvoid main() {\n  ",
            &uv,
            " = ",
            &position,
            " * 0.5 + 0.5;\n  gl_Position = vec4(",
            &position,
            ", 0.0, 1.0);\n}",
        ),
        fragment: glsl!(
            "#version 300 es\nprecision highp float;\nin vec2 ",
            &uv,
            ";\nout vec4 color;\nvoid main() { color = texture(",
            &scene,
            ", ",
            &uv,
            "); }",
        ),
        draw: Draw::arrays(6),
        indices: None,
        cached: false,
        target: Target::Screen,
    })
}

/// Column-major rotation about Y then X, pushed 4 units down -Z.
fn model_matrix(seconds: f32) -> [f32; 16] {
    let (sy, cy) = seconds.sin_cos();
    let (sx, cx) = (seconds * 0.5).sin_cos();
    [
        cy,
        sx * sy,
        -cx * sy,
        0.0,
        0.0,
        cx,
        sx,
        0.0,
        sy,
        -sx * cy,
        cx * cy,
        0.0,
        0.0,
        0.0,
        -4.0,
        1.0,
    ]
}

fn perspective(aspect: f32) -> [f32; 16] {
    let (near, far) = (0.1_f32, 100.0_f32);
    let focal = 1.0 / (std::f32::consts::FRAC_PI_4 / 2.0).tan();
    let depth = 1.0 / (near - far);
    [
        focal / aspect,
        0.0,
        0.0,
        0.0,
        0.0,
        focal,
        0.0,
        0.0,
        0.0,
        0.0,
        (far + near) * depth,
        -1.0,
        0.0,
        0.0,
        2.0 * far * near * depth,
        0.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::{HeadlessSurface, StackOptions};

    #[test]
    fn every_scene_compiles_and_mounts() {
        for kind in SceneKind::ALL {
            let surface = HeadlessSurface::new(32, 32);
            let mut stack = Stack::new(&surface, StackOptions::default()).unwrap();
            let scene = Scene::build(kind).unwrap();
            scene.mount(&mut stack, &LiveConfig::default()).unwrap();
            stack.render();
            assert!(surface.context_handle().stats().draws >= 1, "{}", kind.name());
            for program in stack.programs() {
                assert!(program.missing_bindings().is_empty(), "{}", kind.name());
            }
        }
    }

    #[test]
    fn cube_declares_named_inputs_once() {
        let scene = Scene::build(SceneKind::Cube).unwrap();
        let vertex = scene.passes[0].vertex.compile();
        let source = vertex.source();
        assert_eq!(source.matches("uniform mat4 u_model;").count(), 1);
        assert!(source.contains("in vec3 a_position;"));
        assert!(source.contains("in vec3 a_color;"));
        assert!(!source.contains("in vec3 v_color;"));
        assert!(!source.contains("a_0"), "{source}");
        assert!(scene.passes[0].indices.is_some());
    }

    #[test]
    fn render_texture_scene_samples_its_layer() {
        let surface = HeadlessSurface::new(32, 32);
        let mut stack = Stack::new(&surface, StackOptions::default()).unwrap();
        let scene = Scene::build(SceneKind::RenderTexture).unwrap();
        scene.mount(&mut stack, &LiveConfig::default()).unwrap();
        stack.render();
        // The cube draws into the layer, the composite onto the surface.
        assert_eq!(surface.context_handle().stats().draws, 2);
        assert!(!stack.take_redraw_request());
    }
}
