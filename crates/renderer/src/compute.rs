//! Fragment-shader computations over a typed input buffer.
//!
//! The input is uploaded as a one-row sampler, a caller-provided GLSL body
//! computes one output texel per input texel over a fullscreen quad, and the
//! result is read back from a float (or byte) target of the same size.

use std::rc::Rc;

use template::{
    attribute, glsl, uniform, ElementKind, SamplerOptions, ShaderTemplate, TextureFormat, Token,
    TypedArray,
};

use crate::context::Surface;
use crate::error::{RenderError, Result};
use crate::program::{Draw, ProgramConfig};
use crate::stack::{PixelBuffer, ReadConfig, Stack, StackOptions};
use crate::types::{InternalFormat, PixelType};

const QUAD: [f32; 12] = [
    -1.0, -1.0, 1.0, -1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0, 1.0,
];

/// Output shape of a computation. Unset formats follow the input: byte input
/// reads back `R8` bytes, anything else `R32F` floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComputeConfig {
    /// Defaults to the input length over the format's components.
    pub width: Option<u32>,
    /// Defaults to 1.
    pub height: Option<u32>,
    /// Channel layout of both input and output; defaults to red.
    pub format: Option<TextureFormat>,
    pub data_type: Option<PixelType>,
    pub internal_format: Option<InternalFormat>,
}

impl ComputeConfig {
    fn format(&self) -> TextureFormat {
        self.format.unwrap_or(TextureFormat::Red)
    }

    fn output(&self, element: ElementKind) -> (InternalFormat, PixelType) {
        let (internal_format, data_type) = match element {
            ElementKind::U8 => (InternalFormat::R8, PixelType::UnsignedByte),
            _ => (InternalFormat::R32F, PixelType::Float),
        };
        (
            self.internal_format.unwrap_or(internal_format),
            self.data_type.unwrap_or(data_type),
        )
    }
}

pub struct Computation {
    stack: Stack,
    input: Rc<dyn Fn() -> TypedArray>,
    config: ComputeConfig,
}

impl Computation {
    /// Builds the computation; `body` receives the input sampler and returns
    /// the statements of `vec4 compute()`.
    pub fn new<F, B>(surface: &dyn Surface, input: F, body: B, config: ComputeConfig) -> Result<Self>
    where
        F: Fn() -> TypedArray + 'static,
        B: FnOnce(&Token) -> ShaderTemplate,
    {
        let input: Rc<dyn Fn() -> TypedArray> = Rc::new(input);
        let (_, height) = dimensions(&input(), config)?;
        let sampled = input.clone();
        let sampler = uniform::sampler2d(
            move || sampled(),
            SamplerOptions {
                width: config.width,
                height: Some(height),
                format: config.format(),
                ..SamplerOptions::default()
            },
        )
        .map_err(|err| RenderError::Resource(err.to_string()))?;

        let corners: Rc<[f32]> = QUAD[..].into();
        let quad = attribute::vec2(move || corners.clone())
            .map_err(|err| RenderError::Resource(err.to_string()))?;
        let vertex = glsl!(
            "#version 300 es\nvoid main() { gl_Position = vec4(",
            quad,
            ", 0.0, 1.0); }",
        );
        let fragment = glsl!(
            "#version 300 es\nprecision highp float;\nout vec4 outColor;\nvec4 compute() {",
            body(&sampler),
            "}\nvoid main() { outColor = compute(); }",
        );

        let mut stack = Stack::new(surface, StackOptions::default())?;
        let program = stack.compile(
            &vertex.compile(),
            &fragment.compile(),
            ProgramConfig::new(Draw::arrays(6)),
        )?;
        stack.add(program);
        Ok(Self {
            stack,
            input,
            config,
        })
    }

    /// Runs the shader over the current input and returns one value per texel.
    pub fn run(&mut self) -> Result<PixelBuffer> {
        let input = (self.input)();
        let (width, height) = dimensions(&input, self.config)?;
        let (internal_format, data_type) = self.config.output(input.element_kind());
        self.stack.read(ReadConfig {
            width: Some(width),
            height: Some(height),
            format: self.config.format(),
            data_type,
            internal_format,
            ..ReadConfig::default()
        })
    }
}

fn dimensions(input: &TypedArray, config: ComputeConfig) -> Result<(u32, u32)> {
    let height = config.height.unwrap_or(1);
    let texels = input.len() / config.format().components();
    let width = config.width.unwrap_or(texels as u32 / height.max(1));
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidReadback(
            "computation input is empty".into(),
        ));
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessSurface;

    #[test]
    fn float_input_reads_back_one_float_per_element() {
        let surface = HeadlessSurface::new(1, 1);
        let input: Rc<[f32]> = vec![1.0, 2.0, 3.0, 4.0].into();
        let mut computation = Computation::new(
            &surface,
            move || TypedArray::from(input.clone()),
            |sampler| {
                glsl!(
                    "return texture(",
                    sampler,
                    ", gl_FragCoord.xy / vec2(4.0, 1.0)) * 2.0;",
                )
            },
            ComputeConfig::default(),
        )
        .unwrap();
        match computation.run().unwrap() {
            PixelBuffer::F32(values) => assert_eq!(values.len(), 4),
            other => panic!("expected floats, got {other:?}"),
        }
    }

    #[test]
    fn output_formats_can_be_overridden() {
        let surface = HeadlessSurface::new(1, 1);
        let input: Rc<[f32]> = vec![0.25; 8].into();
        let mut computation = Computation::new(
            &surface,
            move || TypedArray::from(input.clone()),
            |sampler| glsl!("return texture(", sampler, ", vec2(0.0));"),
            ComputeConfig {
                format: Some(TextureFormat::Rg),
                data_type: Some(PixelType::UnsignedByte),
                internal_format: Some(InternalFormat::Rg8),
                ..ComputeConfig::default()
            },
        )
        .unwrap();
        // Eight floats as two-channel texels make a 4x1 target.
        match computation.run().unwrap() {
            PixelBuffer::U8(values) => assert_eq!(values.len(), 8),
            other => panic!("expected bytes, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        let surface = HeadlessSurface::new(1, 1);
        let result = Computation::new(
            &surface,
            || TypedArray::from(Vec::<f32>::new()),
            |_| glsl!("return vec4(0.0);"),
            ComputeConfig::default(),
        );
        assert!(result.is_err());
    }
}
