use template::{DataType, UniformValue};
use tracing::warn;

use crate::context::GraphicsContext;
use crate::types::UniformLocation;

/// Driver entry point a uniform is pushed through, chosen once per token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformSetter {
    /// `uniform{n}fv`
    Float(usize),
    /// `uniform{n}iv`; bools travel as 0/1.
    Int(usize),
    /// `uniformMatrix{n}fv`
    Matrix(usize),
    /// Sampler unit index, pushed with `uniform1i`.
    Sampler,
}

impl UniformSetter {
    pub fn for_type(data_type: DataType) -> Self {
        if data_type == DataType::Sampler2D {
            return UniformSetter::Sampler;
        }
        if let Some(dimension) = data_type.matrix_dimension() {
            return UniformSetter::Matrix(dimension);
        }
        if data_type.is_integer() || data_type.is_bool() {
            UniformSetter::Int(data_type.components())
        } else {
            UniformSetter::Float(data_type.components())
        }
    }

    /// Pushes `value`; a value of the wrong shape is skipped with a warning.
    pub fn apply(self, gl: &dyn GraphicsContext, location: UniformLocation, value: &UniformValue) {
        match self {
            UniformSetter::Float(components) => match value.as_floats() {
                Some(floats) if floats.len() == components => {
                    gl.uniform_f32(location, components, floats)
                }
                _ => mismatch(self, value),
            },
            UniformSetter::Matrix(dimension) => match value.as_floats() {
                Some(floats) if floats.len() == dimension * dimension => {
                    gl.uniform_matrix(location, dimension, floats)
                }
                _ => mismatch(self, value),
            },
            UniformSetter::Int(components) => match value.to_ints() {
                Some(ints) if ints.len() == components => {
                    gl.uniform_i32(location, components, &ints)
                }
                _ => mismatch(self, value),
            },
            UniformSetter::Sampler => match value {
                UniformValue::Int(unit) => gl.uniform_i32(location, 1, &[*unit]),
                _ => mismatch(self, value),
            },
        }
    }
}

fn mismatch(setter: UniformSetter, value: &UniformValue) {
    warn!(
        setter = ?setter,
        value = %value.data_type(),
        "uniform value does not fit its declared type; skipping"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_follow_data_type() {
        assert_eq!(UniformSetter::for_type(DataType::Vec3), UniformSetter::Float(3));
        assert_eq!(UniformSetter::for_type(DataType::BVec2), UniformSetter::Int(2));
        assert_eq!(UniformSetter::for_type(DataType::IVec4), UniformSetter::Int(4));
        assert_eq!(UniformSetter::for_type(DataType::Mat4), UniformSetter::Matrix(4));
        assert_eq!(UniformSetter::for_type(DataType::Mat2), UniformSetter::Matrix(2));
        assert_eq!(UniformSetter::for_type(DataType::Sampler2D), UniformSetter::Sampler);
    }
}
