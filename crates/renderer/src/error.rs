use crate::types::BuildStage;

/// Fatal failures surfaced by stacks, programs and readback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("context unsupported: {0}")]
    UnsupportedContext(String),
    #[error("program build failed ({stage}): {log}")]
    ProgramBuildFailure { stage: BuildStage, log: String },
    #[error("gpu resource allocation failed: {0}")]
    Resource(String),
    #[error("invalid readback: {0}")]
    InvalidReadback(String),
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
