use thiserror::Error;

use crate::format::TextureChannels;
use crate::program::ProgramKind;

#[derive(Error, Debug)]
pub enum FluidError {
    #[error("precondition violated: {0}")]
    PreconditionViolation(&'static str),
    #[error("no renderable {0} texture format is available")]
    DisabledFeature(TextureChannels),
    #[error("failed to compile {program} program: {message}")]
    Compile { program: ProgramKind, message: String },
    #[error("render backend error: {0}")]
    Backend(String),
    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, FluidError>;
