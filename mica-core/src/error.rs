use thiserror::Error;

/// Errors produced by any stage of the compiler pipeline.
///
/// The pipeline never recovers locally: the first error at any stage is
/// returned to the driver. Scanner diagnostics for isolated unexpected
/// characters are the one exception; they travel on the artifact's side
/// channel instead of aborting.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("lex error at line {line}: {message}")]
    Lex { line: u32, message: String },
    #[error("parse error at line {line}: {message}")]
    Parse { line: u32, message: String },
    #[error("semantic error: {0}")]
    Semantic(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl CoreError {
    pub fn lex(line: u32, message: impl Into<String>) -> Self {
        CoreError::Lex {
            line,
            message: message.into(),
        }
    }

    pub fn parse(line: u32, message: impl Into<String>) -> Self {
        CoreError::Parse {
            line,
            message: message.into(),
        }
    }
}
