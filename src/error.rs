use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while compiling a SQL template or resolving registry
/// entries. Render-time data mismatches are not errors; they degrade to
/// empty output and are reported through `tracing`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unclosed string literal starting at offset {offset}")]
    UnclosedString { offset: usize },

    #[error("integer literal at offset {offset} does not fit in 32 bits")]
    IntegerOutOfRange { offset: usize },

    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("unexpected content after the end of the template")]
    TrailingInput,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown sql template \"{0}\"")]
    UnknownTemplate(String),

    #[error("unknown section \"{section}\" in sql template \"{name}\"")]
    UnknownSection { name: String, section: String },

    #[error("section \"{section}\" of sql template \"{name}\" must be a string or an object with a string \"sql\" member")]
    InvalidSection { name: String, section: String },
}
