use serde::{Deserialize, Serialize};

/// Encoding a vector line was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorMode {
    /// `[1.0 2.0 3.0]`, possibly spread over several physical lines
    Bracketed,
    /// `1.0 2.0 3.0`
    Unbracketed,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),
    #[error("Reader '{reader}' invoked on a line without its trigger '{trigger}': {line:?}")]
    ContractViolation {
        reader: String,
        trigger: String,
        line: String,
    },
    #[error("No '[' found in {text:?}")]
    MissingBracket { text: String },
    #[error("Stream ended before ']' closing {text:?}")]
    UnterminatedBracket { text: String },
    #[error("No numeric tokens in {text:?}")]
    NoNumericTokens { text: String },
    #[error("Invalid number {token:?} in {text:?}")]
    InvalidNumber { token: String, text: String },
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("Stream exhausted while reader '{reader}' was reading its block")]
    StreamExhausted { reader: String },
    #[error("Invalid parser configuration: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Custom(String),
}

impl From<String> for ParseError {
    fn from(msg: String) -> Self {
        ParseError::Custom(msg)
    }
}

impl From<&str> for ParseError {
    fn from(msg: &str) -> Self {
        ParseError::Custom(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
