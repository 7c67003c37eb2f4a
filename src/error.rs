//! Error taxonomy shared by the RPC, explorer and knowledge-base layers

use serde_json::{json, Value};

/// Errors surfaced by tool operations.
///
/// Only `InvalidInput` raised while parsing top-level parameters aborts a tool
/// call; every other variant is reported back to the agent as data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("decode failure: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Stable machine-readable tag for the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Upstream(_) => "upstream_failure",
            Self::Decode(_) => "decode_failure",
            Self::Io(_) => "io",
            Self::Json(_) => "serialization",
        }
    }

    /// JSON shape used wherever an error is embedded in a tool response.
    pub fn to_json(&self) -> Value {
        json!({
            "kind": self.kind(),
            "message": self.to_string(),
        })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Decode(format!("archive: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(Error::invalid("x").kind(), "invalid_input");
        assert_eq!(Error::not_found("x").kind(), "not_found");
        assert_eq!(Error::upstream("x").kind(), "upstream_failure");
        assert_eq!(Error::Decode("x".into()).kind(), "decode_failure");
    }

    #[test]
    fn test_to_json_carries_message() {
        let err = Error::not_found("chunk abc");
        let value = err.to_json();
        assert_eq!(value["kind"], "not_found");
        assert_eq!(value["message"], "not found: chunk abc");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.kind(), "io");
    }
}
