//! Error types for tenscore.

use thiserror::Error;

/// Errors produced by the safe layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied argument was rejected before reaching the runtime.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The runtime reported a failure. `message` is the runtime's text verbatim.
    ///
    /// Failures detected by this layer itself (no runtime installed, buffer
    /// without backing storage) use code 0.
    #[error("{message}")]
    Runtime { code: i32, message: String },

    /// A buffer was mapped while another view of it is still alive.
    #[error("buffer is already mapped by a live view")]
    AlreadyMapped,

    /// A runtime library could not be loaded or is missing a symbol.
    #[error("failed to load runtime library: {0}")]
    Load(#[from] libloading::Error),
}

impl Error {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub(crate) fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            code: 0,
            message: message.into(),
        }
    }

    /// True for errors raised by argument validation.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// True for failures reported by (or on behalf of) the runtime.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime { .. })
    }

    /// Runtime status code, if this is a runtime failure.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Runtime { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_message_is_verbatim() {
        let err = Error::Runtime {
            code: -3,
            message: "unknown device 'tpu.7'".into(),
        };
        assert_eq!(err.to_string(), "unknown device 'tpu.7'");
        assert_eq!(err.code(), Some(-3));
        assert!(err.is_runtime());
        assert!(!err.is_invalid_argument());
    }

    #[test]
    fn test_invalid_argument_display() {
        let err = Error::invalid_argument("sizes and strides must have the same rank");
        assert!(err.is_invalid_argument());
        assert_eq!(err.code(), None);
        assert!(err.to_string().contains("same rank"));
    }

    #[test]
    fn test_layer_runtime_error_has_zero_code() {
        let err = Error::runtime("runtime is not initialized");
        assert_eq!(err.code(), Some(0));
    }
}
