//! Error types for keybase-rpc.
//!
//! Every failure a call can see is a value of [`RpcError`]. Errors that cross
//! the transport travel as [`WireError`] and are rebuilt on the client side.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handler::MethodKind;

/// Main error type for all RPC operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error (reply payloads).
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// The call names a protocol that was never registered.
    #[error("unknown protocol: {0}")]
    ProtocolNotFound(String),

    /// The protocol exists but has no such method.
    #[error("unknown method {method} in protocol {protocol}")]
    MethodNotFound { protocol: String, method: String },

    /// A wire method name that is not `<protocol>.<method>`.
    #[error("invalid method name: {0:?}")]
    InvalidMethodName(String),

    /// A protocol built with an empty name.
    #[error("invalid protocol name: {0:?}")]
    InvalidProtocolName(String),

    /// The sender's call-kind disagrees with the registered one.
    #[error("method {method} is a {expected}, but was invoked as a {actual}")]
    KindMismatch {
        method: String,
        expected: MethodKind,
        actual: MethodKind,
    },

    /// Argument payload does not match the argument record.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Business logic error, forwarded verbatim.
    #[error(transparent)]
    Application(#[from] AppError),

    /// The call context was cancelled.
    #[error("call cancelled")]
    Cancelled,

    /// The call context deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A handler panicked while serving this call.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// The server is at its concurrent call limit.
    #[error("server busy")]
    Busy,

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Protocol name registered twice.
    #[error("protocol {0} is already registered")]
    DuplicateProtocol(String),

    /// Method name registered twice within one protocol.
    #[error("method {method} is already registered in protocol {protocol}")]
    DuplicateMethod { protocol: String, method: String },

    /// Error reported by the remote side with no local classification.
    #[error("remote error: {0}")]
    Remote(String),
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Argument decode failure, carrying both type descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("type error: expected {expected}, got {actual}")]
pub struct TypeError {
    pub expected: String,
    pub actual: String,
}

impl TypeError {
    pub fn new(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Application level error returned by a business handler.
///
/// Mirrors the keybase status triple so callers can match on `code` or
/// `name` without parsing the description.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{desc}")]
pub struct AppError {
    pub code: i32,
    pub name: String,
    pub desc: String,
}

impl AppError {
    pub fn new(code: i32, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            desc: desc.into(),
        }
    }
}

/// Serializable form of [`RpcError`] carried in error replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireError {
    ProtocolNotFound {
        protocol: String,
    },
    MethodNotFound {
        protocol: String,
        method: String,
    },
    InvalidMethodName {
        name: String,
    },
    KindMismatch {
        method: String,
        expected: MethodKind,
        actual: MethodKind,
    },
    Type(TypeError),
    Application(AppError),
    Cancelled,
    DeadlineExceeded,
    Panic {
        message: String,
    },
    Busy,
    Other {
        message: String,
    },
}

impl From<&RpcError> for WireError {
    fn from(err: &RpcError) -> Self {
        match err {
            RpcError::ProtocolNotFound(protocol) => WireError::ProtocolNotFound {
                protocol: protocol.clone(),
            },
            RpcError::MethodNotFound { protocol, method } => WireError::MethodNotFound {
                protocol: protocol.clone(),
                method: method.clone(),
            },
            RpcError::InvalidMethodName(name) => WireError::InvalidMethodName { name: name.clone() },
            RpcError::KindMismatch {
                method,
                expected,
                actual,
            } => WireError::KindMismatch {
                method: method.clone(),
                expected: *expected,
                actual: *actual,
            },
            RpcError::Type(e) => WireError::Type(e.clone()),
            RpcError::Application(e) => WireError::Application(e.clone()),
            RpcError::Cancelled => WireError::Cancelled,
            RpcError::DeadlineExceeded => WireError::DeadlineExceeded,
            RpcError::Panic(message) => WireError::Panic {
                message: message.clone(),
            },
            RpcError::Busy => WireError::Busy,
            RpcError::Remote(message) => WireError::Other {
                message: message.clone(),
            },
            other => WireError::Other {
                message: other.to_string(),
            },
        }
    }
}

impl From<WireError> for RpcError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::ProtocolNotFound { protocol } => RpcError::ProtocolNotFound(protocol),
            WireError::MethodNotFound { protocol, method } => {
                RpcError::MethodNotFound { protocol, method }
            }
            WireError::InvalidMethodName { name } => RpcError::InvalidMethodName(name),
            WireError::KindMismatch {
                method,
                expected,
                actual,
            } => RpcError::KindMismatch {
                method,
                expected,
                actual,
            },
            WireError::Type(e) => RpcError::Type(e),
            WireError::Application(e) => RpcError::Application(e),
            WireError::Cancelled => RpcError::Cancelled,
            WireError::DeadlineExceeded => RpcError::DeadlineExceeded,
            WireError::Panic { message } => RpcError::Panic(message),
            WireError::Busy => RpcError::Busy,
            WireError::Other { message } => RpcError::Remote(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_error_survives_wire_form() {
        let app = AppError::new(1404, "SCDeviceQuota", "device quota exceeded");
        let wire = WireError::from(&RpcError::Application(app.clone()));

        match RpcError::from(wire) {
            RpcError::Application(back) => assert_eq!(back, app),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_type_error_keeps_both_descriptions() {
        let err = RpcError::Type(TypeError::new("[Arg]", "[{sessionID: integer}]"));
        let wire = WireError::from(&err);

        assert_eq!(
            wire,
            WireError::Type(TypeError::new("[Arg]", "[{sessionID: integer}]"))
        );
        assert!(err.to_string().contains("expected [Arg]"));
    }

    #[test]
    fn test_local_only_errors_become_remote() {
        let err = RpcError::DuplicateProtocol("p".to_string());
        let back = RpcError::from(WireError::from(&err));

        match back {
            RpcError::Remote(message) => assert_eq!(message, "protocol p is already registered"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_app_error_display_is_description() {
        let app = AppError::new(0, "Generic", "device quota exceeded");
        assert_eq!(app.to_string(), "device quota exceeded");
    }
}
