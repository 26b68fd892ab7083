use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, TransportError};

/// The subset of gRPC status codes a replayed call can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    Internal,
    Unavailable,
}

impl StatusCode {
    /// Numeric value on the gRPC wire.
    pub fn as_i32(self) -> i32 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::Cancelled => 1,
            StatusCode::Unknown => 2,
            StatusCode::Internal => 13,
            StatusCode::Unavailable => 14,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
        };
        write!(f, "{}", name)
    }
}

/// Terminal status of a call, as handed back to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: StatusCode,
    pub message: String,
}

impl RpcStatus {
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: String::new(),
        }
    }

    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl From<&ReplayError> for RpcStatus {
    fn from(err: &ReplayError) -> Self {
        let code = match err {
            ReplayError::NoFixtureForMethod { .. } | ReplayError::NoMatchingResponse { .. } => {
                StatusCode::Unavailable
            }
            ReplayError::Correlation(_) | ReplayError::Codec(_) => StatusCode::Internal,
            ReplayError::Transport(TransportError::Cancelled) => StatusCode::Cancelled,
            ReplayError::Transport(_) => StatusCode::Unknown,
        };
        RpcStatus::new(code, err.to_string())
    }
}
