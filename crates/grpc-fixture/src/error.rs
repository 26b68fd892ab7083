use thiserror::Error;

/// Errors raised while turning a recorded dump into an [`ExchangeTrie`].
///
/// Any of these aborts construction; a partially built trie is never handed out.
///
/// [`ExchangeTrie`]: crate::trie::ExchangeTrie
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read dump {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record #{index} in dump: {source}")]
    Json {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record #{index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("Failed to encode message {sequence} of {method}: {source}")]
    Codec {
        method: String,
        sequence: usize,
        #[source]
        source: CodecError,
    },
}

/// Errors from a [`MessageCodec`](crate::codec::MessageCodec).
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to decode message for {method}: {reason}")]
    Decode { method: String, reason: String },

    #[error("Failed to encode message for {method}: {reason}")]
    Encode { method: String, reason: String },
}

/// A correlation rule could not be applied to a decoded message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrelationError {
    #[error("Extraction failed for {method}: {reason}")]
    Extraction { method: String, reason: String },

    #[error("Injection failed for {method} at '{path}': {reason}")]
    Injection {
        method: String,
        path: String,
        reason: String,
    },

    #[error("Invalid field path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

/// Failures of the live stream a call is replayed over.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer half-closed or disconnected.
    #[error("Stream closed by peer")]
    Closed,

    #[error("Stream cancelled")]
    Cancelled,

    #[error("Stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream protocol error: {0}")]
    Protocol(String),
}

/// Terminal failure of a single replayed call.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("no saved responses found for method {method}")]
    NoFixtureForMethod { method: String },

    #[error("no matching saved responses for method {method} and message")]
    NoMatchingResponse { method: String },

    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
