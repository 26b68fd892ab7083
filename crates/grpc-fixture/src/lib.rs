//! # gRPC Fixture
//!
//! Record/replay fixtures for bidirectional streaming RPCs. A dump of recorded
//! calls is loaded once into an [`ExchangeTrie`], and every live call to a
//! recorded method is then answered by replaying the recorded choreography:
//! server messages are sent when the recording says the server spoke next, and
//! client messages are awaited when it says the client did.
//!
//! ## Core Pieces
//!
//! * [`ExchangeTrie`]: per-method prefix tree of recorded exchanges, built once
//!   and shared read-only by every call
//! * [`ReplayCursor`]: per-call position and visitation state over one trie
//! * [`FieldCorrelator`]: optional per-method rule copying a value from the
//!   live request into recorded responses
//! * [`StreamReplayEngine`]: drives one call to completion over any
//!   [`ReplayStream`]
//!
//! ## Loading a Fixture
//!
//! ```no_run
//! use grpc_fixture::{load_fixture, DumpReader, JsonCodec, StreamReplayEngine};
//!
//! # fn main() -> anyhow::Result<()> {
//! let trie = load_fixture(DumpReader::open("recordings/tasks.json")?, &JsonCodec::new())?;
//! let engine = StreamReplayEngine::new(trie);
//! # let _ = engine;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod correlator;
pub mod cursor;
pub mod dump;
pub mod engine;
pub mod error;
pub mod logging;
pub mod message;
pub mod status;
pub mod stream;
pub mod trie;

pub use codec::{JsonCodec, MessageCodec};
pub use config::FixtureConfig;
pub use correlator::{CorrelationRule, ExtractRule, FieldCorrelator, FieldPath};
pub use cursor::ReplayCursor;
pub use dump::DumpReader;
pub use engine::{ReplayState, ReplaySummary, StreamReplayEngine};
pub use error::{CodecError, CorrelationError, LoadError, ReplayError, TransportError};
pub use message::{DumpedMessage, Origin, RecordedMessage, RpcRecord};
pub use status::{RpcStatus, StatusCode};
pub use stream::{ChannelPeer, ChannelStream, ReplayStream};
pub use trie::{load_fixture, ExchangeTrie, ExchangeTrieBuilder, MethodTrie, NodeId};
