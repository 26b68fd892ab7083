//! # gRPC Fixture Server
//!
//! TCP transport for replaying recorded calls. Every connection carries one
//! call as a sequence of length-delimited JSON [`Frame`]s: the client opens a
//! method, both sides exchange messages, and the server closes with a status.

mod client;
mod frame_codec;
mod server;
mod stream;

pub use client::{ClientError, ClientEvent, FixtureClient};
pub use frame_codec::{Frame, FrameCodec, MAX_FRAME_LENGTH};
pub use server::FixtureServer;
pub use stream::FramedStream;
