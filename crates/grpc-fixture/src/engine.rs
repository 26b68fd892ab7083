//! # Stream Replay Engine
//!
//! The engine answers a live streaming call from the recorded choreography of
//! its method. For each call it creates a fresh [`ReplayCursor`] over the
//! shared trie and runs a small state machine until the recorded exchange is
//! exhausted:
//!
//! - **AwaitingDirection**: inspect the children of the current node. If all of
//!   them are server messages the server speaks next, otherwise the engine
//!   waits for the client.
//! - **EmittingServer**: send the first server child not yet taken by this call
//!   (rewritten by the [`FieldCorrelator`] when the method has a rule) and
//!   descend into it. With no such child left, step back up one level and look
//!   again; at the root the call is over.
//! - **AwaitingClient**: wait for the next client message, run extraction if
//!   the method has a rule, and descend into a client child not yet taken,
//!   preferring one recorded with the same bytes. A message with nowhere to go
//!   fails the call.
//!
//! Reaching a leaf completes the call. Any error moves the call to `Failed`.
//! Nothing is retried: a failed match or a broken stream ends that call and
//! only that call.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::{JsonCodec, MessageCodec};
use crate::correlator::FieldCorrelator;
use crate::cursor::ReplayCursor;
use crate::error::{CorrelationError, ReplayError};
use crate::message::RecordedMessage;
use crate::status::RpcStatus;
use crate::stream::ReplayStream;
use crate::trie::ExchangeTrie;

/// Where a call is in its replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayState {
    AwaitingDirection,
    EmittingServer,
    AwaitingClient,
    Completed,
    Failed,
}

impl ReplayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReplayState::Completed | ReplayState::Failed)
    }
}

/// What a completed call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub sent: usize,
    pub received: usize,
    /// Depth of the node the call finished on.
    pub depth: usize,
}

/// Replays recorded exchanges onto live streams.
///
/// Cloning is cheap; all clones share the same fixtures.
#[derive(Clone)]
pub struct StreamReplayEngine {
    fixtures: Arc<ExchangeTrie>,
    correlator: Arc<FieldCorrelator>,
    codec: Arc<dyn MessageCodec>,
}

impl StreamReplayEngine {
    pub fn new(fixtures: ExchangeTrie) -> Self {
        Self {
            fixtures: Arc::new(fixtures),
            correlator: Arc::new(FieldCorrelator::new()),
            codec: Arc::new(JsonCodec::new()),
        }
    }

    pub fn with_correlator(mut self, correlator: FieldCorrelator) -> Self {
        self.correlator = Arc::new(correlator);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn MessageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn fixtures(&self) -> &ExchangeTrie {
        &self.fixtures
    }

    pub fn correlator(&self) -> &FieldCorrelator {
        &self.correlator
    }

    /// Serve one call and report its terminal status.
    pub async fn handle<S: ReplayStream>(&self, method: &str, stream: &mut S) -> RpcStatus {
        match self.replay(method, stream).await {
            Ok(_) => RpcStatus::ok(),
            Err(err) => RpcStatus::from(&err),
        }
    }

    /// Replay the recorded exchange for `method` over `stream`.
    pub async fn replay<S: ReplayStream>(
        &self,
        method: &str,
        stream: &mut S,
    ) -> Result<ReplaySummary, ReplayError> {
        let call_id = Uuid::new_v4();
        let Some(trie) = self.fixtures.get(method) else {
            warn!("[{}] No fixture for method {}", call_id, method);
            return Err(ReplayError::NoFixtureForMethod {
                method: method.to_string(),
            });
        };

        info!("[{}] Replaying {}", call_id, method);
        let mut call = Call {
            id: call_id,
            method,
            cursor: ReplayCursor::new(&trie),
            summary: ReplaySummary::default(),
        };
        let mut state = ReplayState::AwaitingDirection;
        let mut failure = None;

        while !state.is_terminal() {
            let next = match self.step(&mut call, state, stream).await {
                Ok(next) => next,
                Err(err) => {
                    warn!(
                        "[{}] Replay of {} failed in {:?} at depth {}: {}",
                        call_id,
                        method,
                        state,
                        call.cursor.depth(),
                        err
                    );
                    failure = Some(err);
                    ReplayState::Failed
                }
            };
            debug!("[{}] {:?} -> {:?}", call_id, state, next);
            state = next;
        }

        if let Some(err) = failure {
            return Err(err);
        }
        call.summary.depth = call.cursor.depth();
        info!(
            "[{}] Completed {} (sent {}, received {})",
            call_id, method, call.summary.sent, call.summary.received
        );
        Ok(call.summary)
    }

    async fn step<S: ReplayStream>(
        &self,
        call: &mut Call<'_, '_>,
        state: ReplayState,
        stream: &mut S,
    ) -> Result<ReplayState, ReplayError> {
        let cursor = &mut call.cursor;
        match state {
            ReplayState::AwaitingDirection => Ok(if cursor.children_all_server() {
                ReplayState::EmittingServer
            } else if cursor.is_leaf() {
                // only reachable for a method recorded with an empty exchange
                ReplayState::Completed
            } else {
                ReplayState::AwaitingClient
            }),

            ReplayState::EmittingServer => {
                let next = cursor
                    .uncalled_server_children()
                    .first()
                    .and_then(|&child| cursor.child_message(child).map(|m| (child, m)));
                let Some((child, message)) = next else {
                    return Ok(if cursor.ascend() {
                        ReplayState::AwaitingDirection
                    } else {
                        ReplayState::Completed
                    });
                };
                let payload = self.server_payload(call.method, cursor, message)?;
                stream.send(payload).await?;
                call.summary.sent += 1;
                cursor.descend(child);
                Ok(after_descend(cursor))
            }

            ReplayState::AwaitingClient => {
                let received = stream.recv().await?;
                call.summary.received += 1;
                debug!(
                    "[{}] Received {} bytes from client on {}",
                    call.id,
                    received.len(),
                    call.method
                );

                if self.correlator.has_rule(call.method) {
                    let extracted = self.extract(call.method, &received);
                    if let Err(err) = &extracted {
                        warn!("[{}] {}", call.id, err);
                    }
                    cursor.set_pending_extract(extracted);
                }

                match cursor.uncalled_client_child_for(&received) {
                    Some(child) => {
                        cursor.descend(child);
                        Ok(after_descend(cursor))
                    }
                    None => Err(ReplayError::NoMatchingResponse {
                        method: call.method.to_string(),
                    }),
                }
            }

            ReplayState::Completed | ReplayState::Failed => Ok(state),
        }
    }

    fn extract(&self, method: &str, received: &[u8]) -> Result<serde_json::Value, CorrelationError> {
        let decoded =
            self.codec
                .decode(method, received)
                .map_err(|e| CorrelationError::Extraction {
                    method: method.to_string(),
                    reason: e.to_string(),
                })?;
        self.correlator.extract(method, &decoded)
    }

    /// Bytes to send for a recorded server message.
    fn server_payload(
        &self,
        method: &str,
        cursor: &ReplayCursor<'_>,
        message: &RecordedMessage,
    ) -> Result<Bytes, ReplayError> {
        if !self.correlator.has_rule(method) {
            return Ok(message.raw_bytes.clone());
        }
        let value = match cursor.pending_extract() {
            // no client message yet, nothing to correlate with
            None => return Ok(message.raw_bytes.clone()),
            Some(Err(err)) => return Err(err.clone().into()),
            Some(Ok(value)) => value,
        };

        let decoded;
        let template = match &message.decoded {
            Some(template) => template,
            None => {
                decoded = self.codec.decode(method, &message.raw_bytes)?;
                &decoded
            }
        };
        let rewritten = self.correlator.inject(method, template, value)?;
        Ok(Bytes::from(self.codec.encode(method, &rewritten)?))
    }
}

/// Per-call state threaded through the state machine.
struct Call<'m, 't> {
    id: Uuid,
    method: &'m str,
    cursor: ReplayCursor<'t>,
    summary: ReplaySummary,
}

fn after_descend(cursor: &ReplayCursor<'_>) -> ReplayState {
    if cursor.is_leaf() {
        ReplayState::Completed
    } else {
        ReplayState::AwaitingDirection
    }
}
