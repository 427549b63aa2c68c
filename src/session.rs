//! Per-connection command sessions over a persistent transport.
//!
//! A [`Session`] owns one connection for its whole lifetime:
//!
//! ```text
//! Open → AwaitingCommand ⇄ Dispatching → … → Closing → Closed
//! ```
//!
//! Commands are handled strictly in arrival order, one at a time. While a
//! `search` is streaming, the session keeps reading the transport so a peer
//! disconnect is noticed immediately. Commands that arrive in the meantime
//! are queued (up to `max_pending_commands`) and dispatched after the current
//! one finishes, so result frames of two commands never interleave.
//!
//! Failures inside one command are reported with an `error` frame and the
//! session carries on. Only a malformed frame or a transport failure ends
//! the session. Every cursor the session opened is dropped before it reaches
//! [`SessionState::Closed`].

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::engine::QueryEngine;
use crate::error::QueryError;
use crate::models::ResourceRecord;
use crate::protocol::{parse_command, Command, Inbound, ServerFrame, GET_CONTENT, SEARCH};

/// Failure of the underlying connection.
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// A bidirectional message transport, one per connection.
#[async_trait]
pub trait Transport: Send {
    /// Next inbound frame, or `None` once the peer has closed.
    ///
    /// Must be cancel-safe: the session polls it concurrently with a result
    /// stream and may drop the future before it completes.
    async fn recv(&mut self) -> Option<Result<Inbound, TransportError>>;

    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Best-effort close. Errors are ignored.
    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    AwaitingCommand,
    Dispatching,
    Closing,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the connection, possibly mid-stream.
    ClientClosed,
    /// An inbound frame could not be parsed.
    ProtocolError,
    TransportError,
    /// An outbound frame could not be serialized.
    Internal,
}

/// Summary returned when a session finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub connection_id: String,
    /// Commands dispatched, unknown ones included.
    pub commands: u64,
    pub reason: CloseReason,
}

pub struct Session<T: Transport> {
    connection_id: String,
    transport: T,
    engine: QueryEngine,
    state: SessionState,
    pending: VecDeque<Inbound>,
    max_pending: usize,
    commands: u64,
}

enum Step {
    Inbound(Option<Result<Inbound, TransportError>>),
    Item(Option<Result<ResourceRecord, QueryError>>),
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, engine: QueryEngine, max_pending: usize) -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            transport,
            engine,
            state: SessionState::Open,
            pending: VecDeque::new(),
            max_pending: max_pending.max(1),
            commands: 0,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session until the connection ends.
    pub async fn run(mut self) -> SessionReport {
        info!(connection_id = %self.connection_id, "session opened");
        self.transition(SessionState::AwaitingCommand);

        let reason = loop {
            let frame = match self.pending.pop_front() {
                Some(frame) => frame,
                None => match self.transport.recv().await {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        warn!(connection_id = %self.connection_id, error = %e, "receive failed");
                        break CloseReason::TransportError;
                    }
                    None => break CloseReason::ClientClosed,
                },
            };

            self.transition(SessionState::Dispatching);
            if let Err(reason) = self.dispatch(frame).await {
                break reason;
            }
            self.transition(SessionState::AwaitingCommand);
        };

        self.transition(SessionState::Closing);
        self.pending.clear();
        self.transport.close().await;
        self.transition(SessionState::Closed);

        info!(
            connection_id = %self.connection_id,
            commands = self.commands,
            reason = ?reason,
            "session closed"
        );

        SessionReport {
            connection_id: self.connection_id,
            commands: self.commands,
            reason,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            connection_id = %self.connection_id,
            from = ?self.state,
            to = ?next,
            "session state"
        );
        self.state = next;
    }

    /// Handles one frame. `Err` ends the session.
    async fn dispatch(&mut self, frame: Inbound) -> Result<(), CloseReason> {
        let command = match parse_command(&frame) {
            Ok(command) => command,
            Err(e) => {
                warn!(connection_id = %self.connection_id, error = %e, "protocol error, closing");
                // The peer may already be gone; the session closes either way.
                let _ = self.send(&ServerFrame::protocol_error(&e)).await;
                return Err(CloseReason::ProtocolError);
            }
        };

        self.commands += 1;
        debug!(connection_id = %self.connection_id, command = command.name(), "dispatching");

        match command {
            Command::Search { pattern } => self.search(&pattern).await,
            Command::GetContent { id } => self.get_content(&id).await,
            Command::Unknown { name } => {
                warn!(connection_id = %self.connection_id, command = %name, "unknown command");
                self.send(&ServerFrame::unknown_command(&name)).await
            }
        }
    }

    async fn search(&mut self, pattern: &str) -> Result<(), CloseReason> {
        let mut results = match self.engine.search(None, pattern).await {
            Ok(results) => results,
            Err(e) => {
                warn!(connection_id = %self.connection_id, error = %e, "search failed");
                return self.send(&ServerFrame::error(SEARCH, &e)).await;
            }
        };

        let mut count = 0u64;
        loop {
            let can_read = self.pending.len() < self.max_pending;
            let step = tokio::select! {
                biased;
                inbound = self.transport.recv(), if can_read => Step::Inbound(inbound),
                item = results.next() => Step::Item(item),
            };

            match step {
                Step::Inbound(Some(Ok(frame))) => self.pending.push_back(frame),
                Step::Inbound(Some(Err(e))) => {
                    warn!(
                        connection_id = %self.connection_id,
                        error = %e,
                        "receive failed mid-stream"
                    );
                    return Err(CloseReason::TransportError);
                }
                Step::Inbound(None) => {
                    debug!(
                        connection_id = %self.connection_id,
                        sent = count,
                        "peer closed mid-stream"
                    );
                    return Err(CloseReason::ClientClosed);
                }
                Step::Item(Some(Ok(record))) => {
                    self.send(&ServerFrame::Result(record.into())).await?;
                    count += 1;
                }
                Step::Item(Some(Err(e))) => {
                    warn!(
                        connection_id = %self.connection_id,
                        error = %e,
                        sent = count,
                        "search stream failed"
                    );
                    return self.send(&ServerFrame::error(SEARCH, &e)).await;
                }
                Step::Item(None) => break,
            }
        }

        self.send(&ServerFrame::done(SEARCH, count)).await
    }

    async fn get_content(&mut self, id: &str) -> Result<(), CloseReason> {
        match self.engine.get_by_id(id).await {
            Ok(record) => self.send(&ServerFrame::content(&record)).await,
            Err(e) => {
                warn!(connection_id = %self.connection_id, id, error = %e, "get-content failed");
                self.send(&ServerFrame::error(GET_CONTENT, &e)).await
            }
        }
    }

    async fn send(&mut self, frame: &ServerFrame) -> Result<(), CloseReason> {
        let text = frame.to_text().map_err(|e| {
            error!(connection_id = %self.connection_id, error = %e, "failed to encode frame");
            CloseReason::Internal
        })?;
        self.transport.send(text).await.map_err(|e| {
            warn!(connection_id = %self.connection_id, error = %e, "send failed");
            CloseReason::TransportError
        })
    }
}
