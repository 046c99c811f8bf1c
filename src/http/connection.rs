use std::io;
use std::sync::Arc;
use std::time::Instant;

use crate::acl::Acl;
use crate::context::ServerContext;
use crate::http::error::ConnectionError;
use crate::http::mime::ContentType;
use crate::http::parser::{self, Verdict};
use crate::http::response::status;
use crate::http::router;
use crate::http::state::{ClientInfo, ConnectionState, Mode, RECEIVE_SIZE};
use crate::http::transmit::{self, Progress, ReceiveOutcome};
use crate::http::transport::Transport;
use crate::http::writer;
use crate::server::stream::StreamRequest;

const REDIRECT_BODY: &str = "<!DOCTYPE html><html><body>\
    This server only accepts encrypted connections. \
    You are being redirected to https.</body></html>";

/// What a processed request turned into.
#[derive(Debug)]
pub enum Processed {
    /// More bytes are needed before the request can be answered.
    Incomplete,
    /// A response is ready to be sent.
    Respond,
    /// A `STREAM` request was accepted; the socket belongs to the stream
    /// receiver from now on and no HTTP response is written.
    HandOff(StreamRequest),
}

/// Where a send drive left off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The socket stopped accepting bytes.
    Pending,
    /// All buffered bytes are out; the file copy has to deliver more.
    AwaitingInput,
    /// The response is complete and the connection is ready for the next
    /// request.
    Completed,
    /// The response is complete and the connection must be closed.
    Closed,
}

/// The per-connection engine.
///
/// The three drive operations map onto readiness events:
///
/// ```text
///   readable ──► receive ──► process_request ──► (Respond) ─┐
///                   ▲                                        │
///                   └──────── Completed ◄── send ◄─ writable ┘
/// ```
///
/// None of them blocks. Each returns as soon as the transport would block
/// and picks up where it stopped on the next call.
pub struct Connection {
    id: u64,
    client: ClientInfo,
    ctx: Arc<ServerContext>,
    encrypted: bool,
    state: ConnectionState,
}

impl Connection {
    pub fn new(id: u64, client: ClientInfo, ctx: Arc<ServerContext>, encrypted: bool) -> Self {
        Self {
            id,
            client,
            ctx,
            encrypted,
            state: ConnectionState::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn wants_receive(&self) -> bool {
        self.state.wait_receive
    }

    pub fn wants_send(&self) -> bool {
        self.state.wait_send
    }

    /// Receive interest is for the input file rather than the socket.
    pub fn is_copying_file(&self) -> bool {
        self.state.mode == Mode::FileCopy && self.state.wait_receive
    }

    /// Pulls available bytes: from the input file in file-copy mode,
    /// otherwise from the socket into the request buffer.
    pub fn receive<T: Transport>(&mut self, io: &mut T) -> Result<ReceiveOutcome, ConnectionError> {
        if self.state.mode == Mode::FileCopy {
            return transmit::read_file(&mut self.state);
        }

        let mut buf = [0u8; RECEIVE_SIZE];
        match io.try_read(&mut buf) {
            Ok(0) => Err(ConnectionError::PeerClosed),
            Ok(n) => {
                if self.state.inbound.is_empty() {
                    self.state.tv_in = Instant::now();
                }
                self.state.inbound.extend_from_slice(&buf[..n]);
                self.state.stats_received += n;
                tracing::trace!(id = self.id, bytes = n, "Received");
                Ok(ReceiveOutcome::Received(n))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                Ok(ReceiveOutcome::WouldBlock)
            }
            Err(e) => Err(ConnectionError::Io(e)),
        }
    }

    /// Validates the buffered request and, once it is complete, prepares
    /// the response: routing, body, header block.
    pub fn process_request(&mut self) -> Result<Processed, ConnectionError> {
        let ctx = Arc::clone(&self.ctx);
        let verdict = parser::validate(&mut self.state, &ctx, self.encrypted);

        let code = match verdict {
            Verdict::Incomplete => {
                tracing::trace!(
                    id = self.id,
                    bytes = self.state.inbound.len(),
                    "Request is incomplete"
                );
                return Ok(Processed::Incomplete);
            }
            Verdict::EncryptionRequired => return Err(ConnectionError::EncryptionRequired),
            Verdict::Complete => match self.state.mode {
                Mode::Stream => {
                    if ctx.access.allows(Acl::Stream, &self.client) {
                        return Ok(Processed::HandOff(self.stream_request()));
                    }
                    self.state.response.permission_denied()
                }
                Mode::Options => {
                    if !ctx.access.allows_any_web(&self.client) {
                        self.state.response.permission_denied()
                    } else {
                        self.state.response.set_text(ContentType::TextPlain, "OK");
                        status::OK
                    }
                }
                Mode::Normal | Mode::FileCopy => {
                    if !ctx.access.allows_any_web(&self.client) {
                        self.state.response.permission_denied()
                    } else {
                        router::route(&mut self.state, &ctx, &self.client)
                    }
                }
            },
            Verdict::TooLarge => {
                let len = self.state.inbound.len();
                tracing::info!(id = self.id, bytes = len, "Received request is too big");
                self.state.response.set_text(
                    ContentType::TextPlain,
                    &format!("Received request is too big ({len} bytes).\r\n"),
                );
                self.state.keep_alive = false;
                status::BAD_REQUEST
            }
            Verdict::Malformed => {
                tracing::debug!(id = self.id, "Malformed request");
                self.state
                    .response
                    .set_text(ContentType::TextPlain, "I don't understand you...\r\n");
                self.state.keep_alive = false;
                status::BAD_REQUEST
            }
            Verdict::NeedsRedirect => {
                self.state.response.set_text(ContentType::TextHtml, REDIRECT_BODY);
                status::MOVED_PERMANENTLY
            }
        };

        self.state.response.code = code;
        self.state.tv_ready = Instant::now();
        writer::build_header(&mut self.state, &ctx);
        self.state.wait_send = true;

        tracing::debug!(
            id = self.id,
            code,
            mode = self.state.mode.as_str(),
            url = %self.state.last_url,
            "Response prepared"
        );
        Ok(Processed::Respond)
    }

    fn stream_request(&mut self) -> StreamRequest {
        StreamRequest {
            url: self.state.last_url.clone(),
            user_agent: self.state.request.user_agent.take(),
            client: self.client.clone(),
        }
    }

    /// Drives the response out: header block first, then the body, direct
    /// or gzip-chunked. Write batching is engaged before the first byte and
    /// released when the response completes.
    pub fn send<T: Transport>(&mut self, io: &mut T) -> Result<SendOutcome, ConnectionError> {
        if !self.state.corked {
            if let Err(e) = io.set_cork(true) {
                tracing::debug!(id = self.id, error = %e, "Cannot enable write batching");
            }
            self.state.corked = true;
        }

        if !transmit::send_header(&mut self.state, io)? {
            return Ok(SendOutcome::Pending);
        }

        let progress = if self.state.gzip.is_some() {
            transmit::send_compressed(&mut self.state, io)?
        } else {
            transmit::send_direct(&mut self.state, io)?
        };

        Ok(match progress {
            Progress::Pending => SendOutcome::Pending,
            Progress::AwaitingInput => SendOutcome::AwaitingInput,
            Progress::Done => self.request_done(io),
        })
    }

    /// Ends the current request: releases write batching, writes the access
    /// log entry and clears every request-scoped field.
    fn request_done<T: Transport>(&mut self, io: &mut T) -> SendOutcome {
        if self.state.corked {
            if let Err(e) = io.set_cork(false) {
                tracing::debug!(id = self.id, error = %e, "Cannot release write batching");
            }
        }

        self.log_access();

        let keep_alive = self.state.keep_alive;
        self.state.reset();

        if keep_alive {
            SendOutcome::Completed
        } else {
            SendOutcome::Closed
        }
    }

    fn log_access(&self) {
        let state = &self.state;
        let now = Instant::now();
        let size = state.response.data.len().max(state.rlen);
        let ratio = match &state.gzip {
            Some(gz) if gz.consumed() > 0 => gz.total_out() * 100 / gz.consumed(),
            _ => 100,
        };

        tracing::info!(
            target: "access",
            id = self.id,
            peer = %self.client,
            mode = state.mode.as_str(),
            received = state.stats_received,
            sent = state.stats_sent,
            size,
            ratio,
            prep_ms = millis(state.tv_ready.saturating_duration_since(state.tv_in)),
            sent_ms = millis(now.saturating_duration_since(state.tv_ready)),
            total_ms = millis(now.saturating_duration_since(state.tv_in)),
            code = state.response.code,
            url = %state.last_url,
        );
    }
}

fn millis(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
