//! Non-blocking body transmission.
//!
//! Each function here is one drive: it moves as many bytes as the
//! transport accepts and returns. A "would block" result is not an error,
//! it only means the readiness loop has to call again later. Position is
//! kept in the connection state (`header_sent`, `sent`, the gzip frame
//! cursor), so a partial write resumes at the exact unsent byte.

use std::io::{self, Read};

use crate::http::error::ConnectionError;
use crate::http::gzip::ChunkState;
use crate::http::state::ConnectionState;
use crate::http::transport::Transport;

/// Where a body drive left off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The transport stopped accepting bytes.
    Pending,
    /// Everything buffered is out but the file copy has more to deliver.
    AwaitingInput,
    /// The whole response is written.
    Done,
}

/// Result of pulling bytes from the socket or from a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Bytes appended to the buffer. Zero from a file means end of file.
    Received(usize),
    WouldBlock,
}

/// Writes what the transport accepts. `None` means it would block.
fn write_some<T: Transport>(io: &mut T, buf: &[u8]) -> Result<Option<usize>, ConnectionError> {
    match io.try_write(buf) {
        Ok(0) => Err(ConnectionError::WriteZero),
        Ok(n) => Ok(Some(n)),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Ok(None)
        }
        Err(e) => Err(ConnectionError::Io(e)),
    }
}

/// Sends the rest of the header block. Returns true once it is all out.
pub fn send_header<T: Transport>(
    state: &mut ConnectionState,
    io: &mut T,
) -> Result<bool, ConnectionError> {
    while state.header_sent < state.header_output.len() {
        match write_some(io, &state.header_output[state.header_sent..])? {
            Some(n) => {
                state.header_sent += n;
                state.stats_sent += n;
                tracing::trace!(bytes = n, "Sent header bytes");
            }
            None => return Ok(false),
        }
    }
    Ok(true)
}

/// Sends the output buffer from `sent` onwards, uncompressed.
pub fn send_direct<T: Transport>(
    state: &mut ConnectionState,
    io: &mut T,
) -> Result<Progress, ConnectionError> {
    while state.sent < state.response.data.len() {
        match write_some(io, &state.response.data[state.sent..])? {
            Some(n) => {
                state.sent += n;
                state.stats_sent += n;
                tracing::trace!(bytes = n, sent = state.sent, "Sent body bytes");
            }
            None => return Ok(Progress::Pending),
        }
    }

    if state.expects_file_input() {
        tracing::trace!("Output buffer drained, waiting for more file data");
        state.wait_send = false;
        return Ok(Progress::AwaitingInput);
    }

    Ok(Progress::Done)
}

/// Compresses the unconsumed part of the output buffer and sends it as
/// chunks, finishing with the zero-length chunk once no more input will
/// come.
pub fn send_compressed<T: Transport>(
    state: &mut ConnectionState,
    io: &mut T,
) -> Result<Progress, ConnectionError> {
    loop {
        if state.gzip.is_none() {
            return send_direct(state, io);
        }
        let more_input = state.expects_file_input();
        let Some(gz) = state.gzip.as_mut() else {
            return Ok(Progress::Done);
        };

        if gz.is_drained() {
            if gz.has_work(state.response.data.len(), more_input) {
                gz.compress(&state.response.data, !more_input)
                    .map_err(ConnectionError::Compression)?;
                state.sent = gz.consumed();
                tracing::trace!(
                    consumed = gz.consumed(),
                    compressed = gz.total_out(),
                    "Compressed output"
                );
            } else if gz.state() == ChunkState::Finished {
                return Ok(Progress::Done);
            } else if more_input {
                state.wait_send = false;
                return Ok(Progress::AwaitingInput);
            } else {
                gz.frame_trailer();
            }
            continue;
        }

        match write_some(io, gz.unsent())? {
            Some(n) => {
                gz.advance(n);
                state.stats_sent += n;
            }
            None => return Ok(Progress::Pending),
        }

        if gz.state() == ChunkState::Finished {
            return Ok(Progress::Done);
        }
    }
}

/// Reads the next part of the input file into the output buffer, never
/// beyond the declared length.
///
/// New data turns send interest on. Reaching the declared length or end of
/// file turns receive interest off and closes the file.
pub fn read_file(state: &mut ConnectionState) -> Result<ReceiveOutcome, ConnectionError> {
    let have = state.response.data.len();
    let want = state.rlen.saturating_sub(have);

    if want == 0 {
        end_input(state);
        return Ok(ReceiveOutcome::Received(0));
    }
    let Some(file) = state.input.as_mut() else {
        end_input(state);
        return Ok(ReceiveOutcome::Received(0));
    };

    state.response.data.resize(have + want, 0);
    let result = file.read(&mut state.response.data[have..]);

    match result {
        Ok(0) => {
            state.response.data.truncate(have);
            tracing::debug!(
                bytes = have,
                expected = state.rlen,
                "File ended before its declared length"
            );
            // the declared length can no longer be honoured
            state.keep_alive = false;
            end_input(state);
            Ok(ReceiveOutcome::Received(0))
        }
        Ok(n) => {
            state.response.data.truncate(have + n);
            state.stats_received += n;
            state.wait_send = true;
            if state.response.data.len() >= state.rlen {
                end_input(state);
            }
            Ok(ReceiveOutcome::Received(n))
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            state.response.data.truncate(have);
            Ok(ReceiveOutcome::WouldBlock)
        }
        Err(e) => {
            state.response.data.truncate(have);
            Err(ConnectionError::FileRead(e))
        }
    }
}

/// Closes the input file. The send side takes over to flush what is
/// buffered and end the response.
fn end_input(state: &mut ConnectionState) {
    state.wait_receive = false;
    state.wait_send = true;
    state.input = None;
}
