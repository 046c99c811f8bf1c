//! Streaming gzip with chunked framing.
//!
//! A [`GzipStream`] belongs to one response. It keeps a cursor of how much
//! of the response buffer has been fed to the compressor, the compressed
//! bytes not yet framed, and the framed chunk currently being written.
//! Partial socket writes only advance the frame cursor, so the next drive
//! resumes at the exact unsent byte without compressing anything again.
//!
//! A frame is `[CRLF closing the previous chunk] HEX-LEN CRLF payload`; the
//! closing CRLF of the last data chunk travels with the terminating
//! zero-length chunk.

use std::fmt;
use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;

/// Largest payload of one chunk.
pub const CHUNK_SIZE: usize = 16384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// Nothing buffered; waiting for input or for the end of the body.
    AwaitingInput,
    /// Compressed bytes are buffered but not framed yet.
    Compressing,
    /// A framed chunk is partly unsent.
    Flushing,
    /// The terminating zero-length chunk has been written.
    Finished,
}

pub struct GzipStream {
    encoder: GzEncoder<Vec<u8>>,
    state: ChunkState,
    /// Bytes of the response buffer fed to the compressor.
    consumed: usize,
    total_out: usize,
    pending: Vec<u8>,
    pending_pos: usize,
    frame: Vec<u8>,
    frame_sent: usize,
    chunk_open: bool,
    encoder_finished: bool,
    trailer_framed: bool,
}

impl fmt::Debug for GzipStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GzipStream")
            .field("state", &self.state)
            .field("consumed", &self.consumed)
            .field("total_out", &self.total_out)
            .field("pending", &(self.pending.len() - self.pending_pos))
            .field("have", &self.frame.len())
            .field("sent", &self.frame_sent)
            .finish()
    }
}

impl GzipStream {
    pub fn new(level: u32) -> Self {
        Self {
            encoder: GzEncoder::new(Vec::new(), Compression::new(level)),
            state: ChunkState::AwaitingInput,
            consumed: 0,
            total_out: 0,
            pending: Vec::new(),
            pending_pos: 0,
            frame: Vec::with_capacity(CHUNK_SIZE + 16),
            frame_sent: 0,
            chunk_open: false,
            encoder_finished: false,
            trailer_framed: false,
        }
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Bytes of input passed through the compressor.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Compressed bytes produced so far (without chunk framing).
    pub fn total_out(&self) -> usize {
        self.total_out
    }

    /// The current frame has been written completely.
    pub fn is_drained(&self) -> bool {
        self.frame_sent == self.frame.len()
    }

    /// Unsent bytes of the current frame.
    pub fn unsent(&self) -> &[u8] {
        &self.frame[self.frame_sent..]
    }

    /// Whether another frame can be produced: there is unconsumed input,
    /// unframed output, or the compressor still has to be finished because
    /// no more input will come.
    pub fn has_work(&self, input_len: usize, more_input: bool) -> bool {
        self.consumed < input_len
            || self.pending_pos < self.pending.len()
            || (!self.encoder_finished && !more_input)
    }

    /// Compresses `input[consumed..]` and frames the next chunk.
    ///
    /// `last` asks the compressor to finish the gzip member; otherwise a
    /// sync flush makes everything fed so far decodable by the client.
    /// Buffered output from an earlier call is framed first.
    pub fn compress(&mut self, input: &[u8], last: bool) -> io::Result<()> {
        debug_assert!(self.is_drained());
        self.state = ChunkState::Compressing;

        if self.pending_pos == self.pending.len() {
            if self.consumed < input.len() {
                self.encoder.write_all(&input[self.consumed..])?;
                self.consumed = input.len();
                if !last {
                    self.encoder.flush()?;
                }
            }
            if last && !self.encoder_finished {
                self.encoder.try_finish()?;
                self.encoder_finished = true;
            }

            let produced = std::mem::take(self.encoder.get_mut());
            self.total_out += produced.len();
            self.pending = produced;
            self.pending_pos = 0;
        }

        self.frame_next();
        Ok(())
    }

    fn frame_next(&mut self) {
        self.frame.clear();
        self.frame_sent = 0;

        let n = CHUNK_SIZE.min(self.pending.len() - self.pending_pos);
        if n == 0 {
            self.state = ChunkState::AwaitingInput;
            return;
        }

        if self.chunk_open {
            self.frame.extend_from_slice(b"\r\n");
        }
        self.frame.extend_from_slice(format!("{:X}\r\n", n).as_bytes());
        self.frame
            .extend_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
        self.pending_pos += n;
        self.chunk_open = true;
        self.state = ChunkState::Flushing;

        tracing::trace!(bytes = n, "Opened chunk");
    }

    /// Frames the terminating zero-length chunk. Only the first call has an
    /// effect.
    pub fn frame_trailer(&mut self) {
        if self.trailer_framed {
            return;
        }
        debug_assert!(self.is_drained());

        self.frame.clear();
        self.frame_sent = 0;
        if self.chunk_open {
            self.frame.extend_from_slice(b"\r\n");
        }
        self.frame.extend_from_slice(b"0\r\n\r\n");
        self.chunk_open = false;
        self.trailer_framed = true;
        self.state = ChunkState::Flushing;
    }

    /// Records that `n` bytes of the current frame were written.
    pub fn advance(&mut self, n: usize) {
        self.frame_sent = (self.frame_sent + n).min(self.frame.len());
        if self.is_drained() {
            self.state = if self.trailer_framed {
                ChunkState::Finished
            } else if self.pending_pos < self.pending.len() {
                ChunkState::Compressing
            } else {
                ChunkState::AwaitingInput
            };
        }
    }
}
