use crate::context::ServerContext;
use crate::http::hash::simple_uhash;
use crate::http::state::{ConnectionState, MAX_HOST_LEN, MAX_ORIGIN_LEN, Mode};
use crate::http::url::{self, RequestUrl, truncate_at_boundary};

/// Validation attempts allowed before a request that never completes its
/// header block is dropped.
pub const MAX_PARSE_ATTEMPTS: usize = 10;

/// Outcome of one validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The request is parsed; mode, URL and headers are populated.
    Complete,
    /// More bytes are needed.
    Incomplete,
    /// Unknown method, or the client never finished its headers.
    Malformed,
    /// Still incomplete and already beyond the request size cap.
    TooLarge,
    /// Plain-text request while https is enforced.
    NeedsRedirect,
    /// Plain-text `STREAM` while encrypted streaming is enforced.
    EncryptionRequired,
}

/// Request headers the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownHeader {
    Origin,
    Connection,
    DoNotTrack,
    UserAgent,
    AuthToken,
    Host,
    AcceptEncoding,
}

#[derive(Debug, Clone)]
struct HeaderEntry {
    hash: u32,
    name: &'static str,
    header: KnownHeader,
}

/// Header names with their precomputed case-insensitive hashes.
#[derive(Debug, Clone)]
pub struct HeaderTable {
    entries: Vec<HeaderEntry>,
}

impl Default for HeaderTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderTable {
    pub fn new() -> Self {
        let entries = [
            ("Origin", KnownHeader::Origin),
            ("Connection", KnownHeader::Connection),
            ("DNT", KnownHeader::DoNotTrack),
            ("User-Agent", KnownHeader::UserAgent),
            ("X-Auth-Token", KnownHeader::AuthToken),
            ("Host", KnownHeader::Host),
            ("Accept-Encoding", KnownHeader::AcceptEncoding),
        ]
        .into_iter()
        .map(|(name, header)| HeaderEntry {
            hash: simple_uhash(name),
            name,
            header,
        })
        .collect();

        Self { entries }
    }

    /// Matches a header name by hash, confirmed by a case-insensitive
    /// compare so colliding names are rejected.
    pub fn lookup(&self, name: &str) -> Option<KnownHeader> {
        let hash = simple_uhash(name);
        self.entries
            .iter()
            .find(|e| e.hash == hash && e.name.eq_ignore_ascii_case(name))
            .map(|e| e.header)
    }
}

/// Looks for the blank line ending the header block in `buf[from..]`.
///
/// Accepts `\r\n\r\n`, `\n\n` and the mixed forms. Returns the offset just
/// past the terminator.
pub fn find_header_end(buf: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match buf.get(i + 1) {
                Some(b'\n') => return Some(i + 2),
                Some(b'\r') if buf.get(i + 2) == Some(&b'\n') => return Some(i + 3),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Runs one validation attempt over the bytes received so far.
///
/// Only the tail of the buffer (the last 4 bytes seen by the previous
/// attempt plus whatever arrived since) is searched for the end of the
/// header block. On a terminal verdict receive interest is turned off and
/// the attempt counter is cleared.
pub fn validate(state: &mut ConnectionState, ctx: &ServerContext, encrypted: bool) -> Verdict {
    let inbound = std::mem::take(&mut state.inbound);
    let verdict = validate_buffer(state, ctx, encrypted, &inbound);
    state.inbound = inbound;
    verdict
}

fn validate_buffer(
    state: &mut ConnectionState,
    ctx: &ServerContext,
    encrypted: bool,
    buf: &[u8],
) -> Verdict {
    state.parse_tries += 1;
    let previous = state.parse_last_size;
    state.parse_last_size = buf.len();

    let Some(header_end) = find_header_end(buf, previous.saturating_sub(4)) else {
        if state.parse_tries > MAX_PARSE_ATTEMPTS {
            tracing::info!(
                tries = state.parse_tries,
                bytes = buf.len(),
                "Disabling slow client after too many attempts to read the request"
            );
            finish_attempts(state);
            return Verdict::Malformed;
        }
        if buf.len() > ctx.config.server.max_request_size {
            finish_attempts(state);
            return Verdict::TooLarge;
        }
        state.wait_receive = true;
        return Verdict::Incomplete;
    };

    let Some((mode, url_start)) = parse_method(buf) else {
        finish_attempts(state);
        return Verdict::Malformed;
    };

    if mode == Mode::Stream && ctx.config.tls.force_stream && !encrypted {
        finish_attempts(state);
        tracing::error!(
            hostname = %stream_hostname(&buf[..header_end]),
            "Refusing plain-text STREAM; the server requires encrypted streaming"
        );
        return Verdict::EncryptionRequired;
    }
    state.mode = mode;

    let Some((url_end, line_end)) = find_protocol(buf, url_start, header_end) else {
        state.wait_receive = true;
        return Verdict::Incomplete;
    };

    let protocol = String::from_utf8_lossy(&buf[url_end + 1..line_end]);
    state.protocol = protocol.trim_end_matches('\r').to_string();

    let decoded = url::decode(&buf[url_start..url_end]);
    state.last_url = decoded.clone();
    state.url = Some(RequestUrl::parse(decoded));

    parse_headers(state, ctx, &buf[line_end + 1..header_end]);

    if ctx.config.tls.force_http && !encrypted && state.mode != Mode::Stream {
        finish_attempts(state);
        return Verdict::NeedsRedirect;
    }

    finish_attempts(state);
    Verdict::Complete
}

fn finish_attempts(state: &mut ConnectionState) {
    state.parse_tries = 0;
    state.parse_last_size = 0;
    state.wait_receive = false;
}

/// Recognizes `GET `, `OPTIONS ` and `STREAM ` (case-sensitive, trailing
/// space included). Returns the mode and where the URL starts.
fn parse_method(buf: &[u8]) -> Option<(Mode, usize)> {
    const METHODS: [(&[u8], Mode); 3] = [
        (b"GET ", Mode::Normal),
        (b"OPTIONS ", Mode::Options),
        (b"STREAM ", Mode::Stream),
    ];

    METHODS
        .iter()
        .find(|(verb, _)| buf.starts_with(verb))
        .map(|(verb, mode)| (*mode, verb.len()))
}

/// Finds the ` HTTP/` marker and the newline ending its line. Returns the
/// offset of the space before the marker and of the newline.
fn find_protocol(buf: &[u8], from: usize, to: usize) -> Option<(usize, usize)> {
    const MARKER: &[u8] = b" HTTP/";

    let region = buf.get(from..to)?;
    let space = from + region.windows(MARKER.len()).position(|w| w == MARKER)?;
    let newline = space
        + MARKER.len()
        + buf[space + MARKER.len()..to].iter().position(|&b| b == b'\n')?;
    Some((space, newline))
}

/// Header lines must end in CRLF; the first line that does not (or the
/// blank line) stops parsing. Lines without a colon are skipped.
fn parse_headers(state: &mut ConnectionState, ctx: &ServerContext, block: &[u8]) {
    let mut pos = 0;

    while pos < block.len() {
        let Some(nl) = block[pos..].iter().position(|&b| b == b'\n') else {
            break;
        };
        let line = &block[pos..pos + nl];
        pos += nl + 1;

        let Some(line) = line.strip_suffix(b"\r") else {
            break;
        };
        if line.is_empty() {
            break;
        }

        let Some(colon) = line.iter().position(|&b| b == b':') else {
            continue;
        };
        let name = String::from_utf8_lossy(&line[..colon]);
        let Some(header) = ctx.headers.lookup(&name) else {
            continue;
        };

        let value = &line[colon + 1..];
        let skip = value.iter().take_while(|&&b| b == b' ').count();
        let value = String::from_utf8_lossy(&value[skip..]);

        apply_header(state, ctx, header, &value);
    }
}

fn apply_header(state: &mut ConnectionState, ctx: &ServerContext, header: KnownHeader, value: &str) {
    match header {
        KnownHeader::Origin => {
            state.request.origin = header_text(value, MAX_ORIGIN_LEN);
        }
        KnownHeader::Connection => {
            if value.to_ascii_lowercase().contains("keep-alive") {
                state.keep_alive = true;
            }
        }
        KnownHeader::DoNotTrack => {
            if ctx.config.privacy.respect_do_not_track {
                match value.as_bytes().first() {
                    Some(b'0') => state.request.do_not_track = false,
                    Some(b'1') => state.request.do_not_track = true,
                    _ => {}
                }
            }
        }
        KnownHeader::UserAgent => {
            if state.mode == Mode::Stream {
                state.request.user_agent = Some(value.to_string());
            }
        }
        KnownHeader::AuthToken => {
            state.request.auth_bearer_token = Some(value.to_string());
        }
        KnownHeader::Host => {
            state.request.host = header_text(value, MAX_HOST_LEN);
        }
        KnownHeader::AcceptEncoding => {
            if ctx.compression_enabled() && value.to_ascii_lowercase().contains("gzip") {
                state.enable_gzip(ctx.config.compression.level);
            }
        }
    }
}

/// A header value that is echoed back into response headers: control
/// characters become spaces and the length is capped at `max` bytes.
fn header_text(value: &str, max: usize) -> String {
    let mut text: String = value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    truncate_at_boundary(&mut text, max);
    text
}

/// `hostname=` parameter of a STREAM request line, for logging.
fn stream_hostname(head: &[u8]) -> String {
    const KEY: &[u8] = b"hostname=";

    let line_end = head.iter().position(|&b| b == b'\n').unwrap_or(head.len());
    let line = &head[..line_end];
    let Some(start) = line.windows(KEY.len()).position(|w| w == KEY) else {
        return "not available".to_string();
    };
    let value = &line[start + KEY.len()..];
    match value.iter().position(|&b| b == b'&') {
        Some(end) => String::from_utf8_lossy(&value[..end]).into_owned(),
        None => "not available".to_string(),
    }
}
