//! The per-connection record.
//!
//! [`ConnectionState`] is allocated once per accepted connection. Every
//! request-scoped field is cleared together by [`ConnectionState::reset`],
//! which runs only at a request boundary (after a full response flush on a
//! kept-alive connection).

use std::fmt;
use std::fs::File;
use std::net::SocketAddr;
use std::time::{Instant, SystemTime};

use bytes::BytesMut;

use crate::http::gzip::GzipStream;
use crate::http::mime::ContentType;
use crate::http::response::{push_html_escaped, status};
use crate::http::url::RequestUrl;

/// Initial capacity of the receive buffer.
pub const RECEIVE_SIZE: usize = 4096;

/// Longest `Origin` value echoed back.
pub const MAX_ORIGIN_LEN: usize = 1024;

/// Longest `Host` value kept.
pub const MAX_HOST_LEN: usize = 255;

/// Most `Set-Cookie` lines per response.
pub const MAX_COOKIES: usize = 2;

/// Remote end of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub port: u16,
}

impl From<SocketAddr> for ClientInfo {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for ClientInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", self.ip, self.port)
    }
}

/// What the current request asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// `GET`, answered from the output buffer.
    #[default]
    Normal,
    /// `OPTIONS`, a CORS preflight.
    Options,
    /// `STREAM`, metric ingestion; the socket is handed off.
    Stream,
    /// A `GET` answered by pumping a file into the output buffer.
    FileCopy,
}

impl Mode {
    /// Label used in the access log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "DATA",
            Mode::Options => "OPTIONS",
            Mode::Stream => "STREAM",
            Mode::FileCopy => "FILECOPY",
        }
    }
}

/// Request header values the engine acts on.
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    /// Echoed as `Access-Control-Allow-Origin`; `*` when absent.
    pub origin: String,
    pub host: String,
    /// Only collected for `STREAM` requests.
    pub user_agent: Option<String>,
    pub auth_bearer_token: Option<String>,
    /// Set from `DNT: 1` when the do-not-track policy is respected.
    pub do_not_track: bool,
}

impl Default for RequestHeaders {
    fn default() -> Self {
        Self {
            origin: "*".to_string(),
            host: String::new(),
            user_agent: None,
            auth_bearer_token: None,
            do_not_track: false,
        }
    }
}

/// Response metadata and body, filled by the router, the file guard or a
/// handler.
#[derive(Debug)]
pub struct ResponseData {
    pub code: u16,
    pub content_type: ContentType,
    pub data: Vec<u8>,
    pub cacheable: bool,
    /// Last-modified time; the processing time when unset.
    pub date: Option<SystemTime>,
    /// Explicit expiry; derived from cacheability when unset.
    pub expires: Option<SystemTime>,
    /// Extra raw header lines, each terminated by CRLF.
    pub header: String,
    pub cookies: Vec<String>,
    /// A handler relies on tracking cookies for this response.
    pub tracking_required: bool,
}

impl Default for ResponseData {
    fn default() -> Self {
        Self {
            code: 0,
            content_type: ContentType::default(),
            data: Vec::new(),
            cacheable: true,
            date: None,
            expires: None,
            header: String::new(),
            cookies: Vec::new(),
            tracking_required: false,
        }
    }
}

impl ResponseData {
    pub fn flush(&mut self) {
        self.data.clear();
    }

    pub fn push_str(&mut self, s: &str) {
        self.data.extend_from_slice(s.as_bytes());
    }

    pub fn push_html_escaped(&mut self, s: &str) {
        push_html_escaped(&mut self.data, s);
    }

    /// Replaces the body with `text`.
    pub fn set_text(&mut self, content_type: ContentType, text: &str) {
        self.content_type = content_type;
        self.data.clear();
        self.push_str(text);
    }

    /// Replaces the body with `prefix` followed by the HTML-escaped `subject`.
    pub fn set_html_message(&mut self, prefix: &str, subject: &str) {
        self.set_text(ContentType::TextHtml, prefix);
        self.push_html_escaped(subject);
    }

    pub fn no_cacheable(&mut self) {
        self.cacheable = false;
    }

    /// Queues a `Set-Cookie` value. Returns false once both slots are used.
    pub fn set_cookie(&mut self, cookie: impl Into<String>) -> bool {
        if self.cookies.len() >= MAX_COOKIES {
            return false;
        }
        self.cookies.push(cookie.into());
        true
    }

    /// Fills in the standard 403 body and returns the code.
    pub fn permission_denied(&mut self) -> u16 {
        self.set_text(
            ContentType::TextPlain,
            "You are not allowed to access this resource.",
        );
        self.code = status::FORBIDDEN;
        status::FORBIDDEN
    }
}

/// Everything the engine knows about one connection.
#[derive(Debug)]
pub struct ConnectionState {
    /// Bytes received for the request being collected.
    pub inbound: BytesMut,
    /// Validation attempts for the request being collected.
    pub parse_tries: usize,
    /// Buffer length seen by the previous attempt.
    pub parse_last_size: usize,

    /// Decoded URL of the current request.
    pub url: Option<RequestUrl>,
    /// Protocol token of the request line, e.g. `HTTP/1.1`.
    pub protocol: String,
    /// URL the response is for; rewritten by a host switch. Used for the
    /// access log, static files and redirects.
    pub last_url: String,
    pub mode: Mode,
    pub request: RequestHeaders,

    pub response: ResponseData,
    /// Serialized status line and headers.
    pub header_output: Vec<u8>,
    /// Bytes of `header_output` already written.
    pub header_sent: usize,
    /// Bytes of the body written (direct mode) or handed to the compressor.
    pub sent: usize,
    /// Declared body length of a file copy.
    pub rlen: usize,
    pub gzip: Option<GzipStream>,
    /// File being copied; `None` once closed (input aliases the socket).
    pub input: Option<File>,

    pub keep_alive: bool,
    /// Write batching is engaged on the socket.
    pub corked: bool,
    pub wait_receive: bool,
    pub wait_send: bool,

    pub stats_received: usize,
    pub stats_sent: usize,
    /// When processing of the request started.
    pub tv_in: Instant,
    /// When the response became ready to send.
    pub tv_ready: Instant,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            inbound: BytesMut::with_capacity(RECEIVE_SIZE),
            parse_tries: 0,
            parse_last_size: 0,
            url: None,
            protocol: String::new(),
            last_url: String::new(),
            mode: Mode::Normal,
            request: RequestHeaders::default(),
            response: ResponseData::default(),
            header_output: Vec::new(),
            header_sent: 0,
            sent: 0,
            rlen: 0,
            gzip: None,
            input: None,
            keep_alive: false,
            corked: false,
            wait_receive: true,
            wait_send: false,
            stats_received: 0,
            stats_sent: 0,
            tv_in: now,
            tv_ready: now,
        }
    }

    /// Clears every request-scoped field in one step. Buffers keep their
    /// capacity; the decoded URL, owned header copies and any compressor or
    /// input file are dropped.
    pub fn reset(&mut self) {
        self.inbound.clear();
        self.parse_tries = 0;
        self.parse_last_size = 0;

        self.url = None;
        self.protocol.clear();
        self.last_url.clear();
        self.mode = Mode::Normal;
        self.request = RequestHeaders::default();

        let mut data = std::mem::take(&mut self.response.data);
        data.clear();
        self.response = ResponseData {
            data,
            ..ResponseData::default()
        };
        self.header_output.clear();
        self.header_sent = 0;
        self.sent = 0;
        self.rlen = 0;
        self.gzip = None;
        self.input = None;

        self.keep_alive = false;
        self.corked = false;
        self.wait_receive = true;
        self.wait_send = false;

        self.stats_received = 0;
        self.stats_sent = 0;
    }

    /// Starts gzip compression for the current response.
    ///
    /// Does nothing if compression is already on or any byte of the
    /// response has been written.
    pub fn enable_gzip(&mut self, level: u32) -> bool {
        if self.gzip.is_some() {
            tracing::debug!("Compression has already been initialized for this response");
            return false;
        }
        if self.response_started() {
            tracing::error!("Cannot enable compression in the middle of a response");
            return false;
        }
        self.gzip = Some(GzipStream::new(level));
        true
    }

    /// True once any byte of the current response reached the socket.
    pub fn response_started(&self) -> bool {
        self.header_sent > 0 || self.sent > 0
    }

    /// A file copy is still feeding the output buffer.
    pub fn expects_file_input(&self) -> bool {
        self.mode == Mode::FileCopy && self.wait_receive && self.rlen > self.response.data.len()
    }
}
