use std::fmt::Write;
use std::time::{Duration, SystemTime};

use httpdate::fmt_http_date;

use crate::context::ServerContext;
use crate::http::response::{reason_phrase, status};
use crate::http::state::{ConnectionState, MAX_COOKIES, Mode};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Longest `Location` value emitted for an https redirect.
pub const MAX_LOCATION_LEN: usize = 8192;

/// Expiry of cacheable responses without an explicit one.
const CACHEABLE_TTL: Duration = Duration::from_secs(86_400);

const PREFLIGHT_HEADERS: &str = "Access-Control-Allow-Methods: GET, OPTIONS\r\n\
    Access-Control-Allow-Headers: accept, x-requested-with, origin, content-type, cookie, pragma, cache-control\r\n\
    Access-Control-Max-Age: 1209600\r\n";

fn server_identity() -> String {
    format!("Lantern Embedded HTTP Server {}", env!("CARGO_PKG_VERSION"))
}

/// Builds the `Location` of an https redirect.
///
/// Returns `None` when the result would exceed [`MAX_LOCATION_LEN`] or is
/// not a valid URL; the header is then left out.
pub fn https_location(host: &str, last_url: &str) -> Option<String> {
    let raw_len = "https://".len() + host.len() + last_url.len();
    if raw_len > MAX_LOCATION_LEN {
        tracing::error!(
            bytes = raw_len,
            max = MAX_LOCATION_LEN,
            "Redirect location is too long, omitting it"
        );
        return None;
    }

    match url::Url::parse(&format!("https://{host}{last_url}")) {
        Ok(location) if location.as_str().len() <= MAX_LOCATION_LEN => {
            Some(location.as_str().to_string())
        }
        Ok(_) => {
            tracing::error!(max = MAX_LOCATION_LEN, "Encoded redirect location is too long, omitting it");
            None
        }
        Err(e) => {
            tracing::error!(host, error = %e, "Cannot build redirect location, omitting it");
            None
        }
    }
}

/// Serializes the status line and header block of the current response
/// into `state.header_output`.
///
/// Decides the body framing as a side effect: with compression the body is
/// chunked; otherwise a known length is sent as `Content-Length` and an
/// unknown one turns keep-alive off so the close delimits the body.
pub fn build_header(state: &mut ConnectionState, ctx: &ServerContext) {
    let code = state.response.code;
    if code != status::OK {
        state.response.no_cacheable();
    }

    let content_length = if state.gzip.is_some() {
        None
    } else if !state.response.data.is_empty() {
        Some(state.response.data.len())
    } else if state.rlen > 0 {
        Some(state.rlen)
    } else {
        None
    };
    if state.gzip.is_none() && content_length.is_none() {
        state.keep_alive = false;
    }

    let now = SystemTime::now();
    let date = state.response.date.unwrap_or(now);
    let expires = state.response.expires.unwrap_or_else(|| {
        if state.response.cacheable {
            now + CACHEABLE_TTL
        } else {
            now + Duration::from_secs(ctx.hosts.localhost().update_every)
        }
    });

    let response = &state.response;
    let mut out = String::with_capacity(512);

    let _ = write!(out, "{} {} {}\r\n", HTTP_VERSION, code, reason_phrase(code));
    let _ = write!(
        out,
        "Connection: {}\r\n",
        if state.keep_alive { "keep-alive" } else { "close" }
    );
    let _ = write!(out, "Server: {}\r\n", server_identity());
    let _ = write!(
        out,
        "Access-Control-Allow-Origin: {}\r\nAccess-Control-Allow-Credentials: true\r\n",
        state.request.origin
    );
    let _ = write!(out, "Content-Type: {}\r\n", response.content_type.as_str());
    let _ = write!(out, "Date: {}\r\n", fmt_http_date(date));

    if code == status::MOVED_PERMANENTLY {
        let host = if state.request.host.is_empty() {
            ctx.config.server.hostname.as_str()
        } else {
            state.request.host.as_str()
        };
        if let Some(location) = https_location(host, &state.last_url) {
            let _ = write!(out, "Location: {location}\r\n");
        }
    }

    if let Some(frame_options) = &ctx.config.privacy.x_frame_options {
        let _ = write!(out, "X-Frame-Options: {frame_options}\r\n");
    }

    for cookie in response.cookies.iter().take(MAX_COOKIES) {
        let _ = write!(out, "Set-Cookie: {cookie}\r\n");
    }

    if ctx.config.privacy.respect_do_not_track {
        if !response.cookies.is_empty() || response.tracking_required {
            out.push_str("Tk: T;cookies\r\n");
        } else {
            out.push_str("Tk: N\r\n");
        }
    }

    if state.mode == Mode::Options {
        out.push_str(PREFLIGHT_HEADERS);
    } else {
        let _ = write!(
            out,
            "Cache-Control: {}\r\nExpires: {}\r\n",
            if response.cacheable { "public" } else { "no-cache" },
            fmt_http_date(expires)
        );
    }

    out.push_str(&response.header);

    if state.gzip.is_some() {
        out.push_str("Content-Encoding: gzip\r\nTransfer-Encoding: chunked\r\n");
    } else if let Some(len) = content_length {
        let _ = write!(out, "Content-Length: {len}\r\n");
    }

    out.push_str("\r\n");

    state.header_output.clear();
    state.header_output.extend_from_slice(out.as_bytes());
    state.header_sent = 0;
}
