//! Status codes and small helpers for response bodies.

/// HTTP status codes the engine produces itself. Handlers may return any
/// other code; it is passed through unchanged.
pub mod status {
    pub const OK: u16 = 200;
    pub const MOVED_PERMANENTLY: u16 = 301;
    pub const TEMPORARY_REDIRECT: u16 = 307;
    pub const BAD_REQUEST: u16 = 400;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

/// Returns the reason phrase for a status code.
///
/// Codes without a dedicated phrase fall back to a phrase for their class.
///
/// # Example
///
/// ```
/// # use lantern::http::response::reason_phrase;
/// assert_eq!(reason_phrase(200), "OK");
/// assert_eq!(reason_phrase(418), "Bad Request");
/// ```
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        301 => "Moved Permanently",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        412 => "Preconditions Failed",
        100..=199 => "Informational",
        200..=299 => "Successful",
        300..=399 => "Redirection",
        400..=499 => "Bad Request",
        500..=599 => "Server Error",
        _ => "Undefined Error",
    }
}

/// Appends `s` to `out` with HTML special characters escaped.
pub fn push_html_escaped(out: &mut Vec<u8>, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            '"' => out.extend_from_slice(b"&quot;"),
            '\'' => out.extend_from_slice(b"&#39;"),
            '/' => out.extend_from_slice(b"&#x2F;"),
            _ => {
                let mut tmp = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}
