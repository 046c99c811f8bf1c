//! Request URL decoding and splitting.
//!
//! A [`RequestUrl`] owns the decoded URL of one request and exposes the
//! path, query, directory, API version, command and query parameters as
//! index ranges into it. Nothing aliases the receive buffer, so a
//! `RequestUrl` stays valid regardless of what happens to the connection
//! buffers, and it is dropped at the request boundary.
//!
//! Two splitting rules exist and are kept apart on purpose:
//!
//! - **with a query string** the directory is the first path segment; when
//!   it is `api` the next segment is the version and everything after it
//!   (up to `?`) is the command.
//! - **without a query string** the version is the segment following the
//!   directory whatever the directory is, and only the literal prefixes
//!   `api/v1/info` and `api/v1/charts` produce a command.
//!
//! So `/api/v1/data?x=1` has command `data` while `/api/v1/data` has none.

use std::ops::Range;

use percent_encoding::percent_decode;

/// Longest decoded URL kept for one request.
pub const MAX_URL_LEN: usize = 8192;

/// Most query parameters recorded for one request.
pub const MAX_QUERY_PARAMS: usize = 400;

/// A `name=value` pair of the query string, as ranges into the decoded URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParam {
    name: Range<usize>,
    value: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    decoded: String,
    path: Range<usize>,
    query: Option<Range<usize>>,
    directory: Range<usize>,
    version: Option<Range<usize>>,
    command: Option<Range<usize>>,
    params: Vec<QueryParam>,
}

/// Percent-decodes a raw request target.
///
/// `+` becomes a space and decoded control characters are replaced by
/// spaces so they can never reach a response header. The result is capped
/// at [`MAX_URL_LEN`] bytes.
pub fn decode(raw: &[u8]) -> String {
    let plus_as_space: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();

    let bytes: Vec<u8> = percent_decode(&plus_as_space)
        .map(|b| if b.is_ascii_control() { b' ' } else { b })
        .collect();

    let mut decoded = String::from_utf8_lossy(&bytes).into_owned();
    truncate_at_boundary(&mut decoded, MAX_URL_LEN);
    decoded
}

pub(crate) fn truncate_at_boundary(s: &mut String, max: usize) {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
}

/// Byte offset of the ASCII `needle` in `s[from..to]`. Offsets need not
/// fall on char boundaries.
fn find_from(s: &str, from: usize, to: usize, needle: u8) -> Option<usize> {
    s.as_bytes()
        .get(from..to)?
        .iter()
        .position(|&b| b == needle)
        .map(|i| i + from)
}

impl RequestUrl {
    /// Splits an already decoded URL.
    pub fn parse(decoded: impl Into<String>) -> Self {
        let decoded = decoded.into();
        let len = decoded.len();
        let begin = usize::from(decoded.starts_with('/'));

        let mut url = RequestUrl {
            path: 0..len,
            query: None,
            directory: begin..len,
            version: None,
            command: None,
            params: Vec::new(),
            decoded,
        };

        match url.decoded.find('?') {
            Some(q) => url.split_with_query(begin, q),
            None => url.split_without_query(begin),
        }

        url
    }

    fn split_with_query(&mut self, begin: usize, q: usize) {
        let s = &self.decoded;
        self.path = 0..q;
        self.query = Some(q + 1..s.len());

        match find_from(s, begin, q, b'/') {
            Some(slash) => {
                self.directory = begin..slash;
                if &s[begin..slash] == "api" {
                    if let Some(vend) = find_from(s, slash + 1, q, b'/') {
                        self.version = Some(slash + 1..vend);
                        self.command = Some(vend + 1..q);
                    }
                }
            }
            None => self.directory = begin..q,
        }

        self.params = tokenize_query(s, q + 1);
        if self.params.is_empty() {
            // a query without any name=value pair is kept whole
            let rest = q + 1..s.len();
            self.params.push(QueryParam {
                name: rest.clone(),
                value: rest,
            });
        }
    }

    fn split_without_query(&mut self, begin: usize) {
        let s = &self.decoded;
        let len = s.len();

        if let Some(slash) = find_from(s, begin, len, b'/') {
            self.directory = begin..slash;
            let vstart = slash + 1;
            let vend = find_from(s, vstart + 1, len, b'/').unwrap_or(len);
            self.version = Some(vstart..vend.max(vstart));
        }

        let tail = &s[begin..];
        self.command = tail.strip_prefix("api/v1/").and_then(|rest| {
            let start = begin + "api/v1/".len();
            if rest.starts_with("info") {
                Some(start..start + 4)
            } else if rest.starts_with("charts") {
                Some(start..start + 6)
            } else {
                None
            }
        });
    }

    pub fn decoded(&self) -> &str {
        &self.decoded
    }

    pub fn path(&self) -> &str {
        &self.decoded[self.path.clone()]
    }

    /// Query string without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.query.clone().map(|r| &self.decoded[r])
    }

    pub fn directory(&self) -> &str {
        &self.decoded[self.directory.clone()]
    }

    pub fn version(&self) -> Option<&str> {
        self.version.clone().map(|r| &self.decoded[r])
    }

    pub fn command(&self) -> Option<&str> {
        self.command.clone().map(|r| &self.decoded[r])
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Query parameters in order of appearance.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.params.iter().map(|p| {
            (
                &self.decoded[p.name.clone()],
                &self.decoded[p.value.clone()],
            )
        })
    }

    /// First value of the named query parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Byte offset in the decoded URL where the directory segment ends.
    pub(crate) fn directory_end(&self) -> usize {
        self.directory.end
    }
}

/// Splits `s[start..]` on `&` into `name=value` pairs. Tokens without `=`
/// or with an empty name are skipped.
fn tokenize_query(s: &str, start: usize) -> Vec<QueryParam> {
    let mut params = Vec::new();
    let mut pos = start;

    for token in s[start..].split('&') {
        let tstart = pos;
        pos += token.len() + 1;

        if params.len() >= MAX_QUERY_PARAMS {
            tracing::debug!(max = MAX_QUERY_PARAMS, "Too many query parameters, ignoring the rest");
            break;
        }

        if let Some(eq) = token.find('=') {
            if eq == 0 {
                continue;
            }
            params.push(QueryParam {
                name: tstart..tstart + eq,
                value: tstart + eq + 1..tstart + token.len(),
            });
        }
    }

    params
}
