//! Static files below the document root.
//!
//! A file is only served if its name is made of `[A-Za-z0-9/._-]`, has no
//! `..`, resolves (after at most one `index.html` redirection) to a regular
//! file, and is owned by the configured user and group. The name checks run
//! before any filesystem call.

use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::Path;

use crate::acl::Acl;
use crate::context::ServerContext;
use crate::http::mime::ContentType;
use crate::http::response::status;
use crate::http::state::{ClientInfo, ConnectionState, Mode};

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_')
}

/// Checks a request path before it touches the filesystem.
///
/// # Example
///
/// ```
/// # use lantern::http::files::check_filename;
/// assert!(check_filename("index.html").is_ok());
/// assert!(check_filename("a/../b").is_err());
/// assert!(check_filename("a b").is_err());
/// ```
pub fn check_filename(filename: &str) -> Result<(), &'static str> {
    if !filename.chars().all(is_allowed_char) {
        return Err("Filename contains invalid characters: ");
    }
    if filename.contains("..") {
        return Err("Relative filenames are not supported: ");
    }
    Ok(())
}

/// Prepares `state` to copy `filename` from the document root.
///
/// On success the connection is switched to [`Mode::FileCopy`] with the
/// body length and modification time recorded; the body itself is pumped
/// later by the transmission side. Any refusal leaves an HTML message in
/// the response body and returns its code.
pub fn send_file(
    state: &mut ConnectionState,
    ctx: &ServerContext,
    client: &ClientInfo,
    filename: &str,
) -> u16 {
    if !ctx.access.allows(Acl::Dashboard, client) {
        return state.response.permission_denied();
    }

    let filename = filename.trim_start_matches('/');
    tracing::debug!(file = filename, "Looking for file");

    if let Err(message) = check_filename(filename) {
        tracing::debug!(file = filename, "File name is not acceptable");
        state.response.set_html_message(message, filename);
        return status::BAD_REQUEST;
    }

    let web_dir = &ctx.config.server.web_dir;
    let mut path = web_dir.join(filename);
    let mut redirected = false;

    let meta = loop {
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(_) => {
                tracing::debug!(path = %path.display(), "File not found");
                state.response.set_html_message(
                    "File does not exist, or is not accessible: ",
                    &path.display().to_string(),
                );
                return status::NOT_FOUND;
            }
        };

        if meta.is_dir() && !redirected {
            path = web_dir.join(filename).join("index.html");
            redirected = true;
            continue;
        }
        break meta;
    };

    if !meta.file_type().is_file() {
        tracing::error!(path = %path.display(), "File is not a regular file. Access denied.");
        return not_permitted(state, &path);
    }

    if meta.uid() != ctx.owner.uid {
        tracing::error!(
            path = %path.display(),
            uid = meta.uid(),
            expected = ctx.owner.uid,
            "File is owned by another user. Access denied."
        );
        return not_permitted(state, &path);
    }

    if meta.gid() != ctx.owner.gid {
        tracing::error!(
            path = %path.display(),
            gid = meta.gid(),
            expected = ctx.owner.gid,
            "File is owned by another group. Access denied."
        );
        return not_permitted(state, &path);
    }

    let file = match OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) if is_busy(&e) => {
            tracing::error!(path = %path.display(), "File is busy, sending 307 to force a retry");
            state.response.header.push_str(&format!("Location: /{filename}\r\n"));
            state.response.set_html_message(
                "File is currently busy, please try again later: ",
                &path.display().to_string(),
            );
            return status::TEMPORARY_REDIRECT;
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Cannot open file");
            state
                .response
                .set_html_message("Cannot open file: ", &path.display().to_string());
            return status::NOT_FOUND;
        }
    };

    let size = meta.len() as usize;
    tracing::debug!(path = %path.display(), bytes = size, "Sending file");

    let response = &mut state.response;
    response.content_type = ContentType::for_filename(&path.to_string_lossy());
    response.flush();
    response.data.reserve(size);
    response.date = meta.modified().ok();
    response.cacheable = true;

    state.mode = Mode::FileCopy;
    state.wait_receive = true;
    state.wait_send = false;
    state.rlen = size;
    state.input = Some(file);

    status::OK
}

fn is_busy(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock || e.raw_os_error() == Some(libc::EBUSY)
}

fn not_permitted(state: &mut ConnectionState, path: &Path) -> u16 {
    state.response.set_html_message(
        "Access to file is not permitted: ",
        &path.display().to_string(),
    );
    status::FORBIDDEN
}

