//! Maps a parsed request to the code that answers it.
//!
//! The first path segment selects the route: `api` goes to the versioned
//! API, `host` re-targets the request at another host, `lantern.conf`
//! dumps the running configuration, and anything else is a static file
//! below the document root.

use std::sync::Arc;

use crate::acl::Acl;
use crate::api::{self, ApiRequest};
use crate::context::ServerContext;
use crate::hosts::Host;
use crate::http::files;
use crate::http::hash::simple_hash;
use crate::http::mime::ContentType;
use crate::http::response::status;
use crate::http::state::{ClientInfo, ConnectionState};
use crate::http::url::RequestUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Api,
    Host,
    ConfigDump,
}

/// Directory names with precomputed hashes.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<(u32, &'static str, Route)>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        let entries = [
            ("api", Route::Api),
            ("host", Route::Host),
            ("lantern.conf", Route::ConfigDump),
        ]
        .into_iter()
        .map(|(name, route)| (simple_hash(name), name, route))
        .collect();

        Self { entries }
    }

    pub fn lookup(&self, directory: &str) -> Option<Route> {
        let hash = simple_hash(directory);
        self.entries
            .iter()
            .find(|(h, name, _)| *h == hash && *name == directory)
            .map(|(_, _, route)| *route)
    }
}

/// Routes the current request against the local host and returns the
/// response code. The response body is left in `state.response`.
pub fn route(state: &mut ConnectionState, ctx: &ServerContext, client: &ClientInfo) -> u16 {
    let Some(url) = state.url.take() else {
        state
            .response
            .set_text(ContentType::TextPlain, "I don't understand you...\r\n");
        return status::BAD_REQUEST;
    };

    let host = Arc::clone(ctx.hosts.localhost());
    let code = process_url(state, ctx, client, &host, &url);

    // a host switch leaves its rewritten URL in place
    if state.url.is_none() {
        state.url = Some(url);
    }
    code
}

/// Dispatches `url` for `host`.
pub fn process_url(
    state: &mut ConnectionState,
    ctx: &ServerContext,
    client: &ClientInfo,
    host: &Arc<Host>,
    url: &RequestUrl,
) -> u16 {
    if url.path().len() > 1 {
        match ctx.routes.lookup(url.directory()) {
            Some(Route::Api) => {
                if !ctx.access.allows(Acl::Dashboard, client)
                    && !ctx.access.allows(Acl::Management, client)
                {
                    return state.response.permission_denied();
                }
                let request = ApiRequest {
                    host,
                    url,
                    client,
                    user_agent: state.request.user_agent.as_deref(),
                    auth_bearer_token: state.request.auth_bearer_token.as_deref(),
                    do_not_track: state.request.do_not_track,
                };
                return api::dispatch(ctx, &request, &mut state.response);
            }
            Some(Route::Host) => return switch_host(state, ctx, client, host, url),
            Some(Route::ConfigDump) => {
                if !ctx.access.allows(Acl::Config, client) {
                    return state.response.permission_denied();
                }
                state.response.no_cacheable();
                return match ctx.config.to_yaml() {
                    Ok(yaml) => {
                        state.response.set_text(ContentType::TextPlain, &yaml);
                        status::OK
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Cannot render the configuration");
                        state.response.set_text(
                            ContentType::TextPlain,
                            "Cannot render the configuration.\r\n",
                        );
                        status::INTERNAL_SERVER_ERROR
                    }
                };
            }
            None => {}
        }
    }

    let filename = match state.last_url.split_once('?') {
        Some((path, _)) => path.to_string(),
        None => state.last_url.clone(),
    };
    files::send_file(state, ctx, client, &filename)
}

/// Handles `/host/<name-or-guid>/<rest>`: looks the host up and routes
/// `/<rest>` against it. Only one level of nesting is allowed.
fn switch_host(
    state: &mut ConnectionState,
    ctx: &ServerContext,
    client: &ClientInfo,
    host: &Arc<Host>,
    url: &RequestUrl,
) -> u16 {
    if !ctx.hosts.is_localhost(host) {
        state.response.set_text(
            ContentType::TextHtml,
            "Nesting of hosts is not allowed.",
        );
        return status::BAD_REQUEST;
    }

    let decoded = url.decoded();
    let tail = decoded.get(url.directory_end() + 1..).unwrap_or("");
    let (id, rest) = match tail.find(['/', '?']) {
        Some(i) if tail.as_bytes()[i] == b'/' => (&tail[..i], &tail[i + 1..]),
        Some(i) => (&tail[..i], &tail[i..]),
        None => (tail, ""),
    };

    let found = if id.is_empty() { None } else { ctx.hosts.find(id) };
    let Some(target) = found else {
        state.response.set_html_message(
            "This server does not maintain a database for host: ",
            id,
        );
        return status::NOT_FOUND;
    };

    tracing::debug!(host = %target.hostname, url = %rest, "Switching host");

    state.last_url = format!("/{rest}");
    let rewritten = RequestUrl::parse(state.last_url.clone());
    let code = process_url(state, ctx, client, &target, &rewritten);
    state.url = Some(rewritten);
    code
}
