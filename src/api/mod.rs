//! Versioned API dispatch.
//!
//! The engine only checks the version segment of `/api/<version>/...`;
//! producing the payload is up to an [`ApiHandler`]. The default handler,
//! [`BuiltinApi`], answers a couple of identity commands.

mod v1;

use std::sync::Arc;

pub use v1::BuiltinApi;

use crate::context::ServerContext;
use crate::hosts::Host;
use crate::http::mime::ContentType;
use crate::http::response::status;
use crate::http::state::{ClientInfo, ResponseData};
use crate::http::url::RequestUrl;

/// Everything a handler may look at for one API call.
#[derive(Debug)]
pub struct ApiRequest<'a> {
    /// Host the request targets; differs from the local host after a
    /// `/host/<id>/` switch.
    pub host: &'a Arc<Host>,
    pub url: &'a RequestUrl,
    pub client: &'a ClientInfo,
    pub user_agent: Option<&'a str>,
    pub auth_bearer_token: Option<&'a str>,
    /// The client sent `DNT: 1` and the do-not-track policy is on. A
    /// handler that sets cookies anyway marks `tracking_required`.
    pub do_not_track: bool,
}

/// Produces API payloads.
///
/// A handler fills `response` (body, content type, cacheability, cookies,
/// extra header lines) and returns the status code to send; any code is
/// passed through unchanged.
pub trait ApiHandler: Send + Sync {
    fn v1(&self, request: &ApiRequest<'_>, response: &mut ResponseData) -> u16;
}

/// Checks the API version and hands the call to the handler.
pub fn dispatch(ctx: &ServerContext, request: &ApiRequest<'_>, response: &mut ResponseData) -> u16 {
    match request.url.version() {
        None | Some("") => {
            response.set_text(ContentType::TextHtml, "Which API version?");
            status::BAD_REQUEST
        }
        Some("v1") => ctx.api.v1(request, response),
        Some(version) => {
            response.set_html_message("Unsupported API version: ", version);
            status::NOT_FOUND
        }
    }
}
