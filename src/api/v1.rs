use serde::Serialize;

use crate::api::{ApiHandler, ApiRequest};
use crate::http::mime::ContentType;
use crate::http::response::status;
use crate::http::state::ResponseData;

/// Identity of the targeted host, served at `/api/v1/info`.
#[derive(Debug, Serialize)]
struct Info<'a> {
    version: &'static str,
    hostname: &'a str,
    guid: &'a str,
    update_every: u64,
}

/// Chart index, served at `/api/v1/charts`. This server keeps no charts
/// of its own.
#[derive(Debug, Serialize)]
struct Charts<'a> {
    hostname: &'a str,
    update_every: u64,
    charts: serde_json::Map<String, serde_json::Value>,
}

/// Default v1 handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinApi;

impl BuiltinApi {
    fn reply<T: Serialize>(response: &mut ResponseData, body: &T) -> u16 {
        match serde_json::to_string(body) {
            Ok(json) => {
                response.set_text(ContentType::ApplicationJson, &json);
                response.no_cacheable();
                status::OK
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot serialize API response");
                response.set_text(ContentType::TextPlain, "Internal error.\r\n");
                status::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl ApiHandler for BuiltinApi {
    fn v1(&self, request: &ApiRequest<'_>, response: &mut ResponseData) -> u16 {
        let host = request.host;

        match request.url.command() {
            None | Some("") => {
                response.set_text(ContentType::TextHtml, "Which API command?");
                status::BAD_REQUEST
            }
            Some("info") => Self::reply(
                response,
                &Info {
                    version: env!("CARGO_PKG_VERSION"),
                    hostname: &host.hostname,
                    guid: &host.guid,
                    update_every: host.update_every,
                },
            ),
            Some("charts") => Self::reply(
                response,
                &Charts {
                    hostname: &host.hostname,
                    update_every: host.update_every,
                    charts: serde_json::Map::new(),
                },
            ),
            Some(command) => {
                response.set_html_message("Unsupported v1 API command: ", command);
                status::NOT_FOUND
            }
        }
    }
}
