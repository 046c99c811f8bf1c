//! Hand-off of `STREAM` connections.
//!
//! Once a `STREAM` request passes its access check the socket stops being
//! an HTTP connection. It is given, together with what was parsed from the
//! request, to a [`StreamReceiver`].

use tokio::net::TcpStream;

use crate::http::state::ClientInfo;

/// What the engine learned about a `STREAM` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Decoded request URL, query included.
    pub url: String,
    pub user_agent: Option<String>,
    pub client: ClientInfo,
}

impl StreamRequest {
    /// Value of a query parameter of the request URL.
    pub fn param(&self, name: &str) -> Option<&str> {
        let (_, query) = self.url.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }
}

pub trait StreamReceiver: Send + Sync {
    /// Takes ownership of the socket.
    fn take_over(&self, socket: TcpStream, request: StreamRequest);
}

/// Receiver used when this server does not ingest metrics: the socket is
/// closed right away.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefuseStreams;

impl StreamReceiver for RefuseStreams {
    fn take_over(&self, socket: TcpStream, request: StreamRequest) {
        tracing::info!(
            peer = %request.client,
            hostname = request.param("hostname").unwrap_or("not available"),
            "No stream receiver configured, closing STREAM connection"
        );
        drop(socket);
    }
}
