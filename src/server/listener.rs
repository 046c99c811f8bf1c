use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::Interest;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::context::ServerContext;
use crate::http::connection::{Connection, Processed, SendOutcome};
use crate::http::error::ConnectionError;
use crate::http::state::ClientInfo;
use crate::http::transmit::ReceiveOutcome;

/// Binds the configured address and serves until the task is dropped.
pub async fn run(ctx: Arc<ServerContext>) -> anyhow::Result<()> {
    let addr = ctx.config.server.listen_addr.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    accept_loop(listener, ctx).await
}

/// Accepts connections and gives each its own task.
pub async fn accept_loop(listener: TcpListener, ctx: Arc<ServerContext>) -> anyhow::Result<()> {
    let mut next_id: u64 = 0;

    loop {
        let (socket, peer) = listener.accept().await.context("accept failed")?;
        next_id += 1;
        let id = next_id;
        debug!(id, %peer, "Accepted connection");

        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            match serve(socket, peer, id, ctx).await {
                Ok(()) => debug!(id, %peer, "Connection closed"),
                Err(e) if e.is_disconnect() => debug!(id, %peer, "Client disconnected"),
                Err(e) => warn!(id, %peer, error = %e, "Connection torn down"),
            }
        });
    }
}

/// Readiness loop of one connection.
///
/// Waits for whatever the engine is interested in, then drives it. File
/// input needs no waiting: a file copy is pumped directly whenever the
/// output buffer has been drained.
pub async fn serve(
    mut socket: TcpStream,
    peer: SocketAddr,
    id: u64,
    ctx: Arc<ServerContext>,
) -> Result<(), ConnectionError> {
    let mut conn = Connection::new(id, ClientInfo::from(peer), Arc::clone(&ctx), false);

    loop {
        if conn.is_copying_file() && !conn.wants_send() {
            if conn.receive(&mut socket)? == ReceiveOutcome::WouldBlock {
                // files have no readiness to wait on; let other tasks run
                tokio::task::yield_now().await;
            }
            continue;
        }

        let readable = conn.wants_receive() && !conn.is_copying_file();
        let writable = conn.wants_send();
        let interest = match (readable, writable) {
            (true, true) => Interest::READABLE | Interest::WRITABLE,
            (true, false) => Interest::READABLE,
            (false, true) => Interest::WRITABLE,
            (false, false) => {
                debug!(id, "Nothing left to wait for");
                return Ok(());
            }
        };

        let ready = socket.ready(interest).await?;

        if readable && ready.is_readable() {
            if let ReceiveOutcome::Received(_) = conn.receive(&mut socket)? {
                match conn.process_request()? {
                    Processed::Incomplete | Processed::Respond => {}
                    Processed::HandOff(request) => {
                        debug!(id, url = %request.url, "Handing connection to the stream receiver");
                        ctx.streams.take_over(socket, request);
                        return Ok(());
                    }
                }
            }
        }

        if conn.wants_send() && ready.is_writable() {
            if conn.send(&mut socket)? == SendOutcome::Closed {
                return Ok(());
            }
        }
    }
}
