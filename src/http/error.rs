use std::io;

/// Failures that end a connection. The readiness loop tears the
/// connection down on any of them; none is retried.
#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("socket accepted zero bytes")]
    WriteZero,
    #[error("compression failed: {0}")]
    Compression(io::Error),
    #[error("cannot read file: {0}")]
    FileRead(io::Error),
    #[error("plain-text STREAM refused, encryption is required")]
    EncryptionRequired,
}

impl ConnectionError {
    /// The peer going away is an ordinary end of a connection.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ConnectionError::PeerClosed => true,
            ConnectionError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
