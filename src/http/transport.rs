//! Non-blocking byte transport.
//!
//! The engine never blocks: every read or write is attempted once and a
//! "would block" result hands control back to the readiness loop. Anything
//! that can do that is a [`Transport`]; an encrypted stream plugs in the
//! same way as a plain socket.

use std::io;

pub trait Transport {
    /// Reads what is available. `Ok(0)` means the peer closed.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes what the transport accepts right now.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Engages or releases write batching.
    fn set_cork(&mut self, enabled: bool) -> io::Result<()>;
}

impl Transport for tokio::net::TcpStream {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_read(self, buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::TcpStream::try_write(self, buf)
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn set_cork(&mut self, enabled: bool) -> io::Result<()> {
        socket2::SockRef::from(&*self).set_cork(enabled)
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn set_cork(&mut self, _enabled: bool) -> io::Result<()> {
        Ok(())
    }
}
