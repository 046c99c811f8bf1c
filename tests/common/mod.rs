#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;

use flate2::read::GzDecoder;
use lantern::config::Config;
use lantern::context::{FileOwner, ServerContext};
use lantern::http::connection::{Connection, Processed, SendOutcome};
use lantern::http::state::ClientInfo;
use lantern::http::transmit::ReceiveOutcome;
use lantern::http::transport::Transport;

/// One scripted result of `try_read`.
pub enum ReadStep {
    Data(Vec<u8>),
    WouldBlock,
    Eof,
}

/// In-memory transport with scripted reads and controllable writes.
#[derive(Default)]
pub struct MockTransport {
    pub reads: VecDeque<ReadStep>,
    pub written: Vec<u8>,
    /// Largest number of bytes accepted by one write.
    pub write_limit: Option<usize>,
    /// Upcoming writes to refuse with `WouldBlock`.
    pub blocked_writes: usize,
    /// Refuse every other write with `WouldBlock`.
    pub alternate_blocking: bool,
    /// Accept zero bytes on every write.
    pub zero_writes: bool,
    pub cork_history: Vec<bool>,
    pub write_calls: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_read(&mut self, data: &[u8]) {
        self.reads.push_back(ReadStep::Data(data.to_vec()));
    }

    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }
}

impl Transport for MockTransport {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            Some(ReadStep::Data(data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.reads.push_front(ReadStep::Data(data[n..].to_vec()));
                }
                Ok(n)
            }
            Some(ReadStep::Eof) => Ok(0),
            Some(ReadStep::WouldBlock) | None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_calls += 1;
        if self.blocked_writes > 0 {
            self.blocked_writes -= 1;
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if self.alternate_blocking && self.write_calls % 2 == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        if self.zero_writes {
            return Ok(0);
        }
        let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn set_cork(&mut self, enabled: bool) -> io::Result<()> {
        self.cork_history.push(enabled);
        Ok(())
    }
}

/// Owner of `dir`, so files created below it pass the ownership check.
pub fn owner_of(dir: &Path) -> FileOwner {
    let meta = std::fs::metadata(dir).unwrap();
    FileOwner {
        uid: meta.uid(),
        gid: meta.gid(),
    }
}

pub fn config_for(web_dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.server.web_dir = web_dir.to_path_buf();
    cfg
}

pub fn context(cfg: Config) -> Arc<ServerContext> {
    let owner = owner_of(&cfg.server.web_dir);
    Arc::new(ServerContext::new(cfg).with_owner(owner))
}

pub fn client() -> ClientInfo {
    ClientInfo {
        ip: "127.0.0.1".to_string(),
        port: 40000,
    }
}

pub fn connection(ctx: Arc<ServerContext>) -> Connection {
    Connection::new(1, client(), ctx, false)
}

/// Drives one request/response exchange to its end, the way the readiness
/// loop would.
pub fn exchange(conn: &mut Connection, io: &mut MockTransport) -> SendOutcome {
    for _ in 0..100_000 {
        if conn.is_copying_file() && !conn.wants_send() {
            conn.receive(io).unwrap();
            continue;
        }
        if conn.wants_send() {
            match conn.send(io).unwrap() {
                outcome @ (SendOutcome::Completed | SendOutcome::Closed) => return outcome,
                SendOutcome::Pending | SendOutcome::AwaitingInput => continue,
            }
        }
        if conn.wants_receive() {
            match conn.receive(io).unwrap() {
                ReceiveOutcome::Received(_) => match conn.process_request().unwrap() {
                    Processed::Incomplete | Processed::Respond => {}
                    Processed::HandOff(request) => panic!("unexpected hand-off: {request:?}"),
                },
                ReceiveOutcome::WouldBlock => panic!("request stalled waiting for input"),
            }
            continue;
        }
        panic!("connection has nothing to do");
    }
    panic!("exchange did not finish");
}

/// Splits a raw response into its header block and body.
pub fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header block terminator");
    (
        String::from_utf8(raw[..end + 4].to_vec()).unwrap(),
        raw[end + 4..].to_vec(),
    )
}

/// Value of a header line in a header block.
pub fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.split("\r\n").find_map(|line| {
        let (n, v) = line.split_once(": ")?;
        n.eq_ignore_ascii_case(name).then_some(v)
    })
}

pub fn status_code(head: &str) -> u16 {
    head.split(' ').nth(1).unwrap().parse().unwrap()
}

/// Decodes a chunked body. Returns the concatenated payload and the number
/// of data chunks.
pub fn dechunk(body: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::new();
    let mut chunks = 0;
    let mut pos = 0;

    loop {
        let line_end = pos
            + body[pos..]
                .windows(2)
                .position(|w| w == b"\r\n")
                .expect("chunk size line");
        let size = usize::from_str_radix(std::str::from_utf8(&body[pos..line_end]).unwrap(), 16)
            .unwrap();
        pos = line_end + 2;
        if size == 0 {
            assert_eq!(&body[pos..], b"\r\n", "trailer must end the body");
            return (out, chunks);
        }
        out.extend_from_slice(&body[pos..pos + size]);
        pos += size;
        assert_eq!(&body[pos..pos + 2], b"\r\n", "chunk must end with CRLF");
        pos += 2;
        chunks += 1;
    }
}

pub fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}

/// Deterministic, poorly compressible bytes.
pub fn noise(len: usize) -> Vec<u8> {
    let mut x: u32 = 0x1234_5678;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            (x >> 24) as u8
        })
        .collect()
}
