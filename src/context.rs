//! Process-wide, read-only server context.
//!
//! Built once at startup, before any connection is accepted, and shared
//! through an `Arc`. It resolves the web files owner, precomputes the
//! header and directory lookup tables and carries the collaborators the
//! engine consults (access lists, hosts, API handler, stream receiver).

use std::ffi::CString;

use crate::acl::{AccessControl, ConfigAccess};
use crate::api::{ApiHandler, BuiltinApi};
use crate::config::Config;
use crate::hosts::{HostRegistry, StaticHosts};
use crate::http::parser::HeaderTable;
use crate::http::router::RouteTable;
use crate::server::stream::{RefuseStreams, StreamReceiver};

/// Owner every served file must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOwner {
    pub uid: u32,
    pub gid: u32,
}

impl FileOwner {
    /// The effective user and group of this process.
    pub fn effective() -> Self {
        // SAFETY: geteuid/getegid cannot fail and touch no memory.
        unsafe {
            Self {
                uid: libc::geteuid(),
                gid: libc::getegid(),
            }
        }
    }

    /// Resolves user and group names. Empty or unknown names fall back to
    /// the effective ids.
    pub fn resolve(user: &str, group: &str) -> Self {
        let effective = Self::effective();
        Self {
            uid: lookup_uid(user).unwrap_or(effective.uid),
            gid: lookup_gid(group).unwrap_or(effective.gid),
        }
    }
}

fn lookup_uid(user: &str) -> Option<u32> {
    if user.is_empty() {
        return None;
    }
    let name = CString::new(user).ok()?;
    // SAFETY: called during single-threaded startup; the returned record
    // is read before any other passwd call.
    let pw = unsafe { libc::getpwnam(name.as_ptr()) };
    if pw.is_null() {
        tracing::error!(user, "User is not present. Ignoring option.");
        return None;
    }
    let uid = unsafe { (*pw).pw_uid };
    tracing::debug!(user, uid, "Web files owner set");
    Some(uid)
}

fn lookup_gid(group: &str) -> Option<u32> {
    if group.is_empty() {
        return None;
    }
    let name = CString::new(group).ok()?;
    // SAFETY: see lookup_uid.
    let gr = unsafe { libc::getgrnam(name.as_ptr()) };
    if gr.is_null() {
        tracing::error!(group, "Group is not present. Ignoring option.");
        return None;
    }
    let gid = unsafe { (*gr).gr_gid };
    tracing::debug!(group, gid, "Web files group set");
    Some(gid)
}

pub struct ServerContext {
    pub config: Config,
    pub owner: FileOwner,
    pub headers: HeaderTable,
    pub routes: RouteTable,
    pub access: Box<dyn AccessControl>,
    pub hosts: Box<dyn HostRegistry>,
    pub api: Box<dyn ApiHandler>,
    pub streams: Box<dyn StreamReceiver>,
}

impl ServerContext {
    /// Builds the context with the default collaborators for `config`.
    pub fn new(config: Config) -> Self {
        let owner = FileOwner::resolve(
            &config.server.web_files_owner,
            &config.server.web_files_group,
        );

        Self {
            owner,
            headers: HeaderTable::new(),
            routes: RouteTable::new(),
            access: Box::new(ConfigAccess::new(config.access.clone())),
            hosts: Box::new(StaticHosts::from_config(&config)),
            api: Box::new(BuiltinApi),
            streams: Box::new(RefuseStreams),
            config,
        }
    }

    pub fn with_owner(mut self, owner: FileOwner) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_access(mut self, access: impl AccessControl + 'static) -> Self {
        self.access = Box::new(access);
        self
    }

    pub fn with_hosts(mut self, hosts: impl HostRegistry + 'static) -> Self {
        self.hosts = Box::new(hosts);
        self
    }

    pub fn with_api(mut self, api: impl ApiHandler + 'static) -> Self {
        self.api = Box::new(api);
        self
    }

    pub fn with_streams(mut self, streams: impl StreamReceiver + 'static) -> Self {
        self.streams = Box::new(streams);
        self
    }

    pub fn compression_enabled(&self) -> bool {
        self.config.compression.enabled
    }
}
