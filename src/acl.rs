//! Access predicates.
//!
//! Every request is checked against one or more access lists before it is
//! served. How a list decides is up to the implementation; the default one
//! simply follows the `access` section of the configuration.

use crate::config::AccessConfig;
use crate::http::state::ClientInfo;

/// Access lists a request may be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acl {
    Dashboard,
    Registry,
    Badges,
    Management,
    /// The configuration dump.
    Config,
    /// Metric ingestion over `STREAM`.
    Stream,
}

pub trait AccessControl: Send + Sync {
    fn allows(&self, acl: Acl, client: &ClientInfo) -> bool;

    /// True when the client may reach at least one of the web-facing lists.
    fn allows_any_web(&self, client: &ClientInfo) -> bool {
        [
            Acl::Dashboard,
            Acl::Registry,
            Acl::Badges,
            Acl::Management,
            Acl::Config,
        ]
        .into_iter()
        .any(|acl| self.allows(acl, client))
    }
}

/// Static allow/deny per list, from the configuration.
#[derive(Debug, Clone)]
pub struct ConfigAccess {
    config: AccessConfig,
}

impl ConfigAccess {
    pub fn new(config: AccessConfig) -> Self {
        Self { config }
    }
}

impl AccessControl for ConfigAccess {
    fn allows(&self, acl: Acl, _client: &ClientInfo) -> bool {
        match acl {
            Acl::Dashboard => self.config.dashboard,
            Acl::Registry => self.config.registry,
            Acl::Badges => self.config.badges,
            Acl::Management => self.config.management,
            Acl::Config => self.config.config,
            Acl::Stream => self.config.stream,
        }
    }
}
