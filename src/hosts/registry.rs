//! Host records and lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, HostConfig};

/// A host whose data this server can expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    /// Host name, e.g. "web-01"
    pub hostname: String,

    /// Unique machine id
    pub guid: String,

    /// Collection interval in seconds
    pub update_every: u64,
}

impl Host {
    pub fn new(config: &HostConfig) -> Self {
        Self {
            hostname: config.hostname.clone(),
            guid: config.guid.clone(),
            update_every: config.update_every,
        }
    }
}

/// Lookup of hosts by name and unique id.
pub trait HostRegistry: Send + Sync {
    /// The host this process runs on. Requests start out targeting it.
    fn localhost(&self) -> &Arc<Host>;

    fn find_by_hostname(&self, hostname: &str) -> Option<Arc<Host>>;

    fn find_by_guid(&self, guid: &str) -> Option<Arc<Host>>;

    /// Looks the identifier up as a host name first, then as a unique id.
    fn find(&self, id: &str) -> Option<Arc<Host>> {
        self.find_by_hostname(id).or_else(|| self.find_by_guid(id))
    }

    fn is_localhost(&self, host: &Arc<Host>) -> bool {
        Arc::ptr_eq(self.localhost(), host)
    }
}

/// Fixed set of hosts taken from the configuration.
#[derive(Debug, Clone)]
pub struct StaticHosts {
    localhost: Arc<Host>,
    by_name: HashMap<String, Arc<Host>>,
    by_guid: HashMap<String, Arc<Host>>,
}

impl StaticHosts {
    pub fn new(localhost: Host, others: Vec<Host>) -> Self {
        let localhost = Arc::new(localhost);
        let mut by_name = HashMap::new();
        let mut by_guid = HashMap::new();

        for host in std::iter::once(localhost.clone()).chain(others.into_iter().map(Arc::new)) {
            by_name
                .entry(host.hostname.clone())
                .or_insert_with(|| host.clone());
            by_guid.entry(host.guid.clone()).or_insert(host);
        }

        Self {
            localhost,
            by_name,
            by_guid,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let localhost = Host {
            hostname: config.server.hostname.clone(),
            guid: config.server.guid.clone(),
            update_every: config.server.update_every,
        };
        Self::new(localhost, config.hosts.iter().map(Host::new).collect())
    }

    pub fn len(&self) -> usize {
        self.by_guid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_guid.is_empty()
    }
}

impl HostRegistry for StaticHosts {
    fn localhost(&self) -> &Arc<Host> {
        &self.localhost
    }

    fn find_by_hostname(&self, hostname: &str) -> Option<Arc<Host>> {
        self.by_name.get(hostname).cloned()
    }

    fn find_by_guid(&self, guid: &str) -> Option<Arc<Host>> {
        self.by_guid.get(guid).cloned()
    }
}
