//! Hosts served by this process.
//!
//! The local host is always present; other hosts (for instance children
//! streaming their metrics to us) are looked up by name or unique id when a
//! request switches host with `/host/<name-or-id>/...`.

pub mod registry;

pub use registry::{Host, HostRegistry, StaticHosts};
