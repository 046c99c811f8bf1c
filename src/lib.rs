//! Lantern - embedded HTTP/1.1 server
//!
//! Core library: the per-connection engine and the services around it.

pub mod acl;
pub mod api;
pub mod config;
pub mod context;
pub mod hosts;
pub mod http;
pub mod server;
