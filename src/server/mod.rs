//! Network side: accepting connections and driving each one from socket
//! readiness.

pub mod listener;
pub mod stream;
