//! IPC: length-prefixed s-expression protocol over a Unix socket.

pub mod dispatch;
pub mod server;

pub use server::IpcServer;
