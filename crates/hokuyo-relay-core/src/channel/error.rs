use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while setting up a channel.
///
/// Runtime receive/send failures are logged and counted instead.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel '{channel}': cannot bind {role} socket on {addr}: {source}")]
    Bind {
        channel: String,
        role: &'static str,
        addr: SocketAddr,
        source: io::Error,
    },
    #[error("channel '{channel}': poll setup failed: {source}")]
    Poll { channel: String, source: io::Error },
}
