//! Local network helpers.

use std::net::TcpListener;

use crate::error::{Error, Result};

/// Probes the OS for a currently free TCP port: bind to port 0, read back the
/// assigned number, release the socket. Best effort only; another process
/// may grab the port between the release and its eventual use.
pub fn find_open_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| Error::ResourceUnavailable(format!("could not probe for a free port: {}", e)))?;
    let port = listener
        .local_addr()
        .map_err(|e| Error::ResourceUnavailable(format!("could not read probed port: {}", e)))?
        .port();
    drop(listener);
    Ok(port)
}
