//! Raw TCP reachability.

use crate::endpoint::Endpoint;
use crate::ProbeError;
use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

/// Connect to the first address of `endpoint` that accepts within `timeout`.
pub(super) fn connect(endpoint: &Endpoint, timeout: Duration) -> io::Result<TcpStream> {
    let addrs = (endpoint.host.as_str(), endpoint.port).to_socket_addrs()?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "connect failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} did not resolve to any address", endpoint.host),
        )
    }))
}

/// Open a TCP connection to the endpoint and close it again.
pub(super) fn probe(endpoint: &Endpoint, timeout: Duration) -> Result<(), ProbeError> {
    debug!(host = %endpoint.host, port = endpoint.port, "probing TCP");
    let stream = connect(endpoint, timeout)
        .map_err(|e| ProbeError::Connectivity(format!("{}: {}", endpoint.authority(), e)))?;
    let _ = stream.shutdown(Shutdown::Both);
    Ok(())
}
