//! Connecting to and disconnecting from peer servers

use std::fmt;
use std::io;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use fdfs_core::{Destination, PoolError, Result};
use tracing::{debug, error, warn};

/// Open a TCP connection to `destination`, waiting at most `timeout`.
///
/// Failures are logged and returned; nothing is retried.
pub fn connect_server(destination: &Destination, timeout: Duration) -> Result<TcpStream> {
    let addr = destination.socket_addr()?;

    match TcpStream::connect_timeout(&addr, timeout) {
        Ok(stream) => {
            if let Err(e) = stream.set_nodelay(true) {
                debug!(
                    target: "fdfs",
                    destination = %destination,
                    error = %e,
                    "set TCP_NODELAY failed"
                );
            }
            Ok(stream)
        }
        Err(source) => {
            error!(
                target: "fdfs",
                destination = %destination,
                error = %source,
                timeout_ms = timeout.as_millis() as u64,
                "connect to server failed"
            );
            Err(PoolError::ConnectFailed {
                destination: destination.to_string(),
                source,
            })
        }
    }
}

/// Result of a best-effort close
#[must_use = "close failures should be logged or inspected"]
#[derive(Debug)]
pub enum CloseOutcome {
    /// Socket shut down (or was already disconnected)
    Closed,
    /// Shutdown reported an error; the descriptor is released regardless
    Failed(io::Error),
}

impl CloseOutcome {
    pub fn is_closed(&self) -> bool {
        matches!(self, CloseOutcome::Closed)
    }

    /// Log a failed close and drop the outcome
    pub fn log_failure(self, destination: impl fmt::Display) {
        if let CloseOutcome::Failed(e) = self {
            warn!(
                target: "fdfs",
                destination = %destination,
                error = %e,
                "close connection failed"
            );
        }
    }
}

/// Shut a connection down and release its descriptor.
///
/// Closing cannot usefully be retried, so errors are reported, not returned.
pub fn disconnect_server(stream: TcpStream) -> CloseOutcome {
    match stream.shutdown(Shutdown::Both) {
        Ok(()) => CloseOutcome::Closed,
        Err(e) if e.kind() == io::ErrorKind::NotConnected => CloseOutcome::Closed,
        Err(e) => CloseOutcome::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_connect_and_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let dst = Destination::from(listener.local_addr().unwrap());

        let stream = connect_server(&dst, Duration::from_secs(1)).unwrap();
        assert_eq!(stream.peer_addr().unwrap(), listener.local_addr().unwrap());
        assert!(disconnect_server(stream).is_closed());
    }

    #[test]
    fn test_connect_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let dst = Destination::new("127.0.0.1", port);

        let err = connect_server(&dst, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, PoolError::ConnectFailed { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_connect_invalid_address() {
        let dst = Destination::new("storage-1.local", 23000);
        let err = connect_server(&dst, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, PoolError::InvalidDestination(_)));
    }
}
