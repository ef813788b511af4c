//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore
//! - Skip per-connection accept errors, surface fatal ones

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;
use crate::lifecycle::outcome::ServeError;

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections will wait until a slot becomes available.
pub struct Listener {
    /// The underlying TCP listener.
    inner: TcpListener,
    /// Address actually bound (resolves port 0).
    local_addr: SocketAddr,
    /// Semaphore to limit concurrent connections.
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ServeError> {
        let bind_error = |source| ServeError::Bind {
            address: config.bind_address.clone(),
            source,
        };

        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| bind_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        let inner = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = inner.local_addr().map_err(bind_error)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner,
            local_addr,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Waits while the connection limit is reached. Errors that only concern
    /// the connection being accepted are logged and skipped; any other
    /// accept error is returned and ends serving.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ServeError> {
        // Acquire permit first (backpressure)
        let permit = Arc::clone(&self.connection_limit)
            .acquire_owned()
            .await
            .map_err(|_| ServeError::Aborted)?;

        loop {
            match self.inner.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!(
                        peer_addr = %peer,
                        available_permits = self.connection_limit.available_permits(),
                        "Connection accepted"
                    );
                    return Ok((stream, peer, ConnectionPermit { _permit: permit }));
                }
                Err(e) if is_connection_error(&e) => {
                    tracing::debug!(error = %e, "Skipping failed accept");
                }
                Err(source) => {
                    return Err(ServeError::Accept {
                        address: self.local_addr,
                        source,
                    })
                }
            }
        }
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Errors that end one accepted connection but leave the listener usable.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
/// This ensures backpressure is maintained even if the connection handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback(max_connections: usize) -> ListenerConfig {
        ListenerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            max_connections,
        }
    }

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = Listener::bind(&loopback(4)).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = Listener::bind(&loopback(4)).await.unwrap();
        let config = ListenerConfig {
            bind_address: first.local_addr().to_string(),
            max_connections: 4,
        };

        let err = Listener::bind(&config).await.err().unwrap();
        match err {
            ServeError::Bind { address, source } => {
                assert_eq!(address, config.bind_address);
                assert_eq!(source.kind(), io::ErrorKind::AddrInUse);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unparseable_address_is_a_bind_error() {
        let config = ListenerConfig {
            bind_address: "localhost".to_string(),
            max_connections: 4,
        };
        let err = Listener::bind(&config).await.err().unwrap();
        assert!(matches!(err, ServeError::Bind { .. }));
    }

    #[tokio::test]
    async fn permits_bound_concurrent_connections() {
        let listener = Listener::bind(&loopback(1)).await.unwrap();
        let addr = listener.local_addr();

        let _a = TcpStream::connect(addr).await.unwrap();
        let _b = TcpStream::connect(addr).await.unwrap();

        let (_stream, _, permit) = listener.accept().await.unwrap();
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            listener.accept(),
        )
        .await;
        assert!(second.is_err(), "second accept must wait for a free slot");

        drop(permit);
        let accepted = tokio::time::timeout(std::time::Duration::from_secs(1), listener.accept())
            .await
            .expect("slot released");
        assert!(accepted.is_ok());
    }
}
