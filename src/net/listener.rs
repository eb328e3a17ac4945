//! Listener binding.
//!
//! # Responsibilities
//! - Normalize configured listen addresses
//! - Bind synchronously with respect to `Server::start`, so bind errors are
//!   reported to the caller instead of surfacing later in the accept loop

use std::io;
use std::net::SocketAddr;

use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The configured address cannot be parsed.
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),

    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// Expand a Go-style `":port"` address to all IPv4 interfaces.
pub fn normalize_address(listen: &str) -> String {
    let listen = listen.trim();
    if listen.starts_with(':') {
        format!("0.0.0.0{}", listen)
    } else {
        listen.to_string()
    }
}

/// Bind a TCP listener for a server's `listen` string.
pub async fn bind(listen: &str) -> Result<(TcpListener, SocketAddr), ListenerError> {
    let address = normalize_address(listen);
    if !address.contains(':') {
        return Err(ListenerError::InvalidAddress(listen.to_string()));
    }

    let listener = TcpListener::bind(address.as_str())
        .await
        .map_err(|source| ListenerError::Bind { address: address.clone(), source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ListenerError::Bind { address: address.clone(), source })?;

    tracing::debug!(address = %local_addr, "Listener bound");
    Ok((listener, local_addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_port_only_addresses() {
        assert_eq!(normalize_address(":8080"), "0.0.0.0:8080");
        assert_eq!(normalize_address(" 127.0.0.1:80 "), "127.0.0.1:80");
        assert_eq!(normalize_address("[::]:443"), "[::]:443");
    }

    #[tokio::test]
    async fn reports_address_in_use() {
        let (_held, addr) = bind("127.0.0.1:0").await.unwrap();
        let err = bind(&addr.to_string()).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        assert!(matches!(
            bind("nonsense").await.unwrap_err(),
            ListenerError::InvalidAddress(_)
        ));
    }
}
