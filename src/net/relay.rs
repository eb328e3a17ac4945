//! TCP relay.
//!
//! # Responsibilities
//! - Accept client connections until the server stops accepting
//! - Pick one upstream per connection by hashing the peer address
//! - Copy bytes both ways until either side finishes, then close both
//!
//! # Design Decisions
//! - Stopping the relay closes the listener only; live relays run to completion
//! - A connection with no upstream or a failed dial is closed immediately

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::load_balancer::select;
use crate::net::connection::{RelayEntry, RelayLedger, RelayOutcome};

/// One TCP server's relay: its upstream set and copy settings.
#[derive(Debug)]
pub struct TcpRelay {
    server: String,
    upstreams: Vec<String>,
    connect_timeout: Duration,
    buffer_size: usize,
    ledger: RelayLedger,
}

impl TcpRelay {
    pub fn new(
        server: impl Into<String>,
        upstreams: Vec<String>,
        connect_timeout: Duration,
        buffer_size: usize,
        ledger: RelayLedger,
    ) -> Self {
        Self {
            server: server.into(),
            upstreams,
            connect_timeout,
            buffer_size: buffer_size.max(1),
            ledger,
        }
    }

    /// Run the accept loop until `stop` fires or `accepting` is cleared.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        accepting: Arc<AtomicBool>,
        mut stop: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    if !accepting.load(Ordering::SeqCst) {
                        break;
                    }
                    match accepted {
                        Ok((stream, peer)) => {
                            let entry = self.ledger.open(peer);
                            let relay = Arc::clone(&self);
                            tokio::spawn(async move { relay.handle(stream, entry).await });
                        }
                        Err(e) => {
                            tracing::warn!(server = %self.server, error = %e, "Accept failed");
                        }
                    }
                }
                _ = stop.changed() => break,
            }
        }

        tracing::info!(server = %self.server, "TCP listener closed");
    }

    async fn handle(&self, client: TcpStream, mut entry: RelayEntry) {
        let peer = entry.peer();
        let key = peer.to_string();
        let Some(upstream) = select(key.as_bytes(), &self.upstreams) else {
            tracing::warn!(server = %self.server, peer = %peer, "No upstream configured, closing connection");
            entry.settle(RelayOutcome::NoUpstream);
            return;
        };

        let upstream_stream = match timeout(self.connect_timeout, TcpStream::connect(upstream.as_str())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::warn!(server = %self.server, upstream = %upstream, error = %e, "Upstream dial failed");
                entry.settle(RelayOutcome::DialFailed);
                return;
            }
            Err(_) => {
                tracing::warn!(server = %self.server, upstream = %upstream, "Upstream dial timed out");
                entry.settle(RelayOutcome::DialFailed);
                return;
            }
        };

        tracing::debug!(
            server = %self.server,
            peer = %peer,
            upstream = %upstream,
            "Relaying connection"
        );
        entry.settle(RelayOutcome::Relayed);
        relay(client, upstream_stream, self.buffer_size).await;
        tracing::debug!(server = %self.server, peer = %peer, "Relay finished");
    }
}

/// Copy both directions until one finishes, then drop both sockets.
pub async fn relay(client: TcpStream, upstream: TcpStream, buffer_size: usize) {
    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();

    let mut outbound = tokio::spawn(pipe(client_read, upstream_write, buffer_size));
    let mut inbound = tokio::spawn(pipe(upstream_read, client_write, buffer_size));

    let (finished, outbound_done) = tokio::select! {
        result = &mut outbound => (result, true),
        result = &mut inbound => (result, false),
    };
    if let Ok(Err(e)) = finished {
        tracing::debug!(error = %e, "Relay direction ended with error");
    }

    let other = if outbound_done { inbound } else { outbound };
    other.abort();
    let _ = other.await;
}

/// Copy `reader` into `writer` in `buffer_size` chunks until EOF.
pub async fn pipe<R, W>(mut reader: R, mut writer: W, buffer_size: usize) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size];
    let mut copied = 0u64;
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Ok(copied);
        }
        writer.write_all(&buffer[..n]).await?;
        copied += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipe_copies_in_small_chunks() {
        let input = b"ABCDEFGHIJ".to_vec();
        let mut output = Vec::new();
        let copied = pipe(&input[..], &mut output, 3).await.unwrap();
        assert_eq!(copied, 10);
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn relay_preserves_order_and_closes_both_sides() {
        let upstream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_addr = upstream_listener.local_addr().unwrap();
        let front_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let front_addr = front_listener.local_addr().unwrap();

        let upstream_side = tokio::spawn(async move {
            let (mut socket, _) = upstream_listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });
        let relay_side = tokio::spawn(async move {
            let (client, _) = front_listener.accept().await.unwrap();
            let upstream = TcpStream::connect(upstream_addr).await.unwrap();
            relay(client, upstream, 4096).await;
        });

        let mut client = TcpStream::connect(front_addr).await.unwrap();
        client.write_all(b"AB").await.unwrap();
        client.write_all(b"CD").await.unwrap();
        client.shutdown().await.unwrap();

        relay_side.await.unwrap();
        assert_eq!(upstream_side.await.unwrap(), b"ABCD");

        let mut rest = Vec::new();
        assert_eq!(client.read_to_end(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn connection_without_upstream_is_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ledger = RelayLedger::new("empty");
        let relay = Arc::new(TcpRelay::new("empty", Vec::new(), Duration::from_secs(1), 4096, ledger.clone()));
        let accepting = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(relay.serve(listener, accepting, stop_rx));

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut buf = Vec::new();
        assert_eq!(client.read_to_end(&mut buf).await.unwrap(), 0);
        assert_eq!(ledger.live(), 0);

        stop_tx.send(true).unwrap();
        task.await.unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
