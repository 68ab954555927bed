//! Banner capture over an already-open connection.
//!
//! Phase 1 listens passively, answering telnet negotiation so servers that
//! wait for the client can proceed. Phase 2 runs only when nothing arrived:
//! it sends a small protocol-appropriate nudge and listens again.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Instant};

use crate::telnet::Negotiator;

/// Upper bound on a single read buffer.
const MAX_CHUNK: usize = 4096;
/// Per-read idle timeout ceiling.
const IDLE_CAP: Duration = Duration::from_millis(500);

/// The request to send when a service stays silent, by port.
///
/// `None` means probing over raw TCP is pointless (TLS).
pub fn probe_for_port(port: u16, host: &str) -> Option<String> {
    match port {
        80 | 8080 | 8000 | 8888 | 3000 | 5000 => Some(format!(
            "HEAD / HTTP/1.0\r\nHost: {host}\r\nConnection: close\r\n\r\n"
        )),
        443 | 8443 => None,
        25 | 587 => Some("EHLO port-probe\r\n".to_string()),
        _ => Some("\r\n".to_string()),
    }
}

/// Read a service banner within `timeout`, keeping at most about `max_bytes`.
///
/// Errors are swallowed: a missing banner never changes the port verdict.
pub async fn read_banner<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    timeout: Duration,
    max_bytes: usize,
) -> Option<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let deadline = Instant::now() + timeout;
    let idle = timeout.min(IDLE_CAP);
    let mut buf = vec![0u8; max_bytes.clamp(1, MAX_CHUNK)];
    let mut banner: Vec<u8> = Vec::new();

    // Passive
    let mut negotiator = Negotiator::new();
    while Instant::now() < deadline && banner.len() < max_bytes {
        let n = match read_chunk(stream, &mut buf, idle, deadline).await {
            Some(n) => n,
            None => break,
        };
        let parsed = negotiator.feed(&buf[..n]);
        if !parsed.replies.is_empty() && write_all(stream, &parsed.replies).await.is_err() {
            break;
        }
        banner.extend_from_slice(&parsed.clean);
    }

    // Active
    if banner.is_empty() && Instant::now() < deadline {
        if let Some(probe) = probe_for_port(port, host) {
            tracing::debug!(port, "no passive banner, sending probe");
            if write_all(stream, probe.as_bytes()).await.is_ok() {
                while Instant::now() < deadline && banner.len() < max_bytes {
                    match read_chunk(stream, &mut buf, idle, deadline).await {
                        Some(n) => banner.extend_from_slice(&buf[..n]),
                        None => break,
                    }
                }
            }
        }
    }

    let text = String::from_utf8_lossy(&banner).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// One bounded read. `None` on idle timeout, EOF or error.
async fn read_chunk<S>(stream: &mut S, buf: &mut [u8], idle: Duration, deadline: Instant) -> Option<usize>
where
    S: AsyncRead + Unpin,
{
    let wait = idle.min(deadline.saturating_duration_since(Instant::now()));
    match time::timeout(wait, stream.read(buf)).await {
        Ok(Ok(n)) if n > 0 => Some(n),
        _ => None,
    }
}

async fn write_all<S>(stream: &mut S, bytes: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::{DO, IAC, OPT_SUPPRESS_GO_AHEAD, WILL};
    use tokio::io::duplex;

    #[test]
    fn probe_table() {
        assert_eq!(
            probe_for_port(80, "example.test").as_deref(),
            Some("HEAD / HTTP/1.0\r\nHost: example.test\r\nConnection: close\r\n\r\n")
        );
        assert_eq!(probe_for_port(443, "h"), None);
        assert_eq!(probe_for_port(8443, "h"), None);
        assert!(probe_for_port(25, "h").unwrap().starts_with("EHLO "));
        assert_eq!(probe_for_port(2222, "h").as_deref(), Some("\r\n"));
    }

    #[tokio::test]
    async fn passive_banner_is_trimmed() {
        let (mut client, mut server) = duplex(1024);
        server.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await.unwrap();

        let b = read_banner(&mut client, "h", 22, Duration::from_millis(300), 256).await;
        assert_eq!(b.as_deref(), Some("SSH-2.0-OpenSSH_9.6"));
    }

    #[tokio::test]
    async fn telnet_negotiation_is_answered_and_stripped() {
        let (mut client, mut server) = duplex(1024);
        let mut greeting = vec![IAC, DO, OPT_SUPPRESS_GO_AHEAD];
        greeting.extend_from_slice(b"login: ");
        server.write_all(&greeting).await.unwrap();

        let b = read_banner(&mut client, "h", 23, Duration::from_millis(300), 256).await;
        assert_eq!(b.as_deref(), Some("login:"));

        let mut reply = [0u8; 3];
        server.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [IAC, WILL, OPT_SUPPRESS_GO_AHEAD]);
    }

    #[tokio::test]
    async fn silent_http_port_gets_head_request() {
        let (mut client, mut server) = duplex(1024);
        let peer = tokio::spawn(async move {
            let mut req = vec![0u8; 256];
            let n = server.read(&mut req).await.unwrap();
            req.truncate(n);
            server.write_all(b"HTTP/1.0 200 OK\r\nServer: test\r\n\r\n").await.unwrap();
            String::from_utf8(req).unwrap()
        });

        let b = read_banner(&mut client, "example.test", 80, Duration::from_millis(1500), 256).await;
        let sent = peer.await.unwrap();
        assert_eq!(
            sent,
            "HEAD / HTTP/1.0\r\nHost: example.test\r\nConnection: close\r\n\r\n"
        );
        assert_eq!(b.as_deref(), Some("HTTP/1.0 200 OK\r\nServer: test"));
    }

    #[tokio::test]
    async fn silent_tls_port_yields_nothing() {
        let (mut client, _server) = duplex(64);
        let b = read_banner(&mut client, "h", 443, Duration::from_millis(200), 256).await;
        assert_eq!(b, None);
    }

    #[tokio::test]
    async fn closed_peer_yields_nothing() {
        let (mut client, server) = duplex(64);
        drop(server);
        let b = read_banner(&mut client, "h", 21, Duration::from_millis(200), 256).await;
        assert_eq!(b, None);
    }

    #[tokio::test]
    async fn stops_at_max_bytes() {
        let (mut client, mut server) = duplex(4096);
        server.write_all(&[b'a'; 1000]).await.unwrap();
        let b = read_banner(&mut client, "h", 9000, Duration::from_millis(300), 16).await;
        assert_eq!(b.map(|s| s.len()), Some(16));
    }
}
