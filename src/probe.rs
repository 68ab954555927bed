use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};
use tokio::time::{self, Instant};
use tracing::debug;

use crate::banner;
use crate::types::{Endpoint, ProbeOutcome, ProbeStatus, Transport};

/// Knobs for a single port check.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub timeout: Duration,
    pub read_banner: bool,
    pub banner_max_bytes: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            read_banner: false,
            banner_max_bytes: 256,
        }
    }
}

/// Why a connection attempt did not produce a stream.
#[derive(Debug)]
enum ConnectError {
    Resolve(io::Error),
    NoAddress,
    Connect(io::Error),
}

/// Check one endpoint on `host`. Never fails; every problem becomes a status.
pub async fn check(host: &str, endpoint: &Endpoint, opts: &ProbeOptions) -> ProbeOutcome {
    match endpoint.transport {
        Transport::Tcp => tcp_check(host, endpoint.port, opts).await,
        Transport::Udp => ProbeOutcome::fail(ProbeStatus::Unknown, "UDP scan not implemented yet."),
    }
}

/// TCP connect with a hard timeout; no banner.
pub async fn connect(host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    let opts = ProbeOptions {
        timeout,
        ..ProbeOptions::default()
    };
    tcp_check(host, port, &opts).await
}

async fn tcp_check(host: &str, port: u16, opts: &ProbeOptions) -> ProbeOutcome {
    let start = Instant::now();

    let mut stream = match connect_within(opts.timeout, open_stream(host, port)).await {
        Ok(stream) => stream,
        Err(outcome) => {
            debug!(host, port, status = %outcome.status, error = ?outcome.error, "connect failed");
            return outcome;
        }
    };

    let connect_ms = start.elapsed().as_millis() as u64;
    let banner = if opts.read_banner {
        banner::read_banner(&mut stream, host, port, opts.timeout, opts.banner_max_bytes).await
    } else {
        None
    };
    debug!(host, port, connect_ms, has_banner = banner.is_some(), "port open");
    ProbeOutcome::open(connect_ms, banner)
}

/// Race a connect against `timeout`. The timer firing first yields a
/// Timeout outcome; dropping the connect future closes any half-open socket.
async fn connect_within<S, F>(timeout: Duration, connecting: F) -> Result<S, ProbeOutcome>
where
    F: Future<Output = Result<S, ConnectError>>,
{
    match time::timeout(timeout, connecting).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(classify(&e)),
        Err(_) => Err(ProbeOutcome::timeout()),
    }
}

async fn open_stream(host: &str, port: u16) -> Result<TcpStream, ConnectError> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(ConnectError::Resolve)?
        .collect();
    if addrs.is_empty() {
        return Err(ConnectError::NoAddress);
    }
    TcpStream::connect(addrs.as_slice())
        .await
        .map_err(ConnectError::Connect)
}

fn classify(err: &ConnectError) -> ProbeOutcome {
    match err {
        ConnectError::Resolve(e) => ProbeOutcome::fail(ProbeStatus::DnsFailure, e.to_string()),
        ConnectError::NoAddress => {
            ProbeOutcome::fail(ProbeStatus::DnsFailure, "No address associated with hostname")
        }
        ConnectError::Connect(e) => match classify_io(e) {
            ProbeStatus::Closed => ProbeOutcome::fail(ProbeStatus::Closed, "Connection refused"),
            ProbeStatus::Timeout => ProbeOutcome::timeout(),
            status => ProbeOutcome::fail(status, e.to_string()),
        },
    }
}

/// Map a socket error onto the probe status set.
pub fn classify_io(err: &io::Error) -> ProbeStatus {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => ProbeStatus::Closed,
        io::ErrorKind::TimedOut => ProbeStatus::Timeout,
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            ProbeStatus::Unreachable
        }
        _ => ProbeStatus::ProtocolError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn classify_io_kinds() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_io(&refused), ProbeStatus::Closed);
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(classify_io(&timed_out), ProbeStatus::Timeout);
        let unreachable = io::Error::from(io::ErrorKind::NetworkUnreachable);
        assert_eq!(classify_io(&unreachable), ProbeStatus::Unreachable);
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(classify_io(&reset), ProbeStatus::ProtocolError);
    }

    #[test]
    fn refused_gets_fixed_message() {
        let err = ConnectError::Connect(io::Error::from(io::ErrorKind::ConnectionRefused));
        let out = classify(&err);
        assert_eq!(out.status, ProbeStatus::Closed);
        assert_eq!(out.error.as_deref(), Some("Connection refused"));
    }

    #[test]
    fn empty_resolution_is_dns_failure() {
        assert_eq!(classify(&ConnectError::NoAddress).status, ProbeStatus::DnsFailure);
    }

    #[tokio::test]
    async fn open_port_reports_connect_time() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let out = connect("127.0.0.1", port, Duration::from_secs(2)).await;
        assert_eq!(out.status, ProbeStatus::Open);
        assert!(out.connect_ms.is_some());
        assert!(out.error.is_none());
    }

    #[tokio::test]
    async fn closed_port_is_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };
        let out = connect("127.0.0.1", port, Duration::from_secs(2)).await;
        assert_eq!(out.status, ProbeStatus::Closed);
        assert_eq!(out.error.as_deref(), Some("Connection refused"));
    }

    #[tokio::test]
    async fn udp_is_unsupported() {
        let ep = Endpoint::udp("DNS", 53, "server");
        let out = check("127.0.0.1", &ep, &ProbeOptions::default()).await;
        assert_eq!(out.status, ProbeStatus::Unknown);
        assert_eq!(out.error.as_deref(), Some("UDP scan not implemented yet."));
    }

    #[tokio::test]
    async fn timer_wins_over_stalled_connect() {
        let start = std::time::Instant::now();
        let out = connect_within::<TcpStream, _>(Duration::from_millis(50), std::future::pending()).await;
        let out = out.unwrap_err();
        assert_eq!(out, ProbeOutcome::timeout());
        assert_eq!(out.error.as_deref(), Some("Timeout"));
        assert!(out.connect_ms.is_none());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn connect_error_beats_timer() {
        let refused = async {
            let e = io::Error::from(io::ErrorKind::ConnectionRefused);
            Err::<TcpStream, _>(ConnectError::Connect(e))
        };
        let out = connect_within(Duration::from_secs(5), refused).await.unwrap_err();
        assert_eq!(out.status, ProbeStatus::Closed);
    }

    #[tokio::test]
    async fn blackholed_address_times_out() {
        // 10.255.255.1 normally drops SYNs; sandboxes without a route report
        // Unreachable or a socket error instead.
        let start = std::time::Instant::now();
        let out = connect("10.255.255.1", 81, Duration::from_millis(200)).await;
        assert!(matches!(
            out.status,
            ProbeStatus::Timeout | ProbeStatus::Unreachable | ProbeStatus::ProtocolError
        ));
        if out.status == ProbeStatus::Timeout {
            assert_eq!(out.error.as_deref(), Some("Timeout"));
        }
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn unresolvable_host_is_dns_failure() {
        let out = connect("no-such-host.invalid", 80, Duration::from_secs(5)).await;
        // Resolvers that hang past the timer report Timeout instead.
        assert!(matches!(
            out.status,
            ProbeStatus::DnsFailure | ProbeStatus::Timeout
        ));
    }
}
