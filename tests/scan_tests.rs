use std::time::Duration;

use port_probe_rs::probe::{check, ProbeOptions};
use port_probe_rs::scanner::{scan_endpoint, ScanOptions};
use port_probe_rs::telnet::{DO, IAC, WILL, WONT};
use port_probe_rs::types::{Endpoint, ProbeStatus};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// A telnet server that withholds its prompt until the client answers.
async fn spawn_shy_telnetd() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                sock.write_all(&[IAC, DO, 24]).await.ok()?;
                let mut reply = [0u8; 3];
                sock.read_exact(&mut reply).await.ok()?;
                if reply == [IAC, WONT, 24] {
                    sock.write_all(b"\r\nDebian GNU/Linux 12\r\nlogin: ").await.ok()?;
                }
                let mut rest = [0u8; 16];
                let _ = sock.read(&mut rest).await;
                Some(())
            });
        }
    });
    port
}

#[tokio::test]
async fn banner_is_captured_after_negotiation() {
    let port = spawn_shy_telnetd().await;
    let ep = Endpoint::tcp("TELNET", port, "Client");
    let opts = ProbeOptions {
        timeout: Duration::from_millis(1500),
        read_banner: true,
        banner_max_bytes: 256,
    };

    let out = check("127.0.0.1", &ep, &opts).await;
    assert_eq!(out.status, ProbeStatus::Open);
    assert_eq!(out.banner.as_deref(), Some("Debian GNU/Linux 12\r\nlogin:"));
    assert!(out.error.is_none());
}

#[tokio::test]
async fn aggregated_row_for_open_port() {
    let port = spawn_shy_telnetd().await;
    let ep = Endpoint::tcp("TELNET", port, "Client");
    let opts = ScanOptions {
        attempts: 2,
        attempt_timeout: Duration::from_millis(800),
        read_banner: true,
        banner_max_bytes: 128,
    };

    let row = scan_endpoint("127.0.0.1", &ep, &opts).await;
    assert!(row.checked);
    assert!(row.ping.is_some());
    let probe = row.probe.expect("probe outcome");
    assert_eq!(probe.status, ProbeStatus::Open);
    assert!(probe.connect_ms.is_some());
    assert!(probe.banner.unwrap().ends_with("login:"));
}

#[tokio::test]
async fn aggregated_row_for_closed_port() {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap().port()
    };
    let ep = Endpoint::tcp("Custom", port, "Custom");
    let opts = ScanOptions {
        attempts: 3,
        attempt_timeout: Duration::from_millis(300),
        ..ScanOptions::default()
    };

    let row = scan_endpoint("127.0.0.1", &ep, &opts).await;
    let probe = row.probe.expect("probe outcome");
    assert_eq!(probe.status, ProbeStatus::Closed);
    assert_eq!(probe.error.as_deref(), Some("Connection refused (3)"));
    assert!(probe.connect_ms.is_none());
}

#[tokio::test]
async fn will_is_answered_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        sock.write_all(&[IAC, WILL, 1, b'>']).await.unwrap();
        let mut reply = [0u8; 3];
        sock.read_exact(&mut reply).await.unwrap();
        reply
    });

    let ep = Endpoint::tcp("TELNET", port, "Client");
    let opts = ProbeOptions {
        timeout: Duration::from_millis(600),
        read_banner: true,
        banner_max_bytes: 64,
    };
    let out = check("127.0.0.1", &ep, &opts).await;
    assert_eq!(out.banner.as_deref(), Some(">"));
    assert_eq!(server.await.unwrap(), [IAC, DO, 1]);
}
