use std::net::IpAddr;
use std::time::Duration;

use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError, ICMP};
use tokio::net::lookup_host;
use tokio::time::{self, Instant};
use tracing::debug;

use crate::types::PingOutcome;

const PAYLOAD: [u8; 32] = [0u8; 32];

/// Send one ICMP echo to `host`. Never fails; errors become `ok == false`.
///
/// Unprivileged processes rely on the kernel allowing ICMP datagram sockets
/// (`net.ipv4.ping_group_range` on Linux); otherwise the socket error is
/// reported as the ping error.
///
/// `timeout` bounds resolution and the echo together.
pub async fn ping(host: &str, timeout: Duration) -> PingOutcome {
    let deadline = Instant::now() + timeout;
    let ip = match time::timeout_at(deadline, resolve(host)).await {
        Ok(Ok(ip)) => ip,
        Ok(Err(msg)) => return PingOutcome::fail(msg),
        Err(_) => return PingOutcome::fail("TimedOut"),
    };

    let outcome = match time::timeout_at(deadline, echo(ip, deadline)).await {
        Ok(outcome) => outcome,
        Err(_) => PingOutcome::fail("TimedOut"),
    };
    debug!(host, %ip, ok = outcome.ok, rtt_ms = ?outcome.roundtrip_ms, "ping");
    outcome
}

async fn resolve(host: &str) -> Result<IpAddr, String> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = lookup_host((host, 0))
        .await
        .map_err(|e| format!("DNS resolution failed: {e}"))?;
    addrs
        .next()
        .map(|a| a.ip())
        .ok_or_else(|| "DNS resolution failed: no address".to_string())
}

async fn echo(ip: IpAddr, deadline: Instant) -> PingOutcome {
    let config = match ip {
        IpAddr::V4(_) => Config::default(),
        IpAddr::V6(_) => Config::builder().kind(ICMP::V6).build(),
    };
    let client = match Client::new(&config) {
        Ok(c) => c,
        Err(e) => return PingOutcome::fail(e.to_string()),
    };

    let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
    pinger.timeout(deadline.saturating_duration_since(Instant::now()));

    match pinger.ping(PingSequence(0), &PAYLOAD).await {
        Ok((_packet, rtt)) => PingOutcome::success(rtt.as_millis() as u64),
        Err(e) => PingOutcome::fail(describe(&e)),
    }
}

fn describe(err: &SurgeError) -> String {
    match err {
        SurgeError::Timeout { .. } => "TimedOut".to_string(),
        other => other.to_string(),
    }
}
