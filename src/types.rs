use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport used to reach an endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => f.write_str("TCP"),
            Transport::Udp => f.write_str("UDP"),
        }
    }
}

/// One named service port targeted by a scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub transport: Transport,
    /// Free-text category, e.g. the mode(s) the endpoint belongs to.
    #[serde(default)]
    pub group: String,
}

impl Endpoint {
    pub fn tcp(name: impl Into<String>, port: u16, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port,
            transport: Transport::Tcp,
            group: group.into(),
        }
    }

    pub fn udp(name: impl Into<String>, port: u16, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port,
            transport: Transport::Udp,
            group: group.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.name, self.port, self.transport)
    }
}

/// Result of a single ICMP echo (or a fold of several).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PingOutcome {
    pub ok: bool,
    pub roundtrip_ms: Option<u64>,
    pub error: Option<String>,
}

impl PingOutcome {
    pub fn success(roundtrip_ms: u64) -> Self {
        Self {
            ok: true,
            roundtrip_ms: Some(roundtrip_ms),
            error: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            roundtrip_ms: None,
            error: Some(message.into()),
        }
    }
}

/// Closed set of verdicts for a port check.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Open,
    Closed,
    Timeout,
    DnsFailure,
    Unreachable,
    ProtocolError,
    Unknown,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProbeStatus::Open => "open",
            ProbeStatus::Closed => "closed",
            ProbeStatus::Timeout => "timeout",
            ProbeStatus::DnsFailure => "dns-failure",
            ProbeStatus::Unreachable => "unreachable",
            ProbeStatus::ProtocolError => "error",
            ProbeStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Result of one port check.
///
/// Built only through the constructors below so that `connect_ms`/`banner`
/// exist only for open ports and `error` only for everything else.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub connect_ms: Option<u64>,
    pub banner: Option<String>,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn open(connect_ms: u64, banner: Option<String>) -> Self {
        Self {
            status: ProbeStatus::Open,
            connect_ms: Some(connect_ms),
            banner,
            error: None,
        }
    }

    /// Failure with the given status. Passing `ProbeStatus::Open` is a caller
    /// bug; it is reported as `Unknown` instead.
    pub fn fail(status: ProbeStatus, error: impl Into<String>) -> Self {
        let status = if status == ProbeStatus::Open {
            ProbeStatus::Unknown
        } else {
            status
        };
        Self {
            status,
            connect_ms: None,
            banner: None,
            error: Some(error.into()),
        }
    }

    pub fn timeout() -> Self {
        Self::fail(ProbeStatus::Timeout, "Timeout")
    }

    pub fn ok(&self) -> bool {
        self.status == ProbeStatus::Open
    }
}

/// Per-endpoint row of a scan run: either untouched or fully populated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AggregatedRow {
    pub endpoint: Endpoint,
    pub checked: bool,
    pub ping: Option<PingOutcome>,
    pub probe: Option<ProbeOutcome>,
    pub checked_at: Option<String>,
}

impl AggregatedRow {
    pub fn not_checked(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            checked: false,
            ping: None,
            probe: None,
            checked_at: None,
        }
    }

    pub fn checked(endpoint: Endpoint, ping: PingOutcome, probe: ProbeOutcome) -> Self {
        Self {
            endpoint,
            checked: true,
            ping: Some(ping),
            probe: Some(probe),
            checked_at: Some(now_rfc3339()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.probe.as_ref().is_some_and(ProbeOutcome::ok)
    }

    /// Short human description used by the table output.
    pub fn details(&self) -> String {
        if !self.checked {
            return "Not checked".to_string();
        }
        match &self.probe {
            Some(p) if p.error.as_deref().is_some_and(|e| !e.trim().is_empty()) => {
                p.error.clone().unwrap_or_default()
            }
            Some(ProbeOutcome {
                connect_ms: Some(ms),
                ..
            }) => format!("Connect: {ms} ms"),
            _ => "-".to_string(),
        }
    }
}

/// Results of one scan run against a single host.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScanResults {
    pub host: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub checked_count: u64,
    pub open_count: u64,
    pub rows: Vec<AggregatedRow>,
}

pub(crate) fn now_rfc3339() -> String {
    use time::{format_description::well_known, OffsetDateTime};

    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_fields_follow_status() {
        let open = ProbeOutcome::open(12, Some("SSH-2.0".into()));
        assert!(open.ok());
        assert_eq!(open.error, None);

        let closed = ProbeOutcome::fail(ProbeStatus::Closed, "Connection refused");
        assert!(!closed.ok());
        assert_eq!(closed.connect_ms, None);
        assert_eq!(closed.banner, None);
    }

    #[test]
    fn fail_never_reports_open() {
        let p = ProbeOutcome::fail(ProbeStatus::Open, "bogus");
        assert_eq!(p.status, ProbeStatus::Unknown);
    }

    #[test]
    fn not_checked_row_is_empty() {
        let row = AggregatedRow::not_checked(Endpoint::tcp("HTTP", 80, "client"));
        assert!(!row.checked);
        assert!(row.ping.is_none() && row.probe.is_none() && row.checked_at.is_none());
        assert_eq!(row.details(), "Not checked");
    }

    #[test]
    fn details_prefers_error_then_connect_time() {
        let ep = Endpoint::tcp("SSH", 22, "server");
        let row = AggregatedRow::checked(
            ep.clone(),
            PingOutcome::success(1),
            ProbeOutcome::open(7, None),
        );
        assert_eq!(row.details(), "Connect: 7 ms");

        let row = AggregatedRow::checked(ep, PingOutcome::fail("x"), ProbeOutcome::timeout());
        assert_eq!(row.details(), "Timeout");
    }

    #[test]
    fn endpoint_display() {
        assert_eq!(Endpoint::udp("DNS", 53, "server").to_string(), "DNS 53/UDP");
    }
}
