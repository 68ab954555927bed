use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::types::{Endpoint, Transport};

/// Which built-in endpoint table to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Client,
    Server,
    Admin,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Client => "Client",
            Mode::Server => "Server",
            Mode::Admin => "Admin",
        }
    }
}

/// Rejections when a user adds an endpoint by hand.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Custom port must be a number.")]
    NotANumber,
    #[error("Custom port must be between 1 and 65535.")]
    OutOfRange,
    #[error("Port {0} is already in the list.")]
    Duplicate(u16),
}

/// Built-in endpoints for `mode`.
///
/// Admin sees the union of the client and server tables, one entry per port
/// in port order, labelled with every mode that lists it.
pub fn default_endpoints(mode: Mode) -> Vec<Endpoint> {
    match mode {
        Mode::Client => client_endpoints(),
        Mode::Server => server_endpoints(),
        Mode::Admin => merge_endpoints(&[client_endpoints(), server_endpoints()]),
    }
}

fn client_endpoints() -> Vec<Endpoint> {
    let g = Mode::Client.label();
    vec![
        Endpoint::tcp("HTTP", 80, g),
        Endpoint::tcp("HTTPS", 443, g),
        Endpoint::tcp("RDP", 3389, g),
        Endpoint::tcp("TELNET", 23, g),
    ]
}

fn server_endpoints() -> Vec<Endpoint> {
    let g = Mode::Server.label();
    vec![
        Endpoint::udp("DNS", 53, g),
        Endpoint::tcp("SMTP", 25, g),
        Endpoint::tcp("SSH", 22, g),
    ]
}

/// Merge endpoint lists by port: first name and transport win, group labels
/// are joined with ", ", output sorted by port.
pub fn merge_endpoints(lists: &[Vec<Endpoint>]) -> Vec<Endpoint> {
    let mut merged: Vec<(Endpoint, Vec<String>)> = Vec::new();
    for ep in lists.iter().flatten() {
        match merged.iter_mut().find(|(m, _)| m.port == ep.port) {
            Some((_, groups)) => {
                if !groups.contains(&ep.group) {
                    groups.push(ep.group.clone());
                }
            }
            None => merged.push((ep.clone(), vec![ep.group.clone()])),
        }
    }
    merged.sort_by_key(|(ep, _)| ep.port);
    merged
        .into_iter()
        .map(|(mut ep, groups)| {
            ep.group = groups.join(", ");
            ep
        })
        .collect()
}

/// Parse an endpoint list file into a deduplicated endpoint list.
///
/// Supported formats per line:
/// - port with optional transport and name: `8080/tcp dev-server`
/// - inclusive range: `8000-8002 dev` (names become `dev-8000`, ...)
/// - bare port: `2222` (named `Custom-2222`)
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
///
/// The first entry for a port wins.
pub fn parse_endpoints_str(s: &str, group: &str) -> Result<Vec<Endpoint>> {
    let mut out: Vec<Endpoint> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }

        let (target, name) = match line.split_once(char::is_whitespace) {
            Some((target, name)) => (target, Some(name.trim())),
            None => (line, None),
        };
        let (ports, transport) = match target.split_once('/') {
            Some((p, t)) => (p, parse_transport(t).with_context(|| format!("line {line_no}"))?),
            None => (target, Transport::Tcp),
        };

        let (start, end) = match ports.split_once('-') {
            Some((a, b)) => {
                let start = parse_port_str(a.trim())
                    .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
                let end = parse_port_str(b.trim())
                    .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
                if start > end {
                    bail!("line {line_no}: invalid range {start}-{end} (start > end)");
                }
                (start, end)
            }
            None => {
                let p = parse_port_str(ports)
                    .with_context(|| format!("line {line_no}: invalid port value: {ports}"))?;
                (p, p)
            }
        };

        for port in start..=end {
            if !seen.insert(port) {
                continue;
            }
            let name = match name {
                Some(n) if start == end => n.to_string(),
                Some(n) => format!("{n}-{port}"),
                None => format!("Custom-{port}"),
            };
            out.push(Endpoint {
                name,
                port,
                transport,
                group: group.to_string(),
            });
        }
    }

    Ok(out)
}

/// Load an endpoint list from a file. Errors if the file cannot be read or parsed.
pub fn load_endpoints_from_path(path: impl AsRef<Path>, group: &str) -> Result<Vec<Endpoint>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read endpoints file: {}", path.as_ref().display()))?;
    parse_endpoints_str(&content, group)
}

/// Load endpoints from a file, or fall back to the built-in table for `mode`
/// if the file is missing, unreadable or empty.
pub fn load_endpoints_or_default(path: impl AsRef<Path>, mode: Mode) -> Vec<Endpoint> {
    match load_endpoints_from_path(&path, mode.label()) {
        Ok(v) if !v.is_empty() => v,
        Ok(_) => default_endpoints(mode),
        Err(e) => {
            tracing::warn!("{e:#}; using built-in endpoints");
            default_endpoints(mode)
        }
    }
}

/// Validate and append a user-supplied endpoint.
///
/// A blank name becomes `Custom-<port>`.
pub fn add_custom_endpoint(
    list: &mut Vec<Endpoint>,
    port_text: &str,
    name: &str,
) -> Result<Endpoint, EndpointError> {
    let value: i64 = port_text
        .trim()
        .parse()
        .map_err(|_| EndpointError::NotANumber)?;
    if !(1..=65535).contains(&value) {
        return Err(EndpointError::OutOfRange);
    }
    let port = value as u16;
    if list.iter().any(|e| e.port == port) {
        return Err(EndpointError::Duplicate(port));
    }

    let name = match name.trim() {
        "" => format!("Custom-{port}"),
        n => n.to_string(),
    };
    let ep = Endpoint::tcp(name, port, "Custom");
    list.push(ep.clone());
    Ok(ep)
}

/// Check a caller-supplied endpoint list: every port in 1..=65535 and no
/// port listed twice. Input order is kept.
pub fn validate_endpoints(list: Vec<Endpoint>) -> Result<Vec<Endpoint>, EndpointError> {
    let mut seen = std::collections::HashSet::new();
    for ep in &list {
        if ep.port == 0 {
            return Err(EndpointError::OutOfRange);
        }
        if !seen.insert(ep.port) {
            return Err(EndpointError::Duplicate(ep.port));
        }
    }
    Ok(list)
}

/// Parse a `port[:name]` command-line value into its parts.
pub fn split_custom_arg(arg: &str) -> (&str, &str) {
    arg.split_once(':').unwrap_or((arg, ""))
}

fn parse_transport(s: &str) -> Result<Transport> {
    match s.trim().to_ascii_lowercase().as_str() {
        "tcp" => Ok(Transport::Tcp),
        "udp" => Ok(Transport::Udp),
        other => bail!("unknown transport: {other}"),
    }
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>().map_err(|e| anyhow::anyhow!(e))?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
