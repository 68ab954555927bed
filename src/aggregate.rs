//! Folding of repeated attempts into one verdict per endpoint.
//!
//! The policy is optimistic: one success anywhere in the attempt window wins,
//! so transient loss does not turn into a false negative. Failures are
//! summarised as deduplicated, counted messages.

use crate::types::{PingOutcome, ProbeOutcome, ProbeStatus};

/// Any success wins with the best round trip; otherwise distinct errors joined.
pub fn fold_pings(attempts: &[PingOutcome]) -> PingOutcome {
    if attempts.iter().any(|p| p.ok) {
        let best = attempts
            .iter()
            .filter(|p| p.ok)
            .filter_map(|p| p.roundtrip_ms)
            .min()
            .unwrap_or(0);
        return PingOutcome::success(best);
    }

    let mut distinct: Vec<&str> = Vec::new();
    for msg in attempts.iter().filter_map(|p| non_blank(p.error.as_deref())) {
        if !distinct.contains(&msg) {
            distinct.push(msg);
        }
    }
    if distinct.is_empty() {
        PingOutcome::fail("Ping failed.")
    } else {
        PingOutcome::fail(distinct.join("; "))
    }
}

/// Open wins, then timeout, then the first attempt's status.
pub fn fold_probes(attempts: &[ProbeOutcome]) -> ProbeOutcome {
    let Some(first) = attempts.first() else {
        return ProbeOutcome::fail(ProbeStatus::Unknown, "Port check failed.");
    };

    if attempts.iter().any(ProbeOutcome::ok) {
        let open = || attempts.iter().filter(|p| p.ok());
        let best = open().filter_map(|p| p.connect_ms).min().unwrap_or(0);
        let banner = open().find_map(|p| p.banner.clone());
        return ProbeOutcome::open(best, banner);
    }

    let timeouts = attempts
        .iter()
        .filter(|p| p.status == ProbeStatus::Timeout)
        .count();
    if timeouts > 0 {
        let head = if timeouts == 1 {
            "Timeout".to_string()
        } else {
            format!("Timeout ({timeouts})")
        };
        let others = attempts
            .iter()
            .filter(|p| p.status != ProbeStatus::Timeout)
            .filter_map(|p| non_blank(p.error.as_deref()));
        let parts: Vec<String> = std::iter::once(head).chain(counted(others)).collect();
        return ProbeOutcome::fail(ProbeStatus::Timeout, parts.join("; "));
    }

    let parts = counted(attempts.iter().filter_map(|p| non_blank(p.error.as_deref())));
    let message = if parts.is_empty() {
        first
            .error
            .clone()
            .unwrap_or_else(|| "Port check failed.".to_string())
    } else {
        parts.join("; ")
    };
    ProbeOutcome::fail(first.status, message)
}

/// Group equal messages in first-seen order, suffixing `(n)` for repeats.
fn counted<'a>(messages: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut groups: Vec<(&str, usize)> = Vec::new();
    for msg in messages {
        match groups.iter_mut().find(|(m, _)| *m == msg) {
            Some((_, n)) => *n += 1,
            None => groups.push((msg, 1)),
        }
    }
    groups
        .into_iter()
        .map(|(m, n)| if n == 1 { m.to_string() } else { format!("{m} ({n})") })
        .collect()
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|m| !m.trim().is_empty())
}
