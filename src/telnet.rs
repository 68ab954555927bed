//! Minimal TELNET (RFC 854) option negotiation.
//!
//! Only enough of the protocol to keep a server from blocking on WILL/DO
//! before it sends its greeting: IAC sequences are stripped from the payload
//! and answered, subnegotiations are skipped.

pub const IAC: u8 = 0xFF;
pub const WILL: u8 = 0xFB;
pub const WONT: u8 = 0xFC;
pub const DO: u8 = 0xFD;
pub const DONT: u8 = 0xFE;
pub const SB: u8 = 0xFA;
pub const SE: u8 = 0xF0;

pub const OPT_ECHO: u8 = 1;
pub const OPT_SUPPRESS_GO_AHEAD: u8 = 3;

/// Upper bound on bytes carried between reads by [`Negotiator`].
const MAX_RESIDUAL: usize = 512;

/// A negotiation request seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    Will(u8),
    Wont(u8),
    Do(u8),
    Dont(u8),
}

impl Negotiation {
    fn from_bytes(command: u8, option: u8) -> Option<Self> {
        match command {
            WILL => Some(Negotiation::Will(option)),
            WONT => Some(Negotiation::Wont(option)),
            DO => Some(Negotiation::Do(option)),
            DONT => Some(Negotiation::Dont(option)),
            _ => None,
        }
    }

    /// Our answer: accept SUPPRESS-GO-AHEAD both ways and server ECHO,
    /// refuse everything else, never answer WONT/DONT.
    pub fn reply(self) -> Option<[u8; 3]> {
        match self {
            Negotiation::Do(OPT_SUPPRESS_GO_AHEAD) => Some([IAC, WILL, OPT_SUPPRESS_GO_AHEAD]),
            Negotiation::Do(opt) => Some([IAC, WONT, opt]),
            Negotiation::Will(opt @ (OPT_ECHO | OPT_SUPPRESS_GO_AHEAD)) => Some([IAC, DO, opt]),
            Negotiation::Will(opt) => Some([IAC, DONT, opt]),
            Negotiation::Wont(_) | Negotiation::Dont(_) => None,
        }
    }
}

/// Output of [`parse`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parsed {
    /// Payload with all command sequences removed.
    pub clean: Vec<u8>,
    /// Bytes to send back to the peer.
    pub replies: Vec<u8>,
    /// How many input bytes were consumed. Less than the input length when
    /// the buffer ends inside a command sequence.
    pub consumed: usize,
}

/// Split `data` into payload and negotiation replies.
///
/// Stateless: an incomplete trailing sequence is left unconsumed and must be
/// prepended to the next buffer by the caller (see [`Negotiator`]).
pub fn parse(data: &[u8]) -> Parsed {
    let mut out = Parsed {
        clean: Vec::with_capacity(data.len()),
        replies: Vec::new(),
        consumed: 0,
    };

    let mut i = 0;
    while i < data.len() {
        if data[i] != IAC {
            out.clean.push(data[i]);
            i += 1;
            out.consumed = i;
            continue;
        }

        let Some(&cmd) = data.get(i + 1) else { break };
        match cmd {
            IAC => {
                out.clean.push(IAC);
                i += 2;
            }
            WILL | WONT | DO | DONT => {
                let Some(&opt) = data.get(i + 2) else { break };
                if let Some(reply) = Negotiation::from_bytes(cmd, opt).and_then(Negotiation::reply) {
                    out.replies.extend_from_slice(&reply);
                }
                i += 3;
            }
            SB => match find_se(&data[i + 2..]) {
                BodyEnd::Found(end) => i += 2 + end,
                BodyEnd::Missing(_) => break,
            },
            // NOP, GA, AYT and friends: two-byte commands with nothing to say.
            _ => i += 2,
        }
        out.consumed = i;
    }

    out
}

/// Where a scan for the end of a subnegotiation body stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyEnd {
    /// Offset just past the terminating IAC SE.
    Found(usize),
    /// No IAC SE yet. `true` when the body ends on a lone IAC.
    Missing(bool),
}

fn find_se(body: &[u8]) -> BodyEnd {
    let mut j = 0;
    while j < body.len() {
        if body[j] == IAC {
            match body.get(j + 1) {
                Some(&SE) => return BodyEnd::Found(j + 2),
                // IAC IAC inside the body is an escaped data byte.
                Some(_) => j += 2,
                None => return BodyEnd::Missing(true),
            }
            continue;
        }
        j += 1;
    }
    BodyEnd::Missing(false)
}

/// Incremental wrapper around [`parse`] that carries a split command
/// sequence over to the next read.
///
/// A subnegotiation that outgrows [`MAX_RESIDUAL`] is not buffered further;
/// its remaining body is discarded as it arrives until IAC SE.
#[derive(Debug, Default)]
pub struct Negotiator {
    residual: Vec<u8>,
    in_subnegotiation: bool,
}

impl Negotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Parsed {
        let mut buf = std::mem::take(&mut self.residual);
        buf.extend_from_slice(chunk);

        let mut skipped = 0;
        if self.in_subnegotiation {
            match find_se(&buf) {
                BodyEnd::Found(end) => {
                    self.in_subnegotiation = false;
                    skipped = end;
                }
                BodyEnd::Missing(dangling_iac) => {
                    if dangling_iac {
                        self.residual.push(IAC);
                    }
                    return Parsed {
                        consumed: buf.len() - self.residual.len(),
                        ..Parsed::default()
                    };
                }
            }
        }

        let rest = &buf[skipped..];
        let mut parsed = parse(rest);
        let tail = &rest[parsed.consumed..];
        if tail.len() <= MAX_RESIDUAL {
            self.residual = tail.to_vec();
            parsed.consumed += skipped;
        } else {
            // Only an unterminated IAC SB grows this long.
            tracing::debug!(len = tail.len(), "skipping oversized telnet subnegotiation");
            self.in_subnegotiation = true;
            if find_se(&tail[2..]) == BodyEnd::Missing(true) {
                self.residual.push(IAC);
            }
            parsed.consumed = buf.len() - self.residual.len();
        }
        parsed
    }

    /// Bytes held back waiting for the rest of a command sequence.
    pub fn pending(&self) -> &[u8] {
        &self.residual
    }
}
