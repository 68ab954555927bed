use port_probe_rs::telnet::{parse, Negotiator, DO, DONT, IAC, SB, SE, WILL, WONT};

#[test]
fn payload_without_iac_is_unchanged() {
    let data: Vec<u8> = (0u8..=0xFE).collect();
    let p = parse(&data);
    assert_eq!(p.clean, data);
    assert!(p.replies.is_empty());
}

#[test]
fn typical_telnetd_greeting() {
    // Linux telnetd opens with a burst of DO/WILL requests.
    let data = [
        IAC, DO, 24, IAC, DO, 32, IAC, DO, 35, IAC, DO, 39, IAC, WILL, 1, IAC, WILL, 3,
    ];
    let p = parse(&data);
    assert!(p.clean.is_empty());
    assert_eq!(
        p.replies,
        vec![
            IAC, WONT, 24, IAC, WONT, 32, IAC, WONT, 35, IAC, WONT, 39, IAC, DO, 1, IAC, DO, 3,
        ]
    );
}

#[test]
fn subnegotiation_split_across_reads() {
    let mut n = Negotiator::new();
    let a = n.feed(&[b'>', IAC, SB, 24, 1]);
    assert_eq!(a.clean, b">".to_vec());
    let b = n.feed(&[IAC, SE, b'$', b' ']);
    assert_eq!(b.clean, b"$ ".to_vec());
    assert!(a.replies.is_empty() && b.replies.is_empty());
}

#[test]
fn dont_is_silent() {
    assert!(parse(&[IAC, DONT, 1]).replies.is_empty());
}
