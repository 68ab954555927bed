use port_probe_rs::ports::{default_endpoints, parse_endpoints_str, Mode};
use port_probe_rs::types::Transport;

#[test]
fn parse_names_ranges_and_comments() {
    let input = r#"
        # lab services
        22 SSH
        53/udp DNS   # resolver
        8000-8002 dev
        8001  # duplicate
        # blank line follows

    "#;

    let eps = parse_endpoints_str(input, "Lab").expect("parse ok");
    let ports: Vec<u16> = eps.iter().map(|e| e.port).collect();
    assert_eq!(ports, vec![22, 53, 8000, 8001, 8002]);
    assert_eq!(eps[1].transport, Transport::Udp);
    assert_eq!(eps[4].name, "dev-8002");
}

#[test]
fn invalid_port_rejected() {
    assert!(parse_endpoints_str("0\n", "Lab").is_err());
}

#[test]
fn admin_view_has_no_duplicate_ports() {
    let eps = default_endpoints(Mode::Admin);
    let mut ports: Vec<u16> = eps.iter().map(|e| e.port).collect();
    let before = ports.len();
    ports.dedup();
    assert_eq!(ports.len(), before);
}
