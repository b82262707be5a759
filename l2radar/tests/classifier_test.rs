//! Classifier tests
//!
//! Drives the shared classifier with frames built by test_util and checks
//! the resulting in-memory neighbour table.

use l2radar::test_util::*;
use l2radar_common::{MAX_ADDRS, TC_ACT_UNSPEC};
use std::net::Ipv6Addr;

const HOST_A: [u8; 6] = [0x02, 0x42, 0xac, 0x11, 0x00, 0x10];
const HOST_B: [u8; 6] = [0x02, 0x42, 0xac, 0x11, 0x00, 0x20];
const HOST_A_IP: [u8; 4] = [192, 168, 1, 10];
const HOST_B_IP: [u8; 4] = [192, 168, 1, 20];

const NS: u64 = 1_000_000_000;

fn v6(s: &str) -> [u8; 16] {
    s.parse::<Ipv6Addr>().unwrap().octets()
}

// ============================================================================
// Source MAC handling
// ============================================================================

#[test]
fn test_multicast_and_broadcast_sources_never_recorded() {
    let sources = [
        BROADCAST_MAC,
        [0x01, 0x00, 0x5e, 0x00, 0x00, 0xfb],
        [0x33, 0x33, 0x00, 0x00, 0x00, 0x01],
        [0x03, 0x00, 0x00, 0x00, 0x00, 0x01],
    ];

    let mut table = MemoryTable::new();
    for src in sources {
        table.classify(&create_arp_request(src, HOST_A_IP, HOST_B_IP), NS);
        table.classify(&create_ethernet_frame(src, HOST_B, 0x0800, &[0u8; 20]), NS);
    }
    assert!(table.is_empty(), "multicast sources created {:?}", table.macs());
}

#[test]
fn test_single_frame_creates_one_empty_entry() {
    let mut table = MemoryTable::new();
    let frame = create_ethernet_frame(HOST_A, HOST_B, 0x0800, &[0u8; 20]);
    table.classify(&frame, 7 * NS);

    assert_eq!(table.len(), 1);
    let entry = table.get(HOST_A).expect("entry for source MAC");
    assert!(entry.ipv4_addrs().is_empty());
    assert!(entry.ipv6_addrs().is_empty());
    assert_eq!(entry.first_seen, entry.last_seen);
    assert_eq!(entry.first_seen, 7 * NS);
}

#[test]
fn test_repeated_frame_keeps_first_seen() {
    let mut table = MemoryTable::new();
    let frame = create_ethernet_frame(HOST_A, HOST_B, 0x0800, &[0u8; 20]);
    table.classify(&frame, 10 * NS);
    table.classify(&frame, 20 * NS);

    let entry = table.get(HOST_A).unwrap();
    assert_eq!(entry.first_seen, 10 * NS);
    assert_eq!(entry.last_seen, 20 * NS);

    // Out-of-order clock reading from another CPU
    table.classify(&frame, 15 * NS);
    let entry = table.get(HOST_A).unwrap();
    assert_eq!(entry.first_seen, 10 * NS);
    assert_eq!(entry.last_seen, 20 * NS);
}

#[test]
fn test_verdict_is_always_unspec() {
    let mut table = MemoryTable::new();
    let frames = [
        Vec::new(),
        vec![0u8; 5],
        create_arp_request(HOST_A, HOST_A_IP, HOST_B_IP),
        create_arp_request(BROADCAST_MAC, HOST_A_IP, HOST_B_IP),
        create_router_solicitation(HOST_A),
    ];
    for frame in frames {
        assert_eq!(table.classify(&frame, NS), TC_ACT_UNSPEC);
    }
}

#[test]
fn test_runt_frame_ignored() {
    let mut table = MemoryTable::new();
    let frame = create_arp_request(HOST_A, HOST_A_IP, HOST_B_IP);
    table.classify(&frame[..13], NS);
    assert!(table.is_empty());
}

// ============================================================================
// ARP
// ============================================================================

#[test]
fn test_arp_request_records_sender() {
    let mut table = MemoryTable::new();
    table.classify(&create_arp_request(HOST_A, HOST_A_IP, HOST_B_IP), NS);

    assert_eq!(table.len(), 1);
    let entry = table.get(parse_mac("02:42:ac:11:00:10")).unwrap();
    assert_eq!(entry.ipv4_addrs(), &[[192, 168, 1, 10]]);
}

#[test]
fn test_arp_reply_records_both_hosts() {
    let mut table = MemoryTable::new();
    table.classify(&create_arp_reply(HOST_A, HOST_A_IP, HOST_B, HOST_B_IP), NS);

    assert_eq!(table.len(), 2);
    assert_eq!(table.get(HOST_A).unwrap().ipv4_addrs(), &[HOST_A_IP]);
    assert_eq!(table.get(HOST_B).unwrap().ipv4_addrs(), &[HOST_B_IP]);
}

#[test]
fn test_gratuitous_arp_records_one_address() {
    let mut table = MemoryTable::new();
    table.classify(&create_gratuitous_arp(HOST_A, HOST_A_IP), NS);

    assert_eq!(table.len(), 1);
    assert_eq!(table.get(HOST_A).unwrap().ipv4_addrs(), &[HOST_A_IP]);
}

#[test]
fn test_arp_ipv4_list_capped_at_four() {
    let mut table = MemoryTable::new();
    for i in 1..=5u8 {
        let frame = create_arp_request(HOST_A, [10, 0, 0, i], HOST_B_IP);
        table.classify(&frame, i as u64 * NS);
    }

    let entry = table.get(HOST_A).unwrap();
    assert_eq!(entry.ipv4_count as usize, MAX_ADDRS);
    assert!(!entry.ipv4_addrs().contains(&[10, 0, 0, 5]));
    assert_eq!(entry.last_seen, 5 * NS);
}

#[test]
fn test_arp_duplicate_sender_ip() {
    let mut table = MemoryTable::new();
    let frame = create_arp_request(HOST_A, HOST_A_IP, HOST_B_IP);
    table.classify(&frame, NS);
    table.classify(&frame, 2 * NS);

    assert_eq!(table.get(HOST_A).unwrap().ipv4_count, 1);
}

#[test]
fn test_arp_duplicate_after_cap_is_noop() {
    let mut table = MemoryTable::new();
    for i in 1..=4u8 {
        table.classify(&create_arp_request(HOST_A, [10, 0, 0, i], HOST_B_IP), NS);
    }
    table.classify(&create_arp_request(HOST_A, [10, 0, 0, 2], HOST_B_IP), 2 * NS);

    let entry = table.get(HOST_A).unwrap();
    assert_eq!(
        entry.ipv4_addrs(),
        &[[10, 0, 0, 1], [10, 0, 0, 2], [10, 0, 0, 3], [10, 0, 0, 4]]
    );
    assert_eq!(entry.last_seen, 2 * NS);
}

#[test]
fn test_arp_probe_from_unspecified_sender() {
    let mut table = MemoryTable::new();
    table.classify(&create_arp_request(HOST_A, [0; 4], HOST_A_IP), NS);

    let entry = table.get(HOST_A).expect("probe still marks the MAC as seen");
    assert!(entry.ipv4_addrs().is_empty());
}

#[test]
fn test_vlan_tagged_arp() {
    let mut table = MemoryTable::new();
    let frame = with_vlan(&create_arp_reply(HOST_A, HOST_A_IP, HOST_B, HOST_B_IP), 42);
    table.classify(&frame, NS);

    assert_eq!(table.get(HOST_A).unwrap().ipv4_addrs(), &[HOST_A_IP]);
    assert_eq!(table.get(HOST_B).unwrap().ipv4_addrs(), &[HOST_B_IP]);
}

#[test]
fn test_truncated_arp_only_touches_source() {
    let mut table = MemoryTable::new();
    let frame = create_arp_request(HOST_A, HOST_A_IP, HOST_B_IP);
    table.classify(&frame[..ETHERNET_HDR_SIZE + ARP_PKT_SIZE - 1], NS);

    assert_eq!(table.len(), 1);
    assert!(table.get(HOST_A).unwrap().ipv4_addrs().is_empty());
}

#[test]
fn test_non_ethernet_arp_ignored() {
    let mut table = MemoryTable::new();
    let mut frame = create_arp_request(HOST_A, HOST_A_IP, HOST_B_IP);
    // htype = 6 (IEEE 802)
    frame[ETHERNET_HDR_SIZE + 1] = 6;
    table.classify(&frame, NS);

    assert!(table.get(HOST_A).unwrap().ipv4_addrs().is_empty());
}

#[test]
fn test_full_table_keeps_existing_entries() {
    let mut table = MemoryTable::with_capacity(1);
    table.classify(&create_arp_request(HOST_A, HOST_A_IP, HOST_B_IP), NS);
    table.classify(&create_arp_request(HOST_B, HOST_B_IP, HOST_A_IP), 2 * NS);
    table.classify(&create_arp_request(HOST_A, [10, 0, 0, 1], HOST_B_IP), 3 * NS);

    assert_eq!(table.len(), 1);
    assert!(table.get(HOST_B).is_none());
    let entry = table.get(HOST_A).unwrap();
    assert_eq!(entry.ipv4_addrs(), &[HOST_A_IP, [10, 0, 0, 1]]);
    assert_eq!(entry.last_seen, 3 * NS);
}

// ============================================================================
// NDP
// ============================================================================

#[test]
fn test_neighbor_solicitation_records_source() {
    let src_ip: Ipv6Addr = "2001:db8::10".parse().unwrap();
    let mut table = MemoryTable::new();
    table.classify(
        &create_neighbor_solicitation(HOST_A, src_ip, "2001:db8::1".parse().unwrap()),
        NS,
    );

    assert_eq!(table.len(), 1);
    assert_eq!(table.get(HOST_A).unwrap().ipv6_addrs(), &[src_ip.octets()]);
}

#[test]
fn test_unsolicited_advertisement_records_target() {
    let target = v6("2001:db8::20");
    let mut table = MemoryTable::new();
    table.classify(
        &create_neighbor_advertisement(
            HOST_B,
            mac_to_link_local(HOST_B),
            target.into(),
            HOST_B,
            false,
        ),
        NS,
    );

    let ipv6 = table.get(HOST_B).unwrap().ipv6_addrs();
    assert!(ipv6.contains(&target));
    assert!(ipv6.contains(&mac_to_link_local(HOST_B).octets()));
}

#[test]
fn test_advertisement_target_goes_to_option_mac() {
    let target = v6("2001:db8::30");
    let mut table = MemoryTable::new();
    table.classify(
        &create_neighbor_advertisement(HOST_A, mac_to_link_local(HOST_A), target.into(), HOST_B, true),
        NS,
    );

    assert_eq!(table.get(HOST_B).unwrap().ipv6_addrs(), &[target]);
    assert!(!table.get(HOST_A).unwrap().ipv6_addrs().contains(&target));
}

#[test]
fn test_dad_probe_records_no_address() {
    let mut table = MemoryTable::new();
    table.classify(&create_dad_probe(HOST_A, "2001:db8::10".parse().unwrap()), NS);

    let entry = table.get(HOST_A).unwrap();
    assert!(entry.ipv6_addrs().is_empty());
}

#[test]
fn test_router_messages_record_link_local() {
    let mut table = MemoryTable::new();
    table.classify(&create_router_solicitation(HOST_A), NS);
    table.classify(&create_router_advertisement(HOST_B), NS);

    assert_eq!(
        table.get(HOST_A).unwrap().ipv6_addrs(),
        &[mac_to_link_local(HOST_A).octets()]
    );
    assert_eq!(
        table.get(HOST_B).unwrap().ipv6_addrs(),
        &[mac_to_link_local(HOST_B).octets()]
    );
}

#[test]
fn test_vlan_tagged_solicitation() {
    let src_ip: Ipv6Addr = "fe80::10".parse().unwrap();
    let mut table = MemoryTable::new();
    let frame = with_vlan(
        &create_neighbor_solicitation(HOST_A, src_ip, "fe80::1".parse().unwrap()),
        7,
    );
    table.classify(&frame, NS);

    assert_eq!(table.get(HOST_A).unwrap().ipv6_addrs(), &[src_ip.octets()]);
}

#[test]
fn test_other_icmpv6_types_ignored() {
    // Echo request
    let icmpv6 = [128u8, 0, 0, 0, 0, 1, 0, 1];
    let frame = create_icmpv6_frame(
        HOST_A,
        HOST_B,
        mac_to_link_local(HOST_A),
        mac_to_link_local(HOST_B),
        &icmpv6,
    );

    let mut table = MemoryTable::new();
    table.classify(&frame, NS);
    let entry = table.get(HOST_A).unwrap();
    assert!(entry.ipv6_addrs().is_empty());
}

#[test]
fn test_truncated_solicitation_only_touches_source() {
    let src_ip: Ipv6Addr = "2001:db8::10".parse().unwrap();
    let frame = create_neighbor_solicitation(HOST_A, src_ip, "2001:db8::1".parse().unwrap());
    // Cut inside the target address
    let cut = ETHERNET_HDR_SIZE + IPV6_HDR_SIZE + 12;

    let mut table = MemoryTable::new();
    table.classify(&frame[..cut], NS);
    assert_eq!(table.len(), 1);
    assert!(table.get(HOST_A).unwrap().ipv6_addrs().is_empty());
}

#[test]
fn test_advertisement_with_overrunning_option() {
    let target = v6("2001:db8::40");
    let mut frame = create_neighbor_advertisement(
        HOST_A,
        mac_to_link_local(HOST_A),
        target.into(),
        HOST_A,
        false,
    );
    // TLLA option claims 16 bytes but only 8 are present
    let opt_len = ETHERNET_HDR_SIZE + IPV6_HDR_SIZE + 24 + 1;
    frame[opt_len] = 2;

    let mut table = MemoryTable::new();
    table.classify(&frame, NS);
    let ipv6 = table.get(HOST_A).unwrap().ipv6_addrs();
    assert_eq!(ipv6, &[mac_to_link_local(HOST_A).octets()]);
}

#[test]
fn test_ipv6_list_capped_at_four() {
    let mut table = MemoryTable::new();
    for i in 1..=5u16 {
        let src = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, i);
        table.classify(
            &create_neighbor_solicitation(HOST_A, src, "2001:db8::1".parse().unwrap()),
            NS,
        );
    }

    let entry = table.get(HOST_A).unwrap();
    assert_eq!(entry.ipv6_count as usize, MAX_ADDRS);
    assert!(!entry.ipv6_addrs().contains(&v6("2001:db8::5")));
}
