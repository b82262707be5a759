//! Frame builders for classifier tests.
//!
//! Every builder returns a complete Ethernet frame as it would arrive at
//! TC ingress. ICMPv6 checksums are filled in even though the classifier
//! never checks them, so captures of these frames decode cleanly.

use smoltcp::wire::{
    ArpOperation, ArpPacket, ArpRepr, EthernetAddress, EthernetFrame, EthernetProtocol,
    EthernetRepr, IpProtocol, Ipv4Address, Ipv6Address, Ipv6Packet, Ipv6Repr,
};
use std::net::Ipv6Addr;

// ============================================================================
// Constants
// ============================================================================

/// Ethernet header size
pub const ETHERNET_HDR_SIZE: usize = 14;

/// 802.1Q tag size
pub const VLAN_TAG_SIZE: usize = 4;

/// ARP packet size (Ethernet + IPv4)
pub const ARP_PKT_SIZE: usize = 28;

/// IPv6 header size
pub const IPV6_HDR_SIZE: usize = 40;

/// Broadcast MAC address
pub const BROADCAST_MAC: [u8; 6] = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff];

/// IPv6 All-Nodes multicast address (ff02::1)
pub const ALL_NODES_MULTICAST: [u8; 16] = [0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01];

/// IPv6 All-Routers multicast address (ff02::2)
pub const ALL_ROUTERS_MULTICAST: [u8; 16] =
    [0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x02];

/// NA flags
pub const NA_FLAG_ROUTER: u8 = 0x80;
pub const NA_FLAG_SOLICITED: u8 = 0x40;
pub const NA_FLAG_OVERRIDE: u8 = 0x20;

// ============================================================================
// Ethernet / VLAN
// ============================================================================

/// Ethernet frame with an arbitrary EtherType and payload
pub fn create_ethernet_frame(
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    ethertype: u16,
    payload: &[u8],
) -> Vec<u8> {
    let mut packet = vec![0u8; ETHERNET_HDR_SIZE + payload.len()];

    let eth_repr = EthernetRepr {
        src_addr: EthernetAddress(src_mac),
        dst_addr: EthernetAddress(dst_mac),
        ethertype: EthernetProtocol::from(ethertype),
    };
    let mut eth_frame = EthernetFrame::new_unchecked(&mut packet[..]);
    eth_repr.emit(&mut eth_frame);
    eth_frame.payload_mut().copy_from_slice(payload);

    packet
}

/// Insert a single 802.1Q tag after the MAC addresses.
pub fn with_vlan(frame: &[u8], vlan_id: u16) -> Vec<u8> {
    let mut tagged = Vec::with_capacity(frame.len() + VLAN_TAG_SIZE);
    tagged.extend_from_slice(&frame[..12]);
    tagged.extend_from_slice(&0x8100u16.to_be_bytes());
    tagged.extend_from_slice(&(vlan_id & 0x0fff).to_be_bytes());
    tagged.extend_from_slice(&frame[12..]);
    tagged
}

// ============================================================================
// ARP
// ============================================================================

fn create_arp(
    operation: ArpOperation,
    sender_mac: [u8; 6],
    sender_ip: [u8; 4],
    dst_mac: [u8; 6],
    target_mac: [u8; 6],
    target_ip: [u8; 4],
) -> Vec<u8> {
    let total_size = ETHERNET_HDR_SIZE + ARP_PKT_SIZE;
    let mut packet = vec![0u8; total_size];

    let eth_repr = EthernetRepr {
        src_addr: EthernetAddress(sender_mac),
        dst_addr: EthernetAddress(dst_mac),
        ethertype: EthernetProtocol::Arp,
    };
    let mut eth_frame = EthernetFrame::new_unchecked(&mut packet[..]);
    eth_repr.emit(&mut eth_frame);

    let arp_repr = ArpRepr::EthernetIpv4 {
        operation,
        source_hardware_addr: EthernetAddress(sender_mac),
        source_protocol_addr: Ipv4Address::from_bytes(&sender_ip),
        target_hardware_addr: EthernetAddress(target_mac),
        target_protocol_addr: Ipv4Address::from_bytes(&target_ip),
    };
    let mut arp_packet = ArpPacket::new_unchecked(eth_frame.payload_mut());
    arp_repr.emit(&mut arp_packet);

    packet
}

/// Broadcast ARP request
pub fn create_arp_request(sender_mac: [u8; 6], sender_ip: [u8; 4], target_ip: [u8; 4]) -> Vec<u8> {
    create_arp(
        ArpOperation::Request,
        sender_mac,
        sender_ip,
        BROADCAST_MAC,
        [0; 6],
        target_ip,
    )
}

/// Unicast ARP reply from `sender` to `target`
pub fn create_arp_reply(
    sender_mac: [u8; 6],
    sender_ip: [u8; 4],
    target_mac: [u8; 6],
    target_ip: [u8; 4],
) -> Vec<u8> {
    create_arp(
        ArpOperation::Reply,
        sender_mac,
        sender_ip,
        target_mac,
        target_mac,
        target_ip,
    )
}

/// Gratuitous ARP reply (sender IP == target IP)
pub fn create_gratuitous_arp(mac: [u8; 6], ip: [u8; 4]) -> Vec<u8> {
    create_arp(ArpOperation::Reply, mac, ip, BROADCAST_MAC, mac, ip)
}

// ============================================================================
// IPv6 / NDP
// ============================================================================

/// Compute link-local IPv6 address from MAC using EUI-64
pub fn mac_to_link_local(mac: [u8; 6]) -> Ipv6Addr {
    Ipv6Addr::new(
        0xfe80,
        0,
        0,
        0,
        ((mac[0] as u16 ^ 0x02) << 8) | mac[1] as u16,
        (mac[2] as u16) << 8 | 0xff,
        0xfe00 | mac[3] as u16,
        (mac[4] as u16) << 8 | mac[5] as u16,
    )
}

/// Compute multicast MAC address for IPv6 multicast
fn ipv6_multicast_mac(ipv6: &[u8; 16]) -> [u8; 6] {
    [0x33, 0x33, ipv6[12], ipv6[13], ipv6[14], ipv6[15]]
}

fn solicited_node_multicast(target: &Ipv6Addr) -> [u8; 16] {
    let octets = target.octets();
    [
        0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01, 0xff, octets[13], octets[14], octets[15],
    ]
}

/// Compute ICMPv6 checksum
pub fn compute_icmpv6_checksum(src: &[u8; 16], dst: &[u8; 16], icmpv6_data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    // Pseudo-header
    for chunk in src.chunks(2).chain(dst.chunks(2)) {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    sum += icmpv6_data.len() as u32;
    sum += 58u32;

    let mut i = 0;
    while i + 1 < icmpv6_data.len() {
        sum += u16::from_be_bytes([icmpv6_data[i], icmpv6_data[i + 1]]) as u32;
        i += 2;
    }
    if i < icmpv6_data.len() {
        sum += (icmpv6_data[i] as u32) << 8;
    }

    // Fold to 16 bits
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    let result = !(sum as u16);
    if result == 0 { 0xffff } else { result }
}

/// Ethernet + IPv6 + the given ICMPv6 message (checksum filled in).
pub fn create_icmpv6_frame(
    src_mac: [u8; 6],
    dst_mac: [u8; 6],
    src_ip: Ipv6Addr,
    dst_ip: Ipv6Addr,
    icmpv6: &[u8],
) -> Vec<u8> {
    let total_len = ETHERNET_HDR_SIZE + IPV6_HDR_SIZE + icmpv6.len();
    let mut packet = vec![0u8; total_len];

    let eth_repr = EthernetRepr {
        src_addr: EthernetAddress(src_mac),
        dst_addr: EthernetAddress(dst_mac),
        ethertype: EthernetProtocol::Ipv6,
    };
    let mut eth_frame = EthernetFrame::new_unchecked(&mut packet[..]);
    eth_repr.emit(&mut eth_frame);

    let ipv6_repr = Ipv6Repr {
        src_addr: Ipv6Address::from_bytes(&src_ip.octets()),
        dst_addr: Ipv6Address::from_bytes(&dst_ip.octets()),
        next_header: IpProtocol::Icmpv6,
        payload_len: icmpv6.len(),
        hop_limit: 255,
    };
    let mut ipv6_packet = Ipv6Packet::new_unchecked(eth_frame.payload_mut());
    ipv6_repr.emit(&mut ipv6_packet);

    let icmpv6_start = ETHERNET_HDR_SIZE + IPV6_HDR_SIZE;
    let icmpv6_data = &mut packet[icmpv6_start..];
    icmpv6_data.copy_from_slice(icmpv6);
    icmpv6_data[2..4].fill(0);
    let checksum = compute_icmpv6_checksum(&src_ip.octets(), &dst_ip.octets(), icmpv6_data);
    icmpv6_data[2..4].copy_from_slice(&checksum.to_be_bytes());

    packet
}

/// 8-byte link-layer address option
fn link_layer_option(kind: u8, mac: [u8; 6]) -> [u8; 8] {
    let mut opt = [0u8; 8];
    opt[0] = kind;
    opt[1] = 1;
    opt[2..8].copy_from_slice(&mac);
    opt
}

/// Neighbor Solicitation for `target_ip`, multicast to its solicited-node
/// group, carrying a Source Link-Layer Address option.
pub fn create_neighbor_solicitation(
    src_mac: [u8; 6],
    src_ip: Ipv6Addr,
    target_ip: Ipv6Addr,
) -> Vec<u8> {
    let solicited_node = solicited_node_multicast(&target_ip);

    // type (1) + code (1) + checksum (2) + reserved (4) + target (16) + SLLAO (8)
    let mut icmpv6 = vec![0u8; 32];
    icmpv6[0] = 135;
    icmpv6[8..24].copy_from_slice(&target_ip.octets());
    icmpv6[24..32].copy_from_slice(&link_layer_option(1, src_mac));

    create_icmpv6_frame(
        src_mac,
        ipv6_multicast_mac(&solicited_node),
        src_ip,
        Ipv6Addr::from(solicited_node),
        &icmpv6,
    )
}

/// Duplicate Address Detection probe: NS from `::` with no options.
pub fn create_dad_probe(src_mac: [u8; 6], target_ip: Ipv6Addr) -> Vec<u8> {
    let solicited_node = solicited_node_multicast(&target_ip);

    let mut icmpv6 = vec![0u8; 24];
    icmpv6[0] = 135;
    icmpv6[8..24].copy_from_slice(&target_ip.octets());

    create_icmpv6_frame(
        src_mac,
        ipv6_multicast_mac(&solicited_node),
        Ipv6Addr::UNSPECIFIED,
        Ipv6Addr::from(solicited_node),
        &icmpv6,
    )
}

/// Neighbor Advertisement for `target_ip` with a Target Link-Layer Address
/// option naming `target_mac`. Unsolicited ones go to all-nodes.
pub fn create_neighbor_advertisement(
    src_mac: [u8; 6],
    src_ip: Ipv6Addr,
    target_ip: Ipv6Addr,
    target_mac: [u8; 6],
    solicited: bool,
) -> Vec<u8> {
    // type (1) + code (1) + checksum (2) + flags (4) + target (16) + TLLAO (8)
    let mut icmpv6 = vec![0u8; 32];
    icmpv6[0] = 136;
    icmpv6[4] = NA_FLAG_OVERRIDE | if solicited { NA_FLAG_SOLICITED } else { 0 };
    icmpv6[8..24].copy_from_slice(&target_ip.octets());
    icmpv6[24..32].copy_from_slice(&link_layer_option(2, target_mac));

    create_icmpv6_frame(
        src_mac,
        ipv6_multicast_mac(&ALL_NODES_MULTICAST),
        src_ip,
        Ipv6Addr::from(ALL_NODES_MULTICAST),
        &icmpv6,
    )
}

/// Router Solicitation from the EUI-64 link-local address of `src_mac`
pub fn create_router_solicitation(src_mac: [u8; 6]) -> Vec<u8> {
    // type (1) + code (1) + checksum (2) + reserved (4) + SLLAO (8)
    let mut icmpv6 = vec![0u8; 16];
    icmpv6[0] = 133;
    icmpv6[8..16].copy_from_slice(&link_layer_option(1, src_mac));

    create_icmpv6_frame(
        src_mac,
        ipv6_multicast_mac(&ALL_ROUTERS_MULTICAST),
        mac_to_link_local(src_mac),
        Ipv6Addr::from(ALL_ROUTERS_MULTICAST),
        &icmpv6,
    )
}

/// Router Advertisement from the EUI-64 link-local address of `src_mac`
pub fn create_router_advertisement(src_mac: [u8; 6]) -> Vec<u8> {
    // type (1) + code (1) + checksum (2) + hop limit, flags, lifetime (4)
    // + reachable (4) + retrans (4) + SLLAO (8)
    let mut icmpv6 = vec![0u8; 24];
    icmpv6[0] = 134;
    icmpv6[4] = 64;
    icmpv6[6..8].copy_from_slice(&1800u16.to_be_bytes());
    icmpv6[16..24].copy_from_slice(&link_layer_option(1, src_mac));

    create_icmpv6_frame(
        src_mac,
        ipv6_multicast_mac(&ALL_NODES_MULTICAST),
        mac_to_link_local(src_mac),
        Ipv6Addr::from(ALL_NODES_MULTICAST),
        &icmpv6,
    )
}
