//! Per-frame neighbour classification.
//!
//! [`classify`] is the body of the TC program. It is generic over where the
//! frame bytes come from and where entries live so it can be driven by a
//! plain slice and an in-memory table in tests.

use crate::table::{MacKey, NeighbourEntry};
use crate::wire::{self, Frame, NdpMessage};
use crate::{ARPOP_REPLY, ARPOP_REQUEST, ETH_P_ARP, ETH_P_IPV6, IPPROTO_ICMPV6, TC_ACT_UNSPEC};

/// Mutable access to the neighbour table.
pub trait NeighbourTable {
    /// Entry for `mac`, created as `NeighbourEntry::new(now)` if absent.
    /// `None` when the table cannot take another key.
    fn entry(&mut self, mac: &MacKey, now: u64) -> Option<&mut NeighbourEntry>;
}

/// What a frame says about one MAC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// The MAC is alive; no address attached.
    Seen,
    Ipv4([u8; 4]),
    Ipv6([u8; 16]),
}

/// Apply one observation. Returns `false` if the MAC is not recordable or
/// the table is full; address-list overflow still counts as recorded.
pub fn record<T: NeighbourTable + ?Sized>(
    table: &mut T,
    mac: [u8; 6],
    now: u64,
    observation: Observation,
) -> bool {
    let key = MacKey::new(mac);
    if !key.is_recordable() {
        return false;
    }
    let Some(entry) = table.entry(&key, now) else {
        return false;
    };

    entry.touch(now);
    match observation {
        Observation::Seen => {}
        Observation::Ipv4(addr) => {
            entry.add_ipv4(addr);
        }
        Observation::Ipv6(addr) => {
            entry.add_ipv6(addr);
        }
    }
    true
}

/// Inspect one ingress frame and update `table`. Always returns
/// [`TC_ACT_UNSPEC`]; the frame's fate is never changed.
pub fn classify<F: Frame + ?Sized, T: NeighbourTable + ?Sized>(
    frame: &F,
    table: &mut T,
    now: u64,
) -> i32 {
    observe(frame, table, now);
    TC_ACT_UNSPEC
}

#[inline(always)]
fn observe<F: Frame + ?Sized, T: NeighbourTable + ?Sized>(frame: &F, table: &mut T, now: u64) {
    let Some(eth) = wire::parse_ethernet(frame) else {
        return;
    };
    if !MacKey::new(eth.src_mac).is_recordable() {
        return;
    }

    record(table, eth.src_mac, now, Observation::Seen);

    match eth.ethertype {
        ETH_P_ARP => observe_arp(frame, eth.payload_offset, table, now),
        ETH_P_IPV6 => observe_ndp(frame, eth.payload_offset, eth.src_mac, table, now),
        _ => {}
    }
}

#[inline(always)]
fn observe_arp<F: Frame + ?Sized, T: NeighbourTable + ?Sized>(
    frame: &F,
    offset: usize,
    table: &mut T,
    now: u64,
) {
    let Some(arp) = wire::parse_arp(frame, offset) else {
        return;
    };
    if arp.opcode != ARPOP_REQUEST && arp.opcode != ARPOP_REPLY {
        return;
    }

    // 0.0.0.0 is an address probe (RFC 5227), not a claim
    if arp.sender_ip != [0; 4] {
        record(table, arp.sender_mac, now, Observation::Ipv4(arp.sender_ip));
    }
    if arp.opcode == ARPOP_REPLY && arp.target_ip != [0; 4] {
        record(table, arp.target_mac, now, Observation::Ipv4(arp.target_ip));
    }
}

#[inline(always)]
fn observe_ndp<F: Frame + ?Sized, T: NeighbourTable + ?Sized>(
    frame: &F,
    offset: usize,
    src_mac: [u8; 6],
    table: &mut T,
    now: u64,
) {
    let Some(ip) = wire::parse_ipv6(frame, offset) else {
        return;
    };
    if ip.next_header != IPPROTO_ICMPV6 {
        return;
    }

    let icmp = wire::window(frame, ip.payload_offset, ip.payload_end);
    let Some(msg) = wire::parse_ndp(&icmp) else {
        return;
    };
    if msg == NdpMessage::Ignored {
        return;
    }

    // DAD probes come from ::
    if ip.src_ip != [0; 16] {
        record(table, src_mac, now, Observation::Ipv6(ip.src_ip));
    }

    if let NdpMessage::NeighbourAdvertisement {
        target_ip, options, ..
    } = msg
        && let Some(owner) = options.target()
        && target_ip != [0; 16]
    {
        record(table, owner, now, Observation::Ipv6(target_ip));
    }
}
