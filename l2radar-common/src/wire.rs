//! Bounds-checked decoders for Ethernet, 802.1Q, ARP, IPv6 and NDP.
//!
//! Parsers never index raw memory. All reads go through [`Frame::load`],
//! which returns `None` instead of reading past the end, so a truncated or
//! hostile frame can only ever produce "malformed".

use crate::{
    ARPHRD_ETHER, ETH_P_8021Q, ETH_P_IP, ICMPV6_NEIGHBOR_ADVERTISEMENT,
    ICMPV6_NEIGHBOR_SOLICITATION, ICMPV6_ROUTER_ADVERTISEMENT, ICMPV6_ROUTER_SOLICITATION,
    NDP_OPT_SOURCE_LL_ADDR, NDP_OPT_TARGET_LL_ADDR,
};

// Header sizes
pub const ETH_HLEN: usize = 14;
pub const VLAN_HLEN: usize = 4;
pub const ARP_LEN: usize = 28;
pub const IPV6_HLEN: usize = 40;

// NDP bodies: fixed part before the option list
const NS_NA_BODY_LEN: usize = 24;
const RS_BODY_LEN: usize = 8;
const RA_BODY_LEN: usize = 16;

/// Upper bound on options walked per message. Keeps the loop bounded for the
/// verifier; real NDP messages carry one or two options.
pub const MAX_NDP_OPTIONS: usize = 8;

/// NA flag bits (first byte after the checksum)
const NA_FLAG_SOLICITED: u8 = 0x40;

/// Read-only view of packet bytes.
pub trait Frame {
    /// Number of readable bytes.
    fn len(&self) -> usize;

    /// Copy `N` bytes starting at `offset`, or `None` if any of them lies
    /// beyond [`Frame::len`].
    fn load<const N: usize>(&self, offset: usize) -> Option<[u8; N]>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Frame for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn load<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        let end = offset.checked_add(N)?;
        let bytes = self.get(offset..end)?;
        <[u8; N]>::try_from(bytes).ok()
    }
}

/// A sub-range of another frame, e.g. the ICMPv6 body of an IPv6 packet.
pub struct Window<'a, F: Frame + ?Sized> {
    frame: &'a F,
    start: usize,
    len: usize,
}

/// Restrict `frame` to `start..end`. `end` is clamped to the frame length.
pub fn window<F: Frame + ?Sized>(frame: &F, start: usize, end: usize) -> Window<'_, F> {
    let end = if end > frame.len() { frame.len() } else { end };
    let len = end.saturating_sub(start);
    Window { frame, start, len }
}

impl<F: Frame + ?Sized> Frame for Window<'_, F> {
    fn len(&self) -> usize {
        self.len
    }

    fn load<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        if offset.checked_add(N)? > self.len {
            return None;
        }
        self.frame.load::<N>(self.start.checked_add(offset)?)
    }
}

/// Ethernet header with at most one 802.1Q tag already unwrapped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst_mac: [u8; 6],
    pub src_mac: [u8; 6],
    /// Inner EtherType when tagged
    pub ethertype: u16,
    pub payload_offset: usize,
}

pub fn parse_ethernet<F: Frame + ?Sized>(frame: &F) -> Option<EthernetHeader> {
    let dst_mac = frame.load::<6>(0)?;
    let src_mac = frame.load::<6>(6)?;
    let ethertype = u16::from_be_bytes(frame.load::<2>(12)?);

    if ethertype != ETH_P_8021Q {
        return Some(EthernetHeader {
            dst_mac,
            src_mac,
            ethertype,
            payload_offset: ETH_HLEN,
        });
    }

    // TPID already consumed: TCI (2) + inner EtherType (2). No QinQ.
    let tag = frame.load::<4>(ETH_HLEN)?;
    Some(EthernetHeader {
        dst_mac,
        src_mac,
        ethertype: u16::from_be_bytes([tag[2], tag[3]]),
        payload_offset: ETH_HLEN + VLAN_HLEN,
    })
}

/// IPv4-over-Ethernet ARP message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArpMessage {
    pub opcode: u16,
    pub sender_mac: [u8; 6],
    pub sender_ip: [u8; 4],
    pub target_mac: [u8; 6],
    pub target_ip: [u8; 4],
}

/// Parse the ARP message at `offset`. Anything but htype=1, ptype=0x0800,
/// hlen=6, plen=4 is rejected.
pub fn parse_arp<F: Frame + ?Sized>(frame: &F, offset: usize) -> Option<ArpMessage> {
    if offset.checked_add(ARP_LEN)? > frame.len() {
        return None;
    }

    let fixed = frame.load::<8>(offset)?;
    let htype = u16::from_be_bytes([fixed[0], fixed[1]]);
    let ptype = u16::from_be_bytes([fixed[2], fixed[3]]);
    if htype != ARPHRD_ETHER || ptype != ETH_P_IP || fixed[4] != 6 || fixed[5] != 4 {
        return None;
    }

    Some(ArpMessage {
        opcode: u16::from_be_bytes([fixed[6], fixed[7]]),
        sender_mac: frame.load::<6>(offset + 8)?,
        sender_ip: frame.load::<4>(offset + 14)?,
        target_mac: frame.load::<6>(offset + 18)?,
        target_ip: frame.load::<4>(offset + 24)?,
    })
}

/// Fixed IPv6 header. The payload is `payload_offset..payload_end` of the
/// frame, already clamped to the captured length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv6Header {
    pub src_ip: [u8; 16],
    pub dst_ip: [u8; 16],
    pub next_header: u8,
    pub payload_offset: usize,
    pub payload_end: usize,
}

pub fn parse_ipv6<F: Frame + ?Sized>(frame: &F, offset: usize) -> Option<Ipv6Header> {
    let fixed = frame.load::<8>(offset)?;
    if fixed[0] >> 4 != 6 {
        return None;
    }

    let payload_len = u16::from_be_bytes([fixed[4], fixed[5]]) as usize;
    let src_ip = frame.load::<16>(offset + 8)?;
    let dst_ip = frame.load::<16>(offset + 24)?;
    let payload_offset = offset + IPV6_HLEN;
    let declared_end = payload_offset + payload_len;

    Some(Ipv6Header {
        src_ip,
        dst_ip,
        next_header: fixed[6],
        payload_offset,
        payload_end: if declared_end > frame.len() { frame.len() } else { declared_end },
    })
}

/// Link-layer address option (type 1 = source, type 2 = target).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkLayerOption {
    pub kind: u8,
    pub mac: [u8; 6],
}

/// Fixed-capacity list of link-layer options found in one NDP message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkLayerOptions {
    items: [LinkLayerOption; MAX_NDP_OPTIONS],
    len: usize,
}

impl LinkLayerOptions {
    pub const fn new() -> Self {
        Self {
            items: [LinkLayerOption { kind: 0, mac: [0; 6] }; MAX_NDP_OPTIONS],
            len: 0,
        }
    }

    fn push(&mut self, option: LinkLayerOption) {
        if self.len < MAX_NDP_OPTIONS {
            self.items[self.len] = option;
            self.len += 1;
        }
    }

    pub fn as_slice(&self) -> &[LinkLayerOption] {
        &self.items[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// MAC from the first Source Link-Layer Address option.
    pub fn source(&self) -> Option<[u8; 6]> {
        self.first_of(NDP_OPT_SOURCE_LL_ADDR)
    }

    /// MAC from the first Target Link-Layer Address option.
    pub fn target(&self) -> Option<[u8; 6]> {
        self.first_of(NDP_OPT_TARGET_LL_ADDR)
    }

    fn first_of(&self, kind: u8) -> Option<[u8; 6]> {
        self.as_slice()
            .iter()
            .find(|opt| opt.kind == kind)
            .map(|opt| opt.mac)
    }
}

impl Default for LinkLayerOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk an NDP option list. Stops quietly at the first option whose length is
/// zero or runs past the buffer; whatever was collected so far is kept.
pub fn parse_ndp_options<F: Frame + ?Sized>(bytes: &F) -> LinkLayerOptions {
    let mut options = LinkLayerOptions::new();
    let mut offset = 0usize;

    for _ in 0..MAX_NDP_OPTIONS {
        let Some([kind, units]) = bytes.load::<2>(offset) else {
            break;
        };
        let opt_len = units as usize * 8;
        if opt_len == 0 || offset + opt_len > bytes.len() {
            break;
        }
        if (kind == NDP_OPT_SOURCE_LL_ADDR || kind == NDP_OPT_TARGET_LL_ADDR)
            && let Some(mac) = bytes.load::<6>(offset + 2)
        {
            options.push(LinkLayerOption { kind, mac });
        }
        offset += opt_len;
    }

    options
}

/// NDP message decoded from an ICMPv6 body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NdpMessage {
    NeighbourSolicitation {
        target_ip: [u8; 16],
        options: LinkLayerOptions,
    },
    NeighbourAdvertisement {
        target_ip: [u8; 16],
        solicited: bool,
        options: LinkLayerOptions,
    },
    RouterSolicitation {
        options: LinkLayerOptions,
    },
    RouterAdvertisement {
        options: LinkLayerOptions,
    },
    /// Any other ICMPv6 type.
    Ignored,
}

/// Decode an ICMPv6 body. `None` means a recognised NDP type that is too
/// short to hold its fixed part.
pub fn parse_ndp<F: Frame + ?Sized>(icmp: &F) -> Option<NdpMessage> {
    let [icmp_type] = icmp.load::<1>(0)?;

    match icmp_type {
        ICMPV6_NEIGHBOR_SOLICITATION => {
            let target_ip = icmp.load::<16>(8)?;
            Some(NdpMessage::NeighbourSolicitation {
                target_ip,
                options: options_after(icmp, NS_NA_BODY_LEN),
            })
        }
        ICMPV6_NEIGHBOR_ADVERTISEMENT => {
            let [flags] = icmp.load::<1>(4)?;
            let target_ip = icmp.load::<16>(8)?;
            Some(NdpMessage::NeighbourAdvertisement {
                target_ip,
                solicited: flags & NA_FLAG_SOLICITED != 0,
                options: options_after(icmp, NS_NA_BODY_LEN),
            })
        }
        ICMPV6_ROUTER_SOLICITATION => {
            if icmp.len() < RS_BODY_LEN {
                return None;
            }
            Some(NdpMessage::RouterSolicitation {
                options: options_after(icmp, RS_BODY_LEN),
            })
        }
        ICMPV6_ROUTER_ADVERTISEMENT => {
            if icmp.len() < RA_BODY_LEN {
                return None;
            }
            Some(NdpMessage::RouterAdvertisement {
                options: options_after(icmp, RA_BODY_LEN),
            })
        }
        _ => Some(NdpMessage::Ignored),
    }
}

#[inline(always)]
fn options_after<F: Frame + ?Sized>(icmp: &F, body_len: usize) -> LinkLayerOptions {
    parse_ndp_options(&window(icmp, body_len, icmp.len()))
}
