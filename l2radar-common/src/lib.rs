//! Types and packet logic shared between the l2radar TC program and userspace.
//!
//! Everything here is `no_std` and allocation-free so the same classifier
//! runs inside the kernel and in ordinary unit tests. The `user` feature adds
//! `aya::Pod` impls for the table types so userspace can read the pinned map.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod classify;
pub mod table;
pub mod wire;

pub use classify::{NeighbourTable, Observation, classify, record};
pub use table::{Insert, MAX_ADDRS, MacKey, NeighbourEntry};
pub use wire::{Frame, Window, window};

/// Name of the neighbour map inside the eBPF object.
pub const NEIGHBOURS_MAP: &str = "NEIGHBOURS";

/// Name of the TC classifier program inside the eBPF object.
pub const PROGRAM_NAME: &str = "l2radar";

/// Capacity of the kernel neighbour map. Not an eviction bound: inserts past
/// this simply fail.
pub const NEIGHBOURS_MAX_ENTRIES: u32 = 16384;

/// TC "no verdict" return code; lets the frame continue untouched.
pub const TC_ACT_UNSPEC: i32 = -1;

// EtherTypes
pub const ETH_P_IPV6: u16 = 0x86DD;
pub const ETH_P_ARP: u16 = 0x0806;
pub const ETH_P_IP: u16 = 0x0800;
pub const ETH_P_8021Q: u16 = 0x8100;

// IP protocols
pub const IPPROTO_ICMPV6: u8 = 58;

// ARP
pub const ARPHRD_ETHER: u16 = 1;
pub const ARPOP_REQUEST: u16 = 1;
pub const ARPOP_REPLY: u16 = 2;

// ICMPv6 types for NDP
pub const ICMPV6_ROUTER_SOLICITATION: u8 = 133;
pub const ICMPV6_ROUTER_ADVERTISEMENT: u8 = 134;
pub const ICMPV6_NEIGHBOR_SOLICITATION: u8 = 135;
pub const ICMPV6_NEIGHBOR_ADVERTISEMENT: u8 = 136;

// NDP option types
pub const NDP_OPT_SOURCE_LL_ADDR: u8 = 1;
pub const NDP_OPT_TARGET_LL_ADDR: u8 = 2;

#[cfg(feature = "user")]
mod user_impls {
    use super::{MacKey, NeighbourEntry};

    unsafe impl aya::Pod for MacKey {}
    unsafe impl aya::Pod for NeighbourEntry {}
}
