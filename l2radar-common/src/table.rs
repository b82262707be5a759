//! Neighbour table layout.
//!
//! These structs are the key and value of the pinned kernel map, so their
//! layout is an external interface: userspace decodes them byte for byte.

/// Maximum number of addresses kept per family for one MAC.
pub const MAX_ADDRS: usize = 4;

/// Map key: a 6-byte hardware address padded to 8 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacKey {
    pub addr: [u8; 6],
    pub _pad: [u8; 2],
}

impl MacKey {
    pub const fn new(addr: [u8; 6]) -> Self {
        Self { addr, _pad: [0; 2] }
    }

    /// Group bit set. Also true for the broadcast address.
    pub const fn is_multicast(&self) -> bool {
        self.addr[0] & 0x01 != 0
    }

    pub const fn is_zero(&self) -> bool {
        let a = self.addr;
        a[0] | a[1] | a[2] | a[3] | a[4] | a[5] == 0
    }

    /// Only unicast, non-zero addresses ever become table keys.
    pub const fn is_recordable(&self) -> bool {
        !self.is_multicast() && !self.is_zero()
    }
}

/// Outcome of offering an address to an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insert {
    Added,
    Duplicate,
    Full,
}

/// Map value: capped address lists plus boot-clock timestamps (nanoseconds).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NeighbourEntry {
    /// IPv4 addresses in network byte order
    pub ipv4: [[u8; 4]; MAX_ADDRS],
    /// IPv6 addresses in network byte order
    pub ipv6: [[u8; 16]; MAX_ADDRS],
    pub ipv4_count: u8,
    pub ipv6_count: u8,
    pub _pad: [u8; 6],
    pub first_seen: u64,
    pub last_seen: u64,
}

impl NeighbourEntry {
    /// Fresh entry for a MAC observed for the first time at `now`.
    pub const fn new(now: u64) -> Self {
        Self {
            ipv4: [[0; 4]; MAX_ADDRS],
            ipv6: [[0; 16]; MAX_ADDRS],
            ipv4_count: 0,
            ipv6_count: 0,
            _pad: [0; 6],
            first_seen: now,
            last_seen: now,
        }
    }

    /// Refresh `last_seen`. Never moves backwards, so a CPU with a slightly
    /// older clock reading cannot break `first_seen <= last_seen`.
    #[inline(always)]
    pub fn touch(&mut self, now: u64) {
        if now > self.last_seen {
            self.last_seen = now;
        }
    }

    #[inline(always)]
    pub fn add_ipv4(&mut self, addr: [u8; 4]) -> Insert {
        insert_capped(&mut self.ipv4, &mut self.ipv4_count, addr)
    }

    #[inline(always)]
    pub fn add_ipv6(&mut self, addr: [u8; 16]) -> Insert {
        insert_capped(&mut self.ipv6, &mut self.ipv6_count, addr)
    }

    /// Active IPv4 slots. A corrupt count is clamped to the slot array.
    pub fn ipv4_addrs(&self) -> &[[u8; 4]] {
        &self.ipv4[..clamp_count(self.ipv4_count)]
    }

    /// Active IPv6 slots. A corrupt count is clamped to the slot array.
    pub fn ipv6_addrs(&self) -> &[[u8; 16]] {
        &self.ipv6[..clamp_count(self.ipv6_count)]
    }
}

#[inline(always)]
fn clamp_count(count: u8) -> usize {
    let count = count as usize;
    if count > MAX_ADDRS { MAX_ADDRS } else { count }
}

// Duplicate check comes before the capacity check: re-announcing a known
// address on a full entry is a no-op, not a drop.
#[inline(always)]
fn insert_capped<const N: usize>(
    slots: &mut [[u8; N]; MAX_ADDRS],
    count: &mut u8,
    addr: [u8; N],
) -> Insert {
    let used = clamp_count(*count);
    for slot in slots.iter().take(used) {
        if *slot == addr {
            return Insert::Duplicate;
        }
    }
    if used >= MAX_ADDRS {
        return Insert::Full;
    }
    slots[used] = addr;
    *count = used as u8 + 1;
    Insert::Added
}
