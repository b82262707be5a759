//! TC ingress program for passive neighbour discovery
//!
//! Attached to the ingress path of every monitored interface. Each frame is
//! handed to the shared classifier, which records ARP/NDP observations into
//! the NEIGHBOURS map. The program never changes a frame's fate.

#![no_std]
#![no_main]

use aya_ebpf::{
    bindings::BPF_NOEXIST,
    helpers::bpf_ktime_get_boot_ns,
    macros::{classifier, map},
    maps::HashMap,
    programs::TcContext,
};

use l2radar_common::{
    Frame, MacKey, NEIGHBOURS_MAX_ENTRIES, NeighbourEntry, NeighbourTable, classify,
};

/// Neighbour table, keyed by MAC. Pinned by userspace after load.
#[map]
static NEIGHBOURS: HashMap<MacKey, NeighbourEntry> =
    HashMap::with_max_entries(NEIGHBOURS_MAX_ENTRIES, 0);

/// skb bytes via bpf_skb_load_bytes
struct TcFrame<'a> {
    ctx: &'a TcContext,
}

impl Frame for TcFrame<'_> {
    #[inline(always)]
    fn len(&self) -> usize {
        self.ctx.len() as usize
    }

    #[inline(always)]
    fn load<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        self.ctx.load::<[u8; N]>(offset).ok()
    }
}

struct KernelTable;

impl NeighbourTable for KernelTable {
    #[inline(always)]
    fn entry(&mut self, mac: &MacKey, now: u64) -> Option<&mut NeighbourEntry> {
        if let Some(ptr) = NEIGHBOURS.get_ptr_mut(mac) {
            return unsafe { ptr.as_mut() };
        }

        // Another CPU may win the insert; NOEXIST makes that harmless and
        // the lookup below picks up whichever entry landed.
        let _ = NEIGHBOURS.insert(mac, &NeighbourEntry::new(now), BPF_NOEXIST as u64);
        let ptr = NEIGHBOURS.get_ptr_mut(mac)?;
        unsafe { ptr.as_mut() }
    }
}

#[classifier]
pub fn l2radar(ctx: TcContext) -> i32 {
    let now = unsafe { bpf_ktime_get_boot_ns() };
    classify(&TcFrame { ctx: &ctx }, &mut KernelTable, now)
}

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}
