//! Fixed-offset BIOS info block and memory map (SPEC_FULL §6), in place of a
//! multiboot2 tag stream.
//!
//! Unlike multiboot2's self-describing, variably-sized tag list (which
//! needs `ptr_meta` to view as a DST), this wire format is two fixed-size
//! C structs written by the out-of-scope bootstrap chain before the
//! kernel's entry point runs: a small info block, and a flat array of
//! memory map entries it points at. Both live in low memory, below the
//! identity-mapped first 2 MiB, so they can be read with plain pointer
//! casts before paging or the heap exist.

use crate::config::{BIOS_INFO_BLOCK_ADDR, BIOS_MEMORY_MAP_ADDR, BIOS_MEMORY_MAP_MAX_ENTRIES};
use crate::memory::PhysicalAddress;

/// A single BIOS `int 0x15, eax=0xe820` style memory map record.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct MemoryMapEntry {
    pub start: u64,
    pub size: u64,
    pub region_type: u32,
    pub reserved: u32,
}

/// Region types as reported by the BIOS memory map (§6: "Type 1 = usable").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionType {
    Usable,
    Reserved,
    Other(u32),
}

impl MemoryMapEntry {
    pub fn region_type(&self) -> RegionType {
        match self.region_type {
            1 => RegionType::Usable,
            2 => RegionType::Reserved,
            other => RegionType::Other(other),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.region_type() == RegionType::Usable
    }
}

/// The fixed-offset BIOS info block.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
struct RawBiosInfoBlock {
    date_time: u64,
    memory_map_count: u32,
    max_memory_kib: u64,
    available_frames: u32,
    memory_map_ptr: u64,
}

/// Owned, heap-free snapshot of the BIOS info block, copied out of low
/// memory at boot before the frame allocator might repurpose the page it
/// lives on.
#[derive(Clone, Copy, Debug)]
pub struct BiosInfoBlock {
    pub date_time: u64,
    pub max_memory_kib: u64,
    pub available_frames: u32,
    entries: [MemoryMapEntry; BIOS_MEMORY_MAP_MAX_ENTRIES],
    entry_count: usize,
}

impl BiosInfoBlock {
    /// Reads the info block and memory map out of their fixed physical
    /// offsets.
    ///
    /// # Safety
    ///
    /// Must be called exactly once, before the frame allocator repurposes
    /// any memory below 2 MiB, and only while the first 2 MiB remain
    /// identity-mapped (true at kernel entry per SPEC_FULL §4.2).
    pub unsafe fn read() -> Self {
        let raw = unsafe { &*(BIOS_INFO_BLOCK_ADDR as *const RawBiosInfoBlock) };
        let count = (raw.memory_map_count as usize).min(BIOS_MEMORY_MAP_MAX_ENTRIES);

        let map_addr = if raw.memory_map_ptr == 0 {
            BIOS_MEMORY_MAP_ADDR as PhysicalAddress
        } else {
            raw.memory_map_ptr as PhysicalAddress
        };
        let src = unsafe { core::slice::from_raw_parts(map_addr as *const MemoryMapEntry, count) };

        let mut entries = [MemoryMapEntry { start: 0, size: 0, region_type: 0, reserved: 0 }; BIOS_MEMORY_MAP_MAX_ENTRIES];
        entries[..count].copy_from_slice(src);

        BiosInfoBlock {
            date_time: raw.date_time,
            max_memory_kib: raw.max_memory_kib,
            available_frames: raw.available_frames,
            entries,
            entry_count: count,
        }
    }

    pub fn memory_map(&self) -> &[MemoryMapEntry] {
        &self.entries[..self.entry_count]
    }
}
