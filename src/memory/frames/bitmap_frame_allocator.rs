//! C1: a bitmap frame allocator over the BIOS-reported usable regions.
//!
//! One [`BitmapRefMut`] per usable region tracks its frames, one bit each.
//! The region descriptors themselves are a fixed-capacity array living in
//! the kernel's own BSS (so, per SPEC_FULL's "immediately after the kernel
//! image" placement, they are already part of the image); the bitmaps they
//! point at are sized only once the BIOS memory map is known, so `init`
//! carves them out of physical memory starting right after the kernel's
//! last byte.

use crate::boot_info::MemoryMapEntry;
use crate::data_structures::bitmap_ref_mut::BitmapRefMut;
use crate::data_structures::intrusive_list::IntrusiveList;
use crate::memory::{AddrOps, MemoryError, PhysicalAddress, FRAME_PAGE_SIZE};
use spin::Mutex;

use super::{Frame, FrameAllocator};

/// Upper bound on the number of usable regions a BIOS memory map reports.
/// Real firmware rarely produces more than a handful.
const MAX_REGIONS: usize = 16;

/// Memory below this physical address is never handed out: real-mode IVT,
/// BIOS data area, and the fixed blocks [`crate::boot_info`] reads from.
const LOW_MEMORY_RESERVED: PhysicalAddress = 0x10_0000;

struct RegionDescriptor {
    phys_start: PhysicalAddress,
    frame_count: usize,
    free_count: usize,
    bitmap: Option<BitmapRefMut<'static>>,
}

impl RegionDescriptor {
    const EMPTY: RegionDescriptor = RegionDescriptor { phys_start: 0, frame_count: 0, free_count: 0, bitmap: None };
}

struct BitmapFrameAllocatorInner {
    regions: [RegionDescriptor; MAX_REGIONS],
    region_count: usize,
    initialized: bool,
    /// Maps an allocated frame index to the region that owns it, so
    /// `release` knows which bitmap to flip back. `None` until
    /// [`BitmapFrameAllocator::enable_tracking`] is called once the heap is
    /// up; frames allocated before then (the kernel image, this allocator's
    /// own bitmaps) are deliberately untracked and never reclaimed.
    tracking: Option<IntrusiveList<usize>>,
}

unsafe impl Send for BitmapFrameAllocatorInner {}

pub struct BitmapFrameAllocator(Mutex<BitmapFrameAllocatorInner>);

impl BitmapFrameAllocator {
    pub const fn new() -> Self {
        BitmapFrameAllocator(Mutex::new(BitmapFrameAllocatorInner {
            regions: [RegionDescriptor::EMPTY; MAX_REGIONS],
            region_count: 0,
            initialized: false,
            tracking: None,
        }))
    }

    /// Walks the BIOS memory map, carves a bitmap for each usable region out
    /// of physical memory starting at `kernel_phys_end`, and pre-allocates
    /// the frames the kernel image and those bitmaps themselves occupy.
    ///
    /// # Safety
    ///
    /// Must be called exactly once, before anything else touches physical
    /// memory above `kernel_phys_end`: the space `init` carves out for
    /// bitmaps is computed, not reserved in the memory map.
    pub unsafe fn init(&self, kernel_phys_end: PhysicalAddress, memory_map: &[MemoryMapEntry]) -> Result<(), MemoryError> {
        let mut inner = self.0.lock();
        assert!(!inner.initialized, "frame allocator double-initialized");

        let meta_start = kernel_phys_end.align_up(FRAME_PAGE_SIZE);
        let mut cursor = meta_start;
        let mut region_count = 0usize;

        for entry in memory_map.iter() {
            if !entry.is_usable() || region_count == MAX_REGIONS {
                continue;
            }

            let raw_start = entry.start as usize;
            let raw_end = raw_start + entry.size as usize;
            let start = raw_start.max(LOW_MEMORY_RESERVED).align_up(FRAME_PAGE_SIZE);
            if start >= raw_end {
                continue;
            }
            let frame_count = (raw_end - start) / FRAME_PAGE_SIZE;
            if frame_count == 0 {
                continue;
            }

            let bitmap_len = frame_count.div_ceil(8);
            let bitmap = unsafe { BitmapRefMut::from_raw_parts_mut(cursor as *mut u8, bitmap_len, Some(frame_count)) };
            cursor += bitmap_len;

            inner.regions[region_count] = RegionDescriptor {
                phys_start: start,
                frame_count,
                free_count: frame_count,
                bitmap: Some(bitmap),
            };
            region_count += 1;
        }

        inner.region_count = region_count;
        inner.initialized = true;
        let meta_end = cursor.align_up(FRAME_PAGE_SIZE);
        drop(inner);

        // Pre-allocate the leading run of frames covering [start-of-region-0,
        // meta_end): the kernel image plus the bitmaps just carved out of it.
        // This relies on region 0 beginning at or below `kernel_phys_end`,
        // true for every BIOS map this kernel boots from (usable RAM starts
        // at the 1 MiB mark, exactly where the kernel is loaded).
        let first_region_start = self.0.lock().regions[0].phys_start;
        let to_reserve = (meta_end - first_region_start) / FRAME_PAGE_SIZE;
        for _ in 0..to_reserve {
            self.allocate_frame()?;
        }

        Ok(())
    }

    /// Starts recording which region owns each allocated frame, enabling
    /// [`FrameAllocator::deallocate_frame`]. Call once the heap allocator is
    /// up; the list itself needs the allocator.
    pub fn enable_tracking(&self) {
        let mut inner = self.0.lock();
        if inner.tracking.is_none() {
            inner.tracking = Some(IntrusiveList::new());
        }
    }
}

impl FrameAllocator for BitmapFrameAllocator {
    fn allocate_frame(&self) -> Result<Frame, MemoryError> {
        let mut inner = self.0.lock();
        assert!(inner.initialized, "frame allocator used before init");

        for region_idx in 0..inner.region_count {
            let region = &mut inner.regions[region_idx];
            if region.free_count == 0 {
                continue;
            }

            let bitmap = region.bitmap.as_mut().expect("initialized region always has a bitmap");
            let Some(bit) = bitmap.first_unset() else {
                continue;
            };

            bitmap.set(bit, true);
            region.free_count -= 1;
            let frame_index = region.phys_start / FRAME_PAGE_SIZE + bit;

            if let Some(tracking) = inner.tracking.as_mut() {
                tracking.push_back(frame_index, region_idx);
            }

            return Ok(Frame::from_index(frame_index));
        }

        Err(MemoryError::NotEnoughPhysicalMemory)
    }

    fn deallocate_frame(&self, frame: Frame) -> Result<(), MemoryError> {
        let mut inner = self.0.lock();

        let region_idx = inner
            .tracking
            .as_mut()
            .ok_or(MemoryError::FrameNotTracked)?
            .remove(frame.index())
            .ok_or(MemoryError::FrameNotTracked)?;

        let region = &mut inner.regions[region_idx];
        let bit = frame.index() - region.phys_start / FRAME_PAGE_SIZE;
        let bitmap = region.bitmap.as_mut().expect("tracked region always has a bitmap");

        if bitmap.get(bit) != Some(true) {
            return Err(MemoryError::DoubleFree);
        }

        bitmap.set(bit, false);
        region.free_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_info::MemoryMapEntry;

    const USABLE: u32 = 1;

    fn single_region_map(start: u64, size: u64) -> [MemoryMapEntry; 1] {
        [MemoryMapEntry { start, size, region_type: USABLE, reserved: 0 }]
    }

    #[test]
    fn allocates_then_exhausts_a_small_region() {
        let fa = BitmapFrameAllocator::new();
        // One region of exactly 3 frames above the kernel/metadata, after
        // pre-allocation the allocator itself consumes to host its bitmap.
        let map = single_region_map(0x10_0000, FRAME_PAGE_SIZE as u64 * 8);
        unsafe { fa.init(0x10_0000, &map).unwrap() };

        let mut got = alloc::vec::Vec::new();
        loop {
            match fa.allocate_frame() {
                Ok(f) => got.push(f),
                Err(MemoryError::NotEnoughPhysicalMemory) => break,
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }
        assert!(!got.is_empty());
        assert!(fa.allocate_frame().is_err());
    }

    #[test]
    fn release_without_tracking_is_rejected() {
        let fa = BitmapFrameAllocator::new();
        let map = single_region_map(0x10_0000, FRAME_PAGE_SIZE as u64 * 16);
        unsafe { fa.init(0x10_0000, &map).unwrap() };

        let frame = fa.allocate_frame().unwrap();
        assert_eq!(fa.deallocate_frame(frame), Err(MemoryError::FrameNotTracked));
    }

    #[test]
    fn release_with_tracking_frees_the_bit_for_reuse() {
        let fa = BitmapFrameAllocator::new();
        let map = single_region_map(0x10_0000, FRAME_PAGE_SIZE as u64 * 16);
        unsafe { fa.init(0x10_0000, &map).unwrap() };
        fa.enable_tracking();

        let frame = fa.allocate_frame().unwrap();
        fa.deallocate_frame(frame).unwrap();
        let reused = fa.allocate_frame().unwrap();
        assert_eq!(frame, reused);

        assert_eq!(fa.deallocate_frame(frame), Err(MemoryError::FrameNotTracked));
    }
}
