use crate::assert_called_once;
use crate::boot_info::BiosInfoBlock;
use crate::config::KERNEL_PHYS_BASE;
use crate::data_structures::mapped_rwlockreadguard::MappedRwLockReadGuard;
use crate::memory::{AddrOps, MemoryError, PhysicalAddress, ProhibitedMemoryRange, FRAME_PAGE_SIZE};
use core::ops::Deref;
use spin::RwLock;

/// How many [`ProhibitedMemoryRange`]s [`Kernel::prohibited_memory_ranges`]
/// reports: the NULL page and the kernel image. The BIOS info block and its
/// memory map array sit below [`KERNEL_PHYS_BASE`], already outside every
/// usable region the frame allocator ever considers (see
/// `LOW_MEMORY_RESERVED` in `memory::frames::bitmap_frame_allocator`), so
/// they don't need a range of their own here.
pub const KERNEL_PROHIBITED_MEM_RANGES_LEN: usize = 2;

pub static KERNEL: Kernel = Kernel(RwLock::new(KernelInner {
    k_start: 0,
    k_end: 0,
    bios_info: None,
    initialized: false,
}));

struct KernelInner {
    // kernel image (physical addrs)
    k_start: usize,
    k_end: usize,

    bios_info: Option<BiosInfoBlock>,
    initialized: bool,
}

pub struct Kernel(RwLock<KernelInner>);

impl KernelInner {
    /// `kernel_size` is the value `kernel_main` receives in RDI per
    /// SPEC_FULL §6's entry contract: the loaded kernel's size in bytes,
    /// loaded at the fixed physical base [`KERNEL_PHYS_BASE`].
    unsafe fn new(kernel_size: usize) -> Self {
        let bios_info = unsafe { BiosInfoBlock::read() };

        let k_start = KERNEL_PHYS_BASE;
        let k_end = (KERNEL_PHYS_BASE + kernel_size).align_up(FRAME_PAGE_SIZE) - 1;

        crate::serial_println!("kernel start: {:#x}, kernel end: {:#x}", k_start, k_end);

        KernelInner { k_start, k_end, bios_info: Some(bios_info), initialized: true }
    }

    /// All the memory ranges that **must be left untouched** meaning that
    /// these regions cannot be used for allocations in the physical (frame
    /// allocator) memory space.
    ///
    /// These ranges live in available RAM.
    ///
    /// There are no order guarantees for the memory ranges.
    fn prohibited_memory_ranges(&self) -> [ProhibitedMemoryRange; KERNEL_PROHIBITED_MEM_RANGES_LEN] {
        [
            ProhibitedMemoryRange::new(0, FRAME_PAGE_SIZE - 1), // to avoid problems with NULL ptrs and detect NULL derefs
            ProhibitedMemoryRange::new(self.k_start, self.k_end),
        ]
    }
}

impl Kernel {
    /// Initializes the Kernel main structure.
    ///
    /// # Safety
    ///
    /// Must run exactly once, first thing in `kernel_main`, before the frame
    /// allocator or anything else repurposes low memory (see
    /// [`BiosInfoBlock::read`]'s own safety contract).
    ///
    /// # Panics
    ///
    /// If called more than once.
    pub unsafe fn init(&self, kernel_size: usize) {
        assert_called_once!("Cannot call Kernel::init() more than once");
        *self.0.write() = unsafe { KernelInner::new(kernel_size) };
    }

    /// This checks if the kernel's `prohibited_memory_ranges()` sit fully
    /// inside memory the BIOS reports as usable, i.e. that the layout
    /// SPEC_FULL §6 assumes (kernel loaded into ordinary usable RAM) holds
    /// for real on this machine.
    ///
    /// If any range spills outside usable RAM,
    /// `Err(`[`MemoryError::BadMemoryPlacement`]`)` is returned.
    pub fn check_placements(&self) -> Result<(), MemoryError> {
        let inner = &*self.0.read();
        assert!(inner.initialized);

        let memory_map = inner.bios_info.as_ref().unwrap().memory_map();

        let all_covered = inner.prohibited_memory_ranges().iter().all(|range| {
            memory_map.iter().any(|entry| {
                entry.is_usable()
                    && (entry.start as usize) <= range.start_addr()
                    && range.end_addr() < entry.start as usize + entry.size as usize
            })
        });

        if !all_covered {
            return Err(MemoryError::BadMemoryPlacement);
        }

        Ok(())
    }

    /// Kernel image start address in physical memory.
    pub fn k_start(&self) -> PhysicalAddress {
        let inner = &*self.0.read();
        assert!(inner.initialized);
        inner.k_start
    }

    /// Kernel image end address in physical memory (inclusive).
    pub fn k_end(&self) -> PhysicalAddress {
        let inner = &*self.0.read();
        assert!(inner.initialized);
        inner.k_end
    }

    // the impl Deref "hides" the KernelInner type
    pub fn bios_info(&self) -> impl Deref<Target = BiosInfoBlock> {
        let inner = self.0.read();
        assert!(inner.initialized);
        MappedRwLockReadGuard::new(inner, |data| data.bios_info.as_ref().unwrap())
    }

    /// All the memory ranges that **must be left untouched** meaning that
    /// these regions cannot be used for allocations in the physical (frame
    /// allocator) memory space.
    ///
    /// These ranges live in available RAM.
    ///
    /// There are no order guarantees for the memory ranges.
    pub fn prohibited_memory_ranges(&self) -> [ProhibitedMemoryRange; KERNEL_PROHIBITED_MEM_RANGES_LEN] {
        let inner = &*self.0.read();
        assert!(inner.initialized);
        inner.prohibited_memory_ranges()
    }
}
