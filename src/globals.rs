//! Process-wide singletons that must live for the whole kernel lifetime at a
//! fixed, known address: the physical frame allocator (kept from the
//! teacher), and the privileged CPU tables the boot path installs once and
//! the scheduler mutates afterward (TSS.rsp0 on every context switch).

use lazy_static::lazy_static;
use spin::Mutex;

use crate::interrupts::gdt::GDT as GdtTable;
use crate::interrupts::tss::TSS as TssTable;
use crate::interrupts::InterruptDescriptorTable;
use crate::memory::frames::{bitmap_frame_allocator::BitmapFrameAllocator, GlobalFrameAllocator};

static BITMAP_FA: BitmapFrameAllocator = BitmapFrameAllocator::new();
pub static FRAME_ALLOCATOR: GlobalFrameAllocator = GlobalFrameAllocator::new(&BITMAP_FA);

/// Initializes the concrete [`BitmapFrameAllocator`] backing
/// [`FRAME_ALLOCATOR`]. Not part of the [`crate::memory::frames::FrameAllocator`]
/// trait, so this reaches `BITMAP_FA` directly rather than through the
/// trait-object wrapper.
///
/// # Safety
///
/// See [`BitmapFrameAllocator::init`].
pub unsafe fn init_frame_allocator(
    kernel_phys_end: crate::memory::PhysicalAddress,
    memory_map: &[crate::boot_info::MemoryMapEntry],
) -> Result<(), crate::memory::MemoryError> {
    unsafe { BITMAP_FA.init(kernel_phys_end, memory_map) }
}

/// Starts tracking which region owns each allocated frame. Call once the
/// heap is up; see [`BitmapFrameAllocator::enable_tracking`].
pub fn enable_frame_tracking() {
    BITMAP_FA.enable_tracking();
}

lazy_static! {
    /// The kernel's sole GDT. Built once by `lib.rs::kernel_main` before the
    /// first `lgdt`; read-only afterward.
    pub static ref GDT: Mutex<GdtTable> = Mutex::new(GdtTable::new());

    /// The kernel's sole TSS. `rsp0` is rewritten on every context switch
    /// (see [`crate::task::switch`]), so this stays behind a lock even
    /// though there is only ever one core to contend with.
    pub static ref TSS: Mutex<TssTable> = Mutex::new(TssTable::new());

    /// The kernel's sole IDT. Every gate is installed once during boot;
    /// `lidt` only ever needs to run once.
    pub static ref IDT: Mutex<InterruptDescriptorTable> = Mutex::new(InterruptDescriptorTable::new());
}

/// Extends a reference borrowed from one of this module's lazy-static locks
/// to `'static`.
///
/// # Safety
///
/// Sound only for the statics declared in this module: their backing storage
/// really is `'static` (lazy_static's `OnceCell`), so the lifetime the
/// `MutexGuard` attaches is strictly more conservative than the truth. This
/// exists because `GDT::load`/`InterruptDescriptorTable::load`/
/// `SegmentDescriptor::set_base` all need `&'static` to hand the CPU a
/// pointer it will dereference for as long as the table stays loaded, which
/// is forever in this kernel.
pub unsafe fn extend_to_static<T>(r: &T) -> &'static T {
    unsafe { &*(r as *const T) }
}
