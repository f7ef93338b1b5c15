pub mod bitmap_frame_allocator;

use super::{MemoryError, PhysicalAddress, FRAME_PAGE_SIZE};
use core::ops::Deref;

/// A physical 4 KiB frame, identified by its index (not its address) so
/// that the bitmap allocator can use it directly as a bit position.
#[repr(transparent)]
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
pub struct Frame(usize);

impl Frame {
    pub fn from_index(idx: usize) -> Frame {
        Frame(idx)
    }

    pub fn from_phy_addr(addr: PhysicalAddress) -> Frame {
        Frame(addr / FRAME_PAGE_SIZE)
    }

    pub fn index(&self) -> usize {
        self.0
    }

    pub fn addr(&self) -> PhysicalAddress {
        self.0 * FRAME_PAGE_SIZE
    }
}

/// The C1 contract: hand out and reclaim 4 KiB physical frames.
///
/// Implementations are reached through a `spin::Mutex`-guarded singleton, so
/// the trait takes `&self` rather than `&mut self`.
pub trait FrameAllocator: Send + Sync {
    fn allocate_frame(&self) -> Result<Frame, MemoryError>;
    fn deallocate_frame(&self, frame: Frame) -> Result<(), MemoryError>;
}

/// Thin `Deref`-to-trait-object wrapper so call sites can write
/// `FRAME_ALLOCATOR.allocate_frame()` without caring which concrete
/// allocator backs it.
pub struct GlobalFrameAllocator {
    fa: &'static dyn FrameAllocator,
}

impl GlobalFrameAllocator {
    pub const fn new(fa: &'static dyn FrameAllocator) -> Self {
        GlobalFrameAllocator { fa }
    }
}

impl Deref for GlobalFrameAllocator {
    type Target = dyn FrameAllocator;

    fn deref(&self) -> &Self::Target {
        self.fa
    }
}

unsafe impl Send for GlobalFrameAllocator {}
unsafe impl Sync for GlobalFrameAllocator {}
