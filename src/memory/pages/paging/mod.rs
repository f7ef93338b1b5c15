use crate::config::ADDRESS_SPACE_CLONE_SCRATCH_ADDR;
use crate::memory::cr3::CR3;
use crate::memory::{frames::{Frame, FrameAllocator}, MemoryError, PhysicalAddress, VirtualAddress, FRAME_PAGE_SIZE};
use super::{page_table::{page_table_entry::EntryFlags, Level4, Table, ENTRY_COUNT, P4}, Page};
use core::{arch::asm, marker::PhantomData, ptr::NonNull};

/*
 * Safety: Raw pointers are not Send/Sync so `ActivePagingContext` cannot be used between threads as it would cause data races.
 */
pub struct ActivePagingContext {
    p4: NonNull<Table<Level4>>,

    // makes this struct `own` a `Table<Level4>`
    _marker: PhantomData<Table<Level4>>,
}

impl ActivePagingContext {
    /*
     * Safety: This should be unsafe because the p4 addr will always be the same (at least for now),
     * and that means that creating multiple `ActivePagingContext` objects could result in undefined behaviour
     * as all the objects would be pointing to the same memory (and own it).
     */
    pub unsafe fn new() -> Self {
        ActivePagingContext {
            // this can be unchecked as we know that the ptr is non null
            p4: unsafe { NonNull::new_unchecked(P4) },
            _marker: PhantomData,
        }
    }

    /// Plants the C2 recursive self-reference: `entries[511]` of the live
    /// PML4 is made to point at its own frame, so that [`P4`] and the
    /// `next_table`-derived P3/P2/P1 addresses resolve correctly for every
    /// later `map`/`unmap`/`page_fault`/`clone_address_space` call.
    ///
    /// The out-of-scope bootstrap chain (SPEC_FULL §1) is trusted to have
    /// already built the first 2 MiB's identity and higher-half mapping and
    /// loaded its root into CR3, but it plants no recursive entry — nothing
    /// in that tree is self-referential yet. This reaches the live PML4
    /// directly through the identity map (its frame, like every table the
    /// bootstrap built, lies in the first 2 MiB) rather than rebuilding the
    /// tree from scratch, since the mapping it would rebuild already exists.
    ///
    /// # Safety
    ///
    /// Must run exactly once, before the first `ActivePagingContext::new`
    /// that is actually used to `map`/`unmap`/`page_fault` — every one of
    /// those walks the recursive window this installs.
    pub unsafe fn init() {
        let p4_phys = CR3::get();
        let p4_frame = Frame::from_phy_addr(p4_phys);
        let table = unsafe { &mut *(p4_phys as *mut Table<Level4>) };
        table.entries[ENTRY_COUNT - 1].set(p4_frame, EntryFlags::PRESENT | EntryFlags::WRITABLE);
        CR3::invalidate_all();
    }

    fn p4(&self) -> &Table<Level4> {
        unsafe { self.p4.as_ref() }
    }

    fn p4_mut(&mut self) -> &mut Table<Level4> {
        unsafe { self.p4.as_mut() }
    }

    /// Walks PML4→PT via the recursive window, allocating a fresh frame for
    /// any absent intermediate table, then installs `frame` at the leaf.
    /// Idempotent if the leaf already maps `frame` with the same `flags`;
    /// fails with [`MemoryError::PageAlreadyMapped`] otherwise.
    pub fn map_page_to_frame(&mut self, page: Page, frame: Frame, frame_allocator: &dyn FrameAllocator, flags: EntryFlags) -> Result<(), MemoryError> {
        let p4 = self.p4_mut();
        let p3 = p4.create_next_table(page.p4_index(), frame_allocator)?;
        let p2 = p3.create_next_table(page.p3_index(), frame_allocator)?;
        let p1 = p2.create_next_table(page.p2_index(), frame_allocator)?;

        let entry = &mut p1.entries[page.p1_index()];
        if entry.is_used() {
            let compatible = entry.pointed_frame() == Some(frame) && entry.flags().contains(EntryFlags::PRESENT);
            return if compatible { Ok(()) } else { Err(MemoryError::PageAlreadyMapped) };
        }

        entry.set(frame, flags | EntryFlags::PRESENT);
        Ok(())
    }

    pub fn map_page(&mut self, page: Page, frame_allocator: &dyn FrameAllocator, flags: EntryFlags) -> Result<(), MemoryError> {
        let frame = frame_allocator.allocate_frame()?;
        self.map_page_to_frame(page, frame, frame_allocator, flags)
    }

    pub fn map(&mut self, virtual_addr: VirtualAddress, frame_allocator: &dyn FrameAllocator, flags: EntryFlags) -> Result<(), MemoryError> {
        let page = Page::from_virt_addr(virtual_addr)?;
        self.map_page(page, frame_allocator, flags)
    }

    /// Same algorithm as [`Self::map`], but always materializes a brand new
    /// frame rather than accepting a caller-supplied one — the path the page
    /// fault handler drives to fill in a previously untouched page.
    pub fn page_fault(&mut self, virtual_addr: VirtualAddress, frame_allocator: &dyn FrameAllocator, flags: EntryFlags) -> Result<(), MemoryError> {
        self.map(virtual_addr, frame_allocator, flags)
    }

    /*
     * This will unmap a page and the respective frame.
     * Intermediate tables (P2/P3) are never freed in this kernel — an
     * accepted simplification.
     */
    pub fn unmap_page(&mut self, page: Page, frame_allocator: &dyn FrameAllocator) -> Result<(), MemoryError> {
        let frame = self.p4_mut().next_table(page.p4_index())
            .and_then(|p3| p3.next_table_mut(page.p3_index()))
            .and_then(|p2| p2.next_table_mut(page.p2_index()))
            .and_then(|p1| {
                let entry = &mut p1.entries[page.p1_index()];
                let frame = entry.pointed_frame();
                entry.set_unused();
                frame
            })
            .ok_or(MemoryError::PageNotMapped)?;

        unsafe {
            asm!("invlpg [{}]", in(reg) page.addr() as u64, options(nostack, preserves_flags));
        }

        frame_allocator.deallocate_frame(frame)
    }

    /*
     * This takes a Page and returns the respective Frame if the address is mapped.
     */
    fn translate_page(&self, page: Page) -> Option<Frame> {
        self.p4().next_table(page.p4_index())
            .and_then(|p3| p3.next_table(page.p3_index()))
            .and_then(|p2| p2.next_table(page.p2_index()))
            .and_then(|p1| p1.entries[page.p1_index()].pointed_frame())
    }

    /*
     * Takes a virtual address and returns the respective physical address if it exists (if it is mapped).
     */
    pub fn translate(&self, virtual_addr: VirtualAddress) -> Result<Option<PhysicalAddress>, MemoryError> {
        let offset = virtual_addr % FRAME_PAGE_SIZE;
        let page = Page::from_virt_addr(virtual_addr)?;

        Ok(self.translate_page(page).map(|frame| frame.addr() + offset))
    }

    /// Allocates a new PML4, copies the active one's 512 entries into it,
    /// then fixes entry 511 to self-reference the new frame so the copy is
    /// recursively mapped too. Returns the new root's physical address.
    ///
    /// All lower-level tables remain shared between the two address
    /// spaces — acceptable since this kernel's per-task differences are
    /// limited to the user regions (see the frame-ownership open question in
    /// DESIGN.md).
    pub fn clone_address_space(&mut self, frame_allocator: &dyn FrameAllocator) -> Result<PhysicalAddress, MemoryError> {
        let new_p4_frame = frame_allocator.allocate_frame()?;
        let scratch_page = Page::from_virt_addr(ADDRESS_SPACE_CLONE_SCRATCH_ADDR)?;

        self.map_page_to_frame(scratch_page, new_p4_frame, frame_allocator, EntryFlags::PRESENT | EntryFlags::WRITABLE)?;

        unsafe {
            let new_table = &mut *(scratch_page.addr() as *mut Table<Level4>);
            new_table.entries.copy_from_slice(&self.p4().entries);
            new_table.entries[ENTRY_COUNT - 1].set(new_p4_frame, EntryFlags::PRESENT | EntryFlags::WRITABLE);
        }

        self.unmap_scratch_without_freeing(scratch_page);
        Ok(new_p4_frame.addr())
    }

    /// Clears the scratch mapping used while building a new address space
    /// without releasing the frame it pointed at — the new PML4 must stay
    /// alive after the scratch window is torn down.
    fn unmap_scratch_without_freeing(&mut self, page: Page) {
        if let Some(p1) = self.p4_mut().next_table(page.p4_index())
            .and_then(|p3| p3.next_table_mut(page.p3_index()))
            .and_then(|p2| p2.next_table_mut(page.p2_index()))
        {
            p1.entries[page.p1_index()].set_unused();
        }

        unsafe {
            asm!("invlpg [{}]", in(reg) page.addr() as u64, options(nostack, preserves_flags));
        }
    }
}
