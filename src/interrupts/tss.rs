// https://wiki.osdev.org/Task_State_Segment
use crate::memory::{VirtualAddress, FRAME_PAGE_SIZE};

/// Which stack-pointer slot [`TSS::new_stack`] carves a stack into: the three
/// privilege-level stacks used on a ring-3→ring-0 transition, plus the seven
/// Interrupt Stack Table entries exception handlers can be pinned to.
#[repr(u8)]
#[derive(Clone, Copy)]
pub enum TssStackNumber {
    Rsp0 = 0,
    Rsp1 = 1,
    Rsp2 = 2,
    TssStack1 = 3,
    TssStack2 = 4,
    TssStack3 = 5,
    TssStack4 = 6,
    TssStack5 = 7,
    TssStack6 = 8,
    TssStack7 = 9,
}

const STACK_SLOTS: usize = 10;
const MAX_STACK_PAGES: usize = 8;

/// Static backing storage for every stack a TSS slot can point at. A real
/// frame-allocator-backed stack would need the VMM up first; these slots
/// exist before that, so they live in the kernel's own BSS instead.
static mut STACK_POOL: [[u8; MAX_STACK_PAGES * FRAME_PAGE_SIZE]; STACK_SLOTS] =
    [[0; MAX_STACK_PAGES * FRAME_PAGE_SIZE]; STACK_SLOTS];

// TODO: rsp# are also virtual addrs (stack pointers) so, should they be of the type VirtualAddress?
// https://wiki.osdev.org/Task_State_Segment#Long_Mode
#[repr(C, packed)]
pub struct TSS {
    reserved_0: u32,
    rsp0: u64,
    rsp1: u64,
    rsp2: u64,
    reserved_1: u32,
    reserved_2: u32,
    ist: [VirtualAddress; 7],
    reserved_3: u32,
    reserved_4: u32,
    reserved_5: u16,
    iopb: u16,
}

impl TSS {
    /// Creates a new, completely zeroed out, TSS struct.
    pub const fn new() -> Self {
        TSS {
            reserved_0: 0,
            rsp0: 0,
            rsp1: 0,
            rsp2: 0,
            reserved_1: 0,
            reserved_2: 0,
            ist: [0; 7],
            reserved_3: 0,
            reserved_4: 0,
            reserved_5: 0,
            iopb: 0,
        }
    }

    /// Carves `pages` pages out of the static stack pool for `which` slot,
    /// stores the top of the stack (stacks grow down) in that field, and
    /// returns the address so the caller can reuse it (e.g. as the first
    /// kernel task's stack pointer).
    pub fn new_stack(&mut self, which: TssStackNumber, pages: usize, zero: bool) -> VirtualAddress {
        assert!(pages >= 1 && pages <= MAX_STACK_PAGES);

        let bytes = pages * FRAME_PAGE_SIZE;
        let index = which as usize;

        // Safety: each `TssStackNumber` slot is only ever wired into one TSS.
        let stack = unsafe { &mut (*core::ptr::addr_of_mut!(STACK_POOL))[index] };
        if zero {
            stack[..bytes].fill(0);
        }

        let top = stack.as_ptr() as VirtualAddress + bytes;
        match which {
            TssStackNumber::Rsp0 => self.rsp0 = top as u64,
            TssStackNumber::Rsp1 => self.rsp1 = top as u64,
            TssStackNumber::Rsp2 => self.rsp2 = top as u64,
            _ => self.ist[index - TssStackNumber::TssStack1 as usize] = top,
        }

        top
    }

    /// Updates the ring-0 stack pointer used whenever a ring-3 task traps
    /// into the kernel; the scheduler calls this on every context switch.
    pub fn set_rsp0(&mut self, addr: VirtualAddress) {
        self.rsp0 = addr as u64;
    }

    pub fn rsp0(&self) -> VirtualAddress {
        self.rsp0 as VirtualAddress
    }
}

impl Default for TSS {
    fn default() -> Self {
        Self::new()
    }
}
