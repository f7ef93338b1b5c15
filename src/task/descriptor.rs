//! The C6 task descriptor: a flat record of every preserved x86_64 register
//! plus the scheduling metadata that rides alongside it.
//!
//! `gp` is placed directly before `frame` so the two fields together are
//! byte-for-byte the same stack shape [`crate::task::switch::context_switch_stub`]
//! builds with its `push`/`pop` prologue/epilogue: a [`GpRegisters`] block
//! immediately followed by an [`IretqFrame`] block, ascending in address.
//! [`crate::task::switch::enter_first_task`] exploits this directly: it
//! points `rsp` at `&desc.gp` and runs the stub's own pop-then-`iretq`
//! sequence against it instead of re-deriving the same 15 register moves by
//! hand.

use crate::interrupts::gdt;
use crate::memory::{cr3::CR3, VirtualAddress};
use crate::task::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Created,
    Runnable,
    Running,
    Waiting,
}

/// The five values an interrupt gate pushes onto the stack on entry, in the
/// order the CPU pushes them. `switch::restore_frame` overwrites exactly
/// this block on the kernel stack to redirect `iretq` at a different task.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct IretqFrame {
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// All 16 general-purpose registers, saved/restored verbatim by the switch
/// assembly. `r15` is not "general purpose" in this kernel's ABI — it always
/// holds this descriptor's own address while the task runs (see
/// [`TaskDescriptor::self_ptr`]) — but it is still saved/restored here like
/// any other register since the switch stub treats it uniformly.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct GpRegisters {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

/// The flat saved-context record described in SPEC_FULL §3. Laid out
/// `#[repr(C)]` so the offsets `switch.rs` hardcodes as asm immediates stay
/// meaningful; each of those offsets has a `const_assert`-style check next
/// to the asm that uses it (see `task::switch`).
#[repr(C)]
pub struct TaskDescriptor {
    /// Must precede `frame` with no other fields in between: together they
    /// mirror the stack layout `switch::context_switch_stub` builds (see the
    /// module doc comment above).
    pub gp: GpRegisters,
    pub frame: IretqFrame,
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
    pub cr3: u64,

    pub pid: Pid,
    pub kernel_stack_top: VirtualAddress,
    pub user_stack_top: Option<VirtualAddress>,
    pub switch_count: u64,
    pub status: TaskStatus,
}

impl TaskDescriptor {
    /// Builds a ring-0 task descriptor. `entry_fn`'s signature is `fn() ->
    /// !`: kernel tasks never return, same as [`kernel_main`](crate::kernel_main).
    pub fn new_kernel(pid: Pid, entry_fn: extern "C" fn() -> !, kernel_stack_top: VirtualAddress) -> Self {
        TaskDescriptor {
            frame: IretqFrame {
                rip: entry_fn as usize as u64,
                cs: gdt::KERNEL_CODE_SELECTOR as u64,
                rflags: 0x200, // IF=1, everything else clear
                rsp: kernel_stack_top as u64,
                ss: gdt::KERNEL_DATA_SELECTOR as u64,
            },
            gp: GpRegisters { rbp: kernel_stack_top as u64, ..GpRegisters::default() },
            ds: gdt::KERNEL_DATA_SELECTOR as u64,
            es: gdt::KERNEL_DATA_SELECTOR as u64,
            fs: gdt::KERNEL_DATA_SELECTOR as u64,
            gs: gdt::KERNEL_DATA_SELECTOR as u64,
            cr3: CR3::get() as u64,
            pid,
            kernel_stack_top,
            user_stack_top: None,
            switch_count: 0,
            status: TaskStatus::Created,
        }
    }

    /// Builds a ring-3 task descriptor. `entry_va` is a virtual address
    /// inside [`crate::config::USER_LOAD_WINDOW`] the loader already copied
    /// the executable into; segment selectors carry RPL=3 (baked into
    /// [`gdt::USER_CODE_SELECTOR`]/[`gdt::USER_DATA_SELECTOR`] already).
    pub fn new_user(pid: Pid, entry_va: VirtualAddress, kernel_stack_top: VirtualAddress, user_stack_top: VirtualAddress) -> Self {
        TaskDescriptor {
            frame: IretqFrame {
                rip: entry_va as u64,
                cs: gdt::USER_CODE_SELECTOR as u64,
                rflags: 0x200,
                rsp: user_stack_top as u64,
                ss: gdt::USER_DATA_SELECTOR as u64,
            },
            gp: GpRegisters { rbp: user_stack_top as u64, ..GpRegisters::default() },
            ds: gdt::USER_DATA_SELECTOR as u64,
            es: gdt::USER_DATA_SELECTOR as u64,
            fs: gdt::USER_DATA_SELECTOR as u64,
            gs: gdt::USER_DATA_SELECTOR as u64,
            cr3: CR3::get() as u64,
            pid,
            kernel_stack_top,
            user_stack_top: Some(user_stack_top),
            switch_count: 0,
            status: TaskStatus::Created,
        }
    }

    /// The address to stash in R15 at spawn time so the switch prologue can
    /// find this descriptor in O(1) (SPEC_FULL §3/§9).
    pub fn self_ptr(&self) -> u64 {
        self as *const _ as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_task_rflags_has_interrupts_enabled() {
        extern "C" fn dummy_entry() -> ! {
            loop {}
        }
        let desc = TaskDescriptor::new_kernel(1, dummy_entry, 0x1000);
        assert_eq!(desc.frame.rflags & 0x200, 0x200);
        assert_eq!(desc.status, TaskStatus::Created);
    }

    #[test]
    fn user_task_carries_ring3_selectors() {
        extern "C" fn dummy_entry() -> ! {
            loop {}
        }
        let _ = dummy_entry as extern "C" fn() -> !; // silence unused warning on some configs
        let desc = TaskDescriptor::new_user(2, 0x2000, 0x3000, 0x4000);
        assert_eq!(desc.frame.cs & 0b11, 3);
        assert_eq!(desc.frame.ss & 0b11, 3);
        assert_eq!(desc.user_stack_top, Some(0x4000));
    }
}
