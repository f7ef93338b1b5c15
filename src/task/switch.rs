//! The context-switch assembly stub that replaces vector 32 (IRQ0/timer)
//! outright, bypassing the generic `irq_stub` path in
//! [`crate::interrupts`] entirely (SPEC_FULL §4.4/§4.5).
//!
//! Grounded in the push-everything-then-call-Rust shape of
//! `other_examples/96a93e3d_SafaOS-SafaOS__.../threading/mod.rs`'s
//! `context_switch_stub`/`restore_cpu_status`, simplified to this kernel's
//! design: no SSE state (not part of the SPEC_FULL §3 task descriptor), and
//! the IRETQ frame is rewritten **in place** on the kernel stack rather than
//! pushed fresh, since `iretq` at the end of the stub consumes exactly the
//! five words already sitting there.

use core::arch::{asm, naked_asm};

use crate::globals::TSS;
use crate::interrupts::InterruptArgs;
use crate::memory::cr3::CR3;
use crate::task::descriptor::{GpRegisters, IretqFrame, TaskStatus};
use crate::task::scheduler::SCHEDULER;

/// Installed as the vector-32 IDT gate by [`crate::task::scheduler::init`].
///
/// # Safety invariant
///
/// Pushes [`GpRegisters`]' 15 fields in reverse declaration order so the
/// resulting stack block is byte-for-byte a `GpRegisters`, immediately
/// below the CPU-pushed [`IretqFrame`]. `task_switch_handler` is handed
/// pointers to both and may freely overwrite either; the epilogue pops the
/// (possibly rewritten) `GpRegisters` block and then `iretq`s through the
/// (possibly rewritten) `IretqFrame`.
#[unsafe(naked)]
pub extern "x86-interrupt" fn context_switch_stub(_frame: InterruptArgs) {
    naked_asm!(
        "push r15",
        "push r14",
        "push r13",
        "push r12",
        "push r11",
        "push r10",
        "push r9",
        "push r8",
        "push rbp",
        "push rdi",
        "push rsi",
        "push rdx",
        "push rcx",
        "push rbx",
        "push rax",
        // rdi = &mut GpRegisters (= rsp), rsi = &mut IretqFrame (rsp + size_of::<GpRegisters>())
        "mov rdi, rsp",
        "lea rsi, [rsp + 15*8]",
        "call {handler}",
        "pop rax",
        "pop rbx",
        "pop rcx",
        "pop rdx",
        "pop rsi",
        "pop rdi",
        "pop rbp",
        "pop r8",
        "pop r9",
        "pop r10",
        "pop r11",
        "pop r12",
        "pop r13",
        "pop r14",
        "pop r15",
        "iretq",
        handler = sym task_switch_handler,
    );
}

/// Rotates the run queue and rewrites `gp`/`frame` in place to the newly
/// selected task's saved state. Called with interrupts disabled (interrupt
/// gate) and the PIC not yet EOI'd.
///
/// # Safety
///
/// Must only ever be reached from [`context_switch_stub`]: `gp` and `frame`
/// must point at the exact stack layout that stub's prologue constructs.
#[unsafe(no_mangle)]
extern "C" fn task_switch_handler(gp: &mut GpRegisters, frame: &mut IretqFrame) {
    let outgoing = gp.r15 as *mut crate::task::TaskDescriptor;
    if !outgoing.is_null() {
        unsafe {
            (*outgoing).gp = *gp;
            (*outgoing).frame = *frame;
            (*outgoing).status = TaskStatus::Runnable;
        }
    }

    let next = SCHEDULER.rotate();
    unsafe {
        (*next).status = TaskStatus::Running;
        (*next).switch_count += 1;
        *gp = (*next).gp;
        *frame = (*next).frame;

        TSS.lock().set_rsp0((*next).kernel_stack_top);
    }

    SCHEDULER.on_tick();
    send_timer_eoi();
}

fn send_timer_eoi() {
    use crate::io_port::IoPort;
    const PIC1_COMMAND: u16 = 0x20;
    const PIC_EOI: u8 = 0x20;
    IoPort::write_u8(PIC1_COMMAND, PIC_EOI);
}

/// Installs [`context_switch_stub`] as the timer vector, overriding whatever
/// default IRQ0 stub [`crate::interrupts::InterruptDescriptorTable::new`]
/// wired in.
pub fn install(idt: &mut crate::interrupts::InterruptDescriptorTable) {
    idt.interrupt[0].set_fn(context_switch_stub);
}

/// Performs the bootstrap → first-task jump: loads `desc`'s CR3, sets
/// `TSS.rsp0`, and restores its saved state via `iretq`. Never returns.
///
/// Rather than re-deriving 15 register loads by hand, this points `rsp` at
/// `desc.gp` (which [`crate::task::descriptor`] guarantees is immediately
/// followed by `desc.frame` in memory) and runs the exact same
/// pop-then-`iretq` sequence [`context_switch_stub`]'s epilogue uses, just
/// once, reading from the descriptor's own memory instead of the kernel
/// stack.
pub unsafe fn enter_first_task(desc: &mut crate::task::TaskDescriptor) -> ! {
    desc.status = TaskStatus::Running;
    unsafe {
        TSS.lock().set_rsp0(desc.kernel_stack_top);
        CR3::set(desc.cr3 as crate::memory::PhysicalAddress);

        let borrowed_stack = &desc.gp as *const GpRegisters as u64;
        asm!(
            "mov rsp, {stack}",
            "pop rax",
            "pop rbx",
            "pop rcx",
            "pop rdx",
            "pop rsi",
            "pop rdi",
            "pop rbp",
            "pop r8",
            "pop r9",
            "pop r10",
            "pop r11",
            "pop r12",
            "pop r13",
            "pop r14",
            "pop r15",
            "iretq",
            stack = in(reg) borrowed_stack,
            options(noreturn),
        );
    }
}
