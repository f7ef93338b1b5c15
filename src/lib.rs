#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]
#![feature(abi_x86_interrupt)]
#![feature(lazy_get)]

extern crate alloc;

pub mod boot_info;
pub mod config;
pub mod console;
pub mod data_structures;
pub mod drivers;
pub mod fat12;
pub mod globals;
pub mod interrupts;
pub mod io_port;
pub mod kernel;
pub mod logger;
pub mod macros;
pub mod memory;
pub mod serial;
pub mod syscall;
pub mod task;

use core::arch::asm;
use core::panic::PanicInfo;

use crate::config::{HEAP_BASE, HEAP_INITIAL_SIZE, KERNEL_STACK_SIZE, KERNEL_TASK_STACK_REGION_BASE, KERNEL_TASK_STACK_STRIDE};
use crate::globals::{enable_frame_tracking, extend_to_static, init_frame_allocator, FRAME_ALLOCATOR, GDT, IDT, TSS};
use crate::interrupts::gdt::{
    self, NormalDescriptorAccessByteArgs, NormalSegmentAccessByte, SegmentFlags, SystemDescriptorAccessByteArgs, SystemSegmentAccessByte,
    SystemSegmentAccessByteType, GDT as GdtTable,
};
use crate::interrupts::tss::TssStackNumber;
use crate::interrupts::{InterruptArgs, InterruptDescriptorTable};
use crate::kernel::KERNEL;
use crate::memory::frames::FrameAllocator;
use crate::memory::heap::HEAP;
use crate::memory::pages::page_table::page_table_entry::EntryFlags;
use crate::memory::pages::paging::ActivePagingContext;
use crate::task::scheduler::SCHEDULER;
use crate::task::switch;

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    log!(failed, "Kernel Panic occurred!");
    println!("{}", info);
    hlt();
}

/// Parks the calling core forever. Never returns, unlike a bare `loop {}`
/// this at least stops spinning the CPU at 100%.
pub fn hlt() -> ! {
    loop {
        unsafe {
            asm!("hlt", options(nomem, nostack, preserves_flags));
        }
    }
}

/// Kernel entry point. Per the external interface the prior (out-of-scope)
/// boot stage hands off to: the kernel is already loaded at
/// [`crate::config::KERNEL_PHYS_BASE`], long mode is active, and the first 2
/// MiB are both identity-mapped and mirrored into the higher half window —
/// `kernel_size` is the one argument, the loaded image's size in bytes.
///
/// # Safety
///
/// The caller (the out-of-scope bootstrap chain) must ensure the handoff
/// state described above actually holds. This function may only be called
/// once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kernel_main(kernel_size: u64) -> ! {
    log!(ok, "Rust kernel code started.");

    unsafe { KERNEL.init(kernel_size as usize) };
    KERNEL.check_placements().expect("kernel image or BIOS info block placed outside usable RAM");
    log!(ok, "Kernel placement checked against the BIOS memory map.");

    let bios_info = *KERNEL.bios_info();
    unsafe {
        init_frame_allocator(KERNEL.k_end() + 1, bios_info.memory_map()).expect("could not initialize the frame allocator");
    }
    log!(ok, "Frame allocator initialized.");

    unsafe { ActivePagingContext::init() };
    log!(ok, "Recursive page-table self-mapping installed.");

    let mut active_paging = unsafe { ActivePagingContext::new() };

    for offset in (0..HEAP_INITIAL_SIZE).step_by(crate::memory::FRAME_PAGE_SIZE) {
        active_paging
            .map(HEAP_BASE + offset, &FRAME_ALLOCATOR, EntryFlags::PRESENT | EntryFlags::WRITABLE)
            .expect("could not map the initial heap region");
    }
    unsafe { HEAP.init(HEAP_BASE, HEAP_INITIAL_SIZE) };
    enable_frame_tracking();
    log!(ok, "Heap allocator initialized.");

    setup_gdt_and_tss();
    log!(ok, "GDT and TSS loaded.");

    setup_idt();
    log!(ok, "IDT loaded.");

    interrupts::disable_pics();
    interrupts::register_irq_handler(1, crate::drivers::keyboard::handle_irq);
    crate::drivers::pit::init();
    interrupts::unmask_irq(0);
    interrupts::unmask_irq(1);
    log!(ok, "PIC remapped, PIT and keyboard IRQ lines unmasked.");

    crate::fat12::FAT12.init().expect("could not initialize the FAT12 volume");
    log!(ok, "FAT12 volume mounted.");

    for pid in 1..=3usize {
        let stack_top = KERNEL_TASK_STACK_REGION_BASE + pid * KERNEL_TASK_STACK_STRIDE;
        for offset in (0..KERNEL_STACK_SIZE).step_by(crate::memory::FRAME_PAGE_SIZE) {
            active_paging
                .map(stack_top - KERNEL_STACK_SIZE + offset, &FRAME_ALLOCATOR, EntryFlags::PRESENT | EntryFlags::WRITABLE)
                .expect("could not map a kernel task stack");
        }
        SCHEDULER.spawn_kernel(idle_task, stack_top);
    }
    log!(ok, "Spawned PIDs 1-3.");

    unsafe { switch::enter_first_task(&mut *SCHEDULER.first()) }
}

/// The cold-boot kernel tasks' entry point. What runs once scheduled is
/// deliberately minimal: this kernel's own test surface is the syscall
/// gateway and the subsystems beneath it, not a bundled shell or sample
/// program (both out of scope).
extern "C" fn idle_task() -> ! {
    loop {
        unsafe {
            asm!("hlt", options(nomem, nostack, preserves_flags));
        }
    }
}

/// Builds the flat ring-0/ring-3 GDT plus the TSS and loads both, matching
/// SPEC_FULL §4.6's descriptor layout (selectors are the byte offsets baked
/// into [`gdt::KERNEL_CODE_SELECTOR`] and friends).
fn setup_gdt_and_tss() {
    let mut tss = TSS.lock();
    tss.new_stack(TssStackNumber::Rsp0, 4, true);

    let mut table = GDT.lock();
    table.set_code_descriptor(|code| {
        code.set_flags(SegmentFlags::LONG_MODE_CODE);
        code.set_access_byte(NormalDescriptorAccessByteArgs {
            flags: NormalSegmentAccessByte::PRESENT | NormalSegmentAccessByte::DESCRIPTOR_TYPE | NormalSegmentAccessByte::EXECUTABLE | NormalSegmentAccessByte::RW,
        });
    });
    table.set_data_descriptor(|data| {
        data.set_access_byte(NormalDescriptorAccessByteArgs {
            flags: NormalSegmentAccessByte::PRESENT | NormalSegmentAccessByte::DESCRIPTOR_TYPE | NormalSegmentAccessByte::RW,
        });
    });
    table.set_user_code_descriptor(|code| {
        code.set_flags(SegmentFlags::LONG_MODE_CODE);
        code.set_access_byte(NormalDescriptorAccessByteArgs {
            flags: NormalSegmentAccessByte::PRESENT
                | NormalSegmentAccessByte::DESCRIPTOR_TYPE
                | NormalSegmentAccessByte::EXECUTABLE
                | NormalSegmentAccessByte::RW
                | NormalSegmentAccessByte::DPL_LO
                | NormalSegmentAccessByte::DPL_HI,
        });
    });
    table.set_user_data_descriptor(|data| {
        data.set_access_byte(NormalDescriptorAccessByteArgs {
            flags: NormalSegmentAccessByte::PRESENT
                | NormalSegmentAccessByte::DESCRIPTOR_TYPE
                | NormalSegmentAccessByte::RW
                | NormalSegmentAccessByte::DPL_LO
                | NormalSegmentAccessByte::DPL_HI,
        });
    });
    table.set_tss_descriptor(|tss_seg| {
        tss_seg.set_access_byte(SystemDescriptorAccessByteArgs {
            flags: SystemSegmentAccessByte::PRESENT,
            seg_type: SystemSegmentAccessByteType::TssAvailable64bit,
        });
        tss_seg.set_base(unsafe { extend_to_static(&*tss) });
    });

    unsafe {
        GdtTable::load(extend_to_static(&*table));
        gdt::reload_seg_regs();
        gdt::load_tss();
    }
}

/// Installs the CPU exception handlers this kernel actually needs a printout
/// for, the generic IRQ stubs already wired in by
/// [`InterruptDescriptorTable::new`], the scheduler's timer override, and
/// the syscall gateway, then loads the table.
///
/// Deliberately does not `sti`: with the run queue still empty at this point
/// in `kernel_main`, a timer tick landing here would hit
/// [`crate::task::scheduler::Scheduler::rotate`] with nothing to rotate to.
/// Interrupts first turn on inside [`switch::enter_first_task`], as a side
/// effect of the `iretq` that pops PID 1's saved `rflags` (`IF` set).
fn setup_idt() {
    let mut table = IDT.lock();
    table.divide_error.set_fn(divide_error_handler);
    table.breakpoint.set_fn(breakpoint_handler);
    table.double_fault.set_fn(double_fault_handler);
    table.general_protection.set_fn(general_protection_fault_handler);
    table.page_fault.set_fn(page_fault_handler);

    switch::install(&mut table);
    crate::syscall::gateway::install(&mut table);

    unsafe {
        InterruptDescriptorTable::load(extend_to_static(&*table));
    }
}

extern "x86-interrupt" fn divide_error_handler(args: InterruptArgs) {
    log!(failed, "Divide error!");
    println!("{:#?}", args);
    hlt();
}

extern "x86-interrupt" fn breakpoint_handler(args: InterruptArgs) {
    println!("Got breakpoint exception!");
    println!("{:#?}", args);
}

extern "x86-interrupt" fn double_fault_handler(args: InterruptArgs, error_code: u64) {
    log!(failed, "Got Double Fault exception! Halting...");
    println!("Error code: {:#x}", error_code);
    println!("{:#?}", args);
    hlt();
}

extern "x86-interrupt" fn general_protection_fault_handler(args: InterruptArgs, error_code: u64) {
    log!(failed, "Got General Protection Fault! Halting...");
    println!("Error code: {:#x}", error_code);
    println!("{:#?}", args);
    hlt();
}

/// Every page fault materializes a fresh frame at the faulting address
/// rather than inspecting the reason it faulted: this is how
/// [`crate::memory::heap::Heap`] grows (SPEC_FULL §4.3) and how a task's
/// stack or scratch window gets backed lazily, not a placeholder. A second
/// [`ActivePagingContext`] is built here rather than sharing `kernel_main`'s:
/// both ultimately alias the same recursively-mapped P4, but only one is
/// ever in use at a time (the boot-time one never runs again after the first
/// task is entered), so this matches the single-writer invariant in spirit
/// even though the type system can't express it.
extern "x86-interrupt" fn page_fault_handler(args: InterruptArgs, error_code: u64) {
    let faulting_addr: u64;
    unsafe {
        asm!("mov {}, cr2", out(reg) faulting_addr, options(nomem, nostack, preserves_flags));
    }

    let mut active_paging = unsafe { ActivePagingContext::new() };
    let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE;
    if active_paging.page_fault(faulting_addr as usize, &FRAME_ALLOCATOR, flags).is_err() {
        log!(failed, "Unhandled page fault at {:#x} (error code {:#x}). Halting...", faulting_addr, error_code);
        println!("{:#?}", args);
        hlt();
    }
}
