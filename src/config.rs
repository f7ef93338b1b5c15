//! Compile time constants shared by every subsystem.
//!
//! Collecting the fixed physical/virtual addresses and tunables in one place
//! instead of scattering magic numbers through `memory`, `interrupts` and
//! `task` makes it possible to audit the external interface in one glance.

use crate::memory::{PhysicalAddress, VirtualAddress};

/// Physical address the boot stage loads the kernel image at.
pub const KERNEL_PHYS_BASE: PhysicalAddress = 0x10_0000;

/// Higher half window mirroring the first 2 MiB of physical memory.
pub const HIGHER_HALF_BASE: VirtualAddress = 0xFFFF_8000_0000_0000;

/// VGA text mode buffer, mirrored into the higher half window.
pub const VGA_BUFFER_ADDR: VirtualAddress = HIGHER_HALF_BASE + 0x000B_8000;

/// Start of the kernel heap, in the higher half window.
pub const HEAP_BASE: VirtualAddress = HIGHER_HALF_BASE + 0x0050_0000;

/// Default heap span handed to [`crate::memory::heap::Heap::init`]; it grows
/// one page at a time beyond this as needed.
pub const HEAP_INITIAL_SIZE: usize = 100 * 1024;

/// Fixed virtual addresses for the privileged tables; kept out of the heap
/// and out of any user-reachable range.
pub const IDT_ADDR: VirtualAddress = HIGHER_HALF_BASE + 0x0006_0000;
pub const GDT_ADDR: VirtualAddress = HIGHER_HALF_BASE + 0x0006_1000;
pub const TSS_ADDR: VirtualAddress = HIGHER_HALF_BASE + 0x0006_2000;
pub const EXCEPTION_SCRATCH_ADDR: VirtualAddress = HIGHER_HALF_BASE + 0x0006_3000;
pub const SYSCALL_SCRATCH_ADDR: VirtualAddress = HIGHER_HALF_BASE + 0x0006_4000;
/// Scratch page [`crate::memory::pages::paging::ActivePagingContext::clone_address_space`]
/// temporarily maps a fresh PML4 frame into while copying it.
pub const ADDRESS_SPACE_CLONE_SCRATCH_ADDR: VirtualAddress = HIGHER_HALF_BASE + 0x0006_5000;
pub const KEYBOARD_LAST_KEY_ADDR: VirtualAddress = HIGHER_HALF_BASE + 0x001F_FFFF;

/// Window user executables are copied into before being scheduled.
pub const USER_LOAD_WINDOW: VirtualAddress = HIGHER_HALF_BASE + 0xFFFF_0000;

/// Base of the user-mode data/stack region (low half, below the canonical hole).
pub const USER_STACK_REGION_BASE: VirtualAddress = 0x0000_7000_0000_0000;

/// Size, in bytes, handed out for every kernel-mode task stack.
pub const KERNEL_STACK_SIZE: usize = 4096 * 4;

/// Size, in bytes, handed out for every user-mode task stack.
pub const USER_STACK_SIZE: usize = 4096 * 4;

/// PIT channel-0 reload value for a 1000 Hz (1 ms) tick.
///
/// `1_193_182 / 1000 ≈ 1193`. The simulated wall clock visible to userspace
/// advances once every [`TICKS_PER_SIMULATED_MS`] ticks, which is where a 4ms
/// granularity for anything clock-visible comes from.
pub const PIT_DIVISOR: u16 = 1193;
pub const TICKS_PER_SIMULATED_MS: u32 = 4;

/// PIC remap bases (see `interrupts::disable_pics`/`init`).
pub const PIC1_VECTOR_BASE: u8 = 32;
pub const PIC2_VECTOR_BASE: u8 = 40;

/// IDT vector the timer (IRQ0) lands on once PIC1 is remapped.
pub const TIMER_VECTOR: u8 = PIC1_VECTOR_BASE;
/// IDT vector the keyboard (IRQ1) lands on once PIC1 is remapped.
pub const KEYBOARD_VECTOR: u8 = PIC1_VECTOR_BASE + 1;
/// Dedicated DPL=3 interrupt gate used as the syscall entry point.
pub const SYSCALL_VECTOR: u8 = 0x80;

/// Fixed low-memory physical offset of the BIOS info block (§6 external
/// interface). Lives below the identity-mapped first 2 MiB, written once by
/// the out-of-scope bootstrap chain before the kernel's entry point runs.
pub const BIOS_INFO_BLOCK_ADDR: PhysicalAddress = 0x0000_0600;

/// Fixed low-memory physical offset of the BIOS memory map entry array
/// (24-byte records, see [`crate::boot_info::MemoryMapEntry`]).
pub const BIOS_MEMORY_MAP_ADDR: PhysicalAddress = 0x0000_0700;

/// Upper bound on the number of memory map entries a real BIOS `int 0x15,
/// eax=0xe820` call produces; used to size the fixed-capacity array the
/// frame allocator reads without needing the heap up yet.
pub const BIOS_MEMORY_MAP_MAX_ENTRIES: usize = 32;

/// Base virtual address of the first spawned kernel task's stack, per the
/// cold-boot scenario in SPEC_FULL §8: PID 1/2/3 land at
/// `KERNEL_TASK_STACK_REGION_BASE + pid * KERNEL_TASK_STACK_STRIDE`.
pub const KERNEL_TASK_STACK_REGION_BASE: VirtualAddress = HIGHER_HALF_BASE + 0x0001_000000;
pub const KERNEL_TASK_STACK_STRIDE: usize = 0x0000_100000;
