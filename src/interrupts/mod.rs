//! C5: the 256-gate IDT, the 8259 PIC remap, and the IRQ dispatch table.
//!
//! Vectors 0..31 are CPU exceptions: each one is a distinct, individually
//! installed `set_fn` (see `lib.rs`), matching how a fatal trap needs its own
//! printout. Vectors 32..47 are the remapped IRQs 0..15; all but the timer
//! (IRQ0, which the scheduler overrides directly) go through a generic
//! per-vector stub that looks the real handler up in [`IRQ_HANDLERS`] and
//! sends EOI. Vector 0x80 is the syscall gateway's DPL=3 gate.
//!
//! https://wiki.osdev.org/Interrupt_Descriptor_Table
//! https://wiki.osdev.org/8259_PIC

pub mod gdt;
pub mod tss;

use core::arch::asm;
use core::marker::PhantomData;
use bitflags::bitflags;
use spin::Mutex;

use crate::config::{PIC1_VECTOR_BASE, PIC2_VECTOR_BASE};
use crate::io_port::IoPort;

bitflags! {
    #[derive(Clone, Copy)]
    struct Ist: u8 {
        const IST_OFFSET = 0b111;
    }
}

bitflags! {
    #[derive(Clone, Copy)]
    struct TypeAttributes: u8 {
        const GATE_TYPE = 0b0000_1111;
        const DPL       = 0b0110_0000;
        const PRESENT   = 0b1000_0000;
    }
}

#[repr(u8)]
#[derive(Clone, Copy)]
enum GateType {
    InterruptGate = 0xE,
    #[allow(dead_code)]
    TrapGate = 0xF,
}

/// The register frame an `extern "x86-interrupt"` handler is called with —
/// exactly the five values an interrupt gate pushes onto the stack on entry.
#[repr(C)]
#[derive(Debug)]
pub struct InterruptArgs {
    pub instruction_pointer: u64,
    pub code_segment: u64,
    pub cpu_flags: u64,
    pub stack_pointer: u64,
    pub stack_segment: u64,
}

pub type HandlerFn = extern "x86-interrupt" fn(InterruptArgs);
pub type HandlerFnWithErrorCode = extern "x86-interrupt" fn(InterruptArgs, u64);

/// Implemented for every concrete handler fn-pointer type so [`Gate::set_fn`]
/// can extract an address generically regardless of signature.
pub trait InterruptHandler: Copy {
    fn handler_addr(self) -> u64;
}

impl InterruptHandler for HandlerFn {
    fn handler_addr(self) -> u64 {
        self as usize as u64
    }
}

impl InterruptHandler for HandlerFnWithErrorCode {
    fn handler_addr(self) -> u64 {
        self as usize as u64
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct InterruptDescriptor {
    offset_1: u16,
    selector: u16,
    ist: Ist,
    type_attrs: TypeAttributes,
    offset_2: u16,
    offset_3: u32,
    zero: u32,
}

impl InterruptDescriptor {
    const fn new() -> Self {
        InterruptDescriptor {
            offset_1: 0,
            selector: 0,
            ist: Ist::empty(),
            type_attrs: TypeAttributes::empty(),
            offset_2: 0,
            offset_3: 0,
            zero: 0,
        }
    }

    fn set(&mut self, handler_addr: u64, gate_type: GateType, dpl: u8) {
        self.offset_1 = handler_addr as u16;
        self.offset_2 = (handler_addr >> 16) as u16;
        self.offset_3 = (handler_addr >> 32) as u32;
        self.selector = gdt::KERNEL_CODE_SELECTOR;
        self.ist = Ist::empty();
        self.type_attrs = TypeAttributes::PRESENT
            | TypeAttributes::from_bits_truncate(gate_type as u8)
            | TypeAttributes::from_bits_truncate((dpl & 0b11) << 5);
    }
}

/// One IDT slot, typed by the handler signature it accepts so `idt.<field>
/// .set_fn(handler)` cannot be called with a mismatched fn pointer.
#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct Gate<F> {
    descriptor: InterruptDescriptor,
    _marker: PhantomData<fn(F)>,
}

impl<F: InterruptHandler> Gate<F> {
    const fn new() -> Self {
        Gate { descriptor: InterruptDescriptor::new(), _marker: PhantomData }
    }

    pub fn set_fn(&mut self, handler: F) {
        self.descriptor.set(handler.handler_addr(), GateType::InterruptGate, 0);
    }

    /// Same as [`Self::set_fn`] but installs the gate at DPL=3 so ring-3 code
    /// may invoke it with `int`. Used only for the syscall vector.
    pub fn set_fn_ring3(&mut self, handler: F) {
        self.descriptor.set(handler.handler_addr(), GateType::InterruptGate, 3);
    }
}

/// 256 gates: 32 CPU exceptions, 10 reserved, 224 user/IRQ vectors (32..255).
#[repr(C)]
pub struct InterruptDescriptorTable {
    pub divide_error: Gate<HandlerFn>,
    pub debug_exception: Gate<HandlerFn>,
    pub non_maskable_interrupt: Gate<HandlerFn>,
    pub breakpoint: Gate<HandlerFn>,
    pub overflow: Gate<HandlerFn>,
    pub bound_range_exceeded: Gate<HandlerFn>,
    pub invalid_opcode: Gate<HandlerFn>,
    pub device_not_available: Gate<HandlerFn>,
    pub double_fault: Gate<HandlerFnWithErrorCode>,
    pub coprocessor_segment_overrun: Gate<HandlerFn>,
    pub invalid_tss: Gate<HandlerFnWithErrorCode>,
    pub segment_not_present: Gate<HandlerFnWithErrorCode>,
    pub stack_segment_fault: Gate<HandlerFnWithErrorCode>,
    pub general_protection: Gate<HandlerFnWithErrorCode>,
    pub page_fault: Gate<HandlerFnWithErrorCode>,
    pub intel_reserved: Gate<HandlerFn>,
    pub x87_fp_error: Gate<HandlerFn>,
    pub alignment_check: Gate<HandlerFnWithErrorCode>,
    pub machine_check: Gate<HandlerFn>,
    pub simd_fp_exception: Gate<HandlerFn>,
    pub virtualization_exception: Gate<HandlerFn>,
    pub control_protection_exception: Gate<HandlerFnWithErrorCode>,
    reserved_for_future_use: [InterruptDescriptor; 10],
    pub interrupt: [Gate<HandlerFn>; 224],
}

impl InterruptDescriptorTable {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let mut idt = InterruptDescriptorTable {
            divide_error: Gate::new(),
            debug_exception: Gate::new(),
            non_maskable_interrupt: Gate::new(),
            breakpoint: Gate::new(),
            overflow: Gate::new(),
            bound_range_exceeded: Gate::new(),
            invalid_opcode: Gate::new(),
            device_not_available: Gate::new(),
            double_fault: Gate::new(),
            coprocessor_segment_overrun: Gate::new(),
            invalid_tss: Gate::new(),
            segment_not_present: Gate::new(),
            stack_segment_fault: Gate::new(),
            general_protection: Gate::new(),
            page_fault: Gate::new(),
            intel_reserved: Gate::new(),
            x87_fp_error: Gate::new(),
            alignment_check: Gate::new(),
            machine_check: Gate::new(),
            simd_fp_exception: Gate::new(),
            virtualization_exception: Gate::new(),
            control_protection_exception: Gate::new(),
            reserved_for_future_use: [InterruptDescriptor::new(); 10],
            interrupt: [Gate::new(); 224],
        };

        install_default_irq_stubs(&mut idt.interrupt);
        idt
    }

    /// Loads this (now `'static`) table with `lidt`.
    pub unsafe fn load(idt: &'static InterruptDescriptorTable) {
        #[repr(C, packed)]
        struct DescriptorTablePointer {
            limit: u16,
            base: u64,
        }

        let ptr = DescriptorTablePointer {
            limit: (core::mem::size_of::<InterruptDescriptorTable>() - 1) as u16,
            base: idt as *const _ as u64,
        };

        unsafe {
            asm!("lidt [{}]", in(reg) &ptr, options(readonly, nostack, preserves_flags));
        }
    }
}

// ---------------------------------------------------------------------------
// IRQ dispatch table (vectors 32..47, IRQ0 excepted — see module docs)
// ---------------------------------------------------------------------------

const IRQ_COUNT: usize = 16;

static IRQ_HANDLERS: [Mutex<Option<fn()>>; IRQ_COUNT] = [const { Mutex::new(None) }; IRQ_COUNT];

/// Registers the callback a generic IRQ stub invokes for line `irq` (0..15).
pub fn register_irq_handler(irq: u8, handler: fn()) {
    *IRQ_HANDLERS[irq as usize].lock() = Some(handler);
}

fn send_eoi(irq: u8) {
    if irq >= 8 {
        IoPort::write_u8(PIC2_COMMAND, PIC_EOI);
    }
    IoPort::write_u8(PIC1_COMMAND, PIC_EOI);
}

/// Monomorphized once per IRQ line so every line gets a distinct function
/// pointer without 16 hand-written near-identical stubs.
extern "x86-interrupt" fn irq_stub<const IRQ: u8>(_args: InterruptArgs) {
    if let Some(handler) = *IRQ_HANDLERS[IRQ as usize].lock() {
        handler();
    }
    send_eoi(IRQ);
}

macro_rules! install_irq_stub {
    ($table:expr, $irq:expr) => {
        $table[$irq].set_fn(irq_stub::<{ $irq as u8 }>)
    };
}

/// Wires vectors 32..47 to [`irq_stub`]; IRQ0 (the timer) is left in place
/// here but is expected to be overwritten by the scheduler before interrupts
/// are enabled.
fn install_default_irq_stubs(interrupt: &mut [Gate<HandlerFn>; 224]) {
    install_irq_stub!(interrupt, 0);
    install_irq_stub!(interrupt, 1);
    install_irq_stub!(interrupt, 2);
    install_irq_stub!(interrupt, 3);
    install_irq_stub!(interrupt, 4);
    install_irq_stub!(interrupt, 5);
    install_irq_stub!(interrupt, 6);
    install_irq_stub!(interrupt, 7);
    install_irq_stub!(interrupt, 8);
    install_irq_stub!(interrupt, 9);
    install_irq_stub!(interrupt, 10);
    install_irq_stub!(interrupt, 11);
    install_irq_stub!(interrupt, 12);
    install_irq_stub!(interrupt, 13);
    install_irq_stub!(interrupt, 14);
    install_irq_stub!(interrupt, 15);
}

// ---------------------------------------------------------------------------
// 8259 PIC remap
// ---------------------------------------------------------------------------

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const PIC_EOI: u8 = 0x20;

const ICW1_ICW4: u8 = 0x01;
const ICW1_INIT: u8 = 0x10;
const ICW4_8086: u8 = 0x01;

/// Remaps the master/slave 8259 PICs so IRQs 0..15 land on
/// [`PIC1_VECTOR_BASE`]..+15 instead of colliding with CPU exceptions 8..15,
/// then masks every line. Drivers unmask their own line via [`unmask_irq`]
/// once they've registered a handler.
pub fn disable_pics() {
    // ICW1: start initialization, expect ICW4
    IoPort::write_u8(PIC1_COMMAND, ICW1_INIT | ICW1_ICW4);
    IoPort::io_wait();
    IoPort::write_u8(PIC2_COMMAND, ICW1_INIT | ICW1_ICW4);
    IoPort::io_wait();

    // ICW2: vector offsets
    IoPort::write_u8(PIC1_DATA, PIC1_VECTOR_BASE);
    IoPort::io_wait();
    IoPort::write_u8(PIC2_DATA, PIC2_VECTOR_BASE);
    IoPort::io_wait();

    // ICW3: master has a slave at IRQ2, slave's cascade identity is 2
    IoPort::write_u8(PIC1_DATA, 1 << 2);
    IoPort::io_wait();
    IoPort::write_u8(PIC2_DATA, 2);
    IoPort::io_wait();

    // ICW4: 8086 mode
    IoPort::write_u8(PIC1_DATA, ICW4_8086);
    IoPort::io_wait();
    IoPort::write_u8(PIC2_DATA, ICW4_8086);
    IoPort::io_wait();

    // mask everything; individual drivers unmask their own line
    IoPort::write_u8(PIC1_DATA, 0xFF);
    IoPort::write_u8(PIC2_DATA, 0xFF);
}

/// Clears the mask bit for `irq` (0..15) on whichever PIC owns it. For a
/// slave line (`irq` >= 8) this also clears master's IRQ2 cascade bit —
/// without it the slave's EOI/IRQ signal never reaches the CPU even though
/// the slave itself is unmasked.
pub fn unmask_irq(irq: u8) {
    let (port, bit) = if irq < 8 { (PIC1_DATA, irq) } else { (PIC2_DATA, irq - 8) };
    let mask = IoPort::read_u8(port);
    IoPort::write_u8(port, mask & !(1 << bit));

    if irq >= 8 {
        let master_mask = IoPort::read_u8(PIC1_DATA);
        IoPort::write_u8(PIC1_DATA, master_mask & !(1 << 2));
    }
}

/// Sets the mask bit for `irq` (0..15) on whichever PIC owns it.
pub fn mask_irq(irq: u8) {
    let (port, bit) = if irq < 8 { (PIC1_DATA, irq) } else { (PIC2_DATA, irq - 8) };
    let mask = IoPort::read_u8(port);
    IoPort::write_u8(port, mask | (1 << bit));
}

pub fn enable_interrupts() {
    unsafe {
        asm!("sti", options(nomem, nostack, preserves_flags));
    }
}

pub fn disable_interrupts() {
    unsafe {
        asm!("cli", options(nomem, nostack, preserves_flags));
    }
}
