//! The C8 syscall trampoline and dispatcher: a dedicated DPL=3 interrupt
//! gate at [`crate::config::SYSCALL_VECTOR`], reached with `int 0x80` from
//! ring 3.
//!
//! Grounded in the same push-then-call-Rust shape as
//! [`crate::task::switch::context_switch_stub`], simplified because the
//! syscall ABI only carries six parameter registers rather than all sixteen:
//! the naked prologue copies rax/rsi/rdx/rcx/r8/r9 into the fixed scratch
//! struct at [`crate::config::SYSCALL_SCRATCH_ADDR`] through a single scratch
//! register (`r11`, loaded with `movabs` since the address does not fit a
//! `mov [disp32], reg` encoding), calls the dispatcher with that struct's
//! address in `rdi`, and `iretq`s straight through with the dispatcher's
//! return value already sitting in `rax` care of the SysV ABI.

use core::arch::naked_asm;
use core::ffi::CStr;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::{
    KERNEL_TASK_STACK_REGION_BASE, KERNEL_TASK_STACK_STRIDE, SYSCALL_SCRATCH_ADDR, USER_LOAD_WINDOW,
    USER_STACK_REGION_BASE, USER_STACK_SIZE,
};
use crate::console::{Color, CONSOLE};
use crate::drivers::keyboard;
use crate::fat12::{Fat12Error, FAT12};
use crate::interrupts::InterruptArgs;
use crate::task::scheduler::SCHEDULER;

const PRINTF: u64 = 1;
const GETPID: u64 = 2;
const TERMINATE: u64 = 3;
const GETCHAR: u64 = 4;
const GETCURSOR: u64 = 5;
const SETCURSOR: u64 = 6;
const EXECUTE: u64 = 7;
const PRINTROOTDIR: u64 = 8;
const CLEARSCREEN: u64 = 9;
const CREATEFILE: u64 = 10;
const DELETEFILE: u64 = 11;
const OPENFILE: u64 = 12;
const CLOSEFILE: u64 = 13;
const READFILE: u64 = 14;
const WRITEFILE: u64 = 15;
const ENDOFFILE: u64 = 16;
const SEEKFILE: u64 = 17;

/// The six parameter-carrying GP registers, copied verbatim by
/// [`syscall_stub`]. Field order matches the call table's (RAX, RSI, RDX,
/// RCX, R8, R9) column order exactly, so the offsets baked into the asm
/// immediates below stay meaningful.
#[repr(C)]
struct SyscallScratch {
    rax: u64,
    rsi: u64,
    rdx: u64,
    rcx: u64,
    r8: u64,
    r9: u64,
}

/// Installed as the [`crate::config::SYSCALL_VECTOR`] IDT gate with DPL=3 by
/// [`install`].
#[unsafe(naked)]
pub extern "x86-interrupt" fn syscall_stub(_frame: InterruptArgs) {
    naked_asm!(
        "movabs r11, {scratch}",
        "mov [r11], rax",
        "mov [r11 + 8], rsi",
        "mov [r11 + 16], rdx",
        "mov [r11 + 24], rcx",
        "mov [r11 + 32], r8",
        "mov [r11 + 40], r9",
        "mov rdi, r11",
        "call {dispatch}",
        "iretq",
        scratch = const SYSCALL_SCRATCH_ADDR,
        dispatch = sym dispatch,
    );
}

/// Installs [`syscall_stub`] at [`crate::config::SYSCALL_VECTOR`] with
/// DPL=3, the only ring-3-reachable gate in the table.
pub fn install(idt: &mut crate::interrupts::InterruptDescriptorTable) {
    idt.interrupt[crate::config::SYSCALL_VECTOR as usize - 32].set_fn_ring3(syscall_stub);
}

/// The C-level syscall body. Runs with interrupts disabled (interrupt gate)
/// and to completion, per SPEC_FULL §5 — the kernel never yields mid-syscall.
///
/// No pointer argument is validated against the caller's address space; a
/// bad pointer simply faults in kernel context. This is a known, documented
/// hardening gap (see DESIGN.md), not an oversight.
#[unsafe(no_mangle)]
extern "C" fn dispatch(scratch: *mut SyscallScratch) -> u64 {
    let scratch = unsafe { &mut *scratch };

    match scratch.rax {
        PRINTF => {
            let ptr = scratch.rsi as *const core::ffi::c_char;
            let s = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap_or("");
            crate::print!("{}", s);
            0
        }
        GETPID => SCHEDULER.current_pid().unwrap_or(0) as u64,
        TERMINATE => {
            let pid = SCHEDULER.current_pid().unwrap_or(0);
            match SCHEDULER.terminate(pid) {
                Ok(()) => 0,
                Err(_) => 1,
            }
        }
        GETCHAR => keyboard::take_key() as u64,
        GETCURSOR => {
            let (row, col) = CONSOLE.lock().cursor();
            unsafe {
                *(scratch.rsi as *mut u64) = row as u64;
                *(scratch.rdx as *mut u64) = col as u64;
            }
            0
        }
        SETCURSOR => {
            let row = unsafe { *(scratch.rsi as *const u64) } as usize;
            let col = unsafe { *(scratch.rdx as *const u64) } as usize;
            CONSOLE.lock().set_cursor(row, col);
            0
        }
        EXECUTE => execute(scratch.rsi as *const core::ffi::c_char),
        PRINTROOTDIR => print_root_dir(),
        CLEARSCREEN => {
            CONSOLE.lock().clear_screen();
            0
        }
        CREATEFILE => with_name(scratch.rsi, |name| FAT12.create_file(name)),
        DELETEFILE => with_name(scratch.rsi, |name| FAT12.delete_file(name)),
        OPENFILE => with_name_result(scratch.rsi, |name| FAT12.open_file(name)),
        CLOSEFILE => fat12_status(FAT12.close_file(scratch.rsi as usize)),
        READFILE => {
            let buf = unsafe { core::slice::from_raw_parts_mut(scratch.rdx as *mut u8, scratch.rcx as usize) };
            match FAT12.read_file(scratch.rsi as usize, buf) {
                Ok(n) => n as u64,
                Err(_) => u64::MAX,
            }
        }
        WRITEFILE => {
            let buf = unsafe { core::slice::from_raw_parts(scratch.rdx as *const u8, scratch.rcx as usize) };
            match FAT12.write_file(scratch.rsi as usize, buf) {
                Ok(n) => n as u64,
                Err(_) => u64::MAX,
            }
        }
        ENDOFFILE => match FAT12.end_of_file(scratch.rsi as usize) {
            Ok(eof) => eof as u64,
            Err(_) => u64::MAX,
        },
        SEEKFILE => fat12_status(FAT12.seek_file(scratch.rsi as usize, scratch.rdx as u32)),
        _ => 0,
    }
}

fn with_name(ptr: u64, f: impl FnOnce(&str) -> Result<(), Fat12Error>) -> u64 {
    let name = unsafe { CStr::from_ptr(ptr as *const core::ffi::c_char) }.to_str().unwrap_or("");
    fat12_status(f(name))
}

fn with_name_result(ptr: u64, f: impl FnOnce(&str) -> Result<usize, Fat12Error>) -> u64 {
    let name = unsafe { CStr::from_ptr(ptr as *const core::ffi::c_char) }.to_str().unwrap_or("");
    match f(name) {
        Ok(handle) => handle as u64,
        Err(_) => u64::MAX,
    }
}

fn fat12_status<T>(result: Result<T, Fat12Error>) -> u64 {
    match result {
        Ok(_) => 0,
        Err(_) => 1,
    }
}

fn print_root_dir() -> u64 {
    match FAT12.list_root_dir() {
        Ok(names) => {
            for name in names {
                crate::println!("{}", name);
            }
            0
        }
        Err(_) => 1,
    }
}

/// Bumped once per EXECUTE call so every spawned user task gets its own
/// kernel and user stack slots, independent of (and allocated before) the
/// PID the scheduler assigns it.
static EXEC_SLOT: AtomicU64 = AtomicU64::new(1);

fn execute(filename: *const core::ffi::c_char) -> u64 {
    let name = match unsafe { CStr::from_ptr(filename) }.to_str() {
        Ok(s) => s,
        Err(_) => return u64::MAX,
    };

    let handle = match FAT12.open_file(name) {
        Ok(h) => h,
        Err(_) => return u64::MAX,
    };

    let mut loaded: usize = 0;
    loop {
        let mut buf = [0u8; 512];
        let remaining = &mut buf[..];
        let n = match FAT12.read_file(handle, remaining) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => {
                let _ = FAT12.close_file(handle);
                return u64::MAX;
            }
        };
        unsafe {
            core::ptr::copy_nonoverlapping(buf.as_ptr(), (USER_LOAD_WINDOW + loaded) as *mut u8, n);
        }
        loaded += n;
    }
    let _ = FAT12.close_file(handle);

    let slot = EXEC_SLOT.fetch_add(1, Ordering::Relaxed);
    let kernel_stack_top = KERNEL_TASK_STACK_REGION_BASE + slot as usize * KERNEL_TASK_STACK_STRIDE;
    let user_stack_top = USER_STACK_REGION_BASE + slot as usize * USER_STACK_SIZE;

    let pid = SCHEDULER.spawn_user(USER_LOAD_WINDOW, kernel_stack_top, user_stack_top);
    pid as u64
}
