//! PS/2 keyboard, scan code set 1, US layout. Out-of-scope beyond a minimal
//! interface per SPEC_FULL §1/§4.8: the IRQ1 handler decodes one scan code
//! per interrupt and publishes the last printable key to a fixed mailbox
//! address; no typeahead buffer, no modifier-key tracking beyond shift.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::config::KEYBOARD_LAST_KEY_ADDR;
use crate::io_port::IoPort;

const DATA_PORT: u16 = 0x60;

const LOWER: [u8; 59] = [
    0, 27, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 8, b'\t',
    b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', b'\n', 0,
    b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`', 0, b'\\',
    b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0, b'*', 0, b' ',
];

const UPPER: [u8; 59] = [
    0, 27, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 8, b'\t',
    b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', b'\n', 0,
    b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~', 0, b'|',
    b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*', 0, b' ',
];

const LEFT_SHIFT: u8 = 0x2A;
const RIGHT_SHIFT: u8 = 0x36;
const RELEASED_BIT: u8 = 0x80;

static SHIFT_HELD: AtomicBool = AtomicBool::new(false);
static LAST_KEY: AtomicU8 = AtomicU8::new(0);

/// Called from the IRQ1 stub. Reads one scan code, updates shift state, and
/// if it decodes to a printable ASCII byte, stores it both in the static
/// mailbox and at the fixed virtual address userspace polls.
pub fn handle_irq() {
    let code = IoPort::read_u8(DATA_PORT);
    let released = code & RELEASED_BIT != 0;
    let code = code & !RELEASED_BIT;

    if code == LEFT_SHIFT || code == RIGHT_SHIFT {
        SHIFT_HELD.store(!released, Ordering::SeqCst);
        return;
    }

    if released {
        return;
    }

    let table = if SHIFT_HELD.load(Ordering::SeqCst) { &UPPER } else { &LOWER };
    let Some(&ascii) = table.get(code as usize) else { return };
    if ascii == 0 {
        return;
    }

    LAST_KEY.store(ascii, Ordering::SeqCst);
    unsafe {
        core::ptr::write_volatile(KEYBOARD_LAST_KEY_ADDR as *mut u8, ascii);
    }
}

/// The most recently decoded printable key, or 0 if none yet.
pub fn last_key() -> u8 {
    LAST_KEY.load(Ordering::SeqCst)
}

/// Reads the buffered key and clears it, so the same keypress is never
/// observed twice. Returns 0 if nothing has been typed since the last take.
pub fn take_key() -> u8 {
    let key = LAST_KEY.swap(0, Ordering::SeqCst);
    if key != 0 {
        unsafe {
            core::ptr::write_volatile(KEYBOARD_LAST_KEY_ADDR as *mut u8, 0);
        }
    }
    key
}
