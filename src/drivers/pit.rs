//! 8253/8254 Programmable Interval Timer, channel 0, wired to IRQ0.
//!
//! Out-of-scope per SPEC_FULL §1 beyond what the scheduler needs: a fixed
//! tick rate and a hook point. The scheduler's context-switch entry replaces
//! the default IRQ0 stub outright (§4.4), so this module only programs the
//! hardware; it does not register a callback of its own.

use crate::config::PIT_DIVISOR;
use crate::io_port::IoPort;

const CHANNEL_0_DATA: u16 = 0x40;
const COMMAND: u16 = 0x43;

/// Mode 3 (square wave generator), channel 0, lobyte/hibyte access.
const CHANNEL_0_MODE_3: u8 = 0b0011_0110;

/// Programs channel 0 to fire at the rate implied by [`PIT_DIVISOR`].
pub fn init() {
    IoPort::write_u8(COMMAND, CHANNEL_0_MODE_3);
    IoPort::write_u8(CHANNEL_0_DATA, (PIT_DIVISOR & 0xFF) as u8);
    IoPort::write_u8(CHANNEL_0_DATA, (PIT_DIVISOR >> 8) as u8);
}
