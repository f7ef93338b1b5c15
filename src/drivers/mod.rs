//! Minimal, interface-only device drivers (SPEC_FULL §4.8): just enough
//! hardware plumbing for the FAT12 adapter and the syscall gateway to sit
//! on top of. No IRQ-driven disk I/O, no DMA — busy-wait PIO throughout,
//! matching a teaching kernel's scope.

pub mod ata;
pub mod keyboard;
pub mod pit;
