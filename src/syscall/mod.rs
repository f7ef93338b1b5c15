//! C8: the ring-3 syscall gateway (SPEC_FULL §4.7).
//!
//! [`gateway`] holds the naked trampoline, the scratch-register struct and
//! the dispatcher implementing the 17-entry call table. Kept as its own
//! top-level module, parallel to [`crate::task`], since it is reached from a
//! dedicated IDT gate rather than from anything task-switch related.

pub mod gateway;
