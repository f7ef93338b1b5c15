//! C6: the task table and preemptive round-robin scheduler.
//!
//! [`descriptor`] is the flat saved-context record (§3 "Task descriptor"),
//! [`scheduler`] owns the run queue and `rotate()`, and [`switch`] is the
//! thin assembly prologue/epilogue that rewrites the IRETQ frame on every
//! timer tick. Grounded in the `CPUStatus` + `restore_cpu_status` /
//! `context_switch_stub` shape of
//! `other_examples/96a93e3d_SafaOS-SafaOS__.../threading/mod.rs`, adapted to
//! this kernel's R15-stashed-descriptor-pointer / IRETQ-frame-rewrite design
//! (SPEC_FULL §4.5) instead of SafaOS's `swtch()` call convention.

pub mod descriptor;
pub mod scheduler;
pub mod switch;

pub use descriptor::{TaskDescriptor, TaskStatus};
pub use scheduler::SCHEDULER;

/// Errors the task table / scheduler can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    NoSuchPid,
    RunQueueEmpty,
    StackAllocationFailed,
}

pub type Pid = u32;
