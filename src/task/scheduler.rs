//! The run queue and the round-robin `rotate()` primitive behind it.
//!
//! SPEC_FULL §9 DESIGN NOTES ("Cyclic run-queue nodes") calls for raw,
//! hand-rolled next/previous pointers; here the run queue is just
//! [`crate::data_structures::intrusive_list::IntrusiveList`] (C4) keyed by
//! PID, the same generic list used elsewhere in the crate, so there is
//! exactly one doubly-linked-list implementation to review and test. The
//! only raw pointer that outlives a single tick is the one stashed in R15,
//! and that is rewritten atomically by
//! [`crate::task::switch::task_switch_handler`] on every switch, never read
//! stale.

use core::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use spin::Mutex;

use crate::config::TICKS_PER_SIMULATED_MS;
use crate::data_structures::intrusive_list::IntrusiveList;
use crate::memory::VirtualAddress;
use crate::task::descriptor::TaskDescriptor;
use crate::task::{Pid, TaskError};

lazy_static! {
    pub static ref SCHEDULER: Scheduler = Scheduler::new();
}

/// The simulated wall clock, in milliseconds, bumped every
/// [`TICKS_PER_SIMULATED_MS`] timer ticks (SPEC_FULL §4.5 step 4).
static SIMULATED_MILLIS: AtomicU64 = AtomicU64::new(0);

pub struct Scheduler {
    run_queue: Mutex<IntrusiveList<TaskDescriptor>>,
    next_pid: Mutex<Pid>,
    ticks: AtomicU64,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            run_queue: Mutex::new(IntrusiveList::new()),
            next_pid: Mutex::new(1),
            ticks: AtomicU64::new(0),
        }
    }

    fn alloc_pid(&self) -> Pid {
        let mut next = self.next_pid.lock();
        let pid = *next;
        *next += 1;
        pid
    }

    /// Inserts `desc` at the tail of the run queue and fixes up its own
    /// `gp.r15` to point at its own (now stable) heap slot, so the very
    /// first time this task is switched to, R15 already carries the
    /// self-pointer invariant [`TaskDescriptor::self_ptr`] documents.
    fn insert(&self, pid: Pid, desc: TaskDescriptor) {
        let mut queue = self.run_queue.lock();
        queue.push_back(pid as usize, desc);
        let slot = queue.get_mut(pid as usize).expect("just inserted this key");
        slot.gp.r15 = slot.self_ptr();
    }

    /// Spawns a ring-0 task; `entry_fn` never returns. Returns the new PID.
    pub fn spawn_kernel(&self, entry_fn: extern "C" fn() -> !, kernel_stack_top: VirtualAddress) -> Pid {
        let pid = self.alloc_pid();
        let desc = TaskDescriptor::new_kernel(pid, entry_fn, kernel_stack_top);
        self.insert(pid, desc);
        pid
    }

    /// Spawns a ring-3 task whose code already lives at `entry_va` (inside
    /// [`crate::config::USER_LOAD_WINDOW`]).
    pub fn spawn_user(
        &self,
        entry_va: VirtualAddress,
        kernel_stack_top: VirtualAddress,
        user_stack_top: VirtualAddress,
    ) -> Pid {
        let pid = self.alloc_pid();
        let desc = TaskDescriptor::new_user(pid, entry_va, kernel_stack_top, user_stack_top);
        self.insert(pid, desc);
        pid
    }

    /// Removes `pid`'s descriptor from the run queue. A task that terminates
    /// itself is simply gone the next time `rotate()` walks the queue; there
    /// is nothing further to clean up here (SPEC_FULL §4.5 "Termination").
    pub fn terminate(&self, pid: Pid) -> Result<(), TaskError> {
        self.run_queue.lock().remove(pid as usize).map(|_| ()).ok_or(TaskError::NoSuchPid)
    }

    /// Returns a pointer to the run queue's current head without rotating
    /// it. Used exactly once, by `lib.rs::kernel_main`, to hand
    /// [`crate::task::switch::enter_first_task`] the descriptor for PID 1 —
    /// before any task is running there is nothing to rotate away from.
    ///
    /// # Safety / calling convention
    ///
    /// Same aliasing contract as [`Self::rotate`]: the returned pointer must
    /// not be retained past the bootstrap→first-task jump.
    pub fn first(&self) -> *mut TaskDescriptor {
        let mut queue = self.run_queue.lock();
        queue.front_mut().expect("run queue must not be empty at boot") as *mut TaskDescriptor
    }

    /// Moves the current head to the tail and returns a pointer to the new
    /// head's descriptor.
    ///
    /// # Safety / calling convention
    ///
    /// Only ever called from [`crate::task::switch::task_switch_handler`]
    /// with interrupts disabled (interrupt-gate entry). The returned pointer
    /// aliases memory still owned by the run queue; it must not be retained
    /// past the current tick.
    pub fn rotate(&self) -> *mut TaskDescriptor {
        let mut queue = self.run_queue.lock();
        queue.rotate();
        queue.front_mut().expect("run queue must never go empty") as *mut TaskDescriptor
    }

    /// Bumps the tick counter and, every [`TICKS_PER_SIMULATED_MS`] ticks,
    /// the simulated wall clock.
    pub fn on_tick(&self) {
        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks % TICKS_PER_SIMULATED_MS as u64 == 0 {
            SIMULATED_MILLIS.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn simulated_millis(&self) -> u64 {
        SIMULATED_MILLIS.load(Ordering::Relaxed)
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// The PID of whichever task is currently running, per R15 (SPEC_FULL
    /// §4.7 invariant 6). Returns `None` before the first task has been
    /// entered, when R15 is still zero.
    pub fn current_pid(&self) -> Option<Pid> {
        let r15: u64;
        unsafe {
            core::arch::asm!("mov {}, r15", out(reg) r15, options(nomem, nostack, preserves_flags));
        }
        if r15 == 0 {
            return None;
        }
        let desc = r15 as *const TaskDescriptor;
        Some(unsafe { (*desc).pid })
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// Safety: the run queue is only ever touched with interrupts disabled
// (timer-IRQ path) or from single-threaded kernel init/syscall context.
unsafe impl Sync for Scheduler {}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry() -> ! {
        loop {}
    }

    #[test]
    fn spawning_three_tasks_assigns_sequential_pids() {
        let sched = Scheduler::new();
        let a = sched.spawn_kernel(dummy_entry, 0x1000);
        let b = sched.spawn_kernel(dummy_entry, 0x2000);
        let c = sched.spawn_kernel(dummy_entry, 0x3000);
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn rotate_cycles_every_pid_and_terminate_drops_one() {
        let sched = Scheduler::new();
        sched.spawn_kernel(dummy_entry, 0x1000);
        sched.spawn_kernel(dummy_entry, 0x2000);
        sched.spawn_kernel(dummy_entry, 0x3000);

        let mut seen = alloc::vec::Vec::new();
        for _ in 0..3 {
            let next = sched.rotate();
            seen.push(unsafe { (*next).pid });
        }
        assert_eq!(seen, alloc::vec![2, 3, 1]);

        sched.terminate(2).unwrap();
        assert_eq!(sched.terminate(2), Err(TaskError::NoSuchPid));
    }

    #[test]
    fn on_tick_advances_simulated_clock_every_fourth_tick() {
        let sched = Scheduler::new();
        for _ in 0..(TICKS_PER_SIMULATED_MS * 2) {
            sched.on_tick();
        }
        assert_eq!(sched.simulated_millis(), 2);
        assert_eq!(sched.tick_count(), (TICKS_PER_SIMULATED_MS * 2) as u64);
    }

    #[test]
    fn newly_spawned_task_self_pointer_matches_r15() {
        let sched = Scheduler::new();
        sched.spawn_kernel(dummy_entry, 0x1000);
        let desc = sched.run_queue.lock().get(1).map(|d| d.gp.r15).unwrap();
        let addr = sched.run_queue.lock().get(1).map(|d| d.self_ptr()).unwrap();
        assert_eq!(desc, addr);
    }
}
