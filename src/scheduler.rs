//! # Scheduler
//!
//! Task registration and the Dispatcher: the round-robin core that every
//! context switch runs through.
//!
//! ## Switch Algorithm
//!
//! Each switch request (a tick, or the one raised by `start()`) runs, with
//! interrupts masked from start to finish:
//! 1. Read the process stack pointer; the core has already stacked the
//!    hardware half of the frame there
//! 2. Push `r4-r11` below it and store the result as the outgoing task's
//!    `saved_sp`
//! 3. Advance the current index modulo the task count
//! 4. Load the incoming task's `saved_sp`
//! 5. Pop `r4-r11`
//! 6. Write the result to the process stack pointer
//! 7. Exception-return to unprivileged Thread mode on the process stack
//!
//! Steps 1-2, 5-6 and 7 are the architecture shim ([`ContextPort`]).
//! Steps 2 (the store), 3 and 4 are [`Scheduler::switch_stacks`], plain
//! Rust that the host tests drive directly.
//!
//! ## First Entry
//!
//! `start()` primes the process stack pointer with task 0's `saved_sp` and
//! raises the same switch request the timer uses. While the Dispatcher is
//! `NotStarted` there is no outgoing task, so the pushed registers are
//! discarded and index 0 is selected: the first switch resumes task 0.

use crate::arch::ContextPort;
use crate::stack::StackArena;
use crate::task::{StackPtr, TaskArg, TaskEntry, TaskId, TaskTable};

// ---------------------------------------------------------------------------
// Dispatcher state
// ---------------------------------------------------------------------------

/// Which task, if any, owns the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// `start()` has not completed its first switch yet.
    NotStarted,
    /// Task `i` is running (or is the one whose frame was just restored).
    Running(TaskId),
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// Scheduler state: the task table, the stack arena backing it, and the
/// Dispatcher's current index.
///
/// `N` is the task capacity, `W` the stack size of each task in words.
///
/// Registered tasks' saved stack pointers point into `self`, so a
/// `Scheduler` must stay where it is once the first task is registered.
/// On the target it lives in a `static`.
pub struct Scheduler<const N: usize, const W: usize> {
    table: TaskTable<N>,
    stacks: StackArena<N, W>,
    state: DispatchState,
}

impl<const N: usize, const W: usize> Scheduler<N, W> {
    pub const fn new() -> Self {
        Self {
            table: TaskTable::new(),
            stacks: StackArena::new(),
            state: DispatchState::NotStarted,
        }
    }

    /// Drop every registration and return to `NotStarted`.
    ///
    /// Stack contents are left as they are; the next registration into a
    /// slot overwrites its frame.
    pub fn reset(&mut self) {
        self.table.reset();
        self.state = DispatchState::NotStarted;
    }

    /// Register a task to run in round-robin order.
    ///
    /// Silently ignored when all `N` slots are taken, and once the
    /// Dispatcher has started. Otherwise claims the next slot, builds the
    /// task's first frame at the top of its stack and records `saved_sp`.
    pub fn register_task(&mut self, entry: TaskEntry, arg: TaskArg) {
        if self.state != DispatchState::NotStarted {
            warn!("register_task after start ignored");
            return;
        }

        let Some(id) = self.table.claim(entry, arg) else {
            warn!("task table full ({} slots), registration dropped", N);
            return;
        };

        let sp = self.stacks.build(id, entry, arg);
        self.table.set_saved_sp(id, sp);
        debug!("task {} registered, frame at {=usize:#x}", id, sp as usize);
    }

    /// Value `start()` primes the process stack pointer with: task 0's
    /// `saved_sp`. `None` with no tasks registered, in which case there is
    /// nothing to start and the caller must halt.
    pub fn prime(&self) -> Option<StackPtr> {
        if self.table.is_empty() {
            return None;
        }
        info!("starting {} task(s)", self.table.len());
        Some(self.table.saved_sp(0))
    }

    /// Dispatcher core: record the outgoing stack pointer, pick the next
    /// task, return its stack pointer.
    ///
    /// Writes only the outgoing task's `saved_sp` and reads only the
    /// incoming task's. With no tasks registered nothing is advanced and
    /// `outgoing_sp` comes straight back.
    ///
    /// Runs with interrupts masked.
    pub fn switch_stacks(&mut self, outgoing_sp: StackPtr) -> StackPtr {
        let count = self.table.len();
        if count == 0 {
            return outgoing_sp;
        }

        let next = match self.state {
            DispatchState::NotStarted => 0,
            DispatchState::Running(current) => {
                self.table.set_saved_sp(current, outgoing_sp);
                (current + 1) % count
            }
        };

        self.state = DispatchState::Running(next);
        trace!("switch -> task {}", next);
        self.table.saved_sp(next)
    }

    /// Full switch through an architecture shim: save, pick, restore,
    /// return from the interrupt.
    ///
    /// # Safety
    /// Must run in the switch-request exception with `port`'s active stack
    /// pointer at a hardware-stacked frame (or, before the first switch,
    /// primed by `start()`). Every registered `saved_sp` must point at an
    /// intact frame.
    pub unsafe fn dispatch<P: ContextPort>(&mut self, port: &mut P) {
        let outgoing = unsafe { port.save_context() };
        let incoming = self.switch_stacks(outgoing);
        unsafe {
            port.restore_context(incoming);
            port.return_from_interrupt();
        }
    }

    /// Index of the running task, `None` before the first switch.
    pub fn current(&self) -> Option<TaskId> {
        match self.state {
            DispatchState::NotStarted => None,
            DispatchState::Running(i) => Some(i),
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn task_count(&self) -> usize {
        self.table.len()
    }

    pub fn table(&self) -> &TaskTable<N> {
        &self.table
    }

    pub fn stacks(&self) -> &StackArena<N, W> {
        &self.stacks
    }
}

impl<const N: usize, const W: usize> Default for Scheduler<N, W> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
