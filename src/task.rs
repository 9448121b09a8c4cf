//! # Task Control Block
//!
//! Defines the task model for rrsched. A task is an entry function that
//! never returns, one opaque argument, and a private stack slot. Tasks are
//! identified by registration order and visited in that order, forever.
//!
//! ## Lifecycle
//!
//! ```text
//!   ┌──────────┐   register_task()   ┌──────────┐
//!   │   Free   │ ──────────────────► │  Active  │ ──┐
//!   └──────────┘                     └──────────┘   │ switch (saved_sp only)
//!                                          ▲        │
//!                                          └────────┘
//! ```
//!
//! There is no way back to `Free`: once registered a slot is owned by its
//! task for the life of the system.

use core::ffi::c_void;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// One machine register / stack word. 32 bits on the target.
pub type Word = usize;

/// Stack pointer into a task's private stack.
pub type StackPtr = *mut Word;

/// Opaque argument handed to a task's entry function in `r0`.
pub type TaskArg = *mut c_void;

/// Task entry point. Receives its registration argument and runs forever.
pub type TaskEntry = extern "C" fn(TaskArg) -> !;

/// Task identity: the registration index, `0..N`.
pub type TaskId = usize;

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB).
///
/// Everything except `saved_sp` is written once, at registration.
/// `saved_sp` is written only by the Dispatcher, and is meaningless while
/// the task is the one running.
#[derive(Debug, Clone, Copy)]
pub struct Task {
    entry: Option<TaskEntry>,
    arg: TaskArg,
    saved_sp: StackPtr,
    active: bool,
}

impl Task {
    /// An unclaimed slot.
    pub const EMPTY: Self = Self {
        entry: None,
        arg: core::ptr::null_mut(),
        saved_sp: core::ptr::null_mut(),
        active: false,
    };

    pub fn entry(&self) -> Option<TaskEntry> {
        self.entry
    }

    pub fn arg(&self) -> TaskArg {
        self.arg
    }

    /// Top of the saved register image while the task is suspended.
    pub fn saved_sp(&self) -> StackPtr {
        self.saved_sp
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

// ---------------------------------------------------------------------------
// Task table
// ---------------------------------------------------------------------------

/// Fixed-capacity record of registered tasks.
///
/// Slots fill strictly in order; slot `i` is valid for `i < len()`.
pub struct TaskTable<const N: usize> {
    tasks: [Task; N],
    count: usize,
}

// Safety: the raw pointers held by each Task point into the scheduler's own
// stack arena. The table is only touched before start() or from the
// Dispatcher with interrupts masked.
unsafe impl<const N: usize> Send for TaskTable<N> {}

impl<const N: usize> TaskTable<N> {
    pub const fn new() -> Self {
        Self {
            tasks: [Task::EMPTY; N],
            count: 0,
        }
    }

    /// Forget every registration.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Claim the next slot for `entry`.
    ///
    /// Returns `None` once all `N` slots are taken; the caller is expected
    /// to drop the task silently. The slot's `saved_sp` is left null until
    /// [`set_saved_sp`](Self::set_saved_sp) records the built frame.
    pub fn claim(&mut self, entry: TaskEntry, arg: TaskArg) -> Option<TaskId> {
        if self.count >= N {
            return None;
        }

        let id = self.count;
        self.tasks[id] = Task {
            entry: Some(entry),
            arg,
            saved_sp: core::ptr::null_mut(),
            active: true,
        };
        self.count += 1;
        Some(id)
    }

    /// Number of registered tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= N
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Registered task `id`, or `None` for a free slot.
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks[..self.count].get(id)
    }

    #[inline]
    pub(crate) fn saved_sp(&self, id: TaskId) -> StackPtr {
        self.tasks[id].saved_sp
    }

    #[inline]
    pub(crate) fn set_saved_sp(&mut self, id: TaskId, sp: StackPtr) {
        self.tasks[id].saved_sp = sp;
    }

    /// Iterate over registered tasks in visiting order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks[..self.count].iter()
    }
}

impl<const N: usize> Default for TaskTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop(_: TaskArg) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    fn arg(v: usize) -> TaskArg {
        v as TaskArg
    }

    #[test]
    fn test_empty_table() {
        let table: TaskTable<4> = TaskTable::new();
        assert!(table.is_empty());
        assert!(!table.is_full());
        assert_eq!(table.capacity(), 4);
        assert!(table.get(0).is_none());
    }

    #[test]
    fn test_claim_in_registration_order() {
        let mut table: TaskTable<3> = TaskTable::new();
        assert_eq!(table.claim(noop, arg(10)), Some(0));
        assert_eq!(table.claim(noop, arg(11)), Some(1));

        assert_eq!(table.len(), 2);
        let t1 = table.get(1).unwrap();
        assert!(t1.is_active());
        assert_eq!(t1.arg(), arg(11));
        assert!(t1.entry().is_some());
        assert!(t1.saved_sp().is_null());
        assert!(table.get(2).is_none());
    }

    #[test]
    fn test_claim_beyond_capacity_is_refused() {
        let mut table: TaskTable<2> = TaskTable::new();
        table.claim(noop, arg(1));
        table.claim(noop, arg(2));
        assert!(table.is_full());

        assert_eq!(table.claim(noop, arg(3)), None);
        assert_eq!(table.len(), 2);
        let args: [TaskArg; 2] = [table.get(0).unwrap().arg(), table.get(1).unwrap().arg()];
        assert_eq!(args, [arg(1), arg(2)]);
    }

    #[test]
    fn test_reset_frees_all_slots() {
        let mut table: TaskTable<2> = TaskTable::new();
        table.claim(noop, arg(1));
        table.reset();
        assert!(table.is_empty());
        assert_eq!(table.claim(noop, arg(5)), Some(0));
    }

    #[test]
    fn test_saved_sp_is_per_slot() {
        let mut table: TaskTable<3> = TaskTable::new();
        for i in 0..3 {
            table.claim(noop, arg(i));
        }
        let mut words = [0usize; 4];
        let sp = words.as_mut_ptr().wrapping_add(2);
        table.set_saved_sp(1, sp);

        assert!(table.saved_sp(0).is_null());
        assert_eq!(table.saved_sp(1), sp);
        assert!(table.saved_sp(2).is_null());
        assert_eq!(table.iter().filter(|t| !t.saved_sp().is_null()).count(), 1);
    }
}
