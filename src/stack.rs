//! # Task Stacks
//!
//! Arena of per-task stacks and the builder that plants each task's
//! synthetic first frame.
//!
//! Every slot is reserved up front, indexed by task id, and never resized
//! or handed to another task. Stacks grow downward; a new task's frame is
//! written into the top [`FRAME_WORDS`] words of its slot so that the first
//! switch into the task looks exactly like resuming an interrupted one.

use crate::frame::{ExceptionFrame, FRAME_WORDS};
use crate::task::{StackPtr, TaskArg, TaskEntry, TaskId, Word};

/// One task's stack. 8-byte aligned as AAPCS requires at public interfaces
/// (and as the core expects of an exception frame).
#[repr(C, align(8))]
pub struct StackSlot<const W: usize> {
    words: [Word; W],
}

impl<const W: usize> StackSlot<W> {
    const CHECK: () = {
        assert!(W >= FRAME_WORDS, "stack slot cannot hold one exception frame");
        assert!(
            (W * core::mem::size_of::<Word>()) % 8 == 0,
            "stack slot top would not be 8-byte aligned"
        );
    };

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CHECK;
        Self { words: [0; W] }
    }

    /// One past the highest word of the slot.
    pub fn top(&mut self) -> StackPtr {
        self.words.as_mut_ptr_range().end
    }

    /// Whether `sp` points inside this slot (or at its top).
    pub fn contains(&self, sp: StackPtr) -> bool {
        let range = self.words.as_ptr_range();
        let sp = sp as *const Word;
        sp >= range.start && sp <= range.end
    }

    /// Write the initial frame for `entry`/`arg` at the top of the slot and
    /// return the resulting saved stack pointer.
    pub fn build_initial_frame(
        &mut self,
        entry: TaskEntry,
        arg: TaskArg,
        exit_trap: TaskEntry,
    ) -> StackPtr {
        let frame = ExceptionFrame::initial(entry, arg, exit_trap);
        let base = W - FRAME_WORDS;
        self.words[base..].copy_from_slice(&frame.to_words());
        self.words[base..].as_mut_ptr()
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }
}

/// `N` stack slots of `W` words each.
pub struct StackArena<const N: usize, const W: usize> {
    slots: [StackSlot<W>; N],
}

impl<const N: usize, const W: usize> StackArena<N, W> {
    pub const fn new() -> Self {
        Self {
            slots: [const { StackSlot::new() }; N],
        }
    }

    /// Build task `id`'s first frame in its own slot.
    pub fn build(&mut self, id: TaskId, entry: TaskEntry, arg: TaskArg) -> StackPtr {
        self.slots[id].build_initial_frame(entry, arg, task_exit)
    }

    pub fn slot(&self, id: TaskId) -> &StackSlot<W> {
        &self.slots[id]
    }

    pub fn slot_mut(&mut self, id: TaskId) -> &mut StackSlot<W> {
        &mut self.slots[id]
    }
}

impl<const N: usize, const W: usize> Default for StackArena<N, W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Landing pad in every initial frame's `lr`. Entry functions never return;
/// if one does anyway, park the core here rather than branch to zero.
pub extern "C" fn task_exit(_: TaskArg) -> ! {
    error!("task entry returned");
    crate::arch::park()
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{return_address, INITIAL_XPSR, SW_FRAME_WORDS};

    extern "C" fn worker(_: TaskArg) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    #[test]
    fn test_frame_sits_at_top_of_slot() {
        let mut arena: StackArena<2, 64> = StackArena::new();
        let sp = arena.build(1, worker, 0x42usize as TaskArg);

        let slot = arena.slot_mut(1);
        let top = slot.top();
        assert_eq!(top as usize - sp as usize, FRAME_WORDS * core::mem::size_of::<Word>());
        assert_eq!(sp as usize % 8, 0);
        assert!(slot.contains(sp));

        let words = slot.words();
        let frame_words: &[Word; FRAME_WORDS] = words[64 - FRAME_WORDS..].try_into().unwrap();
        let frame = ExceptionFrame::from_words(frame_words);
        assert_eq!(frame.hw.r0, 0x42);
        assert_eq!(frame.hw.pc, return_address(worker));
        assert_eq!(frame.hw.lr, task_exit as usize);
        assert_eq!(frame.hw.xpsr, INITIAL_XPSR);
        assert!(words[64 - FRAME_WORDS..64 - FRAME_WORDS + SW_FRAME_WORDS]
            .iter()
            .all(|&w| w == 0));
    }

    #[test]
    fn test_build_touches_only_its_own_slot() {
        let mut arena: StackArena<3, 32> = StackArena::new();
        let sp = arena.build(1, worker, 0x42usize as TaskArg);

        assert!(arena.slot(1).contains(sp));
        assert!(!arena.slot(0).contains(sp));
        assert!(!arena.slot(2).contains(sp));
        assert!(arena.slot(0).words().iter().all(|&w| w == 0));
        assert!(arena.slot(2).words().iter().all(|&w| w == 0));
    }

    #[test]
    fn test_slots_do_not_overlap() {
        let mut arena: StackArena<3, 32> = StackArena::new();
        let tops: [usize; 3] = core::array::from_fn(|i| arena.slot_mut(i).top() as usize);
        let span = 32 * core::mem::size_of::<Word>();
        assert!(tops[1] - tops[0] >= span);
        assert!(tops[2] - tops[1] >= span);
    }
}
