//! # Exception Frame
//!
//! Register image of a suspended task, laid out exactly as it sits on the
//! task's stack.
//!
//! On exception entry an Armv7-M core (without an active FPU context)
//! pushes eight words onto the process stack: `r0-r3`, `r12`, `lr`, `pc`
//! and `xPSR`, lowest address first. The Dispatcher then pushes the eight
//! callee-saved registers `r4-r11` below them with `stmdb`. A task's
//! `saved_sp` therefore points at `r4`:
//!
//! ```text
//!  high  ┌────────┐
//!        │  xPSR  │ ┐
//!        │   PC   │ │
//!        │   LR   │ │
//!        │  R12   │ │ HardwareFrame (stacked/unstacked by the core)
//!        │   R3   │ │
//!        │   R2   │ │
//!        │   R1   │ │
//!        │   R0   │ ┘
//!        │  R11   │ ┐
//!        │  ...   │ │ CalleeSaved (pushed/popped by the Dispatcher)
//!  low   │   R4   │ ┘ <- saved_sp
//!        └────────┘
//! ```
//!
//! The field order, count, and size below must match this picture
//! bit-for-bit; the assertions at the bottom of the file enforce it.

use crate::task::{TaskArg, TaskEntry, Word};

/// Number of words the core stacks automatically on exception entry.
pub const HW_FRAME_WORDS: usize = 8;

/// Number of words the Dispatcher saves by hand (`r4-r11`).
pub const SW_FRAME_WORDS: usize = 8;

/// Total words in one [`ExceptionFrame`].
pub const FRAME_WORDS: usize = HW_FRAME_WORDS + SW_FRAME_WORDS;

/// Initial program status: only the Thumb bit set. Cortex-M cannot execute
/// ARM-state code, so a frame with T=0 faults on exception return.
pub const INITIAL_XPSR: Word = 0x0100_0000;

/// Exception return value selecting Thread mode on the process stack,
/// basic (non-FPU) frame.
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Stacked return addresses carry no Thumb bit; the core takes the
/// execution state from `xPSR.T` instead.
const RETURN_ADDRESS_MASK: Word = !1;

/// Registers stacked by the hardware on exception entry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareFrame {
    pub r0: Word,
    pub r1: Word,
    pub r2: Word,
    pub r3: Word,
    pub r12: Word,
    pub lr: Word,
    pub pc: Word,
    pub xpsr: Word,
}

/// Callee-saved registers the Dispatcher pushes below the hardware frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalleeSaved {
    pub r4: Word,
    pub r5: Word,
    pub r6: Word,
    pub r7: Word,
    pub r8: Word,
    pub r9: Word,
    pub r10: Word,
    pub r11: Word,
}

impl CalleeSaved {
    /// Registers in stacking order (`r4` first, at the lowest address).
    pub const fn to_words(&self) -> [Word; SW_FRAME_WORDS] {
        [
            self.r4, self.r5, self.r6, self.r7, self.r8, self.r9, self.r10, self.r11,
        ]
    }

    pub const fn from_words(w: &[Word; SW_FRAME_WORDS]) -> Self {
        Self {
            r4: w[0],
            r5: w[1],
            r6: w[2],
            r7: w[3],
            r8: w[4],
            r9: w[5],
            r10: w[6],
            r11: w[7],
        }
    }
}

impl HardwareFrame {
    /// Registers in stacking order (`r0` first, at the lowest address).
    pub const fn to_words(&self) -> [Word; HW_FRAME_WORDS] {
        [
            self.r0, self.r1, self.r2, self.r3, self.r12, self.lr, self.pc, self.xpsr,
        ]
    }

    pub const fn from_words(w: &[Word; HW_FRAME_WORDS]) -> Self {
        Self {
            r0: w[0],
            r1: w[1],
            r2: w[2],
            r3: w[3],
            r12: w[4],
            lr: w[5],
            pc: w[6],
            xpsr: w[7],
        }
    }
}

/// Full register image of a suspended task.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExceptionFrame {
    /// Lower half, at `saved_sp`.
    pub callee: CalleeSaved,
    /// Upper half, what exception return pops.
    pub hw: HardwareFrame,
}

impl ExceptionFrame {
    /// Build the synthetic frame for a task that has never run.
    ///
    /// Resuming from it is indistinguishable from resuming a task that was
    /// interrupted on the first instruction of `entry` with `arg` in `r0`.
    /// `lr` points at `exit_trap` so a task that returns despite its `!`
    /// signature parks the core instead of jumping to address zero.
    pub fn initial(entry: TaskEntry, arg: TaskArg, exit_trap: TaskEntry) -> Self {
        Self {
            callee: CalleeSaved::default(),
            hw: HardwareFrame {
                r0: arg as Word,
                lr: exit_trap as usize as Word,
                pc: return_address(entry),
                xpsr: INITIAL_XPSR,
                ..HardwareFrame::default()
            },
        }
    }

    /// The frame as it lies in memory, lowest address first.
    pub fn to_words(&self) -> [Word; FRAME_WORDS] {
        let mut words = [0; FRAME_WORDS];
        words[..SW_FRAME_WORDS].copy_from_slice(&self.callee.to_words());
        words[SW_FRAME_WORDS..].copy_from_slice(&self.hw.to_words());
        words
    }

    pub fn from_words(words: &[Word; FRAME_WORDS]) -> Self {
        let mut callee = [0; SW_FRAME_WORDS];
        let mut hw = [0; HW_FRAME_WORDS];
        callee.copy_from_slice(&words[..SW_FRAME_WORDS]);
        hw.copy_from_slice(&words[SW_FRAME_WORDS..]);
        Self {
            callee: CalleeSaved::from_words(&callee),
            hw: HardwareFrame::from_words(&hw),
        }
    }
}

/// Address the core resumes at for `entry`.
pub fn return_address(entry: TaskEntry) -> Word {
    entry as usize as Word & RETURN_ADDRESS_MASK
}

const _: () = {
    use core::mem::{offset_of, size_of};
    let word = size_of::<Word>();
    assert!(size_of::<HardwareFrame>() == HW_FRAME_WORDS * word);
    assert!(size_of::<CalleeSaved>() == SW_FRAME_WORDS * word);
    assert!(size_of::<ExceptionFrame>() == FRAME_WORDS * word);
    assert!(offset_of!(ExceptionFrame, callee) == 0);
    assert!(offset_of!(ExceptionFrame, hw) == SW_FRAME_WORDS * word);
    assert!(offset_of!(HardwareFrame, pc) == 6 * word);
    assert!(offset_of!(HardwareFrame, xpsr) == 7 * word);
};
