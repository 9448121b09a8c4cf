//! # rrsched Configuration
//!
//! Compile-time constants governing the scheduler. All limits are fixed at
//! compile time; nothing is allocated at runtime.

/// Maximum number of tasks the scheduler will accept. Registrations beyond
/// this are dropped. Each slot reserves `STACK_WORDS` words of RAM whether
/// or not a task is registered into it.
pub const MAX_TASKS: usize = 10;

/// Per-task stack size in words (4 KiB on a 32-bit core). Must cover the
/// deepest call chain of the task plus one full exception frame
/// (8 hardware-stacked words and 8 software-saved words).
pub const STACK_WORDS: usize = 1024;

/// Reference clock feeding SysTick, in Hz (STM32F4 HSI after reset).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Time slice used by the demo firmware, in milliseconds.
pub const DEFAULT_TIME_SLICE_MS: u32 = 1;
