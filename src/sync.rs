//! # Synchronization Primitives
//!
//! The kernel's single shared value and the critical section used to reach
//! it from Thread mode.
//!
//! There is exactly one mutual-exclusion discipline in rrsched: code that
//! touches scheduler state either runs before `start()` with interrupts
//! masked, or runs inside PendSV/SysTick, which never preempt each other.

use core::cell::UnsafeCell;

use cortex_m::interrupt;

/// Interior-mutable home for the kernel singleton.
pub struct KernelCell<T>(UnsafeCell<T>);

// Safety: single core; every access path documents its exclusion.
unsafe impl<T> Sync for KernelCell<T> {}

impl<T> KernelCell<T> {
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// # Safety
    /// The caller must be the only code touching the value for the
    /// lifetime of the returned reference: inside [`critical_section`]
    /// before `start()`, or in a handler at scheduler priority after it.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn get(&self) -> &mut T {
        unsafe { &mut *self.0.get() }
    }
}

/// Execute a closure with interrupts disabled, restoring them afterwards.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}
