//! # Architecture Abstraction Layer
//!
//! The hardware boundary of the scheduler. The Dispatcher's register
//! save/restore and exception return go through [`ContextPort`]; everything
//! above it (task table, stack builder, round-robin arithmetic) is portable.
//!
//! Only Armv7-M is implemented ([`armv7m`]); the host model in
//! `crate::host` implements the same seam in software.

use crate::task::StackPtr;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod armv7m;

/// The three architecture-specific steps of a context switch.
///
/// Implementations run inside the switch-request exception.
pub trait ContextPort {
    /// Mask interrupts, push the callee-saved registers below the active
    /// stack pointer, and return the resulting pointer.
    ///
    /// # Safety
    /// The active stack pointer must have room for the pushed registers.
    unsafe fn save_context(&mut self) -> StackPtr;

    /// Pop the callee-saved registers from `sp` and make the pointer just
    /// above them the active stack pointer.
    ///
    /// # Safety
    /// `sp` must point at a complete saved frame.
    unsafe fn restore_context(&mut self, sp: StackPtr);

    /// Unmask interrupts and return from the exception into unprivileged
    /// Thread mode, unstacking the hardware frame from the active stack
    /// pointer.
    ///
    /// # Safety
    /// The active stack pointer must point at a hardware frame.
    unsafe fn return_from_interrupt(&mut self);
}

/// Stop doing anything useful, forever.
pub fn park() -> ! {
    loop {
        #[cfg(all(target_arch = "arm", target_os = "none"))]
        ::cortex_m::asm::wfi();
        #[cfg(not(all(target_arch = "arm", target_os = "none")))]
        core::hint::spin_loop();
    }
}
