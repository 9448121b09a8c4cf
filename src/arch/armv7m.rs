//! # Armv7-M Port Layer
//!
//! Hardware-specific code for Cortex-M3/M4 (Thumb-2). Implements the
//! context switch in PendSV, the SysTick tick source, and start-up of the
//! first task.
//!
//! ## Context Switch Mechanism
//!
//! The core uses a split-stack model:
//! - **MSP** (Main Stack Pointer): `main()` before `start()`, and all
//!   exception handlers
//! - **PSP** (Process Stack Pointer): tasks in Thread mode
//!
//! On exception entry the hardware stacks R0-R3, R12, LR, PC and xPSR onto
//! the process stack. PendSV saves and restores R4-R11 by hand, which
//! completes the [`ExceptionFrame`](crate::frame::ExceptionFrame).
//! Only basic (non-FPU) frames are supported: tasks must not touch the FPU.
//!
//! ## Interrupt Priorities
//!
//! SysTick and PendSV both run at the lowest priority (0xFF). PendSV
//! additionally masks interrupts for its whole body, so a tick can never
//! observe a half-finished switch.

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};
use core::arch::naked_asm;

use crate::task::StackPtr;
use crate::timer::{PendSwitch, TickSource};

// ---------------------------------------------------------------------------
// SysTick as tick source
// ---------------------------------------------------------------------------

impl TickSource for SYST {
    fn program(&mut self, reload: u32) {
        self.disable_counter();
        self.set_reload(reload);
        self.clear_current();
        self.set_clock_source(SystClkSource::Core);
    }

    fn enable(&mut self) {
        self.enable_interrupt();
        self.enable_counter();
    }
}

// ---------------------------------------------------------------------------
// PendSV as switch request
// ---------------------------------------------------------------------------

/// Handle on the PendSV pending bit (ICSR.PENDSVSET).
pub struct PendSv;

impl PendSwitch for PendSv {
    #[inline]
    fn pend_switch(&mut self) {
        SCB::set_pendsv();
    }
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Put PendSV and SysTick at the lowest exception priority so the switch
/// never preempts an application ISR.
pub fn set_interrupt_priorities(scb: &mut SCB) {
    unsafe {
        scb.set_priority(SystemHandler::PendSV, 0xFF);
        scb.set_priority(SystemHandler::SysTick, 0xFF);
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Point PSP at `sp` ahead of the first switch.
///
/// The first PendSV pushes R4-R11 below PSP before it knows there is no
/// outgoing task. Priming PSP with task 0's `saved_sp` keeps that throwaway
/// push inside task 0's own (still unused) stack.
///
/// # Safety
/// `sp` must point into a task stack with at least 32 free bytes below it.
pub unsafe fn prime_process_stack(sp: StackPtr) {
    unsafe { cortex_m::register::psp::write(sp as u32) };
}

/// Raise the switch request from Thread mode and wait for it to be taken.
/// Does not return once a task has been registered.
pub fn request_first_switch() -> ! {
    SCB::set_pendsv();
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
    crate::arch::park()
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler: the Dispatcher.
///
/// This is the three [`ContextPort`](crate::arch::ContextPort) operations
/// written out in assembly around one call into
/// [`Scheduler::switch_stacks`](crate::scheduler::Scheduler::switch_stacks):
///
/// - `save_context`: `cpsid i`, read PSP, `stmdb` R4-R11
/// - `restore_context`: `ldmia` R4-R11, write PSP
/// - `return_from_interrupt`: set CONTROL.nPRIV, `cpsie i`, `bx` to
///   EXC_RETURN `0xFFFFFFFD` (Thread mode, PSP)
///
/// Only R0-R3 and R12 may be used as scratch before R4-R11 are saved: they
/// are the registers the hardware already stacked. The `bl` clobbers LR,
/// which is why EXC_RETURN is rebuilt rather than preserved. MSP is 8-byte
/// aligned on entry and nothing is pushed on it, so the call is AAPCS
/// compliant.
///
/// # Safety
/// Entered only by the NVIC.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",

        // r0 = outgoing sp in, incoming sp out
        "bl {switch}",

        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",

        // Thread mode unprivileged; SPSEL follows EXC_RETURN
        "movs r0, #1",
        "msr control, r0",
        "isb",

        "mov lr, #0xFFFFFFFD",
        "cpsie i",
        "bx lr",

        switch = sym pendsv_switch_stacks,
    );
}

/// Rust half of PendSV. Runs with interrupts masked.
extern "C" fn pendsv_switch_stacks(outgoing_sp: StackPtr) -> StackPtr {
    // SAFETY: PendSV is the only code touching the scheduler after start(),
    // and it runs with interrupts masked.
    let kernel = unsafe { crate::kernel::KERNEL.get() };
    kernel.scheduler.switch_stacks(outgoing_sp)
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler. Every expiry requests one switch.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    // SAFETY: the timer is only read here; it was installed before the
    // counter was enabled and is not touched again.
    let kernel = unsafe { crate::kernel::KERNEL.get() };
    if let Some(timer) = kernel.timer.as_ref() {
        timer.on_expiry(&mut PendSv);
    }
}
