//! # Kernel
//!
//! Public API of rrsched on the target, and the one place the scheduler
//! singleton lives.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::initialize()     ← program SysTick, clear the table
//!         ├─► kernel::register_task()  ← build frames (×N, extra dropped)
//!         └─► kernel::start()          ← never returns
//!               ├─► prime PSP with task 0's saved_sp
//!               ├─► enable SysTick
//!               └─► pend PendSV        ← first switch resumes task 0
//! ```
//!
//! ## Preconditions
//!
//! None of these are checked at runtime beyond what is noted:
//! - `initialize()` is called once, before any registration
//! - all registrations happen before `start()` (later ones are dropped)
//! - at least one task is registered before `start()` (otherwise the core
//!   halts)
//! - each task stays within its `STACK_WORDS` words of stack and never
//!   uses the FPU

use cortex_m::peripheral::SYST;

use crate::arch::armv7m;
use crate::config::{MAX_TASKS, STACK_WORDS};
use crate::scheduler::Scheduler;
use crate::sync::{self, KernelCell};
use crate::task::{TaskArg, TaskEntry};
use crate::timer::TickTimer;

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

/// Scheduler sized by [`config`](crate::config).
pub type KernelScheduler = Scheduler<MAX_TASKS, STACK_WORDS>;

/// Everything the two exception handlers need.
pub struct Kernel {
    pub scheduler: KernelScheduler,
    pub timer: Option<TickTimer<SYST>>,
}

/// The kernel singleton. Reached from Thread mode only before `start()`,
/// inside a critical section; afterwards only from PendSV and SysTick.
pub(crate) static KERNEL: KernelCell<Kernel> = KernelCell::new(Kernel {
    scheduler: Scheduler::new(),
    timer: None,
});

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// One-time setup: program the tick interval and clear the task table.
///
/// SysTick is loaded but not started; it begins counting in [`start`].
pub fn initialize(mut core_peripherals: cortex_m::Peripherals, time_slice_ms: u32) {
    armv7m::set_interrupt_priorities(&mut core_peripherals.SCB);

    let mut timer = TickTimer::new(core_peripherals.SYST);
    timer.configure(time_slice_ms);

    sync::critical_section(|_cs| {
        // SAFETY: interrupts are masked and the scheduler is not running.
        let kernel = unsafe { KERNEL.get() };
        kernel.scheduler.reset();
        kernel.timer = Some(timer);
    });
}

/// Register a task. Silently dropped beyond `MAX_TASKS` or after
/// [`start`].
pub fn register_task(entry: TaskEntry, arg: TaskArg) {
    sync::critical_section(|_cs| {
        // SAFETY: interrupts are masked.
        let kernel = unsafe { KERNEL.get() };
        kernel.scheduler.register_task(entry, arg);
    });
}

/// Hand the processor to the registered tasks. **Does not return.**
///
/// With no task registered there is nothing to resume into and the core
/// halts.
pub fn start() -> ! {
    let launched = sync::critical_section(|_cs| {
        // SAFETY: interrupts are masked and the scheduler is not running.
        let kernel = unsafe { KERNEL.get() };
        let (Some(first_sp), Some(timer)) = (kernel.scheduler.prime(), kernel.timer.as_mut())
        else {
            return false;
        };

        // PSP must be primed before the first tick can pend a switch.
        // SAFETY: first_sp is task 0's freshly built frame, with the rest
        // of its stack free below it.
        unsafe { armv7m::prime_process_stack(first_sp) };
        timer.start();
        true
    });

    if !launched {
        halt("start() without a registered task or initialize()");
    }
    armv7m::request_first_switch()
}

/// Log `reason` and park the core for good.
pub fn halt(reason: &'static str) -> ! {
    error!("halt: {=str}", reason);
    crate::arch::park()
}
