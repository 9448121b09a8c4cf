//! # rrsched Demo Firmware
//!
//! Three counter tasks sharing the core in 1 ms slices.
//!
//! | Task | Counter | Work per loop |
//! |------|---------|---------------|
//! | `counter_task` | `FAST` | one increment |
//! | `counter_task` | `SLOW` | one increment, then a busy wait |
//! | `watcher_task` | `SEEN` | mirrors the sum of the other two |
//!
//! Each task receives a pointer to its own state as its argument. Under a
//! debugger, the three counters advance in turn: the two counter tasks get
//! equal slices no matter how much work each loop does.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt_rtt as _;
use panic_halt as _;

use rrsched::config::DEFAULT_TIME_SLICE_MS;
use rrsched::kernel;
use rrsched::task::TaskArg;

static FAST: AtomicU32 = AtomicU32::new(0);
static SLOW: AtomicU32 = AtomicU32::new(0);
static SEEN: AtomicU32 = AtomicU32::new(0);

/// Busy-wait length used by the slow counter.
const SLOW_SPIN: u32 = 10_000;

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// Increments the counter passed as `arg`, forever.
extern "C" fn counter_task(arg: TaskArg) -> ! {
    // SAFETY: registered with a pointer to a 'static AtomicU32.
    let counter = unsafe { &*(arg as *const AtomicU32) };
    loop {
        counter.fetch_add(1, Ordering::Relaxed);
        if core::ptr::eq(counter, &SLOW) {
            for _ in 0..SLOW_SPIN {
                cortex_m::asm::nop();
            }
        }
    }
}

/// Publishes FAST + SLOW into the counter passed as `arg`.
extern "C" fn watcher_task(arg: TaskArg) -> ! {
    // SAFETY: registered with a pointer to a 'static AtomicU32.
    let seen = unsafe { &*(arg as *const AtomicU32) };
    loop {
        let total = FAST
            .load(Ordering::Relaxed)
            .wrapping_add(SLOW.load(Ordering::Relaxed));
        seen.store(total, Ordering::Relaxed);
    }
}

fn arg_of(counter: &'static AtomicU32) -> TaskArg {
    counter as *const AtomicU32 as TaskArg
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    defmt::info!("rrsched demo");
    kernel::initialize(cp, DEFAULT_TIME_SLICE_MS);

    kernel::register_task(counter_task, arg_of(&FAST));
    kernel::register_task(counter_task, arg_of(&SLOW));
    kernel::register_task(watcher_task, arg_of(&SEEN));

    kernel::start()
}
