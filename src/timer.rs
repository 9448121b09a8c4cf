//! # Tick Timer
//!
//! Periodic time source for preemption. The timer turns a time slice in
//! milliseconds into a countdown reload value, programs the hardware, and
//! on each expiry raises the switch request. It knows nothing about tasks:
//! the switch itself belongs to the Dispatcher.

use crate::config::SYSTEM_CLOCK_HZ;

/// Largest reload value the 24-bit SysTick counter accepts.
pub const MAX_RELOAD: u32 = 0x00FF_FFFF;

/// Smallest reload value that still produces interrupts (0 stops SysTick).
pub const MIN_RELOAD: u32 = 1;

// ---------------------------------------------------------------------------
// Hardware seams
// ---------------------------------------------------------------------------

/// A periodic countdown peripheral.
pub trait TickSource {
    /// Load `reload`, clear the current count, select the core clock.
    /// Must not start counting.
    fn program(&mut self, reload: u32);

    /// Start counting and enable the expiry interrupt.
    fn enable(&mut self);
}

/// The software-pending switch request (PendSV on Cortex-M).
pub trait PendSwitch {
    fn pend_switch(&mut self);
}

// ---------------------------------------------------------------------------
// Reload arithmetic
// ---------------------------------------------------------------------------

/// Reload value for a `time_slice_ms` period at `clock_hz`.
///
/// The counter wraps after `reload + 1` cycles, hence the `- 1`. Results
/// outside the counter's range are clamped.
pub fn reload_for(clock_hz: u32, time_slice_ms: u32) -> u32 {
    let cycles = (clock_hz / 1000) as u64 * time_slice_ms as u64;
    let reload = cycles.saturating_sub(1);

    if reload > MAX_RELOAD as u64 {
        warn!(
            "time slice {} ms exceeds SysTick range, clamped to {} cycles",
            time_slice_ms,
            MAX_RELOAD + 1
        );
        MAX_RELOAD
    } else if reload < MIN_RELOAD as u64 {
        warn!("time slice {} ms too short, clamped to minimum reload", time_slice_ms);
        MIN_RELOAD
    } else {
        reload as u32
    }
}

// ---------------------------------------------------------------------------
// TickTimer
// ---------------------------------------------------------------------------

/// Periodic preemption timer over a [`TickSource`].
pub struct TickTimer<S> {
    source: S,
    clock_hz: u32,
    reload: u32,
    running: bool,
}

impl<S: TickSource> TickTimer<S> {
    /// Timer driven by the default reference clock.
    pub fn new(source: S) -> Self {
        Self::with_clock(source, SYSTEM_CLOCK_HZ)
    }

    pub fn with_clock(source: S, clock_hz: u32) -> Self {
        Self {
            source,
            clock_hz,
            reload: 0,
            running: false,
        }
    }

    /// Program the interval. The counter stays stopped until
    /// [`start`](Self::start).
    pub fn configure(&mut self, time_slice_ms: u32) {
        self.reload = reload_for(self.clock_hz, time_slice_ms);
        self.source.program(self.reload);
        info!(
            "tick timer: {} ms slice, reload {} at {} Hz",
            time_slice_ms, self.reload, self.clock_hz
        );
    }

    pub fn start(&mut self) {
        self.source.enable();
        self.running = true;
    }

    /// Expiry handler body: request a switch, nothing more.
    #[inline]
    pub fn on_expiry<P: PendSwitch>(&self, pending: &mut P) {
        pending.pend_switch();
    }

    pub fn reload(&self) -> u32 {
        self.reload
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeSysTick {
        reload: Option<u32>,
        enabled: bool,
    }

    impl TickSource for FakeSysTick {
        fn program(&mut self, reload: u32) {
            self.reload = Some(reload);
        }
        fn enable(&mut self) {
            self.enabled = true;
        }
    }

    #[derive(Default)]
    struct Pending(u32);

    impl PendSwitch for Pending {
        fn pend_switch(&mut self) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_reload_one_millisecond() {
        assert_eq!(reload_for(16_000_000, 1), 15_999);
        assert_eq!(reload_for(120_000_000, 1), 119_999);
    }

    #[test]
    fn test_reload_scales_with_slice() {
        assert_eq!(reload_for(16_000_000, 10), 159_999);
    }

    #[test]
    fn test_reload_clamps_to_counter_range() {
        // 120 MHz * 200 ms does not fit in 24 bits
        assert_eq!(reload_for(120_000_000, 200), MAX_RELOAD);
        assert_eq!(reload_for(120_000_000, u32::MAX), MAX_RELOAD);
        assert_eq!(reload_for(16_000_000, 0), MIN_RELOAD);
    }

    #[test]
    fn test_configure_programs_without_starting() {
        let mut timer = TickTimer::with_clock(FakeSysTick::default(), 16_000_000);
        timer.configure(2);

        assert_eq!(timer.reload(), 31_999);
        assert_eq!(timer.source().reload, Some(31_999));
        assert!(!timer.source().enabled);
        assert!(!timer.is_running());

        timer.start();
        assert!(timer.source().enabled);
        assert!(timer.is_running());
    }

    #[test]
    fn test_expiry_only_pends_a_switch() {
        let timer = TickTimer::new(FakeSysTick::default());
        let mut pending = Pending::default();
        timer.on_expiry(&mut pending);
        timer.on_expiry(&mut pending);
        assert_eq!(pending.0, 2);
    }
}
