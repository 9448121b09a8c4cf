//! # Host Machine Model
//!
//! A software stand-in for the Cortex-M core, so the whole switch path can
//! run and be inspected off target.
//!
//! [`HostCpu`] models just what a switch touches: the register file, PSP,
//! exception entry stacking, the interrupt mask, Thread-mode privilege and
//! the PendSV pending bit. It implements [`ContextPort`] with the same
//! memory effects as the PendSV assembly, on real task stacks.
//! [`HostMachine`] wires it to a [`Scheduler`] and a [`TickTimer`], and
//! replaces the hardware tick with an explicit [`tick`](HostMachine::tick).
//!
//! Task code never runs: a "running" task is whatever registers the model
//! holds, which tests may scribble on to stand in for task execution.

use crate::arch::ContextPort;
use crate::frame::{CalleeSaved, HardwareFrame, HW_FRAME_WORDS, SW_FRAME_WORDS};
use crate::scheduler::Scheduler;
use crate::task::{StackPtr, TaskArg, TaskEntry, TaskId, Word};
use crate::timer::{PendSwitch, TickSource, TickTimer};

// ---------------------------------------------------------------------------
// Simulated core
// ---------------------------------------------------------------------------

/// Processor mode of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Thread,
    Handler,
}

/// Register-level model of the core.
#[derive(Debug)]
pub struct HostCpu {
    /// `r0-r3`, `r12`, `lr`, `pc`, `xpsr` as the hardware would stack them.
    pub hw: HardwareFrame,
    /// `r4-r11`.
    pub callee: CalleeSaved,
    pub psp: StackPtr,
    pub mode: Mode,
    /// Thread mode on PSP (CONTROL.SPSEL as seen from Thread mode).
    pub on_process_stack: bool,
    pub privileged: bool,
    pub interrupts_masked: bool,
    pub switch_pending: bool,
    /// Exceptions taken while Thread mode was on MSP; their frames went to
    /// the main stack and are never unstacked.
    pub main_stack_entries: usize,
}

impl HostCpu {
    /// Reset state: privileged Thread mode on MSP, interrupts enabled.
    pub fn new() -> Self {
        Self {
            hw: HardwareFrame::default(),
            callee: CalleeSaved::default(),
            psp: core::ptr::null_mut(),
            mode: Mode::Thread,
            on_process_stack: false,
            privileged: true,
            interrupts_masked: false,
            switch_pending: false,
            main_stack_entries: 0,
        }
    }

    /// Exception entry: stack the hardware frame on the current Thread
    /// stack and enter Handler mode.
    ///
    /// # Safety
    /// When on the process stack, PSP must have room for the frame.
    pub unsafe fn exception_entry(&mut self) {
        if self.on_process_stack {
            let sp = self.psp.wrapping_sub(HW_FRAME_WORDS);
            unsafe { write_words(sp, &self.hw.to_words()) };
            self.psp = sp;
        } else {
            self.main_stack_entries += 1;
        }
        self.mode = Mode::Handler;
    }
}

impl Default for HostCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextPort for HostCpu {
    unsafe fn save_context(&mut self) -> StackPtr {
        self.interrupts_masked = true;
        let sp = self.psp.wrapping_sub(SW_FRAME_WORDS);
        unsafe { write_words(sp, &self.callee.to_words()) };
        sp
    }

    unsafe fn restore_context(&mut self, sp: StackPtr) {
        self.callee = CalleeSaved::from_words(&unsafe { read_words(sp) });
        self.psp = sp.wrapping_add(SW_FRAME_WORDS);
    }

    unsafe fn return_from_interrupt(&mut self) {
        self.privileged = false;
        self.interrupts_masked = false;
        self.hw = HardwareFrame::from_words(&unsafe { read_words(self.psp) });
        self.psp = self.psp.wrapping_add(HW_FRAME_WORDS);
        self.on_process_stack = true;
        self.mode = Mode::Thread;
    }
}

impl PendSwitch for HostCpu {
    fn pend_switch(&mut self) {
        self.switch_pending = true;
    }
}

/// # Safety
/// `dst` must be valid for `K` word writes.
unsafe fn write_words<const K: usize>(dst: StackPtr, words: &[Word; K]) {
    unsafe { core::ptr::copy_nonoverlapping(words.as_ptr(), dst, K) };
}

/// # Safety
/// `src` must be valid for `K` word reads.
unsafe fn read_words<const K: usize>(src: StackPtr) -> [Word; K] {
    let mut words = [0; K];
    unsafe { core::ptr::copy_nonoverlapping(src as *const Word, words.as_mut_ptr(), K) };
    words
}

// ---------------------------------------------------------------------------
// Simulated SysTick
// ---------------------------------------------------------------------------

/// Tick source that only records how it was programmed.
#[derive(Debug, Default)]
pub struct HostTimer {
    pub reload: Option<u32>,
    pub enabled: bool,
}

impl TickSource for HostTimer {
    fn program(&mut self, reload: u32) {
        self.reload = Some(reload);
    }

    fn enable(&mut self) {
        self.enabled = true;
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// Scheduler, tick timer and core wired together.
///
/// Like the target scheduler, a machine must not move after its first
/// registration: saved stack pointers point into it.
pub struct HostMachine<const N: usize, const W: usize> {
    pub cpu: HostCpu,
    scheduler: Scheduler<N, W>,
    timer: TickTimer<HostTimer>,
}

impl<const N: usize, const W: usize> HostMachine<N, W> {
    pub fn new() -> Self {
        Self {
            cpu: HostCpu::new(),
            scheduler: Scheduler::new(),
            timer: TickTimer::new(HostTimer::default()),
        }
    }

    pub fn initialize(&mut self, time_slice_ms: u32) {
        self.timer.configure(time_slice_ms);
        self.scheduler.reset();
    }

    pub fn register_task(&mut self, entry: TaskEntry, arg: TaskArg) {
        self.scheduler.register_task(entry, arg);
    }

    /// Prime PSP, start the timer, raise the switch request and take it.
    ///
    /// # Panics
    /// With no task registered the machine halts, which the model reports
    /// as a panic.
    pub fn start(&mut self) {
        let Some(first_sp) = self.scheduler.prime() else {
            panic!("halted: start() with no registered task");
        };
        self.cpu.psp = first_sp;
        self.timer.start();
        self.cpu.pend_switch();
        self.service_pending();
    }

    /// One timer expiry. Returns the index of the task running afterwards.
    pub fn tick(&mut self) -> Option<TaskId> {
        if self.timer.is_running() {
            self.timer.on_expiry(&mut self.cpu);
        }
        self.service_pending();
        self.scheduler.current()
    }

    /// Take the switch request if it is pending and interrupts allow it.
    fn service_pending(&mut self) {
        if !self.cpu.switch_pending || self.cpu.interrupts_masked {
            return;
        }
        self.cpu.switch_pending = false;
        // SAFETY: PSP is either primed with task 0's frame or is the
        // running task's stack, and every saved_sp points at a frame the
        // scheduler built or saved.
        unsafe {
            self.cpu.exception_entry();
            self.scheduler.dispatch(&mut self.cpu);
        }
    }

    pub fn current(&self) -> Option<TaskId> {
        self.scheduler.current()
    }

    pub fn scheduler(&self) -> &Scheduler<N, W> {
        &self.scheduler
    }

    pub fn timer(&self) -> &TickTimer<HostTimer> {
        &self.timer
    }
}

impl<const N: usize, const W: usize> Default for HostMachine<N, W> {
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
    use crate::frame::{return_address, INITIAL_XPSR};
    use crate::scheduler::DispatchState;
    use crate::config::SYSTEM_CLOCK_HZ;
    use crate::stack::task_exit;
    use crate::timer::reload_for;
    use std::vec::Vec;

    // Distinct bodies so the entry addresses stay distinct.
    extern "C" fn task_a(_: TaskArg) -> ! {
        loop {
            core::hint::black_box(0xA);
        }
    }

    extern "C" fn task_b(_: TaskArg) -> ! {
        loop {
            core::hint::black_box(0xB);
        }
    }

    extern "C" fn task_c(_: TaskArg) -> ! {
        loop {
            core::hint::black_box(0xC);
        }
    }

    fn arg(v: usize) -> TaskArg {
        v as TaskArg
    }

    fn name_of(pc: Word) -> char {
        if pc == return_address(task_a) {
            'A'
        } else if pc == return_address(task_b) {
            'B'
        } else if pc == return_address(task_c) {
            'C'
        } else {
            '?'
        }
    }

    #[test]
    fn test_two_tasks_alternate() {
        let mut m: HostMachine<2, 64> = HostMachine::new();
        m.initialize(1);
        m.register_task(task_a, arg(1));
        m.register_task(task_b, arg(2));
        m.start();

        let mut order = Vec::new();
        order.push(name_of(m.cpu.hw.pc));
        for _ in 0..5 {
            m.tick();
            order.push(name_of(m.cpu.hw.pc));
        }
        assert_eq!(order, ['A', 'B', 'A', 'B', 'A', 'B']);
    }

    #[test]
    fn test_visit_order_is_registration_order() {
        let mut m: HostMachine<4, 64> = HostMachine::new();
        m.initialize(1);
        for i in 0..4 {
            m.register_task(task_a, arg(i));
        }
        m.start();

        let mut visited = Vec::new();
        visited.push(m.current().unwrap());
        for _ in 0..9 {
            visited.push(m.tick().unwrap());
        }
        assert_eq!(visited, [0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);
    }

    #[test]
    fn test_extra_registrations_do_not_change_order() {
        let mut m: HostMachine<2, 64> = HostMachine::new();
        m.initialize(1);
        m.register_task(task_a, arg(0));
        m.register_task(task_b, arg(1));
        m.register_task(task_c, arg(2));
        m.start();

        let mut seen = Vec::new();
        seen.push(name_of(m.cpu.hw.pc));
        for _ in 0..5 {
            m.tick();
            seen.push(name_of(m.cpu.hw.pc));
        }
        assert!(!seen.contains(&'C'));
        assert_eq!(m.scheduler().task_count(), 2);
    }

    #[test]
    #[should_panic(expected = "halted")]
    fn test_start_with_no_tasks_halts() {
        let mut m: HostMachine<2, 64> = HostMachine::new();
        m.initialize(1);
        m.start();
    }

    #[test]
    fn test_first_resume_matches_built_frame() {
        let mut m: HostMachine<2, 64> = HostMachine::new();
        m.initialize(1);
        m.register_task(task_a, arg(0x1111));
        m.register_task(task_b, arg(0x2222));
        let built_sp = m.scheduler().table().get(0).unwrap().saved_sp();
        m.start();

        assert_eq!(m.current(), Some(0));
        assert_eq!(m.cpu.hw.pc, return_address(task_a));
        assert_eq!(m.cpu.hw.r0, 0x1111);
        assert_eq!(m.cpu.hw.lr, task_exit as usize);
        assert_eq!(m.cpu.hw.xpsr, INITIAL_XPSR);
        assert_eq!(m.cpu.callee, CalleeSaved::default());
        // Both halves of the frame were consumed
        assert_eq!(m.cpu.psp, built_sp.wrapping_add(crate::frame::FRAME_WORDS));
        // main()'s frame went to MSP and stays there
        assert_eq!(m.cpu.main_stack_entries, 1);
    }

    #[test]
    fn test_untouched_task_round_trips_its_entry_frame() {
        let mut m: HostMachine<2, 64> = HostMachine::new();
        m.initialize(1);
        m.register_task(task_a, arg(0xAAAA));
        m.register_task(task_b, arg(0xBBBB));
        m.start();

        // A is interrupted without having executed; one save/restore cycle
        // later it must resume exactly at its entry with its argument.
        m.tick();
        assert_eq!(m.cpu.hw.pc, return_address(task_b));
        assert_eq!(m.cpu.hw.r0, 0xBBBB);
        m.tick();
        assert_eq!(m.cpu.hw.pc, return_address(task_a));
        assert_eq!(m.cpu.hw.r0, 0xAAAA);
        assert_eq!(m.cpu.hw.xpsr, INITIAL_XPSR);
    }

    #[test]
    fn test_registers_survive_a_full_cycle() {
        let mut m: HostMachine<3, 64> = HostMachine::new();
        m.initialize(1);
        m.register_task(task_a, arg(0));
        m.register_task(task_b, arg(1));
        m.register_task(task_c, arg(2));
        m.start();

        // Pretend task 0 ran for a while
        m.cpu.callee = CalleeSaved {
            r4: 4,
            r5: 5,
            r6: 6,
            r7: 7,
            r8: 8,
            r9: 9,
            r10: 10,
            r11: 11,
        };
        m.cpu.hw.r0 = 100;
        m.cpu.hw.r3 = 103;
        m.cpu.hw.r12 = 112;
        m.cpu.hw.pc = return_address(task_a) + 0x40;
        let snapshot = (m.cpu.hw, m.cpu.callee);
        let sp_while_running = m.cpu.psp;

        m.tick();
        m.cpu.callee.r4 = 0xDEAD; // task 1 clobbers registers
        m.cpu.hw.r0 = 0xBEEF;
        m.tick();
        m.cpu.callee.r11 = 0xF00D; // task 2 too
        m.tick();

        assert_eq!(m.current(), Some(0));
        assert_eq!((m.cpu.hw, m.cpu.callee), snapshot);
        assert_eq!(m.cpu.psp, sp_while_running);
    }

    #[test]
    fn test_switch_leaves_thread_mode_unprivileged_and_unmasked() {
        let mut m: HostMachine<2, 64> = HostMachine::new();
        m.initialize(1);
        m.register_task(task_a, arg(0));
        assert!(m.cpu.privileged);
        m.start();

        assert_eq!(m.cpu.mode, Mode::Thread);
        assert!(m.cpu.on_process_stack);
        assert!(!m.cpu.privileged);
        assert!(!m.cpu.interrupts_masked);
        assert!(!m.cpu.switch_pending);
    }

    #[test]
    fn test_single_task_resumes_itself() {
        let mut m: HostMachine<2, 64> = HostMachine::new();
        m.initialize(1);
        m.register_task(task_a, arg(7));
        m.start();
        m.cpu.callee.r6 = 66;

        for _ in 0..3 {
            assert_eq!(m.tick(), Some(0));
            assert_eq!(m.cpu.callee.r6, 66);
            assert_eq!(name_of(m.cpu.hw.pc), 'A');
        }
    }

    #[test]
    fn test_masked_switch_request_waits() {
        let mut m: HostMachine<2, 64> = HostMachine::new();
        m.initialize(1);
        m.register_task(task_a, arg(0));
        m.register_task(task_b, arg(1));
        m.start();

        m.cpu.interrupts_masked = true;
        assert_eq!(m.tick(), Some(0));
        assert!(m.cpu.switch_pending);

        m.cpu.interrupts_masked = false;
        assert_eq!(m.tick(), Some(1));
        assert!(!m.cpu.switch_pending);
    }

    #[test]
    fn test_switch_touches_only_outgoing_saved_sp() {
        let mut m: HostMachine<3, 64> = HostMachine::new();
        m.initialize(1);
        for i in 0..3 {
            m.register_task(task_a, arg(i));
        }
        m.start();

        let before: Vec<StackPtr> = m.scheduler().table().iter().map(|t| t.saved_sp()).collect();
        // Task 0 pushes four words of its own before the tick lands
        m.cpu.psp = m.cpu.psp.wrapping_sub(4);
        m.tick(); // 0 -> 1

        let after: Vec<StackPtr> = m.scheduler().table().iter().map(|t| t.saved_sp()).collect();
        assert_eq!(after[0], before[0].wrapping_sub(4));
        assert!(m.scheduler().stacks().slot(0).contains(after[0]));
        assert_eq!(after[1], before[1]);
        assert_eq!(after[2], before[2]);
    }

    #[test]
    fn test_initialize_programs_timer_and_start_enables_it() {
        let mut m: HostMachine<2, 64> = HostMachine::new();
        m.initialize(10);
        let expected = reload_for(SYSTEM_CLOCK_HZ, 10);
        assert_eq!(m.timer().source().reload, Some(expected));
        assert!(!m.timer().source().enabled);

        // No switch can happen before start()
        assert_eq!(m.tick(), None);
        assert_eq!(m.scheduler().state(), DispatchState::NotStarted);

        m.register_task(task_a, arg(0));
        m.start();
        assert!(m.timer().source().enabled);
    }
}
