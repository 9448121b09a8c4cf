//! # rrsched: Round-Robin Scheduler
//!
//! A preemptive round-robin task scheduler for single-core ARM Cortex-M3/M4
//! microcontrollers.
//!
//! ## Overview
//!
//! A fixed table of tasks, each an entry function that never returns plus
//! one opaque argument, is run in registration order. A periodic SysTick
//! interrupt requests a switch; PendSV performs it, moving to the next task
//! in the table and wrapping around. There are no priorities, no yield and
//! no blocking: every task gets exactly one tick at a time, forever.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │        initialize() · register_task() · start()        │
//! ├──────────────────────────┬─────────────────────────────┤
//! │  Scheduler / Dispatcher  │   Tick Timer                │
//! │  scheduler.rs            │   timer.rs                  │
//! │  ─ register_task()       │   ─ reload_for()            │
//! │  ─ switch_stacks()       │   ─ on_expiry()             │
//! ├──────────────────────────┴─────────────────────────────┤
//! │  Task Table (task.rs) · Stacks (stack.rs) · Frame       │
//! ├────────────────────────────────────────────────────────┤
//! │     Arch Port (arch/armv7m.rs)   │  Host model (host.rs)│
//! │     PendSV · SysTick · PSP       │  HostCpu · tick()    │
//! ├──────────────────────────────────┴─────────────────────┤
//! │         ARM Cortex-M3/M4 Hardware (Thumb-2)             │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically allocated
//! - **Fixed-size table**: `[Task; MAX_TASKS]`
//! - **Stack arena**: `MAX_TASKS` slots of `STACK_WORDS` words, one per
//!   task, assigned by registration order and never reused
//!
//! ## Contract
//!
//! Misuse is not reported. Registering past capacity or after `start()`
//! drops the task, overflowing a stack corrupts memory, and starting with
//! no tasks halts the core.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod arch;
pub mod config;
pub mod frame;
pub mod scheduler;
pub mod stack;
pub mod task;
pub mod timer;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod sync;

#[cfg(not(target_os = "none"))]
pub mod host;
