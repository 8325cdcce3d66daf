//! # RROS — Round-Robin Operating System
//!
//! A minimal preemptive round-robin kernel for single-core ARM Cortex-M4
//! microcontrollers.
//!
//! ## Overview
//!
//! RROS runs a fixed set of [`NUM_THREADS`](config::NUM_THREADS) threads,
//! each an `extern "C" fn() -> !`, in a strict cycle. Every thread runs for
//! one time slice (the *quantum*) or until it calls
//! [`yield_now`](kernel::Kernel::yield_now), whichever comes first. There
//! are no priorities, no blocking primitives and no dynamic thread creation:
//! threads cooperate through shared state they protect themselves.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Application Threads                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │  kernel_init() · add_threads() · kernel_launch() · yield│
//! ├──────────────────────────┬─────────────────────────────┤
//! │  Scheduler               │  Port trait (port.rs)       │
//! │  scheduler.rs            │  ─ request_switch()         │
//! │  ─ wire() ─ advance()    │  ─ start_tick_timer()       │
//! │  ─ initialize_stack()    │  ─ enter_first_thread()     │
//! ├──────────────────────────┴─────────────────────────────┤
//! │   Thread Model (thread.rs) · Register Frame (frame.rs)  │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │         PendSV · SysTick · First-Thread Entry           │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: All state is statically allocated in one `Kernel`
//! - **Fixed-size TCB arena**: `[ThreadControlBlock; NUM_THREADS]`
//! - **Per-thread stack**: `[u32; STACK_WORDS]`, 8-byte aligned
//! - **Unguarded stacks**: an overflowing thread corrupts its neighbour
//!
//! ## Building
//!
//! The library and its unit tests build on the host (`cargo test`). The
//! Cortex-M4 port, the global kernel instance and the firmware binary are
//! only compiled for `thumbv7em-none-eabi`:
//!
//! ```text
//! cargo build --release --target thumbv7em-none-eabi --features rt,defmt
//! ```

#![cfg_attr(not(test), no_std)]

pub mod log;

pub mod config;
pub mod error;
pub mod frame;
pub mod thread;
pub mod scheduler;
pub mod port;
pub mod kernel;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod sync;

pub use error::KernelError;
pub use kernel::Kernel;
pub use thread::{ThreadEntry, ThreadId};
