//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor.
//! Implements [`Port`] on SysTick, PendSV and the NVIC, and provides the two
//! exception handlers the kernel runs on.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): Used by `main` before launch and by
//!   exception handlers
//! - **PSP** (Process Stack Pointer): Used by threads in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0–R3, R12, LR, PC,
//! and xPSR onto the process stack. The PendSV handler manually saves and
//! restores R4–R11, which completes the full context save/restore. The word
//! order is the one in [`crate::frame::ExceptionFrame`].
//!
//! ## Interrupt Priorities
//!
//! - SysTick: [`TICK_PRIORITY`]: preempts a running switch, never delayed
//!   by one
//! - PendSV: [`SWITCH_PRIORITY`] (lowest): runs only when no other ISR is
//!   active
//!
//! Threads must not use the FPU: the handlers assume the basic 8-word
//! hardware frame (`EXC_RETURN = 0xFFFF_FFFD`).
//!
//! [`TICK_PRIORITY`]: crate::config::TICK_PRIORITY
//! [`SWITCH_PRIORITY`]: crate::config::SWITCH_PRIORITY

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::SCB;

use crate::config::NVIC_PRIO_BITS;
use crate::kernel::{self, global::KERNEL};
use crate::port::Port;
use crate::sync;

/// The Cortex-M4 port. Stateless: the kernel is the only owner of SysTick
/// and the system handler priorities, so each operation borrows the core
/// peripherals for its own duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CortexM4;

/// Core peripherals for one port operation.
///
/// # Safety
/// Callers must only touch SysTick and the SCB system handler registers,
/// which nothing outside the port drives.
#[inline]
unsafe fn core_peripherals() -> cortex_m::Peripherals {
    cortex_m::Peripherals::steal()
}

impl Port for CortexM4 {
    #[inline]
    fn interrupt_free<R>(&self, f: impl FnOnce() -> R) -> R {
        sync::critical_section(|_cs| f())
    }

    /// Sets PENDSVSET in the ICSR.
    #[inline]
    fn request_switch(&self) {
        SCB::set_pendsv();
    }

    #[inline]
    fn disable_interrupts(&self) {
        cortex_m::interrupt::disable();
    }

    #[inline]
    fn reset_tick_counter(&self) {
        // Safety: clearing the current value touches SysTick only.
        let mut cp = unsafe { core_peripherals() };
        cp.SYST.clear_current();
    }

    fn set_priorities(&self, tick: u8, switch: u8) {
        let shift = 8 - NVIC_PRIO_BITS;
        // Safety: called with interrupts masked, before SysTick is enabled
        // and before any thread runs.
        unsafe {
            let mut cp = core_peripherals();
            cp.SCB.set_priority(SystemHandler::SysTick, tick << shift);
            cp.SCB.set_priority(SystemHandler::PendSV, switch << shift);
        }
    }

    fn start_tick_timer(&self, reload: u32) {
        // Safety: SysTick is owned by the kernel.
        let mut syst = unsafe { core_peripherals() }.SYST;
        syst.disable_counter();
        syst.set_reload(reload);
        syst.clear_current();
        syst.set_clock_source(SystClkSource::Core);
        syst.enable_counter();
        syst.enable_interrupt();
    }

    /// Start the first thread by switching to PSP and branching to its entry
    /// in Thread mode.
    ///
    /// Called once from `kernel_launch`, with interrupts masked since before
    /// the timer was started. The `cpsie i` below is the first point a tick
    /// or a switch can be taken, and by then PSP holds thread 0's stack.
    ///
    /// It unwinds the thread's initial frame by hand, so thread 0 starts with
    /// exactly the register values a later exception return would give it.
    unsafe fn enter_first_thread(&self, sp: *mut u32) -> ! {
        asm!(
            // Software-saved half; r0 ends at the hardware-saved half
            "ldmia r0!, {{r4-r11}}",
            "msr psp, r0",

            // Switch to PSP for Thread mode (set CONTROL.SPSEL = 1)
            "movs r0, #2",
            "msr control, r0",
            "isb",

            // Pop the hardware frame manually since we're not really
            // returning from an exception
            "pop {{r0-r3, r12, lr}}",
            "pop {{r12}}",         // PC (thread entry point)
            "add sp, sp, #4",      // xPSR (set by the processor)
            "orr r12, r12, #1",    // Thumb state for bx

            "cpsie i",
            "bx r12",

            in("r0") sp,
            options(noreturn)
        );
    }

    fn halt(&self) -> ! {
        cortex_m::interrupt::disable();
        loop {
            cortex_m::asm::wfi();
        }
    }
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler — performs the actual context switch.
///
/// ## Sequence
/// 1. Mask interrupts; the save/restore must not be interleaved
/// 2. Save R4–R11 onto the current thread's stack (PSP)
/// 3. `switch_context`: store PSP in the current TCB, advance, load the next
///    TCB's stack pointer
/// 4. Restore R4–R11 from the new thread's stack
/// 5. Unmask and return from exception on PSP (hardware restores R0–R3,
///    R12, LR, PC, xPSR)
///
/// # Safety
/// Called directly by the NVIC. It must follow the exact Cortex-M4
/// exception entry/exit convention, and must not touch R4–R11 before they
/// are saved.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",

        // --- Save current context ---
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",

        // --- Pick next thread; new PSP comes back in r0 ---
        "bl {switch}",

        // --- Restore new context ---
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",

        "cpsie i",

        // Return to Thread mode on the process stack
        "mov lr, #0xFFFFFFFD",
        "bx lr",

        switch = sym switch_context,
    );
}

/// Body of the switch, called from PendSV with the parked thread's PSP.
///
/// # Safety
/// PendSV only, interrupts masked.
unsafe extern "C" fn switch_context(sp: *mut u32) -> *mut u32 {
    KERNEL.get().switch_context(sp)
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler, once per time slice. Pends PendSV and
/// returns.
#[unsafe(no_mangle)]
pub extern "C" fn SysTick() {
    kernel::on_tick(&CortexM4);
}
