//! # Port Interface
//!
//! Everything the kernel needs from the processor, behind one trait. The
//! kernel logic in [`crate::kernel`] is written against [`Port`] only; the
//! Cortex-M4 implementation lives in `arch::cortex_m4`, and host tests use a
//! recording implementation.

/// Processor services used by the kernel.
///
/// Priorities are unshifted NVIC levels (`0` = most urgent); the port maps
/// them onto however many priority bits the hardware implements.
pub trait Port {
    /// Run `f` with interrupts masked.
    fn interrupt_free<R>(&self, f: impl FnOnce() -> R) -> R;

    /// Mask interrupts until the first thread is entered.
    fn disable_interrupts(&self);

    /// Mark the context-switch interrupt pending. It runs once nothing more
    /// urgent is active.
    fn request_switch(&self);

    /// Restart the tick timer's count from zero.
    fn reset_tick_counter(&self);

    /// Assign the tick and context-switch interrupt priorities.
    fn set_priorities(&self, tick: u8, switch: u8);

    /// Clear, load with `reload` and enable the tick timer and its
    /// interrupt. The timer fires every `reload + 1` reference clock cycles.
    fn start_tick_timer(&self, reload: u32);

    /// Switch to the thread whose saved frame starts at `sp`, as if
    /// returning from an exception into it.
    ///
    /// # Safety
    /// `sp` must point at a complete initial frame inside a live thread
    /// stack, the tick timer must be configured, and interrupts must still be
    /// masked. They are unmasked only once the thread's stack is active.
    unsafe fn enter_first_thread(&self, sp: *mut u32) -> !;

    /// Mask interrupts and stop for good.
    fn halt(&self) -> !;
}

// ---------------------------------------------------------------------------
// Host test port
// ---------------------------------------------------------------------------
