//! # Synchronization Primitives
//!
//! Interrupt-masking critical section for the Cortex-M4. The kernel uses it
//! only while wiring the thread list; it offers nothing to application
//! threads, which must arrange their own sharing.

use cortex_m::interrupt;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and restored on exit. Keep the body
/// short: SysTick cannot fire while it runs.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|_cs| {
///     // Touch kernel state safely
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}
