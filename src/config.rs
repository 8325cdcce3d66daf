//! # RROS Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! compile time. Nothing is allocated or reconfigured at runtime.

/// Number of threads the kernel schedules. `add_threads` takes exactly
/// this many entry functions.
pub const NUM_THREADS: usize = 3;

/// Per-thread stack size in 32-bit words (400 bytes by default).
///
/// Must hold the deepest call chain of the thread plus one full register
/// frame (16 words). Overflow is not detected: it silently corrupts
/// whatever lies below the stack.
pub const STACK_WORDS: usize = 100;

/// Bus / SysTick reference clock in Hz (STM32F4 HSI without PLL).
pub const BUS_FREQ_HZ: u32 = 16_000_000;

/// Default round-robin time slice used by the firmware, in milliseconds.
pub const QUANTA_MS: u32 = 10;

/// Number of priority bits implemented by the NVIC on STM32F4.
pub const NVIC_PRIO_BITS: u8 = 4;

/// SysTick priority (unshifted; lower value = more urgent).
pub const TICK_PRIORITY: u8 = 7;

/// PendSV priority (unshifted). The lowest the hardware can express, so a
/// context switch never delays any other interrupt.
pub const SWITCH_PRIORITY: u8 = (1 << NVIC_PRIO_BITS) - 1;

/// Value loaded into every general-purpose and link register slot of a
/// fresh frame. Purely a debugging aid.
pub const REGISTER_SENTINEL: u32 = 0xAAAA_AAAA;

/// Value painted over a whole stack region before its first frame is
/// written. Words still holding it were never touched by the thread.
pub const STACK_PAINT: u32 = 0xA5A5_A5A5;

/// Largest value the 24-bit SysTick reload register accepts.
pub const SYSTICK_MAX_RELOAD: u32 = 0x00FF_FFFF;

const _: () = assert!(NUM_THREADS >= 1 && NUM_THREADS <= u8::MAX as usize);
const _: () = assert!(STACK_WORDS >= crate::frame::FRAME_WORDS);
// Keeps the frame (and so the hardware-stacked part) 8-byte aligned.
const _: () = assert!(STACK_WORDS % 2 == 0);
const _: () = assert!(TICK_PRIORITY < SWITCH_PRIORITY);
const _: () = assert!(REGISTER_SENTINEL != STACK_PAINT);
const _: () = assert!(BUS_FREQ_HZ >= 1000);
