//! # Kernel Errors
//!
//! Configuration mistakes the kernel can see before it starts scheduling.
//! Everything after launch (stack overflow, a stalled peripheral) stays an
//! undetected hazard.

use core::fmt;

/// Reasons kernel setup can refuse to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// Launch was attempted before `init` computed the tick prescaler.
    NotInitialized,
    /// Launch was attempted before `add_threads` wired the thread list.
    NoThreads,
    /// `add_threads` was called a second time, or after launch.
    AlreadyConfigured,
    /// A time slice of zero milliseconds.
    ZeroQuantum,
    /// The time slice does not fit the 24-bit SysTick reload register.
    QuantumTooLong { quanta_ms: u32 },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => f.write_str("kernel launched before init"),
            Self::NoThreads => f.write_str("kernel launched before threads were added"),
            Self::AlreadyConfigured => f.write_str("threads already added"),
            Self::ZeroQuantum => f.write_str("time slice must be at least 1 ms"),
            Self::QuantumTooLong { quanta_ms } => {
                write!(f, "time slice of {quanta_ms} ms overflows the tick timer")
            }
        }
    }
}

impl core::error::Error for KernelError {}
