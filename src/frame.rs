//! # Exception-Return Frame
//!
//! The register image a suspended thread keeps on its own stack. The
//! Cortex-M4 stacks half of it in hardware on exception entry; PendSV pushes
//! the other half. Returning from PendSV with a stack pointer aimed at such a
//! frame resumes the thread that owns it.
//!
//! ## Layout (low address first, stack grows down)
//!
//! ```text
//! sp ─►  r4  r5  r6  r7  r8  r9  r10 r11   software-saved (PendSV)
//!        r0  r1  r2  r3  r12 lr  pc  xpsr  hardware-saved (exception entry)
//! ```
//!
//! [`ExceptionFrame`] is the only place this order is written down. Stack
//! memory is converted to and from it exclusively through
//! [`ExceptionFrame::to_words`] and [`ExceptionFrame::from_words`].

use crate::config::REGISTER_SENTINEL;

/// Words in a full frame.
pub const FRAME_WORDS: usize = 16;

/// Words PendSV pushes itself (`r4`–`r11`).
pub const SOFTWARE_WORDS: usize = 8;

/// xPSR with only the Thumb state bit set. Cortex-M cannot execute in ARM
/// state, so a frame without it faults on exception return.
pub const XPSR_THUMB: u32 = 1 << 24;

/// Saved processor state, in stack order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionFrame {
    pub r4: u32,
    pub r5: u32,
    pub r6: u32,
    pub r7: u32,
    pub r8: u32,
    pub r9: u32,
    pub r10: u32,
    pub r11: u32,
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

const _: () = assert!(core::mem::size_of::<ExceptionFrame>() == FRAME_WORDS * 4);

impl ExceptionFrame {
    /// Frame for a thread that has never run.
    ///
    /// `pc` is a placeholder; the entry address is patched in once known
    /// (see [`with_entry`](Self::with_entry)).
    pub const fn initial() -> Self {
        let s = REGISTER_SENTINEL;
        Self {
            r4: s,
            r5: s,
            r6: s,
            r7: s,
            r8: s,
            r9: s,
            r10: s,
            r11: s,
            r0: s,
            r1: s,
            r2: s,
            r3: s,
            r12: s,
            lr: s,
            pc: 0,
            xpsr: XPSR_THUMB,
        }
    }

    /// Same frame, resuming at `pc`.
    pub const fn with_entry(self, pc: u32) -> Self {
        Self { pc, ..self }
    }

    /// General-purpose registers `r0`–`r12`, in register-number order.
    pub const fn general_registers(&self) -> [u32; 13] {
        [
            self.r0, self.r1, self.r2, self.r3, self.r4, self.r5, self.r6, self.r7, self.r8,
            self.r9, self.r10, self.r11, self.r12,
        ]
    }

    pub const fn to_words(&self) -> [u32; FRAME_WORDS] {
        [
            self.r4, self.r5, self.r6, self.r7, self.r8, self.r9, self.r10, self.r11, self.r0,
            self.r1, self.r2, self.r3, self.r12, self.lr, self.pc, self.xpsr,
        ]
    }

    pub const fn from_words(w: &[u32; FRAME_WORDS]) -> Self {
        Self {
            r4: w[0],
            r5: w[1],
            r6: w[2],
            r7: w[3],
            r8: w[4],
            r9: w[5],
            r10: w[6],
            r11: w[7],
            r0: w[8],
            r1: w[9],
            r2: w[10],
            r3: w[11],
            r12: w[12],
            lr: w[13],
            pc: w[14],
            xpsr: w[15],
        }
    }
}
