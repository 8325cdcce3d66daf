//! # Thread Control Blocks
//!
//! The per-thread bookkeeping the kernel keeps: a saved stack pointer, the
//! link to the next thread in the round-robin cycle, and the stack region
//! itself. All of it is allocated inline in the scheduler; there is no heap.

use crate::config::{NUM_THREADS, STACK_WORDS};

/// A thread body. Threads take no arguments and never return; there is no
/// meaningful return address in their initial frame.
pub type ThreadEntry = extern "C" fn() -> !;

/// Instruction address of a thread entry, as stored in a frame's PC slot.
///
/// Thumb function pointers carry bit 0 set; the exception-return PC must be
/// halfword aligned, so the bit is cleared here.
#[inline]
pub fn entry_address(entry: ThreadEntry) -> u32 {
    (entry as *const () as usize as u32) & !1
}

/// Index of a thread slot, `0..NUM_THREADS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThreadId(u8);

impl ThreadId {
    pub const FIRST: Self = Self(0);

    /// Returns `None` when `index` is not a configured slot.
    pub const fn new(index: usize) -> Option<Self> {
        if index < NUM_THREADS {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The slot after this one, wrapping to the first.
    pub const fn following(self) -> Self {
        Self(((self.0 as usize + 1) % NUM_THREADS) as u8)
    }

    /// Every slot, in wiring order.
    pub fn all() -> impl Iterator<Item = ThreadId> {
        (0..NUM_THREADS).map(|i| Self(i as u8))
    }
}

/// Private stack region of one thread.
///
/// Aligned to 8 bytes as required by the ARM AAPCS at public interfaces.
#[repr(C, align(8))]
pub struct ThreadStack {
    pub words: [u32; STACK_WORDS],
}

impl ThreadStack {
    pub const EMPTY: Self = Self {
        words: [0; STACK_WORDS],
    };

    /// Address of the lowest word.
    #[inline]
    pub fn base(&mut self) -> *mut u32 {
        self.words.as_mut_ptr()
    }

    /// Word index of `sp` within this stack, if it points inside it.
    pub fn offset_of(&self, sp: *const u32) -> Option<usize> {
        let base = self.words.as_ptr() as usize;
        let addr = sp as usize;
        if addr < base || (addr - base) % 4 != 0 {
            return None;
        }
        let offset = (addr - base) / 4;
        (offset < STACK_WORDS).then_some(offset)
    }
}

/// Thread Control Block (TCB).
///
/// `stack_pointer` points into the owning [`ThreadStack`] at the lowest word
/// of the thread's saved frame whenever the thread is not running. It is
/// rewritten on every switch away from the thread. `next` is wired once by
/// `add_threads` and never changes afterwards.
#[derive(Debug, Clone, Copy)]
pub struct ThreadControlBlock {
    pub stack_pointer: *mut u32,
    pub next: ThreadId,
}

impl ThreadControlBlock {
    pub const EMPTY: Self = Self {
        stack_pointer: core::ptr::null_mut(),
        next: ThreadId::FIRST,
    };
}
