//! # Scheduler
//!
//! Thread store, stack-frame initializer and the round-robin decision.
//!
//! ## Scheduling Algorithm
//!
//! The TCBs form one fixed cycle, wired in the order the threads were added.
//! Every switch moves the current reference one hop along that cycle:
//!
//! ```text
//!   ┌──────────┐ next ┌──────────┐ next ┌──────────┐
//!   │ thread 0 │ ───► │ thread 1 │ ───► │ thread 2 │
//!   └──────────┘      └──────────┘      └──────────┘
//!        ▲                                    │
//!        └──────────────── next ──────────────┘
//! ```
//!
//! There are no priorities and no run queue: over any `NUM_THREADS`
//! consecutive switches each thread runs exactly once.

use crate::config::{NUM_THREADS, STACK_PAINT, STACK_WORDS};
use crate::frame::{ExceptionFrame, FRAME_WORDS};
use crate::thread::{entry_address, ThreadControlBlock, ThreadEntry, ThreadId, ThreadStack};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// TCB arena, stacks and the current-thread reference.
///
/// Stacks are stored inline, so TCB stack pointers point into `self`: once
/// [`wire`](Self::wire) has run the scheduler must stay where it is. On
/// target it lives in a `static` and never moves.
pub struct Scheduler {
    tcbs: [ThreadControlBlock; NUM_THREADS],
    stacks: [ThreadStack; NUM_THREADS],
    current: ThreadId,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tcbs: [ThreadControlBlock::EMPTY; NUM_THREADS],
            stacks: [ThreadStack::EMPTY; NUM_THREADS],
            current: ThreadId::FIRST,
        }
    }

    /// Link the TCBs into one cycle in the order given, build every thread's
    /// initial frame and make the first entry current.
    pub fn wire(&mut self, entries: [ThreadEntry; NUM_THREADS]) {
        for (id, entry) in ThreadId::all().zip(entries) {
            self.tcbs[id.index()].next = id.following();
            self.initialize_stack(id);
            self.set_entry(id, entry);
            crate::debug!(
                "thread {=usize}: entry {=u32:#x}, next {=usize}",
                id.index(),
                entry_address(entry),
                id.following().index()
            );
        }
        self.current = ThreadId::FIRST;
    }

    /// Lay out a fresh frame at the top of `id`'s stack.
    ///
    /// The stack is painted first so [`unused_stack_words`] can later tell
    /// how deep the thread went. The PC slot is left as a placeholder.
    ///
    /// [`unused_stack_words`]: Self::unused_stack_words
    pub fn initialize_stack(&mut self, id: ThreadId) {
        let stack = &mut self.stacks[id.index()];
        stack.words.fill(STACK_PAINT);

        let frame_start = STACK_WORDS - FRAME_WORDS;
        stack.words[frame_start..].copy_from_slice(&ExceptionFrame::initial().to_words());

        self.tcbs[id.index()].stack_pointer = stack.base().wrapping_add(frame_start);
    }

    /// Patch the entry address into the PC slot of `id`'s initial frame.
    pub fn set_entry(&mut self, id: ThreadId, entry: ThreadEntry) {
        let frame_start = STACK_WORDS - FRAME_WORDS;
        let region = &mut self.stacks[id.index()].words[frame_start..];

        let mut words = [0u32; FRAME_WORDS];
        words.copy_from_slice(region);
        let frame = ExceptionFrame::from_words(&words).with_entry(entry_address(entry));
        region.copy_from_slice(&frame.to_words());
    }

    /// Move the current reference one hop along the cycle.
    #[inline]
    pub fn advance(&mut self) -> ThreadId {
        self.current = self.tcbs[self.current.index()].next;
        self.current
    }

    #[inline]
    pub fn current(&self) -> ThreadId {
        self.current
    }

    #[inline]
    pub fn next_of(&self, id: ThreadId) -> ThreadId {
        self.tcbs[id.index()].next
    }

    #[inline]
    pub fn stack_pointer(&self, id: ThreadId) -> *mut u32 {
        self.tcbs[id.index()].stack_pointer
    }

    /// Record where the running thread's frame now starts. Called by the
    /// switch path only.
    #[inline]
    pub fn save_current(&mut self, sp: *mut u32) {
        self.tcbs[self.current.index()].stack_pointer = sp;
    }

    /// Read back the frame a suspended thread will resume from.
    ///
    /// Returns `None` if the saved stack pointer doesn't leave room for a
    /// whole frame inside the thread's stack (never wired, or corrupted).
    pub fn saved_frame(&self, id: ThreadId) -> Option<ExceptionFrame> {
        let stack = &self.stacks[id.index()];
        let start = stack.offset_of(self.stack_pointer(id))?;
        let words = stack.words.get(start..start + FRAME_WORDS)?;
        let words: &[u32; FRAME_WORDS] = words.try_into().ok()?;
        Some(ExceptionFrame::from_words(words))
    }

    /// Words at the bottom of `id`'s stack the thread has never written.
    ///
    /// A result of zero means the stack was exhausted at some point, and
    /// memory below it may already be corrupted.
    pub fn unused_stack_words(&self, id: ThreadId) -> usize {
        self.stacks[id.index()]
            .words
            .iter()
            .take_while(|&&w| w == STACK_PAINT)
            .count()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
