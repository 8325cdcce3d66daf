//! # Kernel
//!
//! Kernel context, bootstrap and the two switch triggers.
//!
//! All kernel state lives in one [`Kernel`] value. On target it sits in a
//! single `static` ([`KernelCell`]) so the PendSV handler can reach it with
//! one load; host tests own a `Kernel` over a recording port instead.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::kernel_init()       ← Compute ms prescaler
//!         ├─► kernel::add_threads([..])   ← Wire the cycle, build frames
//!         └─► kernel::kernel_launch(q)    ← No return
//!               ├─► Mask interrupts
//!               ├─► Set SysTick above PendSV
//!               ├─► Load SysTick with q ms, enable
//!               └─► Enter thread 0 via arch::enter_first_thread(),
//!                   which unmasks once PSP is thread 0's stack
//! ```
//!
//! ## Switch Protocol
//!
//! ```text
//! SysTick ──► on_tick() ──► pend PendSV ─┐
//! yield_now() ─► clear SysTick, pend ────┤
//!                                        ▼
//!                   PendSV (lowest priority): save r4-r11,
//!                   switch_context(): save sp, advance, load sp,
//!                   restore r4-r11, exception return
//! ```
//!
//! The tick only pends; it never touches kernel state. Because PendSV has the
//! lowest priority, the switch runs only after every other handler finished.

use core::cell::UnsafeCell;

use crate::config::{
    BUS_FREQ_HZ, NUM_THREADS, SWITCH_PRIORITY, SYSTICK_MAX_RELOAD, TICK_PRIORITY,
};
use crate::error::KernelError;
use crate::port::Port;
use crate::scheduler::Scheduler;
use crate::thread::{ThreadEntry, ThreadId};

// ---------------------------------------------------------------------------
// Kernel context
// ---------------------------------------------------------------------------

/// The whole kernel: port, thread store and bootstrap state.
///
/// Thread stacks live inline, so a `Kernel` must not move once threads have
/// been added.
pub struct Kernel<P: Port> {
    port: P,
    scheduler: Scheduler,
    /// Reference clock cycles per millisecond; zero until `init`.
    prescale: u32,
    threads_added: bool,
}

impl<P: Port> Kernel<P> {
    pub const fn new(port: P) -> Self {
        Self {
            port,
            scheduler: Scheduler::new(),
            prescale: 0,
            threads_added: false,
        }
    }

    /// Derive the millisecond prescaler from [`BUS_FREQ_HZ`].
    pub fn init(&mut self) {
        self.prescale = BUS_FREQ_HZ / 1000;
        crate::info!("kernel init: {=u32} cycles/ms", self.prescale);
    }

    /// Wire the round-robin cycle in the order given and build each thread's
    /// initial frame. Thread 0 becomes current.
    ///
    /// Runs with interrupts masked so no tick observes a half-wired list.
    pub fn add_threads(&mut self, entries: [ThreadEntry; NUM_THREADS]) -> Result<(), KernelError> {
        if self.threads_added {
            return Err(KernelError::AlreadyConfigured);
        }

        let scheduler = &mut self.scheduler;
        self.port.interrupt_free(|| scheduler.wire(entries));
        self.threads_added = true;

        crate::info!("{=usize} threads added", NUM_THREADS);
        Ok(())
    }

    /// Validate the configuration, mask interrupts and program the tick
    /// timer.
    ///
    /// Returns the saved stack pointer of the first thread, ready to be
    /// handed to [`Port::enter_first_thread`].
    pub fn prepare_launch(&mut self, quanta_ms: u32) -> Result<*mut u32, KernelError> {
        if self.prescale == 0 {
            return Err(KernelError::NotInitialized);
        }
        if !self.threads_added {
            return Err(KernelError::NoThreads);
        }
        let reload = reload_value(quanta_ms, self.prescale)?;

        // Stays masked until the first thread runs on its own stack: a tick
        // taken before that would switch away from an unset PSP.
        self.port.disable_interrupts();
        self.port.set_priorities(TICK_PRIORITY, SWITCH_PRIORITY);
        self.port.start_tick_timer(reload);

        crate::info!("launch: {=u32} ms slices, reload {=u32}", quanta_ms, reload);
        Ok(self.scheduler.stack_pointer(self.scheduler.current()))
    }

    /// Start scheduling. Never returns; a configuration error halts.
    pub fn launch(&mut self, quanta_ms: u32) -> ! {
        let prepared = self.prepare_launch(quanta_ms);
        enter_or_halt(&self.port, prepared)
    }

    /// Context-switch body: park the running thread at `sp`, advance the
    /// cycle and return where the next thread's frame starts.
    ///
    /// Only the switch interrupt calls this on target.
    pub fn switch_context(&mut self, sp: *mut u32) -> *mut u32 {
        self.scheduler.save_current(sp);
        let next = self.scheduler.advance();
        crate::trace!("switch to {=usize}", next.index());
        self.scheduler.stack_pointer(next)
    }

    /// Timer tick: see [`on_tick`].
    #[inline]
    pub fn on_tick(&self) {
        on_tick(&self.port);
    }

    /// End the caller's slice now: see [`yield_on`].
    #[inline]
    pub fn yield_now(&self) {
        yield_on(&self.port);
    }

    #[inline]
    pub fn current(&self) -> ThreadId {
        self.scheduler.current()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn prescale(&self) -> u32 {
        self.prescale
    }

    pub fn port(&self) -> &P {
        &self.port
    }
}

/// Enter the first thread at a prepared stack pointer, or log the launch
/// error and halt.
pub fn enter_or_halt<P: Port>(port: &P, prepared: Result<*mut u32, KernelError>) -> ! {
    match prepared {
        // Safety: `prepare_launch` only succeeds once threads are wired, the
        // timer is running and interrupts are masked.
        Ok(sp) => unsafe { port.enter_first_thread(sp) },
        Err(e) => {
            crate::error!("launch failed: {}", e);
            port.halt()
        }
    }
}

/// SysTick reload for a slice of `quanta_ms` at `prescale` cycles per ms.
pub fn reload_value(quanta_ms: u32, prescale: u32) -> Result<u32, KernelError> {
    if quanta_ms == 0 {
        return Err(KernelError::ZeroQuantum);
    }
    quanta_ms
        .checked_mul(prescale)
        .and_then(|cycles| cycles.checked_sub(1))
        .filter(|&reload| reload <= SYSTICK_MAX_RELOAD)
        .ok_or(KernelError::QuantumTooLong { quanta_ms })
}

// ---------------------------------------------------------------------------
// Switch triggers
// ---------------------------------------------------------------------------

/// Tick handler body: request a switch and return. It gets the port only,
/// so it cannot touch frames or the current thread.
#[inline]
pub fn on_tick<P: Port>(port: &P) {
    port.request_switch();
}

/// Yield body: restart the tick count so the next thread gets a full slice,
/// then request a switch without waiting for the tick.
///
/// Thread context only; never from the switch handler.
#[inline]
pub fn yield_on<P: Port>(port: &P) {
    port.reset_tick_counter();
    port.request_switch();
}

// ---------------------------------------------------------------------------
// Static storage
// ---------------------------------------------------------------------------

/// `Sync` home for a [`Kernel`] shared between thread and handler context.
pub struct KernelCell<P: Port>(UnsafeCell<Kernel<P>>);

// Safety: single core. Thread code takes the kernel only before launch;
// afterwards only PendSV, which cannot preempt itself, does.
unsafe impl<P: Port> Sync for KernelCell<P> {}

impl<P: Port> KernelCell<P> {
    pub const fn new(kernel: Kernel<P>) -> Self {
        Self(UnsafeCell::new(kernel))
    }

    /// # Safety
    /// No other reference to the kernel may be live, including one held by
    /// an interrupted handler.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn get(&self) -> &mut Kernel<P> {
        &mut *self.0.get()
    }
}

// ---------------------------------------------------------------------------
// Kernel API (target)
// ---------------------------------------------------------------------------

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use self::global::*;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) mod global {
    use super::{enter_or_halt, yield_on, Kernel, KernelCell};
    use crate::arch::cortex_m4::CortexM4;
    use crate::config::NUM_THREADS;
    use crate::error::KernelError;
    use crate::port::Port;
    use crate::thread::ThreadEntry;

    /// The kernel instance. Read by the PendSV handler.
    pub(crate) static KERNEL: KernelCell<CortexM4> = KernelCell::new(Kernel::new(CortexM4));

    /// Compute the millisecond prescaler. Call first, from `main`.
    pub fn kernel_init() {
        // Safety: before launch, nothing in handler context uses the kernel.
        unsafe { KERNEL.get() }.init();
    }

    /// Register exactly `NUM_THREADS` thread bodies, scheduled in this order.
    /// Call once, before [`kernel_launch`].
    pub fn add_threads(entries: [ThreadEntry; NUM_THREADS]) -> Result<(), KernelError> {
        // Safety: as in `kernel_init`.
        unsafe { KERNEL.get() }.add_threads(entries)
    }

    /// Start the tick timer and run thread 0. **Does not return.**
    pub fn kernel_launch(quanta_ms: u32) -> ! {
        // Safety: as in `kernel_init`. The borrow ends with this statement,
        // before PendSV can take its own.
        let prepared = unsafe { KERNEL.get() }.prepare_launch(quanta_ms);
        enter_or_halt(&CortexM4, prepared)
    }

    /// Give up the rest of the current slice. Every other thread runs once
    /// before the caller resumes.
    pub fn yield_now() {
        yield_on(&CortexM4);
    }

    /// Mask interrupts and stop.
    pub fn halt() -> ! {
        CortexM4.halt()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::sim::SimPort;

    extern crate std;
    use std::boxed::Box;
    use std::vec;
    use std::vec::Vec;

    extern "C" fn thread_a() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    extern "C" fn thread_b() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    extern "C" fn thread_c() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    const ENTRIES: [ThreadEntry; NUM_THREADS] = [thread_a, thread_b, thread_c];

    fn id(i: usize) -> ThreadId {
        ThreadId::new(i).unwrap()
    }

    fn ready_kernel() -> Box<Kernel<SimPort>> {
        let mut kernel = Box::new(Kernel::new(SimPort::default()));
        kernel.init();
        kernel.add_threads(ENTRIES).unwrap();
        kernel
    }

    /// Millisecond-step model of SysTick and PendSV around a real kernel.
    ///
    /// Threads consume no stack in this model, so a switch saves the same
    /// stack pointer the thread was entered with.
    struct Machine {
        kernel: Box<Kernel<SimPort>>,
        now_ms: u32,
        since_tick_ms: u32,
        period_ms: u32,
        /// (time, thread entered)
        dispatches: Vec<(u32, ThreadId)>,
    }

    impl Machine {
        fn boot(quanta_ms: u32) -> Self {
            let mut kernel = ready_kernel();
            let sp = kernel.prepare_launch(quanta_ms).unwrap();
            let first = kernel.current();
            assert_eq!(sp, kernel.scheduler().stack_pointer(first));

            let reload = kernel.port().reload.get().unwrap();
            let period_ms = (reload + 1) / kernel.prescale();
            Self {
                kernel,
                now_ms: 0,
                since_tick_ms: 0,
                period_ms,
                dispatches: vec![(0, first)],
            }
        }

        fn run_ms(&mut self, ms: u32) {
            for _ in 0..ms {
                self.now_ms += 1;
                self.since_tick_ms += 1;
                if self.since_tick_ms == self.period_ms {
                    self.since_tick_ms = 0;
                    self.kernel.on_tick();
                }
                self.service_switch();
            }
        }

        fn yield_now(&mut self) {
            let resets = self.kernel.port().counter_resets.get();
            self.kernel.yield_now();
            if self.kernel.port().counter_resets.get() != resets {
                self.since_tick_ms = 0;
            }
            self.service_switch();
        }

        /// What PendSV does once nothing more urgent is pending.
        fn service_switch(&mut self) {
            if !self.kernel.port().take_switch() {
                return;
            }
            let running = self.kernel.current();
            let sp = self.kernel.scheduler().stack_pointer(running);
            let next_sp = self.kernel.switch_context(sp);

            let next = self.kernel.current();
            assert_eq!(next_sp, self.kernel.scheduler().stack_pointer(next));
            self.dispatches.push((self.now_ms, next));
        }

        fn order(&self) -> Vec<ThreadId> {
            self.dispatches.iter().map(|&(_, t)| t).collect()
        }
    }

    // --- Bootstrap ---

    #[test]
    fn test_init_computes_ms_prescaler() {
        let mut kernel = Kernel::new(SimPort::default());
        assert_eq!(kernel.prescale(), 0);
        kernel.init();
        assert_eq!(kernel.prescale(), 16_000);
    }

    #[test]
    fn test_add_threads_masks_interrupts() {
        let kernel = ready_kernel();
        assert_eq!(kernel.port().masked_sections.get(), 1);
        assert!(!kernel.port().masked.get());
        assert_eq!(kernel.current(), ThreadId::FIRST);
    }

    #[test]
    fn test_add_threads_twice_is_rejected() {
        let mut kernel = ready_kernel();
        let before = kernel.scheduler().stack_pointer(id(0));
        assert_eq!(
            kernel.add_threads(ENTRIES),
            Err(KernelError::AlreadyConfigured)
        );
        assert_eq!(kernel.scheduler().stack_pointer(id(0)), before);
    }

    #[test]
    fn test_frames_hold_entries_after_add_threads() {
        let kernel = ready_kernel();
        for (tid, entry) in ThreadId::all().zip(ENTRIES) {
            let frame = kernel.scheduler().saved_frame(tid).unwrap();
            assert_eq!(frame.pc, crate::thread::entry_address(entry));
        }
    }

    #[test]
    fn test_reload_value() {
        assert_eq!(reload_value(10, 16_000), Ok(159_999));
        assert_eq!(reload_value(1, 16_000), Ok(15_999));
        assert_eq!(reload_value(0, 16_000), Err(KernelError::ZeroQuantum));
        assert_eq!(
            reload_value(2000, 16_000),
            Err(KernelError::QuantumTooLong { quanta_ms: 2000 })
        );
        assert_eq!(
            reload_value(u32::MAX, 16_000),
            Err(KernelError::QuantumTooLong { quanta_ms: u32::MAX })
        );
    }

    #[test]
    fn test_prepare_launch_programs_timer_and_priorities() {
        let mut kernel = ready_kernel();
        let sp = kernel.prepare_launch(10).unwrap();

        assert_eq!(sp, kernel.scheduler().stack_pointer(ThreadId::FIRST));
        assert_eq!(kernel.port().reload.get(), Some(159_999));

        let (tick, switch) = kernel.port().priorities.get().unwrap();
        assert!(tick < switch, "tick must preempt the switch");
        assert_eq!(switch, SWITCH_PRIORITY);
        // Launch itself never pends a switch.
        assert!(!kernel.port().switch_pending.get());
    }

    #[test]
    fn test_timer_starts_with_interrupts_masked() {
        let mut kernel = ready_kernel();
        assert!(!kernel.port().masked.get());

        kernel.prepare_launch(10).unwrap();

        assert_eq!(kernel.port().masked_at_timer_start.get(), Some(true));
        // Nothing unmasks before the first thread is entered.
        assert!(kernel.port().masked.get());
    }

    #[test]
    fn test_prepare_launch_requires_init_and_threads() {
        let mut kernel = Box::new(Kernel::new(SimPort::default()));
        assert_eq!(kernel.prepare_launch(10), Err(KernelError::NotInitialized));
        kernel.init();
        assert_eq!(kernel.prepare_launch(10), Err(KernelError::NoThreads));
        assert_eq!(kernel.port().reload.get(), None);
    }

    #[test]
    #[should_panic(expected = "halted")]
    fn test_launch_with_bad_quantum_halts() {
        let mut kernel = ready_kernel();
        kernel.launch(0);
    }

    // --- Switch triggers ---

    #[test]
    fn test_tick_only_pends() {
        let kernel = ready_kernel();
        let before: Vec<_> = ThreadId::all()
            .map(|t| kernel.scheduler().stack_pointer(t))
            .collect();

        kernel.on_tick();

        assert!(kernel.port().switch_pending.get());
        assert_eq!(kernel.port().counter_resets.get(), 0);
        assert_eq!(kernel.current(), ThreadId::FIRST);
        let after: Vec<_> = ThreadId::all()
            .map(|t| kernel.scheduler().stack_pointer(t))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_yield_resets_counter_and_pends() {
        let kernel = ready_kernel();
        kernel.yield_now();
        assert_eq!(kernel.port().counter_resets.get(), 1);
        assert_eq!(kernel.port().switch_requests.get(), 1);
        assert_eq!(kernel.current(), ThreadId::FIRST);
    }

    #[test]
    fn test_switch_context_saves_and_restores() {
        let mut kernel = ready_kernel();
        let entered = kernel.scheduler().stack_pointer(id(0));
        // Thread 0 ran and left a frame 8 words deeper.
        let parked = entered.wrapping_sub(8);

        let next_sp = kernel.switch_context(parked);

        assert_eq!(kernel.current(), id(1));
        assert_eq!(kernel.scheduler().stack_pointer(id(0)), parked);
        assert_eq!(next_sp, kernel.scheduler().stack_pointer(id(1)));
    }

    // --- Scheduling behaviour ---

    #[test]
    fn test_round_robin_without_yields() {
        let mut m = Machine::boot(10);
        m.run_ms(60);

        let (a, b, c) = (id(0), id(1), id(2));
        assert_eq!(m.order(), vec![a, b, c, a, b, c, a]);
        let times: Vec<u32> = m.dispatches.iter().map(|&(t, _)| t).collect();
        assert_eq!(times, vec![0, 10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn test_yield_hands_over_immediately() {
        let mut m = Machine::boot(10);
        m.run_ms(2);
        m.yield_now();
        m.run_ms(40);

        let (a, b, c) = (id(0), id(1), id(2));
        assert_eq!(
            m.dispatches,
            vec![(0, a), (2, b), (12, c), (22, a), (32, b), (42, c)]
        );
    }

    #[test]
    fn test_yielding_thread_resumes_after_all_others() {
        let mut m = Machine::boot(10);
        m.run_ms(25); // thread c running
        let yielder = m.kernel.current();
        m.yield_now();

        let mut waited = 0;
        while m.kernel.current() != yielder {
            m.run_ms(1);
            waited += 1;
        }
        let after_yield: Vec<ThreadId> = m.order().into_iter().skip(3).collect();
        assert_eq!(after_yield, vec![id(0), id(1), id(2)]);
        assert_eq!(waited, 20);
    }

    #[test]
    fn test_suspended_threads_keep_own_frames() {
        let mut m = Machine::boot(5);
        for step in 0..100 {
            if step % 7 == 3 {
                m.yield_now();
            } else {
                m.run_ms(1);
            }
            let sched = m.kernel.scheduler();
            let current = sched.current();
            let running_sp = sched.stack_pointer(current);
            // Every suspended thread keeps its own resumable frame.
            for t in ThreadId::all().filter(|&t| t != current) {
                assert!(sched.saved_frame(t).is_some());
                assert_ne!(sched.stack_pointer(t), running_sp);
            }
        }
    }

    #[test]
    fn test_dispatch_sequence_is_deterministic() {
        fn run_script() -> Vec<(u32, ThreadId)> {
            let mut m = Machine::boot(3);
            for round in 0..20u32 {
                m.run_ms(round % 5);
                if round % 3 == 0 {
                    m.yield_now();
                }
            }
            m.dispatches
        }
        let first = run_script();
        assert_eq!(first.len(), 20);
        assert_eq!(first, run_script());
    }
}
