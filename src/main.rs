//! # RROS Example Firmware
//!
//! Three threads forming a small tank-level control loop, in the order they
//! are added:
//!
//! | Thread | Work per turn |
//! |--------|---------------|
//! | `acquire_level_sample` | Take one 12-bit level sensor sample |
//! | `scale_level` | Convert the sample to millimetres (0–1500 mm) |
//! | `control_pump` | Pump on above [`MIN_LEVEL_MM`], report changes |
//!
//! Each thread does one step and yields, so a full control cycle takes three
//! switches instead of three time slices. The quantum only matters if a
//! thread overruns.
//!
//! Peripheral drivers are outside the kernel. The sample source here is a
//! slow ramp standing in for a blocking ADC read, and pump transitions go to
//! the log instead of a GPIO pin.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use cortex_m_rt::entry;
use panic_halt as _;
#[cfg(feature = "defmt")]
use defmt_rtt as _;

use rros::config::QUANTA_MS;
use rros::kernel;

/// Full-scale reading of the 12-bit converter.
const ADC_FULL_SCALE: u32 = 4096;
/// Tank depth at full scale.
const MAX_LEVEL_MM: u32 = 1500;
/// Pump runs while the level is above this.
const MIN_LEVEL_MM: u32 = 300;

// Shared between threads. The kernel offers no locking; each value has a
// single writer and word-sized atomics keep reads whole.
static LEVEL_SAMPLE: AtomicU32 = AtomicU32::new(0);
static LEVEL_MM: AtomicU32 = AtomicU32::new(0);
static PUMP_ON: AtomicBool = AtomicBool::new(false);

/// Stand-in for a blocking conversion: a ramp over the full input range.
fn read_level_sample(previous: u32) -> u32 {
    (previous + 37) % ADC_FULL_SCALE
}

fn scale_to_mm(sample: u32) -> u32 {
    sample * MAX_LEVEL_MM / ADC_FULL_SCALE
}

extern "C" fn acquire_level_sample() -> ! {
    let mut sample = 0;
    loop {
        sample = read_level_sample(sample);
        LEVEL_SAMPLE.store(sample, Ordering::Relaxed);
        kernel::yield_now();
    }
}

extern "C" fn scale_level() -> ! {
    loop {
        let sample = LEVEL_SAMPLE.load(Ordering::Relaxed);
        LEVEL_MM.store(scale_to_mm(sample), Ordering::Relaxed);
        kernel::yield_now();
    }
}

extern "C" fn control_pump() -> ! {
    loop {
        let level = LEVEL_MM.load(Ordering::Relaxed);
        let want_on = level > MIN_LEVEL_MM;
        if PUMP_ON.swap(want_on, Ordering::Relaxed) != want_on {
            if want_on {
                rros::info!("pump on at {=u32} mm", level);
            } else {
                rros::info!("pump off at {=u32} mm", level);
            }
        }
        kernel::yield_now();
    }
}

/// Firmware entry point. Initializes the kernel, adds the threads and
/// starts the scheduler. Does not return.
#[entry]
fn main() -> ! {
    kernel::kernel_init();

    if let Err(e) = kernel::add_threads([acquire_level_sample, scale_level, control_pump]) {
        rros::error!("add_threads failed: {}", e);
        kernel::halt();
    }

    kernel::kernel_launch(QUANTA_MS)
}
