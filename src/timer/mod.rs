//! Time keeping for the protocol engine.
//!
//! Every timeout in the engine is a deadline that is checked on the next
//! poll, never a blocking wait. This module provides the millisecond
//! [`Clock`] abstraction, the [`WaitTimer`] deadline helper and two ways of
//! producing the millisecond time base: an interrupt driven counter
//! (`timer-isr` feature) or a blocking poll loop (`delay-loop` feature).
//!
//! Contains helpers for configuring a 1 ms hardware tick, including:
//! - `compute_ocr_value`: runtime OCR calculator
//! - `const_ocr_value`: compile-time OCR calculator
//! - `run_poll_loop`: blocking engine loop for `DelayNs` (feature `delay-loop`)
//! - `millis_tick` and `IsrClock`: interrupt based millisecond counter
//!   (feature `timer-isr`)
//!
//! Common prescalers for a 1 ms tick: (For use with `compute_ocr_value` and `const_ocr_value`)
//!
//! | F_CPU | PRESCALER | OCR |
//! |-------|-----------|-----|
//! |  8 MHz |        64 | 125 |
//! | 16 MHz |        64 | 250 |
//! | 16 MHz |       256 |  63 |

use libm::round;

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg_attr(feature = "delay-loop", allow(unused_imports))]
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

/// Microseconds per engine tick.
pub const TICK_US: u32 = 1_000;

/// A monotonic millisecond counter that is allowed to wrap.
pub trait Clock {
    /// Milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u32;
}

/// A single deadline, checked by polling.
///
/// Comparisons use wrapping arithmetic, so a timer keeps working across the
/// 49 day overflow of a `u32` millisecond counter as long as no single wait
/// exceeds half of that range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct WaitTimer {
    deadline: Option<u32>,
}

impl WaitTimer {
    /// An unarmed timer; [`WaitTimer::elapsed`] reports `true`.
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Arms the timer to expire `duration_ms` after `now`.
    pub fn set(&mut self, now: u32, duration_ms: u32) {
        self.deadline = Some(now.wrapping_add(duration_ms));
    }

    /// Disarms the timer.
    pub fn clear(&mut self) {
        self.deadline = None;
    }

    /// `true` while a deadline is pending or expired but not cleared.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// `true` once the deadline has passed, or if the timer is not armed.
    pub fn elapsed(&self, now: u32) -> bool {
        match self.deadline {
            Some(deadline) => (now.wrapping_sub(deadline) as i32) >= 0,
            None => true,
        }
    }

    /// Milliseconds left until the deadline, zero once elapsed.
    pub fn remaining(&self, now: u32) -> u32 {
        match self.deadline {
            Some(deadline) if !self.elapsed(now) => deadline.wrapping_sub(now),
            _ => 0,
        }
    }
}

/// Computes the OCR value for an AVR timer (CTC mode) producing the engine tick
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 8, 64, 256)
/// - `tick_us`: desired tick interval in microseconds (e.g., 1000.0)
///
/// # Returns
/// - OCR value for OCRnA (rounds to nearest integer)
pub fn compute_ocr_value(f_cpu: u32, prescaler: u32, tick_us: f32) -> u16 {
    let ticks_per_second: f64 = f_cpu as f64 / prescaler as f64;
    let ticks_per_tick: f64 = ticks_per_second * (tick_us as f64 / 1_000_000.0);
    round(ticks_per_tick) as u16
}

/// Compile-time OCR value calculator
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 8, 64, 256)
/// - `tick_us`: desired tick interval in whole microseconds
///
/// # Returns
/// - OCR value for OCRnA (truncated)
pub const fn const_ocr_value(f_cpu: u32, prescaler: u32, tick_us: u32) -> u16 {
    ((f_cpu / prescaler) as u64 * tick_us as u64 / 1_000_000) as u16
}
