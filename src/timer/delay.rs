use crate::engine::ProtocolEngine;
use crate::hal::{Backing, PowerManager, Radio};
use embedded_hal::delay::DelayNs;

use super::Clock;

/// Software clock advanced by the poll loop after every delay.
///
/// It drifts by however long each poll takes, which is fine for the
/// protocol's timeouts of tens of milliseconds and more.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopClock {
    now: u32,
}

impl LoopClock {
    /// A clock starting at zero.
    pub const fn new() -> Self {
        Self { now: 0 }
    }

    /// Moves the clock forward by `ms`.
    pub fn advance(&mut self, ms: u32) {
        self.now = self.now.wrapping_add(ms);
    }
}

impl Clock for LoopClock {
    fn now_ms(&self) -> u32 {
        self.now
    }
}

/// Polls `engine` once, then waits `tick_ms` and advances `clock`.
pub fn poll_once<R, P, B, D>(
    engine: &mut ProtocolEngine<R, P, B>,
    clock: &mut LoopClock,
    delay: &mut D,
    tick_ms: u32,
) where
    R: Radio,
    P: PowerManager,
    B: Backing,
    D: DelayNs,
{
    engine.poll(clock.now_ms());
    delay.delay_ms(tick_ms);
    clock.advance(tick_ms);
}

/// Runs a blocking loop that repeatedly polls the provided engine.
///
/// This is a simple timing loop for use in environments where interrupts are
/// unavailable or undesired. Time is kept by a [`LoopClock`] that advances
/// by `tick_ms` after every delay.
///
/// # Arguments
/// - `engine`: the protocol engine
/// - `delay`: A delay provider implementing `DelayNs`, typically from the HAL.
/// - `tick_ms`: The delay between polls, in milliseconds (e.g. 1).
///
/// # Example
/// ```rust,ignore
/// use asksin::timer::run_poll_loop;
/// let mut engine = ProtocolEngine::new(radio, power, eeprom, &CHANNELS, IDENTITY, config)?;
/// run_poll_loop(&mut engine, &mut delay, 1);
/// ```
///
/// # Notes
/// - This loop will never return; it is intended for single-purpose polling firmware.
/// - Nodes that sleep between polls should use the `timer-isr` clock instead.
pub fn run_poll_loop<R, P, B, D>(engine: &mut ProtocolEngine<R, P, B>, delay: &mut D, tick_ms: u32)
where
    R: Radio,
    P: PowerManager,
    B: Backing,
    D: DelayNs,
{
    let mut clock = LoopClock::new();
    loop {
        poll_once(engine, &mut clock, delay, tick_ms);
    }
}
