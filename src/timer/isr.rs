use crate::engine::ProtocolEngine;
use crate::hal::{Backing, PowerManager, Radio};
use core::cell::{Cell, RefCell};
use critical_section::Mutex;

use super::Clock;

static MILLIS: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

/// Advances the global millisecond counter by one.
///
/// Call this from a timer interrupt firing every [`TICK_US`](super::TICK_US)
/// microseconds.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIMER0_COMPA() {
///     asksin::timer::millis_tick();
/// }
/// ```
pub fn millis_tick() {
    critical_section::with(|cs| {
        let millis = MILLIS.borrow(cs);
        millis.set(millis.get().wrapping_add(1));
    });
}

/// Current value of the global millisecond counter.
pub fn millis() -> u32 {
    critical_section::with(|cs| MILLIS.borrow(cs).get())
}

/// [`Clock`] reading the counter advanced by [`millis_tick`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IsrClock;

impl Clock for IsrClock {
    fn now_ms(&self) -> u32 {
        millis()
    }
}

/// Used to initialize a global static `ProtocolEngine` for use with
/// `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
///
/// # Example
/// ```rust,ignore
/// static ENGINE: Mutex<RefCell<Option<ProtocolEngine<Cc1101, Avr, Eeprom>>>> =
///     global_engine_init();
/// ```
pub const fn global_engine_init<R: Radio, P: PowerManager, B: Backing>()
-> Mutex<RefCell<Option<ProtocolEngine<R, P, B>>>> {
    Mutex::new(RefCell::new(None))
}

/// Moves `engine` into the global static.
pub fn global_engine_setup<R: Radio, P: PowerManager, B: Backing>(
    global_engine: &'static Mutex<RefCell<Option<ProtocolEngine<R, P, B>>>>,
    engine: ProtocolEngine<R, P, B>,
) {
    critical_section::with(|cs| {
        let _ = global_engine.borrow(cs).replace(Some(engine));
    });
}

/// Runs `f` on the global engine, if it was set up.
pub fn with_global_engine<R: Radio, P: PowerManager, B: Backing, T>(
    global_engine: &'static Mutex<RefCell<Option<ProtocolEngine<R, P, B>>>>,
    f: impl FnOnce(&mut ProtocolEngine<R, P, B>) -> T,
) -> Option<T> {
    critical_section::with(|cs| global_engine.borrow(cs).borrow_mut().as_mut().map(f))
}

/// Polls the global engine at the current [`millis`] time.
///
/// # Example
/// ```rust,ignore
/// loop {
///     global_engine_poll(&ENGINE);
///     sleep_until_interrupt();
/// }
/// ```
pub fn global_engine_poll<R: Radio, P: PowerManager, B: Backing>(
    global_engine: &'static Mutex<RefCell<Option<ProtocolEngine<R, P, B>>>>,
) {
    let now = millis();
    let _ = with_global_engine(global_engine, |engine| engine.poll(now));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestEngine, test_engine};

    static ENGINE: Mutex<RefCell<Option<TestEngine>>> = global_engine_init();

    #[test]
    fn test_millis_tick_advances_clock() {
        let before = IsrClock.now_ms();
        millis_tick();
        millis_tick();
        assert!(IsrClock.now_ms().wrapping_sub(before) >= 2);
    }

    #[test]
    fn test_global_engine_poll() {
        assert_eq!(with_global_engine(&ENGINE, |_| ()), None);
        global_engine_setup(&ENGINE, test_engine());
        let started = with_global_engine(&ENGINE, |engine| engine.start_pairing(millis()));
        assert_eq!(started, Some(Ok(())));

        global_engine_poll(&ENGINE);
        let sent = with_global_engine(&ENGINE, |engine| engine.radio().sent.len());
        assert_eq!(sent, Some(1));
    }
}
