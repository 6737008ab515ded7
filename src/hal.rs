//! Interfaces to the collaborators the protocol engine drives but does not
//! implement: the radio transceiver, the power manager and the non-volatile
//! backing store.
//!
//! The engine only ever talks to hardware through these traits, so the whole
//! protocol can run against in-memory doubles on a host.

/// Radio transceiver driver.
///
/// Modulation, FIFO handling and burst generation live behind this trait.
/// Frames passed to [`Radio::transmit`] are already scrambled, frames read
/// by [`Radio::receive_into`] are still scrambled.
pub trait Radio {
    /// Error type of the underlying driver.
    #[cfg(feature = "defmt-0-3")]
    type Error: core::fmt::Debug + defmt::Format;

    /// Error type of the underlying driver.
    #[cfg(not(feature = "defmt-0-3"))]
    type Error: core::fmt::Debug;

    /// Sends one frame, preceded by a wake-up burst if `burst` is set.
    fn transmit(&mut self, frame: &[u8], burst: bool) -> Result<(), Self::Error>;

    /// Copies a received frame into `buf`.
    ///
    /// # Returns
    /// - `Ok(n)`: `n` bytes were written, length byte included
    /// - `Err(nb::Error::WouldBlock)`: nothing was received
    fn receive_into(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error>;

    /// Puts the transceiver into its power-down state.
    fn set_idle(&mut self);

    /// `true` if a carrier (a wake-up burst) is currently on the air.
    fn detect_carrier(&mut self) -> bool;

    /// Signal strength of the last received frame.
    fn rssi(&self) -> u8 {
        0
    }
}

/// Power manager.
pub trait PowerManager {
    /// Keeps the node awake for at least `duration_ms` from now.
    fn stay_awake(&mut self, duration_ms: u16);
}

/// Non-volatile storage holding lists, peer tables and the schema checksum.
pub trait Backing {
    /// Reads `out.len()` bytes starting at `address`.
    fn read(&mut self, address: u16, out: &mut [u8]) -> Result<(), BackingError>;

    /// Writes `data` starting at `address`.
    ///
    /// Implementations should skip bytes that already hold the value.
    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), BackingError>;
}

/// The backing store could not serve an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct BackingError;

/// RAM backed [`Backing`] of `N` bytes, initialised to `0xFF` like an erased
/// EEPROM.
///
/// Writes of a byte that already holds the value are skipped and not counted,
/// which mirrors an EEPROM update cycle.
#[derive(Debug, Clone)]
pub struct MemoryBacking<const N: usize> {
    data: [u8; N],
    writes: usize,
}

impl<const N: usize> Default for MemoryBacking<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MemoryBacking<N> {
    /// A fully erased store.
    pub const fn new() -> Self {
        Self {
            data: [0xff; N],
            writes: 0,
        }
    }

    /// Number of bytes that actually changed since creation.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Raw contents.
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.data
    }

    fn range(address: u16, len: usize) -> Result<core::ops::Range<usize>, BackingError> {
        let start = address as usize;
        let end = start.checked_add(len).ok_or(BackingError)?;
        if end > N {
            return Err(BackingError);
        }
        Ok(start..end)
    }
}

impl<const N: usize> Backing for MemoryBacking<N> {
    fn read(&mut self, address: u16, out: &mut [u8]) -> Result<(), BackingError> {
        let range = Self::range(address, out.len())?;
        out.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), BackingError> {
        let range = Self::range(address, data.len())?;
        for (cell, value) in self.data[range].iter_mut().zip(data) {
            if *cell != *value {
                *cell = *value;
                self.writes += 1;
            }
        }
        Ok(())
    }
}
