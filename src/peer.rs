//! Per channel peer table.
//!
//! A channel can talk to a fixed number of peers directly, bypassing the
//! central. Each peer occupies one slot; the slot index is also the peer
//! index used to address the channel's per-peer register block, so slots are
//! never compacted or reordered.
//!
//! ## Entry layout
//!
//! | byte | field |
//! |------|-------|
//! | 0..3 | peer address |
//! | 3 | peer channel |
//!
//! A slot whose address is all zero is free.

use heapless::Vec;

use crate::consts::{MAX_PEERS, PEER_ENTRY_LEN};
use crate::error::PeerError;
use crate::message::Address;

/// One peer: a remote address plus the remote channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct PeerEntry {
    /// Remote device address.
    pub address: Address,
    /// Remote channel number.
    pub channel: u8,
}

impl PeerEntry {
    /// Creates an entry.
    pub const fn new(address: Address, channel: u8) -> Self {
        Self { address, channel }
    }

    /// Reads an entry from its 4 byte wire/storage form.
    ///
    /// # Returns
    /// - `None` if the slice is too short or the address is all zero
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let address = Address::from_slice(bytes)?;
        let channel = *bytes.get(3)?;
        if address.is_broadcast() {
            return None;
        }
        Some(Self { address, channel })
    }

    /// The 4 byte wire/storage form.
    pub fn to_bytes(&self) -> [u8; PEER_ENTRY_LEN] {
        let [a0, a1, a2] = self.address.0;
        [a0, a1, a2, self.channel]
    }
}

/// Fixed capacity, slot indexed peer set of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerTable {
    slots: Vec<Option<PeerEntry>, MAX_PEERS>,
}

impl PeerTable {
    /// An empty table with `capacity` slots, clamped to [`MAX_PEERS`].
    pub fn new(capacity: u8) -> Self {
        let mut slots = Vec::new();
        let _ = slots.resize(usize::from(capacity).min(MAX_PEERS), None);
        Self { slots }
    }

    /// Number of slots, used or not.
    pub fn capacity(&self) -> u8 {
        self.slots.len() as u8
    }

    /// Slot holding exactly this address and channel.
    pub fn find(&self, address: Address, channel: u8) -> Option<u8> {
        self.iter()
            .find(|(_, entry)| entry.address == address && entry.channel == channel)
            .map(|(slot, _)| slot)
    }

    /// Lowest free slot.
    pub fn first_free_slot(&self) -> Result<u8, PeerError> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(|slot| slot as u8)
            .ok_or(PeerError::Full)
    }

    /// Entry in `slot`, `None` if the slot is free or out of range.
    pub fn get(&self, slot: u8) -> Option<PeerEntry> {
        self.slots.get(usize::from(slot)).copied().flatten()
    }

    /// Stores `entry` in `slot`, overwriting what was there.
    ///
    /// # Returns
    /// - `Err(PeerError::EmptyAddress)`: the address would read back as free
    /// - `Err(PeerError::Duplicate(other))`: `other` already holds the entry
    pub fn set(&mut self, slot: u8, entry: PeerEntry) -> Result<(), PeerError> {
        if entry.address.is_broadcast() {
            return Err(PeerError::EmptyAddress);
        }
        match self.find(entry.address, entry.channel) {
            Some(other) if other != slot => return Err(PeerError::Duplicate(other)),
            _ => {}
        }
        let cell = self
            .slots
            .get_mut(usize::from(slot))
            .ok_or(PeerError::InvalidSlot(slot))?;
        *cell = Some(entry);
        Ok(())
    }

    /// Frees `slot`. Freeing a free slot is not an error.
    pub fn clear(&mut self, slot: u8) -> Result<(), PeerError> {
        let cell = self
            .slots
            .get_mut(usize::from(slot))
            .ok_or(PeerError::InvalidSlot(slot))?;
        *cell = None;
        Ok(())
    }

    /// Adds `entry` unless it is already present.
    ///
    /// # Returns
    /// - `Ok(slot)`: slot now holding the entry
    /// - `Err(PeerError::Full)`: the entry is new and no slot is free
    pub fn upsert(&mut self, entry: PeerEntry) -> Result<u8, PeerError> {
        if let Some(slot) = self.find(entry.address, entry.channel) {
            return Ok(slot);
        }
        let slot = self.first_free_slot()?;
        self.set(slot, entry)?;
        Ok(slot)
    }

    /// Frees every slot.
    pub fn clear_all(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// Number of occupied slots.
    pub fn used_slot_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Occupied slots in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, PeerEntry)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.map(|entry| (slot as u8, entry)))
    }
}
