//! Register lists and their persistence.
//!
//! Every channel owns exactly one channel list (list 0 for the maintenance
//! channel, list 1 for everything else) and at most one peer list (list 3 or
//! list 4). A peer list is stored once per peer slot, so each peer gets its
//! own private register block.
//!
//! Lists are described by static [`ListDef`] tables: the register addresses
//! the list exposes and the compiled default for each of them. The
//! [`RegisterStore`] keeps a working copy of each channel's lists in RAM and
//! mirrors it into a [`Backing`] store.
//!
//! ## Backing layout
//!
//! | address | content |
//! |---------|---------|
//! | 0..2 | schema checksum, little endian |
//! | 2.. | per channel: channel list, then `peer_max` peer list blocks |
//! | after the lists | per channel: `peer_max` peer entries of 4 bytes |
//!
//! The schema checksum is a CRC-16 over every list's register table, default
//! table and the channel's peer capacity. When the stored value differs from
//! the compiled one the whole store is rewritten from defaults.

use heapless::Vec;

use crate::consts::{
    LIST_DEVICE, LIST_PEER_ACTUATOR, LISTS_START_ADDRESS, MAGIC_ADDRESS, MAX_CHANNELS,
    MAX_LIST_LEN, PEER_ENTRY_LEN,
};
use crate::crc::crc16_slice;
use crate::error::StoreError;
use crate::hal::{Backing, BackingError};
use crate::peer::{PeerEntry, PeerTable};

impl From<BackingError> for StoreError {
    fn from(_: BackingError) -> Self {
        StoreError::Backing
    }
}

/// Static description of one register list.
#[derive(Debug)]
pub struct ListDef {
    /// List index, 0 to 4.
    pub index: u8,
    /// Register addresses in storage order.
    pub registers: &'static [u8],
    /// Compiled default value for each register.
    pub defaults: &'static [u8],
}

impl ListDef {
    /// Describes a list. Both tables must have the same length.
    pub const fn new(index: u8, registers: &'static [u8], defaults: &'static [u8]) -> Self {
        Self {
            index,
            registers,
            defaults,
        }
    }

    /// Number of registers.
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// `true` for a list without registers.
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// `true` for lists stored once per peer (list 3 and 4).
    pub fn is_peer_list(&self) -> bool {
        self.index >= LIST_PEER_ACTUATOR
    }

    /// Offset of `register` inside the list's value buffer.
    pub fn register_offset(&self, register: u8) -> Option<usize> {
        self.registers.iter().position(|r| *r == register)
    }
}

/// The lists and peer capacity of one channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelLayout {
    /// List 0 or list 1.
    pub channel_list: &'static ListDef,
    /// List 3 or list 4, if the channel can be peered.
    pub peer_list: Option<&'static ListDef>,
    /// Number of peer slots.
    pub peer_max: u8,
}

#[derive(Debug)]
struct ChannelLists {
    layout: ChannelLayout,
    channel_address: usize,
    peer_list_address: usize,
    peer_table_address: usize,
    channel_values: Vec<u8, MAX_LIST_LEN>,
    peer_values: Vec<u8, MAX_LIST_LEN>,
    loaded_peer: Option<u8>,
}

impl ChannelLists {
    fn list(&self, list: u8) -> Option<&'static ListDef> {
        if self.layout.channel_list.index == list {
            return Some(self.layout.channel_list);
        }
        self.layout.peer_list.filter(|def| def.index == list)
    }
}

/// Working copies of every channel's lists plus their backing store.
#[derive(Debug)]
pub struct RegisterStore<B: Backing> {
    backing: B,
    channels: Vec<ChannelLists, MAX_CHANNELS>,
    end_address: usize,
}

fn to_address(address: usize) -> Result<u16, StoreError> {
    u16::try_from(address).map_err(|_| StoreError::Backing)
}

impl<B: Backing> RegisterStore<B> {
    /// Lays out the lists of `layouts` (channel 0 first) in `backing`.
    ///
    /// Nothing is read or written until [`RegisterStore::open`].
    /// Layouts beyond [`MAX_CHANNELS`] are ignored.
    pub fn new(backing: B, layouts: &[ChannelLayout]) -> Self {
        let mut channels: Vec<ChannelLists, MAX_CHANNELS> = Vec::new();
        let mut address = usize::from(LISTS_START_ADDRESS);
        for layout in layouts.iter().take(MAX_CHANNELS) {
            debug_assert_eq!(
                layout.channel_list.registers.len(),
                layout.channel_list.defaults.len()
            );
            let channel_address = address;
            address += layout.channel_list.len();
            let peer_list_address = address;
            if let Some(def) = layout.peer_list {
                debug_assert_eq!(def.registers.len(), def.defaults.len());
                address += def.len() * usize::from(layout.peer_max);
            }
            let _ = channels.push(ChannelLists {
                layout: *layout,
                channel_address,
                peer_list_address,
                peer_table_address: 0,
                channel_values: Vec::new(),
                peer_values: Vec::new(),
                loaded_peer: None,
            });
        }
        for channel in channels.iter_mut() {
            channel.peer_table_address = address;
            address += usize::from(channel.layout.peer_max) * PEER_ENTRY_LEN;
        }
        Self {
            backing,
            channels,
            end_address: address,
        }
    }

    /// Checks the stored schema checksum, reinitialises everything from
    /// defaults on mismatch and loads every channel list.
    ///
    /// # Returns
    /// - `Ok(true)` if the store was reinitialised
    pub fn open(&mut self) -> Result<bool, StoreError> {
        let mut stored = [0u8; 2];
        self.backing
            .read(MAGIC_ADDRESS, &mut stored)
            .map_err(StoreError::from)?;
        let expected = self.schema_checksum();
        let reinitialised = u16::from_le_bytes(stored) != expected;
        if reinitialised {
            info!(
                "store schema mismatch, stored {:x} expected {:x}",
                u16::from_le_bytes(stored),
                expected
            );
            self.reset_to_defaults()?;
        }
        for channel in 0..self.channels.len() as u8 {
            let list = self.channels[usize::from(channel)].layout.channel_list.index;
            self.load(channel, list, 0)?;
        }
        Ok(reinitialised)
    }

    /// CRC-16 over every compiled list table and peer capacity.
    pub fn schema_checksum(&self) -> u16 {
        self.channels.iter().fold(0, |crc, channel| {
            let layout = &channel.layout;
            let mut crc = crc16_slice(crc, layout.channel_list.registers);
            crc = crc16_slice(crc, layout.channel_list.defaults);
            if let Some(def) = layout.peer_list {
                crc = crc16_slice(crc, def.registers);
                crc = crc16_slice(crc, def.defaults);
            }
            crc16_slice(crc, &[layout.peer_max])
        })
    }

    /// Number of channels, channel 0 included.
    pub fn channel_count(&self) -> u8 {
        self.channels.len() as u8
    }

    /// First backing address past the store's data.
    pub fn end_address(&self) -> usize {
        self.end_address
    }

    /// The backing store.
    pub fn backing(&self) -> &B {
        &self.backing
    }

    /// Peer capacity of `channel`, zero for unknown channels.
    pub fn peer_max(&self, channel: u8) -> u8 {
        self.channels
            .get(usize::from(channel))
            .map_or(0, |c| c.layout.peer_max)
    }

    /// Definition of `list` on `channel`. List 0 always resolves to
    /// channel 0.
    pub fn list_def(&self, channel: u8, list: u8) -> Result<&'static ListDef, StoreError> {
        let (channel, list) = Self::route(channel, list);
        self.channels
            .get(usize::from(channel))
            .and_then(|c| c.list(list))
            .ok_or(StoreError::UnknownList { channel, list })
    }

    fn route(channel: u8, list: u8) -> (u8, u8) {
        if list == LIST_DEVICE {
            (0, list)
        } else {
            (channel, list)
        }
    }

    /// Resolves the channel, the list definition and the backing address of
    /// the block for `peer_index`.
    fn locate(
        &self,
        channel: u8,
        list: u8,
        peer_index: u8,
    ) -> Result<(usize, &'static ListDef, usize), StoreError> {
        let def = self.list_def(channel, list)?;
        let (channel, _) = Self::route(channel, list);
        let lists = &self.channels[usize::from(channel)];
        if !def.is_peer_list() {
            return Ok((usize::from(channel), def, lists.channel_address));
        }
        if peer_index >= lists.layout.peer_max {
            return Err(StoreError::PeerIndex(peer_index));
        }
        let address = lists.peer_list_address + def.len() * usize::from(peer_index);
        Ok((usize::from(channel), def, address))
    }

    /// Copies the block of `list` for `peer_index` from the backing store
    /// into the working buffer. `peer_index` is ignored for list 0 and 1.
    pub fn load(&mut self, channel: u8, list: u8, peer_index: u8) -> Result<(), StoreError> {
        let (slot, def, address) = self.locate(channel, list, peer_index)?;
        let mut values: Vec<u8, MAX_LIST_LEN> = Vec::new();
        let _ = values.resize(def.len().min(MAX_LIST_LEN), 0);
        self.backing.read(to_address(address)?, &mut values)?;
        let lists = &mut self.channels[slot];
        if def.is_peer_list() {
            lists.peer_values = values;
            lists.loaded_peer = Some(peer_index);
        } else {
            lists.channel_values = values;
        }
        Ok(())
    }

    /// Writes the working buffer of `list` back to the block of
    /// `peer_index`. Unchanged bytes are left to the backing store to skip.
    pub fn save(&mut self, channel: u8, list: u8, peer_index: u8) -> Result<(), StoreError> {
        let (slot, def, address) = self.locate(channel, list, peer_index)?;
        let lists = &self.channels[slot];
        let values = if def.is_peer_list() {
            &lists.peer_values
        } else {
            &lists.channel_values
        };
        self.backing.write(to_address(address)?, values)?;
        Ok(())
    }

    /// Replaces the working buffer of `list` with its compiled defaults.
    /// The backing store is not touched.
    pub fn load_default(&mut self, channel: u8, list: u8) -> Result<(), StoreError> {
        let (slot, def, _) = self.locate(channel, list, 0)?;
        let mut values = Vec::new();
        let _ = values.extend_from_slice(&def.defaults[..def.len().min(MAX_LIST_LEN)]);
        let lists = &mut self.channels[slot];
        if def.is_peer_list() {
            lists.peer_values = values;
            lists.loaded_peer = None;
        } else {
            lists.channel_values = values;
        }
        Ok(())
    }

    /// Working buffer of `list`.
    pub fn values(&self, channel: u8, list: u8) -> Result<&[u8], StoreError> {
        let (slot, def, _) = self.locate(channel, list, 0)?;
        let lists = &self.channels[slot];
        Ok(if def.is_peer_list() {
            lists.peer_values.as_slice()
        } else {
            lists.channel_values.as_slice()
        })
    }

    /// Mutable working buffer of `list`.
    pub fn values_mut(&mut self, channel: u8, list: u8) -> Result<&mut [u8], StoreError> {
        let (slot, def, _) = self.locate(channel, list, 0)?;
        let lists = &mut self.channels[slot];
        Ok(if def.is_peer_list() {
            lists.peer_values.as_mut_slice()
        } else {
            lists.channel_values.as_mut_slice()
        })
    }

    /// Peer block currently held by the peer list working buffer.
    pub fn loaded_peer(&self, channel: u8) -> Option<u8> {
        self.channels
            .get(usize::from(channel))
            .and_then(|c| c.loaded_peer)
    }

    /// Offset of `register` in the working buffer of `list`.
    pub fn pointer_to_register(
        &self,
        channel: u8,
        list: u8,
        register: u8,
    ) -> Result<usize, StoreError> {
        self.list_def(channel, list)?
            .register_offset(register)
            .ok_or(StoreError::UnknownRegister(register))
    }

    /// Current value of `register` in the working buffer of `list`.
    pub fn read_register(&self, channel: u8, list: u8, register: u8) -> Result<u8, StoreError> {
        let offset = self.pointer_to_register(channel, list, register)?;
        self.values(channel, list)?
            .get(offset)
            .copied()
            .ok_or(StoreError::UnknownRegister(register))
    }

    fn ensure_loaded(&mut self, channel: u8, list: u8, peer_index: u8) -> Result<(), StoreError> {
        let (slot, def, _) = self.locate(channel, list, peer_index)?;
        if def.is_peer_list() && self.channels[slot].loaded_peer != Some(peer_index) {
            self.load(channel, list, peer_index)?;
        }
        Ok(())
    }

    /// Overwrites `bytes.len()` values starting at `offset` and persists the
    /// block.
    ///
    /// A write that would run past the end of the list is refused and
    /// leaves the working buffer untouched.
    pub fn write_subset(
        &mut self,
        channel: u8,
        list: u8,
        peer_index: u8,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        self.ensure_loaded(channel, list, peer_index)?;
        let values = self.values_mut(channel, list)?;
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= values.len())
            .ok_or(StoreError::OutOfBounds {
                offset,
                len: bytes.len(),
            })?;
        values[offset..end].copy_from_slice(bytes);
        self.save(channel, list, peer_index)
    }

    /// Applies register/value pairs and persists the block.
    ///
    /// Registers the list does not define are skipped, a trailing odd byte
    /// is ignored.
    ///
    /// # Returns
    /// - number of registers written
    pub fn write_pairs(
        &mut self,
        channel: u8,
        list: u8,
        peer_index: u8,
        pairs: &[u8],
    ) -> Result<usize, StoreError> {
        self.ensure_loaded(channel, list, peer_index)?;
        let def = self.list_def(channel, list)?;
        let values = self.values_mut(channel, list)?;
        let mut written = 0;
        for pair in pairs.chunks_exact(2) {
            match def.register_offset(pair[0]) {
                Some(offset) if offset < values.len() => {
                    values[offset] = pair[1];
                    written += 1;
                }
                _ => debug!("skipping unknown register {:x}", pair[0]),
            }
        }
        self.save(channel, list, peer_index)?;
        Ok(written)
    }

    /// Resets the peer list block of `slot` to the compiled defaults in the
    /// working buffer and marks it loaded, without persisting.
    pub fn prepare_peer_defaults(&mut self, channel: u8, slot: u8) -> Result<(), StoreError> {
        let list = self
            .channels
            .get(usize::from(channel))
            .and_then(|c| c.layout.peer_list)
            .ok_or(StoreError::UnknownList {
                channel,
                list: LIST_PEER_ACTUATOR,
            })?
            .index;
        let _ = self.locate(channel, list, slot)?;
        self.load_default(channel, list)?;
        self.channels[usize::from(channel)].loaded_peer = Some(slot);
        Ok(())
    }

    /// Reads the peer table of `channel` from the backing store.
    pub fn load_peer_table(&mut self, channel: u8) -> Result<PeerTable, StoreError> {
        let peer_max = self.peer_max(channel);
        let base = self
            .channels
            .get(usize::from(channel))
            .map(|c| c.peer_table_address)
            .ok_or(StoreError::UnknownList {
                channel,
                list: LIST_PEER_ACTUATOR,
            })?;
        let mut table = PeerTable::new(peer_max);
        for slot in 0..peer_max {
            let mut raw = [0u8; PEER_ENTRY_LEN];
            let address = base + usize::from(slot) * PEER_ENTRY_LEN;
            self.backing.read(to_address(address)?, &mut raw)?;
            if let Some(entry) = PeerEntry::from_bytes(&raw) {
                let _ = table.set(slot, entry);
            }
        }
        Ok(table)
    }

    /// Persists one peer table slot; `None` stores a free slot.
    pub fn write_peer(
        &mut self,
        channel: u8,
        slot: u8,
        entry: Option<PeerEntry>,
    ) -> Result<(), StoreError> {
        let lists = self
            .channels
            .get(usize::from(channel))
            .ok_or(StoreError::PeerIndex(slot))?;
        if slot >= lists.layout.peer_max {
            return Err(StoreError::PeerIndex(slot));
        }
        let address = lists.peer_table_address + usize::from(slot) * PEER_ENTRY_LEN;
        let raw = entry.map_or([0u8; PEER_ENTRY_LEN], |e| e.to_bytes());
        self.backing.write(to_address(address)?, &raw)?;
        Ok(())
    }

    /// Rewrites every list block from defaults, frees every peer slot and
    /// stores the schema checksum.
    pub fn reset_to_defaults(&mut self) -> Result<(), StoreError> {
        for slot in 0..self.channels.len() {
            let lists = &self.channels[slot];
            let layout = lists.layout;
            let channel_address = lists.channel_address;
            let peer_list_address = lists.peer_list_address;
            let peer_table_address = lists.peer_table_address;

            self.backing
                .write(to_address(channel_address)?, layout.channel_list.defaults)?;
            for peer in 0..usize::from(layout.peer_max) {
                if let Some(def) = layout.peer_list {
                    let address = peer_list_address + def.len() * peer;
                    self.backing.write(to_address(address)?, def.defaults)?;
                }
                let address = peer_table_address + peer * PEER_ENTRY_LEN;
                self.backing
                    .write(to_address(address)?, &[0u8; PEER_ENTRY_LEN])?;
            }

            let lists = &mut self.channels[slot];
            lists.channel_values.clear();
            let len = layout.channel_list.len().min(MAX_LIST_LEN);
            let _ = lists
                .channel_values
                .extend_from_slice(&layout.channel_list.defaults[..len]);
            lists.peer_values.clear();
            lists.loaded_peer = None;
        }
        let checksum = self.schema_checksum();
        self.backing.write(MAGIC_ADDRESS, &checksum.to_le_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{LIST_CHANNEL, LIST_PEER_SENSOR};
    use crate::hal::MemoryBacking;
    use crate::message::Address;

    static LIST0: ListDef = ListDef::new(0, &[0x02, 0x0a, 0x0b, 0x0c], &[0x80, 0x00, 0x00, 0x00]);
    static LIST1: ListDef = ListDef::new(1, &[0x04, 0x08, 0x09], &[0x40, 0x00, 0x00]);
    static LIST4: ListDef = ListDef::new(4, &[0x01, 0x02], &[0x00, 0x11]);

    fn layouts() -> [ChannelLayout; 2] {
        [
            ChannelLayout {
                channel_list: &LIST0,
                peer_list: None,
                peer_max: 0,
            },
            ChannelLayout {
                channel_list: &LIST1,
                peer_list: Some(&LIST4),
                peer_max: 3,
            },
        ]
    }

    fn open_store() -> RegisterStore<MemoryBacking<64>> {
        let mut store = RegisterStore::new(MemoryBacking::new(), &layouts());
        assert!(store.open().unwrap());
        store
    }

    #[test]
    fn test_layout_addresses() {
        let store = RegisterStore::new(MemoryBacking::<64>::new(), &layouts());
        // 2 magic + 4 list0 + 3 list1 + 3 * 2 list4 + 3 * 4 peers
        assert_eq!(store.end_address(), 27);
        assert_eq!(store.channel_count(), 2);
        assert_eq!(store.peer_max(1), 3);
    }

    #[test]
    fn test_schema_mismatch_loads_defaults() {
        let store = open_store();
        assert_eq!(store.values(0, LIST_DEVICE).unwrap(), LIST0.defaults);
        assert_eq!(store.values(1, LIST_CHANNEL).unwrap(), LIST1.defaults);
        let magic = store.schema_checksum().to_le_bytes();
        assert_eq!(&store.backing().as_bytes()[..2], &magic);
    }

    #[test]
    fn test_matching_schema_keeps_stored_values() {
        let mut store = open_store();
        store
            .write_subset(1, LIST_CHANNEL, 0, 1, &[0x55, 0x66])
            .unwrap();
        let backing = store.backing().clone();

        let mut reopened = RegisterStore::new(backing, &layouts());
        assert!(!reopened.open().unwrap());
        assert_eq!(
            reopened.values(1, LIST_CHANNEL).unwrap(),
            &[0x40, 0x55, 0x66]
        );
    }

    #[test]
    fn test_corrupted_checksum_restores_defaults() {
        let mut store = open_store();
        store.write_subset(1, LIST_CHANNEL, 0, 0, &[0x01]).unwrap();
        let mut backing = store.backing().clone();
        backing.write(MAGIC_ADDRESS, &[0x00, 0x00]).unwrap();

        let mut reopened = RegisterStore::new(backing, &layouts());
        assert!(reopened.open().unwrap());
        assert_eq!(reopened.values(1, LIST_CHANNEL).unwrap(), LIST1.defaults);
    }

    #[test]
    fn test_write_subset_out_of_bounds_leaves_buffer() {
        let mut store = open_store();
        let before: Vec<u8, MAX_LIST_LEN> =
            Vec::from_slice(store.values(1, LIST_CHANNEL).unwrap()).unwrap();
        let writes = store.backing().writes();
        assert_eq!(
            store.write_subset(1, LIST_CHANNEL, 0, 2, &[0x01, 0x02]),
            Err(StoreError::OutOfBounds { offset: 2, len: 2 })
        );
        assert_eq!(store.values(1, LIST_CHANNEL).unwrap(), &before[..]);
        assert_eq!(store.backing().writes(), writes);
    }

    #[test]
    fn test_peer_blocks_are_private() {
        let mut store = open_store();
        store
            .write_subset(1, LIST_PEER_SENSOR, 2, 0, &[0x01])
            .unwrap();
        store.load(1, LIST_PEER_SENSOR, 0).unwrap();
        assert_eq!(store.values(1, LIST_PEER_SENSOR).unwrap(), &[0x00, 0x11]);
        store.load(1, LIST_PEER_SENSOR, 2).unwrap();
        assert_eq!(store.values(1, LIST_PEER_SENSOR).unwrap(), &[0x01, 0x11]);
        assert_eq!(store.loaded_peer(1), Some(2));
        assert_eq!(
            store.load(1, LIST_PEER_SENSOR, 3),
            Err(StoreError::PeerIndex(3))
        );
    }

    #[test]
    fn test_write_pairs_skips_unknown_registers() {
        let mut store = open_store();
        let written = store
            .write_pairs(0, LIST_DEVICE, 0, &[0x0a, 0x63, 0x0b, 0x19, 0x77, 0x01, 0x0c, 0x63])
            .unwrap();
        assert_eq!(written, 3);
        assert_eq!(store.values(0, LIST_DEVICE).unwrap(), &[0x80, 0x63, 0x19, 0x63]);
    }

    #[test]
    fn test_list_zero_routes_to_channel_zero() {
        let store = open_store();
        assert_eq!(store.read_register(1, LIST_DEVICE, 0x02), Ok(0x80));
        assert_eq!(store.pointer_to_register(0, LIST_DEVICE, 0x0b), Ok(2));
        assert_eq!(
            store.pointer_to_register(0, LIST_DEVICE, 0x33),
            Err(StoreError::UnknownRegister(0x33))
        );
        assert_eq!(
            store.list_def(0, LIST_CHANNEL).unwrap_err(),
            StoreError::UnknownList {
                channel: 0,
                list: LIST_CHANNEL
            }
        );
    }

    #[test]
    fn test_peer_table_persistence() {
        let mut store = open_store();
        let peer = PeerEntry::new(Address::new([0x11, 0x22, 0x33]), 1);
        store.write_peer(1, 1, Some(peer)).unwrap();
        let table = store.load_peer_table(1).unwrap();
        assert_eq!(table.get(1), Some(peer));
        assert_eq!(table.used_slot_count(), 1);
        store.write_peer(1, 1, None).unwrap();
        assert_eq!(store.load_peer_table(1).unwrap().used_slot_count(), 0);
        assert_eq!(store.write_peer(1, 3, None), Err(StoreError::PeerIndex(3)));
    }

    #[test]
    fn test_reset_to_defaults() {
        let mut store = open_store();
        store.write_subset(1, LIST_CHANNEL, 0, 0, &[0x01]).unwrap();
        store
            .write_peer(1, 0, Some(PeerEntry::new(Address::new([1, 2, 3]), 1)))
            .unwrap();
        store.reset_to_defaults().unwrap();
        assert_eq!(store.values(1, LIST_CHANNEL).unwrap(), LIST1.defaults);
        assert_eq!(store.load_peer_table(1).unwrap().used_slot_count(), 0);
        store.load(1, LIST_CHANNEL, 0).unwrap();
        assert_eq!(store.values(1, LIST_CHANNEL).unwrap(), LIST1.defaults);
    }
}
