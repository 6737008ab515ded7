//! Channel kinds and their register lists.
//!
//! A channel is a logical sub-device with its own lists and peer table.
//! Channel 0 is always the maintenance channel holding list 0; application
//! channels are one of a closed set of kinds, dispatched by `match`:
//!
//! | kind | lists | reacts to |
//! |------|-------|-----------|
//! | [`ChannelKind::Maintenance`] | 0 | nothing, owns the device registers |
//! | [`ChannelKind::Remote`] | 1, 4 | local button presses, sent to its peers |
//! | [`ChannelKind::Switch`] | 1, 3 | `INSTRUCTION_SET`, `REMOTE` and `SENSOR_EVENT` from peers |

use crate::consts::{
    INSTRUCTION_INHIBIT_OFF, INSTRUCTION_INHIBIT_ON, INSTRUCTION_SET, INSTRUCTION_STOP_CHANGE,
    MAX_PEERS, MSG_REMOTE, MSG_SENSOR_EVENT,
};
use crate::store::{ChannelLayout, ListDef};

/// List 0: device registers (internal keys visible, LED mode, master id,
/// low battery limit, local reset disable).
pub static MAINTENANCE_LIST0: ListDef = ListDef::new(
    0,
    &[0x02, 0x08, 0x0a, 0x0b, 0x0c, 0x12, 0x18],
    &[0x80, 0x01, 0x00, 0x00, 0x00, 0x69, 0x00],
);

/// Remote list 1: long press time, AES, double press time.
pub static REMOTE_LIST1: ListDef = ListDef::new(1, &[0x04, 0x08, 0x09], &[0x40, 0x00, 0x00]);

/// Remote list 4: peer needs burst.
pub static REMOTE_LIST4: ListDef = ListDef::new(4, &[0x01], &[0x00]);

/// Switch list 1: AES.
pub static SWITCH_LIST1: ListDef = ListDef::new(1, &[0x08], &[0x00]);

/// Switch list 3: short (0x02..0x0c) and long (0x82..0x8c) press profiles.
pub static SWITCH_LIST3: ListDef = ListDef::new(
    3,
    &[
        0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, //
        0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x8b, 0x8c,
    ],
    &[
        0x00, 0x00, 0x32, 0x64, 0x00, 0xff, 0x00, 0xff, 0x01, 0x43, 0x16, //
        0x00, 0x00, 0x32, 0x64, 0x00, 0xff, 0x00, 0xff, 0x01, 0x43, 0x16,
    ],
);

/// Offset of the long press profile in [`SWITCH_LIST3`].
const LONG_PROFILE: usize = 11;
/// Offset of the action type register (0x0a) inside a profile.
const ACTION_TYPE: usize = 8;
/// Offset of `JT_ON`/`JT_ONDELAY` (0x0b) inside a profile.
const JT_ON: usize = 9;
/// Offset of `JT_OFF`/`JT_OFFDELAY` (0x0c) inside a profile.
const JT_OFF: usize = 10;

/// Jump table profile written for a newly added peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PeerProfile {
    /// Every press switches on.
    On,
    /// Every press switches off.
    Off,
    /// Every press toggles.
    Toggle,
}

impl PeerProfile {
    fn jump_table(self) -> (u8, u8) {
        match self {
            PeerProfile::On => (0x33, 0x11),
            PeerProfile::Off => (0x44, 0x66),
            PeerProfile::Toggle => (0x43, 0x16),
        }
    }
}

/// Status byte of a switch that is on.
pub const STATUS_ON: u8 = 0xc8;
/// Status byte of a switch that is off.
pub const STATUS_OFF: u8 = 0x00;

/// A peer message as seen by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct PeerEvent {
    /// Message type, byte 3.
    pub kind: u8,
    /// Long press bit of byte 10.
    pub long: bool,
    /// Press counter, byte 11.
    pub counter: u8,
}

impl PeerEvent {
    /// Reads a peer event from the payload of a `REMOTE` or `SENSOR_EVENT`
    /// frame.
    pub fn parse(kind: u8, payload: &[u8]) -> Option<Self> {
        let button = *payload.first()?;
        let counter = payload.get(1).copied().unwrap_or(0);
        Some(Self {
            kind,
            long: button & 0x40 != 0,
            counter,
        })
    }
}

/// Behaviour of an application channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ChannelKind {
    /// Channel 0, device registers only.
    Maintenance,
    /// Push button sending `REMOTE` events to its peers.
    Remote {
        /// Press counter carried in byte 11 of every event.
        presses: u8,
    },
    /// Relay driven by the central or by peers.
    Switch {
        /// Output state.
        on: bool,
    },
}

impl ChannelKind {
    /// Lists of this kind: the channel list and the optional peer list.
    pub fn lists(&self) -> (&'static ListDef, Option<&'static ListDef>) {
        match self {
            ChannelKind::Maintenance => (&MAINTENANCE_LIST0, None),
            ChannelKind::Remote { .. } => (&REMOTE_LIST1, Some(&REMOTE_LIST4)),
            ChannelKind::Switch { .. } => (&SWITCH_LIST1, Some(&SWITCH_LIST3)),
        }
    }

    /// Status byte reported in `INFO_ACTUATOR_STATUS` and `ACK_STATUS`.
    pub fn status(&self) -> u8 {
        match self {
            ChannelKind::Switch { on: true } => STATUS_ON,
            _ => STATUS_OFF,
        }
    }

    /// Applies an `INSTRUCTION` from the central.
    ///
    /// # Arguments
    /// - `subtype`: byte 10
    /// - `body`: payload after the subtype, starting with the channel byte
    ///
    /// # Returns
    /// - `Some(status)` if the channel handled the instruction
    pub fn handle_instruction(&mut self, subtype: u8, body: &[u8]) -> Option<u8> {
        let ChannelKind::Switch { on } = self else {
            return None;
        };
        match subtype {
            INSTRUCTION_SET => *on = *body.get(1)? != 0,
            INSTRUCTION_STOP_CHANGE | INSTRUCTION_INHIBIT_OFF | INSTRUCTION_INHIBIT_ON => {}
            _ => return None,
        }
        Some(self.status())
    }

    /// Applies an event from a known peer.
    ///
    /// # Arguments
    /// - `event`: the peer's message
    /// - `peer_list`: the channel's peer list block for that peer
    ///
    /// # Returns
    /// - `Some(status)` if the channel acted on the event
    pub fn handle_peer_action(&mut self, event: &PeerEvent, peer_list: &[u8]) -> Option<u8> {
        let ChannelKind::Switch { on } = self else {
            return None;
        };
        if !matches!(event.kind, MSG_REMOTE | MSG_SENSOR_EVENT) {
            return None;
        }
        let base = if event.long { LONG_PROFILE } else { 0 };
        let profile = peer_list.get(base..base + LONG_PROFILE)?;
        if profile[ACTION_TYPE] & 0x03 == 0 {
            return None;
        }
        let jump = if *on {
            profile[JT_ON] >> 4
        } else {
            profile[JT_OFF] >> 4
        };
        match jump {
            1..=3 => *on = true,
            4..=6 => *on = false,
            _ => {}
        }
        Some(self.status())
    }

    /// Adjusts the compiled peer list defaults for a peer added in `slot`.
    ///
    /// With two peer channels added at once the odd slot gets the off
    /// profile and the even slot the on profile; a single peer channel gets
    /// the toggle profile.
    pub fn request_peer_defaults(&self, slot: u8, dual: bool, peer_list: &mut [u8]) {
        if !matches!(self, ChannelKind::Switch { .. }) {
            return;
        }
        let profile = match (dual, slot % 2) {
            (true, 1) => PeerProfile::Off,
            (true, _) => PeerProfile::On,
            (false, _) => PeerProfile::Toggle,
        };
        let (jt_on, jt_off) = profile.jump_table();
        for base in [0, LONG_PROFILE] {
            if let Some(block) = peer_list.get_mut(base..base + LONG_PROFILE) {
                block[JT_ON] = jt_on;
                block[JT_OFF] = jt_off;
            }
        }
    }

    /// Counter for the next button press of a remote channel.
    pub fn next_press(&mut self) -> Option<u8> {
        match self {
            ChannelKind::Remote { presses } => {
                let counter = *presses;
                *presses = presses.wrapping_add(1);
                Some(counter)
            }
            _ => None,
        }
    }
}

/// One channel of a device: its kind plus its peer capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Channel {
    /// Behaviour.
    pub kind: ChannelKind,
    /// Peer slots.
    pub peer_max: u8,
}

impl Channel {
    /// The maintenance channel.
    pub const fn maintenance() -> Self {
        Self {
            kind: ChannelKind::Maintenance,
            peer_max: 0,
        }
    }

    /// A remote button with `peer_max` peer slots.
    pub const fn remote(peer_max: u8) -> Self {
        Self {
            kind: ChannelKind::Remote { presses: 0 },
            peer_max,
        }
    }

    /// A switch actuator with `peer_max` peer slots, initially off.
    pub const fn switch(peer_max: u8) -> Self {
        Self {
            kind: ChannelKind::Switch { on: false },
            peer_max,
        }
    }

    /// Storage layout of this channel.
    ///
    /// Peer slots are capped at [`MAX_PEERS`], the capacity of a peer table.
    pub fn layout(&self) -> ChannelLayout {
        let (channel_list, peer_list) = self.kind.lists();
        let peer_max = match peer_list {
            Some(_) => self.peer_max.min(MAX_PEERS as u8),
            None => 0,
        };
        ChannelLayout {
            channel_list,
            peer_list,
            peer_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::INSTRUCTION_LED;

    fn switch_defaults() -> [u8; 22] {
        let mut list = [0u8; 22];
        list.copy_from_slice(SWITCH_LIST3.defaults);
        list
    }

    #[test]
    fn test_list_tables_are_consistent() {
        for def in [
            &MAINTENANCE_LIST0,
            &REMOTE_LIST1,
            &REMOTE_LIST4,
            &SWITCH_LIST1,
            &SWITCH_LIST3,
        ] {
            assert_eq!(def.registers.len(), def.defaults.len());
        }
        assert!(SWITCH_LIST3.is_peer_list());
        assert!(!REMOTE_LIST1.is_peer_list());
        assert_eq!(SWITCH_LIST3.register_offset(0x8a), Some(LONG_PROFILE + ACTION_TYPE));
    }

    #[test]
    fn test_instruction_set_switches() {
        let mut kind = Channel::switch(4).kind;
        assert_eq!(kind.handle_instruction(INSTRUCTION_SET, &[0x01, 0xc8]), Some(STATUS_ON));
        assert_eq!(kind.status(), STATUS_ON);
        assert_eq!(kind.handle_instruction(INSTRUCTION_SET, &[0x01, 0x00]), Some(STATUS_OFF));
        assert_eq!(kind.handle_instruction(INSTRUCTION_SET, &[0x01]), None);
        assert_eq!(kind.handle_instruction(INSTRUCTION_LED, &[0x01, 0x01]), None);

        let mut remote = Channel::remote(4).kind;
        assert_eq!(remote.handle_instruction(INSTRUCTION_SET, &[0x01, 0xc8]), None);
    }

    #[test]
    fn test_toggle_profile() {
        let mut kind = ChannelKind::Switch { on: false };
        let list = switch_defaults();
        let short = PeerEvent::parse(MSG_REMOTE, &[0x01, 0x05]).unwrap();
        assert!(!short.long);
        assert_eq!(kind.handle_peer_action(&short, &list), Some(STATUS_ON));
        assert_eq!(kind.handle_peer_action(&short, &list), Some(STATUS_OFF));
    }

    #[test]
    fn test_dual_peer_profiles() {
        let kind = ChannelKind::Switch { on: false };
        let mut off = switch_defaults();
        let mut on = switch_defaults();
        kind.request_peer_defaults(1, true, &mut off);
        kind.request_peer_defaults(2, true, &mut on);

        let long = PeerEvent::parse(MSG_REMOTE, &[0x41, 0x06]).unwrap();
        assert!(long.long);
        let mut state = ChannelKind::Switch { on: false };
        assert_eq!(state.handle_peer_action(&long, &on), Some(STATUS_ON));
        assert_eq!(state.handle_peer_action(&long, &on), Some(STATUS_ON));
        assert_eq!(state.handle_peer_action(&long, &off), Some(STATUS_OFF));
        assert_eq!(state.handle_peer_action(&long, &off), Some(STATUS_OFF));
    }

    #[test]
    fn test_inactive_action_is_ignored() {
        let mut list = switch_defaults();
        list[ACTION_TYPE] = 0;
        let mut kind = ChannelKind::Switch { on: false };
        let short = PeerEvent::parse(MSG_REMOTE, &[0x01, 0x01]).unwrap();
        assert_eq!(kind.handle_peer_action(&short, &list), None);
        assert_eq!(kind.handle_peer_action(&short, &list[..4]), None);
    }

    #[test]
    fn test_remote_press_counter() {
        let mut kind = Channel::remote(2).kind;
        assert_eq!(kind.next_press(), Some(0));
        assert_eq!(kind.next_press(), Some(1));
        assert_eq!(ChannelKind::Maintenance.next_press(), None);
        let mut list = [0u8; 1];
        kind.request_peer_defaults(0, false, &mut list);
        assert_eq!(list, [0]);
    }

    #[test]
    fn test_layout() {
        let layout = Channel::switch(6).layout();
        assert_eq!(layout.channel_list.index, 1);
        assert_eq!(layout.peer_list.map(|d| d.index), Some(3));
        assert_eq!(layout.peer_max, 6);
        assert_eq!(Channel::maintenance().layout().peer_max, 0);
    }

    #[test]
    fn test_layout_caps_peer_slots() {
        assert_eq!(Channel::switch(40).layout().peer_max, MAX_PEERS as u8);
        assert_eq!(Channel::remote(32).layout().peer_max, 32);
    }
}
