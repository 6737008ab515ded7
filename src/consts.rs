//! Constants used across the BidCoS protocol implementation.
//!
//! This module defines the frame geometry, flag bit positions, message type
//! codes, list indices and slice capacities shared by the codec, the send
//! scheduler and the configuration engine.
//!
//! These values are fixed by the protocol. A paired central decodes every
//! frame against exactly this layout, so nothing here is a tuning knob.
//!
//! ## Frame layout
//!
//! | byte | field |
//! |------|-------|
//! | 0 | length of the remaining frame |
//! | 1 | message counter |
//! | 2 | flags |
//! | 3 | message type |
//! | 4..7 | sender address |
//! | 7..10 | receiver address |
//! | 10.. | payload (bytes 10 and 11 double as type extension bytes) |

/// Number of bytes following the length byte that every frame carries
/// before its payload (counter, flags, type, sender, receiver).
pub const HEADER_LEN: u8 = 9;

/// Offset of the first payload byte inside the raw frame buffer.
pub const PAYLOAD_OFFSET: usize = 10;

/// Size of the raw frame buffer, length byte included.
pub const MAX_FRAME_LEN: usize = 32;

/// Largest payload that still fits into [`MAX_FRAME_LEN`].
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - PAYLOAD_OFFSET;

/// Upper bound of peer slots per channel.
///
/// Fan-out progress is tracked in a `u32` bitmap, hence 32.
pub const MAX_PEERS: usize = 32;

/// Upper bound of registers in a single list.
pub const MAX_LIST_LEN: usize = 48;

/// Upper bound of channels per device, channel 0 included.
pub const MAX_CHANNELS: usize = 8;

/// Lists per channel (list 0 to list 4).
pub const LIST_MAX: u8 = 5;

/// Bytes of one peer table entry: 3 address bytes plus the peer channel.
pub const PEER_ENTRY_LEN: usize = 4;

/// Peer entries carried by one `INFO_PEER_LIST` slice.
pub const PEERS_PER_SLICE: usize = 4;

/// Register/value pairs carried by one `INFO_PARAM_RESPONSE_PAIRS` slice.
pub const PAIRS_PER_SLICE: usize = 8;

/// Register values carried by one `INFO_PARAM_RESPONSE_SEQ` slice.
pub const SEQ_VALUES_PER_SLICE: usize = 15;

/// Backing store address of the schema checksum.
pub const MAGIC_ADDRESS: u16 = 0;

/// Backing store address where the first list starts.
pub const LISTS_START_ADDRESS: u16 = 2;

/// Wake-up flag, the sender is awake for a short while.
pub const FLAG_WKUP: u8 = 0x01;
/// Wake-me-up flag, asks the receiver to keep talking without polling.
pub const FLAG_WKMEUP: u8 = 0x02;
/// Configuration/pairing flag.
pub const FLAG_CONFIG: u8 = 0x04;
/// A wake-up burst precedes the frame.
pub const FLAG_BURST: u8 = 0x10;
/// The sender expects an acknowledgment.
pub const FLAG_BIDI: u8 = 0x20;
/// The frame was relayed by a repeater.
pub const FLAG_RPTED: u8 = 0x40;
/// The frame may be repeated.
pub const FLAG_RPTEN: u8 = 0x80;

/// Device identification, answer to a pair serial request or pairing start.
pub const MSG_DEVICE_INFO: u8 = 0x00;
/// Configuration request, subtype in byte 11, channel in byte 10.
pub const MSG_CONFIG: u8 = 0x01;
/// Acknowledgment family, subtype in byte 10.
pub const MSG_ACK: u8 = 0x02;
/// AES reply.
pub const MSG_AES_REPLY: u8 = 0x03;
/// AES key exchange.
pub const MSG_AES_KEY: u8 = 0x04;
/// Information family, subtype in byte 10.
pub const MSG_INFO: u8 = 0x10;
/// Instruction family, subtype in byte 10, channel in byte 11.
pub const MSG_INSTRUCTION: u8 = 0x11;
/// The central has data waiting.
pub const MSG_HAVE_DATA: u8 = 0x12;
/// Switch event between peers.
pub const MSG_SWITCH: u8 = 0x3e;
/// Time stamp.
pub const MSG_TIMESTAMP: u8 = 0x3f;
/// Remote (button) event.
pub const MSG_REMOTE: u8 = 0x40;
/// Sensor event.
pub const MSG_SENSOR_EVENT: u8 = 0x41;
/// Switch level event.
pub const MSG_SWITCH_LEVEL: u8 = 0x42;
/// Sensor data.
pub const MSG_SENSOR_DATA: u8 = 0x53;
/// Gas event.
pub const MSG_GAS_EVENT: u8 = 0x54;
/// Climate event.
pub const MSG_CLIMATE_EVENT: u8 = 0x58;
/// Set team temperature.
pub const MSG_SET_TEAM_TEMP: u8 = 0x59;
/// Thermal control.
pub const MSG_THERMAL_CONTROL: u8 = 0x5a;
/// Power event cycle.
pub const MSG_POWER_EVENT_CYCLE: u8 = 0x5e;
/// Power event.
pub const MSG_POWER_EVENT: u8 = 0x5f;
/// Weather event.
pub const MSG_WEATHER_EVENT: u8 = 0x70;

/// `CONFIG` subtype: add up to two peers.
pub const CONFIG_PEER_ADD: u8 = 0x01;
/// `CONFIG` subtype: remove up to two peers.
pub const CONFIG_PEER_REMOVE: u8 = 0x02;
/// `CONFIG` subtype: enumerate the peer table.
pub const CONFIG_PEER_LIST_REQ: u8 = 0x03;
/// `CONFIG` subtype: enumerate a register list.
pub const CONFIG_PARAM_REQ: u8 = 0x04;
/// `CONFIG` subtype: open a write session.
pub const CONFIG_START: u8 = 0x05;
/// `CONFIG` subtype: close the write session.
pub const CONFIG_END: u8 = 0x06;
/// `CONFIG` subtype: sequential write starting at a register.
pub const CONFIG_WRITE_INDEX1: u8 = 0x07;
/// `CONFIG` subtype: register/value pair write.
pub const CONFIG_WRITE_INDEX2: u8 = 0x08;
/// `CONFIG` subtype: ask for the serial number.
pub const CONFIG_SERIAL_REQ: u8 = 0x09;
/// `CONFIG` subtype: pair by serial number.
pub const CONFIG_PAIR_SERIAL: u8 = 0x0a;
/// `CONFIG` subtype: ask for the channel status.
pub const CONFIG_STATUS_REQUEST: u8 = 0x0e;

/// `ACK` subtype: plain acknowledgment.
pub const ACK_PLAIN: u8 = 0x00;
/// `ACK` subtype: acknowledgment carrying a channel status.
pub const ACK_STATUS: u8 = 0x01;
/// `ACK` subtype: second acknowledgment form.
pub const ACK_2: u8 = 0x02;
/// `ACK` subtype: AES challenge.
pub const ACK_AES_REQ: u8 = 0x04;
/// `ACK` subtype: negative acknowledgment.
pub const ACK_NACK: u8 = 0x80;
/// `ACK` subtype: negative acknowledgment, target invalid.
pub const ACK_NACK_TARGET_INVALID: u8 = 0x84;

/// `INFO` subtype: serial number.
pub const INFO_SERIAL: u8 = 0x00;
/// `INFO` subtype: one slice of the peer table.
pub const INFO_PEER_LIST: u8 = 0x01;
/// `INFO` subtype: one slice of register/value pairs.
pub const INFO_PARAM_RESPONSE_PAIRS: u8 = 0x02;
/// `INFO` subtype: one slice of sequential register values.
pub const INFO_PARAM_RESPONSE_SEQ: u8 = 0x03;
/// `INFO` subtype: a parameter changed.
pub const INFO_PARAMETER_CHANGE: u8 = 0x04;
/// `INFO` subtype: actuator status.
pub const INFO_ACTUATOR_STATUS: u8 = 0x06;

/// Status flags byte: the battery is low.
pub const STATUS_LOWBAT: u8 = 0x80;

/// `INSTRUCTION` subtype: inhibit off.
pub const INSTRUCTION_INHIBIT_OFF: u8 = 0x00;
/// `INSTRUCTION` subtype: inhibit on.
pub const INSTRUCTION_INHIBIT_ON: u8 = 0x01;
/// `INSTRUCTION` subtype: set a level.
pub const INSTRUCTION_SET: u8 = 0x02;
/// `INSTRUCTION` subtype: stop a running change.
pub const INSTRUCTION_STOP_CHANGE: u8 = 0x03;
/// `INSTRUCTION` subtype: factory reset.
pub const INSTRUCTION_RESET: u8 = 0x04;
/// `INSTRUCTION` subtype: LED.
pub const INSTRUCTION_LED: u8 = 0x80;
/// `INSTRUCTION` subtype: LED all / level.
pub const INSTRUCTION_LEVEL: u8 = 0x81;
/// `INSTRUCTION` subtype: sleep mode.
pub const INSTRUCTION_SLEEPMODE: u8 = 0x82;

/// List 0, device identity and maintenance registers.
pub const LIST_DEVICE: u8 = 0;
/// List 1, channel configuration.
pub const LIST_CHANNEL: u8 = 1;
/// List 3, peer configuration (actuators).
pub const LIST_PEER_ACTUATOR: u8 = 3;
/// List 4, peer configuration (sensors and remotes).
pub const LIST_PEER_SENSOR: u8 = 4;

/// List 0 registers holding the paired master address.
pub const REG_MASTER_ID: [u8; 3] = [0x0a, 0x0b, 0x0c];
/// List 0 register whose bit 0 disables the local factory reset.
pub const REG_LOCAL_RESET_DISABLE: u8 = 0x18;
/// List 4 register whose bit 0 requests a wake-up burst for the peer.
pub const REG_PEER_NEEDS_BURST: u8 = 0x01;

/// The broadcast address. Also the master address of an unpaired node.
pub const BROADCAST_ADDRESS: [u8; 3] = [0x00, 0x00, 0x00];
