//! Typed view over a raw BidCoS frame buffer.
//!
//! A [`Frame`] owns a fixed-size byte buffer and exposes every header field
//! through explicit accessors with documented offsets. Nothing is ever
//! reinterpreted in place. Construction never fails: the same type is used to
//! build outgoing frames field by field before their length is final, and to
//! look at whatever the radio delivered.
//!
//! ## Example
//!
//! ```rust
//! use asksin::message::{Address, Flags, Frame, MessageType};
//! use asksin::consts::{MSG_ACK, ACK_PLAIN};
//!
//! let mut frame = Frame::new();
//! frame.set_counter(0x24);
//! frame.set_flags(Flags::RPTEN);
//! frame.set_sender(Address::new([0x1f, 0xb7, 0x4a]));
//! frame.set_receiver(Address::new([0x63, 0x19, 0x63]));
//! frame.set_message_type(MessageType::with_subtype(MSG_ACK, ACK_PLAIN));
//! assert_eq!(frame.as_bytes(), &[0x0a, 0x24, 0x80, 0x02, 0x1f, 0xb7, 0x4a, 0x63, 0x19, 0x63, 0x00]);
//! ```

use core::fmt;

use heapless::Vec;

use crate::consts::{
    BROADCAST_ADDRESS, FLAG_BIDI, FLAG_BURST, FLAG_CONFIG, FLAG_RPTED, FLAG_RPTEN, FLAG_WKMEUP,
    FLAG_WKUP, HEADER_LEN, MAX_FRAME_LEN, MAX_PAYLOAD_LEN, PAYLOAD_OFFSET,
};
use crate::error::FrameError;

/// Three byte device address (HMID).
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Address(pub [u8; 3]);

impl Address {
    /// The all-zero broadcast address.
    pub const BROADCAST: Address = Address(BROADCAST_ADDRESS);

    /// Wraps three raw address bytes.
    pub const fn new(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    /// Reads an address from the first three bytes of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; 3] = bytes.get(..3)?.try_into().ok()?;
        Some(Self(raw))
    }

    /// `true` for the all-zero address, which is also what an unpaired
    /// node reports as its master.
    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST_ADDRESS
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

/// The flag byte of a frame (byte 2).
///
/// | bit | mask | meaning |
/// |-----|------|---------|
/// | 0 | `0x01` | `WKUP` |
/// | 1 | `0x02` | `WKMEUP` |
/// | 2 | `0x04` | `CONFIG` |
/// | 4 | `0x10` | `BURST` |
/// | 5 | `0x20` | `BIDI` |
/// | 6 | `0x40` | `RPTED` |
/// | 7 | `0x80` | `RPTEN` |
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Flags(pub u8);

impl Flags {
    /// No flag set.
    pub const NONE: Flags = Flags(0);
    /// See [`FLAG_WKUP`].
    pub const WKUP: Flags = Flags(FLAG_WKUP);
    /// See [`FLAG_WKMEUP`].
    pub const WKMEUP: Flags = Flags(FLAG_WKMEUP);
    /// See [`FLAG_CONFIG`].
    pub const CONFIG: Flags = Flags(FLAG_CONFIG);
    /// See [`FLAG_BURST`].
    pub const BURST: Flags = Flags(FLAG_BURST);
    /// See [`FLAG_BIDI`].
    pub const BIDI: Flags = Flags(FLAG_BIDI);
    /// See [`FLAG_RPTED`].
    pub const RPTED: Flags = Flags(FLAG_RPTED);
    /// See [`FLAG_RPTEN`].
    pub const RPTEN: Flags = Flags(FLAG_RPTEN);

    /// `true` if every bit of `other` is set.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets or clears the bits of `other`.
    pub fn set(&mut self, other: Flags, on: bool) {
        if on {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    /// Union of both flag sets.
    pub const fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }
}

/// The three byte message type code: byte 3 plus the optional extension
/// bytes 10 and 11.
///
/// An extension byte that is `None` is not part of the code and stays
/// ordinary payload, e.g. the channel byte of a `CONFIG` request.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct MessageType {
    /// Primary type, byte 3.
    pub kind: u8,
    /// Byte 10 when it belongs to the type code.
    pub by10: Option<u8>,
    /// Byte 11 when it belongs to the type code.
    pub by11: Option<u8>,
}

impl MessageType {
    /// A type code that is only the primary byte.
    pub const fn new(kind: u8) -> Self {
        Self {
            kind,
            by10: None,
            by11: None,
        }
    }

    /// Primary byte plus a subtype in byte 10 (`ACK`, `INFO`, `INSTRUCTION`).
    pub const fn with_subtype(kind: u8, by10: u8) -> Self {
        Self {
            kind,
            by10: Some(by10),
            by11: None,
        }
    }

    /// Primary byte plus both extension bytes.
    pub const fn with_extension(kind: u8, by10: u8, by11: u8) -> Self {
        Self {
            kind,
            by10: Some(by10),
            by11: Some(by11),
        }
    }

    /// Number of payload bytes the type code occupies.
    pub fn extension_len(&self) -> usize {
        match (self.by10, self.by11) {
            (_, Some(_)) => 2,
            (Some(_), None) => 1,
            (None, None) => 0,
        }
    }
}

/// Raw frame buffer with typed accessors.
///
/// Byte 0 always holds the current length; it is kept in sync by every
/// setter that grows the frame.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    buf: Vec<u8, MAX_FRAME_LEN>,
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    /// An empty frame with a zeroed header and no payload.
    pub fn new() -> Self {
        let mut buf = Vec::new();
        let _ = buf.resize(PAYLOAD_OFFSET, 0);
        buf[0] = HEADER_LEN;
        Self { buf }
    }

    /// Copies raw bytes into a frame without checking them.
    ///
    /// Bytes beyond the frame buffer are dropped. Use [`Frame::parse`] when
    /// the length byte must be trusted.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let take = bytes.len().min(MAX_FRAME_LEN);
        let mut buf = Vec::new();
        let _ = buf.extend_from_slice(&bytes[..take]);
        if buf.len() < PAYLOAD_OFFSET {
            let _ = buf.resize(PAYLOAD_OFFSET, 0);
        }
        Self { buf }
    }

    /// Copies received bytes into a frame, validating the length byte.
    pub fn parse(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < PAYLOAD_OFFSET {
            return Err(FrameError::TooShort);
        }
        if bytes.len() > MAX_FRAME_LEN {
            return Err(FrameError::TooLong);
        }
        if bytes[0] as usize + 1 != bytes.len() {
            return Err(FrameError::LengthMismatch {
                declared: bytes[0],
                received: bytes.len(),
            });
        }
        Ok(Self::from_bytes(bytes))
    }

    /// Value of the length byte.
    pub fn len(&self) -> u8 {
        self.buf[0]
    }

    /// `true` if the frame carries no payload.
    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    /// The frame as it goes on the air, length byte included.
    pub fn as_bytes(&self) -> &[u8] {
        let end = (self.buf[0] as usize + 1).min(self.buf.len());
        &self.buf[..end]
    }

    /// Message counter, byte 1.
    pub fn counter(&self) -> u8 {
        self.buf[1]
    }

    /// Sets the message counter.
    pub fn set_counter(&mut self, counter: u8) {
        self.buf[1] = counter;
    }

    /// Flag byte, byte 2.
    pub fn flags(&self) -> Flags {
        Flags(self.buf[2])
    }

    /// Replaces the flag byte.
    pub fn set_flags(&mut self, flags: Flags) {
        self.buf[2] = flags.0;
    }

    /// Sets or clears single flags.
    pub fn set_flag(&mut self, flag: Flags, on: bool) {
        let mut flags = self.flags();
        flags.set(flag, on);
        self.set_flags(flags);
    }

    /// Primary message type, byte 3.
    pub fn kind(&self) -> u8 {
        self.buf[3]
    }

    /// Byte 10, the first payload byte, or 0 if absent.
    pub fn by10(&self) -> u8 {
        self.payload().first().copied().unwrap_or(0)
    }

    /// Byte 11, the second payload byte, or 0 if absent.
    pub fn by11(&self) -> u8 {
        self.payload().get(1).copied().unwrap_or(0)
    }

    /// Writes the type code; extension bytes are written into the payload
    /// area, growing the frame if needed.
    pub fn set_message_type(&mut self, message_type: MessageType) {
        self.buf[3] = message_type.kind;
        if let Some(by10) = message_type.by10 {
            self.set_payload_byte(0, by10);
        }
        if let Some(by11) = message_type.by11 {
            self.set_payload_byte(1, by11);
        }
    }

    /// `true` if this frame's type code matches `message_type`; extension
    /// bytes set to `None` match anything.
    pub fn is_type(&self, message_type: MessageType) -> bool {
        let payload = self.payload();
        self.kind() == message_type.kind
            && message_type.by10.is_none_or(|b| payload.first() == Some(&b))
            && message_type.by11.is_none_or(|b| payload.get(1) == Some(&b))
    }

    /// Sender address, bytes 4 to 6.
    pub fn sender(&self) -> Address {
        Address([self.buf[4], self.buf[5], self.buf[6]])
    }

    /// Sets the sender address.
    pub fn set_sender(&mut self, address: Address) {
        self.buf[4..7].copy_from_slice(&address.0);
    }

    /// Receiver address, bytes 7 to 9.
    pub fn receiver(&self) -> Address {
        Address([self.buf[7], self.buf[8], self.buf[9]])
    }

    /// Sets the receiver address.
    pub fn set_receiver(&mut self, address: Address) {
        self.buf[7..10].copy_from_slice(&address.0);
    }

    /// Everything after the header, bytes 10 up to the length byte.
    pub fn payload(&self) -> &[u8] {
        &self.as_bytes()[PAYLOAD_OFFSET.min(self.as_bytes().len())..]
    }

    /// Payload after the type code's extension bytes.
    pub fn body(&self, message_type: MessageType) -> &[u8] {
        let payload = self.payload();
        &payload[message_type.extension_len().min(payload.len())..]
    }

    /// Replaces the payload from byte 10 on and updates the length byte.
    ///
    /// # Returns
    /// `false` without touching the frame if the payload does not fit.
    pub fn set_payload(&mut self, payload: &[u8]) -> bool {
        if payload.len() > MAX_PAYLOAD_LEN {
            return false;
        }
        self.buf.truncate(PAYLOAD_OFFSET);
        let _ = self.buf.extend_from_slice(payload);
        self.sync_len();
        true
    }

    /// Appends to the payload and updates the length byte.
    ///
    /// # Returns
    /// `false` without touching the frame if the bytes do not fit.
    pub fn push_payload(&mut self, bytes: &[u8]) -> bool {
        if self.buf.extend_from_slice(bytes).is_err() {
            return false;
        }
        self.sync_len();
        true
    }

    fn set_payload_byte(&mut self, index: usize, value: u8) {
        let at = PAYLOAD_OFFSET + index;
        if self.buf.len() <= at {
            let _ = self.buf.resize(at + 1, 0);
            self.sync_len();
        }
        self.buf[at] = value;
    }

    fn sync_len(&mut self) {
        self.buf[0] = (self.buf.len() - 1) as u8;
    }

    /// Mutable access to the raw buffer, for the codec.
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.as_bytes().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "defmt-0-3")]
impl defmt::Format for Frame {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=[u8]:x}", self.as_bytes())
    }
}
