//! Error types.
//!
//! Nothing in this crate is fatal. Every error here describes a request that
//! was refused and left state untouched; the engine turns most of them into a
//! NACK for the central, or drops the frame.

use thiserror::Error;

/// Failures of the register list store.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum StoreError {
    /// The channel does not define the requested list.
    #[error("list {list} is not defined on channel {channel}")]
    UnknownList {
        /// Channel that was asked.
        channel: u8,
        /// List index that was asked for.
        list: u8,
    },
    /// The list does not define the requested register.
    #[error("register {0:#04x} is not part of the list")]
    UnknownRegister(u8),
    /// A write would run past the end of the list.
    #[error("write of {len} bytes at offset {offset} exceeds the list")]
    OutOfBounds {
        /// Requested start offset.
        offset: usize,
        /// Requested length.
        len: usize,
    },
    /// The peer index is outside the list's peer capacity.
    #[error("peer index {0} is out of range")]
    PeerIndex(u8),
    /// The backing store refused the access.
    #[error("backing store access failed")]
    Backing,
}

/// Failures of the peer table.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PeerError {
    /// Every slot is occupied.
    #[error("peer table is full")]
    Full,
    /// The slot index is outside the table.
    #[error("slot {0} is out of range")]
    InvalidSlot(u8),
    /// The entry has the all-zero address, which marks a free slot.
    #[error("peer address is empty")]
    EmptyAddress,
    /// The entry is already held by another slot.
    #[error("peer already stored in slot {0}")]
    Duplicate(u8),
}

/// Structural problems of a raw frame.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FrameError {
    /// Fewer bytes than the fixed header.
    #[error("frame shorter than its header")]
    TooShort,
    /// More bytes than a frame buffer holds.
    #[error("frame longer than the frame buffer")]
    TooLong,
    /// The length byte disagrees with the number of received bytes.
    #[error("length byte {declared} does not match {received} received bytes")]
    LengthMismatch {
        /// Value of the length byte.
        declared: u8,
        /// Bytes actually received.
        received: usize,
    },
}

/// Failures surfaced by the protocol engine's public operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum EngineError {
    /// No channel with this number exists.
    #[error("channel {0} does not exist")]
    UnknownChannel(u8),
    /// The channel has no handler for the request.
    #[error("channel {0} does not support this request")]
    Unsupported(u8),
    /// The peer is not in the channel's peer table.
    #[error("unknown peer")]
    UnknownPeer,
    /// A register write arrived outside a configuration session.
    #[error("no configuration session is open for this channel")]
    NoSession,
    /// The request is shorter than its subtype requires.
    #[error("request is missing fields")]
    Malformed,
    /// A payload does not fit into one frame.
    #[error("payload of {0} bytes does not fit into a frame")]
    PayloadTooLong(usize),
    /// Register store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Peer table failure.
    #[error(transparent)]
    Peer(#[from] PeerError),
}
