//! Tunable parameters of the protocol engine.
//!
//! All durations are in milliseconds. The [`Default`] impls carry the values
//! a HomeMatic central expects from a battery powered node.

use crate::slice::SliceKind;

/// Retry and timing behaviour of the send scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SchedulerConfig {
    /// Transmissions of a message that requests an acknowledgment.
    pub max_retries: u8,
    /// Time to wait for an acknowledgment before retrying.
    pub ack_wait_ms: u16,
    /// Transmissions per peer and fan-out round.
    pub peer_max_retries: u8,
    /// Fan-out rounds over peers that did not acknowledge.
    pub peer_max_rounds: u8,
    /// Stay-awake window requested after each transmission.
    pub stay_awake_after_send_ms: u16,
    /// Stay-awake window requested after an acknowledgment or a timeout.
    pub stay_awake_after_result_ms: u16,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            ack_wait_ms: 300,
            peer_max_retries: 3,
            peer_max_rounds: 3,
            stay_awake_after_send_ms: 500,
            stay_awake_after_result_ms: 100,
        }
    }
}

/// Pacing of multi-frame configuration answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SliceConfig {
    /// Delay before the first slice and between slices.
    pub slice_delay_ms: u16,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self { slice_delay_ms: 50 }
    }
}

/// Everything the engine needs besides its collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct EngineConfig {
    /// Send scheduler settings.
    pub scheduler: SchedulerConfig,
    /// Slice transfer settings.
    pub slice: SliceConfig,
    /// A config write session closes itself after this long.
    pub config_mode_timeout_ms: u16,
    /// Length of the pairing window opened by
    /// [`ProtocolEngine::start_pairing`](crate::engine::ProtocolEngine::start_pairing).
    pub pair_mode_timeout_ms: u16,
    /// Stay-awake window after a carrier was seen twice in a row.
    pub carrier_stay_awake_ms: u16,
    /// Answer format for `CONFIG_PARAM_REQ`.
    pub param_response: SliceKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            slice: SliceConfig::default(),
            config_mode_timeout_ms: 2_000,
            pair_mode_timeout_ms: 20_000,
            carrier_stay_awake_ms: 500,
            param_response: SliceKind::ParamPairs,
        }
    }
}

/// Identity the device reports to the central.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct DeviceIdentity {
    /// Radio address (HMID).
    pub hmid: [u8; 3],
    /// Serial number, 10 ASCII characters.
    pub serial: [u8; 10],
    /// Firmware version.
    pub firmware: u8,
    /// Model id.
    pub model: [u8; 2],
    /// Device subtype.
    pub subtype: u8,
    /// Device info bytes.
    pub device_info: [u8; 3],
}

impl DeviceIdentity {
    /// Payload of a `DEVICE_INFO` frame: firmware, model, serial, subtype,
    /// device info.
    pub fn device_info_payload(&self) -> [u8; 17] {
        let mut out = [0u8; 17];
        out[0] = self.firmware;
        out[1..3].copy_from_slice(&self.model);
        out[3..13].copy_from_slice(&self.serial);
        out[13] = self.subtype;
        out[14..17].copy_from_slice(&self.device_info);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.scheduler.ack_wait_ms, 300);
        assert_eq!(config.slice.slice_delay_ms, 50);
        assert_eq!(config.config_mode_timeout_ms, 2_000);
        assert_eq!(config.pair_mode_timeout_ms, 20_000);
    }

    #[test]
    fn test_device_info_payload() {
        let identity = DeviceIdentity {
            hmid: [0x01, 0x02, 0x04],
            serial: *b"KEQ0237396",
            firmware: 0x11,
            model: [0x00, 0xa9],
            subtype: 0x40,
            device_info: [0x06, 0x00, 0x00],
        };
        let payload = identity.device_info_payload();
        assert_eq!(&payload[..3], &[0x11, 0x00, 0xa9]);
        assert_eq!(&payload[3..13], b"KEQ0237396");
        assert_eq!(&payload[13..], &[0x40, 0x06, 0x00, 0x00]);
    }
}
