//! Recording collaborators for unit tests.

use heapless::Vec;

use crate::channel::Channel;
use crate::codec;
use crate::config::{DeviceIdentity, EngineConfig};
use crate::consts::MAX_FRAME_LEN;
use crate::engine::ProtocolEngine;
use crate::hal::{MemoryBacking, PowerManager, Radio};
use crate::message::Frame;

/// Radio double: decodes and records every transmitted frame, serves queued
/// inbound frames.
#[derive(Debug, Default)]
pub(crate) struct MockRadio {
    pub sent: Vec<(Frame, bool), 64>,
    pub inbox: Vec<Vec<u8, MAX_FRAME_LEN>, 8>,
    pub carrier: bool,
    pub idle_calls: usize,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `frame` for reception, scrambled like it would be on air.
    pub fn deliver(&mut self, frame: &Frame) {
        let mut raw = frame.clone();
        let _ = codec::encode(raw.raw_mut());
        let _ = self.inbox.push(Vec::from_slice(raw.as_bytes()).unwrap());
    }

    pub fn sent_frames(&self) -> impl Iterator<Item = &Frame> {
        self.sent.iter().map(|(frame, _)| frame)
    }
}

impl Radio for MockRadio {
    type Error = ();

    fn transmit(&mut self, frame: &[u8], burst: bool) -> Result<(), Self::Error> {
        let mut plain = Frame::from_bytes(frame);
        let _ = codec::decode(plain.raw_mut());
        let _ = self.sent.push((plain, burst));
        Ok(())
    }

    fn receive_into(&mut self, buf: &mut [u8]) -> nb::Result<usize, Self::Error> {
        if self.inbox.is_empty() {
            return Err(nb::Error::WouldBlock);
        }
        let raw = self.inbox.remove(0);
        buf[..raw.len()].copy_from_slice(&raw);
        Ok(raw.len())
    }

    fn set_idle(&mut self) {
        self.idle_calls += 1;
    }

    fn detect_carrier(&mut self) -> bool {
        self.carrier
    }
}

/// Power manager double recording every stay-awake request.
#[derive(Debug, Default)]
pub(crate) struct MockPower {
    pub awake: Vec<u16, 128>,
}

impl PowerManager for MockPower {
    fn stay_awake(&mut self, duration_ms: u16) {
        let _ = self.awake.push(duration_ms);
    }
}

/// Engine over the doubles above.
pub(crate) type TestEngine = ProtocolEngine<MockRadio, MockPower, MemoryBacking<256>>;

pub(crate) fn test_identity() -> DeviceIdentity {
    DeviceIdentity {
        hmid: [0x01, 0x02, 0x04],
        serial: *b"KEQ0237396",
        firmware: 0x11,
        model: [0x00, 0x6c],
        subtype: 0x10,
        device_info: [0x41, 0x01, 0x00],
    }
}

/// Unpaired engine with a switch on channel 1 and a remote on channel 2.
pub(crate) fn test_engine() -> TestEngine {
    ProtocolEngine::new(
        MockRadio::new(),
        MockPower::default(),
        MemoryBacking::new(),
        &[Channel::switch(4), Channel::remote(6)],
        test_identity(),
        EngineConfig::default(),
    )
    .unwrap()
}
