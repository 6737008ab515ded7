//! The protocol engine.
//!
//! [`ProtocolEngine`] owns every piece of protocol state of a node: the
//! register store, one peer table per channel, the single outbound message
//! descriptor and the slice transfer. It is constructed once at startup and
//! driven by calling [`ProtocolEngine::poll`] on every tick with the current
//! millisecond time.
//!
//! One poll does, in this order:
//! 1. expire the configuration session and the pair window
//! 2. take at most one frame from the radio, check its length byte,
//!    descramble it and drop it unless it is addressed to this node or to
//!    the broadcast address
//! 3. dispatch it: `CONFIG` requests, `ACK` correlation, `INSTRUCTION`s and
//!    peer events
//! 4. let the slice transfer queue its next slice
//! 5. advance the send scheduler; a frame it loops back is dispatched as if
//!    it had been received
//!
//! Requests the node cannot serve are answered with a NACK, but only if the
//! request asked for an acknowledgment. Nothing here is fatal.

use heapless::Vec;

use crate::channel::{Channel, ChannelKind, PeerEvent};
use crate::codec;
use crate::config::{DeviceIdentity, EngineConfig};
use crate::consts::{
    ACK_NACK, ACK_PLAIN, ACK_STATUS, CONFIG_END, CONFIG_PAIR_SERIAL, CONFIG_PARAM_REQ,
    CONFIG_PEER_ADD, CONFIG_PEER_LIST_REQ, CONFIG_PEER_REMOVE, CONFIG_SERIAL_REQ, CONFIG_START,
    CONFIG_STATUS_REQUEST, CONFIG_WRITE_INDEX1, CONFIG_WRITE_INDEX2, INFO_ACTUATOR_STATUS,
    INFO_SERIAL, INSTRUCTION_RESET, LIST_DEVICE, LIST_PEER_SENSOR, MAX_CHANNELS, MAX_FRAME_LEN,
    MAX_PEERS, MSG_ACK, MSG_CONFIG, MSG_DEVICE_INFO, MSG_INFO, MSG_INSTRUCTION, MSG_REMOTE,
    MSG_SENSOR_EVENT, REG_LOCAL_RESET_DISABLE, REG_MASTER_ID, REG_PEER_NEEDS_BURST, STATUS_LOWBAT,
};
use crate::error::EngineError;
use crate::hal::{Backing, PowerManager, Radio};
use crate::message::{Address, Flags, Frame, MessageType};
use crate::peer::{PeerEntry, PeerTable};
use crate::scheduler::{PeerTarget, PollOutcome, SendScheduler};
use crate::slice::SliceTransfer;
use crate::store::{ChannelLayout, RegisterStore};
use crate::timer::WaitTimer;

/// Scheduler polls spent pushing out the acknowledgment of a factory reset.
const FLUSH_POLLS: usize = 4;

#[derive(Debug)]
struct ChannelSlot {
    channel: Channel,
    peers: PeerTable,
}

/// The list a `CONFIG_START` opened for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConfigSession {
    channel: u8,
    list: u8,
    peer_index: u8,
}

fn needs_burst<B: Backing>(store: &mut RegisterStore<B>, channel: u8, list: u8, slot: u8) -> bool {
    store.load(channel, list, slot).is_ok()
        && store
            .read_register(channel, list, REG_PEER_NEEDS_BURST)
            .is_ok_and(|value| value & 0x01 != 0)
}

/// The node-side protocol context.
#[derive(Debug)]
pub struct ProtocolEngine<R: Radio, P: PowerManager, B: Backing> {
    radio: R,
    power: P,
    store: RegisterStore<B>,
    channels: Vec<ChannelSlot, MAX_CHANNELS>,
    scheduler: SendScheduler,
    slices: SliceTransfer,
    identity: DeviceIdentity,
    config: EngineConfig,
    local: Address,
    master: Address,
    session: Option<ConfigSession>,
    config_timer: WaitTimer,
    pair_timer: WaitTimer,
    carrier_seen: bool,
    low_battery: bool,
}

impl<R: Radio, P: PowerManager, B: Backing> ProtocolEngine<R, P, B> {
    /// Builds the engine and opens the register store.
    ///
    /// Channel 0 is always the maintenance channel; `channels` lists the
    /// application channels starting at channel 1. A store whose schema
    /// checksum does not match is reinitialised from defaults.
    ///
    /// # Arguments
    /// - `radio`, `power`, `backing`: the collaborators
    /// - `channels`: application channels, at most [`MAX_CHANNELS`] - 1
    /// - `identity`: what the node reports about itself
    /// - `config`: timing and retry parameters
    pub fn new(
        radio: R,
        power: P,
        backing: B,
        channels: &[Channel],
        identity: DeviceIdentity,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let mut slots: Vec<ChannelSlot, MAX_CHANNELS> = Vec::new();
        let mut layouts: Vec<ChannelLayout, MAX_CHANNELS> = Vec::new();
        let application = channels
            .iter()
            .copied()
            .filter(|channel| !matches!(channel.kind, ChannelKind::Maintenance));
        for channel in core::iter::once(Channel::maintenance()).chain(application) {
            let layout = channel.layout();
            let slot = ChannelSlot {
                channel,
                peers: PeerTable::new(layout.peer_max),
            };
            if slots.push(slot).is_err() || layouts.push(layout).is_err() {
                warn!("more than {} channels, ignoring the rest", MAX_CHANNELS);
                break;
            }
        }

        let mut store = RegisterStore::new(backing, &layouts);
        if store.open()? {
            info!("register store initialised from defaults");
        }
        for (index, slot) in slots.iter_mut().enumerate() {
            slot.peers = store.load_peer_table(index as u8)?;
        }

        let local = Address::new(identity.hmid);
        let mut engine = Self {
            radio,
            power,
            store,
            channels: slots,
            scheduler: SendScheduler::new(local, config.scheduler),
            slices: SliceTransfer::new(config.slice),
            identity,
            config,
            local,
            master: Address::BROADCAST,
            session: None,
            config_timer: WaitTimer::new(),
            pair_timer: WaitTimer::new(),
            carrier_seen: false,
            low_battery: false,
        };
        engine.refresh_master();
        info!(
            "engine up as {:?}, master {:?}, {} channels",
            engine.local,
            engine.master,
            engine.channels.len()
        );
        Ok(engine)
    }

    /// Runs one tick of the engine at time `now` (milliseconds).
    pub fn poll(&mut self, now: u32) {
        if self.session.is_some() && self.config_timer.elapsed(now) {
            debug!("config session timed out");
            self.close_session();
        }
        if self.pair_timer.is_armed() && self.pair_timer.elapsed(now) {
            debug!("pair window closed");
            self.pair_timer.clear();
        }

        let mut buf = [0u8; MAX_FRAME_LEN];
        match self.radio.receive_into(&mut buf) {
            Ok(len) => self.receive(now, &buf[..len.min(MAX_FRAME_LEN)]),
            Err(nb::Error::WouldBlock) => {}
            Err(nb::Error::Other(e)) => warn!("radio receive failed: {:?}", e),
        }

        if let Err(e) = self.poll_slices(now) {
            warn!("slice transfer aborted: {:?}", e);
        }

        match self
            .scheduler
            .poll(now, self.master, &mut self.radio, &mut self.power)
        {
            PollOutcome::Looped(frame) => self.handle_frame(now, &frame),
            PollOutcome::TimedOut => debug!("send finished without ack"),
            _ => {}
        }
    }

    fn poll_slices(&mut self, now: u32) -> Result<bool, EngineError> {
        if !self.slices.is_active() {
            return Ok(false);
        }
        let channel = self.slices.channel();
        let slot = self
            .channels
            .get(usize::from(channel))
            .ok_or(EngineError::UnknownChannel(channel))?;
        self.slices
            .poll(now, self.master, &mut self.scheduler, &mut self.store, &slot.peers)
    }

    fn receive(&mut self, now: u32, raw: &[u8]) {
        let mut frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("dropping frame: {:?}", e);
                return;
            }
        };
        if !codec::decode(frame.raw_mut()) {
            debug!("dropping frame that does not descramble");
            return;
        }
        self.handle_frame(now, &frame);
    }

    fn handle_frame(&mut self, now: u32, frame: &Frame) {
        let receiver = frame.receiver();
        if receiver != self.local && !receiver.is_broadcast() {
            trace!("frame for {:?} ignored", receiver);
            return;
        }
        debug!("rx {:?}", frame);

        let result = match frame.kind() {
            MSG_CONFIG => self.handle_config(now, frame),
            MSG_ACK => {
                let _ = self.scheduler.on_ack(frame.sender(), frame.counter());
                Ok(())
            }
            MSG_INSTRUCTION => self.handle_instruction(now, frame),
            MSG_REMOTE | MSG_SENSOR_EVENT => self.handle_peer_event(frame),
            other => {
                trace!("ignoring message type {:x}", other);
                Ok(())
            }
        };
        if let Err(e) = result {
            debug!("request refused: {:?}", e);
            self.nack(frame);
        }
    }

    fn accepts_config_from(&self, sender: Address) -> bool {
        self.accepts_reset_from(sender) || self.pair_timer.is_armed()
    }

    fn accepts_reset_from(&self, sender: Address) -> bool {
        self.master.is_broadcast() || sender == self.master
    }

    fn slot(&self, channel: u8) -> Result<&ChannelSlot, EngineError> {
        self.channels
            .get(usize::from(channel))
            .ok_or(EngineError::UnknownChannel(channel))
    }

    fn handle_config(&mut self, now: u32, frame: &Frame) -> Result<(), EngineError> {
        let channel = frame.by10();
        let subtype = frame.by11();
        let body = frame.body(MessageType::with_extension(MSG_CONFIG, channel, subtype));

        match subtype {
            CONFIG_SERIAL_REQ => {
                let serial = self.identity.serial;
                return self.enqueue_answer(
                    frame,
                    MessageType::with_subtype(MSG_INFO, INFO_SERIAL),
                    &serial,
                    false,
                );
            }
            CONFIG_PAIR_SERIAL => {
                if body.get(..10) == Some(&self.identity.serial[..]) {
                    return self.start_pairing(now);
                }
                return Ok(());
            }
            _ => {}
        }

        if !self.accepts_config_from(frame.sender()) {
            debug!("config request from {:?} ignored", frame.sender());
            return Ok(());
        }
        let _ = self.slot(channel)?;

        match subtype {
            CONFIG_PEER_ADD => {
                let address = Address::from_slice(body).ok_or(EngineError::Malformed)?;
                let peer_channels = [
                    body.get(3).copied().unwrap_or(0),
                    body.get(4).copied().unwrap_or(0),
                ];
                let dual = peer_channels.iter().all(|c| *c != 0);
                let mut outcome = Err(EngineError::Malformed);
                for peer_channel in peer_channels.into_iter().filter(|c| *c != 0) {
                    let added = self.add_peer(channel, PeerEntry::new(address, peer_channel), dual);
                    if outcome.is_err() {
                        outcome = added.map(|_| ());
                    }
                }
                outcome?;
                self.ack(frame, Flags::NONE)
            }
            CONFIG_PEER_REMOVE => {
                let address = Address::from_slice(body).ok_or(EngineError::Malformed)?;
                let mut removed = 0;
                for peer_channel in body.iter().skip(3).take(2).copied() {
                    if peer_channel != 0 && self.remove_peer(channel, address, peer_channel)? {
                        removed += 1;
                    }
                }
                if removed == 0 {
                    return Err(EngineError::UnknownPeer);
                }
                self.ack(frame, Flags::NONE)
            }
            CONFIG_PEER_LIST_REQ => {
                let index = usize::from(channel);
                self.slices.start_peer_list(
                    now,
                    frame.sender(),
                    channel,
                    &self.channels[index].peers,
                );
                self.ack(frame, Flags::NONE)
            }
            CONFIG_PARAM_REQ => {
                let (list, peer_index) = self.target_list(channel, body)?;
                self.slices.start_params(
                    now,
                    frame.sender(),
                    self.config.param_response,
                    &self.store,
                    channel,
                    list,
                    peer_index,
                )?;
                self.ack(frame, Flags::NONE)
            }
            CONFIG_START => {
                let (list, peer_index) = self.target_list(channel, body)?;
                self.store.load(channel, list, peer_index)?;
                self.session = Some(ConfigSession {
                    channel,
                    list,
                    peer_index,
                });
                self.config_timer
                    .set(now, u32::from(self.config.config_mode_timeout_ms));
                debug!(
                    "config session open: channel {} list {} peer {}",
                    channel, list, peer_index
                );
                self.ack(frame, Flags::NONE)
            }
            CONFIG_END => {
                if let Some(session) = self.session.take() {
                    self.store
                        .load(session.channel, session.list, session.peer_index)?;
                    if session.list == LIST_DEVICE {
                        self.refresh_master();
                    }
                    debug!("config session closed");
                }
                self.config_timer.clear();
                self.pair_timer.clear();
                self.ack(frame, Flags::WKMEUP)
            }
            CONFIG_WRITE_INDEX1 => {
                let session = self.session_for(channel)?;
                let (start, values) = body.split_first().ok_or(EngineError::Malformed)?;
                let offset = self
                    .store
                    .pointer_to_register(session.channel, session.list, *start)?;
                self.store.write_subset(
                    session.channel,
                    session.list,
                    session.peer_index,
                    offset,
                    values,
                )?;
                self.config_timer
                    .set(now, u32::from(self.config.config_mode_timeout_ms));
                self.ack(frame, Flags::NONE)
            }
            CONFIG_WRITE_INDEX2 => {
                let session = self.session_for(channel)?;
                let written = self.store.write_pairs(
                    session.channel,
                    session.list,
                    session.peer_index,
                    body,
                )?;
                trace!("{} registers written", written);
                self.config_timer
                    .set(now, u32::from(self.config.config_mode_timeout_ms));
                self.ack(frame, Flags::NONE)
            }
            CONFIG_STATUS_REQUEST => {
                let status = self.slot(channel)?.channel.kind.status();
                let payload = [channel, status, self.status_flags(), self.radio.rssi()];
                self.enqueue_answer(
                    frame,
                    MessageType::with_subtype(MSG_INFO, INFO_ACTUATOR_STATUS),
                    &payload,
                    true,
                )
            }
            _ => Err(EngineError::Unsupported(channel)),
        }
    }

    /// Reads `peer address, peer channel, list` from a `CONFIG_START` or
    /// `CONFIG_PARAM_REQ` body and resolves the peer index.
    fn target_list(&self, channel: u8, body: &[u8]) -> Result<(u8, u8), EngineError> {
        let address = Address::from_slice(body).ok_or(EngineError::Malformed)?;
        let peer_channel = *body.get(3).ok_or(EngineError::Malformed)?;
        let list = *body.get(4).ok_or(EngineError::Malformed)?;
        let def = self.store.list_def(channel, list)?;
        if !def.is_peer_list() {
            return Ok((list, 0));
        }
        let peer_index = self
            .slot(channel)?
            .peers
            .find(address, peer_channel)
            .ok_or(EngineError::UnknownPeer)?;
        Ok((list, peer_index))
    }

    fn session_for(&self, channel: u8) -> Result<ConfigSession, EngineError> {
        self.session
            .filter(|session| session.channel == channel)
            .ok_or(EngineError::NoSession)
    }

    fn close_session(&mut self) {
        self.session = None;
        self.config_timer.clear();
    }

    fn peer_list_index(&self, channel: u8) -> Option<u8> {
        let slot = self.channels.get(usize::from(channel))?;
        slot.channel.layout().peer_list.map(|def| def.index)
    }

    fn add_peer(&mut self, channel: u8, entry: PeerEntry, dual: bool) -> Result<u8, EngineError> {
        let list = self
            .peer_list_index(channel)
            .ok_or(EngineError::Unsupported(channel))?;
        let index = usize::from(channel);
        let slot = self.channels[index].peers.upsert(entry)?;

        self.store.prepare_peer_defaults(channel, slot)?;
        let values = self.store.values_mut(channel, list)?;
        self.channels[index]
            .channel
            .kind
            .request_peer_defaults(slot, dual, values);
        self.store.save(channel, list, slot)?;
        self.store.write_peer(channel, slot, Some(entry))?;
        debug!(
            "peer {:?}:{} added to channel {} slot {}",
            entry.address, entry.channel, channel, slot
        );
        Ok(slot)
    }

    fn remove_peer(
        &mut self,
        channel: u8,
        address: Address,
        peer_channel: u8,
    ) -> Result<bool, EngineError> {
        let index = usize::from(channel);
        let Some(slot) = self.channels[index].peers.find(address, peer_channel) else {
            return Ok(false);
        };
        self.channels[index].peers.clear(slot)?;
        self.store.write_peer(channel, slot, None)?;
        debug!("peer slot {} of channel {} removed", slot, channel);
        Ok(true)
    }

    fn handle_instruction(&mut self, now: u32, frame: &Frame) -> Result<(), EngineError> {
        let subtype = frame.by10();
        if subtype == INSTRUCTION_RESET {
            if !self.accepts_reset_from(frame.sender()) {
                debug!("reset from {:?} ignored", frame.sender());
                return Ok(());
            }
            self.ack(frame, Flags::NONE)?;
            self.flush(now);
            if let Err(e) = self.factory_reset() {
                warn!("factory reset failed: {:?}", e);
            }
            return Ok(());
        }

        if !self.accepts_config_from(frame.sender()) {
            debug!("instruction from {:?} ignored", frame.sender());
            return Ok(());
        }
        let body = frame.body(MessageType::with_subtype(MSG_INSTRUCTION, subtype));
        let channel = *body.first().ok_or(EngineError::Malformed)?;
        let slot = self
            .channels
            .get_mut(usize::from(channel))
            .filter(|_| channel != 0)
            .ok_or(EngineError::UnknownChannel(channel))?;
        let status = slot
            .channel
            .kind
            .handle_instruction(subtype, body)
            .ok_or(EngineError::Unsupported(channel))?;
        debug!(
            "instruction {:x} on channel {}, status {:x}",
            subtype, channel, status
        );
        self.ack_status(frame, channel, status)
    }

    fn handle_peer_event(&mut self, frame: &Frame) -> Result<(), EngineError> {
        let payload = frame.payload();
        let event = PeerEvent::parse(frame.kind(), payload).ok_or(EngineError::Malformed)?;
        let peer_channel = payload[0] & 0x3f;
        let sender = frame.sender();

        let mut handled = None;
        for (index, slot) in self.channels.iter_mut().enumerate().skip(1) {
            let Some(peer) = slot.peers.find(sender, peer_channel) else {
                continue;
            };
            let Some(list) = slot.channel.layout().peer_list.map(|def| def.index) else {
                continue;
            };
            let channel = index as u8;
            self.store.load(channel, list, peer)?;
            let values = self.store.values(channel, list)?;
            if let Some(status) = slot.channel.kind.handle_peer_action(&event, values) {
                debug!(
                    "peer event from {:?}:{} switched channel {} to {:x}",
                    sender, peer_channel, channel, status
                );
                handled = Some((channel, status));
            }
        }

        match handled {
            Some((channel, status)) => self.ack_status(frame, channel, status),
            None => {
                trace!("peer event from {:?} not for us", sender);
                Ok(())
            }
        }
    }

    fn ack(&mut self, request: &Frame, flags: Flags) -> Result<(), EngineError> {
        self.reply(request, ACK_PLAIN, &[], flags)
    }

    fn ack_status(&mut self, request: &Frame, channel: u8, status: u8) -> Result<(), EngineError> {
        let payload = [channel, status, self.status_flags(), self.radio.rssi()];
        self.reply(request, ACK_STATUS, &payload, Flags::NONE)
    }

    /// Flags byte of status answers.
    fn status_flags(&self) -> u8 {
        if self.low_battery { STATUS_LOWBAT } else { 0x00 }
    }

    fn nack(&mut self, request: &Frame) {
        if let Err(e) = self.reply(request, ACK_NACK, &[], Flags::NONE) {
            warn!("nack not queued: {:?}", e);
        }
    }

    fn reply(
        &mut self,
        request: &Frame,
        subtype: u8,
        payload: &[u8],
        flags: Flags,
    ) -> Result<(), EngineError> {
        if !request.flags().contains(Flags::BIDI) {
            return Ok(());
        }
        self.scheduler.enqueue_answer(
            request.sender(),
            request.counter(),
            MessageType::with_subtype(MSG_ACK, subtype),
            payload,
            flags,
            false,
        )
    }

    /// Pushes the active message out before state it depends on goes away.
    fn flush(&mut self, now: u32) {
        for _ in 0..FLUSH_POLLS {
            match self
                .scheduler
                .poll(now, self.master, &mut self.radio, &mut self.power)
            {
                PollOutcome::Sent | PollOutcome::Acked | PollOutcome::Advanced => {}
                _ => break,
            }
        }
    }

    fn refresh_master(&mut self) {
        let mut id = [0u8; 3];
        for (byte, register) in id.iter_mut().zip(REG_MASTER_ID) {
            *byte = self
                .store
                .read_register(0, LIST_DEVICE, register)
                .unwrap_or(0);
        }
        let master = Address::new(id);
        if master != self.master {
            info!("master is now {:?}", master);
        }
        self.master = master;
    }

    fn factory_reset(&mut self) -> Result<(), EngineError> {
        info!("factory reset");
        self.scheduler.cancel();
        self.slices.cancel();
        self.close_session();
        self.pair_timer.clear();
        self.store.reset_to_defaults()?;
        for slot in self.channels.iter_mut() {
            slot.peers.clear_all();
        }
        self.refresh_master();
        Ok(())
    }

    /// Queues `message_type` with `payload` as the answer to `request`.
    ///
    /// The answer goes to the sender of `request` and carries its counter.
    pub fn enqueue_answer(
        &mut self,
        request: &Frame,
        message_type: MessageType,
        payload: &[u8],
        bidi: bool,
    ) -> Result<(), EngineError> {
        self.scheduler.enqueue_answer(
            request.sender(),
            request.counter(),
            message_type,
            payload,
            Flags::NONE,
            bidi,
        )
    }

    /// Queues a fan-out of one message to every peer of `channel`.
    ///
    /// Peers whose list 4 sets the peer-needs-burst bit get a wake-up burst.
    /// Without peers the message goes to the master.
    pub fn enqueue_peer_message(
        &mut self,
        channel: u8,
        message_type: MessageType,
        payload: &[u8],
        bidi: bool,
    ) -> Result<(), EngineError> {
        let slot = self
            .channels
            .get(usize::from(channel))
            .ok_or(EngineError::UnknownChannel(channel))?;
        let burst_list = slot
            .channel
            .layout()
            .peer_list
            .filter(|def| def.index == LIST_PEER_SENSOR)
            .map(|def| def.index);

        let mut targets: Vec<PeerTarget, MAX_PEERS> = Vec::new();
        for (peer, entry) in slot.peers.iter() {
            let burst =
                burst_list.is_some_and(|list| needs_burst(&mut self.store, channel, list, peer));
            let _ = targets.push(PeerTarget {
                slot: peer,
                address: entry.address,
                burst,
            });
        }
        self.scheduler
            .enqueue_peer(message_type, payload, targets, bidi)
    }

    /// Sends a `REMOTE` event for a press of the button of `channel`.
    pub fn button_event(&mut self, channel: u8, long: bool) -> Result<(), EngineError> {
        let slot = self
            .channels
            .get_mut(usize::from(channel))
            .ok_or(EngineError::UnknownChannel(channel))?;
        let counter = slot
            .channel
            .kind
            .next_press()
            .ok_or(EngineError::Unsupported(channel))?;
        let mut button = channel;
        if long {
            button |= 0x40;
        }
        if self.low_battery {
            button |= 0x80;
        }
        debug!("button {} pressed, counter {}", channel, counter);
        self.enqueue_peer_message(channel, MessageType::new(MSG_REMOTE), &[button, counter], true)
    }

    /// Announces the node to the central and opens the pair window.
    pub fn start_pairing(&mut self, now: u32) -> Result<(), EngineError> {
        let payload = self.identity.device_info_payload();
        self.scheduler
            .enqueue_pair(MessageType::new(MSG_DEVICE_INFO), &payload, Flags::CONFIG)?;
        self.pair_timer
            .set(now, u32::from(self.config.pair_mode_timeout_ms));
        info!("pairing started");
        Ok(())
    }

    /// Factory reset from the local config button.
    ///
    /// # Returns
    /// - `Ok(false)` if list 0 disables the local reset
    pub fn local_reset(&mut self) -> Result<bool, EngineError> {
        let disabled = self
            .store
            .read_register(0, LIST_DEVICE, REG_LOCAL_RESET_DISABLE)
            .is_ok_and(|value| value & 0x01 != 0);
        if disabled {
            info!("local reset disabled");
            return Ok(false);
        }
        self.factory_reset()?;
        Ok(true)
    }

    /// `true` while anything is pending: a message, a slice transfer, a
    /// configuration session or the pair window.
    pub fn is_busy(&self) -> bool {
        self.scheduler.is_active()
            || self.slices.is_active()
            || self.session.is_some()
            || self.pair_timer.is_armed()
    }

    /// Gets the radio ready for the node to sleep.
    ///
    /// A carrier seen on two consecutive calls keeps the node awake for
    /// [`EngineConfig::carrier_stay_awake_ms`], since a sender is bursting
    /// to wake it.
    ///
    /// # Returns
    /// - `true` if the radio was put into its idle state
    pub fn prepare_sleep(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }
        if self.radio.detect_carrier() {
            if core::mem::replace(&mut self.carrier_seen, true) {
                self.carrier_seen = false;
                debug!("carrier detected, staying awake");
                self.power.stay_awake(self.config.carrier_stay_awake_ms);
            }
            return false;
        }
        self.carrier_seen = false;
        self.radio.set_idle();
        true
    }

    /// Sets the low battery bit of outgoing button events and status answers.
    pub fn set_low_battery(&mut self, low: bool) {
        self.low_battery = low;
    }

    /// The paired master, broadcast while unpaired.
    pub fn master_id(&self) -> Address {
        self.master
    }

    /// The node's own address.
    pub fn local_address(&self) -> Address {
        self.local
    }

    /// Channel `channel`, if it exists.
    pub fn channel(&self, channel: u8) -> Option<&Channel> {
        self.channels
            .get(usize::from(channel))
            .map(|slot| &slot.channel)
    }

    /// Peer table of `channel`, if the channel exists.
    pub fn peers(&self, channel: u8) -> Option<&PeerTable> {
        self.channels
            .get(usize::from(channel))
            .map(|slot| &slot.peers)
    }

    /// The register store.
    pub fn store(&self) -> &RegisterStore<B> {
        &self.store
    }

    /// The send scheduler.
    pub fn scheduler(&self) -> &SendScheduler {
        &self.scheduler
    }

    /// The radio.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// The radio, mutably.
    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    /// The power manager.
    pub fn power(&self) -> &P {
        &self.power
    }
}
