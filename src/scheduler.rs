//! Single-flight send scheduler.
//!
//! The scheduler owns the one outbound message descriptor of the node. A
//! message is handed in once through one of the `enqueue_*` methods and then
//! driven entirely by [`SendScheduler::poll`]: addressing is resolved on the
//! first attempt, the frame is scrambled and handed to the [`Radio`], and
//! retries follow the acknowledgment timer until the message is acknowledged
//! or its attempts are spent.
//!
//! | mode | receiver | counter | `BIDI` |
//! |------|----------|---------|--------|
//! | [`SendMode::Answer`] | sender of the triggering frame | copied from it | as requested |
//! | [`SendMode::Pair`] | paired master, broadcast if unpaired | next local counter | forced, cleared for broadcast |
//! | [`SendMode::Pair`] via [`SendScheduler::enqueue_directed`] | the given address | next local counter | forced |
//! | [`SendMode::Peer`] | each peer in turn | next local counter per peer | no |
//! | [`SendMode::PeerBidi`] | each peer in turn | next local counter per peer | yes |
//!
//! A peer fan-out with no peers degrades to [`SendMode::Pair`], so the
//! master still learns about the event. Peers are visited in ascending slot
//! order; peers that did not acknowledge are visited again in later rounds,
//! up to [`SchedulerConfig::peer_max_rounds`].
//!
//! Nothing here blocks. Only one frame is ever awaiting acknowledgment, which
//! is what makes correlating an `ACK` by counter unambiguous.

use heapless::Vec;

use crate::codec;
use crate::config::SchedulerConfig;
use crate::consts::{MAX_PAYLOAD_LEN, MAX_PEERS};
use crate::error::EngineError;
use crate::hal::{PowerManager, Radio};
use crate::message::{Address, Flags, Frame, MessageType};
use crate::timer::WaitTimer;

/// Addressing mode of the active outbound message.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SendMode {
    ///   Nothing to send.
    #[default]
    None,
    ///   Reply to a received frame. The receiver and the counter are taken
    ///   from the frame being answered.
    Answer,
    ///   Directed to the paired master with an acknowledgment requested.
    ///   Falls back to a broadcast without acknowledgment while unpaired.
    Pair,
    ///   Fan-out to every peer of a channel without acknowledgment.
    Peer,
    ///   Fan-out to every peer of a channel, each peer acknowledging.
    PeerBidi,
}

/// One peer as seen by a fan-out, captured when the message is enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct PeerTarget {
    /// Peer table slot.
    pub slot: u8,
    /// Peer address.
    pub address: Address,
    /// The peer sleeps and needs a wake-up burst.
    pub burst: bool,
}

/// What a call to [`SendScheduler::poll`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No message is active.
    Idle,
    /// Waiting for an acknowledgment or the retry timer.
    Waiting,
    /// A frame was handed to the radio.
    Sent,
    /// The message was addressed to this node and never transmitted; the
    /// caller feeds it to its own receive path.
    Looped(Frame),
    /// The in-flight frame was acknowledged.
    Acked,
    /// A fan-out moved on to the next peer.
    Advanced,
    /// The message is finished.
    Done,
    /// The message is finished without the acknowledgment it asked for.
    TimedOut,
}

#[derive(Debug)]
struct PeerFanout {
    targets: Vec<PeerTarget, MAX_PEERS>,
    pending: u32,
    cursor: usize,
    round: u8,
}

impl PeerFanout {
    const fn new() -> Self {
        Self {
            targets: Vec::new(),
            pending: 0,
            cursor: 0,
            round: 0,
        }
    }

    fn load(&mut self, targets: impl IntoIterator<Item = PeerTarget>) {
        self.targets.clear();
        for target in targets {
            if self.targets.push(target).is_err() {
                break;
            }
        }
        self.targets.sort_unstable_by_key(|target| target.slot);
        self.pending = match self.targets.len() {
            MAX_PEERS => u32::MAX,
            len => (1u32 << len) - 1,
        };
        self.cursor = 0;
        self.round = 0;
    }

    fn current(&self) -> Option<&PeerTarget> {
        self.targets.get(self.cursor)
    }

    fn complete_current(&mut self) {
        if self.cursor < self.targets.len() {
            self.pending &= !(1u32 << self.cursor);
        }
    }

    /// Moves to the next pending target, starting a new round past the last
    /// slot.
    ///
    /// # Returns
    /// - `false` once every target completed or the rounds are spent
    fn advance(&mut self, max_rounds: u8) -> bool {
        let next = (self.cursor + 1..self.targets.len()).find(|i| self.pending & (1u32 << i) != 0);
        if let Some(next) = next {
            self.cursor = next;
            return true;
        }
        self.round += 1;
        if self.pending == 0 || self.round >= max_rounds {
            return false;
        }
        self.cursor = self.pending.trailing_zeros() as usize;
        true
    }

    fn clear(&mut self) {
        self.targets.clear();
        self.pending = 0;
        self.cursor = 0;
        self.round = 0;
    }
}

/// The outbound message descriptor and its state machine.
#[derive(Debug)]
pub struct SendScheduler {
    config: SchedulerConfig,
    local: Address,
    counter: u8,
    mode: SendMode,
    template: Frame,
    bidi: bool,
    answer_to: (Address, u8),
    pair_to: Option<Address>,
    wire: Frame,
    burst: bool,
    retry_count: u8,
    max_retries: u8,
    timer: WaitTimer,
    acked: bool,
    timed_out: bool,
    fanout: PeerFanout,
}

impl SendScheduler {
    /// An idle scheduler sending as `local`.
    pub fn new(local: Address, config: SchedulerConfig) -> Self {
        Self {
            config,
            local,
            counter: 0,
            mode: SendMode::None,
            template: Frame::new(),
            bidi: false,
            answer_to: (Address::BROADCAST, 0),
            pair_to: None,
            wire: Frame::new(),
            burst: false,
            retry_count: 0,
            max_retries: 1,
            timer: WaitTimer::new(),
            acked: false,
            timed_out: false,
            fanout: PeerFanout::new(),
        }
    }

    /// Current addressing mode, [`SendMode::None`] when idle.
    pub fn mode(&self) -> SendMode {
        self.mode
    }

    /// `true` while a message is being sent or awaits acknowledgment.
    pub fn is_active(&self) -> bool {
        self.mode != SendMode::None
    }

    /// The counter the next locally originated message will carry.
    pub fn counter(&self) -> u8 {
        self.counter
    }

    /// Transmissions of the current frame so far.
    pub fn retry_count(&self) -> u8 {
        self.retry_count
    }

    /// The frame currently on the air, once addressing is resolved.
    pub fn in_flight(&self) -> Option<&Frame> {
        (self.is_active() && self.retry_count > 0).then_some(&self.wire)
    }

    /// `true` if the most recent message ended without the acknowledgment
    /// it asked for.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Returns and resets the timeout flag.
    pub fn take_timed_out(&mut self) -> bool {
        core::mem::take(&mut self.timed_out)
    }

    /// Queues a reply to a received frame from `to` that carried `counter`.
    ///
    /// A message that is still active is superseded.
    pub fn enqueue_answer(
        &mut self,
        to: Address,
        counter: u8,
        message_type: MessageType,
        payload: &[u8],
        flags: Flags,
        bidi: bool,
    ) -> Result<(), EngineError> {
        self.prepare(message_type, payload, flags)?;
        self.answer_to = (to, counter);
        self.start(SendMode::Answer, bidi);
        Ok(())
    }

    /// Queues a message for the paired master.
    ///
    /// A message that is still active is superseded.
    pub fn enqueue_pair(
        &mut self,
        message_type: MessageType,
        payload: &[u8],
        flags: Flags,
    ) -> Result<(), EngineError> {
        self.prepare(message_type, payload, flags)?;
        self.start(SendMode::Pair, true);
        Ok(())
    }

    /// Queues a message for `to` that is otherwise sent like
    /// [`SendScheduler::enqueue_pair`]: local counter, acknowledgment
    /// requested, retried until acknowledged.
    ///
    /// A message that is still active is superseded.
    pub fn enqueue_directed(
        &mut self,
        to: Address,
        message_type: MessageType,
        payload: &[u8],
        flags: Flags,
    ) -> Result<(), EngineError> {
        self.prepare(message_type, payload, flags)?;
        self.start(SendMode::Pair, true);
        self.pair_to = Some(to);
        Ok(())
    }

    /// Queues a fan-out of one message to `targets`.
    ///
    /// The targets are captured now; changes to the peer table do not affect
    /// a running fan-out. At most [`MAX_PEERS`] targets are kept.
    pub fn enqueue_peer(
        &mut self,
        message_type: MessageType,
        payload: &[u8],
        targets: impl IntoIterator<Item = PeerTarget>,
        bidi: bool,
    ) -> Result<(), EngineError> {
        self.prepare(message_type, payload, Flags::NONE)?;
        self.fanout.load(targets);
        let mode = if bidi {
            SendMode::PeerBidi
        } else {
            SendMode::Peer
        };
        self.start(mode, bidi);
        Ok(())
    }

    fn prepare(
        &mut self,
        message_type: MessageType,
        payload: &[u8],
        flags: Flags,
    ) -> Result<(), EngineError> {
        let len = message_type.extension_len() + payload.len();
        if len > MAX_PAYLOAD_LEN {
            return Err(EngineError::PayloadTooLong(len));
        }
        let mut template = Frame::new();
        template.set_flags(flags);
        template.set_message_type(message_type);
        if !template.push_payload(payload) {
            return Err(EngineError::PayloadTooLong(len));
        }
        if self.is_active() {
            debug!("superseding {:?} message", self.mode);
        }
        self.template = template;
        Ok(())
    }

    fn start(&mut self, mode: SendMode, bidi: bool) {
        if !matches!(mode, SendMode::Peer | SendMode::PeerBidi) {
            self.fanout.clear();
        }
        self.mode = mode;
        self.bidi = bidi;
        self.pair_to = None;
        self.retry_count = 0;
        self.max_retries = 1;
        self.timer.clear();
        self.acked = false;
        self.timed_out = false;
    }

    /// Drops the active message without sending anything further.
    pub fn cancel(&mut self) {
        if self.is_active() {
            debug!("cancelling {:?} message", self.mode);
        }
        self.clear();
    }

    fn clear(&mut self) {
        self.mode = SendMode::None;
        self.retry_count = 0;
        self.timer.clear();
        self.acked = false;
        self.fanout.clear();
    }

    fn is_peer(&self) -> bool {
        matches!(self.mode, SendMode::Peer | SendMode::PeerBidi)
    }

    fn next_counter(&mut self) -> u8 {
        let counter = self.counter;
        self.counter = self.counter.wrapping_add(1);
        counter
    }

    /// Marks the in-flight frame acknowledged if `sender` is its receiver
    /// and `counter` its counter.
    ///
    /// # Returns
    /// - `true` if the acknowledgment belonged to the in-flight frame
    pub fn on_ack(&mut self, sender: Address, counter: u8) -> bool {
        let Some(frame) = self.in_flight() else {
            return false;
        };
        if !frame.flags().contains(Flags::BIDI)
            || frame.receiver() != sender
            || frame.counter() != counter
        {
            return false;
        }
        debug!("ack from {:?} for counter {}", sender, counter);
        self.acked = true;
        true
    }

    /// Advances the state machine by one step.
    ///
    /// # Arguments
    /// - `now`: current time in milliseconds
    /// - `master`: paired master address, broadcast while unpaired
    /// - `radio`: receives the scrambled frame
    /// - `power`: asked to keep the node awake while replies may arrive
    pub fn poll<R: Radio, P: PowerManager>(
        &mut self,
        now: u32,
        master: Address,
        radio: &mut R,
        power: &mut P,
    ) -> PollOutcome {
        if !self.is_active() {
            return PollOutcome::Idle;
        }

        if self.acked {
            self.acked = false;
            power.stay_awake(self.config.stay_awake_after_result_ms);
            if self.is_peer() {
                self.fanout.complete_current();
                let _ = self.next_peer();
            } else {
                self.clear();
            }
            return PollOutcome::Acked;
        }

        if self.retry_count != 0 && !self.timer.elapsed(now) {
            return PollOutcome::Waiting;
        }

        if self.retry_count == 0 {
            if let Some(looped) = self.resolve(master) {
                return PollOutcome::Looped(looped);
            }
        }

        if self.retry_count < self.max_retries {
            self.transmit(now, radio, power);
            return PollOutcome::Sent;
        }

        if self.is_peer() {
            return self.next_peer();
        }

        let expected_ack = self.wire.flags().contains(Flags::BIDI);
        self.clear();
        if expected_ack {
            warn!("no ack from {:?}", self.wire.receiver());
            self.timed_out = true;
            power.stay_awake(self.config.stay_awake_after_result_ms);
            PollOutcome::TimedOut
        } else {
            PollOutcome::Done
        }
    }

    /// Builds the frame for the first attempt.
    ///
    /// # Returns
    /// - `Some(frame)` if the frame is addressed to this node
    fn resolve(&mut self, master: Address) -> Option<Frame> {
        let mut frame = self.template.clone();
        let mut flags = frame.flags().union(Flags::RPTEN);

        if self.is_peer() && self.fanout.current().is_none() {
            debug!("no peers, sending to master instead");
            self.mode = SendMode::Pair;
            self.bidi = true;
        }

        let current = self.fanout.current().copied();
        let pair_to = self.pair_to.unwrap_or(master);
        let (receiver, counter, bidi, burst) = match (self.mode, current) {
            (SendMode::Answer, _) => (self.answer_to.0, self.answer_to.1, self.bidi, false),
            (SendMode::Peer | SendMode::PeerBidi, Some(target)) => {
                (target.address, self.next_counter(), self.bidi, target.burst)
            }
            _ if pair_to.is_broadcast() => (Address::BROADCAST, self.next_counter(), false, false),
            _ => (pair_to, self.next_counter(), true, false),
        };

        flags.set(Flags::BIDI, bidi);
        flags.set(Flags::BURST, burst || flags.contains(Flags::BURST));
        frame.set_flags(flags);
        frame.set_counter(counter);
        frame.set_sender(self.local);
        frame.set_receiver(receiver);

        self.burst = flags.contains(Flags::BURST);
        self.max_retries = match (bidi, self.is_peer()) {
            (false, _) => 1,
            (true, true) => self.config.peer_max_retries.max(1),
            (true, false) => self.config.max_retries.max(1),
        };

        if receiver == self.local {
            debug!("looping back frame addressed to ourselves");
            if self.is_peer() {
                self.fanout.complete_current();
                let _ = self.next_peer();
            } else {
                self.clear();
            }
            return Some(frame);
        }

        self.wire = frame;
        None
    }

    fn transmit<R: Radio, P: PowerManager>(&mut self, now: u32, radio: &mut R, power: &mut P) {
        let mut encoded = self.wire.clone();
        let _ = codec::encode(encoded.raw_mut());
        trace!("tx {:?} attempt {}", self.wire, self.retry_count + 1);
        if let Err(e) = radio.transmit(encoded.as_bytes(), self.burst) {
            warn!("radio transmit failed: {:?}", e);
        }
        self.retry_count += 1;
        if self.wire.flags().contains(Flags::BIDI) {
            self.timer.set(now, u32::from(self.config.ack_wait_ms));
        } else if self.is_peer() {
            self.fanout.complete_current();
        }
        power.stay_awake(self.config.stay_awake_after_send_ms);
    }

    fn next_peer(&mut self) -> PollOutcome {
        self.retry_count = 0;
        self.timer.clear();
        let round = self.fanout.round;
        if self.fanout.advance(self.config.peer_max_rounds) {
            if self.fanout.round != round {
                debug!("peer fan-out round {}", self.fanout.round);
            }
            return PollOutcome::Advanced;
        }
        let missed = self.fanout.pending != 0;
        self.clear();
        if missed {
            warn!("peer fan-out finished with unacknowledged peers");
            self.timed_out = true;
            PollOutcome::TimedOut
        } else {
            PollOutcome::Done
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{ACK_PLAIN, MSG_ACK, MSG_DEVICE_INFO, MSG_REMOTE};
    use crate::testing::{MockPower, MockRadio};

    const LOCAL: Address = Address::new([0x1f, 0xb7, 0x4a]);
    const MASTER: Address = Address::new([0x63, 0x19, 0x63]);

    fn scheduler() -> SendScheduler {
        SendScheduler::new(LOCAL, SchedulerConfig::default())
    }

    fn peers(count: u8) -> impl Iterator<Item = PeerTarget> {
        (0..count).map(|slot| PeerTarget {
            slot,
            address: Address::new([0x40, 0x00, slot + 1]),
            burst: slot == 1,
        })
    }

    /// Polls until idle, stepping time far enough to pass every ack timer.
    fn drain(
        sched: &mut SendScheduler,
        master: Address,
        radio: &mut MockRadio,
        power: &mut MockPower,
    ) -> PollOutcome {
        let mut now = 0;
        for _ in 0..200 {
            let outcome = sched.poll(now, master, radio, power);
            if !sched.is_active() {
                return outcome;
            }
            now += 1_000;
        }
        panic!("scheduler never went idle");
    }

    #[test]
    fn test_idle_scheduler_does_nothing() {
        let mut sched = scheduler();
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        assert_eq!(sched.poll(0, MASTER, &mut radio, &mut power), PollOutcome::Idle);
        assert!(radio.sent.is_empty());
        assert!(power.awake.is_empty());
    }

    #[test]
    fn test_answer_copies_counter_and_receiver() {
        let mut sched = scheduler();
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        sched
            .enqueue_answer(
                MASTER,
                0x24,
                MessageType::with_subtype(MSG_ACK, ACK_PLAIN),
                &[],
                Flags::NONE,
                false,
            )
            .unwrap();

        assert_eq!(sched.poll(0, MASTER, &mut radio, &mut power), PollOutcome::Sent);
        assert_eq!(sched.poll(1, MASTER, &mut radio, &mut power), PollOutcome::Done);
        assert!(!sched.is_active());
        assert_eq!(
            radio.sent[0].0.as_bytes(),
            &[0x0a, 0x24, 0x80, 0x02, 0x1f, 0xb7, 0x4a, 0x63, 0x19, 0x63, 0x00]
        );
        assert!(!radio.sent[0].1);
        assert_eq!(sched.counter(), 0);
        assert_eq!(&power.awake[..], &[500]);
    }

    #[test]
    fn test_three_transmissions_without_ack() {
        let mut sched = scheduler();
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        sched
            .enqueue_pair(MessageType::new(MSG_DEVICE_INFO), &[0x01], Flags::NONE)
            .unwrap();

        assert_eq!(sched.poll(0, MASTER, &mut radio, &mut power), PollOutcome::Sent);
        assert_eq!(sched.poll(100, MASTER, &mut radio, &mut power), PollOutcome::Waiting);
        assert_eq!(sched.poll(300, MASTER, &mut radio, &mut power), PollOutcome::Sent);
        assert_eq!(sched.poll(600, MASTER, &mut radio, &mut power), PollOutcome::Sent);
        assert_eq!(sched.poll(900, MASTER, &mut radio, &mut power), PollOutcome::TimedOut);

        assert_eq!(radio.sent.len(), 3);
        assert!(radio.sent_frames().all(|f| f.counter() == 0));
        assert!(radio.sent_frames().all(|f| f.flags() == Flags(0xa0)));
        assert!(sched.take_timed_out());
        assert!(!sched.timed_out());
        assert_eq!(power.awake.last(), Some(&100));
    }

    #[test]
    fn test_ack_finishes_pair_message() {
        let mut sched = scheduler();
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        sched
            .enqueue_pair(MessageType::new(MSG_DEVICE_INFO), &[0x01], Flags::NONE)
            .unwrap();
        assert_eq!(sched.poll(0, MASTER, &mut radio, &mut power), PollOutcome::Sent);

        assert!(!sched.on_ack(MASTER, 0x05));
        assert!(!sched.on_ack(Address::new([1, 2, 3]), 0x00));
        assert!(sched.on_ack(MASTER, 0x00));
        assert_eq!(sched.poll(10, MASTER, &mut radio, &mut power), PollOutcome::Acked);
        assert!(!sched.is_active());
        assert!(!sched.timed_out());
        assert_eq!(radio.sent.len(), 1);
        assert_eq!(sched.counter(), 1);
    }

    #[test]
    fn test_unpaired_pair_message_is_broadcast_without_bidi() {
        let mut sched = scheduler();
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        sched
            .enqueue_pair(MessageType::new(MSG_DEVICE_INFO), &[0x01], Flags::CONFIG)
            .unwrap();

        let outcome = drain(&mut sched, Address::BROADCAST, &mut radio, &mut power);
        assert_eq!(outcome, PollOutcome::Done);
        assert_eq!(radio.sent.len(), 1);
        let frame = &radio.sent[0].0;
        assert!(frame.receiver().is_broadcast());
        assert!(!frame.flags().contains(Flags::BIDI));
        assert!(frame.flags().contains(Flags::CONFIG));
        assert!(frame.flags().contains(Flags::RPTEN));
        assert!(!sched.timed_out());
    }

    #[test]
    fn test_directed_message_keeps_bidi_while_unpaired() {
        let mut sched = scheduler();
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        sched
            .enqueue_directed(MASTER, MessageType::new(MSG_DEVICE_INFO), &[0x01], Flags::WKMEUP)
            .unwrap();

        assert_eq!(
            sched.poll(0, Address::BROADCAST, &mut radio, &mut power),
            PollOutcome::Sent
        );
        let frame = &radio.sent[0].0;
        assert_eq!(frame.receiver(), MASTER);
        assert!(frame.flags().contains(Flags::BIDI));
        assert!(frame.flags().contains(Flags::WKMEUP));
        assert!(sched.on_ack(MASTER, frame.counter()));

        // a later pair message resolves against the master again
        sched
            .enqueue_pair(MessageType::new(MSG_DEVICE_INFO), &[0x01], Flags::NONE)
            .unwrap();
        let _ = drain(&mut sched, Address::BROADCAST, &mut radio, &mut power);
        assert!(radio.sent[1].0.receiver().is_broadcast());
    }

    #[test]
    fn test_self_addressed_message_is_looped() {
        let mut sched = scheduler();
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        sched
            .enqueue_answer(
                LOCAL,
                0x10,
                MessageType::with_subtype(MSG_ACK, ACK_PLAIN),
                &[],
                Flags::NONE,
                true,
            )
            .unwrap();

        match sched.poll(0, MASTER, &mut radio, &mut power) {
            PollOutcome::Looped(frame) => {
                assert_eq!(frame.receiver(), LOCAL);
                assert_eq!(frame.counter(), 0x10);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!sched.is_active());
        assert!(radio.sent.is_empty());
    }

    #[test]
    fn test_fanout_visits_slots_in_order_once() {
        let mut sched = scheduler();
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        let mut targets: Vec<PeerTarget, 4> = peers(4).collect();
        targets.reverse();
        sched
            .enqueue_peer(MessageType::new(MSG_REMOTE), &[0x01, 0x05], targets, false)
            .unwrap();

        assert_eq!(drain(&mut sched, MASTER, &mut radio, &mut power), PollOutcome::Done);
        let receivers: Vec<u8, 8> = radio.sent_frames().map(|f| f.receiver().0[2]).collect();
        assert_eq!(&receivers[..], &[1, 2, 3, 4]);
        let counters: Vec<u8, 8> = radio.sent_frames().map(|f| f.counter()).collect();
        assert_eq!(&counters[..], &[0, 1, 2, 3]);
        assert!(radio.sent_frames().all(|f| !f.flags().contains(Flags::BIDI)));
        assert!(radio.sent[1].1);
        assert!(radio.sent[1].0.flags().contains(Flags::BURST));
        assert!(!radio.sent[0].1);
    }

    #[test]
    fn test_bidi_fanout_rounds_revisit_silent_peers() {
        let config = SchedulerConfig {
            peer_max_retries: 1,
            peer_max_rounds: 2,
            ..SchedulerConfig::default()
        };
        let mut sched = SendScheduler::new(LOCAL, config);
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        sched
            .enqueue_peer(MessageType::new(MSG_REMOTE), &[0x01, 0x05], peers(3), true)
            .unwrap();

        let mut now = 0;
        for _ in 0..40 {
            if !sched.is_active() {
                break;
            }
            if let Some(frame) = sched.in_flight() {
                // only the peer in slot 1 ever answers
                let (receiver, counter) = (frame.receiver(), frame.counter());
                if receiver.0[2] == 2 {
                    let _ = sched.on_ack(receiver, counter);
                }
            }
            let _ = sched.poll(now, MASTER, &mut radio, &mut power);
            now += 400;
        }

        let receivers: Vec<u8, 16> = radio.sent_frames().map(|f| f.receiver().0[2]).collect();
        assert_eq!(&receivers[..], &[1, 2, 3, 1, 3]);
        assert!(!sched.is_active());
        assert!(sched.timed_out());
    }

    #[test]
    fn test_bidi_fanout_retries_each_peer() {
        let mut sched = scheduler();
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        sched
            .enqueue_peer(MessageType::new(MSG_REMOTE), &[0x01, 0x05], peers(2), true)
            .unwrap();

        assert_eq!(
            drain(&mut sched, MASTER, &mut radio, &mut power),
            PollOutcome::TimedOut
        );
        // 3 attempts per peer, 3 rounds, 2 peers
        assert_eq!(radio.sent.len(), 18);
        assert_eq!(radio.sent[0].0.counter(), radio.sent[2].0.counter());
        assert_ne!(radio.sent[2].0.counter(), radio.sent[3].0.counter());
    }

    #[test]
    fn test_fanout_without_peers_goes_to_master() {
        let mut sched = scheduler();
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        sched
            .enqueue_peer(MessageType::new(MSG_REMOTE), &[0x01, 0x05], peers(0), false)
            .unwrap();

        assert_eq!(sched.poll(0, MASTER, &mut radio, &mut power), PollOutcome::Sent);
        assert_eq!(sched.mode(), SendMode::Pair);
        let frame = &radio.sent[0].0;
        assert_eq!(frame.receiver(), MASTER);
        assert!(frame.flags().contains(Flags::BIDI));
    }

    #[test]
    fn test_payload_too_long_is_refused() {
        let mut sched = scheduler();
        assert_eq!(
            sched.enqueue_pair(
                MessageType::with_subtype(MSG_ACK, ACK_PLAIN),
                &[0u8; MAX_PAYLOAD_LEN],
                Flags::NONE
            ),
            Err(EngineError::PayloadTooLong(MAX_PAYLOAD_LEN + 1))
        );
        assert!(!sched.is_active());
    }

    #[test]
    fn test_cancel_drops_message() {
        let mut sched = scheduler();
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        sched
            .enqueue_pair(MessageType::new(MSG_DEVICE_INFO), &[0x01], Flags::NONE)
            .unwrap();
        assert_eq!(sched.poll(0, MASTER, &mut radio, &mut power), PollOutcome::Sent);
        assert_eq!(sched.retry_count(), 1);
        sched.cancel();
        assert_eq!(sched.poll(1_000, MASTER, &mut radio, &mut power), PollOutcome::Idle);
        assert_eq!(radio.sent.len(), 1);
    }
}
