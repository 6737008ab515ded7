//! Slice-wise transfer of configuration answers.
//!
//! Peer tables and register lists are usually larger than one frame. The
//! central asks once, gets an `ACK`, and then receives the answer as a series
//! of `INFO` frames ("slices"), each sent to the master once the scheduler is
//! free and the inter-slice delay has passed. An unpaired node has no master
//! yet and sends them to the requester instead; slices are never broadcast.
//! The last slice carries `WKMEUP` so the master does not have to poll for
//! more.
//!
//! | kind | slice content | slices |
//! |------|---------------|--------|
//! | [`SliceKind::PeerList`] | up to 4 peer entries, a zero entry once the table is exhausted | `used / 4 + 1` |
//! | [`SliceKind::ParamPairs`] | up to 8 register/value pairs, then `00 00` | `ceil(len / 8) + 1` |
//! | [`SliceKind::ParamSequential`] | start register plus up to 15 consecutive values, then `00 00` | `runs + 1` |

use heapless::Vec;

use crate::config::SliceConfig;
use crate::consts::{
    INFO_PARAM_RESPONSE_PAIRS, INFO_PARAM_RESPONSE_SEQ, INFO_PEER_LIST, MAX_PAYLOAD_LEN, MSG_INFO,
    PAIRS_PER_SLICE, PEER_ENTRY_LEN, PEERS_PER_SLICE, SEQ_VALUES_PER_SLICE,
};
use crate::error::{EngineError, StoreError};
use crate::hal::Backing;
use crate::message::{Address, Flags, MessageType};
use crate::peer::PeerTable;
use crate::scheduler::SendScheduler;
use crate::store::{ListDef, RegisterStore};
use crate::timer::WaitTimer;

/// Shape of a multi-frame answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SliceKind {
    /// `INFO_PEER_LIST`: the peer table of a channel.
    PeerList,
    /// `INFO_PARAM_RESPONSE_PAIRS`: a list as register/value pairs.
    ParamPairs,
    /// `INFO_PARAM_RESPONSE_SEQ`: a list as runs of consecutive registers.
    ParamSequential,
}

impl SliceKind {
    fn message_type(self) -> MessageType {
        let subtype = match self {
            SliceKind::PeerList => INFO_PEER_LIST,
            SliceKind::ParamPairs => INFO_PARAM_RESPONSE_PAIRS,
            SliceKind::ParamSequential => INFO_PARAM_RESPONSE_SEQ,
        };
        MessageType::with_subtype(MSG_INFO, subtype)
    }
}

/// Stateful generator of one multi-frame answer.
#[derive(Debug)]
pub struct SliceTransfer {
    config: SliceConfig,
    active: bool,
    kind: SliceKind,
    requester: Address,
    channel: u8,
    list: u8,
    peer_index: u8,
    current: u8,
    total: u8,
    timer: WaitTimer,
}

/// Runs of consecutive register addresses as `(offset, len)`, each at most
/// [`SEQ_VALUES_PER_SLICE`] long.
fn sequential_runs(def: &ListDef) -> impl Iterator<Item = (usize, usize)> + '_ {
    let regs = def.registers;
    let mut start = 0;
    core::iter::from_fn(move || {
        if start >= regs.len() {
            return None;
        }
        let mut end = start + 1;
        while end < regs.len()
            && end - start < SEQ_VALUES_PER_SLICE
            && regs[end] == regs[end - 1].wrapping_add(1)
        {
            end += 1;
        }
        let run = (start, end - start);
        start = end;
        Some(run)
    })
}

impl SliceTransfer {
    /// An inactive controller.
    pub const fn new(config: SliceConfig) -> Self {
        Self {
            config,
            active: false,
            kind: SliceKind::PeerList,
            requester: Address::BROADCAST,
            channel: 0,
            list: 0,
            peer_index: 0,
            current: 0,
            total: 0,
            timer: WaitTimer::new(),
        }
    }

    /// `true` while slices remain to be sent.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Kind of the running answer.
    pub fn kind(&self) -> SliceKind {
        self.kind
    }

    /// Channel whose peer table or list is being sent.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Index of the next slice and the total slice count.
    pub fn progress(&self) -> (u8, u8) {
        (self.current, self.total)
    }

    /// Starts sending the peer table of `channel` on behalf of `requester`.
    pub fn start_peer_list(&mut self, now: u32, requester: Address, channel: u8, peers: &PeerTable) {
        let total = peers.used_slot_count() / PEERS_PER_SLICE + 1;
        self.requester = requester;
        self.begin(now, SliceKind::PeerList, channel, 0, 0, total);
    }

    /// Starts sending `list` of `channel` for `peer_index`.
    ///
    /// # Arguments
    /// - `requester`: receives the slices while the node is unpaired
    /// - `kind`: [`SliceKind::ParamPairs`] or [`SliceKind::ParamSequential`]
    #[allow(clippy::too_many_arguments)]
    pub fn start_params<B: Backing>(
        &mut self,
        now: u32,
        requester: Address,
        kind: SliceKind,
        store: &RegisterStore<B>,
        channel: u8,
        list: u8,
        peer_index: u8,
    ) -> Result<(), StoreError> {
        let def = store.list_def(channel, list)?;
        if def.is_peer_list() && peer_index >= store.peer_max(channel) {
            return Err(StoreError::PeerIndex(peer_index));
        }
        let chunks = match kind {
            SliceKind::ParamSequential => sequential_runs(def).count(),
            _ => def.len().div_ceil(PAIRS_PER_SLICE),
        };
        let kind = match kind {
            SliceKind::PeerList => SliceKind::ParamPairs,
            other => other,
        };
        self.requester = requester;
        self.begin(now, kind, channel, list, peer_index, chunks + 1);
        Ok(())
    }

    fn begin(
        &mut self,
        now: u32,
        kind: SliceKind,
        channel: u8,
        list: u8,
        peer_index: u8,
        total: usize,
    ) {
        if self.active {
            debug!("replacing running slice transfer");
        }
        self.active = true;
        self.kind = kind;
        self.channel = channel;
        self.list = list;
        self.peer_index = peer_index;
        self.current = 0;
        self.total = total.min(usize::from(u8::MAX)) as u8;
        self.timer.set(now, u32::from(self.config.slice_delay_ms));
        debug!(
            "slice transfer {:?} channel {} list {}: {} slices",
            kind, channel, list, self.total
        );
    }

    /// Stops the transfer.
    pub fn cancel(&mut self) {
        self.active = false;
        self.timer.clear();
    }

    /// Renders slice `index` of the running answer.
    pub fn render<B: Backing>(
        &self,
        index: u8,
        store: &mut RegisterStore<B>,
        peers: &PeerTable,
    ) -> Result<Vec<u8, MAX_PAYLOAD_LEN>, StoreError> {
        let mut out: Vec<u8, MAX_PAYLOAD_LEN> = Vec::new();
        let index = usize::from(index);
        match self.kind {
            SliceKind::PeerList => {
                let mut count = 0;
                let entries = peers
                    .iter()
                    .skip(index * PEERS_PER_SLICE)
                    .take(PEERS_PER_SLICE);
                for (_, entry) in entries {
                    let _ = out.extend_from_slice(&entry.to_bytes());
                    count += 1;
                }
                if count < PEERS_PER_SLICE {
                    let _ = out.extend_from_slice(&[0u8; PEER_ENTRY_LEN]);
                }
            }
            SliceKind::ParamPairs | SliceKind::ParamSequential
                if index + 1 >= usize::from(self.total) =>
            {
                let _ = out.extend_from_slice(&[0x00, 0x00]);
            }
            SliceKind::ParamPairs => {
                let def = self.load(store)?;
                let values = store.values(self.channel, self.list)?;
                let start = index * PAIRS_PER_SLICE;
                for (reg, value) in def
                    .registers
                    .iter()
                    .zip(values)
                    .skip(start)
                    .take(PAIRS_PER_SLICE)
                {
                    let _ = out.extend_from_slice(&[*reg, *value]);
                }
            }
            SliceKind::ParamSequential => {
                let def = self.load(store)?;
                let values = store.values(self.channel, self.list)?;
                if let Some((start, len)) = sequential_runs(def).nth(index) {
                    let _ = out.push(def.registers[start]);
                    let _ = out.extend_from_slice(&values[start..(start + len).min(values.len())]);
                }
            }
        }
        Ok(out)
    }

    fn load<B: Backing>(
        &self,
        store: &mut RegisterStore<B>,
    ) -> Result<&'static ListDef, StoreError> {
        let def = store.list_def(self.channel, self.list)?;
        store.load(self.channel, self.list, self.peer_index)?;
        Ok(def)
    }

    /// Hands the next slice to the scheduler once it is idle and the
    /// inter-slice delay has passed.
    ///
    /// # Arguments
    /// - `master`: paired master, broadcast while unpaired
    ///
    /// # Returns
    /// - `Ok(true)` if a slice was queued
    pub fn poll<B: Backing>(
        &mut self,
        now: u32,
        master: Address,
        scheduler: &mut SendScheduler,
        store: &mut RegisterStore<B>,
        peers: &PeerTable,
    ) -> Result<bool, EngineError> {
        if !self.active || scheduler.is_active() || !self.timer.elapsed(now) {
            return Ok(false);
        }
        let payload = match self.render(self.current, store, peers) {
            Ok(payload) => payload,
            Err(e) => {
                self.cancel();
                return Err(e.into());
            }
        };
        let last = self.current + 1 >= self.total;
        let flags = if last { Flags::WKMEUP } else { Flags::NONE };
        let to = if master.is_broadcast() {
            self.requester
        } else {
            master
        };
        scheduler.enqueue_directed(to, self.kind.message_type(), &payload, flags)?;
        trace!("slice {} of {} queued", self.current + 1, self.total);

        self.current += 1;
        self.timer.set(now, u32::from(self.config.slice_delay_ms));
        if self.current >= self.total {
            self.active = false;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::consts::LIST_PEER_SENSOR;
    use crate::hal::MemoryBacking;
    use crate::message::Frame;
    use crate::peer::PeerEntry;
    use crate::scheduler::PollOutcome;
    use crate::store::ChannelLayout;
    use crate::testing::{MockPower, MockRadio};

    const LOCAL: Address = Address::new([0x1f, 0xb7, 0x4a]);
    const MASTER: Address = Address::new([0x63, 0x19, 0x63]);

    static LIST0: ListDef = ListDef::new(0, &[0x02, 0x0a, 0x0b, 0x0c], &[0x80, 0x00, 0x00, 0x00]);
    static LIST1: ListDef = ListDef::new(
        1,
        &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x20, 0x21],
        &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
    );
    static LIST4: ListDef = ListDef::new(4, &[0x01], &[0x00]);

    fn store() -> RegisterStore<MemoryBacking<128>> {
        let layouts = [
            ChannelLayout {
                channel_list: &LIST0,
                peer_list: None,
                peer_max: 0,
            },
            ChannelLayout {
                channel_list: &LIST1,
                peer_list: Some(&LIST4),
                peer_max: 12,
            },
        ];
        let mut store = RegisterStore::new(MemoryBacking::new(), &layouts);
        let _ = store.open().unwrap();
        store
    }

    fn table(count: u8) -> PeerTable {
        let mut table = PeerTable::new(12);
        for slot in 0..count {
            table
                .set(slot, PeerEntry::new(Address::new([0x30, 0x00, slot + 1]), 1))
                .unwrap();
        }
        table
    }

    /// Runs slice transfer and scheduler to completion and returns every
    /// frame that went out.
    fn run(
        slices: &mut SliceTransfer,
        store: &mut RegisterStore<MemoryBacking<128>>,
        peers: &PeerTable,
    ) -> MockRadio {
        let mut sched = SendScheduler::new(LOCAL, SchedulerConfig::default());
        let mut radio = MockRadio::new();
        let mut power = MockPower::default();
        let mut now = 0;
        for _ in 0..200 {
            let _ = slices.poll(now, MASTER, &mut sched, store, peers).unwrap();
            if sched.poll(now, MASTER, &mut radio, &mut power) == PollOutcome::Sent {
                let frame = sched.in_flight().unwrap();
                let (receiver, counter) = (frame.receiver(), frame.counter());
                let _ = sched.on_ack(receiver, counter);
            }
            if !slices.is_active() && !sched.is_active() {
                break;
            }
            now += 60;
        }
        radio
    }

    #[test]
    fn test_ten_peers_make_three_slices() {
        let mut slices = SliceTransfer::new(SliceConfig::default());
        let mut store = store();
        let peers = table(10);
        slices.start_peer_list(0, MASTER, 1, &peers);
        assert_eq!(slices.progress(), (0, 3));

        let radio = run(&mut slices, &mut store, &peers);
        let frames: Vec<&Frame, 8> = radio.sent_frames().collect();
        assert_eq!(frames.len(), 3);
        let ty = SliceKind::PeerList.message_type();
        assert_eq!(frames[0].body(ty).len(), 16);
        assert_eq!(frames[1].body(ty).len(), 16);
        assert_eq!(frames[2].body(ty), &[0x30, 0x00, 0x09, 0x01, 0x30, 0x00, 0x0a, 0x01, 0, 0, 0, 0]);
        assert!(frames.iter().all(|f| f.receiver() == MASTER));
        assert!(!frames[1].flags().contains(Flags::WKMEUP));
        assert!(frames[2].flags().contains(Flags::WKMEUP));
    }

    #[test]
    fn test_full_slices_get_terminator_slice() {
        let mut slices = SliceTransfer::new(SliceConfig::default());
        let peers = table(8);
        slices.start_peer_list(0, MASTER, 1, &peers);
        assert_eq!(slices.progress(), (0, 3));
        let mut store = store();
        let last = slices.render(2, &mut store, &peers).unwrap();
        assert_eq!(&last[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_empty_peer_list_is_one_terminator() {
        let mut slices = SliceTransfer::new(SliceConfig::default());
        let mut store = store();
        let peers = table(0);
        slices.start_peer_list(0, MASTER, 1, &peers);
        let radio = run(&mut slices, &mut store, &peers);
        assert_eq!(radio.sent.len(), 1);
        let ty = SliceKind::PeerList.message_type();
        assert_eq!(radio.sent[0].0.body(ty), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_param_pairs_end_with_zero_terminator() {
        let mut slices = SliceTransfer::new(SliceConfig::default());
        let mut store = store();
        let peers = table(0);
        slices
            .start_params(0, MASTER, SliceKind::ParamPairs, &store, 1, 1, 0)
            .unwrap();
        assert_eq!(slices.progress(), (0, 3));

        let radio = run(&mut slices, &mut store, &peers);
        let ty = SliceKind::ParamPairs.message_type();
        let frames: Vec<&Frame, 8> = radio.sent_frames().collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0].body(ty)[..4], &[0x01, 1, 0x02, 2]);
        assert_eq!(frames[1].body(ty), &[0x09, 9, 0x0a, 10, 0x20, 11, 0x21, 12]);
        assert_eq!(frames[2].body(ty), &[0x00, 0x00]);
    }

    #[test]
    fn test_exact_multiple_still_gets_terminator() {
        let mut slices = SliceTransfer::new(SliceConfig::default());
        let store = store();
        slices
            .start_params(0, MASTER, SliceKind::ParamPairs, &store, 0, 0, 0)
            .unwrap();
        // 4 registers fit one slice, plus the terminator
        assert_eq!(slices.progress(), (0, 2));
    }

    #[test]
    fn test_param_sequential_runs() {
        let mut slices = SliceTransfer::new(SliceConfig::default());
        let mut store = store();
        let peers = table(0);
        slices
            .start_params(0, MASTER, SliceKind::ParamSequential, &store, 1, 1, 0)
            .unwrap();
        assert_eq!(slices.progress(), (0, 3));
        assert_eq!(
            &slices.render(0, &mut store, &peers).unwrap()[..],
            &[0x01, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10]
        );
        assert_eq!(&slices.render(1, &mut store, &peers).unwrap()[..], &[0x20, 11, 12]);
        assert_eq!(&slices.render(2, &mut store, &peers).unwrap()[..], &[0x00, 0x00]);
    }

    #[test]
    fn test_peer_list_params_use_peer_block() {
        let mut slices = SliceTransfer::new(SliceConfig::default());
        let mut store = store();
        let peers = table(3);
        store
            .write_subset(1, LIST_PEER_SENSOR, 2, 0, &[0x01])
            .unwrap();
        slices
            .start_params(0, MASTER, SliceKind::ParamPairs, &store, 1, LIST_PEER_SENSOR, 2)
            .unwrap();
        assert_eq!(&slices.render(0, &mut store, &peers).unwrap()[..], &[0x01, 0x01]);
        assert_eq!(
            slices.start_params(0, MASTER, SliceKind::ParamPairs, &store, 1, LIST_PEER_SENSOR, 12),
            Err(StoreError::PeerIndex(12))
        );
    }

    #[test]
    fn test_waits_for_scheduler_and_delay() {
        let mut slices = SliceTransfer::new(SliceConfig::default());
        let mut store = store();
        let peers = table(1);
        let mut sched = SendScheduler::new(LOCAL, SchedulerConfig::default());
        slices.start_peer_list(100, MASTER, 1, &peers);

        assert_eq!(slices.poll(120, MASTER, &mut sched, &mut store, &peers), Ok(false));
        sched
            .enqueue_pair(MessageType::new(0x40), &[0x01], Flags::NONE)
            .unwrap();
        assert_eq!(slices.poll(200, MASTER, &mut sched, &mut store, &peers), Ok(false));
        sched.cancel();
        assert_eq!(slices.poll(200, MASTER, &mut sched, &mut store, &peers), Ok(true));
        assert!(!slices.is_active());
        assert_eq!(slices.kind(), SliceKind::PeerList);
    }
}
