//! Hybrid-ARQ process bookkeeping.
//!
//! Each UE owns one [`HarqEntity`] per cell, holding fixed arrays of DL and
//! UL processes. A process cycles through
//! `Empty -> WaitingAck -> (PendingRetx -> WaitingAck)* -> Empty`, toggling
//! its NDI on every new transmission and discarding the packet once
//! `max_retx` retransmissions have gone unacknowledged.

use gnb_ran::prb::PrbInterval;
use gnb_ran::rnti::Rnti;
use gnb_ran::slot::SlotPoint;
use tracing::warn;

/// Upper bound on HARQ processes per direction (TS 38.331 nrofHARQ-Processes).
pub const MAX_NOF_HARQS: usize = 16;

/// Redundancy-version sequence applied across retransmissions.
const RV_SEQ: [u8; 4] = [0, 2, 3, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarqState {
    Empty,
    PendingRetx,
    WaitingAck,
}

/// Downlink Control Information fields filled by the HARQ process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DciInfo {
    pub pid: u8,
    pub mcs: u8,
    pub ndi: bool,
    pub rv: u8,
}

/// A single HARQ process.
#[derive(Debug, Clone)]
pub struct HarqProcess {
    pid: u8,
    state: HarqState,
    ndi: bool,
    n_rtx: u8,
    max_retx: u8,
    mcs: u8,
    tbs: u32,
    prbs: PrbInterval,
    slot_tx: Option<SlotPoint>,
    slot_ack: Option<SlotPoint>,
}

impl HarqProcess {
    pub fn new(pid: u8) -> Self {
        Self {
            pid,
            state: HarqState::Empty,
            ndi: false,
            n_rtx: 0,
            max_retx: 0,
            mcs: 0,
            tbs: 0,
            prbs: PrbInterval::default(),
            slot_tx: None,
            slot_ack: None,
        }
    }

    pub fn pid(&self) -> u8 {
        self.pid
    }

    pub fn state(&self) -> HarqState {
        self.state
    }

    pub fn empty(&self) -> bool {
        self.state == HarqState::Empty
    }

    pub fn has_pending_retx(&self) -> bool {
        self.state == HarqState::PendingRetx
    }

    pub fn ndi(&self) -> bool {
        self.ndi
    }

    pub fn nof_retx(&self) -> u8 {
        self.n_rtx
    }

    pub fn max_nof_retx(&self) -> u8 {
        self.max_retx
    }

    pub fn mcs(&self) -> u8 {
        self.mcs
    }

    pub fn tbs(&self) -> u32 {
        self.tbs
    }

    pub fn prbs(&self) -> PrbInterval {
        self.prbs
    }

    pub fn harq_slot_tx(&self) -> Option<SlotPoint> {
        self.slot_tx
    }

    pub fn harq_slot_ack(&self) -> Option<SlotPoint> {
        self.slot_ack
    }

    /// Starts a new transmission. The process must be empty. The NDI is
    /// toggled, the retransmission counter cleared, and `dci` filled with
    /// RV 0.
    pub fn new_tx(
        &mut self,
        slot_tx: SlotPoint,
        slot_ack: SlotPoint,
        grant: PrbInterval,
        mcs: u8,
        max_retx: u8,
        dci: &mut DciInfo,
    ) -> bool {
        if !self.empty() {
            return false;
        }
        self.state = HarqState::WaitingAck;
        self.ndi = !self.ndi;
        self.n_rtx = 0;
        self.max_retx = max_retx;
        self.mcs = mcs;
        self.prbs = grant;
        self.slot_tx = Some(slot_tx);
        self.slot_ack = Some(slot_ack);
        self.fill_dci(dci);
        true
    }

    /// Starts a retransmission. The process must be pending one. The NDI is
    /// kept; the RV follows the 0, 2, 3, 1 sequence.
    pub fn new_retx(
        &mut self,
        slot_tx: SlotPoint,
        slot_ack: SlotPoint,
        grant: PrbInterval,
        dci: &mut DciInfo,
    ) -> bool {
        if self.state != HarqState::PendingRetx {
            return false;
        }
        self.state = HarqState::WaitingAck;
        self.n_rtx += 1;
        self.prbs = grant;
        self.slot_tx = Some(slot_tx);
        self.slot_ack = Some(slot_ack);
        self.fill_dci(dci);
        true
    }

    /// Feedback for the outstanding transmission. Positive feedback empties
    /// the process; negative feedback queues a retransmission until
    /// `max_retx` is exhausted, at which point the packet is discarded.
    pub fn ack_info(&mut self, ack: bool) -> HarqState {
        debug_assert_eq!(self.state, HarqState::WaitingAck);
        self.state = if ack {
            HarqState::Empty
        } else if self.n_rtx < self.max_retx {
            HarqState::PendingRetx
        } else {
            warn!(
                "discarding HARQ packet after max retransmissions. pid={} max_retx={}",
                self.pid, self.max_retx
            );
            HarqState::Empty
        };
        self.state
    }

    /// Advances the process clock. A transmission whose ACK slot has passed
    /// without feedback counts as NACKed.
    pub fn new_slot(&mut self, slot_rx: SlotPoint) {
        if self.state == HarqState::WaitingAck {
            if let Some(slot_ack) = self.slot_ack {
                if slot_rx > slot_ack {
                    self.ack_info(false);
                }
            }
        }
    }

    pub fn reset(&mut self) {
        let pid = self.pid;
        *self = Self::new(pid);
    }

    /// Sets the transport-block size. Only valid before the first
    /// transmission of the TB is dispatched.
    pub fn set_tbs(&mut self, tbs: u32) {
        self.tbs = tbs;
    }

    pub fn set_mcs(&mut self, mcs: u8) {
        self.mcs = mcs;
    }

    fn fill_dci(&self, dci: &mut DciInfo) {
        dci.pid = self.pid;
        dci.mcs = self.mcs;
        dci.ndi = self.ndi;
        dci.rv = RV_SEQ[self.n_rtx as usize % RV_SEQ.len()];
    }
}

/// DL and UL HARQ processes of one UE on one cell.
pub struct HarqEntity {
    rnti: Rnti,
    slot_rx: Option<SlotPoint>,
    dl_harqs: Vec<HarqProcess>,
    ul_harqs: Vec<HarqProcess>,
}

impl HarqEntity {
    pub fn new(rnti: Rnti, nof_harq_procs: usize) -> Self {
        assert!(nof_harq_procs > 0 && nof_harq_procs <= MAX_NOF_HARQS);
        Self {
            rnti,
            slot_rx: None,
            dl_harqs: (0..nof_harq_procs as u8).map(HarqProcess::new).collect(),
            ul_harqs: (0..nof_harq_procs as u8).map(HarqProcess::new).collect(),
        }
    }

    pub fn rnti(&self) -> Rnti {
        self.rnti
    }

    /// Slot the entity was last advanced to.
    pub fn slot_rx(&self) -> Option<SlotPoint> {
        self.slot_rx
    }

    pub fn nof_dl_harqs(&self) -> usize {
        self.dl_harqs.len()
    }

    pub fn nof_ul_harqs(&self) -> usize {
        self.ul_harqs.len()
    }

    pub fn dl_harq(&self, pid: u8) -> Option<&HarqProcess> {
        self.dl_harqs.get(pid as usize)
    }

    pub fn ul_harq(&self, pid: u8) -> Option<&HarqProcess> {
        self.ul_harqs.get(pid as usize)
    }

    pub fn dl_harq_mut(&mut self, pid: u8) -> Option<&mut HarqProcess> {
        self.dl_harqs.get_mut(pid as usize)
    }

    pub fn ul_harq_mut(&mut self, pid: u8) -> Option<&mut HarqProcess> {
        self.ul_harqs.get_mut(pid as usize)
    }

    /// Advances every process and converts missed ACK slots into NACKs.
    pub fn new_slot(&mut self, slot_rx: SlotPoint) {
        self.slot_rx = Some(slot_rx);
        for h in self.dl_harqs.iter_mut().chain(self.ul_harqs.iter_mut()) {
            h.new_slot(slot_rx);
        }
    }

    /// DL HARQ feedback. Unknown PIDs and processes not waiting for an ACK
    /// are ignored with a warning.
    pub fn dl_ack_info(&mut self, pid: u8, tb_idx: u8, ack: bool) -> Option<HarqState> {
        let _ = tb_idx; // single-TB processes
        let rnti = self.rnti;
        match self.dl_harqs.get_mut(pid as usize) {
            Some(h) if h.state() == HarqState::WaitingAck => Some(h.ack_info(ack)),
            Some(_) => {
                warn!("DL HARQ feedback for process not waiting for ACK. rnti={rnti} pid={pid}");
                None
            }
            None => {
                warn!("DL HARQ feedback for unknown process. rnti={rnti} pid={pid}");
                None
            }
        }
    }

    /// UL CRC feedback, with the same ignore rules as [`Self::dl_ack_info`].
    pub fn ul_crc_info(&mut self, pid: u8, ack: bool) -> Option<HarqState> {
        let rnti = self.rnti;
        match self.ul_harqs.get_mut(pid as usize) {
            Some(h) if h.state() == HarqState::WaitingAck => Some(h.ack_info(ack)),
            Some(_) => {
                warn!("UL CRC feedback for process not waiting for ACK. rnti={rnti} pid={pid}");
                None
            }
            None => {
                warn!("UL CRC feedback for unknown process. rnti={rnti} pid={pid}");
                None
            }
        }
    }

    pub fn find_empty_dl_harq(&mut self) -> Option<&mut HarqProcess> {
        self.dl_harqs.iter_mut().find(|h| h.empty())
    }

    pub fn find_empty_ul_harq(&mut self) -> Option<&mut HarqProcess> {
        self.ul_harqs.iter_mut().find(|h| h.empty())
    }

    pub fn find_pending_dl_retx(&mut self) -> Option<&mut HarqProcess> {
        self.dl_harqs.iter_mut().find(|h| h.has_pending_retx())
    }

    pub fn find_pending_ul_retx(&mut self) -> Option<&mut HarqProcess> {
        self.ul_harqs.iter_mut().find(|h| h.has_pending_retx())
    }
}
