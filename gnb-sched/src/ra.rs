//! Random-access scheduler: answers PRACH preamble detections with RAR
//! PDSCH grants and paired Msg3 PUSCH grants inside the TS 38.321 response
//! window.

use crate::config::{CellConfig, PuschTimeDomainAlloc};
use crate::grid::CellResourceAllocator;
use crate::harq::{DciInfo, HarqProcess};
use crate::result::{Msg3Information, UlSchedInfo, MAX_MSG3_LIST};
use gnb_ran::prb::{find_empty_interval_of_length, PrbInterval};
use gnb_ran::rnti::Rnti;
use gnb_ran::slot::SlotPoint;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of concurrent pending Msg3s per cell.
pub const MAX_NOF_MSG3: usize = 1024;

// TODO: take the PRACH duration from the RACH configuration.
const PRACH_DURATION_SLOTS: u32 = 1;

const NOF_PRBS_PER_RAR: u16 = 4;
const NOF_PRBS_PER_MSG3: u16 = 3;
const MAX_MSG3_RETXS: u8 = 4;
const MSG3_MCS: u8 = 0;

/// A PRACH preamble detection reported by the MAC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RachIndication {
    /// TC-RNTI allocated for the UE.
    pub crnti: Rnti,
    /// Slot in which the preamble was received.
    pub slot_rx: SlotPoint,
    /// First OFDM symbol of the PRACH occasion (0..14).
    pub symbol_index: u8,
    /// PRACH frequency occasion (0..8).
    pub frequency_index: u8,
    pub preamble_id: u8,
    pub timing_advance: u16,
    /// Detection on the supplementary uplink carrier.
    pub is_sul: bool,
}

/// RA-RNTI derivation (TS 38.321 Sec. 5.1.3):
///
/// `RA-RNTI = 1 + s_id + 14 * t_id + 14 * 80 * f_id + 14 * 80 * 8 * ul_carrier_id`
///
/// with `s_id` the first PRACH OFDM symbol, `t_id` the first PRACH slot
/// within the frame, `f_id` the frequency occasion and `ul_carrier_id` 0
/// for NUL and 1 for SUL.
pub fn get_ra_rnti(rach_ind: &RachIndication) -> Rnti {
    let ra_rnti = 1
        + rach_ind.symbol_index as u32
        + 14 * rach_ind.slot_rx.slot_index()
        + 14 * 80 * rach_ind.frequency_index as u32
        + 14 * 80 * 8 * rach_ind.is_sul as u32;
    Rnti(ra_rnti as u16)
}

/// Msg3 slot delay for a PUSCH time-domain allocation (TS 38.214
/// Sec. 6.1.2.1): `k2 + Delta`, with Delta from Table 6.1.2.1.1-5 for the
/// PUSCH numerology. Assumes the PUSCH and PDCCH numerologies match.
pub fn get_msg3_delay(pusch_td_alloc: &PuschTimeDomainAlloc, numerology: u8) -> u32 {
    const DELTAS: [u8; 4] = [2, 3, 4, 6];
    pusch_td_alloc.k2 as u32 + DELTAS[numerology as usize] as u32
}

struct PendingRar {
    ra_rnti: Rnti,
    prach_slot_rx: SlotPoint,
    /// RAR window `[start, stop)`, computed once at insertion.
    rar_window: (SlotPoint, SlotPoint),
    tc_rntis: SmallVec<[Rnti; MAX_MSG3_LIST]>,
}

struct PendingMsg3 {
    ind_msg: Option<RachIndication>,
    msg3_harq: HarqProcess,
}

/// Scheduler for RAR and Msg3 of one cell.
pub struct RaScheduler {
    cfg: Arc<CellConfig>,
    ra_win_nof_slots: u16,
    /// Ordered by PRACH slot; insertion order preserves it.
    pending_rars: VecDeque<PendingRar>,
    /// Indexed by TC-RNTI modulo [`MAX_NOF_MSG3`].
    pending_msg3s: Vec<PendingMsg3>,
}

impl RaScheduler {
    pub fn new(cfg: Arc<CellConfig>) -> Self {
        let ra_win_nof_slots = cfg.ra_resp_window_slots;
        let pending_msg3s = (0..MAX_NOF_MSG3)
            .map(|_| PendingMsg3 {
                ind_msg: None,
                msg3_harq: HarqProcess::new(0),
            })
            .collect();
        Self {
            cfg,
            ra_win_nof_slots,
            pending_rars: VecDeque::new(),
            pending_msg3s,
        }
    }

    /// The Msg3 HARQ process of a TC-RNTI; non-empty while its Msg3 is
    /// outstanding.
    pub fn msg3_harq(&self, crnti: Rnti) -> &HarqProcess {
        &self.pending_msg3s[crnti.to_u16() as usize % MAX_NOF_MSG3].msg3_harq
    }

    pub fn msg3_harq_mut(&mut self, crnti: Rnti) -> &mut HarqProcess {
        &mut self.pending_msg3s[crnti.to_u16() as usize % MAX_NOF_MSG3].msg3_harq
    }

    /// Enqueues a RACH indication. Returns false when the detection is
    /// rejected (TC-RNTI collision or a full RAR).
    pub fn handle_rach_indication(&mut self, msg: RachIndication) -> bool {
        let ra_rnti = get_ra_rnti(&msg);

        info!(
            "SCHED: new PRACH. slot={} preamble={} ra_rnti={} temp_crnti={} ta={}",
            msg.slot_rx, msg.preamble_id, ra_rnti, msg.crnti, msg.timing_advance
        );

        // Check if the TC-RNTI to be scheduled is already under use.
        let msg3_idx = msg.crnti.to_u16() as usize % MAX_NOF_MSG3;
        if !self.pending_msg3s[msg3_idx].msg3_harq.empty() {
            warn!(
                "PRACH ignored, allocated TC-RNTI={} is already under use",
                msg.crnti
            );
            return false;
        }

        // Aggregate into a pending RAR with the same occasion, if any.
        let mut rar_found = false;
        for r in self.pending_rars.iter_mut() {
            if r.prach_slot_rx == msg.slot_rx && r.ra_rnti == ra_rnti {
                if r.tc_rntis.len() >= MAX_MSG3_LIST {
                    warn!("PRACH ignored, maximum number of RAR grants reached");
                    return false;
                }
                r.tc_rntis.push(msg.crnti);
                rar_found = true;
                break;
            }
        }

        if !rar_found {
            // The window opens at the first DL-enabled slot after the
            // PRACH; for TDD the search walks one TDD period.
            let search_span = match &self.cfg.tdd {
                Some(tdd) => tdd.nof_slots_per_period() as u32,
                None => 1,
            };
            let mut rar_window = None;
            for sl_idx in 0..search_span {
                let sl_start = msg.slot_rx + PRACH_DURATION_SLOTS + sl_idx;
                if self.cfg.is_dl_enabled(sl_start) {
                    rar_window = Some((sl_start, sl_start + self.ra_win_nof_slots as u32));
                    break;
                }
            }
            let Some(rar_window) = rar_window else {
                warn!("PRACH ignored, no DL-enabled slot for the RAR window");
                return false;
            };
            let mut tc_rntis = SmallVec::new();
            tc_rntis.push(msg.crnti);
            self.pending_rars.push_back(PendingRar {
                ra_rnti,
                prach_slot_rx: msg.slot_rx,
                rar_window,
                tc_rntis,
            });
        }

        // Store the Msg3 to allocate.
        self.pending_msg3s[msg3_idx].ind_msg = Some(msg);
        true
    }

    /// Allocates pending RARs and their Msg3 grants for the slot under
    /// scheduling.
    pub fn run_slot(&mut self, res_alloc: &mut CellResourceAllocator) {
        let pdcch_slot = res_alloc.slot_tx();

        // RAR needs PDCCH and PDSCH in this slot.
        if !self.cfg.is_dl_enabled(pdcch_slot) {
            return;
        }

        // And at least one PUSCH time-domain allocation with an UL-enabled
        // Msg3 slot.
        let pusch_slots_available = self.cfg.pusch_td_alloc_list.iter().any(|pusch_td| {
            let msg3_slot = pdcch_slot + get_msg3_delay(pusch_td, self.cfg.numerology);
            self.cfg.is_ul_enabled(msg3_slot)
        });
        if !pusch_slots_available {
            return;
        }

        let mut idx = 0;
        while idx < self.pending_rars.len() {
            let (win_start, win_stop) = self.pending_rars[idx].rar_window;

            // Outside the RAR window: discard if passed, stop if not yet
            // open (pending RARs are ordered by PRACH slot).
            if pdcch_slot < win_start {
                return;
            }
            if pdcch_slot >= win_stop {
                let rar = &self.pending_rars[idx];
                warn!(
                    "SCHED: could not transmit RAR within the window=[{}, {}), prach_slot={} slot_tx={}",
                    win_start, win_stop, rar.prach_slot_rx, pdcch_slot
                );
                self.pending_rars.remove(idx);
                continue;
            }

            let nof_allocs = self.allocate_rar(idx, res_alloc);
            debug_assert!(nof_allocs <= self.pending_rars[idx].tc_rntis.len());

            if nof_allocs == 0 {
                // Try the next pending RAR.
                idx += 1;
            } else if nof_allocs == self.pending_rars[idx].tc_rntis.len() {
                // Fully allocated; continue with the following RAR.
                self.pending_rars.remove(idx);
            } else {
                // Partially allocated: keep the remaining TC-RNTIs and stop
                // for this slot, resources are exhausted.
                self.pending_rars[idx].tc_rntis.drain(..nof_allocs);
                break;
            }
        }
    }

    /// Tries to allocate one RAR with as many Msg3 grants as resources
    /// allow. Returns the number of Msg3s placed.
    fn allocate_rar(&mut self, rar_idx: usize, res_alloc: &mut CellResourceAllocator) -> usize {
        let rar = &self.pending_rars[rar_idx];
        let ra_rnti = rar.ra_rnti;
        let pdcch_slot = res_alloc.slot_tx();

        // 1. Space in the DL result list for the RAR.
        if res_alloc.dl_res(0).rar_grants_full() {
            debug!("SCHED: RAR for ra_rnti={ra_rnti} postponed: no PDSCH space for RAR");
            return 0;
        }

        let mut max_nof_allocs = rar.tc_rntis.len();

        // 2. Pick a PUSCH time-domain allocation for Msg3: the first
        // candidate that fits at least one grant wins.
        let mut chosen: Option<(u32, PrbInterval)> = None;
        for pusch_td in &self.cfg.pusch_td_alloc_list {
            let msg3_delay = get_msg3_delay(pusch_td, self.cfg.numerology);
            if !self.cfg.is_ul_enabled(pdcch_slot + msg3_delay) {
                continue;
            }

            // 2a. Space in the UL result list.
            let mut n = max_nof_allocs.min(res_alloc.ul_res(msg3_delay).puschs_space());
            if n == 0 {
                continue;
            }

            // 2b. Contiguous UL PRBs for the Msg3s.
            let avail_ul = find_empty_interval_of_length(
                res_alloc.used_ul_prbs(msg3_delay),
                NOF_PRBS_PER_MSG3 * n as u16,
                0,
            );
            n = n.min((avail_ul.length() / NOF_PRBS_PER_MSG3) as usize);
            if n == 0 {
                continue;
            }

            max_nof_allocs = n;
            chosen = Some((msg3_delay, avail_ul));
            break;
        }
        let Some((msg3_delay, mut avail_ul_prbs)) = chosen else {
            debug!("SCHED: RAR for ra_rnti={ra_rnti} postponed: no space in PUSCH for Msg3");
            return 0;
        };

        // 3. Contiguous DL PRBs for the RAR PDSCH.
        let mut avail_dl_prbs = find_empty_interval_of_length(
            res_alloc.used_dl_prbs(0),
            NOF_PRBS_PER_RAR * max_nof_allocs as u16,
            0,
        );
        max_nof_allocs = max_nof_allocs.min((avail_dl_prbs.length() / NOF_PRBS_PER_RAR) as usize);
        if max_nof_allocs == 0 {
            debug!("SCHED: RAR for ra_rnti={ra_rnti} postponed: not enough PRBs for RAR");
            return 0;
        }

        avail_ul_prbs.resize_to(NOF_PRBS_PER_MSG3 * max_nof_allocs as u16);
        avail_dl_prbs.resize_to(NOF_PRBS_PER_RAR * max_nof_allocs as u16);

        self.fill_rar_grant(rar_idx, avail_dl_prbs, avail_ul_prbs, msg3_delay, max_nof_allocs, res_alloc);
        max_nof_allocs
    }

    fn fill_rar_grant(
        &mut self,
        rar_idx: usize,
        rar_prbs: PrbInterval,
        msg3_prbs: PrbInterval,
        msg3_delay: u32,
        nof_msg3_grants: usize,
        res_alloc: &mut CellResourceAllocator,
    ) {
        let rar_req = &self.pending_rars[rar_idx];
        let ra_rnti = rar_req.ra_rnti;
        let tc_rntis: SmallVec<[Rnti; MAX_MSG3_LIST]> =
            rar_req.tc_rntis[..nof_msg3_grants].iter().copied().collect();

        res_alloc.alloc_rar_grant(0, ra_rnti, rar_prbs);
        let msg3_slot = res_alloc.slot(msg3_delay);

        let mut last_msg3_start = msg3_prbs.start();
        for tc_rnti in tc_rntis {
            let msg3_req = &mut self.pending_msg3s[tc_rnti.to_u16() as usize % MAX_NOF_MSG3];
            debug_assert!(
                msg3_req.msg3_harq.empty(),
                "pending Msg3 should not have been added with a busy HARQ"
            );
            let ind_msg = msg3_req
                .ind_msg
                .as_ref()
                .expect("pending Msg3 without RACH indication");

            let prbs = PrbInterval::new(last_msg3_start, last_msg3_start + NOF_PRBS_PER_MSG3);
            last_msg3_start += NOF_PRBS_PER_MSG3;

            // Msg3 grant inside the RAR.
            let msg3_grant = Msg3Information {
                rapid: ind_msg.preamble_id,
                ta: ind_msg.timing_advance,
                temp_crnti: tc_rnti,
                prbs,
            };

            // PUSCH for the Msg3 reception.
            res_alloc.alloc_pusch(
                msg3_delay,
                UlSchedInfo {
                    crnti: tc_rnti,
                    prbs,
                    mcs: MSG3_MCS,
                },
            );

            // Msg3 UL HARQ.
            let mut msg3_dci = DciInfo::default();
            let ok = msg3_req.msg3_harq.new_tx(
                msg3_slot,
                msg3_slot,
                prbs,
                MSG3_MCS,
                MAX_MSG3_RETXS,
                &mut msg3_dci,
            );
            debug_assert!(ok, "unexpected HARQ allocation failure");

            res_alloc.last_rar_mut(0).grants.push(msg3_grant);
        }

        let rar = res_alloc.last_rar_mut(0);
        info!(
            "SCHED: RAR ra_rnti={} cell={} msg3s={}",
            rar.ra_rnti,
            rar.cell_index,
            rar.grants.len()
        );
    }
}
