//! Cell resource grid: a ring of per-slot PRB bitmaps and grant lists.
//!
//! The grid is the connective tissue between the producers running on the
//! cell executor. Its invariant: at no point does a bit set in a slot's
//! bitmap disagree with the PRBs claimed by the grants in that slot's
//! lists. All mutations go through the paired `alloc_*` helpers, which
//! update the bitmap and append the grant record together.

use crate::config::CellConfig;
use crate::result::{
    DlSchedInfo, DlSchedResult, RarInformation, SsbInformation, UlSchedInfo, UlSchedResult,
};
use gnb_ran::prb::{PrbBitmap, PrbInterval};
use gnb_ran::rnti::Rnti;
use gnb_ran::slot::SlotPoint;
use std::sync::Arc;

/// Ring length. Half of it must exceed the largest scheduling look-ahead
/// (the maximum DL to Msg3 delay).
pub const RESOURCE_GRID_SIZE: usize = 40;

/// Slots this far behind the current one are recycled.
const OLD_SLOT_DELAY: u32 = 10;

/// Scheduled information of one `{slot, cell}` pair.
#[derive(Debug, Clone)]
pub struct CellResourceGrid {
    pub dl_prbs: PrbBitmap,
    pub ul_prbs: PrbBitmap,
    pub dl: DlSchedResult,
    pub ul: UlSchedResult,
}

impl CellResourceGrid {
    fn new(cfg: &CellConfig) -> Self {
        Self {
            dl_prbs: PrbBitmap::new(cfg.nof_dl_prbs),
            ul_prbs: PrbBitmap::new(cfg.nof_ul_prbs),
            dl: DlSchedResult::default(),
            ul: UlSchedResult::default(),
        }
    }

    fn reset(&mut self) {
        self.dl_prbs.reset();
        self.ul_prbs.reset();
        self.dl.clear();
        self.ul.clear();
    }
}

/// Circular pool of [`CellResourceGrid`]s, indexed by slot.
pub struct CellResourceGridPool {
    cfg: Arc<CellConfig>,
    last_sl_ind: Option<SlotPoint>,
    slots: Vec<CellResourceGrid>,
}

impl CellResourceGridPool {
    pub fn new(cfg: Arc<CellConfig>) -> Self {
        let slots = (0..RESOURCE_GRID_SIZE)
            .map(|_| CellResourceGrid::new(&cfg))
            .collect();
        Self {
            cfg,
            last_sl_ind: None,
            slots,
        }
    }

    pub fn cfg(&self) -> &Arc<CellConfig> {
        &self.cfg
    }

    /// Current slot being scheduled.
    pub fn slot_tx(&self) -> SlotPoint {
        self.last_sl_ind.expect("no slot indication yet")
    }

    /// Advances the pool to `sl_tx`. Slots must be indicated without gaps;
    /// the slot [`OLD_SLOT_DELAY`] behind is recycled.
    pub fn slot_indication(&mut self, sl_tx: SlotPoint) {
        if let Some(last) = self.last_sl_ind {
            assert!(last + 1 == sl_tx, "slot indication was skipped");
        }
        self.last_sl_ind = Some(sl_tx);

        // sl_tx - OLD_SLOT_DELAY, expressed as a forward wrap.
        let old = sl_tx + (RESOURCE_GRID_SIZE as u32 - OLD_SLOT_DELAY);
        self.slots[old.to_u32() as usize % RESOURCE_GRID_SIZE].reset();
    }

    fn grid_idx(&self, sl_delay: u32) -> usize {
        assert!(
            (sl_delay as usize) < RESOURCE_GRID_SIZE / 2,
            "the cell resource pool is too small for delay {sl_delay}"
        );
        (self.slot_tx() + sl_delay).to_u32() as usize % RESOURCE_GRID_SIZE
    }

    pub fn grid(&self, sl_delay: u32) -> &CellResourceGrid {
        &self.slots[self.grid_idx(sl_delay)]
    }

    fn grid_mut(&mut self, sl_delay: u32) -> &mut CellResourceGrid {
        let idx = self.grid_idx(sl_delay);
        &mut self.slots[idx]
    }
}

/// Slot-allocation handle over the grid pool.
///
/// Operations address a slot by its delay from the slot under scheduling:
/// delay 0 is the PDCCH slot of the current `slot_indication`.
pub struct CellResourceAllocator<'a> {
    pool: &'a mut CellResourceGridPool,
}

impl<'a> CellResourceAllocator<'a> {
    pub fn new(pool: &'a mut CellResourceGridPool) -> Self {
        Self { pool }
    }

    pub fn cfg(&self) -> &Arc<CellConfig> {
        self.pool.cfg()
    }

    pub fn slot_tx(&self) -> SlotPoint {
        self.pool.slot_tx()
    }

    /// Absolute slot addressed by `sl_delay`.
    pub fn slot(&self, sl_delay: u32) -> SlotPoint {
        self.pool.slot_tx() + sl_delay
    }

    pub fn used_dl_prbs(&self, sl_delay: u32) -> &PrbBitmap {
        &self.pool.grid(sl_delay).dl_prbs
    }

    pub fn used_ul_prbs(&self, sl_delay: u32) -> &PrbBitmap {
        &self.pool.grid(sl_delay).ul_prbs
    }

    pub fn dl_res(&self, sl_delay: u32) -> &DlSchedResult {
        &self.pool.grid(sl_delay).dl
    }

    pub fn ul_res(&self, sl_delay: u32) -> &UlSchedResult {
        &self.pool.grid(sl_delay).ul
    }

    /// Claims `prbs` in the DL bitmap and appends an empty RAR grant for
    /// `ra_rnti`, returning it for filling.
    pub fn alloc_rar_grant(
        &mut self,
        sl_delay: u32,
        ra_rnti: Rnti,
        prbs: PrbInterval,
    ) -> &mut RarInformation {
        let cell_index = self.pool.cfg().cell_index;
        let grid = self.pool.grid_mut(sl_delay);
        debug_assert!(!grid.dl.rar_grants_full());
        grid.dl_prbs.fill(prbs);
        grid.dl.rar_grants.push(RarInformation {
            cell_index,
            ra_rnti,
            prbs,
            grants: Default::default(),
        });
        grid.dl.rar_grants.last_mut().unwrap()
    }

    /// Claims `prbs` in the UL bitmap and appends a PUSCH grant.
    pub fn alloc_pusch(&mut self, sl_delay: u32, grant: UlSchedInfo) -> &mut UlSchedInfo {
        let grid = self.pool.grid_mut(sl_delay);
        debug_assert!(!grid.ul.puschs_full());
        grid.ul_prbs.fill(grant.prbs);
        grid.ul.puschs.push(grant);
        grid.ul.puschs.last_mut().unwrap()
    }

    /// Claims `prbs` in the DL bitmap and appends a unicast grant.
    pub fn alloc_dl_grant(&mut self, sl_delay: u32, grant: DlSchedInfo) -> &mut DlSchedInfo {
        let grid = self.pool.grid_mut(sl_delay);
        debug_assert!(!grid.dl.ue_grants_full());
        grid.dl_prbs.fill(grant.prbs);
        grid.dl.ue_grants.push(grant);
        grid.dl.ue_grants.last_mut().unwrap()
    }

    /// Claims `prbs` in the DL bitmap and appends a broadcast SSB entry.
    pub fn alloc_ssb(&mut self, sl_delay: u32, ssb: SsbInformation) -> &mut SsbInformation {
        let grid = self.pool.grid_mut(sl_delay);
        debug_assert!(!grid.dl.ssb_grants_full());
        grid.dl_prbs.fill(ssb.prbs);
        grid.dl.ssb_grants.push(ssb);
        grid.dl.ssb_grants.last_mut().unwrap()
    }

    /// Appends a Msg3 sub-grant to the last RAR of the slot. The PRBs were
    /// already claimed by [`Self::alloc_pusch`] for the Msg3 slot, not here.
    pub fn last_rar_mut(&mut self, sl_delay: u32) -> &mut RarInformation {
        self.pool
            .grid_mut(sl_delay)
            .dl
            .rar_grants
            .last_mut()
            .expect("no RAR allocated in this slot")
    }

    /// The grant lists of one slot, for read-only inspection.
    pub fn grid(&self, sl_delay: u32) -> &CellResourceGrid {
        self.pool.grid(sl_delay)
    }
}
