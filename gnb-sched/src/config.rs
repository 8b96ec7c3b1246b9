//! Static cell configuration consumed by the scheduler components.

use gnb_ran::prb::MAX_NOF_PRBS;
use gnb_ran::slot::SlotPoint;
use gnb_ran::tdd::TddConfig;
use thiserror::Error;

pub const MAX_NOF_CELLS: u8 = 16;
pub const MAX_PCI: u16 = 1007;

/// One entry of the PUSCH-TimeDomainResourceAllocationList.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PuschTimeDomainAlloc {
    /// Slot offset between the DCI and the scheduled PUSCH.
    pub k2: u8,
    /// OFDM symbol interval `[start, stop)` of the allocation.
    pub symbols: (u8, u8),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid cell index {0}")]
    InvalidCellIndex(u8),
    #[error("invalid PCI {0}")]
    InvalidPci(u16),
    #[error("invalid number of PRBs: dl={dl} ul={ul}")]
    InvalidPrbCount { dl: u16, ul: u16 },
    #[error("PUSCH time-domain allocation list is empty")]
    EmptyPuschTdAllocList,
    #[error("RAR response window must not be zero")]
    ZeroRarWindow,
    #[error("inconsistent TDD pattern: {0}")]
    InvalidTddPattern(&'static str),
}

/// Per-cell configuration shared by the resource grid, the RA scheduler and
/// the HARQ entities.
#[derive(Debug, Clone)]
pub struct CellConfig {
    pub cell_index: u8,
    pub pci: u16,
    /// Subcarrier-spacing family of the active BWPs.
    pub numerology: u8,
    pub nof_dl_prbs: u16,
    pub nof_ul_prbs: u16,
    /// None means FDD: every slot carries both directions.
    pub tdd: Option<TddConfig>,
    /// RAR response window length in slots (rach-ConfigGeneric).
    pub ra_resp_window_slots: u16,
    pub pusch_td_alloc_list: Vec<PuschTimeDomainAlloc>,
    /// Cached per-period DL/UL activity, indexed by slot within the TDD
    /// period.
    dl_enabled_slots: Vec<bool>,
    ul_enabled_slots: Vec<bool>,
}

impl CellConfig {
    pub fn new(
        cell_index: u8,
        pci: u16,
        numerology: u8,
        nof_dl_prbs: u16,
        nof_ul_prbs: u16,
        tdd: Option<TddConfig>,
        ra_resp_window_slots: u16,
        pusch_td_alloc_list: Vec<PuschTimeDomainAlloc>,
    ) -> Result<Self, ConfigError> {
        let mut cfg = Self {
            cell_index,
            pci,
            numerology,
            nof_dl_prbs,
            nof_ul_prbs,
            tdd,
            ra_resp_window_slots,
            pusch_td_alloc_list,
            dl_enabled_slots: Vec::new(),
            ul_enabled_slots: Vec::new(),
        };
        cfg.validate()?;
        if let Some(tdd) = &cfg.tdd {
            let period = tdd.nof_slots_per_period() as u32;
            for i in 0..period {
                let sl = SlotPoint::new(numerology, i);
                cfg.dl_enabled_slots.push(tdd.slot_is_dl(sl));
                cfg.ul_enabled_slots.push(tdd.slot_is_ul(sl));
            }
        }
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_index >= MAX_NOF_CELLS {
            return Err(ConfigError::InvalidCellIndex(self.cell_index));
        }
        if self.pci > MAX_PCI {
            return Err(ConfigError::InvalidPci(self.pci));
        }
        let dl_ok = (1..=MAX_NOF_PRBS as u16).contains(&self.nof_dl_prbs);
        let ul_ok = (1..=MAX_NOF_PRBS as u16).contains(&self.nof_ul_prbs);
        if !dl_ok || !ul_ok {
            return Err(ConfigError::InvalidPrbCount {
                dl: self.nof_dl_prbs,
                ul: self.nof_ul_prbs,
            });
        }
        if self.pusch_td_alloc_list.is_empty() {
            return Err(ConfigError::EmptyPuschTdAllocList);
        }
        if self.ra_resp_window_slots == 0 {
            return Err(ConfigError::ZeroRarWindow);
        }
        if let Some(tdd) = &self.tdd {
            for pattern in
                std::iter::once(&tdd.pattern1).chain(tdd.pattern2.as_ref())
            {
                if pattern.nof_slots == 0 {
                    return Err(ConfigError::InvalidTddPattern("zero-length pattern"));
                }
                if pattern.nof_dl_slots + pattern.nof_ul_slots > pattern.nof_slots {
                    return Err(ConfigError::InvalidTddPattern(
                        "DL and UL slots exceed the period",
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn nof_slots_per_frame(&self) -> u32 {
        10 * (1u32 << self.numerology)
    }

    /// Whether PDCCH/PDSCH can be transmitted in `slot`.
    pub fn is_dl_enabled(&self, slot: SlotPoint) -> bool {
        match &self.tdd {
            None => true,
            Some(tdd) => {
                let idx = slot.to_u32() % tdd.nof_slots_per_period() as u32;
                self.dl_enabled_slots[idx as usize]
            }
        }
    }

    /// Whether PUSCH can be transmitted in `slot`.
    pub fn is_ul_enabled(&self, slot: SlotPoint) -> bool {
        match &self.tdd {
            None => true,
            Some(tdd) => {
                let idx = slot.to_u32() % tdd.nof_slots_per_period() as u32;
                self.ul_enabled_slots[idx as usize]
            }
        }
    }
}
