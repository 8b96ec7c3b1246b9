//! Per-slot scheduling results: grant records and their bounded lists.

use crate::harq::DciInfo;
use gnb_ran::prb::PrbInterval;
use gnb_ran::rnti::Rnti;
use smallvec::SmallVec;

/// Maximum RAR grants per slot.
pub const MAX_RAR_LIST: usize = 16;
/// Maximum Msg3 sub-grants within one RAR.
pub const MAX_MSG3_LIST: usize = 16;
/// Maximum unicast DL grants per slot.
pub const MAX_DL_GRANTS: usize = 16;
/// Maximum PUSCH grants per slot.
pub const MAX_PUSCH_GRANTS: usize = 32;
/// Maximum broadcast (SSB) entries per slot.
pub const MAX_SSB_LIST: usize = 4;

/// One Msg3 grant carried inside a RAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Msg3Information {
    /// Random-access preamble index the grant answers.
    pub rapid: u8,
    /// Timing-advance command.
    pub ta: u16,
    /// TC-RNTI assigned to the UE.
    pub temp_crnti: Rnti,
    /// PUSCH PRBs of the Msg3 transmission.
    pub prbs: PrbInterval,
}

/// A RAR PDSCH grant answering one RA-RNTI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarInformation {
    pub cell_index: u8,
    pub ra_rnti: Rnti,
    /// PDSCH PRBs carrying the RAR.
    pub prbs: PrbInterval,
    pub grants: SmallVec<[Msg3Information; 4]>,
}

/// A PUSCH reception scheduled for one UE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UlSchedInfo {
    pub crnti: Rnti,
    pub prbs: PrbInterval,
    pub mcs: u8,
}

/// A unicast PDSCH grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DlSchedInfo {
    pub crnti: Rnti,
    pub prbs: PrbInterval,
    pub dci: DciInfo,
}

/// A broadcast SSB transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SsbInformation {
    pub ssb_index: u8,
    pub prbs: PrbInterval,
}

/// DL grants of one slot.
#[derive(Debug, Clone, Default)]
pub struct DlSchedResult {
    pub rar_grants: SmallVec<[RarInformation; 2]>,
    pub ue_grants: SmallVec<[DlSchedInfo; 4]>,
    pub ssb_grants: SmallVec<[SsbInformation; 1]>,
}

impl DlSchedResult {
    pub fn rar_grants_full(&self) -> bool {
        self.rar_grants.len() >= MAX_RAR_LIST
    }

    pub fn ue_grants_full(&self) -> bool {
        self.ue_grants.len() >= MAX_DL_GRANTS
    }

    pub fn ssb_grants_full(&self) -> bool {
        self.ssb_grants.len() >= MAX_SSB_LIST
    }

    pub fn clear(&mut self) {
        self.rar_grants.clear();
        self.ue_grants.clear();
        self.ssb_grants.clear();
    }
}

/// UL grants of one slot.
#[derive(Debug, Clone, Default)]
pub struct UlSchedResult {
    pub puschs: SmallVec<[UlSchedInfo; 4]>,
}

impl UlSchedResult {
    pub fn puschs_full(&self) -> bool {
        self.puschs.len() >= MAX_PUSCH_GRANTS
    }

    /// Free entries left in the PUSCH list.
    pub fn puschs_space(&self) -> usize {
        MAX_PUSCH_GRANTS - self.puschs.len()
    }

    pub fn clear(&mut self) {
        self.puschs.clear();
    }
}
