//! # gnb-sched
//!
//! Cell-scheduler core of a 5G NR gNB: the per-cell resource grid (a ring
//! of per-slot PRB bitmaps and grant lists), per-UE HARQ entities, and the
//! random-access scheduler that turns PRACH detections into RAR + Msg3
//! allocations inside the TS 38.321 response window.
//!
//! Everything runs on a single cell-scheduler executor: slots are processed
//! strictly in order through [`CellResourceGridPool::slot_indication`], and
//! the producers (RA scheduler, data scheduler, broadcast) fill the grid in
//! a defined phase order within each slot, so no locking is involved.

pub mod config;
pub mod grid;
pub mod harq;
pub mod ra;
pub mod result;

pub use config::{CellConfig, ConfigError, PuschTimeDomainAlloc};
pub use grid::{CellResourceAllocator, CellResourceGridPool, RESOURCE_GRID_SIZE};
pub use harq::{DciInfo, HarqEntity, HarqProcess, HarqState};
pub use ra::{get_msg3_delay, get_ra_rnti, RaScheduler, RachIndication};
pub use result::{DlSchedInfo, Msg3Information, RarInformation, SsbInformation, UlSchedInfo};
