//! # gnb-ran
//!
//! Shared 5G NR RAN vocabulary for the gNB user-plane and scheduler crates.
//!
//! This crate is the leaf of the workspace: slotted time ([`SlotPoint`]),
//! radio identifiers ([`Rnti`], [`Qfi`]), physical-resource-block occupancy
//! ([`PrbBitmap`], [`PrbInterval`]) and TDD DL/UL slot patterns
//! ([`TddConfig`]). Everything here is plain data with no I/O.

pub mod bitset;
pub mod prb;
pub mod qos;
pub mod rnti;
pub mod slot;
pub mod tdd;

pub use bitset::BitSet;
pub use prb::{
    find_empty_interval_of_length, find_next_empty_interval, PrbBitmap, PrbInterval, MAX_NOF_PRBS,
};
pub use qos::Qfi;
pub use rnti::Rnti;
pub use slot::SlotPoint;
pub use tdd::{TddConfig, TddPattern};
