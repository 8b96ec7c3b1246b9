//! # gnb-gtpu
//!
//! GTP-U v1 (3GPP TS 29.281) user-plane tunnelling as used on the N3
//! interface between a gNB and the 5G core.
//!
//! ## Architecture
//!
//! - **Codec** ([`pdu`]): dissect and serialize GTP-U PDUs, including the
//!   extension-header chain and path-management information elements.
//! - **Rx tunnel** ([`rx`]): NG-U downlink data path with per-UE AMBR
//!   policing, PDU-session-container (QFI) extraction and an SN reorder
//!   window driven by a reordering timer.
//! - **Tx tunnel** ([`tx`]): NG-U uplink data path, framing T-PDUs with
//!   their PDU-session container.
//! - **Path manager** ([`echo`]): echo request/response and error
//!   indication handling on the reserved TEID 0.
//!
//! All components are sans-I/O state machines: the UDP gateway and the
//! executors live outside this crate, behind the [`RxLowerLayerNotifier`]
//! and [`TxUpperLayerNotifier`] traits, and time enters through explicit
//! `Instant` parameters.

pub mod echo;
pub mod limiter;
pub mod pdu;
pub mod psup;
pub mod rx;
pub mod timer;
pub mod tx;
pub mod window;

use std::net::SocketAddr;

use gnb_ran::Qfi;

pub use echo::GtpuEcho;
pub use limiter::UeAmbrLimiter;
pub use pdu::{DissectedPdu, GtpuHeader, PduError, Teid};
pub use rx::{NguTunnelRx, RxConfig, RxState};
pub use tx::{NguTunnelTx, TxConfig};

/// Upward delivery of reassembled T-PDUs (towards PDCP / the PDU session).
pub trait RxLowerLayerNotifier {
    fn on_new_sdu(&mut self, sdu: Vec<u8>, qfi: Qfi);
}

/// Downward emission of serialized GTP-U PDUs (towards the UDP gateway).
pub trait TxUpperLayerNotifier {
    fn on_new_pdu(&mut self, pdu: Vec<u8>, dst: SocketAddr);
}
