//! GTP-U path management on the reserved TEID 0: echo request/response,
//! error indication, and the tunnel-management messages this node only
//! acknowledges by logging.

use crate::pdu::{self, DissectedPdu, GtpuHeader, PATH_MANAGEMENT_TEID};
use crate::TxUpperLayerNotifier;
use std::net::SocketAddr;
use tracing::{error, info, warn};

/// Path manager for one N3 association.
///
/// Composes the Rx dispatch and the Tx side of path management in one
/// object; both run on the CU-UP executor.
pub struct GtpuEcho<N: TxUpperLayerNotifier> {
    upper: N,
    /// Next echo-request sequence number, post-incremented on use.
    sn_next: u16,
}

impl<N: TxUpperLayerNotifier> GtpuEcho<N> {
    pub fn new(upper: N) -> Self {
        Self { upper, sn_next: 0 }
    }

    /// Entry point for path-management PDUs from the UDP gateway.
    pub fn handle_pdu(&mut self, buf: Vec<u8>, src_addr: SocketAddr) {
        let pdu = match pdu::dissect(buf) {
            Ok(pdu) => pdu,
            Err(e) => {
                error!("dropped PDU, error reading GTP-U header: {e}");
                return;
            }
        };
        self.dispatch(pdu, src_addr);
    }

    fn dispatch(&mut self, pdu: DissectedPdu, src_addr: SocketAddr) {
        let hdr = pdu.header();
        // TEID sanity check.
        if hdr.teid != PATH_MANAGEMENT_TEID {
            error!(
                "discarded PDU, invalid TEID for path management message. teid={} msg_type={:#04x}",
                hdr.teid, hdr.message_type
            );
            return;
        }
        // SN sanity check.
        if !hdr.flags.seq_number {
            error!(
                "discarded PDU, missing sequence number in path management message. \
                 msg_type={:#04x}",
                hdr.message_type
            );
            return;
        }
        let sn = hdr.seq_number;
        match hdr.message_type {
            pdu::GTPU_MSG_ECHO_REQUEST => {
                info!("RX echo request. sn={sn}");
                self.send_echo_response(src_addr, sn);
            }
            pdu::GTPU_MSG_ECHO_RESPONSE => {
                info!("RX echo response. sn={sn}");
                self.handle_echo_response(src_addr, sn);
            }
            pdu::GTPU_MSG_SUPPORTED_EXT_HDR_NOTIFICATION => {
                // TS 29.281 Sec. 5.1: the SN of this message is ignored by
                // the receiver even though S is set.
                warn!(
                    "discarded PDU, 'supported extension headers notification' not supported. \
                     sn={sn}"
                );
            }
            pdu::GTPU_MSG_ERROR_INDICATION => {
                let msg = pdu.into_t_pdu();
                match pdu::read_error_indication(&msg) {
                    Ok(err_ind) => {
                        // Tunnel release per TS 23.527 Sec. 5.3.3.1 is not
                        // implemented.
                        info!("received error indication from peer. {err_ind}");
                    }
                    Err(e) => {
                        error!("received malformed error indication from peer: {e}");
                    }
                }
            }
            pdu::GTPU_MSG_END_MARKER => {
                warn!("discarded PDU, 'end marker' not supported");
            }
            other => {
                error!(
                    "discarded PDU, invalid message type for path management. msg_type={other:#04x}"
                );
            }
        }
    }

    /// Sends an echo request to `dst_addr` with the next sequence number.
    pub fn send_echo_request(&mut self, dst_addr: SocketAddr) {
        let mut buf = Vec::new();
        let mut hdr = GtpuHeader {
            message_type: pdu::GTPU_MSG_ECHO_REQUEST,
            teid: PATH_MANAGEMENT_TEID,
            seq_number: self.sn_next,
            ..Default::default()
        };
        hdr.flags.seq_number = true;

        if let Err(e) = pdu::write_header(&mut buf, &hdr) {
            error!("discarded echo request, error writing GTP-U header: {e}");
            return;
        }
        self.sn_next = self.sn_next.wrapping_add(1);
        info!(
            "TX echo request. sn={} pdu_len={}",
            hdr.seq_number,
            buf.len()
        );
        self.upper.on_new_pdu(buf, dst_addr);
    }

    /// Sends an echo response to `dst_addr`. The response copies the SN of
    /// the request (TS 29.281 Sec. 4.3.1) and carries the Recovery IE for
    /// backward compatibility.
    pub fn send_echo_response(&mut self, dst_addr: SocketAddr, sn: u16) {
        let mut buf = Vec::new();
        pdu::write_ie_recovery(&mut buf);

        let mut hdr = GtpuHeader {
            message_type: pdu::GTPU_MSG_ECHO_RESPONSE,
            teid: PATH_MANAGEMENT_TEID,
            seq_number: sn,
            ..Default::default()
        };
        hdr.flags.seq_number = true;

        if let Err(e) = pdu::write_header(&mut buf, &hdr) {
            error!("discarded echo response, error writing GTP-U header: {e}. sn={sn}");
            return;
        }
        info!("TX echo response. sn={sn} pdu_len={}", buf.len());
        self.upper.on_new_pdu(buf, dst_addr);
    }

    fn handle_echo_response(&mut self, _src_addr: SocketAddr, sn: u16) {
        // Peer-liveness supervision (t3-response) is handled by the owner.
        info!("echo response acknowledged. sn={sn}");
    }
}
