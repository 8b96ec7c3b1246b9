//! NG-U Tx tunnel: the uplink data path of an N3 bearer.

use crate::pdu::{self, ExtensionHeader, ExtensionHeaderType, GtpuHeader, Teid};
use crate::psup;
use crate::TxUpperLayerNotifier;
use gnb_ran::Qfi;
use smallvec::SmallVec;
use std::net::SocketAddr;
use tracing::{error, info};

/// Tx tunnel configuration.
pub struct TxConfig {
    /// TEID allocated by the peer (the UPF) for this bearer.
    pub peer_teid: Teid,
    /// N3 socket address of the peer.
    pub peer_addr: SocketAddr,
}

/// NG-U bearer Tx tunnel.
pub struct NguTunnelTx<N: TxUpperLayerNotifier> {
    cfg: TxConfig,
    upper: N,
}

impl<N: TxUpperLayerNotifier> NguTunnelTx<N> {
    pub fn new(cfg: TxConfig, upper: N) -> Self {
        info!(
            "GTPU NGU Tx configured. peer_teid={} peer_addr={}",
            cfg.peer_teid, cfg.peer_addr
        );
        Self { cfg, upper }
    }

    /// Frames an SDU coming down from PDCP as a G-PDU with its PDU-session
    /// container and hands it to the UDP gateway.
    pub fn handle_sdu(&mut self, mut buf: Vec<u8>, qfi: Qfi) {
        let mut hdr = GtpuHeader {
            message_type: pdu::GTPU_MSG_DATA_PDU,
            teid: self.cfg.peer_teid,
            next_ext_hdr_type: ExtensionHeaderType::PDU_SESSION_CONTAINER,
            ..Default::default()
        };
        hdr.flags.ext_hdr = true;
        hdr.ext_list.push(ExtensionHeader {
            ext_type: ExtensionHeaderType::PDU_SESSION_CONTAINER,
            container: SmallVec::from_slice(&psup::pack(qfi)),
        });

        if let Err(e) = pdu::write_header(&mut buf, &hdr) {
            error!(
                "dropped SDU, error writing GTP-U header: {e}. teid={}",
                hdr.teid
            );
            return;
        }
        info!(
            "TX PDU. pdu_len={} teid={} qfi={qfi}",
            buf.len(),
            hdr.teid
        );
        self.upper.on_new_pdu(buf, self.cfg.peer_addr);
    }
}
