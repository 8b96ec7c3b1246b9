//! PDU-session user-plane container framing (TS 38.415).
//!
//! The container travels inside the `pdu_session_container` GTP-U extension
//! header; on N3/N9 every G-PDU must carry one. Only the 2-byte short form
//! with the QFI is produced and consumed here:
//!
//! ```text
//! byte 0: PDU type (4) | spare (4)
//! byte 1: spare (2)    | QFI (6)
//! ```

use gnb_ran::Qfi;

/// UL PDU SESSION INFORMATION (gNB towards the core).
const PDU_TYPE_UL: u8 = 1;

/// Packs an uplink PDU-session container carrying `qfi`.
pub fn pack(qfi: Qfi) -> [u8; 2] {
    [PDU_TYPE_UL << 4, qfi.to_u8() & 0x3f]
}

/// Unpacks the QFI from a PDU-session container.
///
/// The PDU type nibble is not checked: the core sends type 0 (DL) frames
/// and peer gNBs may forward type 1, and the QFI sits at the same offset in
/// both.
pub fn unpack(container: &[u8]) -> Option<Qfi> {
    if container.len() < 2 {
        return None;
    }
    Qfi::new(container[1] & 0x3f)
}
