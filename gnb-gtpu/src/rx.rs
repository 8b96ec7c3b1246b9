//! NG-U Rx tunnel: the downlink data path of an N3 bearer.
//!
//! PDUs arrive from the UDP gateway, pass the per-UE AMBR gate, have their
//! PDU-session container (QFI) extracted and are delivered upward either
//! straight away or through a sequence-number reorder window guarded by the
//! reordering timer. State variables follow the RLC-AM naming (TS 38.322
//! Sec. 7.1): RX_NEXT, RX_DELIV, RX_REORD.

use crate::limiter::UeAmbrLimiter;
use crate::pdu::{self, ExtensionHeaderType, Teid};
use crate::psup;
use crate::timer::ReorderingTimer;
use crate::window::{SduWindow, GTPU_RX_WINDOW_SIZE};
use crate::RxLowerLayerNotifier;
use gnb_ran::Qfi;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const MAX_NOF_LOG_SN_OUT_OF_WINDOW: u32 = 5;

/// Rx tunnel configuration.
pub struct RxConfig {
    pub local_teid: Teid,
    /// Reordering timer duration; zero disables reordering entirely.
    pub t_reordering: Duration,
    /// Shared per-UE AMBR token bucket.
    pub ue_ambr_limiter: Arc<UeAmbrLimiter>,
    /// Bypass the AMBR gate.
    pub ignore_ue_ambr: bool,
    /// Log policy drops at warning instead of info level.
    pub warn_on_drop: bool,
}

/// Rx state variables.
///
/// - `rx_next`: SN of the next SDU expected to be received (one past the
///   highest ever received).
/// - `rx_deliv`: first SN not yet delivered to lower layers but still
///   awaited; lower edge of the reorder window.
/// - `rx_reord`: one past the SN that triggered the running reordering
///   timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxState {
    pub rx_next: u16,
    pub rx_deliv: u16,
    pub rx_reord: u16,
}

impl std::fmt::Display for RxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rx_deliv={} rx_reord={} rx_next={}",
            self.rx_deliv, self.rx_reord, self.rx_next
        )
    }
}

struct RxSduInfo {
    sdu: Vec<u8>,
    qfi: Qfi,
    sn: Option<u16>,
}

/// NG-U bearer Rx tunnel.
///
/// All methods must be called from the executor owning the tunnel; the
/// reordering-timer expiry is posted back to the same executor, so window
/// mutations never race.
pub struct NguTunnelRx<N: RxLowerLayerNotifier> {
    cfg: RxConfig,
    lower: N,
    st: RxState,
    rx_window: SduWindow<RxSduInfo>,
    reordering_timer: ReorderingTimer,
    stopped: bool,
    nof_log_sn_out_of_window: u32,
}

impl<N: RxLowerLayerNotifier> NguTunnelRx<N> {
    pub fn new(cfg: RxConfig, lower: N) -> Self {
        let reordering_timer = ReorderingTimer::new(cfg.t_reordering);
        info!(
            "GTPU NGU Rx configured. teid={} t_reordering={:?} ignore_ue_ambr={}",
            cfg.local_teid, cfg.t_reordering, cfg.ignore_ue_ambr
        );
        Self {
            cfg,
            lower,
            st: RxState::default(),
            rx_window: SduWindow::new(),
            reordering_timer,
            stopped: false,
            nof_log_sn_out_of_window: 0,
        }
    }

    /// Idempotent shutdown: cancels the reordering timer; any later PDU or
    /// timer event is dropped without touching state.
    pub fn stop(&mut self) {
        if !self.stopped {
            self.reordering_timer.stop();
            self.stopped = true;
        }
    }

    // Testing helpers.
    pub fn set_state(&mut self, st: RxState) {
        self.st = st;
    }

    pub fn get_state(&self) -> RxState {
        self.st
    }

    pub fn is_reordering_timer_running(&self) -> bool {
        self.reordering_timer.is_running()
    }

    /// Deadline for the executor to schedule [`Self::handle_reordering_expiry`].
    pub fn reordering_timer_deadline(&self) -> Option<Instant> {
        self.reordering_timer.deadline()
    }

    /// Entry point for the UDP gateway.
    pub fn handle_pdu(&mut self, buf: Vec<u8>, src_addr: SocketAddr, now: Instant) {
        if self.stopped {
            return;
        }

        let pdu = match pdu::dissect(buf) {
            Ok(pdu) => pdu,
            Err(e) => {
                error!("dropped PDU, error reading GTP-U header: {e}");
                return;
            }
        };
        let pdu_len = pdu.pdu_len();
        let teid = pdu.header().teid;
        let _ = src_addr;

        // Limit UE to AMBR.
        if !self.cfg.ignore_ue_ambr && !self.cfg.ue_ambr_limiter.consume(pdu_len, now) {
            if self.cfg.warn_on_drop {
                warn!("dropped GTPU PDU, UE went over UE-AMBR. pdu_len={pdu_len}");
            } else {
                info!("dropped GTPU PDU, UE went over UE-AMBR. pdu_len={pdu_len}");
            }
            return;
        }

        // The only extension comprehended at NG-U is the PDU session
        // container; its presence is mandatory on N3/N9 (TS 29.281
        // Sec. 5.2.2.7).
        let mut qfi: Option<Qfi> = None;
        for ext in pdu.ext_headers() {
            if ext.ext_type != ExtensionHeaderType::PDU_SESSION_CONTAINER {
                warn!(
                    "ignoring unexpected extension header at NG-U interface. type={} pdu_len={pdu_len}",
                    ext.ext_type
                );
            } else if qfi.is_none() {
                qfi = psup::unpack(pdu.container(ext));
                if qfi.is_none() {
                    error!("failed to unpack PDU session container. pdu_len={pdu_len}");
                }
            } else {
                warn!("ignoring multiple PDU session container. pdu_len={pdu_len}");
            }
        }
        let Some(qfi) = qfi else {
            warn!(
                "incomplete PDU at NG-U interface: missing or invalid PDU session container. \
                 pdu_len={pdu_len} teid={teid}"
            );
            return;
        };

        debug!("RX PDU. pdu_len={pdu_len} {}", self.st);

        let has_sn = pdu.header().flags.seq_number;
        let sn = pdu.header().seq_number;

        if !has_sn || self.cfg.t_reordering.is_zero() {
            // Forward this SDU straight away.
            let sdu = pdu.into_t_pdu();
            self.deliver_sdu(RxSduInfo { sdu, qfi, sn: None });
            return;
        }

        let sdu = pdu.into_t_pdu(); // header views are invalidated here
        let sdu_info = RxSduInfo {
            sdu,
            qfi,
            sn: Some(sn),
        };

        // Check out-of-window.
        if !self.inside_rx_window(sn) {
            if self.nof_log_sn_out_of_window < MAX_NOF_LOG_SN_OUT_OF_WINDOW {
                self.nof_log_sn_out_of_window += 1;
                warn!(
                    "SN falls out of Rx window. sn={sn} pdu_len={pdu_len} {} \
                     reordering_timer_running={}",
                    self.st,
                    self.reordering_timer.is_running()
                );
                if self.nof_log_sn_out_of_window == MAX_NOF_LOG_SN_OUT_OF_WINDOW {
                    warn!(
                        "throttling previous log message after {} contiguous repetitions",
                        self.nof_log_sn_out_of_window
                    );
                }
            }
            self.deliver_sdu(sdu_info);
            return;
        }

        // Check late SN: below the delivery watermark.
        if self.rx_mod_base(sn) < self.rx_mod_base(self.st.rx_deliv) {
            debug!(
                "out-of-order after timeout or duplicate. sn={sn} pdu_len={pdu_len} {}",
                self.st
            );
            self.deliver_sdu(sdu_info);
            return;
        }

        // Check if the PDU has already been received.
        if self.rx_window.has_sn(sn) {
            warn!("duplicate PDU dropped. sn={sn} pdu_len={pdu_len}");
            return;
        }

        self.rx_window.add_sn(sn, sdu_info);

        // Update RX_NEXT.
        if self.rx_mod_base(sn) >= self.rx_mod_base(self.st.rx_next) {
            self.st.rx_next = sn.wrapping_add(1);
        }

        if sn == self.st.rx_deliv {
            // Deliver all consecutive SDUs in ascending order of SN.
            self.deliver_all_consecutive_sdus();
        }

        // Stop the reordering timer once delivery caught up with RX_REORD
        // or the window advanced past it.
        if self.reordering_timer.is_running()
            && (self.st.rx_reord == self.st.rx_deliv || !self.inside_rx_window(self.st.rx_reord))
        {
            self.reordering_timer.stop();
            debug!("stopped t-Reordering. {}", self.st);
        }

        if self.cfg.t_reordering.is_zero() {
            self.st.rx_reord = self.st.rx_next;
            let generation = self.reordering_timer.generation();
            self.on_reordering_expired(generation, now);
        } else if !self.reordering_timer.is_running()
            && self.rx_mod_base(self.st.rx_deliv) < self.rx_mod_base(self.st.rx_next)
        {
            self.st.rx_reord = self.st.rx_next;
            self.reordering_timer.run(now);
            debug!("started t-Reordering. {}", self.st);
        }

        self.nof_log_sn_out_of_window = 0;
    }

    /// Fires the reordering timer if its deadline has been reached. Runs on
    /// the UE control executor; a timer restarted between expiry and
    /// execution is detected via its generation and skipped.
    pub fn handle_reordering_expiry(&mut self, now: Instant) {
        if self.stopped {
            return;
        }
        let Some(generation) = self.reordering_timer.try_expire(now) else {
            return;
        };
        if self.cfg.warn_on_drop {
            warn!(
                "reordering timer expired after {:?}. {}",
                self.cfg.t_reordering, self.st
            );
        } else {
            info!(
                "reordering timer expired after {:?}. {}",
                self.cfg.t_reordering, self.st
            );
        }
        self.on_reordering_expired(generation, now);
    }

    fn on_reordering_expired(&mut self, generation: u64, now: Instant) {
        // The timer may have been restarted by the PDU handling routine
        // between expiration and execution of this handler.
        if self.reordering_timer.is_running() || generation != self.reordering_timer.generation() {
            info!(
                "reordering timer has been restarted, skipping outdated event. {}",
                self.st
            );
            return;
        }
        if !self.inside_rx_window(self.st.rx_reord) {
            info!("rx_reord is outside the Rx window, skipping outdated event. {}", self.st);
            return;
        }

        // Release everything below RX_REORD in ascending order; gaps are
        // skipped, not filled.
        while self.st.rx_deliv != self.st.rx_reord {
            if let Some(sdu_info) = self.rx_window.remove_sn(self.st.rx_deliv) {
                self.deliver_sdu(sdu_info);
            }
            self.st.rx_deliv = self.st.rx_deliv.wrapping_add(1);
        }

        self.deliver_all_consecutive_sdus();

        if self.rx_mod_base(self.st.rx_deliv) < self.rx_mod_base(self.st.rx_next) {
            if self.cfg.t_reordering.is_zero() {
                error!(
                    "reordering timer expired with t_reordering=0 and rx_deliv < rx_next. {}",
                    self.st
                );
                return;
            }
            debug!("updating rx_reord to rx_next. {}", self.st);
            self.st.rx_reord = self.st.rx_next;
            self.reordering_timer.run(now);
        }
    }

    fn deliver_all_consecutive_sdus(&mut self) {
        while self.st.rx_deliv != self.st.rx_next {
            let Some(sdu_info) = self.rx_window.remove_sn(self.st.rx_deliv) else {
                break;
            };
            self.deliver_sdu(sdu_info);
            self.st.rx_deliv = self.st.rx_deliv.wrapping_add(1);
        }
    }

    fn deliver_sdu(&mut self, sdu_info: RxSduInfo) {
        info!(
            "RX SDU. sdu_len={} qos_flow={} sn={:?}",
            sdu_info.sdu.len(),
            sdu_info.qfi,
            sdu_info.sn
        );
        self.lower.on_new_sdu(sdu_info.sdu, sdu_info.qfi);
    }

    /// Rebases an SN against the lower window edge RX_DELIV for modular
    /// comparisons (adapted from RLC AM, TS 38.322 Sec. 7.1).
    fn rx_mod_base(&self, sn: u16) -> u16 {
        sn.wrapping_sub(self.st.rx_deliv)
    }

    /// RX_DELIV <= sn < RX_DELIV + window size, in the rebased order.
    fn inside_rx_window(&self, sn: u16) -> bool {
        (self.rx_mod_base(sn) as u32) < GTPU_RX_WINDOW_SIZE
    }
}
