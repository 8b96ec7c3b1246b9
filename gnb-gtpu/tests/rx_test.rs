use gnb_gtpu::limiter::UeAmbrLimiter;
use gnb_gtpu::pdu::{self, ExtensionHeader, ExtensionHeaderType, GtpuHeader, Teid};
use gnb_gtpu::rx::{NguTunnelRx, RxConfig, RxState};
use gnb_gtpu::RxLowerLayerNotifier;
use gnb_ran::Qfi;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
struct Sink {
    sdus: Rc<RefCell<Vec<(Vec<u8>, Qfi)>>>,
}

impl RxLowerLayerNotifier for Sink {
    fn on_new_sdu(&mut self, sdu: Vec<u8>, qfi: Qfi) {
        self.sdus.borrow_mut().push((sdu, qfi));
    }
}

impl Sink {
    fn count(&self) -> usize {
        self.sdus.borrow().len()
    }

    fn payloads(&self) -> Vec<Vec<u8>> {
        self.sdus.borrow().iter().map(|(s, _)| s.clone()).collect()
    }
}

fn src_addr() -> SocketAddr {
    "10.0.0.1:2152".parse().unwrap()
}

/// Builds an N3 data PDU for TEID 1 with a PDU-session container (QFI 9)
/// and an optional sequence number.
fn data_pdu(sn: Option<u16>, payload: &[u8]) -> Vec<u8> {
    let mut hdr = GtpuHeader {
        message_type: pdu::GTPU_MSG_DATA_PDU,
        teid: Teid(1),
        next_ext_hdr_type: ExtensionHeaderType::PDU_SESSION_CONTAINER,
        ..Default::default()
    };
    hdr.flags.ext_hdr = true;
    if let Some(sn) = sn {
        hdr.flags.seq_number = true;
        hdr.seq_number = sn;
    }
    hdr.ext_list.push(ExtensionHeader {
        ext_type: ExtensionHeaderType::PDU_SESSION_CONTAINER,
        container: SmallVec::from_slice(&[0x00, 0x09]),
    });
    let mut buf = payload.to_vec();
    pdu::write_header(&mut buf, &hdr).unwrap();
    buf
}

fn make_rx(t_reordering: Duration, now: Instant) -> (NguTunnelRx<Sink>, Sink) {
    let sink = Sink::default();
    let cfg = RxConfig {
        local_teid: Teid(1),
        t_reordering,
        ue_ambr_limiter: Arc::new(UeAmbrLimiter::new(1_000_000_000, 1_000_000_000, now)),
        ignore_ue_ambr: false,
        warn_on_drop: false,
    };
    (NguTunnelRx::new(cfg, sink.clone()), sink)
}

#[test]
fn test_delivery_without_sn() {
    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::from_millis(10), now);
    rx.handle_pdu(data_pdu(None, b"no-sn"), src_addr(), now);
    assert_eq!(sink.payloads(), vec![b"no-sn".to_vec()]);
    assert_eq!(sink.sdus.borrow()[0].1, Qfi::new(9).unwrap());
    assert!(!rx.is_reordering_timer_running());
    // State untouched: the PDU bypassed the window.
    assert_eq!(rx.get_state(), RxState::default());
}

#[test]
fn test_in_order_delivery() {
    // Consecutive SNs starting at RX_DELIV are forwarded immediately and
    // the reordering timer never starts.
    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::from_millis(10), now);
    for sn in 0u16..3 {
        rx.handle_pdu(data_pdu(Some(sn), &[sn as u8]), src_addr(), now);
        assert_eq!(sink.count(), sn as usize + 1);
        assert!(!rx.is_reordering_timer_running());
    }
    assert_eq!(rx.get_state().rx_deliv, 3);
    assert_eq!(rx.get_state().rx_next, 3);
}

#[test]
fn test_out_of_order_hole_filled() {
    // 0, then 2 (timer starts, held back), then 1 (timer stops, 1 and 2
    // come out in order).
    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::from_millis(10), now);

    rx.handle_pdu(data_pdu(Some(0), &[0]), src_addr(), now);
    assert_eq!(sink.count(), 1);

    rx.handle_pdu(data_pdu(Some(2), &[2]), src_addr(), now);
    assert!(rx.is_reordering_timer_running());
    assert_eq!(sink.count(), 1); // nothing new delivered

    rx.handle_pdu(data_pdu(Some(1), &[1]), src_addr(), now);
    assert!(!rx.is_reordering_timer_running());
    assert_eq!(sink.payloads(), vec![vec![0], vec![1], vec![2]]);
    assert_eq!(rx.get_state().rx_deliv, 3);
}

#[test]
fn test_reordering_timer_expiry() {
    // 0, 2, 4 with holes at 1 and 3: each timer round releases the SNs
    // below RX_REORD, skipping the holes.
    let t = Duration::from_millis(10);
    let now = Instant::now();
    let (mut rx, sink) = make_rx(t, now);

    rx.handle_pdu(data_pdu(Some(0), &[0]), src_addr(), now);
    rx.handle_pdu(data_pdu(Some(2), &[2]), src_addr(), now);
    rx.handle_pdu(data_pdu(Some(4), &[4]), src_addr(), now);
    assert_eq!(sink.count(), 1);
    assert!(rx.is_reordering_timer_running());

    // First expiry: RX_REORD = 3, releases 2, restarts for the hole at 3.
    let now = now + t + Duration::from_millis(1);
    rx.handle_reordering_expiry(now);
    assert_eq!(sink.payloads(), vec![vec![0], vec![2]]);
    assert_eq!(rx.get_state().rx_deliv, 3);
    assert!(rx.is_reordering_timer_running());

    // Second expiry: RX_REORD = 5, releases 4, nothing left to wait for.
    let now = now + t + Duration::from_millis(1);
    rx.handle_reordering_expiry(now);
    assert_eq!(sink.payloads(), vec![vec![0], vec![2], vec![4]]);
    assert_eq!(rx.get_state().rx_deliv, 5);
    assert!(!rx.is_reordering_timer_running());
}

#[test]
fn test_expiry_before_deadline_is_ignored() {
    let t = Duration::from_millis(10);
    let now = Instant::now();
    let (mut rx, sink) = make_rx(t, now);
    rx.handle_pdu(data_pdu(Some(1), &[1]), src_addr(), now);
    assert!(rx.is_reordering_timer_running());

    rx.handle_reordering_expiry(now + Duration::from_millis(5));
    assert!(rx.is_reordering_timer_running());
    assert_eq!(sink.count(), 0);
}

#[test]
fn test_duplicate_in_window_dropped() {
    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::from_millis(10), now);
    rx.handle_pdu(data_pdu(Some(2), &[2]), src_addr(), now);
    let st = rx.get_state();
    assert_eq!(sink.count(), 0);

    // Second presentation of the same SN: no delivery, no state change.
    rx.handle_pdu(data_pdu(Some(2), &[99]), src_addr(), now);
    assert_eq!(sink.count(), 0);
    assert_eq!(rx.get_state(), st);
}

#[test]
fn test_out_of_window_bypasses_reordering() {
    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::from_millis(10), now);
    // rx_deliv = 0, window is [0, 32768); 40000 falls outside.
    rx.handle_pdu(data_pdu(Some(40000), &[7]), src_addr(), now);
    assert_eq!(sink.count(), 1);
    assert!(!rx.is_reordering_timer_running());
    assert_eq!(rx.get_state().rx_next, 0); // window state untouched
}

#[test]
fn test_missing_session_container_dropped() {
    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::from_millis(10), now);
    // Plain G-PDU without any extension header.
    let mut buf = b"payload".to_vec();
    let hdr = GtpuHeader {
        message_type: pdu::GTPU_MSG_DATA_PDU,
        teid: Teid(1),
        ..Default::default()
    };
    pdu::write_header(&mut buf, &hdr).unwrap();
    rx.handle_pdu(buf, src_addr(), now);
    assert_eq!(sink.count(), 0);
}

#[test]
fn test_malformed_pdu_dropped() {
    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::from_millis(10), now);
    rx.handle_pdu(vec![0x30, 0xff], src_addr(), now);
    assert_eq!(sink.count(), 0);
    assert_eq!(rx.get_state(), RxState::default());
}

#[test]
fn test_ambr_gate_drops() {
    let now = Instant::now();
    let sink = Sink::default();
    let one_pdu_len = data_pdu(Some(0), &[0]).len();
    let cfg = RxConfig {
        local_teid: Teid(1),
        t_reordering: Duration::from_millis(10),
        // Exactly one PDU worth of tokens and no refill.
        ue_ambr_limiter: Arc::new(UeAmbrLimiter::new(0, one_pdu_len as u64, now)),
        ignore_ue_ambr: false,
        warn_on_drop: false,
    };
    let mut rx = NguTunnelRx::new(cfg, sink.clone());

    rx.handle_pdu(data_pdu(Some(0), &[0]), src_addr(), now);
    assert_eq!(sink.count(), 1);
    rx.handle_pdu(data_pdu(Some(1), &[1]), src_addr(), now);
    assert_eq!(sink.count(), 1); // over AMBR, dropped
    assert_eq!(rx.get_state().rx_deliv, 1); // dropped PDU left no trace
}

#[test]
fn test_ambr_gate_bypass() {
    let now = Instant::now();
    let sink = Sink::default();
    let cfg = RxConfig {
        local_teid: Teid(1),
        t_reordering: Duration::from_millis(10),
        ue_ambr_limiter: Arc::new(UeAmbrLimiter::new(0, 0, now)),
        ignore_ue_ambr: true,
        warn_on_drop: false,
    };
    let mut rx = NguTunnelRx::new(cfg, sink.clone());
    rx.handle_pdu(data_pdu(Some(0), &[0]), src_addr(), now);
    assert_eq!(sink.count(), 1);
}

#[test]
fn test_stop_is_idempotent_and_final() {
    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::from_millis(10), now);
    rx.handle_pdu(data_pdu(Some(1), &[1]), src_addr(), now);
    assert!(rx.is_reordering_timer_running());

    rx.stop();
    rx.stop();
    assert!(!rx.is_reordering_timer_running());

    // PDUs after stop are dropped without state updates.
    let st = rx.get_state();
    rx.handle_pdu(data_pdu(Some(0), &[0]), src_addr(), now);
    assert_eq!(sink.count(), 0);
    assert_eq!(rx.get_state(), st);

    // A pending expiry must not deliver either.
    rx.handle_reordering_expiry(now + Duration::from_secs(1));
    assert_eq!(sink.count(), 0);
}

#[test]
fn test_t_reordering_zero_disables_reordering() {
    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::ZERO, now);
    rx.handle_pdu(data_pdu(Some(2), &[2]), src_addr(), now);
    rx.handle_pdu(data_pdu(Some(0), &[0]), src_addr(), now);
    // Arrival order, no holding back.
    assert_eq!(sink.payloads(), vec![vec![2], vec![0]]);
    assert!(!rx.is_reordering_timer_running());
}

#[test]
fn test_lossless_permutation_delivers_in_order() {
    // Every SN of [0, 8) presented in a shuffled order without loss comes
    // out in ascending SN order.
    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::from_millis(10), now);
    for &sn in &[5u16, 0, 3, 1, 2, 7, 4, 6] {
        rx.handle_pdu(data_pdu(Some(sn), &[sn as u8]), src_addr(), now);
    }
    let expected: Vec<Vec<u8>> = (0u8..8).map(|sn| vec![sn]).collect();
    assert_eq!(sink.payloads(), expected);
    assert_eq!(rx.get_state().rx_deliv, 8);
    assert!(!rx.is_reordering_timer_running());
}

#[test]
fn test_shuffled_burst_delivers_in_order() {
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::from_millis(10), now);
    let mut sns: Vec<u16> = (0..64).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x4601);
    sns.shuffle(&mut rng);
    for sn in sns {
        rx.handle_pdu(data_pdu(Some(sn), &sn.to_be_bytes()), src_addr(), now);
    }
    let expected: Vec<Vec<u8>> = (0u16..64).map(|sn| sn.to_be_bytes().to_vec()).collect();
    assert_eq!(sink.payloads(), expected);
    assert_eq!(rx.get_state().rx_deliv, 64);
}

#[test]
fn test_sn_wraparound() {
    let now = Instant::now();
    let (mut rx, sink) = make_rx(Duration::from_millis(10), now);
    rx.set_state(RxState {
        rx_next: 65534,
        rx_deliv: 65534,
        rx_reord: 65534,
    });
    for &sn in &[65534u16, 65535, 0, 1] {
        rx.handle_pdu(data_pdu(Some(sn), &[]), src_addr(), now);
    }
    assert_eq!(sink.count(), 4);
    assert_eq!(rx.get_state().rx_deliv, 2);
    assert_eq!(rx.get_state().rx_next, 2);
}

#[test]
fn test_expiry_with_wraparound_hole() {
    let t = Duration::from_millis(10);
    let now = Instant::now();
    let (mut rx, sink) = make_rx(t, now);
    rx.set_state(RxState {
        rx_next: 65535,
        rx_deliv: 65535,
        rx_reord: 65535,
    });
    // Hole at 65535; the next two SNs sit across the wrap.
    rx.handle_pdu(data_pdu(Some(0), &[0]), src_addr(), now);
    rx.handle_pdu(data_pdu(Some(1), &[1]), src_addr(), now);
    assert_eq!(sink.count(), 0);
    assert!(rx.is_reordering_timer_running());

    rx.handle_reordering_expiry(now + t + Duration::from_millis(1));
    assert_eq!(sink.payloads(), vec![vec![0], vec![1]]);
    assert_eq!(rx.get_state().rx_deliv, 2);
    assert!(!rx.is_reordering_timer_running());
}
