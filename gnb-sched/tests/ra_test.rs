use gnb_ran::rnti::Rnti;
use gnb_ran::slot::SlotPoint;
use gnb_ran::tdd::{TddConfig, TddPattern};
use gnb_sched::config::{CellConfig, PuschTimeDomainAlloc};
use gnb_sched::grid::{CellResourceAllocator, CellResourceGridPool};
use gnb_sched::ra::{get_msg3_delay, get_ra_rnti, RaScheduler, RachIndication};
use std::sync::Arc;

fn sl(count: u32) -> SlotPoint {
    SlotPoint::new(0, count)
}

fn fdd_cfg(nof_prbs: u16) -> Arc<CellConfig> {
    Arc::new(
        CellConfig::new(
            0,
            1,
            0,
            nof_prbs,
            nof_prbs,
            None,
            10,
            vec![PuschTimeDomainAlloc {
                k2: 4,
                symbols: (2, 14),
            }],
        )
        .unwrap(),
    )
}

fn rach(crnti: u16, slot_rx: SlotPoint, preamble: u8) -> RachIndication {
    RachIndication {
        crnti: Rnti(crnti),
        slot_rx,
        symbol_index: 0,
        frequency_index: 0,
        preamble_id: preamble,
        timing_advance: 0,
        is_sul: false,
    }
}

/// Runs `slot_indication` for every slot in `[from, to]` without invoking
/// the scheduler.
fn advance(pool: &mut CellResourceGridPool, from: u32, to: u32) {
    for count in from..=to {
        pool.slot_indication(sl(count));
    }
}

#[test]
fn test_ra_rnti_formula() {
    // RA-RNTI = 1 + s_id + 14 t_id + 14*80 f_id + 14*80*8 ul_carrier_id
    let mut ind = rach(0x4601, sl(7), 0);
    assert_eq!(get_ra_rnti(&ind), Rnti(1 + 14 * 7));

    ind.symbol_index = 13;
    ind.frequency_index = 7;
    assert_eq!(get_ra_rnti(&ind), Rnti(1 + 13 + 14 * 7 + 14 * 80 * 7));

    ind.is_sul = true;
    assert_eq!(
        get_ra_rnti(&ind),
        Rnti(1 + 13 + 14 * 7 + 14 * 80 * 7 + 14 * 80 * 8)
    );
}

#[test]
fn test_msg3_delay_table() {
    let td = PuschTimeDomainAlloc {
        k2: 4,
        symbols: (0, 14),
    };
    // Delta per numerology: 2, 3, 4, 6.
    assert_eq!(get_msg3_delay(&td, 0), 6);
    assert_eq!(get_msg3_delay(&td, 1), 7);
    assert_eq!(get_msg3_delay(&td, 2), 8);
    assert_eq!(get_msg3_delay(&td, 3), 10);
}

#[test]
fn test_single_rach_fdd() {
    let cfg = fdd_cfg(52);
    let mut pool = CellResourceGridPool::new(cfg.clone());
    let mut ra = RaScheduler::new(cfg.clone());

    assert!(ra.handle_rach_indication(rach(0x4601, sl(7), 0)));

    // The gNB schedules two slots ahead of the PRACH reception.
    pool.slot_indication(sl(9));
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);

    let grid = alloc.grid(0);
    assert_eq!(grid.dl.rar_grants.len(), 1);
    let rar = &grid.dl.rar_grants[0];
    assert_eq!(rar.ra_rnti, Rnti(99)); // 1 + 0 + 14 * 7
    assert_eq!(rar.grants.len(), 1);
    let msg3 = &rar.grants[0];
    assert_eq!(msg3.temp_crnti, Rnti(0x4601));
    assert_eq!(msg3.rapid, 0);
    assert_eq!(msg3.prbs.length(), 3);

    // Exactly 4 DL PRBs claimed in the RAR slot.
    assert_eq!(grid.dl_prbs.count(), 4);

    // Msg3 PUSCH sits k2 + Delta = 6 slots later with exactly 3 UL PRBs.
    let msg3_delay = get_msg3_delay(&cfg.pusch_td_alloc_list[0], 0);
    let msg3_grid = alloc.grid(msg3_delay);
    assert_eq!(msg3_grid.ul.puschs.len(), 1);
    assert_eq!(msg3_grid.ul.puschs[0].crnti, Rnti(0x4601));
    assert_eq!(msg3_grid.ul.puschs[0].mcs, 0);
    assert_eq!(msg3_grid.ul_prbs.count(), 3);

    // The Msg3 HARQ was installed.
    assert!(!ra.msg3_harq(Rnti(0x4601)).empty());
    assert_eq!(ra.msg3_harq(Rnti(0x4601)).max_nof_retx(), 4);
}

#[test]
fn test_sixteen_rachs_same_occasion() {
    let cfg = fdd_cfg(106);
    let mut pool = CellResourceGridPool::new(cfg.clone());
    let mut ra = RaScheduler::new(cfg.clone());

    for i in 0..16u16 {
        assert!(ra.handle_rach_indication(rach(0x4601 + i, sl(7), i as u8)));
    }

    pool.slot_indication(sl(9));
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);

    // Exactly one RAR with all 16 Msg3 sub-grants.
    let grid = alloc.grid(0);
    assert_eq!(grid.dl.rar_grants.len(), 1);
    let rar = &grid.dl.rar_grants[0];
    assert_eq!(rar.grants.len(), 16);

    // TC-RNTIs are unique and the PRB intervals pairwise disjoint.
    let msg3_delay = get_msg3_delay(&cfg.pusch_td_alloc_list[0], 0);
    let mut total_prbs = 0;
    for (i, a) in rar.grants.iter().enumerate() {
        total_prbs += a.prbs.length();
        for b in rar.grants.iter().skip(i + 1) {
            assert_ne!(a.temp_crnti, b.temp_crnti);
            assert!(!a.prbs.overlaps(&b.prbs));
        }
        assert!(a.prbs.stop() <= cfg.nof_ul_prbs);
    }
    assert_eq!(total_prbs, 48);
    assert_eq!(grid.dl_prbs.count(), 64);
    assert_eq!(alloc.grid(msg3_delay).ul_prbs.count(), 48);
    assert_eq!(alloc.grid(msg3_delay).ul.puschs.len(), 16);
}

#[test]
fn test_seventeenth_rach_on_full_rar_rejected() {
    let cfg = fdd_cfg(106);
    let mut ra = RaScheduler::new(cfg);
    for i in 0..16u16 {
        assert!(ra.handle_rach_indication(rach(0x4601 + i, sl(7), i as u8)));
    }
    assert!(!ra.handle_rach_indication(rach(0x4611, sl(7), 16)));
}

#[test]
fn test_duplicate_tc_rnti_rejected_while_msg3_outstanding() {
    let cfg = fdd_cfg(52);
    let mut pool = CellResourceGridPool::new(cfg.clone());
    let mut ra = RaScheduler::new(cfg);

    assert!(ra.handle_rach_indication(rach(0x4601, sl(7), 0)));
    pool.slot_indication(sl(9));
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);
    assert!(!ra.msg3_harq(Rnti(0x4601)).empty());

    // Same TC-RNTI while its Msg3 HARQ is busy: duplicate, rejected.
    assert!(!ra.handle_rach_indication(rach(0x4601, sl(12), 1)));
}

#[test]
fn test_rar_window_expiry_discards() {
    let cfg = fdd_cfg(52);
    let mut pool = CellResourceGridPool::new(cfg.clone());
    let mut ra = RaScheduler::new(cfg);

    assert!(ra.handle_rach_indication(rach(0x4601, sl(7), 0)));

    // Window is [8, 18). Idle until it has passed.
    advance(&mut pool, 8, 18);
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);

    // Nothing allocated and no retry across windows.
    assert!(alloc.grid(0).dl.rar_grants.is_empty());
    assert!(ra.msg3_harq(Rnti(0x4601)).empty());

    pool.slot_indication(sl(19));
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);
    assert!(alloc.grid(0).dl.rar_grants.is_empty());
}

#[test]
fn test_not_scheduled_before_window_start() {
    let cfg = fdd_cfg(52);
    let mut pool = CellResourceGridPool::new(cfg.clone());
    let mut ra = RaScheduler::new(cfg);

    assert!(ra.handle_rach_indication(rach(0x4601, sl(7), 0)));

    // At slot 7 the window [8, 18) has not opened yet.
    pool.slot_indication(sl(7));
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);
    assert!(alloc.grid(0).dl.rar_grants.is_empty());

    pool.slot_indication(sl(8));
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);
    assert_eq!(alloc.grid(0).dl.rar_grants.len(), 1);
}

#[test]
fn test_partial_allocation_compacts_and_retries() {
    // 8 DL PRBs fit only two 4-PRB RAR shares per slot.
    let cfg = fdd_cfg(8);
    let mut pool = CellResourceGridPool::new(cfg.clone());
    let mut ra = RaScheduler::new(cfg);

    for i in 0..3u16 {
        assert!(ra.handle_rach_indication(rach(0x4601 + i, sl(7), i as u8)));
    }

    pool.slot_indication(sl(8));
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);
    let rar = &alloc.grid(0).dl.rar_grants[0];
    assert_eq!(rar.grants.len(), 2);
    assert_eq!(rar.grants[0].temp_crnti, Rnti(0x4601));
    assert_eq!(rar.grants[1].temp_crnti, Rnti(0x4602));
    assert!(ra.msg3_harq(Rnti(0x4603)).empty());

    // The remaining TC-RNTI is served the next slot.
    pool.slot_indication(sl(9));
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);
    let rar = &alloc.grid(0).dl.rar_grants[0];
    assert_eq!(rar.grants.len(), 1);
    assert_eq!(rar.grants[0].temp_crnti, Rnti(0x4603));
    assert!(!ra.msg3_harq(Rnti(0x4603)).empty());
}

fn tdd_cfg() -> Arc<CellConfig> {
    // DDDFU: 3 DL slots, one flexible, one UL slot per 5-slot period.
    let tdd = TddConfig {
        pattern1: TddPattern {
            nof_slots: 5,
            nof_dl_slots: 3,
            nof_dl_symbols: 0,
            nof_ul_slots: 1,
            nof_ul_symbols: 0,
        },
        pattern2: None,
    };
    Arc::new(
        CellConfig::new(
            0,
            1,
            0,
            52,
            52,
            Some(tdd),
            10,
            vec![
                // Delay 3: lands on a flexible slot, never usable.
                PuschTimeDomainAlloc {
                    k2: 1,
                    symbols: (0, 14),
                },
                // Delay 4: lands on the UL slot when PDCCH is at slot 0
                // of the period.
                PuschTimeDomainAlloc {
                    k2: 2,
                    symbols: (0, 14),
                },
            ],
        )
        .unwrap(),
    )
}

#[test]
fn test_tdd_window_starts_at_next_dl_slot() {
    let cfg = tdd_cfg();
    let mut pool = CellResourceGridPool::new(cfg.clone());
    let mut ra = RaScheduler::new(cfg);

    // PRACH in the UL slot 4; the first DL-enabled slot after 4 + 1 is 5.
    assert!(ra.handle_rach_indication(rach(0x4601, sl(4), 0)));

    pool.slot_indication(sl(5));
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);

    // Slot 5 is DL-enabled and 5 + 4 = 9 is the UL slot: allocation
    // succeeds with the second PUSCH candidate.
    assert_eq!(alloc.grid(0).dl.rar_grants.len(), 1);
    assert_eq!(alloc.grid(4).ul.puschs.len(), 1);
    assert!(alloc.grid(3).ul.puschs.is_empty());
}

#[test]
fn test_tdd_skips_non_dl_pdcch_slot() {
    let cfg = tdd_cfg();
    let mut pool = CellResourceGridPool::new(cfg.clone());
    let mut ra = RaScheduler::new(cfg);

    assert!(ra.handle_rach_indication(rach(0x4601, sl(2), 0)));

    // Slot 3 is neither DL nor UL enabled: the scheduler must not place
    // anything.
    pool.slot_indication(sl(3));
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);
    assert!(alloc.grid(0).dl.rar_grants.is_empty());

    // Slot 4 is the UL slot: still no DL for the RAR itself.
    pool.slot_indication(sl(4));
    let mut alloc = CellResourceAllocator::new(&mut pool);
    ra.run_slot(&mut alloc);
    assert!(alloc.grid(0).dl.rar_grants.is_empty());
}
