use crate::bitset::BitSet;
use std::fmt;

/// Maximum number of PRBs in a bandwidth part (TS 38.101, 100 MHz @ 30 kHz).
pub const MAX_NOF_PRBS: usize = 275;

const PRB_WORDS: usize = MAX_NOF_PRBS.div_ceil(64);

/// Half-open interval of PRB indices `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrbInterval {
    start: u16,
    stop: u16,
}

impl PrbInterval {
    pub fn new(start: u16, stop: u16) -> Self {
        debug_assert!(start <= stop, "invalid PRB interval [{start}, {stop})");
        Self { start, stop }
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn stop(&self) -> u16 {
        self.stop
    }

    pub fn length(&self) -> u16 {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    pub fn contains(&self, prb: u16) -> bool {
        prb >= self.start && prb < self.stop
    }

    pub fn overlaps(&self, other: &PrbInterval) -> bool {
        self.start < other.stop && other.start < self.stop
    }

    /// Shrinks the interval to `len` PRBs, keeping the start.
    pub fn resize_to(&mut self, len: u16) {
        debug_assert!(len <= self.length());
        self.stop = self.start + len;
    }
}

impl fmt::Display for PrbInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.stop)
    }
}

/// Occupancy bitmap over the PRBs of one bandwidth part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrbBitmap {
    bits: BitSet<PRB_WORDS>,
    len: u16,
}

impl PrbBitmap {
    /// Creates an all-clear bitmap of `len` PRBs (at most [`MAX_NOF_PRBS`]).
    pub fn new(len: u16) -> Self {
        debug_assert!(len as usize <= MAX_NOF_PRBS);
        Self {
            bits: BitSet::new(),
            len,
        }
    }

    pub fn len(&self) -> u16 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn test(&self, prb: u16) -> bool {
        self.bits.get(prb as usize)
    }

    pub fn set(&mut self, prb: u16) {
        debug_assert!(prb < self.len);
        self.bits.set(prb as usize);
    }

    /// Marks every PRB of `interval` as used.
    pub fn fill(&mut self, interval: PrbInterval) {
        debug_assert!(interval.stop() <= self.len);
        self.bits
            .fill_range(interval.start() as usize, interval.stop() as usize);
    }

    pub fn reset(&mut self) {
        self.bits.clear();
    }

    pub fn any(&self) -> bool {
        self.bits.any()
    }

    pub fn all(&self) -> bool {
        self.count() == self.len as usize
    }

    /// Number of used PRBs.
    pub fn count(&self) -> usize {
        self.bits.count_ones_between(0, self.len as usize)
    }

    fn next_zero(&self, start: u16) -> Option<u16> {
        self.bits
            .next_zero(start as usize, self.len as usize)
            .map(|i| i as u16)
    }

    fn next_one(&self, start: u16) -> Option<u16> {
        self.bits
            .next_one(start as usize, self.len as usize)
            .map(|i| i as u16)
    }
}

/// Returns the lowest clear run starting at or after `start`, or an empty
/// interval if the bitmap is fully used from `start` on.
pub fn find_next_empty_interval(mask: &PrbBitmap, start: u16) -> PrbInterval {
    match mask.next_zero(start) {
        Some(rb_start) => {
            let rb_stop = mask.next_one(rb_start + 1).unwrap_or(mask.len());
            PrbInterval::new(rb_start, rb_stop)
        }
        None => PrbInterval::default(),
    }
}

/// Returns the lowest clear run of length >= `nof_prbs` starting at or after
/// `start`, trimmed to exactly `nof_prbs`. If no run is long enough, the
/// longest clear run found is returned instead.
pub fn find_empty_interval_of_length(mask: &PrbBitmap, nof_prbs: u16, start: u16) -> PrbInterval {
    let mut max_interv = PrbInterval::default();
    let mut search_start = start;
    while search_start < mask.len() {
        let interv = find_next_empty_interval(mask, search_start);
        if interv.is_empty() {
            break;
        }
        if interv.length() >= nof_prbs {
            return PrbInterval::new(interv.start(), interv.start() + nof_prbs);
        }
        if interv.length() > max_interv.length() {
            max_interv = interv;
        }
        search_start = interv.stop() + 1;
    }
    max_interv
}
