use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Number of system frame numbers before the SFN counter wraps.
pub const NOF_SFNS: u32 = 1024;

/// A point in slotted time: a numerology (subcarrier-spacing family) plus a
/// slot count that wraps modulo 1024 frames.
///
/// Slot points are totally ordered within one numerology; the order is
/// defined through the signed wrapping distance, so comparisons remain
/// correct across the wrap as long as the two points are less than half the
/// counter range apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotPoint {
    numerology: u8,
    count: u32,
}

impl SlotPoint {
    /// Creates a slot point. `numerology` must be in `0..=3`; `count` is
    /// taken modulo the counter range of that numerology.
    pub fn new(numerology: u8, count: u32) -> Self {
        debug_assert!(numerology <= 3, "invalid numerology {numerology}");
        let total = NOF_SFNS * 10 * (1u32 << numerology);
        Self {
            numerology,
            count: count % total,
        }
    }

    pub fn numerology(&self) -> u8 {
        self.numerology
    }

    pub fn to_u32(&self) -> u32 {
        self.count
    }

    pub fn nof_slots_per_frame(&self) -> u32 {
        10 * (1u32 << self.numerology)
    }

    pub fn nof_slots_per_subframe(&self) -> u32 {
        1u32 << self.numerology
    }

    /// Slot index within the current frame.
    pub fn slot_index(&self) -> u32 {
        self.count % self.nof_slots_per_frame()
    }

    /// System frame number.
    pub fn sfn(&self) -> u32 {
        self.count / self.nof_slots_per_frame()
    }

    fn total(&self) -> u32 {
        NOF_SFNS * self.nof_slots_per_frame()
    }
}

impl Add<u32> for SlotPoint {
    type Output = SlotPoint;

    fn add(self, rhs: u32) -> SlotPoint {
        SlotPoint {
            numerology: self.numerology,
            count: (self.count + rhs) % self.total(),
        }
    }
}

impl AddAssign<u32> for SlotPoint {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl Sub<SlotPoint> for SlotPoint {
    type Output = i32;

    /// Signed wrapping slot distance, rebased into `[-total/2, total/2)`.
    fn sub(self, rhs: SlotPoint) -> i32 {
        debug_assert_eq!(self.numerology, rhs.numerology);
        let total = self.total();
        let diff = (self.count + total - rhs.count) % total;
        if diff >= total / 2 {
            diff as i32 - total as i32
        } else {
            diff as i32
        }
    }
}

impl PartialOrd for SlotPoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.numerology != other.numerology {
            return None;
        }
        Some((*self - *other).cmp(&0))
    }
}

impl fmt::Display for SlotPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.sfn(), self.slot_index())
    }
}
