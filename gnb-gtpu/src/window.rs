//! Sparse sequence-number-indexed SDU store for the Rx reorder window.

/// Modulus of the 16-bit GTP-U sequence-number space.
pub const GTPU_SN_MOD: u32 = 65536;
/// Reorder window size: half the sequence-number space.
pub const GTPU_RX_WINDOW_SIZE: u32 = 32768;

/// Circular store of up to [`GTPU_RX_WINDOW_SIZE`] queued SDUs indexed by
/// sequence number.
///
/// Slot reuse is safe because the window never holds two SDUs whose SNs are
/// [`GTPU_RX_WINDOW_SIZE`] apart: the caller only inserts SNs inside the
/// current window.
#[derive(Debug)]
pub struct SduWindow<T> {
    slots: Vec<Option<T>>,
}

impl<T> SduWindow<T> {
    pub fn new() -> Self {
        let mut slots = Vec::new();
        slots.resize_with(GTPU_RX_WINDOW_SIZE as usize, || None);
        Self { slots }
    }

    fn idx(sn: u16) -> usize {
        (sn as u32 % GTPU_RX_WINDOW_SIZE) as usize
    }

    pub fn has_sn(&self, sn: u16) -> bool {
        self.slots[Self::idx(sn)].is_some()
    }

    /// Stores an SDU at `sn`, replacing any stale occupant.
    pub fn add_sn(&mut self, sn: u16, sdu: T) {
        self.slots[Self::idx(sn)] = Some(sdu);
    }

    pub fn remove_sn(&mut self, sn: u16) -> Option<T> {
        self.slots[Self::idx(sn)].take()
    }

    pub fn get(&self, sn: u16) -> Option<&T> {
        self.slots[Self::idx(sn)].as_ref()
    }
}

impl<T> Default for SduWindow<T> {
    fn default() -> Self {
        Self::new()
    }
}
