use std::fmt;

/// Radio Network Temporary Identifier.
///
/// Covers C-RNTI, TC-RNTI and RA-RNTI values; the interpretation depends on
/// where it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Rnti(pub u16);

impl Rnti {
    pub const INVALID: Rnti = Rnti(0);

    pub fn to_u16(self) -> u16 {
        self.0
    }
}

impl From<u16> for Rnti {
    fn from(val: u16) -> Self {
        Rnti(val)
    }
}

impl fmt::Display for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}
