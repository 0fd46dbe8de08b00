/// Number of radio cores on the chip.
#[cfg(dual_trx)]
pub const NUM_TRX: usize = 2;
#[cfg(not(dual_trx))]
pub const NUM_TRX: usize = 1;

/// Address distance between the register blocks of the two cores.
///
/// This is the same for the RF and the baseband blocks.
const REG_BLOCK_OFFSET: u16 = 0x100;
/// Address distance between the frame buffers of the two baseband cores.
const FRAME_BUFFER_OFFSET: u16 = 0x1000;

/// Identifies one radio core of the transceiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrxId {
    /// The sub-GHz core.
    Rf09,
    /// The 2.4 GHz core.
    #[cfg(dual_trx)]
    Rf24,
}
impl TrxId {
    #[cfg(dual_trx)]
    pub const ALL: [TrxId; NUM_TRX] = [TrxId::Rf09, TrxId::Rf24];
    #[cfg(not(dual_trx))]
    pub const ALL: [TrxId; NUM_TRX] = [TrxId::Rf09];

    pub const fn index(self) -> usize {
        self as usize
    }
    /// Translate a register address of the RF09/BBC0 block into the block of this core.
    pub const fn reg(self, addr: u16) -> u16 {
        addr + REG_BLOCK_OFFSET * self as u16
    }
    /// Translate a frame buffer address of BBC0 into the frame buffer of this core.
    pub const fn frame_buffer(self, addr: u16) -> u16 {
        addr + FRAME_BUFFER_OFFSET * self as u16
    }
}

/// The target of a reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrxSelect {
    Single(TrxId),
    /// Reset the whole chip through the reset line.
    Both,
}
impl TrxSelect {
    pub(crate) fn contains(self, trx: TrxId) -> bool {
        match self {
            Self::Single(selected) => selected == trx,
            Self::Both => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_offsets() {
        assert_eq!(TrxId::Rf09.reg(0x103), 0x103);
        assert_eq!(TrxId::Rf09.frame_buffer(0x2000), 0x2000);
        #[cfg(dual_trx)]
        {
            assert_eq!(TrxId::Rf24.reg(0x103), 0x203);
            assert_eq!(TrxId::Rf24.reg(0x304), 0x404);
            assert_eq!(TrxId::Rf24.frame_buffer(0x2000), 0x3000);
        }
    }
}
