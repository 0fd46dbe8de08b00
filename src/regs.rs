//! Register map of the AT86RF215.
//!
//! Only the registers used by the TAL are listed. Addresses are those of the RF09 and BBC0
//! blocks; use [TrxId::reg](crate::TrxId::reg) to reach the second core.
use bitfield_struct::bitfield;
use macro_bits::serializable_enum;

use crate::hal::SubRegister;

// Common registers.
pub const RG_RF09_IRQS: u16 = 0x0000;
pub const RG_RF_RST: u16 = 0x0005;
pub const RG_RF_CFG: u16 = 0x0006;
pub const RG_RF_CLKO: u16 = 0x0007;
pub const RG_RF_PN: u16 = 0x000d;
pub const RG_RF_VN: u16 = 0x000e;

pub const SR_RF_CFG_IRQP: SubRegister = SubRegister::new(RG_RF_CFG, 0x04, 2);
pub const SR_RF_CLKO_OS: SubRegister = SubRegister::new(RG_RF_CLKO, 0x07, 0);

/// IRQS registers of RF09, RF24, BBC0 and BBC1 in that order.
pub const IRQS_LEN: usize = 4;

// RF block.
pub const RG_RF09_IRQM: u16 = 0x0100;
pub const RG_RF09_AUXS: u16 = 0x0101;
pub const RG_RF09_STATE: u16 = 0x0102;
pub const RG_RF09_CMD: u16 = 0x0103;
pub const RG_RF09_CS: u16 = 0x0104;
pub const RG_RF09_CCF0L: u16 = 0x0105;
pub const RG_RF09_CNL: u16 = 0x0107;
pub const RG_RF09_CNM: u16 = 0x0108;
pub const RG_RF09_RXBWC: u16 = 0x0109;
pub const RG_RF09_AGCC: u16 = 0x010b;
pub const RG_RF09_EDC: u16 = 0x010e;
pub const RG_RF09_EDD: u16 = 0x010f;
pub const RG_RF09_EDV: u16 = 0x0110;
pub const RG_RF09_RNDV: u16 = 0x0111;
pub const RG_RF09_PAC: u16 = 0x0114;
pub const RG_RF09_PLL: u16 = 0x0121;

pub const SR_RF09_IRQM_EDC: SubRegister = SubRegister::new(RG_RF09_IRQM, 0x04, 2);
pub const SR_RF09_AUXS_AVEN: SubRegister = SubRegister::new(RG_RF09_AUXS, 0x08, 3);
pub const SR_RF09_AGCC_FRZC: SubRegister = SubRegister::new(RG_RF09_AGCC, 0x02, 1);
pub const SR_RF09_AGCC_FRZS: SubRegister = SubRegister::new(RG_RF09_AGCC, 0x04, 2);
pub const SR_RF09_EDC_EDM: SubRegister = SubRegister::new(RG_RF09_EDC, 0x03, 0);
pub const SR_RF09_PAC_TXPWR: SubRegister = SubRegister::new(RG_RF09_PAC, 0x1f, 0);

/// PLL loop bandwidth values, toggled together with the reduced power consumption mode.
pub const PLL_DEFAULT: u8 = 0x08;
pub const PLL_RPC: u8 = 0x09;

/// Receiver bandwidth setting used while sampling noise for the random seed.
pub const RXBWC_RANDOM_SEED: u8 = 0x1b;

// Baseband block.
pub const RG_BBC0_IRQM: u16 = 0x0300;
pub const RG_BBC0_PC: u16 = 0x0301;
pub const RG_BBC0_RXFLL: u16 = 0x0304;
pub const RG_BBC0_TXFLL: u16 = 0x0306;
pub const RG_BBC0_OQPSKC2: u16 = 0x0312;
pub const RG_BBC0_AFC0: u16 = 0x0320;
pub const RG_BBC0_AFC1: u16 = 0x0321;
pub const RG_BBC0_AFFTM: u16 = 0x0322;
pub const RG_BBC0_MACEA0: u16 = 0x0325;
pub const RG_BBC0_MACPID0F0: u16 = 0x032d;
pub const RG_BBC0_MACSHA0F0: u16 = 0x032f;
pub const RG_BBC0_AMCS: u16 = 0x0340;
pub const RG_BBC0_AMEDT: u16 = 0x0341;
pub const RG_BBC0_AMAACKPD: u16 = 0x0342;
pub const RG_BBC0_FSKC1: u16 = 0x0361;
pub const RG_BBC0_FSKRPC: u16 = 0x036c;

pub const SR_BBC0_PC_PT: SubRegister = SubRegister::new(RG_BBC0_PC, 0x03, 0);
pub const SR_BBC0_PC_BBEN: SubRegister = SubRegister::new(RG_BBC0_PC, 0x04, 2);
pub const SR_BBC0_PC_FCST: SubRegister = SubRegister::new(RG_BBC0_PC, 0x08, 3);
pub const SR_BBC0_OQPSKC2_RPC: SubRegister = SubRegister::new(RG_BBC0_OQPSKC2, 0x10, 4);
pub const SR_BBC0_AFC0_AFEN0: SubRegister = SubRegister::new(RG_BBC0_AFC0, 0x01, 0);
pub const SR_BBC0_AFC0_PM: SubRegister = SubRegister::new(RG_BBC0_AFC0, 0x10, 4);
pub const SR_BBC0_AFC1_PANC0: SubRegister = SubRegister::new(RG_BBC0_AFC1, 0x10, 4);
pub const SR_BBC0_AMCS_TX2RX: SubRegister = SubRegister::new(RG_BBC0_AMCS, 0x01, 0);
pub const SR_BBC0_AMCS_CCATX: SubRegister = SubRegister::new(RG_BBC0_AMCS, 0x02, 1);
pub const SR_BBC0_AMCS_CCAED: SubRegister = SubRegister::new(RG_BBC0_AMCS, 0x04, 2);
pub const SR_BBC0_AMCS_AACK: SubRegister = SubRegister::new(RG_BBC0_AMCS, 0x08, 3);
pub const SR_BBC0_AMCS_AACKFT: SubRegister = SubRegister::new(RG_BBC0_AMCS, 0x80, 7);
pub const SR_BBC0_FSKC1_SRATE: SubRegister = SubRegister::new(RG_BBC0_FSKC1, 0x0f, 0);
pub const SR_BBC0_FSKRPC_EN: SubRegister = SubRegister::new(RG_BBC0_FSKRPC, 0x08, 3);

/// Pending data bits of the auto ACK for all four address filters.
pub const AMAACKPD_ALL_FILTERS: u8 = 0x0f;

// Frame buffers.
pub const RG_BBC0_FBRXS: u16 = 0x2000;
pub const RG_BBC0_FBTXS: u16 = 0x2800;

/// Value of the AMCS register after configuration: automatic ACK enabled.
pub const AMCS_AACK: u8 = 0x08;

/// Frequencies are programmed in steps of 25 kHz.
pub const FREQ_STEP_HZ: u32 = 25_000;
/// The 2.4 GHz core counts its center frequency from this offset.
pub const FREQ_OFFSET_2_4_GHZ_HZ: u32 = 1_500_000_000;

/// Part number of the AT86RF215.
#[cfg(dual_trx)]
pub const PART_NUMBER: u8 = 0x34;
/// Part number of the AT86RF215M.
#[cfg(not(dual_trx))]
pub const PART_NUMBER: u8 = 0x36;

serializable_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    /// States and commands of the radio state machine.
    ///
    /// The same encoding is used for the CMD and the STATE register.
    pub enum RfCmdState: u8 {
        Nop => 0x00,
        Sleep => 0x01,
        #[default]
        TrxOff => 0x02,
        TxPrep => 0x03,
        Tx => 0x04,
        Rx => 0x05,
        Transition => 0x06,
        Reset => 0x07
    }
}

serializable_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    /// Energy detection mode.
    pub enum EdMode: u8 {
        /// A measurement is started automatically for every received frame and for CCA.
        #[default]
        Auto => 0x00,
        Single => 0x01,
        Continuous => 0x02,
        Off => 0x03
    }
}

/// Interrupts of the radio block.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct RfIrq {
    pub wakeup: bool,
    pub trx_ready: bool,
    pub ed_complete: bool,
    pub battery_low: bool,
    pub trx_error: bool,
    pub iq_if_sync_fail: bool,
    #[bits(2)]
    pub __: u8,
}

/// Interrupts of the baseband block.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct BbIrq {
    pub rx_frame_start: bool,
    pub rx_frame_end: bool,
    pub rx_address_match: bool,
    pub rx_extended_match: bool,
    pub tx_frame_end: bool,
    pub agc_hold: bool,
    pub agc_release: bool,
    pub frame_buffer_level: bool,
}

/// Averaging time of an energy measurement.
///
/// The duration is `df * dtb`.
#[bitfield(u8)]
pub struct EdDuration {
    /// Time basis: 2 µs, 8 µs, 32 µs or 128 µs.
    #[bits(2)]
    pub dtb: u8,
    /// Factor.
    #[bits(6)]
    pub df: u8,
}
impl EdDuration {
    /// Longest duration, that can be measured.
    pub const MAX_US: u16 = 63 * 128;

    /// Pick the largest time basis, that divides the duration evenly.
    ///
    /// `None` if the duration can't be encoded exactly.
    pub const fn try_from_us(duration_us: u16) -> Option<Self> {
        let (dtb, basis) = if duration_us % 128 == 0 {
            (3, 128)
        } else if duration_us % 32 == 0 {
            (2, 32)
        } else if duration_us % 8 == 0 {
            (1, 8)
        } else {
            (0, 2)
        };
        if duration_us % basis != 0 || duration_us / basis > 63 {
            return None;
        }
        Some(Self::new().with_dtb(dtb).with_df((duration_us / basis) as u8))
    }
    /// Like [Self::try_from_us], but rounds down to the next duration, that can be encoded.
    pub const fn from_us(duration_us: u16) -> Self {
        if let Some(edd) = Self::try_from_us(duration_us) {
            return edd;
        }
        let duration_us = if duration_us > Self::MAX_US {
            Self::MAX_US
        } else {
            duration_us
        };
        let (dtb, basis) = if duration_us > 63 * 32 {
            (3, 128)
        } else if duration_us > 63 * 8 {
            (2, 32)
        } else if duration_us > 63 * 2 {
            (1, 8)
        } else {
            (0, 2)
        };
        Self::new()
            .with_dtb(dtb)
            .with_df((duration_us / basis) as u8)
    }
}
