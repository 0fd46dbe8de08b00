//! PHY modes and the timing values derived from them.
//!
//! All durations are in microseconds unless a name ends in `_sym`, in which case they're in
//! symbols of the current PHY.

/// aMinTurnaroundTime of the SUN PHYs in µs.
const MIN_TURNAROUND_TIME_SUN_US: u16 = 1000;
/// aTurnaroundTime of the legacy O-QPSK PHY in symbols.
const TURNAROUND_TIME_LEGACY_SYM: u16 = 12;
/// ACK wait duration of the legacy O-QPSK PHY in symbols.
const ACK_WAIT_DURATION_LEGACY_SYM: u16 = 54;
/// Offset applied to the sensitivity values, to get the CCA threshold.
const CCA_OFFSET: i8 = 10;
/// The CCA threshold is lowered by this much, if FEC is enabled.
const FSK_CCA_THRES_FEC_OFFSET: i8 = 6;

/// CCA threshold in dBm for each [FskSymRate].
const FSK_CCA_THRES: [i8; 6] = [
    -91 + CCA_OFFSET,
    -88 + CCA_OFFSET,
    -86 + CCA_OFFSET,
    -85 + CCA_OFFSET,
    -83 + CCA_OFFSET,
    -82 + CCA_OFFSET,
];
/// CCA threshold in dBm. Rows are the MCS, columns the option.
const OFDM_CCA_THRES: [[i8; 4]; 7] = [
    [-103 + CCA_OFFSET, -105 + CCA_OFFSET, -105 + CCA_OFFSET, -105 + CCA_OFFSET],
    [-100 + CCA_OFFSET, -103 + CCA_OFFSET, -105 + CCA_OFFSET, -105 + CCA_OFFSET],
    [-97 + CCA_OFFSET, -100 + CCA_OFFSET, -103 + CCA_OFFSET, -105 + CCA_OFFSET],
    [-94 + CCA_OFFSET, -97 + CCA_OFFSET, -100 + CCA_OFFSET, -103 + CCA_OFFSET],
    [-91 + CCA_OFFSET, -94 + CCA_OFFSET, -97 + CCA_OFFSET, -100 + CCA_OFFSET],
    [-88 + CCA_OFFSET, -91 + CCA_OFFSET, -94 + CCA_OFFSET, -97 + CCA_OFFSET],
    [-85 + CCA_OFFSET, -88 + CCA_OFFSET, -91 + CCA_OFFSET, -94 + CCA_OFFSET],
];
/// Data rate in kbit/s. Rows are the MCS, columns the option.
const OFDM_DATA_RATE_KBPS: [[u16; 4]; 7] = [
    [100, 50, 25, 12],
    [200, 100, 50, 25],
    [400, 200, 100, 50],
    [800, 400, 200, 100],
    [1200, 600, 300, 150],
    [1600, 800, 400, 200],
    [2400, 1200, 600, 300],
];
const OQPSK_CCA_THRES: i8 = -90;
const LEGACY_OQPSK_CCA_THRES: i8 = -85 + CCA_OFFSET;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FskSymRate {
    #[default]
    Ksym50,
    Ksym100,
    Ksym150,
    Ksym200,
    Ksym300,
    Ksym400,
}
impl FskSymRate {
    pub const fn ksym_per_second(self) -> u32 {
        match self {
            Self::Ksym50 => 50,
            Self::Ksym100 => 100,
            Self::Ksym150 => 150,
            Self::Ksym200 => 200,
            Self::Ksym300 => 300,
            Self::Ksym400 => 400,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FskModType {
    #[default]
    F2Fsk,
    F4Fsk,
}

/// Parameters of the MR-FSK PHY.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FskParams {
    pub sym_rate: FskSymRate,
    pub mod_type: FskModType,
    /// Modulation index, multiplied by 8.
    pub mod_idx: u8,
    pub fec_enabled: bool,
    /// Preamble length in octets.
    pub preamble_length: u8,
}
impl Default for FskParams {
    fn default() -> Self {
        Self {
            sym_rate: FskSymRate::Ksym50,
            mod_type: FskModType::F2Fsk,
            mod_idx: 8,
            fec_enabled: false,
            preamble_length: 8,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OfdmOption {
    #[default]
    Option1,
    Option2,
    Option3,
    Option4,
}

/// Parameters of the MR-OFDM PHY.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OfdmParams {
    pub option: OfdmOption,
    /// Modulation and coding scheme, 0 to 6.
    pub mcs: u8,
    pub interleaving: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OqpskChipRate {
    Kchip100,
    Kchip200,
    #[default]
    Kchip1000,
    Kchip2000,
}
impl OqpskChipRate {
    pub const fn kchip_per_second(self) -> u32 {
        match self {
            Self::Kchip100 => 100,
            Self::Kchip200 => 200,
            Self::Kchip1000 => 1000,
            Self::Kchip2000 => 2000,
        }
    }
    const fn symbol_duration_us(self) -> u16 {
        match self {
            Self::Kchip100 => 320,
            Self::Kchip200 => 160,
            Self::Kchip1000 | Self::Kchip2000 => 64,
        }
    }
    /// Chips per symbol.
    const fn symbol_length(self) -> u16 {
        match self {
            Self::Kchip100 | Self::Kchip200 => 32,
            Self::Kchip1000 => 64,
            Self::Kchip2000 => 128,
        }
    }
    const fn cca_duration_sym(self) -> u16 {
        match self {
            Self::Kchip100 | Self::Kchip200 => 4,
            Self::Kchip1000 | Self::Kchip2000 => 8,
        }
    }
    const fn shr_duration_sym(self) -> u16 {
        match self {
            Self::Kchip100 | Self::Kchip200 => 48,
            Self::Kchip1000 | Self::Kchip2000 => 72,
        }
    }
}

/// Parameters of the MR-O-QPSK PHY.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OqpskParams {
    pub chip_rate: OqpskChipRate,
    /// Rate mode, 0 to 4.
    pub rate_mode: u8,
}
impl OqpskParams {
    /// Spreading factor of the PSDU.
    const fn spreading(&self) -> u16 {
        if self.rate_mode >= 4 {
            return 1;
        }
        let spread = 1 << (3 - self.rate_mode);
        match self.chip_rate {
            OqpskChipRate::Kchip100 | OqpskChipRate::Kchip200 => spread,
            OqpskChipRate::Kchip1000 => spread * 2,
            OqpskChipRate::Kchip2000 => spread * 4,
        }
    }
    /// Duration of the PSDU of an ACK in symbols.
    const fn ack_psdu_duration_sym(&self) -> u16 {
        let symbol_length = self.chip_rate.symbol_length();
        // The ACK is short enough to fit into 63 data bits.
        let psdu_chips = self.spreading() * 2 * 63;
        psdu_chips.div_ceil(symbol_length) + psdu_chips.div_ceil(16 * symbol_length)
    }
}

/// Parameters of the O-QPSK PHY of IEEE 802.15.4-2006.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LegacyOqpskParams {
    pub chip_rate: OqpskChipRate,
    /// Proprietary high data rate mode.
    pub high_rate: bool,
}
impl Default for LegacyOqpskParams {
    fn default() -> Self {
        Self {
            chip_rate: OqpskChipRate::Kchip2000,
            high_rate: false,
        }
    }
}

/// The modulation and its parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phy {
    Fsk(FskParams),
    Ofdm(OfdmParams),
    Oqpsk(OqpskParams),
    LegacyOqpsk(LegacyOqpskParams),
}
impl Phy {
    /// Value of the PT field of the baseband PC register.
    pub(crate) const fn phy_type(&self) -> u8 {
        match self {
            Self::Fsk(_) => 1,
            Self::Ofdm(_) => 2,
            Self::Oqpsk(_) | Self::LegacyOqpsk(_) => 3,
        }
    }
    pub const fn symbol_duration_us(&self) -> u16 {
        match self {
            Self::Fsk(_) => 20,
            Self::Ofdm(_) => 120,
            Self::Oqpsk(params) => params.chip_rate.symbol_duration_us(),
            Self::LegacyOqpsk(_) => 16,
        }
    }
    /// Round a duration up to full symbols.
    pub const fn ceiling_sym(&self, duration_us: u16) -> u16 {
        duration_us.div_ceil(self.symbol_duration_us())
    }
    /// aCCATime in symbols.
    pub const fn cca_duration_sym(&self) -> u16 {
        match self {
            Self::Fsk(_) | Self::Ofdm(_) | Self::LegacyOqpsk(_) => 8,
            Self::Oqpsk(params) => params.chip_rate.cca_duration_sym(),
        }
    }
    /// The energy threshold in dBm, above which the channel is considered busy.
    pub const fn cca_threshold(&self) -> i8 {
        match self {
            Self::Fsk(params) => {
                let threshold = FSK_CCA_THRES[params.sym_rate as usize];
                if params.fec_enabled {
                    threshold - FSK_CCA_THRES_FEC_OFFSET
                } else {
                    threshold
                }
            }
            Self::Ofdm(params) => OFDM_CCA_THRES[ofdm_mcs_row(params.mcs)][params.option as usize],
            Self::Oqpsk(_) => OQPSK_CCA_THRES,
            Self::LegacyOqpsk(_) => LEGACY_OQPSK_CCA_THRES,
        }
    }
    /// Duration of the synchronization header.
    pub const fn shr_duration_sym(&self) -> u16 {
        match self {
            // Preamble plus a two octet SFD.
            Self::Fsk(params) => (params.preamble_length as u16 + 2) * 8,
            Self::Ofdm(_) => 6,
            Self::Oqpsk(params) => params.chip_rate.shr_duration_sym(),
            Self::LegacyOqpsk(_) => 8 + 2,
        }
    }
    /// Duration of the PHY header.
    pub const fn phr_duration_sym(&self) -> u16 {
        match self {
            Self::Fsk(_) => 2 * 8,
            Self::Ofdm(params) => match (params.interleaving, params.option) {
                (true, OfdmOption::Option1) => 4,
                (true, OfdmOption::Option2) => 8,
                (true, _) => 6,
                (false, OfdmOption::Option1) => 3,
                (false, _) => 6,
            },
            Self::Oqpsk(_) => 15,
            Self::LegacyOqpsk(_) => 2,
        }
    }
    /// PSDU data rate in bit/s.
    pub const fn data_rate_bps(&self) -> u32 {
        match self {
            Self::Fsk(params) => {
                let mut rate = params.sym_rate.ksym_per_second() * 1000;
                if matches!(params.mod_type, FskModType::F4Fsk) {
                    rate *= 2;
                }
                if params.fec_enabled {
                    rate /= 2;
                }
                rate
            }
            Self::Ofdm(params) => {
                OFDM_DATA_RATE_KBPS[ofdm_mcs_row(params.mcs)][params.option as usize] as u32
                    * 1000
            }
            Self::Oqpsk(params) => {
                params.chip_rate.kchip_per_second() * 1000 / params.spreading() as u32 / 2
            }
            Self::LegacyOqpsk(params) => {
                let rate = 250_000;
                match (params.high_rate, params.chip_rate) {
                    (false, _) => rate,
                    (true, OqpskChipRate::Kchip1000) => rate * 2,
                    (true, _) => rate * 4,
                }
            }
        }
    }
    /// Duration of one PSDU octet.
    pub const fn octet_duration_us(&self) -> u16 {
        (8_000_000 / self.data_rate_bps()) as u16
    }
    /// Time from the end of a frame to the start of its ACK.
    pub const fn ack_timing_us(&self) -> u16 {
        let ack_sym = match self {
            Self::LegacyOqpsk(_) => TURNAROUND_TIME_LEGACY_SYM,
            _ => self.ceiling_sym(MIN_TURNAROUND_TIME_SUN_US),
        };
        ack_sym * self.symbol_duration_us()
    }
    /// Time to wait for an ACK after the end of a transmission.
    pub const fn ack_wait_duration_us(&self, fcs_len: u8, cca_duration_sym: u16) -> u16 {
        let ack_wait_sym = match self {
            Self::LegacyOqpsk(_) => ACK_WAIT_DURATION_LEGACY_SYM,
            _ => {
                let ack_len = 3 + fcs_len as u16;
                let turnaround_sym =
                    2 * self.ceiling_sym(MIN_TURNAROUND_TIME_SUN_US) + cca_duration_sym;
                let psdu_sym = match self {
                    Self::Fsk(params) => {
                        // The PHR uses the same data rate as the PSDU.
                        let mut len = ack_len + 2;
                        if matches!(params.mod_type, FskModType::F4Fsk) {
                            len /= 2;
                        }
                        if params.fec_enabled {
                            len *= 2;
                        }
                        len * 8
                    }
                    Self::Ofdm(_) => {
                        self.phr_duration_sym()
                            + self.ceiling_sym(ack_len * self.octet_duration_us())
                    }
                    Self::Oqpsk(params) => {
                        self.phr_duration_sym() + params.ack_psdu_duration_sym()
                    }
                    Self::LegacyOqpsk(_) => 0,
                };
                turnaround_sym + self.shr_duration_sym() + psdu_sym
            }
        };
        ack_wait_sym * self.symbol_duration_us()
    }
    /// On air duration of the longest possible frame.
    pub const fn max_frame_duration_us(&self, max_phy_packet_size: u16) -> u32 {
        let header_us =
            (self.shr_duration_sym() + self.phr_duration_sym()) as u32 * self.symbol_duration_us() as u32;
        header_us + (max_phy_packet_size as u32 + 1) * self.octet_duration_us() as u32
    }
}
impl Default for Phy {
    fn default() -> Self {
        Self::Fsk(FskParams::default())
    }
}

const fn ofdm_mcs_row(mcs: u8) -> usize {
    if mcs as usize >= OFDM_DATA_RATE_KBPS.len() {
        OFDM_DATA_RATE_KBPS.len() - 1
    } else {
        mcs as usize
    }
}

/// Frequency bands, that a PHY configuration can refer to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FreqBand {
    China470,
    China780,
    Eu863,
    #[default]
    Us915,
    Korea917,
    Japan920,
    World2450,
}

/// A complete PHY configuration of a transceiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyConfig {
    pub phy: Phy,
    pub freq_band: FreqBand,
    /// Center frequency of channel zero in Hz.
    pub freq_f0: u32,
    /// Channel spacing in Hz.
    pub ch_spacing: u32,
}
impl PhyConfig {
    /// MR-FSK with 50 ksym/s in the US 915 MHz band.
    pub const fn default_sub_ghz() -> Self {
        Self {
            phy: Phy::Fsk(FskParams {
                sym_rate: FskSymRate::Ksym50,
                mod_type: FskModType::F2Fsk,
                mod_idx: 8,
                fec_enabled: false,
                preamble_length: 8,
            }),
            freq_band: FreqBand::Us915,
            freq_f0: 902_200_000,
            ch_spacing: 200_000,
        }
    }
    /// IEEE 802.15.4-2006 O-QPSK in the 2.4 GHz band.
    pub const fn default_2_4_ghz() -> Self {
        Self {
            phy: Phy::LegacyOqpsk(LegacyOqpskParams {
                chip_rate: OqpskChipRate::Kchip2000,
                high_rate: false,
            }),
            freq_band: FreqBand::World2450,
            freq_f0: 2_405_000_000,
            ch_spacing: 5_000_000,
        }
    }
}
