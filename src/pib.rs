use macro_bits::serializable_enum;

use crate::{
    error::{TalError, TalResult},
    frame::FrameType,
    phy::{FreqBand, Phy, PhyConfig},
    pool::MAX_PHY_PACKET_SIZE,
    regs::EdDuration,
    trx::TrxId,
};

/// Highest value of the TXPWR field.
const MAX_TX_POWER: u8 = 0x1f;

serializable_enum! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    /// Numeric identifiers of the PIB attributes.
    pub enum PibAttribute: u8 {
        CurrentChannel => 0x00,
        TransmitPower => 0x02,
        CurrentPage => 0x04,
        MaxFrameDuration => 0x05,
        ShrDuration => 0x06,
        SymbolsPerOctet => 0x07,
        PanCoordinator => 0x0b,
        MaxCsmaBackoffs => 0x4e,
        MinBe => 0x4f,
        PanId => 0x50,
        PromiscuousMode => 0x51,
        ShortAddress => 0x53,
        MaxBe => 0x57,
        MaxFrameRetries => 0x59,
        PhySetting => 0xc0,
        FcsType => 0xc1,
        RpcEnabled => 0xc2,
        CcaThreshold => 0xc3,
        CcaDuration => 0xc4,
        SymbolDuration => 0xc5,
        AckWaitDuration => 0xc6,
        AckTiming => 0xc7,
        MaxNumRxFramesDuringBackoff => 0xc8,
        NumRxFramesDuringBackoff => 0xc9,
        FrameTypes => 0xca,
        CcaTimeMethod => 0xcb,
        FcsLength => 0xcc,
        IeeeAddress => 0xf0
    }
}

/// The value of a PIB attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PibValue {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    U32(u32),
    U64(u64),
    Phy(PhyConfig),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FcsType {
    #[default]
    Crc32,
    Crc16,
}
impl FcsType {
    pub const fn len(self) -> u8 {
        match self {
            Self::Crc32 => 4,
            Self::Crc16 => 2,
        }
    }
}

/// The hardware configuration, that has to be rewritten after an attribute changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PibUpdate {
    None,
    /// The PHY changed, so everything derived from it has to be reapplied.
    Phy,
    Channel,
    TransmitPower,
    AddressFilter,
    FrameFilter,
    Fcs,
}

/// The PHY information base of one transceiver.
///
/// Fields below [Pib::symbol_duration_us] are derived from the PHY and are read-only through
/// [Tal::pib_set](crate::Tal::pib_set).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pib {
    pub phy: PhyConfig,
    pub current_channel: u16,
    pub current_page: u8,
    /// Value of the TXPWR field, 0 to 31.
    pub transmit_power: u8,
    pub pan_id: u16,
    pub short_address: u16,
    pub ieee_address: u64,
    pub pan_coordinator: bool,
    pub promiscuous_mode: bool,
    /// Bitmap of the [FrameType]s, which pass the frame filter.
    pub frame_types: u8,
    pub min_be: u8,
    pub max_be: u8,
    pub max_csma_backoffs: u8,
    pub max_frame_retries: u8,
    /// While fewer frames than this were received during the backoffs of one transmission, the
    /// receiver stays on during backoff.
    pub max_num_rx_frames_during_backoff: u8,
    /// Frames received during the backoffs of the ongoing transmission.
    pub num_rx_frames_during_backoff: u8,
    pub fcs_type: FcsType,
    pub rpc_enabled: bool,
    /// If set in the Japanese band, the CCA duration isn't derived from the PHY.
    pub cca_time_method: bool,

    pub symbol_duration_us: u16,
    pub cca_duration_sym: u16,
    pub cca_duration_us: u16,
    pub cca_threshold: i8,
    pub fcs_len: u8,
    pub octet_duration_us: u16,
    pub ack_wait_duration_us: u16,
    pub ack_timing_us: u16,
    pub max_frame_duration_us: u32,
}
impl Pib {
    /// The default configuration of a transceiver.
    pub fn new(trx: TrxId) -> Self {
        let (phy, current_channel) = match trx {
            TrxId::Rf09 => (PhyConfig::default_sub_ghz(), 0),
            #[cfg(dual_trx)]
            TrxId::Rf24 => (PhyConfig::default_2_4_ghz(), 11),
        };
        let mut pib = Self {
            phy,
            current_channel,
            current_page: 0,
            transmit_power: MAX_TX_POWER,
            pan_id: 0xffff,
            short_address: 0xffff,
            ieee_address: 0,
            pan_coordinator: false,
            promiscuous_mode: false,
            frame_types: FrameType::DEFAULT_FILTER,
            min_be: 3,
            max_be: 5,
            max_csma_backoffs: 4,
            max_frame_retries: 3,
            max_num_rx_frames_during_backoff: 1,
            num_rx_frames_during_backoff: 0,
            fcs_type: FcsType::default_for(&phy.phy),
            rpc_enabled: true,
            cca_time_method: false,
            symbol_duration_us: 0,
            cca_duration_sym: 0,
            cca_duration_us: 0,
            cca_threshold: 0,
            fcs_len: 0,
            octet_duration_us: 0,
            ack_wait_duration_us: 0,
            ack_timing_us: 0,
            max_frame_duration_us: 0,
        };
        pib.calculate();
        pib
    }
    /// Recompute everything, that is derived from the PHY.
    pub fn calculate(&mut self) {
        let phy = &self.phy.phy;
        self.symbol_duration_us = phy.symbol_duration_us();
        self.cca_duration_sym = phy.cca_duration_sym();
        if !(self.phy.freq_band == FreqBand::Japan920 && self.cca_time_method) {
            self.cca_duration_us = self.cca_duration_sym * self.symbol_duration_us;
        }
        self.cca_threshold = phy.cca_threshold();
        self.fcs_len = self.fcs_type.len();
        self.octet_duration_us = phy.octet_duration_us();
        self.ack_wait_duration_us = phy.ack_wait_duration_us(self.fcs_len, self.cca_duration_sym);
        self.ack_timing_us = phy.ack_timing_us();
        self.max_frame_duration_us = phy.max_frame_duration_us(MAX_PHY_PACKET_SIZE as u16);
    }
    pub fn get(&self, attribute: PibAttribute) -> TalResult<PibValue> {
        Ok(match attribute {
            PibAttribute::CurrentChannel => PibValue::U16(self.current_channel),
            PibAttribute::TransmitPower => PibValue::U8(self.transmit_power),
            PibAttribute::CurrentPage => PibValue::U8(self.current_page),
            PibAttribute::MaxFrameDuration => PibValue::U32(self.max_frame_duration_us),
            PibAttribute::ShrDuration => PibValue::U16(self.phy.phy.shr_duration_sym()),
            PibAttribute::SymbolsPerOctet => {
                PibValue::U8((self.octet_duration_us / self.symbol_duration_us) as u8)
            }
            PibAttribute::PanCoordinator => PibValue::Bool(self.pan_coordinator),
            PibAttribute::MaxCsmaBackoffs => PibValue::U8(self.max_csma_backoffs),
            PibAttribute::MinBe => PibValue::U8(self.min_be),
            PibAttribute::PanId => PibValue::U16(self.pan_id),
            PibAttribute::PromiscuousMode => PibValue::Bool(self.promiscuous_mode),
            PibAttribute::ShortAddress => PibValue::U16(self.short_address),
            PibAttribute::MaxBe => PibValue::U8(self.max_be),
            PibAttribute::MaxFrameRetries => PibValue::U8(self.max_frame_retries),
            PibAttribute::PhySetting => PibValue::Phy(self.phy),
            PibAttribute::FcsType => PibValue::Bool(self.fcs_type == FcsType::Crc16),
            PibAttribute::RpcEnabled => PibValue::Bool(self.rpc_enabled),
            PibAttribute::CcaThreshold => PibValue::I8(self.cca_threshold),
            PibAttribute::CcaDuration => PibValue::U16(self.cca_duration_us),
            PibAttribute::SymbolDuration => PibValue::U16(self.symbol_duration_us),
            PibAttribute::AckWaitDuration => PibValue::U16(self.ack_wait_duration_us),
            PibAttribute::AckTiming => PibValue::U16(self.ack_timing_us),
            PibAttribute::MaxNumRxFramesDuringBackoff => {
                PibValue::U8(self.max_num_rx_frames_during_backoff)
            }
            PibAttribute::NumRxFramesDuringBackoff => {
                PibValue::U8(self.num_rx_frames_during_backoff)
            }
            PibAttribute::FrameTypes => PibValue::U8(self.frame_types),
            PibAttribute::CcaTimeMethod => PibValue::Bool(self.cca_time_method),
            PibAttribute::FcsLength => PibValue::U8(self.fcs_len),
            PibAttribute::IeeeAddress => PibValue::U64(self.ieee_address),
            _ => return Err(TalError::UnsupportedAttribute),
        })
    }
    /// Check and store a new value.
    ///
    /// Returns which part of the hardware configuration is affected.
    pub(crate) fn set(
        &mut self,
        trx: TrxId,
        attribute: PibAttribute,
        value: PibValue,
    ) -> TalResult<PibUpdate> {
        use PibValue::*;
        let update = match (attribute, value) {
            (PibAttribute::CurrentChannel, U16(channel)) => {
                if !self.is_channel_supported(trx, channel) {
                    return Err(TalError::InvalidParameter);
                }
                self.current_channel = channel;
                PibUpdate::Channel
            }
            (PibAttribute::TransmitPower, U8(power)) => {
                if power > MAX_TX_POWER {
                    return Err(TalError::InvalidParameter);
                }
                self.transmit_power = power;
                PibUpdate::TransmitPower
            }
            (PibAttribute::CurrentPage, U8(page)) => {
                self.current_page = page;
                PibUpdate::None
            }
            (PibAttribute::PanCoordinator, Bool(pan_coordinator)) => {
                self.pan_coordinator = pan_coordinator;
                PibUpdate::AddressFilter
            }
            (PibAttribute::MaxCsmaBackoffs, U8(backoffs)) => {
                if backoffs > 5 {
                    return Err(TalError::InvalidParameter);
                }
                self.max_csma_backoffs = backoffs;
                PibUpdate::None
            }
            (PibAttribute::MinBe, U8(min_be)) => {
                if min_be > self.max_be {
                    return Err(TalError::InvalidParameter);
                }
                self.min_be = min_be;
                PibUpdate::None
            }
            (PibAttribute::MaxBe, U8(max_be)) => {
                if !(3..=8).contains(&max_be) || max_be < self.min_be {
                    return Err(TalError::InvalidParameter);
                }
                self.max_be = max_be;
                PibUpdate::None
            }
            (PibAttribute::MaxFrameRetries, U8(retries)) => {
                if retries > 7 {
                    return Err(TalError::InvalidParameter);
                }
                self.max_frame_retries = retries;
                PibUpdate::None
            }
            (PibAttribute::PanId, U16(pan_id)) => {
                self.pan_id = pan_id;
                PibUpdate::AddressFilter
            }
            (PibAttribute::ShortAddress, U16(short_address)) => {
                self.short_address = short_address;
                PibUpdate::AddressFilter
            }
            (PibAttribute::IeeeAddress, U64(ieee_address)) => {
                self.ieee_address = ieee_address;
                PibUpdate::AddressFilter
            }
            (PibAttribute::PromiscuousMode, Bool(promiscuous_mode)) => {
                self.promiscuous_mode = promiscuous_mode;
                PibUpdate::FrameFilter
            }
            (PibAttribute::FrameTypes, U8(frame_types)) => {
                self.frame_types = frame_types;
                PibUpdate::FrameFilter
            }
            (PibAttribute::PhySetting, Phy(phy)) => {
                if !Self::is_phy_supported(&phy.phy) {
                    return Err(TalError::InvalidParameter);
                }
                self.phy = phy;
                self.fcs_type = FcsType::default_for(&phy.phy);
                self.calculate();
                PibUpdate::Phy
            }
            (PibAttribute::FcsType, Bool(crc16)) => {
                self.fcs_type = if crc16 { FcsType::Crc16 } else { FcsType::Crc32 };
                self.calculate();
                PibUpdate::Fcs
            }
            (PibAttribute::RpcEnabled, Bool(rpc_enabled)) => {
                self.rpc_enabled = rpc_enabled;
                PibUpdate::None
            }
            (PibAttribute::MaxNumRxFramesDuringBackoff, U8(max)) => {
                self.max_num_rx_frames_during_backoff = max;
                PibUpdate::None
            }
            (PibAttribute::CcaTimeMethod, Bool(method)) => {
                self.cca_time_method = method;
                self.calculate();
                PibUpdate::Phy
            }
            (PibAttribute::CcaDuration, U16(duration_us))
                if self.phy.freq_band == FreqBand::Japan920 && self.cca_time_method =>
            {
                if duration_us == 0 || EdDuration::try_from_us(duration_us).is_none() {
                    return Err(TalError::InvalidParameter);
                }
                self.cca_duration_us = duration_us;
                PibUpdate::Phy
            }
            (
                PibAttribute::MaxFrameDuration
                | PibAttribute::ShrDuration
                | PibAttribute::SymbolsPerOctet
                | PibAttribute::CcaThreshold
                | PibAttribute::CcaDuration
                | PibAttribute::SymbolDuration
                | PibAttribute::AckWaitDuration
                | PibAttribute::AckTiming
                | PibAttribute::NumRxFramesDuringBackoff
                | PibAttribute::FcsLength,
                _,
            ) => return Err(TalError::ReadOnlyAttribute),
            (
                PibAttribute::CurrentChannel
                | PibAttribute::TransmitPower
                | PibAttribute::CurrentPage
                | PibAttribute::PanCoordinator
                | PibAttribute::MaxCsmaBackoffs
                | PibAttribute::MinBe
                | PibAttribute::MaxBe
                | PibAttribute::MaxFrameRetries
                | PibAttribute::PanId
                | PibAttribute::ShortAddress
                | PibAttribute::IeeeAddress
                | PibAttribute::PromiscuousMode
                | PibAttribute::FrameTypes
                | PibAttribute::PhySetting
                | PibAttribute::FcsType
                | PibAttribute::RpcEnabled
                | PibAttribute::MaxNumRxFramesDuringBackoff
                | PibAttribute::CcaTimeMethod,
                _,
            ) => return Err(TalError::InvalidParameter),
            _ => return Err(TalError::UnsupportedAttribute),
        };
        Ok(update)
    }
    fn is_channel_supported(&self, trx: TrxId, channel: u16) -> bool {
        match self.phy.phy {
            Phy::LegacyOqpsk(_) => match trx {
                TrxId::Rf09 => channel <= 10,
                #[cfg(dual_trx)]
                TrxId::Rf24 => (11..=26).contains(&channel),
            },
            // The channel plan of the SUN PHYs lives in the band tables.
            _ => channel <= 0x1ff,
        }
    }
    fn is_phy_supported(phy: &Phy) -> bool {
        match phy {
            Phy::Ofdm(params) => params.mcs <= 6,
            Phy::Oqpsk(params) => params.rate_mode <= 4,
            _ => true,
        }
    }
}
impl FcsType {
    /// The legacy PHY only knows the 16 bit FCS.
    pub(crate) const fn default_for(phy: &Phy) -> Self {
        match phy {
            Phy::LegacyOqpsk(_) => Self::Crc16,
            _ => Self::Crc32,
        }
    }
}
