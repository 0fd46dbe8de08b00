//! Writing the configuration and the PIB to the transceiver.
use super::{Tal, TalState};
use crate::{
    error::{TalError, TalResult},
    hal::{TrxBus, TrxPlatform},
    phy::Phy,
    pib::{FcsType, PibAttribute, PibUpdate, PibValue},
    regs::{
        BbIrq, EdDuration, RfCmdState, RfIrq, AMAACKPD_ALL_FILTERS, AMCS_AACK, FREQ_OFFSET_2_4_GHZ_HZ,
        FREQ_STEP_HZ, RG_BBC0_AFFTM, RG_BBC0_AMAACKPD, RG_BBC0_AMCS, RG_BBC0_AMEDT, RG_BBC0_IRQM,
        RG_BBC0_MACEA0, RG_BBC0_MACPID0F0, RG_BBC0_MACSHA0F0, RG_RF09_CCF0L, RG_RF09_CNL,
        RG_RF09_CNM, RG_RF09_CS, RG_RF09_EDD, RG_RF09_IRQM, SR_BBC0_AFC0_AFEN0, SR_BBC0_AFC0_PM,
        SR_BBC0_AFC1_PANC0, SR_BBC0_FSKC1_SRATE, SR_BBC0_PC_FCST, SR_BBC0_PC_PT,
        SR_RF09_AUXS_AVEN, SR_RF09_PAC_TXPWR, SR_RF_CFG_IRQP, SR_RF_CLKO_OS,
    },
    trx::TrxId,
};

/// Baseband interrupts, that are enabled.
const BB_IRQ_MASK: BbIrq = BbIrq::new().with_rx_frame_end(true).with_tx_frame_end(true);
/// Radio interrupts, that are enabled.
const RF_IRQ_MASK: RfIrq = RfIrq::new()
    .with_wakeup(true)
    .with_battery_low(true)
    .with_trx_error(true);
/// First channel of the O-QPSK PHY in the 2.4 GHz band.
const FIRST_2_4_GHZ_CHANNEL: u16 = 11;

impl<B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'_, B, P, BUFFER_COUNT> {
    /// Chip wide settings, which are lost during reset and deep sleep.
    pub(super) fn chip_config(&mut self) {
        if self.config.irq_active_low {
            self.bus.write_bits(SR_RF_CFG_IRQP, 1);
        }
        if let Some(clock_output) = self.config.clock_output {
            self.bus.write_bits(SR_RF_CLKO_OS, clock_output);
        }
    }
    /// Settings of one core, that don't depend on the PIB.
    pub(super) fn trx_config(&mut self, trx: TrxId) {
        self.write_reg(trx, RG_BBC0_IRQM, BB_IRQ_MASK.into_bits());
        self.write_reg(trx, RG_RF09_IRQM, RF_IRQ_MASK.into_bits());
        // Filter on the first address set.
        self.write_bits(trx, SR_BBC0_AFC0_AFEN0, 1);
        // Store the energy of every received frame.
        self.write_bits(trx, SR_RF09_AUXS_AVEN, 1);
        self.write_reg(trx, RG_BBC0_AMCS, AMCS_AACK);
        self.write_reg(trx, RG_BBC0_AMAACKPD, AMAACKPD_ALL_FILTERS);
    }
    pub(super) fn write_all_pib(&mut self, trx: TrxId) {
        self.write_channel(trx);
        self.write_transmit_power(trx);
        self.write_address_filter(trx);
        self.write_frame_filter(trx);
    }
    /// Apply the PHY, that is configured in the PIB.
    pub(super) fn config_phy(&mut self, trx: TrxId) {
        let pib = self.ctx(trx).pib;
        self.write_bits(trx, SR_BBC0_PC_PT, pib.phy.phy.phy_type());
        self.write_fcs_type(trx);
        if let Phy::Fsk(params) = pib.phy.phy {
            self.write_bits(trx, SR_BBC0_FSKC1_SRATE, params.sym_rate as u8);
        }

        let offset = if pib.phy.freq_f0 >= FREQ_OFFSET_2_4_GHZ_HZ {
            FREQ_OFFSET_2_4_GHZ_HZ
        } else {
            0
        };
        let center = ((pib.phy.freq_f0 - offset) / FREQ_STEP_HZ) as u16;
        self.write_reg(trx, RG_RF09_CS, (pib.phy.ch_spacing / FREQ_STEP_HZ) as u8);
        self.bus
            .write(trx.reg(RG_RF09_CCF0L), &center.to_le_bytes());
        self.write_channel(trx);

        self.write_reg(
            trx,
            RG_RF09_EDD,
            EdDuration::from_us(pib.cca_duration_us).into_bits(),
        );
        self.write_reg(trx, RG_BBC0_AMEDT, pib.cca_threshold as u8);
        debug!(
            "{:?}: PHY type {} configured, {} µs per symbol.",
            trx,
            pib.phy.phy.phy_type(),
            pib.symbol_duration_us
        );
    }
    fn write_channel(&mut self, trx: TrxId) {
        let pib = &self.ctx(trx).pib;
        let mut channel = pib.current_channel;
        if matches!(pib.phy.phy, Phy::LegacyOqpsk(_)) && channel >= FIRST_2_4_GHZ_CHANNEL {
            channel -= FIRST_2_4_GHZ_CHANNEL;
        }
        let [low, high] = channel.to_le_bytes();
        self.write_reg(trx, RG_RF09_CNL, low);
        // Writing CNM takes the new channel over.
        self.write_reg(trx, RG_RF09_CNM, high & 0x01);
    }
    fn write_transmit_power(&mut self, trx: TrxId) {
        let transmit_power = self.ctx(trx).pib.transmit_power;
        self.write_bits(trx, SR_RF09_PAC_TXPWR, transmit_power);
    }
    fn write_address_filter(&mut self, trx: TrxId) {
        let pib = self.ctx(trx).pib;
        self.bus
            .write(trx.reg(RG_BBC0_MACPID0F0), &pib.pan_id.to_le_bytes());
        self.bus
            .write(trx.reg(RG_BBC0_MACSHA0F0), &pib.short_address.to_le_bytes());
        self.bus
            .write(trx.reg(RG_BBC0_MACEA0), &pib.ieee_address.to_le_bytes());
        self.write_bits(trx, SR_BBC0_AFC1_PANC0, pib.pan_coordinator as u8);
    }
    fn write_frame_filter(&mut self, trx: TrxId) {
        let pib = self.ctx(trx).pib;
        self.write_reg(trx, RG_BBC0_AFFTM, pib.frame_types);
        self.write_bits(trx, SR_BBC0_AFC0_PM, pib.promiscuous_mode as u8);
    }
    fn write_fcs_type(&mut self, trx: TrxId) {
        let crc16 = self.ctx(trx).pib.fcs_type == FcsType::Crc16;
        self.write_bits(trx, SR_BBC0_PC_FCST, crc16 as u8);
    }
    /// Run `f` with the receiver switched off and restore it afterwards.
    fn with_receiver_off(&mut self, trx: TrxId, f: impl FnOnce(&mut Self)) {
        let listening = self.ctx(trx).trx_state == RfCmdState::Rx;
        if listening {
            self.stop_rpc(trx);
            self.set_trx_state(trx, RfCmdState::TrxOff);
        }
        f(self);
        if listening {
            self.switch_to_rx(trx);
        }
    }

    pub fn pib_get(&self, trx: TrxId, attribute: PibAttribute) -> TalResult<PibValue> {
        self.ctx(trx).pib.get(attribute)
    }
    /// Change a PIB attribute and apply it to the transceiver.
    ///
    /// Changing the PHY or the channel restarts the receiver, if it was on.
    pub fn pib_set(&mut self, trx: TrxId, attribute: PibAttribute, value: PibValue) -> TalResult<()> {
        match self.ctx(trx).tal_state {
            TalState::Idle => {}
            TalState::Sleep => return Err(TalError::TrxAsleep),
            _ => return Err(TalError::Busy),
        }
        // RPC has to be left with the settings it was entered with.
        let rpc_affected = matches!(
            attribute,
            PibAttribute::PhySetting | PibAttribute::RpcEnabled
        ) && self.ctx(trx).trx_state == RfCmdState::Rx;
        if rpc_affected {
            self.stop_rpc(trx);
        }
        let update = match self.ctx_mut(trx).pib.set(trx, attribute, value) {
            Ok(update) => update,
            Err(error) => {
                if rpc_affected {
                    self.start_rpc(trx);
                }
                return Err(error);
            }
        };
        trace!("{:?}: PIB attribute {} set.", trx, attribute.into_bits());
        match update {
            PibUpdate::None => {
                if rpc_affected {
                    self.start_rpc(trx);
                }
            }
            PibUpdate::Phy => self.with_receiver_off(trx, |tal| tal.config_phy(trx)),
            PibUpdate::Channel => self.with_receiver_off(trx, |tal| tal.write_channel(trx)),
            PibUpdate::TransmitPower => self.write_transmit_power(trx),
            PibUpdate::AddressFilter => self.write_address_filter(trx),
            PibUpdate::FrameFilter => self.write_frame_filter(trx),
            PibUpdate::Fcs => self.write_fcs_type(trx),
        }
        Ok(())
    }
}
