//! Bring up and reset.
use embassy_time::Duration;

use super::{ed::scale_ed_value, EdScan, Tal, TalState, TxState};
use crate::{
    error::{InitError, TxStatus},
    hal::{TimerId, TrxBus, TrxPlatform},
    pib::Pib,
    pool::LARGE_BUFFER_SIZE,
    regs::{RfCmdState, RfIrq, PART_NUMBER, RG_RF09_CMD, RG_RF09_STATE, RG_RF_PN, RG_RF_VN},
    trx::{TrxId, TrxSelect},
};

/// Maximum time from releasing the reset to the WAKEUP interrupt.
const RESET_TIMEOUT: Duration = Duration::from_micros(1000);
/// Length of the reset pulse.
const RESET_PULSE_US: u32 = 1;

impl<B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'_, B, P, BUFFER_COUNT> {
    /// Reset the chip, check its identity and configure both cores with the default PIB.
    ///
    /// Both cores are left in TRXOFF. Use [Tal::rx_enable] to start receiving.
    pub fn init(&mut self) -> Result<(), InitError> {
        let start_time = self.platform.now();
        self.platform.set_irq_enabled(false);
        self.trx_reset(TrxSelect::Both)?;

        let part_number = self.bus.read_reg(RG_RF_PN);
        if part_number != PART_NUMBER {
            error!("Unexpected part number {}.", part_number);
            return Err(InitError::WrongPartNumber(part_number));
        }
        let version = self.bus.read_reg(RG_RF_VN);
        if !self.config.accepted_versions.contains(&version) {
            error!("Unsupported chip version {}.", version);
            return Err(InitError::WrongVersion(version));
        }
        self.chip_config();

        for trx in TrxId::ALL {
            self.trx_config(trx);
            self.ctx_mut(trx).pib = Pib::new(trx);
            self.write_all_pib(trx);
            self.config_phy(trx);
            if self.ctx(trx).rx_buffer.is_none() {
                let buffer = self.alloc_rx_buffer().ok_or(InitError::BufferShortage)?;
                self.ctx_mut(trx).rx_buffer = Some(buffer);
            }
            let ctx = self.ctx_mut(trx);
            ctx.tal_state = TalState::Idle;
            ctx.tx_state = TxState::Idle;
            ctx.default_state = RfCmdState::TrxOff;
        }

        if self.generate_rand_seed().is_err() {
            warn!("Couldn't generate a random seed.");
        }
        self.platform.set_irq_enabled(true);
        debug!(
            "TAL initialized. Took {} µs.",
            self.platform
                .now()
                .saturating_duration_since(start_time)
                .as_micros()
        );
        Ok(())
    }
    /// Reset one or both cores.
    ///
    /// Queued frames are dropped and a running transmission is completed with
    /// [TxStatus::Failure]. The PIB is kept, unless `set_default_pib` is set.
    pub fn reset(&mut self, target: TrxSelect, set_default_pib: bool) -> Result<(), InitError> {
        self.platform.set_irq_enabled(false);
        for trx in TrxId::ALL {
            if target.contains(trx) {
                self.cleanup(trx);
            }
        }
        let chip_was_asleep = self
            .trx
            .iter()
            .all(|ctx| ctx.trx_state == RfCmdState::Sleep);
        let result = self.trx_reset(target);
        if result.is_ok() {
            if target == TrxSelect::Both || chip_was_asleep {
                self.chip_config();
            }
            for trx in TrxId::ALL {
                if !target.contains(trx) {
                    continue;
                }
                self.trx_config(trx);
                if set_default_pib {
                    self.ctx_mut(trx).pib = Pib::new(trx);
                }
                self.write_all_pib(trx);
                self.config_phy(trx);
                let ctx = self.ctx_mut(trx);
                ctx.tal_state = TalState::Idle;
                ctx.tx_state = TxState::Idle;
                ctx.default_state = RfCmdState::TrxOff;
            }
            debug!("Reset of {:?} done.", target);
        }
        self.platform.set_irq_enabled(true);
        result
    }
    /// Drop everything, that is in flight on a core.
    fn cleanup(&mut self, trx: TrxId) {
        self.stop_timer(trx, TimerId::Tal);
        self.stop_timer(trx, TimerId::Calibration);
        self.signals.set_asleep(trx, false);

        let ctx = &mut self.trx[trx.index()];
        ctx.calibration_running = false;
        ctx.ack_transmitting = false;
        if let Some(transmission) = ctx.transmission.take() {
            ctx.pending.tx_done = Some((TxStatus::Failure, transmission.frame));
        }
        if ctx.tal_state == TalState::EdScan {
            // The peak measured so far is the result of the scan.
            ctx.pending.ed_end = Some(scale_ed_value(ctx.ed_scan.max_level));
            ctx.ed_scan = EdScan::default();
        }
        self.pool.lock(|pool| {
            let mut pool = pool.borrow_mut();
            pool.queue_flush(&mut ctx.incoming);
            if ctx.rx_buffer.is_none() {
                ctx.rx_buffer = pool.alloc(LARGE_BUFFER_SIZE);
            }
        });
        ctx.buffer_shortage = ctx.rx_buffer.is_none();
    }
    /// Reset the selected cores and wait until they report back in TRXOFF.
    ///
    /// A reset of both cores uses the reset line, a single core is reset by command.
    pub(super) fn trx_reset(&mut self, target: TrxSelect) -> Result<(), InitError> {
        for trx in TrxId::ALL {
            if target.contains(trx) {
                self.signals.clear_irqs(trx);
            }
        }
        let start_time = self.platform.now();
        match target {
            TrxSelect::Both => {
                self.platform.set_reset(true);
                self.platform.delay_us(RESET_PULSE_US);
                self.platform.set_reset(false);
            }
            TrxSelect::Single(trx) => {
                self.write_reg(trx, RG_RF09_CMD, RfCmdState::Reset.into_bits());
            }
        }
        while !self.platform.irq_line_active() {
            if self.platform.now().saturating_duration_since(start_time) > RESET_TIMEOUT {
                error!("Transceiver didn't come out of reset.");
                return Err(InitError::ResetTimeout);
            }
        }
        for trx in TrxId::ALL {
            if !target.contains(trx) {
                continue;
            }
            let state = self.read_reg(trx, RG_RF09_STATE);
            if state != RfCmdState::TrxOff.into_bits() {
                return Err(InitError::UnexpectedState(state));
            }
            self.ctx_mut(trx).trx_state = RfCmdState::TrxOff;
        }
        // Reading the IRQS registers releases the IRQ line.
        self.service_irq();
        let wakeup = RfIrq::new().with_wakeup(true);
        for trx in TrxId::ALL {
            if target.contains(trx) {
                self.signals.take_rf_irq(trx, wakeup);
            }
        }
        trace!(
            "Reset took {} µs.",
            self.platform
                .now()
                .saturating_duration_since(start_time)
                .as_micros()
        );
        Ok(())
    }
}
