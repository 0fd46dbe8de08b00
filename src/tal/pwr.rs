//! Sleep and wake up.
//!
//! The chip only enters its low power state, once every core is asleep. Waking any core wakes
//! the whole chip.
use embassy_time::Duration;

use super::{Tal, TalState};
use crate::{
    error::{TalError, TalResult},
    hal::{TrxBus, TrxPlatform},
    regs::{RfCmdState, RfIrq, RG_RF09_CMD},
    trx::TrxId,
};

/// Maximum time from the wake up command to the WAKEUP interrupt.
const WAKEUP_TIMEOUT: Duration = Duration::from_micros(1000);

impl<B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'_, B, P, BUFFER_COUNT> {
    fn all_asleep(&self) -> bool {
        self.trx
            .iter()
            .all(|ctx| ctx.tal_state == TalState::Sleep)
    }
    /// Put a transceiver to sleep.
    ///
    /// The RX buffer is returned to the pool, frames that weren't dispatched yet stay queued.
    pub fn sleep(&mut self, trx: TrxId) -> TalResult<()> {
        match self.ctx(trx).tal_state {
            TalState::Idle => {}
            TalState::Sleep => return Err(TalError::TrxAsleep),
            _ => return Err(TalError::Busy),
        }
        self.set_trx_state(trx, RfCmdState::TrxOff);
        self.stop_calibration_timer(trx);
        self.ctx_mut(trx).tal_state = TalState::Sleep;
        self.signals.set_asleep(trx, true);

        if self.all_asleep() {
            for core in TrxId::ALL {
                self.set_trx_state(core, RfCmdState::Sleep);
                self.signals.clear_irqs(core);
            }
            debug!("Transceiver entered sleep.");
        }

        let ctx = &mut self.trx[trx.index()];
        let buffer = ctx.rx_buffer.take();
        ctx.buffer_shortage = false;
        self.pool.lock(|pool| pool.borrow_mut().free(buffer));
        Ok(())
    }
    /// Wake a transceiver and restore its configuration.
    pub fn wakeup(&mut self, trx: TrxId) -> TalResult<()> {
        if self.ctx(trx).tal_state != TalState::Sleep {
            return Err(TalError::TrxAwake);
        }
        self.signals.set_asleep(trx, false);
        if self.all_asleep() {
            self.ctx_mut(trx).tal_state = TalState::WakingUp;
            let start = self.platform.now();
            self.write_reg(trx, RG_RF09_CMD, RfCmdState::TrxOff.into_bits());
            let wakeup = RfIrq::new().with_wakeup(true);
            loop {
                if self.platform.irq_line_active() {
                    self.service_irq();
                }
                if self.signals.take_rf_irq(trx, wakeup) {
                    break;
                }
                if self.platform.now().saturating_duration_since(start) > WAKEUP_TIMEOUT {
                    warn!("{:?}: Transceiver didn't wake up.", trx);
                    self.ctx_mut(trx).tal_state = TalState::Sleep;
                    self.signals.set_asleep(trx, true);
                    return Err(TalError::Timeout);
                }
            }
            for core in TrxId::ALL {
                self.signals.take_rf_irq(core, wakeup);
                self.ctx_mut(core).trx_state = RfCmdState::TrxOff;
            }
        }

        let buffer = self.alloc_rx_buffer();
        let ctx = self.ctx_mut(trx);
        ctx.tal_state = TalState::Idle;
        ctx.buffer_shortage = buffer.is_none();
        ctx.rx_buffer = buffer;
        ctx.default_state = RfCmdState::TrxOff;
        self.trx_config(trx);
        self.write_all_pib(trx);
        self.config_phy(trx);
        debug!("{:?}: Awake.", trx);
        Ok(())
    }
}
