//! Periodic filter tuning.
//!
//! The transceiver tunes its filters whenever it leaves TRXOFF. A receiver, that stays on for a
//! long time, is cycled through TRXOFF once per calibration period.
use super::{Tal, TalState};
use crate::{
    hal::{TimerId, TrxBus, TrxPlatform},
    regs::{RfCmdState, SR_RF09_AGCC_FRZS},
    trx::TrxId,
};

impl<B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'_, B, P, BUFFER_COUNT> {
    pub(super) fn start_calibration_timer(&mut self, trx: TrxId) {
        if !self.config.calibration_enabled {
            return;
        }
        let period = self.config.calibration_period;
        self.arm_calibration_timer(trx, period);
    }
    pub(super) fn stop_calibration_timer(&mut self, trx: TrxId) {
        if self.ctx(trx).calibration_running {
            self.stop_timer(trx, TimerId::Calibration);
            self.ctx_mut(trx).calibration_running = false;
        }
    }
    fn arm_calibration_timer(&mut self, trx: TrxId, delay: embassy_time::Duration) {
        let running = self.start_timer(trx, TimerId::Calibration, delay).is_ok();
        if !running {
            warn!("{:?}: Couldn't start the calibration timer.", trx);
        }
        self.ctx_mut(trx).calibration_running = running;
    }
    pub(super) fn calibration_timer_expired(&mut self, trx: TrxId) {
        self.ctx_mut(trx).calibration_running = false;
        let ctx = self.ctx(trx);
        if ctx.tal_state != TalState::Idle || ctx.ack_transmitting {
            self.postpone_calibration(trx);
            return;
        }
        if ctx.trx_state == RfCmdState::Rx {
            if self.read_bits(trx, SR_RF09_AGCC_FRZS) == 1 {
                // A frame is on its way in.
                self.postpone_calibration(trx);
                return;
            }
            trace!("{:?}: Tuning filters.", trx);
            self.set_trx_state(trx, RfCmdState::TrxOff);
            self.switch_to_rx(trx);
        }
        self.start_calibration_timer(trx);
    }
    fn postpone_calibration(&mut self, trx: TrxId) {
        trace!("{:?}: Postponing calibration.", trx);
        let retry = self.config.calibration_retry;
        self.arm_calibration_timer(trx, retry);
    }
}
