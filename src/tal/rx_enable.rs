use super::{RxMode, Tal, TalState};
use crate::{
    error::{TalError, TalResult},
    hal::{TrxBus, TrxPlatform},
    regs::RfCmdState,
    trx::TrxId,
};

impl<B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'_, B, P, BUFFER_COUNT> {
    /// Switch the receiver on or off and make that the default state.
    ///
    /// Returns the mode the receiver is in afterwards.
    pub fn rx_enable(&mut self, trx: TrxId, mode: RxMode) -> TalResult<RxMode> {
        match self.ctx(trx).tal_state {
            TalState::Idle => {}
            TalState::Sleep => return Err(TalError::TrxAsleep),
            _ => return Err(TalError::Busy),
        }
        match (mode, self.ctx(trx).trx_state) {
            (RxMode::Off, RfCmdState::TrxOff) | (RxMode::On, RfCmdState::Rx) => return Ok(mode),
            _ => {}
        }
        match mode {
            RxMode::Off => {
                // A frame, that is being received right now, is lost.
                self.set_trx_state(trx, RfCmdState::TrxOff);
                self.stop_rpc(trx);
                self.stop_calibration_timer(trx);
                let ctx = self.ctx_mut(trx);
                ctx.buffer_shortage = false;
                ctx.default_state = RfCmdState::TrxOff;
            }
            RxMode::On => {
                let _ = self.switch_to_txprep(trx);
                self.switch_to_rx(trx);
                if !self.ctx(trx).calibration_running {
                    self.start_calibration_timer(trx);
                }
                self.ctx_mut(trx).default_state = RfCmdState::Rx;
            }
        }
        debug!("{:?}: Receiver {:?}.", trx, mode);
        Ok(mode)
    }
}
