use super::{Tal, TalState};
use crate::{
    error::{TalError, TalResult},
    hal::{TrxBus, TrxPlatform},
    regs::{
        RfCmdState, RG_RF09_RNDV, RG_RF09_RXBWC, RXBWC_RANDOM_SEED, SR_BBC0_PC_BBEN,
    },
    trx::TrxId,
};

/// Time for the frontend to settle, before noise is sampled.
const FRONTEND_SETTLE_US: u32 = 10;

impl<B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'_, B, P, BUFFER_COUNT> {
    /// Sample receiver noise and seed the random number generator of the platform with it.
    pub fn generate_rand_seed(&mut self) -> TalResult<u16> {
        if self
            .trx
            .iter()
            .all(|ctx| ctx.tal_state == TalState::Sleep)
        {
            return Err(TalError::TrxAsleep);
        }
        let trx = TrxId::ALL
            .into_iter()
            .find(|trx| self.ctx(*trx).tal_state == TalState::Idle)
            .ok_or(TalError::Busy)?;

        // Widest filter bandwidth with IF shift.
        let previous_bwc = self.read_reg(trx, RG_RF09_RXBWC);
        self.write_reg(trx, RG_RF09_RXBWC, RXBWC_RANDOM_SEED);

        let was_off = self.ctx(trx).trx_state == RfCmdState::TrxOff;
        if was_off {
            self.write_bits(trx, SR_BBC0_PC_BBEN, 0);
            let _ = self.switch_to_txprep(trx);
            // No buffer is needed, since the baseband is off.
            self.set_trx_state(trx, RfCmdState::Rx);
            self.platform.delay_us(FRONTEND_SETTLE_US);
        }

        let mut seed = 0u16;
        // The first sample is discarded.
        for _ in 0..2 {
            let low = self.read_reg(trx, RG_RF09_RNDV);
            let high = self.read_reg(trx, RG_RF09_RNDV);
            seed = u16::from_le_bytes([low, high]);
        }

        if was_off {
            self.set_trx_state(trx, RfCmdState::TrxOff);
            self.write_bits(trx, SR_BBC0_PC_BBEN, 1);
        }
        self.write_reg(trx, RG_RF09_RXBWC, previous_bwc);

        self.platform.seed_random(seed);
        trace!("{:?}: Random seed is {}.", trx, seed);
        Ok(seed)
    }
}
