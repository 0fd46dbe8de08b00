//! Energy detection scan.
use super::{EdScan, TalState, Tal, AGC_SETTLE_US};
use crate::{
    error::{TalError, TalResult},
    hal::{TrxBus, TrxPlatform},
    regs::{
        EdDuration, EdMode, RfCmdState, RG_RF09_EDD, RG_RF09_EDV, SR_BBC0_PC_BBEN,
        SR_RF09_AGCC_FRZC, SR_RF09_EDC_EDM, SR_RF09_IRQM_EDC,
    },
    trx::TrxId,
};

/// Largest scan duration exponent.
pub const MAX_SCAN_DURATION: u8 = 14;
/// aBaseSuperframeDuration in symbols.
const BASE_SUPERFRAME_DURATION: u32 = 960;
/// Length of one energy sample in symbols.
const ED_SAMPLE_SYMBOLS: u16 = 8;
/// The EDV register holds this, if no valid measurement is available.
const ED_INVALID: i8 = 127;
/// Energy levels, that map to the ends of the scaled range.
const ED_MIN_DBM: i16 = -100;
const ED_MAX_DBM: i16 = -30;

/// Map an energy level in dBm to the range 0 to 255.
///
/// Everything at or above -30 dBm saturates, everything at or below -100 dBm is zero.
pub fn scale_ed_value(ed: i8) -> u8 {
    match ed as i16 {
        level if level == ED_INVALID as i16 => 0,
        level if level >= ED_MAX_DBM => u8::MAX,
        level if level <= ED_MIN_DBM => 0,
        level => ((level - ED_MIN_DBM) * u8::MAX as i16 / (ED_MAX_DBM - ED_MIN_DBM)) as u8,
    }
}

impl<B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'_, B, P, BUFFER_COUNT> {
    /// Measure the peak energy on the current channel.
    ///
    /// The scan takes `aBaseSuperframeDuration * (2^scan_duration + 1)` symbols. The result is
    /// reported through [TalHandler::ed_end](crate::TalHandler::ed_end).
    pub fn ed_start(&mut self, trx: TrxId, scan_duration: u8) -> TalResult<()> {
        match self.ctx(trx).tal_state {
            TalState::Idle => {}
            TalState::Sleep => return Err(TalError::TrxAsleep),
            _ => return Err(TalError::Busy),
        }
        if scan_duration > MAX_SCAN_DURATION {
            return Err(TalError::InvalidParameter);
        }
        let ctx = self.ctx_mut(trx);
        if matches!(ctx.trx_state, RfCmdState::Rx | RfCmdState::TxPrep) {
            ctx.default_state = RfCmdState::Rx;
        }
        let sample_us = ED_SAMPLE_SYMBOLS * ctx.pib.symbol_duration_us;
        let samples =
            BASE_SUPERFRAME_DURATION * ((1u32 << scan_duration) + 1) / ED_SAMPLE_SYMBOLS as u32;
        ctx.ed_scan = EdScan {
            max_level: -ED_INVALID,
            samples_left: samples.max(1),
        };

        self.stop_rpc(trx);
        self.switch_to_txprep(trx)?;
        // Keep the baseband from reacting to frames during the scan.
        self.write_bits(trx, SR_BBC0_PC_BBEN, 0);
        self.write_bits(trx, SR_RF09_AGCC_FRZC, 0);
        self.write_reg(trx, RG_RF09_EDD, EdDuration::from_us(sample_us).into_bits());
        self.write_bits(trx, SR_RF09_IRQM_EDC, 1);
        self.set_trx_state(trx, RfCmdState::Rx);
        self.platform.delay_us(AGC_SETTLE_US);
        self.ctx_mut(trx).tal_state = TalState::EdScan;
        self.write_bits(trx, SR_RF09_EDC_EDM, EdMode::Continuous.into_bits());
        debug!("{:?}: ED scan over {} samples started.", trx, samples);
        Ok(())
    }
    /// EDC: one energy sample is available.
    pub(super) fn handle_ed_end_irq(&mut self, trx: TrxId) {
        if self.ctx(trx).tal_state != TalState::EdScan {
            trace!("{:?}: Ignoring energy measurement outside of a scan.", trx);
            return;
        }
        let level = self.read_reg(trx, RG_RF09_EDV) as i8;
        let scan = &mut self.ctx_mut(trx).ed_scan;
        if level != ED_INVALID {
            scan.max_level = scan.max_level.max(level);
        }
        scan.samples_left = scan.samples_left.saturating_sub(1);
        if scan.samples_left == 0 {
            self.finish_ed_scan(trx);
        }
    }
    /// Abort a running scan and report what was measured so far.
    pub(super) fn stop_ed_scan(&mut self, trx: TrxId) {
        self.ctx_mut(trx).ed_scan.samples_left = 0;
        self.finish_ed_scan(trx);
    }
    fn finish_ed_scan(&mut self, trx: TrxId) {
        self.write_bits(trx, SR_RF09_EDC_EDM, EdMode::Auto.into_bits());
        let cca_duration_us = self.ctx(trx).pib.cca_duration_us;
        self.write_reg(
            trx,
            RG_RF09_EDD,
            EdDuration::from_us(cca_duration_us).into_bits(),
        );
        self.write_bits(trx, SR_BBC0_PC_BBEN, 1);
        self.write_bits(trx, SR_RF09_IRQM_EDC, 0);

        let ctx = self.ctx_mut(trx);
        ctx.tal_state = TalState::Idle;
        let energy_level = scale_ed_value(ctx.ed_scan.max_level);
        ctx.pending.ed_end = Some(energy_level);
        if ctx.default_state == RfCmdState::Rx {
            self.switch_to_rx(trx);
        } else {
            self.set_trx_state(trx, RfCmdState::TrxOff);
        }
        debug!("{:?}: ED scan finished with level {}.", trx, energy_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed_scaling() {
        assert_eq!(scale_ed_value(127), 0);
        assert_eq!(scale_ed_value(-127), 0);
        assert_eq!(scale_ed_value(-100), 0);
        assert_eq!(scale_ed_value(-30), 255);
        assert_eq!(scale_ed_value(0), 255);
        assert_eq!(scale_ed_value(-65), 127);
        assert_eq!(scale_ed_value(-99), 3);
    }
}
