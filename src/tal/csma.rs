//! Unslotted CSMA-CA.
use embassy_time::Duration;

use super::{CsmaState, Tal, TxState};
use crate::{
    error::TxStatus,
    hal::{TimerId, TrxBus, TrxPlatform},
    regs::{RfCmdState, SR_RF09_AGCC_FRZS},
    trx::TrxId,
};

/// aUnitBackoffPeriod in symbols.
const UNIT_BACKOFF_PERIOD: u64 = 20;

/// How a frame goes on air.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CcaMode {
    /// The transceiver performs a CCA and only transmits, if the channel is clear.
    WithCca,
    NoCca,
}

impl<B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'_, B, P, BUFFER_COUNT> {
    pub(super) fn csma_start(&mut self, trx: TrxId) {
        let ctx = self.ctx_mut(trx);
        ctx.csma = CsmaState {
            nb: 0,
            be: ctx.pib.min_be,
        };
        if ctx.csma.be == 0 {
            // A BE of zero means the channel is never assessed.
            self.transmit_frame(trx, CcaMode::NoCca);
        } else {
            self.start_backoff(trx);
        }
    }
    fn start_backoff(&mut self, trx: TrxId) {
        let be = self.ctx(trx).csma.be;
        let backoff = self.platform.random() & ((1u16 << be) - 1);
        trace!("{:?}: Backing off for {} periods with BE {}.", trx, backoff, be);
        if backoff == 0 {
            self.cca_start(trx);
            return;
        }
        let duration = Duration::from_micros(
            backoff as u64 * UNIT_BACKOFF_PERIOD * self.ctx(trx).pib.symbol_duration_us as u64,
        );
        if self.start_timer(trx, TimerId::Tal, duration).is_err() {
            warn!("{:?}: Couldn't start the backoff timer.", trx);
            self.tx_done_handling(trx, TxStatus::Failure);
            return;
        }
        let ctx = self.ctx_mut(trx);
        ctx.tx_state = TxState::Backoff;
        // The receiver is only kept on once the frame count reached its threshold.
        let stay_in_rx = ctx.default_state == RfCmdState::Rx
            && ctx.pib.num_rx_frames_during_backoff >= ctx.pib.max_num_rx_frames_during_backoff;
        if !stay_in_rx && ctx.trx_state != RfCmdState::TxPrep {
            let _ = self.switch_to_txprep(trx);
        }
    }
    /// The backoff is over. Hand the CCA to the transceiver, unless a frame is being received.
    pub(super) fn cca_start(&mut self, trx: TrxId) {
        let ctx = self.ctx_mut(trx);
        ctx.tx_state = TxState::Cca;
        if ctx.ack_transmitting {
            trace!("{:?}: ACK on air, channel is busy.", trx);
            self.csma_continue(trx);
            return;
        }
        if ctx.trx_state == RfCmdState::Rx && self.read_bits(trx, SR_RF09_AGCC_FRZS) == 1 {
            trace!("{:?}: Reception in progress, channel is busy.", trx);
            self.csma_continue(trx);
            return;
        }
        self.transmit_frame(trx, CcaMode::WithCca);
    }
    /// The channel was busy.
    pub(super) fn csma_continue(&mut self, trx: TrxId) {
        let ctx = self.ctx_mut(trx);
        ctx.csma.nb += 1;
        if ctx.csma.nb > ctx.pib.max_csma_backoffs {
            debug!("{:?}: Channel access failure after {} backoffs.", trx, ctx.csma.nb);
            self.tx_done_handling(trx, TxStatus::ChannelAccessFailure);
        } else {
            ctx.csma.be = (ctx.csma.be + 1).min(ctx.pib.max_be);
            self.start_backoff(trx);
        }
    }
    /// Pick up a transmission, whose backoff was interrupted by a received frame.
    pub(super) fn continue_deferred_transmission(&mut self, trx: TrxId) {
        trace!("{:?}: Continuing deferred transmission.", trx);
        self.csma_continue(trx);
    }
}
