use embassy_time::Duration;

use super::{Tal, TxState};
use crate::{
    error::TxStatus,
    frame::FrameType,
    hal::{TimerId, TrxBus, TrxPlatform},
    regs::{RfCmdState, RG_BBC0_AFFTM},
    trx::TrxId,
};

impl<B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'_, B, P, BUFFER_COUNT> {
    /// The frame is on air and the transceiver switched to RX on its own. Only let ACKs through
    /// until the wait is over.
    pub(super) fn start_ack_wait_timer(&mut self, trx: TrxId) {
        self.ctx_mut(trx).tx_state = TxState::WaitingForAck;
        let duration = Duration::from_micros(self.ctx(trx).pib.ack_wait_duration_us as u64);
        if self.start_timer(trx, TimerId::Tal, duration).is_err() {
            warn!("{:?}: Couldn't start the ACK wait timer.", trx);
            self.set_trx_state(trx, RfCmdState::TrxOff);
            self.tx_done_handling(trx, TxStatus::Failure);
            return;
        }
        self.write_reg(trx, RG_BBC0_AFFTM, FrameType::ACK_FILTER);
        self.ctx_mut(trx).trx_state = RfCmdState::Rx;
    }
    pub(super) fn ack_timeout(&mut self, trx: TrxId) {
        trace!("{:?}: No ACK received.", trx);
        let _ = self.switch_to_txprep(trx);
        self.restore_frame_filter(trx);
        self.tx_done_handling(trx, TxStatus::NoAck);
    }
    pub(super) fn restore_frame_filter(&mut self, trx: TrxId) {
        let frame_types = self.ctx(trx).pib.frame_types;
        self.write_reg(trx, RG_BBC0_AFFTM, frame_types);
    }
    /// An ACK was received. Check if it belongs to the frame in flight.
    pub(super) fn handle_ack(&mut self, trx: TrxId, sequence_number: u8, frame_pending: bool) {
        self.ctx_mut(trx).trx_state = RfCmdState::TxPrep;
        if self.ctx(trx).tx_state == TxState::WaitingForAck
            && self.expected_sequence_number(trx) == Some(sequence_number)
        {
            self.stop_tal_timer(trx);
            self.restore_frame_filter(trx);
            let status = if frame_pending {
                TxStatus::FramePending
            } else {
                TxStatus::Success
            };
            self.tx_done_handling(trx, status);
        } else {
            trace!("{:?}: Ignoring ACK with sequence number {}.", trx, sequence_number);
            self.resume_after_rx(trx);
        }
    }
    /// The automatic ACK for a received frame left the antenna.
    pub(super) fn ack_transmission_done(&mut self, trx: TrxId) {
        trace!("{:?}: ACK transmitted.", trx);
        let ctx = self.ctx_mut(trx);
        ctx.ack_transmitting = false;
        // The transceiver is back in RX after the ACK.
        ctx.trx_state = RfCmdState::Rx;
        self.complete_rx_transaction(trx);
        self.resume_after_rx(trx);
    }
}
