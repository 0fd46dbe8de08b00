use super::{csma::CcaMode, CsmaMode, TalState, Tal, Transmission, TxState, AGC_SETTLE_US};
use crate::{
    error::{Rejected, TalError, TxStatus},
    frame::Frame,
    hal::{TrxBus, TrxPlatform},
    pool::MAX_PHY_PACKET_SIZE,
    regs::{
        EdMode, RfCmdState, RG_BBC0_FBTXS, RG_BBC0_TXFLL, SR_BBC0_AMCS_CCAED, SR_BBC0_AMCS_CCATX,
        SR_BBC0_AMCS_TX2RX, SR_RF09_EDC_EDM,
    },
    trx::TrxId,
};

impl<'res, B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'res, B, P, BUFFER_COUNT> {
    /// Transmit a frame.
    ///
    /// The FCS is appended by the transceiver. With `perform_retry` set, a frame that wasn't
    /// acknowledged is repeated up to `MaxFrameRetries` times. The outcome is reported through
    /// [TalHandler::tx_frame_done](crate::TalHandler::tx_frame_done), which also returns the frame.
    pub fn tx_frame(
        &mut self,
        trx: TrxId,
        mut frame: Frame<'res, BUFFER_COUNT>,
        csma_mode: CsmaMode,
        perform_retry: bool,
    ) -> Result<(), Rejected<Frame<'res, BUFFER_COUNT>>> {
        let reject = |error, frame| Err(Rejected { error, frame });
        match self.ctx(trx).tal_state {
            TalState::Idle => {}
            TalState::Sleep => return reject(TalError::TrxAsleep, frame),
            _ => return reject(TalError::Busy, frame),
        }
        let phy_len = frame.len() + self.ctx(trx).pib.fcs_len as usize;
        if frame.is_empty() || phy_len > MAX_PHY_PACKET_SIZE {
            return reject(TalError::InvalidParameter, frame);
        }

        self.bus
            .write(trx.reg(RG_BBC0_TXFLL), &(phy_len as u16).to_le_bytes());
        let bus = &mut self.bus;
        frame.with_mpdu(|mpdu| bus.write(trx.frame_buffer(RG_BBC0_FBTXS), mpdu));

        frame.info_mut().trx = trx;
        let ack_requested = frame
            .frame_control()
            .is_some_and(|fcf| fcf.ack_request());
        let sequence_number = frame.sequence_number();
        trace!(
            "{:?}: Transmitting {} bytes, ACK requested: {}.",
            trx,
            frame.len(),
            ack_requested
        );
        let ctx = self.ctx_mut(trx);
        ctx.tal_state = TalState::Tx;
        ctx.pib.num_rx_frames_during_backoff = 0;
        ctx.transmission = Some(Transmission {
            frame,
            csma_mode,
            perform_retry,
            retries: 0,
            ack_requested,
            sequence_number,
        });
        self.start_transmission(trx);
        Ok(())
    }
    fn start_transmission(&mut self, trx: TrxId) {
        match self.ctx(trx).transmission.as_ref().map(|tx| tx.csma_mode) {
            Some(CsmaMode::Unslotted) => self.csma_start(trx),
            Some(CsmaMode::NoCsma) => self.transmit_frame(trx, CcaMode::NoCca),
            None => {}
        }
    }
    pub(super) fn ack_requested(&self, trx: TrxId) -> bool {
        self.ctx(trx)
            .transmission
            .as_ref()
            .is_some_and(|tx| tx.ack_requested)
    }
    pub(super) fn expected_sequence_number(&self, trx: TrxId) -> Option<u8> {
        self.ctx(trx)
            .transmission
            .as_ref()
            .and_then(|tx| tx.sequence_number)
    }
    /// Put the frame in the TX buffer on air.
    pub(super) fn transmit_frame(&mut self, trx: TrxId, cca_mode: CcaMode) {
        let ack_requested = self.ack_requested(trx);
        self.write_bits(trx, SR_BBC0_AMCS_TX2RX, ack_requested as u8);
        match cca_mode {
            CcaMode::WithCca => {
                if self.ctx(trx).trx_state != RfCmdState::Rx {
                    // The energy measurement needs a running receiver.
                    self.set_trx_state(trx, RfCmdState::Rx);
                    self.platform.delay_us(AGC_SETTLE_US);
                }
                self.stop_rpc(trx);
                self.write_bits(trx, SR_RF09_EDC_EDM, EdMode::Single.into_bits());
                self.write_bits(trx, SR_BBC0_AMCS_CCATX, 1);
                self.ctx_mut(trx).tx_state = TxState::CcaTx;
            }
            CcaMode::NoCca => {
                if self.ctx(trx).trx_state != RfCmdState::TxPrep {
                    let _ = self.switch_to_txprep(trx);
                }
                self.ctx_mut(trx).tx_state = TxState::Tx;
                self.set_trx_state(trx, RfCmdState::Tx);
            }
        }
    }
    /// TXFE: either a frame or an automatic ACK left the antenna, or the CCA found the channel
    /// busy.
    pub(super) fn handle_tx_end_irq(&mut self, trx: TrxId) {
        if self.ctx(trx).ack_transmitting {
            self.ack_transmission_done(trx);
            return;
        }
        if self.ctx(trx).tal_state != TalState::Tx {
            debug!("{:?}: Unexpected TXFE.", trx);
            return;
        }
        if self.ctx(trx).tx_state == TxState::CcaTx {
            self.write_bits(trx, SR_BBC0_AMCS_CCATX, 0);
            if self.read_bits(trx, SR_BBC0_AMCS_CCAED) == 1 {
                trace!("{:?}: CCA found the channel busy.", trx);
                // The receiver stays on after a failed CCA.
                self.ctx_mut(trx).trx_state = RfCmdState::Rx;
                self.csma_continue(trx);
                return;
            }
        }
        if self.ack_requested(trx) {
            self.start_ack_wait_timer(trx);
        } else {
            self.ctx_mut(trx).trx_state = RfCmdState::TxPrep;
            self.tx_done_handling(trx, TxStatus::Success);
        }
    }
    /// Finish the transmission, unless it is retried.
    pub(super) fn tx_done_handling(&mut self, trx: TrxId, status: TxStatus) {
        let ctx = self.ctx_mut(trx);
        if status == TxStatus::NoAck {
            if let Some(transmission) = ctx.transmission.as_mut() {
                if transmission.perform_retry && transmission.retries < ctx.pib.max_frame_retries {
                    transmission.retries += 1;
                    trace!("{:?}: Retry {}.", trx, transmission.retries);
                    ctx.tx_state = TxState::Idle;
                    self.start_transmission(trx);
                    return;
                }
            }
        }
        let Some(transmission) = ctx.transmission.take() else {
            debug!("{:?}: Transmission finished without a frame.", trx);
            return;
        };
        ctx.tal_state = TalState::Idle;
        ctx.tx_state = TxState::Idle;
        ctx.pib.num_rx_frames_during_backoff = 0;
        ctx.pending.tx_done = Some((status, transmission.frame));
        if ctx.default_state == RfCmdState::Rx {
            self.switch_to_rx(trx);
        } else {
            self.set_trx_state(trx, RfCmdState::TrxOff);
        }
        debug!("{:?}: Transmission finished with {:?}.", trx, status);
    }
}
