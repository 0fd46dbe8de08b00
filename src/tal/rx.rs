use super::{RxLength, Tal, TxState};
use crate::{
    frame::{is_ack, FrameControl, SEQ_NUM_POS},
    hal::{TrxBus, TrxPlatform},
    pool::{LARGE_BUFFER_SIZE, LQI_LEN, MAX_PHY_PACKET_SIZE},
    regs::{RfCmdState, RG_BBC0_FBRXS, RG_BBC0_RXFLL, RG_RF09_EDV, SR_BBC0_AMCS_AACKFT},
    trx::TrxId,
};

/// Mask of the eleven bit frame length.
const RXFLL_MASK: u16 = 0x07ff;

impl<B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'_, B, P, BUFFER_COUNT> {
    /// RXFE: a frame passed the address and frame type filter.
    pub(super) fn handle_rx_end_irq(&mut self, trx: TrxId) {
        self.stop_rpc(trx);
        if !self.upload_frame(trx) {
            self.switch_to_rx(trx);
            return;
        }
        let ctx = self.ctx_mut(trx);
        if ctx.tx_state == TxState::Backoff {
            // The backoff is repeated, once this frame is handled.
            ctx.tx_state = TxState::Defer;
            ctx.pib.num_rx_frames_during_backoff =
                ctx.pib.num_rx_frames_during_backoff.saturating_add(1);
            self.stop_tal_timer(trx);
        }
        if self.ctx(trx).pib.promiscuous_mode {
            self.ctx_mut(trx).trx_state = RfCmdState::TxPrep;
            self.complete_rx_transaction(trx);
            self.resume_after_rx(trx);
            return;
        }
        self.handle_incoming_frame(trx);
    }
    /// Copy the received frame into the RX buffer.
    ///
    /// Returns `false`, if there is no buffer to copy it into.
    fn upload_frame(&mut self, trx: TrxId) -> bool {
        let ctx = &mut self.trx[trx.index()];
        let Some(buffer) = ctx.rx_buffer.as_ref() else {
            debug!("{:?}: Frame dropped, no buffer available.", trx);
            return false;
        };
        let mut len = [0u8; 2];
        self.bus.read(trx.reg(RG_BBC0_RXFLL), &mut len);
        let phy_len = (u16::from_le_bytes(len) & RXFLL_MASK).min(MAX_PHY_PACKET_SIZE as u16);
        let len_no_crc = phy_len.saturating_sub(ctx.pib.fcs_len as u16);
        let upload_len = if self.config.upload_fcs {
            phy_len
        } else {
            len_no_crc
        } as usize;

        let bus = &mut self.bus;
        self.pool.lock(|pool| {
            bus.read(
                trx.frame_buffer(RG_BBC0_FBRXS),
                &mut pool.borrow_mut().buffer_mut(buffer)[..upload_len],
            )
        });
        ctx.rx_length = RxLength {
            phy_len,
            len_no_crc,
        };
        true
    }
    fn handle_incoming_frame(&mut self, trx: TrxId) {
        let ctx = self.ctx(trx);
        let len_no_crc = ctx.rx_length.len_no_crc as usize;
        let ack = ctx.rx_buffer.as_ref().and_then(|buffer| {
            self.pool.lock(|pool| {
                let pool = pool.borrow();
                let mpdu = &pool.buffer(buffer)[..len_no_crc];
                is_ack(mpdu, len_no_crc).then(|| {
                    (
                        mpdu[SEQ_NUM_POS],
                        FrameControl::parse(mpdu).is_some_and(|fcf| fcf.frame_pending()),
                    )
                })
            })
        });
        if let Some((sequence_number, frame_pending)) = ack {
            self.handle_ack(trx, sequence_number, frame_pending);
            return;
        }

        let ack_transmitting = self.read_bits(trx, SR_BBC0_AMCS_AACKFT) == 1;
        self.ctx_mut(trx).ack_transmitting = ack_transmitting;
        if ack_transmitting {
            // The frame is completed, once the ACK is on air.
            self.ctx_mut(trx).trx_state = RfCmdState::Tx;
        } else {
            self.ctx_mut(trx).trx_state = RfCmdState::TxPrep;
            self.complete_rx_transaction(trx);
            self.resume_after_rx(trx);
        }
    }
    /// Listen again and continue a transmission, that was deferred by the reception.
    pub(super) fn resume_after_rx(&mut self, trx: TrxId) {
        self.switch_to_rx(trx);
        if self.ctx(trx).tx_state == TxState::Defer {
            self.continue_deferred_transmission(trx);
        }
    }
    /// Queue the received frame and take a fresh buffer for the next one.
    pub(super) fn complete_rx_transaction(&mut self, trx: TrxId) {
        let ed = self.read_reg(trx, RG_RF09_EDV);
        let ctx = &mut self.trx[trx.index()];
        let Some(buffer) = ctx.rx_buffer.take() else {
            return;
        };
        ctx.current_ed = ed as i8;
        self.rx_lengths[buffer.index()] = ctx.rx_length;
        let ed_pos = ctx.rx_length.phy_len as usize + LQI_LEN;
        self.pool.lock(|pool| {
            let mut pool = pool.borrow_mut();
            pool.buffer_mut(&buffer)[ed_pos] = ed;
            pool.queue_append(&mut ctx.incoming, buffer);
            ctx.rx_buffer = pool.alloc(LARGE_BUFFER_SIZE);
        });
        if ctx.rx_buffer.is_none() {
            debug!("{:?}: No buffer left for the next frame.", trx);
        }
    }
}
