//! The transceiver abstraction layer.
//!
//! All state transitions happen inside [Tal::task]. The interrupt handler of the board only reads
//! the IRQS registers and hands them to [TalSignals::capture], the timer service hands expired
//! [TimerToken]s to [TalSignals::timer_fired]. Both are picked up by the next pass of the task,
//! which is also the only place where the [TalHandler] is called.
use embassy_futures::yield_now;
use embassy_time::Duration;

use crate::{
    error::TxStatus,
    frame::{Frame, FrameInfo},
    hal::{SubRegister, TimerError, TimerId, TimerToken, TrxBus, TrxPlatform},
    pib::Pib,
    pool::{BufferHandle, Queue, SharedPool, LARGE_BUFFER_SIZE, LQI_LEN},
    regs::{RfCmdState, IRQS_LEN, RG_RF09_CMD, RG_RF09_IRQS, RG_RF09_STATE},
    sync::TalSignals,
    trx::{TrxId, NUM_TRX},
    TalResult, TalError,
};

mod ack;
mod config;
mod csma;
mod ed;
mod ftn;
mod init;
mod pwr;
mod rand;
mod rx;
mod rx_enable;
mod tx;

pub use ed::{scale_ed_value, MAX_SCAN_DURATION};

/// Maximum time the transceiver may take to reach TXPREP.
const TXPREP_TIMEOUT: Duration = Duration::from_micros(1000);
/// Time for the AGC to settle after the receiver was switched on.
const AGC_SETTLE_US: u32 = 64;

/// State of the TAL for one transceiver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TalState {
    Idle,
    Sleep,
    /// Not initialized yet or in the middle of a reset.
    #[default]
    Reset,
    WakingUp,
    /// A transmission is in progress.
    Tx,
    EdScan,
}

/// State of an ongoing transmission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxState {
    #[default]
    Idle,
    /// Waiting for the backoff timer.
    Backoff,
    /// Deciding whether the CCA can be performed.
    Cca,
    /// The transceiver performs the CCA and transmits, if the channel is clear.
    CcaTx,
    /// Transmitting without CCA.
    Tx,
    WaitingForAck,
    /// A frame was received during backoff. CSMA-CA continues, once that frame is handled.
    Defer,
}

/// The default state of the receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxMode {
    On,
    Off,
}

/// Channel access used for a transmission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CsmaMode {
    /// Transmit right away.
    NoCsma,
    /// Unslotted CSMA-CA.
    #[default]
    Unslotted,
}

/// Run time configuration of the TAL, which isn't part of the PIB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TalConfig {
    /// Periodically retune the filters of a listening transceiver.
    pub calibration_enabled: bool,
    pub calibration_period: Duration,
    /// Delay after which a calibration, that couldn't be run, is attempted again.
    pub calibration_retry: Duration,
    /// Also copy the FCS of received frames into the buffer.
    pub upload_fcs: bool,
    /// Chip versions, that are accepted during initialization.
    pub accepted_versions: &'static [u8],
    pub irq_active_low: bool,
    /// Clock output selection. [None] keeps the reset default of the chip.
    pub clock_output: Option<u8>,
}
impl Default for TalConfig {
    fn default() -> Self {
        Self {
            calibration_enabled: true,
            calibration_period: Duration::from_secs(30 * 60),
            calibration_retry: Duration::from_secs(1),
            upload_fcs: false,
            accepted_versions: &[1, 2, 3],
            irq_active_low: false,
            clock_output: None,
        }
    }
}

/// The consumer of the TAL.
///
/// All callbacks are made from inside [Tal::task].
pub trait TalHandler<'res, const BUFFER_COUNT: usize> {
    fn rx_frame(&mut self, trx: TrxId, frame: Frame<'res, BUFFER_COUNT>);
    /// A transmission finished. The frame is handed back.
    fn tx_frame_done(&mut self, trx: TrxId, status: TxStatus, frame: Frame<'res, BUFFER_COUNT>);
    /// An energy detection scan finished with the scaled maximum energy level.
    fn ed_end(&mut self, trx: TrxId, energy_level: u8);
    fn battery_low(&mut self, _trx: TrxId) {}
}

/// Counters of the CSMA-CA algorithm.
#[derive(Clone, Copy, Debug, Default)]
struct CsmaState {
    /// Number of backoffs.
    nb: u8,
    /// Backoff exponent.
    be: u8,
}

/// The frame, that is currently being transmitted.
struct Transmission<'res, const BUFFER_COUNT: usize> {
    frame: Frame<'res, BUFFER_COUNT>,
    csma_mode: CsmaMode,
    perform_retry: bool,
    retries: u8,
    ack_requested: bool,
    sequence_number: Option<u8>,
}

#[derive(Clone, Copy, Debug, Default)]
struct EdScan {
    max_level: i8,
    samples_left: u32,
}

/// Results, which are handed to the [TalHandler] at the end of a task pass.
struct Pending<'res, const BUFFER_COUNT: usize> {
    tx_done: Option<(TxStatus, Frame<'res, BUFFER_COUNT>)>,
    ed_end: Option<u8>,
    battery_low: bool,
}
impl<const BUFFER_COUNT: usize> Default for Pending<'_, BUFFER_COUNT> {
    fn default() -> Self {
        Self {
            tx_done: None,
            ed_end: None,
            battery_low: false,
        }
    }
}

/// Lengths of a received frame, stored next to its buffer.
#[derive(Clone, Copy, Debug, Default)]
struct RxLength {
    phy_len: u16,
    len_no_crc: u16,
}

/// Everything the TAL keeps per transceiver.
struct TrxContext<'res, const BUFFER_COUNT: usize> {
    pib: Pib,
    tal_state: TalState,
    tx_state: TxState,
    /// Shadow of the STATE register.
    trx_state: RfCmdState,
    /// The state the transceiver returns to, when nothing else is going on.
    default_state: RfCmdState,
    buffer_shortage: bool,
    ack_transmitting: bool,
    rx_buffer: Option<BufferHandle>,
    rx_length: RxLength,
    incoming: Queue,
    csma: CsmaState,
    transmission: Option<Transmission<'res, BUFFER_COUNT>>,
    ed_scan: EdScan,
    current_ed: i8,
    calibration_running: bool,
    timer_generation: [u16; TimerId::COUNT],
    pending: Pending<'res, BUFFER_COUNT>,
}
impl<const BUFFER_COUNT: usize> TrxContext<'_, BUFFER_COUNT> {
    fn new(trx: TrxId) -> Self {
        Self {
            pib: Pib::new(trx),
            tal_state: TalState::Reset,
            tx_state: TxState::Idle,
            trx_state: RfCmdState::TrxOff,
            default_state: RfCmdState::TrxOff,
            buffer_shortage: false,
            ack_transmitting: false,
            rx_buffer: None,
            rx_length: RxLength::default(),
            incoming: Queue::new(),
            csma: CsmaState::default(),
            transmission: None,
            ed_scan: EdScan::default(),
            current_ed: 0,
            calibration_running: false,
            timer_generation: [0; TimerId::COUNT],
            pending: Pending::default(),
        }
    }
}

/// Driver for the AT86RF215.
pub struct Tal<'res, B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> {
    bus: B,
    platform: P,
    pool: &'res SharedPool<BUFFER_COUNT>,
    signals: &'res TalSignals,
    config: TalConfig,
    trx: [TrxContext<'res, BUFFER_COUNT>; NUM_TRX],
    /// Indexed by the buffer index.
    rx_lengths: [RxLength; BUFFER_COUNT],
}
impl<'res, B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Tal<'res, B, P, BUFFER_COUNT> {
    /// Create the driver. The transceiver isn't touched until [Tal::init] is called.
    pub fn new(
        bus: B,
        platform: P,
        pool: &'res SharedPool<BUFFER_COUNT>,
        signals: &'res TalSignals,
        config: TalConfig,
    ) -> Self {
        Self {
            bus,
            platform,
            pool,
            signals,
            config,
            trx: core::array::from_fn(|i| TrxContext::new(TrxId::ALL[i])),
            rx_lengths: [RxLength::default(); BUFFER_COUNT],
        }
    }
    pub fn config(&self) -> &TalConfig {
        &self.config
    }
    pub fn tal_state(&self, trx: TrxId) -> TalState {
        self.ctx(trx).tal_state
    }
    pub fn tx_state(&self, trx: TrxId) -> TxState {
        self.ctx(trx).tx_state
    }
    /// The last state, that was commanded to or read from the transceiver.
    pub fn trx_state(&self, trx: TrxId) -> RfCmdState {
        self.ctx(trx).trx_state
    }
    pub fn pib(&self, trx: TrxId) -> &Pib {
        &self.ctx(trx).pib
    }
    /// Check if the transceiver is waiting for a free buffer, before it can receive again.
    pub fn buffer_shortage(&self, trx: TrxId) -> bool {
        self.ctx(trx).buffer_shortage
    }
    /// Energy level of the last received frame in dBm.
    pub fn current_ed(&self, trx: TrxId) -> i8 {
        self.ctx(trx).current_ed
    }
    /// Number of received frames, that haven't been handed to the [TalHandler] yet.
    pub fn queued_frames(&self, trx: TrxId) -> usize {
        self.ctx(trx).incoming.size()
    }

    fn ctx(&self, trx: TrxId) -> &TrxContext<'res, BUFFER_COUNT> {
        &self.trx[trx.index()]
    }
    fn ctx_mut(&mut self, trx: TrxId) -> &mut TrxContext<'res, BUFFER_COUNT> {
        &mut self.trx[trx.index()]
    }
    fn read_reg(&mut self, trx: TrxId, addr: u16) -> u8 {
        self.bus.read_reg(trx.reg(addr))
    }
    fn write_reg(&mut self, trx: TrxId, addr: u16, value: u8) {
        self.bus.write_reg(trx.reg(addr), value);
    }
    fn read_bits(&mut self, trx: TrxId, sub_register: SubRegister) -> u8 {
        self.bus.read_bits(sub_register.offset(trx.reg(0)))
    }
    fn write_bits(&mut self, trx: TrxId, sub_register: SubRegister, value: u8) {
        self.bus
            .write_bits(sub_register.offset(trx.reg(0)), value);
    }
    /// Issue a command and track the resulting state.
    fn set_trx_state(&mut self, trx: TrxId, state: RfCmdState) {
        trace!("{:?}: Switching to state {}.", trx, state.into_bits());
        self.write_reg(trx, RG_RF09_CMD, state.into_bits());
        self.ctx_mut(trx).trx_state = state;
    }
    fn alloc_rx_buffer(&self) -> Option<BufferHandle> {
        self.pool
            .lock(|pool| pool.borrow_mut().alloc(LARGE_BUFFER_SIZE))
    }

    /// Start listening, if a buffer for the next frame is available.
    ///
    /// Otherwise the transceiver is parked in TXPREP and [Tal::task] takes care of it, once a
    /// buffer was freed.
    fn switch_to_rx(&mut self, trx: TrxId) {
        if self.ctx(trx).rx_buffer.is_some() {
            self.set_trx_state(trx, RfCmdState::Rx);
            self.start_rpc(trx);
        } else {
            let _ = self.switch_to_txprep(trx);
            self.ctx_mut(trx).buffer_shortage = true;
            debug!("{:?}: Buffer shortage.", trx);
        }
    }
    fn switch_to_txprep(&mut self, trx: TrxId) -> TalResult<()> {
        self.write_reg(trx, RG_RF09_CMD, RfCmdState::TxPrep.into_bits());
        self.wait_for_txprep(trx)
    }
    fn wait_for_txprep(&mut self, trx: TrxId) -> TalResult<()> {
        let start = self.platform.now();
        loop {
            if self.read_reg(trx, RG_RF09_STATE) == RfCmdState::TxPrep.into_bits() {
                self.ctx_mut(trx).trx_state = RfCmdState::TxPrep;
                return Ok(());
            }
            if self.platform.now().saturating_duration_since(start) > TXPREP_TIMEOUT {
                warn!("{:?}: Transceiver didn't reach TXPREP.", trx);
                return Err(TalError::Timeout);
            }
        }
    }
    fn rpc_applicable(&self, trx: TrxId) -> bool {
        let pib = &self.ctx(trx).pib;
        pib.rpc_enabled
            && matches!(
                pib.phy.phy,
                crate::phy::Phy::Fsk(_) | crate::phy::Phy::Oqpsk(_)
            )
    }
    /// Enable the reduced power consumption mode of the receiver.
    fn start_rpc(&mut self, trx: TrxId) {
        self.set_rpc(trx, true);
    }
    fn stop_rpc(&mut self, trx: TrxId) {
        self.set_rpc(trx, false);
    }
    fn set_rpc(&mut self, trx: TrxId, enabled: bool) {
        use crate::{
            phy::Phy,
            regs::{
                PLL_DEFAULT, PLL_RPC, RG_RF09_PLL, SR_BBC0_FSKRPC_EN, SR_BBC0_OQPSKC2_RPC,
            },
        };
        if !self.rpc_applicable(trx) {
            return;
        }
        if enabled {
            self.write_reg(trx, RG_RF09_PLL, PLL_RPC);
        }
        match self.ctx(trx).pib.phy.phy {
            Phy::Oqpsk(_) => self.write_bits(trx, SR_BBC0_OQPSKC2_RPC, enabled as u8),
            Phy::Fsk(_) => self.write_bits(trx, SR_BBC0_FSKRPC_EN, enabled as u8),
            _ => {}
        }
        if !enabled {
            self.write_reg(trx, RG_RF09_PLL, PLL_DEFAULT);
        }
    }

    fn start_timer(
        &mut self,
        trx: TrxId,
        timer: TimerId,
        duration: Duration,
    ) -> Result<(), TimerError> {
        let generation = &mut self.trx[trx.index()].timer_generation[timer.index()];
        *generation = generation.wrapping_add(1);
        let token = TimerToken {
            timer,
            trx,
            generation: *generation,
        };
        self.platform.start_timer(token, duration)
    }
    /// Stop a timer and invalidate expirations, that are already queued.
    fn stop_timer(&mut self, trx: TrxId, timer: TimerId) {
        let generation = &mut self.trx[trx.index()].timer_generation[timer.index()];
        *generation = generation.wrapping_add(1);
        self.platform.stop_timer(timer, trx);
    }
    fn stop_tal_timer(&mut self, trx: TrxId) {
        self.stop_timer(trx, TimerId::Tal);
    }
    fn handle_timer_event(&mut self, token: TimerToken) {
        let trx = token.trx;
        if self.ctx(trx).timer_generation[token.timer.index()] != token.generation {
            trace!("{:?}: Discarding stale timer event.", trx);
            return;
        }
        match token.timer {
            TimerId::Tal => match self.ctx(trx).tx_state {
                TxState::Backoff => self.cca_start(trx),
                TxState::WaitingForAck => self.ack_timeout(trx),
                _ => trace!("{:?}: TAL timer expired without a purpose.", trx),
            },
            TimerId::Calibration => self.calibration_timer_expired(trx),
        }
    }

    /// Read the interrupt status of the transceiver and capture it.
    ///
    /// This is for platforms, that don't capture the interrupts in an interrupt handler, but poll
    /// the IRQ line instead.
    pub fn service_irq(&mut self) {
        let mut irqs = [0u8; IRQS_LEN];
        self.bus.read(RG_RF09_IRQS, &mut irqs);
        self.signals.capture(&irqs);
    }
    /// Run one pass of the state machine.
    ///
    /// Per transceiver, this recovers from a buffer shortage, hands one received frame to the
    /// handler and processes the captured interrupts. Expired timers are handled afterwards.
    pub fn task(&mut self, handler: &mut impl TalHandler<'res, BUFFER_COUNT>) {
        for trx in TrxId::ALL {
            if self.ctx(trx).tal_state == TalState::Sleep {
                continue;
            }
            self.recover_buffer_shortage(trx);
            self.dispatch_incoming_frame(trx, handler);
            self.handle_pending_irqs(trx);
            self.deliver(trx, handler);
        }
        while let Some(token) = self.signals.next_timer_event() {
            self.handle_timer_event(token);
            self.deliver(token.trx, handler);
        }
    }
    /// Drive the state machine forever.
    pub async fn run(&mut self, handler: &mut impl TalHandler<'res, BUFFER_COUNT>) -> ! {
        loop {
            self.task(handler);
            let more_work = self
                .trx
                .iter()
                .any(|ctx| !ctx.incoming.is_empty() || ctx.buffer_shortage);
            if more_work {
                yield_now().await;
            } else {
                self.signals.wait_for_work().await;
            }
        }
    }
    fn recover_buffer_shortage(&mut self, trx: TrxId) {
        if !self.ctx(trx).buffer_shortage {
            return;
        }
        if self.ctx(trx).rx_buffer.is_none() {
            let buffer = self.alloc_rx_buffer();
            self.ctx_mut(trx).rx_buffer = buffer;
        }
        let ctx = self.ctx_mut(trx);
        if ctx.rx_buffer.is_some() {
            ctx.buffer_shortage = false;
            trace!("{:?}: Buffer shortage resolved.", trx);
            if ctx.tal_state == TalState::Idle && ctx.default_state == RfCmdState::Rx {
                self.switch_to_rx(trx);
            }
        }
    }
    fn handle_pending_irqs(&mut self, trx: TrxId) {
        let (bb_irqs, mut rf_irqs) = self.signals.take_irqs(trx);
        if bb_irqs.tx_frame_end() {
            if self.ctx(trx).tx_state == TxState::CcaTx {
                // The energy measurement of the CCA isn't a scan result.
                rf_irqs = rf_irqs.with_ed_complete(false).with_trx_ready(false);
            }
            self.handle_tx_end_irq(trx);
        }
        if bb_irqs.rx_frame_end() {
            self.handle_rx_end_irq(trx);
        }
        if rf_irqs.trx_error() {
            self.handle_trxerr(trx);
        }
        if rf_irqs.battery_low() {
            warn!("{:?}: Battery low.", trx);
            self.ctx_mut(trx).pending.battery_low = true;
        }
        if rf_irqs.ed_complete() {
            self.handle_ed_end_irq(trx);
        }
    }
    /// Force the transceiver off and abort whatever was going on.
    fn handle_trxerr(&mut self, trx: TrxId) {
        warn!("{:?}: Transceiver error.", trx);
        self.set_trx_state(trx, RfCmdState::TrxOff);
        self.ctx_mut(trx).tx_state = TxState::Idle;
        self.stop_tal_timer(trx);
        self.stop_calibration_timer(trx);
        match self.ctx(trx).tal_state {
            TalState::Tx => self.tx_done_handling(trx, TxStatus::Failure),
            TalState::EdScan => self.stop_ed_scan(trx),
            _ => {
                let ctx = self.ctx_mut(trx);
                ctx.tal_state = TalState::Idle;
                if ctx.default_state == RfCmdState::Rx {
                    let _ = self.rx_enable(trx, RxMode::On);
                }
            }
        }
        let ctx = self.ctx(trx);
        if ctx.default_state == RfCmdState::Rx && !ctx.calibration_running {
            self.start_calibration_timer(trx);
        }
    }
    fn deliver(&mut self, trx: TrxId, handler: &mut impl TalHandler<'res, BUFFER_COUNT>) {
        let pending = core::mem::take(&mut self.ctx_mut(trx).pending);
        if let Some((status, frame)) = pending.tx_done {
            handler.tx_frame_done(trx, status, frame);
        }
        if let Some(energy_level) = pending.ed_end {
            handler.ed_end(trx, energy_level);
        }
        if pending.battery_low {
            handler.battery_low(trx);
        }
    }
    /// Hand the oldest received frame to the handler.
    fn dispatch_incoming_frame(
        &mut self,
        trx: TrxId,
        handler: &mut impl TalHandler<'res, BUFFER_COUNT>,
    ) {
        let ctx = &mut self.trx[trx.index()];
        if ctx.incoming.is_empty() {
            return;
        }
        let rx_lengths = &self.rx_lengths;
        let Some((buffer, info)) = self.pool.lock(|pool| {
            let mut pool = pool.borrow_mut();
            let buffer = pool.queue_remove(&mut ctx.incoming)?;
            let length = rx_lengths[buffer.index()];
            let data = pool.buffer_mut(&buffer);
            let lqi_pos = length.phy_len as usize;
            let ed = data[lqi_pos + LQI_LEN] as i8;
            let lqi = scale_ed_value(ed);
            data[lqi_pos] = lqi;
            Some((
                buffer,
                FrameInfo {
                    trx,
                    len_no_crc: length.len_no_crc,
                    lqi,
                    ed,
                },
            ))
        }) else {
            return;
        };
        handler.rx_frame(trx, Frame::from_parts(self.pool, buffer, info));
    }
}
impl<B: TrxBus, P: TrxPlatform, const BUFFER_COUNT: usize> Drop for Tal<'_, B, P, BUFFER_COUNT> {
    fn drop(&mut self) {
        for ctx in self.trx.iter_mut() {
            self.pool.lock(|pool| {
                let mut pool = pool.borrow_mut();
                pool.free(ctx.rx_buffer.take());
                pool.queue_flush(&mut ctx.incoming);
            });
        }
    }
}
