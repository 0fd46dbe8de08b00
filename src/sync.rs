use core::{future::poll_fn, task::Poll};

use atomic_waker::AtomicWaker;
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use portable_atomic::{AtomicBool, AtomicU8, Ordering};

use crate::{
    hal::TimerToken,
    regs::{BbIrq, RfIrq, IRQS_LEN},
    trx::{TrxId, NUM_TRX},
};

/// Number of timer expirations, that can be queued.
///
/// Two timers per transceiver can be running, the rest is slack for stale tokens.
const TIMER_QUEUE_DEPTH: usize = 8;

/// Baseband interrupts, that are never acted upon.
const BB_IRQ_IGNORED: BbIrq = BbIrq::new()
    .with_rx_extended_match(true)
    .with_rx_address_match(true)
    .with_agc_release(true)
    .with_agc_hold(true)
    .with_rx_frame_start(true);
/// Radio interrupts, that are never acted upon.
const RF_IRQ_IGNORED: RfIrq = RfIrq::new().with_trx_ready(true);

/// Interrupt flags of one transceiver, which haven't been handled yet.
struct IrqShadow {
    bb: AtomicU8,
    rf: AtomicU8,
    asleep: AtomicBool,
}
impl IrqShadow {
    const fn new() -> Self {
        Self {
            bb: AtomicU8::new(0),
            rf: AtomicU8::new(0),
            asleep: AtomicBool::new(false),
        }
    }
}

/// Everything, that crosses from interrupt or timer context into the TAL task.
///
/// This is meant to be placed in a `static`, so the interrupt handler and the timer service can
/// reach it.
pub struct TalSignals {
    shadows: [IrqShadow; NUM_TRX],
    timer_events: Channel<CriticalSectionRawMutex, TimerToken, TIMER_QUEUE_DEPTH>,
    waker: AtomicWaker,
}
impl TalSignals {
    pub const fn new() -> Self {
        Self {
            shadows: [const { IrqShadow::new() }; NUM_TRX],
            timer_events: Channel::new(),
            waker: AtomicWaker::new(),
        }
    }
    /// Merge the raw contents of the four IRQS registers into the shadows.
    ///
    /// This is meant to be called by the interrupt handler, after reading [IRQS_LEN] bytes starting
    /// at [RG_RF09_IRQS](crate::regs::RG_RF09_IRQS). Flags of sleeping transceivers and flags, which
    /// are never acted upon, are dropped.
    pub fn capture(&self, irqs: &[u8; IRQS_LEN]) {
        let mut captured = false;
        for trx in TrxId::ALL {
            let shadow = &self.shadows[trx.index()];
            if shadow.asleep.load(Ordering::Acquire) {
                continue;
            }
            let rf = irqs[trx.index()] & !RF_IRQ_IGNORED.into_bits();
            let bb = irqs[2 + trx.index()] & !BB_IRQ_IGNORED.into_bits();
            if rf != 0 {
                shadow.rf.fetch_or(rf, Ordering::AcqRel);
                captured = true;
            }
            if bb != 0 {
                shadow.bb.fetch_or(bb, Ordering::AcqRel);
                captured = true;
            }
        }
        if captured {
            self.waker.wake();
        }
    }
    /// Queue the expiration of a timer.
    ///
    /// This is meant to be called by the timer service, with the token it was started with.
    pub fn timer_fired(&self, token: TimerToken) {
        if self.timer_events.try_send(token).is_err() {
            error!("Timer event queue overflowed.");
        }
        self.waker.wake();
    }
    /// Snapshot and clear the pending interrupts of a transceiver.
    pub(crate) fn take_irqs(&self, trx: TrxId) -> (BbIrq, RfIrq) {
        let shadow = &self.shadows[trx.index()];
        critical_section::with(|_| {
            (
                BbIrq::from_bits(shadow.bb.swap(0, Ordering::AcqRel)),
                RfIrq::from_bits(shadow.rf.swap(0, Ordering::AcqRel)),
            )
        })
    }
    pub(crate) fn clear_irqs(&self, trx: TrxId) {
        let _ = self.take_irqs(trx);
    }
    /// Remove a single radio interrupt from the shadow, without touching the others.
    pub(crate) fn take_rf_irq(&self, trx: TrxId, irq: RfIrq) -> bool {
        let previous = self.shadows[trx.index()]
            .rf
            .fetch_and(!irq.into_bits(), Ordering::AcqRel);
        previous & irq.into_bits() != 0
    }
    pub(crate) fn set_asleep(&self, trx: TrxId, asleep: bool) {
        self.shadows[trx.index()]
            .asleep
            .store(asleep, Ordering::Release);
    }
    pub(crate) fn next_timer_event(&self) -> Option<TimerToken> {
        self.timer_events.try_receive().ok()
    }
    /// Check if any interrupt or timer event is waiting to be handled.
    pub fn has_pending(&self) -> bool {
        !self.timer_events.is_empty()
            || self.shadows.iter().any(|shadow| {
                shadow.bb.load(Ordering::Acquire) != 0 || shadow.rf.load(Ordering::Acquire) != 0
            })
    }
    /// Asynchronously wait until an interrupt or timer event is pending.
    pub async fn wait_for_work(&self) {
        poll_fn(|cx| {
            if self.has_pending() {
                return Poll::Ready(());
            }
            self.waker.register(cx.waker());
            // Something might have arrived between checking and registering.
            if self.has_pending() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await
    }
}
impl Default for TalSignals {
    fn default() -> Self {
        Self::new()
    }
}
